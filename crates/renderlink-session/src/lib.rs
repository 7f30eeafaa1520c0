//! Per-worker compute session and dispatch loop.
//!
//! A worker owns exactly one [`Session`] per control connection: a
//! compute context, at most one compiled program, and the session's
//! named kernels and buffers. The [`WorkerLoop`] decodes control
//! messages and applies them to the session, one non-blocking
//! activation per host frame tick.
//!
//! The GPU itself is reached only through the [`ComputeBackend`]
//! capability trait; [`HostBackend`] is the in-memory implementation
//! used by tests and headless workers.

pub mod backend;
pub mod dispatch;
pub mod host;
pub mod session;
pub mod viewport;

pub use backend::{BackendError, ComputeBackend};
pub use dispatch::{Activation, DispatchError, LoopState, WorkerLoop};
pub use host::{BoundArg, HostBackend, LaunchRecord};
pub use session::{Session, SessionError};
pub use viewport::{FixedViewport, Viewport, ViewportSource};
