//! TCP plumbing for the render cluster.
//!
//! Two concerns live here:
//! - Listen/accept/connect helpers with contextual errors, shared by the
//!   worker (which accepts its control connection) and the relay (which
//!   accepts upstream and dials downstream).
//! - Readiness polling over raw descriptors, so callers can check "is
//!   there data right now" without committing to a blocking read.
//!
//! This is the lowest layer of renderlink. Everything else builds on the
//! streams handed out here.

pub mod error;
pub mod tcp;

#[cfg(unix)]
pub mod poll;

pub use error::{NetError, Result};
pub use tcp::{connect, TcpEndpoint};

#[cfg(unix)]
pub use poll::{readable_now, wait_either, ReadyPair};
