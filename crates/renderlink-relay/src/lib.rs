//! Control-stream relay for the render cluster.
//!
//! A control node that cannot reach its workers directly (separate
//! network segments, inbound-blocked boundaries) connects to this relay
//! instead. The relay accepts one inbound connection per configured
//! worker, dials the worker's real address, and from then on forwards
//! raw bytes both ways. It is protocol-agnostic by construction —
//! payload bytes are never inspected — so it composes with the worker
//! protocol purely by sitting on the path.

pub mod error;
pub mod link;
pub mod relay;

pub use error::{RelayError, Result};
pub use link::{LinkOutcome, RelayLink};
pub use relay::{Relay, RelayConfig, RelayPair};
