//! Control-channel message codec for the render cluster.
//!
//! Every protocol participant shares this framing:
//! - A 4-byte little-endian message tag
//! - Length-prefixed UTF-8 strings (`u32` length + bytes)
//! - Kernel-argument lists as signed `i32` length tags: `0` terminates,
//!   `-1` prefixes a buffer name, `-2` injects the worker's viewport,
//!   positive `n` prefixes `n` inline bytes
//!
//! Decoding is forward-only with no resynchronization marker, so a
//! malformed message is fatal to its connection by design.

pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

pub use error::{Result, WireError};
pub use message::{
    encode_message, tag_name, Arg, Extent2d, Message, ACK_OK, ARG_BUFFER_REF, ARG_GEOMETRY,
    ARG_TERMINATOR, MAX_FRAGMENTS, MAX_PAYLOAD, TAG_DOWNLOAD_BUFFER, TAG_KERNEL_INVOKE,
    TAG_KERNEL_SOURCE, TAG_MAKE_BUFFER, TAG_NULL, TAG_REMOVE_BUFFER, TAG_SHUTDOWN,
};
pub use reader::{read_blob, read_message, read_status, MessageReader};
pub use writer::{write_ack, write_blob, write_message, MessageWriter};
