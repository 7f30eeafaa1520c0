use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// No-op message.
pub const TAG_NULL: u32 = 0;
/// Replace the session program with new source fragments.
pub const TAG_KERNEL_SOURCE: u32 = 1;
/// Bind arguments and launch a kernel.
pub const TAG_KERNEL_INVOKE: u32 = 2;
/// Create a named device buffer.
pub const TAG_MAKE_BUFFER: u32 = 3;
/// Destroy a named device buffer.
pub const TAG_REMOVE_BUFFER: u32 = 4;
/// Read a named device buffer back to the control node.
pub const TAG_DOWNLOAD_BUFFER: u32 = 5;
/// Terminate the connection and its session.
pub const TAG_SHUTDOWN: u32 = 6;

/// Argument-list entry length tag: end of list.
pub const ARG_TERMINATOR: i32 = 0;
/// Argument-list entry length tag: named buffer reference follows.
pub const ARG_BUFFER_REF: i32 = -1;
/// Argument-list entry length tag: worker-local viewport injection.
pub const ARG_GEOMETRY: i32 = -2;

/// Status byte written back after a successfully applied message.
pub const ACK_OK: u8 = 0;

/// Sanity bound on any single length-prefixed field.
///
/// A desynchronized stream decodes garbage lengths; bounding them makes
/// the failure a protocol error instead of a giant allocation.
pub const MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Sanity bound on the number of source fragments in one message.
pub const MAX_FRAGMENTS: usize = 256;

/// 2D launch extent for a kernel invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent2d {
    pub width: u64,
    pub height: u64,
}

impl Extent2d {
    pub fn new(width: u64, height: u64) -> Self {
        Self { width, height }
    }
}

/// One kernel-argument entry.
///
/// The wire carries a signed length field before each entry; decoding
/// turns the sentinel values into explicit variants so binding logic
/// matches on a closed set instead of magic integers. The list
/// terminator is consumed by the decoder and never appears here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Reference to a named buffer owned by the session.
    BufferRef(String),
    /// Expands at bind time to four consecutive `i32` arguments taken
    /// from the worker's own viewport: x, y, width, height. Nothing is
    /// read from the wire for this entry.
    Geometry,
    /// Raw bytes bound verbatim as the argument value.
    Inline(Bytes),
}

/// A control-channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Null,
    KernelSource {
        fragments: Vec<String>,
    },
    KernelInvoke {
        kernel: String,
        extent: Extent2d,
        args: Vec<Arg>,
    },
    MakeBuffer {
        name: String,
        size: u64,
    },
    RemoveBuffer {
        name: String,
    },
    DownloadBuffer {
        name: String,
    },
    Shutdown,
}

impl Message {
    /// The wire tag for this message.
    pub fn tag(&self) -> u32 {
        match self {
            Message::Null => TAG_NULL,
            Message::KernelSource { .. } => TAG_KERNEL_SOURCE,
            Message::KernelInvoke { .. } => TAG_KERNEL_INVOKE,
            Message::MakeBuffer { .. } => TAG_MAKE_BUFFER,
            Message::RemoveBuffer { .. } => TAG_REMOVE_BUFFER,
            Message::DownloadBuffer { .. } => TAG_DOWNLOAD_BUFFER,
            Message::Shutdown => TAG_SHUTDOWN,
        }
    }
}

/// Returns a human-readable name for a message tag.
pub fn tag_name(tag: u32) -> &'static str {
    match tag {
        TAG_NULL => "Null",
        TAG_KERNEL_SOURCE => "KernelSource",
        TAG_KERNEL_INVOKE => "KernelInvoke",
        TAG_MAKE_BUFFER => "MakeBuffer",
        TAG_REMOVE_BUFFER => "RemoveBuffer",
        TAG_DOWNLOAD_BUFFER => "DownloadBuffer",
        TAG_SHUTDOWN => "Shutdown",
        _ => "unknown",
    }
}

/// Encode one message into `dst`.
///
/// All multi-byte integers are little-endian; strings are a `u32` byte
/// length followed by UTF-8 bytes. The argument list is a sequence of
/// `i32` length tags closed by a `0` terminator.
pub fn encode_message(msg: &Message, dst: &mut BytesMut) -> Result<()> {
    dst.put_u32_le(msg.tag());
    match msg {
        Message::Null | Message::Shutdown => {}
        Message::KernelSource { fragments } => {
            if fragments.len() > MAX_FRAGMENTS {
                return Err(WireError::TooLarge {
                    size: fragments.len(),
                    max: MAX_FRAGMENTS,
                });
            }
            dst.put_u32_le(fragments.len() as u32);
            for fragment in fragments {
                put_string(fragment, dst)?;
            }
        }
        Message::KernelInvoke {
            kernel,
            extent,
            args,
        } => {
            put_string(kernel, dst)?;
            dst.put_u64_le(extent.width);
            dst.put_u64_le(extent.height);
            for arg in args {
                match arg {
                    Arg::BufferRef(name) => {
                        dst.put_i32_le(ARG_BUFFER_REF);
                        put_string(name, dst)?;
                    }
                    Arg::Geometry => dst.put_i32_le(ARG_GEOMETRY),
                    Arg::Inline(bytes) => {
                        if bytes.is_empty() {
                            // A zero length would read back as the terminator.
                            return Err(WireError::InvalidArgLength(0));
                        }
                        if bytes.len() > MAX_PAYLOAD {
                            return Err(WireError::TooLarge {
                                size: bytes.len(),
                                max: MAX_PAYLOAD,
                            });
                        }
                        dst.put_i32_le(bytes.len() as i32);
                        dst.put_slice(bytes);
                    }
                }
            }
            dst.put_i32_le(ARG_TERMINATOR);
        }
        Message::MakeBuffer { name, size } => {
            put_string(name, dst)?;
            dst.put_u64_le(*size);
        }
        Message::RemoveBuffer { name } | Message::DownloadBuffer { name } => {
            put_string(name, dst)?;
        }
    }
    Ok(())
}

fn put_string(value: &str, dst: &mut BytesMut) -> Result<()> {
    if value.len() > MAX_PAYLOAD {
        return Err(WireError::TooLarge {
            size: value.len(),
            max: MAX_PAYLOAD,
        });
    }
    dst.put_u32_le(value.len() as u32);
    dst.put_slice(value.as_bytes());
    Ok(())
}
