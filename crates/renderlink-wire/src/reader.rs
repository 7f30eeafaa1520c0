use std::io::{ErrorKind, Read};

use bytes::Bytes;
use tracing::warn;

use crate::error::{Result, WireError};
use crate::message::{
    Arg, Extent2d, Message, ARG_BUFFER_REF, ARG_GEOMETRY, ARG_TERMINATOR, MAX_FRAGMENTS,
    MAX_PAYLOAD, TAG_DOWNLOAD_BUFFER, TAG_KERNEL_INVOKE, TAG_KERNEL_SOURCE, TAG_MAKE_BUFFER,
    TAG_NULL, TAG_REMOVE_BUFFER, TAG_SHUTDOWN,
};

/// Decode exactly one message from `r`.
///
/// The stream is consumed forward-only, one field at a time; nothing is
/// buffered or backtracked. EOF before the first tag byte is
/// [`WireError::Disconnected`] (the peer left at a message boundary);
/// EOF anywhere later is [`WireError::Truncated`].
pub fn read_message<R: Read>(r: &mut R) -> Result<Message> {
    let tag = read_tag(r)?;
    match tag {
        TAG_NULL => Ok(Message::Null),
        TAG_KERNEL_SOURCE => {
            let count = read_u32(r)? as usize;
            if count > MAX_FRAGMENTS {
                return Err(WireError::TooLarge {
                    size: count,
                    max: MAX_FRAGMENTS,
                });
            }
            let mut fragments = Vec::with_capacity(count);
            for _ in 0..count {
                fragments.push(read_string(r)?);
            }
            Ok(Message::KernelSource { fragments })
        }
        TAG_KERNEL_INVOKE => {
            let kernel = read_string(r)?;
            let extent = Extent2d::new(read_u64(r)?, read_u64(r)?);
            let mut args = Vec::new();
            loop {
                match read_arg(r)? {
                    Some(arg) => args.push(arg),
                    None => break,
                }
            }
            Ok(Message::KernelInvoke {
                kernel,
                extent,
                args,
            })
        }
        TAG_MAKE_BUFFER => {
            let name = read_string(r)?;
            let size = read_u64(r)?;
            Ok(Message::MakeBuffer { name, size })
        }
        TAG_REMOVE_BUFFER => Ok(Message::RemoveBuffer {
            name: read_string(r)?,
        }),
        TAG_DOWNLOAD_BUFFER => Ok(Message::DownloadBuffer {
            name: read_string(r)?,
        }),
        TAG_SHUTDOWN => Ok(Message::Shutdown),
        other => {
            warn!(tag = other, "unknown message tag");
            Err(WireError::UnknownTag(other))
        }
    }
}

/// Read a single status byte (the worker's acknowledgement).
pub fn read_status<R: Read>(r: &mut R) -> Result<u8> {
    let mut byte = [0u8; 1];
    read_exact(r, &mut byte)?;
    Ok(byte[0])
}

/// Read a length-prefixed blob (the worker's `DownloadBuffer` reply).
pub fn read_blob<R: Read>(r: &mut R) -> Result<Vec<u8>> {
    let len = read_u64(r)? as usize;
    if len > MAX_PAYLOAD {
        return Err(WireError::TooLarge {
            size: len,
            max: MAX_PAYLOAD,
        });
    }
    let mut data = vec![0u8; len];
    read_exact(r, &mut data)?;
    Ok(data)
}

/// One argument-list entry; `None` is the terminator.
fn read_arg<R: Read>(r: &mut R) -> Result<Option<Arg>> {
    let len = read_i32(r)?;
    match len {
        ARG_TERMINATOR => Ok(None),
        ARG_BUFFER_REF => Ok(Some(Arg::BufferRef(read_string(r)?))),
        ARG_GEOMETRY => Ok(Some(Arg::Geometry)),
        n if n > 0 => {
            let size = n as usize;
            if size > MAX_PAYLOAD {
                return Err(WireError::TooLarge {
                    size,
                    max: MAX_PAYLOAD,
                });
            }
            let mut data = vec![0u8; size];
            read_exact(r, &mut data)?;
            Ok(Some(Arg::Inline(Bytes::from(data))))
        }
        other => Err(WireError::InvalidArgLength(other)),
    }
}

/// Read the message tag, distinguishing a clean disconnect (EOF before
/// any byte) from a truncated tag.
fn read_tag<R: Read>(r: &mut R) -> Result<u32> {
    let mut first = [0u8; 1];
    loop {
        match r.read(&mut first) {
            Ok(0) => return Err(WireError::Disconnected),
            Ok(_) => break,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(WireError::Io(err)),
        }
    }
    let mut rest = [0u8; 3];
    read_exact(r, &mut rest)?;
    Ok(u32::from_le_bytes([first[0], rest[0], rest[1], rest[2]]))
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_i32<R: Read>(r: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_string<R: Read>(r: &mut R) -> Result<String> {
    let len = read_u32(r)? as usize;
    if len > MAX_PAYLOAD {
        return Err(WireError::TooLarge {
            size: len,
            max: MAX_PAYLOAD,
        });
    }
    let mut data = vec![0u8; len];
    read_exact(r, &mut data)?;
    Ok(String::from_utf8(data)?)
}

fn read_exact<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    match r.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(WireError::Truncated),
        Err(err) => Err(WireError::Io(err)),
    }
}

/// Reads complete messages from any `Read` stream.
///
/// Thin ownership wrapper over [`read_message`] for callers that hold
/// the stream long-term, such as a control node draining replies.
pub struct MessageReader<R> {
    inner: R,
}

impl<R: Read> MessageReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// Read the next complete message (blocking).
    pub fn read_message(&mut self) -> Result<Message> {
        read_message(&mut self.inner)
    }

    /// Read a worker status byte (blocking).
    pub fn read_status(&mut self) -> Result<u8> {
        read_status(&mut self.inner)
    }

    /// Read a download reply (blocking).
    pub fn read_blob(&mut self) -> Result<Vec<u8>> {
        read_blob(&mut self.inner)
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
