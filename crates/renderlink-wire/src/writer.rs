use std::io::{ErrorKind, Write};

use bytes::BytesMut;

use crate::error::{Result, WireError};
use crate::message::{encode_message, Message, ACK_OK};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Write a single acknowledgement status byte.
pub fn write_ack<W: Write>(w: &mut W) -> Result<()> {
    write_all(w, &[ACK_OK])?;
    flush(w)
}

/// Write a length-prefixed blob (the `DownloadBuffer` reply).
pub fn write_blob<W: Write>(w: &mut W, data: &[u8]) -> Result<()> {
    write_all(w, &(data.len() as u64).to_le_bytes())?;
    write_all(w, data)?;
    flush(w)
}

/// Encode and write one message.
pub fn write_message<W: Write>(w: &mut W, msg: &Message) -> Result<()> {
    let mut buf = BytesMut::new();
    encode_message(msg, &mut buf)?;
    write_all(w, &buf)?;
    flush(w)
}

fn write_all<W: Write>(w: &mut W, data: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < data.len() {
        match w.write(&data[offset..]) {
            Ok(0) => return Err(WireError::Disconnected),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(WireError::Io(err)),
        }
    }
    Ok(())
}

fn flush<W: Write>(w: &mut W) -> Result<()> {
    loop {
        match w.flush() {
            Ok(()) => return Ok(()),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) => return Err(WireError::Io(err)),
        }
    }
}

/// Writes complete messages to any `Write` stream.
///
/// Owns a reusable encode buffer, so a control node streaming many
/// invocations per frame does not reallocate per message.
pub struct MessageWriter<W> {
    inner: W,
    buf: BytesMut,
}

impl<W: Write> MessageWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
        }
    }

    /// Encode and write one message (blocking).
    pub fn write_message(&mut self, msg: &Message) -> Result<()> {
        self.buf.clear();
        encode_message(msg, &mut self.buf)?;
        write_all(&mut self.inner, &self.buf)?;
        flush(&mut self.inner)
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::Bytes;

    use super::*;
    use crate::message::{Arg, Extent2d};
    use crate::reader::{read_blob, read_message, read_status};

    #[test]
    fn write_message_decodes_back() {
        let mut writer = MessageWriter::new(Cursor::new(Vec::<u8>::new()));
        let msg = Message::KernelInvoke {
            kernel: "k".to_string(),
            extent: Extent2d::new(4, 4),
            args: vec![Arg::Inline(Bytes::from_static(b"abcd"))],
        };
        writer.write_message(&msg).unwrap();

        let wire = writer.into_inner().into_inner();
        assert_eq!(read_message(&mut Cursor::new(wire)).unwrap(), msg);
    }

    #[test]
    fn ack_and_blob_decode_back() {
        let mut wire = Vec::new();
        write_ack(&mut wire).unwrap();
        write_blob(&mut wire, &[1, 2, 3]).unwrap();

        let mut cursor = Cursor::new(wire);
        assert_eq!(read_status(&mut cursor).unwrap(), ACK_OK);
        assert_eq!(read_blob(&mut cursor).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn empty_blob_is_just_a_length() {
        let mut wire = Vec::new();
        write_blob(&mut wire, &[]).unwrap();
        assert_eq!(wire.len(), 8);
        assert!(read_blob(&mut Cursor::new(wire)).unwrap().is_empty());
    }

    #[test]
    fn short_writes_are_retried() {
        struct OneBytePerWrite(Vec<u8>);
        impl Write for OneBytePerWrite {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if buf.is_empty() {
                    return Ok(0);
                }
                self.0.push(buf[0]);
                Ok(1)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut writer = MessageWriter::new(OneBytePerWrite(Vec::new()));
        let msg = Message::RemoveBuffer {
            name: "buf".to_string(),
        };
        writer.write_message(&msg).unwrap();

        let wire = writer.into_inner().0;
        assert_eq!(read_message(&mut Cursor::new(wire)).unwrap(), msg);
    }

    #[test]
    fn zero_write_reports_disconnected() {
        struct ZeroWriter;
        impl Write for ZeroWriter {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Ok(0)
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let err = write_message(&mut ZeroWriter, &Message::Null).unwrap_err();
        assert!(matches!(err, WireError::Disconnected));
    }

    #[test]
    fn interrupted_write_retries() {
        struct InterruptedOnce {
            tripped: bool,
            data: Vec<u8>,
        }
        impl Write for InterruptedOnce {
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                if !self.tripped {
                    self.tripped = true;
                    return Err(std::io::Error::from(ErrorKind::Interrupted));
                }
                self.data.extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut sink = InterruptedOnce {
            tripped: false,
            data: Vec::new(),
        };
        write_message(&mut sink, &Message::Shutdown).unwrap();
        assert_eq!(
            read_message(&mut Cursor::new(sink.data)).unwrap(),
            Message::Shutdown
        );
    }
}
