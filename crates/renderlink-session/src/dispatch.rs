//! Cooperative dispatch loop for one control connection.
//!
//! Designed to be driven once per host frame tick: each activation
//! drains whatever messages are ready right now and returns without
//! ever blocking on an idle stream, so a render or presentation cycle
//! sharing the thread is never stalled by the network.

use std::io::{Read, Write};
use std::os::fd::AsRawFd;

use renderlink_net::readable_now;
use renderlink_wire::{read_message, write_ack, write_blob, Message, WireError};
use tracing::{debug, warn};

use crate::backend::ComputeBackend;
use crate::session::{Session, SessionError};
use crate::viewport::ViewportSource;

/// Result of one dispatch activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// No data was ready; nothing applied.
    Idle,
    /// Applied this many messages, then the stream ran dry.
    Applied(usize),
    /// The peer requested shutdown; the loop is closed.
    Shutdown,
    /// The peer disconnected; the loop is closed.
    Disconnected,
}

/// Connection lifecycle. `Closed` and `Faulted` are terminal; a new
/// connection starts a fresh loop and a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Open,
    Closed,
    Faulted,
}

/// Errors that fault the dispatch loop.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Malformed or undeliverable wire traffic.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// The session rejected a message.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// The readiness check itself failed.
    #[error("readiness poll failed: {0}")]
    Poll(#[from] std::io::Error),

    /// `tick` was called after the loop already faulted.
    #[error("dispatch loop already faulted")]
    Faulted,
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// Binds one stream, one compute session, and one viewport source.
pub struct WorkerLoop<S, B: ComputeBackend, V> {
    stream: S,
    session: Session<B>,
    viewport: V,
    state: LoopState,
}

impl<S, B, V> WorkerLoop<S, B, V>
where
    S: Read + Write + AsRawFd,
    B: ComputeBackend,
    V: ViewportSource,
{
    pub fn new(stream: S, session: Session<B>, viewport: V) -> Self {
        Self {
            stream,
            session,
            viewport,
            state: LoopState::Open,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn session(&self) -> &Session<B> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<B> {
        &mut self.session
    }

    /// Drain and apply every message that is ready right now.
    ///
    /// Messages are applied strictly in arrival order — later
    /// invocations may depend on buffers created by earlier messages.
    /// Any error terminates the connection: there is no
    /// resynchronization marker in the stream, and the protocol has no
    /// negative-acknowledgement form.
    pub fn tick(&mut self) -> Result<Activation> {
        match self.state {
            LoopState::Open => {}
            LoopState::Closed => return Ok(Activation::Disconnected),
            LoopState::Faulted => return Err(DispatchError::Faulted),
        }

        match self.drain() {
            Ok(activation) => Ok(activation),
            Err(err) => {
                self.state = LoopState::Faulted;
                warn!(error = %err, "dispatch fault; terminating connection");
                Err(err)
            }
        }
    }

    fn drain(&mut self) -> Result<Activation> {
        let mut applied = 0usize;
        loop {
            if !readable_now(&self.stream)? {
                break;
            }

            let msg = match read_message(&mut self.stream) {
                Ok(msg) => msg,
                Err(WireError::Disconnected) => {
                    self.state = LoopState::Closed;
                    debug!("peer disconnected");
                    return Ok(Activation::Disconnected);
                }
                Err(WireError::Truncated) => {
                    self.state = LoopState::Closed;
                    warn!("peer disconnected mid-message");
                    return Ok(Activation::Disconnected);
                }
                Err(err) => return Err(err.into()),
            };

            debug!(tag = renderlink_wire::tag_name(msg.tag()), "message");
            if let Some(activation) = self.apply(msg)? {
                self.state = LoopState::Closed;
                return Ok(activation);
            }
            applied += 1;
        }

        Ok(if applied == 0 {
            Activation::Idle
        } else {
            Activation::Applied(applied)
        })
    }

    /// Apply one message. Returns `Some` when the message ends the
    /// connection instead of mutating the session.
    fn apply(&mut self, msg: Message) -> Result<Option<Activation>> {
        match msg {
            Message::Null => {}
            Message::Shutdown => return Ok(Some(Activation::Shutdown)),
            Message::KernelSource { fragments } => {
                self.session.load_program(&fragments)?;
                write_ack(&mut self.stream)?;
            }
            Message::KernelInvoke {
                kernel,
                extent,
                args,
            } => {
                self.session
                    .invoke(&kernel, extent, &args, &self.viewport)?;
                write_ack(&mut self.stream)?;
            }
            Message::MakeBuffer { name, size } => {
                self.session.create_buffer(&name, size)?;
                write_ack(&mut self.stream)?;
            }
            Message::RemoveBuffer { name } => {
                self.session.remove_buffer(&name)?;
                write_ack(&mut self.stream)?;
            }
            Message::DownloadBuffer { name } => {
                let data = self.session.download_buffer(&name)?;
                write_blob(&mut self.stream, &data)?;
            }
        }
        Ok(None)
    }
}
