use std::collections::HashMap;

use renderlink_wire::{Arg, Extent2d};
use tracing::debug;

use crate::backend::{BackendError, ComputeBackend};
use crate::viewport::ViewportSource;

/// Failures scoped to a single protocol message.
///
/// None of these require tearing the session down; the transport policy
/// around them (ack withheld, connection closed) lives in the dispatch
/// loop, not here.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The named kernel does not exist in the current program, or no
    /// program is loaded.
    #[error("no kernel named {name:?} in the current program")]
    UnknownKernel { name: String },

    /// The named buffer does not exist in this session.
    #[error("no buffer named {name:?}")]
    UnknownBuffer { name: String },

    /// A buffer with this name already exists.
    #[error("buffer {name:?} already exists")]
    DuplicateName { name: String },

    /// Program compilation failed; the backend build log is preserved.
    #[error("program compilation failed: {0}")]
    Compile(#[source] BackendError),

    /// The backend rejected an argument binding.
    #[error("argument binding failed for kernel {kernel:?}: {source}")]
    ArgBind {
        kernel: String,
        #[source]
        source: BackendError,
    },

    /// Kernel dispatch failed.
    #[error("launch failed for kernel {kernel:?}: {source}")]
    Launch {
        kernel: String,
        #[source]
        source: BackendError,
    },

    /// Device allocation failed.
    #[error("buffer allocation failed for {name:?}: {source}")]
    Alloc {
        name: String,
        #[source]
        source: BackendError,
    },

    /// Buffer read-back failed.
    #[error("buffer read-back failed for {name:?}: {source}")]
    Download {
        name: String,
        #[source]
        source: BackendError,
    },
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Per-connection compute state: one context, zero-or-one program, and
/// the session's named kernels and buffers.
///
/// Kernel handles are resolved lazily from the current program and
/// cached by name; replacing the program drops the whole cache, so
/// later invocations can only resolve against the new program. Buffers
/// outlive any single invocation and are freed on removal or when the
/// session drops.
pub struct Session<B: ComputeBackend> {
    backend: B,
    program: Option<B::Program>,
    kernels: HashMap<String, B::Kernel>,
    buffers: HashMap<String, B::Buffer>,
}

impl<B: ComputeBackend> Session<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            program: None,
            kernels: HashMap::new(),
            buffers: HashMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Whether a program is currently loaded.
    pub fn has_program(&self) -> bool {
        self.program.is_some()
    }

    /// Whether the named buffer exists.
    pub fn has_buffer(&self, name: &str) -> bool {
        self.buffers.contains_key(name)
    }

    /// Compile a new program from `fragments`, replacing any existing
    /// program and invalidating its kernels. A failed compile leaves
    /// the previous program in place.
    pub fn load_program(&mut self, fragments: &[String]) -> Result<()> {
        let program = self
            .backend
            .compile(fragments)
            .map_err(SessionError::Compile)?;
        debug!(fragments = fragments.len(), "program replaced");
        self.program = Some(program);
        self.kernels.clear();
        Ok(())
    }

    /// Bind `args` in order and launch the named kernel over `extent`.
    ///
    /// A geometry argument polls `viewport` once and occupies four
    /// consecutive indices (x, y, width, height as little-endian i32).
    pub fn invoke(
        &mut self,
        name: &str,
        extent: Extent2d,
        args: &[Arg],
        viewport: &dyn ViewportSource,
    ) -> Result<()> {
        let program = self.program.as_ref().ok_or_else(|| SessionError::UnknownKernel {
            name: name.to_string(),
        })?;

        if !self.kernels.contains_key(name) {
            let kernel = self.backend.lookup_kernel(program, name).ok_or_else(|| {
                SessionError::UnknownKernel {
                    name: name.to_string(),
                }
            })?;
            self.kernels.insert(name.to_string(), kernel);
        }
        let kernel = self
            .kernels
            .get_mut(name)
            .ok_or_else(|| SessionError::UnknownKernel {
                name: name.to_string(),
            })?;

        let mut index: u32 = 0;
        for arg in args {
            match arg {
                Arg::Inline(bytes) => {
                    self.backend
                        .bind_value(kernel, index, bytes)
                        .map_err(|source| SessionError::ArgBind {
                            kernel: name.to_string(),
                            source,
                        })?;
                    index += 1;
                }
                Arg::BufferRef(buffer_name) => {
                    let buffer = self.buffers.get(buffer_name).ok_or_else(|| {
                        SessionError::UnknownBuffer {
                            name: buffer_name.clone(),
                        }
                    })?;
                    self.backend
                        .bind_buffer(kernel, index, buffer)
                        .map_err(|source| SessionError::ArgBind {
                            kernel: name.to_string(),
                            source,
                        })?;
                    index += 1;
                }
                Arg::Geometry => {
                    let vp = viewport.current_viewport();
                    for value in [vp.x, vp.y, vp.width, vp.height] {
                        self.backend
                            .bind_value(kernel, index, &value.to_le_bytes())
                            .map_err(|source| SessionError::ArgBind {
                                kernel: name.to_string(),
                                source,
                            })?;
                        index += 1;
                    }
                }
            }
        }

        debug!(kernel = name, ?extent, args = args.len(), "launch");
        self.backend
            .launch(kernel, extent)
            .map_err(|source| SessionError::Launch {
                kernel: name.to_string(),
                source,
            })
    }

    /// Allocate a named device buffer.
    pub fn create_buffer(&mut self, name: &str, size: u64) -> Result<()> {
        if self.buffers.contains_key(name) {
            return Err(SessionError::DuplicateName {
                name: name.to_string(),
            });
        }
        let buffer = self
            .backend
            .alloc_buffer(size)
            .map_err(|source| SessionError::Alloc {
                name: name.to_string(),
                source,
            })?;
        debug!(name, size, "buffer created");
        self.buffers.insert(name.to_string(), buffer);
        Ok(())
    }

    /// Release a named device buffer.
    pub fn remove_buffer(&mut self, name: &str) -> Result<()> {
        let buffer = self
            .buffers
            .remove(name)
            .ok_or_else(|| SessionError::UnknownBuffer {
                name: name.to_string(),
            })?;
        self.backend.free_buffer(buffer);
        debug!(name, "buffer removed");
        Ok(())
    }

    /// Read a named buffer back to host memory.
    pub fn download_buffer(&mut self, name: &str) -> Result<Vec<u8>> {
        let buffer = self
            .buffers
            .get(name)
            .ok_or_else(|| SessionError::UnknownBuffer {
                name: name.to_string(),
            })?;
        self.backend
            .read_buffer(buffer)
            .map_err(|source| SessionError::Download {
                name: name.to_string(),
                source,
            })
    }
}

impl<B: ComputeBackend> Drop for Session<B> {
    fn drop(&mut self) {
        for (_, buffer) in self.buffers.drain() {
            self.backend.free_buffer(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use renderlink_wire::Arg;

    use super::*;
    use crate::host::{BoundArg, HostBackend};
    use crate::viewport::{FixedViewport, Viewport};

    const PROGRAM: &str = "kernel void render(global float* out) {}\n\
                           kernel void clear(global float* out) {}";

    fn session_with_program() -> Session<HostBackend> {
        let mut session = Session::new(HostBackend::new());
        session.load_program(&[PROGRAM.to_string()]).unwrap();
        session
    }

    fn viewport() -> FixedViewport {
        FixedViewport(Viewport::new(1920, 0, 960, 1080))
    }

    #[test]
    fn invoke_without_program_is_unknown_kernel() {
        let mut session = Session::new(HostBackend::new());
        let err = session
            .invoke("render", Extent2d::new(8, 8), &[], &viewport())
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownKernel { .. }));
    }

    #[test]
    fn invoke_unknown_kernel_leaves_session_intact() {
        let mut session = session_with_program();
        session.create_buffer("fb", 64).unwrap();

        let err = session
            .invoke("missing", Extent2d::new(8, 8), &[], &viewport())
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownKernel { name } if name == "missing"));

        // Program and buffers untouched by the failure.
        assert!(session.has_program());
        assert!(session.has_buffer("fb"));
        session
            .invoke("render", Extent2d::new(8, 8), &[], &viewport())
            .unwrap();
    }

    #[test]
    fn geometry_expands_to_four_consecutive_ints() {
        let mut session = session_with_program();
        session
            .invoke(
                "render",
                Extent2d::new(8, 8),
                &[
                    Arg::Inline(bytes::Bytes::from_static(&[0xAA])),
                    Arg::Geometry,
                    Arg::Inline(bytes::Bytes::from_static(&[0xBB])),
                ],
                &viewport(),
            )
            .unwrap();

        let record = &session.backend().launches()[0];
        let expected = [
            (0, BoundArg::Value(vec![0xAA])),
            (1, BoundArg::Value(1920i32.to_le_bytes().to_vec())),
            (2, BoundArg::Value(0i32.to_le_bytes().to_vec())),
            (3, BoundArg::Value(960i32.to_le_bytes().to_vec())),
            (4, BoundArg::Value(1080i32.to_le_bytes().to_vec())),
            (5, BoundArg::Value(vec![0xBB])),
        ];
        assert_eq!(record.args, expected);
    }

    #[test]
    fn buffer_ref_resolves_to_live_buffer() {
        let mut session = session_with_program();
        session.create_buffer("fb", 128).unwrap();
        session
            .invoke(
                "render",
                Extent2d::new(4, 4),
                &[Arg::BufferRef("fb".to_string())],
                &viewport(),
            )
            .unwrap();

        let record = &session.backend().launches()[0];
        assert!(matches!(record.args[0], (0, BoundArg::Buffer(_))));
    }

    #[test]
    fn buffer_ref_to_missing_buffer_fails() {
        let mut session = session_with_program();
        let err = session
            .invoke(
                "render",
                Extent2d::new(4, 4),
                &[Arg::BufferRef("nope".to_string())],
                &viewport(),
            )
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownBuffer { name } if name == "nope"));
        // The failed invocation must not have launched.
        assert!(session.backend().launches().is_empty());
    }

    #[test]
    fn program_replacement_is_total() {
        let mut session = session_with_program();
        session
            .invoke("render", Extent2d::new(2, 2), &[], &viewport())
            .unwrap();

        session
            .load_program(&["kernel void other() {}".to_string()])
            .unwrap();

        // Old kernels resolve against the new program only.
        let err = session
            .invoke("render", Extent2d::new(2, 2), &[], &viewport())
            .unwrap_err();
        assert!(matches!(err, SessionError::UnknownKernel { .. }));
        session
            .invoke("other", Extent2d::new(2, 2), &[], &viewport())
            .unwrap();
    }

    #[test]
    fn failed_compile_preserves_previous_program() {
        let mut session = session_with_program();
        let err = session
            .load_program(&["#error no device\n".to_string()])
            .unwrap_err();
        assert!(matches!(err, SessionError::Compile(_)));
        // The old program still answers.
        session
            .invoke("render", Extent2d::new(2, 2), &[], &viewport())
            .unwrap();
    }

    #[test]
    fn duplicate_buffer_name_is_rejected() {
        let mut session = session_with_program();
        session.create_buffer("fb", 16).unwrap();
        let err = session.create_buffer("fb", 16).unwrap_err();
        assert!(matches!(err, SessionError::DuplicateName { .. }));
    }

    #[test]
    fn remove_and_download_unknown_buffer_fail() {
        let mut session = session_with_program();
        assert!(matches!(
            session.remove_buffer("nope").unwrap_err(),
            SessionError::UnknownBuffer { .. }
        ));
        assert!(matches!(
            session.download_buffer("nope").unwrap_err(),
            SessionError::UnknownBuffer { .. }
        ));
    }

    #[test]
    fn download_returns_buffer_contents() {
        let mut session = session_with_program();
        session.create_buffer("fb", 4).unwrap();
        assert_eq!(session.download_buffer("fb").unwrap(), vec![0u8; 4]);
    }

    #[test]
    fn dropping_session_frees_buffers() {
        use std::cell::Cell;
        use std::rc::Rc;

        struct CountingBackend {
            inner: HostBackend,
            freed: Rc<Cell<usize>>,
        }

        impl ComputeBackend for CountingBackend {
            type Program = <HostBackend as ComputeBackend>::Program;
            type Kernel = <HostBackend as ComputeBackend>::Kernel;
            type Buffer = <HostBackend as ComputeBackend>::Buffer;

            fn compile(&mut self, fragments: &[String]) -> std::result::Result<Self::Program, BackendError> {
                self.inner.compile(fragments)
            }
            fn lookup_kernel(&mut self, program: &Self::Program, name: &str) -> Option<Self::Kernel> {
                self.inner.lookup_kernel(program, name)
            }
            fn bind_value(
                &mut self,
                kernel: &mut Self::Kernel,
                index: u32,
                bytes: &[u8],
            ) -> std::result::Result<(), BackendError> {
                self.inner.bind_value(kernel, index, bytes)
            }
            fn bind_buffer(
                &mut self,
                kernel: &mut Self::Kernel,
                index: u32,
                buffer: &Self::Buffer,
            ) -> std::result::Result<(), BackendError> {
                self.inner.bind_buffer(kernel, index, buffer)
            }
            fn launch(
                &mut self,
                kernel: &mut Self::Kernel,
                extent: Extent2d,
            ) -> std::result::Result<(), BackendError> {
                self.inner.launch(kernel, extent)
            }
            fn alloc_buffer(&mut self, size: u64) -> std::result::Result<Self::Buffer, BackendError> {
                self.inner.alloc_buffer(size)
            }
            fn read_buffer(&mut self, buffer: &Self::Buffer) -> std::result::Result<Vec<u8>, BackendError> {
                self.inner.read_buffer(buffer)
            }
            fn free_buffer(&mut self, buffer: Self::Buffer) {
                self.freed.set(self.freed.get() + 1);
                self.inner.free_buffer(buffer);
            }
        }

        let freed = Rc::new(Cell::new(0));
        let mut session = Session::new(CountingBackend {
            inner: HostBackend::new(),
            freed: Rc::clone(&freed),
        });
        session.create_buffer("a", 8).unwrap();
        session.create_buffer("b", 8).unwrap();
        drop(session);
        assert_eq!(freed.get(), 2);
    }

    #[test]
    fn removed_buffer_is_freed_in_backend() {
        let mut session = session_with_program();
        session.create_buffer("fb", 8).unwrap();
        assert_eq!(session.backend().live_buffers(), 1);
        session.remove_buffer("fb").unwrap();
        assert_eq!(session.backend().live_buffers(), 0);
    }
}
