use renderlink_wire::Extent2d;

/// Errors surfaced by a compute backend.
///
/// Reasons are free-form text because they originate in driver and
/// compiler diagnostics; the session preserves them for logging.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Program compilation failed; `log` is the backend build log.
    #[error("program build failed: {log}")]
    Compile { log: String },

    /// The backend rejected an argument binding.
    #[error("argument {index} rejected: {reason}")]
    Bind { index: u32, reason: String },

    /// Kernel dispatch failed.
    #[error("kernel launch failed: {reason}")]
    Launch { reason: String },

    /// Device buffer allocation failed.
    #[error("buffer allocation of {size} bytes failed: {reason}")]
    Alloc { size: u64, reason: String },

    /// Reading a buffer back to the host failed.
    #[error("buffer read-back failed: {reason}")]
    Read { reason: String },
}

/// Capability interface to the GPU compute layer.
///
/// The session owns every handle it receives from these methods and is
/// the only caller; implementations need no internal synchronization.
/// The real OpenCL/Vulkan backend lives outside this repository — the
/// in-crate [`HostBackend`](crate::host::HostBackend) implements the
/// same surface in host memory for tests and headless workers.
pub trait ComputeBackend {
    /// Opaque compiled-program handle.
    type Program;
    /// Opaque kernel handle with its pending argument bindings.
    type Kernel;
    /// Opaque device-buffer handle.
    type Buffer;

    /// Compile `fragments` into a single program.
    fn compile(&mut self, fragments: &[String]) -> Result<Self::Program, BackendError>;

    /// Resolve a kernel by name within a compiled program.
    fn lookup_kernel(&mut self, program: &Self::Program, name: &str) -> Option<Self::Kernel>;

    /// Bind raw bytes as the argument at `index`.
    fn bind_value(
        &mut self,
        kernel: &mut Self::Kernel,
        index: u32,
        bytes: &[u8],
    ) -> Result<(), BackendError>;

    /// Bind a device buffer as the argument at `index`.
    fn bind_buffer(
        &mut self,
        kernel: &mut Self::Kernel,
        index: u32,
        buffer: &Self::Buffer,
    ) -> Result<(), BackendError>;

    /// Launch the kernel over a 2D extent.
    fn launch(&mut self, kernel: &mut Self::Kernel, extent: Extent2d) -> Result<(), BackendError>;

    /// Allocate a device buffer of `size` bytes.
    fn alloc_buffer(&mut self, size: u64) -> Result<Self::Buffer, BackendError>;

    /// Read a buffer's contents back into host memory.
    fn read_buffer(&mut self, buffer: &Self::Buffer) -> Result<Vec<u8>, BackendError>;

    /// Release a device buffer.
    fn free_buffer(&mut self, buffer: Self::Buffer);
}
