//! In-memory reference backend.
//!
//! Implements [`ComputeBackend`] without a GPU: programs are compiled by
//! scanning the source for kernel declarations, buffers live in host
//! memory, and every bind and launch is recorded. Tests and the
//! headless CLI worker use it to observe protocol effects directly.

use std::collections::{BTreeMap, HashMap};

use renderlink_wire::Extent2d;

use crate::backend::{BackendError, ComputeBackend};

/// One recorded argument binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundArg {
    Value(Vec<u8>),
    Buffer(u64),
}

/// One recorded kernel launch, with its bindings in index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    pub kernel: String,
    pub extent: Extent2d,
    pub args: Vec<(u32, BoundArg)>,
}

/// Program handle: the kernel names found in the source.
#[derive(Debug, Clone)]
pub struct HostProgram {
    kernels: Vec<String>,
}

/// Kernel handle: name plus pending bindings.
#[derive(Debug, Clone)]
pub struct HostKernel {
    name: String,
    args: BTreeMap<u32, BoundArg>,
}

/// Buffer handle: id into the backend's storage map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostBuffer {
    pub id: u64,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct HostBackend {
    next_buffer_id: u64,
    storage: HashMap<u64, Vec<u8>>,
    launches: Vec<LaunchRecord>,
    compile_count: usize,
}

impl HostBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every launch recorded so far, oldest first.
    pub fn launches(&self) -> &[LaunchRecord] {
        &self.launches
    }

    /// How many programs have been compiled in this backend's lifetime.
    pub fn compile_count(&self) -> usize {
        self.compile_count
    }

    /// Number of live buffer allocations.
    pub fn live_buffers(&self) -> usize {
        self.storage.len()
    }

    /// Overwrite a buffer's contents, as a kernel writing it would.
    pub fn fill_buffer(&mut self, buffer: &HostBuffer, data: &[u8]) {
        if let Some(slot) = self.storage.get_mut(&buffer.id) {
            let n = slot.len().min(data.len());
            slot[..n].copy_from_slice(&data[..n]);
        }
    }
}

impl ComputeBackend for HostBackend {
    type Program = HostProgram;
    type Kernel = HostKernel;
    type Buffer = HostBuffer;

    fn compile(&mut self, fragments: &[String]) -> Result<Self::Program, BackendError> {
        let mut kernels = Vec::new();
        for fragment in fragments {
            if let Some(line) = fragment.lines().find(|l| l.trim_start().starts_with("#error")) {
                return Err(BackendError::Compile {
                    log: line.trim().to_string(),
                });
            }
            kernels.extend(scan_kernel_names(fragment));
        }
        self.compile_count += 1;
        Ok(HostProgram { kernels })
    }

    fn lookup_kernel(&mut self, program: &Self::Program, name: &str) -> Option<Self::Kernel> {
        if program.kernels.iter().any(|k| k == name) {
            Some(HostKernel {
                name: name.to_string(),
                args: BTreeMap::new(),
            })
        } else {
            None
        }
    }

    fn bind_value(
        &mut self,
        kernel: &mut Self::Kernel,
        index: u32,
        bytes: &[u8],
    ) -> Result<(), BackendError> {
        kernel.args.insert(index, BoundArg::Value(bytes.to_vec()));
        Ok(())
    }

    fn bind_buffer(
        &mut self,
        kernel: &mut Self::Kernel,
        index: u32,
        buffer: &Self::Buffer,
    ) -> Result<(), BackendError> {
        if !self.storage.contains_key(&buffer.id) {
            return Err(BackendError::Bind {
                index,
                reason: format!("buffer {} is not live", buffer.id),
            });
        }
        kernel.args.insert(index, BoundArg::Buffer(buffer.id));
        Ok(())
    }

    fn launch(&mut self, kernel: &mut Self::Kernel, extent: Extent2d) -> Result<(), BackendError> {
        if extent.width == 0 || extent.height == 0 {
            return Err(BackendError::Launch {
                reason: format!("degenerate extent {}x{}", extent.width, extent.height),
            });
        }
        self.launches.push(LaunchRecord {
            kernel: kernel.name.clone(),
            extent,
            args: kernel.args.iter().map(|(i, a)| (*i, a.clone())).collect(),
        });
        kernel.args.clear();
        Ok(())
    }

    fn alloc_buffer(&mut self, size: u64) -> Result<Self::Buffer, BackendError> {
        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.storage.insert(id, vec![0u8; size as usize]);
        Ok(HostBuffer { id, size })
    }

    fn read_buffer(&mut self, buffer: &Self::Buffer) -> Result<Vec<u8>, BackendError> {
        self.storage
            .get(&buffer.id)
            .cloned()
            .ok_or_else(|| BackendError::Read {
                reason: format!("buffer {} is not live", buffer.id),
            })
    }

    fn free_buffer(&mut self, buffer: Self::Buffer) {
        self.storage.remove(&buffer.id);
    }
}

/// Find `kernel void <name>(` declarations across a source fragment.
fn scan_kernel_names(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut tokens = source.split_whitespace().peekable();
    while let Some(token) = tokens.next() {
        if token != "kernel" && token != "__kernel" {
            continue;
        }
        if tokens.peek() != Some(&"void") {
            continue;
        }
        tokens.next();
        if let Some(decl) = tokens.next() {
            let name: String = decl
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !name.is_empty() {
                names.push(name);
            }
        }
    }
    names
}
