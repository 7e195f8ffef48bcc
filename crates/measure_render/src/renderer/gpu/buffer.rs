//! GPU-resident vertex and index buffers.
//!
//! A buffer tracks how many logical entries are valid (`size`) separately
//! from how many it has storage for (`capacity`). Growing past capacity
//! reallocates; anything smaller is written in place so steady-state frames
//! never reallocate.

use super::error::{check_gl_error, GpuError};
use glow::HasContext;
use std::sync::Arc;

const FLOAT_SIZE: usize = 4;
const INT_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTarget {
    Vertex,
    Index,
}

impl BufferTarget {
    fn gl(self) -> u32 {
        match self {
            BufferTarget::Vertex => glow::ARRAY_BUFFER,
            BufferTarget::Index => glow::ELEMENT_ARRAY_BUFFER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    /// New storage sized to the data.
    Reallocate,
    /// Overwrite the front of the existing storage.
    Update,
    /// Shrink to nothing.
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Upload {
    pub kind: UploadKind,
    pub entries: usize,
}

/// Bookkeeping for one buffer, kept apart from the GL calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub entry_bytes: usize,
    pub size: usize,
    pub capacity: usize,
}

impl Allocation {
    pub fn new(entry_bytes: usize) -> Self {
        Self {
            entry_bytes,
            size: 0,
            capacity: 0,
        }
    }

    /// Decides how `bytes` of new data must be uploaded.
    pub fn plan(&self, bytes: usize) -> Result<Upload, GpuError> {
        if bytes % self.entry_bytes != 0 {
            return Err(GpuError::Misaligned {
                bytes,
                entry_bytes: self.entry_bytes,
            });
        }
        let entries = bytes / self.entry_bytes;
        let kind = if entries > self.capacity {
            UploadKind::Reallocate
        } else if entries > 0 {
            UploadKind::Update
        } else {
            UploadKind::Release
        };
        Ok(Upload { kind, entries })
    }

    /// Records a completed upload.
    pub fn commit(&mut self, upload: Upload) {
        self.size = upload.entries;
        match upload.kind {
            UploadKind::Reallocate => self.capacity = upload.entries,
            UploadKind::Update => {}
            UploadKind::Release => self.capacity = 0,
        }
    }
}

/// Owner of a single GL buffer object. Released only by [`GpuBuffer::close`].
pub struct GpuBuffer {
    gl: Arc<glow::Context>,
    target: BufferTarget,
    raw: Option<glow::Buffer>,
    alloc: Allocation,
}

impl GpuBuffer {
    pub fn new(
        gl: Arc<glow::Context>,
        target: BufferTarget,
        entry_bytes: usize,
        initial: &[u8],
    ) -> Result<Self, GpuError> {
        // Bind no VAO so creating an index buffer cannot rebind another mesh's.
        let raw = unsafe {
            gl.bind_vertex_array(None);
            gl.create_buffer()
        }
        .map_err(|message| GpuError::Create { what: "buffer", message })?;

        let mut buffer = Self {
            gl,
            target,
            raw: Some(raw),
            alloc: Allocation::new(entry_bytes),
        };
        if let Err(e) = buffer.set(initial) {
            buffer.close();
            return Err(e);
        }
        Ok(buffer)
    }

    /// Replaces the buffer contents, reallocating only when they outgrow capacity.
    pub fn set(&mut self, data: &[u8]) -> Result<(), GpuError> {
        let raw = self.raw()?;
        let upload = self.alloc.plan(data.len())?;
        let target = self.target.gl();
        let gl = &self.gl;

        unsafe {
            gl.bind_vertex_array(None);
            gl.bind_buffer(target, Some(raw));
            check_gl_error(gl, "Failed to bind buffer object", "glBindBuffer")?;
            match upload.kind {
                UploadKind::Reallocate => {
                    gl.buffer_data_u8_slice(target, data, glow::DYNAMIC_DRAW);
                    check_gl_error(gl, "Failed to populate buffer object", "glBufferData")?;
                }
                UploadKind::Update => {
                    gl.buffer_sub_data_u8_slice(target, 0, data);
                    check_gl_error(gl, "Failed to populate buffer object", "glBufferSubData")?;
                }
                UploadKind::Release => {
                    gl.buffer_data_size(target, 0, glow::DYNAMIC_DRAW);
                    check_gl_error(gl, "Failed to release buffer storage", "glBufferData")?;
                }
            }
        }

        self.alloc.commit(upload);
        Ok(())
    }

    /// Valid entries.
    pub fn size(&self) -> usize {
        self.alloc.size
    }

    /// Allocated size in entries.
    pub fn capacity(&self) -> usize {
        self.alloc.capacity
    }

    pub fn raw(&self) -> Result<glow::Buffer, GpuError> {
        self.raw.ok_or(GpuError::Freed("buffer"))
    }

    /// Deletes the GL object. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { self.gl.delete_buffer(raw) };
        }
        self.alloc = Allocation::new(self.alloc.entry_bytes);
    }
}

/// Floats grouped into fixed-width vertices.
pub struct VertexBuffer {
    buffer: GpuBuffer,
    entries_per_vertex: usize,
}

impl VertexBuffer {
    pub fn new(
        gl: Arc<glow::Context>,
        entries_per_vertex: usize,
        initial: &[f32],
    ) -> Result<Self, GpuError> {
        check_vertex_layout(initial.len(), entries_per_vertex)?;
        let buffer = GpuBuffer::new(
            gl,
            BufferTarget::Vertex,
            FLOAT_SIZE,
            bytemuck::cast_slice(initial),
        )?;
        Ok(Self {
            buffer,
            entries_per_vertex,
        })
    }

    /// Replaces the contents; the length must be a whole number of vertices.
    pub fn set(&mut self, data: &[f32]) -> Result<(), GpuError> {
        check_vertex_layout(data.len(), self.entries_per_vertex)?;
        self.buffer.set(bytemuck::cast_slice(data))
    }

    pub fn entries_per_vertex(&self) -> usize {
        self.entries_per_vertex
    }

    /// Vertices held after the last `set`.
    pub fn vertex_count(&self) -> usize {
        self.buffer.size() / self.entries_per_vertex
    }

    pub fn raw(&self) -> Result<glow::Buffer, GpuError> {
        self.buffer.raw()
    }

    pub fn close(&mut self) {
        self.buffer.close();
    }
}

fn check_vertex_layout(floats: usize, entries_per_vertex: usize) -> Result<(), GpuError> {
    if entries_per_vertex == 0 || floats % entries_per_vertex != 0 {
        return Err(GpuError::Misaligned {
            bytes: floats * FLOAT_SIZE,
            entry_bytes: entries_per_vertex * FLOAT_SIZE,
        });
    }
    Ok(())
}

/// 32-bit unsigned indices.
pub struct IndexBuffer {
    buffer: GpuBuffer,
}

impl IndexBuffer {
    pub fn new(gl: Arc<glow::Context>, initial: &[u32]) -> Result<Self, GpuError> {
        let buffer = GpuBuffer::new(gl, BufferTarget::Index, INT_SIZE, bytemuck::cast_slice(initial))?;
        Ok(Self { buffer })
    }

    /// Replaces the indices.
    pub fn set(&mut self, indices: &[u32]) -> Result<(), GpuError> {
        self.buffer.set(bytemuck::cast_slice(indices))
    }

    /// Number of indices held.
    pub fn len(&self) -> usize {
        self.buffer.size()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.size() == 0
    }

    pub fn raw(&self) -> Result<glow::Buffer, GpuError> {
        self.buffer.raw()
    }

    pub fn close(&mut self) {
        self.buffer.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(alloc: &mut Allocation, bytes: usize) -> UploadKind {
        let upload = alloc.plan(bytes).unwrap();
        alloc.commit(upload);
        upload.kind
    }

    #[test]
    fn test_non_decreasing_sizes_stop_reallocating() {
        let mut alloc = Allocation::new(4);
        let kinds: Vec<UploadKind> = [8, 16, 16, 16, 32, 32]
            .iter()
            .map(|&b| apply(&mut alloc, b))
            .collect();
        assert_eq!(
            kinds,
            vec![
                UploadKind::Reallocate,
                UploadKind::Reallocate,
                UploadKind::Update,
                UploadKind::Update,
                UploadKind::Reallocate,
                UploadKind::Update,
            ]
        );
        assert_eq!((alloc.size, alloc.capacity), (8, 8));
    }

    #[test]
    fn test_shrink_then_grow_back() {
        let mut alloc = Allocation::new(12);
        apply(&mut alloc, 12 * 10);
        assert_eq!(apply(&mut alloc, 12 * 3), UploadKind::Update);
        assert_eq!((alloc.size, alloc.capacity), (3, 10));
        assert_eq!(apply(&mut alloc, 12 * 10), UploadKind::Update);
        assert_eq!(alloc.size, 10);
    }

    #[test]
    fn test_empty_releases_storage() {
        let mut alloc = Allocation::new(4);
        apply(&mut alloc, 64);
        assert_eq!(apply(&mut alloc, 0), UploadKind::Release);
        assert_eq!((alloc.size, alloc.capacity), (0, 0));
        assert_eq!(apply(&mut alloc, 4), UploadKind::Reallocate);
    }

    #[test]
    fn test_misaligned_data_rejected() {
        let alloc = Allocation::new(4);
        assert!(matches!(
            alloc.plan(6),
            Err(GpuError::Misaligned { bytes: 6, entry_bytes: 4 })
        ));
        assert!(check_vertex_layout(7, 3).is_err());
        assert!(check_vertex_layout(9, 3).is_ok());
        assert!(check_vertex_layout(0, 0).is_err());
    }
}
