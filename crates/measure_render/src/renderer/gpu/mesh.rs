use super::{
    buffer::{IndexBuffer, VertexBuffer},
    error::{check_gl_error, GpuError},
};
use glow::HasContext;
use std::sync::Arc;

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMode {
    Points,
    LineStrip,
    LineLoop,
    Lines,
    TriangleStrip,
    TriangleFan,
    Triangles,
}

impl PrimitiveMode {
    fn gl(self) -> u32 {
        match self {
            PrimitiveMode::Points => glow::POINTS,
            PrimitiveMode::LineStrip => glow::LINE_STRIP,
            PrimitiveMode::LineLoop => glow::LINE_LOOP,
            PrimitiveMode::Lines => glow::LINES,
            PrimitiveMode::TriangleStrip => glow::TRIANGLE_STRIP,
            PrimitiveMode::TriangleFan => glow::TRIANGLE_FAN,
            PrimitiveMode::Triangles => glow::TRIANGLES,
        }
    }
}

/// Vertex count shared by all buffers of a non-indexed mesh.
pub fn common_vertex_count(counts: &[usize]) -> Result<usize, GpuError> {
    let expected = counts.first().copied().unwrap_or(0);
    match counts.iter().enumerate().skip(1).find(|&(_, &c)| c != expected) {
        Some((index, &actual)) => Err(GpuError::VertexCountMismatch {
            expected,
            index,
            actual,
        }),
        None => Ok(expected),
    }
}

/// A drawable: one VAO over 1..N vertex buffers and an optional index buffer.
///
/// Vertex buffer `i` feeds attribute location `i`, tightly packed floats.
/// The mesh owns its buffers and releases them in [`Mesh::close`].
pub struct Mesh {
    gl: Arc<glow::Context>,
    mode: PrimitiveMode,
    vao: Option<glow::VertexArray>,
    index_buffer: Option<IndexBuffer>,
    vertex_buffers: Vec<VertexBuffer>,
}

impl Mesh {
    pub fn new(
        gl: Arc<glow::Context>,
        mode: PrimitiveMode,
        index_buffer: Option<IndexBuffer>,
        vertex_buffers: Vec<VertexBuffer>,
    ) -> Result<Self, GpuError> {
        let mut mesh = Self {
            gl,
            mode,
            vao: None,
            index_buffer,
            vertex_buffers,
        };
        if let Err(e) = mesh.bind_attributes() {
            mesh.close();
            return Err(e);
        }
        Ok(mesh)
    }

    fn bind_attributes(&mut self) -> Result<(), GpuError> {
        if self.vertex_buffers.is_empty() {
            return Err(GpuError::Create {
                what: "mesh",
                message: "at least one vertex buffer is required".into(),
            });
        }

        let gl = &self.gl;
        let vao = unsafe { gl.create_vertex_array() }
            .map_err(|message| GpuError::Create { what: "vertex array", message })?;
        self.vao = Some(vao);

        unsafe {
            gl.bind_vertex_array(Some(vao));
            check_gl_error(gl, "Failed to bind vertex array object", "glBindVertexArray")?;

            if let Some(ib) = &self.index_buffer {
                gl.bind_buffer(glow::ELEMENT_ARRAY_BUFFER, Some(ib.raw()?));
            }
            for (i, vb) in self.vertex_buffers.iter().enumerate() {
                gl.bind_buffer(glow::ARRAY_BUFFER, Some(vb.raw()?));
                gl.vertex_attrib_pointer_f32(
                    i as u32,
                    vb.entries_per_vertex() as i32,
                    glow::FLOAT,
                    false,
                    0,
                    0,
                );
                gl.enable_vertex_attrib_array(i as u32);
            }
            check_gl_error(gl, "Failed to associate vertex buffers", "glVertexAttribPointer")?;
            gl.bind_vertex_array(None);
        }
        Ok(())
    }

    pub fn mode(&self) -> PrimitiveMode {
        self.mode
    }

    /// The buffer feeding attribute `index`.
    pub fn vertex_buffer_mut(&mut self, index: usize) -> Option<&mut VertexBuffer> {
        self.vertex_buffers.get_mut(index)
    }

    /// The index buffer, for indexed meshes.
    pub fn index_buffer_mut(&mut self) -> Option<&mut IndexBuffer> {
        self.index_buffer.as_mut()
    }

    /// Issues the draw call. The caller binds the program and target first.
    pub(crate) fn lower_draw(&self) -> Result<(), GpuError> {
        let vao = self.vao.ok_or(GpuError::Freed("Mesh"))?;
        let gl = &self.gl;

        let counts: Vec<usize> = self.vertex_buffers.iter().map(VertexBuffer::vertex_count).collect();
        let vertex_count = match &self.index_buffer {
            Some(_) => 0,
            None => common_vertex_count(&counts)?,
        };

        unsafe {
            gl.bind_vertex_array(Some(vao));
            check_gl_error(gl, "Failed to bind vertex array object", "glBindVertexArray")?;
            match &self.index_buffer {
                None => {
                    gl.draw_arrays(self.mode.gl(), 0, vertex_count as i32);
                    check_gl_error(gl, "Failed to draw vertex array object", "glDrawArrays")?;
                }
                Some(ib) => {
                    gl.draw_elements(self.mode.gl(), ib.len() as i32, glow::UNSIGNED_INT, 0);
                    check_gl_error(gl, "Failed to draw vertex array object with indices", "glDrawElements")?;
                }
            }
            gl.bind_vertex_array(None);
        }
        Ok(())
    }

    /// Deletes the VAO and every owned buffer. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(vao) = self.vao.take() {
            unsafe { self.gl.delete_vertex_array(vao) };
        }
        for vb in self.vertex_buffers.iter_mut() {
            vb.close();
        }
        if let Some(ib) = self.index_buffer.as_mut() {
            ib.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matching_counts() {
        assert_eq!(common_vertex_count(&[4, 4, 4]).unwrap(), 4);
        assert_eq!(common_vertex_count(&[1]).unwrap(), 1);
        assert_eq!(common_vertex_count(&[]).unwrap(), 0);
    }

    #[test]
    fn test_mismatch_reports_first_offender() {
        let err = common_vertex_count(&[4, 4, 3, 2]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "vertex buffers have mismatching numbers of vertices ([0] has 4 but [2] has 3)"
        );
    }
}
