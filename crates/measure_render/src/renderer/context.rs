use super::{
    gpu::{
        error::{check_gl_error, GpuError},
        mesh::Mesh,
        shader::Shader,
    },
    targets::Framebuffer,
};
use glow::HasContext;
use std::sync::Arc;

/// Shared GL context plus the size of the default framebuffer.
pub struct RenderContext {
    gl: Arc<glow::Context>,
    viewport: (u32, u32),
}

impl RenderContext {
    /// Wraps `gl` with a 1x1 viewport until the surface reports its size.
    pub fn new(gl: Arc<glow::Context>) -> Self {
        Self { gl, viewport: (1, 1) }
    }

    /// The shared context every GPU object is created from.
    pub fn gl(&self) -> &Arc<glow::Context> {
        &self.gl
    }

    /// Records the default framebuffer size, clamped to at least 1x1.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = (width.max(1), height.max(1));
    }

    /// Size of the default framebuffer.
    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Draws `mesh` with `shader` to the default framebuffer.
    pub fn draw(&self, mesh: &Mesh, shader: &mut Shader) -> Result<(), GpuError> {
        self.draw_to(mesh, shader, None)
    }

    /// Draws `mesh` with `shader` into `target`, or the default framebuffer
    /// when `None`. The viewport follows the target's size.
    pub fn draw_to(&self, mesh: &Mesh, shader: &mut Shader, target: Option<&Framebuffer>) -> Result<(), GpuError> {
        self.bind_target(target)?;
        shader.use_program()?;
        mesh.lower_draw()
    }

    /// Clears color and depth. Depth writes are re-enabled first so the
    /// clear is not masked by the last draw's state.
    pub fn clear(&self, target: Option<&Framebuffer>, color: [f32; 4]) -> Result<(), GpuError> {
        self.bind_target(target)?;
        let gl = &self.gl;
        unsafe {
            gl.depth_mask(true);
            gl.clear_color(color[0], color[1], color[2], color[3]);
            gl.clear(glow::COLOR_BUFFER_BIT | glow::DEPTH_BUFFER_BIT);
            check_gl_error(gl, "Failed to clear framebuffer", "glClear")
        }
    }

    fn bind_target(&self, target: Option<&Framebuffer>) -> Result<(), GpuError> {
        let (fbo, (width, height)) = match target {
            Some(fb) => (Some(fb.raw()?), fb.size()),
            None => (None, self.viewport),
        };
        let gl = &self.gl;
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, fbo);
            check_gl_error(gl, "Failed to bind framebuffer", "glBindFramebuffer")?;
            gl.viewport(0, 0, width as i32, height as i32);
            check_gl_error(gl, "Failed to set viewport", "glViewport")
        }
    }
}
