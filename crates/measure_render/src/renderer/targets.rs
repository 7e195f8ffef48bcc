//! Offscreen render target: one color texture plus a float depth texture.
//!
//! Passes render into it through [`RenderContext::draw_to`] and
//! [`RenderContext::clear`] with `Some(&framebuffer)`; the color attachment
//! can then be sampled by a later pass via [`Framebuffer::color`].
//!
//! [`RenderContext::draw_to`]: super::context::RenderContext::draw_to
//! [`RenderContext::clear`]: super::context::RenderContext::clear

use super::gpu::{
    error::{check_gl_error, GpuError},
    texture::{Texture, TextureTarget, WrapMode},
};
use glow::{HasContext, PixelUnpackData};
use std::sync::Arc;

/// Color plus depth render target.
pub struct Framebuffer {
    gl: Arc<glow::Context>,
    fbo: Option<glow::Framebuffer>,
    color: Texture,
    depth: Texture,
    width: u32,
    height: u32,
}

impl Framebuffer {
    /// Creates a complete framebuffer with both attachments sized to
    /// `width` x `height`.
    pub fn new(gl: Arc<glow::Context>, width: u32, height: u32) -> Result<Self, GpuError> {
        let mut color = Texture::new(Arc::clone(&gl), TextureTarget::Texture2d, WrapMode::ClampToEdge, false)?;
        let mut depth = match Texture::new(Arc::clone(&gl), TextureTarget::Texture2d, WrapMode::ClampToEdge, false) {
            Ok(depth) => depth,
            Err(e) => {
                color.close();
                return Err(e);
            }
        };
        let fbo = match unsafe { gl.create_framebuffer() } {
            Ok(fbo) => fbo,
            Err(message) => {
                color.close();
                depth.close();
                return Err(GpuError::Create { what: "framebuffer", message });
            }
        };

        let mut target = Self {
            gl,
            fbo: Some(fbo),
            color,
            depth,
            width: 0,
            height: 0,
        };
        if let Err(e) = target.attach().and_then(|()| target.allocate(width, height)) {
            target.close();
            return Err(e);
        }
        Ok(target)
    }

    fn attach(&self) -> Result<(), GpuError> {
        let fbo = self.raw()?;
        let color = self.color.raw()?;
        let depth = self.depth.raw()?;
        let gl = &self.gl;
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(depth));
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, glow::NEAREST as i32);
            gl.tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_COMPARE_MODE, glow::NONE as i32);
            check_gl_error(gl, "Failed to configure depth texture", "glTexParameteri")?;

            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            gl.framebuffer_texture_2d(glow::FRAMEBUFFER, glow::COLOR_ATTACHMENT0, glow::TEXTURE_2D, Some(color), 0);
            gl.framebuffer_texture_2d(glow::FRAMEBUFFER, glow::DEPTH_ATTACHMENT, glow::TEXTURE_2D, Some(depth), 0);
            let attached = check_gl_error(gl, "Failed to attach framebuffer textures", "glFramebufferTexture2D");
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            attached
        }
    }

    fn allocate(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        let fbo = self.raw()?;
        let color = self.color.raw()?;
        let depth = self.depth.raw()?;
        let gl = &self.gl;
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(color));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(None),
            );
            check_gl_error(gl, "Failed to allocate color attachment", "glTexImage2D")?;

            gl.bind_texture(glow::TEXTURE_2D, Some(depth));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::DEPTH_COMPONENT32F as i32,
                width as i32,
                height as i32,
                0,
                glow::DEPTH_COMPONENT,
                glow::FLOAT,
                PixelUnpackData::Slice(None),
            );
            check_gl_error(gl, "Failed to allocate depth attachment", "glTexImage2D")?;

            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            let status = gl.check_framebuffer_status(glow::FRAMEBUFFER);
            gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            if status != glow::FRAMEBUFFER_COMPLETE {
                return Err(GpuError::FramebufferIncomplete(status));
            }
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Reallocates both attachments. Unchanged sizes are a no-op.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), GpuError> {
        if !needs_realloc((self.width, self.height), (width, height)) {
            return Ok(());
        }
        self.allocate(width, height)
    }

    /// Current attachment size in pixels.
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The color attachment, sampleable once rendering is done.
    pub fn color(&self) -> &Texture {
        &self.color
    }

    /// The `DEPTH_COMPONENT32F` attachment.
    pub fn depth(&self) -> &Texture {
        &self.depth
    }

    /// The live GL handle, or `Freed` after `close`.
    pub fn raw(&self) -> Result<glow::Framebuffer, GpuError> {
        self.fbo.ok_or(GpuError::Freed("Framebuffer"))
    }

    /// Deletes the framebuffer and both attachments.
    pub fn close(&mut self) {
        if let Some(fbo) = self.fbo.take() {
            unsafe { self.gl.delete_framebuffer(fbo) };
        }
        self.color.close();
        self.depth.close();
    }
}

fn needs_realloc(current: (u32, u32), requested: (u32, u32)) -> bool {
    current != requested
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resize_only_reallocates_on_change() {
        assert!(!needs_realloc((640, 480), (640, 480)));
        assert!(needs_realloc((640, 480), (480, 640)));
        assert!(needs_realloc((0, 0), (1, 1)));
    }
}
