use super::error::{check_gl_error, GpuError};
use crate::assets::{load_bytes, AssetSource};
use glow::{HasContext, PixelUnpackData};
use image::RgbaImage;
use measure_core::DepthImage;
use std::sync::Arc;

/// `GL_TEXTURE_EXTERNAL_OES`, the target camera images are streamed into.
pub const TEXTURE_EXTERNAL_OES: u32 = 0x8D65;

/// Texture binding targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureTarget {
    Texture2d,
    ExternalOes,
    CubeMap,
}

impl TextureTarget {
    pub fn gl(self) -> u32 {
        match self {
            TextureTarget::Texture2d => glow::TEXTURE_2D,
            TextureTarget::ExternalOes => TEXTURE_EXTERNAL_OES,
            TextureTarget::CubeMap => glow::TEXTURE_CUBE_MAP,
        }
    }
}

/// Edge sampling for both S and T.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapMode {
    ClampToEdge,
    MirroredRepeat,
    Repeat,
}

impl WrapMode {
    fn gl(self) -> i32 {
        (match self {
            WrapMode::ClampToEdge => glow::CLAMP_TO_EDGE,
            WrapMode::MirroredRepeat => glow::MIRRORED_REPEAT,
            WrapMode::Repeat => glow::REPEAT,
        }) as i32
    }
}

/// How decoded image bytes are interpreted on upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFormat {
    Linear,
    Srgb,
}

impl ColorFormat {
    fn internal_format(self) -> i32 {
        (match self {
            ColorFormat::Linear => glow::RGBA8,
            ColorFormat::Srgb => glow::SRGB8_ALPHA8,
        }) as i32
    }
}

/// (min, mag) filters.
pub fn filters(use_mipmaps: bool) -> (u32, u32) {
    let min = if use_mipmaps {
        glow::LINEAR_MIPMAP_LINEAR
    } else {
        glow::LINEAR
    };
    (min, glow::LINEAR)
}

/// An owned GL texture. Released by `close`, never on drop.
pub struct Texture {
    gl: Arc<glow::Context>,
    target: TextureTarget,
    raw: Option<glow::Texture>,
}

impl Texture {
    /// Creates an empty texture with the given sampling state.
    pub fn new(
        gl: Arc<glow::Context>,
        target: TextureTarget,
        wrap: WrapMode,
        use_mipmaps: bool,
    ) -> Result<Self, GpuError> {
        let raw = unsafe { gl.create_texture() }
            .map_err(|message| GpuError::Create { what: "texture", message })?;
        let mut texture = Self {
            gl,
            target,
            raw: Some(raw),
        };
        if let Err(e) = texture.configure(wrap, use_mipmaps) {
            texture.close();
            return Err(e);
        }
        Ok(texture)
    }

    fn configure(&self, wrap: WrapMode, use_mipmaps: bool) -> Result<(), GpuError> {
        let (min, mag) = filters(use_mipmaps);
        let target = self.target.gl();
        let gl = &self.gl;
        unsafe {
            gl.bind_texture(target, self.raw);
            check_gl_error(gl, "Failed to bind texture", "glBindTexture")?;
            gl.tex_parameter_i32(target, glow::TEXTURE_MIN_FILTER, min as i32);
            gl.tex_parameter_i32(target, glow::TEXTURE_MAG_FILTER, mag as i32);
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_S, wrap.gl());
            gl.tex_parameter_i32(target, glow::TEXTURE_WRAP_T, wrap.gl());
            check_gl_error(gl, "Failed to set texture parameter", "glTexParameteri")?;
        }
        Ok(())
    }

    /// Decodes a PNG asset into a mipmapped 2D texture.
    pub fn from_asset(
        gl: Arc<glow::Context>,
        assets: &dyn AssetSource,
        name: &str,
        wrap: WrapMode,
        format: ColorFormat,
    ) -> Result<Self, GpuError> {
        let bytes = load_bytes(assets, name)?;
        Self::from_image_bytes(gl, &bytes, wrap, format)
    }

    /// Decodes encoded image bytes into a mipmapped 2D texture.
    pub fn from_image_bytes(
        gl: Arc<glow::Context>,
        bytes: &[u8],
        wrap: WrapMode,
        format: ColorFormat,
    ) -> Result<Self, GpuError> {
        let image = image::load_from_memory(bytes)?.to_rgba8();
        Self::from_rgba8(gl, &image, wrap, format)
    }

    /// Uploads already decoded pixels into a mipmapped 2D texture.
    pub fn from_rgba8(
        gl: Arc<glow::Context>,
        image: &RgbaImage,
        wrap: WrapMode,
        format: ColorFormat,
    ) -> Result<Self, GpuError> {
        let (width, height) = image.dimensions();
        let mut texture = Self::new(gl, TextureTarget::Texture2d, wrap, true)?;
        let upload = (|| {
            let gl = &texture.gl;
            unsafe {
                gl.bind_texture(glow::TEXTURE_2D, texture.raw);
                gl.tex_image_2d(
                    glow::TEXTURE_2D,
                    0,
                    format.internal_format(),
                    width as i32,
                    height as i32,
                    0,
                    glow::RGBA,
                    glow::UNSIGNED_BYTE,
                    PixelUnpackData::Slice(Some(image.as_raw())),
                );
                check_gl_error(gl, "Failed to populate texture data", "glTexImage2D")?;
                gl.generate_mipmap(glow::TEXTURE_2D);
                check_gl_error(gl, "Failed to generate mipmaps", "glGenerateMipmap")
            }
        })();
        if let Err(e) = upload {
            texture.close();
            return Err(e);
        }
        Ok(texture)
    }

    /// Uploads 16-bit depth as a two-channel byte texture.
    pub fn upload_depth(&self, depth: &DepthImage) -> Result<(), GpuError> {
        check_image_size(depth.width, depth.height, depth.data.len())?;
        let raw = self.raw()?;
        let gl = &self.gl;
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(raw));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RG8 as i32,
                depth.width as i32,
                depth.height as i32,
                0,
                glow::RG,
                glow::UNSIGNED_BYTE,
                PixelUnpackData::Slice(Some(bytemuck::cast_slice(&depth.data))),
            );
            check_gl_error(gl, "Failed to upload depth image", "glTexImage2D")
        }
    }

    /// Binding target this texture was created for.
    pub fn target(&self) -> TextureTarget {
        self.target
    }

    /// The live GL handle, or `Freed` after `close`.
    pub fn raw(&self) -> Result<glow::Texture, GpuError> {
        self.raw.ok_or(GpuError::Freed("Texture"))
    }

    /// GL name to hand to external producers such as a camera stream.
    pub fn name(&self) -> Result<u32, GpuError> {
        Ok(self.raw()?.0.get())
    }

    /// Deletes the GL texture. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { self.gl.delete_texture(raw) };
        }
    }
}

/// A tightly packed image must hold exactly one sample per pixel.
fn check_image_size(width: u32, height: u32, samples: usize) -> Result<(), GpuError> {
    let expected = width as usize * height as usize;
    if samples != expected {
        return Err(GpuError::ImageSize {
            width,
            height,
            expected,
            actual: samples,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filters_follow_mipmaps() {
        assert_eq!(filters(true), (glow::LINEAR_MIPMAP_LINEAR, glow::LINEAR));
        assert_eq!(filters(false), (glow::LINEAR, glow::LINEAR));
    }

    #[test]
    fn test_external_target_value() {
        assert_eq!(TextureTarget::ExternalOes.gl(), 0x8D65);
        assert_eq!(ColorFormat::Srgb.internal_format(), glow::SRGB8_ALPHA8 as i32);
    }

    #[test]
    fn test_depth_size_must_match_dimensions() {
        assert!(check_image_size(4, 3, 12).is_ok());
        assert!(check_image_size(0, 0, 0).is_ok());
        let err = check_image_size(160, 90, 100).unwrap_err();
        assert!(matches!(
            err,
            GpuError::ImageSize { expected: 14400, actual: 100, .. }
        ));
        assert!(check_image_size(2, 2, 5).is_err());
    }
}
