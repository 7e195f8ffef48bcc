//! Full-screen camera image, or the false-colour depth view.

use super::fallback;
use crate::{
    assets::AssetSource,
    renderer::{
        context::RenderContext,
        gpu::{
            mesh::{Mesh, PrimitiveMode},
            shader::Shader,
            texture::{ColorFormat, Texture, TextureTarget, WrapMode},
            GpuError, VertexBuffer,
        },
    },
};
use measure_core::Frame;
use std::{collections::BTreeMap, sync::Arc};

/// Two triangles covering NDC space, as a strip.
pub const NDC_QUAD: [f32; 8] = [-1.0, -1.0, 1.0, -1.0, -1.0, 1.0, 1.0, 1.0];

const CAMERA_VERT: &str = "shaders/background_show_camera.vert";
const CAMERA_FRAG: &str = "shaders/background_show_camera.frag";
const DEPTH_VERT: &str = "shaders/background_show_depth_color_visualization.vert";
const DEPTH_FRAG: &str = "shaders/background_show_depth_color_visualization.frag";
const DEPTH_PALETTE: &str = "models/depth_color_palette.png";

/// Full-screen camera image, optionally replaced by a colorized depth view.
pub struct BackgroundPipeline {
    gl: Arc<glow::Context>,
    mesh: Mesh,
    camera_color: Texture,
    camera_depth: Texture,
    palette: Option<Texture>,
    shader: Option<Shader>,
    use_depth_visualization: bool,
}

impl BackgroundPipeline {
    pub fn new(gl: Arc<glow::Context>, assets: &dyn AssetSource) -> Result<Self, GpuError> {
        let mut camera_color = Texture::new(Arc::clone(&gl), TextureTarget::ExternalOes, WrapMode::ClampToEdge, false)?;
        let mut camera_depth =
            match Texture::new(Arc::clone(&gl), TextureTarget::Texture2d, WrapMode::ClampToEdge, false) {
                Ok(t) => t,
                Err(e) => {
                    camera_color.close();
                    return Err(e);
                }
            };

        let mesh = VertexBuffer::new(Arc::clone(&gl), 2, &NDC_QUAD).and_then(|positions| {
            // Texture coordinates arrive with the first display geometry update.
            let tex_coords = VertexBuffer::new(Arc::clone(&gl), 2, &NDC_QUAD)?;
            Mesh::new(Arc::clone(&gl), PrimitiveMode::TriangleStrip, None, vec![positions, tex_coords])
        });
        let mesh = match mesh {
            Ok(mesh) => mesh,
            Err(e) => {
                camera_color.close();
                camera_depth.close();
                return Err(e);
            }
        };

        let mut pipeline = Self {
            gl,
            mesh,
            camera_color,
            camera_depth,
            palette: None,
            shader: None,
            use_depth_visualization: false,
        };
        if let Err(e) = pipeline.load_shader(assets, false) {
            pipeline.close();
            return Err(e);
        }
        log::info!("Background renderer ready");
        Ok(pipeline)
    }

    /// GL name the AR session streams camera images into.
    pub fn camera_texture_name(&self) -> Result<u32, GpuError> {
        self.camera_color.name()
    }

    /// Whether the depth view is drawn instead of the camera image.
    pub fn uses_depth_visualization(&self) -> bool {
        self.use_depth_visualization
    }

    /// Swaps between the camera and depth shaders. Re-selecting the current
    /// mode does nothing.
    pub fn set_use_depth_visualization(&mut self, assets: &dyn AssetSource, enabled: bool) -> Result<(), GpuError> {
        if self.shader.is_some() && self.use_depth_visualization == enabled {
            return Ok(());
        }
        self.load_shader(assets, enabled)
    }

    fn load_shader(&mut self, assets: &dyn AssetSource, depth: bool) -> Result<(), GpuError> {
        if let Some(mut old) = self.shader.take() {
            old.close();
        }

        let defines = BTreeMap::new();
        let mut shader = if depth {
            if self.palette.is_none() {
                self.palette = Some(load_palette(&self.gl, assets)?);
            }
            let mut shader = Shader::from_assets(Arc::clone(&self.gl), assets, DEPTH_VERT, DEPTH_FRAG, &defines)?;
            let bound = match &self.palette {
                Some(palette) => shader
                    .set_texture("u_CameraDepthTexture", &self.camera_depth)
                    .and_then(|s| s.set_texture("u_ColorMap", palette))
                    .map(|_| ()),
                None => Ok(()),
            };
            if let Err(e) = bound {
                shader.close();
                return Err(e);
            }
            shader
        } else {
            let mut shader = Shader::from_assets(Arc::clone(&self.gl), assets, CAMERA_VERT, CAMERA_FRAG, &defines)?;
            if let Err(e) = shader.set_texture("u_CameraColorTexture", &self.camera_color) {
                shader.close();
                return Err(e);
            }
            shader
        };
        shader.set_depth_test(false).set_depth_write(false).set_cull_face(false);

        self.shader = Some(shader);
        self.use_depth_visualization = depth;
        log::debug!("Background shader set (depth visualization: {depth})");
        Ok(())
    }

    /// Re-maps camera texture coordinates when the display geometry changed.
    pub fn update_display_geometry<F: Frame>(&mut self, frame: &F) -> Result<(), GpuError> {
        if !frame.has_display_geometry_changed() {
            return Ok(());
        }
        let tex_coords = frame.transform_ndc_to_texture(&NDC_QUAD);
        match self.mesh.vertex_buffer_mut(1) {
            Some(vb) => vb.set(&tex_coords),
            None => Err(GpuError::Freed("camera texture coordinate buffer")),
        }
    }

    /// Uploads this frame's depth image when depth visualization is on.
    pub fn update_depth<F: Frame>(&mut self, frame: &F) -> Result<(), GpuError> {
        if !self.use_depth_visualization {
            return Ok(());
        }
        match frame.depth_image() {
            Some(depth) => self.camera_depth.upload_depth(&depth),
            None => Ok(()),
        }
    }

    /// Draws the full-screen quad with whichever shader is active.
    pub fn draw(&mut self, ctx: &RenderContext) -> Result<(), GpuError> {
        let shader = self.shader.as_mut().ok_or(GpuError::Freed("background shader"))?;
        ctx.draw(&self.mesh, shader)
    }

    /// Releases the quad, the shader and every texture.
    pub fn close(&mut self) {
        if let Some(mut shader) = self.shader.take() {
            shader.close();
        }
        if let Some(mut palette) = self.palette.take() {
            palette.close();
        }
        self.mesh.close();
        self.camera_depth.close();
        self.camera_color.close();
    }
}

fn load_palette(gl: &Arc<glow::Context>, assets: &dyn AssetSource) -> Result<Texture, GpuError> {
    match Texture::from_asset(Arc::clone(gl), assets, DEPTH_PALETTE, WrapMode::ClampToEdge, ColorFormat::Linear) {
        Ok(texture) => Ok(texture),
        Err(GpuError::Asset { name, source }) => {
            log::warn!("Depth palette `{name}` unavailable ({source}); using built-in ramp");
            Texture::from_rgba8(
                Arc::clone(gl),
                &fallback::depth_palette_image(256),
                WrapMode::ClampToEdge,
                ColorFormat::Linear,
            )
        }
        Err(e) => Err(e),
    }
}
