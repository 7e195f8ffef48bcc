//! Anchor markers: one point per anchor, or the endpoints of a segment.

use crate::{
    assets::AssetSource,
    renderer::{
        context::RenderContext,
        gpu::{
            mesh::{Mesh, PrimitiveMode},
            shader::Shader,
            GpuError, VertexBuffer,
        },
    },
};
use glam::Mat4;
use measure_core::{Anchor, MarkerConfig, MarkerStyle, ViewMatrices};
use std::{collections::BTreeMap, sync::Arc};

const COORDS_PER_VERTEX: usize = 3;
const ORIGIN: [f32; 3] = [0.0; 3];

fn shader_names(style: MarkerStyle) -> (&'static str, &'static str) {
    match style {
        MarkerStyle::Points => ("shaders/point.vert", "shaders/point.frag"),
        MarkerStyle::Line => ("shaders/line.vert", "shaders/line.frag"),
    }
}

/// Anchor markers drawn as points or as connecting line segments.
pub struct MarkerPipeline {
    mesh: Mesh,
    shader: Shader,
    config: MarkerConfig,
}

impl MarkerPipeline {
    pub fn new(gl: Arc<glow::Context>, assets: &dyn AssetSource, config: MarkerConfig) -> Result<Self, GpuError> {
        let (vert, frag) = shader_names(config.style);
        let mut shader = Shader::from_assets(Arc::clone(&gl), assets, vert, frag, &BTreeMap::new())?;
        shader.set_depth_test(false).set_depth_write(false).set_cull_face(false);

        let mesh = VertexBuffer::new(Arc::clone(&gl), COORDS_PER_VERTEX, &ORIGIN)
            .and_then(|vb| Mesh::new(Arc::clone(&gl), PrimitiveMode::Points, None, vec![vb]));
        let mesh = match mesh {
            Ok(mesh) => mesh,
            Err(e) => {
                shader.close();
                return Err(e);
            }
        };

        log::info!("Marker renderer ready ({:?})", config.style);
        Ok(Self { mesh, shader, config })
    }

    pub fn config(&self) -> &MarkerConfig {
        &self.config
    }

    /// Color used from the next draw.
    pub fn set_color(&mut self, rgba: [f32; 4]) {
        self.config.color = rgba;
    }

    /// Point size in pixels used from the next draw.
    pub fn set_point_size(&mut self, size: f32) {
        self.config.point_size = size;
    }

    /// Draws every tracking anchor with `matrices`; untracked anchors are skipped.
    pub fn draw<A: Anchor>(&mut self, ctx: &RenderContext, anchors: &[A], matrices: &ViewMatrices) -> Result<(), GpuError> {
        if anchors.is_empty() {
            return Ok(());
        }
        match self.config.style {
            MarkerStyle::Points => self.draw_points(ctx, anchors, matrices),
            MarkerStyle::Line => self.draw_segment(ctx, anchors, matrices),
        }
    }

    fn draw_points<A: Anchor>(&mut self, ctx: &RenderContext, anchors: &[A], matrices: &ViewMatrices) -> Result<(), GpuError> {
        let view_projection = matrices.projection * matrices.view;
        self.vertices()?.set(&ORIGIN)?;
        // Program uniforms persist, so color and size only go out with the first draw.
        self.apply_style();
        for model in tracking_models(anchors) {
            self.shader
                .set_mat4("u_ModelViewProjection", &(view_projection * model));
            ctx.draw(&self.mesh, &mut self.shader)?;
        }
        Ok(())
    }

    fn draw_segment<A: Anchor>(&mut self, ctx: &RenderContext, anchors: &[A], matrices: &ViewMatrices) -> Result<(), GpuError> {
        let Some(endpoints) = segment_endpoints(anchors) else {
            return Ok(());
        };
        self.vertices()?.set(&endpoints)?;
        self.apply_style();
        self.shader
            .set_mat4("u_ModelViewProjection", &(matrices.projection * matrices.view));
        ctx.draw(&self.mesh, &mut self.shader)
    }

    fn apply_style(&mut self) {
        self.shader
            .set_vec4("u_Color", self.config.color)
            .set_float("u_PointSize", self.config.point_size);
    }

    fn vertices(&mut self) -> Result<&mut VertexBuffer, GpuError> {
        self.mesh
            .vertex_buffer_mut(0)
            .ok_or(GpuError::Freed("marker vertex buffer"))
    }

    /// Releases the mesh and shader.
    pub fn close(&mut self) {
        self.shader.close();
        self.mesh.close();
    }
}

/// Model matrices of the anchors that are currently tracking.
pub fn tracking_models<A: Anchor>(anchors: &[A]) -> Vec<Mat4> {
    anchors
        .iter()
        .filter(|a| a.tracking_state().is_tracking())
        .map(|a| a.pose().to_matrix())
        .collect()
}

/// World positions of both ends, only when exactly two anchors track.
pub fn segment_endpoints<A: Anchor>(anchors: &[A]) -> Option<[f32; 6]> {
    let mut tracking = anchors.iter().filter(|a| a.tracking_state().is_tracking());
    let (a, b) = (tracking.next()?, tracking.next()?);
    if tracking.next().is_some() {
        return None;
    }
    let (a, b) = (a.pose().translation, b.pose().translation);
    Some([a.x, a.y, a.z, b.x, b.y, b.z])
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use measure_core::{sim::SimAnchor, Pose};

    fn anchor(x: f32, z: f32) -> SimAnchor {
        SimAnchor::new(Pose::from_translation(Vec3::new(x, 0.0, z)))
    }

    #[test]
    fn test_segment_needs_exactly_two() {
        let one = vec![anchor(0.0, 0.0)];
        assert_eq!(segment_endpoints(&one), None);

        let two = vec![anchor(0.0, -1.0), anchor(0.5, -1.0)];
        assert_eq!(segment_endpoints(&two), Some([0.0, 0.0, -1.0, 0.5, 0.0, -1.0]));

        let three = vec![anchor(0.0, 0.0), anchor(1.0, 0.0), anchor(2.0, 0.0)];
        assert_eq!(segment_endpoints(&three), None);
    }

    #[test]
    fn test_detached_anchors_not_drawn() {
        let anchors = vec![anchor(0.0, 0.0), anchor(1.0, 0.0), anchor(2.0, 0.0)];
        anchors[0].detach();
        let models = tracking_models(&anchors);
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].w_axis.x, 1.0);
        // Three placed, one lost: the remaining pair still forms a segment.
        assert_eq!(segment_endpoints(&anchors), Some([1.0, 0.0, 0.0, 2.0, 0.0, 0.0]));
    }

    #[test]
    fn test_style_selects_shaders() {
        assert_eq!(shader_names(MarkerStyle::Points).0, "shaders/point.vert");
        assert_eq!(shader_names(MarkerStyle::Line).1, "shaders/line.frag");
    }
}
