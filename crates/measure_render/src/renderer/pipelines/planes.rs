//! Translucent grid over every tracked, unsubsumed plane.

use super::fallback;
use crate::{
    assets::AssetSource,
    renderer::{
        context::RenderContext,
        gpu::{
            mesh::{Mesh, PrimitiveMode},
            shader::{BlendFactor, Shader},
            texture::{ColorFormat, Texture, WrapMode},
            GpuError, IndexBuffer, VertexBuffer,
        },
    },
};
use glam::{Mat4, Vec3};
use measure_core::{
    plane_mesh::{plane_normal, signed_distance_to_plane, uv_rotation, PlaneMeshBuilder, COORDS_PER_VERTEX, FADE_RADIUS_M, GRID_CONTROL},
    Plane, Pose,
};
use std::{collections::BTreeMap, sync::Arc};

const VERTEX_SHADER: &str = "shaders/plane.vert";
const FRAGMENT_SHADER: &str = "shaders/plane.frag";
const GRID_TEXTURE: &str = "texture/trigrid.png";

/// Translucent grid over each detected plane, faded toward its edge.
pub struct PlanePipeline {
    mesh: Mesh,
    shader: Shader,
    texture: Texture,
    builder: PlaneMeshBuilder,
}

impl PlanePipeline {
    pub fn new(gl: Arc<glow::Context>, assets: &dyn AssetSource) -> Result<Self, GpuError> {
        let mut texture = load_grid(&gl, assets)?;

        let built = Shader::from_assets(Arc::clone(&gl), assets, VERTEX_SHADER, FRAGMENT_SHADER, &BTreeMap::new())
            .and_then(|mut shader| {
                if let Err(e) = shader.set_texture("u_Texture", &texture) {
                    shader.close();
                    return Err(e);
                }
                shader
                    .set_blend(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha)
                    .set_depth_write(false)
                    .set_cull_face(false);
                Ok(shader)
            })
            .and_then(|mut shader| match plane_mesh(&gl) {
                Ok(mesh) => Ok((shader, mesh)),
                Err(e) => {
                    shader.close();
                    Err(e)
                }
            });

        let (shader, mesh) = match built {
            Ok(parts) => parts,
            Err(e) => {
                texture.close();
                return Err(e);
            }
        };

        log::info!("Plane renderer ready");
        Ok(Self {
            mesh,
            shader,
            texture,
            builder: PlaneMeshBuilder::new(),
        })
    }

    /// Draws planes back to front as seen from `camera_pose`.
    pub fn draw_planes<P: Plane>(
        &mut self,
        ctx: &RenderContext,
        planes: &[P],
        camera_pose: &Pose,
        projection: &Mat4,
    ) -> Result<(), GpuError> {
        let view = camera_pose.view_matrix();

        for (plane, _) in draw_order(planes, camera_pose) {
            let center = plane.center_pose();
            if !self.builder.build(plane.polygon(), FADE_RADIUS_M) {
                log::debug!("Skipping plane with a degenerate polygon");
                continue;
            }
            self.upload()?;

            let model = center.to_matrix();
            let normal: Vec3 = plane_normal(&center);
            self.shader
                .set_mat4("u_Model", &model)
                .set_mat4("u_ModelViewProjection", &(*projection * view * model))
                .set_vec3("u_Normal", normal.to_array())
                .set_vec4("u_GridControl", GRID_CONTROL)
                .set_mat2("u_PlaneUvMatrix", uv_rotation(center.rotation));
            ctx.draw(&self.mesh, &mut self.shader)?;
        }
        Ok(())
    }

    fn upload(&mut self) -> Result<(), GpuError> {
        match self.mesh.vertex_buffer_mut(0) {
            Some(vb) => vb.set(self.builder.vertices())?,
            None => return Err(GpuError::Freed("plane vertex buffer")),
        }
        match self.mesh.index_buffer_mut() {
            Some(ib) => ib.set(self.builder.indices()),
            None => Err(GpuError::Freed("plane index buffer")),
        }
    }

    /// Releases the mesh, shader and grid texture.
    pub fn close(&mut self) {
        self.shader.close();
        self.mesh.close();
        self.texture.close();
    }
}

/// Drawable planes paired with their camera distance, farthest first.
/// Untracked and subsumed planes are left out.
pub fn draw_order<'a, P: Plane>(planes: &'a [P], camera_pose: &Pose) -> Vec<(&'a P, f32)> {
    let mut visible: Vec<(&P, f32)> = planes
        .iter()
        .filter(|p| p.tracking_state().is_tracking() && !p.is_subsumed())
        .map(|p| (p, signed_distance_to_plane(&p.center_pose(), camera_pose)))
        .collect();
    visible.sort_by(|a, b| b.1.total_cmp(&a.1));
    visible
}

fn plane_mesh(gl: &Arc<glow::Context>) -> Result<Mesh, GpuError> {
    let mut ib = IndexBuffer::new(Arc::clone(gl), &[])?;
    let vb = match VertexBuffer::new(Arc::clone(gl), COORDS_PER_VERTEX, &[]) {
        Ok(vb) => vb,
        Err(e) => {
            ib.close();
            return Err(e);
        }
    };
    Mesh::new(Arc::clone(gl), PrimitiveMode::Triangles, Some(ib), vec![vb])
}

fn load_grid(gl: &Arc<glow::Context>, assets: &dyn AssetSource) -> Result<Texture, GpuError> {
    match Texture::from_asset(Arc::clone(gl), assets, GRID_TEXTURE, WrapMode::Repeat, ColorFormat::Linear) {
        Ok(texture) => Ok(texture),
        Err(GpuError::Asset { name, source }) => {
            log::warn!("Grid texture `{name}` unavailable ({source}); using built-in grid");
            Texture::from_rgba8(
                Arc::clone(gl),
                &fallback::trigrid_image(256, 32),
                WrapMode::Repeat,
                ColorFormat::Linear,
            )
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;
    use measure_core::{sim::SimPlane, TrackingState};

    fn floor_at(y: f32) -> SimPlane {
        SimPlane::rectangle(Pose::from_translation(Vec3::new(0.0, y, 0.0)), 1.0, 1.0)
    }

    #[test]
    fn test_planes_sorted_far_to_near() {
        let camera = Pose::from_translation(Vec3::new(0.0, 1.5, 0.0));
        let planes = vec![floor_at(1.0), floor_at(-1.0), floor_at(0.0)];
        let order: Vec<f32> = draw_order(&planes, &camera).iter().map(|(_, d)| *d).collect();
        assert_eq!(order, vec![2.5, 1.5, 0.5]);
    }

    #[test]
    fn test_hidden_planes_skipped() {
        let camera = Pose::IDENTITY;
        let mut lost = floor_at(-1.0);
        lost.tracking = TrackingState::Paused;
        let mut merged = floor_at(-2.0);
        merged.subsumed = true;
        let mut tilted = floor_at(-0.5);
        tilted.center.rotation = Quat::from_rotation_y(0.3);

        let planes = vec![lost, merged, tilted];
        let order = draw_order(&planes, &camera);
        assert_eq!(order.len(), 1);
        assert!((order[0].1 - 0.5).abs() < 1e-6);
    }
}
