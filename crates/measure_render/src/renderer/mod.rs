//! Owns the GL-side pipelines and draws one AR frame with them.

pub mod context;
pub mod gpu;
pub mod pipelines;
pub mod targets;

use self::{
    context::RenderContext,
    gpu::GpuError,
    pipelines::{background::BackgroundPipeline, markers::MarkerPipeline, planes::PlanePipeline},
};
use crate::assets::AssetSource;
use glam::Mat4;
use measure_core::{Anchor, Frame, MarkerConfig, Plane, Pose, ViewMatrices};
use std::sync::Arc;

/// Each pipeline is optional. One that fails to build is logged and left
/// out, and the others keep drawing.
#[derive(Default)]
pub struct Renderer {
    pub background: Option<BackgroundPipeline>,
    pub planes: Option<PlanePipeline>,
    pub markers: Option<MarkerPipeline>,
}

impl Renderer {
    pub fn new(gl: &Arc<glow::Context>, assets: &dyn AssetSource, marker: MarkerConfig, depth_visualization: bool) -> Self {
        let background = BackgroundPipeline::new(Arc::clone(gl), assets)
            .map(|mut bg| {
                if depth_visualization {
                    if let Err(e) = bg.set_use_depth_visualization(assets, true) {
                        log::warn!("Depth visualization unavailable: {e}");
                    }
                }
                bg
            })
            .map_err(|e| log::error!("Failed to create background renderer: {e}"))
            .ok();
        let planes = PlanePipeline::new(Arc::clone(gl), assets)
            .map_err(|e| log::error!("Failed to create plane renderer: {e}"))
            .ok();
        let markers = MarkerPipeline::new(Arc::clone(gl), assets, marker)
            .map_err(|e| log::error!("Failed to create marker renderer: {e}"))
            .ok();
        Self {
            background,
            planes,
            markers,
        }
    }

    /// GL name of the external camera texture, once the background is up.
    pub fn camera_texture_name(&self) -> Option<u32> {
        let bg = self.background.as_ref()?;
        bg.camera_texture_name()
            .map_err(|e| log::error!("Camera texture unavailable: {e}"))
            .ok()
    }

    /// Draws the camera image, refreshing depth when `refresh` is set.
    pub fn draw_background<F: Frame>(&mut self, ctx: &RenderContext, frame: &F, refresh: bool) {
        let Some(bg) = self.background.as_mut() else {
            return;
        };
        if refresh {
            report("update display geometry", bg.update_display_geometry(frame));
            report("upload depth", bg.update_depth(frame));
        }
        report("draw background", bg.draw(ctx));
    }

    /// Draws tracked planes far to near.
    pub fn draw_planes<P: Plane>(&mut self, ctx: &RenderContext, planes: &[P], camera_pose: &Pose, projection: &Mat4) {
        if let Some(p) = self.planes.as_mut() {
            report("draw planes", p.draw_planes(ctx, planes, camera_pose, projection));
        }
    }

    /// Draws tracking anchors as points or a line.
    pub fn draw_markers<A: Anchor>(&mut self, ctx: &RenderContext, anchors: &[A], matrices: &ViewMatrices) {
        if let Some(m) = self.markers.as_mut() {
            report("draw markers", m.draw(ctx, anchors, matrices));
        }
    }

    /// Releases pipelines in reverse creation order.
    pub fn close(&mut self) {
        if let Some(mut m) = self.markers.take() {
            m.close();
        }
        if let Some(mut p) = self.planes.take() {
            p.close();
        }
        if let Some(mut bg) = self.background.take() {
            bg.close();
        }
    }
}

fn report(what: &str, result: Result<(), GpuError>) {
    if let Err(e) = result {
        log::warn!("Failed to {what}: {e}");
    }
}
