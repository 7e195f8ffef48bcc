//! GL-thread driver tying a [`MeasureController`] to the renderers.
//!
//! The host calls the three surface callbacks from its GL thread and hands
//! the returned [`MeasureHandle`] to the UI thread, which posts taps and
//! commands through it. Result events come back on the returned receiver.

use crate::{
    assets::AssetSource,
    renderer::{context::RenderContext, Renderer},
};
use crossbeam_channel::Receiver;
use measure_core::{
    ArError, ArSession, Camera, Frame, FrameStep, MeasureConfig, MeasureController, MeasureHandle,
    SessionEvent,
};
use std::{sync::Arc, time::Instant};

type AnchorOf<S> = <<S as ArSession>::Frame as Frame>::Anchor;

/// A GL surface hosting the measurement controller and its renderers.
pub struct ArMeasureView<S: ArSession> {
    ctx: RenderContext,
    renderer: Option<Renderer>,
    controller: MeasureController<S>,
    assets: Box<dyn AssetSource + Send>,
}

impl<S: ArSession> ArMeasureView<S> {
    pub fn new(
        gl: Arc<glow::Context>,
        assets: Box<dyn AssetSource + Send>,
        session: S,
        config: MeasureConfig,
    ) -> (Self, MeasureHandle<AnchorOf<S>>, Receiver<SessionEvent>) {
        let (controller, handle, events) = MeasureController::new(session, config);
        let view = Self {
            ctx: RenderContext::new(gl),
            renderer: None,
            controller,
            assets,
        };
        (view, handle, events)
    }

    pub fn controller(&self) -> &MeasureController<S> {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut MeasureController<S> {
        &mut self.controller
    }

    /// Resumes the AR session.
    pub fn resume(&mut self, now: Instant) -> Result<(), ArError> {
        self.controller.resume(now)
    }

    /// Pauses the AR session.
    pub fn pause(&mut self) {
        self.controller.pause();
    }

    /// Builds the pipelines once the GL surface exists.
    pub fn on_surface_created(&mut self) {
        if let Some(mut old) = self.renderer.take() {
            old.close();
        }
        let config = self.controller.config();
        let renderer = Renderer::new(self.ctx.gl(), self.assets.as_ref(), config.marker, config.depth_visualization);
        if let Some(name) = renderer.camera_texture_name() {
            self.controller.set_camera_texture(name);
        }
        self.renderer = Some(renderer);
    }

    /// Resizes the viewport and informs the controller.
    pub fn on_surface_changed(&mut self, width: u32, height: u32) {
        self.ctx.set_viewport(width, height);
        self.controller.on_surface_changed(width, height);
    }

    /// Runs one frame. Returns `false` once the view has shut down.
    pub fn on_draw_frame(&mut self, now: Instant) -> bool {
        let step = self.controller.begin_frame(now);
        if matches!(step, FrameStep::Shutdown) {
            self.close();
            return false;
        }

        if let Some(renderer) = self.renderer.as_mut() {
            if let Err(e) = self.ctx.clear(None, self.controller.config().clear_color) {
                log::warn!("Failed to clear frame: {e}");
            }
            let anchors = self.controller.state().anchors().snapshot();
            draw_step(&self.ctx, renderer, &step, &anchors, self.controller.config());
        }

        self.controller.end_frame(&step);
        true
    }

    /// Releases every GPU resource. Further frames draw nothing.
    pub fn close(&mut self) {
        if let Some(mut renderer) = self.renderer.take() {
            renderer.close();
            log::info!("Renderers released");
        }
    }
}

fn draw_step<F: Frame>(
    ctx: &RenderContext,
    renderer: &mut Renderer,
    step: &FrameStep<F>,
    anchors: &[F::Anchor],
    config: &MeasureConfig,
) {
    match step {
        FrameStep::Frozen { frame, matrices } => {
            renderer.draw_background(ctx, frame, false);
            renderer.draw_markers(ctx, anchors, matrices);
        }
        FrameStep::Live {
            frame,
            tracking,
            matrices,
        } => {
            renderer.draw_background(ctx, frame, true);
            if !tracking.is_tracking() {
                return;
            }
            let camera = frame.camera();
            let projection = camera.projection_matrix(config.near, config.far);
            renderer.draw_planes(ctx, frame.planes(), &camera.display_oriented_pose(), &projection);
            if let Some(matrices) = matrices {
                renderer.draw_markers(ctx, anchors, matrices);
            }
        }
        FrameStep::Idle | FrameStep::Shutdown => {}
    }
}
