//! OpenGL ES 3 rendering for the AR tape measure.
//!
//! [`renderer::gpu`] wraps buffers, meshes, shaders and textures over
//! `glow`. The pipelines in [`renderer::pipelines`] draw the camera
//! background, the plane grid and the anchor markers, and
//! [`app::ArMeasureView`] drives them from a `measure_core` controller.

pub mod app;
pub mod assets;
pub mod renderer;

pub use app::ArMeasureView;
pub use assets::{AssetSource, BundledAssets, DirAssets};
pub use renderer::{context::RenderContext, gpu::GpuError, targets::Framebuffer, Renderer};
