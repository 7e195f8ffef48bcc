//! Thin owned wrappers over GL objects. Every wrapper holds the shared
//! context and releases its object in `close`, never on drop, so teardown
//! happens on the GL thread in a known order.

pub mod buffer;
pub mod error;
pub mod mesh;
pub mod shader;
pub mod texture;

pub use buffer::{IndexBuffer, VertexBuffer};
pub use error::{check_gl_error, log_gl_errors, GpuError};
pub use mesh::{Mesh, PrimitiveMode};
pub use shader::{BlendFactor, DrawState, Shader};
pub use texture::{ColorFormat, Texture, TextureTarget, WrapMode};
