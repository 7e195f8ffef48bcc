pub mod background;
pub mod fallback;
pub mod markers;
pub mod planes;
