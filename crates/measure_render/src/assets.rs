//! Where shader sources and textures come from.
//!
//! Shaders ship inside the library. Images are looked up in an optional
//! directory so hosts can provide their own grid and palette textures.

use crate::renderer::gpu::GpuError;
use std::{
    fs, io,
    path::{Path, PathBuf},
};

/// Where shaders and textures are read from.
pub trait AssetSource {
    fn load(&self, name: &str) -> io::Result<Vec<u8>>;
}

/// Assets read from a directory, by relative name.
#[derive(Debug, Clone)]
pub struct DirAssets {
    root: PathBuf,
}

impl DirAssets {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl AssetSource for DirAssets {
    fn load(&self, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.root.join(name))
    }
}

const BUNDLED: &[(&str, &str)] = &[
    (
        "shaders/background_show_camera.vert",
        include_str!("../assets/shaders/background_show_camera.vert"),
    ),
    (
        "shaders/background_show_camera.frag",
        include_str!("../assets/shaders/background_show_camera.frag"),
    ),
    (
        "shaders/background_show_depth_color_visualization.vert",
        include_str!("../assets/shaders/background_show_depth_color_visualization.vert"),
    ),
    (
        "shaders/background_show_depth_color_visualization.frag",
        include_str!("../assets/shaders/background_show_depth_color_visualization.frag"),
    ),
    ("shaders/plane.vert", include_str!("../assets/shaders/plane.vert")),
    ("shaders/plane.frag", include_str!("../assets/shaders/plane.frag")),
    ("shaders/point.vert", include_str!("../assets/shaders/point.vert")),
    ("shaders/point.frag", include_str!("../assets/shaders/point.frag")),
    ("shaders/line.vert", include_str!("../assets/shaders/line.vert")),
    ("shaders/line.frag", include_str!("../assets/shaders/line.frag")),
];

/// Built-in shaders, falling back to a directory for everything else.
#[derive(Debug, Clone, Default)]
pub struct BundledAssets {
    fallback: Option<DirAssets>,
}

impl BundledAssets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(root: impl Into<PathBuf>) -> Self {
        Self {
            fallback: Some(DirAssets::new(root)),
        }
    }
}

impl AssetSource for BundledAssets {
    fn load(&self, name: &str) -> io::Result<Vec<u8>> {
        if let Some((_, text)) = BUNDLED.iter().find(|(n, _)| *n == name) {
            return Ok(text.as_bytes().to_vec());
        }
        match &self.fallback {
            Some(dir) => dir.load(name),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no bundled asset named `{name}`"),
            )),
        }
    }
}

/// Reads a binary asset, naming it in the error.
pub fn load_bytes(assets: &dyn AssetSource, name: &str) -> Result<Vec<u8>, GpuError> {
    assets.load(name).map_err(|source| GpuError::Asset {
        name: name.to_string(),
        source,
    })
}

/// Reads a UTF-8 asset, naming it in the error.
pub fn load_text(assets: &dyn AssetSource, name: &str) -> Result<String, GpuError> {
    let bytes = load_bytes(assets, name)?;
    String::from_utf8(bytes).map_err(|e| GpuError::Asset {
        name: name.to_string(),
        source: io::Error::new(io::ErrorKind::InvalidData, e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_shaders_resolve() {
        let assets = BundledAssets::new();
        let src = load_text(&assets, "shaders/plane.vert").unwrap();
        assert!(src.starts_with("#version 300 es"));
        for (name, _) in BUNDLED {
            assert!(load_text(&assets, name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_missing_asset_names_itself() {
        let err = load_bytes(&BundledAssets::new(), "texture/trigrid.png").unwrap_err();
        assert_eq!(err.to_string(), "failed to load asset `texture/trigrid.png`");
    }

    #[test]
    fn test_fallback_directory() {
        let dir = std::env::temp_dir().join(format!("measure_render_assets_{}", std::process::id()));
        fs::create_dir_all(dir.join("texture")).unwrap();
        fs::write(dir.join("texture/grid.bin"), [1u8, 2, 3]).unwrap();

        let assets = BundledAssets::with_fallback(&dir);
        assert_eq!(load_bytes(&assets, "texture/grid.bin").unwrap(), vec![1, 2, 3]);
        assert!(load_bytes(&assets, "shaders/point.frag").is_ok());

        fs::remove_dir_all(&dir).unwrap();
    }
}
