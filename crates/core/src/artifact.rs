//! Diff artifact persistence

use crate::Result;
use image::RgbaImage;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Write `image` as PNG to `directory/relative`, creating parent directories
pub fn write_png(image: &RgbaImage, directory: &Path, relative: &Path) -> Result<PathBuf> {
    let path = directory.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image.save_with_format(&path, image::ImageFormat::Png)?;
    debug!("Wrote diff artifact {}", path.display());
    Ok(path)
}

/// Artifact path of a sample identifier below the diff directory,
/// `a/b.png` -> `a/b.png.diff.png`.
///
/// The identifier's directories and full file name are kept, so two relative
/// identifiers never share an artifact. Root and `..` components are dropped
/// to keep the artifact inside the diff directory.
pub fn diff_artifact_path(name: &str) -> PathBuf {
    let mut path: PathBuf = Path::new(name)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    let mut file_name = path
        .file_name()
        .map(|f| f.to_os_string())
        .unwrap_or_else(|| "unnamed".into());
    file_name.push(".diff.png");
    path.set_file_name(file_name);
    path
}
