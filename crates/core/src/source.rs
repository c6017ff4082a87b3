//! Image sources
//!
//! Every source follows the same shape: merge its global configuration with
//! the per-call local layer, resolve the identifier against the effective
//! configuration, then either return a fully decoded raster or fail with
//! [`Error::SourceUnreachable`]. Sources differ only in how they interpret
//! the identifier.

use crate::config::{keys, merge, Configuration};
use crate::raster::RasterImage;
use crate::{Error, Result};
use image::{DynamicImage, Rgba, RgbaImage};
use std::path::PathBuf;
use tracing::debug;

/// Capability of producing a raster from an identifier
pub trait ImageSource: Send + Sync {
    fn retrieve(&self, source: &str, local: &Configuration) -> Result<RasterImage>;
}

/// Reads images from the filesystem, optionally below `base-directory`
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    global: Configuration,
}

impl FileSource {
    pub fn new(global: Configuration) -> Self {
        Self { global }
    }

    pub fn global(&self) -> &Configuration {
        &self.global
    }

    /// Lookup path for `source` under the effective configuration
    pub fn resolve_path(&self, source: &str, local: &Configuration) -> PathBuf {
        let effective = merge(&self.global, local);
        match effective.get(keys::BASE_DIRECTORY) {
            Some(base) => PathBuf::from(base).join(source),
            None => PathBuf::from(source),
        }
    }
}

impl ImageSource for FileSource {
    fn retrieve(&self, source: &str, local: &Configuration) -> Result<RasterImage> {
        let path = self.resolve_path(source, local);
        debug!("Loading image {}", path.display());

        match image::open(&path) {
            Ok(image) => Ok(RasterImage::new(path.to_string_lossy(), image)),
            Err(e) => {
                debug!("Failed to decode {}: {}", path.display(), e);
                Err(Error::unreachable(path))
            }
        }
    }
}

/// Synthesises solid-colour rasters from identifiers like `64x32#ff0000`.
///
/// The colour segment may carry an alpha byte (`#ff000080`). When it is
/// omitted the effective `generated-fill` value is used, defaulting to opaque
/// white.
#[derive(Debug, Clone, Default)]
pub struct GeneratedSource {
    global: Configuration,
}

/// Largest raster, in pixels, a generated identifier may ask for
pub const MAX_GENERATED_PIXELS: u64 = 1 << 26;

impl GeneratedSource {
    pub fn new(global: Configuration) -> Self {
        Self { global }
    }
}

impl ImageSource for GeneratedSource {
    fn retrieve(&self, source: &str, local: &Configuration) -> Result<RasterImage> {
        let effective = merge(&self.global, local);
        let unreachable = || Error::unreachable(source);

        let (dims, color) = match source.split_once('#') {
            Some((dims, color)) => (dims, color),
            None => (source, effective.get(keys::GENERATED_FILL).unwrap_or("ffffff")),
        };
        let (width, height) = dims.split_once('x').ok_or_else(unreachable)?;
        let width: u32 = width.trim().parse().map_err(|_| unreachable())?;
        let height: u32 = height.trim().parse().map_err(|_| unreachable())?;
        let pixels = u64::from(width) * u64::from(height);
        if pixels == 0 || pixels > MAX_GENERATED_PIXELS {
            debug!("Refusing to generate {}x{} raster", width, height);
            return Err(unreachable());
        }
        let color = parse_color(color.trim_start_matches('#')).ok_or_else(unreachable)?;

        debug!("Generating {}x{} raster for {}", width, height, source);
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        Ok(RasterImage::new(source, DynamicImage::ImageRgba8(img)))
    }
}

fn parse_color(hex_color: &str) -> Option<[u8; 4]> {
    let bytes = hex::decode(hex_color).ok()?;
    match bytes.as_slice() {
        [r, g, b] => Some([*r, *g, *b, 255]),
        [r, g, b, a] => Some([*r, *g, *b, *a]),
        _ => None,
    }
}

/// Load the sample and pattern sharing `identifier`.
///
/// The sample is read below `samples-directory` and the pattern below
/// `patterns-directory`, both taken from `configuration`.
pub fn read_pair(
    source: &dyn ImageSource,
    identifier: &str,
    configuration: &Configuration,
) -> Result<(RasterImage, RasterImage)> {
    let directory = |key: &str| {
        configuration
            .get(key)
            .ok_or_else(|| Error::InvalidConfig(format!("'{}' is not set", key)))
    };
    let sample_local = Configuration::new().with(keys::BASE_DIRECTORY, directory(keys::SAMPLES_DIRECTORY)?);
    let pattern_local = Configuration::new().with(keys::BASE_DIRECTORY, directory(keys::PATTERNS_DIRECTORY)?);

    let sample = source.retrieve(identifier, &sample_local)?;
    let pattern = source.retrieve(identifier, &pattern_local)?;
    Ok((sample, pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_resolve_with_base_directory() {
        let source = FileSource::new(Configuration::new().with(keys::BASE_DIRECTORY, "/a"));
        assert_eq!(
            source.resolve_path("b.png", &Configuration::new()),
            PathBuf::from("/a/b.png")
        );
    }

    #[test]
    fn test_resolve_without_base_directory() {
        let source = FileSource::default();
        assert_eq!(
            source.resolve_path("b.png", &Configuration::new()),
            PathBuf::from("b.png")
        );
    }

    #[test]
    fn test_local_base_directory_overrides_global() {
        let source = FileSource::new(Configuration::new().with(keys::BASE_DIRECTORY, "/global"));
        let local = Configuration::new().with(keys::BASE_DIRECTORY, "/local");
        assert_eq!(source.resolve_path("x.png", &local), PathBuf::from("/local/x.png"));
    }

    #[test]
    fn test_retrieve_decodes_file() {
        let tmp = TempDir::new().unwrap();
        write_png(&tmp.path().join("b.png"), 3, 2);

        let source = FileSource::new(
            Configuration::new().with(keys::BASE_DIRECTORY, tmp.path().to_string_lossy()),
        );
        let raster = source.retrieve("b.png", &Configuration::new()).unwrap();
        assert_eq!(raster.dimensions(), (3, 2));
        assert!(raster.origin().ends_with("b.png"));
    }

    #[test]
    fn test_retrieve_missing_file_is_unreachable() {
        let tmp = TempDir::new().unwrap();
        let source = FileSource::new(
            Configuration::new().with(keys::BASE_DIRECTORY, tmp.path().to_string_lossy()),
        );

        match source.retrieve("missing.png", &Configuration::new()) {
            Err(Error::SourceUnreachable { path }) => {
                assert_eq!(path, tmp.path().join("missing.png"));
                assert!(path.is_absolute());
            }
            other => panic!("expected SourceUnreachable, got {:?}", other),
        }
    }

    #[test]
    fn test_retrieve_undecodable_file_is_unreachable() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let result = FileSource::default().retrieve(&path.to_string_lossy(), &Configuration::new());
        assert!(matches!(result, Err(Error::SourceUnreachable { .. })));
    }

    #[test]
    fn test_generated_source() {
        let source = GeneratedSource::default();
        let raster = source.retrieve("4x3#ff000080", &Configuration::new()).unwrap();
        assert_eq!(raster.dimensions(), (4, 3));
        assert_eq!(raster.to_rgba8().get_pixel(0, 0), &Rgba([255, 0, 0, 128]));
    }

    #[test]
    fn test_generated_source_uses_effective_fill() {
        let source = GeneratedSource::new(Configuration::new().with(keys::GENERATED_FILL, "000000"));
        let local = Configuration::new().with(keys::GENERATED_FILL, "00ff00");
        let raster = source.retrieve("2x2", &local).unwrap();
        assert_eq!(raster.to_rgba8().get_pixel(1, 1), &Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_generated_source_rejects_garbage() {
        let source = GeneratedSource::default();
        for id in [
            "",
            "axb#ffffff",
            "0x4#ffffff",
            "4x4#zz",
            "4294967295x4294967295#ffffff",
            "65535x65535#ffffff",
        ] {
            assert!(matches!(
                source.retrieve(id, &Configuration::new()),
                Err(Error::SourceUnreachable { .. })
            ), "{} should be unreachable", id);
        }
    }

    #[test]
    fn test_read_pair() {
        let tmp = TempDir::new().unwrap();
        let samples = tmp.path().join("samples");
        let patterns = tmp.path().join("patterns");
        std::fs::create_dir_all(&samples).unwrap();
        std::fs::create_dir_all(&patterns).unwrap();
        write_png(&samples.join("page.png"), 5, 5);
        write_png(&patterns.join("page.png"), 6, 6);

        let config = Configuration::new()
            .with(keys::SAMPLES_DIRECTORY, samples.to_string_lossy())
            .with(keys::PATTERNS_DIRECTORY, patterns.to_string_lossy());
        let (sample, pattern) = read_pair(&FileSource::default(), "page.png", &config).unwrap();
        assert_eq!(sample.dimensions(), (5, 5));
        assert_eq!(pattern.dimensions(), (6, 6));
    }

    #[test]
    fn test_read_pair_requires_directories() {
        let result = read_pair(&FileSource::default(), "page.png", &Configuration::new());
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
