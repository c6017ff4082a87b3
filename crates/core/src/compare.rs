//! Comparison orchestration
//!
//! The pixel-difference algorithm sits behind [`PixelComparator`]. The
//! [`Orchestrator`] assembles the request, classifies whatever the comparator
//! returns into an [`Outcome`], persists the diff artifact when asked to and
//! forwards the resulting [`ComparisonReport`] to the listener.

use crate::artifact;
use crate::config::{keys, Configuration};
use crate::listener::ListenerDispatch;
use crate::mask::MaskSet;
use crate::raster::RasterImage;
use crate::{Error, Result};
use image::{Pixel, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Per-channel difference tolerated by [`ToleranceComparator`] by default
pub const DEFAULT_TOLERANCE: u8 = 5;

/// Percentage of differing pixels tolerated by [`ToleranceComparator`] by default
pub const DEFAULT_THRESHOLD_PERCENT: f64 = 0.5;

/// Classified result of one comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Match,
    Mismatch,
    Error,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Match => write!(f, "match"),
            Outcome::Mismatch => write!(f, "mismatch"),
            Outcome::Error => write!(f, "error"),
        }
    }
}

/// Inputs handed to the comparator
#[derive(Debug, Clone, Copy)]
pub struct ComparisonRequest<'a> {
    pub sample: &'a RasterImage,
    pub pattern: &'a RasterImage,
    /// Regions excluded from comparison; empty means the whole image
    pub masks: &'a MaskSet,
}

/// What the comparator reports back
#[derive(Debug, Clone)]
pub struct ComparisonResult {
    pub matches: bool,
    pub diff_pixels: u64,
    pub total_pixels: u64,
    pub masked_pixels: u64,
    pub diff_percent: f64,
    pub diff_image: Option<RgbaImage>,
}

/// The external pixel-difference operation
pub trait PixelComparator: Send + Sync {
    fn compare(&self, request: &ComparisonRequest<'_>) -> Result<ComparisonResult>;
}

/// Report of a single sample, as forwarded to listeners
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonReport {
    pub name: String,
    pub outcome: Outcome,
    pub diff_percent: f64,
    pub diff_pixels: u64,
    pub total_pixels: u64,
    pub masked_pixels: u64,
    pub sample_digest: Option<String>,
    pub pattern_digest: Option<String>,
    pub diff_image_path: Option<PathBuf>,
    pub error: Option<String>,
    #[serde(skip)]
    pub diff_artifact: Option<Arc<RgbaImage>>,
}

impl ComparisonReport {
    /// Report for a sample whose comparison never got to run
    pub fn errored(name: impl Into<String>, error: &Error) -> Self {
        Self {
            name: name.into(),
            outcome: Outcome::Error,
            diff_percent: 0.0,
            diff_pixels: 0,
            total_pixels: 0,
            masked_pixels: 0,
            sample_digest: None,
            pattern_digest: None,
            diff_image_path: None,
            error: Some(error.to_string()),
            diff_artifact: None,
        }
    }
}

/// Runs comparisons and forwards their outcome
pub struct Orchestrator {
    comparator: Box<dyn PixelComparator>,
    diff_directory: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(comparator: Box<dyn PixelComparator>) -> Self {
        Self {
            comparator,
            diff_directory: None,
        }
    }

    /// Persist diff artifacts below `directory`
    pub fn with_diff_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.diff_directory = Some(directory.into());
        self
    }

    /// Compare and classify without notifying anyone
    pub fn evaluate(
        &self,
        name: &str,
        sample: &RasterImage,
        pattern: &RasterImage,
        masks: &MaskSet,
    ) -> ComparisonReport {
        let request = ComparisonRequest {
            sample,
            pattern,
            masks,
        };
        debug!(
            "Comparing {} against {} with {} mask(s)",
            sample.origin(),
            pattern.origin(),
            masks.len()
        );

        match self.comparator.compare(&request) {
            Ok(result) => {
                let outcome = if result.matches {
                    Outcome::Match
                } else {
                    warn!(
                        "Visual regression detected in '{}': {:.2}% pixels differ",
                        name, result.diff_percent
                    );
                    Outcome::Mismatch
                };
                ComparisonReport {
                    name: name.to_string(),
                    outcome,
                    diff_percent: result.diff_percent,
                    diff_pixels: result.diff_pixels,
                    total_pixels: result.total_pixels,
                    masked_pixels: result.masked_pixels,
                    sample_digest: Some(sample.digest()),
                    pattern_digest: Some(pattern.digest()),
                    diff_image_path: None,
                    error: None,
                    diff_artifact: result.diff_image.map(Arc::new),
                }
            }
            Err(e) => {
                error!("Comparison of '{}' failed: {}", name, e);
                ComparisonReport {
                    sample_digest: Some(sample.digest()),
                    pattern_digest: Some(pattern.digest()),
                    ..ComparisonReport::errored(name, &e)
                }
            }
        }
    }

    /// Compare, persist the diff artifact and notify the listener
    pub fn run(
        &self,
        name: &str,
        sample: &RasterImage,
        pattern: &RasterImage,
        masks: &MaskSet,
        dispatch: &mut ListenerDispatch,
    ) -> Result<ComparisonReport> {
        let mut report = self.evaluate(name, sample, pattern, masks);

        if let (Some(directory), Some(diff)) = (&self.diff_directory, &report.diff_artifact) {
            let path = artifact::write_png(diff, directory, &artifact::diff_artifact_path(name))?;
            report.diff_image_path = Some(path);
        }

        dispatch.notify(&report)?;
        Ok(report)
    }
}

/// Pixel comparator with a per-channel tolerance and a percentage threshold.
///
/// Pixels covered by an opaque mask pixel are never compared and do not
/// count towards the difference percentage. Pixels outside the overlap of differently sized
/// images always count as different.
#[derive(Debug, Clone)]
pub struct ToleranceComparator {
    tolerance: u8,
    threshold_percent: f64,
}

impl Default for ToleranceComparator {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            threshold_percent: DEFAULT_THRESHOLD_PERCENT,
        }
    }
}

impl ToleranceComparator {
    pub fn new(tolerance: u8, threshold_percent: f64) -> Result<Self> {
        if !(0.0..=100.0).contains(&threshold_percent) {
            return Err(Error::InvalidConfig(format!(
                "diff threshold {} is outside 0-100%",
                threshold_percent
            )));
        }
        Ok(Self {
            tolerance,
            threshold_percent,
        })
    }

    /// Built from `pixel-tolerance` and `diff-threshold`
    pub fn from_config(config: &Configuration) -> Result<Self> {
        let tolerance = config.get_parsed(keys::PIXEL_TOLERANCE)?.unwrap_or(DEFAULT_TOLERANCE);
        let threshold = config
            .get_parsed(keys::DIFF_THRESHOLD)?
            .unwrap_or(DEFAULT_THRESHOLD_PERCENT);
        Self::new(tolerance, threshold)
    }

    fn pixels_differ(&self, a: &Rgba<u8>, b: &Rgba<u8>) -> bool {
        a.channels()
            .iter()
            .zip(b.channels())
            .any(|(x, y)| x.abs_diff(*y) > self.tolerance)
    }
}

impl PixelComparator for ToleranceComparator {
    fn compare(&self, request: &ComparisonRequest<'_>) -> Result<ComparisonResult> {
        let sample = request.sample.to_rgba8();
        let pattern = request.pattern.to_rgba8();
        let width = sample.width().max(pattern.width());
        let height = sample.height().max(pattern.height());
        let total_pixels = width as u64 * height as u64;
        if total_pixels == 0 {
            return Err(Error::Comparison("cannot compare empty images".to_string()));
        }

        if sample.dimensions() != pattern.dimensions() {
            warn!(
                "Dimensions differ: sample {:?} vs pattern {:?}",
                sample.dimensions(),
                pattern.dimensions()
            );
        } else if request.masks.is_empty() && sample.as_raw() == pattern.as_raw() {
            debug!("Images match exactly");
            return Ok(ComparisonResult {
                matches: true,
                diff_pixels: 0,
                total_pixels,
                masked_pixels: 0,
                diff_percent: 0.0,
                diff_image: None,
            });
        }

        let excluded = exclusion_map(request.masks, width, height);
        let mut diff_img = RgbaImage::new(width, height);
        let mut diff_pixels = 0u64;
        let mut masked_pixels = 0u64;

        for y in 0..height {
            for x in 0..width {
                if excluded[y as usize * width as usize + x as usize] {
                    masked_pixels += 1;
                    diff_img.put_pixel(x, y, Rgba([0, 0, 255, 64]));
                    continue;
                }

                let inside = x < sample.width()
                    && y < sample.height()
                    && x < pattern.width()
                    && y < pattern.height();
                if !inside {
                    diff_pixels += 1;
                    diff_img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
                    continue;
                }

                let sample_pixel = sample.get_pixel(x, y);
                if self.pixels_differ(sample_pixel, pattern.get_pixel(x, y)) {
                    diff_pixels += 1;
                    diff_img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
                } else {
                    let c = sample_pixel.channels();
                    diff_img.put_pixel(x, y, Rgba([c[0] / 2, c[1] / 2, c[2] / 2, 128]));
                }
            }
        }

        let compared = total_pixels - masked_pixels;
        let diff_percent = if compared == 0 {
            0.0
        } else {
            (diff_pixels as f64 / compared as f64) * 100.0
        };

        Ok(ComparisonResult {
            matches: diff_percent <= self.threshold_percent,
            diff_pixels,
            total_pixels,
            masked_pixels,
            diff_percent,
            diff_image: (diff_pixels > 0).then_some(diff_img),
        })
    }
}

/// Row-major map of pixels covered by an opaque mask pixel
pub fn exclusion_map(masks: &MaskSet, width: u32, height: u32) -> Vec<bool> {
    let mut excluded = vec![false; width as usize * height as usize];
    for mask in masks.iter() {
        let (offset_x, offset_y) = mask.offset_within(width, height);
        for (mx, my, pixel) in mask.raster().to_rgba8().enumerate_pixels() {
            let (x, y) = (offset_x + mx, offset_y + my);
            if x < width && y < height && pixel[3] > 0 {
                excluded[y as usize * width as usize + x as usize] = true;
            }
        }
    }
    excluded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convention::{HorizontalAlignment, VerticalAlignment};
    use crate::mask::Mask;
    use image::DynamicImage;
    use std::sync::Mutex;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RasterImage {
        let img = RgbaImage::from_pixel(width, height, Rgba(color));
        RasterImage::new(format!("{}x{}", width, height), DynamicImage::ImageRgba8(img))
    }

    fn mask(name: &str, raster: RasterImage, v: VerticalAlignment, h: HorizontalAlignment) -> Mask {
        Mask::new(name, name, v, h, raster)
    }

    #[derive(Default)]
    struct RecordingComparator {
        calls: Mutex<Vec<(String, String, usize)>>,
    }

    impl PixelComparator for RecordingComparator {
        fn compare(&self, request: &ComparisonRequest<'_>) -> Result<ComparisonResult> {
            self.calls.lock().unwrap().push((
                request.sample.digest(),
                request.pattern.digest(),
                request.masks.len(),
            ));
            Ok(ComparisonResult {
                matches: true,
                diff_pixels: 0,
                total_pixels: request.sample.width() as u64 * request.sample.height() as u64,
                masked_pixels: 0,
                diff_percent: 0.0,
                diff_image: None,
            })
        }
    }

    struct FailingComparator;

    impl PixelComparator for FailingComparator {
        fn compare(&self, _request: &ComparisonRequest<'_>) -> Result<ComparisonResult> {
            Err(Error::Comparison("scoring backend unavailable".to_string()))
        }
    }

    fn compare(comparator: &ToleranceComparator, a: &RasterImage, b: &RasterImage, masks: &MaskSet) -> ComparisonResult {
        comparator
            .compare(&ComparisonRequest {
                sample: a,
                pattern: b,
                masks,
            })
            .unwrap()
    }

    #[test]
    fn test_identical_images_match() {
        let a = solid(8, 8, [10, 10, 10, 255]);
        let result = compare(&ToleranceComparator::default(), &a, &a.clone(), &MaskSet::new());
        assert!(result.matches);
        assert_eq!(result.diff_pixels, 0);
        assert_eq!(result.total_pixels, 64);
        assert!(result.diff_image.is_none());
    }

    #[test]
    fn test_small_differences_within_tolerance() {
        let a = solid(4, 4, [100, 100, 100, 255]);
        let b = solid(4, 4, [104, 96, 100, 255]);
        let result = compare(&ToleranceComparator::default(), &a, &b, &MaskSet::new());
        assert!(result.matches);
        assert_eq!(result.diff_pixels, 0);
    }

    #[test]
    fn test_different_images_mismatch_with_artifact() {
        let a = solid(4, 4, [0, 0, 0, 255]);
        let b = solid(4, 4, [255, 255, 255, 255]);
        let result = compare(&ToleranceComparator::default(), &a, &b, &MaskSet::new());
        assert!(!result.matches);
        assert_eq!(result.diff_pixels, 16);
        assert_eq!(result.diff_percent, 100.0);
        let diff = result.diff_image.unwrap();
        assert_eq!(diff.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_mask_excludes_anchored_region() {
        // Left half differs; a 2x4 mask anchored top-left covers it exactly.
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        for y in 0..4 {
            for x in 0..2 {
                img.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let sample = RasterImage::new("sample", DynamicImage::ImageRgba8(img));
        let pattern = solid(4, 4, [0, 0, 0, 255]);
        let comparator = ToleranceComparator::new(DEFAULT_TOLERANCE, 0.0).unwrap();

        let left: MaskSet = [mask("m.top-left.png", solid(2, 4, [0, 0, 0, 255]), VerticalAlignment::Top, HorizontalAlignment::Left)]
            .into_iter()
            .collect();
        let result = compare(&comparator, &sample, &pattern, &left);
        assert!(result.matches);
        assert_eq!(result.masked_pixels, 8);
        assert_eq!(result.diff_pixels, 0);

        let right: MaskSet = [mask("m.top-right.png", solid(2, 4, [0, 0, 0, 255]), VerticalAlignment::Top, HorizontalAlignment::Right)]
            .into_iter()
            .collect();
        let result = compare(&comparator, &sample, &pattern, &right);
        assert!(!result.matches);
        assert_eq!(result.diff_pixels, 8);
        assert_eq!(result.diff_percent, 100.0);
    }

    #[test]
    fn test_transparent_mask_pixels_do_not_exclude() {
        let masks: MaskSet = [mask("m.bottom-right.png", solid(2, 2, [0, 0, 0, 0]), VerticalAlignment::Bottom, HorizontalAlignment::Right)]
            .into_iter()
            .collect();
        assert!(exclusion_map(&masks, 4, 4).iter().all(|excluded| !excluded));
    }

    #[test]
    fn test_bottom_right_exclusion_map() {
        let masks: MaskSet = [mask("m.bottom-right.png", solid(1, 1, [0, 0, 0, 255]), VerticalAlignment::Bottom, HorizontalAlignment::Right)]
            .into_iter()
            .collect();
        let map = exclusion_map(&masks, 3, 2);
        assert_eq!(map, vec![false, false, false, false, false, true]);
    }

    #[test]
    fn test_dimension_mismatch_counts_outside_overlap() {
        let a = solid(4, 4, [0, 0, 0, 255]);
        let b = solid(4, 2, [0, 0, 0, 255]);
        let result = compare(&ToleranceComparator::default(), &a, &b, &MaskSet::new());
        assert!(!result.matches);
        assert_eq!(result.diff_pixels, 8);
        assert_eq!(result.total_pixels, 16);
    }

    #[test]
    fn test_threshold_validation() {
        assert!(ToleranceComparator::new(5, 101.0).is_err());
        assert!(ToleranceComparator::new(5, -1.0).is_err());
        let config = Configuration::new()
            .with(keys::PIXEL_TOLERANCE, "0")
            .with(keys::DIFF_THRESHOLD, "10");
        let comparator = ToleranceComparator::from_config(&config).unwrap();
        assert_eq!(comparator.tolerance, 0);
        assert_eq!(comparator.threshold_percent, 10.0);
    }

    #[test]
    fn test_orchestrator_forwards_unrestricted_pair() {
        let recorder = Arc::new(RecordingComparator::default());

        struct Shared(Arc<RecordingComparator>);
        impl PixelComparator for Shared {
            fn compare(&self, request: &ComparisonRequest<'_>) -> Result<ComparisonResult> {
                self.0.compare(request)
            }
        }

        let orchestrator = Orchestrator::new(Box::new(Shared(recorder.clone())));
        let sample = solid(6, 6, [1, 1, 1, 255]);
        let pattern = solid(6, 6, [2, 2, 2, 255]);

        let report = orchestrator
            .run("page.png", &sample, &pattern, &MaskSet::new(), &mut ListenerDispatch::none())
            .unwrap();
        assert_eq!(report.outcome, Outcome::Match);

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (sample.digest(), pattern.digest(), 0));
    }

    #[test]
    fn test_orchestrator_classifies_errors() {
        let orchestrator = Orchestrator::new(Box::new(FailingComparator));
        let a = solid(2, 2, [0, 0, 0, 255]);
        let report = orchestrator.evaluate("x", &a, &a, &MaskSet::new());
        assert_eq!(report.outcome, Outcome::Error);
        assert!(report.error.unwrap().contains("scoring backend unavailable"));
    }

    #[test]
    fn test_orchestrator_persists_diff_artifact() {
        let tmp = tempfile::TempDir::new().unwrap();
        let orchestrator = Orchestrator::new(Box::new(ToleranceComparator::default()))
            .with_diff_directory(tmp.path().join("diffs"));
        let a = solid(3, 3, [0, 0, 0, 255]);
        let b = solid(3, 3, [200, 0, 0, 255]);

        let report = orchestrator
            .run("nested/page.png", &a, &b, &MaskSet::new(), &mut ListenerDispatch::none())
            .unwrap();
        assert_eq!(report.outcome, Outcome::Mismatch);
        let path = report.diff_image_path.unwrap();
        assert!(path.exists());
        assert_eq!(image::open(&path).unwrap().width(), 3);
    }
}
