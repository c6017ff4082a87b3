//! visreg Core Library
//!
//! Decides which bytes get compared and which regions are excluded when a
//! sample image is checked against its reference pattern:
//! - [`config`] merges the global configuration with per-call overrides
//! - [`source`] retrieves rasters from interchangeable image sources
//! - [`convention`] decodes orientation flags from mask filenames
//! - [`mask`] loads a directory of masks into a [`MaskSet`]
//! - [`compare`] hands image pairs to a [`PixelComparator`] and classifies the outcome
//! - [`listener`] notifies the configured [`ResultListener`]
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  SuiteRunner                                                │
//! │    ├── read_pair(source, id, config) -> (sample, pattern)  │
//! │    ├── Orchestrator::run(.., masks, dispatch)              │
//! │    │     ├── PixelComparator::compare(request)             │
//! │    │     └── artifact::write_png(diff)                     │
//! │    └── ListenerDispatch::notify(report)                    │
//! ├────────────────────────────────────────────────────────────┤
//! │  MaskSetLoader::load(dir)                                  │
//! │    ├── convention::parse_flags(filename)                   │
//! │    └── ImageSource::retrieve(path, {})                     │
//! └────────────────────────────────────────────────────────────┘
//! ```

pub mod artifact;
pub mod compare;
pub mod config;
pub mod convention;
pub mod error;
pub mod listener;
pub mod mask;
pub mod raster;
pub mod source;
pub mod suite;

// Re-export commonly used types
pub use compare::{
    ComparisonReport, ComparisonRequest, ComparisonResult, Orchestrator, Outcome,
    PixelComparator, ToleranceComparator,
};
pub use config::{merge, Configuration};
pub use convention::{
    parse_flags, resolve_horizontal, resolve_vertical, HorizontalAlignment, MaskFlags,
    VerticalAlignment,
};
pub use error::{Error, Result};
pub use listener::{ListenerDispatch, ListenerFactory, ListenerRegistry, ResultListener};
pub use mask::{load_mask_set, Mask, MaskLoadPolicy, MaskSet, MaskSetLoader};
pub use raster::RasterImage;
pub use source::{read_pair, FileSource, GeneratedSource, ImageSource};
pub use suite::{SuiteRunner, SuiteSummary};

/// visreg version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "visreg.toml";
