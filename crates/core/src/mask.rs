//! Masks and mask set loading
//!
//! A mask is an image anchored to one corner of the compared images; its
//! opaque pixels mark a region that is excluded from comparison. Masks are
//! loaded once per run from a flat directory, see [`MaskSetLoader`].

use crate::config::{keys, Configuration};
use crate::convention::{parse_flags, HorizontalAlignment, VerticalAlignment};
use crate::raster::RasterImage;
use crate::source::{FileSource, ImageSource};
use crate::{Error, Result};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// An exclusion region image with its anchoring
#[derive(Debug, Clone)]
pub struct Mask {
    name: String,
    source: String,
    vertical: VerticalAlignment,
    horizontal: HorizontalAlignment,
    raster: RasterImage,
}

impl Mask {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        vertical: VerticalAlignment,
        horizontal: HorizontalAlignment,
        raster: RasterImage,
    ) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            vertical,
            horizontal,
            raster,
        }
    }

    /// Full filename, flags segment included
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Filename up to the first `.`
    pub fn logical_name(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn vertical(&self) -> VerticalAlignment {
        self.vertical
    }

    pub fn horizontal(&self) -> HorizontalAlignment {
        self.horizontal
    }

    pub fn raster(&self) -> &RasterImage {
        &self.raster
    }

    /// Top-left position of this mask inside a `width` x `height` image
    pub fn offset_within(&self, width: u32, height: u32) -> (u32, u32) {
        let (mask_width, mask_height) = self.raster.dimensions();
        let x = match self.horizontal {
            HorizontalAlignment::Left => 0,
            HorizontalAlignment::Right => width.saturating_sub(mask_width),
        };
        let y = match self.vertical {
            VerticalAlignment::Top => 0,
            VerticalAlignment::Bottom => height.saturating_sub(mask_height),
        };
        (x, y)
    }
}

impl PartialEq for Mask {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Mask {}

impl Hash for Mask {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

/// Masks unique by name, without any ordering
#[derive(Debug, Clone, Default)]
pub struct MaskSet {
    masks: HashMap<String, Mask>,
}

impl MaskSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mask, returning the one with the same name it displaced
    pub fn insert(&mut self, mask: Mask) -> Option<Mask> {
        self.masks.insert(mask.name.clone(), mask)
    }

    pub fn get(&self, name: &str) -> Option<&Mask> {
        self.masks.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.masks.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mask> {
        self.masks.values()
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

impl FromIterator<Mask> for MaskSet {
    fn from_iter<I: IntoIterator<Item = Mask>>(iter: I) -> Self {
        let mut set = Self::new();
        for mask in iter {
            set.insert(mask);
        }
        set
    }
}

/// What to do with a mask entry that cannot be loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskLoadPolicy {
    /// Fail the whole load with the entry's error
    #[default]
    Abort,
    /// Log a warning and leave the entry out
    SkipInvalid,
}

impl MaskLoadPolicy {
    /// Policy named by `mask-load-policy`, defaulting to [`MaskLoadPolicy::Abort`]
    pub fn from_config(config: &Configuration) -> Result<Self> {
        Ok(config.get_parsed(keys::MASK_LOAD_POLICY)?.unwrap_or_default())
    }
}

impl FromStr for MaskLoadPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "abort" => Ok(Self::Abort),
            "skip-invalid" => Ok(Self::SkipInvalid),
            other => Err(Error::InvalidConfig(format!("unknown mask load policy '{}'", other))),
        }
    }
}

/// Builds a [`MaskSet`] from a flat directory of mask images
pub struct MaskSetLoader<S: ImageSource = FileSource> {
    source: S,
    policy: MaskLoadPolicy,
}

impl Default for MaskSetLoader<FileSource> {
    fn default() -> Self {
        Self::new(FileSource::default())
    }
}

impl<S: ImageSource> MaskSetLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            policy: MaskLoadPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MaskLoadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Load every regular file in `directory` as a mask.
    ///
    /// Subdirectories are not descended into. Each entry is retrieved by its
    /// absolute path with an empty local configuration, so a source's
    /// `base-directory` never redirects mask lookups.
    pub fn load(&self, directory: &Path) -> Result<MaskSet> {
        let unreadable = |source: std::io::Error| Error::DirectoryUnreadable {
            path: directory.to_path_buf(),
            source,
        };

        let absolute = if directory.is_absolute() {
            directory.to_path_buf()
        } else {
            std::env::current_dir().map_err(unreadable)?.join(directory)
        };

        let mut masks = MaskSet::new();
        for entry in std::fs::read_dir(&absolute).map_err(unreadable)? {
            let entry = entry.map_err(unreadable)?;
            let path = entry.path();
            if path.is_dir() {
                debug!("Skipping nested directory {}", path.display());
                continue;
            }

            match self.load_entry(&path) {
                Ok(mask) => {
                    masks.insert(mask);
                }
                Err(e) if self.policy == MaskLoadPolicy::SkipInvalid => {
                    warn!("Skipping mask {}: {}", path.display(), e);
                }
                Err(e) => return Err(e),
            }
        }

        info!("Loaded {} mask(s) from {}", masks.len(), directory.display());
        Ok(masks)
    }

    fn load_entry(&self, path: &Path) -> Result<Mask> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        debug!("Reading mask image {}", name);

        let flags = parse_flags(&name)?;
        let source = path.to_string_lossy().to_string();
        let raster = self.source.retrieve(&source, &Configuration::new())?;

        Ok(Mask::new(name, source, flags.vertical(), flags.horizontal(), raster))
    }
}

/// Load a mask set from the filesystem, aborting on the first bad entry
pub fn load_mask_set(directory: &Path) -> Result<MaskSet> {
    MaskSetLoader::<FileSource>::default().load(directory)
}
