//! Mask filename convention
//!
//! Mask files are named `<name>.<flag1>[-<flag2>...].<extension>`, for
//! example `header.top-right.png`. The second dot-separated segment carries
//! the orientation flags.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Which horizontal edge a mask is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HorizontalAlignment {
    #[default]
    Left,
    Right,
}

/// Which vertical edge a mask is anchored to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalAlignment {
    #[default]
    Top,
    Bottom,
}

/// Unordered set of flag tokens decoded from a filename
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskFlags(BTreeSet<String>);

impl MaskFlags {
    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn horizontal(&self) -> HorizontalAlignment {
        resolve_horizontal(self)
    }

    pub fn vertical(&self) -> VerticalAlignment {
        resolve_vertical(self)
    }
}

impl<S: Into<String>> FromIterator<S> for MaskFlags {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Decode the flag segment of `filename`.
///
/// Trailing empty segments are not counted, so `header.` has a single part
/// and is rejected. Unknown tokens are kept; they simply resolve to the
/// default alignments.
pub fn parse_flags(filename: &str) -> Result<MaskFlags> {
    let mut parts: Vec<&str> = filename.split('.').collect();
    while parts.last().is_some_and(|part| part.is_empty()) {
        parts.pop();
    }
    if parts.len() < 2 {
        return Err(Error::MalformedMaskFilename(filename.to_string()));
    }

    Ok(parts[1].split('-').filter(|token| !token.is_empty()).collect())
}

pub fn resolve_horizontal(flags: &MaskFlags) -> HorizontalAlignment {
    if flags.contains("right") {
        HorizontalAlignment::Right
    } else {
        HorizontalAlignment::Left
    }
}

pub fn resolve_vertical(flags: &MaskFlags) -> VerticalAlignment {
    if flags.contains("bottom") {
        VerticalAlignment::Bottom
    } else {
        VerticalAlignment::Top
    }
}
