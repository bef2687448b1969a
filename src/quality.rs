//! Quality tiers.
//!
//! A continuous quality value in `[0.1, 1.0]` is bucketed into a handful of
//! downsampling presets, while the JPEG encoder quality follows the value
//! directly.

use crate::CompressError;
use std::fmt;
use std::str::FromStr;

pub const MIN_QUALITY: f32 = 0.1;
pub const MAX_QUALITY: f32 = 1.0;
pub const DEFAULT_QUALITY: f32 = 0.7;

/// Upper bounds (inclusive) of each tier and the longest edge allowed in it.
const TIERS: [(f32, u32); 3] = [(0.2, 400), (0.5, 720), (0.8, 1080)];
const TOP_TIER_DIMENSION: u32 = 1500;

/// A validated quality value.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct QualityTier(f32);

impl QualityTier {
    pub fn new(quality: f32) -> Result<Self, CompressError> {
        if !quality.is_finite() || !(MIN_QUALITY..=MAX_QUALITY).contains(&quality) {
            return Err(CompressError::InvalidQuality(quality));
        }
        Ok(QualityTier(quality))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Longest edge, in pixels, an image may keep at this quality.
    pub fn max_dimension(self) -> u32 {
        TIERS
            .iter()
            .find(|(upper, _)| self.0 <= *upper)
            .map(|(_, dimension)| *dimension)
            .unwrap_or(TOP_TIER_DIMENSION)
    }

    /// JPEG encoder quality, 1-100.
    pub fn encoder_quality(self) -> u8 {
        (self.0 * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl Default for QualityTier {
    fn default() -> Self {
        QualityTier(DEFAULT_QUALITY)
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QualityTier {
    type Err = CompressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<f32>()
            .map_err(|_| CompressError::InvalidQuality(f32::NAN))?;
        QualityTier::new(value)
    }
}
