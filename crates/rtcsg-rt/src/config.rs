//! Engine configuration.

use rtcsg_math::Tolerance;
use rtcsg_prim::{ParticlePolicy, PrepOptions, SubdivisionPolicy};
use serde::{Deserialize, Serialize};

use crate::RtError;

/// What happens to an overlap deeper than the tolerance, besides dropping it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapMode {
    /// Log every occurrence as it is found.
    #[default]
    LogEach,
    /// Aggregate per unordered region pair; log a summary at frame end.
    UniquePairs,
}

/// Ray tracing session configuration.
///
/// ```toml
/// overlap_tolerance = 0.25
/// overlap_mode = "unique_pairs"
/// workers = 4
///
/// [brep]
/// max_depth = 10
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtConfig {
    /// Overlaps no deeper than this are given to the first region.
    pub overlap_tolerance: f64,
    /// Overlap reporting.
    pub overlap_mode: OverlapMode,
    /// Ray shooting threads; 0 uses every available CPU.
    pub workers: usize,
    /// Interval algebra and matrix comparison tolerances.
    pub tolerance: Tolerance,
    /// Particle classification thresholds.
    pub particle: ParticlePolicy,
    /// Free-form surface refinement.
    pub brep: SubdivisionPolicy,
}

impl Default for RtConfig {
    fn default() -> Self {
        Self {
            overlap_tolerance: 0.1,
            overlap_mode: OverlapMode::LogEach,
            workers: 0,
            tolerance: Tolerance::RAYTRACE,
            particle: ParticlePolicy::default(),
            brep: SubdivisionPolicy::default(),
        }
    }
}

impl RtConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, RtError> {
        Ok(toml::from_str(text)?)
    }

    /// Options handed to every primitive's `prep`.
    pub fn prep_options(&self) -> PrepOptions {
        PrepOptions {
            tolerance: self.tolerance,
            particle: self.particle,
            subdivision: self.brep,
        }
    }
}
