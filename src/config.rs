//! Engine configuration.
//!
//! Runtime knobs for the scoring engine, loaded hierarchically from:
//! - `pmml-score.toml` (optional configuration file)
//! - Environment variables (`PMML_SCORE_*` prefix)
//!
//! ## Example
//!
//! ```toml
//! # pmml-score.toml
//! set_threshold = 150
//! string_hashing = false
//! parallel_segment_threshold = 25
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! PMML_SCORE_SET_THRESHOLD=200
//! PMML_SCORE_STRING_HASHING=true
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Scoring engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Membership-set size above which set predicates switch from an ordered
    /// set to a hash set. Representation only; truth values are identical on
    /// both sides of the threshold.
    pub set_threshold: usize,

    /// Replace the intern table with a stable string hash. Removes the only
    /// piece of shared mutable state at the cost of collision risk.
    pub string_hashing: bool,

    /// Segment count above which commutative ensemble aggregations use a
    /// parallel reduce (only with the `parallel` feature enabled).
    pub parallel_segment_threshold: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            set_threshold: 150,
            string_hashing: false,
            parallel_segment_threshold: 25,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `pmml-score.toml` and `PMML_SCORE_*`
    /// environment variables, falling back to defaults.
    pub fn load() -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(EngineConfig::default()))
            .merge(Toml::file("pmml-score.toml"))
            .merge(Env::prefixed("PMML_SCORE_"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.set_threshold, 150);
        assert!(!config.string_hashing);
        assert_eq!(config.parallel_segment_threshold, 25);
    }

    #[test]
    fn load_without_file_uses_defaults() {
        let config = EngineConfig::load().expect("defaults should always extract");
        assert_eq!(config.set_threshold, EngineConfig::default().set_threshold);
    }
}
