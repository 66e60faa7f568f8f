//! Tunable constants for risk aggregation, link suggestion and inference.
//!
//! The numeric defaults reproduce the behaviour of the spreadsheet-era
//! bowtie tool this crate replaces. They are heuristics, not validated risk
//! math, so every one of them can be overridden from a JSON file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::linking::SimilarityMethod;

/// Top-level configuration. Every section falls back to its defaults when
/// omitted from the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BowtieConfig {
    pub risk: RiskConfig,
    pub linking: LinkingConfig,
    pub inference: InferenceConfig,
    pub vocabulary: VocabularyConfig,
}

/// Risk-level thresholds and the per-link likelihood aggregation constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Likelihood × severity scores up to this value are `Low`.
    pub low_max: u32,
    /// Scores up to this value (and above `low_max`) are `Medium`.
    pub medium_max: u32,
    /// Exponent applied to the chained likelihood product.
    pub likelihood_exponent: f64,
    /// Multiplier applied after the exponent.
    pub likelihood_scale: f64,
    /// Divisor applied to every link after the first in the chain.
    pub stage_scale: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            low_max: 6,
            medium_max: 15,
            likelihood_exponent: 0.3,
            likelihood_scale: 2.5,
            stage_scale: 5.0,
        }
    }
}

/// Defaults for `find_links`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkingConfig {
    pub similarity_threshold: f64,
    pub max_links_per_item: usize,
    pub methods: Vec<SimilarityMethod>,
}

impl Default for LinkingConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.1,
            max_links_per_item: 3,
            methods: SimilarityMethod::all().to_vec(),
        }
    }
}

/// Bayesian-network construction limits and the fallback heuristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    /// Spread of the default CPT kernel; smaller is sharper.
    pub cpt_spread: f64,
    /// Uniform mass mixed into every default CPT row.
    pub cpt_floor: f64,
    /// Refuse to tabulate a CPT with more parent-state combinations than this.
    pub max_parent_combinations: usize,
    /// Exact inference gives up (and falls back) past this factor size.
    pub max_factor_size: usize,
    pub fallback: FallbackConfig,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            cpt_spread: 0.8,
            cpt_floor: 0.05,
            max_parent_combinations: 4_096,
            max_factor_size: 1 << 20,
            fallback: FallbackConfig::default(),
        }
    }
}

/// Closed-form fallback: base priors and the multiplier applied to the
/// adverse-state mass for each kind of evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Low/Medium/High prior for consequence-side queries.
    pub consequence_prior: [f64; 3],
    /// Low/Medium/High prior for the central problem.
    pub problem_prior: [f64; 3],
    /// Low/Medium/High prior for everything else.
    pub default_prior: [f64; 3],
    pub activity_present: f64,
    pub activity_absent: f64,
    pub pressure_high: f64,
    pub pressure_low: f64,
    pub control_failed: f64,
    pub control_effective: f64,
    pub escalation_active: f64,
    pub escalation_inactive: f64,
    pub mitigation_failed: f64,
    pub mitigation_effective: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            consequence_prior: [0.5, 0.3, 0.2],
            problem_prior: [0.4, 0.4, 0.2],
            default_prior: [0.3, 0.5, 0.2],
            activity_present: 1.5,
            activity_absent: 0.7,
            pressure_high: 2.0,
            pressure_low: 0.6,
            control_failed: 1.8,
            control_effective: 0.5,
            escalation_active: 1.4,
            escalation_inactive: 0.8,
            mitigation_failed: 1.6,
            mitigation_effective: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VocabularyConfig {
    /// Directory holding `activities.csv`, `pressures.csv`, `controls.csv`
    /// and `consequences.csv`.
    pub dir: Option<PathBuf>,
    pub load_timeout_ms: u64,
}

impl Default for VocabularyConfig {
    fn default() -> Self {
        Self {
            dir: None,
            load_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid config value {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl BowtieConfig {
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("BOWTIE_CONFIG") {
            return PathBuf::from(path);
        }
        PathBuf::from("bowtie.json")
    }

    /// Load from `default_path()`, returning defaults when the file is absent.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        load_config_from_path(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.risk.low_max >= self.risk.medium_max {
            return Err(ConfigError::Invalid {
                field: "risk.low_max",
                reason: format!(
                    "must be below medium_max ({} >= {})",
                    self.risk.low_max, self.risk.medium_max
                ),
            });
        }
        if !(self.risk.stage_scale > 0.0) {
            return Err(ConfigError::Invalid {
                field: "risk.stage_scale",
                reason: "must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.linking.similarity_threshold) {
            return Err(ConfigError::Invalid {
                field: "linking.similarity_threshold",
                reason: "must lie in [0, 1]".to_string(),
            });
        }
        if self.linking.max_links_per_item == 0 {
            return Err(ConfigError::Invalid {
                field: "linking.max_links_per_item",
                reason: "must be at least 1".to_string(),
            });
        }
        if !(self.inference.cpt_spread > 0.0) {
            return Err(ConfigError::Invalid {
                field: "inference.cpt_spread",
                reason: "must be positive".to_string(),
            });
        }
        if !(0.0..1.0).contains(&self.inference.cpt_floor) {
            return Err(ConfigError::Invalid {
                field: "inference.cpt_floor",
                reason: "must lie in [0, 1)".to_string(),
            });
        }
        let fb = &self.inference.fallback;
        for (field, prior) in [
            ("inference.fallback.consequence_prior", fb.consequence_prior),
            ("inference.fallback.problem_prior", fb.problem_prior),
            ("inference.fallback.default_prior", fb.default_prior),
        ] {
            if prior.iter().any(|p| !p.is_finite() || *p < 0.0) || prior.iter().sum::<f64>() <= 0.0
            {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "prior weights must be non-negative with a positive sum".to_string(),
                });
            }
        }
        for (field, multiplier) in [
            ("inference.fallback.activity_present", fb.activity_present),
            ("inference.fallback.activity_absent", fb.activity_absent),
            ("inference.fallback.pressure_high", fb.pressure_high),
            ("inference.fallback.pressure_low", fb.pressure_low),
            ("inference.fallback.control_failed", fb.control_failed),
            ("inference.fallback.control_effective", fb.control_effective),
            ("inference.fallback.escalation_active", fb.escalation_active),
            ("inference.fallback.escalation_inactive", fb.escalation_inactive),
            ("inference.fallback.mitigation_failed", fb.mitigation_failed),
            ("inference.fallback.mitigation_effective", fb.mitigation_effective),
        ] {
            if !(multiplier.is_finite() && multiplier > 0.0) {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("multiplier must be positive and finite, got {multiplier}"),
                });
            }
        }
        Ok(())
    }
}

pub fn load_config_from_path(path: impl AsRef<Path>) -> Result<BowtieConfig, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config: BowtieConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}
