//! Risk-level classification and per-link aggregation.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RiskConfig;

use super::LinkScores;

/// Three-tier summary of likelihood × severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 3] = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High];

    /// Classify a likelihood × severity score (`<= low_max` Low,
    /// `<= medium_max` Medium, otherwise High).
    pub fn from_score(score: u32, cfg: &RiskConfig) -> Self {
        if score <= cfg.low_max {
            RiskLevel::Low
        } else if score <= cfg.medium_max {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        }
    }

    pub fn from_pair(likelihood: u8, severity: u8, cfg: &RiskConfig) -> Self {
        Self::from_score(likelihood as u32 * severity as u32, cfg)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(RiskLevel::Low),
            "medium" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            _ => None,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dampened geometric combination of the five link likelihoods.
///
/// The first link enters as-is, every later one is divided by `stage_scale`,
/// the product is raised to `likelihood_exponent`, multiplied by
/// `likelihood_scale`, rounded and clamped to 1..=5. A single weak link does
/// not zero the chain but several weak links compound.
pub fn overall_likelihood(scores: &LinkScores, cfg: &RiskConfig) -> u8 {
    let ratings = scores.in_order();
    let mut product = ratings[0].likelihood as f64;
    for rating in &ratings[1..] {
        product *= rating.likelihood as f64 / cfg.stage_scale;
    }
    let value = product.max(0.0).powf(cfg.likelihood_exponent) * cfg.likelihood_scale;
    if !value.is_finite() {
        return 1;
    }
    value.round().clamp(1.0, 5.0) as u8
}

/// The chain is as severe as its worst link.
pub fn overall_severity(scores: &LinkScores) -> u8 {
    scores
        .in_order()
        .iter()
        .map(|r| r.severity)
        .max()
        .unwrap_or(1)
        .clamp(1, 5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bowtie::LinkRating;

    #[test]
    fn documented_boundaries_hold() {
        let cfg = RiskConfig::default();
        assert_eq!(RiskLevel::from_pair(2, 3, &cfg), RiskLevel::Low);
        assert_eq!(RiskLevel::from_pair(3, 3, &cfg), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_pair(4, 4, &cfg), RiskLevel::High);
        assert_eq!(RiskLevel::from_pair(3, 5, &cfg), RiskLevel::Medium);
    }

    #[test]
    fn monotone_in_both_arguments() {
        let cfg = RiskConfig::default();
        for l in 1..=5u8 {
            for s in 1..=5u8 {
                let here = RiskLevel::from_pair(l, s, &cfg);
                if l < 5 {
                    assert!(RiskLevel::from_pair(l + 1, s, &cfg) >= here);
                }
                if s < 5 {
                    assert!(RiskLevel::from_pair(l, s + 1, &cfg) >= here);
                }
            }
        }
    }

    #[test]
    fn aggregation_matches_reference_values() {
        let cfg = RiskConfig::default();
        // 5 * 1^4 = 5; 5^0.3 * 2.5 = 4.05
        let all_high = LinkScores::uniform(LinkRating::new(5, 2));
        assert_eq!(overall_likelihood(&all_high, &cfg), 4);
        // 1 * 0.2^4 = 0.0016; 0.0016^0.3 * 2.5 = 0.36 -> clamped to 1
        let all_low = LinkScores::uniform(LinkRating::new(1, 1));
        assert_eq!(overall_likelihood(&all_low, &cfg), 1);
        // 3 * 0.6^4 = 0.3888; ^0.3 = 0.753; * 2.5 = 1.88 -> 2
        let mid = LinkScores::uniform(LinkRating::new(3, 3));
        assert_eq!(overall_likelihood(&mid, &cfg), 2);
    }

    #[test]
    fn severity_takes_the_worst_link() {
        let mut scores = LinkScores::uniform(LinkRating::new(3, 2));
        scores.escalation_central.severity = 5;
        assert_eq!(overall_severity(&scores), 5);
    }
}
