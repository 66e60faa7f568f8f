//! Closed-form fallback for networks too sparse or degenerate for exact
//! inference.
//!
//! Each query starts from a fixed Low/Medium/High prior. Every piece of
//! evidence multiplies the adverse-state mass by a configured factor (above
//! 1 for adverse evidence, below 1 for favourable evidence) and the
//! distribution is renormalized after each adjustment. The result has the
//! same shape as exact inference.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::FallbackConfig;

use super::inference::{Distribution, Evidence, InferenceError, InferenceMethod, InferenceResult};
use super::{BayesianNetworkStructure, NodeType};

const LEVELS: [&str; 3] = ["Low", "Medium", "High"];

fn node_type_of(structure: &BayesianNetworkStructure, name: &str) -> Option<NodeType> {
    structure
        .node(name)
        .map(|n| n.node_type)
        .or_else(|| NodeType::from_aggregate_name(name))
}

/// Adverse-mass multiplier for one observation, or `None` when the
/// observation carries no signal.
fn multiplier(node_type: NodeType, state: usize, cfg: &FallbackConfig) -> Option<f64> {
    let last = node_type.states().len() - 1;
    let (adverse, favourable) = match node_type {
        NodeType::Activity => (cfg.activity_present, cfg.activity_absent),
        NodeType::Pressure | NodeType::Problem => (cfg.pressure_high, cfg.pressure_low),
        NodeType::Control => (cfg.control_failed, cfg.control_effective),
        NodeType::Escalation => (cfg.escalation_active, cfg.escalation_inactive),
        NodeType::Mitigation => (cfg.mitigation_failed, cfg.mitigation_effective),
        NodeType::Consequence => return None,
    };
    if state == last {
        Some(adverse)
    } else if state == 0 {
        Some(favourable)
    } else {
        None
    }
}

fn renormalize(probs: &mut [f64], name: &str) -> Result<(), InferenceError> {
    let total: f64 = probs.iter().sum();
    if !(total > 0.0) || !total.is_finite() || probs.iter().any(|p| *p < 0.0) {
        return Err(InferenceError::FallbackFailed(name.to_string()));
    }
    probs.iter_mut().for_each(|p| *p /= total);
    Ok(())
}

/// Heuristic posteriors. Unknown evidence is ignored and unknown query names
/// get a Low/Medium/High distribution with a prior chosen from the name, so
/// this path never rejects its input.
pub fn infer_fallback(
    structure: &BayesianNetworkStructure,
    evidence: &Evidence,
    query: &[String],
    cfg: &FallbackConfig,
) -> Result<InferenceResult, InferenceError> {
    let mut signals: Vec<(NodeType, f64)> = Vec::new();
    for (name, state) in evidence {
        let Some(node_type) = node_type_of(structure, name) else {
            debug!(evidence = %name, "fallback ignores unknown evidence");
            continue;
        };
        let Some(idx) = node_type.state_index(state) else {
            debug!(evidence = %name, state = %state, "fallback ignores unknown state");
            continue;
        };
        if let Some(m) = multiplier(node_type, idx, cfg) {
            signals.push((node_type, m));
        }
    }

    let mut posteriors = BTreeMap::new();
    for name in query {
        let node_type = node_type_of(structure, name);
        let lowered = name.to_lowercase();
        let consequence_side = node_type == Some(NodeType::Consequence)
            || (node_type.is_none() && lowered.contains("consequence"));

        let states: Vec<&str> = match node_type {
            Some(t) => t.states().to_vec(),
            None => LEVELS.to_vec(),
        };

        if let Some(idx) = evidence
            .get(name)
            .and_then(|s| node_type.and_then(|t| t.state_index(s)))
        {
            let mut one_hot = vec![0.0; states.len()];
            one_hot[idx] = 1.0;
            posteriors.insert(name.clone(), Distribution::new(&states, one_hot));
            continue;
        }

        let prior = if consequence_side {
            cfg.consequence_prior
        } else if node_type == Some(NodeType::Problem)
            || (node_type.is_none() && lowered.contains("problem"))
        {
            cfg.problem_prior
        } else {
            cfg.default_prior
        };
        let mut probs: Vec<f64> = if states.len() == 2 {
            vec![prior[0] + prior[1], prior[2]]
        } else {
            prior.to_vec()
        };
        renormalize(&mut probs, name)?;

        let adverse = probs.len() - 1;
        for (source, m) in &signals {
            if *source == NodeType::Mitigation && !consequence_side {
                continue;
            }
            probs[adverse] *= m;
            renormalize(&mut probs, name)?;
        }
        posteriors.insert(name.clone(), Distribution::new(&states, probs));
    }

    Ok(InferenceResult {
        method: InferenceMethod::Fallback,
        posteriors,
        degenerate_reason: None,
    })
}
