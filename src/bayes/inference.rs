//! Exact inference by variable elimination, with dispatch to the fallback.
//!
//! Evidence keys and query names are node ids or a node type's aggregate
//! name (`Pressure_Level`, `Consequence_Level`, ...). Aggregate evidence sets
//! every node of that type; an aggregate query is the mean of the per-node
//! posteriors.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::InferenceConfig;

use super::cpt::Cpt;
use super::fallback::infer_fallback;
use super::{BayesianNetworkStructure, NodeType};

/// Observed states keyed by node id or aggregate name.
pub type Evidence = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InferenceError {
    #[error("network is degenerate for exact inference: {0}")]
    Degenerate(String),
    #[error("unknown node {0:?}")]
    UnknownNode(String),
    #[error("unknown state {state:?} for {node}")]
    UnknownState { node: String, state: String },
    #[error("fallback could not produce a normalized distribution for {0}")]
    FallbackFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InferenceMethod {
    Exact,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub states: Vec<String>,
    pub probs: Vec<f64>,
}

impl Distribution {
    pub fn new(states: &[&str], probs: Vec<f64>) -> Self {
        Self {
            states: states.iter().map(|s| s.to_string()).collect(),
            probs,
        }
    }

    pub fn probability(&self, state: &str) -> Option<f64> {
        self.states
            .iter()
            .position(|s| s.eq_ignore_ascii_case(state))
            .map(|i| self.probs[i])
    }

    pub fn most_likely(&self) -> Option<&str> {
        self.probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| self.states[i].as_str())
    }

    pub fn is_normalized(&self) -> bool {
        let sum: f64 = self.probs.iter().sum();
        self.probs.iter().all(|p| p.is_finite() && *p >= 0.0) && (sum - 1.0).abs() <= 1e-6
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceResult {
    pub method: InferenceMethod,
    pub posteriors: BTreeMap<String, Distribution>,
    /// Why exact inference was skipped, when the fallback ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degenerate_reason: Option<String>,
}

/// Run exact inference, dropping to the fallback heuristic when the network
/// is degenerate. Unknown nodes or states are surfaced either way.
pub fn infer(
    structure: &BayesianNetworkStructure,
    cpts: &BTreeMap<String, Cpt>,
    evidence: &Evidence,
    query: &[String],
    config: &InferenceConfig,
) -> Result<InferenceResult, InferenceError> {
    check_names(structure, evidence, query)?;
    match infer_exact(structure, cpts, evidence, query, config) {
        Ok(result) => Ok(result),
        Err(InferenceError::Degenerate(reason)) => {
            fallback_with_reason(structure, evidence, query, config, reason)
        }
        Err(e) => Err(e),
    }
}

/// Fallback-only inference for a network already known to be degenerate,
/// with the same name checks as [`infer`].
pub(crate) fn infer_degenerate(
    structure: &BayesianNetworkStructure,
    evidence: &Evidence,
    query: &[String],
    config: &InferenceConfig,
    reason: &str,
) -> Result<InferenceResult, InferenceError> {
    check_names(structure, evidence, query)?;
    fallback_with_reason(structure, evidence, query, config, reason.to_string())
}

fn check_names(
    structure: &BayesianNetworkStructure,
    evidence: &Evidence,
    query: &[String],
) -> Result<(), InferenceError> {
    resolve_evidence(structure, evidence)?;
    for name in query {
        resolve_targets(structure, name)?;
    }
    Ok(())
}

fn fallback_with_reason(
    structure: &BayesianNetworkStructure,
    evidence: &Evidence,
    query: &[String],
    config: &InferenceConfig,
    reason: String,
) -> Result<InferenceResult, InferenceError> {
    warn!(
        central_problem = %structure.central_problem,
        reason = %reason,
        "exact inference degenerate; using fallback"
    );
    debug!(evidence = evidence.len(), "fallback dispatch");
    let mut result = infer_fallback(structure, evidence, query, &config.fallback)?;
    result.degenerate_reason = Some(reason);
    Ok(result)
}

fn resolve_targets(
    structure: &BayesianNetworkStructure,
    name: &str,
) -> Result<Vec<usize>, InferenceError> {
    if let Some(i) = structure.nodes.iter().position(|n| n.node_id == name) {
        return Ok(vec![i]);
    }
    if let Some(node_type) = NodeType::from_aggregate_name(name) {
        let targets: Vec<usize> = structure
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.node_type == node_type)
            .map(|(i, _)| i)
            .collect();
        if !targets.is_empty() {
            return Ok(targets);
        }
    }
    Err(InferenceError::UnknownNode(name.to_string()))
}

/// Node index → observed state index.
fn resolve_evidence(
    structure: &BayesianNetworkStructure,
    evidence: &Evidence,
) -> Result<HashMap<usize, usize>, InferenceError> {
    let mut out = HashMap::new();
    for (name, state) in evidence {
        for i in resolve_targets(structure, name)? {
            let node = &structure.nodes[i];
            let idx = node
                .node_type
                .state_index(state)
                .ok_or_else(|| InferenceError::UnknownState {
                    node: name.clone(),
                    state: state.clone(),
                })?;
            out.insert(i, idx);
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
struct Factor {
    vars: Vec<usize>,
    cards: Vec<usize>,
    values: Vec<f64>,
}

fn strides(cards: &[usize]) -> Vec<usize> {
    let mut out = vec![1; cards.len()];
    for k in (0..cards.len().saturating_sub(1)).rev() {
        out[k] = out[k + 1] * cards[k + 1];
    }
    out
}

/// Advance a row-major assignment (last variable fastest).
fn step(assignment: &mut [usize], cards: &[usize]) {
    for k in (0..assignment.len()).rev() {
        assignment[k] += 1;
        if assignment[k] < cards[k] {
            return;
        }
        assignment[k] = 0;
    }
}

impl Factor {
    fn from_cpt(
        cpt: &Cpt,
        index: &HashMap<&str, usize>,
        own: usize,
    ) -> Result<Self, InferenceError> {
        let mut vars = Vec::with_capacity(cpt.parents.len() + 1);
        for parent in &cpt.parents {
            let i = index
                .get(parent.as_str())
                .copied()
                .ok_or_else(|| InferenceError::UnknownNode(parent.clone()))?;
            vars.push(i);
        }
        vars.push(own);
        let mut cards = cpt.parent_cards.clone();
        cards.push(cpt.states.len());
        let values: Vec<f64> = cpt.rows.iter().flatten().copied().collect();
        if values.len() != cards.iter().product::<usize>() {
            return Err(InferenceError::Degenerate(format!(
                "CPT for {} has the wrong shape",
                cpt.node_id
            )));
        }
        Ok(Self { vars, cards, values })
    }

    fn size(&self) -> usize {
        self.values.len()
    }

    fn reduce(&self, var: usize, state: usize) -> Factor {
        let Some(pos) = self.vars.iter().position(|v| *v == var) else {
            return self.clone();
        };
        let mut vars = self.vars.clone();
        let mut cards = self.cards.clone();
        vars.remove(pos);
        cards.remove(pos);
        let mut values = Vec::with_capacity(self.size() / self.cards[pos]);
        let mut assignment = vec![0; self.vars.len()];
        for value in &self.values {
            if assignment[pos] == state {
                values.push(*value);
            }
            step(&mut assignment, &self.cards);
        }
        Factor { vars, cards, values }
    }

    fn product(&self, other: &Factor, limit: usize) -> Result<Factor, InferenceError> {
        let mut vars = self.vars.clone();
        let mut cards = self.cards.clone();
        for (v, c) in other.vars.iter().zip(&other.cards) {
            if !vars.contains(v) {
                vars.push(*v);
                cards.push(*c);
            }
        }
        let size = cards
            .iter()
            .try_fold(1usize, |acc, c| acc.checked_mul(*c))
            .filter(|s| *s <= limit)
            .ok_or_else(|| {
                InferenceError::Degenerate(format!(
                    "factor over {} variables exceeds size limit {limit}",
                    vars.len()
                ))
            })?;
        let positions = |f: &Factor| -> Vec<usize> {
            f.vars
                .iter()
                .map(|v| vars.iter().position(|x| x == v).unwrap_or(0))
                .collect()
        };
        let pos_a = positions(self);
        let pos_b = positions(other);
        let stride_a = strides(&self.cards);
        let stride_b = strides(&other.cards);

        let mut values = Vec::with_capacity(size);
        let mut assignment = vec![0; vars.len()];
        for _ in 0..size {
            let ia: usize = pos_a.iter().zip(&stride_a).map(|(p, s)| assignment[*p] * s).sum();
            let ib: usize = pos_b.iter().zip(&stride_b).map(|(p, s)| assignment[*p] * s).sum();
            values.push(self.values[ia] * other.values[ib]);
            step(&mut assignment, &cards);
        }
        Ok(Factor { vars, cards, values })
    }

    fn sum_out(&self, var: usize) -> Factor {
        let Some(pos) = self.vars.iter().position(|v| *v == var) else {
            return self.clone();
        };
        let mut vars = self.vars.clone();
        let mut cards = self.cards.clone();
        vars.remove(pos);
        cards.remove(pos);
        let out_strides = strides(&cards);
        let mut values = vec![0.0; cards.iter().product()];
        let mut assignment = vec![0; self.vars.len()];
        for value in &self.values {
            let idx: usize = assignment
                .iter()
                .enumerate()
                .filter(|(k, _)| *k != pos)
                .zip(&out_strides)
                .map(|((_, a), s)| a * s)
                .sum();
            values[idx] += value;
            step(&mut assignment, &self.cards);
        }
        Factor { vars, cards, values }
    }
}

fn multiply_all(factors: Vec<Factor>, limit: usize) -> Result<Factor, InferenceError> {
    let mut iter = factors.into_iter();
    let Some(first) = iter.next() else {
        return Ok(Factor {
            vars: Vec::new(),
            cards: Vec::new(),
            values: vec![1.0],
        });
    };
    iter.try_fold(first, |acc, f| acc.product(&f, limit))
}

/// Exact posterior marginals by variable elimination.
///
/// Fails with `Degenerate` when the network has no edges, a factor would
/// exceed `max_factor_size`, or the evidence has zero probability.
pub fn infer_exact(
    structure: &BayesianNetworkStructure,
    cpts: &BTreeMap<String, Cpt>,
    evidence: &Evidence,
    query: &[String],
    config: &InferenceConfig,
) -> Result<InferenceResult, InferenceError> {
    if structure.edges.is_empty() {
        return Err(InferenceError::Degenerate("network has no edges".to_string()));
    }
    let observed = resolve_evidence(structure, evidence)?;
    let index: HashMap<&str, usize> = structure
        .nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.node_id.as_str(), i))
        .collect();

    let mut base = Vec::with_capacity(structure.nodes.len());
    for (i, node) in structure.nodes.iter().enumerate() {
        let cpt = cpts
            .get(&node.node_id)
            .ok_or_else(|| InferenceError::UnknownNode(node.node_id.clone()))?;
        let mut factor = Factor::from_cpt(cpt, &index, i)?;
        for (var, state) in &observed {
            factor = factor.reduce(*var, *state);
        }
        base.push(factor);
    }

    let mut posteriors = BTreeMap::new();
    for name in query {
        let targets = resolve_targets(structure, name)?;
        let mut marginals = Vec::with_capacity(targets.len());
        for target in &targets {
            marginals.push(node_marginal(structure, &base, &observed, *target, config)?);
        }
        let node_type = structure.nodes[targets[0]].node_type;
        let k = node_type.states().len();
        let mut probs = vec![0.0; k];
        for m in &marginals {
            for (acc, p) in probs.iter_mut().zip(m) {
                *acc += p / marginals.len() as f64;
            }
        }
        posteriors.insert(name.clone(), Distribution::new(node_type.states(), probs));
    }
    Ok(InferenceResult {
        method: InferenceMethod::Exact,
        posteriors,
        degenerate_reason: None,
    })
}

fn node_marginal(
    structure: &BayesianNetworkStructure,
    base: &[Factor],
    observed: &HashMap<usize, usize>,
    target: usize,
    config: &InferenceConfig,
) -> Result<Vec<f64>, InferenceError> {
    let k = structure.nodes[target].states().len();
    if let Some(state) = observed.get(&target) {
        let mut one_hot = vec![0.0; k];
        one_hot[*state] = 1.0;
        return Ok(one_hot);
    }

    let mut factors: Vec<Factor> = base.to_vec();
    let mut hidden: Vec<usize> = (0..structure.nodes.len())
        .filter(|i| *i != target && !observed.contains_key(i))
        .collect();

    while !hidden.is_empty() {
        // greedy: eliminate the variable whose merged factor is smallest
        let (pick, _) = hidden
            .iter()
            .enumerate()
            .map(|(slot, var)| {
                let mut scope: Vec<(usize, usize)> = Vec::new();
                for f in factors.iter().filter(|f| f.vars.contains(var)) {
                    for (v, c) in f.vars.iter().zip(&f.cards) {
                        if !scope.iter().any(|(x, _)| x == v) {
                            scope.push((*v, *c));
                        }
                    }
                }
                let cost = scope
                    .iter()
                    .fold(1usize, |acc, (_, c)| acc.saturating_mul(*c));
                (slot, cost)
            })
            .min_by_key(|(_, cost)| *cost)
            .unwrap_or((0, 0));
        let var = hidden.remove(pick);
        let (touching, rest): (Vec<Factor>, Vec<Factor>) =
            factors.into_iter().partition(|f| f.vars.contains(&var));
        factors = rest;
        if touching.is_empty() {
            continue;
        }
        let merged = multiply_all(touching, config.max_factor_size)?;
        factors.push(merged.sum_out(var));
    }

    let joint = multiply_all(factors, config.max_factor_size)?;
    let mut probs = vec![0.0; k];
    if joint.vars.is_empty() {
        return Err(InferenceError::Degenerate(format!(
            "{} vanished during elimination",
            structure.nodes[target].node_id
        )));
    }
    // only the target variable remains
    for (state, value) in joint.values.iter().enumerate().take(k) {
        probs[state] = *value;
    }
    let total: f64 = probs.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(InferenceError::Degenerate(
            "evidence has zero probability".to_string(),
        ));
    }
    Ok(probs.into_iter().map(|p| p / total).collect())
}
