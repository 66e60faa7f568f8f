//! Bowtie → Bayesian network compilation, CPTs and inference.
//!
//! A network is compiled per central problem. Node ids are namespaced by
//! type (`pressure:Oil spill`), so the same label used in two roles yields
//! two distinct nodes. Every edge points from an earlier role to a later
//! one in bowtie order, so the graph is acyclic by construction; `compile`
//! still checks it.

pub mod cpt;
pub mod fallback;
pub mod inference;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::bowtie::{filter_by_problem, BowtieRecord, RiskLevel, Role};
use crate::config::{InferenceConfig, RiskConfig};

pub use cpt::{create_cpts, Cpt, CptError};
pub use fallback::infer_fallback;
pub use inference::{
    infer, infer_exact, Distribution, Evidence, InferenceError, InferenceMethod, InferenceResult,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    #[error("no records for central problem {central_problem:?}")]
    EmptyScenario { central_problem: String },
    #[error("network contains a cycle through {node_id}")]
    Cycle { node_id: String },
}

#[derive(Debug, thiserror::Error)]
pub enum BayesError {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Cpt(#[from] CptError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    Activity,
    Pressure,
    Control,
    Escalation,
    Problem,
    Mitigation,
    Consequence,
}

impl NodeType {
    pub const ALL: [NodeType; 7] = [
        NodeType::Activity,
        NodeType::Pressure,
        NodeType::Control,
        NodeType::Escalation,
        NodeType::Problem,
        NodeType::Mitigation,
        NodeType::Consequence,
    ];

    pub fn from_role(role: Role) -> Self {
        match role {
            Role::Activity => NodeType::Activity,
            Role::Pressure => NodeType::Pressure,
            Role::PreventiveControl => NodeType::Control,
            Role::EscalationFactor => NodeType::Escalation,
            Role::CentralProblem => NodeType::Problem,
            Role::ProtectiveMitigation => NodeType::Mitigation,
            Role::Consequence => NodeType::Consequence,
        }
    }

    /// States ordered from most favourable to most adverse.
    pub fn states(&self) -> &'static [&'static str] {
        match self {
            NodeType::Activity => &["Absent", "Present"],
            NodeType::Pressure | NodeType::Problem | NodeType::Consequence => {
                &["Low", "Medium", "High"]
            }
            NodeType::Control | NodeType::Mitigation => &["Effective", "Partial", "Failed"],
            NodeType::Escalation => &["Inactive", "Active"],
        }
    }

    pub fn state_index(&self, state: &str) -> Option<usize> {
        let wanted = state.trim();
        self.states()
            .iter()
            .position(|s| s.eq_ignore_ascii_case(wanted))
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            NodeType::Activity => "activity",
            NodeType::Pressure => "pressure",
            NodeType::Control => "control",
            NodeType::Escalation => "escalation",
            NodeType::Problem => "problem",
            NodeType::Mitigation => "mitigation",
            NodeType::Consequence => "consequence",
        }
    }

    /// Name addressing every node of this type at once, usable as an
    /// evidence key or query name.
    pub fn aggregate_name(&self) -> &'static str {
        match self {
            NodeType::Activity => "Activity",
            NodeType::Pressure => "Pressure_Level",
            NodeType::Control => "Control_Effect",
            NodeType::Escalation => "Escalation_Level",
            NodeType::Problem => "Problem_Level",
            NodeType::Mitigation => "Mitigation_Effect",
            NodeType::Consequence => "Consequence_Level",
        }
    }

    pub fn from_aggregate_name(name: &str) -> Option<Self> {
        let name = name.trim();
        NodeType::ALL
            .into_iter()
            .find(|t| t.aggregate_name().eq_ignore_ascii_case(name))
    }

    /// Cause-side and barrier nodes: the ones scenario presets set.
    pub fn is_evidence_bearing(&self) -> bool {
        !matches!(self, NodeType::Problem | NodeType::Consequence)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub node_id: String,
    pub label: String,
    pub node_type: NodeType,
}

impl Node {
    pub fn states(&self) -> &'static [&'static str] {
        self.node_type.states()
    }

    /// State this node takes in one record. Entities not on the record's
    /// pathway take their first (most favourable) state.
    pub fn observed_state(&self, record: &BowtieRecord) -> usize {
        let role = match self.node_type {
            NodeType::Activity => Role::Activity,
            NodeType::Pressure => Role::Pressure,
            NodeType::Control => Role::PreventiveControl,
            NodeType::Escalation => Role::EscalationFactor,
            NodeType::Problem => Role::CentralProblem,
            NodeType::Mitigation => Role::ProtectiveMitigation,
            NodeType::Consequence => Role::Consequence,
        };
        let term = record.term(role);
        if term.is_missing() || term.name.trim() != self.label {
            return 0;
        }
        let band = |score: u8| match score {
            0..=2 => 0,
            3 => 1,
            _ => 2,
        };
        match self.node_type {
            NodeType::Activity | NodeType::Escalation => 1,
            NodeType::Pressure | NodeType::Control => band(record.effective_likelihood()),
            NodeType::Mitigation | NodeType::Consequence => band(record.effective_severity()),
            NodeType::Problem => {
                let level = record.risk_level.unwrap_or_else(|| {
                    RiskLevel::from_pair(
                        record.effective_likelihood(),
                        record.effective_severity(),
                        &RiskConfig::default(),
                    )
                });
                match level {
                    RiskLevel::Low => 0,
                    RiskLevel::Medium => 1,
                    RiskLevel::High => 2,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianNetworkStructure {
    pub central_problem: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    /// Rows the structure was compiled from; kept for data-driven CPTs.
    #[serde(skip)]
    pub records: Vec<BowtieRecord>,
}

impl BayesianNetworkStructure {
    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    pub fn nodes_of_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.node_type == node_type)
    }

    /// Parents of `node_id` in edge order.
    pub fn parents(&self, node_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.to == node_id)
            .map(|e| e.from.as_str())
            .collect()
    }

    pub fn children(&self, node_id: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.from == node_id)
            .map(|e| e.to.as_str())
            .collect()
    }

    /// Kahn's algorithm; ties resolved in node order.
    pub fn topological_order(&self) -> Result<Vec<&Node>, CompileError> {
        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.node_id.as_str(), i))
            .collect();
        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut outgoing: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for edge in &self.edges {
            let ends = (index.get(edge.from.as_str()), index.get(edge.to.as_str()));
            if let (Some(&from), Some(&to)) = ends {
                in_degree[to] += 1;
                outgoing[from].push(to);
            }
        }
        let mut ready: VecDeque<usize> = (0..self.nodes.len())
            .filter(|i| in_degree[*i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_front() {
            order.push(&self.nodes[i]);
            for &child in &outgoing[i] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    ready.push_back(child);
                }
            }
        }
        if order.len() < self.nodes.len() {
            let stuck = (0..self.nodes.len())
                .find(|i| in_degree[*i] > 0)
                .map(|i| self.nodes[i].node_id.clone())
                .unwrap_or_default();
            return Err(CompileError::Cycle { node_id: stuck });
        }
        Ok(order)
    }

    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_ok()
    }
}

fn node_id(node_type: NodeType, label: &str) -> String {
    format!("{}:{}", node_type.prefix(), label)
}

/// Compile the rows for one central problem into a network structure.
///
/// The threat side links consecutive present entities of Activity →
/// Pressure → Control → Escalation → Problem, bridging missing ones. The
/// consequence side links Problem → Consequence and, when present,
/// Mitigation → Consequence.
pub fn compile(
    records: &[BowtieRecord],
    central_problem: &str,
) -> Result<BayesianNetworkStructure, CompileError> {
    let rows = filter_by_problem(records, central_problem);
    if rows.is_empty() {
        return Err(CompileError::EmptyScenario {
            central_problem: central_problem.to_string(),
        });
    }

    let mut by_type: BTreeMap<NodeType, Vec<Node>> = BTreeMap::new();
    let mut seen_nodes = HashSet::new();
    let mut edges = Vec::new();
    let mut seen_edges = HashSet::new();
    let mut add_edge = |from: &str, to: &str| {
        let edge = Edge {
            from: from.to_string(),
            to: to.to_string(),
        };
        if seen_edges.insert(edge.clone()) {
            edges.push(edge);
        }
    };

    for row in &rows {
        let mut present: BTreeMap<Role, String> = BTreeMap::new();
        for role in Role::ALL {
            let term = row.term(role);
            if term.is_missing() {
                continue;
            }
            let node_type = NodeType::from_role(role);
            let label = term.name.trim().to_string();
            let id = node_id(node_type, &label);
            if seen_nodes.insert(id.clone()) {
                by_type.entry(node_type).or_default().push(Node {
                    node_id: id.clone(),
                    label,
                    node_type,
                });
            }
            present.insert(role, id);
        }

        let threat_chain: Vec<&String> = [
            Role::Activity,
            Role::Pressure,
            Role::PreventiveControl,
            Role::EscalationFactor,
            Role::CentralProblem,
        ]
        .iter()
        .filter_map(|r| present.get(r))
        .collect();
        for pair in threat_chain.windows(2) {
            add_edge(pair[0], pair[1]);
        }
        if let Some(consequence) = present.get(&Role::Consequence) {
            if let Some(problem) = present.get(&Role::CentralProblem) {
                add_edge(problem, consequence);
            }
            if let Some(mitigation) = present.get(&Role::ProtectiveMitigation) {
                add_edge(mitigation, consequence);
            }
        }
    }

    let structure = BayesianNetworkStructure {
        central_problem: central_problem.trim().to_string(),
        nodes: by_type.into_values().flatten().collect(),
        edges,
        records: rows.into_iter().cloned().collect(),
    };
    structure.topological_order()?;
    tracing::debug!(
        central_problem = %structure.central_problem,
        nodes = structure.nodes.len(),
        edges = structure.edges.len(),
        "compiled bayesian network"
    );
    Ok(structure)
}

/// What-if evidence presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioPreset {
    Baseline,
    WorstCase,
    BestCase,
}

impl ScenarioPreset {
    pub const ALL: [ScenarioPreset; 3] = [
        ScenarioPreset::Baseline,
        ScenarioPreset::WorstCase,
        ScenarioPreset::BestCase,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioPreset::Baseline => "baseline",
            ScenarioPreset::WorstCase => "worst_case",
            ScenarioPreset::BestCase => "best_case",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "baseline" => Some(ScenarioPreset::Baseline),
            "worst_case" | "worst" => Some(ScenarioPreset::WorstCase),
            "best_case" | "best" => Some(ScenarioPreset::BestCase),
            _ => None,
        }
    }
}

/// Evidence for a preset: worst case puts every evidence-bearing node in its
/// most adverse state, best case in its most favourable, baseline sets none.
pub fn preset_evidence(structure: &BayesianNetworkStructure, preset: ScenarioPreset) -> Evidence {
    let mut evidence = Evidence::new();
    if preset == ScenarioPreset::Baseline {
        return evidence;
    }
    for node in structure
        .nodes
        .iter()
        .filter(|n| n.node_type.is_evidence_bearing())
    {
        let states = node.states();
        let state = match preset {
            ScenarioPreset::WorstCase => states[states.len() - 1],
            _ => states[0],
        };
        evidence.insert(node.node_id.clone(), state.to_string());
    }
    evidence
}

/// A compiled structure with its CPTs, queryable repeatedly.
///
/// A structure whose CPTs would exceed `max_parent_combinations` still
/// builds: it carries no CPTs and every query runs the fallback.
#[derive(Debug, Clone)]
pub struct BayesianNetwork {
    pub structure: BayesianNetworkStructure,
    pub cpts: BTreeMap<String, Cpt>,
    degenerate: Option<String>,
    config: InferenceConfig,
}

impl BayesianNetwork {
    pub fn build(
        records: &[BowtieRecord],
        central_problem: &str,
        use_data: bool,
        config: &InferenceConfig,
    ) -> Result<Self, BayesError> {
        let structure = compile(records, central_problem)?;
        let (cpts, degenerate) = match create_cpts(&structure, use_data, config) {
            Ok(cpts) => (cpts, None),
            Err(err @ CptError::TooManyParentStates { .. }) => {
                warn!(
                    central_problem = %structure.central_problem,
                    error = %err,
                    "CPTs too large for exact inference; network is fallback-only"
                );
                (BTreeMap::new(), Some(err.to_string()))
            }
        };
        Ok(Self {
            structure,
            cpts,
            degenerate,
            config: config.clone(),
        })
    }

    /// Why exact inference is unavailable for this network, if it is.
    pub fn degenerate_reason(&self) -> Option<&str> {
        self.degenerate.as_deref()
    }

    pub fn infer(
        &self,
        evidence: &Evidence,
        query: &[String],
    ) -> Result<InferenceResult, InferenceError> {
        match &self.degenerate {
            Some(reason) => {
                inference::infer_degenerate(&self.structure, evidence, query, &self.config, reason)
            }
            None => infer(&self.structure, &self.cpts, evidence, query, &self.config),
        }
    }

    pub fn run_preset(
        &self,
        preset: ScenarioPreset,
        query: &[String],
    ) -> Result<InferenceResult, InferenceError> {
        self.infer(&preset_evidence(&self.structure, preset), query)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetOutcome {
    pub preset: ScenarioPreset,
    pub method: InferenceMethod,
    /// P(High) of the central problem node.
    pub problem_high: f64,
    /// P(High) averaged over consequence nodes.
    pub consequence_high: f64,
}

/// Per-problem summary used by reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemAnalysis {
    pub central_problem: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub outcomes: Vec<PresetOutcome>,
}

pub fn analyze_problem(
    records: &[BowtieRecord],
    central_problem: &str,
    use_data: bool,
    config: &InferenceConfig,
) -> Result<ProblemAnalysis, BayesError> {
    let network = BayesianNetwork::build(records, central_problem, use_data, config)?;
    let problem_query = NodeType::Problem.aggregate_name().to_string();
    let consequence_query = NodeType::Consequence.aggregate_name().to_string();
    let query = vec![problem_query.clone(), consequence_query.clone()];

    let mut outcomes = Vec::with_capacity(ScenarioPreset::ALL.len());
    for preset in ScenarioPreset::ALL {
        let result = network.run_preset(preset, &query)?;
        let high = |name: &str| {
            result
                .posteriors
                .get(name)
                .and_then(|d| d.probability("High"))
                .unwrap_or(0.0)
        };
        outcomes.push(PresetOutcome {
            preset,
            method: result.method,
            problem_high: high(&problem_query),
            consequence_high: high(&consequence_query),
        });
    }
    Ok(ProblemAnalysis {
        central_problem: network.structure.central_problem.clone(),
        node_count: network.structure.nodes.len(),
        edge_count: network.structure.edges.len(),
        outcomes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marine() -> Vec<BowtieRecord> {
        vec![
            BowtieRecord::new("Shipping", "Oil spill", "Marine pollution", "Fish kill", 4, 4)
                .with_preventive_control("Double hull"),
            BowtieRecord::new("Drilling", "Oil spill", "Marine pollution", "Fish kill", 3, 5),
            BowtieRecord::new("Bunkering", "Oil spill", "Marine pollution", "Seabird deaths", 2, 3)
                .with_protective_mitigation("Oil booms"),
            BowtieRecord::new("Farming", "Runoff", "Eutrophication", "Algal bloom", 3, 3),
        ]
    }

    #[test]
    fn repeated_pairs_do_not_duplicate_edges() {
        let s = compile(&marine(), "Marine pollution").unwrap();
        assert_eq!(s.nodes_of_type(NodeType::Activity).count(), 3);
        assert_eq!(s.nodes_of_type(NodeType::Pressure).count(), 1);
        let into_pressure = s
            .edges
            .iter()
            .filter(|e| e.to == "pressure:Oil spill" && e.from.starts_with("activity:"))
            .count();
        assert_eq!(into_pressure, 3);
        let unique: HashSet<&Edge> = s.edges.iter().collect();
        assert_eq!(unique.len(), s.edges.len());
    }

    #[test]
    fn missing_control_bridges_to_problem() {
        let s = compile(&marine(), "Marine pollution").unwrap();
        let has = |from: &str, to: &str| s.edges.iter().any(|e| e.from == from && e.to == to);
        assert!(has("pressure:Oil spill", "control:Double hull"));
        assert!(has("control:Double hull", "problem:Marine pollution"));
        assert!(has("pressure:Oil spill", "problem:Marine pollution"));
        assert!(has("mitigation:Oil booms", "consequence:Seabird deaths"));
        assert!(!has("problem:Marine pollution", "mitigation:Oil booms"));
    }

    #[test]
    fn unknown_problem_is_empty_scenario() {
        let err = compile(&marine(), "Acidification").unwrap_err();
        assert_eq!(
            err,
            CompileError::EmptyScenario {
                central_problem: "Acidification".to_string()
            }
        );
    }

    #[test]
    fn topological_order_respects_edges() {
        let s = compile(&marine(), "Marine pollution").unwrap();
        let order: Vec<&str> = s
            .topological_order()
            .unwrap()
            .iter()
            .map(|n| n.node_id.as_str())
            .collect();
        let pos = |id: &str| order.iter().position(|n| *n == id).unwrap();
        for edge in &s.edges {
            assert!(pos(&edge.from) < pos(&edge.to));
        }
    }

    #[test]
    fn cycles_are_detected() {
        let mut s = compile(&marine(), "Marine pollution").unwrap();
        s.edges.push(Edge {
            from: "problem:Marine pollution".to_string(),
            to: "activity:Shipping".to_string(),
        });
        assert!(matches!(s.topological_order(), Err(CompileError::Cycle { .. })));
    }

    #[test]
    fn worst_case_beats_best_case() {
        let analysis =
            analyze_problem(&marine(), "Marine pollution", false, &InferenceConfig::default())
                .unwrap();
        let get = |p: ScenarioPreset| {
            analysis
                .outcomes
                .iter()
                .find(|o| o.preset == p)
                .unwrap()
                .clone()
        };
        let worst = get(ScenarioPreset::WorstCase);
        let best = get(ScenarioPreset::BestCase);
        let base = get(ScenarioPreset::Baseline);
        assert_eq!(worst.method, InferenceMethod::Exact);
        assert!(worst.problem_high > base.problem_high);
        assert!(base.problem_high > best.problem_high);
        assert!(worst.consequence_high > best.consequence_high);
    }
}
