//! Node/edge graph for rendering one bowtie.
//!
//! `to_graph` is a pure function of its inputs: node order is role order
//! then first appearance, edges are in first appearance order, and styling
//! comes from a fixed per-role table.

pub mod cache;

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::bowtie::{filter_by_problem, BowtieRecord, RiskLevel, Role};
use crate::config::RiskConfig;

pub use cache::{graph_cache_key, CacheStats, GraphCache};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphOptions {
    /// Show preventive controls and protective mitigations. When hidden,
    /// edges are bridged across them.
    pub show_barriers: bool,
    pub show_escalation: bool,
    pub font_size: u32,
    /// Colour the central problem and consequences by their worst risk level
    /// instead of the role colour.
    pub color_by_risk: bool,
    /// Thresholds for rows without a stored `Risk_Level`.
    pub risk: RiskConfig,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            show_barriers: true,
            show_escalation: true,
            font_size: 14,
            color_by_risk: false,
            risk: RiskConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeStyle {
    pub shape: &'static str,
    pub color: &'static str,
}

pub fn role_style(role: Role) -> NodeStyle {
    let (shape, color) = match role {
        Role::Activity => ("box", "#8E44AD"),
        Role::Pressure => ("triangle", "#E74C3C"),
        Role::PreventiveControl => ("square", "#27AE60"),
        Role::EscalationFactor => ("triangleDown", "#F39C12"),
        Role::CentralProblem => ("diamond", "#C0392B"),
        Role::ProtectiveMitigation => ("square", "#3498DB"),
        Role::Consequence => ("hexagon", "#E67E22"),
    };
    NodeStyle { shape, color }
}

pub fn risk_color(level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Low => "#2ECC71",
        RiskLevel::Medium => "#F1C40F",
        RiskLevel::High => "#E74C3C",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub group: String,
    pub shape: String,
    pub color: String,
    /// Column in a left-to-right layout.
    pub level: usize,
    /// Position within the column.
    pub order: usize,
    pub font_size: u32,
    pub title: String,
    pub is_custom: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub dashes: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BowtieGraph {
    pub central_problem: String,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

fn node_id(role: Role, name: &str) -> String {
    format!("{}:{}", role.column().to_ascii_lowercase(), name)
}

/// Build the graph for one central problem. An unknown problem yields an
/// empty graph.
pub fn to_graph(
    records: &[BowtieRecord],
    central_problem: &str,
    options: &GraphOptions,
) -> BowtieGraph {
    let rows = filter_by_problem(records, central_problem);
    let visible = |role: Role| match role {
        Role::PreventiveControl | Role::ProtectiveMitigation => options.show_barriers,
        Role::EscalationFactor => options.show_escalation,
        _ => true,
    };

    let mut by_role: BTreeMap<Role, Vec<GraphNode>> = BTreeMap::new();
    let mut seen = HashSet::new();
    let mut worst: HashMap<String, RiskLevel> = HashMap::new();
    let mut edges = Vec::new();
    let mut seen_edges = HashSet::new();

    for row in &rows {
        let level = row.risk_level.unwrap_or_else(|| {
            RiskLevel::from_pair(
                row.effective_likelihood(),
                row.effective_severity(),
                &options.risk,
            )
        });
        let mut ids: BTreeMap<Role, String> = BTreeMap::new();
        for role in Role::ALL.into_iter().filter(|r| visible(*r)) {
            let term = row.term(role);
            if term.is_missing() {
                continue;
            }
            let name = term.name.trim();
            let id = node_id(role, name);
            if seen.insert(id.clone()) {
                let style = role_style(role);
                let column = by_role.entry(role).or_default();
                column.push(GraphNode {
                    id: id.clone(),
                    label: if term.is_custom {
                        format!("{name}{}", crate::bowtie::CUSTOM_SUFFIX)
                    } else {
                        name.to_string()
                    },
                    group: role.column().to_string(),
                    shape: style.shape.to_string(),
                    color: style.color.to_string(),
                    level: role.rank(),
                    order: column.len(),
                    font_size: options.font_size,
                    title: format!("{}: {}", role.column(), name),
                    is_custom: term.is_custom,
                });
            }
            let w = worst.entry(id.clone()).or_insert(level);
            if level > *w {
                *w = level;
            }
            ids.insert(role, id);
        }

        let mut push_chain = |chain: &[Role]| {
            let present: Vec<&String> = chain.iter().filter_map(|r| ids.get(r)).collect();
            for pair in present.windows(2) {
                let edge = GraphEdge {
                    from: pair[0].clone(),
                    to: pair[1].clone(),
                    dashes: pair[0].starts_with("escalation_factor:")
                        || pair[1].starts_with("escalation_factor:"),
                };
                if seen_edges.insert(edge.clone()) {
                    edges.push(edge);
                }
            }
        };
        push_chain(&[
            Role::Activity,
            Role::Pressure,
            Role::PreventiveControl,
            Role::EscalationFactor,
            Role::CentralProblem,
        ]);
        push_chain(&[
            Role::CentralProblem,
            Role::ProtectiveMitigation,
            Role::Consequence,
        ]);
    }

    let mut nodes: Vec<GraphNode> = by_role.into_values().flatten().collect();
    if options.color_by_risk {
        for node in nodes
            .iter_mut()
            .filter(|n| {
                n.level == Role::CentralProblem.rank() || n.level == Role::Consequence.rank()
            })
        {
            if let Some(level) = worst.get(&node.id) {
                node.color = risk_color(*level).to_string();
            }
        }
    }

    BowtieGraph {
        central_problem: central_problem.trim().to_string(),
        nodes,
        edges,
    }
}
