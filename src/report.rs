//! Report generation for bowtie record sets.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bayes::{ProblemAnalysis, ScenarioPreset};
use crate::bowtie::{central_problems, BowtieRecord, RiskLevel, Role};
use crate::config::RiskConfig;
use crate::visual::{to_graph, BowtieGraph, GraphOptions};
use crate::vocabulary::{Vocabulary, VocabularyKind, VocabularyStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportSection {
    Summary,
    DiagramData,
    RiskMatrix,
    BayesianAnalysis,
    Vocabulary,
    DataTable,
}

impl ReportSection {
    pub const ALL: [ReportSection; 6] = [
        ReportSection::Summary,
        ReportSection::DiagramData,
        ReportSection::RiskMatrix,
        ReportSection::BayesianAnalysis,
        ReportSection::Vocabulary,
        ReportSection::DataTable,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            ReportSection::Summary => "Summary",
            ReportSection::DiagramData => "Diagram data",
            ReportSection::RiskMatrix => "Risk matrix",
            ReportSection::BayesianAnalysis => "Bayesian analysis",
            ReportSection::Vocabulary => "Vocabulary",
            ReportSection::DataTable => "Data table",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let wanted = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match wanted.as_str() {
            "summary" => Some(ReportSection::Summary),
            "diagram" | "diagram_data" => Some(ReportSection::DiagramData),
            "risk_matrix" | "matrix" => Some(ReportSection::RiskMatrix),
            "bayesian" | "bayesian_analysis" => Some(ReportSection::BayesianAnalysis),
            "vocabulary" => Some(ReportSection::Vocabulary),
            "data" | "data_table" => Some(ReportSection::DataTable),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportOptions {
    pub title: String,
    pub sections: Vec<ReportSection>,
    /// Restrict diagram data to one problem; all problems when `None`.
    pub central_problem: Option<String>,
    pub graph: GraphOptions,
    pub risk: RiskConfig,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            title: "Environmental Bowtie Risk Report".to_string(),
            sections: ReportSection::ALL.to_vec(),
            central_problem: None,
            graph: GraphOptions::default(),
            risk: RiskConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportStatistics {
    pub records: usize,
    pub central_problems: usize,
    pub activities: usize,
    pub consequences: usize,
    pub average_likelihood: f64,
    pub average_severity: f64,
    pub high_risk_records: usize,
}

/// Record counts by likelihood (rows) and severity (columns), both 1..=5,
/// with each cell's risk level under the thresholds the report was built with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskMatrix {
    pub counts: [[usize; 5]; 5],
    pub levels: [[RiskLevel; 5]; 5],
}

impl RiskMatrix {
    pub fn count(&self, likelihood: u8, severity: u8) -> usize {
        match (likelihood, severity) {
            (1..=5, 1..=5) => self.counts[likelihood as usize - 1][severity as usize - 1],
            _ => 0,
        }
    }

    pub fn level(&self, likelihood: u8, severity: u8) -> Option<RiskLevel> {
        match (likelihood, severity) {
            (1..=5, 1..=5) => Some(self.levels[likelihood as usize - 1][severity as usize - 1]),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VocabularySummary {
    pub kind: VocabularyKind,
    pub stats: VocabularyStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct BowtieReport {
    pub request_hash: String,
    pub generated_at: DateTime<Utc>,
    pub title: String,
    pub sections: Vec<ReportSection>,
    pub statistics: ReportStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_matrix: Option<RiskMatrix>,
    pub diagrams: Vec<BowtieGraph>,
    pub bayesian: Vec<ProblemAnalysis>,
    pub vocabulary: Vec<VocabularySummary>,
    pub data: Vec<BowtieRecord>,
}

impl BowtieReport {
    pub fn has(&self, section: ReportSection) -> bool {
        self.sections.contains(&section)
    }
}

pub fn statistics(records: &[BowtieRecord], risk: &RiskConfig) -> ReportStatistics {
    let distinct = |role: Role| {
        records
            .iter()
            .map(|r| r.term(role))
            .filter(|t| !t.is_missing())
            .map(|t| t.name.trim())
            .collect::<HashSet<_>>()
            .len()
    };
    let n = records.len();
    let mean = |f: fn(&BowtieRecord) -> u8| {
        if n == 0 {
            0.0
        } else {
            records.iter().map(|r| f(r) as f64).sum::<f64>() / n as f64
        }
    };
    ReportStatistics {
        records: n,
        central_problems: central_problems(records).len(),
        activities: distinct(Role::Activity),
        consequences: distinct(Role::Consequence),
        average_likelihood: mean(BowtieRecord::effective_likelihood),
        average_severity: mean(BowtieRecord::effective_severity),
        high_risk_records: records
            .iter()
            .filter(|r| {
                r.risk_level.unwrap_or_else(|| {
                    RiskLevel::from_pair(r.effective_likelihood(), r.effective_severity(), risk)
                }) == RiskLevel::High
            })
            .count(),
    }
}

pub fn risk_matrix(records: &[BowtieRecord], risk: &RiskConfig) -> RiskMatrix {
    let mut counts = [[0usize; 5]; 5];
    for r in records {
        let (l, s) = (r.effective_likelihood(), r.effective_severity());
        if (1..=5).contains(&l) && (1..=5).contains(&s) {
            counts[l as usize - 1][s as usize - 1] += 1;
        }
    }
    let mut levels = [[RiskLevel::Low; 5]; 5];
    for (l, row) in levels.iter_mut().enumerate() {
        for (s, cell) in row.iter_mut().enumerate() {
            *cell = RiskLevel::from_pair(l as u8 + 1, s as u8 + 1, risk);
        }
    }
    RiskMatrix { counts, levels }
}

#[derive(Serialize)]
struct RequestFingerprint<'a> {
    records: &'a [BowtieRecord],
    options: &'a ReportOptions,
}

fn hash_request(records: &[BowtieRecord], options: &ReportOptions) -> String {
    let bytes = serde_json::to_vec(&RequestFingerprint { records, options }).unwrap_or_default();
    blake3::hash(&bytes).to_hex().to_string()
}

/// Assemble a report. `analyses` are precomputed per-problem Bayesian
/// summaries (see `bayes::analyze_problem`); `vocabulary` feeds the
/// vocabulary section when available.
pub fn build_report(
    records: &[BowtieRecord],
    options: &ReportOptions,
    analyses: &[ProblemAnalysis],
    vocabulary: Option<&Vocabulary>,
) -> BowtieReport {
    let wants = |s: ReportSection| options.sections.contains(&s);

    let graph = GraphOptions {
        risk: options.risk.clone(),
        ..options.graph.clone()
    };
    let diagrams = if wants(ReportSection::DiagramData) {
        let problems = match &options.central_problem {
            Some(p) => vec![p.clone()],
            None => central_problems(records),
        };
        problems
            .iter()
            .map(|p| to_graph(records, p, &graph))
            .collect()
    } else {
        Vec::new()
    };

    BowtieReport {
        request_hash: hash_request(records, options),
        generated_at: Utc::now(),
        title: options.title.clone(),
        sections: options.sections.clone(),
        statistics: statistics(records, &options.risk),
        risk_matrix: wants(ReportSection::RiskMatrix)
            .then(|| risk_matrix(records, &options.risk)),
        diagrams,
        bayesian: if wants(ReportSection::BayesianAnalysis) {
            analyses.to_vec()
        } else {
            Vec::new()
        },
        vocabulary: match vocabulary {
            Some(v) if wants(ReportSection::Vocabulary) => v
                .stats()
                .into_iter()
                .map(|(kind, stats)| VocabularySummary { kind, stats })
                .collect(),
            _ => Vec::new(),
        },
        data: if wants(ReportSection::DataTable) {
            records.to_vec()
        } else {
            Vec::new()
        },
    }
}

fn preset_label(preset: ScenarioPreset) -> &'static str {
    match preset {
        ScenarioPreset::Baseline => "Baseline",
        ScenarioPreset::WorstCase => "Worst case",
        ScenarioPreset::BestCase => "Best case",
    }
}

fn risk_label(record: &BowtieRecord) -> &'static str {
    record.risk_level.map(|l| l.as_str()).unwrap_or("")
}

pub fn render_report_markdown(report: &BowtieReport) -> String {
    let mut out = String::new();
    let stats = &report.statistics;
    out.push_str(&format!("# {}\n\n", report.title));
    out.push_str(&format!("- Request hash: `{}`\n", report.request_hash));
    out.push_str(&format!("- Generated: {}\n", report.generated_at.to_rfc3339()));

    if report.has(ReportSection::Summary) {
        out.push_str("\n## Summary\n\n");
        out.push_str(&format!("- Records: {}\n", stats.records));
        out.push_str(&format!("- Central problems: {}\n", stats.central_problems));
        out.push_str(&format!("- Activities: {}\n", stats.activities));
        out.push_str(&format!("- Consequences: {}\n", stats.consequences));
        out.push_str(&format!("- Average likelihood: {:.2}\n", stats.average_likelihood));
        out.push_str(&format!("- Average severity: {:.2}\n", stats.average_severity));
        out.push_str(&format!("- High-risk records: {}\n", stats.high_risk_records));
    }

    if report.has(ReportSection::DiagramData) {
        out.push_str("\n## Diagram data\n\n");
        for graph in &report.diagrams {
            out.push_str(&format!(
                "- {}: {} nodes, {} edges\n",
                graph.central_problem,
                graph.nodes.len(),
                graph.edges.len()
            ));
        }
    }

    if let Some(matrix) = &report.risk_matrix {
        out.push_str("\n## Risk matrix\n\n");
        out.push_str("| Likelihood \\ Severity | 1 | 2 | 3 | 4 | 5 |\n");
        out.push_str("|---|---|---|---|---|---|\n");
        for l in (1..=5u8).rev() {
            let cells: Vec<String> = (1..=5u8).map(|s| matrix.count(l, s).to_string()).collect();
            out.push_str(&format!("| {} | {} |\n", l, cells.join(" | ")));
        }
    }

    if report.has(ReportSection::BayesianAnalysis) {
        out.push_str("\n## Bayesian analysis\n\n");
        if report.bayesian.is_empty() {
            out.push_str("No analysis available.\n");
        }
        for analysis in &report.bayesian {
            out.push_str(&format!(
                "### {} ({} nodes, {} edges)\n\n",
                analysis.central_problem, analysis.node_count, analysis.edge_count
            ));
            for outcome in &analysis.outcomes {
                out.push_str(&format!(
                    "- {}: P(problem High) {:.3}, P(consequence High) {:.3} [{:?}]\n",
                    preset_label(outcome.preset),
                    outcome.problem_high,
                    outcome.consequence_high,
                    outcome.method
                ));
            }
            out.push('\n');
        }
    }

    if report.has(ReportSection::Vocabulary) {
        out.push_str("\n## Vocabulary\n\n");
        if report.vocabulary.is_empty() {
            out.push_str("Vocabulary unavailable.\n");
        }
        for v in &report.vocabulary {
            out.push_str(&format!(
                "- {}: {} entries ({} headers, {} selectable, depth {})\n",
                v.kind, v.stats.total, v.stats.headers, v.stats.selectable, v.stats.max_depth
            ));
        }
    }

    if report.has(ReportSection::DataTable) {
        out.push_str("\n## Data table\n\n");
        let header: Vec<&str> = Role::ALL.iter().map(|r| r.column()).collect();
        out.push_str(&format!(
            "| {} | Likelihood | Severity | Risk_Level |\n",
            header.join(" | ")
        ));
        out.push_str(&format!("{}|\n", "|---".repeat(header.len() + 3)));
        for r in &report.data {
            let cells: Vec<String> = Role::ALL.iter().map(|role| r.term(*role).display()).collect();
            out.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                cells.join(" | "),
                r.likelihood,
                r.severity,
                risk_label(r)
            ));
        }
    }

    out
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn render_report_html(report: &BowtieReport) -> String {
    let mut out = String::new();
    let stats = &report.statistics;
    let title = escape_html(&report.title);
    out.push_str("<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\">");
    out.push_str(&format!("<title>{title}</title></head>\n<body>\n"));
    out.push_str(&format!("<h1>{title}</h1>\n"));
    out.push_str(&format!(
        "<p>Request hash <code>{}</code>, generated {}</p>\n",
        report.request_hash,
        report.generated_at.to_rfc3339()
    ));

    if report.has(ReportSection::Summary) {
        out.push_str("<h2>Summary</h2>\n<ul>\n");
        for (label, value) in [
            ("Records", stats.records.to_string()),
            ("Central problems", stats.central_problems.to_string()),
            ("Activities", stats.activities.to_string()),
            ("Consequences", stats.consequences.to_string()),
            ("Average likelihood", format!("{:.2}", stats.average_likelihood)),
            ("Average severity", format!("{:.2}", stats.average_severity)),
            ("High-risk records", stats.high_risk_records.to_string()),
        ] {
            out.push_str(&format!("<li>{label}: {value}</li>\n"));
        }
        out.push_str("</ul>\n");
    }

    if report.has(ReportSection::DiagramData) {
        out.push_str("<h2>Diagram data</h2>\n<ul>\n");
        for graph in &report.diagrams {
            out.push_str(&format!(
                "<li>{}: {} nodes, {} edges</li>\n",
                escape_html(&graph.central_problem),
                graph.nodes.len(),
                graph.edges.len()
            ));
        }
        out.push_str("</ul>\n");
    }

    if let Some(matrix) = &report.risk_matrix {
        out.push_str("<h2>Risk matrix</h2>\n<table>\n<tr><th>Likelihood \\ Severity</th>");
        for s in 1..=5 {
            out.push_str(&format!("<th>{s}</th>"));
        }
        out.push_str("</tr>\n");
        for l in (1..=5u8).rev() {
            out.push_str(&format!("<tr><th>{l}</th>"));
            for s in 1..=5u8 {
                let class = matrix
                    .level(l, s)
                    .map(|level| level.as_str().to_ascii_lowercase())
                    .unwrap_or_default();
                out.push_str(&format!(
                    "<td class=\"risk-{}\">{}</td>",
                    class,
                    matrix.count(l, s)
                ));
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</table>\n");
    }

    if report.has(ReportSection::BayesianAnalysis) {
        out.push_str("<h2>Bayesian analysis</h2>\n");
        for analysis in &report.bayesian {
            out.push_str(&format!(
                "<h3>{}</h3>\n<ul>\n",
                escape_html(&analysis.central_problem)
            ));
            for outcome in &analysis.outcomes {
                out.push_str(&format!(
                    "<li>{}: P(problem High) {:.3}, P(consequence High) {:.3}</li>\n",
                    preset_label(outcome.preset),
                    outcome.problem_high,
                    outcome.consequence_high
                ));
            }
            out.push_str("</ul>\n");
        }
    }

    if report.has(ReportSection::Vocabulary) {
        out.push_str("<h2>Vocabulary</h2>\n<ul>\n");
        for v in &report.vocabulary {
            out.push_str(&format!(
                "<li>{}: {} entries ({} selectable)</li>\n",
                v.kind, v.stats.total, v.stats.selectable
            ));
        }
        out.push_str("</ul>\n");
    }

    if report.has(ReportSection::DataTable) {
        out.push_str("<h2>Data table</h2>\n<table>\n<tr>");
        for role in Role::ALL {
            out.push_str(&format!("<th>{}</th>", role.column()));
        }
        out.push_str("<th>Likelihood</th><th>Severity</th><th>Risk_Level</th></tr>\n");
        for r in &report.data {
            out.push_str("<tr>");
            for role in Role::ALL {
                out.push_str(&format!("<td>{}</td>", escape_html(&r.term(role).display())));
            }
            out.push_str(&format!(
                "<td>{}</td><td>{}</td><td>{}</td></tr>\n",
                r.likelihood,
                r.severity,
                risk_label(r)
            ));
        }
        out.push_str("</table>\n");
    }

    out.push_str("</body>\n</html>\n");
    out
}
