use std::sync::Arc;
use std::thread;

use bowtie_risk::bayes::analyze_problem;
use bowtie_risk::bowtie::{add_default_columns, generate_sample_scenarios};
use bowtie_risk::config::{InferenceConfig, RiskConfig};
use bowtie_risk::report::{
    build_report, render_report_html, render_report_markdown, ReportOptions, ReportSection,
};
use bowtie_risk::visual::{to_graph, GraphCache, GraphOptions};

#[test]
fn cache_is_consistent_under_concurrent_lookups() {
    let records = Arc::new(generate_sample_scenarios(11));
    let cache = Arc::new(GraphCache::new(16));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let records = Arc::clone(&records);
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                cache.get_or_compute(&records, "Eutrophication", &GraphOptions::default())
            })
        })
        .collect();
    let graphs: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let expected = to_graph(&records, "Eutrophication", &GraphOptions::default());
    assert!(graphs.iter().all(|g| **g == expected));
    let stats = cache.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits + stats.misses, 8);
}

#[test]
fn invalidate_forces_recompute() {
    let records = generate_sample_scenarios(11);
    let cache = GraphCache::default();
    let first = cache.get_or_compute(&records, "Marine pollution", &GraphOptions::default());
    cache.invalidate();
    let second = cache.get_or_compute(&records, "Marine pollution", &GraphOptions::default());
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(first, second);
    assert_eq!(cache.stats().misses, 2);
}

#[test]
fn every_edge_joins_known_nodes() {
    let records = generate_sample_scenarios(5);
    let graph = to_graph(&records, "Coastal habitat loss", &GraphOptions::default());
    assert!(!graph.nodes.is_empty());
    for edge in &graph.edges {
        assert!(graph.nodes.iter().any(|n| n.id == edge.from));
        assert!(graph.nodes.iter().any(|n| n.id == edge.to));
    }
}

#[test]
fn report_carries_every_requested_section() {
    let records = add_default_columns(generate_sample_scenarios(5), &RiskConfig::default());
    let analyses: Vec<_> = ["Marine pollution", "Eutrophication"]
        .iter()
        .map(|p| analyze_problem(&records, p, false, &InferenceConfig::default()).unwrap())
        .collect();
    let report = build_report(&records, &ReportOptions::default(), &analyses, None);

    assert_eq!(report.statistics.records, records.len());
    assert_eq!(report.statistics.central_problems, 3);
    assert_eq!(report.diagrams.len(), 3);
    assert_eq!(report.bayesian.len(), 2);
    assert_eq!(report.data.len(), records.len());
    let matrix_total: usize = report
        .risk_matrix
        .as_ref()
        .unwrap()
        .counts
        .iter()
        .flatten()
        .sum();
    assert_eq!(matrix_total, records.len());

    let md = render_report_markdown(&report);
    for section in ReportSection::ALL {
        assert!(md.contains(&format!("## {}", section.title())));
    }
    assert!(md.contains("Vocabulary unavailable."));
    let html = render_report_html(&report);
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<h2>Bayesian analysis</h2>"));
}
