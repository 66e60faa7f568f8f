use bowtie_risk::bayes::{
    analyze_problem, compile, create_cpts, infer, infer_fallback, BayesianNetwork, CompileError,
    Evidence, InferenceMethod, NodeType, ScenarioPreset,
};
use bowtie_risk::bowtie::{generate_sample_scenarios, BowtieRecord};
use bowtie_risk::config::InferenceConfig;
use proptest::prelude::*;

fn marine() -> Vec<BowtieRecord> {
    vec![
        BowtieRecord::new("Shipping", "Oil spill", "Marine pollution", "Fish kill", 4, 4)
            .with_preventive_control("Double hull"),
        BowtieRecord::new("Offshore drilling", "Oil spill", "Marine pollution", "Fish kill", 3, 4),
        BowtieRecord::new(
            "Port operations",
            "Oil spill",
            "Marine pollution",
            "Seabird deaths",
            2,
            3,
        ),
        BowtieRecord::new("Farming", "Runoff", "Eutrophication", "Algal bloom", 3, 3),
    ]
}

fn ev(pairs: &[(&str, &str)]) -> Evidence {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn one_node_per_activity_and_one_edge_per_pair() {
    let structure = compile(&marine(), "Marine pollution").unwrap();
    assert_eq!(structure.nodes_of_type(NodeType::Activity).count(), 3);
    assert_eq!(structure.nodes_of_type(NodeType::Pressure).count(), 1);
    let activity_edges = structure
        .edges
        .iter()
        .filter(|e| e.from.starts_with("activity:"))
        .count();
    assert_eq!(activity_edges, 3);
    assert!(structure.is_acyclic());
    assert!(structure.node("activity:Farming").is_none());
}

#[test]
fn unknown_problem_is_an_empty_scenario() {
    assert_eq!(
        compile(&marine(), "Soil erosion").unwrap_err(),
        CompileError::EmptyScenario {
            central_problem: "Soil erosion".to_string()
        }
    );
}

#[test]
fn high_pressure_raises_consequence_risk_in_fallback() {
    let structure = compile(&marine(), "Marine pollution").unwrap();
    let cfg = InferenceConfig::default();
    let query = vec!["Consequence_Level".to_string()];
    let high = |evidence: &Evidence| {
        let result = infer_fallback(&structure, evidence, &query, &cfg.fallback).unwrap();
        assert_eq!(result.method, InferenceMethod::Fallback);
        result.posteriors["Consequence_Level"]
            .probability("High")
            .unwrap()
    };
    let baseline = high(&Evidence::new());
    let pressured = high(&ev(&[("Pressure_Level", "High")]));
    assert!(pressured > baseline);
}

#[test]
fn exact_inference_responds_to_pressure() {
    let records = marine();
    let cfg = InferenceConfig::default();
    let structure = compile(&records, "Marine pollution").unwrap();
    let cpts = create_cpts(&structure, false, &cfg).unwrap();
    let query = vec!["Consequence_Level".to_string()];
    let run = |evidence: &Evidence| {
        let result = infer(&structure, &cpts, evidence, &query, &cfg).unwrap();
        assert_eq!(result.method, InferenceMethod::Exact);
        result.posteriors["Consequence_Level"]
            .probability("High")
            .unwrap()
    };
    assert!(run(&ev(&[("pressure:Oil spill", "High")])) > run(&Evidence::new()));
}

#[test]
fn presets_order_worst_above_best() {
    let analysis =
        analyze_problem(&marine(), "Marine pollution", false, &InferenceConfig::default()).unwrap();
    assert_eq!(analysis.outcomes.len(), 3);
    let by = |p: ScenarioPreset| {
        analysis
            .outcomes
            .iter()
            .find(|o| o.preset == p)
            .unwrap()
            .consequence_high
    };
    assert!(by(ScenarioPreset::WorstCase) > by(ScenarioPreset::Baseline));
    assert!(by(ScenarioPreset::Baseline) > by(ScenarioPreset::BestCase));
}

#[test]
fn data_driven_cpts_build_for_every_sample_problem() {
    let records = generate_sample_scenarios(3);
    for problem in bowtie_risk::bowtie::central_problems(&records) {
        let network =
            BayesianNetwork::build(&records, &problem, true, &InferenceConfig::default()).unwrap();
        assert_eq!(network.cpts.len(), network.structure.nodes.len());
    }
}

#[test]
fn dense_problem_falls_back_instead_of_failing() {
    let records: Vec<BowtieRecord> = (0..8)
        .map(|i| {
            BowtieRecord::new(
                format!("Activity {i}"),
                format!("Pressure {i}"),
                "Marine pollution",
                "Fish kill",
                3,
                3,
            )
        })
        .collect();
    let cfg = InferenceConfig::default();

    let analysis = analyze_problem(&records, "Marine pollution", false, &cfg).unwrap();
    assert_eq!(analysis.outcomes.len(), 3);
    assert!(analysis
        .outcomes
        .iter()
        .all(|o| o.method == InferenceMethod::Fallback));

    let network = BayesianNetwork::build(&records, "Marine pollution", false, &cfg).unwrap();
    assert!(network.cpts.is_empty());
    assert!(network
        .degenerate_reason()
        .unwrap()
        .contains("problem:Marine pollution"));
    let query = vec!["Consequence_Level".to_string()];
    let result = network
        .run_preset(ScenarioPreset::WorstCase, &query)
        .unwrap();
    assert_eq!(result.method, InferenceMethod::Fallback);
    assert!(result.degenerate_reason.is_some());
    assert!(network
        .infer(&ev(&[("pressure:Nowhere", "High")]), &query)
        .is_err());
}

proptest! {
    #[test]
    fn compiled_networks_are_acyclic(seed in any::<u64>(), which in 0usize..3) {
        let records = generate_sample_scenarios(seed);
        let problems = bowtie_risk::bowtie::central_problems(&records);
        let problem = &problems[which % problems.len()];
        let structure = compile(&records, problem).unwrap();
        prop_assert!(structure.topological_order().is_ok());
        prop_assert_eq!(structure.topological_order().unwrap().len(), structure.nodes.len());
    }

    #[test]
    fn posteriors_are_distributions(
        picks in proptest::collection::vec((any::<proptest::sample::Index>(), 0usize..3), 0..5),
        queries in proptest::collection::vec(any::<proptest::sample::Index>(), 1..4),
        aggregate in any::<bool>(),
    ) {
        let records = marine();
        let cfg = InferenceConfig::default();
        let structure = compile(&records, "Marine pollution").unwrap();
        let cpts = create_cpts(&structure, false, &cfg).unwrap();

        let mut evidence = Evidence::new();
        for (idx, state) in &picks {
            let node = idx.get(&structure.nodes);
            let states = node.states();
            evidence.insert(node.node_id.clone(), states[state % states.len()].to_string());
        }
        let mut query: Vec<String> = queries
            .iter()
            .map(|idx| idx.get(&structure.nodes).node_id.clone())
            .collect();
        if aggregate {
            query.push(NodeType::Consequence.aggregate_name().to_string());
        }

        let result = infer(&structure, &cpts, &evidence, &query, &cfg).unwrap();
        for dist in result.posteriors.values() {
            prop_assert!(dist.probs.iter().all(|p| *p >= 0.0));
            prop_assert!((dist.probs.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        }
        let fallback = infer_fallback(&structure, &evidence, &query, &cfg.fallback).unwrap();
        for dist in fallback.posteriors.values() {
            prop_assert!(dist.probs.iter().all(|p| *p >= 0.0));
            prop_assert!((dist.probs.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        }
    }
}
