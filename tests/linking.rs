use bowtie_risk::bowtie::Role;
use bowtie_risk::linking::{
    candidates_from_vocabulary, find_links, is_permitted, method_score, suggest_successors,
    LinkCandidate, LinkOptions, ScoringError, SimilarityEngine, SimilarityMethod,
    SimilarityScorer,
};
use bowtie_risk::vocabulary::{Vocabulary, VocabularyEntry, VocabularyTable};
use proptest::prelude::*;

fn vocabulary() -> Vocabulary {
    Vocabulary {
        activities: VocabularyTable::new(vec![
            VocabularyEntry::new("A", "AGRICULTURE", 1),
            VocabularyEntry::new("A1", "Fertilizer application on farmland", 2),
            VocabularyEntry::new("A2", "Commercial shipping traffic", 2),
        ]),
        pressures: VocabularyTable::new(vec![
            VocabularyEntry::new("P", "PRESSURES", 1),
            VocabularyEntry::new("P1", "Nutrient runoff from fertilizer", 2),
            VocabularyEntry::new("P2", "Oil discharge from shipping", 2),
        ]),
        controls: VocabularyTable::new(vec![
            VocabularyEntry::new("C", "CONTROLS", 1),
            VocabularyEntry::new("C1", "Buffer strips reducing nutrient runoff", 2),
        ]),
        consequences: VocabularyTable::new(vec![
            VocabularyEntry::new("Q", "CONSEQUENCES", 1),
            VocabularyEntry::new("Q1", "Algal bloom and oxygen depletion", 2),
        ]),
    }
}

#[test]
fn related_items_link_and_headers_never_do() {
    let candidates = candidates_from_vocabulary(&vocabulary());
    let options = LinkOptions {
        similarity_threshold: 0.02,
        ..LinkOptions::default()
    };
    let links = find_links(&candidates, &options);
    assert!(links
        .iter()
        .any(|l| l.from_id == "A1" && l.to_id == "P1" && l.to_role == Role::Pressure));
    assert!(!links.iter().any(|l| l.from_id == "A1" && l.to_id == "P2"));
    assert!(links.iter().all(|l| !["A", "P", "C", "Q"].contains(&l.from_id.as_str())));
    assert!(links.iter().all(|l| is_permitted(l.from_role, l.to_role)));
}

#[test]
fn links_per_source_are_capped_and_ranked() {
    let candidates = candidates_from_vocabulary(&vocabulary());
    let options = LinkOptions {
        similarity_threshold: 0.0,
        max_links_per_item: 1,
        ..LinkOptions::default()
    };
    let links = find_links(&candidates, &options);
    let from_a1: Vec<_> = links.iter().filter(|l| l.from_id == "A1").collect();
    assert_eq!(from_a1.len(), 1);
    assert_eq!(from_a1[0].to_id, "P1");
}

#[test]
fn suggest_successors_only_targets_permitted_roles() {
    let candidates = candidates_from_vocabulary(&vocabulary());
    let source = LinkCandidate::new("P1", "Nutrient runoff from fertilizer", 2, Role::Pressure);
    let options = LinkOptions {
        similarity_threshold: 0.0,
        max_links_per_item: 10,
        ..LinkOptions::default()
    };
    let links = suggest_successors(&source, &candidates, &options);
    assert!(!links.is_empty());
    assert!(links
        .iter()
        .all(|l| matches!(l.to_role, Role::PreventiveControl | Role::CentralProblem)));
}

struct Broken;

impl SimilarityScorer for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn score(&self, _source: &str, _target: &str) -> Result<f64, ScoringError> {
        Err(ScoringError::MissingInput)
    }
}

#[test]
fn failing_scorer_counts_as_zero() {
    let engine = SimilarityEngine::empty().with_scorer(Box::new(Broken));
    assert_eq!(engine.score(Some("oil spill"), Some("oil spill")), 0.0);
}

proptest! {
    #[test]
    fn every_method_scores_within_unit_interval(
        a in proptest::option::of(".{0,40}"),
        b in proptest::option::of(".{0,40}"),
    ) {
        for method in SimilarityMethod::all() {
            let s = method_score(*method, a.as_deref(), b.as_deref());
            prop_assert!((0.0..=1.0).contains(&s));
            if a.is_none() || b.is_none() {
                prop_assert_eq!(s, 0.0);
            }
        }
        let engine = SimilarityEngine::from_methods(SimilarityMethod::all());
        let mean = engine.score(a.as_deref(), b.as_deref());
        prop_assert!((0.0..=1.0).contains(&mean));
    }

    #[test]
    fn suggested_links_respect_role_order(
        names in proptest::collection::vec(("[a-z ]{1,24}", 0usize..7, 1u32..4), 1..16),
        threshold in 0.0f64..0.5,
    ) {
        let candidates: Vec<LinkCandidate> = names
            .iter()
            .enumerate()
            .map(|(i, (name, role, level))| {
                LinkCandidate::new(format!("id{i}"), name.clone(), *level, Role::ALL[*role])
            })
            .collect();
        let options = LinkOptions {
            similarity_threshold: threshold,
            max_links_per_item: 5,
            ..LinkOptions::default()
        };
        for link in find_links(&candidates, &options) {
            prop_assert!(is_permitted(link.from_role, link.to_role));
            prop_assert!(link.score >= threshold);
        }
    }
}
