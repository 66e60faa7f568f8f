use std::sync::atomic::AtomicBool;
use std::time::Duration;

use bowtie_risk::vocabulary::{
    load_vocabulary_dir, SearchScope, Vocabulary, VocabularyKind, VocabularyStore,
};
use tempfile::tempdir;

fn write_dir(activities: &str) -> tempfile::TempDir {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("activities.csv"), activities).unwrap();
    std::fs::write(
        dir.path().join("pressures.csv"),
        concat!(
            "level,id,name\n1,P,BIOLOGICAL PRESSURES\n",
            "2,P1,Nutrient enrichment\n3,P1.1,Nitrogen loading\n"
        ),
    )
    .unwrap();
    dir
}

#[test]
fn search_matches_selectable_row_by_name() {
    let dir = write_dir("level,id,name\n1,A,PHYSICAL RESTRUCTURING\n2,A1,Dredging\n");
    let vocabulary = load_vocabulary_dir(dir.path());
    let hits = vocabulary
        .table(VocabularyKind::Activities)
        .search("dredg", SearchScope::Name);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "A1");
    assert_eq!(hits[0].name, "Dredging");
}

#[test]
fn missing_tables_degrade_to_empty() {
    let dir = write_dir("level,id,name\n1,A,PHYSICAL RESTRUCTURING\n2,A1,Dredging\n");
    let vocabulary = load_vocabulary_dir(dir.path());
    assert!(vocabulary.is_available());
    assert!(vocabulary.table(VocabularyKind::Controls).is_empty());
    assert!(vocabulary.table(VocabularyKind::Consequences).is_empty());
}

#[test]
fn hierarchy_resolves_without_parent_column() {
    let dir = write_dir("level,id,name\n1,A,PHYSICAL RESTRUCTURING\n2,A1,Dredging\n");
    let vocabulary = load_vocabulary_dir(dir.path());
    let pressures = vocabulary.table(VocabularyKind::Pressures);
    let path: Vec<&str> = pressures
        .ancestor_path("P1.1")
        .iter()
        .map(|e| e.id.as_str())
        .collect();
    assert_eq!(path, vec!["P", "P1", "P1.1"]);
    let below: Vec<&str> = pressures
        .descendants("P")
        .iter()
        .map(|e| e.id.as_str())
        .collect();
    assert_eq!(below, vec!["P1", "P1.1"]);
    assert_eq!(pressures.stats().max_depth, 3);
}

#[tokio::test]
async fn reload_swaps_snapshot_and_bumps_generation() {
    let dir = write_dir("level,id,name\n1,A,PHYSICAL RESTRUCTURING\n2,A1,Dredging\n");
    let store = VocabularyStore::new(Vocabulary::empty());
    let old = store.snapshot();

    let generation = store
        .reload_with_timeout(dir.path(), Duration::from_secs(5), None)
        .await
        .unwrap();
    assert_eq!(generation, 1);
    assert_eq!(store.generation(), 1);
    assert!(old.vocabulary.table(VocabularyKind::Activities).is_empty());
    assert!(store
        .snapshot()
        .vocabulary
        .table(VocabularyKind::Activities)
        .find_by_name("dredging")
        .is_some());
}

#[tokio::test]
async fn cancelled_reload_is_rejected() {
    let dir = write_dir("level,id,name\n2,A1,Dredging\n");
    let store = VocabularyStore::default();
    let cancel = AtomicBool::new(true);
    assert!(store
        .reload_with_timeout(dir.path(), Duration::from_secs(5), Some(&cancel))
        .await
        .is_err());
    assert_eq!(store.generation(), 0);
}
