use std::sync::{Arc, Mutex};

use bowtie_risk::config::RiskConfig;
use bowtie_risk::notify::{NoticeLevel, Notifier};
use bowtie_risk::vocabulary::{Vocabulary, VocabularyEntry, VocabularyTable};
use bowtie_risk::workflow::{
    AddOutcome, CustomTermStatus, TermCategory, Workflow, WorkflowError, WorkflowStep,
};
use proptest::prelude::*;

#[derive(Default)]
struct Recorder {
    notices: Mutex<Vec<(NoticeLevel, String)>>,
}

impl Notifier for Recorder {
    fn notify(&self, level: NoticeLevel, message: &str) {
        self.notices
            .lock()
            .unwrap()
            .push((level, message.to_string()));
    }
}

fn vocabulary() -> Vocabulary {
    Vocabulary {
        activities: VocabularyTable::new(vec![
            VocabularyEntry::new("A", "TRANSPORT", 1),
            VocabularyEntry::new("A1", "Shipping", 2),
        ]),
        pressures: VocabularyTable::new(vec![
            VocabularyEntry::new("P", "POLLUTION", 1),
            VocabularyEntry::new("P1", "Oil spill", 2),
        ]),
        controls: VocabularyTable::new(vec![
            VocabularyEntry::new("C", "CONTROLS", 1),
            VocabularyEntry::new("C1", "Double hull", 2),
            VocabularyEntry::new("C2", "Oil booms", 2),
        ]),
        consequences: VocabularyTable::new(vec![
            VocabularyEntry::new("Q", "IMPACTS", 1),
            VocabularyEntry::new("Q1", "Fish kill", 2),
        ]),
    }
}

fn add(wf: &mut Workflow, category: TermCategory, name: &str) -> AddOutcome {
    wf.add_item(category, name, &vocabulary()).unwrap()
}

#[test]
fn full_session_produces_valid_records() {
    let recorder = Arc::new(Recorder::default());
    let mut wf = Workflow::new(recorder.clone());

    wf.set_project_field("project_name", "North Sea assessment").unwrap();
    assert_eq!(wf.advance(), Ok(WorkflowStep::CentralProblem));
    wf.set_project_field("central_problem", "Marine pollution").unwrap();
    wf.advance().unwrap();

    assert_eq!(add(&mut wf, TermCategory::Activities, "shipping"), AddOutcome::Standard);
    assert_eq!(add(&mut wf, TermCategory::Activities, "Cruise tourism"), AddOutcome::Custom);
    add(&mut wf, TermCategory::Pressures, "Oil spill");
    add(&mut wf, TermCategory::EscalationFactors, "Storm surge");
    wf.advance().unwrap();
    add(&mut wf, TermCategory::PreventiveControls, "Double hull");
    wf.advance().unwrap();
    add(&mut wf, TermCategory::Consequences, "Fish kill");
    wf.advance().unwrap();
    add(&mut wf, TermCategory::ProtectiveControls, "Oil booms");
    wf.advance().unwrap();
    assert_eq!(wf.advance(), Ok(WorkflowStep::Finalize));
    assert_eq!(wf.advance(), Err(WorkflowError::AtFinalStep));

    let records = wf.complete(&RiskConfig::default()).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.central_problem.name == "Marine pollution"));
    assert!(records[1].activity.is_custom);
    assert_eq!(records[1].activity.display(), "Cruise tourism (Custom)");
    assert!(records.iter().all(|r| r.risk_level.is_some()));
    assert!(wf.state().completed.is_some());

    let notices = recorder.notices.lock().unwrap();
    assert!(notices
        .iter()
        .any(|(level, msg)| {
            *level == NoticeLevel::Info && msg.contains("Cruise tourism (Custom)")
        }));
}

#[test]
fn failed_step_leaves_state_unchanged() {
    let mut wf = Workflow::default();
    wf.set_project_field("project_name", "Baltic").unwrap();
    wf.advance().unwrap();
    let before = wf.state().clone();
    assert_eq!(
        wf.advance(),
        Err(WorkflowError::Validation {
            step: 2,
            field: "central_problem"
        })
    );
    assert_eq!(wf.state(), &before);
    assert_eq!(
        wf.complete(&RiskConfig::default()),
        Err(WorkflowError::NotAtFinalStep(2))
    );
}

#[test]
fn custom_terms_can_be_reviewed_and_exported() {
    let mut wf = Workflow::default();
    add(&mut wf, TermCategory::Consequences, "Seagrass dieback");
    wf.set_custom_term_status(
        TermCategory::Consequences,
        "seagrass dieback",
        CustomTermStatus::Approved,
        Some("confirmed by survey"),
    )
    .unwrap();
    let csv = wf.custom_terms_export(TermCategory::Consequences).unwrap();
    assert!(csv.contains("Seagrass dieback (Custom),Seagrass dieback,"));
    assert!(csv.contains(",approved,confirmed by survey"));

    assert!(wf.remove_item(TermCategory::Consequences, "Seagrass dieback"));
    assert_eq!(wf.custom_term_count(), 0);
    assert!(matches!(
        wf.set_custom_term_status(
            TermCategory::Consequences,
            "Seagrass dieback",
            CustomTermStatus::Rejected,
            None
        ),
        Err(WorkflowError::UnknownCustomTerm { .. })
    ));
}

proptest! {
    #[test]
    fn only_unknown_terms_become_custom(name in "[A-Za-z][A-Za-z ]{0,20}", category in 0usize..6) {
        let category = TermCategory::ALL[category];
        let mut wf = Workflow::default();
        let vocab = vocabulary();
        let known = category
            .vocabulary_kind()
            .map(|k| vocab.table(k).find_by_name(&name).is_some())
            .unwrap_or(true);

        let outcome = wf.add_item(category, &name, &vocab).unwrap();
        let entries = wf.custom_terms_table(category);
        if known {
            prop_assert_eq!(outcome, AddOutcome::Standard);
            prop_assert!(entries.is_empty());
        } else {
            prop_assert_eq!(outcome, AddOutcome::Custom);
            prop_assert_eq!(entries.len(), 1);
            prop_assert_eq!(&entries[0].original_name, name.trim());
            prop_assert!(entries[0].term.ends_with(" (Custom)"));
            prop_assert_eq!(wf.custom_term_count(), 1);
        }
    }
}
