use bowtie_risk::bowtie::{
    add_default_columns, generate_sample_scenarios, records_from_csv_str, records_to_csv_string,
    validate, BowtieRecord, DataValidationError, LinkRating, LinkScores, RiskLevel, TableError,
    Term,
};
use bowtie_risk::config::RiskConfig;
use proptest::prelude::*;

#[test]
fn shipping_record_is_high_risk() {
    let records = vec![BowtieRecord::new(
        "Shipping",
        "Oil spill",
        "Marine pollution",
        "Fish kill",
        4,
        4,
    )];
    validate(&records).unwrap();
    let records = add_default_columns(records, &RiskConfig::default());
    assert_eq!(records[0].risk_score(), 16);
    assert_eq!(records[0].risk_level, Some(RiskLevel::High));
}

#[test]
fn risk_boundaries_hold_exactly() {
    let cfg = RiskConfig::default();
    assert_eq!(RiskLevel::from_pair(2, 3, &cfg), RiskLevel::Low);
    assert_eq!(RiskLevel::from_pair(3, 3, &cfg), RiskLevel::Medium);
    assert_eq!(RiskLevel::from_pair(4, 4, &cfg), RiskLevel::High);
}

#[test]
fn risk_level_is_monotone_in_both_axes() {
    let cfg = RiskConfig::default();
    for l in 1..=5u8 {
        for s in 1..=5u8 {
            let here = RiskLevel::from_pair(l, s, &cfg);
            if l < 5 {
                assert!(RiskLevel::from_pair(l + 1, s, &cfg) >= here);
            }
            if s < 5 {
                assert!(RiskLevel::from_pair(l, s + 1, &cfg) >= here);
            }
        }
    }
}

#[test]
fn import_reports_missing_columns_before_rows() {
    let err = records_from_csv_str("Activity,Pressure\nShipping,Oil spill\n").unwrap_err();
    match err {
        TableError::Validation(DataValidationError::MissingColumns(cols)) => {
            assert_eq!(cols, vec!["Central_Problem".to_string(), "Consequence".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn import_names_the_malformed_column() {
    let raw = "Activity,Pressure,Central_Problem,Consequence,Likelihood,Severity\n\
               Shipping,Oil spill,Marine pollution,Fish kill,high,4\n";
    let err = records_from_csv_str(raw).unwrap_err();
    assert!(matches!(
        err,
        TableError::Validation(DataValidationError::InvalidField { row: 1, ref column, .. })
            if column == "Likelihood"
    ));
}

#[test]
fn missing_scores_default_to_three() {
    let raw = concat!(
        "Activity,Pressure,Central_Problem,Consequence\n",
        "Shipping,Oil spill,Marine pollution,Fish kill\n"
    );
    let records = records_from_csv_str(raw).unwrap();
    assert_eq!((records[0].likelihood, records[0].severity), (3, 3));
}

#[test]
fn sample_scenarios_validate_and_survive_export() {
    let records = add_default_columns(generate_sample_scenarios(7), &RiskConfig::default());
    validate(&records).unwrap();
    let csv = records_to_csv_string(&records).unwrap();
    assert_eq!(records_from_csv_str(&csv).unwrap(), records);
    assert_eq!(generate_sample_scenarios(7), generate_sample_scenarios(7));
}

fn name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z ,\"']{0,20}"
}

fn term() -> impl Strategy<Value = Term> {
    (name(), any::<bool>()).prop_map(|(name, is_custom)| Term { name, is_custom })
}

fn optional_term() -> impl Strategy<Value = Term> {
    prop_oneof![Just(Term::empty()), term()]
}

fn rating() -> impl Strategy<Value = LinkRating> {
    (1u8..=5, 1u8..=5).prop_map(|(l, s)| LinkRating::new(l, s))
}

fn record() -> impl Strategy<Value = BowtieRecord> {
    (
        (term(), term(), optional_term(), optional_term()),
        (term(), optional_term(), term()),
        (1u8..=5, 1u8..=5),
        proptest::option::of(proptest::array::uniform5(rating())),
    )
        .prop_map(|((a, p, pc, ef), (cp, pm, c), (l, s), links)| {
            let mut r = BowtieRecord::new(a, p, cp, c, l, s)
                .with_preventive_control(pc)
                .with_escalation_factor(ef)
                .with_protective_mitigation(pm);
            r.link_scores = links.map(LinkScores::from_ordered);
            r
        })
}

proptest! {
    #[test]
    fn export_then_import_is_identity(records in proptest::collection::vec(record(), 1..8)) {
        let records = add_default_columns(records, &RiskConfig::default());
        prop_assert!(validate(&records).is_ok());
        let csv = records_to_csv_string(&records).unwrap();
        let back = records_from_csv_str(&csv).unwrap();
        prop_assert_eq!(back, records);
    }
}
