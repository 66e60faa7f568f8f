//! Seeded sample data and link-driven record assembly.
//!
//! Both generators return raw records; run `add_default_columns` to fill in
//! the derived risk columns.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::linking::{LinkCandidate, SuggestedLink};

use super::{BowtieRecord, LinkRating, LinkScores, Role, Term};

struct ScenarioTemplate {
    central_problem: &'static str,
    activities: &'static [&'static str],
    pressures: &'static [&'static str],
    controls: &'static [&'static str],
    escalations: &'static [&'static str],
    mitigations: &'static [&'static str],
    consequences: &'static [&'static str],
}

const TEMPLATES: &[ScenarioTemplate] = &[
    ScenarioTemplate {
        central_problem: "Marine pollution",
        activities: &["Commercial shipping", "Offshore oil extraction", "Port operations"],
        pressures: &["Oil spill", "Ballast water discharge", "Chemical leakage"],
        controls: &["Double-hull tankers", "Ballast water treatment", "Spill response plan"],
        escalations: &["Severe weather", "Crew fatigue"],
        mitigations: &["Oil booms deployment", "Beach clean-up", "Wildlife rescue"],
        consequences: &["Fish kill", "Seabird mortality", "Tourism loss"],
    },
    ScenarioTemplate {
        central_problem: "Eutrophication",
        activities: &["Intensive agriculture", "Urban wastewater", "Aquaculture"],
        pressures: &["Nutrient runoff", "Sewage discharge", "Organic enrichment"],
        controls: &["Buffer strips", "Tertiary wastewater treatment", "Fertiliser regulation"],
        escalations: &["Heavy rainfall", "High water temperature"],
        mitigations: &["Algal bloom monitoring", "Shellfish harvest closure"],
        consequences: &["Algal bloom", "Hypoxia", "Biodiversity loss"],
    },
    ScenarioTemplate {
        central_problem: "Coastal habitat loss",
        activities: &["Dredging", "Land reclamation", "Coastal construction"],
        pressures: &["Seabed disturbance", "Sediment smothering", "Habitat removal"],
        controls: &[
            "Environmental impact assessment",
            "Dredging windows",
            "Marine protected areas",
        ],
        escalations: &["Weak enforcement"],
        mitigations: &["Habitat restoration", "Seagrass replanting"],
        consequences: &["Nursery ground loss", "Coastal erosion", "Stock decline"],
    },
];

fn pick<'a>(rng: &mut StdRng, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or_default()
}

fn random_links(rng: &mut StdRng) -> LinkScores {
    let mut ratings = [LinkRating::new(1, 1); 5];
    for rating in &mut ratings {
        *rating = LinkRating::new(rng.gen_range(1..=5), rng.gen_range(1..=5));
    }
    LinkScores::from_ordered(ratings)
}

/// Environmental sample data over several central problems. The same seed
/// always yields the same records.
pub fn generate_sample_scenarios(seed: u64) -> Vec<BowtieRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();
    for template in TEMPLATES {
        for activity in template.activities {
            for _ in 0..2 {
                let mut record = BowtieRecord::new(
                    *activity,
                    pick(&mut rng, template.pressures),
                    template.central_problem,
                    pick(&mut rng, template.consequences),
                    rng.gen_range(1..=5),
                    rng.gen_range(1..=5),
                )
                .with_preventive_control(pick(&mut rng, template.controls))
                .with_protective_mitigation(pick(&mut rng, template.mitigations));
                if rng.gen_bool(0.5) {
                    record = record.with_escalation_factor(pick(&mut rng, template.escalations));
                }
                if rng.gen_bool(0.5) {
                    record = record.with_link_scores(random_links(&mut rng));
                }
                out.push(record);
            }
        }
    }
    out
}

/// Walk suggested links into records for one central problem.
///
/// Each Activity → Pressure link becomes a row. The pressure's best
/// preventive-control link (if any) fills the control; the consequence side
/// is drawn from Protective_Mitigation → Consequence and Central_Problem →
/// Consequence links. Without any consequence-side link there is nothing to
/// build and the result is empty.
pub fn generate_from_links(
    candidates: &[LinkCandidate],
    links: &[SuggestedLink],
    central_problem: &str,
    seed: u64,
) -> Vec<BowtieRecord> {
    let names: HashMap<(Role, &str), &str> = candidates
        .iter()
        .filter_map(|c| Some(((c.role, c.id.as_deref()?), c.name.as_deref()?)))
        .collect();
    let name_of = |role: Role, id: &str| names.get(&(role, id)).map(|n| n.to_string());

    let consequence_side: Vec<(Option<String>, String)> = links
        .iter()
        .filter(|l| l.to_role == Role::Consequence)
        .filter_map(|l| {
            let consequence = name_of(Role::Consequence, &l.to_id)?;
            let mitigation = match l.from_role {
                Role::ProtectiveMitigation => Some(name_of(l.from_role, &l.from_id)?),
                _ => None,
            };
            Some((mitigation, consequence))
        })
        .collect();
    if consequence_side.is_empty() {
        tracing::debug!(central_problem, "no consequence-side links; nothing generated");
        return Vec::new();
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::new();
    for link in links
        .iter()
        .filter(|l| l.from_role == Role::Activity && l.to_role == Role::Pressure)
    {
        let (Some(activity), Some(pressure)) = (
            name_of(Role::Activity, &link.from_id),
            name_of(Role::Pressure, &link.to_id),
        ) else {
            continue;
        };
        let control = links
            .iter()
            .filter(|l| {
                l.from_role == Role::Pressure
                    && l.from_id == link.to_id
                    && l.to_role == Role::PreventiveControl
            })
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .and_then(|l| name_of(Role::PreventiveControl, &l.to_id));
        let Some((mitigation, consequence)) = consequence_side.choose(&mut rng).cloned() else {
            continue;
        };

        let mut record = BowtieRecord::new(
            activity,
            pressure,
            central_problem,
            consequence,
            rng.gen_range(1..=5),
            rng.gen_range(1..=5),
        );
        if let Some(control) = control {
            record.preventive_control = Term::standard(control);
        }
        if let Some(mitigation) = mitigation {
            record.protective_mitigation = Term::standard(mitigation);
        }
        out.push(record);
    }
    out
}
