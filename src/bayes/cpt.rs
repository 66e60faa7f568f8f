//! Conditional probability tables.
//!
//! Rows are indexed by parent-state combination in mixed radix, first parent
//! most significant; each row is a distribution over the node's states.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::InferenceConfig;

use super::BayesianNetworkStructure;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CptError {
    #[error("{node_id} has {combinations} parent-state combinations (limit {limit})")]
    TooManyParentStates {
        node_id: String,
        combinations: usize,
        limit: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cpt {
    pub node_id: String,
    pub states: Vec<String>,
    pub parents: Vec<String>,
    pub parent_cards: Vec<usize>,
    pub rows: Vec<Vec<f64>>,
}

impl Cpt {
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Row index for a parent assignment (aligned with `parents`).
    pub fn row_index(&self, parent_states: &[usize]) -> usize {
        parent_states
            .iter()
            .zip(&self.parent_cards)
            .fold(0, |acc, (state, card)| acc * card + state)
    }

    pub fn row(&self, parent_states: &[usize]) -> &[f64] {
        &self.rows[self.row_index(parent_states)]
    }
}

/// Decode a mixed-radix row index back into parent states.
fn decode(mut index: usize, cards: &[usize]) -> Vec<usize> {
    let mut states = vec![0; cards.len()];
    for (slot, card) in states.iter_mut().zip(cards).rev() {
        *slot = index % card;
        index /= card;
    }
    states
}

/// Build a CPT for every node.
///
/// With `use_data = false`, roots get a uniform prior and children a kernel
/// that shifts mass toward adverse states as parents become adverse. With
/// `use_data = true`, both come from Laplace-smoothed state counts over the
/// structure's records.
pub fn create_cpts(
    structure: &BayesianNetworkStructure,
    use_data: bool,
    config: &InferenceConfig,
) -> Result<BTreeMap<String, Cpt>, CptError> {
    let mut out = BTreeMap::new();
    for node in &structure.nodes {
        let parents: Vec<&super::Node> = structure
            .parents(&node.node_id)
            .into_iter()
            .filter_map(|p| structure.node(p))
            .collect();
        let parent_cards: Vec<usize> = parents.iter().map(|p| p.states().len()).collect();
        let combinations = parent_cards
            .iter()
            .try_fold(1usize, |acc, c| acc.checked_mul(*c))
            .filter(|c| *c <= config.max_parent_combinations)
            .ok_or_else(|| CptError::TooManyParentStates {
                node_id: node.node_id.clone(),
                combinations: parent_cards
                    .iter()
                    .fold(1usize, |acc, c| acc.saturating_mul(*c)),
                limit: config.max_parent_combinations,
            })?;
        let k = node.states().len();

        let rows: Vec<Vec<f64>> = if use_data {
            let mut counts = vec![vec![1.0; k]; combinations];
            for record in &structure.records {
                let parent_states: Vec<usize> =
                    parents.iter().map(|p| p.observed_state(record)).collect();
                let row = parent_states
                    .iter()
                    .zip(&parent_cards)
                    .fold(0, |acc, (state, card)| acc * card + state);
                counts[row][node.observed_state(record)] += 1.0;
            }
            counts.into_iter().map(normalize).collect()
        } else if parents.is_empty() {
            vec![vec![1.0 / k as f64; k]]
        } else {
            (0..combinations)
                .map(|row| {
                    let states = decode(row, &parent_cards);
                    let adversity = states
                        .iter()
                        .zip(&parent_cards)
                        .map(|(s, c)| *s as f64 / (*c - 1).max(1) as f64)
                        .sum::<f64>()
                        / states.len() as f64;
                    kernel_row(adversity, k, config)
                })
                .collect()
        };

        out.insert(
            node.node_id.clone(),
            Cpt {
                node_id: node.node_id.clone(),
                states: node.states().iter().map(|s| s.to_string()).collect(),
                parents: parents.iter().map(|p| p.node_id.clone()).collect(),
                parent_cards,
                rows,
            },
        );
    }
    Ok(out)
}

/// Gaussian bump centred at `adversity * (k - 1)`, mixed with a uniform floor.
fn kernel_row(adversity: f64, k: usize, config: &InferenceConfig) -> Vec<f64> {
    let centre = adversity * (k - 1) as f64;
    let spread = config.cpt_spread;
    let bump = normalize(
        (0..k)
            .map(|j| {
                let d = j as f64 - centre;
                (-(d * d) / (2.0 * spread * spread)).exp()
            })
            .collect(),
    );
    let floor = config.cpt_floor;
    bump.into_iter()
        .map(|p| (1.0 - floor) * p + floor / k as f64)
        .collect()
}

fn normalize(mut row: Vec<f64>) -> Vec<f64> {
    let total: f64 = row.iter().sum();
    if total > 0.0 && total.is_finite() {
        for p in &mut row {
            *p /= total;
        }
    } else {
        let k = row.len().max(1) as f64;
        row.iter_mut().for_each(|p| *p = 1.0 / k);
    }
    row
}
