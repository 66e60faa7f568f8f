//! Hierarchical vocabularies (activities, pressures, controls, consequences).
//!
//! Each `VocabularyTable` is indexed once at construction so that child,
//! descendant and ancestor queries cost O(result) rather than a table scan.

pub mod loader;
pub mod store;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use loader::{load_table, load_vocabulary_dir, parse_table, VocabularyError};
pub use store::{VocabularySnapshot, VocabularyStore};

/// Which vocabulary a table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VocabularyKind {
    Activities,
    Pressures,
    Controls,
    Consequences,
}

impl VocabularyKind {
    pub const ALL: [VocabularyKind; 4] = [
        VocabularyKind::Activities,
        VocabularyKind::Pressures,
        VocabularyKind::Controls,
        VocabularyKind::Consequences,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            VocabularyKind::Activities => "activities",
            VocabularyKind::Pressures => "pressures",
            VocabularyKind::Controls => "controls",
            VocabularyKind::Consequences => "consequences",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.csv", self.as_str())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        VocabularyKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

impl fmt::Display for VocabularyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of a vocabulary. Level 1 rows are category headers; level 2 and
/// deeper are selectable terms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyEntry {
    pub id: String,
    pub name: String,
    pub level: u32,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl VocabularyEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, level: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            level,
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn is_header(&self) -> bool {
        self.level <= 1
    }

    pub fn is_selectable(&self) -> bool {
        self.level >= 2
    }
}

/// Which fields `search` looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    Name,
    Id,
    Both,
}

impl SearchScope {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "name" => Some(SearchScope::Name),
            "id" => Some(SearchScope::Id),
            "both" | "all" => Some(SearchScope::Both),
            _ => None,
        }
    }
}

/// Per-table counts for reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyStats {
    pub total: usize,
    pub headers: usize,
    pub selectable: usize,
    pub max_depth: u32,
}

/// An indexed vocabulary table.
#[derive(Debug, Clone, Default)]
pub struct VocabularyTable {
    entries: Vec<VocabularyEntry>,
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
    children: HashMap<String, Vec<usize>>,
    roots: Vec<usize>,
}

impl VocabularyTable {
    /// Build the indexes. Entries without an explicit `parent_id` get the
    /// nearest preceding entry one level up as parent, so `A` / `A1` / `A1.1`
    /// style files need no parent column. Duplicate ids keep the first row.
    pub fn new(entries: Vec<VocabularyEntry>) -> Self {
        let mut kept: Vec<VocabularyEntry> = Vec::with_capacity(entries.len());
        let mut by_id = HashMap::with_capacity(entries.len());
        // last seen entry id per level, for implicit parents
        let mut level_stack: Vec<(u32, String)> = Vec::new();

        for mut entry in entries {
            if by_id.contains_key(&entry.id) {
                tracing::debug!(id = %entry.id, "duplicate vocabulary id ignored");
                continue;
            }
            while level_stack
                .last()
                .is_some_and(|(level, _)| *level >= entry.level)
            {
                level_stack.pop();
            }
            if entry.parent_id.as_deref().map_or(true, |p| p.trim().is_empty()) {
                entry.parent_id = level_stack
                    .last()
                    .filter(|(level, _)| *level + 1 == entry.level)
                    .map(|(_, id)| id.clone());
            }
            level_stack.push((entry.level, entry.id.clone()));
            by_id.insert(entry.id.clone(), kept.len());
            kept.push(entry);
        }

        let mut by_name = HashMap::new();
        let mut children: HashMap<String, Vec<usize>> = HashMap::new();
        let mut roots = Vec::new();
        for (idx, entry) in kept.iter().enumerate() {
            if entry.is_selectable() {
                by_name
                    .entry(normalize_name(&entry.name))
                    .or_insert(idx);
            }
            match entry.parent_id.as_ref().filter(|p| by_id.contains_key(*p)) {
                Some(parent) => children.entry(parent.clone()).or_default().push(idx),
                None => roots.push(idx),
            }
        }

        Self {
            entries: kept,
            by_id,
            by_name,
            children,
            roots,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[VocabularyEntry] {
        &self.entries
    }

    pub fn selectable(&self) -> impl Iterator<Item = &VocabularyEntry> {
        self.entries.iter().filter(|e| e.is_selectable())
    }

    pub fn roots(&self) -> Vec<&VocabularyEntry> {
        self.roots.iter().map(|idx| &self.entries[*idx]).collect()
    }

    pub fn get(&self, id: &str) -> Option<&VocabularyEntry> {
        self.by_id.get(id).map(|idx| &self.entries[*idx])
    }

    /// Case-insensitive exact name match among selectable entries.
    pub fn find_by_name(&self, name: &str) -> Option<&VocabularyEntry> {
        let key = normalize_name(name);
        if key.is_empty() {
            return None;
        }
        self.by_name.get(&key).map(|idx| &self.entries[*idx])
    }

    /// Case-insensitive substring search. A blank query matches nothing.
    pub fn search(&self, query: &str, scope: SearchScope) -> Vec<&VocabularyEntry> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|e| {
                let in_name = e.name.to_lowercase().contains(&needle);
                let in_id = e.id.to_lowercase().contains(&needle);
                match scope {
                    SearchScope::Name => in_name,
                    SearchScope::Id => in_id,
                    SearchScope::Both => in_name || in_id,
                }
            })
            .collect()
    }

    /// Direct children of `id`, in file order.
    pub fn children(&self, id: &str) -> Vec<&VocabularyEntry> {
        self.children
            .get(id)
            .map(|idxs| idxs.iter().map(|idx| &self.entries[*idx]).collect())
            .unwrap_or_default()
    }

    /// All descendants of `id`, pre-order.
    pub fn descendants(&self, id: &str) -> Vec<&VocabularyEntry> {
        let mut out = Vec::new();
        let mut stack: Vec<usize> = self
            .children
            .get(id)
            .map(|c| c.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(idx) = stack.pop() {
            let entry = &self.entries[idx];
            out.push(entry);
            if let Some(kids) = self.children.get(&entry.id) {
                stack.extend(kids.iter().rev().copied());
            }
        }
        out
    }

    /// Root-to-`id` chain, inclusive. Empty if `id` is unknown.
    pub fn ancestor_path(&self, id: &str) -> Vec<&VocabularyEntry> {
        let mut path = Vec::new();
        let mut current = self.get(id);
        while let Some(entry) = current {
            if path.len() > self.entries.len() {
                break;
            }
            path.push(entry);
            current = entry
                .parent_id
                .as_deref()
                .and_then(|parent| self.get(parent));
        }
        path.reverse();
        path
    }

    pub fn stats(&self) -> VocabularyStats {
        VocabularyStats {
            total: self.entries.len(),
            headers: self.entries.iter().filter(|e| e.is_header()).count(),
            selectable: self.entries.iter().filter(|e| e.is_selectable()).count(),
            max_depth: self.entries.iter().map(|e| e.level).max().unwrap_or(0),
        }
    }
}

/// Case-folded, trimmed form used for every name comparison.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

pub fn same_name(a: &str, b: &str) -> bool {
    normalize_name(a) == normalize_name(b)
}

/// The four vocabularies used by the application.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    pub activities: VocabularyTable,
    pub pressures: VocabularyTable,
    pub controls: VocabularyTable,
    pub consequences: VocabularyTable,
}

impl Vocabulary {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn table(&self, kind: VocabularyKind) -> &VocabularyTable {
        match kind {
            VocabularyKind::Activities => &self.activities,
            VocabularyKind::Pressures => &self.pressures,
            VocabularyKind::Controls => &self.controls,
            VocabularyKind::Consequences => &self.consequences,
        }
    }

    pub fn table_mut(&mut self, kind: VocabularyKind) -> &mut VocabularyTable {
        match kind {
            VocabularyKind::Activities => &mut self.activities,
            VocabularyKind::Pressures => &mut self.pressures,
            VocabularyKind::Controls => &mut self.controls,
            VocabularyKind::Consequences => &mut self.consequences,
        }
    }

    /// False when every table is empty, i.e. running without a vocabulary.
    pub fn is_available(&self) -> bool {
        VocabularyKind::ALL
            .iter()
            .any(|k| !self.table(*k).is_empty())
    }

    pub fn stats(&self) -> Vec<(VocabularyKind, VocabularyStats)> {
        VocabularyKind::ALL
            .iter()
            .map(|k| (*k, self.table(*k).stats()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn activities() -> VocabularyTable {
        VocabularyTable::new(vec![
            VocabularyEntry::new("A", "PHYSICAL RESTRUCTURING", 1),
            VocabularyEntry::new("A1", "Dredging", 2),
            VocabularyEntry::new("A1.1", "Capital dredging", 3),
            VocabularyEntry::new("A1.2", "Maintenance dredging", 3),
            VocabularyEntry::new("A2", "Land reclamation", 2),
            VocabularyEntry::new("B", "EXTRACTION", 1),
            VocabularyEntry::new("B1", "Sand mining", 2),
        ])
    }

    #[test]
    fn search_by_name_is_case_insensitive_substring() {
        let table = VocabularyTable::new(vec![
            VocabularyEntry::new("A", "PHYSICAL RESTRUCTURING", 1),
            VocabularyEntry::new("A1", "Dredging", 2),
        ]);
        let hits = table.search("dredg", SearchScope::Name);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "A1");
        assert!(table.search("   ", SearchScope::Both).is_empty());
    }

    #[test]
    fn search_scope_restricts_fields() {
        let table = activities();
        assert!(table.search("a1", SearchScope::Name).is_empty());
        assert_eq!(table.search("a1", SearchScope::Id).len(), 3);
        assert_eq!(table.search("mining", SearchScope::Both).len(), 1);
    }

    #[test]
    fn implicit_parents_follow_file_order() {
        let table = activities();
        assert_eq!(table.get("A1").unwrap().parent_id.as_deref(), Some("A"));
        assert_eq!(table.get("A1.2").unwrap().parent_id.as_deref(), Some("A1"));
        assert_eq!(table.get("A2").unwrap().parent_id.as_deref(), Some("A"));
        assert_eq!(table.get("B1").unwrap().parent_id.as_deref(), Some("B"));
        assert_eq!(table.roots().len(), 2);
    }

    #[test]
    fn tree_queries() {
        let table = activities();
        let kids: Vec<&str> = table.children("A").iter().map(|e| e.id.as_str()).collect();
        assert_eq!(kids, vec!["A1", "A2"]);

        let desc: Vec<&str> = table.descendants("A").iter().map(|e| e.id.as_str()).collect();
        assert_eq!(desc, vec!["A1", "A1.1", "A1.2", "A2"]);

        let path: Vec<&str> = table
            .ancestor_path("A1.2")
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(path, vec!["A", "A1", "A1.2"]);
        assert!(table.ancestor_path("nope").is_empty());
    }

    #[test]
    fn find_by_name_ignores_headers() {
        let table = activities();
        assert_eq!(table.find_by_name("  dredging ").unwrap().id, "A1");
        assert!(table.find_by_name("Physical restructuring").is_none());
        assert!(table.find_by_name("").is_none());
    }

    #[test]
    fn stats_count_levels() {
        let stats = activities().stats();
        assert_eq!(stats.total, 7);
        assert_eq!(stats.headers, 2);
        assert_eq!(stats.selectable, 5);
        assert_eq!(stats.max_depth, 3);
    }
}
