// Label catalog
// Ordered action names with a reserved "other" entry, an unused sentinel, and synonym groups

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Integer id of a label. Valid catalog ids are `0..len`; `-1` is the unused sentinel.
pub type LabelId = i32;

/// Default name of the catch-all label (index 0)
pub const DEFAULT_OTHER_LABEL: &str = "その他";

/// Default annotation text marking frames excluded from training
pub const DEFAULT_UNUSED_LABEL: &str = "不要";

/// Id of the "other" label in every catalog
pub const OTHER_ID: LabelId = 0;
const UNUSED_ID: LabelId = -1;

/// Named colours handed out per label id for timeline reports
const PALETTE: [&str; 16] = [
    "gray",
    "tomato",
    "royalblue",
    "seagreen",
    "orange",
    "mediumpurple",
    "gold",
    "teal",
    "crimson",
    "olive",
    "deepskyblue",
    "sienna",
    "orchid",
    "limegreen",
    "slateblue",
    "salmon",
];

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("Label id {id} out of range (catalog has {len} labels)")]
    OutOfRange { id: LabelId, len: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A canonical label and the raw annotation strings merged into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelGroup {
    /// Canonical label name stored in the catalog
    pub name: String,

    /// Raw annotation strings that resolve to `name`
    pub members: Vec<String>,
}

impl LabelGroup {
    pub fn new(name: impl Into<String>, members: &[&str]) -> Self {
        LabelGroup {
            name: name.into(),
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }
}

/// Immutable label catalog
///
/// Built once per dataset and shared read-only by segmentation, featurization
/// and evaluation. Ids are positions in the catalog; index 0 is always the
/// "other" label.
#[derive(Debug, Clone)]
pub struct LabelSet {
    labels: Vec<String>,
    index: HashMap<String, LabelId>,
    /// raw synonym -> canonical group name (first group listing a synonym wins)
    synonyms: HashMap<String, String>,
    other_label: String,
    unused_label: String,
}

impl LabelSet {
    /// Build the catalog by scanning `names` in order
    ///
    /// Synonyms are remapped to their group name before anything else, values
    /// equal to `unused_label` are skipped, and unseen names are appended.
    pub fn new<I, S>(names: I, other_label: &str, unused_label: &str, groups: &[LabelGroup]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut synonyms = HashMap::new();
        for group in groups {
            for member in &group.members {
                synonyms
                    .entry(member.clone())
                    .or_insert_with(|| group.name.clone());
            }
        }

        let mut set = LabelSet {
            labels: Vec::new(),
            index: HashMap::new(),
            synonyms,
            other_label: other_label.to_string(),
            unused_label: unused_label.to_string(),
        };
        set.push_unique(other_label.to_string());

        for raw in names {
            let raw = raw.as_ref();
            let value = match set.synonyms.get(raw) {
                Some(group) => group.clone(),
                None if raw == unused_label => continue,
                None => raw.to_string(),
            };
            set.push_unique(value);
        }

        set
    }

    /// Catalog with the default "other" and "unused" names and no groups
    pub fn with_defaults<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(names, DEFAULT_OTHER_LABEL, DEFAULT_UNUSED_LABEL, &[])
    }

    /// Parse a one-name-per-line catalog (blank lines ignored)
    pub fn from_catalog_text(
        text: &str,
        other_label: &str,
        unused_label: &str,
        groups: &[LabelGroup],
    ) -> Self {
        let names = text.lines().map(str::trim).filter(|line| !line.is_empty());
        Self::new(names, other_label, unused_label, groups)
    }

    /// Load a catalog file from disk
    pub fn load(
        path: &Path,
        other_label: &str,
        unused_label: &str,
        groups: &[LabelGroup],
    ) -> Result<Self, LabelError> {
        let text = std::fs::read_to_string(path)?;
        let set = Self::from_catalog_text(&text, other_label, unused_label, groups);
        log::debug!("Loaded {} labels from {}", set.len(), path.display());
        Ok(set)
    }

    fn push_unique(&mut self, value: String) {
        if self.index.contains_key(&value) {
            return;
        }
        self.index.insert(value.clone(), self.labels.len() as LabelId);
        self.labels.push(value);
    }

    /// Id of `name`, or the "other" id when the name is not in the catalog
    pub fn id_of(&self, name: &str) -> LabelId {
        self.index.get(name).copied().unwrap_or(OTHER_ID)
    }

    /// Id for a raw annotation string
    ///
    /// Group membership is checked first, then the unused marker, then a plain
    /// catalog lookup.
    pub fn resolve(&self, raw: &str) -> LabelId {
        if let Some(group) = self.synonyms.get(raw) {
            return self.id_of(group);
        }
        if raw == self.unused_label {
            return UNUSED_ID;
        }
        self.id_of(raw)
    }

    /// Name for an id; the unused sentinel reads back as the "other" label
    pub fn name_of(&self, id: LabelId) -> Result<&str, LabelError> {
        if id == UNUSED_ID {
            return Ok(&self.other_label);
        }

        usize::try_from(id)
            .ok()
            .and_then(|i| self.labels.get(i))
            .map(String::as_str)
            .ok_or(LabelError::OutOfRange {
                id,
                len: self.labels.len(),
            })
    }

    /// Number of catalog entries (classifier class count)
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Always false: the "other" label is always present
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn other_id(&self) -> LabelId {
        OTHER_ID
    }

    pub fn other_label(&self) -> &str {
        &self.other_label
    }

    pub fn unused_id(&self) -> LabelId {
        UNUSED_ID
    }

    pub fn unused_label(&self) -> &str {
        &self.unused_label
    }

    /// True for ids that index the catalog
    pub fn is_valid(&self, id: LabelId) -> bool {
        id >= 0 && (id as usize) < self.labels.len()
    }

    pub fn names(&self) -> &[String] {
        &self.labels
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    /// Stable display colour for a label id
    pub fn color_of(&self, id: LabelId) -> &'static str {
        let slot = if id == UNUSED_ID { OTHER_ID } else { id };
        PALETTE[slot.unsigned_abs() as usize % PALETTE.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_other_is_index_zero() {
        let set = LabelSet::with_defaults(["run", "walk"]);
        assert_eq!(set.names(), &["その他", "run", "walk"]);
        assert_eq!(set.other_id(), 0);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_duplicates_are_idempotent() {
        let a = LabelSet::new(["run", "run", "walk"], "other", "unused", &[]);
        let b = LabelSet::new(["run", "walk", "run"], "other", "unused", &[]);
        assert_eq!(a.names(), &["other", "run", "walk"]);
        assert_eq!(a.names(), b.names());
    }

    #[test]
    fn test_unused_label_is_skipped() {
        let set = LabelSet::new(["cut", "unused", "stir"], "other", "unused", &[]);
        assert_eq!(set.names(), &["other", "cut", "stir"]);
        assert!(!set.contains("unused"));
    }

    #[test]
    fn test_groups_merge_synonyms() {
        let groups = vec![LabelGroup::new("cut", &["slice", "chop"])];
        let set = LabelSet::new(["slice", "stir", "chop", "cut"], "other", "unused", &groups);
        assert_eq!(set.names(), &["other", "cut", "stir"]);
        assert_eq!(set.resolve("chop"), set.id_of("cut"));
    }

    #[test]
    fn test_group_membership_wins_over_unused() {
        let groups = vec![LabelGroup::new("idle", &["unused"])];
        let set = LabelSet::new(["unused", "walk"], "other", "unused", &groups);
        assert_eq!(set.names(), &["other", "idle", "walk"]);
        assert_eq!(set.resolve("unused"), 1);
    }

    #[test]
    fn test_id_of_unknown_is_other() {
        let set = LabelSet::new(["run"], "other", "unused", &[]);
        assert_eq!(set.id_of("fly"), 0);
        assert_eq!(set.len(), 2);
        assert!(!set.contains("fly"));
    }

    #[test]
    fn test_resolve_unused_marker() {
        let set = LabelSet::new(["run"], "other", "unused", &[]);
        assert_eq!(set.resolve("unused"), set.unused_id());
        assert_eq!(set.id_of("unused"), set.other_id());
        assert_eq!(set.resolve("run"), 1);
    }

    #[test]
    fn test_name_of() {
        let set = LabelSet::new(["run"], "other", "unused", &[]);
        assert_eq!(set.name_of(1).unwrap(), "run");
        assert_eq!(set.name_of(-1).unwrap(), "other");
        assert!(matches!(
            set.name_of(5),
            Err(LabelError::OutOfRange { id: 5, len: 2 })
        ));
        assert!(set.name_of(-3).is_err());
    }

    #[test]
    fn test_load_catalog_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cut\n\n  stir \ncut").unwrap();

        let set = LabelSet::load(file.path(), "other", "unused", &[]).unwrap();
        assert_eq!(set.names(), &["other", "cut", "stir"]);
    }

    #[test]
    fn test_colors_are_stable() {
        let set = LabelSet::new(["run"], "other", "unused", &[]);
        assert_eq!(set.color_of(-1), set.color_of(0));
        assert_eq!(set.color_of(1), set.color_of(1));
    }
}
