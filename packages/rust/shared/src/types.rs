//! Core domain types for KSS style guides.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// SHA-256 hex digest of the buffered source text.
pub fn source_digest(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Stages of a single pipeline run, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Buffering,
    Parsing,
    SectionBuilding,
    Finalizing,
    Done,
    Failed,
}

impl Phase {
    /// Whether the run has ended in this phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buffering => "buffering",
            Self::Parsing => "parsing",
            Self::SectionBuilding => "section building",
            Self::Finalizing => "finalizing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// SectionRef
// ---------------------------------------------------------------------------

/// Dot-delimited hierarchical section reference, e.g. `2.1.3`.
///
/// References order segment by segment. Numeric segments compare as numbers,
/// so `2` sorts before `10`, and sort ahead of named segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectionRef(String);

impl SectionRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The individual segments (`"2.1.3"` → `["2", "1", "3"]`).
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// True if `self` is a strict hierarchical prefix of `other`.
    pub fn is_ancestor_of(&self, other: &SectionRef) -> bool {
        let mine: Vec<&str> = self.segments().collect();
        let theirs: Vec<&str> = other.segments().collect();
        mine.len() < theirs.len() && theirs.starts_with(&mine)
    }

    /// Every strict ancestor, nearest last (`"2.1.3"` → `["2", "2.1"]`).
    pub fn ancestors(&self) -> Vec<SectionRef> {
        let parts: Vec<&str> = self.segments().collect();
        (1..parts.len())
            .map(|n| SectionRef(parts[..n].join(".")))
            .collect()
    }
}

impl Ord for SectionRef {
    fn cmp(&self, other: &Self) -> Ordering {
        let mut left = self.segments();
        let mut right = other.segments();
        loop {
            match (left.next(), right.next()) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(a), Some(b)) => {
                    let ord = match (a.parse::<u64>(), b.parse::<u64>()) {
                        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
                        // numeric segments sort before named ones
                        (Ok(_), Err(_)) => Ordering::Less,
                        (Err(_), Ok(_)) => Ordering::Greater,
                        (Err(_), Err(_)) => a.cmp(b),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
            }
        }
    }
}

impl PartialOrd for SectionRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for SectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SectionRef {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Section / Modifier
// ---------------------------------------------------------------------------

/// A named variation of a section's markup, e.g. `:hover` or `.primary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modifier {
    pub name: String,
    pub description: String,
    /// Section markup with the modifier class substituted in.
    pub markup: String,
}

/// One documented style guide section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub reference: SectionRef,
    pub header: String,
    pub description: String,
    pub is_deprecated: bool,
    pub is_experimental: bool,
    pub markup: String,
    /// Modifiers in declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modifiers: Vec<Modifier>,
}

// ---------------------------------------------------------------------------
// StyleguideModel
// ---------------------------------------------------------------------------

/// Flat, ordered map of every documented section keyed by reference.
///
/// Hierarchy is not stored; consumers reconstruct it with
/// [`SectionRef::is_ancestor_of`] or the helpers below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleguideModel {
    sections: BTreeMap<SectionRef, Section>,
}

impl StyleguideModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a section, returning the one it replaced (duplicate reference).
    pub fn insert(&mut self, section: Section) -> Option<Section> {
        self.sections.insert(section.reference.clone(), section)
    }

    pub fn get(&self, reference: &SectionRef) -> Option<&Section> {
        self.sections.get(reference)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// All sections in reference order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    /// References that have no ancestor present in the model, in order.
    pub fn root_references(&self) -> Vec<SectionRef> {
        self.sections
            .keys()
            .filter(|reference| {
                !reference
                    .ancestors()
                    .iter()
                    .any(|ancestor| self.sections.contains_key(ancestor))
            })
            .cloned()
            .collect()
    }

    /// Sections strictly below `root`, in reference order.
    pub fn descendants<'a>(&'a self, root: &'a SectionRef) -> impl Iterator<Item = &'a Section> {
        self.sections
            .range(root.clone()..)
            .skip_while(move |(reference, _)| *reference == root)
            .take_while(move |(reference, _)| root.is_ancestor_of(reference))
            .map(|(_, section)| section)
    }
}
