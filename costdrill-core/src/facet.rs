//! Facet keys and the hierarchy index
//!
//! A facet value is only meaningful relative to its position in the
//! hierarchy: "Storage" under "Sub-A" and "Storage" under "Sub-B" are
//! different keys. Keys are always (dimension, value, ancestor path), never
//! bare value names.

use crate::record::Dimension;
use crate::store::{CostNode, DailyAggregate};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Separator used when rendering or parsing a facet path
pub const PATH_SEPARATOR: &str = " > ";

/// Character that splits a written path; facet values never contain it
pub const PATH_DELIMITER: char = '>';

/// Values of every ancestor level, outermost first
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AncestorPath(Vec<String>);

impl AncestorPath {
    pub fn new(values: Vec<String>) -> Self {
        AncestorPath(values)
    }

    pub fn root() -> Self {
        AncestorPath(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }
}

// Lets selection sets be queried with a borrowed path slice during filtering.
impl Borrow<[String]> for AncestorPath {
    fn borrow(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for AncestorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(PATH_SEPARATOR))
    }
}

/// A facet value qualified by its ancestors
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FacetKey {
    pub dimension: Dimension,
    pub value: String,
    pub ancestors: AncestorPath,
}

impl FacetKey {
    pub fn new(dimension: Dimension, value: impl Into<String>, ancestors: AncestorPath) -> Self {
        FacetKey {
            dimension,
            value: value.into(),
            ancestors,
        }
    }

    /// Key for a full value path; the path length picks the dimension
    pub fn from_path<S: AsRef<str>>(path: &[S]) -> Option<FacetKey> {
        let (value, ancestors) = path.split_last()?;
        let dimension = Dimension::from_depth(ancestors.len())?;
        Some(FacetKey::new(
            dimension,
            value.as_ref(),
            AncestorPath::new(ancestors.iter().map(|a| a.as_ref().to_string()).collect()),
        ))
    }

    /// Parse `Sub-A > Storage > Blob` (the `>` separator, surrounding
    /// whitespace ignored)
    pub fn parse(s: &str) -> Option<FacetKey> {
        let parts: Vec<&str> = s.split(PATH_DELIMITER).map(str::trim).collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        FacetKey::from_path(&parts)
    }

    /// Ancestors followed by the value itself
    pub fn path(&self) -> Vec<String> {
        let mut path = self.ancestors.values().to_vec();
        path.push(self.value.clone());
        path
    }

    /// Whether the ancestor path has the length the dimension requires
    pub fn is_well_formed(&self) -> bool {
        self.ancestors.len() == self.dimension.depth()
    }

    pub fn parent(&self) -> Option<FacetKey> {
        FacetKey::from_path(self.ancestors.values())
    }

    /// Key of a child value one level down
    pub fn child(&self, value: impl Into<String>) -> Option<FacetKey> {
        let dimension = self.dimension.child()?;
        Some(FacetKey::new(dimension, value, AncestorPath::new(self.path())))
    }
}

impl fmt::Display for FacetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ancestor in self.ancestors.values() {
            write!(f, "{}{}", ancestor, PATH_SEPARATOR)?;
        }
        f.write_str(&self.value)
    }
}

/// Precomputed FacetKey -> child FacetKeys map over the whole date range
///
/// Lets a cascade jump straight to a node and walk only its subtree.
#[derive(Debug, Clone, Default)]
pub struct HierarchyIndex {
    roots: Vec<FacetKey>,
    children: HashMap<FacetKey, Vec<FacetKey>>,
}

impl HierarchyIndex {
    /// Union the per-day trees into one facet hierarchy
    pub fn from_aggregate(aggregate: &DailyAggregate) -> Self {
        let mut tree: HashMap<FacetKey, BTreeSet<FacetKey>> = HashMap::new();
        let mut roots: BTreeSet<FacetKey> = BTreeSet::new();

        for day in aggregate.days.values() {
            for (value, node) in &day.children {
                let key = FacetKey::new(Dimension::Subscription, value.clone(), AncestorPath::root());
                roots.insert(key.clone());
                collect_children(&key, node, &mut tree);
            }
        }

        HierarchyIndex {
            roots: roots.into_iter().collect(),
            children: tree
                .into_iter()
                .map(|(key, kids)| (key, kids.into_iter().collect()))
                .collect(),
        }
    }

    pub fn contains(&self, key: &FacetKey) -> bool {
        self.children.contains_key(key)
    }

    /// Children of a key, sorted by value; `None` when the key is unknown
    pub fn children(&self, key: &FacetKey) -> Option<&[FacetKey]> {
        self.children.get(key).map(Vec::as_slice)
    }

    pub fn roots(&self) -> &[FacetKey] {
        &self.roots
    }

    /// Number of distinct facet keys
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Every key of one dimension, sorted
    pub fn keys(&self, dimension: Dimension) -> Vec<&FacetKey> {
        let mut keys: Vec<&FacetKey> = self
            .children
            .keys()
            .filter(|k| k.dimension == dimension)
            .collect();
        keys.sort();
        keys
    }

    /// Number of keys below `key` (excluding itself)
    pub fn descendant_count(&self, key: &FacetKey) -> usize {
        let mut count = 0;
        let mut stack: Vec<&FacetKey> = vec![key];
        while let Some(current) = stack.pop() {
            if let Some(kids) = self.children.get(current) {
                count += kids.len();
                stack.extend(kids.iter());
            }
        }
        count
    }
}

/// Register `key` and its subtree; leaves get an empty child list
fn collect_children(
    key: &FacetKey,
    node: &CostNode,
    tree: &mut HashMap<FacetKey, BTreeSet<FacetKey>>,
) {
    tree.entry(key.clone()).or_default();
    for (value, child) in &node.children {
        let Some(child_key) = key.child(value.clone()) else {
            continue;
        };
        if let Some(kids) = tree.get_mut(key) {
            kids.insert(child_key.clone());
        }
        collect_children(&child_key, child, tree);
    }
}
