//! Facet selection state
//!
//! `SelectionSets` is the materialized view the filter reads: per dimension,
//! facet value -> ancestor contexts under which it is selected. An empty map
//! for a dimension means that dimension is unconstrained.
//!
//! `SelectionState` owns the sets together with the markers that justify
//! them. A key is selected iff it has no exclusion marker and either carries
//! a selection marker or has a selected parent. Exclusion markers only exist
//! under a selected parent, so an empty selection means no markers either.
//! Only `SelectionState::apply` writes, and it only accepts a batch planned by
//! the cascade resolver.

use crate::cascade::{self, MarkerChange, SelectionBatch, SetMutation};
use crate::facet::{AncestorPath, FacetKey, HierarchyIndex};
use crate::record::Dimension;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Selected contexts per facet value, for one dimension
pub type DimensionSelection = BTreeMap<String, BTreeSet<AncestorPath>>;

/// Per-dimension selected facet keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SelectionSets {
    dimensions: [DimensionSelection; 5],
}

impl SelectionSets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dimension(&self, dimension: Dimension) -> &DimensionSelection {
        &self.dimensions[dimension.depth()]
    }

    /// No selection in this dimension: every value passes
    pub fn is_unconstrained(&self, dimension: Dimension) -> bool {
        self.dimension(dimension).is_empty()
    }

    /// True when no dimension constrains the data
    pub fn is_empty(&self) -> bool {
        self.dimensions.iter().all(BTreeMap::is_empty)
    }

    pub fn contains(&self, key: &FacetKey) -> bool {
        self.dimension(key.dimension)
            .get(&key.value)
            .is_some_and(|contexts| contexts.contains(&key.ancestors))
    }

    /// Dimension test for one value at one position in the hierarchy
    pub fn admits(&self, dimension: Dimension, value: &str, ancestors: &[String]) -> bool {
        let selection = self.dimension(dimension);
        if selection.is_empty() {
            return true;
        }
        selection
            .get(value)
            .is_some_and(|contexts| contexts.contains(ancestors))
    }

    /// Total number of selected (value, context) pairs
    pub fn len(&self) -> usize {
        self.dimensions
            .iter()
            .flat_map(|d| d.values())
            .map(BTreeSet::len)
            .sum()
    }

    pub fn count(&self, dimension: Dimension) -> usize {
        self.dimension(dimension).values().map(BTreeSet::len).sum()
    }

    /// Every selected key, in dimension then value then context order
    pub fn keys(&self) -> Vec<FacetKey> {
        let mut keys = Vec::with_capacity(self.len());
        for dimension in Dimension::ALL {
            for (value, contexts) in self.dimension(dimension) {
                for context in contexts {
                    keys.push(FacetKey::new(dimension, value.clone(), context.clone()));
                }
            }
        }
        keys
    }

    fn insert(&mut self, key: &FacetKey) -> bool {
        self.dimensions[key.dimension.depth()]
            .entry(key.value.clone())
            .or_default()
            .insert(key.ancestors.clone())
    }

    /// Retract one context; the value disappears once no context remains
    fn remove(&mut self, key: &FacetKey) -> bool {
        let selection = &mut self.dimensions[key.dimension.depth()];
        let Some(contexts) = selection.get_mut(&key.value) else {
            return false;
        };
        let removed = contexts.remove(&key.ancestors);
        if contexts.is_empty() {
            selection.remove(&key.value);
        }
        removed
    }
}

/// Builds a fixed selection directly, bypassing cascades
///
/// Used for evaluating a selection snapshot that did not come from user
/// gestures (saved views, tests).
impl FromIterator<FacetKey> for SelectionSets {
    fn from_iter<I: IntoIterator<Item = FacetKey>>(iter: I) -> Self {
        let mut sets = SelectionSets::new();
        for key in iter {
            sets.insert(&key);
        }
        sets
    }
}

/// Whether a toggle selected or deselected its key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleAction {
    Select,
    Deselect,
}

/// Summary of one applied batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SelectionChange {
    pub key: FacetKey,
    pub action: ToggleAction,
    pub inserted: usize,
    pub removed: usize,
}

/// Exclusion markers dropped by the last deselect
///
/// Kept for exactly one gesture so that toggling the same key again restores
/// its carve-outs. Any other gesture discards them.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReleasedMarkers {
    key: FacetKey,
    exclusions: Vec<FacetKey>,
    /// Own selection markers that were shadowed by those exclusions
    selections: Vec<FacetKey>,
}

/// Selection sets plus the markers that justify them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    sets: SelectionSets,
    selected_markers: BTreeSet<FacetKey>,
    excluded_markers: BTreeSet<FacetKey>,
    released: Option<ReleasedMarkers>,
}

impl SelectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sets(&self) -> &SelectionSets {
        &self.sets
    }

    pub fn is_selected(&self, key: &FacetKey) -> bool {
        self.sets.contains(key)
    }

    pub fn has_selection_marker(&self, key: &FacetKey) -> bool {
        self.selected_markers.contains(key)
    }

    pub fn has_exclusion_marker(&self, key: &FacetKey) -> bool {
        self.excluded_markers.contains(key)
    }

    /// Number of markers of either kind
    pub fn marker_count(&self) -> usize {
        self.selected_markers.len() + self.excluded_markers.len()
    }

    /// Key whose carve-outs the next toggle of that same key would restore
    pub fn restorable_key(&self) -> Option<&FacetKey> {
        self.released.as_ref().map(|r| &r.key)
    }

    /// Resolve and apply one toggle as a single batch
    ///
    /// Returns `None` (state untouched) when the key is not in the index.
    pub fn toggle(&mut self, index: &HierarchyIndex, key: &FacetKey) -> Option<SelectionChange> {
        if index.contains(key) && self.restorable_key() == Some(key) {
            if let Some(released) = self.released.take() {
                self.reinstate(released);
            }
        }
        let batch = cascade::resolve(index, self, key)?;
        Some(self.apply(batch))
    }

    /// Reset every dimension to unconstrained; returns whether anything changed
    pub fn clear(&mut self) -> bool {
        let changed = !self.sets.is_empty()
            || !self.selected_markers.is_empty()
            || !self.excluded_markers.is_empty();
        *self = SelectionState::default();
        changed
    }

    /// Apply a resolved batch in one step
    pub(crate) fn apply(&mut self, batch: SelectionBatch) -> SelectionChange {
        let SelectionBatch {
            key,
            action,
            marker,
            mutations,
            released,
        } = batch;

        match marker {
            MarkerChange::Select => {
                self.excluded_markers.remove(&key);
                self.selected_markers.insert(key.clone());
            }
            MarkerChange::Exclude => {
                self.excluded_markers.insert(key.clone());
            }
            MarkerChange::Include => {
                self.excluded_markers.remove(&key);
            }
            MarkerChange::Clear => {
                self.selected_markers.remove(&key);
                self.excluded_markers.remove(&key);
            }
        }

        let mut inserted = 0;
        let mut removed = 0;
        for mutation in &mutations {
            match mutation {
                SetMutation::Insert(k) => {
                    if self.sets.insert(k) {
                        inserted += 1;
                    }
                }
                SetMutation::Remove(k) => {
                    if self.sets.remove(k) {
                        removed += 1;
                    }
                }
            }
        }

        self.released = self.release(&key, released);

        tracing::debug!(
            key = %key,
            action = ?action,
            inserted,
            removed,
            released = self.released.as_ref().map_or(0, |r| r.exclusions.len()),
            "applied selection cascade"
        );

        SelectionChange {
            key,
            action,
            inserted,
            removed,
        }
    }

    /// Drop exclusion markers (and the selection markers they shadow) that no
    /// longer sit under a selected parent
    fn release(&mut self, key: &FacetKey, exclusions: Vec<FacetKey>) -> Option<ReleasedMarkers> {
        if exclusions.is_empty() {
            return None;
        }
        let mut selections = Vec::new();
        for excluded in &exclusions {
            self.excluded_markers.remove(excluded);
            if self.selected_markers.remove(excluded) {
                selections.push(excluded.clone());
            }
        }
        Some(ReleasedMarkers {
            key: key.clone(),
            exclusions,
            selections,
        })
    }

    /// Put released markers back; their keys are all unselected already
    fn reinstate(&mut self, released: ReleasedMarkers) {
        self.excluded_markers.extend(released.exclusions);
        self.selected_markers.extend(released.selections);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(path: &str) -> FacetKey {
        FacetKey::parse(path).unwrap()
    }

    #[test]
    fn test_empty_sets_are_unconstrained() {
        let sets = SelectionSets::new();
        assert!(sets.is_empty());
        for dimension in Dimension::ALL {
            assert!(sets.is_unconstrained(dimension));
            assert!(sets.admits(dimension, "anything", &[]));
        }
    }

    #[test]
    fn test_admits_requires_matching_context() {
        let sets: SelectionSets = [key("Sub-A > Storage")].into_iter().collect();
        assert!(sets.admits(Dimension::Category, "Storage", &["Sub-A".to_string()]));
        assert!(!sets.admits(Dimension::Category, "Storage", &["Sub-B".to_string()]));
        assert!(!sets.admits(Dimension::Category, "Compute", &["Sub-A".to_string()]));
        // Other dimensions stay unconstrained
        assert!(sets.admits(Dimension::Subscription, "Sub-B", &[]));
    }

    #[test]
    fn test_remove_retracts_single_context() {
        let mut sets: SelectionSets = [key("Sub-A > Storage"), key("Sub-B > Storage")]
            .into_iter()
            .collect();
        assert_eq!(sets.count(Dimension::Category), 2);

        assert!(sets.remove(&key("Sub-A > Storage")));
        assert!(sets.contains(&key("Sub-B > Storage")));
        assert!(!sets.contains(&key("Sub-A > Storage")));

        assert!(sets.remove(&key("Sub-B > Storage")));
        assert!(sets.dimension(Dimension::Category).is_empty());
        assert!(!sets.remove(&key("Sub-B > Storage")));
    }

    #[test]
    fn test_keys_lists_every_context() {
        let sets: SelectionSets = [key("Sub-B"), key("Sub-A > Storage"), key("Sub-A")]
            .into_iter()
            .collect();
        let keys = sets.keys();
        assert_eq!(keys, vec![key("Sub-A"), key("Sub-B"), key("Sub-A > Storage")]);
        assert_eq!(sets.len(), 3);
    }

    #[test]
    fn test_clear_reports_change_once() {
        let mut state = SelectionState::new();
        assert!(!state.clear());
        state.sets.insert(&key("Sub-A"));
        state.selected_markers.insert(key("Sub-A"));
        assert!(state.clear());
        assert!(!state.clear());
        assert_eq!(state, SelectionState::new());
    }
}
