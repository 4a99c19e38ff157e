//! Selection cascade resolver
//!
//! Plans the full effect of toggling one facet key: the marker change on the
//! key itself and an insert/remove for every descendant whose selection flips.
//! Planning is pure; the plan is applied in one step by `SelectionState`.
//!
//! Global invariants enforced:
//! - Work is proportional to the toggled node's subtree, never to the dataset
//! - Descendants are reached through the hierarchy index by compound key only
//! - A descendant with its own selection marker survives an ancestor deselect
//! - An exclusion marker only lives under a selected parent

use crate::facet::{FacetKey, HierarchyIndex};
use crate::selection::{SelectionState, ToggleAction};

/// What happens to the markers on the toggled key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerChange {
    /// Selected while the parent is not
    Select,
    /// Deselected while the parent stays selected; an own selection marker is
    /// kept underneath
    Exclude,
    /// Reselected under a selected parent: the exclusion goes, an own
    /// selection marker applies again
    Include,
    /// Deselected while the parent is not; every marker goes
    Clear,
}

/// One change to the materialized selection sets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetMutation {
    Insert(FacetKey),
    Remove(FacetKey),
}

/// A fully resolved toggle, ready to apply atomically
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionBatch {
    pub key: FacetKey,
    pub action: ToggleAction,
    pub marker: MarkerChange,
    /// Toggled key first, then descendants level by level
    pub mutations: Vec<SetMutation>,
    /// Descendants whose exclusion markers end up under an unselected parent
    pub released: Vec<FacetKey>,
}

impl SelectionBatch {
    pub fn inserted(&self) -> usize {
        self.mutations
            .iter()
            .filter(|m| matches!(m, SetMutation::Insert(_)))
            .count()
    }

    pub fn removed(&self) -> usize {
        self.mutations.len() - self.inserted()
    }
}

/// Plan a toggle of `key` against the current markers
///
/// Returns `None` when the key is not part of the hierarchy; the caller
/// leaves the state untouched.
pub fn resolve(
    index: &HierarchyIndex,
    state: &SelectionState,
    key: &FacetKey,
) -> Option<SelectionBatch> {
    if !index.contains(key) {
        tracing::warn!(key = %key, dimension = %key.dimension, "toggled facet is not in the hierarchy; ignoring");
        return None;
    }

    let currently_selected = state.is_selected(key);
    let parent_selected = key.parent().is_some_and(|p| state.is_selected(&p));

    let (action, marker, selected) = match (currently_selected, parent_selected) {
        (true, true) => (ToggleAction::Deselect, MarkerChange::Exclude, false),
        (true, false) => (ToggleAction::Deselect, MarkerChange::Clear, false),
        (false, true) => (ToggleAction::Select, MarkerChange::Include, true),
        (false, false) => (ToggleAction::Select, MarkerChange::Select, true),
    };

    let mut mutations = vec![mutation(key, selected)];
    let mut released = Vec::new();

    // Breadth-first, one level at a time, carrying each node's new selection
    let mut level: Vec<(&FacetKey, bool)> = vec![(key, selected)];
    while !level.is_empty() {
        let mut next = Vec::new();
        for (parent, parent_selected) in level {
            for child in index.children(parent).unwrap_or_default() {
                let excluded = state.has_exclusion_marker(child);
                if excluded && !parent_selected {
                    released.push(child.clone());
                }
                let child_selected = if excluded {
                    false
                } else if state.has_selection_marker(child) {
                    true
                } else {
                    parent_selected
                };
                if child_selected != state.is_selected(child) {
                    mutations.push(mutation(child, child_selected));
                }
                next.push((child, child_selected));
            }
        }
        level = next;
    }

    Some(SelectionBatch {
        key: key.clone(),
        action,
        marker,
        mutations,
        released,
    })
}

fn mutation(key: &FacetKey, selected: bool) -> SetMutation {
    if selected {
        SetMutation::Insert(key.clone())
    } else {
        SetMutation::Remove(key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Dimension, RawCostRecord};
    use crate::store::CostStore;

    fn raw(path: [&str; 5]) -> RawCostRecord {
        RawCostRecord {
            date: Some("2024-05-01".to_string()),
            subscription: Some(path[0].to_string()),
            category: Some(path[1].to_string()),
            subcategory: Some(path[2].to_string()),
            meter: Some(path[3].to_string()),
            resource: Some(path[4].to_string()),
            cost_local: Some(1.0),
            cost_usd: Some(1.0),
            currency: None,
        }
    }

    fn store() -> CostStore {
        CostStore::from_raw(&[
            raw(["Sub-A", "Storage", "Blob", "LRS", "st1"]),
            raw(["Sub-A", "Storage", "Blob", "LRS", "st2"]),
            raw(["Sub-A", "Storage", "Files", "ZRS", "fs1"]),
            raw(["Sub-A", "Compute", "VM", "D2", "vm1"]),
            raw(["Sub-B", "Storage", "Blob", "LRS", "st9"]),
        ])
    }

    fn key(path: &str) -> FacetKey {
        FacetKey::parse(path).unwrap()
    }

    #[test]
    fn test_select_plans_whole_subtree() {
        let store = store();
        let state = SelectionState::new();
        let batch = resolve(store.index(), &state, &key("Sub-A > Storage")).unwrap();

        assert_eq!(batch.action, ToggleAction::Select);
        assert_eq!(batch.marker, MarkerChange::Select);
        // Storage + Blob, Files + LRS, ZRS + st1, st2, fs1
        assert_eq!(batch.inserted(), 8);
        assert_eq!(batch.removed(), 0);
        assert_eq!(batch.mutations[0], SetMutation::Insert(key("Sub-A > Storage")));
        // Same-named category under Sub-B is untouched
        assert!(!batch
            .mutations
            .contains(&SetMutation::Insert(key("Sub-B > Storage"))));
    }

    #[test]
    fn test_unknown_key_resolves_to_nothing() {
        let store = store();
        let state = SelectionState::new();
        assert!(resolve(store.index(), &state, &key("Sub-C")).is_none());
        // Right name, wrong ancestors
        assert!(resolve(store.index(), &state, &key("Sub-B > Compute")).is_none());
    }

    #[test]
    fn test_deselect_keeps_independently_selected_descendant() {
        let store = store();
        let index = store.index();
        let mut state = SelectionState::new();

        let meter = key("Sub-A > Storage > Blob > LRS");
        let subcategory = key("Sub-A > Storage > Blob");

        state.toggle(index, &meter).unwrap();
        // Selecting the parent only adds the parent itself
        let change = state.toggle(index, &subcategory).unwrap();
        assert_eq!(change.inserted, 1);

        let change = state.toggle(index, &subcategory).unwrap();
        assert_eq!(change.action, ToggleAction::Deselect);
        assert_eq!(change.removed, 1);
        assert!(state.is_selected(&meter));
        assert!(state.is_selected(&key("Sub-A > Storage > Blob > LRS > st1")));
        assert!(!state.is_selected(&subcategory));
    }

    #[test]
    fn test_reselected_descendant_keeps_own_selection() {
        let store = store();
        let index = store.index();
        let mut state = SelectionState::new();

        let meter = key("Sub-A > Storage > Blob > LRS");
        let subcategory = key("Sub-A > Storage > Blob");

        state.toggle(index, &meter).unwrap();
        state.toggle(index, &subcategory).unwrap();

        let before = state.sets().clone();
        let change = state.toggle(index, &meter).unwrap();
        assert_eq!(change.action, ToggleAction::Deselect);
        assert!(state.has_exclusion_marker(&meter));
        assert!(state.has_selection_marker(&meter));

        let change = state.toggle(index, &meter).unwrap();
        assert_eq!(change.action, ToggleAction::Select);
        assert_eq!(state.sets(), &before);

        // The meter was picked on its own, so it outlives its parent
        state.toggle(index, &subcategory).unwrap();
        assert!(state.is_selected(&meter));
        assert!(state.is_selected(&key("Sub-A > Storage > Blob > LRS > st2")));
        assert!(!state.is_selected(&subcategory));
    }

    #[test]
    fn test_deselected_parent_drops_carve_outs_after_another_gesture() {
        let store = store();
        let index = store.index();
        let mut state = SelectionState::new();

        state.toggle(index, &key("Sub-A")).unwrap();
        state.toggle(index, &key("Sub-A > Storage")).unwrap();
        state.toggle(index, &key("Sub-A")).unwrap();

        assert!(state.sets().is_empty());
        assert!(!state.has_exclusion_marker(&key("Sub-A > Storage")));
        assert_eq!(state.marker_count(), 0);
        assert_eq!(state.restorable_key(), Some(&key("Sub-A")));

        state.toggle(index, &key("Sub-B")).unwrap();
        state.toggle(index, &key("Sub-B")).unwrap();
        assert_eq!(state.restorable_key(), None);

        // A fresh select covers the whole subtree again
        let change = state.toggle(index, &key("Sub-A")).unwrap();
        assert_eq!(change.inserted, 13);
        assert!(state.is_selected(&key("Sub-A > Storage > Files > ZRS > fs1")));
    }

    #[test]
    fn test_released_carve_out_drops_shadowed_selection() {
        let store = store();
        let index = store.index();
        let mut state = SelectionState::new();

        let category = key("Sub-A > Storage");
        state.toggle(index, &category).unwrap();
        state.toggle(index, &key("Sub-A")).unwrap();
        state.toggle(index, &category).unwrap();
        assert!(state.has_selection_marker(&category));
        assert!(state.has_exclusion_marker(&category));

        state.toggle(index, &key("Sub-A")).unwrap();
        assert!(state.sets().is_empty());
        assert_eq!(state.marker_count(), 0);
    }

    #[test]
    fn test_deselecting_child_of_selected_parent_carves_it_out() {
        let store = store();
        let index = store.index();
        let mut state = SelectionState::new();

        state.toggle(index, &key("Sub-A")).unwrap();
        let change = state.toggle(index, &key("Sub-A > Storage")).unwrap();

        assert_eq!(change.action, ToggleAction::Deselect);
        assert_eq!(change.removed, 8);
        assert!(state.has_exclusion_marker(&key("Sub-A > Storage")));
        assert!(state.is_selected(&key("Sub-A > Compute")));
        assert_eq!(state.sets().count(Dimension::Category), 1);
    }

    #[test]
    fn test_toggle_twice_restores_carved_out_state() {
        let store = store();
        let index = store.index();
        let mut state = SelectionState::new();

        state.toggle(index, &key("Sub-A")).unwrap();
        state.toggle(index, &key("Sub-A > Storage > Files")).unwrap();
        let before = state.sets().clone();

        state.toggle(index, &key("Sub-A")).unwrap();
        assert!(state.sets().is_empty());
        state.toggle(index, &key("Sub-A")).unwrap();

        assert_eq!(state.sets(), &before);
        assert!(!state.is_selected(&key("Sub-A > Storage > Files > ZRS > fs1")));
    }
}
