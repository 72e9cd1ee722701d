//! Property-based tests for `TwoThreeMap`.
//!
//! These tests verify that `TwoThreeMap` satisfies the ordered-map laws and
//! keeps every leaf at the same depth under arbitrary operation
//! interleavings, using proptest with `std::collections::BTreeMap` as the
//! reference model. The removal fix-up cases are additionally swept
//! exhaustively: every deletion order of a fixed small key set must
//! preserve the depth-equality invariant at every step.

use std::collections::BTreeMap;

use arbors::map::{MapError, TwoThreeMap};
use proptest::prelude::*;

// =============================================================================
// Strategies for Generating Test Data
// =============================================================================

/// A single mutating step applied to both the map under test and the model.
#[derive(Debug, Clone)]
enum MapOperation {
    Insert(i32, i32),
    Remove(i32),
}

/// Strategy for an operation over a deliberately small key domain, so that
/// removals hit existing keys and overwrites actually happen.
fn arbitrary_operation() -> impl Strategy<Value = MapOperation> {
    prop_oneof![
        (0..64i32, any::<i32>()).prop_map(|(key, value)| MapOperation::Insert(key, value)),
        (0..64i32).prop_map(MapOperation::Remove),
    ]
}

/// Strategy for a TwoThreeMap built from a vector of key-value pairs.
fn arbitrary_map(max_size: usize) -> impl Strategy<Value = TwoThreeMap<i32, i32>> {
    prop::collection::vec((any::<i32>(), any::<i32>()), 0..max_size)
        .prop_map(|entries| entries.into_iter().collect::<TwoThreeMap<i32, i32>>())
}

// =============================================================================
// Get-Insert Laws
// =============================================================================

proptest! {
    /// Law: get after insert returns the inserted value.
    #[test]
    fn prop_get_insert_law(
        entries in prop::collection::vec((any::<i32>(), any::<i32>()), 0..20),
        key: i32,
        value: i32
    ) {
        let mut map: TwoThreeMap<i32, i32> = entries.into_iter().collect();
        map.insert(key, value);
        prop_assert_eq!(map.get(&key), Ok(&value));
    }

    /// Law: insert does not affect other keys.
    #[test]
    fn prop_get_insert_other_law(
        entries in prop::collection::vec((any::<i32>(), any::<i32>()), 0..20),
        key1: i32,
        key2: i32,
        value: i32
    ) {
        prop_assume!(key1 != key2);
        let map: TwoThreeMap<i32, i32> = entries.into_iter().collect();
        let mut updated = map.clone();
        updated.insert(key1, value);
        prop_assert_eq!(updated.get(&key2), map.get(&key2));
    }

    /// Law: overwriting a key keeps the length and replaces the value.
    #[test]
    fn prop_idempotent_overwrite_law(
        entries in prop::collection::vec((any::<i32>(), any::<i32>()), 0..20),
        key: i32,
        value1: i32,
        value2: i32
    ) {
        let mut map: TwoThreeMap<i32, i32> = entries.into_iter().collect();
        map.insert(key, value1);
        let length = map.len();
        prop_assert!(!map.insert(key, value2));
        prop_assert_eq!(map.len(), length);
        prop_assert_eq!(map.get(&key), Ok(&value2));
    }
}

// =============================================================================
// Remove Laws
// =============================================================================

proptest! {
    /// Law: get after remove fails with KeyNotFound.
    #[test]
    fn prop_get_remove_law(
        entries in prop::collection::vec((any::<i32>(), any::<i32>()), 0..20),
        key: i32
    ) {
        let mut map: TwoThreeMap<i32, i32> = entries.into_iter().collect();
        let _ = map.remove(&key);
        prop_assert_eq!(map.get(&key), Err(MapError::KeyNotFound));
    }

    /// Law: remove does not affect other keys.
    #[test]
    fn prop_get_remove_other_law(
        entries in prop::collection::vec((any::<i32>(), any::<i32>()), 0..20),
        key1: i32,
        key2: i32
    ) {
        prop_assume!(key1 != key2);
        let map: TwoThreeMap<i32, i32> = entries.into_iter().collect();
        let mut removed = map.clone();
        let _ = removed.remove(&key1);
        prop_assert_eq!(removed.get(&key2), map.get(&key2));
    }

    /// Law: removing an absent key is an error and mutates nothing.
    #[test]
    fn prop_remove_absent_is_noop(
        entries in prop::collection::vec((0..64i32, any::<i32>()), 0..20),
        key in 64..128i32
    ) {
        let mut map: TwoThreeMap<i32, i32> = entries.into_iter().collect();
        let before: Vec<(i32, i32)> = map.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(map.remove(&key), Err(MapError::KeyNotFound));
        let after: Vec<(i32, i32)> = map.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(before, after);
    }
}

// =============================================================================
// Structural Laws
// =============================================================================

proptest! {
    /// The depth and child-count invariants hold after any build.
    #[test]
    fn prop_invariants_hold_after_inserts(map in arbitrary_map(64)) {
        map.assert_invariants();
    }

    /// Iteration yields keys in strictly ascending order.
    #[test]
    fn prop_iteration_strictly_ascending(map in arbitrary_map(64)) {
        let keys: Vec<i32> = map.keys().copied().collect();
        for window in keys.windows(2) {
            prop_assert!(window[0] < window[1]);
        }
    }

    /// min and max agree with iteration extremes.
    #[test]
    fn prop_min_max_agree_with_iteration(map in arbitrary_map(64)) {
        let keys: Vec<i32> = map.keys().copied().collect();
        match (keys.first(), keys.last()) {
            (Some(first), Some(last)) => {
                prop_assert_eq!(map.min().map(|(key, _)| *key), Ok(*first));
                prop_assert_eq!(map.max().map(|(key, _)| *key), Ok(*last));
            }
            _ => {
                prop_assert_eq!(map.min(), Err(MapError::EmptyMap));
                prop_assert_eq!(map.max(), Err(MapError::EmptyMap));
            }
        }
    }
}

// =============================================================================
// Model Comparison
// =============================================================================

proptest! {
    /// An arbitrary operation interleaving behaves exactly like BTreeMap,
    /// and the structural invariants hold after every single step.
    #[test]
    fn prop_behaves_like_btreemap(
        operations in prop::collection::vec(arbitrary_operation(), 0..120)
    ) {
        let mut map: TwoThreeMap<i32, i32> = TwoThreeMap::new();
        let mut model: BTreeMap<i32, i32> = BTreeMap::new();

        for operation in operations {
            match operation {
                MapOperation::Insert(key, value) => {
                    let added = map.insert(key, value);
                    let model_added = model.insert(key, value).is_none();
                    prop_assert_eq!(added, model_added);
                }
                MapOperation::Remove(key) => {
                    let removed = map.remove(&key);
                    let model_removed = model.remove(&key).ok_or(MapError::KeyNotFound);
                    prop_assert_eq!(removed, model_removed);
                }
            }
            map.assert_invariants();
            prop_assert_eq!(map.len(), model.len());
        }

        let entries: Vec<(i32, i32)> = map.iter().map(|(k, v)| (*k, *v)).collect();
        let model_entries: Vec<(i32, i32)> = model.iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(entries, model_entries);
    }

    /// contains is true exactly when get succeeds.
    #[test]
    fn prop_contains_matches_get(map in arbitrary_map(64), key: i32) {
        prop_assert_eq!(map.contains(&key), map.get(&key).is_ok());
    }
}

// =============================================================================
// Exhaustive Removal Sweep
// =============================================================================

/// Returns every permutation of `values`.
fn permutations(values: Vec<i32>) -> Vec<Vec<i32>> {
    if values.len() <= 1 {
        return vec![values];
    }
    let mut output = Vec::new();
    for index in 0..values.len() {
        let mut rest = values.clone();
        let chosen = rest.remove(index);
        for mut tail in permutations(rest) {
            let mut permutation = vec![chosen];
            permutation.append(&mut tail);
            output.push(permutation);
        }
    }
    output
}

/// Every deletion order of a fixed small key set must keep all leaves at
/// the same depth at every step, for every tree size up to seven keys.
#[test]
fn exhaustive_deletion_orders_keep_leaves_level() {
    for size in 1..=7 {
        let keys: Vec<i32> = (1..=size).collect();
        for order in permutations(keys.clone()) {
            let mut map: TwoThreeMap<i32, i32> =
                keys.iter().map(|key| (*key, key * 10)).collect();
            for key in order {
                assert_eq!(map.remove(&key), Ok(key * 10));
                map.assert_invariants();
            }
            assert!(map.is_empty());
        }
    }
}

/// Every insertion order of a fixed small key set must produce a well
/// formed tree at every step.
#[test]
fn exhaustive_insertion_orders_keep_leaves_level() {
    for size in 1..=7 {
        let keys: Vec<i32> = (1..=size).collect();
        for order in permutations(keys.clone()) {
            let mut map = TwoThreeMap::new();
            for key in order {
                map.insert(key, key * 10);
                map.assert_invariants();
            }
            let sorted: Vec<i32> = map.keys().copied().collect();
            assert_eq!(sorted, keys);
        }
    }
}
