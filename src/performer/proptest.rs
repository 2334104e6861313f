//! Property-Based Tests for Performer State
//!
//! # Test Properties
//!
//! 1. **No Lost Updates**: concurrent additions sum exactly
//! 2. **Merge Is Pure**: merging extra attributes never touches stored state
//! 3. **Last Write Wins**: dynamic attributes reflect only the latest mutation

#![cfg(test)]

use std::sync::Arc;

use proptest::prelude::*;

use super::base::BaseObservePerformer;
use crate::domain::{Attribute, Attributes, ObserveOption};

// =============================================================================
// Property Strategies
// =============================================================================

/// Small non-negative integers keep float sums exact.
fn increments_strategy() -> impl Strategy<Value = Vec<u32>> {
    prop::collection::vec(0u32..1000, 1..200)
}

fn attributes_strategy() -> impl Strategy<Value = Attributes> {
    prop::collection::vec(("[a-z]{1,6}", "[a-z0-9]{0,6}"), 0..5).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(key, value)| Attribute::new(key, value))
            .collect()
    })
}

// =============================================================================
// Value Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// Property: Concurrent adds across threads equal the sequential sum.
    #[test]
    fn prop_concurrent_adds_sum(increments in increments_strategy(), threads in 1usize..=4) {
        let base = Arc::new(BaseObservePerformer::new(Attributes::new()));
        let expected: u64 = increments.iter().map(|&i| u64::from(i)).sum::<u64>() * threads as u64;

        std::thread::scope(|scope| {
            for _ in 0..threads {
                let base = Arc::clone(&base);
                let increments = &increments;
                scope.spawn(move || {
                    for &increment in increments {
                        base.add_value(f64::from(increment));
                    }
                });
            }
        });

        prop_assert_eq!(base.value(), expected as f64);
    }
}

// =============================================================================
// Attribute Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: merge returns static ++ extra and leaves stored options alone.
    #[test]
    fn prop_merge_does_not_mutate(
        statics in attributes_strategy(),
        dynamic in attributes_strategy(),
        extra in attributes_strategy(),
    ) {
        let base = BaseObservePerformer::new(statics.clone());
        base.set_observe_options_by_option(&[ObserveOption::new(dynamic.clone())]);
        let before = base.observe_options();

        let merged = base.merge_attributes_to_observe_options(&extra);

        prop_assert_eq!(merged, statics.concat(&extra));
        prop_assert_eq!(base.observe_options(), before);
        prop_assert_eq!(base.static_attributes(), &statics);
    }

    /// Property: only the last set of options is visible.
    #[test]
    fn prop_last_options_win(
        statics in attributes_strategy(),
        history in prop::collection::vec(attributes_strategy(), 1..10),
    ) {
        let base = BaseObservePerformer::new(statics.clone());
        for attributes in &history {
            base.set_observe_options_by_option(&[ObserveOption::new(attributes.clone())]);
        }

        let last = history.last().cloned().unwrap_or_default();
        prop_assert_eq!(base.observe_options(), statics.concat(&last));
    }

    /// Property: several options in one call are flattened in order.
    #[test]
    fn prop_options_flatten_in_order(first in attributes_strategy(), second in attributes_strategy()) {
        let base = BaseObservePerformer::new(Attributes::new());
        base.set_observe_options_by_option(&[
            ObserveOption::new(first.clone()),
            ObserveOption::new(second.clone()),
        ]);
        prop_assert_eq!(base.observe_options(), first.concat(&second));
    }
}
