//! Property-based invariant tests for stores, paths and shared handles.
//!
//! 1. A store reduces actions in the order they were sent.
//! 2. Actions fed back by effects are processed after the action that produced them.
//! 3. Writing through a composed key path changes exactly that field.
//! 4. A write through any projected handle is seen by every other handle.
//! 5. Observers of a sub-path fire once per distinct change.

use proptest::prelude::*;
use statebox::runtime::Runtime;
use statebox::{key_path, Effect, Shared, Store};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug, Default, PartialEq)]
struct Inner {
    value: i64,
    label: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Outer {
    inner: Inner,
    total: i64,
}

fn recorder() -> Store<Vec<i64>, i64> {
    Store::builder(Vec::new(), |log: &mut Vec<i64>, value: i64| {
        log.push(value);
        Effect::none()
    })
    .runtime(Runtime::new())
    .build()
}

// ═════════════════════════════════════════════════════════════════════════
// 1. Dispatch order
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn actions_reduce_in_send_order(values in proptest::collection::vec(any::<i64>(), 0..64)) {
        let store = recorder();
        for value in &values {
            store.send(*value).wait();
        }
        prop_assert_eq!(store.state(), values);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Feedback follows its cause
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn fed_back_actions_follow_their_cause(start in 0u8..32) {
        let store = Store::builder(Vec::new(), |log: &mut Vec<u8>, n: u8| {
            log.push(n);
            if n == 0 {
                Effect::none()
            } else {
                Effect::send(n - 1)
            }
        })
        .runtime(Runtime::new())
        .build();

        store.send(start).wait();
        let expected: Vec<u8> = (0..=start).rev().collect();
        prop_assert_eq!(store.state(), expected);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Composed key paths
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn composed_path_writes_one_field(
        value in any::<i64>(),
        label in "[a-z]{0,8}",
        total in any::<i64>(),
    ) {
        let path = key_path!(Outer => inner).append(&key_path!(Inner => value));
        let mut outer = Outer {
            inner: Inner { value: 0, label: label.clone() },
            total,
        };
        path.set(&mut outer, value);
        prop_assert_eq!(path.get(&outer), value);
        prop_assert_eq!(outer.inner.label, label);
        prop_assert_eq!(outer.total, total);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Shared round trip
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn projected_writes_reach_every_handle(
        writes in proptest::collection::vec(any::<i64>(), 1..16),
    ) {
        let root = Shared::new(Outer::default());
        let value = root
            .project(key_path!(Outer => inner))
            .project(key_path!(Inner => value));
        let reader = root.reader().project(key_path!(Outer => inner.value));

        for write in &writes {
            value.set(*write);
            prop_assert_eq!(reader.get(), *write);
            prop_assert_eq!(root.get().inner.value, *write);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 5. Observation dedup
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn observers_fire_once_per_change(values in proptest::collection::vec(0i64..4, 0..32)) {
        let store = Store::builder(Outer::default(), |state: &mut Outer, value: i64| {
            state.inner.value = value;
            state.total += 1;
            Effect::none()
        })
        .runtime(Runtime::new())
        .build();

        let fired = Arc::new(AtomicUsize::new(0));
        let _observer = store.observe(key_path!(Outer => inner.value), {
            let fired = Arc::clone(&fired);
            move |_: &i64| {
                fired.fetch_add(1, Ordering::SeqCst);
            }
        });

        let mut last = 0;
        let mut changes = 0;
        for value in &values {
            store.send(*value).wait();
            if *value != last {
                changes += 1;
                last = *value;
            }
        }
        prop_assert_eq!(fired.load(Ordering::SeqCst), changes);
    }
}
