/*!
 * Explicit Close vs Last-Chance Race Tests
 */

use crate::common::fixture;
use ai_os_handles::core::guard::{FinalizationGuard, GuardOptions, GuardState};
use ai_os_handles::core::types::RawHandle;
use ai_os_handles::reachability::ReachabilityTracker;
use proptest::prelude::*;
use rand::Rng;
use std::sync::{Arc, Barrier};
use std::thread;

fn spin(iterations: u32) {
    for _ in 0..iterations {
        std::hint::spin_loop();
    }
}

/// Explicit close on one thread, direct last-chance call on another
fn race_direct(explicit_delay: u32, last_chance_delay: u32) -> (usize, GuardState) {
    let (cleaner, closer, _registry) = fixture();
    let tracker: Arc<dyn ReachabilityTracker> = cleaner.clone();
    let (guard, _token) =
        FinalizationGuard::create(RawHandle::new(99), closer.clone(), &tracker, GuardOptions::default())
            .unwrap();

    let barrier = Arc::new(Barrier::new(2));

    let explicit = {
        let guard = guard.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            spin(explicit_delay);
            guard.close_explicitly().unwrap()
        })
    };
    let last_chance = {
        let guard = guard.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            spin(last_chance_delay);
            guard.last_chance_cleanup().unwrap()
        })
    };

    let a = explicit.join().unwrap();
    let b = last_chance.join().unwrap();
    assert!(a ^ b, "exactly one path must win");

    (closer.count(), guard.state())
}

/// Explicit close racing the cleaner thread after the token is dropped
fn race_cleaner(explicit_delay: u32) -> usize {
    let (cleaner, closer, _registry) = fixture();
    let tracker: Arc<dyn ReachabilityTracker> = cleaner.clone();
    let (guard, token) =
        FinalizationGuard::create(RawHandle::new(77), closer.clone(), &tracker, GuardOptions::default())
            .unwrap();

    let barrier = Arc::new(Barrier::new(2));
    let explicit = {
        let guard = guard.clone();
        let barrier = barrier.clone();
        thread::spawn(move || {
            barrier.wait();
            spin(explicit_delay);
            guard.close_explicitly().unwrap();
        })
    };

    barrier.wait();
    drop(token);
    explicit.join().unwrap();
    assert!(cleaner.flush());
    assert_eq!(guard.state(), GuardState::Released);

    closer.count()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_direct_race_closes_exactly_once(a in 0u32..2_000, b in 0u32..2_000) {
        let (closes, state) = race_direct(a, b);
        prop_assert_eq!(closes, 1);
        prop_assert_eq!(state, GuardState::Released);
    }

    #[test]
    fn prop_cleaner_race_closes_exactly_once(delay in 0u32..2_000) {
        prop_assert_eq!(race_cleaner(delay), 1);
    }
}

#[test]
fn test_many_guards_one_cleaner() {
    let (cleaner, closer, _registry) = fixture();
    let tracker: Arc<dyn ReachabilityTracker> = cleaner.clone();
    let mut rng = rand::thread_rng();

    let mut explicit = 0;
    let mut handles = Vec::new();
    for fd in 0..200i64 {
        let (guard, token) = FinalizationGuard::create(
            RawHandle::new(fd),
            closer.clone(),
            &tracker,
            GuardOptions::default(),
        )
        .unwrap();

        if rng.gen_bool(0.5) {
            assert!(guard.close_explicitly().unwrap());
            explicit += 1;
        }
        handles.push(thread::spawn(move || drop(token)));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(cleaner.flush());

    let mut closed = closer.handles();
    closed.sort_by_key(|h| h.get());
    closed.dedup();
    assert_eq!(closed.len(), 200);
    assert_eq!(closer.count(), 200);
    assert_eq!(cleaner.stats().executed as usize, 200 - explicit);
}

