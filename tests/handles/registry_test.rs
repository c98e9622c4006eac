/*!
 * Register / Unregister Tests
 */

use crate::common::{fixture, TestOwner};
use ai_os_handles::core::guard::{GuardState, ReleasePath};
use ai_os_handles::core::types::RawHandle;
use ai_os_handles::native::NativeCloser;
use ai_os_handles::registry::{HandleOwner, Unregistered};
use pretty_assertions::assert_eq;

#[test]
fn test_unregister_then_explicit_close_closes_once() {
    let (cleaner, closer, registry) = fixture();
    let owner = TestOwner::new(11);

    assert_eq!(registry.register(Some(&owner)), Ok(true));
    let outcome = registry.unregister(Some(&owner));
    assert_eq!(outcome, Unregistered::Cancelled);
    assert!(outcome.must_close());
    closer.close(owner.raw_handle()).unwrap();

    drop(owner);
    assert!(cleaner.flush());
    assert_eq!(closer.handles(), vec![RawHandle::new(11)]);
}

#[test]
fn test_dropped_owner_closed_once_on_cleaner_thread() {
    let (cleaner, closer, registry) = fixture();
    let owner = TestOwner::new(23);

    registry.register(Some(&owner)).unwrap();
    drop(owner);
    assert!(cleaner.flush());

    assert_eq!(closer.handles(), vec![RawHandle::new(23)]);
    assert_eq!(closer.threads(), vec![Some("handle-cleaner".to_string())]);
    assert_eq!(cleaner.pending(), 0);
}

#[test]
fn test_sentinel_never_registered() {
    let (cleaner, closer, registry) = fixture();
    let owner = TestOwner::new(-1);

    assert_eq!(registry.register(Some(&owner)), Ok(false));
    assert_eq!(registry.unregister(Some(&owner)), Unregistered::NotRegistered);
    assert_eq!(registry.close_owner(&owner), Ok(false));
    drop(owner);

    assert!(cleaner.flush());
    assert_eq!(cleaner.stats().scheduled, 0);
    assert_eq!(closer.count(), 0);
}

#[test]
fn test_unregister_twice_closes_at_most_once() {
    let (cleaner, closer, registry) = fixture();
    let owner = TestOwner::new(31);

    registry.register(Some(&owner)).unwrap();
    assert_eq!(registry.unregister(Some(&owner)), Unregistered::Cancelled);
    assert_eq!(registry.unregister(Some(&owner)), Unregistered::AlreadyReleased);
    assert!(!Unregistered::AlreadyReleased.must_close());

    drop(owner);
    assert!(cleaner.flush());
    assert_eq!(closer.count(), 0);
}

#[test]
fn test_unregister_after_last_chance_is_noop() {
    let (cleaner, closer, registry) = fixture();
    let owner = TestOwner::new(5);

    registry.register(Some(&owner)).unwrap();
    let guard = owner.cleanup_slot().guard().unwrap();
    assert_eq!(guard.last_chance_cleanup(), Ok(true));

    assert_eq!(registry.unregister(Some(&owner)), Unregistered::AlreadyReleased);
    assert_eq!(registry.close_owner(&owner), Ok(false));

    drop(owner);
    assert!(cleaner.flush());
    assert_eq!(closer.count(), 1);
}

#[test]
fn test_close_owner_then_drop() {
    let (cleaner, closer, registry) = fixture();
    let owner = TestOwner::new(64);

    registry.register(Some(&owner)).unwrap();
    assert_eq!(registry.close_owner(&owner), Ok(true));
    assert_eq!(registry.close_owner(&owner), Ok(false));
    drop(owner);

    assert!(cleaner.flush());
    assert_eq!(closer.count(), 1);
    assert_ne!(closer.threads()[0].as_deref(), Some("handle-cleaner"));
}

/// Handle 42 is unregistered and never closed by the tracker; handle 7 is
/// dropped and closed exactly once by it.
#[test]
fn test_explicit_and_collected_owners() {
    let (cleaner, closer, registry) = fixture();

    let first = TestOwner::new(42);
    assert_eq!(registry.register(Some(&first)), Ok(true));
    assert_eq!(registry.unregister(Some(&first)), Unregistered::Cancelled);

    let guard = first.cleanup_slot().guard().unwrap();
    assert_eq!(guard.state(), GuardState::Released);
    assert_eq!(guard.released_by(), Some(ReleasePath::Explicit));
    drop(first);
    assert!(cleaner.flush());
    assert_eq!(closer.count(), 0);

    let second = TestOwner::new(7);
    assert_eq!(registry.register(Some(&second)), Ok(true));
    drop(second);
    assert!(cleaner.flush());

    assert_eq!(closer.handles(), vec![RawHandle::new(7)]);
    assert_eq!(closer.threads(), vec![Some("handle-cleaner".to_string())]);
}
