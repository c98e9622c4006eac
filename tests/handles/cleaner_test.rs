/*!
 * Cleaner Thread Tests
 */

use crate::common::{CountingCloser, TestOwner};
use ai_os_handles::core::config::{CleanerConfig, FailurePolicy};
use ai_os_handles::core::types::RawHandle;
use ai_os_handles::reachability::Cleaner;
use ai_os_handles::registry::HandleOwnerRegistry;
use serial_test::serial;
use std::sync::Arc;

#[test]
fn test_configured_thread_name() {
    let config = CleanerConfig::default().with_thread_name("fd-reaper");
    let cleaner = Arc::new(Cleaner::with_config(config).unwrap());
    let closer = CountingCloser::new();
    let registry = HandleOwnerRegistry::with_cleaner(cleaner.clone(), closer.clone());

    let owner = TestOwner::new(8);
    registry.register(Some(&owner)).unwrap();
    drop(owner);
    assert!(cleaner.flush());

    assert_eq!(closer.threads(), vec![Some("fd-reaper".to_string())]);
}

#[test]
#[serial]
fn test_global_cleaner_is_shared() {
    let a = Cleaner::global().unwrap();
    let b = Cleaner::global().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert!(a.is_running());

    let closer = CountingCloser::new();
    let registry = HandleOwnerRegistry::global(closer.clone()).unwrap();
    let owner = TestOwner::new(1234);
    registry.register(Some(&owner)).unwrap();
    drop(owner);

    assert!(a.flush());
    assert_eq!(closer.handles(), vec![RawHandle::new(1234)]);
}

#[test]
fn test_shutdown_leaves_pending_registrations() {
    let cleaner = Arc::new(Cleaner::new().unwrap());
    let closer = CountingCloser::new();
    let registry = HandleOwnerRegistry::with_cleaner(cleaner.clone(), closer.clone());

    let owner = TestOwner::new(55);
    registry.register(Some(&owner)).unwrap();
    cleaner.shutdown().unwrap();
    assert!(!cleaner.is_running());

    drop(owner);
    assert!(!cleaner.flush());
    assert_eq!(cleaner.pending(), 1);
    assert_eq!(closer.count(), 0);

    let late = TestOwner::new(56);
    assert!(registry.register(Some(&late)).is_err());
}

#[test]
#[serial]
fn test_config_from_env() {
    std::env::set_var("HANDLE_CLEANER_THREAD", "env-cleaner");
    std::env::set_var("HANDLE_CLEANER_FAILURE_POLICY", "abort");
    let config = CleanerConfig::from_env();
    std::env::remove_var("HANDLE_CLEANER_THREAD");
    std::env::remove_var("HANDLE_CLEANER_FAILURE_POLICY");

    let config = config.unwrap();
    assert_eq!(config.thread_name, "env-cleaner");
    assert_eq!(config.failure_policy, FailurePolicy::Abort);
}

#[test]
#[serial]
fn test_config_from_env_rejects_bad_policy() {
    std::env::set_var("HANDLE_CLEANER_FAILURE_POLICY", "explode");
    let config = CleanerConfig::from_env();
    std::env::remove_var("HANDLE_CLEANER_FAILURE_POLICY");

    assert!(config.is_err());
}
