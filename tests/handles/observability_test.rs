/*!
 * Guard Event Tests
 */

use crate::common::{fixture, TestOwner};
use ai_os_handles::core::errors::NativeError;
use ai_os_handles::core::guard::ReleasePath;
use ai_os_handles::core::types::RawHandle;
use ai_os_handles::monitoring::{Category, Collector, EventFilter, Payload, Severity};
use ai_os_handles::native::NativeCloser;
use ai_os_handles::registry::HandleOwnerRegistry;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_release_paths_are_reported() {
    let (cleaner, _closer, registry) = fixture();
    let collector = Arc::new(Collector::new());
    let registry = registry.with_collector(collector.clone());
    let events = collector.subscribe();

    let explicit = TestOwner::new(1);
    let dropped = TestOwner::new(2);
    registry.register(Some(&explicit)).unwrap();
    registry.register(Some(&dropped)).unwrap();

    assert_eq!(registry.close_owner(&explicit), Ok(true));
    drop(dropped);
    assert!(cleaner.flush());

    let paths: Vec<_> = events
        .try_iter()
        .filter_map(|e| match e.payload {
            Payload::HandleReleased { path, .. } => Some((e.handle, path)),
            _ => None,
        })
        .collect();
    assert_eq!(
        paths,
        vec![
            (Some(RawHandle::new(1)), ReleasePath::Explicit),
            (Some(RawHandle::new(2)), ReleasePath::LastChance),
        ]
    );

    let metrics = collector.metrics();
    assert_eq!(metrics.registered, 2);
    assert_eq!(metrics.released(), 2);
    assert_eq!(metrics.outstanding(), 0);
}

#[test]
fn test_failed_last_chance_close_is_reported_not_retried() {
    let (cleaner, _closer, _registry) = fixture();
    let collector = Arc::new(Collector::new());
    let failing: Arc<dyn NativeCloser> = Arc::new(|h: RawHandle| -> Result<(), NativeError> {
        Err(NativeError::new(h, 9, "Bad file descriptor"))
    });
    let registry = HandleOwnerRegistry::with_cleaner(cleaner.clone(), failing)
        .with_collector(collector.clone());
    let errors = collector.subscribe_filtered(EventFilter::new().severity(Severity::Error));

    let owner = TestOwner::new(3);
    registry.register(Some(&owner)).unwrap();
    drop(owner);
    assert!(cleaner.flush());

    let event = errors.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(event.category, Category::Handle);
    assert!(matches!(
        event.payload,
        Payload::CloseFailed { path: ReleasePath::LastChance, code: 9, .. }
    ));
    assert!(errors.try_recv().is_err());
    assert_eq!(collector.metrics().close_failures, 1);
    assert!(cleaner.is_running());
}
