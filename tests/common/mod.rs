/*!
 * Shared test doubles
 */

#![allow(dead_code)]

use ai_os_handles::core::errors::NativeError;
use ai_os_handles::core::types::RawHandle;
use ai_os_handles::native::NativeCloser;
use ai_os_handles::reachability::Cleaner;
use ai_os_handles::registry::{CleanupSlot, HandleOwner, HandleOwnerRegistry};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

/// Records every close with the name of the thread that performed it
#[derive(Default)]
pub struct CountingCloser {
    calls: Mutex<Vec<(RawHandle, Option<String>)>>,
}

impl CountingCloser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn handles(&self) -> Vec<RawHandle> {
        self.calls.lock().iter().map(|(h, _)| *h).collect()
    }

    pub fn threads(&self) -> Vec<Option<String>> {
        self.calls.lock().iter().map(|(_, t)| t.clone()).collect()
    }
}

impl NativeCloser for CountingCloser {
    fn close(&self, handle: RawHandle) -> Result<(), NativeError> {
        let thread = thread::current().name().map(String::from);
        self.calls.lock().push((handle, thread));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "counting"
    }
}

/// Minimal owner of one raw handle
pub struct TestOwner {
    handle: RawHandle,
    slot: CleanupSlot,
}

impl TestOwner {
    pub fn new(handle: i64) -> Self {
        Self {
            handle: RawHandle::new(handle),
            slot: CleanupSlot::new(),
        }
    }
}

impl HandleOwner for TestOwner {
    fn raw_handle(&self) -> RawHandle {
        self.handle
    }

    fn cleanup_slot(&self) -> &CleanupSlot {
        &self.slot
    }
}

/// Private cleaner, counting closer and a registry wired to both
pub fn fixture() -> (Arc<Cleaner>, Arc<CountingCloser>, HandleOwnerRegistry) {
    let cleaner = Arc::new(Cleaner::new().expect("cleaner thread"));
    let closer = CountingCloser::new();
    let registry = HandleOwnerRegistry::with_cleaner(cleaner.clone(), closer.clone());
    (cleaner, closer, registry)
}
