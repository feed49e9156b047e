use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

/// Read access to the store's entries, recovering from a poisoned lock.
///
/// Entries and the invalidation epoch are plain data, so whatever a panicking
/// writer left behind is still a consistent map.
pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|poisoned| {
        report_poisoned(source, op, "read");
        poisoned.into_inner()
    })
}

/// Write access to the store's entries, recovering from a poisoned lock.
pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|poisoned| {
        report_poisoned(source, op, "write");
        poisoned.into_inner()
    })
}

fn report_poisoned(source: &'static str, op: &'static str, access: &'static str) {
    warn!(
        cache = "response",
        store = source,
        op,
        access,
        "Response store lock was poisoned by a panicking caller; continuing with its entries"
    );
}
