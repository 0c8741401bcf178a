use pager_pages::PageRange;
use pager_transport::CopyStrategy;
use std::sync::atomic::{AtomicU32, Ordering};

// Both record types are only ever mutated under the owning pager's state
// lock; the atomics exist so the records can sit behind `Arc` and be
// snapshotted by the page-out handler while other threads join or leave.

/// One outstanding kernel lock request, keyed by its page range.
///
/// A waiting thread is released once both `locks_pending` and
/// `pending_writes` are zero; the last thread to leave unlinks the record.
pub(crate) struct LockRequest {
    pub(crate) range: PageRange,
    locks_pending: AtomicU32,
    pending_writes: AtomicU32,
    threads_waiting: AtomicU32,
}

impl LockRequest {
    pub(crate) fn new(range: PageRange) -> Self {
        Self {
            range,
            locks_pending: AtomicU32::new(0),
            pending_writes: AtomicU32::new(0),
            threads_waiting: AtomicU32::new(0),
        }
    }

    /// Another thread starts a synchronous wait on this record.
    pub(crate) fn join(&self) {
        self.locks_pending.fetch_add(1, Ordering::Relaxed);
        self.threads_waiting.fetch_add(1, Ordering::Relaxed);
    }

    /// True once every acknowledgement this record waits for has arrived.
    pub(crate) fn is_satisfied(&self) -> bool {
        self.locks_pending.load(Ordering::Relaxed) == 0
            && self.pending_writes.load(Ordering::Relaxed) == 0
    }

    /// A lock completion arrived; returns true if waiters should wake.
    pub(crate) fn complete_lock(&self) -> bool {
        let pending = self.locks_pending.load(Ordering::Relaxed);
        if pending > 0 {
            self.locks_pending.store(pending - 1, Ordering::Relaxed);
        }
        self.is_satisfied()
    }

    /// A page-out overlapping this record entered its write phase.
    pub(crate) fn begin_write(&self) {
        self.pending_writes.fetch_add(1, Ordering::Relaxed);
    }

    /// The overlapping page-out finished; returns true if waiters should
    /// wake.
    pub(crate) fn finish_write(&self) -> bool {
        self.pending_writes.fetch_sub(1, Ordering::Relaxed);
        self.is_satisfied()
    }

    /// Object teardown: nothing further will be acknowledged.
    pub(crate) fn cancel_locks(&self) -> bool {
        self.locks_pending.store(0, Ordering::Relaxed);
        self.pending_writes.load(Ordering::Relaxed) == 0
    }

    /// One waiter leaves; true if it was the last and the record should be
    /// unlinked.
    pub(crate) fn leave(&self) -> bool {
        self.threads_waiting.fetch_sub(1, Ordering::Relaxed) == 1
    }
}

/// One outstanding attribute change, keyed by the requested pair.
pub(crate) struct AttributeRequest {
    pub(crate) may_cache: bool,
    pub(crate) copy_strategy: CopyStrategy,
    attrs_pending: AtomicU32,
    threads_waiting: AtomicU32,
}

impl AttributeRequest {
    pub(crate) fn new(may_cache: bool, copy_strategy: CopyStrategy) -> Self {
        Self {
            may_cache,
            copy_strategy,
            attrs_pending: AtomicU32::new(0),
            threads_waiting: AtomicU32::new(0),
        }
    }

    pub(crate) fn matches(&self, may_cache: bool, copy_strategy: CopyStrategy) -> bool {
        self.may_cache == may_cache && self.copy_strategy == copy_strategy
    }

    pub(crate) fn join(&self) {
        self.attrs_pending.fetch_add(1, Ordering::Relaxed);
        self.threads_waiting.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn is_satisfied(&self) -> bool {
        self.attrs_pending.load(Ordering::Relaxed) == 0
    }

    /// A change completion arrived; returns true if waiters should wake.
    pub(crate) fn complete_change(&self) -> bool {
        let pending = self.attrs_pending.load(Ordering::Relaxed);
        if pending > 0 {
            self.attrs_pending.store(pending - 1, Ordering::Relaxed);
            pending == 1
        } else {
            false
        }
    }

    /// Object teardown.
    pub(crate) fn cancel(&self) {
        self.attrs_pending.store(0, Ordering::Relaxed);
    }

    pub(crate) fn leave(&self) -> bool {
        self.threads_waiting.fetch_sub(1, Ordering::Relaxed) == 1
    }
}
