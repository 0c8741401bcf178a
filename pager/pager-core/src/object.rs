use crate::backing::BackingStore;
use crate::pagemap::{PageFlags, PageMap, PageMapError};
use crate::requests::{AttributeRequest, LockRequest};
use pager_pages::{PageIndex, PageLayout};
use pager_transport::{
    AccessMode, ControlPort, CopyStrategy, NamePort, ObjectPort, ObjectProxy, PageError,
    PortSpace, RequestQueue,
};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

/// Construction-time parameters of a pager.
#[derive(Debug, Clone, Copy)]
pub struct PagerConfig {
    /// Page size the object is served with; `init` messages advertising a
    /// different size are rejected.
    pub page_size: u64,
    /// Initial caching attribute advertised to the kernel.
    pub may_cache: bool,
    /// Initial copy strategy advertised to the kernel.
    pub copy_strategy: CopyStrategy,
}

impl Default for PagerConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            may_cache: true,
            copy_strategy: CopyStrategy::Delay,
        }
    }
}

/// Where the object is in its lifetime.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Phase {
    /// Created but not yet bound to a kernel; also the state after a
    /// terminate, awaiting re-initialization.
    Uninit,
    /// Bound and serving traffic.
    Normal,
    /// Defunct; every request is refused and nothing is ever sent.
    Shutdown,
}

/// Everything the object mutex protects.
pub(crate) struct PagerState {
    pub(crate) phase: Phase,
    pub(crate) control: Option<ControlPort>,
    pub(crate) name: Option<NamePort>,
    pub(crate) object_port: Option<ObjectPort>,
    pub(crate) may_cache: bool,
    pub(crate) copy_strategy: CopyStrategy,
    pub(crate) pagemap: PageMap,
    pub(crate) lock_requests: Vec<Arc<LockRequest>>,
    pub(crate) attribute_requests: Vec<Arc<AttributeRequest>>,
    /// Sequence number the next message to be processed must carry.
    pub(crate) seqno_next: u64,
    /// Some handler sleeps on a sequence gap.
    pub(crate) seqno_waiters: bool,
    /// Handlers currently forbidding termination.
    pub(crate) noterm: u32,
    /// The terminate handler sleeps on `noterm` reaching zero.
    pub(crate) term_waiting: bool,
}

impl PagerState {
    pub(crate) fn control_matches(&self, control: &ControlPort) -> bool {
        self.control.as_ref() == Some(control)
    }
}

/// Strong/weak handle bookkeeping, disjoint from the state lock.
pub(crate) struct RefCounts {
    strong: u64,
    weak: u64,
    /// One drop-weak-refs invitation per lost-references transition.
    dropweak_attempted: bool,
}

pub(crate) struct PagerShared {
    pub(crate) state: Mutex<PagerState>,
    pub(crate) wakeup: Condvar,
    refs: Mutex<RefCounts>,
    pub(crate) store: Box<dyn BackingStore>,
    pub(crate) layout: PageLayout,
}

impl PagerShared {
    pub(crate) fn lock_state(&self) -> MutexGuard<'_, PagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_refs(&self) -> MutexGuard<'_, RefCounts> {
        self.refs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// One blocking wait on the object's condition.
    pub(crate) fn wait<'a>(
        &self,
        guard: MutexGuard<'a, PagerState>,
    ) -> MutexGuard<'a, PagerState> {
        self.wakeup
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Hold until it is `seqno`'s turn to run its critical section.
    pub(crate) fn wait_for_seqno<'a>(
        &self,
        mut st: MutexGuard<'a, PagerState>,
        seqno: u64,
    ) -> MutexGuard<'a, PagerState> {
        while st.seqno_next != seqno {
            st.seqno_waiters = true;
            st = self.wait(st);
        }
        st
    }

    /// Let the message after `seqno` begin. Every handler exit path runs
    /// through here, including the early rejects.
    pub(crate) fn release_seqno(&self, st: &mut PagerState, seqno: u64) {
        debug_assert_eq!(st.seqno_next, seqno);
        st.seqno_next = seqno + 1;
        if st.seqno_waiters {
            st.seqno_waiters = false;
            self.wakeup.notify_all();
        }
    }

    /// Prevent the object from being terminated.
    pub(crate) fn block_termination(&self, st: &mut PagerState) {
        st.noterm += 1;
    }

    /// Allow termination again.
    pub(crate) fn allow_termination(&self, st: &mut PagerState) {
        st.noterm -= 1;
        if st.noterm == 0 && st.term_waiting {
            self.wakeup.notify_all();
        }
    }

    /// Shared teardown for terminate, no-senders and the final handle
    /// drop: cancel outstanding acknowledgements so waiters drain, drop
    /// the kernel channels and the page map.
    pub(crate) fn free_structure(&self, st: &mut PagerState) {
        let mut wake = false;
        for lr in &st.lock_requests {
            if lr.cancel_locks() {
                wake = true;
            }
        }
        for ar in &st.attribute_requests {
            ar.cancel();
            wake = true;
        }
        if wake {
            self.wakeup.notify_all();
        }

        st.control = None;
        st.name = None;
        st.pagemap.clear();
        st.phase = Phase::Uninit;
    }

    /// Account for a newly created strong handle.
    fn adopt_strong(self: &Arc<Self>) {
        let revived = {
            let mut refs = self.lock_refs();
            refs.strong += 1;
            let revived = refs.strong == 1 && refs.weak > 0;
            if revived {
                refs.dropweak_attempted = false;
            }
            revived
        };
        if revived {
            self.store.new_refs();
        }
    }
}

/// A strong handle to one pager object.
///
/// Handles are cheap to clone; the object state itself is shared. When
/// the last strong handle goes away the object is torn down for good: the
/// kernel binding is released, the page map freed, and the backing
/// store's [`BackingStore::clear_user_data`] hook runs. Weak handles (see
/// [`WeakPager`]) keep the memory alive without keeping the object in
/// service.
pub struct Pager {
    pub(crate) shared: Arc<PagerShared>,
}

impl Pager {
    /// Create a pager serving one memory object through `store`.
    ///
    /// Returns the handle and the queue the embedder must drain — either
    /// through [`Pager::serve`] on a dedicated thread or by feeding
    /// [`Pager::handle_message`] by hand. The object starts unbound and
    /// enters service when the kernel's `init` message arrives.
    #[must_use]
    pub fn create(
        space: &PortSpace,
        config: PagerConfig,
        store: Box<dyn BackingStore>,
    ) -> (Self, RequestQueue) {
        let (port, queue) = space.object_channel();
        let layout = PageLayout::new(config.page_size);
        let shared = Arc::new(PagerShared {
            state: Mutex::new(PagerState {
                phase: Phase::Uninit,
                control: None,
                name: None,
                object_port: Some(port),
                may_cache: config.may_cache,
                copy_strategy: config.copy_strategy,
                pagemap: PageMap::new(layout),
                lock_requests: Vec::new(),
                attribute_requests: Vec::new(),
                seqno_next: 0,
                seqno_waiters: false,
                noterm: 0,
                term_waiting: false,
            }),
            wakeup: Condvar::new(),
            refs: Mutex::new(RefCounts {
                strong: 1,
                weak: 0,
                dropweak_attempted: false,
            }),
            store,
            layout,
        });
        (Self { shared }, queue)
    }

    /// The object's request endpoint. Callers mint their own send rights
    /// by cloning it. `None` once the object has shut down.
    #[must_use]
    pub fn get_port(&self) -> Option<ObjectPort> {
        self.shared.lock_state().object_port.clone()
    }

    /// The backing store this pager was created with.
    #[must_use]
    pub fn store(&self) -> &dyn BackingStore {
        &*self.shared.store
    }

    /// The page layout the object is served with.
    #[must_use]
    pub fn page_layout(&self) -> PageLayout {
        self.shared.layout
    }

    /// The currently cached attribute pair.
    #[must_use]
    pub fn attributes(&self) -> (bool, CopyStrategy) {
        let st = self.shared.lock_state();
        (st.may_cache, st.copy_strategy)
    }

    /// The latched error for `page`, [`PageError::None`] if there is
    /// none.
    ///
    /// # Errors
    /// If the page map cannot be grown to cover `page`.
    pub fn get_error(&self, page: PageIndex) -> Result<PageError, PageMapError> {
        let mut st = self.shared.lock_state();
        st.pagemap.resize(page.next())?;
        Ok(st.pagemap.get(page).error())
    }

    /// The page-map cell for `page`, for introspection and tests.
    #[must_use]
    pub fn page_flags(&self, page: PageIndex) -> PageFlags {
        self.shared.lock_state().pagemap.get(page)
    }

    /// Number of lock-request records currently outstanding.
    #[must_use]
    pub fn pending_lock_requests(&self) -> usize {
        self.shared.lock_state().lock_requests.len()
    }

    /// A read/execute-only proxy for handing the object to clients that
    /// must not be able to map it writable. `None` once shut down.
    #[must_use]
    pub fn create_ro_port(&self) -> Option<ObjectProxy> {
        let st = self.shared.lock_state();
        st.object_port
            .clone()
            .map(|port| ObjectProxy::new(port, AccessMode::READ_EXECUTE))
    }

    /// Demote to a weak handle.
    #[must_use]
    pub fn downgrade(&self) -> WeakPager {
        self.shared.lock_refs().weak += 1;
        WeakPager {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Clone for Pager {
    fn clone(&self) -> Self {
        self.shared.adopt_strong();
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for Pager {
    fn drop(&mut self) {
        let attempt_dropweak = {
            let mut refs = self.shared.lock_refs();
            refs.strong -= 1;
            if refs.strong > 0 {
                return;
            }
            let attempt = refs.weak > 0 && !refs.dropweak_attempted;
            if attempt {
                refs.dropweak_attempted = true;
            }
            attempt
        };

        // Last strong handle: release the binding and go dark.
        {
            let mut st = self.shared.lock_state();
            if st.phase != Phase::Uninit {
                self.shared.free_structure(&mut st);
            }
            st.phase = Phase::Shutdown;
            st.object_port = None;
        }
        self.shared.store.clear_user_data();
        if attempt_dropweak {
            self.shared.store.drop_weak_refs();
        }
    }
}

/// A weak handle: keeps the pager's memory alive without keeping the
/// object in service.
pub struct WeakPager {
    shared: Arc<PagerShared>,
}

impl WeakPager {
    /// Recover a strong handle. Reviving an object whose strong count had
    /// reached zero fires the store's [`BackingStore::new_refs`] hook,
    /// but does not re-bind it to a kernel; a revived object is defunct
    /// until recreated.
    #[must_use]
    pub fn upgrade(&self) -> Pager {
        self.shared.adopt_strong();
        Pager {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Clone for WeakPager {
    fn clone(&self) -> Self {
        self.shared.lock_refs().weak += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for WeakPager {
    fn drop(&mut self) {
        self.shared.lock_refs().weak -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pager_pages::PageRange;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct HookCounter {
        cleared: AtomicU32,
        dropweaks: AtomicU32,
        revivals: AtomicU32,
    }

    struct HookStore(Arc<HookCounter>);

    impl BackingStore for HookStore {
        fn read(&self, _pager: &Pager, _range: PageRange) {}
        fn write(&self, _pager: &Pager, _range: PageRange, _data: Vec<u8>) {}
        fn unlock(&self, _pager: &Pager, _range: PageRange) {}
        fn extent(&self) -> PageRange {
            PageRange::from_start_len(PageIndex::new(0), 0)
        }
        fn clear_user_data(&self) {
            self.0.cleared.fetch_add(1, Ordering::SeqCst);
        }
        fn drop_weak_refs(&self) {
            self.0.dropweaks.fetch_add(1, Ordering::SeqCst);
        }
        fn new_refs(&self) {
            self.0.revivals.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn hooked_pager() -> (Pager, RequestQueue, Arc<HookCounter>) {
        let counter = Arc::new(HookCounter::default());
        let space = PortSpace::new();
        let (pager, queue) = Pager::create(
            &space,
            PagerConfig::default(),
            Box::new(HookStore(Arc::clone(&counter))),
        );
        (pager, queue, counter)
    }

    #[test]
    fn cloning_does_not_fire_hooks() {
        let (pager, _queue, counter) = hooked_pager();
        let other = pager.clone();
        drop(other);
        assert_eq!(counter.cleared.load(Ordering::SeqCst), 0);
        drop(pager);
        assert_eq!(counter.cleared.load(Ordering::SeqCst), 1);
        assert_eq!(counter.dropweaks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropweak_fires_once_while_weak_handles_exist() {
        let (pager, _queue, counter) = hooked_pager();
        let weak = pager.downgrade();
        drop(pager);
        assert_eq!(counter.cleared.load(Ordering::SeqCst), 1);
        assert_eq!(counter.dropweaks.load(Ordering::SeqCst), 1);

        // Reviving resets the single-attempt guard.
        let revived = weak.upgrade();
        assert_eq!(counter.revivals.load(Ordering::SeqCst), 1);
        drop(revived);
        assert_eq!(counter.dropweaks.load(Ordering::SeqCst), 2);
        drop(weak);
    }

    #[test]
    fn revived_objects_stay_out_of_service() {
        let (pager, _queue, _counter) = hooked_pager();
        let weak = pager.downgrade();
        drop(pager);
        let revived = weak.upgrade();
        assert!(revived.get_port().is_none());
        assert!(revived.create_ro_port().is_none());
    }
}
