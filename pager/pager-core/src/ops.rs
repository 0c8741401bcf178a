//! The user-facing operations surface: sync/flush/return, page offers,
//! data supply, error reporting and shutdown.

use crate::lock_object::lock_object;
use crate::object::{Pager, Phase};
use crate::pagemap::PageMapError;
use pager_pages::{PageIndex, PageRange, UnalignedAddress};
use pager_transport::{AccessMode, ControlMessage, PageError, ReturnKind};

impl Pager {
    /// Have the kernel write back all dirty pages of the object; with
    /// `wait`, block until the write-backs have landed in the store.
    pub fn sync(&self, wait: bool) {
        let extent = self.shared.store.extent();
        self.sync_some(extent, wait);
    }

    /// Like [`Pager::sync`], restricted to `range`.
    pub fn sync_some(&self, range: PageRange, wait: bool) {
        let st = self.shared.lock_state();
        drop(lock_object(
            &self.shared,
            st,
            range,
            ReturnKind::All,
            false,
            None,
            wait,
        ));
    }

    /// Drop the kernel's cached copies of the whole object, discarding
    /// modifications; with `wait`, block until the kernel confirms.
    pub fn flush(&self, wait: bool) {
        let extent = self.shared.store.extent();
        self.flush_some(extent, wait);
    }

    /// Like [`Pager::flush`], restricted to `range`.
    pub fn flush_some(&self, range: PageRange, wait: bool) {
        let st = self.shared.lock_state();
        drop(lock_object(
            &self.shared,
            st,
            range,
            ReturnKind::None,
            true,
            None,
            wait,
        ));
    }

    /// Write back all dirty pages *and* drop the kernel's cached copies;
    /// with `wait`, block until both have happened.
    pub fn return_all(&self, wait: bool) {
        let extent = self.shared.store.extent();
        self.return_some(extent, wait);
    }

    /// Like [`Pager::return_all`], restricted to `range`.
    pub fn return_some(&self, range: PageRange, wait: bool) {
        let st = self.shared.lock_state();
        drop(lock_object(
            &self.shared,
            st,
            range,
            ReturnKind::All,
            true,
            None,
            wait,
        ));
    }

    /// Proactively hand `data` (exactly one page) for `page` to the
    /// kernel without waiting for a page-in.
    ///
    /// If the kernel already caches the page the offer would be ignored,
    /// so any cached copy is flushed out first. `precious` pages come
    /// back through page-out instead of being silently dropped;
    /// `writelock` supplies the page read-only, so the first write
    /// triggers the store's unlock path.
    ///
    /// # Errors
    /// If the page map cannot be grown to cover `page`; nothing is
    /// offered in that case.
    pub fn offer_page(
        &self,
        page: PageIndex,
        precious: bool,
        writelock: bool,
        data: Vec<u8>,
    ) -> Result<(), PageMapError> {
        let shared = &self.shared;
        debug_assert_eq!(data.len() as u64, shared.layout.page_size());

        let mut st = shared.lock_state();
        st.pagemap.resize(page.next())?;

        while st.pagemap.get(page).incore() {
            drop(st);
            self.flush_some(PageRange::from_start_len(page, 1), true);
            st = shared.lock_state();
        }

        let cell = st.pagemap.get(page);
        st.pagemap.set(page, cell.with_incore(true));

        if st.phase == Phase::Normal {
            if let Some(control) = &st.control {
                control.send(ControlMessage::DataSupply {
                    offset: shared.layout.byte_offset(page),
                    data,
                    lock: if writelock {
                        AccessMode::WRITE
                    } else {
                        AccessMode::NONE
                    },
                    precious,
                    reply: None,
                });
            }
        }
        Ok(())
    }

    /// Provide page contents to the kernel, normally from the store's
    /// `read`. Any error latched for the supplied pages is cleared: the
    /// store vouches for the data again.
    ///
    /// # Errors
    /// If `data` is not a whole number of pages.
    pub fn data_supply(
        &self,
        start: PageIndex,
        data: Vec<u8>,
        readonly: bool,
        precious: bool,
    ) -> Result<(), UnalignedAddress> {
        let shared = &self.shared;
        if !shared.layout.is_aligned(data.len() as u64) {
            return Err(UnalignedAddress {
                value: data.len() as u64,
                page_size: shared.layout.page_size(),
            });
        }
        let count = data.len() as u64 / shared.layout.page_size();
        let range = PageRange::from_start_len(start, count);

        let mut st = shared.lock_state();
        if st.phase == Phase::Normal {
            if let Some(control) = &st.control {
                control.send(ControlMessage::DataSupply {
                    offset: shared.layout.byte_offset(start),
                    data,
                    lock: if readonly {
                        AccessMode::WRITE
                    } else {
                        AccessMode::NONE
                    },
                    precious,
                    reply: None,
                });
            }
        }

        let _ = st.pagemap.resize(range.end());
        st.pagemap.mark_error(range, PageError::None);
        st.pagemap.clear_invalid(range);
        st.pagemap.mark_init(range);
        Ok(())
    }

    /// Tell the kernel the pages of `range` have no backing-store
    /// contents and should be served as zero fill.
    pub fn data_unavailable(&self, range: PageRange) {
        let shared = &self.shared;
        let st = shared.lock_state();
        if st.phase == Phase::Normal {
            if let Some(control) = &st.control {
                control.send(ControlMessage::DataUnavailable {
                    offset: shared.layout.byte_offset(range.start()),
                    length: shared.layout.byte_len(range),
                });
            }
        }
    }

    /// Report that reading `range` from the store failed; the fault that
    /// triggered the read fails with `error`, and the error stays latched
    /// for later faults.
    pub fn data_read_error(&self, range: PageRange, error: PageError) {
        let shared = &self.shared;
        let mut st = shared.lock_state();
        if st.phase == Phase::Normal {
            if let Some(control) = &st.control {
                control.send(ControlMessage::DataError {
                    offset: shared.layout.byte_offset(range.start()),
                    length: shared.layout.byte_len(range),
                    error,
                });
            }
        }
        let _ = st.pagemap.resize(range.end());
        st.pagemap.mark_error(range, error);
    }

    /// Report that writing `range` to the store failed. On top of the
    /// latched error the pages are marked invalid: the store's contents
    /// are now wrong, and any future page-in fails until a successful
    /// [`Pager::data_supply`] replaces them.
    pub fn data_write_error(&self, range: PageRange, error: PageError) {
        let shared = &self.shared;
        let mut st = shared.lock_state();
        if st.phase == Phase::Normal {
            if let Some(control) = &st.control {
                control.send(ControlMessage::DataError {
                    offset: shared.layout.byte_offset(range.start()),
                    length: shared.layout.byte_len(range),
                    error,
                });
            }
        }
        let _ = st.pagemap.resize(range.end());
        st.pagemap.mark_error(range, error);
        st.pagemap.mark_invalid(range);
    }

    /// Grant the write access a `DataUnlock` request asked for.
    pub fn data_unlock(&self, range: PageRange) {
        let st = self.shared.lock_state();
        drop(lock_object(
            &self.shared,
            st,
            range,
            ReturnKind::None,
            false,
            Some(AccessMode::NONE),
            false,
        ));
    }

    /// Refuse the write access a `DataUnlock` request asked for: flush
    /// the range and stage `error` for the write fault that will follow.
    pub fn data_unlock_error(&self, range: PageRange, error: PageError) {
        let shared = &self.shared;
        let mut st = shared.lock_state();
        st = lock_object(
            shared,
            st,
            range,
            ReturnKind::None,
            true,
            Some(AccessMode::WRITE),
            true,
        );
        let _ = st.pagemap.resize(range.end());
        st.pagemap.mark_next_request_error(range, error);
    }

    /// Take the object out of service for good.
    ///
    /// Dirty pages are written back and the kernel's cache flushed; then,
    /// once no handler blocks termination anymore, the object enters its
    /// final state, the port right is destroyed and nothing is ever sent
    /// again.
    pub fn shutdown(&self) {
        self.sync(true);
        self.flush(true);

        let shared = &self.shared;
        let mut st = shared.lock_state();
        while st.noterm > 0 {
            st.term_waiting = true;
            st = shared.wait(st);
        }
        st.term_waiting = false;
        st.phase = Phase::Shutdown;
        st.object_port = None;
        st.control = None;
        st.name = None;
    }
}
