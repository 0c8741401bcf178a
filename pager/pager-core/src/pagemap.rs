use bitfield_struct::bitfield;
use pager_pages::{PageIndex, PageLayout, PageRange};
use pager_transport::PageError;

/// Per-page bookkeeping word.
///
/// One 16-bit cell per page of the object, packing the paging state bits
/// together with two latched 2-bit error codes:
///
/// - `error` is returned to the kernel on the next page-in touching the
///   page (and is what [`crate::Pager::get_error`] reports),
/// - `next_error` is delivered only by a page-in that requests write
///   access, and is cleared by that delivery.
///
/// The split exists because the protocol permits one error delivery per
/// page, and that delivery must be paired with the request that asked for
/// write access.
#[bitfield(u16)]
#[derive(PartialEq, Eq)]
pub struct PageFlags {
    /// Staged error for the next write-access fault.
    #[bits(2, default = PageError::None)]
    pub next_error: PageError,
    /// Latched error to report on any future page-in.
    #[bits(2, default = PageError::None)]
    pub error: PageError,
    /// On-backing-store contents are known bad.
    pub invalid: bool,
    /// A page-in is waiting for a conflicting page-out to finish.
    pub pagein_wait: bool,
    /// A page-out is in flight for this page.
    pub paging_out: bool,
    /// The kernel may hold a cached copy.
    pub incore: bool,
    /// Data has been written to the store at least once.
    pub init: bool,
    /// Somebody sleeps on this page's page-out; wake them when it ends.
    pub write_wait: bool,
    #[bits(6)]
    __: u8,
}

/// Failure to grow the page map.
#[derive(Debug, thiserror::Error)]
pub enum PageMapError {
    #[error("page map allocation failed")]
    OutOfMemory,
}

/// The object's per-page flag table.
///
/// The table only ever grows, in page-size-rounded doubling steps, and a
/// failed growth leaves it untouched. Reading past the current end yields
/// an all-zero cell, which is also the state of a page nobody has touched.
pub struct PageMap {
    cells: Vec<PageFlags>,
    layout: PageLayout,
}

impl PageMap {
    #[must_use]
    pub fn new(layout: PageLayout) -> Self {
        Self {
            cells: Vec::new(),
            layout,
        }
    }

    /// Number of pages the table currently covers.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.cells.len() as u64
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Grow the table so that it covers pages `0..upto`.
    ///
    /// # Errors
    /// [`PageMapError::OutOfMemory`] if the allocation fails; the table is
    /// unchanged in that case.
    pub fn resize(&mut self, upto: PageIndex) -> Result<(), PageMapError> {
        let Ok(needed) = usize::try_from(upto.as_u64()) else {
            return Err(PageMapError::OutOfMemory);
        };
        if needed <= self.cells.len() {
            return Ok(());
        }

        // Grow to at least double the current coverage and round the byte
        // size of the table up to a whole page.
        let cell_size = size_of::<PageFlags>() as u64;
        let doubled = needed.max(self.cells.len() * 2) as u64;
        let Some(bytes) = doubled
            .checked_mul(cell_size)
            .and_then(|b| b.checked_add(self.layout.page_size() - 1))
            .map(|b| b & !(self.layout.page_size() - 1))
        else {
            return Err(PageMapError::OutOfMemory);
        };
        let Ok(target) = usize::try_from(bytes / cell_size) else {
            return Err(PageMapError::OutOfMemory);
        };

        self.cells
            .try_reserve_exact(target - self.cells.len())
            .map_err(|_| PageMapError::OutOfMemory)?;
        self.cells.resize(target, PageFlags::new());
        Ok(())
    }

    /// The cell for `page`; all-zero beyond the current table.
    #[must_use]
    pub fn get(&self, page: PageIndex) -> PageFlags {
        usize::try_from(page.as_u64())
            .ok()
            .and_then(|idx| self.cells.get(idx).copied())
            .unwrap_or_else(PageFlags::new)
    }

    /// Store `flags` for `page`. Writes beyond the current table are
    /// dropped; callers resize first when the state must stick.
    pub fn set(&mut self, page: PageIndex, flags: PageFlags) {
        if let Ok(idx) = usize::try_from(page.as_u64()) {
            if let Some(cell) = self.cells.get_mut(idx) {
                *cell = flags;
            }
        }
    }

    /// The part of `range` the table currently covers; bulk updates are
    /// bounded by this, since cells past the end carry no state anyway.
    fn covered(&self, range: PageRange) -> PageRange {
        let end = range.end().as_u64().min(self.len());
        let start = range.start().as_u64().min(end);
        PageRange::new(PageIndex::new(start), PageIndex::new(end))
    }

    /// Latch `error` into every cell of `range`; future page-ins touching
    /// these pages report it to the kernel.
    pub fn mark_error(&mut self, range: PageRange, error: PageError) {
        for page in self.covered(range).iter() {
            let cell = self.get(page);
            self.set(page, cell.with_error(error));
        }
    }

    /// Stage `error` to be delivered by the next page-in of these pages
    /// that asks for write access.
    pub fn mark_next_request_error(&mut self, range: PageRange, error: PageError) {
        for page in self.covered(range).iter() {
            let cell = self.get(page);
            self.set(page, cell.with_next_error(error));
        }
    }

    /// Forget that the kernel caches any page of `range`.
    pub fn clear_incore(&mut self, range: PageRange) {
        for page in self.covered(range).iter() {
            let cell = self.get(page);
            self.set(page, cell.with_incore(false));
        }
    }

    /// The pages of `range` have had contents at least once.
    pub fn mark_init(&mut self, range: PageRange) {
        for page in self.covered(range).iter() {
            let cell = self.get(page);
            self.set(page, cell.with_init(true));
        }
    }

    /// The store's contents for `range` are known bad.
    pub fn mark_invalid(&mut self, range: PageRange) {
        for page in self.covered(range).iter() {
            let cell = self.get(page);
            self.set(page, cell.with_invalid(true));
        }
    }

    /// The store holds good data for `range` again.
    pub fn clear_invalid(&mut self, range: PageRange) {
        for page in self.covered(range).iter() {
            let cell = self.get(page);
            self.set(page, cell.with_invalid(false));
        }
    }

    /// Release the table's storage.
    pub fn clear(&mut self) {
        self.cells = Vec::new();
    }
}
