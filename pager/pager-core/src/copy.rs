//! Fault-safe bulk copies through a mapping of the object.
//!
//! Mapping pager-backed memory and copying through it can fault at any
//! page the pager has latched an error for. The copy helpers here window
//! the transfer, and when the mapping reports a fault they consult the
//! page map for the latched error and report how many bytes made it.

use crate::object::Pager;
use pager_transport::PageError;

/// Window size for both the bulk and the bytewise phases.
const WINDOW_PAGES: u64 = 32;

/// Minimum transfer for which the page-aligned bulk path is worth it.
const BULK_MIN_PAGES: u64 = 2;

/// A mapping of the memory object into addressable memory, as
/// established by the embedder's VM layer.
///
/// Implementations report partial progress: a fault carries the number of
/// bytes copied before it and the object-absolute byte offset that
/// faulted.
pub trait ObjectMapping {
    /// Copy `buf.len()` bytes out of the object starting at `offset`.
    ///
    /// # Errors
    /// [`MappingFault`] if a page of the mapped window faults.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), MappingFault>;

    /// Copy `buf` into the object starting at `offset`.
    ///
    /// # Errors
    /// [`MappingFault`] if a page of the mapped window faults.
    fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), MappingFault>;

    /// Bulk variant of [`ObjectMapping::read_at`] for page-aligned
    /// transfers; a VM that can move whole mapped pages overrides this.
    ///
    /// # Errors
    /// [`MappingFault`] if a page of the mapped window faults.
    fn read_pages(&self, offset: u64, buf: &mut [u8]) -> Result<(), MappingFault> {
        self.read_at(offset, buf)
    }

    /// Bulk variant of [`ObjectMapping::write_at`] for page-aligned
    /// transfers.
    ///
    /// # Errors
    /// [`MappingFault`] if a page of the mapped window faults.
    fn write_pages(&self, offset: u64, buf: &[u8]) -> Result<(), MappingFault> {
        self.write_at(offset, buf)
    }
}

/// A fault raised by an [`ObjectMapping`] copy.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MappingFault {
    /// Bytes successfully copied before the fault.
    pub copied: usize,
    /// Object-absolute byte offset of the faulting access.
    pub offset: u64,
}

/// A copy ended early on a fault.
#[derive(Debug, thiserror::Error)]
#[error("object fault at byte {offset:#x} after copying {copied} bytes: {error}")]
pub struct CopyError {
    /// Object-absolute byte offset of the faulting access.
    pub offset: u64,
    /// Bytes successfully copied before the fault.
    pub copied: usize,
    /// The error latched for the faulting page.
    #[source]
    pub error: PageError,
}

/// Copy `dst.len()` bytes out of the object at byte `offset` into `dst`.
///
/// Returns the number of bytes copied, which on success is all of them.
///
/// # Errors
/// [`CopyError`] when the mapping faults; it carries the latched page
/// error and the progress made up to the fault.
pub fn copy_from_object(
    pager: &Pager,
    mapping: &(impl ObjectMapping + ?Sized),
    offset: u64,
    dst: &mut [u8],
) -> Result<usize, CopyError> {
    let layout = pager.page_layout();
    let page = layout.page_size();
    let window = usize::try_from(WINDOW_PAGES * page).unwrap_or(usize::MAX);
    let total = dst.len();
    let mut copied = 0usize;

    if layout.is_aligned(offset) && total as u64 >= BULK_MIN_PAGES * page {
        // Aligned bulk windows over the page-multiple prefix.
        let bulk_total = usize::try_from(total as u64 & !(page - 1)).unwrap_or(total);
        while copied < bulk_total {
            let chunk = window.min(bulk_total - copied);
            match mapping.read_pages(offset + copied as u64, &mut dst[copied..copied + chunk]) {
                Ok(()) => copied += chunk,
                Err(fault) => return Err(fault_error(pager, copied, fault)),
            }
        }
    }

    while copied < total {
        let chunk = window.min(total - copied);
        match mapping.read_at(offset + copied as u64, &mut dst[copied..copied + chunk]) {
            Ok(()) => copied += chunk,
            Err(fault) => return Err(fault_error(pager, copied, fault)),
        }
    }
    Ok(copied)
}

/// Copy `src` into the object at byte `offset`.
///
/// Returns the number of bytes copied, which on success is all of them.
///
/// # Errors
/// [`CopyError`] when the mapping faults; it carries the latched page
/// error and the progress made up to the fault.
pub fn copy_into_object(
    pager: &Pager,
    mapping: &(impl ObjectMapping + ?Sized),
    offset: u64,
    src: &[u8],
) -> Result<usize, CopyError> {
    let layout = pager.page_layout();
    let page = layout.page_size();
    let window = usize::try_from(WINDOW_PAGES * page).unwrap_or(usize::MAX);
    let total = src.len();
    let mut copied = 0usize;

    if layout.is_aligned(offset) && total as u64 >= BULK_MIN_PAGES * page {
        let bulk_total = usize::try_from(total as u64 & !(page - 1)).unwrap_or(total);
        while copied < bulk_total {
            let chunk = window.min(bulk_total - copied);
            match mapping.write_pages(offset + copied as u64, &src[copied..copied + chunk]) {
                Ok(()) => copied += chunk,
                Err(fault) => return Err(fault_error(pager, copied, fault)),
            }
        }
    }

    while copied < total {
        let chunk = window.min(total - copied);
        match mapping.write_at(offset + copied as u64, &src[copied..copied + chunk]) {
            Ok(()) => copied += chunk,
            Err(fault) => return Err(fault_error(pager, copied, fault)),
        }
    }
    Ok(copied)
}

/// Turn a mapping fault into the user-visible error by consulting the
/// page map for the faulting page. A fault with nothing latched still
/// failed; it reports as an I/O error.
fn fault_error(pager: &Pager, progress: usize, fault: MappingFault) -> CopyError {
    let page = pager.page_layout().page_containing(fault.offset);
    let error = match pager.get_error(page) {
        Ok(PageError::None) | Err(_) => PageError::Io,
        Ok(latched) => latched,
    };
    CopyError {
        offset: fault.offset,
        copied: progress + fault.copied,
        error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::BackingStore;
    use crate::object::{Pager, PagerConfig};
    use pager_pages::{PageIndex, PageRange};
    use pager_transport::PortSpace;
    use std::collections::BTreeSet;

    struct NullStore;

    impl BackingStore for NullStore {
        fn read(&self, _pager: &Pager, _range: PageRange) {}
        fn write(&self, _pager: &Pager, _range: PageRange, _data: Vec<u8>) {}
        fn unlock(&self, _pager: &Pager, _range: PageRange) {}
        fn extent(&self) -> PageRange {
            PageRange::from_start_len(PageIndex::new(0), 64)
        }
    }

    /// A flat in-memory "mapping" with a poisonable page set.
    struct TestMapping {
        bytes: Vec<u8>,
        poisoned: BTreeSet<u64>,
        page_size: u64,
    }

    impl TestMapping {
        fn new(pages: u64) -> Self {
            let page_size = 4096u64;
            let mut bytes = vec![0u8; (pages * page_size) as usize];
            for (i, b) in bytes.iter_mut().enumerate() {
                *b = (i % 251) as u8;
            }
            Self {
                bytes,
                poisoned: BTreeSet::new(),
                page_size,
            }
        }

        /// First poisoned byte offset within `[offset, offset+len)`.
        fn first_fault(&self, offset: u64, len: usize) -> Option<u64> {
            let end = offset + len as u64;
            let first_page = offset / self.page_size;
            let last_page = end.div_ceil(self.page_size);
            (first_page..last_page)
                .find(|p| self.poisoned.contains(p))
                .map(|p| (p * self.page_size).max(offset))
        }
    }

    impl ObjectMapping for TestMapping {
        fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), MappingFault> {
            if let Some(fault) = self.first_fault(offset, buf.len()) {
                let good = (fault - offset) as usize;
                let src = &self.bytes[offset as usize..offset as usize + good];
                buf[..good].copy_from_slice(src);
                return Err(MappingFault {
                    copied: good,
                    offset: fault,
                });
            }
            buf.copy_from_slice(&self.bytes[offset as usize..offset as usize + buf.len()]);
            Ok(())
        }

        fn write_at(&self, offset: u64, buf: &[u8]) -> Result<(), MappingFault> {
            if let Some(fault) = self.first_fault(offset, buf.len()) {
                return Err(MappingFault {
                    copied: (fault - offset) as usize,
                    offset: fault,
                });
            }
            Ok(())
        }
    }

    fn pager() -> Pager {
        let space = PortSpace::new();
        let (pager, _queue) = Pager::create(&space, PagerConfig::default(), Box::new(NullStore));
        pager
    }

    #[test]
    fn full_copy_succeeds() {
        let p = pager();
        let mapping = TestMapping::new(4);
        let mut dst = vec![0u8; 3 * 4096];
        let copied = copy_from_object(&p, &mapping, 0, &mut dst).unwrap();
        assert_eq!(copied, dst.len());
        assert_eq!(dst[..], mapping.bytes[..dst.len()]);
    }

    #[test]
    fn unaligned_copy_goes_through_the_bytewise_path() {
        let p = pager();
        let mapping = TestMapping::new(4);
        let mut dst = vec![0u8; 50];
        let copied = copy_from_object(&p, &mapping, 100, &mut dst).unwrap();
        assert_eq!(copied, 50);
        assert_eq!(dst[..], mapping.bytes[100..150]);
    }

    #[test]
    fn fault_reports_latched_error_and_progress() {
        let p = pager();
        let range = PageRange::from_start_len(PageIndex::new(1), 1);
        p.data_write_error(range, PageError::NoSpace);

        let mut mapping = TestMapping::new(4);
        mapping.poisoned.insert(1);

        let mut dst = vec![0u8; 3 * 4096];
        let err = copy_from_object(&p, &mapping, 0, &mut dst).unwrap_err();
        assert_eq!(err.copied, 4096);
        assert_eq!(err.offset, 4096);
        assert_eq!(err.error, PageError::NoSpace);
        assert_eq!(dst[..4096], mapping.bytes[..4096]);
    }

    #[test]
    fn fault_without_latch_reports_io() {
        let p = pager();
        let mut mapping = TestMapping::new(4);
        mapping.poisoned.insert(0);
        let mut dst = vec![0u8; 4096];
        let err = copy_from_object(&p, &mapping, 0, &mut dst).unwrap_err();
        assert_eq!(err.copied, 0);
        assert_eq!(err.error, PageError::Io);
    }

    #[test]
    fn write_fault_reports_progress() {
        let p = pager();
        let mut mapping = TestMapping::new(8);
        mapping.poisoned.insert(2);
        let src = vec![7u8; 4 * 4096];
        let err = copy_into_object(&p, &mapping, 0, &src).unwrap_err();
        assert_eq!(err.copied, 2 * 4096);
        assert_eq!(err.offset, 2 * 4096);
    }
}
