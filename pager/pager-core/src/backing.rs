use crate::Pager;
use pager_pages::PageRange;

/// The operations a pager needs from its backing store.
///
/// All methods are invoked synchronously from whichever thread is handling
/// the triggering message, always with the object lock released. They may
/// therefore call back into the [`Pager`] they are given.
pub trait BackingStore: Send + Sync {
    /// Provide the contents of `range`.
    ///
    /// For every page of the range the implementation must eventually call
    /// exactly one of [`Pager::data_supply`], [`Pager::data_unavailable`]
    /// or [`Pager::data_read_error`]; pages are never re-requested.
    fn read(&self, pager: &Pager, range: PageRange);

    /// Persist `data`, which covers exactly `range`. Ownership of the
    /// buffer passes to the implementation.
    ///
    /// Write failures are reported through [`Pager::data_write_error`].
    fn write(&self, pager: &Pager, range: PageRange, data: Vec<u8>);

    /// The kernel wants write access to `range`, which was supplied
    /// write-locked. Respond with [`Pager::data_unlock`] or
    /// [`Pager::data_unlock_error`].
    fn unlock(&self, pager: &Pager, range: PageRange);

    /// The first and last pages the store will accept, as a half-open
    /// range. Whole-object sync and flush operations cover this range.
    fn extent(&self) -> PageRange;

    /// Called once when the last strong handle to the pager is gone.
    fn clear_user_data(&self) {}

    /// Invited to drop any weak handles the store itself holds; called at
    /// most once per lost-references transition.
    fn drop_weak_refs(&self) {}

    /// The object came back to life: a strong handle was recreated from a
    /// weak one after the strong count had dropped to zero.
    fn new_refs(&self) {}
}
