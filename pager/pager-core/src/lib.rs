//! # Multi-threaded pager engine
//!
//! This crate mediates between a kernel-style external-memory transport and
//! a user-supplied [`BackingStore`]. Each [`Pager`] owns one memory
//! object's worth of state: a per-page flag table, the sets of outstanding
//! lock and attribute requests, and the sequence counter that serializes
//! inbound traffic.
//!
//! Inbound messages (page-in, page-out, unlock, completions) arrive over a
//! [`RequestQueue`] and are dispatched through [`Pager::handle_message`];
//! distinct objects are handled fully in parallel, while messages for one
//! object run their critical sections in sequence-number order. Outbound
//! replies go to the kernel through the object's control channel. The
//! backing store is only ever called with the object lock released, so it
//! is free to call back into the public surface (`data_supply`,
//! `data_read_error`, …) from the same thread.
//!
//! ## A minimal round trip
//!
//! ```
//! use pager_core::{BackingStore, Pager, PagerConfig};
//! use pager_core::{PageIndex, PageRange, PagerRequest, PortSpace};
//!
//! struct Zeroes;
//!
//! impl BackingStore for Zeroes {
//!     fn read(&self, pager: &Pager, range: PageRange) {
//!         // Every page exists and is zero-filled.
//!         pager.data_unavailable(range);
//!     }
//!     fn write(&self, _pager: &Pager, _range: PageRange, _data: Vec<u8>) {}
//!     fn unlock(&self, pager: &Pager, range: PageRange) {
//!         pager.data_unlock(range);
//!     }
//!     fn extent(&self) -> PageRange {
//!         PageRange::from_start_len(PageIndex::new(0), 16)
//!     }
//! }
//!
//! let space = PortSpace::new();
//! let (pager, queue) = Pager::create(&space, PagerConfig::default(), Box::new(Zeroes));
//! let (control, kernel) = space.control_channel();
//! let name = space.name_port();
//! pager.get_port().unwrap().send(PagerRequest::Init {
//!     control,
//!     name,
//!     page_size: 4096,
//! });
//! let msg = queue.recv().unwrap();
//! pager.handle_message(msg);
//! assert!(kernel.try_recv().is_some()); // the readiness acknowledgement
//! ```

mod attributes;
mod backing;
mod completions;
mod copy;
mod data_request;
mod data_return;
mod data_unlock;
mod demux;
mod lifecycle;
mod lock_object;
mod object;
mod ops;
mod pagemap;
mod requests;

pub use backing::BackingStore;
pub use copy::{copy_from_object, copy_into_object, CopyError, MappingFault, ObjectMapping};
pub use object::{Pager, PagerConfig, WeakPager};
pub use pagemap::{PageFlags, PageMap, PageMapError};

pub use pager_pages::{PageIndex, PageLayout, PageRange, UnalignedAddress};
pub use pager_transport::{
    AccessMode, ControlMessage, ControlPort, ControlReceiver, CopyStrategy, NamePort,
    Notification, ObjectPort, ObjectProxy, PageError, PagerRequest, PortSpace, RequestQueue,
    ReturnKind, Sequenced,
};
