//! # Typed external-memory transport
//!
//! The kernel side of the external-memory protocol is abstracted here as a
//! pair of typed message channels per object: a *request* channel carrying
//! kernel-to-pager traffic (page-in, page-out, unlock, completions,
//! notifications), and a *control* channel carrying pager-to-kernel replies
//! (data supply, data errors, lock requests, attribute changes).
//!
//! Request messages are tagged with a strictly increasing per-object
//! sequence number when they are dequeued; the pager engine uses that tag
//! to serialize handling. Ports are plain identities plus a sender handle;
//! comparing two ports compares their identities, which is how a handler
//! validates that an incoming message really refers to its own object.
//!
//! Nothing here touches a real kernel. The in-process channels double as a
//! loopback transport for tests and embedders alike.

mod access;
mod error;
mod message;
mod port;

pub use access::AccessMode;
pub use error::PageError;
pub use message::{ControlMessage, CopyStrategy, Notification, PagerRequest, ReturnKind, Sequenced};
pub use port::{
    ControlPort, ControlReceiver, NamePort, ObjectPort, ObjectProxy, PortId, PortSpace,
    RequestQueue,
};
