//! The write-access-upgrade handler.

use crate::object::{Pager, Phase};
use log::warn;
use pager_transport::{AccessMode, ControlPort};

/// The kernel holds pages write-locked and a writer faulted on them.
/// Validation happens under the object lock; the backing store's `unlock`
/// runs outside it and answers asynchronously through
/// [`Pager::data_unlock`] or [`Pager::data_unlock_error`].
pub(crate) fn handle(
    p: &Pager,
    seqno: u64,
    control: &ControlPort,
    offset: u64,
    length: u64,
    access: AccessMode,
) {
    let shared = &p.shared;
    let mut st = shared.lock_state();
    st = shared.wait_for_seqno(st, seqno);

    let range = 'validate: {
        if st.phase != Phase::Normal {
            warn!("unlock: pager not in service");
            break 'validate None;
        }
        if !st.control_matches(control) {
            warn!("unlock: wrong control port");
            break 'validate None;
        }
        if !access.write() {
            // Write access is the only thing ever locked.
            warn!("unlock: request does not ask for write access");
            break 'validate None;
        }
        match shared.layout.span(offset, length) {
            Ok(range) => Some(range),
            Err(_) => {
                warn!("unlock: misaligned request at {offset:#x}+{length:#x}");
                None
            }
        }
    };

    shared.release_seqno(&mut st, seqno);
    drop(st);

    if let Some(range) = range {
        shared.store.unlock(p, range);
    }
}
