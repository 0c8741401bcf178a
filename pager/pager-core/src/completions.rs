//! Kernel acknowledgements for lock requests and attribute changes.

use crate::object::Pager;
use log::warn;
use pager_transport::{ControlPort, CopyStrategy};

/// A `LockRequest` we issued with a reply port has been carried out. Find
/// the matching record and count the acknowledgement down; the lock
/// issuer waits on the record, not on this message.
pub(crate) fn lock_completed(
    p: &Pager,
    seqno: u64,
    control: &ControlPort,
    offset: u64,
    length: u64,
) {
    let shared = &p.shared;
    let mut st = shared.lock_state();
    st = shared.wait_for_seqno(st, seqno);

    if !st.control_matches(control) {
        warn!("lock completion: wrong control port");
        shared.release_seqno(&mut st, seqno);
        return;
    }
    let Ok(range) = shared.layout.span(offset, length) else {
        warn!("lock completion: misaligned range at {offset:#x}+{length:#x}");
        shared.release_seqno(&mut st, seqno);
        return;
    };

    if let Some(lr) = st.lock_requests.iter().find(|lr| lr.range == range) {
        if lr.complete_lock() {
            shared.wakeup.notify_all();
        }
    }

    shared.release_seqno(&mut st, seqno);
}

/// A `ChangeAttributes` we issued with a reply port has been carried out.
/// Matching is by the requested attribute pair.
pub(crate) fn change_completed(p: &Pager, seqno: u64, may_cache: bool, copy_strategy: CopyStrategy) {
    let shared = &p.shared;
    let mut st = shared.lock_state();
    st = shared.wait_for_seqno(st, seqno);

    if let Some(ar) = st
        .attribute_requests
        .iter()
        .find(|ar| ar.matches(may_cache, copy_strategy))
    {
        if ar.complete_change() {
            shared.wakeup.notify_all();
        }
    }

    shared.release_seqno(&mut st, seqno);
}
