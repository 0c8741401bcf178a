//! The page-out handler.

use crate::object::{Pager, Phase};
use crate::requests::LockRequest;
use log::warn;
use pager_transport::ControlPort;
use std::sync::Arc;

/// Accept pages the kernel is evicting and hand them to the backing
/// store.
///
/// Overlapping page-outs are serialized per page through the paging-out
/// bit, and every outstanding lock request whose range the write touches
/// is counted up front and counted back down afterwards — against the
/// snapshot taken here, so lock requests created while the write is in
/// flight are never decremented by mistake.
pub(crate) fn handle(
    p: &Pager,
    seqno: u64,
    control: &ControlPort,
    offset: u64,
    data: Vec<u8>,
    dirty: bool,
    kernel_copy: bool,
) {
    let shared = &p.shared;
    let mut st = shared.lock_state();
    st = shared.wait_for_seqno(st, seqno);

    if !st.control_matches(control) {
        warn!("page-out: wrong control port");
        shared.release_seqno(&mut st, seqno);
        return;
    }
    let Ok(range) = shared.layout.span(offset, data.len() as u64) else {
        warn!("page-out: misaligned request at {offset:#x}+{:#x}", data.len());
        shared.release_seqno(&mut st, seqno);
        return;
    };

    if !dirty {
        // The kernel is dropping a clean copy; nothing to persist.
        shared.release_seqno(&mut st, seqno);
        return;
    }

    if st.phase != Phase::Normal {
        warn!("page-out: pager not in service");
        shared.release_seqno(&mut st, seqno);
        return;
    }

    // The page map is consulted again after the write completes; keep
    // termination out until then.
    shared.block_termination(&mut st);

    if st.pagemap.resize(range.end()).is_err() {
        shared.allow_termination(&mut st);
        shared.release_seqno(&mut st, seqno);
        return;
    }

    // Wait until no other write is in flight for any of these pages.
    'rescan: loop {
        for page in range.iter() {
            let cell = st.pagemap.get(page);
            if cell.paging_out() {
                st.pagemap.set(page, cell.with_write_wait(true));
                st = shared.wait(st);
                continue 'rescan;
            }
        }
        break;
    }

    for page in range.iter() {
        let mut cell = st.pagemap.get(page);
        cell.set_paging_out(true);
        cell.set_init(true);
        if !kernel_copy {
            cell.set_incore(false);
        }
        st.pagemap.set(page, cell);
    }

    // Snapshot the lock requests this write overlaps. The decrement after
    // the I/O walks this list, not the live set, so requests added in the
    // meantime keep their counts.
    let touched: Vec<Arc<LockRequest>> = st
        .lock_requests
        .iter()
        .filter(|lr| lr.range.intersects(range))
        .cloned()
        .collect();
    for lr in &touched {
        lr.begin_write();
    }

    shared.release_seqno(&mut st, seqno);
    drop(st);

    shared.store.write(p, range, data);

    let mut st = shared.lock_state();
    let mut wake = false;
    for page in range.iter() {
        let mut cell = st.pagemap.get(page);
        if cell.write_wait() {
            wake = true;
        }
        cell.set_paging_out(false);
        cell.set_write_wait(false);
        st.pagemap.set(page, cell);
    }
    for lr in &touched {
        if lr.finish_write() {
            wake = true;
        }
    }
    if wake {
        shared.wakeup.notify_all();
    }
    shared.allow_termination(&mut st);
}
