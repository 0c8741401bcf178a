//! The page-in handler.

use crate::object::{Pager, Phase};
use log::warn;
use pager_pages::PageRange;
use pager_transport::{AccessMode, ControlMessage, ControlPort, PageError};

/// Serve a kernel page-in of `length` bytes at byte `offset`.
///
/// Pages whose backing-store state is known bad, and pages carrying a
/// staged error when write access is requested, are answered with a data
/// error; everything else is handed to the backing store's `read`, in
/// contiguous runs so each page gets exactly one reply.
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

    if !st.control_matches(control) {
        warn!("page-in: wrong control port");
        shared.release_seqno(&mut st, seqno);
        return;
    }
    let Ok(range) = shared.layout.span(offset, length) else {
        warn!("page-in: misaligned request at {offset:#x}+{length:#x}");
        shared.release_seqno(&mut st, seqno);
        return;
    };

    // Hold off termination until the page map manipulation is over.
    shared.block_termination(&mut st);

    if st.phase != Phase::Normal {
        warn!("page-in: pager not in service");
        shared.allow_termination(&mut st);
        shared.release_seqno(&mut st, seqno);
        return;
    }

    if st.pagemap.resize(range.end()).is_err() {
        // Nothing sensible to tell the kernel; leave the map untouched.
        shared.allow_termination(&mut st);
        shared.release_seqno(&mut st, seqno);
        return;
    }

    // If any of the pages is being written out right now the store
    // contents are unreliable; wait for the write to finish and rescan.
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

    // Classify every page and fold the outcomes into contiguous runs.
    let mut runs: Vec<(PageRange, PageError)> = Vec::new();
    for page in range.iter() {
        let mut cell = st.pagemap.get(page);
        cell.set_incore(true);

        let outcome = if cell.invalid() {
            PageError::Io
        } else if access.write() && !cell.next_error().is_none() {
            // The staged error is paired with this write fault; deliver
            // and clear it.
            let err = cell.next_error();
            cell.set_next_error(PageError::None);
            err
        } else {
            PageError::None
        };

        if !outcome.is_none() {
            cell.set_incore(false);
        }
        st.pagemap.set(page, cell);

        match runs.last_mut() {
            Some((run, err)) if *err == outcome => *run = PageRange::new(run.start(), page.next()),
            _ => runs.push((PageRange::from_start_len(page, 1), outcome)),
        }
    }

    // Report the failing runs while still serialized; each also latches
    // its error so later faults stay consistent.
    let state = &mut *st;
    for (run, err) in &runs {
        if err.is_none() {
            continue;
        }
        if let Some(control) = &state.control {
            control.send(ControlMessage::DataError {
                offset: shared.layout.byte_offset(run.start()),
                length: shared.layout.byte_len(*run),
                error: *err,
            });
        }
        state.pagemap.mark_error(*run, *err);
    }

    shared.release_seqno(&mut st, seqno);
    drop(st);

    for (run, err) in &runs {
        if err.is_none() {
            shared.store.read(p, *run);
        }
    }

    let mut st = shared.lock_state();
    shared.allow_termination(&mut st);
}
