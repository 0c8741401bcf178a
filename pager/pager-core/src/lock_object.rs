//! The synchronous wrapper around outbound lock requests; everything the
//! public sync/flush/return family does funnels through here.

use crate::object::{PagerShared, PagerState, Phase};
use crate::requests::LockRequest;
use pager_pages::PageRange;
use pager_transport::{AccessMode, ControlMessage, ReturnKind};
use std::sync::{Arc, MutexGuard};

/// Issue a kernel lock request for `range`.
///
/// With `sync` set, a record keyed by the range is joined (or created),
/// the request is sent with a reply port, and the caller blocks until
/// both the lock acknowledgement and every write-back counted against the
/// record have drained. The last thread waiting on a record unlinks it.
///
/// Must be entered with the object lock held; returns with it held.
pub(crate) fn lock_object<'a>(
    shared: &PagerShared,
    mut st: MutexGuard<'a, PagerState>,
    range: PageRange,
    should_return: ReturnKind,
    should_flush: bool,
    lock: Option<AccessMode>,
    sync: bool,
) -> MutexGuard<'a, PagerState> {
    if st.phase != Phase::Normal {
        return st;
    }

    let record = if sync {
        let lr = match st.lock_requests.iter().find(|lr| lr.range == range) {
            Some(lr) => Arc::clone(lr),
            None => {
                let lr = Arc::new(LockRequest::new(range));
                st.lock_requests.push(Arc::clone(&lr));
                lr
            }
        };
        lr.join();
        Some(lr)
    } else {
        None
    };

    let reply = if sync { st.object_port.clone() } else { None };
    if let Some(control) = &st.control {
        control.send(ControlMessage::LockRequest {
            offset: shared.layout.byte_offset(range.start()),
            length: shared.layout.byte_len(range),
            should_return,
            should_flush,
            lock,
            reply,
        });
    }

    if let Some(lr) = record {
        while !lr.is_satisfied() {
            st = shared.wait(st);
        }
        if lr.leave() {
            st.lock_requests.retain(|r| !Arc::ptr_eq(r, &lr));
        }

        if should_flush {
            // The kernel no longer caches these pages.
            let _ = st.pagemap.resize(range.end());
            st.pagemap.clear_incore(range);
        }
    }

    st
}
