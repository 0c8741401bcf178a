//! Binding and unbinding an object: `init`, `terminate` and the
//! no-more-senders teardown.

use crate::object::{Pager, Phase};
use log::warn;
use pager_transport::{ControlMessage, ControlPort, NamePort};

/// Bind the control and name channels and enter service.
pub(crate) fn init(p: &Pager, seqno: u64, control: ControlPort, name: NamePort, page_size: u64) {
    let shared = &p.shared;
    let mut st = shared.lock_state();
    st = shared.wait_for_seqno(st, seqno);

    if page_size != shared.layout.page_size() {
        warn!(
            "init: unexpected page size {page_size} (serving {})",
            shared.layout.page_size()
        );
        shared.release_seqno(&mut st, seqno);
        return;
    }
    if st.phase != Phase::Uninit {
        warn!("init: duplicate initialization");
        shared.release_seqno(&mut st, seqno);
        return;
    }

    control.send(ControlMessage::Ready {
        may_cache: st.may_cache,
        copy_strategy: st.copy_strategy,
    });
    st.control = Some(control);
    st.name = Some(name);
    st.phase = Phase::Normal;

    shared.release_seqno(&mut st, seqno);
}

/// Unbind from the kernel. Waits out every handler that currently blocks
/// termination, then drops the binding; the object returns to the unbound
/// state and may be initialized again.
pub(crate) fn terminate(p: &Pager, seqno: u64, control: &ControlPort, name: &NamePort) {
    let shared = &p.shared;
    let mut st = shared.lock_state();
    st = shared.wait_for_seqno(st, seqno);

    if !st.control_matches(control) {
        warn!("terminate: wrong control port");
        shared.release_seqno(&mut st, seqno);
        return;
    }
    if st.name.as_ref() != Some(name) {
        warn!("terminate: wrong name port");
        shared.release_seqno(&mut st, seqno);
        return;
    }

    while st.noterm > 0 {
        st.term_waiting = true;
        st = shared.wait(st);
    }
    st.term_waiting = false;

    shared.free_structure(&mut st);
    shared.release_seqno(&mut st, seqno);
}

/// Every send right to the object vanished: tear the binding down. The
/// kernel can no longer talk to us, so there is nothing to wait for.
pub(crate) fn no_senders(p: &Pager, seqno: u64) {
    let shared = &p.shared;
    let mut st = shared.lock_state();
    st = shared.wait_for_seqno(st, seqno);

    if st.phase != Phase::Uninit {
        shared.free_structure(&mut st);
    }

    shared.release_seqno(&mut st, seqno);
}
