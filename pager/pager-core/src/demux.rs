use crate::object::Pager;
use crate::{completions, data_request, data_return, data_unlock, lifecycle};
use pager_transport::{Notification, PagerRequest, RequestQueue, Sequenced};

impl Pager {
    /// Dispatch one inbound message.
    ///
    /// May be called from any number of threads at once; the per-object
    /// sequence number decides the order in which critical sections run,
    /// not the order of arrival. Unknown traffic still advances the
    /// sequence counter so the bookkeeping survives garbage.
    pub fn handle_message(&self, msg: Sequenced<PagerRequest>) {
        let seqno = msg.seqno;
        match msg.body {
            PagerRequest::Init {
                control,
                name,
                page_size,
            } => lifecycle::init(self, seqno, control, name, page_size),
            PagerRequest::Terminate { control, name } => {
                lifecycle::terminate(self, seqno, &control, &name);
            }
            PagerRequest::DataRequest {
                control,
                offset,
                length,
                access,
            } => data_request::handle(self, seqno, &control, offset, length, access),
            PagerRequest::DataReturn {
                control,
                offset,
                data,
                dirty,
                kernel_copy,
            } => data_return::handle(self, seqno, &control, offset, data, dirty, kernel_copy),
            PagerRequest::DataUnlock {
                control,
                offset,
                length,
                access,
            } => data_unlock::handle(self, seqno, &control, offset, length, access),
            PagerRequest::LockCompleted {
                control,
                offset,
                length,
            } => completions::lock_completed(self, seqno, &control, offset, length),
            PagerRequest::ChangeCompleted {
                may_cache,
                copy_strategy,
            } => completions::change_completed(self, seqno, may_cache, copy_strategy),
            PagerRequest::Notify(Notification::NoSenders) => lifecycle::no_senders(self, seqno),
            PagerRequest::Notify(_) => self.update_seqno(seqno),
        }
    }

    /// Drain `queue` until every send right to the object is gone.
    pub fn serve(&self, queue: &RequestQueue) {
        while let Some(msg) = queue.recv() {
            self.handle_message(msg);
        }
    }

    /// Consume a sequence number without doing anything else.
    pub(crate) fn update_seqno(&self, seqno: u64) {
        let shared = &self.shared;
        let mut st = shared.lock_state();
        st = shared.wait_for_seqno(st, seqno);
        shared.release_seqno(&mut st, seqno);
    }
}
