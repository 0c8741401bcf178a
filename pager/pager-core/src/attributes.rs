//! Changing the cached attribute pair, synchronously on request.

use crate::object::{Pager, Phase};
use crate::requests::AttributeRequest;
use pager_transport::{ControlMessage, CopyStrategy};
use std::sync::Arc;

impl Pager {
    /// Change the object's caching attribute and copy strategy.
    ///
    /// The new pair is cached immediately. Before the object is bound to
    /// a kernel nothing is transmitted; the values travel with the
    /// readiness acknowledgement instead. With `wait` set the call only
    /// returns once the kernel has acknowledged this change — and if an
    /// earlier change is still pending, the call goes through the motions
    /// even when the pair matches the cache, because it has to line up
    /// behind that change.
    pub fn change_attributes(&self, may_cache: bool, copy_strategy: CopyStrategy, wait: bool) {
        let shared = &self.shared;
        let mut st = shared.lock_state();

        if st.may_cache == may_cache
            && st.copy_strategy == copy_strategy
            && !(wait && !st.attribute_requests.is_empty())
        {
            return;
        }

        st.may_cache = may_cache;
        st.copy_strategy = copy_strategy;

        if st.phase != Phase::Normal {
            return;
        }

        let record = if wait {
            let ar = match st
                .attribute_requests
                .iter()
                .find(|ar| ar.matches(may_cache, copy_strategy))
            {
                Some(ar) => Arc::clone(ar),
                None => {
                    let ar = Arc::new(AttributeRequest::new(may_cache, copy_strategy));
                    st.attribute_requests.push(Arc::clone(&ar));
                    ar
                }
            };
            ar.join();
            Some(ar)
        } else {
            None
        };

        let control = st.control.clone();
        let reply = if wait { st.object_port.clone() } else { None };
        drop(st);

        if let Some(control) = control {
            control.send(ControlMessage::ChangeAttributes {
                may_cache,
                copy_strategy,
                reply,
            });
        }

        if let Some(ar) = record {
            let mut st = shared.lock_state();
            while !ar.is_satisfied() {
                st = shared.wait(st);
            }
            if ar.leave() {
                st.attribute_requests.retain(|r| !Arc::ptr_eq(r, &ar));
            }
        }
    }
}
