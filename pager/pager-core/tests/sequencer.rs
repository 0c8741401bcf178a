//! Sequence-number serialization across threads.

mod common;

use common::{fixture, range, PAGE};
use pager_core::{AccessMode, Notification, PagerRequest, Sequenced};
use std::thread;

#[test]
fn out_of_order_arrivals_run_in_seqno_order() {
    let fx = fixture();
    fx.init(); // consumes seqno 0

    // Three notifications handled on three threads, delivered in reverse
    // order. Each must wait its turn; none may be lost.
    let mut handles = Vec::new();
    for seqno in [3u64, 2, 1] {
        let pager = fx.pager.clone();
        handles.push(thread::spawn(move || {
            pager.handle_message(Sequenced {
                seqno,
                body: PagerRequest::Notify(Notification::DeadName),
            });
        }));
        // Stagger so the highest seqno reliably arrives first.
        thread::sleep(std::time::Duration::from_millis(20));
    }
    for h in handles {
        h.join().unwrap();
    }

    // The stream is intact: the next message in line is processed.
    fx.pager.handle_message(Sequenced {
        seqno: 4,
        body: PagerRequest::DataRequest {
            control: fx.control.clone(),
            offset: 0,
            length: PAGE,
            access: AccessMode::READ,
        },
    });
    assert_eq!(fx.store.reads(), vec![range(0, 1)]);
}

#[test]
fn every_notification_kind_advances_the_stream() {
    let fx = fixture();
    fx.init();

    for (i, kind) in [
        Notification::DeadName,
        Notification::SendOnce,
        Notification::PortDestroyed,
        Notification::MsgAccepted,
        Notification::PortDeleted,
    ]
    .into_iter()
    .enumerate()
    {
        fx.pager.handle_message(Sequenced {
            seqno: 1 + i as u64,
            body: PagerRequest::Notify(kind),
        });
    }

    fx.pager.handle_message(Sequenced {
        seqno: 6,
        body: PagerRequest::DataRequest {
            control: fx.control.clone(),
            offset: 0,
            length: PAGE,
            access: AccessMode::READ,
        },
    });
    assert_eq!(fx.store.reads(), vec![range(0, 1)]);
}

#[test]
fn no_senders_tears_the_binding_down() {
    let fx = fixture();
    fx.init();

    fx.pager.handle_message(Sequenced {
        seqno: 1,
        body: PagerRequest::Notify(Notification::NoSenders),
    });

    // Unbound again: requests are refused until the next init.
    fx.pager.handle_message(Sequenced {
        seqno: 2,
        body: PagerRequest::DataRequest {
            control: fx.control.clone(),
            offset: 0,
            length: PAGE,
            access: AccessMode::READ,
        },
    });
    assert!(fx.store.reads().is_empty());
}
