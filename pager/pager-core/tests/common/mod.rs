//! Shared fixture for the end-to-end tests: an in-memory backing store
//! that records every callback, plus helpers to play the kernel side of
//! the protocol by hand or automatically.
#![allow(dead_code)]

use pager_core::{
    BackingStore, ControlMessage, ControlPort, ControlReceiver, NamePort, ObjectPort, PageIndex,
    PageRange, Pager, PagerConfig, PagerRequest, PortSpace, RequestQueue,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub const PAGE: u64 = 4096;

/// What the store observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Read(PageRange),
    Write(PageRange, Vec<u8>),
    Unlock(PageRange),
}

/// A rendezvous installed into the store: the callback announces itself,
/// then holds until the test releases it.
pub struct Gate {
    entered: Sender<()>,
    release: Receiver<()>,
}

/// Test-side handles to a [`Gate`].
pub struct GateControl {
    pub entered: Receiver<()>,
    pub release: Sender<()>,
}

pub fn gate() -> (Gate, GateControl) {
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    (
        Gate {
            entered: entered_tx,
            release: release_rx,
        },
        GateControl {
            entered: entered_rx,
            release: release_tx,
        },
    )
}

/// In-memory backing store. Reads supply a recognizable per-page pattern
/// unless auto-supply is turned off; writes only record.
pub struct TestStore {
    pub events: Mutex<Vec<Event>>,
    pub extent: PageRange,
    pub supply_on_read: AtomicBool,
    pub read_gate: Mutex<Option<Gate>>,
    pub write_gate: Mutex<Option<Gate>>,
    /// Set while a write callback runs; writes must never overlap.
    writing: AtomicBool,
}

impl TestStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            extent: PageRange::from_start_len(PageIndex::new(0), 64),
            supply_on_read: AtomicBool::new(true),
            read_gate: Mutex::new(None),
            write_gate: Mutex::new(None),
            writing: AtomicBool::new(false),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reads(&self) -> Vec<PageRange> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Read(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn writes(&self) -> Vec<(PageRange, Vec<u8>)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Write(r, d) => Some((r, d)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn pass_gate(gate: &Mutex<Option<Gate>>) {
        let taken = gate.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(gate) = taken {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }
    }
}

/// The pattern a page's supplied contents carry.
pub fn page_pattern(page: PageIndex) -> Vec<u8> {
    vec![(page.as_u64() % 251) as u8 + 1; PAGE as usize]
}

impl BackingStore for TestStore {
    fn read(&self, pager: &Pager, range: PageRange) {
        self.record(Event::Read(range));
        Self::pass_gate(&self.read_gate);
        if self.supply_on_read.load(Ordering::SeqCst) {
            for page in range.iter() {
                pager
                    .data_supply(page, page_pattern(page), false, true)
                    .expect("page-sized buffer");
            }
        }
    }

    fn write(&self, _pager: &Pager, range: PageRange, data: Vec<u8>) {
        assert!(
            !self.writing.swap(true, Ordering::SeqCst),
            "overlapping write callbacks"
        );
        Self::pass_gate(&self.write_gate);
        // Give a concurrent (buggy) writer a chance to trip the flag.
        thread::sleep(Duration::from_millis(10));
        self.record(Event::Write(range, data));
        self.writing.store(false, Ordering::SeqCst);
    }

    fn unlock(&self, _pager: &Pager, range: PageRange) {
        self.record(Event::Unlock(range));
    }

    fn extent(&self) -> PageRange {
        self.extent
    }
}

/// One pager plus the kernel-side halves of its channels.
pub struct Fixture {
    pub pager: Pager,
    pub queue: Arc<RequestQueue>,
    pub port: ObjectPort,
    pub control: ControlPort,
    pub kernel: Option<ControlReceiver>,
    pub name: NamePort,
    pub store: Arc<TestStore>,
}

pub fn fixture() -> Fixture {
    let space = PortSpace::new();
    let store = TestStore::new();
    let (pager, queue) = Pager::create(
        &space,
        PagerConfig {
            page_size: PAGE,
            may_cache: false,
            copy_strategy: pager_core::CopyStrategy::Delay,
        },
        Box::new(ArcStore(Arc::clone(&store))),
    );
    let port = pager.get_port().expect("fresh pager has a port");
    let (control, kernel) = space.control_channel();
    let name = space.name_port();
    Fixture {
        pager,
        queue: Arc::new(queue),
        port,
        control,
        kernel: Some(kernel),
        name,
        store,
    }
}

/// Adapter so the fixture can keep its own `Arc` to the store.
struct ArcStore(Arc<TestStore>);

impl BackingStore for ArcStore {
    fn read(&self, pager: &Pager, range: PageRange) {
        self.0.read(pager, range);
    }
    fn write(&self, pager: &Pager, range: PageRange, data: Vec<u8>) {
        self.0.write(pager, range, data);
    }
    fn unlock(&self, pager: &Pager, range: PageRange) {
        self.0.unlock(pager, range);
    }
    fn extent(&self) -> PageRange {
        self.0.extent()
    }
}

impl Fixture {
    /// Handle the next queued message on the calling thread.
    pub fn pump_one(&self) {
        let msg = self.queue.recv().expect("a queued request");
        self.pager.handle_message(msg);
    }

    /// Send `init` and process it.
    pub fn init(&self) {
        self.port.send(PagerRequest::Init {
            control: self.control.clone(),
            name: self.name.clone(),
            page_size: PAGE,
        });
        self.pump_one();
    }

    /// Run `n` service threads draining the queue until the object port
    /// closes.
    pub fn spawn_serve(&self, n: usize) -> Vec<JoinHandle<()>> {
        (0..n)
            .map(|_| {
                let pager = self.pager.clone();
                let queue = Arc::clone(&self.queue);
                thread::spawn(move || pager.serve(&queue))
            })
            .collect()
    }

    /// Play the kernel: acknowledge lock requests and attribute changes,
    /// collect everything else for inspection.
    pub fn spawn_auto_kernel(&mut self) -> AutoKernel {
        let receiver = self.kernel.take().expect("control receiver still here");
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let collected = Arc::clone(&outbox);
        let control = self.control.clone();
        let handle = thread::spawn(move || {
            while let Some(msg) = receiver.recv() {
                match msg {
                    ControlMessage::LockRequest {
                        offset,
                        length,
                        reply: Some(reply),
                        ..
                    } => reply.send(PagerRequest::LockCompleted {
                        control: control.clone(),
                        offset,
                        length,
                    }),
                    ControlMessage::ChangeAttributes {
                        may_cache,
                        copy_strategy,
                        reply: Some(reply),
                    } => reply.send(PagerRequest::ChangeCompleted {
                        may_cache,
                        copy_strategy,
                    }),
                    other => collected
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(other),
                }
            }
        });
        AutoKernel { outbox, handle }
    }
}

pub struct AutoKernel {
    pub outbox: Arc<Mutex<Vec<ControlMessage>>>,
    pub handle: JoinHandle<()>,
}

impl AutoKernel {
    /// Drain everything collected so far.
    pub fn take(&self) -> Vec<ControlMessage> {
        std::mem::take(&mut *self.outbox.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Poll `cond` until it holds or the timeout trips.
pub fn wait_until(cond: impl Fn() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

pub fn range(start: u64, end: u64) -> PageRange {
    PageRange::new(PageIndex::new(start), PageIndex::new(end))
}

pub fn page(index: u64) -> PageIndex {
    PageIndex::new(index)
}
