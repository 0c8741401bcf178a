use crate::{AccessMode, ControlMessage, PagerRequest, Sequenced};
use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Mutex;
use std::time::Duration;

/// An opaque port identity. Two port handles denote the same endpoint
/// exactly when their identities are equal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PortId(u64);

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port#{}", self.0)
    }
}

/// Mints port identities and channel pairs for one process.
///
/// There is deliberately no global port table; every pager is constructed
/// against an explicit `PortSpace`.
#[derive(Debug, Default)]
pub struct PortSpace {
    next_id: AtomicU64,
}

impl PortSpace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&self) -> PortId {
        PortId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// A control channel: the pager holds the [`ControlPort`], the kernel
    /// side drains the [`ControlReceiver`].
    #[must_use]
    pub fn control_channel(&self) -> (ControlPort, ControlReceiver) {
        let id = self.mint();
        let (tx, rx) = mpsc::channel();
        (ControlPort { id, tx }, ControlReceiver { id, rx })
    }

    /// A pure-identity name port.
    #[must_use]
    pub fn name_port(&self) -> NamePort {
        NamePort { id: self.mint() }
    }

    /// An object request channel: the kernel side holds the
    /// [`ObjectPort`] (cloning it mints further send rights), the pager
    /// drains the [`RequestQueue`], which stamps sequence numbers in
    /// dequeue order.
    #[must_use]
    pub fn object_channel(&self) -> (ObjectPort, RequestQueue) {
        let id = self.mint();
        let (tx, rx) = mpsc::channel();
        (
            ObjectPort { id, tx },
            RequestQueue {
                id,
                rx: Mutex::new(rx),
                next_seqno: AtomicU64::new(0),
            },
        )
    }
}

/// Send half of a control channel; the pager's view of the kernel.
#[derive(Clone)]
pub struct ControlPort {
    id: PortId,
    tx: Sender<ControlMessage>,
}

impl ControlPort {
    #[inline]
    #[must_use]
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Deliver a message to the kernel side. Messages sent after the
    /// receiver is gone vanish, exactly like sends to a dead port.
    pub fn send(&self, msg: ControlMessage) {
        if self.tx.send(msg).is_err() {
            log::trace!("control {} is dead, message dropped", self.id);
        }
    }
}

impl PartialEq for ControlPort {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ControlPort {}

impl fmt::Debug for ControlPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ControlPort({})", self.id)
    }
}

/// Receive half of a control channel; the kernel (or a test harness).
pub struct ControlReceiver {
    id: PortId,
    rx: Receiver<ControlMessage>,
}

impl ControlReceiver {
    #[inline]
    #[must_use]
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Blocks until a message arrives; `None` once all senders are gone.
    pub fn recv(&self) -> Option<ControlMessage> {
        self.rx.recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<ControlMessage> {
        self.rx.recv_timeout(timeout).ok()
    }

    pub fn try_recv(&self) -> Option<ControlMessage> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now.
    pub fn drain(&self) -> Vec<ControlMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            out.push(msg);
        }
        out
    }
}

/// A name port: pure identity, never carries traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePort {
    id: PortId,
}

impl NamePort {
    #[inline]
    #[must_use]
    pub fn id(&self) -> PortId {
        self.id
    }
}

/// A send right to an object's request channel.
#[derive(Clone)]
pub struct ObjectPort {
    id: PortId,
    tx: Sender<PagerRequest>,
}

impl ObjectPort {
    #[inline]
    #[must_use]
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Enqueue a request for the object. Sequence numbers are assigned at
    /// dequeue time, so concurrent senders cannot produce gaps.
    pub fn send(&self, msg: PagerRequest) {
        if self.tx.send(msg).is_err() {
            log::trace!("object {} is dead, request dropped", self.id);
        }
    }
}

impl PartialEq for ObjectPort {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ObjectPort {}

impl fmt::Debug for ObjectPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectPort({})", self.id)
    }
}

/// Receive side of an object's request channel.
///
/// Dequeueing stamps each message with the next sequence number. The
/// queue may be drained from several threads at once; the stamp is taken
/// while the receiver is held, so numbers are handed out in dequeue
/// order without gaps.
pub struct RequestQueue {
    id: PortId,
    rx: Mutex<Receiver<PagerRequest>>,
    next_seqno: AtomicU64,
}

impl RequestQueue {
    #[inline]
    #[must_use]
    pub fn id(&self) -> PortId {
        self.id
    }

    /// Blocks until a request arrives; `None` once every [`ObjectPort`]
    /// clone is gone (the no-more-senders condition).
    pub fn recv(&self) -> Option<Sequenced<PagerRequest>> {
        let rx = self.rx.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let body = rx.recv().ok()?;
        let seqno = self.next_seqno.fetch_add(1, Ordering::Relaxed);
        Some(Sequenced { seqno, body })
    }

    pub fn try_recv(&self) -> Option<Sequenced<PagerRequest>> {
        let rx = self.rx.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match rx.try_recv() {
            Ok(body) => {
                let seqno = self.next_seqno.fetch_add(1, Ordering::Relaxed);
                Some(Sequenced { seqno, body })
            }
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestQueue({})", self.id)
    }
}

/// A protection-restricted view of a memory object, as handed out to
/// clients that may only map it read-only.
#[derive(Debug, Clone)]
pub struct ObjectProxy {
    port: ObjectPort,
    max_access: AccessMode,
}

impl ObjectProxy {
    #[must_use]
    pub fn new(port: ObjectPort, max_access: AccessMode) -> Self {
        Self { port, max_access }
    }

    #[inline]
    #[must_use]
    pub fn port(&self) -> &ObjectPort {
        &self.port
    }

    #[inline]
    #[must_use]
    pub fn max_access(&self) -> AccessMode {
        self.max_access
    }
}
