use crate::{AccessMode, ControlPort, NamePort, ObjectPort, PageError};

/// How the object asks the kernel to share its pages with other mappings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum CopyStrategy {
    /// Pages may not be copied; callers must go through the object.
    None,
    /// Copy lazily on first write.
    #[default]
    Delay,
    /// Ask the object before every copy.
    Call,
    /// The object is temporary; copies need not be preserved.
    Temporary,
}

/// What the kernel should do with dirty pages when honoring a lock request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ReturnKind {
    None,
    Dirty,
    All,
}

/// A request message tagged with its per-object sequence number.
#[derive(Debug)]
pub struct Sequenced<T> {
    pub seqno: u64,
    pub body: T,
}

/// Kernel-originated notifications.
///
/// These carry no payload the pager acts on; they exist so that the
/// sequence bookkeeping survives traffic the pager does not otherwise
/// care about. `NoSenders` additionally drives the teardown path.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Notification {
    DeadName,
    NoSenders,
    SendOnce,
    PortDestroyed,
    MsgAccepted,
    PortDeleted,
}

/// Inbound traffic on an object's request channel.
#[derive(Debug)]
pub enum PagerRequest {
    /// Bind the control and name channels; sent once per object lifetime.
    Init {
        control: ControlPort,
        name: NamePort,
        page_size: u64,
    },
    /// Unbind; the kernel guarantees no further traffic on this binding.
    Terminate {
        control: ControlPort,
        name: NamePort,
    },
    /// Page-in: supply `length` bytes starting at byte `offset`.
    DataRequest {
        control: ControlPort,
        offset: u64,
        length: u64,
        access: AccessMode,
    },
    /// Page-out: write back `data`; `dirty` tells whether the kernel
    /// modified it, `kernel_copy` whether the kernel keeps a copy cached.
    DataReturn {
        control: ControlPort,
        offset: u64,
        data: Vec<u8>,
        dirty: bool,
        kernel_copy: bool,
    },
    /// The kernel wants write access to pages it holds read-only.
    DataUnlock {
        control: ControlPort,
        offset: u64,
        length: u64,
        access: AccessMode,
    },
    /// A previously issued lock request has been carried out.
    LockCompleted {
        control: ControlPort,
        offset: u64,
        length: u64,
    },
    /// A previously issued attribute change has been carried out.
    ChangeCompleted {
        may_cache: bool,
        copy_strategy: CopyStrategy,
    },
    Notify(Notification),
}

/// Outbound traffic on an object's control channel.
#[derive(Debug)]
pub enum ControlMessage {
    /// Acknowledges `Init`; advertises the initial attributes.
    Ready {
        may_cache: bool,
        copy_strategy: CopyStrategy,
    },
    /// Provide page contents. `lock` names the protections *denied* to
    /// the kernel (write-locked data triggers `DataUnlock` on write).
    DataSupply {
        offset: u64,
        data: Vec<u8>,
        lock: AccessMode,
        precious: bool,
        reply: Option<ObjectPort>,
    },
    /// The pages cannot be provided; a fault on them fails with `error`.
    DataError {
        offset: u64,
        length: u64,
        error: PageError,
    },
    /// The pages have no backing-store contents; use zero fill.
    DataUnavailable { offset: u64, length: u64 },
    /// Change protections and/or flush or return cached pages. A `lock`
    /// of `None` leaves protections unchanged. `reply` requests a
    /// `LockCompleted` once done.
    LockRequest {
        offset: u64,
        length: u64,
        should_return: ReturnKind,
        should_flush: bool,
        lock: Option<AccessMode>,
        reply: Option<ObjectPort>,
    },
    /// Change caching and copy strategy. `reply` requests a
    /// `ChangeCompleted` once done.
    ChangeAttributes {
        may_cache: bool,
        copy_strategy: CopyStrategy,
        reply: Option<ObjectPort>,
    },
}
