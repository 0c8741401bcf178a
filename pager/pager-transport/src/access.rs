use bitfield_struct::bitfield;

/// The access protections carried by page-in and unlock requests, and used
/// as the lock value of outbound lock requests.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct AccessMode {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    #[bits(5)]
    __: u8,
}

impl AccessMode {
    pub const NONE: Self = Self::new();
    pub const READ: Self = Self::new().with_read(true);
    pub const WRITE: Self = Self::new().with_write(true);
    pub const READ_WRITE: Self = Self::new().with_read(true).with_write(true);
    pub const READ_EXECUTE: Self = Self::new().with_read(true).with_execute(true);
}
