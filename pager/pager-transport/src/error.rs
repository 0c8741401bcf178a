use std::io;

/// The per-page error codes the protocol can express.
///
/// Exactly four codes cross the wire; everything else a backing store can
/// encounter is coerced to [`PageError::Io`] before transmission. The
/// discriminants are the 2-bit encoding used by the page map.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, thiserror::Error)]
#[repr(u16)]
pub enum PageError {
    /// No error recorded for the page.
    #[default]
    #[error("no error")]
    None = 0,
    #[error("no space left on backing store")]
    NoSpace = 1,
    #[error("i/o error")]
    Io = 2,
    #[error("disk quota exceeded")]
    QuotaExceeded = 3,
}

impl PageError {
    #[inline]
    #[must_use]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// Decode a 2-bit field; out-of-range values cannot occur but coerce
    /// to [`PageError::Io`] like every unknown error.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        match bits {
            0 => Self::None,
            1 => Self::NoSpace,
            3 => Self::QuotaExceeded,
            _ => Self::Io,
        }
    }

    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u16 {
        self as u16
    }
}

impl From<&io::Error> for PageError {
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::StorageFull => Self::NoSpace,
            io::ErrorKind::QuotaExceeded => Self::QuotaExceeded,
            _ => Self::Io,
        }
    }
}

impl From<io::Error> for PageError {
    fn from(err: io::Error) -> Self {
        Self::from(&err)
    }
}
