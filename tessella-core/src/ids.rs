//! Typed ID newtypes for the dictionary and index key space.
//!
//! `#[repr(transparent)]` + `Copy`, so wrapping the raw primitive costs
//! nothing at runtime.

use std::fmt;

// ---------------------------------------------------------------------------
// UriId
// ---------------------------------------------------------------------------

/// Dictionary ID for an interned URI (u64).
///
/// IDs are allocated from a monotonic counter starting at 1 and are never
/// reused. Inside tuple keys they are encoded through their signed 64-bit
/// bit pattern, which preserves ordering for all IDs below `2^63`.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
#[repr(transparent)]
pub struct UriId(pub u64);

impl UriId {
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    #[inline]
    pub fn from_u64(v: u64) -> Self {
        Self(v)
    }

    /// Signed reinterpretation used by the tuple key codec.
    #[inline]
    pub fn as_i64(self) -> i64 {
        self.0 as i64
    }

    /// Inverse of [`UriId::as_i64`].
    #[inline]
    pub fn from_i64(v: i64) -> Self {
        Self(v as u64)
    }

    /// Little-endian value encoding used for `u2i` and counter values.
    #[inline]
    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// Decode an 8-byte little-endian value.
    pub fn from_le_slice(bytes: &[u8]) -> Option<Self> {
        let arr: [u8; 8] = bytes.try_into().ok()?;
        Some(Self(u64::from_le_bytes(arr)))
    }
}

impl fmt::Display for UriId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UriId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// IdTriple
// ---------------------------------------------------------------------------

/// A triple resolved to dictionary IDs, in subject/predicate/object order.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct IdTriple {
    pub s: UriId,
    pub p: UriId,
    pub o: UriId,
}

impl IdTriple {
    pub fn new(s: UriId, p: UriId, o: UriId) -> Self {
        Self { s, p, o }
    }
}

impl fmt::Display for IdTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.s.0, self.p.0, self.o.0)
    }
}
