//! Linear memory handle for Membrane
//!
//! This crate owns the byte buffer that represents a foreign module's
//! address space, and the `Addr` offset type used everywhere else.
//! All access is bounds-checked and little-endian; nothing in here knows
//! about layouts, heaps or formatting.
//!
//! The buffer is an explicit handle: every component that reads or writes
//! foreign memory takes a `&LinearMemory` / `&mut LinearMemory` argument
//! rather than reaching for a process-wide global. This keeps multiple
//! independent foreign instances possible and teardown deterministic.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Address type
// ============================================================================

/// An offset into a foreign module's linear memory.
///
/// Deliberately a distinct type from plain integers so addresses cannot be
/// confused with lengths or sizes in arithmetic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Addr(pub u32);

impl Addr {
    /// The null address.
    pub const NULL: Addr = Addr(0);

    /// Whether this is the null address.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Address `n` bytes past this one.
    ///
    /// Wraps on overflow; out-of-range addresses are rejected by the bounds
    /// checks at access time, not here.
    pub fn offset(self, n: u32) -> Addr {
        Addr(self.0.wrapping_add(n))
    }
}

impl core::fmt::Display for Addr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl From<u32> for Addr {
    fn from(v: u32) -> Self {
        Addr(v)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Faults raised by linear memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum MemoryError {
    /// Access of `len` bytes at `addr` falls outside the buffer
    #[error("out of bounds access of {len} bytes at {addr}")]
    OutOfBounds { addr: Addr, len: usize },
    /// A zero-terminated string starting at `addr` has no terminator
    /// before the end of the buffer
    #[error("no string terminator found after {addr}")]
    UnterminatedString { addr: Addr },
}

// ============================================================================
// Linear memory
// ============================================================================

/// The growable byte buffer representing a foreign module's address space.
pub struct LinearMemory {
    bytes: Vec<u8>,
}

macro_rules! scalar_accessors {
    ($read:ident, $write:ident, $ty:ty, $width:expr) => {
        /// Read a little-endian scalar at `addr`.
        pub fn $read(&self, addr: Addr) -> Result<$ty, MemoryError> {
            let start = self.check(addr, $width)?;
            let mut raw = [0u8; $width];
            raw.copy_from_slice(&self.bytes[start..start + $width]);
            Ok(<$ty>::from_le_bytes(raw))
        }

        /// Write a little-endian scalar at `addr`.
        pub fn $write(&mut self, addr: Addr, value: $ty) -> Result<(), MemoryError> {
            let start = self.check(addr, $width)?;
            self.bytes[start..start + $width].copy_from_slice(&value.to_le_bytes());
            Ok(())
        }
    };
}

impl LinearMemory {
    /// Create a zero-filled buffer of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len],
        }
    }

    /// Wrap an existing byte buffer.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Current buffer length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Grow the buffer by `additional` zero bytes.
    pub fn grow(&mut self, additional: usize) {
        self.bytes.resize(self.bytes.len() + additional, 0);
    }

    /// Bounds-check an access of `len` bytes at `addr`, returning the
    /// starting index into the buffer.
    fn check(&self, addr: Addr, len: usize) -> Result<usize, MemoryError> {
        let start = addr.0 as usize;
        let end = start.checked_add(len);
        match end {
            Some(end) if end <= self.bytes.len() => Ok(start),
            _ => Err(MemoryError::OutOfBounds { addr, len }),
        }
    }

    scalar_accessors!(read_u8, write_u8, u8, 1);
    scalar_accessors!(read_i8, write_i8, i8, 1);
    scalar_accessors!(read_u32, write_u32, u32, 4);
    scalar_accessors!(read_i32, write_i32, i32, 4);
    scalar_accessors!(read_f32, write_f32, f32, 4);
    scalar_accessors!(read_u64, write_u64, u64, 8);
    scalar_accessors!(read_i64, write_i64, i64, 8);

    /// Read a stored address (4 bytes, little-endian) at `addr`.
    pub fn read_addr(&self, addr: Addr) -> Result<Addr, MemoryError> {
        Ok(Addr(self.read_u32(addr)?))
    }

    /// Store an address (4 bytes, little-endian) at `addr`.
    pub fn write_addr(&mut self, addr: Addr, value: Addr) -> Result<(), MemoryError> {
        self.write_u32(addr, value.0)
    }

    /// Borrow `len` bytes starting at `addr`.
    pub fn bytes(&self, addr: Addr, len: usize) -> Result<&[u8], MemoryError> {
        let start = self.check(addr, len)?;
        Ok(&self.bytes[start..start + len])
    }

    /// Copy `data` into the buffer starting at `addr`.
    pub fn write_bytes(&mut self, addr: Addr, data: &[u8]) -> Result<(), MemoryError> {
        let start = self.check(addr, data.len())?;
        self.bytes[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Fill `len` bytes starting at `addr` with `byte`.
    pub fn fill(&mut self, addr: Addr, len: usize, byte: u8) -> Result<(), MemoryError> {
        let start = self.check(addr, len)?;
        self.bytes[start..start + len].fill(byte);
        Ok(())
    }

    /// Copy `len` bytes from `src` to `dst` within the buffer.
    pub fn copy(&mut self, dst: Addr, src: Addr, len: usize) -> Result<(), MemoryError> {
        let src_start = self.check(src, len)?;
        let dst_start = self.check(dst, len)?;
        self.bytes.copy_within(src_start..src_start + len, dst_start);
        Ok(())
    }

    /// Length in bytes of the zero-terminated string at `addr`.
    pub fn zstring_len(&self, addr: Addr) -> Result<usize, MemoryError> {
        let start = self.check(addr, 0)?;
        match self.bytes[start..].iter().position(|&b| b == 0) {
            Some(len) => Ok(len),
            None => Err(MemoryError::UnterminatedString { addr }),
        }
    }

    /// Decode the zero-terminated string at `addr` (terminator excluded).
    pub fn read_zstring(&self, addr: Addr) -> Result<String, MemoryError> {
        let len = self.zstring_len(addr)?;
        let raw = self.bytes(addr, len)?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }

    /// Decode exactly `len` bytes at `addr` as a string.
    pub fn read_sized_string(&self, addr: Addr, len: usize) -> Result<String, MemoryError> {
        let raw = self.bytes(addr, len)?;
        Ok(String::from_utf8_lossy(raw).into_owned())
    }
}
