//!
//! @file reloc.rs
//! @brief Exposes a type to disambiguate between offsets and addresses.
//! @bug No known bugs.
//!

use std::sync::OnceLock;

/// The address the host prefers to load at, used before the base is resolved.
const DEFAULT_BASE: usize = 0x140000000;

/// Holds a host image address, which can be accessed by offset or address.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct RelocAddr(usize);

/// Holds the base address of the loaded host image.
static BASE_ADDR: OnceLock<usize> = OnceLock::new();

///
/// Installs the base address of the host image.
///
/// Called once by the module loader; a second call is ignored and reported
/// so the caller can diagnose a double initialization.
///
pub fn set_base(
    base: usize
) -> bool {
    BASE_ADDR.set(base).is_ok()
}

impl RelocAddr {
    /// Gets the base address of the host image.
    pub fn base() -> usize {
        *BASE_ADDR.get().unwrap_or(&DEFAULT_BASE)
    }

    /// Creates a reloc addr from an offset.
    pub const fn from_offset(
        offset: usize
    ) -> Self {
        Self(offset)
    }

    /// Creates a reloc addr from an address.
    pub fn from_addr(
        addr: usize
    ) -> Self {
        assert!(Self::base() <= addr);
        Self(addr - Self::base())
    }

    /// Gets the underlying offset of the RelocAddr.
    pub const fn offset(
        self
    ) -> usize {
        self.0
    }

    /// Gets the actual address of the RelocAddr.
    pub fn addr(
        self
    ) -> usize {
        Self::base() + self.0
    }
}

impl std::ops::Add<usize> for RelocAddr {
    type Output = Self;
    fn add(
        self,
        rhs: usize
    ) -> Self::Output {
        Self(self.0 + rhs)
    }
}
