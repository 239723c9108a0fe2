//!
//! @file entry.rs
//! @brief One concrete, version-qualified memory edit.
//! @bug No known bugs.
//!

use host_common::version::RuntimeVersion;
use host_common::reloc::RelocAddr;

use crate::error::{Error, Result};

/// How an entry edits the host image.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RelocKind {
    /// Overwrite the bytes at the offset with the payload.
    Patch = 0,
    /// Install a call to the payload target at the offset.
    Call = 1,
    /// Install a jump to the payload target at the offset.
    Jump = 2
}

///
/// One relocation: a host version, a module-relative offset, and the edit
/// to make there.
///
/// Entries are immutable once constructed; the owning item is the only
/// thing that ever holds them.
///
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelocationEntry {
    version: RuntimeVersion,
    offset: u64,
    kind: RelocKind,
    payload: Vec<u8>
}

impl RelocKind {
    /// Decodes the on-disk kind byte.
    pub(crate) fn from_wire(
        v: u8
    ) -> Result<Self> {
        match v {
            0 => Ok(Self::Patch),
            1 => Ok(Self::Call),
            2 => Ok(Self::Jump),
            _ => Err(Error::UnknownKind(v))
        }
    }

    /// Gets the keyword used for this kind in developer files.
    pub fn keyword(
        self
    ) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Call => "call",
            Self::Jump => "jump"
        }
    }

    /// Parses a developer file keyword.
    pub fn from_keyword(
        s: &str
    ) -> Option<Self> {
        match s {
            "patch" => Some(Self::Patch),
            "call" => Some(Self::Call),
            "jump" => Some(Self::Jump),
            _ => None
        }
    }
}

impl RelocationEntry {
    /// Creates a byte patch entry.
    pub fn patch(
        version: RuntimeVersion,
        offset: u64,
        payload: Vec<u8>
    ) -> Self {
        Self { version, offset, kind: RelocKind::Patch, payload }
    }

    /// Creates a control flow redirect entry.
    pub fn redirect(
        version: RuntimeVersion,
        offset: u64,
        kind: RelocKind,
        target: RelocAddr
    ) -> Self {
        assert!(!matches!(kind, RelocKind::Patch));
        Self {
            version,
            offset,
            kind,
            payload: (target.offset() as u64).to_le_bytes().to_vec()
        }
    }

    /// Reassembles an entry from its serialized parts.
    pub(crate) fn from_parts(
        version: RuntimeVersion,
        offset: u64,
        kind: RelocKind,
        payload: Vec<u8>
    ) -> Self {
        Self { version, offset, kind, payload }
    }

    /// Gets the host version this entry applies to.
    pub fn version(
        &self
    ) -> RuntimeVersion {
        self.version
    }

    /// Gets the module-relative offset of the edit.
    pub fn offset(
        &self
    ) -> u64 {
        self.offset
    }

    /// Gets the edit kind.
    pub fn kind(
        &self
    ) -> RelocKind {
        self.kind
    }

    /// Gets the raw payload bytes.
    pub fn payload(
        &self
    ) -> &[u8] {
        &self.payload
    }

    ///
    /// Gets the redirect target of a control flow entry.
    ///
    /// Returns None for byte patches and for redirect entries whose payload
    /// is not the expected eight byte offset.
    ///
    pub fn redirect_target(
        &self
    ) -> Option<RelocAddr> {
        if matches!(self.kind, RelocKind::Patch) {
            return None;
        }

        let bytes: [u8; 8] = self.payload.as_slice().try_into().ok()?;
        Some(RelocAddr::from_offset(u64::from_le_bytes(bytes) as usize))
    }
}
