//!
//! @file memory.rs
//! @brief Low-level, reversible edits to the loaded host image.
//! @bug No known bugs.
//!
//! Every edit funnels through one helper that temporarily reopens the page
//! protection around the target range. Edits capture the bytes they
//! overwrite, so a unit can be disabled again and a clobbered patch can be
//! detected after the fact.
//!

use crate::error::PatchError;

/// Size of an emitted rel32 call/jump instruction.
const FLOW_SIZE: usize = 5;

/// The control flow instruction to emit at a redirect site.
#[derive(Copy, Clone)]
pub(crate) enum Flow {
    CallRelative,
    JumpRelative
}

///
/// One edit that has been written to the host image.
///
/// Holds the bytes the edit replaced; dropping it forgets them, making the
/// edit permanent for the session.
///
pub struct AppliedEdit {
    addr: usize,
    original: Vec<u8>,
    replacement: Vec<u8>
}

/// Temporarily marks the given memory region writable, then calls func.
unsafe fn use_region<R>(
    addr: usize,
    size: usize,
    func: impl FnOnce() -> R
) -> Result<R, PatchError> {
    let _guard = region::protect_with_handle(
        addr as *const u8,
        size,
        region::Protection::READ_WRITE_EXECUTE
    )?;
    Ok(func())
}

///
/// Overwrites the bytes at the given address, returning the undo record.
///
/// In order to use this function safely, the address range must be inside
/// the loaded host image (or otherwise owned by the caller) and free of
/// concurrent execution of the bytes being replaced.
///
pub(crate) unsafe fn write_bytes(
    addr: usize,
    bytes: &[u8]
) -> Result<AppliedEdit, PatchError> {
    let mut original = vec![0u8; bytes.len()];
    use_region(addr, bytes.len(), || {
        std::ptr::copy(addr as *const u8, original.as_mut_ptr(), bytes.len());
        std::ptr::copy(bytes.as_ptr(), addr as *mut u8, bytes.len());
    })?;

    Ok(AppliedEdit {
        addr,
        original,
        replacement: bytes.to_vec()
    })
}

///
/// Writes a call or jump at the given site, redirecting control to target.
///
/// The same safety requirements as write_bytes apply.
///
pub(crate) unsafe fn write_flow(
    site: usize,
    target: usize,
    flow: Flow
) -> Result<AppliedEdit, PatchError> {
    write_bytes(site, &flow_bytes(site, target, flow)?)
}

/// Encodes a rel32 call/jump, checking that the displacement fits.
fn flow_bytes(
    site: usize,
    target: usize,
    flow: Flow
) -> Result<[u8; FLOW_SIZE], PatchError> {
    let rel = (target as i64).wrapping_sub(site as i64 + FLOW_SIZE as i64);
    let rel: i32 = rel.try_into().map_err(|_| PatchError::RedirectRange { site, target })?;

    let mut buf = [0u8; FLOW_SIZE];
    buf[0] = match flow {
        Flow::CallRelative => 0xe8,
        Flow::JumpRelative => 0xe9
    };
    buf[1..].copy_from_slice(&rel.to_le_bytes());
    Ok(buf)
}

impl AppliedEdit {
    /// Assembles an edit record directly, without writing anything.
    #[cfg(test)]
    pub(crate) fn assembled(
        addr: usize,
        original: Vec<u8>,
        replacement: Vec<u8>
    ) -> Self {
        Self { addr, original, replacement }
    }

    /// Gets the address this edit was written to.
    pub fn addr(
        &self
    ) -> usize {
        self.addr
    }

    ///
    /// Puts the original bytes back.
    ///
    /// In order to use this function safely, the edited range must still be
    /// valid memory.
    ///
    pub(crate) unsafe fn revert(
        &self
    ) -> Result<(), PatchError> {
        use_region(self.addr, self.original.len(), || {
            std::ptr::copy(self.original.as_ptr(), self.addr as *mut u8, self.original.len());
        })
    }

    ///
    /// Checks that the edit is still in place and has not been clobbered
    /// by a conflicting patch.
    ///
    /// The same safety requirements as revert apply.
    ///
    pub(crate) unsafe fn is_intact(
        &self
    ) -> Result<bool, PatchError> {
        use_region(self.addr, self.replacement.len(), || {
            let code = std::slice::from_raw_parts(self.addr as *const u8, self.replacement.len());
            code == self.replacement.as_slice()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rel32_encoding_is_exact() {
        // 0x2000 - (0x1000 + 5) = 0xffb.
        let buf = flow_bytes(0x1000, 0x2000, Flow::JumpRelative).unwrap();
        assert_eq!(buf, [0xe9, 0xfb, 0x0f, 0x00, 0x00]);

        let buf = flow_bytes(0x2000, 0x1000, Flow::CallRelative).unwrap();
        assert_eq!(buf[0], 0xe8);
        assert_eq!(i32::from_le_bytes(buf[1..].try_into().unwrap()), -0x1005);
    }

    #[test]
    fn out_of_range_redirect_is_rejected() {
        assert!(matches!(
            flow_bytes(0, 0x1_0000_0000, Flow::JumpRelative),
            Err(PatchError::RedirectRange { .. })
        ));
    }

    #[test]
    fn write_then_revert_restores_the_original() {
        let mut buf = vec![0xccu8; 64];
        let addr = buf.as_mut_ptr() as usize + 8;

        let edit = unsafe { write_bytes(addr, &[0x90, 0x90, 0x90]) }.unwrap();
        assert_eq!(&buf[8..11], &[0x90, 0x90, 0x90]);
        assert!(unsafe { edit.is_intact() }.unwrap());

        buf[9] = 0x42;
        assert!(!unsafe { edit.is_intact() }.unwrap());

        unsafe { edit.revert() }.unwrap();
        assert_eq!(&buf[8..11], &[0xcc, 0xcc, 0xcc]);
    }
}
