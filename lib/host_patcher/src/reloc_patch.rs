//!
//! @file reloc_patch.rs
//! @brief The stock patch unit: apply every database entry of one item.
//! @bug No known bugs.
//!

use host_common::reloc::RelocAddr;
use host_common::version::RuntimeVersion;
use reloc_db::{RelocKind, RelocationDatabase};

use crate::error::PatchError;
use crate::memory::{self, AppliedEdit, Flow};
use crate::unit::{Compat, PatchUnit};

/// One edit resolved against the running version, not yet written.
enum PlannedEdit {
    Bytes { addr: usize, payload: Vec<u8> },
    Call { site: usize, target: usize },
    Jump { site: usize, target: usize }
}

///
/// A patch unit driven entirely by the relocation database.
///
/// Query materializes the entries of the named item for the running host
/// version and resolves them to live addresses; enable writes them in
/// order, keeping undo records so disable can restore the image.
///
/// The activation hook is how the configuration collaborator switches
/// individual features off: a disabled unit reports itself incompatible
/// and is skipped gracefully instead of failing.
///
pub struct RelocationPatch {
    item: String,
    enabled: fn() -> bool,
    planned: Vec<PlannedEdit>,
    applied: Vec<AppliedEdit>
}

impl RelocationPatch {
    /// Creates an always-active unit over the named database item.
    pub fn new(
        item: &str
    ) -> Self {
        Self::with_activation(item, || true)
    }

    /// Creates a unit whose activation is decided by the given hook.
    pub fn with_activation(
        item: &str,
        enabled: fn() -> bool
    ) -> Self {
        Self {
            item: item.to_string(),
            enabled,
            planned: Vec::new(),
            applied: Vec::new()
        }
    }

    /// Gets the number of edits applied by the last enable.
    pub fn applied_len(
        &self
    ) -> usize {
        self.applied.len()
    }

    ///
    /// Checks that every applied edit is still in place.
    ///
    /// A false result means a conflicting patch clobbered this one after
    /// it was installed.
    ///
    pub fn is_intact(
        &self
    ) -> Result<bool, PatchError> {
        for edit in self.applied.iter() {
            // SAFETY: The edit was applied to the host image this session.
            if !unsafe { edit.is_intact() }? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl PatchUnit for RelocationPatch {
    fn name(
        &self
    ) -> &str {
        &self.item
    }

    fn query(
        &mut self,
        db: &RelocationDatabase,
        version: RuntimeVersion
    ) -> Result<Compat, PatchError> {
        if !(self.enabled)() {
            return Ok(Compat::Incompatible);
        }

        let item = match db.get_by_name(&self.item) {
            Some(item) => item,
            None => return Ok(Compat::Incompatible)
        };

        let mut planned = Vec::new();
        for entry in item.entries_for(version) {
            let site = RelocAddr::from_offset(entry.offset() as usize).addr();
            let edit = match entry.kind() {
                RelocKind::Patch => PlannedEdit::Bytes {
                    addr: site,
                    payload: entry.payload().to_vec()
                },
                RelocKind::Call => PlannedEdit::Call {
                    site,
                    target: entry.redirect_target()
                        .ok_or(PatchError::BadRedirect(entry.offset()))?
                        .addr()
                },
                RelocKind::Jump => PlannedEdit::Jump {
                    site,
                    target: entry.redirect_target()
                        .ok_or(PatchError::BadRedirect(entry.offset()))?
                        .addr()
                }
            };
            planned.push(edit);
        }

        if planned.is_empty() {
            return Ok(Compat::Incompatible);
        }

        self.planned = planned;
        Ok(Compat::Compatible)
    }

    fn enable(
        &mut self
    ) -> Result<(), PatchError> {
        debug_assert!(self.applied.is_empty());

        for edit in self.planned.iter() {
            // SAFETY: The database bound to the running version resolved
            //         these addresses inside the loaded host image.
            let res = unsafe {
                match edit {
                    PlannedEdit::Bytes { addr, payload } => {
                        memory::write_bytes(*addr, payload)
                    },
                    PlannedEdit::Call { site, target } => {
                        memory::write_flow(*site, *target, Flow::CallRelative)
                    },
                    PlannedEdit::Jump { site, target } => {
                        memory::write_flow(*site, *target, Flow::JumpRelative)
                    }
                }
            };

            match res {
                Ok(applied) => self.applied.push(applied),
                Err(e) => {
                    // Unwind this unit's partial work; siblings are not
                    // affected either way.
                    while let Some(applied) = self.applied.pop() {
                        // SAFETY: We just wrote this edit.
                        let _ = unsafe { applied.revert() };
                    }
                    return Err(e);
                }
            }
        }

        Ok(())
    }

    fn disable(
        &mut self
    ) -> Result<(), PatchError> {
        // Pop only after a successful revert, so a failure keeps the undo
        // record for a later retry.
        while let Some(applied) = self.applied.last() {
            // SAFETY: The edit was applied to the host image this session.
            unsafe { applied.revert()?; }
            self.applied.pop();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use host_common::version::{RUNTIME_VERSION_1_5_73, RUNTIME_VERSION_1_6_438};
    use reloc_db::{RelocationDatabaseItem, RelocationEntry};

    fn db_with(
        item: RelocationDatabaseItem
    ) -> RelocationDatabase {
        let mut db = RelocationDatabase::create(RUNTIME_VERSION_1_6_438);
        db.append(item).unwrap();
        db
    }

    #[test]
    fn missing_item_is_incompatible() {
        let db = RelocationDatabase::create(RUNTIME_VERSION_1_6_438);
        let mut unit = RelocationPatch::new("Absent");
        let compat = unit.query(&db, RUNTIME_VERSION_1_6_438).unwrap();
        assert_eq!(compat, Compat::Incompatible);
    }

    #[test]
    fn wrong_version_entries_are_incompatible() {
        let mut item = RelocationDatabaseItem::new("OldOnly");
        item.push(RelocationEntry::patch(RUNTIME_VERSION_1_5_73, 0x10, vec![0x90]));
        let db = db_with(item);

        let mut unit = RelocationPatch::new("OldOnly");
        let compat = unit.query(&db, RUNTIME_VERSION_1_6_438).unwrap();
        assert_eq!(compat, Compat::Incompatible);
    }

    #[test]
    fn matching_entries_are_compatible() {
        let mut item = RelocationDatabaseItem::new("Fix");
        item.push(RelocationEntry::patch(RUNTIME_VERSION_1_6_438, 0x10, vec![0x90]));
        let db = db_with(item);

        let mut unit = RelocationPatch::new("Fix");
        let compat = unit.query(&db, RUNTIME_VERSION_1_6_438).unwrap();
        assert_eq!(compat, Compat::Compatible);
    }

    #[test]
    fn deactivated_unit_is_incompatible() {
        let mut item = RelocationDatabaseItem::new("Fix");
        item.push(RelocationEntry::patch(RUNTIME_VERSION_1_6_438, 0x10, vec![0x90]));
        let db = db_with(item);

        let mut unit = RelocationPatch::with_activation("Fix", || false);
        let compat = unit.query(&db, RUNTIME_VERSION_1_6_438).unwrap();
        assert_eq!(compat, Compat::Incompatible);
    }

    #[test]
    fn failed_disable_keeps_the_undo_records() {
        let mut buf = vec![0xccu8; 32];
        let good = unsafe {
            memory::write_bytes(buf.as_mut_ptr() as usize, &[0x90])
        }.unwrap();

        // The null page is never mapped, so reverting this edit fails.
        let bad = AppliedEdit::assembled(0x8, vec![0xcc], vec![0x90]);

        let mut unit = RelocationPatch::new("Clobbered");
        unit.applied = vec![good, bad];

        assert!(unit.disable().is_err());
        assert_eq!(unit.applied_len(), 2);
        assert_eq!(buf[0], 0x90);

        // A later retry can still unwind the intact records.
        unit.applied.pop();
        unit.disable().unwrap();
        assert_eq!(unit.applied_len(), 0);
        assert_eq!(buf[0], 0xcc);
    }

    #[test]
    fn empty_placeholder_item_is_incompatible() {
        let db = db_with(RelocationDatabaseItem::new("Placeholder"));
        let mut unit = RelocationPatch::new("Placeholder");
        let compat = unit.query(&db, RUNTIME_VERSION_1_6_438).unwrap();
        assert_eq!(compat, Compat::Incompatible);
    }
}
