//!
//! @file unit.rs
//! @brief The capability interface every patch unit implements.
//! @bug No known bugs.
//!

use host_common::version::RuntimeVersion;
use reloc_db::RelocationDatabase;

use crate::error::PatchError;

/// The result of a successful query step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Compat {
    Compatible,
    Incompatible
}

///
/// Where a unit is in its session lifecycle.
///
/// Registered -> Compatible/Incompatible happens once per session. A
/// compatible unit is enabled at most once, after which it may bounce
/// between Enabled and Disabled freely. Failed is terminal for the session
/// and never affects sibling units.
///
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UnitState {
    Registered,
    Compatible,
    Incompatible,
    Enabled,
    Disabled,
    Failed
}

///
/// One independently activatable feature.
///
/// Implementations are flat: one struct per feature behind this interface,
/// registered with the manager in dependency order. Query must be a pure
/// decision over the database and version; only enable may touch host
/// memory.
///
pub trait PatchUnit: Send {
    /// Gets the display name of the unit.
    fn name(&self) -> &str;

    /// Decides whether this unit supports the running host.
    fn query(
        &mut self,
        db: &RelocationDatabase,
        version: RuntimeVersion
    ) -> Result<Compat, PatchError>;

    /// Performs the memory edits. Only called after a compatible query.
    fn enable(&mut self) -> Result<(), PatchError>;

    /// Undoes the memory edits of a previous enable.
    fn disable(&mut self) -> Result<(), PatchError>;
}

impl std::fmt::Display for UnitState {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>
    ) -> Result<(), std::fmt::Error> {
        let s = match self {
            Self::Registered => "registered",
            Self::Compatible => "compatible",
            Self::Incompatible => "incompatible",
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
            Self::Failed => "failed"
        };
        f.write_str(s)
    }
}
