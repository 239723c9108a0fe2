//!
//! @file lib.rs
//! @brief Registers patch units and drives them through their lifecycle.
//! @bug No known bugs.
//!
//! The manager half of the system. Patch units describe independently
//! activatable features; the manager queries each one against the running
//! host version and the relocation database, then enables the compatible
//! subset by editing the loaded image in place. The two-phase split matters:
//! every unit reports its compatibility before the first irreversible write
//! happens, and a unit that fails is isolated so its siblings still run.
//!

mod error;
mod unit;
mod memory;
mod reloc_patch;
mod manager;
mod engine;

pub use error::PatchError;
pub use unit::{Compat, UnitState, PatchUnit};
pub use memory::AppliedEdit;
pub use reloc_patch::RelocationPatch;
pub use manager::{PatchManager, UnitReport};
pub use engine::Engine;
