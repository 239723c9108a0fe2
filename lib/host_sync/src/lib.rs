//!
//! @file lib.rs
//! @brief Synchronization primitives that overlay structures owned by the host.
//! @bug No known bugs.
//!
//! The host guards its shared engine state with a pair of hand-rolled lock
//! objects. Patches which redirect code around those objects must keep the
//! locking behavior intact, so these types reproduce the host semantics
//! exactly and are installed by constructing them in place over the original
//! structure. That overlay is what makes the layout a hard requirement:
//! every type here is #[repr(C)] with a compile-time size assertion, and
//! growing one of them past the footprint of the structure it replaces is
//! a build error, not a runtime surprise.
//!

mod tid;
mod spin;
mod rw;

pub use spin::SpinLock;
pub use rw::{ReadWriteLock, AutoWriteLock};
