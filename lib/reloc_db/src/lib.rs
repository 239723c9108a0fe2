//!
//! @file lib.rs
//! @brief Persistent database of per-version relocation patches.
//! @bug No known bugs.
//!
//! Patching a closed-source host that ships incompatible binaries from one
//! release to the next only stays manageable if the knowledge of *where* to
//! patch lives outside the code. This crate owns that knowledge: a named
//! collection of relocation entries, each qualified by the host version it
//! applies to, persisted in a packed little-endian file per version.
//!
//! Two external representations exist. The packed database file is what the
//! loaded module reads at startup. The developer file is a line-oriented
//! text form of a single item, used to author new entries and to extract
//! existing ones for inspection; load and save of that form are exact
//! inverses of each other.
//!

mod error;
mod entry;
mod item;
mod database;
mod developed;

pub use error::{Error, Result};
pub use entry::{RelocKind, RelocationEntry};
pub use item::RelocationDatabaseItem;
pub use database::RelocationDatabase;
