//!
//! @file item.rs
//! @brief A named, ordered collection of relocation entries.
//! @bug No known bugs.
//!

use std::time::{SystemTime, UNIX_EPOCH};

use host_common::version::RuntimeVersion;

use crate::entry::RelocationEntry;

///
/// One patch descriptor: the entries for a named patch across every host
/// version the database knows about.
///
/// An item with zero entries is a valid placeholder; the developer workflow
/// creates it empty, populates it from a developer file, then persists it.
/// The name is the lookup key and never changes once the item exists.
///
#[derive(Clone, Debug)]
pub struct RelocationDatabaseItem {
    name: String,
    created: u64,
    updated: u64,
    source: String,
    entries: Vec<RelocationEntry>
}

/// Unix timestamp, in seconds. Zero if the clock is set before the epoch.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl RelocationDatabaseItem {
    /// Creates a new, empty, item.
    pub fn new(
        name: &str
    ) -> Self {
        let now = unix_now();
        Self {
            name: name.to_string(),
            created: now,
            updated: now,
            source: String::new(),
            entries: Vec::new()
        }
    }

    /// Reassembles an item from its serialized parts.
    pub(crate) fn from_parts(
        name: String,
        created: u64,
        updated: u64,
        source: String,
        entries: Vec<RelocationEntry>
    ) -> Self {
        Self { name, created, updated, source, entries }
    }

    /// Gets the lookup name of this item.
    pub fn name(
        &self
    ) -> &str {
        &self.name
    }

    /// Gets the creation timestamp, in unix seconds.
    pub fn created(
        &self
    ) -> u64 {
        self.created
    }

    /// Gets the last-update timestamp, in unix seconds.
    pub fn updated(
        &self
    ) -> u64 {
        self.updated
    }

    /// Gets the annotation recording where the entries came from.
    pub fn source(
        &self
    ) -> &str {
        &self.source
    }

    /// Records where the entries came from.
    pub fn set_source(
        &mut self,
        source: &str
    ) {
        self.source = source.to_string();
        self.updated = unix_now();
    }

    /// Checks if this item holds no entries.
    pub fn is_empty(
        &self
    ) -> bool {
        self.entries.is_empty()
    }

    /// Gets the number of entries across all versions.
    pub fn len(
        &self
    ) -> usize {
        self.entries.len()
    }

    /// Gets every entry, in insertion order.
    pub fn entries(
        &self
    ) -> &[RelocationEntry] {
        &self.entries
    }

    ///
    /// Gets the entries that apply to the given host version.
    ///
    /// This is the materialization step patch units go through: entries
    /// qualified for other versions are tolerated at rest but never handed
    /// to a live session.
    ///
    pub fn entries_for(
        &self,
        version: RuntimeVersion
    ) -> impl Iterator<Item = &RelocationEntry> {
        self.entries.iter().filter(move |e| e.version() == version)
    }

    /// Appends an entry, bumping the update timestamp.
    pub fn push(
        &mut self,
        entry: RelocationEntry
    ) {
        self.entries.push(entry);
        self.updated = unix_now();
    }

    /// Replaces the entry list wholesale, bumping the update timestamp.
    pub(crate) fn replace_entries(
        &mut self,
        entries: Vec<RelocationEntry>,
        source: &str
    ) {
        self.entries = entries;
        self.source = source.to_string();
        self.updated = unix_now();
    }
}
