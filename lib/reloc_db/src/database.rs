//!
//! @file database.rs
//! @brief The per-version relocation database and its packed file format.
//! @bug No known bugs.
//!
//! The packed format is deliberately dull: fixed-width little-endian
//! integers, length-prefixed strings, no padding. It stays byte-identical
//! across the tool and the loaded module, and diffs cleanly between
//! versions of the database.
//!
//! Layout:
//! - u32 magic "RDB1"
//! - u32 format revision (currently 1)
//! - u32 bound host version (packed)
//! - u32 item count, then per item:
//!   - u32 name length, name bytes
//!   - u64 created, u64 updated (unix seconds)
//!   - u32 source length, source bytes
//!   - u32 entry count, then per entry:
//!     - u32 host version (packed)
//!     - u64 module-relative offset
//!     - u8 kind
//!     - u32 payload length, payload bytes
//!

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use host_common::version::RuntimeVersion;

use crate::entry::{RelocKind, RelocationEntry};
use crate::error::{Error, Result};
use crate::item::RelocationDatabaseItem;

const FILE_MAGIC: u32 = u32::from_le_bytes(*b"RDB1");
const FILE_FORMAT: u32 = 1;

// Caps applied while loading, so a corrupt length prefix fails cleanly
// instead of attempting an absurd allocation.
const MAX_STRING_LEN: u32 = 0x10000;
const MAX_PAYLOAD_LEN: u32 = 0x100000;

///
/// The full set of named patch descriptors for one host version.
///
/// Insertion order is preserved so that serialization is deterministic;
/// lookup goes through a name index. Mutation is only expected during the
/// single-threaded initialization phase or inside the developer tool, so
/// the database carries no locking of its own.
///
pub struct RelocationDatabase {
    version: RuntimeVersion,
    items: Vec<RelocationDatabaseItem>,
    index: HashMap<String, usize>
}

impl RelocationDatabase {
    /// Creates a fresh, empty database bound to the given host version.
    pub fn create(
        version: RuntimeVersion
    ) -> Self {
        Self {
            version,
            items: Vec::new(),
            index: HashMap::new()
        }
    }

    /// Gets the deterministic file name for the given host version.
    pub fn file_name(
        version: RuntimeVersion
    ) -> String {
        format!(
            "relocations-{}-{}-{}-{}.rdb",
            version.major(),
            version.minor(),
            version.build(),
            version.variant()
        )
    }

    /// Gets the database path for the given host version inside a directory.
    pub fn path_in(
        dir: &Path,
        version: RuntimeVersion
    ) -> PathBuf {
        dir.join(Self::file_name(version))
    }

    ///
    /// Loads the database bound to the given host version from a directory.
    ///
    /// Every structural problem fails the whole load; see the error type
    /// for the rationale.
    ///
    pub fn open(
        dir: &Path,
        version: RuntimeVersion
    ) -> Result<Self> {
        let mut f = BufReader::new(File::open(Self::path_in(dir, version))?);

        let magic = read_u32(&mut f)?;
        if magic != FILE_MAGIC {
            return Err(Error::BadMagic(magic));
        }

        let format = read_u32(&mut f)?;
        if format != FILE_FORMAT {
            return Err(Error::UnsupportedFormat(format));
        }

        let bound = read_u32(&mut f)?;
        if bound == 0 {
            return Err(Error::Corrupt("header carries a null version tag"));
        }

        let bound = RuntimeVersion::from_raw(bound);
        if bound != version {
            return Err(Error::VersionMismatch { expected: version, found: bound });
        }

        let mut this = Self::create(version);
        let item_count = read_u32(&mut f)?;
        for _ in 0..item_count {
            let item = read_item(&mut f)?;
            if this.index.contains_key(item.name()) {
                return Err(Error::Corrupt("duplicate item name"));
            }
            this.index.insert(item.name().to_string(), this.items.len());
            this.items.push(item);
        }

        // Anything after the last record means the count lied.
        if f.read(&mut [0u8; 1])? != 0 {
            return Err(Error::Corrupt("trailing data after the last record"));
        }

        Ok(this)
    }

    ///
    /// Persists the database into the given directory.
    ///
    /// The file is written to a sibling temp path and renamed over the
    /// destination, so a crash mid-write never truncates the previous
    /// database.
    ///
    pub fn save(
        &self,
        dir: &Path
    ) -> Result<()> {
        // The load-side caps bind the save side too; an oversized field
        // would produce a file that can never be reopened.
        for item in self.items.iter() {
            check_storable(item)?;
        }

        std::fs::create_dir_all(dir)?;

        let path = Self::path_in(dir, self.version);
        let tmp = path.with_extension("rdb.tmp");

        {
            let mut f = BufWriter::new(File::create(&tmp)?);
            write_u32(&mut f, FILE_MAGIC)?;
            write_u32(&mut f, FILE_FORMAT)?;
            write_u32(&mut f, self.version.raw())?;
            write_u32(&mut f, self.items.len() as u32)?;
            for item in self.items.iter() {
                write_item(&mut f, item)?;
            }
            f.flush()?;
        }

        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Gets the host version this database is bound to.
    pub fn version(
        &self
    ) -> RuntimeVersion {
        self.version
    }

    /// Looks up an item by its case-sensitive name. Never mutates.
    pub fn get_by_name(
        &self,
        name: &str
    ) -> Option<&RelocationDatabaseItem> {
        self.index.get(name).map(|i| &self.items[*i])
    }

    ///
    /// Inserts a new item.
    ///
    /// Names are immutable once created: a duplicate name is rejected and
    /// the original item is left untouched.
    ///
    pub fn append(
        &mut self,
        item: RelocationDatabaseItem
    ) -> Result<&RelocationDatabaseItem> {
        if self.index.contains_key(item.name()) {
            return Err(Error::DuplicateName(item.name().to_string()));
        }

        let slot = self.items.len();
        self.index.insert(item.name().to_string(), slot);
        self.items.push(item);
        Ok(&self.items[slot])
    }

    ///
    /// Replaces the entries of an existing item with those of the given
    /// item, preserving its identity and creation time.
    ///
    /// This is the developer workflow's mutation path; the loaded module
    /// never calls it.
    ///
    pub fn update(
        &mut self,
        item: RelocationDatabaseItem
    ) -> Result<&RelocationDatabaseItem> {
        let slot = *self.index.get(item.name())
            .ok_or_else(|| Error::MissingItem(item.name().to_string()))?;

        let source = item.source().to_string();
        self.items[slot].replace_entries(item.entries().to_vec(), &source);
        Ok(&self.items[slot])
    }

    /// Gets every item, in insertion order.
    pub fn items(
        &self
    ) -> &[RelocationDatabaseItem] {
        &self.items
    }

    /// Gets the number of items.
    pub fn len(
        &self
    ) -> usize {
        self.items.len()
    }

    /// Checks if the database holds no items.
    pub fn is_empty(
        &self
    ) -> bool {
        self.items.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Wire helpers
////////////////////////////////////////////////////////////////////////////////////////////////////

fn read_u8(
    f: &mut impl Read
) -> Result<u8> {
    let mut b = [0u8; 1];
    f.read_exact(&mut b)?;
    Ok(b[0])
}

fn read_u32(
    f: &mut impl Read
) -> Result<u32> {
    let mut b = [0u8; 4];
    f.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64(
    f: &mut impl Read
) -> Result<u64> {
    let mut b = [0u8; 8];
    f.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

fn read_bytes(
    f: &mut impl Read,
    len: u32,
    cap: u32,
    what: &'static str
) -> Result<Vec<u8>> {
    if len > cap {
        return Err(Error::Corrupt(what));
    }

    let mut buf = vec![0u8; len as usize];
    f.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_string(
    f: &mut impl Read,
    what: &'static str
) -> Result<String> {
    let len = read_u32(f)?;
    let bytes = read_bytes(f, len, MAX_STRING_LEN, what)?;
    String::from_utf8(bytes).map_err(|_| Error::Corrupt(what))
}

fn read_item(
    f: &mut impl Read
) -> Result<RelocationDatabaseItem> {
    let name = read_string(f, "item name is unreadable")?;
    let created = read_u64(f)?;
    let updated = read_u64(f)?;
    let source = read_string(f, "item source annotation is unreadable")?;

    let entry_count = read_u32(f)?;
    let mut entries = Vec::new();
    for _ in 0..entry_count {
        let version = read_u32(f)?;
        if version == 0 {
            return Err(Error::Corrupt("entry carries a null version tag"));
        }

        let offset = read_u64(f)?;
        let kind = RelocKind::from_wire(read_u8(f)?)?;
        let payload_len = read_u32(f)?;
        let payload = read_bytes(f, payload_len, MAX_PAYLOAD_LEN, "entry payload is oversized")?;

        entries.push(RelocationEntry::from_parts(
            RuntimeVersion::from_raw(version),
            offset,
            kind,
            payload
        ));
    }

    Ok(RelocationDatabaseItem::from_parts(name, created, updated, source, entries))
}

fn check_storable(
    item: &RelocationDatabaseItem
) -> Result<()> {
    if item.name().len() > MAX_STRING_LEN as usize {
        return Err(Error::Oversized("item name"));
    }
    if item.source().len() > MAX_STRING_LEN as usize {
        return Err(Error::Oversized("item source annotation"));
    }
    for entry in item.entries() {
        if entry.payload().len() > MAX_PAYLOAD_LEN as usize {
            return Err(Error::Oversized("entry payload"));
        }
    }
    Ok(())
}

fn write_u32(
    f: &mut impl Write,
    v: u32
) -> Result<()> {
    f.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_u64(
    f: &mut impl Write,
    v: u64
) -> Result<()> {
    f.write_all(&v.to_le_bytes())?;
    Ok(())
}

fn write_string(
    f: &mut impl Write,
    s: &str
) -> Result<()> {
    write_u32(f, s.len() as u32)?;
    f.write_all(s.as_bytes())?;
    Ok(())
}

fn write_item(
    f: &mut impl Write,
    item: &RelocationDatabaseItem
) -> Result<()> {
    write_string(f, item.name())?;
    write_u64(f, item.created())?;
    write_u64(f, item.updated())?;
    write_string(f, item.source())?;

    write_u32(f, item.len() as u32)?;
    for entry in item.entries() {
        write_u32(f, entry.version().raw())?;
        write_u64(f, entry.offset())?;
        f.write_all(&[entry.kind() as u8])?;
        write_u32(f, entry.payload().len() as u32)?;
        f.write_all(entry.payload())?;
    }

    Ok(())
}
