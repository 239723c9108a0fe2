//!
//! @file error.rs
//! @brief Error taxonomy for database load, store, and interchange.
//! @bug No known bugs.
//!

use host_common::version::RuntimeVersion;

///
/// Why a database operation failed.
///
/// Any structural problem with the packed file fails the whole load: a
/// partially loaded database could hand out wrong offsets, which is far
/// worse than refusing to patch at all.
///
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a relocation database (bad magic {0:#010x})")]
    BadMagic(u32),

    #[error("unsupported database format {0}")]
    UnsupportedFormat(u32),

    #[error("database is bound to version {found}, expected {expected}")]
    VersionMismatch {
        expected: RuntimeVersion,
        found: RuntimeVersion
    },

    #[error("database file is corrupt: {0}")]
    Corrupt(&'static str),

    #[error("field too large for the file format: {0}")]
    Oversized(&'static str),

    #[error("unknown relocation kind {0}")]
    UnknownKind(u8),

    #[error("item \"{0}\" already exists in the database")]
    DuplicateName(String),

    #[error("item \"{0}\" is not in the database")]
    MissingItem(String),

    #[error("{path}:{line}: {reason}")]
    Developed {
        path: String,
        line: usize,
        reason: String
    }
}

pub type Result<T> = std::result::Result<T, Error>;
