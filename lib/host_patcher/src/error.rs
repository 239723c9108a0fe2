//!
//! @file error.rs
//! @brief Why a patch unit could not be queried or installed.
//! @bug No known bugs.
//!

/// A per-unit failure. Never fatal to sibling units.
#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("database error: {0}")]
    Db(#[from] reloc_db::Error),

    #[error("memory protection change failed: {0}")]
    Protect(#[from] region::Error),

    #[error("redirect from {site:#x} to {target:#x} does not fit in a rel32")]
    RedirectRange {
        site: usize,
        target: usize
    },

    #[error("redirect entry at offset {0:#x} carries a malformed target payload")]
    BadRedirect(u64),

    #[error("{0}")]
    Unit(String)
}

impl PatchError {
    /// Builds a free-form error for a custom patch unit.
    pub fn unit(
        msg: impl Into<String>
    ) -> Self {
        Self::Unit(msg.into())
    }
}
