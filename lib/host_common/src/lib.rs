//!
//! @file lib.rs
//! @brief Types shared by every crate that talks about the host binary.
//! @bug No known bugs.
//!

pub mod version;
pub mod reloc;
