//!
//! @file tid.rs
//! @brief Compact thread identity for the lock owner fields.
//! @bug No known bugs.
//!

use std::sync::atomic::{AtomicU32, Ordering};

/// The next identity to hand out. Zero is reserved to mean "no owner".
static NEXT_ID: AtomicU32 = AtomicU32::new(1);

thread_local! {
    static THREAD_ID: u32 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
}

///
/// Gets a nonzero u32 identifying the calling thread.
///
/// The owner fields in the overlay locks are a single u32, so the identity
/// must fit regardless of how wide the OS thread id is. Identities are
/// assigned on first use and never reused for the life of the process.
///
pub(crate) fn current_thread_id() -> u32 {
    THREAD_ID.with(|id| *id)
}
