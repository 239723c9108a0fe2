//!
//! @file rw.rs
//! @brief Packed reader/writer lock, byte-compatible with the host lock.
//! @bug No known bugs.
//!

use std::sync::atomic::{AtomicU32, AtomicI16, AtomicI8, Ordering};
use std::hint::spin_loop;
use std::thread;

use crate::tid::current_thread_id;

/// Failed attempts before a waiting thread stops pausing and starts yielding.
const SPIN_LIMIT: u32 = 1000;

const READER: i16 = 2;
const WRITER: i16 = 1;

///
/// A reader/writer lock packed into the footprint of the host structure.
///
/// NOTE: In order to fit into 8 bytes, the shared state is an i16. A read
/// lock acquired recursively more than 16,383 times (or held by that many
/// concurrent readers) overflows the reader field and is undefined.
///
/// The writer is recursive by thread id; readers never starve a writer out
/// of making progress, but no fairness order is imposed in either direction.
///
#[repr(C)]
pub struct ReadWriteLock {
    thread_id: AtomicU32,
    bits: AtomicI16,
    write_count: AtomicI8
}

// The overlaid host structure is eight bytes; one is left to padding.
const _: () = assert!(std::mem::size_of::<ReadWriteLock>() <= 8);

/// Scoped write lock, mirroring the auto-lock object the host emplaces.
pub struct AutoWriteLock<'a>(&'a ReadWriteLock);

impl ReadWriteLock {
    /// Creates a new, idle, lock.
    pub const fn new() -> Self {
        Self {
            thread_id: AtomicU32::new(0),
            bits: AtomicI16::new(0),
            write_count: AtomicI8::new(0)
        }
    }

    ///
    /// Constructs a lock in place over a host-owned structure.
    ///
    /// In order to use this function safely, the given address must be the
    /// host lock being replaced, the host must not touch it through any
    /// other code path for the lifetime of the overlay, and the returned
    /// reference must not outlive the host object.
    ///
    pub unsafe fn emplace<'a>(
        addr: *mut u8
    ) -> &'a Self {
        let lock = addr.cast::<Self>();
        lock.write(Self::new());
        &*lock
    }

    /// Acquires a read lock, retrying until it succeeds.
    pub fn lock_for_read(
        &self
    ) {
        let mut count = 0;
        while !self.try_lock_for_read() {
            count += 1;
            if count > SPIN_LIMIT {
                thread::yield_now();
            } else {
                spin_loop();
            }
        }
    }

    /// Releases a read lock. A no-op for the recursive writing thread.
    pub fn unlock_read(
        &self
    ) {
        if self.is_writing_thread() {
            return;
        }

        self.bits.fetch_add(-READER, Ordering::Release);
    }

    ///
    /// Attempts to acquire a read lock without blocking.
    ///
    /// The increment-then-check dance trades a wasted add/sub pair when a
    /// writer is active for the common no-writer case being a single atomic
    /// op instead of a compare-exchange.
    ///
    pub fn try_lock_for_read(
        &self
    ) -> bool {
        if self.is_writing_thread() {
            return true;
        }

        let value = self.bits.fetch_add(READER, Ordering::Acquire);
        if (value & WRITER) != 0 {
            self.bits.fetch_add(-READER, Ordering::Release);
            return false;
        }

        true
    }

    /// Acquires the write lock, retrying until it succeeds.
    pub fn lock_for_write(
        &self
    ) {
        let mut count = 0;
        while !self.try_lock_for_write() {
            count += 1;
            if count > SPIN_LIMIT {
                thread::yield_now();
            } else {
                spin_loop();
            }
        }
    }

    ///
    /// Releases the write lock.
    ///
    /// Ownership is only surrendered once the recursion depth reaches zero.
    ///
    pub fn unlock_write(
        &self
    ) {
        if self.write_count.fetch_sub(1, Ordering::Relaxed) > 1 {
            return;
        }

        self.thread_id.store(0, Ordering::Release);
        self.bits.fetch_and(!WRITER, Ordering::Release);
    }

    /// Attempts to acquire the write lock without blocking.
    pub fn try_lock_for_write(
        &self
    ) -> bool {
        // Check for recursive locking.
        if self.is_writing_thread() {
            self.write_count.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        if self.bits.compare_exchange(0, WRITER, Ordering::AcqRel, Ordering::Relaxed).is_ok() {
            self.write_count.store(1, Ordering::Relaxed);
            self.thread_id.store(current_thread_id(), Ordering::Release);
            return true;
        }

        false
    }

    /// Checks if the calling thread holds the write lock.
    pub fn is_writing_thread(
        &self
    ) -> bool {
        self.thread_id.load(Ordering::Acquire) == current_thread_id()
    }
}

impl Drop for ReadWriteLock {
    fn drop(
        &mut self
    ) {
        debug_assert!(
            *self.bits.get_mut() == 0 && *self.write_count.get_mut() == 0,
            "Destructing a lock that is still in use"
        );
    }
}

impl<'a> AutoWriteLock<'a> {
    /// Takes the write lock for the duration of the guards lifetime.
    pub fn new(
        lock: &'a ReadWriteLock
    ) -> Self {
        lock.lock_for_write();
        Self(lock)
    }
}

impl<'a> Drop for AutoWriteLock<'a> {
    fn drop(
        &mut self
    ) {
        self.0.unlock_write();
    }
}
