//!
//! @file spin.rs
//! @brief Recursive spinlock, byte-compatible with the host lock it replaces.
//! @bug No known bugs.
//!

use std::sync::atomic::{AtomicU32, Ordering, fence};
use std::hint::spin_loop;
use std::thread;
use std::time::Duration;

use crate::tid::current_thread_id;

/// How many zero-duration yields to attempt before sleeping between retries.
const SLOW_PATH_BACKOFF_COUNT: u32 = 10000;

///
/// A recursive, non-fair spinlock.
///
/// The layout is the host's: an owning thread id word followed by a lock
/// count word. The count doubles as the lock flag (zero means free) and as
/// the recursion depth of the owning thread.
///
#[repr(C)]
pub struct SpinLock {
    owner: AtomicU32,
    count: AtomicU32
}

// The overlaid host structure is exactly eight bytes.
const _: () = assert!(std::mem::size_of::<SpinLock>() == 8);

impl SpinLock {
    /// Creates a new, unheld, spinlock.
    pub const fn new() -> Self {
        Self {
            owner: AtomicU32::new(0),
            count: AtomicU32::new(0)
        }
    }

    ///
    /// Constructs a spinlock in place over a host-owned structure.
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

    /// Acquires the lock, spinning on the fast path only.
    pub fn acquire(
        &self
    ) {
        self.acquire_with_spin(0);
    }

    ///
    /// Acquires the lock.
    ///
    /// A contended acquire busy-waits with a CPU pause for the given number
    /// of attempts, then escalates to yielding the thread and, past the
    /// backoff count, to millisecond sleeps until the lock is obtained.
    ///
    pub fn acquire_with_spin(
        &self,
        initial_attempts: u32
    ) {
        // Check for recursive locking.
        if self.thread_owns_lock() {
            self.count.fetch_add(1, Ordering::Relaxed);
            return;
        }

        // First test (no waits/pauses, fast path).
        if self.try_flag() {
            self.owner.store(current_thread_id(), Ordering::Release);
            return;
        }

        // Slow path #1 (CPU pause).
        let mut locked = false;
        let mut counter = 0;
        while !locked && counter < initial_attempts {
            counter += 1;
            spin_loop();
            locked = self.try_flag();
        }

        // Slower path #2 (yield, then sleep).
        counter = 0;
        while !locked {
            if counter < SLOW_PATH_BACKOFF_COUNT {
                thread::yield_now();
                counter += 1;
            } else {
                thread::sleep(Duration::from_millis(1));
            }

            locked = self.try_flag();
        }

        self.owner.store(current_thread_id(), Ordering::Release);
    }

    ///
    /// Releases the lock.
    ///
    /// Releasing a lock the calling thread does not own is a programming
    /// error; it is diagnosed in debug builds and ignored in release builds,
    /// matching the host behavior being replicated.
    ///
    pub fn release(
        &self
    ) {
        debug_assert!(self.is_locked(), "Invalid lock count");
        debug_assert!(self.thread_owns_lock(), "Thread does not own spinlock");

        if !self.thread_owns_lock() {
            return;
        }

        if self.count.load(Ordering::Relaxed) == 1 {
            self.owner.store(0, Ordering::Relaxed);
            fence(Ordering::SeqCst);

            let old = self.count.swap(0, Ordering::Release);
            debug_assert!(old == 1, "The spinlock wasn't correctly released");
        } else {
            let old = self.count.fetch_sub(1, Ordering::Relaxed);
            debug_assert!(old > 1, "Invalid lock count");
        }
    }

    /// Checks if any thread currently holds the lock.
    pub fn is_locked(
        &self
    ) -> bool {
        self.count.load(Ordering::Acquire) != 0
    }

    /// Checks if the calling thread holds the lock.
    pub fn thread_owns_lock(
        &self
    ) -> bool {
        self.owner.load(Ordering::Acquire) == current_thread_id()
    }

    /// Attempts the uncontended flag transition.
    fn try_flag(
        &self
    ) -> bool {
        self.count.compare_exchange(0, 1, Ordering::Acquire, Ordering::Relaxed).is_ok()
    }
}

impl Drop for SpinLock {
    fn drop(
        &mut self
    ) {
        debug_assert!(*self.count.get_mut() == 0, "Destructing a lock that is still in use");
    }
}
