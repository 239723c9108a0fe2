//!
//! @file engine.rs
//! @brief Process-wide entry point for the patching machinery.
//! @bug No known bugs.
//!
//! The host can call back into the plugin from any of its threads, so the
//! manager behind the engine is guarded by the same spinlock the rest of
//! the plugin overlays onto host structures. The engine itself is created
//! exactly once, during plugin load, before any host thread can see it.
//!

use std::cell::UnsafeCell;
use std::sync::OnceLock;

use host_common::version::RuntimeVersion;
use host_sync::SpinLock;
use reloc_db::RelocationDatabase;

use crate::manager::{PatchManager, UnitReport};
use crate::unit::PatchUnit;

/// The process-wide engine, created by init().
static ENGINE: OnceLock<Engine> = OnceLock::new();

/// The patching engine singleton.
pub struct Engine {
    lock: SpinLock,
    manager: UnsafeCell<PatchManager<'static>>
}

// All access to the manager goes through the spinlock.
unsafe impl Sync for Engine {}

impl Engine {
    ///
    /// Creates the engine, registering the given units against the database.
    ///
    /// The database is leaked; it lives for the rest of the process, as the
    /// patches it describes do. Calling this function more than once is a
    /// programming error.
    ///
    pub fn init(
        db: RelocationDatabase,
        version: RuntimeVersion,
        units: impl IntoIterator<Item = Box<dyn PatchUnit>>
    ) -> &'static Engine {
        let db: &'static RelocationDatabase = Box::leak(Box::new(db));
        let mut manager = PatchManager::new(db, version);
        manager.append(units);

        let engine = Engine {
            lock: SpinLock::new(),
            manager: UnsafeCell::new(manager)
        };

        if ENGINE.set(engine).is_err() {
            panic!("The patching engine was initialized twice");
        }
        Engine::instance()
    }

    /// Gets the engine. Must not be called before init().
    pub fn instance() -> &'static Engine {
        match ENGINE.get() {
            Some(engine) => engine,
            None => panic!("The patching engine has not been initialized")
        }
    }

    ///
    /// Queries and enables every registered unit, returning the per-unit
    /// outcome.
    ///
    pub fn install(
        &self
    ) -> Vec<UnitReport> {
        self.with_manager(|m| {
            m.query_all();
            m.enable_all()
        })
    }

    /// Disables every enabled unit, returning the per-unit outcome.
    pub fn uninstall(
        &self
    ) -> Vec<UnitReport> {
        self.with_manager(|m| m.disable_all())
    }

    /// Gets the current per-unit status.
    pub fn statuses(
        &self
    ) -> Vec<UnitReport> {
        self.with_manager(|m| m.statuses())
    }

    ///
    /// Runs the given closure with exclusive access to the manager.
    ///
    /// Re-entering the engine from within the closure would hand out a
    /// second mutable reference through the recursive lock, so it is
    /// forbidden.
    ///
    fn with_manager<R>(
        &self,
        f: impl FnOnce(&mut PatchManager<'static>) -> R
    ) -> R {
        assert!(
            !self.lock.thread_owns_lock(),
            "The patching engine must not be re-entered"
        );

        self.lock.acquire();
        // The guard keeps a panicking closure from leaving the lock held.
        let _held = Held(&self.lock);
        f(unsafe { &mut *self.manager.get() })
    }
}

/// Releases the spinlock when dropped, unwinding included.
struct Held<'a>(&'a SpinLock);

impl Drop for Held<'_> {
    fn drop(
        &mut self
    ) {
        self.0.release();
    }
}
