//!
//! @file manager.rs
//! @brief The registration, query, and activation state machine.
//! @bug No known bugs.
//!

use std::panic::{catch_unwind, AssertUnwindSafe};

use host_common::version::RuntimeVersion;
use plugin_log::{plugin_message, plugin_warning};
use reloc_db::RelocationDatabase;

use crate::error::PatchError;
use crate::unit::{Compat, PatchUnit, UnitState};

/// The per-unit outcome reported after an activation pass.
#[derive(Clone, Debug)]
pub struct UnitReport {
    pub name: String,
    pub state: UnitState
}

/// A registered unit with its lifecycle state.
struct Slot {
    unit: Box<dyn PatchUnit>,
    state: UnitState
}

///
/// Runs one unit lifecycle call, containing both errors and panics.
///
/// A panicking unit is in an unknown state, but it transitions to Failed,
/// which is terminal for the session, so the manager never touches it
/// again.
///
fn isolated<R>(
    f: impl FnOnce() -> Result<R, PatchError>
) -> Result<R, PatchError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(res) => res,
        Err(payload) => {
            let msg = payload.downcast_ref::<&str>().map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "the unit panicked".to_string());
            Err(PatchError::unit(msg))
        }
    }
}

///
/// Owns the registered patch units and walks them through their lifecycle.
///
/// Registration order is activation order: earlier units are the
/// lower-level patches later ones assume are already in place, which is
/// also why deactivation walks the list backwards. There is deliberately
/// no transactional rollback across units; partial activation is an
/// accepted outcome, reported per unit rather than as one aggregate flag.
///
pub struct PatchManager<'db> {
    db: &'db RelocationDatabase,
    version: RuntimeVersion,
    slots: Vec<Slot>,
    queried: bool
}

impl<'db> PatchManager<'db> {
    /// Creates a manager over the database bound to the running version.
    pub fn new(
        db: &'db RelocationDatabase,
        version: RuntimeVersion
    ) -> Self {
        Self {
            db,
            version,
            slots: Vec::new(),
            queried: false
        }
    }

    /// Gets the host version the manager resolves units against.
    pub fn version(
        &self
    ) -> RuntimeVersion {
        self.version
    }

    /// Gets the database the manager resolves units against.
    pub fn database(
        &self
    ) -> &'db RelocationDatabase {
        self.db
    }

    ///
    /// Registers units, preserving their order.
    ///
    /// May be called any number of times, but only before the query pass.
    ///
    pub fn append(
        &mut self,
        units: impl IntoIterator<Item = Box<dyn PatchUnit>>
    ) {
        assert!(!self.queried, "units must be registered before the query pass");
        self.slots.extend(units.into_iter().map(|unit| Slot {
            unit,
            state: UnitState::Registered
        }));
    }

    ///
    /// Queries every registered unit, in registration order.
    ///
    /// Query is a pure decision; no host memory is touched. A unit that
    /// errors or panics is marked failed and logged, and the pass always
    /// visits every unit regardless of earlier failures. The pass runs once
    /// per session; later calls are no-ops.
    ///
    pub fn query_all(
        &mut self
    ) {
        if self.queried {
            return;
        }
        self.queried = true;

        let (db, version) = (self.db, self.version);
        for slot in self.slots.iter_mut() {
            match isolated(|| slot.unit.query(db, version)) {
                Ok(Compat::Compatible) => {
                    slot.state = UnitState::Compatible;
                    plugin_message!("[COMPATIBLE] {}", slot.unit.name());
                },
                Ok(Compat::Incompatible) => {
                    slot.state = UnitState::Incompatible;
                    plugin_message!(
                        "[SKIPPED] {} does not apply to version {}",
                        slot.unit.name(),
                        self.version
                    );
                },
                Err(e) => {
                    slot.state = UnitState::Failed;
                    plugin_warning!("[FAILURE] query of {} failed: {}", slot.unit.name(), e);
                }
            }
        }
    }

    ///
    /// Enables every compatible unit, in registration order.
    ///
    /// A unit whose enable fails or panics is marked failed and logged; the
    /// walk continues, and units already enabled stay enabled. Units
    /// disabled by an earlier pass are re-enabled.
    ///
    pub fn enable_all(
        &mut self
    ) -> Vec<UnitReport> {
        for slot in self.slots.iter_mut() {
            if !matches!(slot.state, UnitState::Compatible | UnitState::Disabled) {
                continue;
            }

            match isolated(|| slot.unit.enable()) {
                Ok(()) => {
                    slot.state = UnitState::Enabled;
                    plugin_message!("[ENABLED] {}", slot.unit.name());
                },
                Err(e) => {
                    slot.state = UnitState::Failed;
                    plugin_warning!("[FAILURE] enabling {} failed: {}", slot.unit.name(), e);
                }
            }
        }

        self.statuses()
    }

    ///
    /// Disables every enabled unit, in reverse registration order, so a
    /// later unit unwinds before the earlier edits it may depend on.
    ///
    pub fn disable_all(
        &mut self
    ) -> Vec<UnitReport> {
        for slot in self.slots.iter_mut().rev() {
            if !matches!(slot.state, UnitState::Enabled) {
                continue;
            }

            match isolated(|| slot.unit.disable()) {
                Ok(()) => {
                    slot.state = UnitState::Disabled;
                    plugin_message!("[DISABLED] {}", slot.unit.name());
                },
                Err(e) => {
                    slot.state = UnitState::Failed;
                    plugin_warning!("[FAILURE] disabling {} failed: {}", slot.unit.name(), e);
                }
            }
        }

        self.statuses()
    }

    /// Gets the current per-unit status, in registration order.
    pub fn statuses(
        &self
    ) -> Vec<UnitReport> {
        self.slots
            .iter()
            .map(|slot| UnitReport {
                name: slot.unit.name().to_string(),
                state: slot.state
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use host_common::version::RUNTIME_VERSION_1_6_438;

    /// Shared observation channel for the mock units below.
    #[derive(Default)]
    struct Trace {
        queries: AtomicUsize,
        enables: AtomicUsize,
        disables: Mutex<Vec<String>>
    }

    struct MockUnit {
        name: String,
        compat: Compat,
        fail_query: bool,
        fail_enable: bool,
        trace: Arc<Trace>
    }

    impl MockUnit {
        fn new(
            name: &str,
            compat: Compat,
            trace: &Arc<Trace>
        ) -> Box<dyn PatchUnit> {
            Box::new(Self {
                name: name.to_string(),
                compat,
                fail_query: false,
                fail_enable: false,
                trace: trace.clone()
            })
        }

        fn failing_query(
            name: &str,
            trace: &Arc<Trace>
        ) -> Box<dyn PatchUnit> {
            Box::new(Self {
                name: name.to_string(),
                compat: Compat::Compatible,
                fail_query: true,
                fail_enable: false,
                trace: trace.clone()
            })
        }

        fn failing_enable(
            name: &str,
            trace: &Arc<Trace>
        ) -> Box<dyn PatchUnit> {
            Box::new(Self {
                name: name.to_string(),
                compat: Compat::Compatible,
                fail_query: false,
                fail_enable: true,
                trace: trace.clone()
            })
        }
    }

    impl PatchUnit for MockUnit {
        fn name(&self) -> &str {
            &self.name
        }

        fn query(
            &mut self,
            _db: &RelocationDatabase,
            _version: RuntimeVersion
        ) -> Result<Compat, PatchError> {
            self.trace.queries.fetch_add(1, Ordering::Relaxed);
            if self.fail_query {
                return Err(PatchError::unit("deliberate query failure"));
            }
            Ok(self.compat)
        }

        fn enable(&mut self) -> Result<(), PatchError> {
            if self.fail_enable {
                return Err(PatchError::unit("deliberate enable failure"));
            }
            self.trace.enables.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn disable(&mut self) -> Result<(), PatchError> {
            self.trace.disables.lock().unwrap().push(self.name.clone());
            Ok(())
        }
    }

    /// Panics in query, or in enable after reporting itself compatible.
    struct PanickingUnit {
        on_enable: bool
    }

    impl PatchUnit for PanickingUnit {
        fn name(&self) -> &str {
            "bomb"
        }

        fn query(
            &mut self,
            _db: &RelocationDatabase,
            _version: RuntimeVersion
        ) -> Result<Compat, PatchError> {
            if self.on_enable {
                Ok(Compat::Compatible)
            } else {
                panic!("query exploded")
            }
        }

        fn enable(&mut self) -> Result<(), PatchError> {
            panic!("enable exploded")
        }

        fn disable(&mut self) -> Result<(), PatchError> {
            Ok(())
        }
    }

    fn manager(
        db: &RelocationDatabase
    ) -> PatchManager<'_> {
        PatchManager::new(db, RUNTIME_VERSION_1_6_438)
    }

    #[test]
    fn failed_query_is_isolated_from_siblings() {
        let db = RelocationDatabase::create(RUNTIME_VERSION_1_6_438);
        let trace = Arc::new(Trace::default());

        let mut m = manager(&db);
        m.append([
            MockUnit::new("a", Compat::Compatible, &trace),
            MockUnit::failing_query("b", &trace),
            MockUnit::new("c", Compat::Incompatible, &trace),
            MockUnit::new("d", Compat::Compatible, &trace)
        ]);

        m.query_all();
        assert_eq!(trace.queries.load(Ordering::Relaxed), 4);

        let states: Vec<UnitState> = m.statuses().iter().map(|r| r.state).collect();
        assert_eq!(states, vec![
            UnitState::Compatible,
            UnitState::Failed,
            UnitState::Incompatible,
            UnitState::Compatible
        ]);

        // Enable must still reach every compatible unit other than b.
        let report = m.enable_all();
        assert_eq!(trace.enables.load(Ordering::Relaxed), 2);
        assert_eq!(report[0].state, UnitState::Enabled);
        assert_eq!(report[1].state, UnitState::Failed);
        assert_eq!(report[2].state, UnitState::Incompatible);
        assert_eq!(report[3].state, UnitState::Enabled);
    }

    #[test]
    fn failed_enable_does_not_stop_the_walk() {
        let db = RelocationDatabase::create(RUNTIME_VERSION_1_6_438);
        let trace = Arc::new(Trace::default());

        let mut m = manager(&db);
        m.append([
            MockUnit::failing_enable("first", &trace),
            MockUnit::new("second", Compat::Compatible, &trace)
        ]);

        m.query_all();
        let report = m.enable_all();

        assert_eq!(report[0].state, UnitState::Failed);
        assert_eq!(report[1].state, UnitState::Enabled);
        assert_eq!(trace.enables.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn disable_runs_in_reverse_registration_order() {
        let db = RelocationDatabase::create(RUNTIME_VERSION_1_6_438);
        let trace = Arc::new(Trace::default());

        let mut m = manager(&db);
        m.append([
            MockUnit::new("low", Compat::Compatible, &trace),
            MockUnit::new("mid", Compat::Compatible, &trace),
            MockUnit::new("high", Compat::Compatible, &trace)
        ]);

        m.query_all();
        m.enable_all();
        m.disable_all();

        assert_eq!(*trace.disables.lock().unwrap(), vec!["high", "mid", "low"]);
    }

    #[test]
    fn disabled_units_can_be_enabled_again() {
        let db = RelocationDatabase::create(RUNTIME_VERSION_1_6_438);
        let trace = Arc::new(Trace::default());

        let mut m = manager(&db);
        m.append([MockUnit::new("bounce", Compat::Compatible, &trace)]);

        m.query_all();
        m.enable_all();
        m.disable_all();
        let report = m.enable_all();

        assert_eq!(report[0].state, UnitState::Enabled);
        assert_eq!(trace.enables.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn query_runs_once_per_session() {
        let db = RelocationDatabase::create(RUNTIME_VERSION_1_6_438);
        let trace = Arc::new(Trace::default());

        let mut m = manager(&db);
        m.append([MockUnit::new("once", Compat::Compatible, &trace)]);

        m.query_all();
        m.query_all();
        assert_eq!(trace.queries.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn incompatible_units_are_never_enabled() {
        let db = RelocationDatabase::create(RUNTIME_VERSION_1_6_438);
        let trace = Arc::new(Trace::default());

        let mut m = manager(&db);
        m.append([MockUnit::new("nope", Compat::Incompatible, &trace)]);

        m.query_all();
        m.enable_all();
        assert_eq!(trace.enables.load(Ordering::Relaxed), 0);
        assert_eq!(m.statuses()[0].state, UnitState::Incompatible);
    }

    #[test]
    fn panicking_query_is_contained_as_a_failure() {
        let db = RelocationDatabase::create(RUNTIME_VERSION_1_6_438);
        let trace = Arc::new(Trace::default());

        let mut m = manager(&db);
        m.append([
            MockUnit::new("a", Compat::Compatible, &trace),
            Box::new(PanickingUnit { on_enable: false }) as Box<dyn PatchUnit>,
            MockUnit::new("c", Compat::Compatible, &trace)
        ]);

        m.query_all();
        let states: Vec<UnitState> = m.statuses().iter().map(|r| r.state).collect();
        assert_eq!(states, vec![UnitState::Compatible, UnitState::Failed, UnitState::Compatible]);

        let report = m.enable_all();
        assert_eq!(report[1].state, UnitState::Failed);
        assert_eq!(trace.enables.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn panicking_enable_is_contained_as_a_failure() {
        let db = RelocationDatabase::create(RUNTIME_VERSION_1_6_438);
        let trace = Arc::new(Trace::default());

        let mut m = manager(&db);
        m.append([
            Box::new(PanickingUnit { on_enable: true }) as Box<dyn PatchUnit>,
            MockUnit::new("after", Compat::Compatible, &trace)
        ]);

        m.query_all();
        let report = m.enable_all();
        assert_eq!(report[0].state, UnitState::Failed);
        assert_eq!(report[1].state, UnitState::Enabled);
    }

    #[test]
    #[should_panic(expected = "before the query pass")]
    fn late_registration_is_a_programming_error() {
        let db = RelocationDatabase::create(RUNTIME_VERSION_1_6_438);
        let trace = Arc::new(Trace::default());

        let mut m = manager(&db);
        m.query_all();
        m.append([MockUnit::new("late", Compat::Compatible, &trace)]);
    }
}
