//! The test context: everything an interception session owns.
//!
//! A [`TestContext`] is an explicit handle passed to every intercepted call.
//! It holds the monitoring switches, call records, failure schedules,
//! resource ledgers and substitutes. Nothing here is global, so independent
//! contexts can coexist in one process.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use super::error::{ConfigError, LedgerError, Violation};
use super::failures::Failures;
use super::ledger::{AllocationEntry, AllocationLedger, ResolutionLedger, DEFAULT_CAPACITY};
use super::op::{MonitorSet, Op};
use super::record::Stats;
use super::substitute::Substitutes;

/// Construction parameters of a [`TestContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextConfig {
    /// Maximum number of live blocks the allocation ledger tracks.
    pub ledger_capacity: usize,
    /// Whether `freeaddrinfo` arguments are checked against registered heads.
    pub check_resolutions: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            ledger_capacity: DEFAULT_CAPACITY,
            check_resolutions: true,
        }
    }
}

/// Callback invoked for every recorded violation.
pub type ViolationReporter = Box<dyn FnMut(&Violation)>;

/// Resources still held when a test ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakReport {
    pub allocations: Vec<AllocationEntry>,
    pub resolutions: Vec<usize>,
    /// Live blocks the ledger had no room for. Their sizes are unknown.
    pub untracked: Vec<usize>,
}

impl LeakReport {
    pub fn is_clean(&self) -> bool {
        self.allocations.is_empty() && self.resolutions.is_empty() && self.untracked.is_empty()
    }

    pub fn leaked_bytes(&self) -> usize {
        self.allocations.iter().map(|e| e.size).sum()
    }
}

/// Interception session state.
pub struct TestContext {
    pub(crate) monitoring: bool,
    pub(crate) monitored: MonitorSet,
    pub(crate) check_resolutions: bool,
    pub(crate) stats: Stats,
    pub(crate) failures: Failures,
    pub(crate) allocations: AllocationLedger,
    pub(crate) resolutions: ResolutionLedger,
    pub(crate) substitutes: Substitutes,
    /// Addresses of live blocks that overflowed the allocation ledger.
    overflowed: HashSet<usize>,
    reporter: Option<ViolationReporter>,
    violations: Vec<Violation>,
}

impl TestContext {
    /// Create a context with monitoring off and nothing flagged.
    pub fn new(config: ContextConfig) -> Result<Self, ConfigError> {
        if config.ledger_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        debug!(
            ledger_capacity = config.ledger_capacity,
            check_resolutions = config.check_resolutions,
            "test context created"
        );
        Ok(Self {
            monitoring: false,
            monitored: MonitorSet::none(),
            check_resolutions: config.check_resolutions,
            stats: Stats::default(),
            failures: Failures::default(),
            allocations: AllocationLedger::new(config.ledger_capacity),
            resolutions: ResolutionLedger::new(),
            substitutes: Substitutes::default(),
            overflowed: HashSet::new(),
            reporter: None,
            violations: Vec::new(),
        })
    }

    /// Create a context from the `CTESTER_*` environment.
    pub fn from_env() -> Self {
        let config = crate::config::load().context;
        // load() floors the capacity at 1.
        Self::new(config).unwrap_or_else(|_| Self::with_defaults())
    }

    fn with_defaults() -> Self {
        Self {
            monitoring: false,
            monitored: MonitorSet::none(),
            check_resolutions: true,
            stats: Stats::default(),
            failures: Failures::default(),
            allocations: AllocationLedger::default(),
            resolutions: ResolutionLedger::new(),
            substitutes: Substitutes::default(),
            overflowed: HashSet::new(),
            reporter: None,
            violations: Vec::new(),
        }
    }

    /// Turn recording on for flagged operations.
    pub fn start_monitoring(&mut self) {
        self.monitoring = true;
    }

    /// Turn recording off. Every call goes straight to the real implementation.
    pub fn stop_monitoring(&mut self) {
        self.monitoring = false;
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitoring
    }

    pub fn monitor(&mut self, op: Op) {
        self.monitored.enable(op);
    }

    pub fn unmonitor(&mut self, op: Op) {
        self.monitored.disable(op);
    }

    /// Flag a family of operations, e.g. [`Op::MEMORY`].
    pub fn monitor_family(&mut self, ops: &[Op]) {
        self.monitored.set_many(ops, true);
    }

    pub fn monitored(&self) -> &MonitorSet {
        &self.monitored
    }

    /// True if a call to `op` right now would be recorded.
    pub fn is_monitored(&self, op: Op) -> bool {
        self.monitoring && self.monitored.contains(op)
    }

    pub fn set_check_resolutions(&mut self, on: bool) {
        self.check_resolutions = on;
    }

    pub fn check_resolutions(&self) -> bool {
        self.check_resolutions
    }

    /// Install a callback invoked on every violation.
    pub fn set_violation_reporter(&mut self, reporter: impl FnMut(&Violation) + 'static) {
        self.reporter = Some(Box::new(reporter));
    }

    pub fn clear_violation_reporter(&mut self) {
        self.reporter = None;
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn failures(&self) -> &Failures {
        &self.failures
    }

    pub fn failures_mut(&mut self) -> &mut Failures {
        &mut self.failures
    }

    pub fn substitutes_mut(&mut self) -> &mut Substitutes {
        &mut self.substitutes
    }

    pub fn allocations(&self) -> &AllocationLedger {
        &self.allocations
    }

    pub fn resolutions(&self) -> &ResolutionLedger {
        &self.resolutions
    }

    /// Violations recorded since the last reset, oldest first.
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Bytes held by live monitored blocks.
    pub fn memory_used(&self) -> usize {
        self.stats.memory.used
    }

    /// Resize the allocation ledger.
    pub fn set_ledger_capacity(&mut self, capacity: usize) -> Result<(), ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        self.allocations
            .set_capacity(capacity)
            .map_err(|_| ConfigError::LedgerFull { capacity })
    }

    /// Zero the records, drop the failure plans, forget every ledger entry
    /// and violation. Monitoring switches, substitutes and the reporter stay.
    pub fn reset(&mut self) {
        self.stats.reset();
        self.failures = Failures::default();
        self.allocations.clear();
        self.resolutions.clear();
        self.overflowed.clear();
        self.violations.clear();
    }

    /// Snapshot of what is still live.
    pub fn leak_report(&self) -> LeakReport {
        let report = LeakReport {
            allocations: self.allocations.entries().copied().collect(),
            resolutions: self.resolutions.outstanding().to_vec(),
            untracked: self.overflowed.iter().copied().collect(),
        };
        if !report.is_clean() {
            info!(
                blocks = report.allocations.len(),
                untracked = report.untracked.len(),
                bytes = report.leaked_bytes(),
                resolutions = report.resolutions.len(),
                "resources still held"
            );
        }
        report
    }

    pub(crate) fn report(&mut self, violation: Violation) {
        warn!(
            op = %violation.op(),
            address = format_args!("{:#x}", violation.address()),
            "resource misuse: {:?}",
            violation
        );
        if let Some(reporter) = self.reporter.as_mut() {
            reporter(&violation);
        }
        self.violations.push(violation);
    }

    /// Log a fresh block in the allocation ledger and count its bytes.
    pub(crate) fn track_block(&mut self, op: Op, address: usize, size: usize) {
        self.overflowed.remove(&address);
        match self.allocations.insert(address, size) {
            Ok(()) => self.stats.memory.used += size,
            Err(LedgerError::Duplicate { .. }) => {
                // The address was released behind our back and reused.
                if let Ok(stale) = self.allocations.remove(address) {
                    self.stats.memory.used -= stale;
                }
                if self.allocations.insert(address, size).is_ok() {
                    self.stats.memory.used += size;
                }
            }
            Err(LedgerError::Full { .. }) => {
                self.stats.memory.overflowed += 1;
                self.overflowed.insert(address);
                self.report(Violation::LedgerOverflow { op, address, size });
            }
            Err(LedgerError::NullAddress) | Err(LedgerError::NotFound { .. }) => {}
        }
    }

    /// Forget a block that overflowed the ledger. Returns `false` if the
    /// address was never one.
    pub(crate) fn forget_overflowed(&mut self, address: usize) -> bool {
        self.overflowed.remove(&address)
    }

    /// Drop a block from the ledger. Returns `false` if it was not live.
    pub(crate) fn untrack_block(&mut self, address: usize) -> bool {
        match self.allocations.remove(address) {
            Ok(size) => {
                self.stats.memory.used -= size;
                true
            }
            Err(_) => false,
        }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("monitoring", &self.monitoring)
            .field("monitored", &self.monitored)
            .field("check_resolutions", &self.check_resolutions)
            .field("live_blocks", &self.allocations.live_count())
            .field("violations", &self.violations.len())
            .field("substitutes", &self.substitutes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn zero_capacity_is_rejected() {
        let err = TestContext::new(ContextConfig {
            ledger_capacity: 0,
            check_resolutions: true,
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::ZeroCapacity);
    }

    #[test]
    fn monitoring_needs_both_switches() {
        let mut ctx = TestContext::default();
        ctx.monitor(Op::Malloc);
        assert!(!ctx.is_monitored(Op::Malloc));
        ctx.start_monitoring();
        assert!(ctx.is_monitored(Op::Malloc));
        assert!(!ctx.is_monitored(Op::Free));
        ctx.stop_monitoring();
        assert!(!ctx.is_monitored(Op::Malloc));
    }

    #[test]
    fn overflow_is_counted_and_reported() {
        let mut ctx = TestContext::new(ContextConfig {
            ledger_capacity: 1,
            check_resolutions: true,
        })
        .unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        ctx.set_violation_reporter(move |v| sink.borrow_mut().push(v.clone()));

        ctx.track_block(Op::Malloc, 0x10, 4);
        ctx.track_block(Op::Malloc, 0x20, 8);
        assert_eq!(ctx.memory_used(), 4);
        assert_eq!(ctx.stats().memory.overflowed, 1);
        assert_eq!(seen.borrow().len(), 1);
        assert_eq!(ctx.violations()[0].address(), 0x20);
        assert_eq!(ctx.leak_report().untracked, vec![0x20]);

        assert!(ctx.forget_overflowed(0x20));
        assert!(!ctx.forget_overflowed(0x20));
        assert!(ctx.leak_report().untracked.is_empty());
    }

    #[test]
    fn reused_address_replaces_stale_entry() {
        let mut ctx = TestContext::default();
        ctx.track_block(Op::Malloc, 0x10, 4);
        ctx.track_block(Op::Malloc, 0x10, 6);
        assert_eq!(ctx.memory_used(), 6);
        assert_eq!(ctx.allocations().live_count(), 1);
    }

    #[test]
    fn shrinking_below_live_count_fails() {
        let mut ctx = TestContext::default();
        ctx.track_block(Op::Malloc, 0x10, 1);
        ctx.track_block(Op::Malloc, 0x20, 1);
        assert_eq!(
            ctx.set_ledger_capacity(1),
            Err(ConfigError::LedgerFull { capacity: 1 })
        );
        assert_eq!(ctx.set_ledger_capacity(0), Err(ConfigError::ZeroCapacity));
        assert!(ctx.set_ledger_capacity(2).is_ok());
    }

    #[test]
    fn leak_report_and_reset() {
        let mut ctx = TestContext::default();
        ctx.track_block(Op::Malloc, 0x10, 3);
        ctx.resolutions.register(0x99);
        let report = ctx.leak_report();
        assert!(!report.is_clean());
        assert_eq!(report.leaked_bytes(), 3);
        assert_eq!(report.resolutions, vec![0x99]);

        ctx.reset();
        assert!(ctx.leak_report().is_clean());
        assert_eq!(ctx.memory_used(), 0);
    }
}
