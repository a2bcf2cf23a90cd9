//! Interception and fault injection.
//!
//! A [`TestContext`] stands between the code under test and the real
//! allocator, resolver and socket calls. For each monitored operation it
//! counts calls, snapshots parameters and results, consults a failure
//! schedule, tracks live resources, and reports misuse as [`Violation`]s.

mod context;
mod dns;
mod error;
mod failures;
mod ledger;
mod memory;
mod op;
pub mod real;
mod record;
mod schedule;
pub mod sockaddr;
mod socket;
pub mod substitute;

pub use context::{ContextConfig, LeakReport, TestContext, ViolationReporter};
pub use error::{ConfigError, LedgerError, Violation};
pub use failures::{Failures, GaiFailure};
pub use ledger::{AllocationEntry, AllocationLedger, ResolutionLedger, DEFAULT_CAPACITY};
pub use op::{MonitorSet, Op};
pub use record::{
    AcceptReturn, AddrHints, AddressParams, CallRecord, CallocParams, FdParams, FreeOutcome,
    GetAddrInfoParams, GetAddrInfoReturn, GetNameInfoParams, ListenParams, MallocParams,
    MemoryStats, MsgParams, NameInfoReturn, PollEntry, PollParams, ReallocParams, RecvFromReturn,
    RecvParams, ReleaseStatus, SelectParams, SendParams, SendToParams, ShutdownParams,
    SocketParams, Stats,
};
pub use schedule::{
    FailureSchedule, ScheduleEnd, FAIL_ALWAYS, FAIL_FIRST, FAIL_NEVER, FAIL_SECOND, FAIL_THIRD,
    FAIL_TWICE,
};
pub use substitute::{filtered_getaddrinfo, Substitutes};
