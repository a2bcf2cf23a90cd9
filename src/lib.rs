//! ctester: interception, fault injection and scripted network peers for
//! testing student C code.
//!
//! Two independent halves:
//!
//! - [`intercept`]: a [`TestContext`] that fronts the allocator, the
//!   resolver and the socket API. It records every monitored call, injects
//!   scripted failures, swaps in substitute implementations and validates
//!   releases against a ledger of live resources.
//! - [`peer`]: mock TCP/UDP peers run as separate processes. A test builds a
//!   [`TransactionSet`], launches a peer with [`PeerLauncher`], drives the
//!   code under test against it and reads back one outcome per chunk.

pub mod cli;
pub mod config;
pub mod intercept;
pub mod peer;
pub mod telemetry;

pub use intercept::{ContextConfig, LeakReport, Op, Stats, TestContext, Violation};
pub use peer::{
    ChunkOutcome, NetworkChunk, PeerExit, PeerHandle, PeerLauncher, Report, Transaction,
    TransactionSet,
};
