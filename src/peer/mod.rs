//! Scripted mock network peers.
//!
//! A peer is a child process that opens one TCP or UDP endpoint and plays
//! a [`TransactionSet`] against whatever connects to it, reporting one
//! [`ChunkOutcome`] per chunk. [`PeerLauncher`] runs on the test side;
//! [`run_peer`] is the loop inside the `ctester-peer` binary.

mod control;
mod endpoint;
mod exit;
mod launcher;
mod outcome;
mod player;
mod protocol;
mod report;
mod script;

pub use control::{spawn_control_reader, StopSignal, StopTrigger};
pub use endpoint::{
    open, AddressFamily, EndpointError, EndpointSpec, Opened, PeerOptions, Role, Transport,
};
pub use exit::PeerExit;
pub use launcher::{LaunchError, PeerHandle, PeerLauncher};
pub use outcome::{
    evaluate, ChunkOutcome, ReportError, EXIT_PROCESS, EXTEND, NOTHING_RECV, NOT_SAME, OK,
    RECV_ERROR, SEND_ERROR, TOO_FEW, TOO_MUCH,
};
pub use player::run_peer;
pub use protocol::{
    decode_launch, encode_launch, read_launch, LaunchRequest, ProtocolError, MAX_FRAME_SIZE,
};
pub use report::{RecordedOutcome, Report, ReportReader, TransactionReport};
pub use script::{
    ChunkRole, NetworkChunk, ScriptError, Transaction, TransactionSet, MAX_CHUNK_LEN,
};
