//! Orchestrator side: spawning mock peers and talking to them.
//!
//! Each peer is a separate `ctester-peer` process. Its stdin is the control
//! channel (launch frame, then stop byte), its stdout the report channel
//! (ready preamble, then outcome records). Stderr is inherited for logs.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use thiserror::Error;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use super::endpoint::{AddressFamily, EndpointSpec, PeerOptions, Transport};
use super::exit::PeerExit;
use super::outcome::ReportError;
use super::protocol::{encode_launch, LaunchRequest, ProtocolError};
use super::report::{RecordedOutcome, Report, ReportReader};
use super::script::{ScriptError, TransactionSet};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Peer program not configured (set CTESTER_PEER_BIN)")]
    ProgramNotConfigured,

    #[error("Invalid script: {0}")]
    Script(#[from] ScriptError),

    #[error("Invalid launch request: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Failed to spawn peer {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Peer process has no {0} pipe")]
    MissingPipe(&'static str),

    #[error("Failed to write launch request: {0}")]
    Control(#[source] io::Error),
}

/// Spawns mock peers.
#[derive(Debug, Clone)]
pub struct PeerLauncher {
    program: PathBuf,
    options: PeerOptions,
}

impl PeerLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            options: PeerOptions::default(),
        }
    }

    /// Build from `CTESTER_PEER_BIN` and the peer tuning variables.
    pub fn from_env() -> Result<Self, LaunchError> {
        let env = crate::config::load();
        let program = env.peer_bin.ok_or(LaunchError::ProgramNotConfigured)?;
        Ok(Self::new(program).with_options(env.peer))
    }

    pub fn with_options(mut self, options: PeerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &PeerOptions {
        &self.options
    }

    /// TCP server on `port` (0 = ephemeral, see [`PeerHandle::wait_ready`]).
    pub fn tcp_server(
        &self,
        transactions: &TransactionSet,
        family: AddressFamily,
        port: u16,
    ) -> Result<PeerHandle, LaunchError> {
        self.launch(EndpointSpec::server(Transport::Stream, family, port), transactions)
    }

    pub fn tcp_client(
        &self,
        transactions: &TransactionSet,
        family: AddressFamily,
        host: &str,
        port: u16,
    ) -> Result<PeerHandle, LaunchError> {
        self.launch(
            EndpointSpec::client(Transport::Stream, family, host, port),
            transactions,
        )
    }

    pub fn udp_server(
        &self,
        transactions: &TransactionSet,
        family: AddressFamily,
        port: u16,
    ) -> Result<PeerHandle, LaunchError> {
        self.launch(EndpointSpec::server(Transport::Datagram, family, port), transactions)
    }

    pub fn udp_client(
        &self,
        transactions: &TransactionSet,
        family: AddressFamily,
        host: &str,
        port: u16,
    ) -> Result<PeerHandle, LaunchError> {
        self.launch(
            EndpointSpec::client(Transport::Datagram, family, host, port),
            transactions,
        )
    }

    /// Spawn a peer for `endpoint` and hand it the script.
    ///
    /// Endpoint failures are not launch errors: the peer exits with
    /// [`PeerExit::SocketCreation`] and the handle reports it.
    pub fn launch(
        &self,
        endpoint: EndpointSpec,
        transactions: &TransactionSet,
    ) -> Result<PeerHandle, LaunchError> {
        transactions.validate()?;
        let request = LaunchRequest {
            run_id: Uuid::new_v4(),
            endpoint,
            transactions: transactions.clone(),
            options: self.options,
        };
        let frame = encode_launch(&request)?;

        let span = info_span!("launch", run_id = %request.run_id);
        let _enter = span.enter();

        let mut child = Command::new(&self.program)
            .arg("run")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        let control = child.stdin.take();
        let report = child.stdout.take();
        let mut handle = PeerHandle {
            child,
            control,
            report: None,
            run_id: request.run_id,
            exit: None,
        };
        let report = report.ok_or(LaunchError::MissingPipe("report"))?;
        handle.report = Some(ReportReader::new(report, transactions.shape()));

        let control = handle
            .control
            .as_mut()
            .ok_or(LaunchError::MissingPipe("control"))?;
        control
            .write_all(&frame)
            .and_then(|()| control.flush())
            .map_err(LaunchError::Control)?;

        info!(
            pid = handle.pid(),
            transport = ?request.endpoint.transport,
            role = ?request.endpoint.role,
            port = request.endpoint.port,
            "peer launched"
        );
        Ok(handle)
    }
}

/// A running peer.
///
/// Read the report before [`PeerHandle::wait`]: the peer blocks once the
/// report pipe is full. Dropping an unreaped handle kills and reaps it.
#[derive(Debug)]
pub struct PeerHandle {
    child: Child,
    control: Option<ChildStdin>,
    report: Option<ReportReader<ChildStdout>>,
    run_id: Uuid,
    exit: Option<PeerExit>,
}

impl PeerHandle {
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn reader(&mut self) -> Result<&mut ReportReader<ChildStdout>, ReportError> {
        self.report
            .as_mut()
            .ok_or_else(|| ReportError::Io(io::ErrorKind::NotConnected.into()))
    }

    /// Block until the endpoint is open and return its local port.
    ///
    /// Fails with [`ReportError::NotReady`] if the peer exited first.
    pub fn wait_ready(&mut self) -> Result<u16, ReportError> {
        self.reader()?.read_ready()
    }

    /// Block for the next outcome record.
    pub fn next_outcome(&mut self) -> Result<Option<RecordedOutcome>, ReportError> {
        self.reader()?.next_outcome()
    }

    /// Block until the report channel closes and return everything read.
    pub fn read_report(&mut self) -> Result<Report, ReportError> {
        self.reader()?.read_report()
    }

    /// Ask the peer to stop at its next check point.
    ///
    /// A peer that already exited is not an error.
    pub fn stop(&mut self) -> io::Result<()> {
        let Some(control) = self.control.as_mut() else {
            return Ok(());
        };
        match control.write_all(&[1]).and_then(|()| control.flush()) {
            Ok(()) => {
                debug!(pid = self.child.id(), "stop sent");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Close the control channel. Not a stop request.
    pub fn close_control(&mut self) {
        self.control = None;
    }

    /// Control channel write end.
    pub fn control_mut(&mut self) -> Option<&mut ChildStdin> {
        self.control.as_mut()
    }

    /// Report channel read end.
    pub fn report_mut(&mut self) -> Option<&mut ReportReader<ChildStdout>> {
        self.report.as_mut()
    }

    /// Reap the peer and decode its exit status.
    pub fn wait(&mut self) -> io::Result<PeerExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        let status = self.child.wait()?;
        let exit = PeerExit::from_status(status);
        info!(pid = self.child.id(), run_id = %self.run_id, %exit, "peer exited");
        self.exit = Some(exit);
        Ok(exit)
    }

    /// Reap without blocking.
    pub fn try_wait(&mut self) -> io::Result<Option<PeerExit>> {
        if self.exit.is_some() {
            return Ok(self.exit);
        }
        let exit = self.child.try_wait()?.map(PeerExit::from_status);
        self.exit = exit;
        Ok(exit)
    }

    /// Kill and reap the peer.
    pub fn kill(&mut self) -> io::Result<PeerExit> {
        if let Some(exit) = self.exit {
            return Ok(exit);
        }
        if let Err(e) = self.child.kill() {
            // Already exited; wait below still reaps it.
            debug!(error = %e, "kill failed");
        }
        self.wait()
    }
}

impl Drop for PeerHandle {
    fn drop(&mut self) {
        if self.exit.is_none() {
            if let Err(e) = self.kill() {
                warn!(pid = self.child.id(), error = %e, "failed to reap peer");
            }
        }
    }
}
