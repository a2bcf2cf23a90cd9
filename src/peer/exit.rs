//! Exit status of a mock peer process.

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitCode, ExitStatus};

/// How a peer process ended. Codes 0..=3 are reserved by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerExit {
    /// Every transaction was played.
    Completed,
    /// The endpoint could not be created, bound, connected or accepted.
    SocketCreation,
    /// The launch request was unusable or the report channel failed.
    RuntimeError,
    /// A stop request arrived on the control channel.
    StopRequested,
    /// Killed by a signal.
    Signaled(i32),
    /// Any other exit code.
    Other(i32),
}

impl PeerExit {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Completed,
            1 => Self::SocketCreation,
            2 => Self::RuntimeError,
            3 => Self::StopRequested,
            other => Self::Other(other),
        }
    }

    pub fn from_status(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Self::from_code(code),
            (None, Some(signal)) => Self::Signaled(signal),
            (None, None) => Self::Other(-1),
        }
    }

    /// Process exit code, `None` for signals.
    pub fn code(&self) -> Option<i32> {
        match self {
            Self::Completed => Some(0),
            Self::SocketCreation => Some(1),
            Self::RuntimeError => Some(2),
            Self::StopRequested => Some(3),
            Self::Signaled(_) => None,
            Self::Other(code) => Some(*code),
        }
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Completed
    }
}

impl From<PeerExit> for ExitCode {
    fn from(exit: PeerExit) -> Self {
        let code = exit.code().unwrap_or(2);
        ExitCode::from(u8::try_from(code).unwrap_or(2))
    }
}

impl fmt::Display for PeerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::SocketCreation => f.write_str("socket creation failed"),
            Self::RuntimeError => f.write_str("runtime error"),
            Self::StopRequested => f.write_str("stop requested"),
            Self::Signaled(sig) => write!(f, "killed by signal {sig}"),
            Self::Other(code) => write!(f, "exit code {code}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_codes_round_trip() {
        for exit in [
            PeerExit::Completed,
            PeerExit::SocketCreation,
            PeerExit::RuntimeError,
            PeerExit::StopRequested,
        ] {
            let code = exit.code().unwrap();
            assert_eq!(PeerExit::from_code(code), exit);
        }
        assert_eq!(PeerExit::from_code(42), PeerExit::Other(42));
    }

    #[test]
    fn from_raw_wait_status() {
        assert_eq!(
            PeerExit::from_status(ExitStatus::from_raw(3 << 8)),
            PeerExit::StopRequested
        );
        assert_eq!(
            PeerExit::from_status(ExitStatus::from_raw(libc::SIGKILL)),
            PeerExit::Signaled(libc::SIGKILL)
        );
    }
}
