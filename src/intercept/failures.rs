//! Failure schedules of every failable operation.

use libc::c_void;

use super::error::ConfigError;
use super::op::Op;
use super::schedule::{FailureSchedule, ScheduleEnd};

/// What a failed resolver call hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GaiFailure {
    /// `EAI_*` code returned to the caller.
    pub code: i32,
    /// errno to set alongside, meaningful with `EAI_SYSTEM`.
    pub errno: Option<i32>,
}

impl Default for GaiFailure {
    fn default() -> Self {
        Self {
            code: libc::EAI_FAIL,
            errno: None,
        }
    }
}

/// One schedule per failable operation. `gai_strerror` cannot fail.
///
/// Memory schedules hand back a pointer (null unless changed), resolver
/// schedules a [`GaiFailure`], socket schedules an errno.
#[derive(Debug, Clone)]
pub struct Failures {
    pub malloc: FailureSchedule<*mut c_void>,
    pub calloc: FailureSchedule<*mut c_void>,
    pub realloc: FailureSchedule<*mut c_void>,
    pub free: FailureSchedule<()>,

    pub getaddrinfo: FailureSchedule<GaiFailure>,
    pub getnameinfo: FailureSchedule<GaiFailure>,

    pub accept: FailureSchedule<i32>,
    pub bind: FailureSchedule<i32>,
    pub connect: FailureSchedule<i32>,
    pub listen: FailureSchedule<i32>,
    pub poll: FailureSchedule<i32>,
    pub recv: FailureSchedule<i32>,
    pub recvfrom: FailureSchedule<i32>,
    pub recvmsg: FailureSchedule<i32>,
    pub select: FailureSchedule<i32>,
    pub send: FailureSchedule<i32>,
    pub sendto: FailureSchedule<i32>,
    pub sendmsg: FailureSchedule<i32>,
    pub shutdown: FailureSchedule<i32>,
    pub socket: FailureSchedule<i32>,
}

impl Default for Failures {
    fn default() -> Self {
        let null = std::ptr::null_mut();
        Self {
            malloc: FailureSchedule::never(null),
            calloc: FailureSchedule::never(null),
            realloc: FailureSchedule::never(null),
            free: FailureSchedule::never(()),
            getaddrinfo: FailureSchedule::never(GaiFailure::default()),
            getnameinfo: FailureSchedule::never(GaiFailure::default()),
            accept: FailureSchedule::never(libc::ECONNABORTED),
            bind: FailureSchedule::never(libc::EADDRINUSE),
            connect: FailureSchedule::never(libc::ECONNREFUSED),
            listen: FailureSchedule::never(libc::EADDRINUSE),
            poll: FailureSchedule::never(libc::EINTR),
            recv: FailureSchedule::never(libc::ECONNRESET),
            recvfrom: FailureSchedule::never(libc::ECONNRESET),
            recvmsg: FailureSchedule::never(libc::ECONNRESET),
            select: FailureSchedule::never(libc::EINTR),
            send: FailureSchedule::never(libc::EPIPE),
            sendto: FailureSchedule::never(libc::EPIPE),
            sendmsg: FailureSchedule::never(libc::EPIPE),
            shutdown: FailureSchedule::never(libc::ENOTCONN),
            socket: FailureSchedule::never(libc::EMFILE),
        }
    }
}

impl Failures {
    /// Apply a bit mask to the schedule of `op`. Returns `false` for
    /// operations that cannot fail.
    pub fn set_bits(&mut self, op: Op, mask: u32) -> bool {
        match op {
            Op::Malloc => self.malloc.set_bits(mask),
            Op::Calloc => self.calloc.set_bits(mask),
            Op::Realloc => self.realloc.set_bits(mask),
            Op::Free => self.free.set_bits(mask),
            Op::GetAddrInfo => self.getaddrinfo.set_bits(mask),
            Op::GetNameInfo => self.getnameinfo.set_bits(mask),
            Op::FreeAddrInfo | Op::GaiStrerror => return false,
            _ => match self.errno_schedule(op) {
                Some(s) => s.set_bits(mask),
                None => return false,
            },
        }
        true
    }

    /// Apply an explicit pattern to the schedule of `op`.
    pub fn set_pattern(
        &mut self,
        op: Op,
        pattern: Vec<bool>,
        end: ScheduleEnd,
    ) -> Result<bool, ConfigError> {
        match op {
            Op::Malloc => self.malloc.set_pattern(pattern, end)?,
            Op::Calloc => self.calloc.set_pattern(pattern, end)?,
            Op::Realloc => self.realloc.set_pattern(pattern, end)?,
            Op::Free => self.free.set_pattern(pattern, end)?,
            Op::GetAddrInfo => self.getaddrinfo.set_pattern(pattern, end)?,
            Op::GetNameInfo => self.getnameinfo.set_pattern(pattern, end)?,
            Op::FreeAddrInfo | Op::GaiStrerror => return Ok(false),
            _ => match self.errno_schedule(op) {
                Some(s) => s.set_pattern(pattern, end)?,
                None => return Ok(false),
            },
        }
        Ok(true)
    }

    /// Schedule of a socket operation.
    pub fn errno_schedule(&mut self, op: Op) -> Option<&mut FailureSchedule<i32>> {
        let schedule = match op {
            Op::Accept => &mut self.accept,
            Op::Bind => &mut self.bind,
            Op::Connect => &mut self.connect,
            Op::Listen => &mut self.listen,
            Op::Poll => &mut self.poll,
            Op::Recv => &mut self.recv,
            Op::RecvFrom => &mut self.recvfrom,
            Op::RecvMsg => &mut self.recvmsg,
            Op::Select => &mut self.select,
            Op::Send => &mut self.send,
            Op::SendTo => &mut self.sendto,
            Op::SendMsg => &mut self.sendmsg,
            Op::Shutdown => &mut self.shutdown,
            Op::Socket => &mut self.socket,
            _ => return None,
        };
        Some(schedule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::schedule::{FAIL_ALWAYS, FAIL_SECOND};

    #[test]
    fn defaults_never_fail() {
        let mut f = Failures::default();
        assert!(f.malloc.next().is_none());
        assert!(f.connect.next().is_none());
        assert_eq!(*f.connect.scripted(), libc::ECONNREFUSED);
    }

    #[test]
    fn set_bits_by_op() {
        let mut f = Failures::default();
        assert!(f.set_bits(Op::Send, FAIL_SECOND));
        assert!(f.send.next().is_none());
        assert_eq!(f.send.next(), Some(libc::EPIPE));
        assert!(!f.set_bits(Op::GaiStrerror, FAIL_ALWAYS));
    }

    #[test]
    fn set_pattern_rejects_empty_wrap() {
        let mut f = Failures::default();
        assert_eq!(
            f.set_pattern(Op::Recv, Vec::new(), ScheduleEnd::Wrap),
            Err(ConfigError::EmptyPattern)
        );
        assert_eq!(f.set_pattern(Op::Recv, vec![true], ScheduleEnd::Wrap), Ok(true));
    }
}
