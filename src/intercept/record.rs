//! Call records: per-operation statistics read by assertions.

use std::net::{Shutdown, SocketAddr};
use std::os::fd::RawFd;
use std::time::Duration;

use super::op::Op;

/// State kept for one monitored operation.
#[derive(Debug, Clone)]
pub struct CallRecord<P, R> {
    /// Number of monitored calls.
    pub called: u32,
    /// Parameters of the last monitored call.
    pub last_params: Option<P>,
    /// Result of the last monitored call.
    pub last_return: Option<R>,
    /// Error code set by the last monitored call, if any.
    pub last_errno: Option<i32>,
}

impl<P, R> Default for CallRecord<P, R> {
    fn default() -> Self {
        Self {
            called: 0,
            last_params: None,
            last_return: None,
            last_errno: None,
        }
    }
}

impl<P, R> CallRecord<P, R> {
    /// Count a call and snapshot its parameters.
    pub(crate) fn enter(&mut self, params: P) {
        self.called += 1;
        self.last_params = Some(params);
        self.last_errno = None;
    }

    pub(crate) fn finish(&mut self, ret: R) {
        self.last_return = Some(ret);
    }

    pub(crate) fn fail(&mut self, ret: R, errno: Option<i32>) {
        self.last_return = Some(ret);
        self.last_errno = errno;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MallocParams {
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallocParams {
    pub nmemb: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReallocParams {
    pub address: usize,
    pub size: usize,
}

/// What a monitored `free` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeOutcome {
    /// Null pointer: nothing to do.
    Null,
    /// Live block released.
    Released,
    /// Pointer was not a live block; forwarded to the real `free` anyway.
    Invalid,
    /// Scheduled failure: nothing released.
    Injected,
    /// Block the full ledger never logged; released without a violation.
    Untracked,
}

/// Copy of the `addrinfo` hints fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddrHints {
    pub flags: i32,
    pub family: i32,
    pub socktype: i32,
    pub protocol: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetAddrInfoParams {
    pub node: Option<String>,
    pub service: Option<String>,
    pub hints: Option<AddrHints>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetAddrInfoReturn {
    /// 0 on success, an `EAI_*` code otherwise.
    pub code: i32,
    /// Head of the produced list, 0 on failure.
    pub head: usize,
}

/// Status of the last monitored `freeaddrinfo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseStatus {
    /// Argument was a registered list head.
    Valid,
    /// Argument was not a registered list head.
    Invalid,
    /// Release checking is disabled.
    Unchecked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GetNameInfoParams {
    pub addr: SocketAddr,
    pub flags: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameInfoReturn {
    pub code: i32,
    pub host: Option<String>,
    pub service: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdParams {
    pub fd: RawFd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptReturn {
    pub fd: RawFd,
    /// Peer address filled in by the call.
    pub addr: Option<SocketAddr>,
}

/// Parameters of `bind` and `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressParams {
    pub fd: RawFd,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenParams {
    pub fd: RawFd,
    pub backlog: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollEntry {
    pub fd: RawFd,
    pub events: i16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollParams {
    pub fds: Vec<PollEntry>,
    pub timeout_ms: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvParams {
    pub fd: RawFd,
    pub len: usize,
    pub flags: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvFromReturn {
    pub len: isize,
    /// Source address filled in by the call.
    pub addr: Option<SocketAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgParams {
    pub fd: RawFd,
    /// Length of each I/O vector.
    pub iov_lens: Vec<usize>,
    pub flags: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectParams {
    pub nfds: i32,
    pub read: Option<Vec<RawFd>>,
    pub write: Option<Vec<RawFd>>,
    pub except: Option<Vec<RawFd>>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendParams {
    pub fd: RawFd,
    pub data: Vec<u8>,
    pub flags: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendToParams {
    pub fd: RawFd,
    pub data: Vec<u8>,
    pub flags: i32,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownParams {
    pub fd: RawFd,
    pub how: Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketParams {
    pub domain: i32,
    pub ty: i32,
    pub protocol: i32,
}

/// Memory accounting shared by the allocation family.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Bytes held by live monitored blocks.
    pub used: usize,
    /// Blocks that could not be logged because the ledger was full.
    pub overflowed: u32,
}

/// Statistics of every monitored operation.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub memory: MemoryStats,
    pub malloc: CallRecord<MallocParams, usize>,
    pub calloc: CallRecord<CallocParams, usize>,
    pub realloc: CallRecord<ReallocParams, usize>,
    pub free: CallRecord<usize, FreeOutcome>,

    pub getaddrinfo: CallRecord<GetAddrInfoParams, GetAddrInfoReturn>,
    pub freeaddrinfo: CallRecord<usize, ReleaseStatus>,
    pub getnameinfo: CallRecord<GetNameInfoParams, NameInfoReturn>,
    pub gai_strerror: CallRecord<i32, String>,

    pub accept: CallRecord<FdParams, AcceptReturn>,
    pub bind: CallRecord<AddressParams, isize>,
    pub connect: CallRecord<AddressParams, isize>,
    pub listen: CallRecord<ListenParams, isize>,
    pub poll: CallRecord<PollParams, isize>,
    pub recv: CallRecord<RecvParams, isize>,
    pub recvfrom: CallRecord<RecvParams, RecvFromReturn>,
    pub recvmsg: CallRecord<MsgParams, isize>,
    pub select: CallRecord<SelectParams, isize>,
    pub send: CallRecord<SendParams, isize>,
    pub sendto: CallRecord<SendToParams, isize>,
    pub sendmsg: CallRecord<MsgParams, isize>,
    pub shutdown: CallRecord<ShutdownParams, isize>,
    pub socket: CallRecord<SocketParams, isize>,

    /// Calls of any `recv*` operation.
    pub recv_all: u32,
    /// Calls of any `send*` operation.
    pub send_all: u32,
}

impl Stats {
    /// Monitored call count of `op`.
    pub fn called(&self, op: Op) -> u32 {
        match op {
            Op::Malloc => self.malloc.called,
            Op::Calloc => self.calloc.called,
            Op::Realloc => self.realloc.called,
            Op::Free => self.free.called,
            Op::GetAddrInfo => self.getaddrinfo.called,
            Op::FreeAddrInfo => self.freeaddrinfo.called,
            Op::GetNameInfo => self.getnameinfo.called,
            Op::GaiStrerror => self.gai_strerror.called,
            Op::Accept => self.accept.called,
            Op::Bind => self.bind.called,
            Op::Connect => self.connect.called,
            Op::Listen => self.listen.called,
            Op::Poll => self.poll.called,
            Op::Recv => self.recv.called,
            Op::RecvFrom => self.recvfrom.called,
            Op::RecvMsg => self.recvmsg.called,
            Op::Select => self.select.called,
            Op::Send => self.send.called,
            Op::SendTo => self.sendto.called,
            Op::SendMsg => self.sendmsg.called,
            Op::Shutdown => self.shutdown.called,
            Op::Socket => self.socket.called,
        }
    }

    /// Error code left by the last monitored call of `op`.
    pub fn last_errno(&self, op: Op) -> Option<i32> {
        match op {
            Op::Malloc => self.malloc.last_errno,
            Op::Calloc => self.calloc.last_errno,
            Op::Realloc => self.realloc.last_errno,
            Op::Free => self.free.last_errno,
            Op::GetAddrInfo => self.getaddrinfo.last_errno,
            Op::FreeAddrInfo => self.freeaddrinfo.last_errno,
            Op::GetNameInfo => self.getnameinfo.last_errno,
            Op::GaiStrerror => self.gai_strerror.last_errno,
            Op::Accept => self.accept.last_errno,
            Op::Bind => self.bind.last_errno,
            Op::Connect => self.connect.last_errno,
            Op::Listen => self.listen.last_errno,
            Op::Poll => self.poll.last_errno,
            Op::Recv => self.recv.last_errno,
            Op::RecvFrom => self.recvfrom.last_errno,
            Op::RecvMsg => self.recvmsg.last_errno,
            Op::Select => self.select.last_errno,
            Op::Send => self.send.last_errno,
            Op::SendTo => self.sendto.last_errno,
            Op::SendMsg => self.sendmsg.last_errno,
            Op::Shutdown => self.shutdown.last_errno,
            Op::Socket => self.socket.last_errno,
        }
    }

    /// Zero every record.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enter_counts_and_clears_errno() {
        let mut record: CallRecord<MallocParams, usize> = CallRecord::default();
        record.enter(MallocParams { size: 8 });
        record.fail(0, Some(libc::ENOMEM));
        assert_eq!(record.last_errno, Some(libc::ENOMEM));

        record.enter(MallocParams { size: 16 });
        record.finish(0x1000);
        assert_eq!(record.called, 2);
        assert_eq!(record.last_params, Some(MallocParams { size: 16 }));
        assert_eq!(record.last_return, Some(0x1000));
        assert_eq!(record.last_errno, None);
    }

    #[test]
    fn called_by_op() {
        let mut stats = Stats::default();
        stats.socket.enter(SocketParams {
            domain: libc::AF_INET,
            ty: libc::SOCK_STREAM,
            protocol: 0,
        });
        assert_eq!(stats.called(Op::Socket), 1);
        assert_eq!(stats.called(Op::Bind), 0);
        stats.reset();
        assert_eq!(stats.called(Op::Socket), 0);
    }
}
