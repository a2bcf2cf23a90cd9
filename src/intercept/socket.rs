//! Socket family dispatch.
//!
//! Every operation follows the same shape: count and snapshot, consume a
//! schedule slot, then either fail with the scheduled errno or run the
//! substitute (or real call) and record its result. Socket operations
//! record their return in C style: the value on success, -1 on failure.

use std::io::{self, IoSlice, IoSliceMut};
use std::net::{Shutdown, SocketAddr};
use std::os::fd::RawFd;
use std::time::Duration;

use tracing::debug;

use super::context::TestContext;
use super::op::Op;
use super::real;
use super::record::{
    AcceptReturn, AddressParams, CallRecord, FdParams, ListenParams, MsgParams, PollEntry,
    PollParams, RecvFromReturn, RecvParams, SelectParams, SendParams, SendToParams,
    ShutdownParams, SocketParams,
};
use super::schedule::FailureSchedule;

fn dispatch<P, T, R>(
    op: Op,
    record: &mut CallRecord<P, R>,
    schedule: &mut FailureSchedule<i32>,
    params: P,
    failed: R,
    call: impl FnOnce() -> io::Result<T>,
    ret: impl FnOnce(&T) -> R,
) -> io::Result<T> {
    record.enter(params);
    if let Some(errno) = schedule.next() {
        debug!(%op, errno, "scheduled failure");
        real::set_errno(errno);
        record.fail(failed, Some(errno));
        return Err(io::Error::from_raw_os_error(errno));
    }
    let result = call();
    match &result {
        Ok(value) => record.finish(ret(value)),
        Err(err) => record.fail(failed, err.raw_os_error()),
    }
    result
}

impl TestContext {
    pub fn socket(&mut self, domain: i32, ty: i32, protocol: i32) -> io::Result<RawFd> {
        if !self.is_monitored(Op::Socket) {
            return real::socket(domain, ty, protocol);
        }
        let substitute = &mut self.substitutes.socket;
        dispatch(
            Op::Socket,
            &mut self.stats.socket,
            &mut self.failures.socket,
            SocketParams {
                domain,
                ty,
                protocol,
            },
            -1,
            || match substitute {
                Some(f) => f(domain, ty, protocol),
                None => real::socket(domain, ty, protocol),
            },
            |fd| *fd as isize,
        )
    }

    pub fn bind(&mut self, fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
        if !self.is_monitored(Op::Bind) {
            return real::bind(fd, addr);
        }
        let substitute = &mut self.substitutes.bind;
        dispatch(
            Op::Bind,
            &mut self.stats.bind,
            &mut self.failures.bind,
            AddressParams { fd, addr: *addr },
            -1,
            || match substitute {
                Some(f) => f(fd, addr),
                None => real::bind(fd, addr),
            },
            |_| 0,
        )
    }

    pub fn connect(&mut self, fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
        if !self.is_monitored(Op::Connect) {
            return real::connect(fd, addr);
        }
        let substitute = &mut self.substitutes.connect;
        dispatch(
            Op::Connect,
            &mut self.stats.connect,
            &mut self.failures.connect,
            AddressParams { fd, addr: *addr },
            -1,
            || match substitute {
                Some(f) => f(fd, addr),
                None => real::connect(fd, addr),
            },
            |_| 0,
        )
    }

    pub fn listen(&mut self, fd: RawFd, backlog: i32) -> io::Result<()> {
        if !self.is_monitored(Op::Listen) {
            return real::listen(fd, backlog);
        }
        let substitute = &mut self.substitutes.listen;
        dispatch(
            Op::Listen,
            &mut self.stats.listen,
            &mut self.failures.listen,
            ListenParams { fd, backlog },
            -1,
            || match substitute {
                Some(f) => f(fd, backlog),
                None => real::listen(fd, backlog),
            },
            |_| 0,
        )
    }

    /// Accept a connection. The peer address is recorded alongside the
    /// new descriptor.
    pub fn accept(&mut self, fd: RawFd) -> io::Result<(RawFd, Option<SocketAddr>)> {
        if !self.is_monitored(Op::Accept) {
            return real::accept(fd);
        }
        let substitute = &mut self.substitutes.accept;
        dispatch(
            Op::Accept,
            &mut self.stats.accept,
            &mut self.failures.accept,
            FdParams { fd },
            AcceptReturn { fd: -1, addr: None },
            || match substitute {
                Some(f) => f(fd),
                None => real::accept(fd),
            },
            |(conn, addr)| AcceptReturn {
                fd: *conn,
                addr: *addr,
            },
        )
    }

    pub fn send(&mut self, fd: RawFd, buf: &[u8], flags: i32) -> io::Result<usize> {
        if !self.is_monitored(Op::Send) {
            return real::send(fd, buf, flags);
        }
        self.stats.send_all += 1;
        let substitute = &mut self.substitutes.send;
        dispatch(
            Op::Send,
            &mut self.stats.send,
            &mut self.failures.send,
            SendParams {
                fd,
                data: buf.to_vec(),
                flags,
            },
            -1,
            || match substitute {
                Some(f) => f(fd, buf, flags),
                None => real::send(fd, buf, flags),
            },
            |n| *n as isize,
        )
    }

    pub fn sendto(
        &mut self,
        fd: RawFd,
        buf: &[u8],
        flags: i32,
        addr: &SocketAddr,
    ) -> io::Result<usize> {
        if !self.is_monitored(Op::SendTo) {
            return real::sendto(fd, buf, flags, addr);
        }
        self.stats.send_all += 1;
        let substitute = &mut self.substitutes.sendto;
        dispatch(
            Op::SendTo,
            &mut self.stats.sendto,
            &mut self.failures.sendto,
            SendToParams {
                fd,
                data: buf.to_vec(),
                flags,
                addr: *addr,
            },
            -1,
            || match substitute {
                Some(f) => f(fd, buf, flags, addr),
                None => real::sendto(fd, buf, flags, addr),
            },
            |n| *n as isize,
        )
    }

    pub fn sendmsg(&mut self, fd: RawFd, bufs: &[IoSlice<'_>], flags: i32) -> io::Result<usize> {
        if !self.is_monitored(Op::SendMsg) {
            return real::sendmsg(fd, bufs, flags);
        }
        self.stats.send_all += 1;
        let substitute = &mut self.substitutes.sendmsg;
        dispatch(
            Op::SendMsg,
            &mut self.stats.sendmsg,
            &mut self.failures.sendmsg,
            MsgParams {
                fd,
                iov_lens: bufs.iter().map(|b| b.len()).collect(),
                flags,
            },
            -1,
            || match substitute {
                Some(f) => f(fd, bufs, flags),
                None => real::sendmsg(fd, bufs, flags),
            },
            |n| *n as isize,
        )
    }

    pub fn recv(&mut self, fd: RawFd, buf: &mut [u8], flags: i32) -> io::Result<usize> {
        if !self.is_monitored(Op::Recv) {
            return real::recv(fd, buf, flags);
        }
        self.stats.recv_all += 1;
        let substitute = &mut self.substitutes.recv;
        let len = buf.len();
        dispatch(
            Op::Recv,
            &mut self.stats.recv,
            &mut self.failures.recv,
            RecvParams { fd, len, flags },
            -1,
            || match substitute {
                Some(f) => f(fd, buf, flags),
                None => real::recv(fd, buf, flags),
            },
            |n| *n as isize,
        )
    }

    /// Receive a datagram. The source address is recorded with the length.
    pub fn recvfrom(
        &mut self,
        fd: RawFd,
        buf: &mut [u8],
        flags: i32,
    ) -> io::Result<(usize, Option<SocketAddr>)> {
        if !self.is_monitored(Op::RecvFrom) {
            return real::recvfrom(fd, buf, flags);
        }
        self.stats.recv_all += 1;
        let substitute = &mut self.substitutes.recvfrom;
        let len = buf.len();
        dispatch(
            Op::RecvFrom,
            &mut self.stats.recvfrom,
            &mut self.failures.recvfrom,
            RecvParams { fd, len, flags },
            RecvFromReturn { len: -1, addr: None },
            || match substitute {
                Some(f) => f(fd, buf, flags),
                None => real::recvfrom(fd, buf, flags),
            },
            |(n, addr)| RecvFromReturn {
                len: *n as isize,
                addr: *addr,
            },
        )
    }

    pub fn recvmsg(
        &mut self,
        fd: RawFd,
        bufs: &mut [IoSliceMut<'_>],
        flags: i32,
    ) -> io::Result<usize> {
        if !self.is_monitored(Op::RecvMsg) {
            return real::recvmsg(fd, bufs, flags);
        }
        self.stats.recv_all += 1;
        let substitute = &mut self.substitutes.recvmsg;
        let iov_lens = bufs.iter().map(|b| b.len()).collect();
        dispatch(
            Op::RecvMsg,
            &mut self.stats.recvmsg,
            &mut self.failures.recvmsg,
            MsgParams {
                fd,
                iov_lens,
                flags,
            },
            -1,
            || match substitute {
                Some(f) => f(fd, bufs, flags),
                None => real::recvmsg(fd, bufs, flags),
            },
            |n| *n as isize,
        )
    }

    pub fn shutdown(&mut self, fd: RawFd, how: Shutdown) -> io::Result<()> {
        if !self.is_monitored(Op::Shutdown) {
            return real::shutdown(fd, how);
        }
        let substitute = &mut self.substitutes.shutdown;
        dispatch(
            Op::Shutdown,
            &mut self.stats.shutdown,
            &mut self.failures.shutdown,
            ShutdownParams { fd, how },
            -1,
            || match substitute {
                Some(f) => f(fd, how),
                None => real::shutdown(fd, how),
            },
            |_| 0,
        )
    }

    /// `poll`. The descriptor list is copied into the record before the
    /// call, so later changes by the caller do not show up.
    pub fn poll(&mut self, fds: &mut [libc::pollfd], timeout_ms: i32) -> io::Result<usize> {
        if !self.is_monitored(Op::Poll) {
            return real::poll(fds, timeout_ms);
        }
        let substitute = &mut self.substitutes.poll;
        let entries = fds
            .iter()
            .map(|p| PollEntry {
                fd: p.fd,
                events: p.events,
            })
            .collect();
        dispatch(
            Op::Poll,
            &mut self.stats.poll,
            &mut self.failures.poll,
            PollParams {
                fds: entries,
                timeout_ms,
            },
            -1,
            || match substitute {
                Some(f) => f(fds, timeout_ms),
                None => real::poll(fds, timeout_ms),
            },
            |n| *n as isize,
        )
    }

    /// `select`. The members of each set and the timeout are recorded as
    /// they were on entry.
    pub fn select(
        &mut self,
        nfds: i32,
        read: Option<&mut libc::fd_set>,
        write: Option<&mut libc::fd_set>,
        except: Option<&mut libc::fd_set>,
        timeout: Option<Duration>,
    ) -> io::Result<usize> {
        if !self.is_monitored(Op::Select) {
            return real::select(nfds, read, write, except, timeout);
        }
        let substitute = &mut self.substitutes.select;
        let params = SelectParams {
            nfds,
            read: read.as_deref().map(|s| real::fd_list(s, nfds)),
            write: write.as_deref().map(|s| real::fd_list(s, nfds)),
            except: except.as_deref().map(|s| real::fd_list(s, nfds)),
            timeout,
        };
        dispatch(
            Op::Select,
            &mut self.stats.select,
            &mut self.failures.select,
            params,
            -1,
            || match substitute {
                Some(f) => f(nfds, read, write, except, timeout),
                None => real::select(nfds, read, write, except, timeout),
            },
            |n| *n as isize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intercept::schedule::{FAIL_ALWAYS, FAIL_FIRST};

    fn monitored(op: Op) -> TestContext {
        let mut ctx = TestContext::default();
        ctx.monitor(op);
        ctx.start_monitoring();
        ctx
    }

    #[test]
    fn scheduled_socket_failure_reports_errno() {
        let mut ctx = monitored(Op::Socket);
        ctx.failures_mut().socket.set_bits(FAIL_FIRST);
        let err = ctx.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EMFILE));
        assert_eq!(ctx.stats().socket.last_return, Some(-1));
        assert_eq!(ctx.stats().last_errno(Op::Socket), Some(libc::EMFILE));

        let fd = ctx.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
        assert_eq!(ctx.stats().socket.last_return, Some(fd as isize));
        assert_eq!(ctx.stats().socket.called, 2);
        real::close(fd).unwrap();
    }

    #[test]
    fn substitute_send_is_recorded() {
        let mut ctx = monitored(Op::Send);
        ctx.substitutes_mut().send = Some(Box::new(|_, buf, _| Ok(buf.len() / 2)));
        assert_eq!(ctx.send(99, b"abcd", 0).unwrap(), 2);
        let params = ctx.stats().send.last_params.clone().unwrap();
        assert_eq!(params.data, b"abcd");
        assert_eq!(ctx.stats().send.last_return, Some(2));
        assert_eq!(ctx.stats().send_all, 1);
    }

    #[test]
    fn select_records_set_members() {
        let mut ctx = monitored(Op::Select);
        ctx.failures_mut().select.set_bits(FAIL_ALWAYS);
        let mut read: libc::fd_set = unsafe { std::mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut read);
            libc::FD_SET(0, &mut read);
        }
        let err = ctx
            .select(1, Some(&mut read), None, None, Some(Duration::from_millis(5)))
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EINTR));
        let params = ctx.stats().select.last_params.clone().unwrap();
        assert_eq!(params.read, Some(vec![0]));
        assert_eq!(params.write, None);
        assert_eq!(params.timeout, Some(Duration::from_millis(5)));
    }

    #[test]
    fn poll_copies_entries() {
        let mut ctx = monitored(Op::Poll);
        let mut fds = [libc::pollfd {
            fd: -1,
            events: libc::POLLIN,
            revents: 0,
        }];
        assert_eq!(ctx.poll(&mut fds, 0).unwrap(), 0);
        let params = ctx.stats().poll.last_params.clone().unwrap();
        assert_eq!(
            params.fds,
            vec![PollEntry {
                fd: -1,
                events: libc::POLLIN
            }]
        );
    }
}
