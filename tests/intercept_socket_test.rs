//! Tests for the socket family of the interception layer.

use std::cell::Cell;
use std::io::{IoSlice, IoSliceMut};
use std::mem::ManuallyDrop;
use std::net::{Shutdown, SocketAddr, TcpListener, UdpSocket};
use std::os::fd::{FromRawFd, RawFd};
use std::rc::Rc;

use ctester::intercept::{real, Op, ScheduleEnd, TestContext, FAIL_FIRST};

fn monitored() -> TestContext {
    let mut ctx = TestContext::default();
    ctx.monitor_family(&Op::SOCKET);
    ctx.start_monitoring();
    ctx
}

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

/// Listening TCP socket on an ephemeral loopback port.
fn listener(ctx: &mut TestContext) -> (RawFd, SocketAddr) {
    let fd = ctx.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
    ctx.bind(fd, &loopback()).unwrap();
    ctx.listen(fd, 4).unwrap();
    // Borrow the descriptor only to read its bound address.
    let view = ManuallyDrop::new(unsafe { TcpListener::from_raw_fd(fd) });
    (fd, view.local_addr().unwrap())
}

#[test]
fn test_tcp_exchange_is_recorded() {
    let mut ctx = monitored();
    let (lfd, addr) = listener(&mut ctx);

    let cfd = ctx.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
    ctx.connect(cfd, &addr).unwrap();
    let (sfd, peer) = ctx.accept(lfd).unwrap();
    assert!(peer.is_some());
    assert_eq!(ctx.stats().accept.last_return.unwrap().addr, peer);

    assert_eq!(ctx.send(cfd, b"PING", 0).unwrap(), 4);
    let mut buf = [0u8; 16];
    let n = ctx.recv(sfd, &mut buf, 0).unwrap();
    assert_eq!(&buf[..n], b"PING");

    let sent = ctx
        .sendmsg(sfd, &[IoSlice::new(b"PO"), IoSlice::new(b"NG")], 0)
        .unwrap();
    assert_eq!(sent, 4);
    let mut head = [0u8; 2];
    let mut tail = [0u8; 2];
    let got = ctx
        .recvmsg(
            cfd,
            &mut [IoSliceMut::new(&mut head), IoSliceMut::new(&mut tail)],
            libc::MSG_WAITALL,
        )
        .unwrap();
    assert_eq!(got, 4);
    assert_eq!((&head, &tail), (b"PO", b"NG"));

    ctx.shutdown(cfd, Shutdown::Both).unwrap();

    let stats = ctx.stats();
    assert_eq!(stats.socket.called, 2);
    assert_eq!(stats.bind.last_params.unwrap().addr, loopback());
    assert_eq!(stats.listen.last_params.unwrap().backlog, 4);
    assert_eq!(stats.connect.last_params.unwrap().addr, addr);
    assert_eq!(stats.send.last_params.as_ref().unwrap().data, b"PING");
    assert_eq!(stats.recv.last_return, Some(4));
    assert_eq!(stats.sendmsg.last_params.as_ref().unwrap().iov_lens, vec![2, 2]);
    assert_eq!(stats.send_all, 2);
    assert_eq!(stats.recv_all, 2);
    assert_eq!(stats.shutdown.last_params.unwrap().how, Shutdown::Both);

    for fd in [cfd, sfd, lfd] {
        real::close(fd).unwrap();
    }
}

#[test]
fn test_udp_source_address_is_recorded() {
    let mut ctx = monitored();
    let a = ctx.socket(libc::AF_INET, libc::SOCK_DGRAM, 0).unwrap();
    let b = ctx.socket(libc::AF_INET, libc::SOCK_DGRAM, 0).unwrap();
    ctx.bind(a, &loopback()).unwrap();
    ctx.bind(b, &loopback()).unwrap();

    let view = ManuallyDrop::new(unsafe { UdpSocket::from_raw_fd(b) });
    let b_addr = view.local_addr().unwrap();

    assert_eq!(ctx.sendto(a, b"hello", 0, &b_addr).unwrap(), 5);
    let mut buf = [0u8; 32];
    let (n, from) = ctx.recvfrom(b, &mut buf, 0).unwrap();
    assert_eq!(&buf[..n], b"hello");

    let record = ctx.stats().recvfrom.last_return.unwrap();
    assert_eq!(record.len, 5);
    assert_eq!(record.addr, from);
    assert_eq!(from.map(|f| f.ip()), Some(b_addr.ip()));
    assert_eq!(ctx.stats().sendto.last_params.as_ref().unwrap().addr, b_addr);

    real::close(a).unwrap();
    real::close(b).unwrap();
}

#[test]
fn test_scripted_connect_failure() {
    let mut ctx = monitored();
    ctx.failures_mut().set_bits(Op::Connect, FAIL_FIRST);
    let fd = ctx.socket(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();

    let err = ctx.connect(fd, &"127.0.0.1:9".parse().unwrap()).unwrap_err();
    assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED));
    assert_eq!(ctx.stats().connect.last_return, Some(-1));
    assert_eq!(ctx.stats().last_errno(Op::Connect), Some(libc::ECONNREFUSED));
    real::close(fd).unwrap();
}

#[test]
fn test_fail_pass_fail_skips_calls_one_and_three() {
    let mut ctx = monitored();
    ctx.failures_mut()
        .set_pattern(Op::Connect, vec![true, false, true], ScheduleEnd::Pass)
        .unwrap();
    let reached = Rc::new(Cell::new(0));
    let counter = Rc::clone(&reached);
    ctx.substitutes_mut().connect = Some(Box::new(move |_, _| {
        counter.set(counter.get() + 1);
        Ok(())
    }));

    let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
    let results: Vec<_> = (0..3).map(|_| ctx.connect(7, &addr)).collect();

    assert_eq!(
        results[0].as_ref().unwrap_err().raw_os_error(),
        Some(libc::ECONNREFUSED)
    );
    assert!(results[1].is_ok());
    assert_eq!(
        results[2].as_ref().unwrap_err().raw_os_error(),
        Some(libc::ECONNREFUSED)
    );
    assert_eq!(reached.get(), 1);
    assert_eq!(ctx.stats().connect.called, 3);

    // Past the pattern, calls pass through.
    assert!(ctx.connect(7, &addr).is_ok());
    assert_eq!(reached.get(), 2);
}

#[test]
fn test_clamped_pattern_keeps_failing_recv() {
    let mut ctx = monitored();
    ctx.failures_mut()
        .set_pattern(Op::Recv, vec![false, true], ScheduleEnd::Clamp)
        .unwrap();
    if let Some(schedule) = ctx.failures_mut().errno_schedule(Op::Recv) {
        schedule.set_scripted(libc::EAGAIN);
    }
    ctx.substitutes_mut().recv = Some(Box::new(|_, buf, _| {
        buf[0] = b'x';
        Ok(1)
    }));

    let mut buf = [0u8; 1];
    assert_eq!(ctx.recv(7, &mut buf, 0).unwrap(), 1);
    for _ in 0..3 {
        let err = ctx.recv(7, &mut buf, 0).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::EAGAIN));
    }
    assert_eq!(ctx.stats().recv.called, 4);
    assert_eq!(ctx.stats().recv_all, 4);
}

#[test]
fn test_unmonitored_op_is_not_counted() {
    let mut ctx = monitored();
    ctx.unmonitor(Op::Socket);
    let fd = ctx.socket(libc::AF_INET, libc::SOCK_DGRAM, 0).unwrap();
    assert_eq!(ctx.stats().socket.called, 0);
    ctx.shutdown(fd, Shutdown::Read).ok();
    assert_eq!(ctx.stats().shutdown.called, 1);
    real::close(fd).unwrap();
}
