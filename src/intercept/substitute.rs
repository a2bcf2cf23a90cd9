//! Substitute implementations.
//!
//! A test may replace the real implementation of an operation with its own
//! function. The substitute only runs for monitored calls that the failure
//! schedule lets through; its result is recorded like a real one.

use std::io::{self, IoSlice, IoSliceMut};
use std::net::{Shutdown, SocketAddr};
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

use tracing::debug;

use super::real;
use super::record::AddrHints;

pub type GetAddrInfoFn =
    Box<dyn FnMut(Option<&str>, Option<&str>, Option<&AddrHints>) -> Result<*mut libc::addrinfo, i32>>;
pub type GetNameInfoFn = Box<dyn FnMut(&SocketAddr, i32) -> Result<(String, String), i32>>;
pub type GaiStrerrorFn = Box<dyn FnMut(i32) -> String>;
pub type SocketFn = Box<dyn FnMut(i32, i32, i32) -> io::Result<RawFd>>;
/// `bind` and `connect`.
pub type AddressFn = Box<dyn FnMut(RawFd, &SocketAddr) -> io::Result<()>>;
pub type ListenFn = Box<dyn FnMut(RawFd, i32) -> io::Result<()>>;
pub type AcceptFn = Box<dyn FnMut(RawFd) -> io::Result<(RawFd, Option<SocketAddr>)>>;
pub type SendFn = Box<dyn FnMut(RawFd, &[u8], i32) -> io::Result<usize>>;
pub type SendToFn = Box<dyn FnMut(RawFd, &[u8], i32, &SocketAddr) -> io::Result<usize>>;
pub type SendMsgFn = Box<dyn FnMut(RawFd, &[IoSlice<'_>], i32) -> io::Result<usize>>;
pub type RecvFn = Box<dyn FnMut(RawFd, &mut [u8], i32) -> io::Result<usize>>;
pub type RecvFromFn = Box<dyn FnMut(RawFd, &mut [u8], i32) -> io::Result<(usize, Option<SocketAddr>)>>;
pub type RecvMsgFn = Box<dyn FnMut(RawFd, &mut [IoSliceMut<'_>], i32) -> io::Result<usize>>;
pub type ShutdownFn = Box<dyn FnMut(RawFd, Shutdown) -> io::Result<()>>;
pub type PollFn = Box<dyn FnMut(&mut [libc::pollfd], i32) -> io::Result<usize>>;
pub type SelectFn = Box<
    dyn FnMut(
        i32,
        Option<&mut libc::fd_set>,
        Option<&mut libc::fd_set>,
        Option<&mut libc::fd_set>,
        Option<Duration>,
    ) -> io::Result<usize>,
>;

/// Per-operation substitutes. `None` means the real implementation.
#[derive(Default)]
pub struct Substitutes {
    pub getaddrinfo: Option<GetAddrInfoFn>,
    pub getnameinfo: Option<GetNameInfoFn>,
    pub gai_strerror: Option<GaiStrerrorFn>,
    pub accept: Option<AcceptFn>,
    pub bind: Option<AddressFn>,
    pub connect: Option<AddressFn>,
    pub listen: Option<ListenFn>,
    pub poll: Option<PollFn>,
    pub recv: Option<RecvFn>,
    pub recvfrom: Option<RecvFromFn>,
    pub recvmsg: Option<RecvMsgFn>,
    pub select: Option<SelectFn>,
    pub send: Option<SendFn>,
    pub sendto: Option<SendToFn>,
    pub sendmsg: Option<SendMsgFn>,
    pub shutdown: Option<ShutdownFn>,
    pub socket: Option<SocketFn>,
}

impl Substitutes {
    /// Restore every real implementation.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl std::fmt::Debug for Substitutes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = [
            ("getaddrinfo", self.getaddrinfo.is_some()),
            ("getnameinfo", self.getnameinfo.is_some()),
            ("gai_strerror", self.gai_strerror.is_some()),
            ("accept", self.accept.is_some()),
            ("bind", self.bind.is_some()),
            ("connect", self.connect.is_some()),
            ("listen", self.listen.is_some()),
            ("poll", self.poll.is_some()),
            ("recv", self.recv.is_some()),
            ("recvfrom", self.recvfrom.is_some()),
            ("recvmsg", self.recvmsg.is_some()),
            ("select", self.select.is_some()),
            ("send", self.send.is_some()),
            ("sendto", self.sendto.is_some()),
            ("sendmsg", self.sendmsg.is_some()),
            ("shutdown", self.shutdown.is_some()),
            ("socket", self.socket.is_some()),
        ];
        f.debug_list()
            .entries(set.iter().filter(|(_, on)| *on).map(|(name, _)| name))
            .finish()
    }
}

/// Resolve like `getaddrinfo`, then keep only the entries that are usable.
///
/// An entry is usable if a socket can be created from it and then bound
/// (passive lookups with no node) or connected (everything else). Unusable
/// entries are unlinked and released. Fails with `EAI_NONAME` if nothing
/// survives.
pub fn filtered_getaddrinfo(
    node: Option<&str>,
    service: Option<&str>,
    hints: Option<&AddrHints>,
) -> Result<*mut libc::addrinfo, i32> {
    let head = real::getaddrinfo(node, service, hints)?;
    let passive = node.is_none() && hints.map_or(false, |h| h.flags & libc::AI_PASSIVE != 0);

    let mut kept: *mut libc::addrinfo = ptr::null_mut();
    let mut tail: *mut libc::addrinfo = ptr::null_mut();
    let mut canonname: *mut libc::c_char = ptr::null_mut();
    let mut cur = head;
    let mut dropped = 0usize;

    // SAFETY: `head` is a fresh list we own. Each node is detached before
    // being either relinked or released on its own.
    unsafe {
        while !cur.is_null() {
            let next = (*cur).ai_next;
            (*cur).ai_next = ptr::null_mut();
            if canonname.is_null() && !(*cur).ai_canonname.is_null() {
                canonname = (*cur).ai_canonname;
                (*cur).ai_canonname = ptr::null_mut();
            }
            if usable(&*cur, passive) {
                if tail.is_null() {
                    kept = cur;
                } else {
                    (*tail).ai_next = cur;
                }
                tail = cur;
            } else {
                dropped += 1;
                real::freeaddrinfo(cur);
            }
            cur = next;
        }
        if kept.is_null() {
            if !canonname.is_null() {
                libc::free(canonname as *mut libc::c_void);
            }
            debug!(dropped, "filtered_getaddrinfo: no usable entry");
            return Err(libc::EAI_NONAME);
        }
        (*kept).ai_canonname = canonname;
    }
    debug!(dropped, "filtered_getaddrinfo: unusable entries removed");
    Ok(kept)
}

fn usable(ai: &libc::addrinfo, passive: bool) -> bool {
    let Ok(fd) = real::socket(ai.ai_family, ai.ai_socktype, ai.ai_protocol) else {
        return false;
    };
    // SAFETY: ai_addr/ai_addrlen describe the entry's own address.
    let ret = unsafe {
        if passive {
            libc::bind(fd, ai.ai_addr, ai.ai_addrlen)
        } else {
            libc::connect(fd, ai.ai_addr, ai.ai_addrlen)
        }
    };
    let _ = real::close(fd);
    ret == 0
}
