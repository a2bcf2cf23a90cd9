//! Real implementations, reached when a call is not monitored, not failed
//! and not substituted.
//!
//! Thin wrappers over `libc`. Socket calls return `io::Result` built from
//! the thread's errno; resolver calls return the `EAI_*` code as the error.

use std::ffi::{CStr, CString};
use std::io::{self, IoSlice, IoSliceMut};
use std::mem;
use std::net::{Shutdown, SocketAddr};
use std::os::fd::RawFd;
use std::ptr;
use std::time::Duration;

use libc::{c_char, c_int, c_void};

use super::record::AddrHints;
use super::sockaddr;

/// Set the calling thread's errno.
pub fn set_errno(errno: i32) {
    // SAFETY: the errno location is thread-local and always valid.
    unsafe {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            *libc::__errno_location() = errno;
        }
        #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
        {
            *libc::__error() = errno;
        }
    }
}

fn check(ret: c_int) -> io::Result<c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

fn check_len(ret: isize) -> io::Result<usize> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret as usize)
    }
}

pub fn malloc(size: usize) -> *mut c_void {
    // SAFETY: malloc has no preconditions.
    unsafe { libc::malloc(size) }
}

pub fn calloc(nmemb: usize, size: usize) -> *mut c_void {
    // SAFETY: calloc has no preconditions.
    unsafe { libc::calloc(nmemb, size) }
}

/// # Safety
/// `ptr` must be null or a block obtained from this allocator.
pub unsafe fn realloc(ptr: *mut c_void, size: usize) -> *mut c_void {
    libc::realloc(ptr, size)
}

/// # Safety
/// `ptr` must be null or a live block obtained from this allocator.
pub unsafe fn free(ptr: *mut c_void) {
    libc::free(ptr)
}

pub fn getaddrinfo(
    node: Option<&str>,
    service: Option<&str>,
    hints: Option<&AddrHints>,
) -> Result<*mut libc::addrinfo, i32> {
    let node = node
        .map(CString::new)
        .transpose()
        .map_err(|_| libc::EAI_NONAME)?;
    let service = service
        .map(CString::new)
        .transpose()
        .map_err(|_| libc::EAI_SERVICE)?;
    let hints = hints.map(|h| {
        // SAFETY: addrinfo is plain old data; all-zero is the documented
        // starting point for hints.
        let mut raw: libc::addrinfo = unsafe { mem::zeroed() };
        raw.ai_flags = h.flags;
        raw.ai_family = h.family;
        raw.ai_socktype = h.socktype;
        raw.ai_protocol = h.protocol;
        raw
    });

    let mut res: *mut libc::addrinfo = ptr::null_mut();
    // SAFETY: every pointer is either null or points at a live local.
    let code = unsafe {
        libc::getaddrinfo(
            node.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
            service.as_ref().map_or(ptr::null(), |c| c.as_ptr()),
            hints.as_ref().map_or(ptr::null(), |h| h as *const _),
            &mut res,
        )
    };
    if code == 0 {
        Ok(res)
    } else {
        Err(code)
    }
}

/// # Safety
/// `res` must be null or a list head produced by `getaddrinfo`.
pub unsafe fn freeaddrinfo(res: *mut libc::addrinfo) {
    if !res.is_null() {
        libc::freeaddrinfo(res)
    }
}

pub fn getnameinfo(addr: &SocketAddr, flags: i32) -> Result<(String, String), i32> {
    let (storage, len) = sockaddr::to_raw(addr);
    let mut host = [0 as c_char; libc::NI_MAXHOST as usize];
    let mut serv = [0 as c_char; 32];
    // SAFETY: buffers are local and their lengths are passed alongside.
    let code = unsafe {
        libc::getnameinfo(
            &storage as *const _ as *const libc::sockaddr,
            len,
            host.as_mut_ptr(),
            host.len() as libc::socklen_t,
            serv.as_mut_ptr(),
            serv.len() as libc::socklen_t,
            flags,
        )
    };
    if code != 0 {
        return Err(code);
    }
    // SAFETY: on success both buffers hold NUL-terminated strings.
    let (host, serv) = unsafe {
        (
            CStr::from_ptr(host.as_ptr()).to_string_lossy().into_owned(),
            CStr::from_ptr(serv.as_ptr()).to_string_lossy().into_owned(),
        )
    };
    Ok((host, serv))
}

pub fn gai_strerror(code: i32) -> String {
    // SAFETY: gai_strerror returns a pointer to a static string.
    unsafe {
        let msg = libc::gai_strerror(code);
        if msg.is_null() {
            return format!("unknown resolver error {code}");
        }
        CStr::from_ptr(msg).to_string_lossy().into_owned()
    }
}

pub fn socket(domain: i32, ty: i32, protocol: i32) -> io::Result<RawFd> {
    // SAFETY: socket has no memory preconditions.
    check(unsafe { libc::socket(domain, ty, protocol) })
}

pub fn bind(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = sockaddr::to_raw(addr);
    // SAFETY: storage outlives the call and len matches its contents.
    check(unsafe { libc::bind(fd, &storage as *const _ as *const libc::sockaddr, len) }).map(drop)
}

pub fn connect(fd: RawFd, addr: &SocketAddr) -> io::Result<()> {
    let (storage, len) = sockaddr::to_raw(addr);
    // SAFETY: storage outlives the call and len matches its contents.
    check(unsafe { libc::connect(fd, &storage as *const _ as *const libc::sockaddr, len) })
        .map(drop)
}

pub fn listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    // SAFETY: listen has no memory preconditions.
    check(unsafe { libc::listen(fd, backlog) }).map(drop)
}

pub fn accept(fd: RawFd) -> io::Result<(RawFd, Option<SocketAddr>)> {
    // SAFETY: all-zero storage is valid; the kernel fills at most `len` bytes.
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let conn = check(unsafe {
        libc::accept(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len)
    })?;
    Ok((conn, sockaddr::from_storage(&storage, len)))
}

pub fn send(fd: RawFd, buf: &[u8], flags: i32) -> io::Result<usize> {
    // SAFETY: buf is valid for buf.len() bytes.
    check_len(unsafe { libc::send(fd, buf.as_ptr() as *const c_void, buf.len(), flags) })
}

pub fn sendto(fd: RawFd, buf: &[u8], flags: i32, addr: &SocketAddr) -> io::Result<usize> {
    let (storage, len) = sockaddr::to_raw(addr);
    // SAFETY: buf and storage are valid for the lengths passed.
    check_len(unsafe {
        libc::sendto(
            fd,
            buf.as_ptr() as *const c_void,
            buf.len(),
            flags,
            &storage as *const _ as *const libc::sockaddr,
            len,
        )
    })
}

pub fn sendmsg(fd: RawFd, bufs: &[IoSlice<'_>], flags: i32) -> io::Result<usize> {
    // SAFETY: all-zero msghdr is valid; IoSlice is ABI compatible with iovec.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = bufs.as_ptr() as *mut libc::iovec;
    msg.msg_iovlen = bufs.len() as _;
    check_len(unsafe { libc::sendmsg(fd, &msg, flags) })
}

pub fn recv(fd: RawFd, buf: &mut [u8], flags: i32) -> io::Result<usize> {
    // SAFETY: buf is valid for writes of buf.len() bytes.
    check_len(unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut c_void, buf.len(), flags) })
}

pub fn recvfrom(
    fd: RawFd,
    buf: &mut [u8],
    flags: i32,
) -> io::Result<(usize, Option<SocketAddr>)> {
    // SAFETY: all-zero storage is valid; the kernel fills at most `len` bytes.
    let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
    let n = check_len(unsafe {
        libc::recvfrom(
            fd,
            buf.as_mut_ptr() as *mut c_void,
            buf.len(),
            flags,
            &mut storage as *mut _ as *mut libc::sockaddr,
            &mut len,
        )
    })?;
    Ok((n, sockaddr::from_storage(&storage, len)))
}

pub fn recvmsg(fd: RawFd, bufs: &mut [IoSliceMut<'_>], flags: i32) -> io::Result<usize> {
    // SAFETY: all-zero msghdr is valid; IoSliceMut is ABI compatible with iovec.
    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_iov = bufs.as_mut_ptr() as *mut libc::iovec;
    msg.msg_iovlen = bufs.len() as _;
    check_len(unsafe { libc::recvmsg(fd, &mut msg, flags) })
}

pub fn shutdown(fd: RawFd, how: Shutdown) -> io::Result<()> {
    let how = match how {
        Shutdown::Read => libc::SHUT_RD,
        Shutdown::Write => libc::SHUT_WR,
        Shutdown::Both => libc::SHUT_RDWR,
    };
    // SAFETY: shutdown has no memory preconditions.
    check(unsafe { libc::shutdown(fd, how) }).map(drop)
}

pub fn poll(fds: &mut [libc::pollfd], timeout_ms: i32) -> io::Result<usize> {
    // SAFETY: fds is valid for fds.len() entries.
    check(unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) })
        .map(|n| n as usize)
}

fn set_ptr(set: Option<&mut libc::fd_set>) -> *mut libc::fd_set {
    set.map_or(ptr::null_mut(), |s| s as *mut _)
}

pub fn select(
    nfds: i32,
    read: Option<&mut libc::fd_set>,
    write: Option<&mut libc::fd_set>,
    except: Option<&mut libc::fd_set>,
    timeout: Option<Duration>,
) -> io::Result<usize> {
    let mut tv = timeout.map(|t| libc::timeval {
        tv_sec: t.as_secs() as libc::time_t,
        tv_usec: t.subsec_micros() as libc::suseconds_t,
    });
    // SAFETY: every pointer is null or a live exclusive reference.
    check(unsafe {
        libc::select(
            nfds,
            set_ptr(read),
            set_ptr(write),
            set_ptr(except),
            tv.as_mut().map_or(ptr::null_mut(), |t| t as *mut _),
        )
    })
    .map(|n| n as usize)
}

/// Descriptors set in `set` below `nfds`.
pub fn fd_list(set: &libc::fd_set, nfds: i32) -> Vec<RawFd> {
    // SAFETY: FD_ISSET only reads the set.
    (0..nfds.clamp(0, libc::FD_SETSIZE as i32))
        .filter(|fd| unsafe { libc::FD_ISSET(*fd, set) })
        .collect()
}

/// Close a descriptor. Not intercepted.
pub fn close(fd: RawFd) -> io::Result<()> {
    // SAFETY: close has no memory preconditions.
    check(unsafe { libc::close(fd) }).map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn socket_errors_carry_errno() {
        let err = socket(-1, libc::SOCK_STREAM, 0).unwrap_err();
        assert!(err.raw_os_error().is_some());
    }

    #[test]
    fn set_errno_is_visible_to_last_os_error() {
        set_errno(libc::EPIPE);
        assert_eq!(io::Error::last_os_error().raw_os_error(), Some(libc::EPIPE));
    }

    #[test]
    fn fd_list_reads_members() {
        let mut set: libc::fd_set = unsafe { mem::zeroed() };
        unsafe {
            libc::FD_ZERO(&mut set);
            libc::FD_SET(3, &mut set);
            libc::FD_SET(5, &mut set);
        }
        assert_eq!(fd_list(&set, 8), vec![3, 5]);
        assert_eq!(fd_list(&set, 4), vec![3]);
    }

    #[test]
    fn gai_strerror_is_never_empty() {
        assert!(!gai_strerror(libc::EAI_NONAME).is_empty());
    }
}
