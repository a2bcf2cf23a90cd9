//! Resolver family dispatch: `getaddrinfo`, `freeaddrinfo`, `getnameinfo`,
//! `gai_strerror`.

use std::net::SocketAddr;

use tracing::debug;

use super::context::TestContext;
use super::error::Violation;
use super::op::Op;
use super::real;
use super::record::{
    AddrHints, GetAddrInfoParams, GetAddrInfoReturn, GetNameInfoParams, NameInfoReturn,
    ReleaseStatus,
};

impl TestContext {
    /// Resolve `node`/`service`. Returns the list head or an `EAI_*` code.
    ///
    /// With resolution checking on, a successful head is registered so
    /// that only it may later be passed to [`TestContext::freeaddrinfo`].
    pub fn getaddrinfo(
        &mut self,
        node: Option<&str>,
        service: Option<&str>,
        hints: Option<&AddrHints>,
    ) -> Result<*mut libc::addrinfo, i32> {
        if !self.is_monitored(Op::GetAddrInfo) {
            return real::getaddrinfo(node, service, hints);
        }
        self.stats.getaddrinfo.enter(GetAddrInfoParams {
            node: node.map(str::to_owned),
            service: service.map(str::to_owned),
            hints: hints.copied(),
        });
        if let Some(failure) = self.failures.getaddrinfo.next() {
            debug!(?node, ?service, code = failure.code, "getaddrinfo: scheduled failure");
            if let Some(errno) = failure.errno {
                real::set_errno(errno);
            }
            self.stats.getaddrinfo.fail(
                GetAddrInfoReturn {
                    code: failure.code,
                    head: 0,
                },
                failure.errno,
            );
            return Err(failure.code);
        }
        let result = match self.substitutes.getaddrinfo.as_mut() {
            Some(substitute) => substitute(node, service, hints),
            None => real::getaddrinfo(node, service, hints),
        };
        match result {
            Ok(head) => {
                self.stats.getaddrinfo.finish(GetAddrInfoReturn {
                    code: 0,
                    head: head as usize,
                });
                if self.check_resolutions {
                    self.resolutions.register(head as usize);
                }
            }
            Err(code) => self
                .stats
                .getaddrinfo
                .finish(GetAddrInfoReturn { code, head: 0 }),
        }
        result
    }

    /// Release a resolution list.
    ///
    /// With checking on, `res` must be a registered head; anything else is
    /// reported. The real release runs either way. Null is a no-op.
    ///
    /// # Safety
    /// `res` must be null or a list head produced by `getaddrinfo`.
    pub unsafe fn freeaddrinfo(&mut self, res: *mut libc::addrinfo) {
        if !self.is_monitored(Op::FreeAddrInfo) {
            return real::freeaddrinfo(res);
        }
        let address = res as usize;
        self.stats.freeaddrinfo.enter(address);
        if res.is_null() {
            self.stats.freeaddrinfo.finish(ReleaseStatus::Unchecked);
            return;
        }
        let status = if !self.check_resolutions {
            ReleaseStatus::Unchecked
        } else if self.resolutions.release(address).is_ok() {
            ReleaseStatus::Valid
        } else {
            self.report(Violation::InvalidResolutionRelease { address });
            ReleaseStatus::Invalid
        };
        self.stats.freeaddrinfo.finish(status);
        real::freeaddrinfo(res);
    }

    /// Reverse lookup of `addr`. Returns `(host, service)` or an `EAI_*` code.
    pub fn getnameinfo(&mut self, addr: &SocketAddr, flags: i32) -> Result<(String, String), i32> {
        if !self.is_monitored(Op::GetNameInfo) {
            return real::getnameinfo(addr, flags);
        }
        self.stats
            .getnameinfo
            .enter(GetNameInfoParams { addr: *addr, flags });
        if let Some(failure) = self.failures.getnameinfo.next() {
            debug!(%addr, code = failure.code, "getnameinfo: scheduled failure");
            if let Some(errno) = failure.errno {
                real::set_errno(errno);
            }
            self.stats.getnameinfo.fail(
                NameInfoReturn {
                    code: failure.code,
                    host: None,
                    service: None,
                },
                failure.errno,
            );
            return Err(failure.code);
        }
        let result = match self.substitutes.getnameinfo.as_mut() {
            Some(substitute) => substitute(addr, flags),
            None => real::getnameinfo(addr, flags),
        };
        let ret = match &result {
            Ok((host, service)) => NameInfoReturn {
                code: 0,
                host: Some(host.clone()),
                service: Some(service.clone()),
            },
            Err(code) => NameInfoReturn {
                code: *code,
                host: None,
                service: None,
            },
        };
        self.stats.getnameinfo.finish(ret);
        result
    }

    /// Message for a resolver error code. Never fails.
    pub fn gai_strerror(&mut self, code: i32) -> String {
        if !self.is_monitored(Op::GaiStrerror) {
            return real::gai_strerror(code);
        }
        self.stats.gai_strerror.enter(code);
        let msg = match self.substitutes.gai_strerror.as_mut() {
            Some(substitute) => substitute(code),
            None => real::gai_strerror(code),
        };
        self.stats.gai_strerror.finish(msg.clone());
        msg
    }
}
