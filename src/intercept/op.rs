//! Capability index of the monitored operations.

use std::fmt;

/// An operation the harness can intercept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Malloc,
    Calloc,
    Realloc,
    Free,
    GetAddrInfo,
    FreeAddrInfo,
    GetNameInfo,
    GaiStrerror,
    Accept,
    Bind,
    Connect,
    Listen,
    Poll,
    Recv,
    RecvFrom,
    RecvMsg,
    Select,
    Send,
    SendTo,
    SendMsg,
    Shutdown,
    Socket,
}

impl Op {
    /// Number of monitored operations.
    pub const COUNT: usize = 22;

    /// Every operation, in index order.
    pub const ALL: [Op; Op::COUNT] = [
        Op::Malloc,
        Op::Calloc,
        Op::Realloc,
        Op::Free,
        Op::GetAddrInfo,
        Op::FreeAddrInfo,
        Op::GetNameInfo,
        Op::GaiStrerror,
        Op::Accept,
        Op::Bind,
        Op::Connect,
        Op::Listen,
        Op::Poll,
        Op::Recv,
        Op::RecvFrom,
        Op::RecvMsg,
        Op::Select,
        Op::Send,
        Op::SendTo,
        Op::SendMsg,
        Op::Shutdown,
        Op::Socket,
    ];

    /// Allocation family.
    pub const MEMORY: [Op; 4] = [Op::Malloc, Op::Calloc, Op::Realloc, Op::Free];

    /// Address resolution family.
    pub const DNS: [Op; 4] = [
        Op::GetAddrInfo,
        Op::FreeAddrInfo,
        Op::GetNameInfo,
        Op::GaiStrerror,
    ];

    /// Socket family.
    pub const SOCKET: [Op; 14] = [
        Op::Accept,
        Op::Bind,
        Op::Connect,
        Op::Listen,
        Op::Poll,
        Op::Recv,
        Op::RecvFrom,
        Op::RecvMsg,
        Op::Select,
        Op::Send,
        Op::SendTo,
        Op::SendMsg,
        Op::Shutdown,
        Op::Socket,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// C name of the operation.
    pub fn name(self) -> &'static str {
        match self {
            Op::Malloc => "malloc",
            Op::Calloc => "calloc",
            Op::Realloc => "realloc",
            Op::Free => "free",
            Op::GetAddrInfo => "getaddrinfo",
            Op::FreeAddrInfo => "freeaddrinfo",
            Op::GetNameInfo => "getnameinfo",
            Op::GaiStrerror => "gai_strerror",
            Op::Accept => "accept",
            Op::Bind => "bind",
            Op::Connect => "connect",
            Op::Listen => "listen",
            Op::Poll => "poll",
            Op::Recv => "recv",
            Op::RecvFrom => "recvfrom",
            Op::RecvMsg => "recvmsg",
            Op::Select => "select",
            Op::Send => "send",
            Op::SendTo => "sendto",
            Op::SendMsg => "sendmsg",
            Op::Shutdown => "shutdown",
            Op::Socket => "socket",
        }
    }

    /// Look an operation up by its C name.
    pub fn from_name(name: &str) -> Option<Op> {
        Op::ALL.iter().copied().find(|op| op.name() == name)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-operation monitoring flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MonitorSet {
    flags: [bool; Op::COUNT],
}

impl MonitorSet {
    /// No operation monitored.
    pub fn none() -> Self {
        Self::default()
    }

    /// Every operation monitored.
    pub fn all() -> Self {
        Self {
            flags: [true; Op::COUNT],
        }
    }

    pub fn enable(&mut self, op: Op) {
        self.flags[op.index()] = true;
    }

    pub fn disable(&mut self, op: Op) {
        self.flags[op.index()] = false;
    }

    /// Enable or disable every operation of a family.
    pub fn set_many(&mut self, ops: &[Op], enabled: bool) {
        for op in ops {
            self.flags[op.index()] = enabled;
        }
    }

    pub fn contains(&self, op: Op) -> bool {
        self.flags[op.index()]
    }

    /// Operations currently flagged.
    pub fn iter(&self) -> impl Iterator<Item = Op> + '_ {
        Op::ALL.iter().copied().filter(|op| self.contains(*op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_matches_position_in_all() {
        for (i, op) in Op::ALL.iter().enumerate() {
            assert_eq!(op.index(), i, "{} out of place", op);
        }
    }

    #[test]
    fn names_round_trip() {
        for op in Op::ALL {
            assert_eq!(Op::from_name(op.name()), Some(op));
        }
        assert_eq!(Op::from_name("write"), None);
    }

    #[test]
    fn families_partition_all_ops() {
        let total = Op::MEMORY.len() + Op::DNS.len() + Op::SOCKET.len();
        assert_eq!(total, Op::COUNT);
    }

    #[test]
    fn monitor_set_enable_disable() {
        let mut set = MonitorSet::none();
        assert!(!set.contains(Op::Malloc));
        set.enable(Op::Malloc);
        set.set_many(&Op::DNS, true);
        assert!(set.contains(Op::Malloc));
        assert!(set.contains(Op::FreeAddrInfo));
        set.disable(Op::Malloc);
        assert!(!set.contains(Op::Malloc));
        assert_eq!(set.iter().count(), Op::DNS.len());
    }
}
