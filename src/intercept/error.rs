//! Error and misuse types for the interception layer.
//!
//! Configuration mistakes are errors returned to the caller. Misuse by the
//! code under test is not an error at all: it is recorded as a [`Violation`]
//! and the dispatch carries on.

use thiserror::Error;

use super::op::Op;

/// Errors raised while configuring the interception layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failure pattern is empty but the end policy needs at least one slot")]
    EmptyPattern,

    #[error("Ledger capacity must be at least 1")]
    ZeroCapacity,

    #[error("Ledger full: capacity {capacity} reached")]
    LedgerFull { capacity: usize },
}

impl ConfigError {
    /// Distinct negative code for C-style callers.
    pub fn code(&self) -> i32 {
        match self {
            Self::EmptyPattern => -1,
            Self::ZeroCapacity => -2,
            Self::LedgerFull { .. } => -3,
        }
    }
}

/// Errors raised by the resource ledgers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger full: capacity {capacity} reached")]
    Full { capacity: usize },

    #[error("Address {address:#x} is not registered")]
    NotFound { address: usize },

    #[error("Address {address:#x} is already live")]
    Duplicate { address: usize },

    #[error("Null address cannot be registered")]
    NullAddress,
}

/// Resource misuse detected while dispatching a monitored call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// `free` on a pointer that is not a live monitored block.
    InvalidFree { address: usize },
    /// `realloc` on a pointer that is not a live monitored block.
    InvalidRealloc { address: usize },
    /// `freeaddrinfo` on a pointer that is not the head of a registered list.
    InvalidResolutionRelease { address: usize },
    /// The allocation ledger had no free slot for a new block.
    LedgerOverflow { op: Op, address: usize, size: usize },
}

impl Violation {
    /// Operation that triggered the violation.
    pub fn op(&self) -> Op {
        match self {
            Self::InvalidFree { .. } => Op::Free,
            Self::InvalidRealloc { .. } => Op::Realloc,
            Self::InvalidResolutionRelease { .. } => Op::FreeAddrInfo,
            Self::LedgerOverflow { op, .. } => *op,
        }
    }

    /// Address involved in the violation.
    pub fn address(&self) -> usize {
        match self {
            Self::InvalidFree { address }
            | Self::InvalidRealloc { address }
            | Self::InvalidResolutionRelease { address }
            | Self::LedgerOverflow { address, .. } => *address,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_codes_are_distinct_and_negative() {
        let codes = [
            ConfigError::EmptyPattern.code(),
            ConfigError::ZeroCapacity.code(),
            ConfigError::LedgerFull { capacity: 1 }.code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            assert!(*a < 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn violation_reports_its_operation() {
        let v = Violation::InvalidResolutionRelease { address: 0x10 };
        assert_eq!(v.op(), Op::FreeAddrInfo);
        assert_eq!(v.address(), 0x10);
    }
}
