//! Per-chunk outcomes and their report-channel encoding.
//!
//! A record is one status byte of combinable flags. If [`EXTEND`] is set,
//! one byte follows with the byte-count difference. If [`NOT_SAME`] is set,
//! a big-endian `u16` length and the observed bytes follow.

use std::io::{self, Read};

use thiserror::Error;

pub const OK: u8 = 0;
pub const TOO_MUCH: u8 = 1;
pub const TOO_FEW: u8 = 2;
pub const NOT_SAME: u8 = 4;
pub const NOTHING_RECV: u8 = 8;
pub const RECV_ERROR: u8 = 16;
pub const SEND_ERROR: u8 = 32;
pub const EXIT_PROCESS: u8 = 64;
pub const EXTEND: u8 = 128;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Report channel I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Report channel ended inside a record")]
    Truncated,

    #[error("Peer closed the report channel before its endpoint was ready")]
    NotReady,
}

/// Result of playing one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    flags: u8,
    difference: Option<u8>,
    observed: Option<Vec<u8>>,
}

impl ChunkOutcome {
    pub fn ok() -> Self {
        Self::default()
    }

    /// More bytes than expected arrived; `excess` saturates at 255.
    pub fn too_much(excess: usize) -> Self {
        Self {
            flags: TOO_MUCH | EXTEND,
            difference: Some(saturate(excess)),
            observed: None,
        }
    }

    /// The stream ended `missing` bytes short; saturates at 255.
    pub fn too_few(missing: usize) -> Self {
        Self {
            flags: TOO_FEW | EXTEND,
            difference: Some(saturate(missing)),
            observed: None,
        }
    }

    /// Lengths matched but bytes differed.
    pub fn not_same(observed: Vec<u8>) -> Self {
        let mut observed = observed;
        observed.truncate(u16::MAX as usize);
        Self {
            flags: NOT_SAME,
            difference: None,
            observed: Some(observed),
        }
    }

    pub fn nothing_received() -> Self {
        Self::with_flags(NOTHING_RECV)
    }

    pub fn receive_error() -> Self {
        Self::with_flags(RECV_ERROR)
    }

    pub fn send_error() -> Self {
        Self::with_flags(SEND_ERROR)
    }

    /// The peer observed a stop request. Always the last record.
    pub fn exit_process() -> Self {
        Self::with_flags(EXIT_PROCESS)
    }

    fn with_flags(flags: u8) -> Self {
        Self {
            flags,
            difference: None,
            observed: None,
        }
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn is_ok(&self) -> bool {
        self.flags == OK
    }

    pub fn contains(&self, flag: u8) -> bool {
        self.flags & flag == flag
    }

    pub fn is_exit(&self) -> bool {
        self.contains(EXIT_PROCESS)
    }

    /// Byte-count difference carried by the extension byte.
    pub fn difference(&self) -> Option<u8> {
        self.difference
    }

    /// Bytes actually read, for mismatches.
    pub fn observed(&self) -> Option<&[u8]> {
        self.observed.as_deref()
    }

    /// Append the wire form to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.flags);
        if self.flags & EXTEND != 0 {
            out.push(self.difference.unwrap_or(0));
        }
        if self.flags & NOT_SAME != 0 {
            let observed = self.observed.as_deref().unwrap_or(&[]);
            out.extend_from_slice(&(observed.len() as u16).to_be_bytes());
            out.extend_from_slice(observed);
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4);
        self.encode_into(&mut out);
        out
    }

    /// Decode one record from the front of `buf`, returning it and the
    /// number of bytes used.
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), ReportError> {
        let mut cursor = buf;
        match Self::read_from(&mut cursor)? {
            Some(outcome) => Ok((outcome, buf.len() - cursor.len())),
            None => Err(ReportError::Truncated),
        }
    }

    /// Read one record. `Ok(None)` on a clean end of stream.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> Result<Option<Self>, ReportError> {
        let mut status = [0u8; 1];
        loop {
            match reader.read(&mut status) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let flags = status[0];
        let difference = if flags & EXTEND != 0 {
            let mut byte = [0u8; 1];
            read_exact(reader, &mut byte)?;
            Some(byte[0])
        } else {
            None
        };
        let observed = if flags & NOT_SAME != 0 {
            let mut len = [0u8; 2];
            read_exact(reader, &mut len)?;
            let mut bytes = vec![0u8; u16::from_be_bytes(len) as usize];
            read_exact(reader, &mut bytes)?;
            Some(bytes)
        } else {
            None
        };
        Ok(Some(Self {
            flags,
            difference,
            observed,
        }))
    }
}

fn saturate(n: usize) -> u8 {
    n.min(u8::MAX as usize) as u8
}

pub(crate) fn read_exact<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> Result<(), ReportError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ReportError::Truncated,
        _ => ReportError::Io(e),
    })
}

/// Compare what an expect chunk read against its payload.
pub fn evaluate(expected: &[u8], received: &[u8]) -> ChunkOutcome {
    use std::cmp::Ordering;

    if received.is_empty() {
        return ChunkOutcome::nothing_received();
    }
    match received.len().cmp(&expected.len()) {
        Ordering::Greater => ChunkOutcome::too_much(received.len() - expected.len()),
        Ordering::Less => ChunkOutcome::too_few(expected.len() - received.len()),
        Ordering::Equal if received == expected => ChunkOutcome::ok(),
        Ordering::Equal => ChunkOutcome::not_same(received.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_is_a_single_zero_byte() {
        assert_eq!(ChunkOutcome::ok().encode(), vec![0]);
    }

    #[test]
    fn too_much_carries_extension_byte() {
        let bytes = ChunkOutcome::too_much(2).encode();
        assert_eq!(bytes, vec![TOO_MUCH | EXTEND, 2]);
        let (decoded, used) = ChunkOutcome::decode(&bytes).unwrap();
        assert_eq!(used, 2);
        assert!(decoded.contains(TOO_MUCH));
        assert_eq!(decoded.difference(), Some(2));
    }

    #[test]
    fn difference_saturates() {
        assert_eq!(ChunkOutcome::too_few(1000).difference(), Some(255));
    }

    #[test]
    fn not_same_echoes_observed_bytes() {
        let bytes = ChunkOutcome::not_same(b"PONX".to_vec()).encode();
        assert_eq!(bytes, [&[NOT_SAME, 0, 4][..], &b"PONX"[..]].concat());
        let (decoded, _) = ChunkOutcome::decode(&bytes).unwrap();
        assert_eq!(decoded.observed(), Some(&b"PONX"[..]));
    }

    #[test]
    fn truncated_record_is_an_error() {
        assert!(matches!(
            ChunkOutcome::decode(&[TOO_MUCH | EXTEND]),
            Err(ReportError::Truncated)
        ));
        assert!(matches!(
            ChunkOutcome::decode(&[NOT_SAME, 0, 3, b'a']),
            Err(ReportError::Truncated)
        ));
        assert!(matches!(ChunkOutcome::decode(&[]), Err(ReportError::Truncated)));
    }

    #[test]
    fn evaluate_classifies_reads() {
        assert!(evaluate(b"PONG", b"PONG").is_ok());
        assert!(evaluate(b"PONG", b"").contains(NOTHING_RECV));
        assert_eq!(evaluate(b"PONG", b"PONGxx").difference(), Some(2));
        let short = evaluate(b"PONG", b"PO");
        assert!(short.contains(TOO_FEW));
        assert_eq!(short.difference(), Some(2));
        assert_eq!(
            evaluate(b"PONG", b"PONX").observed(),
            Some(&b"PONX"[..])
        );
    }
}
