//! Launch frame written by the orchestrator on the control channel.
//!
//! A 4-byte big-endian length followed by a JSON [`LaunchRequest`]. The
//! size is checked before anything is allocated or parsed.

use std::io::{self, Read};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::endpoint::{EndpointSpec, PeerOptions};
use super::script::{ScriptError, TransactionSet};

/// Largest accepted launch request body.
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16 MiB

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Control channel I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Control channel closed before a launch request arrived")]
    Closed,

    #[error("Launch request too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid script: {0}")]
    Script(#[from] ScriptError),
}

/// Everything a peer process needs to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Correlates launcher and peer logs.
    pub run_id: Uuid,
    pub endpoint: EndpointSpec,
    pub transactions: TransactionSet,
    #[serde(default)]
    pub options: PeerOptions,
}

impl LaunchRequest {
    pub fn validate(&self) -> Result<(), ProtocolError> {
        self.transactions.validate()?;
        Ok(())
    }
}

/// Encode a length-prefixed launch frame.
pub fn encode_launch(request: &LaunchRequest) -> Result<Vec<u8>, ProtocolError> {
    let body = serde_json::to_vec(request)?;
    if body.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size: body.len(),
            max: MAX_FRAME_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a complete frame, prefix included. Trailing bytes are ignored.
pub fn decode_launch(frame: &[u8]) -> Result<LaunchRequest, ProtocolError> {
    let mut cursor = frame;
    read_launch(&mut cursor)
}

/// Read one frame from `reader` and validate its script.
pub fn read_launch<R: Read + ?Sized>(reader: &mut R) -> Result<LaunchRequest, ProtocolError> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix).map_err(closed_on_eof)?;
    let size = u32::from_be_bytes(prefix) as usize;
    if size > MAX_FRAME_SIZE {
        return Err(ProtocolError::MessageTooLarge {
            size,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).map_err(closed_on_eof)?;
    let request: LaunchRequest = serde_json::from_slice(&body)?;
    request.validate()?;
    Ok(request)
}

fn closed_on_eof(e: io::Error) -> ProtocolError {
    match e.kind() {
        io::ErrorKind::UnexpectedEof => ProtocolError::Closed,
        _ => ProtocolError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::endpoint::{AddressFamily, Transport};
    use crate::peer::script::{NetworkChunk, Transaction};

    fn request() -> LaunchRequest {
        LaunchRequest {
            run_id: Uuid::new_v4(),
            endpoint: EndpointSpec::client(Transport::Stream, AddressFamily::Inet, "127.0.0.1", 7),
            transactions: TransactionSet::new(vec![Transaction::new(vec![
                NetworkChunk::send(*b"PING"),
                NetworkChunk::expect(*b"PONG"),
            ])]),
            options: PeerOptions::default(),
        }
    }

    #[test]
    fn frame_round_trip() {
        let req = request();
        let frame = encode_launch(&req).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
        assert_eq!(decode_launch(&frame).unwrap(), req);
    }

    #[test]
    fn oversized_prefix_rejected_before_read() {
        let frame = ((MAX_FRAME_SIZE + 1) as u32).to_be_bytes();
        assert!(matches!(
            decode_launch(&frame),
            Err(ProtocolError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn short_frame_is_closed() {
        let frame = encode_launch(&request()).unwrap();
        assert!(matches!(
            decode_launch(&frame[..frame.len() - 1]),
            Err(ProtocolError::Closed)
        ));
        assert!(matches!(decode_launch(&[]), Err(ProtocolError::Closed)));
    }

    #[test]
    fn invalid_script_is_rejected() {
        let mut req = request();
        req.transactions.transactions[0].chunks[0].payload.clear();
        let frame = encode_launch(&req).unwrap();
        assert!(matches!(
            decode_launch(&frame),
            Err(ProtocolError::Script(ScriptError::EmptyChunk { .. }))
        ));
    }

    #[test]
    fn options_default_when_missing() {
        let mut value = serde_json::to_value(request()).unwrap();
        value.as_object_mut().unwrap().remove("options");
        let body = serde_json::to_vec(&value).unwrap();
        let mut frame = (body.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(&body);
        assert_eq!(decode_launch(&frame).unwrap().options, PeerOptions::default());
    }
}
