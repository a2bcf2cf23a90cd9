//! Transaction scripts played by a mock peer.
//!
//! A [`TransactionSet`] is an ordered list of [`Transaction`]s, each an
//! ordered list of [`NetworkChunk`]s. Payloads are raw bytes, already in
//! network order; in files they are written as hex strings:
//!
//! ```toml
//! [[transactions]]
//! [[transactions.chunks]]
//! role = "send"
//! payload = "50494e47"
//!
//! [[transactions.chunks]]
//! role = "expect"
//! payload = "504f4e47"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest payload a chunk may carry. Mismatch reports echo the observed
/// bytes behind a 16-bit length.
pub const MAX_CHUNK_LEN: usize = u16::MAX as usize;

#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Failed to read script: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML script: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to serialize script: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid JSON script: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transaction {transaction} chunk {chunk} is empty")]
    EmptyChunk { transaction: usize, chunk: usize },

    #[error("Transaction {transaction} chunk {chunk} is {len} bytes (max {max})")]
    ChunkTooLarge {
        transaction: usize,
        chunk: usize,
        len: usize,
        max: usize,
    },
}

/// Direction of a chunk, seen from the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkRole {
    /// Read exactly the payload from the remote end.
    Expect,
    /// Write the payload to the remote end.
    Send,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkChunk {
    pub role: ChunkRole,
    #[serde(with = "hex::serde")]
    pub payload: Vec<u8>,
}

impl NetworkChunk {
    pub fn expect(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            role: ChunkRole::Expect,
            payload: payload.into(),
        }
    }

    pub fn send(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            role: ChunkRole::Send,
            payload: payload.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub chunks: Vec<NetworkChunk>,
}

impl Transaction {
    pub fn new(chunks: Vec<NetworkChunk>) -> Self {
        Self { chunks }
    }

    /// Append a chunk, builder style.
    pub fn then(mut self, chunk: NetworkChunk) -> Self {
        self.chunks.push(chunk);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSet {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl TransactionSet {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self { transactions }
    }

    /// Number of chunks in each transaction, in order.
    pub fn shape(&self) -> Vec<usize> {
        self.transactions.iter().map(|t| t.chunks.len()).collect()
    }

    pub fn chunk_count(&self) -> usize {
        self.transactions.iter().map(|t| t.chunks.len()).sum()
    }

    /// Reject empty and oversized chunks.
    pub fn validate(&self) -> Result<(), ScriptError> {
        for (t, transaction) in self.transactions.iter().enumerate() {
            for (c, chunk) in transaction.chunks.iter().enumerate() {
                if chunk.is_empty() {
                    return Err(ScriptError::EmptyChunk {
                        transaction: t,
                        chunk: c,
                    });
                }
                if chunk.len() > MAX_CHUNK_LEN {
                    return Err(ScriptError::ChunkTooLarge {
                        transaction: t,
                        chunk: c,
                        len: chunk.len(),
                        max: MAX_CHUNK_LEN,
                    });
                }
            }
        }
        Ok(())
    }

    /// Parse and validate a TOML script.
    pub fn from_toml_str(text: &str) -> Result<Self, ScriptError> {
        let set: Self = toml::from_str(text)?;
        set.validate()?;
        Ok(set)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> Result<String, ScriptError> {
        Ok(toml::to_string(self)?)
    }

    /// Parse and validate a JSON script.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ScriptError> {
        let set: Self = serde_json::from_slice(bytes)?;
        set.validate()?;
        Ok(set)
    }
}
