//! Log record definitions
//!
//! Defines the commit records the log is made of and their on-disk framing.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Frame header size: LSN (8) + CRC (4) + Len (4) = 16 bytes
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single payload, enforced when a record is framed. On the
/// read side a length field above this is damage, not an allocation request.
pub const MAX_PAYLOAD_LEN: u32 = 256 * 1024 * 1024;

/// A single buffered mutation
///
/// One commit record carries the full mutation list of a write batch, so the
/// batch either replays whole or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mutation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },
}

impl Mutation {
    /// The key this mutation touches
    pub fn key(&self) -> &[u8] {
        match self {
            Mutation::Put { key, .. } => key,
            Mutation::Delete { key } => key,
        }
    }
}

/// One committed record in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Log Sequence Number - strictly increasing across the log
    pub lsn: u64,

    /// The mutations applied by this commit, in insertion order
    pub mutations: Vec<Mutation>,
}

impl Record {
    pub fn new(lsn: u64, mutations: Vec<Mutation>) -> Self {
        Self { lsn, mutations }
    }

    /// Serialize to a framed byte buffer ready for appending
    pub fn encode(&self) -> Result<Vec<u8>> {
        encode_frame(self.lsn, &self.mutations)
    }

    /// Deserialize a record from an already-verified payload
    pub fn decode(lsn: u64, payload: &[u8]) -> Result<Self> {
        let mutations: Vec<Mutation> = bincode::deserialize(payload)?;
        Ok(Self { lsn, mutations })
    }
}

/// Frame a mutation list: `[LSN (8)][CRC (4)][Len (4)][payload]`
///
/// A `&[Mutation]` serializes identically to the `Vec<Mutation>` the reader
/// deserializes, so the writer never has to own the mutations it logs.
///
/// A payload over [`MAX_PAYLOAD_LEN`] is refused with [`Error::Storage`]
/// before any framing happens; the reader would reject it, so letting it
/// reach the log would strand every record behind it.
pub fn encode_frame(lsn: u64, mutations: &[Mutation]) -> Result<Vec<u8>> {
    let payload = bincode::serialize(&mutations)?;
    if payload.len() > MAX_PAYLOAD_LEN as usize {
        return Err(Error::Storage(format!(
            "commit record of {} bytes exceeds the {} byte payload cap",
            payload.len(),
            MAX_PAYLOAD_LEN
        )));
    }
    let crc = frame_crc(lsn, &payload);

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&lsn.to_le_bytes());
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Checksum over the LSN and payload, so header bit-flips are caught too
pub fn frame_crc(lsn: u64, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&lsn.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}
