//! Core data model: object class descriptors, object identity, and extent
//! records.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// High bit reserved on array indices to mark a parity extent. Never set
/// on a data extent.
pub const PARITY_INDICATOR: u64 = 1 << 63;

/// Object class descriptor (`oca`), immutable for the object's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectClass {
    /// Data cells per stripe.
    pub k: u32,
    /// Parity cells per stripe, constrained to `1..=2`.
    pub p: u32,
    /// Records per cell.
    pub len: u32,
    /// Bytes per record.
    pub rsize: u64,
}

impl ObjectClass {
    pub fn new(k: u32, p: u32, len: u32, rsize: u64) -> crate::error::Result<Self> {
        if k == 0 {
            return Err(crate::error::Error::InvalidObjectClass(
                "k must be nonzero".into(),
            ));
        }
        if !(1..=2).contains(&p) {
            return Err(crate::error::Error::InvalidObjectClass(format!(
                "p must be 1 or 2, got {p}"
            )));
        }
        if len == 0 || rsize == 0 {
            return Err(crate::error::Error::InvalidObjectClass(
                "len and rsize must be nonzero".into(),
            ));
        }
        Ok(Self { k, p, len, rsize })
    }

    /// Number of records spanned by one stripe on the data shards.
    pub fn stripe_records(&self) -> u64 {
        self.k as u64 * self.len as u64
    }

    /// Bytes in one cell (`len * rsize`).
    pub fn cell_bytes(&self) -> usize {
        self.len as usize * self.rsize as usize
    }

    /// Stripe number containing record index `idx`.
    pub fn stripenum_of(&self, idx: u64) -> u64 {
        idx / self.stripe_records()
    }

    /// Reserved parity-index range `[PARITY_INDICATOR | stripenum*len, +len)`.
    pub fn parity_range(&self, stripenum: u64) -> RecordRange {
        RecordRange {
            rx_idx: PARITY_INDICATOR | (stripenum * self.len as u64),
            rx_nr: self.len as u64,
        }
    }
}

/// Object identity: a public id shared by all shards plus this shard's index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    pub pub_id: Uuid,
    pub shard_idx: u32,
}

impl ObjectId {
    pub fn new(pub_id: Uuid, shard_idx: u32) -> Self {
        Self { pub_id, shard_idx }
    }

    /// A shard is a parity shard iff `shard_idx >= k`.
    pub fn is_parity_shard(&self, oca: &ObjectClass) -> bool {
        self.shard_idx >= oca.k
    }

    /// The leader is the last parity shard, `k + p - 1`.
    pub fn is_leader(&self, oca: &ObjectClass) -> bool {
        self.shard_idx == oca.k + oca.p - 1
    }

    /// The shard addressed by decrementing this shard's index (peer
    /// addressing used by the parity-write RPC).
    pub fn peer(&self) -> Self {
        Self {
            pub_id: self.pub_id,
            shard_idx: self.shard_idx.saturating_sub(1),
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.pub_id, self.shard_idx)
    }
}

/// A record range: `rx_idx` record offset, `rx_nr` record count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRange {
    pub rx_idx: u64,
    pub rx_nr: u64,
}

impl RecordRange {
    pub fn new(rx_idx: u64, rx_nr: u64) -> Self {
        Self { rx_idx, rx_nr }
    }

    pub fn end(&self) -> u64 {
        self.rx_idx + self.rx_nr
    }

    pub fn is_parity(&self) -> bool {
        self.rx_idx & PARITY_INDICATOR != 0
    }

    /// Index with the parity bit masked off.
    pub fn data_idx(&self) -> u64 {
        self.rx_idx & !PARITY_INDICATOR
    }
}

/// A single extent returned by the store's visible-extent iterator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtentRecord {
    pub recx: RecordRange,
    pub epoch: u64,
    pub is_hole: bool,
}

impl ExtentRecord {
    pub fn new(recx: RecordRange, epoch: u64, is_hole: bool) -> Self {
        Self {
            recx,
            epoch,
            is_hole,
        }
    }
}

/// A probed parity extent for one stripe (result of C2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParityExtent {
    pub epoch: u64,
    pub recx: RecordRange,
}
