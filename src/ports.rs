//! Ports (hexagonal architecture): the external collaborators the
//! aggregation core consumes. Pool/container bootstrap, leader election,
//! the versioned array store itself, and RPC wire framing are all
//! external; only the interfaces the core calls are defined here.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                   Aggregation Core                         │
//! │   driver │ reconciler │ stripe assembler │ peer coordinator│
//! └───────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌───────────────────────────────────────────────────────────┐
//! │                         Ports                               │
//! │  ArrayStore │ RemoteObjectStore │ PeerRpcClient │ Leadership │
//! └───────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{ExtentRecord, ObjectClass, ObjectId, RecordRange};
use crate::rpc::{EcAggregateRpc, EcReplicateRpc};

/// An opaque key within a dkey/akey namespace, carried through unparsed.
pub type KeyBytes = Vec<u8>;

/// One iod/sgl pair: what to read or write, and the bytes to read into or
/// write from, for a single `obj_fetch`/`obj_update` call.
#[derive(Debug, Clone)]
pub struct IoVec {
    pub recx: RecordRange,
    pub bytes: Vec<u8>,
}

/// Immutable handles acquired once at driver start: pool/container handle
/// uuids and the service rank list. Passed by reference for the
/// driver's lifetime (spec.md §5, "Cyclic container/pool handle refs").
#[derive(Debug, Clone)]
pub struct PoolContainerHandles {
    pub pool_uuid: Uuid,
    pub coh_uuid: Uuid,
    pub cont_uuid: Uuid,
    pub svc_ranks: Vec<u32>,
    pub pool_map_version: u32,
}

/// The local versioned array store ("VOS"). Consumed, never implemented,
/// by the aggregation core.
#[async_trait]
pub trait ArrayStore: Send + Sync {
    /// Read visible records at `epoch` for the given dkey/akey/object.
    async fn obj_fetch(
        &self,
        handles: &PoolContainerHandles,
        oid: ObjectId,
        epoch: u64,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        recx: RecordRange,
    ) -> Result<Vec<u8>>;

    /// Write records at `epoch`.
    async fn obj_update(
        &self,
        handles: &PoolContainerHandles,
        oid: ObjectId,
        epoch: u64,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        recx: RecordRange,
        data: &[u8],
    ) -> Result<()>;

    /// Delete records over an epoch range `[0, hi_epoch]`.
    async fn obj_array_remove(
        &self,
        handles: &PoolContainerHandles,
        oid: ObjectId,
        epoch_range: (u64, u64),
        dkey: &KeyBytes,
        akey: &KeyBytes,
        recx: RecordRange,
    ) -> Result<()>;

    /// Probe for a parity extent at the reserved index range. Must not
    /// mutate store state (C2).
    async fn probe_parity(
        &self,
        handles: &PoolContainerHandles,
        oid: ObjectId,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        range: RecordRange,
    ) -> Result<Option<crate::model::ParityExtent>>;
}

/// The remote object interface (`dsc_obj_fetch`), used to pull data from
/// another shard, optionally targeting one shard specifically.
#[async_trait]
pub trait RemoteObjectStore: Send + Sync {
    /// Fetch records at `epoch`, optionally pinned to a specific shard
    /// index (`DIOF_TO_SPEC_SHARD` equivalent); `None` lets the RPC
    /// layer route normally.
    async fn dsc_obj_fetch(
        &self,
        handles: &PoolContainerHandles,
        oid: ObjectId,
        epoch: u64,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        recx: RecordRange,
        shard_hint: Option<u32>,
    ) -> Result<Vec<u8>>;
}

/// Client for the two peer RPCs the Peer Coordinator issues.
#[async_trait]
pub trait PeerRpcClient: Send + Sync {
    /// `EC_AGGREGATE`: push this shard's computed parity cell to the peer
    /// parity shard, which applies the same data-range deletion locally.
    async fn send_parity_write(&self, req: EcAggregateRpc) -> Result<i32>;

    /// `EC_REPLICATE`: push hole-fill bytes to a peer data shard.
    async fn send_replicate(&self, req: EcReplicateRpc) -> Result<i32>;
}

/// Leadership oracle: `is_leader(pool, oid, version) -> bool`, assumed
/// externally implemented (pool map ownership, out of scope here).
#[async_trait]
pub trait LeadershipOracle: Send + Sync {
    async fn is_leader(&self, oid: ObjectId, map_version: u32) -> Result<bool>;
}

/// One dkey/akey's worth of extents as delivered by the driver's nested
/// iteration, in store order (`VOS_IT_EPC_RR`: reverse-recency).
#[derive(Debug, Clone)]
pub struct KeyExtents {
    pub oca: ObjectClass,
    pub dkey: KeyBytes,
    pub akey: KeyBytes,
    /// Extents in iteration order; parity extents are filtered out
    /// before this point (C6 "recx: if parity bit set, ignore").
    pub extents: Vec<ExtentRecord>,
}

/// Multi-level scan over objects -> dkeys/akeys -> visible extents
/// (spec.md §6 `iterate`). The callback-shaped source iteration is
/// modeled here as a small pull interface; ordering guarantees (RR,
/// visible-only, parity pre-filtered) are the implementor's
/// responsibility, matching what a real VOS iterator already provides.
#[async_trait]
pub trait ObjectIterator: Send + Sync {
    /// Objects touched within the epoch range, in iteration order.
    async fn objects_in_epoch_range(&self, epoch_range: (u64, u64)) -> Result<Vec<ObjectId>>;

    /// The object class descriptor for `oid`. Also serves as the
    /// EC-ness test: non-EC objects are filtered out by the caller
    /// before this is invoked.
    async fn object_class(&self, oid: ObjectId) -> Result<ObjectClass>;

    /// dkey/akey pairs under `oid`, in iteration order.
    async fn keys_for_object(&self, oid: ObjectId) -> Result<Vec<(KeyBytes, KeyBytes)>>;

    /// Visible, non-parity extents for one dkey/akey within the epoch
    /// range, in ascending `stripenum` order.
    async fn extents_for_key(
        &self,
        oid: ObjectId,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        epoch_range: (u64, u64),
    ) -> Result<Vec<ExtentRecord>>;
}
