//! In-memory test-double adapters for the ports in `ports.rs`. Grounded
//! in the teacher's `src/adapters/event_publisher.rs` (`InMemoryEventCollector`,
//! `parking_lot::RwLock`-backed collection for assertions in tests).
//!
//! Not part of the public production surface, but not `#[cfg(test)]`
//! either: the demo harness binary (`main.rs`) wires these in as a
//! stand-in for a real VOS/RPC deployment.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::model::{ExtentRecord, ObjectClass, ObjectId, ParityExtent, RecordRange};
use crate::ports::{
    ArrayStore, KeyBytes, ObjectIterator, PeerRpcClient, PoolContainerHandles, RemoteObjectStore,
};
use crate::rpc::{EcAggregateRpc, EcReplicateRpc};

type StoreKey = (ObjectId, KeyBytes, KeyBytes);

#[derive(Clone, Debug)]
struct WriteEntry {
    epoch: u64,
    recx: RecordRange,
    bytes: Vec<u8>,
}

/// An in-memory stand-in for the versioned array store. Keeps every
/// write; fetch picks the highest-epoch entry at or below the requested
/// epoch whose range exactly matches the request (this crate's
/// reconciler always fetches exactly the range it previously wrote or
/// observed, so exact-match lookup is sufficient to drive tests and the
/// demo harness).
#[derive(Default)]
pub struct MockArrayStore {
    writes: RwLock<HashMap<StoreKey, Vec<WriteEntry>>>,
}

impl MockArrayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a replica extent directly, bypassing `obj_update`, useful
    /// for setting up scenario fixtures in tests.
    pub fn seed(
        &self,
        oid: ObjectId,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        epoch: u64,
        recx: RecordRange,
        bytes: Vec<u8>,
    ) {
        let key = (oid, dkey.clone(), akey.clone());
        self.writes
            .write()
            .entry(key)
            .or_default()
            .push(WriteEntry { epoch, recx, bytes });
    }

    pub fn extent_count(&self, oid: ObjectId, dkey: &KeyBytes, akey: &KeyBytes) -> usize {
        let key = (oid, dkey.clone(), akey.clone());
        self.writes.read().get(&key).map(|v| v.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ArrayStore for MockArrayStore {
    async fn obj_fetch(
        &self,
        _handles: &PoolContainerHandles,
        oid: ObjectId,
        epoch: u64,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        recx: RecordRange,
    ) -> Result<Vec<u8>> {
        let key = (oid, dkey.clone(), akey.clone());
        let guard = self.writes.read();
        let best = guard
            .get(&key)
            .into_iter()
            .flatten()
            .filter(|e| e.epoch <= epoch && e.recx.rx_idx == recx.rx_idx && e.recx.rx_nr == recx.rx_nr)
            .max_by_key(|e| e.epoch);
        match best {
            Some(e) => Ok(e.bytes.clone()),
            None => Ok(vec![0u8; recx.rx_nr as usize]),
        }
    }

    async fn obj_update(
        &self,
        _handles: &PoolContainerHandles,
        oid: ObjectId,
        epoch: u64,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        recx: RecordRange,
        data: &[u8],
    ) -> Result<()> {
        let key = (oid, dkey.clone(), akey.clone());
        self.writes.write().entry(key).or_default().push(WriteEntry {
            epoch,
            recx,
            bytes: data.to_vec(),
        });
        Ok(())
    }

    async fn obj_array_remove(
        &self,
        _handles: &PoolContainerHandles,
        oid: ObjectId,
        epoch_range: (u64, u64),
        dkey: &KeyBytes,
        akey: &KeyBytes,
        recx: RecordRange,
    ) -> Result<()> {
        let key = (oid, dkey.clone(), akey.clone());
        if let Some(entries) = self.writes.write().get_mut(&key) {
            entries.retain(|e| {
                let overlaps = e.recx.rx_idx < recx.end() && recx.rx_idx < e.recx.end();
                let in_epoch_range = e.epoch >= epoch_range.0 && e.epoch <= epoch_range.1;
                !(overlaps && in_epoch_range)
            });
        }
        Ok(())
    }

    async fn probe_parity(
        &self,
        _handles: &PoolContainerHandles,
        oid: ObjectId,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        range: RecordRange,
    ) -> Result<Option<ParityExtent>> {
        let key = (oid, dkey.clone(), akey.clone());
        let guard = self.writes.read();
        let best = guard
            .get(&key)
            .into_iter()
            .flatten()
            .filter(|e| e.recx.is_parity() && e.recx.rx_idx == range.rx_idx)
            .max_by_key(|e| e.epoch);
        Ok(best.map(|e| ParityExtent {
            epoch: e.epoch,
            recx: e.recx,
        }))
    }
}

/// Stand-in for `dsc_obj_fetch`, backed by its own `MockArrayStore` to
/// simulate a peer shard's local data.
#[derive(Default)]
pub struct MockRemoteObjectStore {
    pub peer_store: MockArrayStore,
}

#[async_trait]
impl RemoteObjectStore for MockRemoteObjectStore {
    async fn dsc_obj_fetch(
        &self,
        handles: &PoolContainerHandles,
        oid: ObjectId,
        epoch: u64,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        recx: RecordRange,
        _shard_hint: Option<u32>,
    ) -> Result<Vec<u8>> {
        self.peer_store
            .obj_fetch(handles, oid, epoch, dkey, akey, recx)
            .await
    }
}

/// Records every RPC sent to it and replies with a configurable status.
pub struct MockPeerRpcClient {
    status: i32,
    pub aggregate_calls: RwLock<Vec<EcAggregateRpc>>,
    pub replicate_calls: RwLock<Vec<EcReplicateRpc>>,
}

impl Default for MockPeerRpcClient {
    fn default() -> Self {
        Self::with_status(0)
    }
}

impl MockPeerRpcClient {
    pub fn with_status(status: i32) -> Self {
        Self {
            status,
            aggregate_calls: RwLock::new(Vec::new()),
            replicate_calls: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PeerRpcClient for MockPeerRpcClient {
    async fn send_parity_write(&self, req: EcAggregateRpc) -> Result<i32> {
        self.aggregate_calls.write().push(req);
        Ok(self.status)
    }

    async fn send_replicate(&self, req: EcReplicateRpc) -> Result<i32> {
        self.replicate_calls.write().push(req);
        Ok(self.status)
    }
}

/// Leadership oracle with a default answer and per-object overrides.
pub struct MockLeadershipOracle {
    default_answer: bool,
    overrides: RwLock<HashMap<ObjectId, bool>>,
}

impl Default for MockLeadershipOracle {
    fn default() -> Self {
        Self {
            default_answer: true,
            overrides: RwLock::new(HashMap::new()),
        }
    }
}

impl MockLeadershipOracle {
    pub fn set(&self, oid: ObjectId, is_leader: bool) {
        self.overrides.write().insert(oid, is_leader);
    }
}

#[async_trait]
impl crate::ports::LeadershipOracle for MockLeadershipOracle {
    async fn is_leader(&self, oid: ObjectId, _map_version: u32) -> Result<bool> {
        Ok(*self
            .overrides
            .read()
            .get(&oid)
            .unwrap_or(&self.default_answer))
    }
}

/// A fixed, pre-populated object/key/extent catalogue standing in for a
/// real multi-level VOS iteration. Built once via `with_*` calls, then
/// driven read-only by the driver.
#[derive(Default)]
pub struct MockObjectIterator {
    objects: Vec<ObjectId>,
    classes: HashMap<ObjectId, ObjectClass>,
    keys: HashMap<ObjectId, Vec<(KeyBytes, KeyBytes)>>,
    extents: HashMap<(ObjectId, KeyBytes, KeyBytes), Vec<ExtentRecord>>,
}

impl MockObjectIterator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(mut self, oid: ObjectId, oca: ObjectClass) -> Self {
        self.objects.push(oid);
        self.classes.insert(oid, oca);
        self
    }

    pub fn with_key(
        mut self,
        oid: ObjectId,
        dkey: KeyBytes,
        akey: KeyBytes,
        extents: Vec<ExtentRecord>,
    ) -> Self {
        self.keys.entry(oid).or_default().push((dkey.clone(), akey.clone()));
        self.extents.insert((oid, dkey, akey), extents);
        self
    }
}

#[async_trait]
impl ObjectIterator for MockObjectIterator {
    async fn objects_in_epoch_range(&self, _epoch_range: (u64, u64)) -> Result<Vec<ObjectId>> {
        Ok(self.objects.clone())
    }

    async fn object_class(&self, oid: ObjectId) -> Result<ObjectClass> {
        self.classes
            .get(&oid)
            .copied()
            .ok_or_else(|| crate::error::Error::StoreIo(format!("unknown object {oid}")))
    }

    async fn keys_for_object(&self, oid: ObjectId) -> Result<Vec<(KeyBytes, KeyBytes)>> {
        Ok(self.keys.get(&oid).cloned().unwrap_or_default())
    }

    async fn extents_for_key(
        &self,
        oid: ObjectId,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        _epoch_range: (u64, u64),
    ) -> Result<Vec<ExtentRecord>> {
        Ok(self
            .extents
            .get(&(oid, dkey.clone(), akey.clone()))
            .cloned()
            .unwrap_or_default())
    }
}
