//! Peer RPC payloads (spec.md §4.5, §6). Bit-exact wire encoding is left
//! to the RPC framework; these are the Rust-level payload structs the
//! Peer Coordinator builds and a `PeerRpcClient` adapter serializes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::ObjectId;

/// `EC_AGGREGATE`: parity-write RPC sent to the peer parity shard.
///
/// Historical note: the source this was distilled from copies the
/// container-open-handle UUID into a single `coh_uuid` field twice,
/// which reads as two distinct fields never actually populated
/// separately — see `DESIGN.md` Open Question (a). This struct has one
/// `coh_uuid` field; no double-copy is reproduced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcAggregateRpc {
    pub pool_uuid: Uuid,
    pub coh_uuid: Uuid,
    pub cont_uuid: Uuid,
    /// Target oid with shard decremented to address the peer.
    pub oid: ObjectId,
    pub dkey: Vec<u8>,
    pub akey: Vec<u8>,
    pub rsize: u64,
    /// = hi_epoch of the reconciled stripe.
    pub epoch: u64,
    pub stripenum: u64,
    pub map_ver: u32,
    /// = prefix_ext: records of a carry-over predecessor to delete.
    pub prior_len: u32,
    /// = suffix_ext: records of a carry-over successor to retain.
    pub after_len: u32,
    /// One parity cell (cell_bytes), from the reversed-order parity buffer.
    pub bulk: Vec<u8>,
}

/// One gap segment described to the peer for a hole-fill write.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GapRecx {
    pub rx_idx: u64,
    pub rx_nr: u64,
}

/// `EC_REPLICATE`: hole-fill RPC sent to a peer data shard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcReplicateRpc {
    pub pool_uuid: Uuid,
    pub coh_uuid: Uuid,
    pub cont_uuid: Uuid,
    pub oid: ObjectId,
    pub dkey: Vec<u8>,
    pub akey: Vec<u8>,
    pub rsize: u64,
    pub recxs: Vec<GapRecx>,
    pub stripenum: u64,
    pub epoch: u64,
    pub map_ver: u32,
    /// Concatenated gap bytes, in `recxs` order.
    pub bulk: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ec_aggregate_rpc_round_trips_through_json() {
        let oid = ObjectId::new(Uuid::new_v4(), 3);
        let rpc = EcAggregateRpc {
            pool_uuid: Uuid::new_v4(),
            coh_uuid: Uuid::new_v4(),
            cont_uuid: Uuid::new_v4(),
            oid,
            dkey: b"dk".to_vec(),
            akey: b"ak".to_vec(),
            rsize: 1,
            epoch: 10,
            stripenum: 0,
            map_ver: 1,
            prior_len: 0,
            after_len: 2,
            bulk: vec![1, 2, 3],
        };
        let json = serde_json::to_string(&rpc).unwrap();
        let back: EcAggregateRpc = serde_json::from_str(&json).unwrap();
        assert_eq!(back.oid, oid);
        assert_eq!(back.bulk, vec![1, 2, 3]);
    }
}
