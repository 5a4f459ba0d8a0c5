//! Erasure-coded object aggregation engine.
//!
//! Runs periodically on a storage target and reconciles replicated data
//! extents written under the EC fast path into encoded parity extents,
//! reclaiming space and restoring the steady-state EC layout (`k` data
//! cells + `p` parity cells per stripe).
//!
//! # Architecture
//!
//! ```text
//! C6 Iteration Driver
//!   └─ walks objects → dkeys → akeys → extents
//!        └─ C1 Stripe Assembler buffers extents per stripe
//!             └─ C4 Stripe Reconciler, on stripe boundary:
//!                  ├─ C2 Parity Prober  (existing parity, if any)
//!                  ├─ C3 Codec          (full encode / incremental update)
//!                  └─ C5 Peer Coordinator (parity-write / hole-fill RPCs)
//! ```
//!
//! Pool/container handle bootstrap, leader election, the versioned array
//! store itself, and RPC wire framing are external collaborators,
//! modeled as the traits in [`ports`].
//!
//! # Modules
//!
//! - [`model`] - object class, object identity, extent records
//! - [`ports`] - external collaborator traits (store, RPC, leadership)
//! - [`codec`] - Reed-Solomon full-encode and incremental update
//! - [`stripe`] - stripe assembler (C1)
//! - [`probe`] - parity prober (C2)
//! - [`reconciler`] - stripe reconciler state machine (C4)
//! - [`peer`] - peer coordinator (C5)
//! - [`rpc`] - peer RPC payloads
//! - [`rendezvous`] - offload + single-shot completion handle
//! - [`driver`] - iteration driver (C6), `ec_aggregate`'s implementation
//! - [`metrics`] - Prometheus counters
//! - [`config`] - demo harness CLI configuration
//! - [`error`] - error types
//! - [`test_support`] - in-memory mock adapters

pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod metrics;
pub mod model;
pub mod peer;
pub mod ports;
pub mod probe;
pub mod reconciler;
pub mod rendezvous;
pub mod rpc;
pub mod stripe;
pub mod test_support;

pub use driver::{AggregationDriver, AggregationReport, CancellationToken};
pub use error::{Error, Result};
pub use model::{ObjectClass, ObjectId};
pub use ports::PoolContainerHandles;

/// `ec_aggregate(container, epoch_range) -> status`: the sole public
/// entry point (spec.md §6). The caller schedules it periodically and
/// supplies the epoch window; this crate performs no scheduling itself.
pub async fn ec_aggregate(
    driver: &AggregationDriver<'_>,
    epoch_range: (u64, u64),
) -> Result<AggregationReport> {
    driver.run(epoch_range).await
}
