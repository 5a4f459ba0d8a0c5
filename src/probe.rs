//! Parity Prober (C2): read-only lookup of the existing parity extent
//! for the open stripe, if any.

use crate::error::Result;
use crate::model::{ObjectClass, ObjectId, ParityExtent};
use crate::ports::{ArrayStore, KeyBytes, PoolContainerHandles};

/// Queries the local store over the reserved parity index range
/// `[PARITY_INDICATOR | stripenum*len, +len)` via a visible-extent scan.
/// Returns the first (and only) parity extent found, or `None`.
pub async fn probe_stripe_parity(
    store: &dyn ArrayStore,
    handles: &PoolContainerHandles,
    oid: ObjectId,
    oca: &ObjectClass,
    dkey: &KeyBytes,
    akey: &KeyBytes,
    stripenum: u64,
) -> Result<Option<ParityExtent>> {
    let range = oca.parity_range(stripenum);
    store.probe_parity(handles, oid, dkey, akey, range).await
}
