//! Stripe Reconciler (C4): the per-stripe state machine. Decides one of
//! {no-op, full-encode, partial-update, recalc, hole-fill}, drives
//! local/remote fetches, then commits (spec.md §4.4).

use tracing::{debug, warn};

use crate::codec::{AlignedBuf, StripeCodec};
use crate::error::{Error, Result};
use crate::model::{ExtentRecord, ObjectClass, ObjectId, ParityExtent, RecordRange};
use crate::peer::PeerCoordinator;
use crate::ports::{ArrayStore, KeyBytes, PeerRpcClient, PoolContainerHandles, RemoteObjectStore};
use crate::rpc::GapRecx;
use crate::stripe::OpenStripe;

/// What the reconciler actually did with a stripe, for metrics/logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StripeOutcome {
    NoOp,
    AbsentParityIncomplete,
    FullEncode,
    PartialUpdate,
    PartialRecalc,
    HoleFill,
}

pub struct StripeReconciler<'a> {
    pub store: &'a dyn ArrayStore,
    pub remote: &'a dyn RemoteObjectStore,
    pub rpc: &'a dyn PeerRpcClient,
}

impl<'a> StripeReconciler<'a> {
    pub fn new(
        store: &'a dyn ArrayStore,
        remote: &'a dyn RemoteObjectStore,
        rpc: &'a dyn PeerRpcClient,
    ) -> Self {
        Self { store, remote, rpc }
    }

    /// Reconcile one closed stripe. Takes ownership of the stripe (it is
    /// always cleared, successfully or not, by the caller once this
    /// returns). Returns the outcome on success; stripe-local errors are
    /// the caller's responsibility to catch and log (the reconciler
    /// itself never silently swallows an error).
    #[allow(clippy::too_many_arguments)]
    pub async fn reconcile(
        &self,
        handles: &PoolContainerHandles,
        oid: ObjectId,
        oca: &ObjectClass,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        stripe: &OpenStripe,
        parity: Option<ParityExtent>,
    ) -> Result<StripeOutcome> {
        // Decision 1: no-op.
        if let Some(p) = parity {
            if p.epoch >= stripe.hi_epoch {
                debug!(stripenum = stripe.stripenum, "parity supersedes data, no-op");
                return Ok(StripeOutcome::NoOp);
            }
        }

        // Decision 2: absent parity, not a full stripe.
        if parity.is_none() && !stripe.is_filled(None) {
            return Ok(StripeOutcome::AbsentParityIncomplete);
        }

        // Decision 3: full stripe.
        if stripe.is_filled(parity.as_ref()) {
            self.full_encode(handles, oid, oca, dkey, akey, stripe)
                .await?;
            return Ok(StripeOutcome::FullEncode);
        }

        let parity = parity.expect("parity must exist past decisions 1-3");

        // Decision 4: hole path.
        if stripe.has_holes {
            self.hole_fill(handles, oid, oca, dkey, akey, stripe)
                .await?;
            return Ok(StripeOutcome::HoleFill);
        }

        // Decision 5: partial update.
        self.partial_update(handles, oid, oca, dkey, akey, stripe, parity)
            .await
    }

    async fn full_encode(
        &self,
        handles: &PoolContainerHandles,
        oid: ObjectId,
        oca: &ObjectClass,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        stripe: &OpenStripe,
    ) -> Result<()> {
        let stripe_start = stripe.stripenum * oca.stripe_records();
        let full_recx = RecordRange::new(stripe_start, oca.stripe_records());
        let raw = self
            .store
            .obj_fetch(handles, oid, stripe.hi_epoch, dkey, akey, full_recx)
            .await?;

        let cell_bytes = oca.cell_bytes();
        if raw.len() != cell_bytes * oca.k as usize {
            return Err(Error::IntegrityViolation(format!(
                "full stripe fetch returned {} bytes, expected {}",
                raw.len(),
                cell_bytes * oca.k as usize
            )));
        }

        let mut data = Vec::with_capacity(oca.k as usize);
        for c in 0..oca.k as usize {
            let mut cell = AlignedBuf::zeroed(cell_bytes)?;
            cell.copy_from_slice(&raw[c * cell_bytes..(c + 1) * cell_bytes]);
            data.push(cell);
        }

        let codec = StripeCodec::for_class(oca)?;
        let parity_cells = codec.encode_full(&data)?;
        self.commit(handles, oid, oca, dkey, akey, stripe, parity_cells)
            .await
    }

    /// Bitmap of cells either fully covered by a single buffered extent
    /// (`full`) or merely overlapped by one (`overlap`), bounded to `k`
    /// bits.
    fn cell_bitmaps(&self, oca: &ObjectClass, stripe: &OpenStripe) -> (Vec<bool>, Vec<bool>) {
        let k = oca.k as usize;
        let len = oca.len as u64;
        let stripe_start = stripe.stripenum * oca.stripe_records();
        let mut full = vec![false; k];
        let mut overlap = vec![false; k];

        for c in 0..k {
            let cell_start = stripe_start + c as u64 * len;
            let cell_end = cell_start + len;
            for e in &stripe.dextents {
                if e.is_hole {
                    continue;
                }
                let (s, en) = (e.recx.rx_idx, e.recx.end());
                if s < cell_end && en > cell_start {
                    overlap[c] = true;
                    if s <= cell_start && en >= cell_end {
                        full[c] = true;
                    }
                }
            }
        }
        (full, overlap)
    }

    async fn partial_update(
        &self,
        handles: &PoolContainerHandles,
        oid: ObjectId,
        oca: &ObjectClass,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        stripe: &OpenStripe,
        parity: ParityExtent,
    ) -> Result<StripeOutcome> {
        let (full, overlap) = self.cell_bitmaps(oca, stripe);
        let full_cells = full.iter().filter(|b| **b).count();
        let recalc = full_cells > (oca.k as usize) / 2;
        let bitmap = if recalc { &full } else { &overlap };

        let codec = StripeCodec::for_class(oca)?;
        let cell_bytes = oca.cell_bytes();
        let stripe_start = stripe.stripenum * oca.stripe_records();

        // Peer parity cells, fetched old-value-first so encode_update can
        // XOR-apply in place; recalc rebuilds from scratch via encode_full
        // and does not need the old values, but we still present both
        // paths with a uniform parity buffer of length p (index 0 leader).
        let mut parity_cells: Vec<AlignedBuf> = Vec::with_capacity(oca.p as usize);
        {
            let mut leader_parity = AlignedBuf::zeroed(cell_bytes)?;
            let bytes = self
                .store
                .obj_fetch(handles, oid, parity.epoch, dkey, akey, parity.recx)
                .await?;
            if bytes.len() == cell_bytes {
                leader_parity.copy_from_slice(&bytes);
            }
            parity_cells.push(leader_parity);
        }
        if oca.p > 1 {
            for _ in 1..oca.p as usize {
                let peer_oid = oid.peer();
                let bytes = self
                    .remote
                    .dsc_obj_fetch(
                        handles,
                        peer_oid,
                        parity.epoch,
                        dkey,
                        akey,
                        parity.recx,
                        Some(peer_oid.shard_idx),
                    )
                    .await?;
                let mut cell = AlignedBuf::zeroed(cell_bytes)?;
                if bytes.len() == cell_bytes {
                    cell.copy_from_slice(&bytes);
                }
                parity_cells.push(cell);
            }
        }

        if recalc {
            // Every cell is read at hi_epoch: bitmapped cells carry the
            // newly-observed remote data, the rest the unchanged local
            // replicas — both already live at hi_epoch in this object's
            // own store (the EC fast path replicates full stripes to
            // every shard until aggregation decimates them).
            let mut data = Vec::with_capacity(oca.k as usize);
            for c in 0..oca.k as usize {
                let cell_start = stripe_start + c as u64 * oca.len as u64;
                let recx = RecordRange::new(cell_start, oca.len as u64);
                let mut cell = AlignedBuf::zeroed(cell_bytes)?;
                let bytes = self
                    .store
                    .obj_fetch(handles, oid, stripe.hi_epoch, dkey, akey, recx)
                    .await?;
                if bytes.len() == cell_bytes {
                    cell.copy_from_slice(&bytes);
                }
                data.push(cell);
            }
            let new_parity = codec.encode_full(&data)?;
            self.commit(handles, oid, oca, dkey, akey, stripe, new_parity)
                .await?;
            return Ok(StripeOutcome::PartialRecalc);
        }

        for c in 0..oca.k as usize {
            if !bitmap[c] {
                continue;
            }
            let cell_start = stripe_start + c as u64 * oca.len as u64;
            let recx = RecordRange::new(cell_start, oca.len as u64);

            let old_bytes = self
                .store
                .obj_fetch(handles, oid, parity.epoch, dkey, akey, recx)
                .await?;
            let new_bytes = self
                .store
                .obj_fetch(handles, oid, stripe.hi_epoch, dkey, akey, recx)
                .await?;
            if old_bytes.len() != cell_bytes || new_bytes.len() != cell_bytes {
                return Err(Error::IntegrityViolation(format!(
                    "cell {c} fetch size mismatch during partial update"
                )));
            }
            codec.encode_update(&old_bytes, &new_bytes, c, &mut parity_cells)?;
        }

        self.commit(handles, oid, oca, dkey, akey, stripe, parity_cells)
            .await?;
        Ok(StripeOutcome::PartialUpdate)
    }

    /// Compute the gaps within the stripe not covered by a real data
    /// extent. A hole tombstone does not count as coverage: it marks
    /// records this shard lost, which is exactly what needs
    /// re-replicating from a peer.
    fn gaps(&self, oca: &ObjectClass, stripe: &OpenStripe) -> Vec<RecordRange> {
        let stripe_start = stripe.stripenum * oca.stripe_records();
        let stripe_end = stripe_start + oca.stripe_records();

        let mut sorted: Vec<&ExtentRecord> = stripe.dextents.iter().filter(|e| !e.is_hole).collect();
        sorted.sort_by_key(|e| e.recx.rx_idx);

        let mut gaps = Vec::new();
        let mut cursor = stripe_start;
        for e in sorted {
            let s = e.recx.rx_idx.max(stripe_start);
            let en = e.recx.end().min(stripe_end);
            if s > cursor {
                gaps.push(RecordRange::new(cursor, s - cursor));
            }
            cursor = cursor.max(en);
        }
        if cursor < stripe_end {
            gaps.push(RecordRange::new(cursor, stripe_end - cursor));
        }
        gaps
    }

    async fn hole_fill(
        &self,
        handles: &PoolContainerHandles,
        oid: ObjectId,
        oca: &ObjectClass,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        stripe: &OpenStripe,
    ) -> Result<()> {
        let gaps = self.gaps(oca, stripe);
        if gaps.is_empty() {
            return Ok(());
        }

        let mut bulk = Vec::new();
        let mut recxs = Vec::with_capacity(gaps.len());
        for gap in &gaps {
            let bytes = self
                .remote
                .dsc_obj_fetch(handles, oid, stripe.hi_epoch, dkey, akey, *gap, None)
                .await?;
            bulk.extend_from_slice(&bytes);
            recxs.push(GapRecx {
                rx_idx: gap.rx_idx,
                rx_nr: gap.rx_nr,
            });
        }

        let coordinator = PeerCoordinator::new(self.rpc);
        coordinator
            .send_replicate(
                handles,
                oid,
                dkey,
                akey,
                oca.rsize,
                recxs,
                stripe.stripenum,
                stripe.hi_epoch,
                bulk.clone(),
            )
            .await?;

        let mut offset = 0usize;
        for gap in &gaps {
            let len = gap.rx_nr as usize * oca.rsize as usize;
            let bytes = &bulk[offset..offset + len.min(bulk.len() - offset)];
            self.store
                .obj_update(handles, oid, stripe.hi_epoch, dkey, akey, *gap, bytes)
                .await?;
            offset += len;
        }

        let parity_recx = oca.parity_range(stripe.stripenum);
        self.store
            .obj_array_remove(
                handles,
                oid,
                (0, stripe.hi_epoch),
                dkey,
                akey,
                parity_recx,
            )
            .await?;

        Ok(())
    }

    /// Commit (§4.4.c): peer parity write first (if p > 1), then remove
    /// the reconciled data range and write the new local parity cell.
    /// Tolerant of crashes at every boundary: a crash between the
    /// remove and the parity write is repeated verbatim on next run; a
    /// duplicate peer write at the same epoch is idempotent.
    async fn commit(
        &self,
        handles: &PoolContainerHandles,
        oid: ObjectId,
        oca: &ObjectClass,
        dkey: &KeyBytes,
        akey: &KeyBytes,
        stripe: &OpenStripe,
        parity_cells: Vec<AlignedBuf>,
    ) -> Result<()> {
        if parity_cells.len() != oca.p as usize {
            return Err(Error::IntegrityViolation(format!(
                "commit expected {} parity cells, got {}",
                oca.p,
                parity_cells.len()
            )));
        }

        if oca.p > 1 {
            let coordinator = PeerCoordinator::new(self.rpc);
            coordinator
                .send_parity_write(
                    handles,
                    oid,
                    dkey,
                    akey,
                    oca.rsize,
                    stripe.hi_epoch,
                    stripe.stripenum,
                    stripe.prefix_ext,
                    stripe.suffix_ext,
                    parity_cells[1].to_vec(),
                )
                .await?;
        }

        // The reclaimed range extends prefix_ext records before the
        // canonical start (a carry-over head from the *previous* stripe's
        // crossing extent, forwarded into this stripe's prefix_ext) and
        // stops suffix_ext records short of the canonical end (this
        // stripe's own crossing extent, trimmed by close_and_trim and
        // left for the next stripe to reclaim) — spec.md §8 Testable
        // Property 4, `agg_update_vos`.
        let stripe_start = stripe.stripenum * oca.stripe_records();
        let remove_start = stripe_start - stripe.prefix_ext as u64;
        let remove_len =
            oca.stripe_records() + stripe.prefix_ext as u64 - stripe.suffix_ext as u64;
        let remove_recx = RecordRange::new(remove_start, remove_len);

        self.store
            .obj_array_remove(handles, oid, (0, stripe.hi_epoch), dkey, akey, remove_recx)
            .await?;

        let parity_recx = oca.parity_range(stripe.stripenum);
        self.store
            .obj_update(
                handles,
                oid,
                stripe.hi_epoch,
                dkey,
                akey,
                parity_recx,
                &parity_cells[0],
            )
            .await?;

        Ok(())
    }
}

pub fn log_stripe_result(stripenum: u64, result: &Result<StripeOutcome>) {
    // Log on failure only (DESIGN.md Open Question (c)): the source this
    // core was distilled from logged the stripe's return code
    // unconditionally, including on success; that was a log-hygiene bug.
    if let Err(e) = result {
        warn!(stripenum, error = %e, "stripe reconciliation failed");
    }
}
