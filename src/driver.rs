//! Iteration Driver (C6): the outer traversal over objects/keys/extents
//! in an epoch range. Filters to EC objects for which this target is
//! leader, pumps stripes into the reconciler via the stripe assembler.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::metrics::AggregationMetrics;
use crate::model::{ObjectClass, ObjectId};
use crate::ports::{
    ArrayStore, LeadershipOracle, ObjectIterator, PeerRpcClient, PoolContainerHandles,
    RemoteObjectStore,
};
use crate::probe::probe_stripe_parity;
use crate::reconciler::{log_stripe_result, StripeOutcome, StripeReconciler};
use crate::stripe::OpenStripe;

/// Credits cap bounding extents accumulated into a single open stripe
/// before a reconcile is forced (spec.md §5).
pub const CREDITS_MAX: u32 = 1024;

/// Summary of one `ec_aggregate` run, for the host to log.
#[derive(Debug, Clone, Default)]
pub struct AggregationReport {
    pub objects_examined: u64,
    pub objects_skipped_not_leader: u64,
    pub stripes_examined: u64,
    pub stripes_committed: u64,
    pub stripes_aborted: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// A cooperative cancellation flag, checked at each stripe boundary
/// (spec.md §5, "the driver may be asked to stop between stripes").
pub use tokio_util::sync::CancellationToken;

pub struct AggregationDriver<'a> {
    pub handles: &'a PoolContainerHandles,
    pub iterator: &'a dyn ObjectIterator,
    pub store: &'a dyn ArrayStore,
    pub remote: &'a dyn RemoteObjectStore,
    pub rpc: &'a dyn PeerRpcClient,
    pub leadership: &'a dyn LeadershipOracle,
    pub metrics: Option<&'a AggregationMetrics>,
    pub cancel: CancellationToken,
}

impl<'a> AggregationDriver<'a> {
    /// `ec_aggregate(container, epoch_range) -> status`: the sole public
    /// entry point (spec.md §6). Per-stripe and per-object errors are
    /// swallowed (logged, counted); only data-integrity violations
    /// propagate as `Err`.
    #[instrument(skip(self), fields(lo = epoch_range.0, hi = epoch_range.1))]
    pub async fn run(&self, epoch_range: (u64, u64)) -> Result<AggregationReport> {
        let mut report = AggregationReport {
            started_at: Some(Utc::now()),
            ..Default::default()
        };
        let reconciler = StripeReconciler::new(self.store, self.remote, self.rpc);

        let objects = self.iterator.objects_in_epoch_range(epoch_range).await?;
        for oid in objects {
            report.objects_examined += 1;

            match self.leadership.is_leader(oid, self.handles.pool_map_version).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(%oid, "not leader for object, skipping");
                    report.objects_skipped_not_leader += 1;
                    continue;
                }
                Err(e) => {
                    warn!(%oid, error = %e, "leadership check failed, skipping object");
                    continue;
                }
            }

            let oca = match self.iterator.object_class(oid).await {
                Ok(o) => o,
                Err(e) => {
                    warn!(%oid, error = %e, "failed to resolve object class, skipping object");
                    continue;
                }
            };

            if let Err(e) = self
                .run_object(&reconciler, oid, &oca, epoch_range, &mut report)
                .await
            {
                if !e.is_stripe_local() {
                    return Err(e);
                }
                if e.is_leadership_loss() {
                    info!(%oid, "leadership lost mid-object, stopping object");
                } else {
                    warn!(%oid, error = %e, "object iteration aborted");
                }
            }
        }

        report.finished_at = Some(Utc::now());
        Ok(report)
    }

    async fn run_object(
        &self,
        reconciler: &StripeReconciler<'_>,
        oid: ObjectId,
        oca: &ObjectClass,
        epoch_range: (u64, u64),
        report: &mut AggregationReport,
    ) -> Result<()> {
        let keys = self.iterator.keys_for_object(oid).await?;
        for (dkey, akey) in keys {
            if self.cancel.is_cancelled() {
                info!(%oid, "cancellation requested, stopping driver");
                return Ok(());
            }

            // akey enter: reset open stripe state.
            let mut open: Option<OpenStripe> = None;
            let extents = self
                .iterator
                .extents_for_key(oid, &dkey, &akey, epoch_range)
                .await?;

            for extent in extents {
                let stripenum = oca.stripenum_of(extent.recx.data_idx());

                self.rotate_to(
                    reconciler,
                    oid,
                    oca,
                    &dkey,
                    &akey,
                    &mut open,
                    stripenum,
                    report,
                )
                .await?;

                let stripe = open.as_mut().expect("rotate_to always leaves a stripe open");
                stripe.observe(extent);

                if stripe.extent_cnt >= CREDITS_MAX {
                    let forced_target = stripenum + 1;
                    self.rotate_to(
                        reconciler,
                        oid,
                        oca,
                        &dkey,
                        &akey,
                        &mut open,
                        forced_target,
                        report,
                    )
                    .await?;
                }

                if self.cancel.is_cancelled() {
                    break;
                }
            }

            // akey exit (post): final flush of any still-open stripe. Closed
            // the same way a mid-stream rotation would, so a trailing
            // carry-over extent still gets its own (necessarily
            // incomplete) stripe examined rather than silently dropped.
            if let Some(stripe) = open.take() {
                if !stripe.is_empty() {
                    let closed_num = stripe.stripenum;
                    let (closed, carry) = stripe.close_and_trim()?;
                    let carried_prefix = closed.suffix_ext;
                    if !closed.is_empty() {
                        self.reconcile_one(reconciler, oid, oca, &dkey, &akey, closed, report)
                            .await?;
                    }
                    if let Some(seed) = carry {
                        let trailing =
                            OpenStripe::new_with_seed(*oca, closed_num + 1, seed, carried_prefix);
                        if !trailing.is_empty() {
                            self.reconcile_one(reconciler, oid, oca, &dkey, &akey, trailing, report)
                                .await?;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Advance `open` to `target`, closing and reconciling every stripe
    /// strictly between the currently open one and `target` (handles
    /// both a plain boundary crossing and a multi-stripe gap).
    #[allow(clippy::too_many_arguments)]
    async fn rotate_to(
        &self,
        reconciler: &StripeReconciler<'_>,
        oid: ObjectId,
        oca: &ObjectClass,
        dkey: &crate::ports::KeyBytes,
        akey: &crate::ports::KeyBytes,
        open: &mut Option<OpenStripe>,
        target: u64,
        report: &mut AggregationReport,
    ) -> Result<()> {
        loop {
            match open.take() {
                None => {
                    *open = Some(OpenStripe::new(*oca, target));
                    return Ok(());
                }
                Some(cur) if cur.stripenum == target => {
                    *open = Some(cur);
                    return Ok(());
                }
                Some(cur) => {
                    let closed_num = cur.stripenum;
                    let (closed, carry) = cur.close_and_trim()?;
                    let carried_prefix = closed.suffix_ext;
                    if !closed.is_empty() {
                        self.reconcile_one(reconciler, oid, oca, dkey, akey, closed, report)
                            .await?;
                    }
                    let next_num = closed_num + 1;
                    *open = Some(match carry {
                        Some(seed) => OpenStripe::new_with_seed(*oca, next_num, seed, carried_prefix),
                        None => OpenStripe::new(*oca, next_num),
                    });
                }
            }
        }
    }

    async fn reconcile_one(
        &self,
        reconciler: &StripeReconciler<'_>,
        oid: ObjectId,
        oca: &ObjectClass,
        dkey: &crate::ports::KeyBytes,
        akey: &crate::ports::KeyBytes,
        stripe: OpenStripe,
        report: &mut AggregationReport,
    ) -> Result<()> {
        report.stripes_examined += 1;
        let stripenum = stripe.stripenum;

        let parity = probe_stripe_parity(self.store, self.handles, oid, oca, dkey, akey, stripenum)
            .await?;

        let result = reconciler
            .reconcile(self.handles, oid, oca, dkey, akey, &stripe, parity)
            .await;
        log_stripe_result(stripenum, &result);

        match &result {
            Ok(outcome) => {
                if let Some(m) = self.metrics {
                    m.record_outcome(outcome);
                }
                if !matches!(outcome, StripeOutcome::NoOp | StripeOutcome::AbsentParityIncomplete) {
                    report.stripes_committed += 1;
                }
            }
            Err(e) if e.is_stripe_local() => {
                report.stripes_aborted += 1;
                if let Some(m) = self.metrics {
                    m.record_abort();
                }
            }
            Err(_) => {}
        }

        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_stripe_local() => Ok(()),
            Err(e) => Err(e),
        }
    }
}
