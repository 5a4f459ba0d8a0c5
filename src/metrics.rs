//! Prometheus metrics for the aggregation engine, exposed over the same
//! raw-hyper `/metrics` pattern the teacher's `main.rs::run_metrics_server`
//! uses.

use prometheus::{CounterVec, Opts, Registry};

use crate::reconciler::StripeOutcome;

/// Counters tracking per-stripe outcomes across all `ec_aggregate` runs.
pub struct AggregationMetrics {
    registry: Registry,
    outcomes: CounterVec,
    aborts: CounterVec,
}

impl AggregationMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let outcomes = CounterVec::new(
            Opts::new(
                "ec_aggregate_stripe_outcomes_total",
                "Stripes reconciled, labeled by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(outcomes.clone()))?;

        let aborts = CounterVec::new(
            Opts::new(
                "ec_aggregate_stripe_aborts_total",
                "Stripe-local aborts, labeled by reason class",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(aborts.clone()))?;

        Ok(Self {
            registry,
            outcomes,
            aborts,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_outcome(&self, outcome: &StripeOutcome) {
        let label = match outcome {
            StripeOutcome::NoOp => "no_op",
            StripeOutcome::AbsentParityIncomplete => "absent_parity_incomplete",
            StripeOutcome::FullEncode => "full_encode",
            StripeOutcome::PartialUpdate => "partial_update",
            StripeOutcome::PartialRecalc => "partial_recalc",
            StripeOutcome::HoleFill => "hole_fill",
        };
        self.outcomes.with_label_values(&[label]).inc();
    }

    pub fn record_abort(&self) {
        self.aborts.with_label_values(&["stripe_local"]).inc();
    }
}

impl Default for AggregationMetrics {
    fn default() -> Self {
        Self::new().expect("metric registration should never fail with fixed label sets")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_outcomes_by_label() {
        let metrics = AggregationMetrics::new().unwrap();
        metrics.record_outcome(&StripeOutcome::FullEncode);
        metrics.record_outcome(&StripeOutcome::FullEncode);
        metrics.record_outcome(&StripeOutcome::HoleFill);
        let families = metrics.registry().gather();
        let outcomes_family = families
            .iter()
            .find(|f| f.name() == "ec_aggregate_stripe_outcomes_total")
            .unwrap();
        let total: f64 = outcomes_family
            .get_metric()
            .iter()
            .map(|m| m.get_counter().value())
            .sum();
        assert_eq!(total, 3.0);
    }
}
