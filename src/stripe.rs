//! Stripe Assembler (C1): collects data extents into the currently-open
//! stripe, tracking fill, holes, and the single permitted carry-over.

use crate::error::{Error, Result};
use crate::model::{ExtentRecord, ObjectClass, ParityExtent, RecordRange};

/// Open-stripe state (spec.md §3).
#[derive(Debug, Clone)]
pub struct OpenStripe {
    pub stripenum: u64,
    pub hi_epoch: u64,
    pub dextents: Vec<ExtentRecord>,
    pub extent_cnt: u32,
    pub stripe_fill: u32,
    pub offset: u32,
    pub prefix_ext: u32,
    pub suffix_ext: u32,
    pub has_holes: bool,
    oca: ObjectClass,
}

impl OpenStripe {
    /// Open a fresh stripe for `stripenum`, optionally seeded with a
    /// carry-over tail extent from the previous stripe's close.
    pub fn new(oca: ObjectClass, stripenum: u64) -> Self {
        Self {
            stripenum,
            hi_epoch: 0,
            dextents: Vec::new(),
            extent_cnt: 0,
            stripe_fill: 0,
            offset: 0,
            prefix_ext: 0,
            suffix_ext: 0,
            has_holes: false,
            oca,
        }
    }

    /// Open a fresh stripe seeded by a carry-over extent (the trimmed
    /// tail produced by the prior stripe's `close_and_trim`). `prefix_ext`
    /// is the closing stripe's head length for that same crossing extent
    /// (`agg_clear_extents`'s `as_prefix_ext = ae_recx.rx_nr - tail`,
    /// forwarded onto the stripe the carry seeds).
    pub fn new_with_seed(oca: ObjectClass, stripenum: u64, seed: ExtentRecord, prefix_ext: u32) -> Self {
        let mut s = Self::new(oca, stripenum);
        s.prefix_ext = prefix_ext;
        s.observe(seed);
        s
    }

    /// Appends `extent` to `dextents`, updating `hi_epoch`, `has_holes`,
    /// and `stripe_fill` (holes contribute zero fill).
    ///
    /// Panics if `extent`'s stripe differs from this one's — the driver
    /// must rotate (close and reopen) before observing an extent from a
    /// different stripe.
    pub fn observe(&mut self, extent: ExtentRecord) {
        let extent_stripe = self.oca.stripenum_of(extent.recx.data_idx());
        assert_eq!(
            extent_stripe, self.stripenum,
            "observe() called with an extent from a different stripe; driver must rotate first"
        );
        debug_assert!(
            !extent.recx.is_parity(),
            "PARITY_INDICATOR must never be set on a data extent"
        );

        if self.dextents.is_empty() {
            self.offset = (extent.recx.rx_idx % self.oca.stripe_records()) as u32;
        }
        if extent.epoch > self.hi_epoch {
            self.hi_epoch = extent.epoch;
        }
        if extent.is_hole {
            self.has_holes = true;
        } else {
            // Clip this extent's own contribution to the stripe boundary
            // before adding, matching `agg_in_stripe` — a crossing
            // extent's overshoot must never pad the running fill, or it
            // can mask a real gap elsewhere in the stripe.
            let stripe_end = (self.stripenum + 1) * self.oca.stripe_records();
            let contribution = extent.recx.rx_nr.min(stripe_end.saturating_sub(extent.recx.rx_idx));
            self.stripe_fill = self.stripe_fill.saturating_add(contribution as u32);
        }
        self.extent_cnt += 1;
        self.dextents.push(extent);
    }

    /// For each extent, computes its carry-over tail (the portion lying
    /// in the next stripe). At most one extent may have a nonzero tail;
    /// that extent is trimmed in place to its head (the portion still in
    /// this stripe) and its tail is returned as the seed for the next
    /// stripe. The head length is this (closing) stripe's `suffix_ext`
    /// (`agg_get_carry_under`: `ae_recx.rx_nr - tail`, assigned to
    /// `as_suffix_ext` on the stripe about to commit) — the caller is
    /// responsible for forwarding the same value as the next stripe's
    /// `prefix_ext` via `new_with_seed`. Every other extent is left
    /// untouched in `dextents` — the reconciler still needs the full
    /// buffered set to compute cell coverage and gaps.
    pub fn close_and_trim(mut self) -> Result<(OpenStripe, Option<ExtentRecord>)> {
        let stripe_end = (self.stripenum + 1) * self.oca.stripe_records();
        let mut carry: Option<ExtentRecord> = None;
        let mut suffix_ext: u32 = 0;

        for ext in self.dextents.iter_mut() {
            let end = ext.recx.end();
            if end > stripe_end {
                if carry.is_some() {
                    return Err(Error::IntegrityViolation(
                        "more than one extent has a nonzero carry-over tail".into(),
                    ));
                }
                let tail_len = end - stripe_end;
                let head_len = ext.recx.rx_nr - tail_len;
                suffix_ext = head_len as u32;
                carry = Some(ExtentRecord::new(
                    RecordRange::new(stripe_end, tail_len),
                    ext.epoch,
                    ext.is_hole,
                ));
                ext.recx.rx_nr = head_len;
            }
        }

        self.suffix_ext = suffix_ext;
        Ok((self, carry))
    }

    /// `is_filled(has_parity)`: true iff `stripe_fill == k*len` and, if
    /// parity exists, every buffered extent's epoch is >= parity's epoch.
    pub fn is_filled(&self, parity: Option<&ParityExtent>) -> bool {
        if self.stripe_fill as u64 != self.oca.stripe_records() {
            return false;
        }
        match parity {
            None => true,
            Some(p) => self.dextents.iter().all(|e| e.epoch >= p.epoch),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.dextents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ParityExtent;

    fn oca() -> ObjectClass {
        ObjectClass::new(4, 1, 8, 1).unwrap()
    }

    fn ext(idx: u64, nr: u64, epoch: u64) -> ExtentRecord {
        ExtentRecord::new(RecordRange::new(idx, nr), epoch, false)
    }

    #[test]
    fn observe_tracks_fill_and_hi_epoch() {
        let mut s = OpenStripe::new(oca(), 0);
        s.observe(ext(0, 16, 5));
        s.observe(ext(16, 16, 10));
        assert_eq!(s.stripe_fill, 32);
        assert_eq!(s.hi_epoch, 10);
        assert!(s.is_filled(None));
    }

    #[test]
    fn observe_clips_overshoot_so_it_cannot_mask_a_gap() {
        // [0,8),[8,8),[16,4): 20 records, leaving a real 12-record gap at
        // [20,32). A crossing extent [28,12) overshoots the boundary by
        // 8; its raw rx_nr would paper over the gap (8+8+4+12 == 32) but
        // its clipped in-stripe contribution is only 4 (28..32).
        let mut s = OpenStripe::new(oca(), 0);
        s.observe(ext(0, 8, 1));
        s.observe(ext(8, 8, 1));
        s.observe(ext(16, 4, 1));
        s.observe(ext(28, 12, 1));
        assert_eq!(s.stripe_fill, 24);
        assert!(!s.is_filled(None), "a 12-record gap must not be masked by overshoot");
    }

    #[test]
    #[should_panic]
    fn observe_panics_on_wrong_stripe() {
        let mut s = OpenStripe::new(oca(), 0);
        s.observe(ext(32, 8, 1));
    }

    #[test]
    fn close_and_trim_extracts_single_carry_over() {
        // S6: extent spans [30..34), stripe boundary at 32.
        let mut s = OpenStripe::new(oca(), 0);
        s.observe(ext(30, 4, 1));
        let (closed, carry) = s.clone().close_and_trim().unwrap();
        assert_eq!(closed.suffix_ext, 2);
        assert_eq!(closed.prefix_ext, 0);
        let carry = carry.expect("expected carry-over");
        assert_eq!(carry.recx.rx_idx, 32);
        assert_eq!(carry.recx.rx_nr, 2);
    }

    #[test]
    fn close_and_trim_rejects_double_carry_over() {
        let mut s = OpenStripe::new(oca(), 0);
        s.observe(ext(28, 6, 1)); // spans to 34
        s.dextents.push(ext(29, 6, 1)); // also spans past 32; synthetic second offender
        assert!(s.close_and_trim().is_err());
    }

    #[test]
    fn is_filled_respects_parity_epoch() {
        let mut s = OpenStripe::new(oca(), 0);
        s.observe(ext(0, 32, 3));
        let stale_parity = ParityExtent {
            epoch: 10,
            recx: RecordRange::new(0, 8),
        };
        assert!(!s.is_filled(Some(&stale_parity)));
        let old_parity = ParityExtent {
            epoch: 1,
            recx: RecordRange::new(0, 8),
        };
        assert!(s.is_filled(Some(&old_parity)));
    }
}
