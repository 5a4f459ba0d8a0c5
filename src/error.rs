//! Error types for the EC aggregation engine.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while aggregating erasure-coded objects.
///
/// Variants are grouped by the taxonomy the reconciler and driver use to
/// decide whether a failure aborts only the current stripe, drops the
/// current object, or is fatal to the whole `ec_aggregate` run.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    // =========================================================================
    // Transient I/O — per-stripe abort, driver continues
    // =========================================================================
    /// Local versioned store read/write failed
    #[error("store I/O error: {0}")]
    StoreIo(String),

    /// Remote object fetch (dsc_obj_fetch equivalent) failed
    #[error("remote fetch failed: {0}")]
    RemoteFetch(String),

    /// A peer RPC (parity-write or hole-fill) failed or timed out
    #[error("peer RPC failed: {0}")]
    PeerRpc(String),

    // =========================================================================
    // Resource exhaustion — per-stripe abort, driver continues
    // =========================================================================
    /// Aligned buffer allocation failed
    #[error("buffer allocation failed for {size} bytes aligned to {align}")]
    AllocationFailed { size: usize, align: usize },

    /// Bulk buffer registration for an RPC failed
    #[error("bulk buffer registration failed: {0}")]
    BulkRegistrationFailed(String),

    // =========================================================================
    // Data integrity violation — fatal, aborts ec_aggregate
    // =========================================================================
    /// A design invariant was violated (parity bit on data extent, more
    /// than one carry-over extent, bitmap count mismatch, self found as
    /// first replica in layout order, etc.)
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),

    // =========================================================================
    // Leadership loss — stop this object, driver continues
    // =========================================================================
    /// `is_leader` returned false partway through an object
    #[error("leadership lost for object {oid} at pool map version {map_version}")]
    LeadershipLost { oid: String, map_version: u32 },

    // =========================================================================
    // Codec errors — per-stripe abort
    // =========================================================================
    /// Reed-Solomon table construction or encode/update failed
    #[error("codec error: {0}")]
    Codec(String),

    /// The object class descriptor is malformed (k == 0, p outside 1..=2, etc.)
    #[error("invalid object class: {0}")]
    InvalidObjectClass(String),

    // =========================================================================
    // Configuration / setup
    // =========================================================================
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// `true` if this error should only abort the current stripe (the
    /// driver logs it and moves on); `false` if it is fatal and must
    /// propagate out of `ec_aggregate`.
    pub fn is_stripe_local(&self) -> bool {
        !matches!(self, Error::IntegrityViolation(_))
    }

    /// `true` if this error means "stop working on the current object,
    /// but keep driving the rest of the container".
    pub fn is_leadership_loss(&self) -> bool {
        matches!(self, Error::LeadershipLost { .. })
    }
}
