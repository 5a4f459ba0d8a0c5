//! Reed-Solomon codec over GF(2^8), with a full-stripe encode and an
//! incremental single-cell update (spec.md §4.3).
//!
//! `reed-solomon-erasure` (the teacher's erasure-coding dependency,
//! `src/ec/encoder.rs`) does not expose the raw generator-matrix
//! coefficients, so it cannot support `encode_update`'s "XOR diff then
//! apply to each parity cell via the class's generator tables" —
//! re-encoding via the crate's black-box `encode()` would require
//! recomputing every parity cell from all `k` data cells on every
//! single-cell change. This module is a small, self-contained Cauchy-matrix
//! GF(2^8) codec, grounded in the *shape* of the teacher's
//! `src/spdk/isal_codec.rs` (matrix generation, per-class table caching)
//! but implemented in safe Rust with no FFI.

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::ObjectClass;

/// Buffer alignment required for data/parity cells (spec.md §4.3).
pub const CELL_ALIGNMENT: usize = 32;

/// A heap buffer aligned to `CELL_ALIGNMENT`, zeroed on allocation.
pub struct AlignedBuf {
    ptr: NonNull<u8>,
    size: usize,
    layout: Layout,
}

// Safety: AlignedBuf owns its allocation exclusively; no interior
// aliasing is ever created.
unsafe impl Send for AlignedBuf {}

impl AlignedBuf {
    pub fn zeroed(size: usize) -> Result<Self> {
        let layout = Layout::from_size_align(size.max(1), CELL_ALIGNMENT)
            .map_err(|_| Error::AllocationFailed {
                size,
                align: CELL_ALIGNMENT,
            })?;
        // Safety: layout has nonzero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = NonNull::new(raw).ok_or(Error::AllocationFailed {
            size,
            align: CELL_ALIGNMENT,
        })?;
        Ok(Self { ptr, size, layout })
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];
    fn deref(&self) -> &[u8] {
        // Safety: ptr is valid for `size` bytes for the buffer's lifetime.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        // Safety: ptr is valid and exclusively owned.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        // Safety: layout matches the one used in `zeroed`.
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl Clone for AlignedBuf {
    fn clone(&self) -> Self {
        let mut out = AlignedBuf::zeroed(self.size).expect("clone of valid buffer");
        out.copy_from_slice(self);
        out
    }
}

impl std::fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuf").field("size", &self.size).finish()
    }
}

// =============================================================================
// GF(2^8) arithmetic, generator polynomial 0x11d (AES/Rijndael poly)
// =============================================================================

const GF_POLY: u16 = 0x11d;

struct GfTables {
    exp: [u8; 512],
    log: [u8; 256],
}

static GF_TABLES: OnceCell<GfTables> = OnceCell::new();

fn gf_tables() -> &'static GfTables {
    GF_TABLES.get_or_init(|| {
        let mut exp = [0u8; 512];
        let mut log = [0u8; 256];
        let mut x: u16 = 1;
        for i in 0..255usize {
            exp[i] = x as u8;
            log[x as usize] = i as u8;
            x <<= 1;
            if x & 0x100 != 0 {
                x ^= GF_POLY;
            }
        }
        for i in 255..512 {
            exp[i] = exp[i - 255];
        }
        GfTables { exp, log }
    })
}

fn gf_mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = gf_tables();
    let sum = t.log[a as usize] as usize + t.log[b as usize] as usize;
    t.exp[sum]
}

fn gf_inv(a: u8) -> u8 {
    assert!(a != 0, "GF(256) has no inverse of zero");
    let t = gf_tables();
    t.exp[255 - t.log[a as usize] as usize]
}

/// XOR `new` into `diff` against `old`, i.e. `diff = old XOR new`.
/// `old`, `new`, `diff` must be the same length.
pub fn xor_into(old: &[u8], new: &[u8], diff: &mut [u8]) {
    assert_eq!(old.len(), new.len());
    assert_eq!(old.len(), diff.len());
    for i in 0..old.len() {
        diff[i] = old[i] ^ new[i];
    }
}

/// Multiply every byte of `src` by scalar `c` in GF(256) and XOR the
/// result into `dst`.
fn gf_mul_xor_into(c: u8, src: &[u8], dst: &mut [u8]) {
    if c == 0 {
        return;
    }
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d ^= gf_mul(c, *s);
    }
}

/// Build a `p x k` Cauchy matrix over GF(256): `matrix[i][j] = 1 / (x_i + y_j)`.
/// Row `i` (0-indexed) is the generator row for parity buffer index `i`
/// (index 0 is the leader's parity, per the reversed layout convention).
fn build_cauchy_matrix(k: usize, p: usize) -> Vec<Vec<u8>> {
    // x values for parity rows, y values for data columns; all distinct
    // so that x_i + y_j is never zero and the matrix is invertible on any
    // k x k submatrix (the standard Cauchy-matrix RS construction).
    let ys: Vec<u8> = (0..k as u16).map(|v| v as u8).collect();
    let xs: Vec<u8> = (k as u16..(k + p) as u16).map(|v| v as u8).collect();

    let mut matrix = vec![vec![0u8; k]; p];
    for i in 0..p {
        for j in 0..k {
            let sum = xs[i] ^ ys[j];
            matrix[i][j] = gf_inv(sum);
        }
    }
    matrix
}

/// Reed-Solomon generator tables for one object class, cached per
/// `(k, p)` pair (spec.md §3, "Codec tables are resolved lazily on first
/// use per object class and cached").
pub struct StripeCodec {
    k: usize,
    p: usize,
    matrix: Vec<Vec<u8>>,
}

static CODEC_CACHE: OnceCell<DashMap<(u32, u32), Arc<StripeCodec>>> = OnceCell::new();

impl StripeCodec {
    fn new(k: usize, p: usize) -> Self {
        Self {
            k,
            p,
            matrix: build_cauchy_matrix(k, p),
        }
    }

    /// Fetch (or lazily build and cache) the codec for `oca`.
    pub fn for_class(oca: &ObjectClass) -> Result<Arc<StripeCodec>> {
        if oca.k == 0 || !(1..=2).contains(&oca.p) {
            return Err(Error::InvalidObjectClass(format!(
                "k={} p={}",
                oca.k, oca.p
            )));
        }
        let cache = CODEC_CACHE.get_or_init(DashMap::new);
        let codec = cache
            .entry((oca.k, oca.p))
            .or_insert_with(|| Arc::new(StripeCodec::new(oca.k as usize, oca.p as usize)));
        Ok(codec.clone())
    }

    /// `encode_full(data[k][cell_bytes]) -> parity[p][cell_bytes]`.
    /// Buffer index 0 of the returned vector is the leader's parity
    /// cell; index 1..p-1 are peer parities in descending shard order.
    pub fn encode_full(&self, data: &[AlignedBuf]) -> Result<Vec<AlignedBuf>> {
        if data.len() != self.k {
            return Err(Error::Codec(format!(
                "encode_full expected {} data cells, got {}",
                self.k,
                data.len()
            )));
        }
        let cell_bytes = data.first().map(|b| b.len()).unwrap_or(0);
        for cell in data {
            if cell.len() != cell_bytes {
                return Err(Error::Codec("mismatched cell sizes in encode_full".into()));
            }
        }
        let mut parity = Vec::with_capacity(self.p);
        for i in 0..self.p {
            let mut cell = AlignedBuf::zeroed(cell_bytes)?;
            for j in 0..self.k {
                gf_mul_xor_into(self.matrix[i][j], &data[j], &mut cell);
            }
            parity.push(cell);
        }
        Ok(parity)
    }

    /// `encode_update(old_cell, new_cell, j, parity)`: applies the
    /// diff between `old_cell` and `new_cell` (data cell index `j`) to
    /// every parity cell in place, equivalent to re-encoding with only
    /// cell `j` changed.
    pub fn encode_update(
        &self,
        old_cell: &[u8],
        new_cell: &[u8],
        j: usize,
        parity: &mut [AlignedBuf],
    ) -> Result<()> {
        if j >= self.k {
            return Err(Error::Codec(format!(
                "cell index {j} out of range for k={}",
                self.k
            )));
        }
        if parity.len() != self.p {
            return Err(Error::Codec(format!(
                "encode_update expected {} parity cells, got {}",
                self.p,
                parity.len()
            )));
        }
        if old_cell.len() != new_cell.len() {
            return Err(Error::Codec("mismatched cell sizes in encode_update".into()));
        }
        let mut diff = vec![0u8; old_cell.len()];
        xor_into(old_cell, new_cell, &mut diff);
        for i in 0..self.p {
            if parity[i].len() != diff.len() {
                return Err(Error::Codec("parity/cell size mismatch in encode_update".into()));
            }
            gf_mul_xor_into(self.matrix[i][j], &diff, &mut parity[i]);
        }
        Ok(())
    }
}
