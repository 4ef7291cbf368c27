//! Weight Preprocessing
//!
//! One-time transformation of a whole `[B, K, N]` weight tensor into the
//! layout the selected microkernel reads:
//!
//! 1. pad `N` up to a multiple of `block_n`
//! 2. view as `[B, K, N/block_n, block_n]` and permute to `[B, N/block_n, K, block_n]`
//! 3. for VNNI layouts, interleave every `vnni` consecutive K rows of each panel

use super::micro_gemm::{LayoutType, MicroGemm};
use crate::error::{Result, TemplarError};
use crate::tensor::{Dim, TensorDesc};

/// Logical weight extents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeightDims {
    pub batch: usize,
    pub k: usize,
    pub n: usize,
}

/// `n` rounded up to a multiple of `block_n`
#[must_use]
pub const fn padded_n(n: i64, block_n: i64) -> i64 {
    (n + block_n - 1) / block_n * block_n
}

/// Packed extents and padded N.
///
/// Blocked: `[batch, padded_n / block_n, k, block_n]`, otherwise `[batch, k, padded_n]`.
#[must_use]
pub fn padded_weight_size(
    batch: i64,
    k: i64,
    n: i64,
    block_n: i64,
    block_weight: bool,
) -> (Vec<i64>, i64) {
    let padded = padded_n(n, block_n);
    let size = if block_weight {
        vec![batch, padded / block_n, k, block_n]
    } else {
        vec![batch, k, padded]
    };
    (size, padded)
}

/// Pack host weight data for `micro_gemm`.
///
/// Padding elements are `T::default()`. VNNI layouts require K to be a
/// multiple of the interleave width.
pub fn pack_weight<T: Copy + Default>(
    data: &[T],
    dims: WeightDims,
    micro_gemm: &MicroGemm,
) -> Result<Vec<T>> {
    let WeightDims { batch, k, n } = dims;
    if data.len() != batch * k * n {
        return Err(TemplarError::InvalidShape(format!(
            "weight holds {} elements, expected {batch}x{k}x{n}",
            data.len()
        )));
    }
    let block_n = usize::try_from(micro_gemm.register_blocking().block_n)
        .ok()
        .filter(|&b| b > 0)
        .ok_or_else(|| TemplarError::InvalidShape("block_n must be positive".to_string()))?;
    let padded = padded_n(n as i64, block_n as i64) as usize;
    let layout = micro_gemm.b_layout();

    if layout.is_normal() {
        return Ok(pad_trailing(data, batch * k, n, padded));
    }

    let vnni = layout.vnni_size() as usize;
    if k % vnni != 0 {
        return Err(TemplarError::InvalidShape(format!(
            "K={k} is not a multiple of the VNNI width {vnni}"
        )));
    }

    let padded_data = pad_trailing(data, batch * k, n, padded);
    let blocks = padded / block_n;
    let mut packed = vec![T::default(); batch * k * padded];
    for b in 0..batch {
        for nb in 0..blocks {
            let panel = (b * blocks + nb) * k * block_n;
            for kk in 0..k {
                for j in 0..block_n {
                    let src = (b * k + kk) * padded + nb * block_n + j;
                    let dst = panel + vnni_offset(kk, j, block_n, layout);
                    packed[dst] = padded_data[src];
                }
            }
        }
    }
    Ok(packed)
}

fn pad_trailing<T: Copy + Default>(data: &[T], rows: usize, n: usize, padded: usize) -> Vec<T> {
    if n == padded {
        return data.to_vec();
    }
    let mut out = Vec::with_capacity(rows * padded);
    for row in data.chunks_exact(n) {
        out.extend_from_slice(row);
        out.resize(out.len() + padded - n, T::default());
    }
    out
}

/// Position of element `(k, j)` inside one `[K, block_n]` panel
fn vnni_offset(k: usize, j: usize, block_n: usize, layout: LayoutType) -> usize {
    let vnni = layout.vnni_size() as usize;
    (k / vnni) * block_n * vnni + j * vnni + k % vnni
}

/// Descriptor of the packed weight for the blocked layout
pub fn blocked_weight_desc(w: &TensorDesc, block_n: i64) -> Result<TensorDesc> {
    if w.rank() != 3 {
        return Err(TemplarError::InvalidShape(format!(
            "{}: batched weight must be rank 3, got {}",
            w.name(),
            w.rank()
        )));
    }
    let n = w.size(-1)?.as_static().ok_or_else(|| {
        TemplarError::InvalidShape(format!("{}: N must be static to block weights", w.name()))
    })?;
    let blocks = padded_n(n, block_n) / block_n;
    let sizes = vec![
        w.size(0)?.clone(),
        Dim::Static(blocks),
        w.size(1)?.clone(),
        Dim::Static(block_n),
    ];
    Ok(TensorDesc::contiguous(w.name(), w.dtype(), sizes))
}
