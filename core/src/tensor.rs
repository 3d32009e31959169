/// Minimal tensor type for the layer kernels.
///
/// A tensor is a flat f64 buffer plus a shape. All arithmetic is done by
/// free functions on flat slices with explicit dimensions, row-major layout
/// throughout. Shape errors are reported as `KernelError`, never panics.

use serde::{Deserialize, Serialize};

use crate::error::{KernelError, Result};

/// Flat f64 tensor with shape metadata.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub data: Vec<f64>,
    pub shape: Vec<usize>,
}

impl Tensor {
    pub fn zeros(shape: &[usize]) -> Self {
        let n: usize = shape.iter().product();
        Tensor {
            data: vec![0.0; n],
            shape: shape.to_vec(),
        }
    }

    /// Wrap an existing buffer. Fails if `data.len()` is not the product of `shape`.
    pub fn from_vec(data: Vec<f64>, shape: &[usize]) -> Result<Self> {
        let n: usize = shape.iter().product();
        if data.len() != n {
            return Err(KernelError::DataLength { len: data.len(), shape: shape.to_vec() });
        }
        Ok(Tensor { data, shape: shape.to_vec() })
    }

    /// Same shape as `self`, every element zero.
    pub fn zeros_like(&self) -> Self {
        Tensor::zeros(&self.shape)
    }

    pub fn numel(&self) -> usize {
        self.data.len()
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Reinterpret the buffer under a new shape with the same element count.
    pub fn reshape(&self, shape: &[usize]) -> Result<Tensor> {
        let n: usize = shape.iter().product();
        if n != self.numel() {
            return Err(KernelError::shape_mismatch("reshape", &self.shape, shape));
        }
        Ok(Tensor { data: self.data.clone(), shape: shape.to_vec() })
    }

    /// Fail unless the tensor has exactly `rank` dimensions.
    pub fn expect_rank(&self, op: &'static str, rank: usize) -> Result<()> {
        if self.ndim() != rank {
            return Err(KernelError::RankMismatch { op, expected: rank, shape: self.shape.clone() });
        }
        Ok(())
    }

    /// Fail unless the tensor has exactly `shape`.
    pub fn expect_shape(&self, op: &'static str, shape: &[usize]) -> Result<()> {
        if self.shape != shape {
            return Err(KernelError::shape_mismatch(op, shape, &self.shape));
        }
        Ok(())
    }

    /// Destructure a rank-4 shape as (N, C, H, W).
    pub fn dims4(&self, op: &'static str) -> Result<(usize, usize, usize, usize)> {
        self.expect_rank(op, 4)?;
        Ok((self.shape[0], self.shape[1], self.shape[2], self.shape[3]))
    }

    /// Destructure a rank-2 shape as (rows, cols).
    pub fn dims2(&self, op: &'static str) -> Result<(usize, usize)> {
        self.expect_rank(op, 2)?;
        Ok((self.shape[0], self.shape[1]))
    }
}

// ── Free-function math ops on flat slices ────────────────────────────

/// Matrix multiply: C[M,N] = A[M,K] @ B[K,N].  Row-major.
/// `out` must be pre-allocated with M*N elements (will be overwritten).
pub fn matmul_f64(a: &[f64], b: &[f64], out: &mut [f64], m: usize, k: usize, n: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(b.len(), k * n);
    debug_assert_eq!(out.len(), m * n);

    for i in 0..m {
        for j in 0..n {
            let mut sum = 0.0f64;
            for p in 0..k {
                sum += a[i * k + p] * b[p * n + j];
            }
            out[i * n + j] = sum;
        }
    }
}

/// Transpose A[M,K] → out[K,M].
pub fn transpose_f64(a: &[f64], out: &mut [f64], m: usize, k: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(out.len(), k * m);

    for i in 0..m {
        for j in 0..k {
            out[j * m + i] = a[i * k + j];
        }
    }
}

/// Column sums of A[M,K] → out[K].
pub fn column_sum_f64(a: &[f64], out: &mut [f64], m: usize, k: usize) {
    debug_assert_eq!(a.len(), m * k);
    debug_assert_eq!(out.len(), k);

    for x in out.iter_mut() { *x = 0.0; }
    for i in 0..m {
        for j in 0..k {
            out[j] += a[i * k + j];
        }
    }
}

/// Swap the two leading axes of a 4-D buffer: A[d0,d1,h,w] → out[d1,d0,h,w].
/// Applying it twice (with d0/d1 exchanged) is the identity.
pub fn swap_leading_axes_f64(a: &[f64], out: &mut [f64], d0: usize, d1: usize, h: usize, w: usize) {
    let plane = h * w;
    debug_assert_eq!(a.len(), d0 * d1 * plane);
    debug_assert_eq!(out.len(), a.len());

    for i in 0..d0 {
        for j in 0..d1 {
            let src = (i * d1 + j) * plane;
            let dst = (j * d0 + i) * plane;
            out[dst..dst + plane].copy_from_slice(&a[src..src + plane]);
        }
    }
}

/// Row-wise softmax: each row of length `cols` in `scores` gets softmaxed into `out`.
/// Numerically stabilized by subtracting the row max before exponentiating.
pub fn softmax_f64(scores: &[f64], out: &mut [f64], rows: usize, cols: usize) {
    debug_assert_eq!(scores.len(), rows * cols);
    debug_assert_eq!(out.len(), rows * cols);

    for r in 0..rows {
        let base = r * cols;
        let row = &scores[base..base + cols];

        let max_val = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mut sum_exp = 0.0f64;
        for c in 0..cols {
            let e = (row[c] - max_val).exp();
            out[base + c] = e;
            sum_exp += e;
        }
        for c in 0..cols {
            out[base + c] /= sum_exp;
        }
    }
}
