/// Affine (fully-connected) layer.
///
/// Forward:  out[N, M] = x_flat[N, D] @ w[D, M] + b[M]
/// Backward: dx = dout @ w^T (reshaped to x), dw = x_flat^T @ dout, db = colsum(dout)
///
/// Each example's trailing dimensions are flattened into D = prod(x.shape[1..]).

use crate::error::{KernelError, Result};
use crate::tensor::{column_sum_f64, matmul_f64, transpose_f64, Tensor};

/// Cached inputs for the affine backward pass.
#[derive(Clone, Debug)]
pub struct AffineCache {
    pub x: Tensor,
    pub w: Tensor,
    pub b: Tensor,
}

/// Returns (N, D, M) for an affine call, failing on incompatible shapes.
fn affine_dims(x: &Tensor, w: &Tensor, b: &Tensor) -> Result<(usize, usize, usize)> {
    if x.ndim() == 0 {
        return Err(KernelError::RankMismatch { op: "affine_forward", expected: 1, shape: x.shape.clone() });
    }
    let (d, m) = w.dims2("affine_forward")?;
    let n = x.shape[0];
    if n * d != x.numel() {
        return Err(KernelError::shape_mismatch("affine_forward", &[n, d], &x.shape));
    }
    b.expect_shape("affine_forward", &[m])?;
    Ok((n, d, m))
}

/// Affine forward. `x`: [N, d_1, ..., d_k], `w`: [D, M], `b`: [M].
/// Returns (out [N, M], cache).
pub fn affine_forward(x: &Tensor, w: &Tensor, b: &Tensor) -> Result<(Tensor, AffineCache)> {
    let (n, d, m) = affine_dims(x, w, b)?;

    let mut out = Tensor::zeros(&[n, m]);
    matmul_f64(&x.data, &w.data, &mut out.data, n, d, m);
    for i in 0..n {
        for j in 0..m {
            out.data[i * m + j] += b.data[j];
        }
    }

    let cache = AffineCache { x: x.clone(), w: w.clone(), b: b.clone() };
    Ok((out, cache))
}

/// Affine backward. `dout`: [N, M].
/// Returns (dx shaped like x, dw [D, M], db [M]).
pub fn affine_backward(dout: &Tensor, cache: &AffineCache) -> Result<(Tensor, Tensor, Tensor)> {
    let AffineCache { x, w, b } = cache;
    let (n, d, m) = affine_dims(x, w, b)?;
    dout.expect_shape("affine_backward", &[n, m])?;

    // dx_flat[N, D] = dout[N, M] @ w^T[M, D]
    let mut w_t = vec![0.0f64; m * d];
    transpose_f64(&w.data, &mut w_t, d, m);
    let mut dx = Tensor::zeros(&x.shape);
    matmul_f64(&dout.data, &w_t, &mut dx.data, n, m, d);

    // dw[D, M] = x_flat^T[D, N] @ dout[N, M]
    let mut x_t = vec![0.0f64; d * n];
    transpose_f64(&x.data, &mut x_t, n, d);
    let mut dw = Tensor::zeros(&[d, m]);
    matmul_f64(&x_t, &dout.data, &mut dw.data, d, n, m);

    let mut db = Tensor::zeros(&[m]);
    column_sum_f64(&dout.data, &mut db.data, n, m);

    Ok((dx, dw, db))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affine_known_values() {
        // x = [[1, 2], [3, 4]], w = identity, b = [10, 20]
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
        let w = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0], &[2, 2]).unwrap();
        let b = Tensor::from_vec(vec![10.0, 20.0], &[2]).unwrap();
        let (out, _) = affine_forward(&x, &w, &b).unwrap();
        assert_eq!(out.data, vec![11.0, 22.0, 13.0, 24.0]);
    }

    #[test]
    fn test_affine_flattens_trailing_dims() {
        let x = Tensor::from_vec((0..8).map(|v| v as f64).collect(), &[2, 2, 2]).unwrap();
        let w = Tensor::from_vec(vec![1.0; 4], &[4, 1]).unwrap();
        let b = Tensor::zeros(&[1]);
        let (out, cache) = affine_forward(&x, &w, &b).unwrap();
        assert_eq!(out.shape, vec![2, 1]);
        assert_eq!(out.data, vec![6.0, 22.0]);

        let dout = Tensor::from_vec(vec![1.0, 2.0], &[2, 1]).unwrap();
        let (dx, dw, db) = affine_backward(&dout, &cache).unwrap();
        assert_eq!(dx.shape, vec![2, 2, 2]);
        assert_eq!(dx.data, vec![1.0, 1.0, 1.0, 1.0, 2.0, 2.0, 2.0, 2.0]);
        // dw[k] = 1*x[0,k] + 2*x[1,k]
        assert_eq!(dw.data, vec![8.0, 11.0, 14.0, 17.0]);
        assert_eq!(db.data, vec![3.0]);
    }

    #[test]
    fn test_affine_shape_mismatch() {
        let x = Tensor::zeros(&[2, 3]);
        let w = Tensor::zeros(&[4, 5]);
        let b = Tensor::zeros(&[5]);
        assert!(matches!(affine_forward(&x, &w, &b), Err(KernelError::ShapeMismatch { .. })));

        let w = Tensor::zeros(&[3, 5]);
        let b = Tensor::zeros(&[4]);
        assert!(matches!(affine_forward(&x, &w, &b), Err(KernelError::ShapeMismatch { .. })));
    }
}
