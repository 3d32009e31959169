/// Naive 2-D max pooling.
///
/// x: [N, C, H, W] → out: [N, C, H', W'], H' = 1 + (H - pool_height) / stride.
/// No padding. Each (example, channel) plane is pooled independently with
/// the window sliding row-major.
///
/// Backward routes each window's upstream gradient to the single argmax of
/// that window. Ties go to the first maximum in row-major order. Overlapping
/// windows accumulate.

use tracing::trace;

use crate::config::PoolConfig;
use crate::error::Result;
use crate::tensor::Tensor;
use crate::window::{output_dim, plane_offset};

#[derive(Clone, Debug)]
pub struct PoolCache {
    pub x: Tensor,
    pub cfg: PoolConfig,
}

fn pool_dims(op: &'static str, x: &Tensor, cfg: &PoolConfig) -> Result<(usize, usize, usize, usize, usize, usize)> {
    let (n, c, h, w) = x.dims4(op)?;
    let h_out = output_dim(h, cfg.pool_height, 0, cfg.stride)?;
    let w_out = output_dim(w, cfg.pool_width, 0, cfg.stride)?;
    Ok((n, c, h, w, h_out, w_out))
}

/// Offset of the window maximum within `plane`, first occurrence on ties.
fn window_argmax(plane: &[f64], row0: usize, col0: usize, cfg: &PoolConfig, width: usize) -> usize {
    let mut best = plane_offset(row0, col0, 0, 0, width);
    for ki in 0..cfg.pool_height {
        for kj in 0..cfg.pool_width {
            let idx = plane_offset(row0, col0, ki, kj, width);
            if plane[idx] > plane[best] {
                best = idx;
            }
        }
    }
    best
}

pub fn max_pool_forward_naive(x: &Tensor, cfg: &PoolConfig) -> Result<(Tensor, PoolCache)> {
    let (n, c, h, w, h_out, w_out) = pool_dims("max_pool_forward_naive", x, cfg)?;
    trace!(x_shape = ?x.shape, h_out, w_out, stride = cfg.stride, "max pool forward");

    let mut out = Tensor::zeros(&[n, c, h_out, w_out]);
    for plane_idx in 0..n * c {
        let plane = &x.data[plane_idx * h * w..(plane_idx + 1) * h * w];
        for oi in 0..h_out {
            for oj in 0..w_out {
                let best = window_argmax(plane, oi * cfg.stride, oj * cfg.stride, cfg, w);
                out.data[(plane_idx * h_out + oi) * w_out + oj] = plane[best];
            }
        }
    }

    Ok((out, PoolCache { x: x.clone(), cfg: *cfg }))
}

/// Returns dx [N, C, H, W].
pub fn max_pool_backward_naive(dout: &Tensor, cache: &PoolCache) -> Result<Tensor> {
    let PoolCache { x, cfg } = cache;
    let (n, c, h, w, h_out, w_out) = pool_dims("max_pool_backward_naive", x, cfg)?;
    dout.expect_shape("max_pool_backward_naive", &[n, c, h_out, w_out])?;

    let mut dx = Tensor::zeros(&x.shape);
    for plane_idx in 0..n * c {
        let base = plane_idx * h * w;
        let plane = &x.data[base..base + h * w];
        for oi in 0..h_out {
            for oj in 0..w_out {
                let best = window_argmax(plane, oi * cfg.stride, oj * cfg.stride, cfg, w);
                dx.data[base + best] += dout.data[(plane_idx * h_out + oi) * w_out + oj];
            }
        }
    }

    Ok(dx)
}
