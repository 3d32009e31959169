/// Spatial batch normalization for [N, C, H, W] activations.
///
/// Channels are the feature axis. The input is laid out as [N*H*W, C]
/// (swap N/C, flatten, transpose) and handed to the vanilla batchnorm
/// kernels; results go back through the inverse sequence.

use crate::batchnorm::{batchnorm_backward, batchnorm_forward, BatchNormCache};
use crate::config::{BatchNormConfig, RunningStats};
use crate::error::{KernelError, Result};
use crate::tensor::{swap_leading_axes_f64, transpose_f64, Tensor};

#[derive(Clone, Debug)]
pub struct SpatialBatchNormCache {
    pub x: Tensor,
    pub cfg: BatchNormConfig,
    /// Vanilla batchnorm cache over the [N*H*W, C] view; `None` in test mode.
    pub bn: Option<BatchNormCache>,
}

/// [N, C, H, W] → [N*H*W, C]
fn to_feature_rows(x: &[f64], n: usize, c: usize, h: usize, w: usize) -> Vec<f64> {
    let rows = n * h * w;
    let mut by_channel = vec![0.0f64; x.len()];
    swap_leading_axes_f64(x, &mut by_channel, n, c, h, w);
    let mut out = vec![0.0f64; x.len()];
    transpose_f64(&by_channel, &mut out, c, rows);
    out
}

/// [N*H*W, C] → [N, C, H, W]
fn from_feature_rows(rows_major: &[f64], n: usize, c: usize, h: usize, w: usize) -> Vec<f64> {
    let rows = n * h * w;
    let mut by_channel = vec![0.0f64; rows_major.len()];
    transpose_f64(rows_major, &mut by_channel, rows, c);
    let mut out = vec![0.0f64; rows_major.len()];
    swap_leading_axes_f64(&by_channel, &mut out, c, n, h, w);
    out
}

/// Spatial batchnorm forward. `gamma`, `beta` and `running` are per channel [C].
/// Returns (out [N, C, H, W], cache, updated running statistics).
pub fn spatial_batchnorm_forward(
    x: &Tensor,
    gamma: &Tensor,
    beta: &Tensor,
    cfg: &BatchNormConfig,
    running: &RunningStats,
) -> Result<(Tensor, SpatialBatchNormCache, RunningStats)> {
    let (n, c, h, w) = x.dims4("spatial_batchnorm_forward")?;

    let flat = Tensor::from_vec(to_feature_rows(&x.data, n, c, h, w), &[n * h * w, c])?;
    let (out_flat, bn, updated) = batchnorm_forward(&flat, gamma, beta, cfg, running)?;
    let out = Tensor::from_vec(from_feature_rows(&out_flat.data, n, c, h, w), &x.shape)?;

    let cache = SpatialBatchNormCache { x: x.clone(), cfg: cfg.clone(), bn };
    Ok((out, cache, updated))
}

/// Spatial batchnorm backward. Returns (dx [N, C, H, W], dgamma [C], dbeta [C]).
pub fn spatial_batchnorm_backward(
    dout: &Tensor,
    cache: &SpatialBatchNormCache,
) -> Result<(Tensor, Tensor, Tensor)> {
    dout.expect_shape("spatial_batchnorm_backward", &cache.x.shape)?;
    let (n, c, h, w) = dout.dims4("spatial_batchnorm_backward")?;
    let bn = cache.bn.as_ref().ok_or_else(|| {
        KernelError::invalid_argument("cache", format!("{} mode forward has no batchnorm cache", cache.cfg.mode))
    })?;

    let dout_flat = Tensor::from_vec(to_feature_rows(&dout.data, n, c, h, w), &[n * h * w, c])?;
    let (dx_flat, dgamma, dbeta) = batchnorm_backward(&dout_flat, bn)?;
    let dx = Tensor::from_vec(from_feature_rows(&dx_flat.data, n, c, h, w), &dout.shape)?;

    Ok((dx, dgamma, dbeta))
}
