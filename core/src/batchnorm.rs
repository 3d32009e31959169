/// Batch normalization over the batch axis of an [N, D] input.
///
/// Train forward, per feature j:
///   mean    = sum_i x[i,j] / N
///   dev     = x - mean
///   sq_dev  = dev^2
///   var     = sum_i sq_dev[i,j] / N          (biased, N divisor)
///   denom   = sqrt(var) + eps                (eps on the std, not under the sqrt)
///   x_hat   = dev / denom
///   out     = gamma * x_hat + beta
///
/// Running statistics are blended with `momentum` after normalization and do
/// not affect the current output. The running "var" tracks `denom`.
///
/// Test forward uses the running statistics directly:
///   out = gamma * (x - running_mean) / (running_var + eps) + beta
///
/// NOTE: train adds eps to the standard deviation while test adds it to the
/// running statistic. The asymmetry is kept as-is for numerical compatibility
/// with existing checkpoints.
///
/// A feature with zero batch variance (a constant column, or N = 1) has a
/// finite forward output equal to beta, but both backward forms divide by
/// sqrt(var) = 0 and return NaN in that feature's dx. An empty batch is
/// rejected in train mode.

use tracing::debug;

use crate::config::{BatchNormConfig, Mode, RunningStats};
use crate::error::{KernelError, Result};
use crate::tensor::Tensor;

/// Every intermediate of the train-mode forward pass. The backward pass
/// replays the chain rule from these without recomputing anything.
#[derive(Clone, Debug)]
pub struct BatchNormCache {
    pub x: Tensor,
    pub gamma: Vec<f64>,
    pub beta: Vec<f64>,
    /// [N, D]
    pub x_hat: Tensor,
    /// [D] sqrt(var) + eps
    pub denom: Vec<f64>,
    /// [D] mean of squared deviations
    pub var: Vec<f64>,
    /// [N, D]
    pub sq_dev: Tensor,
    /// [N, D] x - mean
    pub dev: Tensor,
    /// [D]
    pub mean: Vec<f64>,
}

fn check_params(op: &'static str, x: &Tensor, gamma: &Tensor, beta: &Tensor) -> Result<(usize, usize)> {
    let (n, d) = x.dims2(op)?;
    gamma.expect_shape(op, &[d])?;
    beta.expect_shape(op, &[d])?;
    Ok((n, d))
}

/// Batchnorm forward.
///
/// Returns (out [N, D], cache, updated running statistics). The cache is
/// `None` in test mode, which has nothing to differentiate through.
pub fn batchnorm_forward(
    x: &Tensor,
    gamma: &Tensor,
    beta: &Tensor,
    cfg: &BatchNormConfig,
    running: &RunningStats,
) -> Result<(Tensor, Option<BatchNormCache>, RunningStats)> {
    let (n, d) = check_params("batchnorm_forward", x, gamma, beta)?;
    if running.mean.len() != d || running.var.len() != d {
        return Err(KernelError::shape_mismatch(
            "batchnorm_forward",
            &[d],
            &[running.mean.len().max(running.var.len())],
        ));
    }

    match cfg.mode {
        Mode::Train => {
            if n == 0 {
                return Err(KernelError::invalid_argument("x", "train-mode batchnorm needs at least one row"));
            }
            let mut mean = vec![0.0f64; d];
            for i in 0..n {
                for j in 0..d {
                    mean[j] += x.data[i * d + j];
                }
            }
            for m in mean.iter_mut() { *m /= n as f64; }

            let mut dev = Tensor::zeros(&[n, d]);
            let mut sq_dev = Tensor::zeros(&[n, d]);
            let mut var = vec![0.0f64; d];
            for i in 0..n {
                for j in 0..d {
                    let idx = i * d + j;
                    dev.data[idx] = x.data[idx] - mean[j];
                    sq_dev.data[idx] = dev.data[idx] * dev.data[idx];
                    var[j] += sq_dev.data[idx];
                }
            }
            for v in var.iter_mut() { *v /= n as f64; }

            let denom: Vec<f64> = var.iter().map(|v| v.sqrt() + cfg.eps).collect();

            let mut x_hat = Tensor::zeros(&[n, d]);
            let mut out = Tensor::zeros(&[n, d]);
            for i in 0..n {
                for j in 0..d {
                    let idx = i * d + j;
                    x_hat.data[idx] = dev.data[idx] / denom[j];
                    out.data[idx] = gamma.data[j] * x_hat.data[idx] + beta.data[j];
                }
            }

            let m = cfg.momentum;
            let updated = RunningStats {
                mean: running.mean.iter().zip(&mean).map(|(r, s)| m * r + (1.0 - m) * s).collect(),
                var: running.var.iter().zip(&denom).map(|(r, s)| m * r + (1.0 - m) * s).collect(),
            };
            debug!(batch = n, features = d, momentum = m, "batchnorm running statistics updated");

            let cache = BatchNormCache {
                x: x.clone(),
                gamma: gamma.data.clone(),
                beta: beta.data.clone(),
                x_hat,
                denom,
                var,
                sq_dev,
                dev,
                mean,
            };
            Ok((out, Some(cache), updated))
        }
        Mode::Test => {
            let mut out = Tensor::zeros(&[n, d]);
            for i in 0..n {
                for j in 0..d {
                    let idx = i * d + j;
                    let x_hat = (x.data[idx] - running.mean[j]) / (running.var[j] + cfg.eps);
                    out.data[idx] = gamma.data[j] * x_hat + beta.data[j];
                }
            }
            Ok((out, None, running.clone()))
        }
    }
}

fn check_dout(op: &'static str, dout: &Tensor, cache: &BatchNormCache) -> Result<(usize, usize)> {
    dout.expect_shape(op, &cache.x.shape)?;
    dout.dims2(op)
}

/// Batchnorm backward, staged through every forward intermediate.
///
/// Returns (dx [N, D], dgamma [D], dbeta [D]).
pub fn batchnorm_backward(dout: &Tensor, cache: &BatchNormCache) -> Result<(Tensor, Tensor, Tensor)> {
    let (n, d) = check_dout("batchnorm_backward", dout, cache)?;
    let nf = n as f64;

    // out = gamma * x_hat + beta
    let mut dx_hat = vec![0.0f64; n * d];
    let mut dgamma = Tensor::zeros(&[d]);
    let mut dbeta = Tensor::zeros(&[d]);
    for i in 0..n {
        for j in 0..d {
            let idx = i * d + j;
            dx_hat[idx] = dout.data[idx] * cache.gamma[j];
            dgamma.data[j] += cache.x_hat.data[idx] * dout.data[idx];
            dbeta.data[j] += dout.data[idx];
        }
    }

    // x_hat = dev / denom
    let mut ddev = vec![0.0f64; n * d];
    let mut ddenom = vec![0.0f64; d];
    for i in 0..n {
        for j in 0..d {
            let idx = i * d + j;
            ddev[idx] = dx_hat[idx] / cache.denom[j];
            ddenom[j] += cache.dev.data[idx] * dx_hat[idx] * (-1.0 / (cache.denom[j] * cache.denom[j]));
        }
    }

    // denom = sqrt(var) + eps
    let dvar: Vec<f64> = (0..d).map(|j| ddenom[j] * 0.5 / cache.var[j].sqrt()).collect();

    // var = sum(sq_dev) / N ; sq_dev = dev^2
    for i in 0..n {
        for j in 0..d {
            let idx = i * d + j;
            let dsq = dvar[j] / nf;
            ddev[idx] += 2.0 * cache.dev.data[idx] * dsq;
        }
    }

    // dev = x - mean ; mean = sum(x) / N
    let mut dmean = vec![0.0f64; d];
    for i in 0..n {
        for j in 0..d {
            dmean[j] -= ddev[i * d + j];
        }
    }
    let mut dx = Tensor::zeros(&[n, d]);
    for i in 0..n {
        for j in 0..d {
            let idx = i * d + j;
            dx.data[idx] = ddev[idx] + dmean[j] / nf;
        }
    }

    Ok((dx, dgamma, dbeta))
}

/// Batchnorm backward in closed form. Same cache and outputs as
/// [`batchnorm_backward`], matching it to floating-point tolerance:
///
///   dx = (dx_hat - mean(dx_hat)) / denom - x_hat * mean(dx_hat * x_hat) / sqrt(var)
pub fn batchnorm_backward_alt(dout: &Tensor, cache: &BatchNormCache) -> Result<(Tensor, Tensor, Tensor)> {
    let (n, d) = check_dout("batchnorm_backward_alt", dout, cache)?;
    let nf = n as f64;

    let mut dgamma = Tensor::zeros(&[d]);
    let mut dbeta = Tensor::zeros(&[d]);
    let mut mean_dx_hat = vec![0.0f64; d];
    let mut mean_dx_hat_x_hat = vec![0.0f64; d];
    for i in 0..n {
        for j in 0..d {
            let idx = i * d + j;
            let g = dout.data[idx];
            let x_hat = cache.x_hat.data[idx];
            dgamma.data[j] += x_hat * g;
            dbeta.data[j] += g;
            mean_dx_hat[j] += g * cache.gamma[j] / nf;
            mean_dx_hat_x_hat[j] += g * cache.gamma[j] * x_hat / nf;
        }
    }

    let mut dx = Tensor::zeros(&[n, d]);
    for i in 0..n {
        for j in 0..d {
            let idx = i * d + j;
            let dx_hat = dout.data[idx] * cache.gamma[j];
            dx.data[idx] = (dx_hat - mean_dx_hat[j]) / cache.denom[j]
                - cache.x_hat.data[idx] * mean_dx_hat_x_hat[j] / cache.var[j].sqrt();
        }
    }

    Ok((dx, dgamma, dbeta))
}
