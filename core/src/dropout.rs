/// Dropout with keep probability `p`.
///
/// Train: a fresh mask keeps each element with probability p; out = x * mask.
/// Test:  out = x * p, no mask.
///
/// Train output is not divided by p. The expected activation is matched by
/// scaling at test time instead.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::{DropoutConfig, Mode};
use crate::error::{KernelError, Result};
use crate::tensor::Tensor;

#[derive(Clone, Debug)]
pub struct DropoutCache {
    pub cfg: DropoutConfig,
    /// Shape of the forward input; `dout` must match it.
    pub shape: Vec<usize>,
    /// Keep mask, same length as x. `None` in test mode.
    pub mask: Option<Vec<bool>>,
}

fn draw_mask(len: usize, p: f64, seed: Option<u64>) -> Vec<bool> {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::seed_from_u64(rand::rng().random()),
    };
    (0..len).map(|_| rng.random::<f64>() < p).collect()
}

pub fn dropout_forward(x: &Tensor, cfg: &DropoutConfig) -> Result<(Tensor, DropoutCache)> {
    cfg.validate()?;

    match cfg.mode {
        Mode::Train => {
            let mask = draw_mask(x.numel(), cfg.p, cfg.seed);
            debug!(p = cfg.p, seed = ?cfg.seed, len = mask.len(), "dropout mask drawn");
            let data = x
                .data
                .iter()
                .zip(&mask)
                .map(|(&v, &keep)| if keep { v } else { 0.0 })
                .collect();
            let out = Tensor { data, shape: x.shape.clone() };
            Ok((out, DropoutCache { cfg: cfg.clone(), shape: x.shape.clone(), mask: Some(mask) }))
        }
        Mode::Test => {
            let out = Tensor {
                data: x.data.iter().map(|&v| v * cfg.p).collect(),
                shape: x.shape.clone(),
            };
            Ok((out, DropoutCache { cfg: cfg.clone(), shape: x.shape.clone(), mask: None }))
        }
    }
}

/// Dropout backward. Train reuses the forward mask; test passes dout through.
pub fn dropout_backward(dout: &Tensor, cache: &DropoutCache) -> Result<Tensor> {
    dout.expect_shape("dropout_backward", &cache.shape)?;
    match &cache.mask {
        Some(mask) => {
            if mask.len() != dout.numel() {
                return Err(KernelError::DataLength { len: mask.len(), shape: dout.shape.clone() });
            }
            let data = dout
                .data
                .iter()
                .zip(mask)
                .map(|(&g, &keep)| if keep { g } else { 0.0 })
                .collect();
            Ok(Tensor { data, shape: dout.shape.clone() })
        }
        None => Ok(dout.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> Tensor {
        Tensor::from_vec((1..=200).map(|v| v as f64).collect(), &[10, 20]).unwrap()
    }

    #[test]
    fn test_keep_all_is_identity() {
        let x = input();
        let cfg = DropoutConfig { p: 1.0, mode: Mode::Train, seed: None };
        let (out, cache) = dropout_forward(&x, &cfg).unwrap();
        assert_eq!(out, x);
        assert!(cache.mask.unwrap().iter().all(|&k| k));
    }

    #[test]
    fn test_keep_none_zeroes() {
        let cfg = DropoutConfig { p: 0.0, mode: Mode::Train, seed: Some(3) };
        let (out, _) = dropout_forward(&input(), &cfg).unwrap();
        assert!(out.data.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_seed_is_deterministic() {
        let cfg = DropoutConfig { p: 0.5, mode: Mode::Train, seed: Some(42) };
        let (a, ca) = dropout_forward(&input(), &cfg).unwrap();
        let (b, cb) = dropout_forward(&input(), &cfg).unwrap();
        assert_eq!(a, b);
        assert_eq!(ca.mask, cb.mask);
        let kept = ca.mask.unwrap().iter().filter(|&&k| k).count();
        assert!(kept > 60 && kept < 140, "kept {kept} of 200");
    }

    #[test]
    fn test_test_mode_scales() {
        let x = input();
        let cfg = DropoutConfig { p: 0.25, mode: Mode::Test, seed: None };
        let (out, cache) = dropout_forward(&x, &cfg).unwrap();
        assert!(cache.mask.is_none());
        assert_eq!(out.data[3], 4.0 * 0.25);
        let dout = Tensor::from_vec(vec![2.0; 200], &[10, 20]).unwrap();
        assert_eq!(dropout_backward(&dout, &cache).unwrap(), dout);
    }

    #[test]
    fn test_backward_reuses_mask() {
        let cfg = DropoutConfig { p: 0.4, mode: Mode::Train, seed: Some(9) };
        let (out, cache) = dropout_forward(&input(), &cfg).unwrap();
        let dout = Tensor::from_vec(vec![1.0; 200], &[10, 20]).unwrap();
        let dx = dropout_backward(&dout, &cache).unwrap();
        for (g, o) in dx.data.iter().zip(&out.data) {
            // inputs are all nonzero, so a zero output marks a dropped element
            assert_eq!(*g == 0.0, *o == 0.0);
        }
    }

    #[test]
    fn test_backward_checks_forward_shape() {
        let cfg = DropoutConfig { p: 0.5, mode: Mode::Train, seed: Some(1) };
        let (_, cache) = dropout_forward(&input(), &cfg).unwrap();
        assert_eq!(cache.shape, vec![10, 20]);
        // same element count, transposed layout
        let dout = Tensor::zeros(&[20, 10]);
        assert!(matches!(dropout_backward(&dout, &cache), Err(KernelError::ShapeMismatch { .. })));

        let cfg = DropoutConfig { p: 0.5, mode: Mode::Test, seed: None };
        let (_, cache) = dropout_forward(&input(), &cfg).unwrap();
        assert!(matches!(dropout_backward(&dout, &cache), Err(KernelError::ShapeMismatch { .. })));
    }
}
