/// Rectified linear unit.
///
/// Forward: out = max(0, x). Backward: dx = dout where x > 0, else 0.
/// The inequality is strict, so x == 0 passes no gradient.

use crate::error::Result;
use crate::tensor::Tensor;

/// The forward input, kept for gating the backward pass.
#[derive(Clone, Debug)]
pub struct ReluCache {
    pub x: Tensor,
}

pub fn relu_forward(x: &Tensor) -> (Tensor, ReluCache) {
    let out = Tensor {
        data: x.data.iter().map(|&v| v.max(0.0)).collect(),
        shape: x.shape.clone(),
    };
    (out, ReluCache { x: x.clone() })
}

pub fn relu_backward(dout: &Tensor, cache: &ReluCache) -> Result<Tensor> {
    dout.expect_shape("relu_backward", &cache.x.shape)?;
    let data = dout
        .data
        .iter()
        .zip(&cache.x.data)
        .map(|(&g, &x)| if x > 0.0 { g } else { 0.0 })
        .collect();
    Ok(Tensor { data, shape: dout.shape.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu_forward_clamps() {
        let x = Tensor::from_vec(vec![-1.0, 0.0, 2.0], &[3]).unwrap();
        let (out, cache) = relu_forward(&x);
        assert_eq!(out.data, vec![0.0, 0.0, 2.0]);
        // cache holds the input, not the output
        assert_eq!(cache.x.data, vec![-1.0, 0.0, 2.0]);
    }

    #[test]
    fn test_relu_backward_zero_boundary() {
        let x = Tensor::from_vec(vec![-1.0, 0.0, 2.0], &[3]).unwrap();
        let (_, cache) = relu_forward(&x);
        let dout = Tensor::from_vec(vec![1.0, 1.0, 1.0], &[3]).unwrap();
        let dx = relu_backward(&dout, &cache).unwrap();
        assert_eq!(dx.data, vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_relu_backward_shape_mismatch() {
        let (_, cache) = relu_forward(&Tensor::zeros(&[2, 2]));
        assert!(relu_backward(&Tensor::zeros(&[4]), &cache).is_err());
    }
}
