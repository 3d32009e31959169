/// Numerical gradient verification.
///
/// Provides:
/// - `eval_numerical_gradient`: central differences of a scalar function
/// - `eval_numerical_gradient_array`: central differences of a tensor-valued
///   function contracted with an upstream gradient
/// - `rel_error` / `check_gradient`: comparing analytical and numerical results
///
/// Every backward kernel in the crate is verified against these.

use tracing::warn;

use crate::error::{KernelError, Result};
use crate::tensor::Tensor;

/// Default finite-difference step.
pub const FD_STEP: f64 = 1e-5;

/// Gradient of a scalar function `f` at `x` by central differences:
/// (f(x + h) - f(x - h)) / 2h, one element at a time.
pub fn eval_numerical_gradient(
    mut f: impl FnMut(&Tensor) -> Result<f64>,
    x: &Tensor,
    h: f64,
) -> Result<Tensor> {
    let mut grad = x.zeros_like();
    let mut shifted = x.clone();
    for idx in 0..x.numel() {
        let orig = shifted.data[idx];

        shifted.data[idx] = orig + h;
        let f_plus = f(&shifted)?;
        shifted.data[idx] = orig - h;
        let f_minus = f(&shifted)?;
        shifted.data[idx] = orig;

        grad.data[idx] = (f_plus - f_minus) / (2.0 * h);
    }
    Ok(grad)
}

/// Numerical vector-Jacobian product: for each element of `x`, the central
/// difference of `f` contracted with `dout`, i.e. d(sum(f(x) * dout)) / dx.
pub fn eval_numerical_gradient_array(
    mut f: impl FnMut(&Tensor) -> Result<Tensor>,
    x: &Tensor,
    dout: &Tensor,
    h: f64,
) -> Result<Tensor> {
    let mut grad = x.zeros_like();
    let mut shifted = x.clone();
    for idx in 0..x.numel() {
        let orig = shifted.data[idx];

        shifted.data[idx] = orig + h;
        let pos = f(&shifted)?;
        shifted.data[idx] = orig - h;
        let neg = f(&shifted)?;
        shifted.data[idx] = orig;

        pos.expect_shape("eval_numerical_gradient_array", &dout.shape)?;
        neg.expect_shape("eval_numerical_gradient_array", &dout.shape)?;
        let mut acc = 0.0f64;
        for k in 0..dout.numel() {
            acc += (pos.data[k] - neg.data[k]) * dout.data[k];
        }
        grad.data[idx] = acc / (2.0 * h);
    }
    Ok(grad)
}

/// Max elementwise relative error: max |a - b| / max(1e-8, |a| + |b|).
pub fn rel_error(a: &Tensor, b: &Tensor) -> Result<f64> {
    if a.shape != b.shape {
        return Err(KernelError::shape_mismatch("rel_error", &a.shape, &b.shape));
    }
    Ok(a
        .data
        .iter()
        .zip(&b.data)
        .map(|(x, y)| (x - y).abs() / (x.abs() + y.abs()).max(1e-8))
        .fold(0.0f64, f64::max))
}

/// Compare analytical and numerical gradients element by element.
/// Returns (num_checked, num_passed, max_relative_error).
///
/// Elements where both values are below `abs_threshold` are auto-passed
/// (below finite-difference resolution).
pub fn check_gradient(
    name: &str,
    analytical: &Tensor,
    numerical: &Tensor,
    abs_threshold: f64,
    tol: f64,
) -> Result<(usize, usize, f64)> {
    if analytical.shape != numerical.shape {
        return Err(KernelError::shape_mismatch("check_gradient", &numerical.shape, &analytical.shape));
    }

    let mut checked = 0;
    let mut passed = 0;
    let mut max_rel_err = 0.0f64;

    for (idx, (&a, &n)) in analytical.data.iter().zip(&numerical.data).enumerate() {
        checked += 1;
        let denom = a.abs().max(n.abs());
        if denom < abs_threshold {
            passed += 1;
            continue;
        }

        let rel_err = (a - n).abs() / denom;
        max_rel_err = max_rel_err.max(rel_err);
        if rel_err < tol {
            passed += 1;
        } else {
            warn!(name, idx, analytical = a, numerical = n, rel_err, "gradient check failed");
        }
    }

    Ok((checked, passed, max_rel_err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_gradient_of_square_sum() {
        let x = Tensor::from_vec(vec![1.0, -2.0, 0.5], &[3]).unwrap();
        let grad = eval_numerical_gradient(|t| Ok(t.data.iter().map(|v| v * v).sum()), &x, FD_STEP).unwrap();
        let expected = Tensor::from_vec(vec![2.0, -4.0, 1.0], &[3]).unwrap();
        assert!(rel_error(&grad, &expected).unwrap() < 1e-9);
    }

    #[test]
    fn test_array_gradient_contracts_dout() {
        // f(x) = 3x elementwise → vjp = 3 * dout
        let x = Tensor::from_vec(vec![0.1, 0.2], &[2]).unwrap();
        let dout = Tensor::from_vec(vec![1.0, -2.0], &[2]).unwrap();
        let grad = eval_numerical_gradient_array(
            |t| Ok(Tensor { data: t.data.iter().map(|v| 3.0 * v).collect(), shape: t.shape.clone() }),
            &x,
            &dout,
            FD_STEP,
        ).unwrap();
        assert!((grad.data[0] - 3.0).abs() < 1e-8);
        assert!((grad.data[1] + 6.0).abs() < 1e-8);
    }

    #[test]
    fn test_errors_propagate() {
        let x = Tensor::zeros(&[2]);
        let res = eval_numerical_gradient(|_| Err(KernelError::Config("boom".into())), &x, FD_STEP);
        assert_eq!(res.unwrap_err(), KernelError::Config("boom".into()));
    }

    #[test]
    fn test_rel_error_zero_and_shape() {
        let a = Tensor::zeros(&[2, 2]);
        assert_eq!(rel_error(&a, &a).unwrap(), 0.0);
        assert!(rel_error(&a, &Tensor::zeros(&[4])).is_err());
    }

    #[test]
    fn test_check_gradient_counts() {
        let a = Tensor::from_vec(vec![1.0, 2.0, 1e-9], &[3]).unwrap();
        let n = Tensor::from_vec(vec![1.0, 3.0, 0.0], &[3]).unwrap();
        let (checked, passed, max_err) = check_gradient("demo", &a, &n, 1e-6, 1e-3).unwrap();
        assert_eq!(checked, 3);
        assert_eq!(passed, 2);
        assert!((max_err - 1.0 / 3.0).abs() < 1e-12);
    }
}
