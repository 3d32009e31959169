/// Sliding-window bookkeeping shared by convolution and max pooling.
///
/// Windows are visited row-major: left to right along a row of output
/// positions, then top to bottom. Window (oi, oj) starts at
/// (oi * stride, oj * stride) in the (possibly padded) input plane.

use crate::error::{KernelError, Result};

/// Number of window positions along one axis: 1 + (dim + 2*pad - window) / stride.
///
/// Integer division truncates. A non-integer quotient is not reported;
/// trailing input rows/columns that do not fill a window are ignored.
pub fn output_dim(dim: usize, window: usize, pad: usize, stride: usize) -> Result<usize> {
    if stride == 0 {
        return Err(KernelError::invalid_argument("stride", "must be positive"));
    }
    let padded = dim + 2 * pad;
    if window == 0 || window > padded {
        return Err(KernelError::invalid_argument(
            "window",
            format!("window of {window} does not fit padded extent {padded}"),
        ));
    }
    Ok(1 + (padded - window) / stride)
}

/// Zero-pad one example [C, H, W] by `pad` on each spatial side.
/// Returns [C, H + 2*pad, W + 2*pad].
pub fn zero_pad(x: &[f64], c: usize, h: usize, w: usize, pad: usize) -> Vec<f64> {
    debug_assert_eq!(x.len(), c * h * w);
    if pad == 0 {
        return x.to_vec();
    }
    let hp = h + 2 * pad;
    let wp = w + 2 * pad;
    let mut out = vec![0.0f64; c * hp * wp];
    for ch in 0..c {
        for i in 0..h {
            let src = (ch * h + i) * w;
            let dst = (ch * hp + i + pad) * wp + pad;
            out[dst..dst + w].copy_from_slice(&x[src..src + w]);
        }
    }
    out
}

/// True if padded coordinate (i, j) lies in the zero border of a
/// `padded_h` x `padded_w` plane.
#[inline]
pub fn is_pad_coordinate(i: usize, j: usize, pad: usize, padded_h: usize, padded_w: usize) -> bool {
    i < pad || i >= padded_h - pad || j < pad || j >= padded_w - pad
}

/// Map a non-border padded coordinate back to the unpadded input.
#[inline]
pub fn padded_to_input(i: usize, j: usize, pad: usize) -> (usize, usize) {
    (i - pad, j - pad)
}

/// Flat offset of `(ki, kj)` inside a window whose top-left corner is at
/// `(row0, col0)` of a plane `width` columns wide.
#[inline]
pub fn plane_offset(row0: usize, col0: usize, ki: usize, kj: usize, width: usize) -> usize {
    (row0 + ki) * width + col0 + kj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_dim_exact() {
        // 1 + (4 + 2 - 4) / 2 = 2
        assert_eq!(output_dim(4, 4, 1, 2).unwrap(), 2);
        assert_eq!(output_dim(5, 3, 1, 1).unwrap(), 5);
        assert_eq!(output_dim(4, 2, 0, 2).unwrap(), 2);
    }

    #[test]
    fn test_output_dim_truncates() {
        // (5 - 2) / 2 = 1.5 → 1
        assert_eq!(output_dim(5, 2, 0, 2).unwrap(), 2);
    }

    #[test]
    fn test_output_dim_rejects() {
        assert!(output_dim(4, 2, 0, 0).is_err());
        assert!(output_dim(2, 5, 1, 1).is_err());
        assert!(output_dim(4, 0, 0, 1).is_err());
    }

    #[test]
    fn test_zero_pad_layout() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let p = zero_pad(&x, 1, 2, 2, 1);
        #[rustfmt::skip]
        let expected = [
            0.0, 0.0, 0.0, 0.0,
            0.0, 1.0, 2.0, 0.0,
            0.0, 3.0, 4.0, 0.0,
            0.0, 0.0, 0.0, 0.0,
        ];
        assert_eq!(p, expected);
    }

    #[test]
    fn test_zero_pad_noop() {
        let x = [1.0, 2.0];
        assert_eq!(zero_pad(&x, 2, 1, 1, 0), x);
    }

    #[test]
    fn test_pad_coordinates() {
        // 4x4 padded plane, pad 1: interior is rows/cols 1..=2
        assert!(is_pad_coordinate(0, 1, 1, 4, 4));
        assert!(is_pad_coordinate(1, 3, 1, 4, 4));
        assert!(!is_pad_coordinate(1, 2, 1, 4, 4));
        assert_eq!(padded_to_input(2, 1, 1), (1, 0));
        assert!(!is_pad_coordinate(0, 0, 0, 2, 2));
    }
}
