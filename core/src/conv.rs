/// Naive 2-D convolution, one window at a time.
///
/// x: [N, C, H, W], w: [F, C, HH, WW], b: [F]
/// out: [N, F, H', W'] with H' = 1 + (H + 2*pad - HH) / stride (same for W').
///
/// Each example is zero-padded by `pad` on every spatial side. For every
/// filter the window slides row-major over the padded example:
///   out[n,f,oi,oj] = sum_{c,ki,kj} x_pad[n,c,oi*s+ki,oj*s+kj] * w[f,c,ki,kj] + b[f]
///
/// Backward replays the same traversal and accumulates dw, db and dx.
/// Contributions that land in the zero border are dropped.

use tracing::trace;

use crate::config::ConvConfig;
use crate::error::{KernelError, Result};
use crate::tensor::Tensor;
use crate::window::{is_pad_coordinate, output_dim, padded_to_input, plane_offset, zero_pad};

#[derive(Clone, Debug)]
pub struct ConvCache {
    pub x: Tensor,
    pub w: Tensor,
    pub b: Tensor,
    pub cfg: ConvConfig,
}

/// Resolved dimensions of one convolution call.
#[derive(Clone, Copy, Debug)]
struct ConvDims {
    n: usize,
    c: usize,
    h: usize,
    w: usize,
    f: usize,
    hh: usize,
    ww: usize,
    h_out: usize,
    w_out: usize,
}

impl ConvDims {
    fn resolve(op: &'static str, x: &Tensor, w: &Tensor, b: &Tensor, cfg: &ConvConfig) -> Result<Self> {
        let (n, c, h, wd) = x.dims4(op)?;
        let (f, wc, hh, ww) = w.dims4(op)?;
        if wc != c {
            return Err(KernelError::shape_mismatch(op, &[f, c, hh, ww], &w.shape));
        }
        b.expect_shape(op, &[f])?;
        let h_out = output_dim(h, hh, cfg.pad, cfg.stride)?;
        let w_out = output_dim(wd, ww, cfg.pad, cfg.stride)?;
        Ok(ConvDims { n, c, h, w: wd, f, hh, ww, h_out, w_out })
    }

    fn padded(&self, pad: usize) -> (usize, usize) {
        (self.h + 2 * pad, self.w + 2 * pad)
    }
}

pub fn conv_forward_naive(
    x: &Tensor,
    w: &Tensor,
    b: &Tensor,
    cfg: &ConvConfig,
) -> Result<(Tensor, ConvCache)> {
    let dims = ConvDims::resolve("conv_forward_naive", x, w, b, cfg)?;
    let ConvDims { n, c, h, f, hh, ww, h_out, w_out, .. } = dims;
    let (hp, wp) = dims.padded(cfg.pad);
    let s = cfg.stride;
    trace!(x_shape = ?x.shape, w_shape = ?w.shape, h_out, w_out, stride = s, pad = cfg.pad, "conv forward");

    let example_len = c * h * dims.w;
    let filter_len = c * hh * ww;
    let mut out = Tensor::zeros(&[n, f, h_out, w_out]);

    for ni in 0..n {
        let example = zero_pad(&x.data[ni * example_len..(ni + 1) * example_len], c, h, dims.w, cfg.pad);
        for fi in 0..f {
            let filter = &w.data[fi * filter_len..(fi + 1) * filter_len];
            for oi in 0..h_out {
                for oj in 0..w_out {
                    let mut acc = 0.0f64;
                    for ci in 0..c {
                        let plane = &example[ci * hp * wp..(ci + 1) * hp * wp];
                        let kernel = &filter[ci * hh * ww..(ci + 1) * hh * ww];
                        for ki in 0..hh {
                            for kj in 0..ww {
                                acc += plane[plane_offset(oi * s, oj * s, ki, kj, wp)] * kernel[ki * ww + kj];
                            }
                        }
                    }
                    out.data[((ni * f + fi) * h_out + oi) * w_out + oj] = acc + b.data[fi];
                }
            }
        }
    }

    let cache = ConvCache { x: x.clone(), w: w.clone(), b: b.clone(), cfg: *cfg };
    Ok((out, cache))
}

/// Returns (dx [N, C, H, W], dw [F, C, HH, WW], db [F]).
pub fn conv_backward_naive(dout: &Tensor, cache: &ConvCache) -> Result<(Tensor, Tensor, Tensor)> {
    let ConvCache { x, w, b, cfg } = cache;
    let dims = ConvDims::resolve("conv_backward_naive", x, w, b, cfg)?;
    let ConvDims { n, c, h, f, hh, ww, h_out, w_out, .. } = dims;
    dout.expect_shape("conv_backward_naive", &[n, f, h_out, w_out])?;
    let (hp, wp) = dims.padded(cfg.pad);
    let s = cfg.stride;
    let pad = cfg.pad;

    let example_len = c * h * dims.w;
    let filter_len = c * hh * ww;
    let mut dx = Tensor::zeros(&x.shape);
    let mut dw = Tensor::zeros(&w.shape);
    let mut db = Tensor::zeros(&b.shape);

    for ni in 0..n {
        let example = zero_pad(&x.data[ni * example_len..(ni + 1) * example_len], c, h, dims.w, pad);
        for fi in 0..f {
            for oi in 0..h_out {
                for oj in 0..w_out {
                    let g = dout.data[((ni * f + fi) * h_out + oi) * w_out + oj];
                    db.data[fi] += g;
                    for ci in 0..c {
                        for ki in 0..hh {
                            for kj in 0..ww {
                                let w_idx = fi * filter_len + (ci * hh + ki) * ww + kj;
                                let pi = oi * s + ki;
                                let pj = oj * s + kj;

                                // dw += window patch * upstream scalar
                                dw.data[w_idx] += example[ci * hp * wp + plane_offset(oi * s, oj * s, ki, kj, wp)] * g;

                                // dx += filter weight * upstream scalar, skipping the border
                                if !is_pad_coordinate(pi, pj, pad, hp, wp) {
                                    let (xi, xj) = padded_to_input(pi, pj, pad);
                                    dx.data[((ni * c + ci) * h + xi) * dims.w + xj] += w.data[w_idx] * g;
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    Ok((dx, dw, db))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_values_with_padding() {
        // 1x1x2x2 input, one 1x1x2x2 all-ones filter, pad 1, stride 1 → 3x3 output
        let x = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[1, 1, 2, 2]).unwrap();
        let w = Tensor::from_vec(vec![1.0; 4], &[1, 1, 2, 2]).unwrap();
        let b = Tensor::from_vec(vec![0.5], &[1]).unwrap();
        let cfg = ConvConfig { stride: 1, pad: 1 };
        let (out, _) = conv_forward_naive(&x, &w, &b, &cfg).unwrap();
        assert_eq!(out.shape, vec![1, 1, 3, 3]);
        #[rustfmt::skip]
        let expected = vec![
            1.5, 3.5, 2.5,
            4.5, 10.5, 6.5,
            3.5, 7.5, 4.5,
        ];
        assert_eq!(out.data, expected);
    }

    #[test]
    fn test_stride_two() {
        let x = Tensor::from_vec((0..16).map(|v| v as f64).collect(), &[1, 1, 4, 4]).unwrap();
        let w = Tensor::from_vec(vec![1.0, 0.0, 0.0, 0.0], &[1, 1, 2, 2]).unwrap();
        let b = Tensor::zeros(&[1]);
        let cfg = ConvConfig { stride: 2, pad: 0 };
        let (out, _) = conv_forward_naive(&x, &w, &b, &cfg).unwrap();
        // picks the top-left of each 2x2 block
        assert_eq!(out.data, vec![0.0, 2.0, 8.0, 10.0]);
    }

    #[test]
    fn test_backward_db_sums_positions() {
        let x = Tensor::from_vec((0..18).map(|v| v as f64 * 0.1).collect(), &[1, 2, 3, 3]).unwrap();
        let w = Tensor::from_vec(vec![0.5; 2 * 2 * 2 * 2], &[2, 2, 2, 2]).unwrap();
        let b = Tensor::zeros(&[2]);
        let cfg = ConvConfig { stride: 1, pad: 0 };
        let (out, cache) = conv_forward_naive(&x, &w, &b, &cfg).unwrap();
        let dout = Tensor::from_vec(vec![1.0; out.numel()], &out.shape).unwrap();
        let (dx, dw, db) = conv_backward_naive(&dout, &cache).unwrap();
        assert_eq!(db.data, vec![4.0, 4.0]);
        assert_eq!(dx.shape, x.shape);
        assert_eq!(dw.shape, w.shape);
        // centre pixel is covered by all 4 windows of both filters
        assert!((dx.data[4] - 4.0 * 2.0 * 0.5).abs() < 1e-12);
        // corner pixel by exactly one window per filter
        assert!((dx.data[0] - 2.0 * 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_channel_mismatch() {
        let x = Tensor::zeros(&[1, 3, 4, 4]);
        let w = Tensor::zeros(&[2, 2, 3, 3]);
        let b = Tensor::zeros(&[2]);
        let err = conv_forward_naive(&x, &w, &b, &ConvConfig { stride: 1, pad: 0 }).unwrap_err();
        assert!(matches!(err, KernelError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_zero_stride_rejected() {
        let x = Tensor::zeros(&[1, 1, 4, 4]);
        let w = Tensor::zeros(&[1, 1, 3, 3]);
        let b = Tensor::zeros(&[1]);
        let err = conv_forward_naive(&x, &w, &b, &ConvConfig { stride: 0, pad: 0 }).unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument { arg: "stride", .. }));
    }
}
