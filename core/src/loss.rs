/// Classification losses over class scores x: [N, C] and labels y: [N].
///
/// Both return (mean loss over the batch, dL/dx [N, C]) and start
/// backpropagation, so they have no separate backward kernel.

use crate::error::{KernelError, Result};
use crate::tensor::{softmax_f64, Tensor};

fn check_labels(op: &'static str, x: &Tensor, y: &[usize]) -> Result<(usize, usize)> {
    let (n, c) = x.dims2(op)?;
    if y.len() != n {
        return Err(KernelError::shape_mismatch(op, &[n], &[y.len()]));
    }
    if let Some((index, &label)) = y.iter().enumerate().find(|(_, &label)| label >= c) {
        return Err(KernelError::LabelOutOfRange { index, label, classes: c });
    }
    Ok((n, c))
}

/// Multiclass hinge loss.
///
///   margin[i,j] = max(0, x[i,j] - x[i,y_i] + 1), margin[i,y_i] = 0
///   loss        = sum(margin) / N
///   dx[i,j]     = [margin[i,j] > 0] / N,  dx[i,y_i] = -count(margin[i,:] > 0) / N
pub fn svm_loss(x: &Tensor, y: &[usize]) -> Result<(f64, Tensor)> {
    let (n, c) = check_labels("svm_loss", x, y)?;
    let nf = n as f64;

    let mut loss = 0.0f64;
    let mut dx = Tensor::zeros(&[n, c]);
    for i in 0..n {
        let row = &x.data[i * c..(i + 1) * c];
        let correct = row[y[i]];
        let mut num_pos = 0usize;
        for j in 0..c {
            if j == y[i] {
                continue;
            }
            let margin = (row[j] - correct + 1.0).max(0.0);
            if margin > 0.0 {
                loss += margin;
                num_pos += 1;
                dx.data[i * c + j] = 1.0 / nf;
            }
        }
        dx.data[i * c + y[i]] = -(num_pos as f64) / nf;
    }

    Ok((loss / nf, dx))
}

/// Softmax cross-entropy loss.
///
///   p       = softmax(x) row-wise (max-subtracted)
///   loss    = -sum_i log p[i, y_i] / N
///   dx      = (p - onehot(y)) / N
pub fn softmax_loss(x: &Tensor, y: &[usize]) -> Result<(f64, Tensor)> {
    let (n, c) = check_labels("softmax_loss", x, y)?;
    let nf = n as f64;

    let mut dx = Tensor::zeros(&[n, c]);
    softmax_f64(&x.data, &mut dx.data, n, c);

    let mut loss = 0.0f64;
    for i in 0..n {
        let idx = i * c + y[i];
        loss -= dx.data[idx].ln();
        dx.data[idx] -= 1.0;
    }
    for v in dx.data.iter_mut() {
        *v /= nf;
    }

    Ok((loss / nf, dx))
}
