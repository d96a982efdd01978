//! Parameter initializers (PyTorch-compatible conventions).
//!
//! All matrices are row-major `(rows, cols)` flat vectors.

use nalgebra::DMatrix;
use rand::Rng;
use rand_distr::StandardNormal;

/// `n` samples from N(mean, std²).
pub fn normal<R: Rng + ?Sized>(rng: &mut R, n: usize, mean: f32, std: f32) -> Vec<f32> {
    (0..n)
        .map(|_| {
            let eps: f32 = rng.sample(StandardNormal);
            mean + std * eps
        })
        .collect()
}

/// `n` samples from U(-bound, bound).
pub fn uniform<R: Rng + ?Sized>(rng: &mut R, n: usize, bound: f32) -> Vec<f32> {
    if bound <= 0.0 {
        return vec![0.0; n];
    }
    (0..n).map(|_| rng.gen_range(-bound..bound)).collect()
}

/// Glorot/Xavier uniform for a `(fan_out, fan_in)` weight.
pub fn xavier_uniform<R: Rng + ?Sized>(rng: &mut R, fan_out: usize, fan_in: usize) -> Vec<f32> {
    let bound = (6.0 / (fan_in + fan_out) as f32).sqrt();
    uniform(rng, fan_out * fan_in, bound)
}

/// `nn.Linear` default: weight and bias from U(-1/√fan_in, 1/√fan_in).
pub fn linear_default<R: Rng + ?Sized>(
    rng: &mut R,
    out_dim: usize,
    in_dim: usize,
) -> (Vec<f32>, Vec<f32>) {
    let bound = 1.0 / (in_dim as f32).sqrt();
    (uniform(rng, out_dim * in_dim, bound), uniform(rng, out_dim, bound))
}

/// (Semi-)orthogonal `(rows, cols)` matrix.
///
/// Q factor of a Gaussian `(max, min)` matrix with column signs fixed by
/// `diag(R)`; wide shapes are produced transposed. Rows (or columns,
/// whichever is fewer) are orthonormal.
pub fn orthogonal<R: Rng + ?Sized>(rng: &mut R, rows: usize, cols: usize) -> Vec<f32> {
    let tall = rows >= cols;
    let (m, n) = if tall { (rows, cols) } else { (cols, rows) };

    let qr = DMatrix::from_vec(m, n, normal(rng, m * n, 0.0, 1.0)).qr();
    let r = qr.r();
    let mut q = qr.q();
    for j in 0..n {
        if r[(j, j)] < 0.0 {
            q.column_mut(j).iter_mut().for_each(|v| *v = -*v);
        }
    }

    let mut out = vec![0.0f32; rows * cols];
    for j in 0..n {
        for i in 0..m {
            if tall {
                out[i * cols + j] = q[(i, j)];
            } else {
                out[j * cols + i] = q[(i, j)];
            }
        }
    }
    out
}
