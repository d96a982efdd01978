//! Token representation and quantization primitives.
//!
//! Everything here is batch-major: a `(batch, n)` matrix is a flat slice with
//! one row per batch element.

use rand::Rng;

use sygnal_core::ops;

/// One-hot rows for `indices`, each of width `n_dims`.
pub fn to_one_hot(indices: &[usize], n_dims: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; indices.len() * n_dims];
    for (row, &idx) in indices.iter().enumerate() {
        out[row * n_dims + idx] = 1.0;
    }
    out
}

/// Arg-max index of every row (inverse of [`to_one_hot`] for one-hot rows).
pub fn argmax_decode(tokens: &[f32], n_dims: usize) -> Vec<usize> {
    ops::argmax_rows(tokens, n_dims).into_iter().map(|(i, _)| i).collect()
}

/// Hard arg-max: exact one-hot rows plus the chosen indices.
pub fn hard_max(probs: &[f32], n_dims: usize) -> (Vec<f32>, Vec<usize>) {
    let indices = argmax_decode(probs, n_dims);
    (to_one_hot(&indices, n_dims), indices)
}

/// Draw one index from a probability row.
pub fn sample_categorical<R: Rng + ?Sized>(probs: &[f32], rng: &mut R) -> usize {
    let total: f32 = probs.iter().sum();
    let r = rng.gen::<f32>() * total;
    let mut acc = 0.0f32;
    let mut last_nonzero = 0;
    for (i, &p) in probs.iter().enumerate() {
        if p <= 0.0 {
            continue;
        }
        acc += p;
        last_nonzero = i;
        if r < acc {
            return i;
        }
    }
    last_nonzero
}

/// One categorical draw per row.
pub fn sample_rows<R: Rng + ?Sized>(probs: &[f32], n_dims: usize, rng: &mut R) -> Vec<usize> {
    probs
        .chunks_exact(n_dims)
        .map(|row| sample_categorical(row, rng))
        .collect()
}

/// Relaxed one-hot categorical sample at temperature `tau`.
///
/// `softmax((log p + g) / tau)` with Gumbel noise `g`. With `hard`, the
/// forward value is the exact one-hot of the relaxed sample's arg-max (the
/// straight-through estimator routes the gradient through the soft sample).
pub fn gumbel_softmax<R: Rng + ?Sized>(
    probs: &[f32],
    n_dims: usize,
    tau: f32,
    hard: bool,
    rng: &mut R,
) -> Vec<f32> {
    let perturbed: Vec<f32> = probs
        .iter()
        .map(|&p| {
            let u: f32 = rng.gen_range(f32::MIN_POSITIVE..1.0);
            let gumbel = -(-u.ln()).ln();
            (p.ln() + gumbel) / tau
        })
        .collect();
    let soft = ops::softmax_rows(&perturbed, n_dims);
    if hard {
        hard_max(&soft, n_dims).0
    } else {
        soft
    }
}

/// Entropy of each row of a log-probability matrix.
pub fn categorical_entropy(log_probs: &[f32], n_dims: usize) -> Vec<f32> {
    log_probs
        .chunks_exact(n_dims)
        .map(|row| {
            -row.iter()
                .map(|&lp| {
                    let p = lp.exp();
                    if p > 0.0 { p * lp } else { 0.0 }
                })
                .sum::<f32>()
        })
        .collect()
}

/// The two VQ-VAE auxiliary terms for one step, batch-averaged.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VqLoss {
    /// `mean ||sg(z) - e||²`: moves codewords toward the encoder output.
    pub codebook: f32,
    /// `mean ||z - sg(e)||²`: commits the encoder output to its codeword.
    pub commitment: f32,
}

impl VqLoss {
    pub fn total(&self, beta: f32) -> f32 {
        self.codebook + beta * self.commitment
    }
}

/// Gradients of one VQ step.
#[derive(Clone, Debug)]
pub struct VqGrads {
    /// `(batch, dim)`
    pub d_pre_quant: Vec<f32>,
    /// `(num_codewords, dim)`
    pub d_codebook: Vec<f32>,
}

/// Learned codebook `(num_codewords, dim)`.
#[derive(Clone, Debug)]
pub struct Codebook {
    pub weight: Vec<f32>,
    pub num_codewords: usize,
    pub dim: usize,
}

impl Codebook {
    pub fn zeros(num_codewords: usize, dim: usize) -> Self {
        Self {
            weight: vec![0.0; num_codewords * dim],
            num_codewords,
            dim,
        }
    }

    pub fn codeword(&self, k: usize) -> &[f32] {
        &self.weight[k * self.dim..(k + 1) * self.dim]
    }

    /// Squared Euclidean distance from each row of `z: (batch, dim)` to every
    /// codeword → `(batch, num_codewords)`.
    pub fn distances(&self, z: &[f32], batch: usize) -> Vec<f32> {
        let mut out = vec![0.0f32; batch * self.num_codewords];
        for (b, row) in z.chunks_exact(self.dim).take(batch).enumerate() {
            for k in 0..self.num_codewords {
                out[b * self.num_codewords + k] = ops::squared_distance(row, self.codeword(k));
            }
        }
        out
    }

    /// Rows of the codebook at `indices` → `(indices.len(), dim)`.
    pub fn gather(&self, indices: &[usize]) -> Vec<f32> {
        let mut out = Vec::with_capacity(indices.len() * self.dim);
        for &k in indices {
            out.extend_from_slice(self.codeword(k));
        }
        out
    }

    /// Nearest-codeword assignment: `(quantized, indices)`.
    ///
    /// Ties resolve to the lowest index. The forward value is the codeword;
    /// gradients pass straight through to `z` (see [`Codebook::vq_backward`]).
    pub fn quantize(&self, z: &[f32], batch: usize) -> (Vec<f32>, Vec<usize>) {
        let d = self.distances(z, batch);
        let indices: Vec<usize> = d
            .chunks_exact(self.num_codewords)
            .map(|row| {
                let mut best = 0;
                for (k, &v) in row.iter().enumerate() {
                    if v < row[best] {
                        best = k;
                    }
                }
                best
            })
            .collect();
        (self.gather(&indices), indices)
    }

    /// VQ loss terms of `z` against the codewords at `indices`.
    pub fn vq_loss(&self, z: &[f32], indices: &[usize]) -> VqLoss {
        let batch = indices.len();
        let sq: f32 = z
            .chunks_exact(self.dim)
            .zip(indices)
            .map(|(row, &k)| ops::squared_distance(row, self.codeword(k)))
            .sum();
        let mean = sq / batch.max(1) as f32;
        // Stop-gradient only changes which side receives gradient.
        VqLoss {
            codebook: mean,
            commitment: mean,
        }
    }

    /// Backward through one VQ step.
    ///
    /// `d_loss` scales the step loss `codebook + beta * commitment`; `d_token`
    /// is the upstream gradient of the quantized token, copied straight
    /// through to the pre-quantization vector.
    pub fn vq_backward(
        &self,
        z: &[f32],
        indices: &[usize],
        beta: f32,
        d_loss: f32,
        d_token: Option<&[f32]>,
    ) -> VqGrads {
        let batch = indices.len();
        let scale = 2.0 * d_loss / batch.max(1) as f32;
        let mut d_pre_quant = match d_token {
            Some(g) => straight_through(g),
            None => vec![0.0f32; z.len()],
        };
        let mut d_codebook = vec![0.0f32; self.weight.len()];
        for (b, &k) in indices.iter().enumerate() {
            let e = self.codeword(k);
            for j in 0..self.dim {
                let diff = z[b * self.dim + j] - e[j];
                d_pre_quant[b * self.dim + j] += beta * scale * diff;
                d_codebook[k * self.dim + j] -= scale * diff;
            }
        }
        VqGrads {
            d_pre_quant,
            d_codebook,
        }
    }
}

/// Gradients of the step VQ loss `codebook + beta * commitment` w.r.t. the
/// pre-quantization batch and the codebook.
pub fn vq_loss_backward(z: &[f32], codebook: &Codebook, indices: &[usize], beta: f32) -> VqGrads {
    codebook.vq_backward(z, indices, beta, 1.0, None)
}

/// Straight-through estimator: the quantized token's gradient flows to the
/// pre-quantization vector unchanged.
pub fn straight_through(grad: &[f32]) -> Vec<f32> {
    grad.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn codebook() -> Codebook {
        Codebook {
            weight: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            num_codewords: 3,
            dim: 2,
        }
    }

    #[test]
    fn test_one_hot_and_decode() {
        let t = to_one_hot(&[2, 0], 3);
        assert_eq!(t, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        assert_eq!(argmax_decode(&t, 3), vec![2, 0]);
    }

    #[test]
    fn test_hard_max() {
        let (t, idx) = hard_max(&[0.1, 0.7, 0.2, 0.5, 0.25, 0.25], 3);
        assert_eq!(idx, vec![1, 0]);
        assert_eq!(t, vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_sample_categorical_point_mass() {
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..100 {
            assert_eq!(sample_categorical(&[0.0, 0.0, 1.0, 0.0], &mut rng), 2);
        }
    }

    #[test]
    fn test_sample_categorical_frequencies() {
        let mut rng = StdRng::seed_from_u64(1);
        let probs = [0.2, 0.8];
        let n = 10_000;
        let ones = (0..n).filter(|_| sample_categorical(&probs, &mut rng) == 1).count();
        let freq = ones as f32 / n as f32;
        assert!((freq - 0.8).abs() < 0.03, "freq = {}", freq);
    }

    #[test]
    fn test_gumbel_hard_is_one_hot() {
        let mut rng = StdRng::seed_from_u64(2);
        let probs = [0.1, 0.2, 0.7, 0.5, 0.5, 0.0];
        let t = gumbel_softmax(&probs, 3, 1.2, true, &mut rng);
        for row in t.chunks(3) {
            assert_eq!(row.iter().sum::<f32>(), 1.0);
            assert!(row.iter().all(|&v| v == 0.0 || v == 1.0));
        }
        // zero-probability entries are never selected
        assert_eq!(t[5], 0.0);
    }

    #[test]
    fn test_gumbel_soft_sums_to_one() {
        let mut rng = StdRng::seed_from_u64(3);
        let t = gumbel_softmax(&[0.25; 4], 4, 0.5, false, &mut rng);
        assert!((t.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(t.iter().all(|&v| v > 0.0 && v < 1.0));
    }

    #[test]
    fn test_entropy() {
        let uniform = [(0.25f32).ln(); 4];
        let h = categorical_entropy(&uniform, 4);
        assert!((h[0] - 4.0f32.ln()).abs() < 1e-5);
        let point = [0.0, f32::NEG_INFINITY, f32::NEG_INFINITY];
        assert_eq!(categorical_entropy(&point, 3), vec![0.0]);
    }

    #[test]
    fn test_distances_and_quantize() {
        let cb = codebook();
        let z = [0.9, 0.2, 0.1, 0.1];
        let d = cb.distances(&z, 2);
        assert!((d[0] - 0.85).abs() < 1e-6);
        assert!((d[1] - 0.05).abs() < 1e-6);
        let (q, idx) = cb.quantize(&z, 2);
        assert_eq!(idx, vec![1, 0]);
        assert_eq!(q, vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_vq_loss_terms() {
        let cb = codebook();
        let z = [1.0, 1.0, 0.0, 3.0];
        let loss = cb.vq_loss(&z, &[1, 2]);
        // ||(0,1)||² = 1, ||(0,2)||² = 4 → mean 2.5
        assert!((loss.codebook - 2.5).abs() < 1e-6);
        assert_eq!(loss.codebook, loss.commitment);
        assert!((loss.total(0.25) - 3.125).abs() < 1e-6);
    }

    #[test]
    fn test_vq_backward_matches_finite_difference() {
        let cb = codebook();
        let z = vec![0.8, 0.3];
        let idx = [1];
        let beta = 0.25;
        let grads = cb.vq_backward(&z, &idx, beta, 1.0, None);
        // d/dz of beta * ||z - e||²
        let eps = 1e-3;
        for j in 0..2 {
            let mut zp = z.clone();
            zp[j] += eps;
            let mut zm = z.clone();
            zm[j] -= eps;
            let fd = beta * (cb.vq_loss(&zp, &idx).commitment - cb.vq_loss(&zm, &idx).commitment)
                / (2.0 * eps);
            assert!((grads.d_pre_quant[j] - fd).abs() < 1e-2);
        }
        // codebook row 1 receives 2 (e - z), other rows nothing
        assert!((grads.d_codebook[2] - 2.0 * (1.0 - 0.8)).abs() < 1e-6);
        assert!((grads.d_codebook[3] - 2.0 * (0.0 - 0.3)).abs() < 1e-6);
        assert!(grads.d_codebook[..2].iter().chain(&grads.d_codebook[4..]).all(|&g| g == 0.0));
    }

    #[test]
    fn test_straight_through_token_gradient() {
        let cb = codebook();
        let grads = cb.vq_backward(&[1.0, 0.0], &[1], 0.25, 0.0, Some(&[0.5, -0.5]));
        assert_eq!(grads.d_pre_quant, vec![0.5, -0.5]);
    }

    #[test]
    fn test_token_gradient_adds_to_commitment_gradient() {
        let cb = codebook();
        let grads = cb.vq_backward(&[0.8, 0.3], &[1], 0.25, 1.0, Some(&[0.5, -0.5]));
        assert!((grads.d_pre_quant[0] - 0.4).abs() < 1e-6);
        assert!((grads.d_pre_quant[1] + 0.35).abs() < 1e-6);
    }

    #[test]
    fn test_free_backward_matches_method() {
        let cb = codebook();
        let z = [0.8, 0.3, 0.1, 0.9];
        let idx = [1, 2];
        let a = vq_loss_backward(&z, &cb, &idx, 0.5);
        let b = cb.vq_backward(&z, &idx, 0.5, 1.0, None);
        assert_eq!(a.d_pre_quant, b.d_pre_quant);
        assert_eq!(a.d_codebook, b.d_codebook);
        assert_eq!(straight_through(&[1.0, -2.0]), vec![1.0, -2.0]);
    }
}
