//! Projection layers and the token embedding table.

use rand::Rng;

use sygnal_core::ops;

use crate::init;

/// Linear projection layer. Weight layout `(out_dim, in_dim)`.
#[derive(Clone, Debug)]
pub struct Linear {
    pub weight: Vec<f32>,
    pub bias: Vec<f32>,
    pub in_dim: usize,
    pub out_dim: usize,
}

impl Linear {
    /// `nn.Linear`-style uniform initialization.
    pub fn new<R: Rng + ?Sized>(in_dim: usize, out_dim: usize, rng: &mut R) -> Self {
        let (weight, bias) = init::linear_default(rng, out_dim, in_dim);
        Self {
            weight,
            bias,
            in_dim,
            out_dim,
        }
    }

    /// Zero weight and bias: every input maps to the zero vector.
    pub fn reset_to_zero(&mut self) {
        self.weight.fill(0.0);
        self.bias.fill(0.0);
    }

    /// `x: (n, in_dim)` → `(n, out_dim)`.
    pub fn forward(&self, x: &[f32], n: usize) -> Vec<f32> {
        ops::linear(x, &self.weight, Some(&self.bias), n, self.in_dim, self.out_dim)
    }

    pub fn param_count(&self) -> usize {
        self.weight.len() + self.bias.len()
    }
}

/// Maps the encoded input into the recurrent hidden space.
#[derive(Clone, Debug)]
pub enum InputProjector {
    /// `input_size == hidden_size`: pass through unchanged.
    Identity,
    Linear(Linear),
}

impl InputProjector {
    pub fn new<R: Rng + ?Sized>(input_size: usize, hidden_size: usize, rng: &mut R) -> Self {
        if input_size == hidden_size {
            InputProjector::Identity
        } else {
            InputProjector::Linear(Linear::new(input_size, hidden_size, rng))
        }
    }

    pub fn forward(&self, x: &[f32], n: usize) -> Vec<f32> {
        match self {
            InputProjector::Identity => x.to_vec(),
            InputProjector::Linear(l) => l.forward(x, n),
        }
    }
}

/// Token embedding table `(vocab_size, embedding_size)`.
///
/// Lookup is a matrix product, so one-hot symbols and continuous codewords
/// go through the same path.
#[derive(Clone, Debug)]
pub struct Embedding {
    pub weight: Vec<f32>,
    pub vocab_size: usize,
    pub embedding_size: usize,
}

impl Embedding {
    pub fn zeros(vocab_size: usize, embedding_size: usize) -> Self {
        Self {
            weight: vec![0.0; vocab_size * embedding_size],
            vocab_size,
            embedding_size,
        }
    }

    /// `tokens: (batch, vocab_size)` → `(batch, embedding_size)`.
    pub fn forward(&self, tokens: &[f32], batch: usize) -> Vec<f32> {
        ops::matmul(tokens, &self.weight, batch, self.vocab_size, self.embedding_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_linear_shape_and_bound() {
        let mut rng = StdRng::seed_from_u64(0);
        let l = Linear::new(16, 4, &mut rng);
        assert_eq!(l.param_count(), 16 * 4 + 4);
        assert!(l.weight.iter().all(|w| w.abs() <= 0.25));
        let out = l.forward(&vec![1.0; 2 * 16], 2);
        assert_eq!(out.len(), 8);
        assert_eq!(&out[..4], &out[4..]);
    }

    #[test]
    fn test_zeroed_linear() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut l = Linear::new(3, 5, &mut rng);
        l.reset_to_zero();
        assert_eq!(l.forward(&[1.0, -2.0, 3.0], 1), vec![0.0; 5]);
    }

    #[test]
    fn test_input_projector_identity() {
        let mut rng = StdRng::seed_from_u64(0);
        let p = InputProjector::new(4, 4, &mut rng);
        assert!(matches!(p, InputProjector::Identity));
        assert_eq!(p.forward(&[1.0, 2.0, 3.0, 4.0], 1), vec![1.0, 2.0, 3.0, 4.0]);
        let q = InputProjector::new(4, 6, &mut rng);
        assert_eq!(q.forward(&[1.0; 8], 2).len(), 12);
    }

    #[test]
    fn test_embedding_continuous_token() {
        let mut emb = Embedding::zeros(2, 3);
        emb.weight = vec![1.0, 0.0, 2.0, 0.0, 1.0, -1.0];
        // 0.5 * row0 + 2 * row1
        assert_eq!(emb.forward(&[0.5, 2.0], 1), vec![0.5, 2.0, -1.0]);
    }
}
