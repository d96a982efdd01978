//! Discretization strategies: hidden projection → next token representation.
//!
//! Exactly one strategy is active per sender, chosen at construction from the
//! configuration flags. The loop only ever sees a `(batch, vocab_size)` token
//! matrix, discrete or continuous.

use rand::Rng;

use sygnal_core::ops;

use crate::config::SenderConfig;
use crate::quantize::{self, Codebook};

/// Where the policy logits of the RL strategy come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogitSource {
    /// Output projector logits over the vocabulary.
    Linear,
    /// Negative squared distances to the codewords.
    CodebookDistances,
}

/// The closed set of discretization strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StrategyKind {
    /// Gumbel-softmax relaxation in training, exact one-hot in evaluation.
    RelaxedCategorical,
    /// Nearest codeword, communicated as the codeword itself.
    VqContinuous,
    /// Codeword index via softmin over distances, communicated one-hot.
    VqDiscrete { relaxed: bool },
    /// Categorical policy with entropy and log-probability outputs.
    Reinforce { logits: LogitSource },
}

impl StrategyKind {
    pub fn uses_codebook(&self) -> bool {
        matches!(
            self,
            StrategyKind::VqContinuous
                | StrategyKind::VqDiscrete { .. }
                | StrategyKind::Reinforce { logits: LogitSource::CodebookDistances }
        )
    }

    /// Whether tokens are symbols with meaningful start/end ids.
    pub fn has_symbols(&self) -> bool {
        !matches!(self, StrategyKind::VqContinuous)
    }
}

/// Per-call sampling mode.
#[derive(Clone, Copy, Debug)]
pub struct Sampling {
    pub training: bool,
    pub greedy: bool,
    pub tau: f32,
}

/// Output of one discretization step. Auxiliaries are `None` when the
/// strategy does not produce them.
#[derive(Clone, Debug, Default)]
pub struct StepOutput {
    /// `(batch, vocab_size)`
    pub token: Vec<f32>,
    /// Softmax probabilities to accumulate as a diagnostic, `(batch, vocab_size)`.
    pub probs: Option<Vec<f32>>,
    /// `codebook + beta * commitment` for this step.
    pub vq_loss: Option<f32>,
    /// `(batch,)`
    pub entropy: Option<Vec<f32>>,
    /// Log-probability of the chosen index, `(batch,)`.
    pub log_prob: Option<Vec<f32>>,
}

/// The active strategy together with the parameters it owns.
#[derive(Clone, Debug)]
pub enum Discretizer {
    RelaxedCategorical,
    VqContinuous { codebook: Codebook, beta: f32 },
    VqDiscrete { codebook: Codebook, beta: f32, relaxed: bool },
    Reinforce { codebook: Option<Codebook> },
}

impl Discretizer {
    /// Build the strategy with a zeroed codebook where one is needed.
    pub fn new(kind: StrategyKind, config: &SenderConfig) -> Self {
        let codebook = || Codebook::zeros(config.num_codewords, config.codeword_dim);
        match kind {
            StrategyKind::RelaxedCategorical => Discretizer::RelaxedCategorical,
            StrategyKind::VqContinuous => Discretizer::VqContinuous {
                codebook: codebook(),
                beta: config.beta,
            },
            StrategyKind::VqDiscrete { relaxed } => Discretizer::VqDiscrete {
                codebook: codebook(),
                beta: config.beta,
                relaxed,
            },
            StrategyKind::Reinforce { logits } => Discretizer::Reinforce {
                codebook: (logits == LogitSource::CodebookDistances).then(codebook),
            },
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Discretizer::RelaxedCategorical => StrategyKind::RelaxedCategorical,
            Discretizer::VqContinuous { .. } => StrategyKind::VqContinuous,
            Discretizer::VqDiscrete { relaxed, .. } => StrategyKind::VqDiscrete { relaxed: *relaxed },
            Discretizer::Reinforce { codebook: None } => {
                StrategyKind::Reinforce { logits: LogitSource::Linear }
            }
            Discretizer::Reinforce { codebook: Some(_) } => {
                StrategyKind::Reinforce { logits: LogitSource::CodebookDistances }
            }
        }
    }

    pub fn codebook(&self) -> Option<&Codebook> {
        match self {
            Discretizer::RelaxedCategorical => None,
            Discretizer::VqContinuous { codebook, .. } | Discretizer::VqDiscrete { codebook, .. } => {
                Some(codebook)
            }
            Discretizer::Reinforce { codebook } => codebook.as_ref(),
        }
    }

    pub fn codebook_mut(&mut self) -> Option<&mut Codebook> {
        match self {
            Discretizer::RelaxedCategorical => None,
            Discretizer::VqContinuous { codebook, .. } | Discretizer::VqDiscrete { codebook, .. } => {
                Some(codebook)
            }
            Discretizer::Reinforce { codebook } => codebook.as_mut(),
        }
    }

    /// Turn the output projection `(batch, output_dim)` into the next token.
    pub fn next_token<R: Rng + ?Sized>(
        &self,
        projected: &[f32],
        batch: usize,
        vocab_size: usize,
        sampling: &Sampling,
        rng: &mut R,
    ) -> StepOutput {
        match self {
            Discretizer::RelaxedCategorical => {
                let p = ops::softmax_rows(projected, vocab_size);
                let token = relaxed_token(&p, vocab_size, sampling, rng);
                StepOutput {
                    token,
                    probs: (!sampling.training).then_some(p),
                    ..Default::default()
                }
            }
            Discretizer::VqContinuous { codebook, beta } => {
                let (token, indices) = codebook.quantize(projected, batch);
                StepOutput {
                    token,
                    vq_loss: Some(codebook.vq_loss(projected, &indices).total(*beta)),
                    ..Default::default()
                }
            }
            Discretizer::VqDiscrete { codebook, beta, relaxed } => {
                let k = codebook.num_codewords;
                let neg: Vec<f32> = codebook.distances(projected, batch).iter().map(|d| -d).collect();
                let softmin = ops::softmax_rows(&neg, k);
                let (token, indices) = if *relaxed {
                    let token = relaxed_token(&softmin, k, sampling, rng);
                    let indices = quantize::argmax_decode(&token, k);
                    (token, indices)
                } else {
                    quantize::hard_max(&softmin, k)
                };
                StepOutput {
                    token,
                    vq_loss: Some(codebook.vq_loss(projected, &indices).total(*beta)),
                    ..Default::default()
                }
            }
            Discretizer::Reinforce { codebook } => {
                let scaled: Vec<f32> = match codebook {
                    None => projected.iter().map(|v| v / sampling.tau).collect(),
                    Some(cb) => cb
                        .distances(projected, batch)
                        .iter()
                        .map(|d| -d / sampling.tau)
                        .collect(),
                };
                let log_probs = ops::log_softmax_rows(&scaled, vocab_size);
                let entropy = quantize::categorical_entropy(&log_probs, vocab_size);
                let indices = if sampling.training {
                    let probs: Vec<f32> = log_probs.iter().map(|lp| lp.exp()).collect();
                    quantize::sample_rows(&probs, vocab_size, rng)
                } else {
                    quantize::argmax_decode(&log_probs, vocab_size)
                };
                let log_prob = indices
                    .iter()
                    .enumerate()
                    .map(|(b, &idx)| log_probs[b * vocab_size + idx])
                    .collect();
                StepOutput {
                    token: quantize::to_one_hot(&indices, vocab_size),
                    entropy: Some(entropy),
                    log_prob: Some(log_prob),
                    ..Default::default()
                }
            }
        }
    }
}

/// Gumbel-softmax in training; greedy or sampled exact one-hot in evaluation.
fn relaxed_token<R: Rng + ?Sized>(
    probs: &[f32],
    n_dims: usize,
    sampling: &Sampling,
    rng: &mut R,
) -> Vec<f32> {
    if sampling.training {
        return quantize::gumbel_softmax(probs, n_dims, sampling.tau, true, rng);
    }
    let indices = if sampling.greedy {
        quantize::argmax_decode(probs, n_dims)
    } else {
        quantize::sample_rows(probs, n_dims, rng)
    };
    quantize::to_one_hot(&indices, n_dims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const EVAL_GREEDY: Sampling = Sampling { training: false, greedy: true, tau: 1.0 };
    const TRAIN: Sampling = Sampling { training: true, greedy: false, tau: 1.0 };

    fn unit_codebook() -> Codebook {
        // three codewords in 2-D
        Codebook {
            weight: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            num_codewords: 3,
            dim: 2,
        }
    }

    #[test]
    fn test_kind_roundtrip() {
        let config = SenderConfig::vqvae_discrete(4, 3, 2, 0);
        for kind in [
            StrategyKind::RelaxedCategorical,
            StrategyKind::VqContinuous,
            StrategyKind::VqDiscrete { relaxed: true },
            StrategyKind::Reinforce { logits: LogitSource::Linear },
            StrategyKind::Reinforce { logits: LogitSource::CodebookDistances },
        ] {
            let d = Discretizer::new(kind, &config);
            assert_eq!(d.kind(), kind);
            assert_eq!(d.codebook().is_some(), kind.uses_codebook());
            assert_eq!(kind.has_symbols(), kind != StrategyKind::VqContinuous);
        }
    }

    #[test]
    fn test_relaxed_eval_greedy_records_probs() {
        let mut rng = StdRng::seed_from_u64(0);
        let out = Discretizer::RelaxedCategorical.next_token(
            &[0.0, 3.0, 1.0],
            1,
            3,
            &EVAL_GREEDY,
            &mut rng,
        );
        assert_eq!(out.token, vec![0.0, 1.0, 0.0]);
        let p = out.probs.unwrap();
        assert!((p.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        assert!(out.vq_loss.is_none() && out.entropy.is_none() && out.log_prob.is_none());
    }

    #[test]
    fn test_relaxed_train_has_no_probs() {
        let mut rng = StdRng::seed_from_u64(1);
        let out = Discretizer::RelaxedCategorical.next_token(&[0.5; 8], 2, 4, &TRAIN, &mut rng);
        assert!(out.probs.is_none());
        for row in out.token.chunks(4) {
            assert_eq!(row.iter().sum::<f32>(), 1.0);
        }
    }

    #[test]
    fn test_vq_continuous_returns_codeword() {
        let mut rng = StdRng::seed_from_u64(2);
        let d = Discretizer::VqContinuous { codebook: unit_codebook(), beta: 0.25 };
        let out = d.next_token(&[0.1, 0.8], 1, 2, &TRAIN, &mut rng);
        assert_eq!(out.token, vec![0.0, 1.0]);
        // ||(0.1, -0.2)||² = 0.05, times (1 + beta)
        assert!((out.vq_loss.unwrap() - 0.0625).abs() < 1e-6);
    }

    #[test]
    fn test_vq_discrete_hard_assignment() {
        let mut rng = StdRng::seed_from_u64(3);
        let d = Discretizer::VqDiscrete { codebook: unit_codebook(), beta: 0.25, relaxed: false };
        let out = d.next_token(&[0.9, 0.1, 0.0, 0.2], 2, 3, &TRAIN, &mut rng);
        assert_eq!(out.token, vec![0.0, 1.0, 0.0, 1.0, 0.0, 0.0]);
        // (0.01 + 0.01 + 0.04) / 2 = 0.03
        assert!((out.vq_loss.unwrap() - 0.03 * 1.25).abs() < 1e-6);
    }

    #[test]
    fn test_vq_discrete_relaxed_loss_uses_token_index() {
        let mut rng = StdRng::seed_from_u64(4);
        let cb = unit_codebook();
        let d = Discretizer::VqDiscrete { codebook: cb.clone(), beta: 0.0, relaxed: true };
        let z = [0.5, 0.5];
        let out = d.next_token(&z, 1, 3, &TRAIN, &mut rng);
        let idx = quantize::argmax_decode(&out.token, 3);
        assert_eq!(out.vq_loss.unwrap(), cb.vq_loss(&z, &idx).codebook);
    }

    #[test]
    fn test_reinforce_outputs() {
        let mut rng = StdRng::seed_from_u64(5);
        let d = Discretizer::Reinforce { codebook: None };
        let out = d.next_token(&[0.0, 0.0, 0.0, 0.0], 1, 4, &EVAL_GREEDY, &mut rng);
        assert_eq!(out.token, vec![1.0, 0.0, 0.0, 0.0]);
        assert!((out.entropy.unwrap()[0] - 4.0f32.ln()).abs() < 1e-5);
        assert!((out.log_prob.unwrap()[0] - 0.25f32.ln()).abs() < 1e-5);
        assert!(out.vq_loss.is_none());
        assert!(out.probs.is_none());
    }

    #[test]
    fn test_reinforce_codebook_logits_prefer_nearest() {
        let mut rng = StdRng::seed_from_u64(6);
        let d = Discretizer::Reinforce { codebook: Some(unit_codebook()) };
        let out = d.next_token(&[0.05, 0.95], 1, 3, &EVAL_GREEDY, &mut rng);
        assert_eq!(out.token, vec![0.0, 0.0, 1.0]);
        assert!(out.log_prob.unwrap()[0] < 0.0);
    }
}
