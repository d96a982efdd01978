//! Collects per-step outputs into the batch-major sender result.

use sygnal_core::{ops, Result, Tensor};

use crate::strategy::StepOutput;

/// Everything one decode call produces.
#[derive(Debug, Clone)]
pub struct SenderOutput {
    /// `[batch, max_len + 1, vocab_size]`, position 0 is the start token.
    pub messages: Tensor,
    /// Start token plus every token up to and including the first EOS,
    /// or `max_len + 1` when no EOS was emitted.
    pub sequence_lengths: Vec<usize>,
    /// `[batch, max_len]`, RL only.
    pub entropy: Option<Tensor>,
    /// Recurrent inputs, `[batch, max_len, embedding_size]`.
    pub embeddings: Tensor,
    /// Summed evaluation-mode softmax, `[batch, vocab_size]`.
    pub probability_diagnostic: Option<Tensor>,
    /// Mean VQ loss over steps, `0.0` outside VQ modes.
    pub vq_loss: f32,
    /// `[batch, max_len]`, RL only.
    pub log_probs: Option<Tensor>,
}

impl SenderOutput {
    pub fn batch_size(&self) -> usize {
        self.messages.dims()[0]
    }

    /// Arg-max symbol at every message position, `[batch][max_len + 1]`.
    pub fn token_ids(&self) -> Result<Vec<Vec<usize>>> {
        let dims = self.messages.dims();
        let (positions, vocab) = (dims[1], dims[2]);
        let ids: Vec<usize> = ops::argmax_rows(self.messages.f32_data()?, vocab)
            .into_iter()
            .map(|(idx, _)| idx)
            .collect();
        Ok(ids.chunks(positions).map(<[usize]>::to_vec).collect())
    }
}

/// Step-major buffers for one decode call.
pub(crate) struct MessageAssembler {
    batch: usize,
    vocab_size: usize,
    embedding_size: usize,
    tokens: Vec<Vec<f32>>,
    embeddings: Vec<Vec<f32>>,
    entropy: Vec<Vec<f32>>,
    log_probs: Vec<Vec<f32>>,
    diagnostic: Option<Vec<f32>>,
    vq_losses: Vec<f32>,
}

impl MessageAssembler {
    pub(crate) fn new(batch: usize, vocab_size: usize, embedding_size: usize, start: Vec<f32>) -> Self {
        Self {
            batch,
            vocab_size,
            embedding_size,
            tokens: vec![start],
            embeddings: Vec::new(),
            entropy: Vec::new(),
            log_probs: Vec::new(),
            diagnostic: None,
            vq_losses: Vec::new(),
        }
    }

    /// The most recent token, `(batch, vocab_size)`.
    pub(crate) fn last_token(&self) -> &[f32] {
        self.tokens.last().map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn push_step(&mut self, embedded: Vec<f32>, step: StepOutput) {
        self.embeddings.push(embedded);
        if let Some(p) = step.probs {
            match self.diagnostic.as_mut() {
                Some(acc) => acc.iter_mut().zip(&p).for_each(|(a, v)| *a += v),
                None => self.diagnostic = Some(p),
            }
        }
        if let Some(l) = step.vq_loss {
            self.vq_losses.push(l);
        }
        if let Some(h) = step.entropy {
            self.entropy.push(h);
        }
        if let Some(lp) = step.log_prob {
            self.log_probs.push(lp);
        }
        self.tokens.push(step.token);
    }

    pub(crate) fn finish(self, sequence_lengths: Vec<usize>) -> Result<SenderOutput> {
        let b = self.batch;
        let steps = self.embeddings.len();
        let messages = Tensor::from_vec(
            batch_major(&self.tokens, b, self.vocab_size),
            &[b, self.tokens.len(), self.vocab_size],
        )?;
        let embeddings = Tensor::from_vec(
            batch_major(&self.embeddings, b, self.embedding_size),
            &[b, steps, self.embedding_size],
        )?;
        let per_step = |v: &[Vec<f32>]| -> Result<Option<Tensor>> {
            if v.is_empty() {
                return Ok(None);
            }
            Tensor::from_vec(batch_major(v, b, 1), &[b, v.len()]).map(Some)
        };
        let entropy = per_step(&self.entropy)?;
        let log_probs = per_step(&self.log_probs)?;
        let probability_diagnostic = self
            .diagnostic
            .map(|d| Tensor::from_vec(d, &[b, self.vocab_size]))
            .transpose()?;
        let vq_loss = if self.vq_losses.is_empty() {
            0.0
        } else {
            self.vq_losses.iter().sum::<f32>() / self.vq_losses.len() as f32
        };
        Ok(SenderOutput {
            messages,
            sequence_lengths,
            entropy,
            embeddings,
            probability_diagnostic,
            vq_loss,
            log_probs,
        })
    }
}

/// `steps[t]: (batch, width)` → flat `(batch, steps, width)`.
fn batch_major(steps: &[Vec<f32>], batch: usize, width: usize) -> Vec<f32> {
    let mut out = Vec::with_capacity(batch * steps.len() * width);
    for b in 0..batch {
        for step in steps {
            out.extend_from_slice(&step[b * width..(b + 1) * width]);
        }
    }
    out
}
