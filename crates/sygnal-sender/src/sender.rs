//! The sender: a recurrent decoder that turns an encoded input into a message.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use tracing::{debug, info};

use sygnal_core::{Module, Result, SygnalError, Tensor};

use crate::cell::{build_cell, CellKind, RecurrentCell};
use crate::config::SenderConfig;
use crate::error::{ConfigError, SenderError};
use crate::init;
use crate::linear::{Embedding, InputProjector, Linear};
use crate::message::{MessageAssembler, SenderOutput};
use crate::quantize::{self, Codebook};
use crate::seq_len::SequenceLengthTracker;
use crate::strategy::{Discretizer, Sampling, StrategyKind};

/// Recurrent message generator.
///
/// Each call to [`Sender::decode`] runs exactly `max_len` steps. Every step
/// embeds the previous token, advances the recurrent cell, projects the hidden
/// state and hands it to the configured [`Discretizer`].
pub struct Sender {
    config: SenderConfig,
    /// `(vocab_size, embedding_size)`
    pub embedding: Embedding,
    input_module: InputProjector,
    cell: Box<dyn RecurrentCell>,
    /// `hidden_size → vocab_size`, or `→ codeword_dim` in VQ modes.
    pub linear_out: Linear,
    discretizer: Discretizer,
    training: bool,
}

impl Sender {
    /// Validate `config` and build the sender.
    ///
    /// With `reset_params` the embedding and codebook are drawn from
    /// `N(0, 0.1)`; otherwise they start at zero.
    pub fn new(config: SenderConfig) -> std::result::Result<Self, ConfigError> {
        let kind = config.validate()?;
        let cell_kind = config.cell_kind()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let embedding = Embedding::zeros(config.vocab_size, config.embedding_size);
        let input_module = InputProjector::new(config.input_size, config.hidden_size, &mut rng);
        let cell = build_cell(cell_kind, config.embedding_size, config.hidden_size, &mut rng);
        let linear_out = Linear::new(config.hidden_size, config.output_dim(), &mut rng);
        let discretizer = Discretizer::new(kind, &config);

        let mut sender = Self {
            config,
            embedding,
            input_module,
            cell,
            linear_out,
            discretizer,
            training: true,
        };
        if sender.config.reset_params {
            sender.reset_parameters(&mut rng);
        }

        info!(
            strategy = ?kind,
            cell = %cell_kind,
            vocab_size = sender.config.vocab_size,
            max_len = sender.config.max_len,
            codebook = ?sender.codebook().map(|cb| (cb.num_codewords, cb.dim)),
            params = sender.param_count(),
            "sender initialized"
        );
        Ok(sender)
    }

    /// Re-draw the parameters covered by the initialization policy.
    pub fn reset_parameters(&mut self, rng: &mut dyn RngCore) {
        self.embedding.weight = init::normal(rng, self.embedding.weight.len(), 0.0, 0.1);
        if self.strategy() == StrategyKind::RelaxedCategorical {
            self.linear_out.reset_to_zero();
        }
        if let Some(cb) = self.discretizer.codebook_mut() {
            cb.weight = init::normal(rng, cb.weight.len(), 0.0, 0.1);
        }
        self.cell.reset_parameters(rng);
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    pub fn strategy(&self) -> StrategyKind {
        self.discretizer.kind()
    }

    pub fn cell_kind(&self) -> CellKind {
        self.cell.kind()
    }

    /// Codebook `(num_codewords, codeword_dim)` in VQ modes.
    pub fn codebook(&self) -> Option<&Codebook> {
        self.discretizer.codebook()
    }

    pub fn codebook_mut(&mut self) -> Option<&mut Codebook> {
        self.discretizer.codebook_mut()
    }

    /// Decode with the thread-local RNG.
    pub fn decode(&self, input: Option<&Tensor>) -> Result<SenderOutput> {
        self.decode_with_rng(input, &mut rand::thread_rng())
    }

    /// Decode a batch of messages.
    ///
    /// `input` is `[batch, input_size]`; without it a single message is
    /// decoded from a zero hidden state.
    pub fn decode_with_rng<R: Rng + ?Sized>(
        &self,
        input: Option<&Tensor>,
        rng: &mut R,
    ) -> Result<SenderOutput> {
        let cfg = &self.config;
        let (batch, h0) = match input {
            None => (1, vec![0.0f32; cfg.hidden_size]),
            Some(x) => {
                let (batch, width) = x.shape().as_matrix()?;
                if width != cfg.input_size {
                    return Err(SygnalError::ShapeMismatch {
                        expected: vec![batch, cfg.input_size],
                        got: x.dims().to_vec(),
                    });
                }
                (batch, self.input_module.forward(&x.to_f32_vec()?, batch))
            }
        };

        let vocab = cfg.vocab_size;
        let symbolic = self.strategy().has_symbols();
        let start = if symbolic {
            quantize::to_one_hot(&vec![cfg.sos_id; batch], vocab)
        } else {
            vec![0.0f32; batch * vocab]
        };
        let mut tracker =
            symbolic.then(|| SequenceLengthTracker::new(batch, cfg.max_len, cfg.eos_id()));
        let mut assembler = MessageAssembler::new(batch, vocab, cfg.embedding_size, start);
        let sampling = Sampling {
            training: self.training,
            greedy: cfg.greedy,
            tau: cfg.tau,
        };

        let mut state = self.cell.init_state(h0);
        for i in 0..cfg.max_len {
            let embedded = self.embedding.forward(assembler.last_token(), batch);
            state = self.cell.step(&embedded, &state, batch);
            let projected = self.linear_out.forward(&state.h, batch);
            let step = self
                .discretizer
                .next_token(&projected, batch, vocab, &sampling, rng);
            if let Some(t) = tracker.as_mut() {
                t.update(&step.token, vocab, i + 1);
            }
            assembler.push_step(embedded, step);
        }

        let lengths = match tracker {
            Some(t) => t.into_lengths(),
            None => vec![cfg.max_len + 1; batch],
        };
        let out = assembler.finish(lengths)?;
        debug!(
            batch,
            training = self.training,
            lengths = ?out.sequence_lengths,
            vq_loss = out.vq_loss,
            "decoded messages"
        );
        Ok(out)
    }

    /// Overwrite one named parameter (see [`Module::named_parameters`]).
    pub fn set_parameter(&mut self, name: &str, values: &[f32]) -> std::result::Result<(), SenderError> {
        let slot = self
            .parameters_mut()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| SenderError::UnknownParameter(name.to_string()))?;
        if slot.len() != values.len() {
            return Err(SygnalError::ElementCount {
                expected: slot.len(),
                got: values.len(),
                shape: vec![slot.len()],
            }
            .into());
        }
        slot.copy_from_slice(values);
        Ok(())
    }

    fn parameters_mut(&mut self) -> Vec<(String, &mut Vec<f32>)> {
        let mut out = vec![("embedding".to_string(), &mut self.embedding.weight)];
        if let InputProjector::Linear(l) = &mut self.input_module {
            out.push(("input_module.weight".to_string(), &mut l.weight));
            out.push(("input_module.bias".to_string(), &mut l.bias));
        }
        for (n, v) in self.cell.parameters_mut() {
            out.push((format!("rnn.{n}"), v));
        }
        out.push(("linear_out.weight".to_string(), &mut self.linear_out.weight));
        out.push(("linear_out.bias".to_string(), &mut self.linear_out.bias));
        if let Some(cb) = self.discretizer.codebook_mut() {
            out.push(("e".to_string(), &mut cb.weight));
        }
        out
    }
}

impl Module for Sender {
    /// Messages `[batch, max_len + 1, vocab_size]` for `input: [batch, input_size]`.
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        self.decode(Some(input)).map(|out| out.messages)
    }

    fn named_parameters(&self) -> Vec<(String, Tensor)> {
        let cfg = &self.config;
        let mut params = vec![(
            "embedding".to_string(),
            Tensor::from_f32(&self.embedding.weight, &[cfg.vocab_size, cfg.embedding_size]),
        )];
        if let InputProjector::Linear(l) = &self.input_module {
            params.push((
                "input_module.weight".to_string(),
                Tensor::from_f32(&l.weight, &[l.out_dim, l.in_dim]),
            ));
            params.push((
                "input_module.bias".to_string(),
                Tensor::from_f32(&l.bias, &[l.out_dim]),
            ));
        }
        for (n, t) in self.cell.named_parameters() {
            params.push((format!("rnn.{n}"), t));
        }
        let lo = &self.linear_out;
        params.push((
            "linear_out.weight".to_string(),
            Tensor::from_f32(&lo.weight, &[lo.out_dim, lo.in_dim]),
        ));
        params.push((
            "linear_out.bias".to_string(),
            Tensor::from_f32(&lo.bias, &[lo.out_dim]),
        ));
        if let Some(cb) = self.codebook() {
            params.push((
                "e".to_string(),
                Tensor::from_f32(&cb.weight, &[cb.num_codewords, cb.dim]),
            ));
        }
        params
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_sender_decodes() {
        let mut sender = Sender::new(SenderConfig::tiny()).unwrap();
        sender.eval();
        let x = Tensor::from_f32(&[0.1; 16], &[2, 8]);
        let out = sender.decode(Some(&x)).unwrap();
        assert_eq!(out.messages.dims(), &[2, 4, 5]);
        assert_eq!(out.embeddings.dims(), &[2, 3, 6]);
        assert_eq!(out.probability_diagnostic.unwrap().dims(), &[2, 5]);
    }

    #[test]
    fn test_reset_policy() {
        let sender = Sender::new(SenderConfig::tiny()).unwrap();
        assert!(sender.linear_out.weight.iter().all(|&w| w == 0.0));
        assert!(sender.linear_out.bias.iter().all(|&b| b == 0.0));
        assert!(sender.embedding.weight.iter().any(|&w| w != 0.0));
        let params = sender.state_dict();
        let bias_hh = params["rnn.bias_hh"].to_f32_vec().unwrap();
        assert!(bias_hh[10..20].iter().all(|&b| b == 1.0));
    }

    #[test]
    fn test_without_reset_embedding_is_zero() {
        let config = SenderConfig {
            reset_params: false,
            ..SenderConfig::tiny()
        };
        let sender = Sender::new(config).unwrap();
        assert!(sender.embedding.weight.iter().all(|&w| w == 0.0));
        assert!(sender.linear_out.weight.iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_codebook_named_e() {
        let config = SenderConfig {
            input_size: 12,
            hidden_size: 12,
            embedding_size: 4,
            seed: Some(3),
            ..SenderConfig::vqvae_continuous(4, 6, 3)
        };
        let sender = Sender::new(config).unwrap();
        let params = sender.state_dict();
        assert_eq!(params["e"].dims(), &[4, 6]);
        assert_eq!(params["embedding"].dims(), &[6, 4]);
        assert_eq!(params["linear_out.weight"].dims(), &[6, 12]);
        assert!(!params.contains_key("input_module.weight"));
        // embedding + 4 lstm tensors + output projector + codebook
        let lstm = 48 * 4 + 48 * 12 + 48 + 48;
        assert_eq!(sender.param_count(), 24 + lstm + 72 + 6 + 24);
    }

    #[test]
    fn test_input_projection_present_when_sizes_differ() {
        let sender = Sender::new(SenderConfig::tiny()).unwrap();
        let params = sender.state_dict();
        assert_eq!(params["input_module.weight"].dims(), &[10, 8]);
    }

    #[test]
    fn test_set_parameter() {
        let mut sender = Sender::new(SenderConfig::tiny()).unwrap();
        sender.set_parameter("linear_out.bias", &[1.0, 2.0, 3.0, 4.0, 5.0]).unwrap();
        assert_eq!(sender.linear_out.bias, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(matches!(
            sender.set_parameter("linear_out.bias", &[1.0]),
            Err(SenderError::Tensor(SygnalError::ElementCount { .. }))
        ));
        assert!(matches!(
            sender.set_parameter("decoder.weight", &[]),
            Err(SenderError::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_train_mode_toggle() {
        let mut sender = Sender::new(SenderConfig::tiny()).unwrap();
        assert!(sender.is_training());
        sender.eval();
        assert!(!sender.is_training());
        sender.train(true);
        assert!(sender.is_training());
    }

    #[test]
    fn test_forward_returns_messages() {
        let sender = Sender::new(SenderConfig::tiny()).unwrap();
        let x = Tensor::from_f32(&[0.0; 8], &[1, 8]);
        let messages = sender.forward(&x).unwrap();
        assert_eq!(messages.dims(), &[1, 4, 5]);
    }
}
