//! Sender configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use sygnal_core::Device;

use crate::cell::CellKind;
use crate::error::{ConfigError, SenderError};
use crate::strategy::{LogitSource, StrategyKind};

/// Hyperparameters fixed at construction.
///
/// The four flags `vqvae`, `discrete_communication`, `gumbel_softmax` and `rl`
/// jointly select one [`StrategyKind`]; see [`SenderConfig::strategy`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Words in the baseline setting; embedding-space dimension in continuous VQ.
    pub vocab_size: usize,
    /// Decoding steps, excluding the prepended start token.
    pub max_len: usize,
    pub sos_id: usize,
    /// End-of-sequence id; falls back to `sos_id` when unset.
    #[serde(default)]
    pub eos_id: Option<usize>,
    #[serde(default = "default_input_size")]
    pub input_size: usize,
    #[serde(default = "default_embedding_size")]
    pub embedding_size: usize,
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    /// Argmax instead of sampling in evaluation mode.
    #[serde(default)]
    pub greedy: bool,
    /// Recurrent cell: "lstm" or "gru".
    #[serde(default = "default_cell_type")]
    pub cell_type: String,
    /// Apply the sender's initialization policy after construction.
    #[serde(default = "default_reset_params")]
    pub reset_params: bool,
    /// Temperature for relaxed sampling and policy logits.
    #[serde(default = "default_tau")]
    pub tau: f32,
    /// Quantize through a learned codebook instead of Gumbel-softmax.
    #[serde(default)]
    pub vqvae: bool,
    /// Number of codewords in the codebook.
    #[serde(default = "default_num_codewords")]
    pub num_codewords: usize,
    /// Dimension of each codeword.
    #[serde(default = "default_codeword_dim")]
    pub codeword_dim: usize,
    /// Weight of the commitment term in the VQ loss.
    #[serde(default = "default_beta")]
    pub beta: f32,
    /// Emit codeword indices (one-hot) instead of the codewords themselves.
    #[serde(default)]
    pub discrete_communication: bool,
    /// Relaxed (Gumbel-softmax) assignment over the codeword softmin.
    #[serde(default)]
    pub gumbel_softmax: bool,
    /// Policy-gradient sampling with entropy and log-probability outputs.
    #[serde(default)]
    pub rl: bool,
    #[serde(default)]
    pub device: Device,
    /// Seed for parameter initialization; entropy-seeded when unset.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_input_size() -> usize { 64 }
fn default_embedding_size() -> usize { 256 }
fn default_hidden_size() -> usize { 512 }
fn default_cell_type() -> String { "lstm".to_string() }
fn default_reset_params() -> bool { true }
fn default_tau() -> f32 { 1.2 }
fn default_num_codewords() -> usize { 25 }
fn default_codeword_dim() -> usize { 25 }
fn default_beta() -> f32 { 0.25 }

impl SenderConfig {
    /// Baseline Gumbel-softmax sender over `vocab_size` words.
    pub fn baseline(vocab_size: usize, max_len: usize, sos_id: usize) -> Self {
        Self {
            vocab_size,
            max_len,
            sos_id,
            eos_id: None,
            input_size: default_input_size(),
            embedding_size: default_embedding_size(),
            hidden_size: default_hidden_size(),
            greedy: false,
            cell_type: default_cell_type(),
            reset_params: default_reset_params(),
            tau: default_tau(),
            vqvae: false,
            num_codewords: vocab_size,
            codeword_dim: default_codeword_dim(),
            beta: default_beta(),
            discrete_communication: false,
            gumbel_softmax: false,
            rl: false,
            device: Device::Cpu,
            seed: None,
        }
    }

    /// VQ sender that communicates the quantized codewords directly.
    pub fn vqvae_continuous(num_codewords: usize, codeword_dim: usize, max_len: usize) -> Self {
        Self {
            vqvae: true,
            num_codewords,
            codeword_dim,
            ..Self::baseline(codeword_dim, max_len, 0)
        }
    }

    /// VQ sender that communicates codeword indices as one-hot symbols.
    pub fn vqvae_discrete(
        num_codewords: usize,
        codeword_dim: usize,
        max_len: usize,
        sos_id: usize,
    ) -> Self {
        Self {
            vqvae: true,
            discrete_communication: true,
            num_codewords,
            codeword_dim,
            ..Self::baseline(num_codewords, max_len, sos_id)
        }
    }

    /// Policy-gradient sender over `vocab_size` words.
    pub fn reinforce(vocab_size: usize, max_len: usize, sos_id: usize) -> Self {
        Self {
            rl: true,
            ..Self::baseline(vocab_size, max_len, sos_id)
        }
    }

    /// Tiny baseline preset for unit tests.
    pub fn tiny() -> Self {
        Self {
            input_size: 8,
            embedding_size: 6,
            hidden_size: 10,
            eos_id: Some(1),
            seed: Some(7),
            ..Self::baseline(5, 3, 0)
        }
    }

    /// Effective end-of-sequence id.
    pub fn eos_id(&self) -> usize {
        self.eos_id.unwrap_or(self.sos_id)
    }

    /// Continuous VQ communication: no symbolic start or end token exists.
    pub fn is_continuous_vq(&self) -> bool {
        self.vqvae && !self.rl && !self.discrete_communication
    }

    /// Width of the output projector: vocabulary logits or a pre-quantization vector.
    pub fn output_dim(&self) -> usize {
        if self.vqvae {
            self.codeword_dim
        } else {
            self.vocab_size
        }
    }

    pub fn cell_kind(&self) -> Result<CellKind, ConfigError> {
        self.cell_type.parse()
    }

    /// Resolve the discretization strategy from the mode flags.
    pub fn strategy(&self) -> Result<StrategyKind, ConfigError> {
        if self.rl {
            if self.gumbel_softmax {
                return Err(ConfigError::InconsistentFlags(
                    "gumbel_softmax cannot be combined with rl",
                ));
            }
            let logits = if self.vqvae {
                LogitSource::CodebookDistances
            } else {
                LogitSource::Linear
            };
            return Ok(StrategyKind::Reinforce { logits });
        }
        match (self.vqvae, self.discrete_communication) {
            (true, true) => Ok(StrategyKind::VqDiscrete { relaxed: self.gumbel_softmax }),
            (true, false) if self.gumbel_softmax => Err(ConfigError::InconsistentFlags(
                "gumbel_softmax over codewords requires discrete_communication",
            )),
            (true, false) => Ok(StrategyKind::VqContinuous),
            (false, _) if self.gumbel_softmax => Err(ConfigError::InconsistentFlags(
                "gumbel_softmax as a VQ assignment requires vqvae",
            )),
            (false, _) => Ok(StrategyKind::RelaxedCategorical),
        }
    }

    /// Check every construction-time invariant and return the resolved strategy.
    pub fn validate(&self) -> Result<StrategyKind, ConfigError> {
        let mut dims = vec![
            ("vocab_size", self.vocab_size),
            ("max_len", self.max_len),
            ("input_size", self.input_size),
            ("embedding_size", self.embedding_size),
            ("hidden_size", self.hidden_size),
            ("num_codewords", self.num_codewords),
        ];
        if self.vqvae {
            dims.push(("codeword_dim", self.codeword_dim));
        }
        if let Some(&(name, _)) = dims.iter().find(|(_, d)| *d == 0) {
            return Err(ConfigError::ZeroDimension { name });
        }

        if self.is_continuous_vq() {
            if self.vocab_size != self.codeword_dim {
                return Err(ConfigError::VocabSizeMismatch {
                    vocab_size: self.vocab_size,
                    expected: self.codeword_dim,
                    expected_name: "codeword_dim",
                    mode: "continuous communication",
                });
            }
        } else if self.vocab_size != self.num_codewords {
            return Err(ConfigError::VocabSizeMismatch {
                vocab_size: self.vocab_size,
                expected: self.num_codewords,
                expected_name: "num_codewords",
                mode: "discrete communication",
            });
        }

        if !self.is_continuous_vq() {
            for (name, id) in [("sos_id", self.sos_id), ("eos_id", self.eos_id())] {
                if id >= self.vocab_size {
                    return Err(ConfigError::SymbolOutOfRange {
                        name,
                        id,
                        vocab_size: self.vocab_size,
                    });
                }
            }
        }

        if !(self.tau.is_finite() && self.tau > 0.0) {
            return Err(ConfigError::InvalidTemperature(self.tau));
        }
        if !(self.beta.is_finite() && self.beta >= 0.0) {
            return Err(ConfigError::InvalidBeta(self.beta));
        }
        if !self.device.is_cpu() {
            return Err(ConfigError::UnsupportedDevice(self.device));
        }
        self.cell_kind()?;
        self.strategy()
    }
}

/// Load a [`SenderConfig`] from a JSON file.
pub fn load_config(path: &Path) -> Result<SenderConfig, SenderError> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}
