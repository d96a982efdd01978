//! # sygnal-sender
//!
//! Recurrent message sender for emergent-communication games.
//!
//! A sender encodes an input vector into a fixed-length message of
//! `max_len` tokens. Tokens are produced one at a time by an LSTM or GRU
//! cell and discretized by one of four strategies:
//!
//! - **Relaxed categorical**: softmax over the vocabulary, straight-through
//!   Gumbel-softmax while training, exact one-hot symbols in evaluation
//! - **Continuous VQ**: the hidden projection snaps to its nearest codeword
//! - **Discrete VQ**: codeword indices sent as one-hot symbols
//! - **REINFORCE**: categorical policy with entropy and log-probabilities
//!
//! The reported length of each message counts the start token and every
//! token up to the first exact end-of-sequence symbol.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sygnal_core::{Module, Tensor};
//! use sygnal_sender::{Sender, SenderConfig};
//!
//! let config = SenderConfig::tiny();
//! let mut sender = Sender::new(config.clone()).unwrap();
//! sender.eval();
//!
//! let input = Tensor::from_f32(&vec![0.1; 2 * config.input_size], &[2, config.input_size]);
//! let out = sender.decode(Some(&input)).unwrap();
//! println!("{:?} lengths={:?}", out.messages.dims(), out.sequence_lengths);
//! ```

pub mod cell;
pub mod config;
pub mod error;
pub mod init;
pub mod linear;
pub mod message;
pub mod quantize;
pub mod sender;
pub mod seq_len;
pub mod strategy;

pub use cell::{CellKind, GruCell, LstmCell, RecurrentCell, RecurrentState};
pub use config::{load_config, SenderConfig};
pub use error::{ConfigError, SenderError};
pub use message::SenderOutput;
pub use quantize::{gumbel_softmax, hard_max, straight_through, to_one_hot, vq_loss_backward, Codebook};
pub use sender::Sender;
pub use seq_len::SequenceLengthTracker;
pub use strategy::{Discretizer, LogitSource, StrategyKind};
