use std::collections::HashMap;

use crate::{Result, Tensor};

/// Base trait for all sygnal modules.
///
/// Parameters live as raw `Vec<f32>` fields on the implementors; the
/// introspection methods hand out owned tensor copies.
pub trait Module: Send + Sync {
    /// Forward pass.
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Named copies of every trainable parameter.
    fn named_parameters(&self) -> Vec<(String, Tensor)>;

    /// Set training/eval mode.
    fn train(&mut self, _mode: bool) {}

    /// Whether the module is in training mode.
    fn is_training(&self) -> bool {
        true
    }

    /// Switch to evaluation mode.
    fn eval(&mut self) {
        self.train(false);
    }

    /// Total number of trainable scalars.
    fn param_count(&self) -> usize {
        self.named_parameters().iter().map(|(_, t)| t.numel()).sum()
    }

    /// Export state dictionary.
    fn state_dict(&self) -> HashMap<String, Tensor> {
        self.named_parameters().into_iter().collect()
    }
}
