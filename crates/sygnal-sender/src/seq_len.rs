//! Per-element message lengths, latched at the first exact end-of-sequence.

use tracing::trace;

use sygnal_core::ops;

/// Tracks when each batch element first emits an exact EOS token.
///
/// Every element starts open at `max_len + 1`. A token counts as EOS only
/// when its arg-max is `eos_id` and the maximum is exactly `1.0`, so relaxed
/// or continuous tokens never close a message.
#[derive(Clone, Debug)]
pub struct SequenceLengthTracker {
    lengths: Vec<usize>,
    open: Vec<bool>,
    eos_id: usize,
}

impl SequenceLengthTracker {
    pub fn new(batch: usize, max_len: usize, eos_id: usize) -> Self {
        Self {
            lengths: vec![max_len + 1; batch],
            open: vec![true; batch],
            eos_id,
        }
    }

    /// Feed the tokens `(batch, vocab_size)` emitted at one-based position
    /// `seq_pos`. Position 0 is the start token.
    pub fn update(&mut self, tokens: &[f32], vocab_size: usize, seq_pos: usize) {
        for (b, (idx, max)) in ops::argmax_rows(tokens, vocab_size).into_iter().enumerate() {
            if self.open[b] && idx == self.eos_id && max == 1.0 {
                self.lengths[b] = seq_pos + 1;
                self.open[b] = false;
                trace!(element = b, length = seq_pos + 1, "sequence closed at eos");
            }
        }
    }

    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn is_closed(&self, b: usize) -> bool {
        !self.open[b]
    }

    pub fn all_closed(&self) -> bool {
        self.open.iter().all(|o| !o)
    }

    pub fn into_lengths(self) -> Vec<usize> {
        self.lengths
    }
}
