//! Recurrent step functions (LSTM and GRU cells).
//!
//! Both cells follow PyTorch's `LSTMCell` / `GRUCell` parameter layout:
//! `weight_ih: (G·H, E)`, `weight_hh: (G·H, H)`, `bias_ih`, `bias_hh: (G·H,)`
//! with gate blocks stacked in the order `i, f, g, o` (LSTM) or `r, z, n` (GRU).

use std::fmt;
use std::str::FromStr;

use rand::RngCore;

use sygnal_core::ops::{self, sigmoid};
use sygnal_core::Tensor;

use crate::error::ConfigError;
use crate::init;

/// Supported recurrent cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellKind {
    Lstm,
    Gru,
}

impl FromStr for CellKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lstm" => Ok(CellKind::Lstm),
            "gru" => Ok(CellKind::Gru),
            other => Err(ConfigError::UnsupportedCell(other.to_string())),
        }
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellKind::Lstm => write!(f, "lstm"),
            CellKind::Gru => write!(f, "gru"),
        }
    }
}

/// Per-batch recurrent state, each vector `(batch, hidden_size)`.
#[derive(Clone, Debug, PartialEq)]
pub struct RecurrentState {
    pub h: Vec<f32>,
    /// Cell vector, LSTM only.
    pub c: Option<Vec<f32>>,
}

/// Single-step state transition `(input, state) -> state`.
pub trait RecurrentCell: Send + Sync {
    fn kind(&self) -> CellKind;

    /// Wrap an initial hidden vector; LSTM adds a zero cell vector.
    fn init_state(&self, h0: Vec<f32>) -> RecurrentState {
        let c = match self.kind() {
            CellKind::Lstm => Some(vec![0.0; h0.len()]),
            CellKind::Gru => None,
        };
        RecurrentState { h: h0, c }
    }

    /// Advance one step. `input: (batch, input_size)`.
    fn step(&self, input: &[f32], state: &RecurrentState, batch: usize) -> RecurrentState;

    /// Xavier-uniform input weights, orthogonal recurrent weights.
    fn reset_parameters(&mut self, rng: &mut dyn RngCore);

    /// Mutable flat parameter slots, in the same order as `named_parameters`.
    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Vec<f32>)>;

    fn named_parameters(&self) -> Vec<(&'static str, Tensor)>;
}

/// Build the cell selected by `kind`.
pub fn build_cell(
    kind: CellKind,
    input_size: usize,
    hidden_size: usize,
    rng: &mut dyn RngCore,
) -> Box<dyn RecurrentCell> {
    match kind {
        CellKind::Lstm => Box::new(LstmCell::new(input_size, hidden_size, rng)),
        CellKind::Gru => Box::new(GruCell::new(input_size, hidden_size, rng)),
    }
}

/// Gate pre-activations `x W_ih^T + b_ih` and `h W_hh^T + b_hh`.
struct GateParams {
    weight_ih: Vec<f32>,
    weight_hh: Vec<f32>,
    bias_ih: Vec<f32>,
    bias_hh: Vec<f32>,
    input_size: usize,
    hidden_size: usize,
    gates: usize,
}

impl GateParams {
    fn new(input_size: usize, hidden_size: usize, gates: usize, rng: &mut dyn RngCore) -> Self {
        let rows = gates * hidden_size;
        let (weight_ih, bias_ih) = init::linear_default(rng, rows, input_size);
        let (weight_hh, bias_hh) = init::linear_default(rng, rows, hidden_size);
        Self {
            weight_ih,
            weight_hh,
            bias_ih,
            bias_hh,
            input_size,
            hidden_size,
            gates,
        }
    }

    fn reset(&mut self, rng: &mut dyn RngCore) {
        let rows = self.gates * self.hidden_size;
        self.weight_ih = init::xavier_uniform(rng, rows, self.input_size);
        self.weight_hh = init::orthogonal(rng, rows, self.hidden_size);
        self.bias_ih.fill(0.0);
        self.bias_hh.fill(0.0);
    }

    fn project(&self, x: &[f32], h: &[f32], batch: usize) -> (Vec<f32>, Vec<f32>) {
        let rows = self.gates * self.hidden_size;
        let gi = ops::linear(x, &self.weight_ih, Some(&self.bias_ih), batch, self.input_size, rows);
        let gh = ops::linear(h, &self.weight_hh, Some(&self.bias_hh), batch, self.hidden_size, rows);
        (gi, gh)
    }

    fn slots(&mut self) -> Vec<(&'static str, &mut Vec<f32>)> {
        vec![
            ("weight_ih", &mut self.weight_ih),
            ("weight_hh", &mut self.weight_hh),
            ("bias_ih", &mut self.bias_ih),
            ("bias_hh", &mut self.bias_hh),
        ]
    }

    fn tensors(&self) -> Vec<(&'static str, Tensor)> {
        let rows = self.gates * self.hidden_size;
        vec![
            ("weight_ih", Tensor::from_f32(&self.weight_ih, &[rows, self.input_size])),
            ("weight_hh", Tensor::from_f32(&self.weight_hh, &[rows, self.hidden_size])),
            ("bias_ih", Tensor::from_f32(&self.bias_ih, &[rows])),
            ("bias_hh", Tensor::from_f32(&self.bias_hh, &[rows])),
        ]
    }
}

/// LSTM cell: `c' = f⊙c + i⊙g`, `h' = o⊙tanh(c')`.
pub struct LstmCell {
    params: GateParams,
}

impl LstmCell {
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut dyn RngCore) -> Self {
        Self {
            params: GateParams::new(input_size, hidden_size, 4, rng),
        }
    }
}

impl RecurrentCell for LstmCell {
    fn kind(&self) -> CellKind {
        CellKind::Lstm
    }

    fn step(&self, input: &[f32], state: &RecurrentState, batch: usize) -> RecurrentState {
        let hd = self.params.hidden_size;
        let zeros;
        let c_prev = match &state.c {
            Some(c) => c.as_slice(),
            None => {
                zeros = vec![0.0f32; batch * hd];
                zeros.as_slice()
            }
        };
        let (gi, gh) = self.params.project(input, &state.h, batch);

        let mut h = vec![0.0f32; batch * hd];
        let mut c = vec![0.0f32; batch * hd];
        for b in 0..batch {
            let g_off = b * 4 * hd;
            for u in 0..hd {
                let pre = |gate: usize| gi[g_off + gate * hd + u] + gh[g_off + gate * hd + u];
                let i = sigmoid(pre(0));
                let f = sigmoid(pre(1));
                let g = pre(2).tanh();
                let o = sigmoid(pre(3));
                let cell = f * c_prev[b * hd + u] + i * g;
                c[b * hd + u] = cell;
                h[b * hd + u] = o * cell.tanh();
            }
        }
        RecurrentState { h, c: Some(c) }
    }

    /// Forget-gate slice of `bias_hh` starts at 1.
    fn reset_parameters(&mut self, rng: &mut dyn RngCore) {
        self.params.reset(rng);
        let hd = self.params.hidden_size;
        self.params.bias_hh[hd..2 * hd].fill(1.0);
    }

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Vec<f32>)> {
        self.params.slots()
    }

    fn named_parameters(&self) -> Vec<(&'static str, Tensor)> {
        self.params.tensors()
    }
}

/// GRU cell: `h' = (1 - z)⊙n + z⊙h` with `n = tanh(W_in x + r⊙(W_hn h))`.
pub struct GruCell {
    params: GateParams,
}

impl GruCell {
    pub fn new(input_size: usize, hidden_size: usize, rng: &mut dyn RngCore) -> Self {
        Self {
            params: GateParams::new(input_size, hidden_size, 3, rng),
        }
    }
}

impl RecurrentCell for GruCell {
    fn kind(&self) -> CellKind {
        CellKind::Gru
    }

    fn step(&self, input: &[f32], state: &RecurrentState, batch: usize) -> RecurrentState {
        let hd = self.params.hidden_size;
        let (gi, gh) = self.params.project(input, &state.h, batch);

        let mut h = vec![0.0f32; batch * hd];
        for b in 0..batch {
            let g_off = b * 3 * hd;
            for u in 0..hd {
                let r = sigmoid(gi[g_off + u] + gh[g_off + u]);
                let z = sigmoid(gi[g_off + hd + u] + gh[g_off + hd + u]);
                let n = (gi[g_off + 2 * hd + u] + r * gh[g_off + 2 * hd + u]).tanh();
                h[b * hd + u] = (1.0 - z) * n + z * state.h[b * hd + u];
            }
        }
        RecurrentState { h, c: None }
    }

    fn reset_parameters(&mut self, rng: &mut dyn RngCore) {
        self.params.reset(rng);
    }

    fn parameters_mut(&mut self) -> Vec<(&'static str, &mut Vec<f32>)> {
        self.params.slots()
    }

    fn named_parameters(&self) -> Vec<(&'static str, Tensor)> {
        self.params.tensors()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_cell_kind_parse() {
        assert_eq!("lstm".parse::<CellKind>(), Ok(CellKind::Lstm));
        assert_eq!("gru".parse::<CellKind>(), Ok(CellKind::Gru));
        assert_eq!(
            "LSTM".parse::<CellKind>(),
            Err(ConfigError::UnsupportedCell("LSTM".into()))
        );
        assert_eq!(CellKind::Gru.to_string(), "gru");
    }

    #[test]
    fn test_lstm_step_shape_and_state() {
        let mut rng = StdRng::seed_from_u64(0);
        let cell = build_cell(CellKind::Lstm, 6, 4, &mut rng);
        let state = cell.init_state(vec![0.0; 2 * 4]);
        assert_eq!(state.c.as_ref().map(Vec::len), Some(8));
        let next = cell.step(&vec![0.3; 2 * 6], &state, 2);
        assert_eq!(next.h.len(), 8);
        assert!(next.h.iter().all(|v| v.abs() < 1.0));
        // identical rows in, identical rows out
        assert_eq!(&next.h[..4], &next.h[4..]);
    }

    #[test]
    fn test_lstm_forget_bias_after_reset() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut cell = LstmCell::new(3, 5, &mut rng);
        cell.reset_parameters(&mut rng);
        let b = &cell.params.bias_hh;
        assert!(b[..5].iter().all(|&v| v == 0.0));
        assert!(b[5..10].iter().all(|&v| v == 1.0));
        assert!(b[10..].iter().all(|&v| v == 0.0));
        assert!(cell.params.bias_ih.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_lstm_zero_weights_keep_state_zero() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut cell = LstmCell::new(3, 2, &mut rng);
        for (_, slot) in cell.parameters_mut() {
            slot.fill(0.0);
        }
        // all gates at sigmoid(0) = 0.5, g = tanh(0) = 0 → c stays 0, h stays 0
        let state = cell.init_state(vec![0.0; 2]);
        let next = cell.step(&[1.0, 2.0, 3.0], &state, 1);
        assert_eq!(next.h, vec![0.0, 0.0]);
        assert_eq!(next.c, Some(vec![0.0, 0.0]));
    }

    #[test]
    fn test_gru_has_no_cell_state() {
        let mut rng = StdRng::seed_from_u64(3);
        let cell = build_cell(CellKind::Gru, 4, 3, &mut rng);
        let state = cell.init_state(vec![0.5; 3]);
        assert!(state.c.is_none());
        let next = cell.step(&[0.1, 0.2, 0.3, 0.4], &state, 1);
        assert!(next.c.is_none());
        assert_eq!(next.h.len(), 3);
    }

    #[test]
    fn test_gru_update_gate_saturated_keeps_hidden() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut cell = GruCell::new(2, 2, &mut rng);
        for (_, slot) in cell.parameters_mut() {
            slot.fill(0.0);
        }
        // z = sigmoid(50) ≈ 1 → h' ≈ h
        cell.params.bias_ih[2..4].fill(50.0);
        let state = cell.init_state(vec![0.7, -0.3]);
        let next = cell.step(&[1.0, 1.0], &state, 1);
        assert!((next.h[0] - 0.7).abs() < 1e-6);
        assert!((next.h[1] + 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_named_parameter_shapes() {
        let mut rng = StdRng::seed_from_u64(5);
        let cell = build_cell(CellKind::Lstm, 3, 2, &mut rng);
        let params = cell.named_parameters();
        let dims: Vec<_> = params.iter().map(|(n, t)| (*n, t.dims().to_vec())).collect();
        assert_eq!(
            dims,
            vec![
                ("weight_ih", vec![8, 3]),
                ("weight_hh", vec![8, 2]),
                ("bias_ih", vec![8]),
                ("bias_hh", vec![8]),
            ]
        );
    }
}
