//! Dense row-major f32 kernels.
//!
//! Everything operates on flat slices with explicit dimensions, one row per
//! batch element. Callers own the output buffers' shapes.

/// `a @ b` for `a: (m, k)` and `b: (k, n)`.
pub fn matmul(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    assert_eq!(a.len(), m * k, "matmul: lhs has {} elements, expected {}", a.len(), m * k);
    assert_eq!(b.len(), k * n, "matmul: rhs has {} elements, expected {}", b.len(), k * n);
    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        let row = &mut out[i * n..(i + 1) * n];
        for p in 0..k {
            let av = a[i * k + p];
            let b_row = &b[p * n..(p + 1) * n];
            for (o, &bv) in row.iter_mut().zip(b_row) {
                *o += av * bv;
            }
        }
    }
    out
}

/// `x @ w^T + bias` for `x: (m, k)`, `w: (n, k)` (PyTorch `Linear` layout).
pub fn linear(x: &[f32], w: &[f32], bias: Option<&[f32]>, m: usize, k: usize, n: usize) -> Vec<f32> {
    assert_eq!(x.len(), m * k);
    assert_eq!(w.len(), n * k);
    let mut out = vec![0.0f32; m * n];
    for i in 0..m {
        let x_row = &x[i * k..(i + 1) * k];
        for j in 0..n {
            let w_row = &w[j * k..(j + 1) * k];
            let mut acc = bias.map_or(0.0, |b| b[j]);
            for (xv, wv) in x_row.iter().zip(w_row) {
                acc += xv * wv;
            }
            out[i * n + j] = acc;
        }
    }
    out
}

/// Row-wise softmax over the last axis of width `cols`.
pub fn softmax_rows(x: &[f32], cols: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; x.len()];
    for (src, dst) in x.chunks_exact(cols).zip(out.chunks_exact_mut(cols)) {
        let max_val = src.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for (d, &v) in dst.iter_mut().zip(src) {
            *d = (v - max_val).exp();
            sum += *d;
        }
        for d in dst.iter_mut() {
            *d /= sum;
        }
    }
    out
}

/// Row-wise log-softmax over the last axis of width `cols`.
pub fn log_softmax_rows(x: &[f32], cols: usize) -> Vec<f32> {
    let mut out = vec![0.0f32; x.len()];
    for (src, dst) in x.chunks_exact(cols).zip(out.chunks_exact_mut(cols)) {
        let max_val = src.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let log_sum = src.iter().map(|&v| (v - max_val).exp()).sum::<f32>().ln();
        for (d, &v) in dst.iter_mut().zip(src) {
            *d = v - max_val - log_sum;
        }
    }
    out
}

/// Row-wise maximum: `(index, value)` per row. Ties resolve to the lowest index.
pub fn argmax_rows(x: &[f32], cols: usize) -> Vec<(usize, f32)> {
    x.chunks_exact(cols)
        .map(|row| {
            let mut best = 0;
            let mut best_val = f32::NEG_INFINITY;
            for (i, &v) in row.iter().enumerate() {
                if v > best_val {
                    best_val = v;
                    best = i;
                }
            }
            (best, best_val)
        })
        .collect()
}

/// Squared Euclidean distance between equal-length vectors.
pub fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

#[inline]
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
