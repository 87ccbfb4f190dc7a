//! Primitive operation contracts (C7), implemented directly on top of
//! `candle_core`/`candle_nn` tensor ops. Each function is the payload a
//! `CommandBuffer` step records; none of them touch the cache mutex or any
//! other shared state.

use candle_core::{DType, Tensor};

use crate::config::RopeScaling;

/// `C <- alpha * op(A) * op(B) + beta * C`. `transpose_a`/`transpose_b`
/// select whether each operand is transposed before multiplication.
pub fn matmul(
    a: &Tensor,
    b: &Tensor,
    c: Option<&Tensor>,
    transpose_a: bool,
    transpose_b: bool,
    alpha: f64,
    beta: f64,
) -> candle_core::Result<Tensor> {
    let op_a = if transpose_a { a.t()? } else { a.clone() };
    let op_b = if transpose_b { b.t()? } else { b.clone() };
    let product = op_a.matmul(&op_b)?;
    let scaled = (product * alpha)?;
    match c {
        Some(c) if beta != 0.0 => scaled + (c * beta)?,
        _ => Ok(scaled),
    }
}

/// Per-row stable softmax over the last dimension.
pub fn softmax_rowwise(input: &Tensor) -> candle_core::Result<Tensor> {
    candle_nn::ops::softmax(input, candle_core::D::Minus1)
}

/// `out = weight * in / sqrt(mean(in^2) + eps)`, row-wise over the last dim.
pub fn rms_norm(input: &Tensor, weight: &Tensor, eps: f32) -> candle_core::Result<Tensor> {
    candle_nn::ops::rms_norm(input, weight, eps)
}

/// `x * sigmoid(x)`.
pub fn silu(input: &Tensor) -> candle_core::Result<Tensor> {
    candle_nn::ops::silu(input)
}

pub fn elem_add(a: &Tensor, b: &Tensor) -> candle_core::Result<Tensor> {
    a.broadcast_add(b)
}

pub fn elem_mul(a: &Tensor, b: &Tensor) -> candle_core::Result<Tensor> {
    a.broadcast_mul(b)
}

pub fn convert_f16_f32(input: &Tensor) -> candle_core::Result<Tensor> {
    input.to_dtype(DType::F32)
}

/// Replicates each KV head across its group of query heads. `src` has shape
/// `[seq_len, n_kv_heads, head_dim]`; the result has shape
/// `[seq_len, n_kv_heads * n_groups, head_dim]`, with destination head `h`
/// reading source head `h / n_groups`.
pub fn repeat_kv(src: &Tensor, n_groups: usize) -> candle_core::Result<Tensor> {
    if n_groups == 1 {
        return src.contiguous();
    }
    let (seq_len, n_kv_heads, head_dim) = src.dims3()?;
    src.unsqueeze(2)?
        .broadcast_as((seq_len, n_kv_heads, n_groups, head_dim))?
        .reshape((seq_len, n_kv_heads * n_groups, head_dim))?
        .contiguous()
}

/// Rotary embedding frequency schedule parameters, resolved from the
/// hyperparameters for a single model.
pub struct RopeConfig {
    pub dim_count: usize,
    pub freq_base: f64,
    pub scaling: RopeScaling,
    pub scaling_factor: f64,
    pub original_context_length: u64,
    pub beta_fast: f64,
    pub beta_slow: f64,
}

impl RopeConfig {
    /// `freq_factor` is the optional per-pair frequency factor from
    /// `rope_freqs.weight`; when present it divides the pair's frequency
    /// (equivalently, scales the rotation angle up by that factor), matching
    /// the reference's `theta /= freq_factors[i]` treatment.
    fn theta(&self, pair_index: usize, position: usize, freq_factor: Option<f32>) -> f64 {
        let exponent = (2 * pair_index) as f64 / self.dim_count as f64;
        let base_freq = self.freq_base.powf(exponent);
        let mut scaled_freq = match self.scaling {
            RopeScaling::None => base_freq,
            RopeScaling::Linear => base_freq * self.scaling_factor,
            RopeScaling::Yarn => yarn_freq(
                base_freq,
                pair_index,
                self.dim_count,
                self.scaling_factor,
                self.original_context_length,
                self.beta_fast,
                self.beta_slow,
            ),
        };
        if let Some(factor) = freq_factor {
            scaled_freq /= factor as f64;
        }
        position as f64 / scaled_freq
    }
}

/// NTK-by-parts interpolation: low-frequency pairs (long wavelength) scale
/// down by `scaling_factor`, high-frequency pairs are left alone, and the
/// pairs in between ramp linearly, per the YaRN scaling scheme.
fn yarn_freq(
    base_freq: f64,
    pair_index: usize,
    dim_count: usize,
    scaling_factor: f64,
    original_context_length: u64,
    beta_fast: f64,
    beta_slow: f64,
) -> f64 {
    let wavelength = std::f64::consts::TAU * base_freq;
    let low = find_correction_dim(beta_fast, dim_count, original_context_length);
    let high = find_correction_dim(beta_slow, dim_count, original_context_length);
    let ramp = ((pair_index as f64 - low) / (high - low).max(1e-3)).clamp(0.0, 1.0);
    let interpolation = 1.0 - ramp;
    let _ = wavelength;
    base_freq * (interpolation / scaling_factor + ramp)
}

fn find_correction_dim(num_rotations: f64, dim_count: usize, original_context_length: u64) -> f64 {
    (dim_count as f64 * (original_context_length as f64 / (num_rotations * std::f64::consts::TAU)).ln())
        / (2.0 * 10_000f64.ln())
}

/// Applies rotary position embedding to the first `config.dim_count`
/// dimensions of each head row, leaving the remainder unchanged. `buf` has
/// shape `[n_heads, head_dim]` and holds `f32` values for a single position.
/// `freqs`, when present, is `rope_freqs.weight`'s per-pair frequency factor
/// (length `config.dim_count / 2`), modulating the rotation angle.
pub fn rope(
    buf: &Tensor,
    position: usize,
    config: &RopeConfig,
    freqs: Option<&Tensor>,
) -> candle_core::Result<Tensor> {
    let (n_heads, head_dim) = buf.dims2()?;
    let mut values = buf.to_dtype(DType::F32)?.to_vec2::<f32>()?;
    let pairs = config.dim_count / 2;
    let freq_factors = freqs.map(|f| f.to_dtype(DType::F32)?.to_vec1::<f32>()).transpose()?;

    for head in values.iter_mut() {
        for pair_index in 0..pairs {
            let freq_factor = freq_factors.as_ref().and_then(|f| f.get(pair_index)).copied();
            let theta = config.theta(pair_index, position, freq_factor);
            let (sin, cos) = theta.sin_cos();
            let i0 = pair_index;
            let i1 = pair_index + pairs;
            let x0 = head[i0] as f64;
            let x1 = head[i1] as f64;
            head[i0] = (x0 * cos - x1 * sin) as f32;
            head[i1] = (x0 * sin + x1 * cos) as f32;
        }
    }

    let flat: Vec<f32> = values.into_iter().flatten().collect();
    Tensor::from_vec(flat, (n_heads, head_dim), buf.device())
}
