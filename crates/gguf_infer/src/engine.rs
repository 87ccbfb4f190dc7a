//! Inference engine (C6): owns the KV cache and runs the per-token forward
//! pass described in the model assembly's hyperparameters.

use candle_core::{DType, Device, IndexOp, Tensor};

use crate::buffer::StorageClass;
use crate::error::{EngineError, LogicalError};
use crate::kv_cache::KvCache;
use crate::model::ModelRecord;
use crate::primitives::{self, CommandBuffer, RopeConfig};

pub struct InferenceEngine {
    model: ModelRecord,
    kv_cache: KvCache,
    current_position: usize,
    device: Device,
}

impl InferenceEngine {
    /// Allocates the K/V cache buffers, preferring device-private storage
    /// and falling back to host-shared on allocation failure.
    pub fn new(model: ModelRecord, device: Device) -> Result<Self, EngineError> {
        let num_layers = model.params.block_count as usize;
        let max_sequence_length = model.params.max_sequence_length as usize;
        let num_kv_heads = model.params.head_count_kv as usize;
        let head_dim = model.params.head_dim() as usize;

        let kv_cache = KvCache::new(
            num_layers,
            max_sequence_length,
            num_kv_heads,
            head_dim,
            device.clone(),
            StorageClass::Private,
        )
        .or_else(|_| {
            KvCache::new(
                num_layers,
                max_sequence_length,
                num_kv_heads,
                head_dim,
                Device::Cpu,
                StorageClass::Shared,
            )
        })?;

        Ok(InferenceEngine {
            model,
            kv_cache,
            current_position: 0,
            device,
        })
    }

    pub fn current_position(&self) -> usize {
        self.current_position
    }

    /// Resets the position counter without clearing cache contents; stale
    /// entries beyond the new position are simply never read again, since
    /// reads are always bounded by the current position.
    pub fn reset(&mut self) {
        self.current_position = 0;
    }

    pub fn vocab_size(&self) -> usize {
        self.model.params.vocab_size as usize
    }

    /// Runs one decoding step for `token` at the implicit current position.
    /// On success the position advances by one and every layer's KV cache
    /// gains an entry at that position; on failure the position is
    /// unchanged and any partial cache writes are harmless because the same
    /// call re-executed at the same position is idempotent.
    pub fn forward(&mut self, token: u32) -> Result<Vec<f32>, EngineError> {
        let vocab_size = self.vocab_size();
        if token as usize >= vocab_size {
            return Err(LogicalError::TokenOutOfRange {
                token: token as i64,
                vocab_size,
            }
            .into());
        }
        let position = self.current_position;
        let max_sequence_length = self.model.params.max_sequence_length as usize;
        if position >= max_sequence_length {
            return Err(LogicalError::PositionExhausted {
                position,
                max_sequence_length,
            }
            .into());
        }

        let logits = self.run_layers(token, position)?;
        self.current_position += 1;
        Ok(logits)
    }

    fn rope_config(&self) -> RopeConfig {
        let params = &self.model.params;
        RopeConfig {
            dim_count: params.rope_dim_count as usize,
            freq_base: params.rope_freq_base,
            scaling: params.rope_scaling,
            scaling_factor: params.rope_scaling_factor,
            original_context_length: params.rope_original_context_length,
            beta_fast: params.beta_fast,
            beta_slow: params.beta_slow,
        }
    }

    fn run_layers(&mut self, token: u32, position: usize) -> Result<Vec<f32>, EngineError> {
        let params = self.model.params.clone();
        let embedding_dim = params.embedding_length as usize;
        let head_dim = params.head_dim() as usize;
        let num_heads = params.head_count as usize;
        let num_kv_heads = params.head_count_kv as usize;
        let num_groups = params.num_query_groups() as usize;
        let eps = params.rms_norm_eps as f32;
        let vocab_size = params.vocab_size as usize;
        let rope_config = self.rope_config();

        let mut cmd = CommandBuffer::new();

        let mut hidden_state = cmd
            .record("embedding_lookup", || {
                self.model.token_embeddings.tensor.i(token as usize)
            })?
            .to_dtype(DType::F32)?;

        let blocks = &self.model.blocks;
        let kv_cache = &mut self.kv_cache;

        for (layer_idx, block) in blocks.iter().enumerate() {
            let residual_1 = hidden_state.clone();
            let norm_1 = cmd.record("rms_norm_attn", || {
                primitives::rms_norm(&hidden_state, &block.attn_norm_weight.tensor, eps)
            })?;
            let norm_1_row = norm_1.reshape((1, embedding_dim))?.to_dtype(DType::F16)?;

            let q = cmd.record("project_q", || {
                primitives::matmul(&norm_1_row, &block.attn_q_weight.tensor, None, false, true, 1.0, 0.0)
            })?;
            let k = cmd.record("project_k", || {
                primitives::matmul(&norm_1_row, &block.attn_k_weight.tensor, None, false, true, 1.0, 0.0)
            })?;
            let v = cmd.record("project_v", || {
                primitives::matmul(&norm_1_row, &block.attn_v_weight.tensor, None, false, true, 1.0, 0.0)
            })?;

            let q = q.reshape((num_heads, head_dim))?.to_dtype(DType::F32)?;
            let k = k.reshape((num_kv_heads, head_dim))?.to_dtype(DType::F32)?;
            let v_row = v.reshape((num_kv_heads, head_dim))?.to_dtype(DType::F32)?;

            let freqs = self.model.rope_freqs.as_ref().map(|b| &b.tensor);
            let q = primitives::rope(&q, position, &rope_config, freqs)?;
            let k = primitives::rope(&k, position, &rope_config, freqs)?;

            let k_row: Vec<f32> = k.flatten_all()?.to_vec1()?;
            let v_row_vec: Vec<f32> = v_row.flatten_all()?.to_vec1()?;
            kv_cache.write(layer_idx, position, &k_row, &v_row_vec);

            let seq_len = position + 1;
            let k_cache = kv_cache.keys_upto(layer_idx, seq_len)?;
            let v_cache = kv_cache.values_upto(layer_idx, seq_len)?;

            // [seq_len, num_heads, head_dim]
            let k_rep = primitives::repeat_kv(&k_cache, num_groups)?;
            let v_rep = primitives::repeat_kv(&v_cache, num_groups)?;
            // -> [num_heads, seq_len, head_dim], batched over the head axis.
            let k_rep = k_rep.transpose(0, 1)?.contiguous()?;
            let v_rep = v_rep.transpose(0, 1)?.contiguous()?;
            let q_batched = q.unsqueeze(1)?; // [num_heads, 1, head_dim]

            let scale = 1.0 / (head_dim as f64).sqrt();
            let scores = cmd.record("attention_scores", || {
                primitives::matmul(&q_batched, &k_rep, None, false, true, scale, 0.0)
            })?;
            let scores = scores.reshape((num_heads, seq_len))?;
            let probs = cmd.record("attention_softmax", || primitives::softmax_rowwise(&scores))?;
            let probs_batched = probs.unsqueeze(1)?; // [num_heads, 1, seq_len]

            let attn_out = cmd.record("attention_weighted_sum", || {
                primitives::matmul(&probs_batched, &v_rep, None, false, false, 1.0, 0.0)
            })?;
            let attn_out = attn_out
                .reshape((embedding_dim,))?
                .to_dtype(DType::F16)?
                .reshape((1, embedding_dim))?;

            let attn_proj = cmd
                .record("attention_output_projection", || {
                    primitives::matmul(
                        &attn_out,
                        &block.attn_output_weight.tensor,
                        None,
                        false,
                        true,
                        1.0,
                        0.0,
                    )
                })?
                .reshape((embedding_dim,))?
                .to_dtype(DType::F32)?;

            hidden_state = primitives::elem_add(&residual_1, &attn_proj)?;

            let residual_2 = hidden_state.clone();
            let norm_2 = primitives::rms_norm(&hidden_state, &block.ffn_norm_weight.tensor, eps)?;
            let norm_2_row = norm_2.reshape((1, embedding_dim))?.to_dtype(DType::F16)?;

            let gate = cmd.record("ffn_gate", || {
                primitives::matmul(&norm_2_row, &block.ffn_gate_weight.tensor, None, false, true, 1.0, 0.0)
            })?;
            let up = cmd.record("ffn_up", || {
                primitives::matmul(&norm_2_row, &block.ffn_up_weight.tensor, None, false, true, 1.0, 0.0)
            })?;
            let gate = primitives::silu(&gate)?;
            let gated = primitives::elem_mul(&gate, &up)?;
            let down = cmd
                .record("ffn_down", || {
                    primitives::matmul(&gated, &block.ffn_down_weight.tensor, None, false, true, 1.0, 0.0)
                })?
                .reshape((embedding_dim,))?
                .to_dtype(DType::F32)?;

            hidden_state = primitives::elem_add(&residual_2, &down)?;
        }

        let final_norm = primitives::rms_norm(&hidden_state, &self.model.final_norm_weight.tensor, eps)?;
        let output_dtype = self.model.output_projection_weight.tensor.dtype();
        let final_row = final_norm.reshape((1, embedding_dim))?.to_dtype(output_dtype)?;
        let logits = cmd
            .record("output_projection", || {
                primitives::matmul(
                    &final_row,
                    &self.model.output_projection_weight.tensor,
                    None,
                    false,
                    true,
                    1.0,
                    0.0,
                )
            })?
            .reshape((vocab_size,))?
            .to_dtype(DType::F32)?;

        Ok(logits.to_vec1()?)
    }
}
