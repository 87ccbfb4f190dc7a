//! Model assembly (C5): materializes every named tensor a layer needs and
//! assembles the per-layer blocks plus the top-level embedding/output/norm
//! weights into one model record.

use std::sync::Arc;

use candle_core::DType;
use rayon::prelude::*;

use crate::buffer::DeviceBuffer;
use crate::config::HyperParams;
use crate::container::ContainerReader;
use crate::error::EngineError;
use crate::materializer::Materializer;
use crate::model::block::TransformerBlock;

pub struct ModelRecord {
    pub params: HyperParams,
    pub token_embeddings: Arc<DeviceBuffer>,
    pub output_projection_weight: Arc<DeviceBuffer>,
    pub final_norm_weight: Arc<DeviceBuffer>,
    pub rope_freqs: Option<Arc<DeviceBuffer>>,
    pub blocks: Vec<TransformerBlock>,
}

impl ModelRecord {
    /// Per-layer tensor requests are dispatched concurrently; the
    /// materializer's internal mutex serializes cache effects. Results are
    /// reordered to layer index before being stored, since rayon's
    /// `into_par_iter` does not preserve submission order across threads.
    pub fn assemble(
        reader: &ContainerReader,
        materializer: &Materializer,
        params: HyperParams,
        compute_precision: DType,
    ) -> Result<Self, EngineError> {
        let embedding_precision = embedding_dtype(reader)?;

        let token_embeddings =
            materializer.materialize(reader, "token_embd.weight", embedding_precision)?;
        let output_projection_weight =
            materializer.materialize(reader, "output.weight", embedding_precision)?;
        let final_norm_weight = materializer.materialize(reader, "output_norm.weight", DType::F32)?;
        let rope_freqs = materializer
            .materialize(reader, "rope_freqs.weight", DType::F32)
            .ok();

        let num_layers = params.block_count as usize;
        let mut blocks: Vec<(usize, TransformerBlock)> = (0..num_layers)
            .into_par_iter()
            .map(|i| -> Result<(usize, TransformerBlock), EngineError> {
                let block = assemble_block(reader, materializer, i, compute_precision)?;
                Ok((i, block))
            })
            .collect::<Result<Vec<_>, _>>()?;
        blocks.sort_by_key(|(index, _)| *index);
        let blocks = blocks.into_iter().map(|(_, block)| block).collect();

        Ok(ModelRecord {
            params,
            token_embeddings,
            output_projection_weight,
            final_norm_weight,
            rope_freqs,
            blocks,
        })
    }
}

fn embedding_dtype(reader: &ContainerReader) -> Result<DType, EngineError> {
    let desc = reader.tensor_descriptor("token_embd.weight")?;
    Ok(match desc.element_type {
        crate::container::ElementType::F32 => DType::F32,
        _ => DType::F16,
    })
}

fn assemble_block(
    reader: &ContainerReader,
    materializer: &Materializer,
    layer: usize,
    compute_precision: DType,
) -> Result<TransformerBlock, EngineError> {
    let attn_norm_weight = materializer.materialize(
        reader,
        &format!("blk.{layer}.attn_norm.weight"),
        DType::F32,
    )?;
    let ffn_norm_weight = materializer.materialize(
        reader,
        &format!("blk.{layer}.ffn_norm.weight"),
        DType::F32,
    )?;
    let attn_q_weight = materializer.materialize(
        reader,
        &format!("blk.{layer}.attn_q.weight"),
        compute_precision,
    )?;
    let attn_k_weight = materializer.materialize(
        reader,
        &format!("blk.{layer}.attn_k.weight"),
        compute_precision,
    )?;
    let attn_v_weight = materializer.materialize(
        reader,
        &format!("blk.{layer}.attn_v.weight"),
        compute_precision,
    )?;
    let attn_output_weight = materializer.materialize(
        reader,
        &format!("blk.{layer}.attn_output.weight"),
        compute_precision,
    )?;
    let ffn_gate_weight = materializer.materialize(
        reader,
        &format!("blk.{layer}.ffn_gate.weight"),
        compute_precision,
    )?;
    let ffn_up_weight = materializer.materialize(
        reader,
        &format!("blk.{layer}.ffn_up.weight"),
        compute_precision,
    )?;
    let ffn_down_weight = materializer.materialize(
        reader,
        &format!("blk.{layer}.ffn_down.weight"),
        compute_precision,
    )?;

    Ok(TransformerBlock {
        attn_norm_weight,
        ffn_norm_weight,
        attn_q_weight,
        attn_k_weight,
        attn_v_weight,
        attn_output_weight,
        ffn_gate_weight,
        ffn_up_weight,
        ffn_down_weight,
    })
}
