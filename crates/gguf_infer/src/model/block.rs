//! A single transformer block's materialized weights.

use std::sync::Arc;

use crate::buffer::DeviceBuffer;

pub struct TransformerBlock {
    pub attn_norm_weight: Arc<DeviceBuffer>,
    pub ffn_norm_weight: Arc<DeviceBuffer>,
    pub attn_q_weight: Arc<DeviceBuffer>,
    pub attn_k_weight: Arc<DeviceBuffer>,
    pub attn_v_weight: Arc<DeviceBuffer>,
    pub attn_output_weight: Arc<DeviceBuffer>,
    pub ffn_gate_weight: Arc<DeviceBuffer>,
    pub ffn_up_weight: Arc<DeviceBuffer>,
    pub ffn_down_weight: Arc<DeviceBuffer>,
}
