//! Primitive dispatch (C7): the thin operation surface the inference engine
//! and the weight materializer are built on.

mod command_buffer;
mod ops;
mod quant;

pub use command_buffer::CommandBuffer;
pub use ops::{
    convert_f16_f32, elem_add, elem_mul, matmul, repeat_kv, rms_norm, rope, silu, softmax_rowwise,
    RopeConfig,
};
pub use quant::{dequantize_q4_k_m, dequantize_q4_k_s, dequantize_q6_k};
