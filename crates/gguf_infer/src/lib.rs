//! `gguf_infer`
//!
//! A decoder-only, Llama-family inference engine over GGUF-style model
//! containers: container parsing, hyperparameter resolution, BPE
//! tokenization, weight dequantization/materialization, model assembly, and
//! a per-token forward pass with GQA attention, RoPE, SwiGLU, and an
//! incremental KV cache.

pub mod buffer;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod kv_cache;
pub mod materializer;
pub mod model;
pub mod primitives;
pub mod settings;
pub mod tokenizer;

pub use config::{HyperParams, RopeScaling};
pub use container::ContainerReader;
pub use engine::InferenceEngine;
pub use error::{EngineError, Result};
pub use materializer::{Materializer, ValidationLevel};
pub use model::ModelRecord;
pub use settings::{ComputePrecisionSetting, EngineSettings, ValidationLevelSetting};
pub use tokenizer::Tokenizer;
