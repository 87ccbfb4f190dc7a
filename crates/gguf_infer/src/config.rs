//! Hyperparameter resolver (C2): reads well-known `llama.*` metadata keys
//! into a typed configuration, applying the documented defaults for the
//! keys a container is allowed to omit.

use crate::container::{Metadata, MetadataMap};
use crate::error::{EngineError, FormatError};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RopeScaling {
    None,
    Linear,
    Yarn,
}

impl RopeScaling {
    fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw {
            "none" => Ok(RopeScaling::None),
            "linear" => Ok(RopeScaling::Linear),
            "yarn" => Ok(RopeScaling::Yarn),
            other => Err(FormatError::UnknownRopeScalingType(other.to_string()).into()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HyperParams {
    pub embedding_length: u64,
    pub block_count: u64,
    pub head_count: u64,
    pub head_count_kv: u64,
    pub feed_forward_length: u64,
    pub vocab_size: u64,
    pub max_sequence_length: u64,
    pub rms_norm_eps: f64,

    pub rope_dim_count: u64,
    pub rope_freq_base: f64,
    pub rope_scaling: RopeScaling,
    pub rope_scaling_factor: f64,
    pub rope_original_context_length: u64,
    pub beta_fast: f64,
    pub beta_slow: f64,
    pub finetuned: bool,
}

impl HyperParams {
    pub fn head_dim(&self) -> u64 {
        self.embedding_length / self.head_count
    }

    pub fn num_query_groups(&self) -> u64 {
        self.head_count / self.head_count_kv
    }

    pub fn resolve(metadata: &MetadataMap) -> Result<Self, EngineError> {
        let m = Metadata(metadata);

        let embedding_length = m.get_u64("llama.embedding_length")?;
        let block_count = m.get_u64("llama.block_count")?;
        let head_count = m.get_u64("llama.attention.head_count")?;
        let head_count_kv = m.get_u64("llama.attention.head_count_kv")?;
        let feed_forward_length = m.get_u64("llama.feed_forward_length")?;
        let vocab_size = m.get_u64("llama.vocab_size")?;
        let max_sequence_length = m.get_u64("llama.context_length")?;
        let rms_norm_eps = m.get_f64("llama.attention.layer_norm_rms_epsilon")?;

        let head_dim = embedding_length / head_count;
        let rope_dim_count = m.get_u64_or("llama.rope.dimension_count", head_dim)?;
        let rope_freq_base = m.get_f64_or("llama.rope.freq_base", 500_000.0)?;
        let scaling_type = m.get_str_or("llama.rope.scaling.type", "none")?;
        let rope_scaling = RopeScaling::parse(scaling_type)?;
        let rope_scaling_factor = m.get_f64_or("llama.rope.scaling.factor", 1.0)?;
        let rope_original_context_length = m.get_u64_or(
            "llama.rope.scaling.original_context_length",
            max_sequence_length,
        )?;
        let beta_fast = m.get_f64_or("llama.rope.scaling.beta_fast", 32.0)?;
        let beta_slow = m.get_f64_or("llama.rope.scaling.beta_slow", 1.0)?;
        let finetuned = m.get_bool_or("llama.rope.scaling.finetuned", false)?;

        Ok(HyperParams {
            embedding_length,
            block_count,
            head_count,
            head_count_kv,
            feed_forward_length,
            vocab_size,
            max_sequence_length,
            rms_norm_eps,
            rope_dim_count,
            rope_freq_base,
            rope_scaling,
            rope_scaling_factor,
            rope_original_context_length,
            beta_fast,
            beta_slow,
            finetuned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MetadataValue;

    fn base_metadata() -> MetadataMap {
        let mut m = MetadataMap::new();
        m.insert("llama.embedding_length".into(), MetadataValue::U64(4096));
        m.insert("llama.block_count".into(), MetadataValue::U64(32));
        m.insert("llama.attention.head_count".into(), MetadataValue::U64(32));
        m.insert(
            "llama.attention.head_count_kv".into(),
            MetadataValue::U64(8),
        );
        m.insert(
            "llama.feed_forward_length".into(),
            MetadataValue::U64(14336),
        );
        m.insert("llama.vocab_size".into(), MetadataValue::U64(32000));
        m.insert("llama.context_length".into(), MetadataValue::U64(4096));
        m.insert(
            "llama.attention.layer_norm_rms_epsilon".into(),
            MetadataValue::F32(1e-5),
        );
        m
    }

    #[test]
    fn resolves_defaults_when_optional_keys_absent() {
        let metadata = base_metadata();
        let params = HyperParams::resolve(&metadata).unwrap();
        assert_eq!(params.head_dim(), 128);
        assert_eq!(params.num_query_groups(), 4);
        assert_eq!(params.rope_dim_count, 128);
        assert_eq!(params.rope_freq_base, 500_000.0);
        assert_eq!(params.rope_scaling, RopeScaling::None);
        assert_eq!(params.rope_scaling_factor, 1.0);
        assert_eq!(params.rope_original_context_length, 4096);
        assert_eq!(params.beta_fast, 32.0);
        assert_eq!(params.beta_slow, 1.0);
        assert!(!params.finetuned);
    }

    #[test]
    fn missing_required_key_is_an_error() {
        let mut metadata = base_metadata();
        metadata.remove("llama.vocab_size");
        let err = HyperParams::resolve(&metadata).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Format(FormatError::MissingMetadata(_))
        ));
    }

    #[test]
    fn unknown_scaling_type_is_an_error() {
        let mut metadata = base_metadata();
        metadata.insert(
            "llama.rope.scaling.type".into(),
            MetadataValue::String("cosine".into()),
        );
        let err = HyperParams::resolve(&metadata).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Format(FormatError::UnknownRopeScalingType(_))
        ));
    }
}
