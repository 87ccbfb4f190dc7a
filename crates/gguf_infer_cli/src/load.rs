//! Shared model-loading path for the `load` and `run` subcommands.

use anyhow::Result;
use candle_core::Device;
use gguf_infer::{ContainerReader, EngineSettings, HyperParams, Materializer, ModelRecord, Tokenizer};

pub struct LoadedModel {
    pub model: ModelRecord,
    pub tokenizer: Tokenizer,
    pub device: Device,
}

pub fn load(path: &std::path::Path, settings: &EngineSettings) -> Result<LoadedModel> {
    tracing::info!(path = %path.display(), "opening container");
    let reader = ContainerReader::open(path)?;

    let params = HyperParams::resolve(reader.metadata())?;
    tracing::info!(
        block_count = params.block_count,
        embedding_length = params.embedding_length,
        vocab_size = params.vocab_size,
        "resolved hyperparameters"
    );

    let tokenizer = Tokenizer::from_metadata(reader.metadata())?;
    tracing::info!(vocab_size = tokenizer.vocab_size(), "loaded tokenizer");

    let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
    let materializer = Materializer::new(device.clone(), settings.validation_level.into());

    let model = ModelRecord::assemble(&reader, &materializer, params, settings.compute_precision.into())?;
    tracing::info!(layers = model.blocks.len(), "model assembled");

    Ok(LoadedModel {
        model,
        tokenizer,
        device,
    })
}
