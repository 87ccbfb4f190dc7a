use anyhow::Result;
use gguf_infer::EngineSettings;

use crate::cli::LoadArgs;
use crate::load;
use crate::source;

pub fn run(args: LoadArgs, settings: &EngineSettings) -> Result<()> {
    let model_path = source::resolve(&args.model)?;
    println!("Loading model from: {}", model_path.display());

    let loaded = load::load(&model_path, settings)?;
    println!(
        "Model loaded successfully: {} layers, embedding length {}, vocab size {}",
        loaded.model.blocks.len(),
        loaded.model.params.embedding_length,
        loaded.model.params.vocab_size
    );

    Ok(())
}
