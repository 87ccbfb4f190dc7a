use std::io::{self, Write};

use anyhow::Result;
use clap::Args;
use gguf_infer::{EngineSettings, InferenceEngine};

use crate::load;
use crate::source;

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Path to a `.gguf` file, or a directory containing exactly one.
    #[arg(short, long)]
    pub model: String,

    /// Maximum number of tokens to generate per prompt.
    #[arg(long, default_value_t = 100)]
    pub max_tokens: usize,
}

pub fn run(args: RunArgs, settings: &EngineSettings) -> Result<()> {
    let model_path = source::resolve(&args.model)?;
    println!("Loading model from: {}", model_path.display());

    let loaded = load::load(&model_path, settings)?;
    let vocab_size = loaded.model.params.vocab_size;
    println!(
        "Model loaded: {} layers, vocab size {vocab_size}",
        loaded.model.blocks.len()
    );

    let device = loaded.device;
    let tokenizer = loaded.tokenizer;
    let mut engine = InferenceEngine::new(loaded.model, device)?;
    let mut max_tokens = args.max_tokens;

    loop {
        print!("\n> ");
        io::stdout().flush()?;

        let mut prompt = String::new();
        io::stdin().read_line(&mut prompt)?;
        let prompt = prompt.trim();

        if prompt.is_empty() {
            continue;
        }
        if prompt == "exit" || prompt == "quit" {
            break;
        }
        if prompt == "/reset" {
            engine.reset();
            println!("position reset to 0");
            continue;
        }
        if let Some(rest) = prompt.strip_prefix("/len ") {
            match rest.parse::<usize>() {
                Ok(v) => {
                    max_tokens = v;
                    println!("max tokens set to {max_tokens}");
                }
                Err(_) => println!("invalid length"),
            }
            continue;
        }

        let mut ids = tokenizer.encode(prompt);
        if ids.len() > settings.max_prompt_length {
            println!(
                "prompt truncated to the configured {}-token limit",
                settings.max_prompt_length
            );
            ids.truncate(settings.max_prompt_length);
        }
        println!("[generating]");

        let mut feed_failed = false;
        for &id in &ids {
            if let Err(e) = engine.forward(id) {
                println!("error feeding prompt token: {e}");
                feed_failed = true;
                break;
            }
        }
        if feed_failed {
            continue;
        }

        let mut last_id = *ids.last().unwrap_or(&0);
        for _ in 0..max_tokens {
            let logits = match engine.forward(last_id) {
                Ok(logits) => logits,
                Err(e) => {
                    println!("\ngeneration stopped: {e}");
                    break;
                }
            };
            last_id = argmax(&logits);
            print!("{}", tokenizer.decode(&[last_id]));
            io::stdout().flush()?;
        }
        println!();
    }

    Ok(())
}

fn argmax(logits: &[f32]) -> u32 {
    logits
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i as u32)
        .unwrap_or(0)
}
