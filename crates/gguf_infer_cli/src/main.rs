mod cli;
mod inference;
mod inspect;
mod load;
mod load_cmd;
mod source;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => gguf_infer::EngineSettings::from_file(path)?,
        None => gguf_infer::EngineSettings::default(),
    };

    let file_appender = tracing_appender::rolling::daily(&settings.log_directory, "gguf_infer.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false),
        )
        .init();

    std::panic::set_hook(Box::new(|panic_info| {
        let payload = panic_info.payload();
        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            *s
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.as_str()
        } else {
            "unknown panic"
        };
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::error!(target: "panic", "crash at {}: {}", location, msg);
        eprintln!("crash at {}: {}", location, msg);
    }));

    tracing::info!("gguf_infer_cli started");

    match cli.command {
        Commands::Load(args) => load_cmd::run(args, &settings)?,
        Commands::Run(args) => inference::run(args, &settings)?,
        Commands::Inspect(args) => inspect::run(args)?,
    }

    Ok(())
}
