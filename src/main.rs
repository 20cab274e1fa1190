use std::path::PathBuf;

use clap::Parser;

use categoreyes::config::AppConfig;
use categoreyes::server;

#[derive(Parser, Debug)]
#[command(name = "categoreyes")]
#[command(version)]
#[command(about = "Zero-shot image categorization service")]
#[command(long_about = r#"
Accepts uploaded images over HTTP, classifies each into one of five fixed
categories (Human, Animal, Food, Document, Landscape) with a CLIP model
run as a zero-shot ranker, persists the re-encoded image and its category
to SQLite, and returns the per-category probability vector.
"#)]
struct CliArgs {
    /// Address to bind the HTTP server to
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind the HTTP server to
    #[arg(long, default_value_t = 8000)]
    port: u16,

    /// SQLite database file holding classified uploads
    #[arg(long, default_value = "categoreyes.db")]
    db_path: PathBuf,

    /// Directory containing visual.onnx, textual.onnx and tokenizer.json
    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    /// Directory served under /static (its img/ subdirectory under /img)
    #[arg(long, default_value = "static")]
    static_dir: PathBuf,

    /// Maximum accepted size of a single uploaded file, in bytes
    #[arg(long, default_value_t = 32 * 1024 * 1024)]
    max_payload_size: usize,

    /// Directory for rolling log files (stdout only when omitted)
    #[arg(long)]
    log_dir: Option<String>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Run with the deterministic mock classifier instead of CLIP
    #[arg(long, default_value_t = false)]
    mock_model: bool,
}

impl CliArgs {
    fn into_config(self) -> AppConfig {
        AppConfig {
            host: self.host,
            port: self.port,
            db_path: self.db_path,
            model_dir: self.model_dir,
            static_dir: self.static_dir,
            max_payload_size: self.max_payload_size,
            log_dir: self.log_dir,
            log_level: Some(self.log_level),
            mock_model: self.mock_model,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli_args = CliArgs::parse();

    println!("categoreyes starting...");
    println!("Host: {}:{}", cli_args.host, cli_args.port);
    println!(
        "Classifier: {}",
        if cli_args.mock_model { "mock" } else { "CLIP" }
    );

    let config = cli_args.into_config();
    config.validate()?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move { server::startup(config).await })?;

    Ok(())
}
