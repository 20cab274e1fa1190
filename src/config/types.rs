use std::path::PathBuf;

/// Top-level service configuration, assembled from CLI arguments in `main`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address to bind the HTTP server to
    pub host: String,
    /// Port to bind the HTTP server to
    pub port: u16,
    /// SQLite database file holding classified uploads
    pub db_path: PathBuf,
    /// Directory containing `visual.onnx`, `textual.onnx` and `tokenizer.json`
    pub model_dir: PathBuf,
    /// Directory served under `/static` (its `img/` subdirectory under `/img`)
    pub static_dir: PathBuf,
    /// Maximum accepted size of a single uploaded file, in bytes
    pub max_payload_size: usize,
    /// Directory for rolling log files. If None, logs only go to stdout
    pub log_dir: Option<String>,
    /// Log level for the service (trace/debug/info/warn/error)
    pub log_level: Option<String>,
    /// Use the deterministic mock classifier instead of the CLIP model.
    /// Useful for running the HTTP surface without model weights on disk.
    pub mock_model: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            db_path: PathBuf::from("categoreyes.db"),
            model_dir: PathBuf::from("models"),
            static_dir: PathBuf::from("static"),
            max_payload_size: 32 * 1024 * 1024,
            log_dir: None,
            log_level: None,
            mock_model: false,
        }
    }
}
