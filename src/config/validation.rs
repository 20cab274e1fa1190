use super::types::AppConfig;
use super::{ConfigError, ConfigResult};

/// Model files that must be present in `model_dir` when the real
/// classifier is selected.
const MODEL_FILES: [&str; 3] = ["visual.onnx", "textual.onnx", "tokenizer.json"];

impl AppConfig {
    /// Validate the configuration before startup.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::ValidationFailed {
                reason: "host must not be empty".to_string(),
            });
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "port".to_string(),
                value: self.port.to_string(),
                reason: "port must be in range 1-65535".to_string(),
            });
        }

        if self.max_payload_size == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_payload_size".to_string(),
                value: "0".to_string(),
                reason: "payload limit must be positive".to_string(),
            });
        }

        if !self.mock_model {
            for file in MODEL_FILES {
                let path = self.model_dir.join(file);
                if !path.is_file() {
                    return Err(ConfigError::MissingFile {
                        path: path.display().to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock_config() -> AppConfig {
        AppConfig {
            mock_model: true,
            ..AppConfig::default()
        }
    }

    #[test]
    fn default_mock_config_is_valid() {
        assert!(mock_config().validate().is_ok());
    }

    #[test]
    fn empty_host_is_rejected() {
        let config = AppConfig {
            host: "  ".to_string(),
            ..mock_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn port_zero_is_rejected() {
        let config = AppConfig {
            port: 0,
            ..mock_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_model_files_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig {
            mock_model: false,
            model_dir: dir.path().to_path_buf(),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingFile { .. })
        ));
    }
}
