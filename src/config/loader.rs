//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::SwiftConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<SwiftConfig, ConfigError> {
    let config: SwiftConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<SwiftConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_reports_every_validation_error() {
        let err = parse_config(
            r#"
            [[servers]]
            port = 7000
            [servers.mode]
            type = "reverse_proxy"
            backend_host = ""
            backend_port = 0
            "#,
        )
        .unwrap_err();

        match err {
            ConfigError::Validation(errors) => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("swift.toml");
        fs::write(
            &path,
            format!(
                "[[servers]]\nport = 8080\n[servers.mode]\ntype = \"static_files\"\ndocument_root = {:?}\n",
                dir.path().to_string_lossy()
            ),
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.servers[0].port, 8080);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/no/such/swift.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
