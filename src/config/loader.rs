//! Configuration loading from disk.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::config::options::CharmOptions;
use crate::config::schema::OperatorConfig;
use crate::config::validation::{validate_config, ValidationError};
use crate::error::Error;

/// Error type for agent configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate agent configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<OperatorConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: OperatorConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Load charm options from their YAML file.
///
/// A missing file means the platform has not written any option yet, which
/// is equivalent to every option holding its default.
pub fn load_options(path: &Path) -> Result<CharmOptions, Error> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = ?path, "Options file absent, using defaults");
            return Ok(CharmOptions::default());
        }
        Err(e) => return Err(e.into()),
    };

    CharmOptions::from_yaml(&content)
        .map_err(|e| Error::validation(format!("invalid options in {}: {}", path.display(), e)))
}
