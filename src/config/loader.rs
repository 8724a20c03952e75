//! Loading and validating patch specs and terminology rule files.

use crate::config::schema::{PatchSpec, RulesFile, ValidationError};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path} as TOML: {source}")]
    Toml {
        path: PathBuf,
        source: toml_edit::de::Error,
    },

    #[error("invalid spec {path}:\n{source}")]
    Validation {
        path: PathBuf,
        source: ValidationError,
    },
}

/// Load a patch spec from a TOML string. The path is only used for error
/// context.
pub fn spec_from_str(input: &str, path: &Path) -> Result<PatchSpec, ConfigError> {
    let spec: PatchSpec = toml_edit::de::from_str(input).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    spec.validate().map_err(|source| ConfigError::Validation {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(spec)
}

pub fn spec_from_path(path: impl AsRef<Path>) -> Result<PatchSpec, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    spec_from_str(&contents, path)
}

/// Load an ordered substitution rule file from a TOML string.
pub fn rules_from_str(input: &str, path: &Path) -> Result<RulesFile, ConfigError> {
    let rules: RulesFile = toml_edit::de::from_str(input).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    rules.validate().map_err(|source| ConfigError::Validation {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(rules)
}

pub fn rules_from_path(path: impl AsRef<Path>) -> Result<RulesFile, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    rules_from_str(&contents, path)
}
