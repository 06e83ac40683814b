//! Error types for Baton

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using BatonError
pub type Result<T> = std::result::Result<T, BatonError>;

/// Main error type for configuration and workspace loading
#[derive(Debug, Error)]
pub enum BatonError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Workspace graph errors
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

/// Workspace graph errors
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// A package depends on a package that is not declared
    #[error("Package '{package}' depends on unknown package '{dependency}'")]
    UnknownDependency { package: String, dependency: String },

    /// Two packages share the same name
    #[error("Duplicate package name: {0}")]
    DuplicatePackage(String),

    /// Packages form a dependency cycle
    #[error("Circular package dependencies detected: {0}")]
    CyclicDependency(String),

    /// Package directory is missing
    #[error("Package '{name}' directory not found: {path}")]
    MissingDirectory { name: String, path: PathBuf },
}
