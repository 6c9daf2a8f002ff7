//! YAML persistence of controller configurations.
//!
//! Floats are stored as their IEEE-754 bit patterns so a reload is
//! bit-exact. Documents are versioned; only version 1 exists.

mod document;
mod parse;
mod store;

use thiserror::Error;

use padflow_control::ConfigError;

pub use parse::{parse_configuration, render_configuration};
pub use store::ConfigStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported version: {0}")]
    UnsupportedVersion(u8),
    #[error("invalid float in {field}: {value}")]
    BadFloat { field: &'static str, value: String },
    #[error("invalid fingerprint: {0}")]
    BadFingerprint(String),
    #[error("unknown control kind: {0}")]
    UnknownKind(String),
    #[error("document lists {found} controls, layout has {expected}")]
    ControlCount { expected: usize, found: usize },
    #[error("control #{index} is '{found}' in the document, '{expected}' in the layout")]
    ControlMismatch {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("environment variable not set: {0}")]
    EnvVarNotSet(String),
    #[error("path is not a directory: {0}")]
    PathIsNotDirectory(String),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
