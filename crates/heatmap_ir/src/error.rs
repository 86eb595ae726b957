use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IrError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON module: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid YAML module: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("unsupported module format `{0}` (expected .json, .yaml or .yml)")]
    UnsupportedFormat(String),

    #[error("{kind} #{id} is referenced but not defined")]
    DanglingReference { kind: &'static str, id: u32 },
}
