mod app_config;
pub mod batch;
mod config;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, StockxCredentialConfig};
pub use batch::{BatchStatus, RecordSchema, RecordStatus, SourceType};
pub use config::{load_app_config, load_app_config_from_env};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown {kind}: \"{value}\"")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("illegal batch transition {from} -> {to}")]
    IllegalTransition { from: BatchStatus, to: BatchStatus },
}
