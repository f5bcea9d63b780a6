//! Errors surfaced by the CLI before or around a tick.

use std::path::PathBuf;

use thiserror::Error;

use tickrun_core::ConfigError;
use tickrun_engine::EngineError;

/// CLI errors. All of them exit with status 2.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
