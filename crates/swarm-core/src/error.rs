//! Core error types.

use swarm_beam::BeamError;
use thiserror::Error;

/// Errors from configuration, the handler registry, and swarm assembly.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("unknown handler: {0}")]
    UnknownHandler(String),

    #[error("invalid handler argument: {0}")]
    InvalidArgument(String),

    #[error("beam error: {0}")]
    Beam(#[from] BeamError),
}

pub type CoreResult<T> = Result<T, CoreError>;
