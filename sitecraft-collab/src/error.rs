use thiserror::Error;

use crate::config::ConfigError;
use crate::protocol::ProtocolError;
use crate::transport::TransportError;

/// Errors surfaced by the collaboration layer.
///
/// Missing preconditions (no user, no open channel) are not errors; those
/// operations quietly do nothing.
#[derive(Debug, Error)]
pub enum CollabError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
