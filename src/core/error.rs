use thiserror::Error;

use crate::core::types::{NodeId, UnitId};

#[derive(Error, Debug)]
pub enum AiError {
    #[error("Unit not found: {0:?}")]
    UnitNotFound(UnitId),

    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeId),

    #[error("Node {0:?} is already allocated")]
    NodeAlreadyAllocated(NodeId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Personality error: {0}")]
    Personality(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, AiError>;
