// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine error types.

use crate::history::HistoryError;
use cueplay_timeline::{GroupId, LayerId, ObjectId, PartId, ResourceId, RundownId};
use thiserror::Error;

/// Errors surfaced to command callers
#[derive(Debug, Error)]
pub enum EngineError {
    /// Rundown not in storage
    #[error("Rundown \"{0}\" not found")]
    RundownNotFound(RundownId),

    /// Group not in the rundown
    #[error("Group \"{0}\" not found")]
    GroupNotFound(GroupId),

    /// Part not in the group
    #[error("Part \"{0}\" not found")]
    PartNotFound(PartId),

    /// Timeline object not in the part
    #[error("Timeline object \"{0}\" not found")]
    TimelineObjNotFound(ObjectId),

    /// Resource not in the project
    #[error("Resource \"{0}\" not found")]
    ResourceNotFound(ResourceId),

    /// Layer not in the project mappings
    #[error("Layer \"{0}\" not found")]
    LayerNotFound(LayerId),

    /// Id already used somewhere in the rundown
    #[error("Id \"{0}\" is already in use")]
    IdCollision(String),

    /// Resource cannot be played on the layer
    #[error("Resource \"{resource}\" cannot be placed on layer \"{layer}\"")]
    IncompatibleLayer {
        /// Resource being inserted
        resource: ResourceId,
        /// Target layer
        layer: LayerId,
    },

    /// Undo ledger error
    #[error(transparent)]
    History(#[from] HistoryError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration could not be parsed or written
    #[error("Config error: {0}")]
    Config(String),

    /// File system error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
