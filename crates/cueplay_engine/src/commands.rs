// SPDX-License-Identifier: MIT OR Apache-2.0
//! Command surface of the engine.
//!
//! Every operation a client can invoke is a [`Command`] variant. On the wire
//! a command is `{"command": "<name>", "args": {...}}`.
//!
//! Undoable commands return an [`Inverse`]: plain data describing how to
//! revert them, so the ledger stays inspectable and serializable.

use cueplay_timeline::{
    Group, GroupId, GroupSettings, LayerId, ObjectId, Part, PartId, PartSettings, ResourceId,
    Rundown, RundownId, Time, TimelineObj,
};
use serde::{Deserialize, Serialize};

/// A named engine operation with its arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "command",
    content = "args",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum Command {
    /// Play a part from the start
    PlayPart {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Part
        part_id: PartId,
    },
    /// Freeze, resume or cue a part
    PausePart {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Part
        part_id: PartId,
        /// Offset to freeze or cue at, instead of the current one
        #[serde(default)]
        at: Option<Time>,
    },
    /// Stop a part (the whole group when solo)
    StopPart {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Part
        part_id: PartId,
    },
    /// Play a group from its first enabled part
    PlayGroup {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
    },
    /// Pause or resume everything playing in a group
    PauseGroup {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
    },
    /// Stop a group
    StopGroup {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
    },
    /// Play the part after the current one
    PlayNext {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
    },
    /// Play the part before the current one
    PlayPrev {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
    },
    /// Stop every group of every rundown
    StopAll,

    /// Create an empty rundown
    NewRundown {
        /// Id of the new rundown
        #[serde(default)]
        rundown_id: RundownId,
        /// Display name
        name: String,
    },
    /// Remove a rundown
    DeleteRundown {
        /// Rundown
        rundown_id: RundownId,
    },
    /// Add a part, wrapped in a new transparent group when no group is given
    NewPart {
        /// Rundown
        rundown_id: RundownId,
        /// Target group
        #[serde(default)]
        group_id: Option<GroupId>,
        /// Part to insert
        part: Part,
        /// Index in the group, or in the rundown for a new transparent group
        #[serde(default)]
        position: Option<usize>,
    },
    /// Add a group
    NewGroup {
        /// Rundown
        rundown_id: RundownId,
        /// Group to insert
        group: Group,
        /// Index in the rundown
        #[serde(default)]
        position: Option<usize>,
    },
    /// Remove a part
    DeletePart {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Part
        part_id: PartId,
    },
    /// Remove a group
    DeleteGroup {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
    },
    /// Change part settings
    UpdatePart {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Part
        part_id: PartId,
        /// New settings
        settings: PartSettings,
    },
    /// Change group settings
    UpdateGroup {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// New settings
        settings: GroupSettings,
    },
    /// Move parts into a group, or out into their own transparent groups
    MoveParts {
        /// Rundown
        rundown_id: RundownId,
        /// Parts to move, in order
        part_ids: Vec<PartId>,
        /// Destination group
        #[serde(default)]
        to_group_id: Option<GroupId>,
        /// Index in the destination group, or in the rundown
        #[serde(default)]
        position: Option<usize>,
    },
    /// Copy a part, placing the copy after the original
    DuplicatePart {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Part to copy
        part_id: PartId,
        /// Id of the copy
        #[serde(default)]
        new_part_id: PartId,
    },
    /// Add timeline objects to a part
    InsertTimelineObjs {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Part
        part_id: PartId,
        /// Objects to add
        objects: Vec<TimelineObj>,
    },
    /// Create timeline objects from project resources
    AddResourcesToPart {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Part
        part_id: PartId,
        /// Resources to add
        resource_ids: Vec<ResourceId>,
        /// Explicit layer; picked automatically when absent
        #[serde(default)]
        layer: Option<LayerId>,
    },
    /// Replace a timeline object
    UpdateTimelineObj {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Part
        part_id: PartId,
        /// New object; matched by id
        object: TimelineObj,
    },
    /// Remove a timeline object
    DeleteTimelineObj {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Part
        part_id: PartId,
        /// Object
        object_id: ObjectId,
    },

    /// Revert the last recorded command
    Undo,
    /// Re-apply the last reverted command
    Redo,
}

impl Command {
    /// Wire name of every command
    pub const NAMES: &'static [&'static str] = &[
        "play_part",
        "pause_part",
        "stop_part",
        "play_group",
        "pause_group",
        "stop_group",
        "play_next",
        "play_prev",
        "stop_all",
        "new_rundown",
        "delete_rundown",
        "new_part",
        "new_group",
        "delete_part",
        "delete_group",
        "update_part",
        "update_group",
        "move_parts",
        "duplicate_part",
        "insert_timeline_objs",
        "add_resources_to_part",
        "update_timeline_obj",
        "delete_timeline_obj",
        "undo",
        "redo",
    ];

    /// Rundown the command touches, if it targets a single one
    pub fn rundown_id(&self) -> Option<&RundownId> {
        match self {
            Self::PlayPart { rundown_id, .. }
            | Self::PausePart { rundown_id, .. }
            | Self::StopPart { rundown_id, .. }
            | Self::PlayGroup { rundown_id, .. }
            | Self::PauseGroup { rundown_id, .. }
            | Self::StopGroup { rundown_id, .. }
            | Self::PlayNext { rundown_id, .. }
            | Self::PlayPrev { rundown_id, .. }
            | Self::NewRundown { rundown_id, .. }
            | Self::DeleteRundown { rundown_id }
            | Self::NewPart { rundown_id, .. }
            | Self::NewGroup { rundown_id, .. }
            | Self::DeletePart { rundown_id, .. }
            | Self::DeleteGroup { rundown_id, .. }
            | Self::UpdatePart { rundown_id, .. }
            | Self::UpdateGroup { rundown_id, .. }
            | Self::MoveParts { rundown_id, .. }
            | Self::DuplicatePart { rundown_id, .. }
            | Self::InsertTimelineObjs { rundown_id, .. }
            | Self::AddResourcesToPart { rundown_id, .. }
            | Self::UpdateTimelineObj { rundown_id, .. }
            | Self::DeleteTimelineObj { rundown_id, .. } => Some(rundown_id),
            Self::StopAll | Self::Undo | Self::Redo => None,
        }
    }
}

/// Data needed to revert a recorded command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "inverse",
    content = "args",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum Inverse {
    /// Remove a created rundown
    RemoveRundown {
        /// Rundown
        rundown_id: RundownId,
    },
    /// Put back a deleted rundown
    RestoreRundown {
        /// Rundown as it was
        rundown: Rundown,
        /// Index in the project rundown list
        position: usize,
    },
    /// Put groups back as they were.
    ///
    /// Every group named by `snapshots` or `created` is removed first, then
    /// the snapshots are reinserted at their original indices.
    RestoreGroups {
        /// Rundown
        rundown_id: RundownId,
        /// (index, group) as they were before the command
        snapshots: Vec<(usize, Group)>,
        /// Groups the command created
        created: Vec<GroupId>,
    },
    /// Put back previous group settings
    RestoreGroupSettings {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Settings as they were
        settings: GroupSettings,
    },
    /// Put back previous part settings
    RestorePartSettings {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Part
        part_id: PartId,
        /// Settings as they were
        settings: PartSettings,
    },
    /// Put back a part's timeline
    RestoreTimeline {
        /// Rundown
        rundown_id: RundownId,
        /// Group
        group_id: GroupId,
        /// Part
        part_id: PartId,
        /// Objects as they were
        timeline: Vec<TimelineObj>,
    },
    /// Remove layers a command created
    RemoveMappings {
        /// Layers
        layer_ids: Vec<LayerId>,
    },
    /// Several inverses, applied in order
    Sequence(Vec<Inverse>),
}

/// Outcome of a command that had an effect
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    /// Value returned to the caller
    pub result: Option<serde_json::Value>,
    /// Human-readable description
    pub description: String,
    /// How to revert; `None` for commands outside the ledger
    pub undo: Option<Inverse>,
}

impl Applied {
    /// Effect that is not recorded in the ledger
    pub fn unrecorded(description: impl Into<String>) -> Self {
        Self {
            result: None,
            description: description.into(),
            undo: None,
        }
    }

    /// Effect recorded in the ledger
    pub fn recorded(description: impl Into<String>, undo: Inverse) -> Self {
        Self {
            result: None,
            description: description.into(),
            undo: Some(undo),
        }
    }

    /// Attach a result value
    pub fn with_result(mut self, result: serde_json::Value) -> Self {
        self.result = Some(result);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let command: Command = serde_json::from_value(json!({
            "command": "pause_part",
            "args": {"rundownId": "r", "groupId": "g", "partId": "p", "at": 250}
        }))
        .unwrap();
        assert_eq!(
            command,
            Command::PausePart {
                rundown_id: "r".into(),
                group_id: "g".into(),
                part_id: "p".into(),
                at: Some(250),
            }
        );
        assert_eq!(command.rundown_id().map(RundownId::as_str), Some("r"));

        let undo: Command = serde_json::from_value(json!({"command": "undo"})).unwrap();
        assert_eq!(undo, Command::Undo);
    }

    #[test]
    fn test_new_part_fills_defaults() {
        let command: Command = serde_json::from_value(json!({
            "command": "new_part",
            "args": {"rundownId": "r", "part": {"name": "Intro"}}
        }))
        .unwrap();
        let Command::NewPart { group_id, part, position, .. } = command else {
            panic!("wrong variant");
        };
        assert_eq!(group_id, None);
        assert_eq!(position, None);
        assert_eq!(part.name, "Intro");
        assert!(!part.id.as_str().is_empty());
    }

    #[test]
    fn test_names_cover_variants() {
        for name in Command::NAMES {
            let value = json!({"command": name, "args": {}});
            let err = serde_json::from_value::<Command>(value)
                .err()
                .map(|e| e.to_string())
                .unwrap_or_default();
            assert!(!err.contains("unknown variant"), "{name}: {err}");
        }
    }
}
