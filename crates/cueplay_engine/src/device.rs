// SPDX-License-Identifier: MIT OR Apache-2.0
//! Device output seam.

use cueplay_timeline::{
    materialize, prepare, Group, GroupId, PreparedPlayData, RundownId, Time, TimelineTree,
};
use indexmap::IndexMap;
use parking_lot::RwLock;

/// Receives playout updates for delivery to devices
pub trait DeviceOutput: Send + Sync {
    /// Group playout changed; returns the prepared data to cache on the group
    fn update_timeline(
        &self,
        rundown_id: &RundownId,
        group: &Group,
        now: Time,
    ) -> Option<PreparedPlayData>;
}

/// Prepares and materializes group timelines, keeping the latest tree of
/// every playing group
#[derive(Debug, Default)]
pub struct TimelineOutput {
    timelines: RwLock<IndexMap<GroupId, (RundownId, TimelineTree)>>,
}

impl TimelineOutput {
    /// Create an empty output
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest tree of a group
    pub fn timeline(&self, group_id: &GroupId) -> Option<TimelineTree> {
        self.timelines.read().get(group_id).map(|(_, tree)| tree.clone())
    }

    /// Groups that currently have a timeline, with their rundown
    pub fn active_groups(&self) -> Vec<(RundownId, GroupId)> {
        self.timelines
            .read()
            .iter()
            .map(|(group_id, (rundown_id, _))| (rundown_id.clone(), group_id.clone()))
            .collect()
    }
}

impl DeviceOutput for TimelineOutput {
    fn update_timeline(
        &self,
        rundown_id: &RundownId,
        group: &Group,
        now: Time,
    ) -> Option<PreparedPlayData> {
        let prepared = prepare(group, now);
        let tree = prepared
            .as_ref()
            .and_then(|p| materialize(group, p, now, None));

        let mut timelines = self.timelines.write();
        match tree {
            Some(tree) => {
                tracing::debug!("Timeline of group {} updated", group.id);
                timelines.insert(group.id.clone(), (rundown_id.clone(), tree));
            }
            None => {
                if timelines.shift_remove(&group.id).is_some() {
                    tracing::debug!("Timeline of group {} cleared", group.id);
                }
            }
        }
        prepared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cueplay_timeline::{
        ContentKind, DeviceType, LayerId, ObjContent, Part, PartId, PlayingPart, TimelineObj,
    };

    #[test]
    fn test_caches_playing_groups_only() {
        let output = TimelineOutput::new();
        let rundown_id = RundownId::from("r");
        let mut group = Group::new("G").with_id("g");
        group.insert_part(
            Part::new("A").with_id("a").with_object(TimelineObj::new(
                LayerId::from("video"),
                ObjContent::new(DeviceType::CasparCG, ContentKind::Media),
            )),
            None,
        );

        assert_eq!(output.update_timeline(&rundown_id, &group, 0), None);
        assert!(output.timeline(&group.id).is_none());

        group
            .playout
            .playing_parts
            .insert(PartId::from("a"), PlayingPart::playing(100));
        assert!(output.update_timeline(&rundown_id, &group, 100).is_some());
        assert_eq!(output.timeline(&group.id).unwrap().first_start, 100);
        assert_eq!(output.active_groups(), vec![(rundown_id.clone(), group.id.clone())]);

        group.playout.playing_parts.clear();
        output.update_timeline(&rundown_id, &group, 200);
        assert!(output.active_groups().is_empty());
    }
}
