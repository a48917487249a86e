// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rundowns, groups and parts.

use crate::id::{GroupId, ObjectId, PartId, RundownId};
use crate::object::TimelineObj;
use crate::prepare::PreparedPlayData;
use crate::timing::resolve_part_timing;
use crate::Time;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Milliseconds per day
pub const DAY: Time = 24 * 60 * 60 * 1000;

/// An ordered list of groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rundown {
    /// Rundown id
    pub id: RundownId,
    /// Display name
    pub name: String,
    /// Groups in play order
    #[serde(default)]
    pub groups: Vec<Group>,
}

impl Rundown {
    /// Create an empty rundown
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: RundownId::new(),
            name: name.into(),
            groups: Vec::new(),
        }
    }

    /// Get a group
    pub fn group(&self, id: &GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| &g.id == id)
    }

    /// Get a mutable group
    pub fn group_mut(&mut self, id: &GroupId) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| &g.id == id)
    }

    /// Position of a group
    pub fn group_index(&self, id: &GroupId) -> Option<usize> {
        self.groups.iter().position(|g| &g.id == id)
    }

    /// Find the group that owns a part
    pub fn group_of_part(&self, part_id: &PartId) -> Option<&Group> {
        self.groups.iter().find(|g| g.part(part_id).is_some())
    }

    /// Every group, part and object id in the rundown
    pub fn all_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for group in &self.groups {
            ids.push(group.id.0.clone());
            for part in &group.parts {
                ids.push(part.id.0.clone());
                ids.extend(part.object_ids().into_iter().map(|id| id.0));
            }
        }
        ids
    }

    /// Whether `id` is used by any group, part or object
    pub fn contains_id(&self, id: &str) -> bool {
        self.groups.iter().any(|group| {
            group.id.as_str() == id
                || group.parts.iter().any(|part| {
                    part.id.as_str() == id || part.object_ids().iter().any(|o| o.as_str() == id)
                })
        })
    }

    /// Iterate over every object in the rundown, nested ones included
    pub fn objects(&self) -> impl Iterator<Item = &TimelineObj> {
        self.groups
            .iter()
            .flat_map(|g| g.parts.iter())
            .flat_map(|p| p.timeline.iter())
            .flat_map(flatten_obj)
    }
}

fn flatten_obj(obj: &TimelineObj) -> Box<dyn Iterator<Item = &TimelineObj> + '_> {
    Box::new(std::iter::once(obj).chain(obj.children.iter().flat_map(flatten_obj)))
}

/// Per-part playing intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayingPart {
    /// When playback started (epoch ms); shifted on resume so that
    /// `now - start_time` is the elapsed offset
    pub start_time: Time,
    /// Elapsed offset at which the part is frozen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_time: Option<Time>,
    /// When the part was stopped (epoch ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_time: Option<Time>,
    /// Started by the group schedule rather than by a user
    #[serde(default)]
    pub from_schedule: bool,
}

impl PlayingPart {
    /// Playing from `start_time`
    pub fn playing(start_time: Time) -> Self {
        Self {
            start_time,
            pause_time: None,
            stop_time: None,
            from_schedule: false,
        }
    }

    /// Cued and frozen at `offset`
    pub fn paused(now: Time, offset: Time) -> Self {
        Self {
            start_time: now - offset,
            pause_time: Some(offset),
            stop_time: None,
            from_schedule: false,
        }
    }

    /// Has a stop time
    pub fn is_stopped(&self) -> bool {
        self.stop_time.is_some()
    }

    /// Frozen and not stopped
    pub fn is_paused(&self) -> bool {
        self.pause_time.is_some() && self.stop_time.is_none()
    }

    /// Advancing and not stopped
    pub fn is_playing(&self) -> bool {
        self.pause_time.is_none() && self.stop_time.is_none()
    }
}

/// Playing intents of a group
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playout {
    /// Part id to playing intent
    #[serde(default)]
    pub playing_parts: IndexMap<PartId, PlayingPart>,
}

impl Playout {
    /// Entries that are not stopped
    pub fn active(&self) -> impl Iterator<Item = (&PartId, &PlayingPart)> {
        self.playing_parts.iter().filter(|(_, p)| !p.is_stopped())
    }

    /// Whether any entry is not stopped
    pub fn is_active(&self) -> bool {
        self.active().next().is_some()
    }
}

/// How a schedule repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Repeat {
    /// Start once
    #[default]
    Never,
    /// Start every `interval` milliseconds
    Interval {
        /// Interval in ms
        interval: Time,
    },
    /// Start every day at the same time
    Daily,
    /// Start every week at the same time
    Weekly,
}

impl Repeat {
    /// Repeat interval, if any
    pub fn interval(&self) -> Option<Time> {
        match self {
            Self::Never => None,
            Self::Interval { interval } => Some(*interval).filter(|i| *i > 0),
            Self::Daily => Some(DAY),
            Self::Weekly => Some(7 * DAY),
        }
    }
}

/// Time-of-day auto start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    /// Whether the schedule is armed
    pub activate: bool,
    /// First start (epoch ms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Time>,
    /// Repeat policy
    #[serde(default)]
    pub repeat: Repeat,
}

impl Schedule {
    /// Most recent scheduled start at or before `now`
    pub fn last_start(&self, now: Time) -> Option<Time> {
        if !self.activate {
            return None;
        }
        let start = self.start_time?;
        if now < start {
            return None;
        }
        match self.repeat.interval() {
            Some(interval) => Some(start + (now - start) / interval * interval),
            None => Some(start),
        }
    }

    /// Next scheduled start strictly after `now`
    pub fn next_start(&self, now: Time) -> Option<Time> {
        if !self.activate {
            return None;
        }
        let start = self.start_time?;
        if now < start {
            return Some(start);
        }
        let interval = self.repeat.interval()?;
        Some(start + ((now - start) / interval + 1) * interval)
    }
}

/// Editable group settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSettings {
    /// Display name
    pub name: String,
    /// Solo play policy
    pub one_at_a_time: bool,
    /// Loop
    #[serde(rename = "loop")]
    pub looping: bool,
    /// Auto-advance
    pub auto_play: bool,
    /// Disabled
    pub disabled: bool,
    /// Locked
    pub locked: bool,
    /// Schedule
    pub schedule: Option<Schedule>,
}

/// A sequencing container for parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Group id
    #[serde(default)]
    pub id: GroupId,
    /// Display name
    pub name: String,
    /// UI-only wrapper around a single ungrouped part
    #[serde(default)]
    pub transparent: bool,
    /// Solo play policy: at most one active part
    #[serde(default = "default_true")]
    pub one_at_a_time: bool,
    /// Wrap to the first part after the last one
    #[serde(default, rename = "loop")]
    pub looping: bool,
    /// Queue the next part when the current one ends
    #[serde(default)]
    pub auto_play: bool,
    /// Disabled groups never play
    #[serde(default)]
    pub disabled: bool,
    /// Locked groups reject edits
    #[serde(default)]
    pub locked: bool,
    /// Time-of-day auto start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<Schedule>,
    /// Parts in play order
    #[serde(default)]
    pub parts: Vec<Part>,
    /// Playing intents
    #[serde(default)]
    pub playout: Playout,
    /// Cached preparation output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prepared_play_data: Option<PreparedPlayData>,
}

fn default_true() -> bool {
    true
}

impl Group {
    /// Create an empty solo group
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: GroupId::new(),
            name: name.into(),
            transparent: false,
            one_at_a_time: true,
            looping: false,
            auto_play: false,
            disabled: false,
            locked: false,
            schedule: None,
            parts: Vec::new(),
            playout: Playout::default(),
            prepared_play_data: None,
        }
    }

    /// Transparent wrapper around a single part
    pub fn transparent(part: Part) -> Self {
        let mut group = Self::new(part.name.clone());
        group.transparent = true;
        group.parts.push(part);
        group
    }

    /// Set the id
    pub fn with_id(mut self, id: impl Into<GroupId>) -> Self {
        self.id = id.into();
        self
    }

    /// Get a part
    pub fn part(&self, id: &PartId) -> Option<&Part> {
        self.parts.iter().find(|p| &p.id == id)
    }

    /// Get a mutable part
    pub fn part_mut(&mut self, id: &PartId) -> Option<&mut Part> {
        self.parts.iter_mut().find(|p| &p.id == id)
    }

    /// Position of a part
    pub fn part_index(&self, id: &PartId) -> Option<usize> {
        self.parts.iter().position(|p| &p.id == id)
    }

    /// Insert a part at `position` (appends when `None` or out of range).
    ///
    /// A second part turns a transparent group into a regular one.
    pub fn insert_part(&mut self, part: Part, position: Option<usize>) {
        let index = position.unwrap_or(self.parts.len()).min(self.parts.len());
        self.parts.insert(index, part);
        if self.parts.len() > 1 {
            self.transparent = false;
        }
    }

    /// Remove a part and its playing intent
    pub fn remove_part(&mut self, id: &PartId) -> Option<(usize, Part)> {
        let index = self.part_index(id)?;
        self.playout.playing_parts.shift_remove(id);
        Some((index, self.parts.remove(index)))
    }

    /// Whether any part is playing or paused
    pub fn is_playing(&self) -> bool {
        self.playout.is_active()
    }

    /// Whether the part has an active (not stopped) intent
    pub fn is_part_playing(&self, id: &PartId) -> bool {
        self.playout
            .playing_parts
            .get(id)
            .is_some_and(|p| !p.is_stopped())
    }

    /// Editable settings
    pub fn settings(&self) -> GroupSettings {
        GroupSettings {
            name: self.name.clone(),
            one_at_a_time: self.one_at_a_time,
            looping: self.looping,
            auto_play: self.auto_play,
            disabled: self.disabled,
            locked: self.locked,
            schedule: self.schedule.clone(),
        }
    }

    /// Overwrite editable settings
    pub fn apply_settings(&mut self, settings: GroupSettings) {
        self.name = settings.name;
        self.one_at_a_time = settings.one_at_a_time;
        self.looping = settings.looping;
        self.auto_play = settings.auto_play;
        self.disabled = settings.disabled;
        self.locked = settings.locked;
        self.schedule = settings.schedule;
    }
}

/// What a trigger does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerAction {
    /// Play the part
    Play,
    /// Stop the part
    Stop,
    /// Play if stopped, stop if playing
    PlayStop,
    /// Pause/resume
    Pause,
}

/// Binding of a key combination to a part action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    /// Action
    pub action: TriggerAction,
    /// Full key identifiers, all of which must be held
    pub keys: Vec<String>,
}

/// Editable part settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartSettings {
    /// Display name
    pub name: String,
    /// Disabled
    pub disabled: bool,
    /// Locked
    pub locked: bool,
    /// Loop
    #[serde(rename = "loop")]
    pub looping: bool,
    /// Explicit duration
    pub duration: Option<Time>,
    /// Trigger bindings
    pub triggers: Vec<Trigger>,
}

/// A cue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    /// Part id
    #[serde(default)]
    pub id: PartId,
    /// Display name
    pub name: String,
    /// Disabled parts are skipped
    #[serde(default)]
    pub disabled: bool,
    /// Locked parts reject edits
    #[serde(default)]
    pub locked: bool,
    /// Loop this part
    #[serde(default, rename = "loop")]
    pub looping: bool,
    /// Explicit duration overriding the resolved one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Time>,
    /// Timeline objects
    #[serde(default)]
    pub timeline: Vec<TimelineObj>,
    /// Trigger bindings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggers: Vec<Trigger>,
}

impl Part {
    /// Create an empty part
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PartId::new(),
            name: name.into(),
            disabled: false,
            locked: false,
            looping: false,
            duration: None,
            timeline: Vec::new(),
            triggers: Vec::new(),
        }
    }

    /// Set the id
    pub fn with_id(mut self, id: impl Into<PartId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set an explicit duration
    pub fn with_duration(mut self, duration: Time) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Add an object
    pub fn with_object(mut self, obj: TimelineObj) -> Self {
        self.timeline.push(obj);
        self
    }

    /// Resolved length; `None` means open-ended
    pub fn resolved_duration(&self) -> Option<Time> {
        resolve_part_timing(self).duration
    }

    /// Every object and keyframe id, nested included
    pub fn object_ids(&self) -> Vec<ObjectId> {
        let mut ids = Vec::new();
        for obj in &self.timeline {
            obj.collect_ids(&mut ids);
        }
        ids
    }

    /// Get a top-level object
    pub fn object(&self, id: &ObjectId) -> Option<&TimelineObj> {
        self.timeline.iter().find(|o| &o.id == id)
    }

    /// Position of a top-level object
    pub fn object_index(&self, id: &ObjectId) -> Option<usize> {
        self.timeline.iter().position(|o| &o.id == id)
    }

    /// Editable settings
    pub fn settings(&self) -> PartSettings {
        PartSettings {
            name: self.name.clone(),
            disabled: self.disabled,
            locked: self.locked,
            looping: self.looping,
            duration: self.duration,
            triggers: self.triggers.clone(),
        }
    }

    /// Overwrite editable settings
    pub fn apply_settings(&mut self, settings: PartSettings) {
        self.name = settings.name;
        self.disabled = settings.disabled;
        self.locked = settings.locked;
        self.looping = settings.looping;
        self.duration = settings.duration;
        self.triggers = settings.triggers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::LayerId;
    use crate::object::{ContentKind, DeviceType, ObjContent};

    #[test]
    fn test_second_part_clears_transparent() {
        let mut group = Group::transparent(Part::new("A"));
        assert!(group.transparent);
        assert_eq!(group.name, "A");

        group.insert_part(Part::new("B"), Some(0));
        assert!(!group.transparent);
        assert_eq!(group.parts[0].name, "B");
    }

    #[test]
    fn test_remove_part_drops_playout_entry() {
        let part = Part::new("A");
        let id = part.id.clone();
        let mut group = Group::new("G");
        group.insert_part(part, None);
        group.playout.playing_parts.insert(id.clone(), PlayingPart::playing(0));
        assert!(group.is_part_playing(&id));

        let (index, removed) = group.remove_part(&id).unwrap();
        assert_eq!(index, 0);
        assert_eq!(removed.id, id);
        assert!(!group.is_playing());
    }

    #[test]
    fn test_contains_id_sees_nested_objects() {
        let child = TimelineObj::new(
            LayerId::from("l"),
            ObjContent::new(DeviceType::Obs, ContentKind::Scene),
        )
        .with_id("nested");
        let obj = TimelineObj::new(
            LayerId::from("l"),
            ObjContent::new(DeviceType::Obs, ContentKind::Scene),
        )
        .with_id("outer")
        .with_child(child);
        let mut group = Group::new("G").with_id("g");
        group.insert_part(Part::new("A").with_id("p").with_object(obj), None);
        let mut rundown = Rundown::new("R");
        rundown.groups.push(group);

        for id in ["g", "p", "outer", "nested"] {
            assert!(rundown.contains_id(id), "{id}");
        }
        assert!(!rundown.contains_id("missing"));
        assert_eq!(rundown.objects().count(), 2);
    }

    #[test]
    fn test_schedule_starts() {
        let schedule = Schedule {
            activate: true,
            start_time: Some(1000),
            repeat: Repeat::Interval { interval: 500 },
        };
        assert_eq!(schedule.last_start(999), None);
        assert_eq!(schedule.last_start(1000), Some(1000));
        assert_eq!(schedule.last_start(2200), Some(2000));
        assert_eq!(schedule.next_start(2200), Some(2500));
        assert_eq!(schedule.next_start(0), Some(1000));

        let once = Schedule {
            repeat: Repeat::Never,
            ..schedule.clone()
        };
        assert_eq!(once.last_start(99_999), Some(1000));
        assert_eq!(once.next_start(99_999), None);

        let disarmed = Schedule {
            activate: false,
            ..schedule
        };
        assert_eq!(disarmed.last_start(2200), None);
    }

    #[test]
    fn test_group_serde_uses_loop_key() {
        let mut group = Group::new("G");
        group.looping = true;
        let json = serde_json::to_value(&group).unwrap();
        assert_eq!(json["loop"], true);
        assert_eq!(json["oneAtATime"], true);
    }
}
