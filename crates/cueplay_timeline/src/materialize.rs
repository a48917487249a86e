// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline materialization.
//!
//! Expands prepared play data into a nested tree of timeline nodes:
//!
//! ```text
//! group wrapper
//! └── section (absolute times, rebased on the wrapper start)
//!     └── part instance (offset within the section)
//!         └── objects (copied from the part, ids rewritten)
//! ```
//!
//! The same part can appear several times in one tree (loop laps, parallel
//! sections). Every appearance receives its own object ids; references
//! inside an appearance are rewritten to point at that appearance.

use crate::expression::Expression;
use crate::id::{LayerId, ObjectId};
use crate::object::{Enable, Keyframe, ObjContent, TimelineObj};
use crate::prepare::{PreparedPlayData, Section, SectionPart};
use crate::rundown::{Group, Part};
use crate::Time;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Extra objects to emit inside a part instance.
///
/// Receives the part and the id of its part-instance node.
pub type CustomPartContent<'a> = &'a dyn Fn(&Part, &str) -> Vec<TimelineObj>;

/// What a node represents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeKind {
    /// Group wrapper
    Group,
    /// Section of playback
    Section,
    /// One instance of a part
    Part,
    /// Device instruction
    Object {
        /// Device content
        content: ObjContent,
    },
}

/// A node of the materialized timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineNode {
    /// Unique id within the tree
    pub id: String,
    /// Output layer (objects only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<LayerId>,
    /// Timing relative to the parent
    pub enable: Enable,
    /// Node kind
    pub kind: NodeKind,
    /// Frozen elapsed offset (paused sections and their parts)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pause_time: Option<Time>,
    /// Child nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TimelineNode>,
    /// Keyframes (objects only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyframes: Vec<Keyframe>,
}

impl TimelineNode {
    fn wrapper(id: String, kind: NodeKind, enable: Enable) -> Self {
        Self {
            id,
            layer: None,
            enable,
            kind,
            pause_time: None,
            children: Vec::new(),
            keyframes: Vec::new(),
        }
    }

    fn from_object(obj: TimelineObj) -> Self {
        Self {
            id: obj.id.0,
            layer: Some(obj.layer),
            enable: obj.enable,
            kind: NodeKind::Object {
                content: obj.content,
            },
            pause_time: None,
            children: obj.children.into_iter().map(Self::from_object).collect(),
            keyframes: obj.keyframes,
        }
    }

    /// Depth-first iteration over this node and its descendants
    pub fn walk(&self) -> Box<dyn Iterator<Item = &TimelineNode> + '_> {
        Box::new(std::iter::once(self).chain(self.children.iter().flat_map(Self::walk)))
    }
}

/// Materialized timeline of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineTree {
    /// Absolute time the wrapper starts at; every section time is relative to it
    pub first_start: Time,
    /// Group wrapper node
    pub root: TimelineNode,
}

/// Hands out unique ids across one materialization
#[derive(Debug, Default)]
pub struct IdRewriter {
    counters: HashMap<String, usize>,
    used: HashSet<String>,
}

impl IdRewriter {
    /// Create an empty rewriter
    pub fn new() -> Self {
        Self::default()
    }

    /// Unique variant of `original`: the first call returns it unchanged,
    /// later calls return `original_1`, `original_2`, ...
    pub fn unique(&mut self, original: &str) -> String {
        let counter = self.counters.entry(original.to_string()).or_insert(0);
        loop {
            let candidate = if *counter == 0 {
                original.to_string()
            } else {
                format!("{original}_{counter}")
            };
            *counter += 1;
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
        }
    }

    /// Copy `objects` with fresh ids and references rewritten to the copies
    pub fn expand(&mut self, objects: &[TimelineObj]) -> Vec<TimelineObj> {
        let mut originals = Vec::new();
        for obj in objects {
            obj.collect_ids(&mut originals);
        }

        let mut map = HashMap::new();
        for id in originals {
            if !map.contains_key(&id) {
                let renamed = ObjectId(self.unique(id.as_str()));
                map.insert(id, renamed);
            }
        }

        objects
            .iter()
            .cloned()
            .map(|mut obj| {
                obj.rename(&map);
                obj
            })
            .collect()
    }
}

/// Materialize `prepared` for `group`.
///
/// Returns `None` when no section produces any content.
pub fn materialize(
    group: &Group,
    prepared: &PreparedPlayData,
    now: Time,
    custom_part_content: Option<CustomPartContent<'_>>,
) -> Option<TimelineTree> {
    let lists: Vec<(&str, &[Section])> = match prepared {
        PreparedPlayData::Single { sections } => vec![(group.id.as_str(), sections.as_slice())],
        PreparedPlayData::Multi { sections } => sections
            .iter()
            .map(|(part_id, list)| (part_id.as_str(), list.as_slice()))
            .collect(),
    };

    let first_start = lists
        .iter()
        .flat_map(|(_, sections)| sections.iter())
        .map(|s| effective_start(s, now))
        .min()?;

    let mut ids = IdRewriter::new();
    let root_id = ids.unique(&format!("group_{}", group.id));
    let mut children = Vec::new();
    for (owner, sections) in lists {
        for (index, section) in sections.iter().enumerate() {
            let section_id = ids.unique(&format!("section_{owner}_{index}"));
            if let Some(node) =
                section_node(section_id, section, now, first_start, &mut ids, custom_part_content)
            {
                children.push(node);
            }
        }
    }
    if children.is_empty() {
        return None;
    }

    let mut root = TimelineNode::wrapper(root_id, NodeKind::Group, Enable::at(0));
    root.enable.end = bounding_end(&children).map(Expression::from);
    root.children = children;

    Some(TimelineTree { first_start, root })
}

/// Start of a section as it plays out: paused sections are anchored so that
/// `now` lands on their frozen offset
fn effective_start(section: &Section, now: Time) -> Time {
    match section.pause_time {
        Some(frozen) => now - frozen,
        None => section.start_time,
    }
}

/// Latest end among sections (already rebased); `None` if any is unbounded
fn bounding_end(sections: &[TimelineNode]) -> Option<Time> {
    let mut latest: Time = 0;
    for section in sections {
        let end = section.enable.end.as_ref()?.as_number()? as Time;
        latest = latest.max(end);
    }
    Some(latest)
}

fn section_node(
    id: String,
    section: &Section,
    now: Time,
    first_start: Time,
    ids: &mut IdRewriter,
    custom: Option<CustomPartContent<'_>>,
) -> Option<TimelineNode> {
    let paused = section.is_paused();
    let start = effective_start(section, now) - first_start;

    let mut enable = Enable::at(start);
    if !paused {
        let mut end = section.end_time;
        if let Some(stop) = section.stop_time {
            end = Some(end.map_or(stop, |e| e.min(stop)));
        }
        enable.end = end.map(|e| Expression::from(e - first_start));
        if let Some(length) = section.loop_length() {
            enable.repeating = Some(Expression::from(length));
        }
    }

    let mut node = TimelineNode::wrapper(id, NodeKind::Section, enable);
    node.pause_time = section.pause_time;
    node.children = section
        .parts
        .iter()
        .filter_map(|entry| part_node(entry, section.pause_time, ids, custom))
        .collect();

    if node.children.is_empty() {
        return None;
    }
    Some(node)
}

fn part_node(
    entry: &SectionPart,
    pause_time: Option<Time>,
    ids: &mut IdRewriter,
    custom: Option<CustomPartContent<'_>>,
) -> Option<TimelineNode> {
    let id = ids.unique(&format!("part_{}", entry.part.id));

    let mut objects = entry.part.timeline.clone();
    if let Some(custom) = custom {
        objects.extend(custom(&entry.part, &id));
    }
    if objects.is_empty() {
        return None;
    }

    let mut enable = Enable::at(entry.start_time);
    if let Some(duration) = entry.duration {
        enable = enable.with_duration(duration);
    }
    if pause_time.is_some() {
        enable.freeze();
    }

    let mut node = TimelineNode::wrapper(id, NodeKind::Part, enable);
    node.pause_time = pause_time;
    node.children = ids
        .expand(&objects)
        .into_iter()
        .map(TimelineNode::from_object)
        .collect();
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::RefProperty;
    use crate::id::PartId;
    use crate::object::{ContentKind, DeviceType};
    use crate::prepare::prepare;
    use crate::rundown::PlayingPart;

    fn obj(id: &str, enable: Enable) -> TimelineObj {
        TimelineObj::new(
            LayerId::from("video"),
            ObjContent::new(DeviceType::CasparCG, ContentKind::Media),
        )
        .with_id(id)
        .with_enable(enable)
    }

    fn part_with_references(id: &str) -> Part {
        Part::new(id)
            .with_id(id)
            .with_object(obj("bg", Enable::at(0).with_duration(1000)))
            .with_object(obj(
                "fg",
                Enable::default()
                    .with_start(Expression::reference("bg", RefProperty::Start))
                    .with_end(Expression::reference("bg", RefProperty::End)),
            ))
    }

    fn section(parts: Vec<SectionPart>, start_time: Time, repeating: bool) -> Section {
        Section {
            start_time,
            end_time: if repeating { None } else { Some(start_time + 3000) },
            pause_time: None,
            stop_time: None,
            repeating,
            duration: Some(3000),
            from_schedule: false,
            parts,
        }
    }

    fn objects(tree: &TimelineTree) -> Vec<&TimelineNode> {
        tree.root
            .walk()
            .filter(|n| matches!(n.kind, NodeKind::Object { .. }))
            .collect()
    }

    #[test]
    fn test_repeated_part_gets_disjoint_ids() {
        let part = part_with_references("a");
        let laps: Vec<SectionPart> = (0..3)
            .map(|i| SectionPart {
                part: part.clone(),
                start_time: i * 1000,
                duration: Some(1000),
            })
            .collect();
        let prepared = PreparedPlayData::Single {
            sections: vec![section(laps, 10_000, true)],
        };
        let group = Group::new("G").with_id("g");

        let tree = materialize(&group, &prepared, 10_000, None).unwrap();

        let all_ids: Vec<&str> = tree.root.walk().map(|n| n.id.as_str()).collect();
        let unique: HashSet<&str> = all_ids.iter().copied().collect();
        assert_eq!(all_ids.len(), unique.len());

        let section = &tree.root.children[0];
        assert_eq!(section.children.len(), 3);
        for instance in &section.children {
            let own: HashSet<&str> = instance.children.iter().map(|n| n.id.as_str()).collect();
            let fg = &instance.children[1];
            for expr in fg.enable.expressions() {
                for reference in expr.references() {
                    assert!(own.contains(reference.object.as_str()));
                }
            }
        }
        assert_eq!(section.children[0].children[0].id, "bg");
        assert_eq!(section.children[1].children[0].id, "bg_1");
        assert_eq!(
            section.children[1].children[1].enable.start.as_ref().unwrap().to_string(),
            "#bg_1.start"
        );
        assert_eq!(section.children[2].children[1].id, "fg_2");
    }

    #[test]
    fn test_suffix_skips_taken_ids() {
        let mut ids = IdRewriter::new();
        assert_eq!(ids.unique("a_1"), "a_1");
        assert_eq!(ids.unique("a"), "a");
        assert_eq!(ids.unique("a"), "a_2");
    }

    #[test]
    fn test_times_are_rebased() {
        let mut group = Group::new("G").with_id("g");
        group.auto_play = true;
        group.insert_part(part_with_references("a"), None);
        group.insert_part(part_with_references("b"), None);
        group
            .playout
            .playing_parts
            .insert(PartId::from("a"), PlayingPart::playing(50_000));
        let prepared = prepare(&group, 50_000).unwrap();

        let tree = materialize(&group, &prepared, 50_000, None).unwrap();
        assert_eq!(tree.first_start, 50_000);
        assert_eq!(tree.root.id, "group_g");

        let section = &tree.root.children[0];
        assert_eq!(section.enable.start, Some(Expression::from(0_i64)));
        assert_eq!(section.enable.end, Some(Expression::from(2000_i64)));
        assert_eq!(tree.root.enable.end, Some(Expression::from(2000_i64)));

        let second = &section.children[1];
        assert_eq!(second.id, "part_b");
        assert_eq!(second.enable.start, Some(Expression::from(1000_i64)));
        assert_eq!(objects(&tree).len(), 4);
    }

    #[test]
    fn test_paused_drops_duration_and_repeat() {
        let mut group = Group::new("G").with_id("g");
        group.looping = true;
        group.insert_part(part_with_references("a"), None);
        group
            .playout
            .playing_parts
            .insert(PartId::from("a"), PlayingPart::paused(20_000, 250));
        let prepared = prepare(&group, 30_000).unwrap();

        let tree = materialize(&group, &prepared, 30_000, None).unwrap();
        assert_eq!(tree.first_start, 29_750);

        let section = &tree.root.children[0];
        assert_eq!(section.pause_time, Some(250));
        assert!(section.enable.repeating.is_none());
        assert!(section.enable.end.is_none());

        let part = &section.children[0];
        assert!(part.enable.duration.is_none());
        assert_eq!(part.pause_time, Some(250));
        assert!(tree.root.enable.end.is_none());
    }

    #[test]
    fn test_parallel_sections_and_custom_content() {
        let mut group = Group::new("G").with_id("g");
        group.one_at_a_time = false;
        group.insert_part(part_with_references("a"), None);
        group.insert_part(Part::new("empty").with_id("empty").with_duration(500), None);
        for id in ["a", "empty"] {
            group
                .playout
                .playing_parts
                .insert(PartId::from(id), PlayingPart::playing(0));
        }
        let prepared = prepare(&group, 0).unwrap();

        let without = materialize(&group, &prepared, 0, None).unwrap();
        assert_eq!(without.root.children.len(), 1);

        let extra = |part: &Part, parent: &str| {
            vec![obj(&format!("label_{}", part.id), Enable::at(0)).with_id(format!("{parent}_label"))]
        };
        let with = materialize(&group, &prepared, 0, Some(&extra)).unwrap();
        assert_eq!(with.root.children.len(), 2);
        assert!(with.root.walk().any(|n| n.id == "part_empty_label"));
    }

    #[test]
    fn test_nothing_to_play() {
        let group = Group::new("G");
        let prepared = PreparedPlayData::Single {
            sections: vec![section(Vec::new(), 0, false)],
        };
        assert_eq!(materialize(&group, &prepared, 0, None), None);
    }
}
