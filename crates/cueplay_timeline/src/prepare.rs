// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline preparation.
//!
//! Turns a group's playing intents and policy flags into sections of
//! playback. Solo groups get one chronological list of sections; parallel
//! groups get an independent list per playing part.

use crate::id::PartId;
use crate::rundown::{Group, Part, PlayingPart};
use crate::Time;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A part placed inside a section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionPart {
    /// Snapshot of the part
    pub part: Part,
    /// Offset from the section start
    pub start_time: Time,
    /// Resolved length; `None` when open-ended
    pub duration: Option<Time>,
}

/// A stretch of continuous playback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    /// Absolute start (epoch ms)
    pub start_time: Time,
    /// Absolute end; `None` when open-ended or repeating
    pub end_time: Option<Time>,
    /// Frozen elapsed offset
    pub pause_time: Option<Time>,
    /// Absolute stop time
    pub stop_time: Option<Time>,
    /// Repeats every `duration`
    pub repeating: bool,
    /// Length of one pass; `None` when open-ended
    pub duration: Option<Time>,
    /// Started by the group schedule
    pub from_schedule: bool,
    /// Parts in play order
    pub parts: Vec<SectionPart>,
}

impl Section {
    fn empty(start_time: Time, intent: &PlayingPart) -> Self {
        Self {
            start_time,
            end_time: None,
            pause_time: None,
            stop_time: intent.stop_time,
            repeating: false,
            duration: None,
            from_schedule: intent.from_schedule,
            parts: Vec::new(),
        }
    }

    /// Section playing one part once
    fn single(part: &Part, start_time: Time, intent: &PlayingPart) -> Self {
        let duration = part.resolved_duration();
        let mut section = Self::empty(start_time, intent);
        section.duration = duration;
        section.end_time = duration.map(|d| start_time + d);
        section.parts.push(SectionPart {
            part: part.clone(),
            start_time: 0,
            duration,
        });
        section
    }

    /// Section repeating one part forever
    fn looping(part: &Part, start_time: Time, intent: &PlayingPart) -> Self {
        let mut section = Self::single(part, start_time, intent);
        section.end_time = None;
        section.repeating = true;
        section
    }

    /// Section frozen at the intent's pause offset
    fn frozen(part: &Part, intent: &PlayingPart) -> Self {
        let mut section = Self::single(part, intent.start_time, intent);
        section.end_time = None;
        section.pause_time = intent.pause_time;
        section
    }

    /// Length of one repeat, if the section repeats with a usable length
    pub fn loop_length(&self) -> Option<Time> {
        if self.repeating {
            self.duration.filter(|d| *d > 0)
        } else {
            None
        }
    }

    /// Whether the section has frozen playback
    pub fn is_paused(&self) -> bool {
        self.pause_time.is_some()
    }

    fn close(mut self, length: Time) -> Option<Self> {
        if self.parts.is_empty() {
            return None;
        }
        self.duration = Some(length);
        self.end_time = Some(self.start_time + length);
        Some(self)
    }
}

/// Output of [`prepare`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PreparedPlayData {
    /// One chronological list of sections (solo groups)
    Single {
        /// Sections in time order
        sections: Vec<Section>,
    },
    /// One list per playing part (parallel groups)
    Multi {
        /// Part id to its sections
        sections: IndexMap<PartId, Vec<Section>>,
    },
}

impl PreparedPlayData {
    /// Iterate over every section
    pub fn sections(&self) -> Box<dyn Iterator<Item = &Section> + '_> {
        match self {
            Self::Single { sections } => Box::new(sections.iter()),
            Self::Multi { sections } => Box::new(sections.values().flatten()),
        }
    }
}

/// How a run of parts ended
enum Tail<'a> {
    /// Ran out of parts
    Finished,
    /// Hit an open-ended part, which stays the terminal part
    OpenEnded,
    /// Hit a looping part, which repeats forever
    Looping(&'a Part),
}

/// Lay enabled parts end to end from `start_time`
fn run_of_parts<'a>(
    parts: &'a [Part],
    start_time: Time,
    intent: &PlayingPart,
) -> (Option<Section>, Tail<'a>) {
    let mut section = Section::empty(start_time, intent);
    let mut offset = 0;

    for part in parts.iter().filter(|p| !p.disabled) {
        let duration = part.resolved_duration();
        if part.looping && duration.is_some_and(|d| d > 0) {
            return (section.close(offset), Tail::Looping(part));
        }
        section.parts.push(SectionPart {
            part: part.clone(),
            start_time: offset,
            duration,
        });
        match duration {
            Some(d) => offset += d,
            None => return (Some(section), Tail::OpenEnded),
        }
    }

    (section.close(offset), Tail::Finished)
}

/// Prepare playback of `group` as seen at `now`.
///
/// Never fails: entries that no longer make sense (part removed, part
/// disabled, stopped in the past) are ignored.
pub fn prepare(group: &Group, now: Time) -> Option<PreparedPlayData> {
    if group.disabled {
        return None;
    }

    let mut intents = relevant_intents(group, now);
    if let Some(scheduled) = scheduled_intent(group, now) {
        intents.push(scheduled);
    }
    if intents.is_empty() {
        return None;
    }

    if group.one_at_a_time {
        prepare_single(group, &intents)
    } else {
        prepare_multi(group, &intents)
    }
}

/// Playing intents worth preparing, as (part index, intent), in part order
fn relevant_intents(group: &Group, now: Time) -> Vec<(usize, PlayingPart)> {
    let mut intents: Vec<_> = group
        .playout
        .playing_parts
        .iter()
        .filter(|(_, intent)| intent.stop_time.map_or(true, |stop| stop > now))
        .filter_map(|(part_id, intent)| {
            let index = group.part_index(part_id)?;
            (!group.parts[index].disabled).then_some((index, *intent))
        })
        .collect();
    intents.sort_by_key(|(index, _)| *index);
    intents
}

/// Virtual play of the first part from the group schedule.
///
/// Any manual play or stop at or after the scheduled start overrides it.
fn scheduled_intent(group: &Group, now: Time) -> Option<(usize, PlayingPart)> {
    let start = group.schedule.as_ref()?.last_start(now)?;
    let overridden = group.playout.playing_parts.values().any(|intent| {
        intent.start_time >= start || intent.stop_time.is_some_and(|stop| stop >= start)
    });
    if overridden {
        return None;
    }
    let index = group.parts.iter().position(|p| !p.disabled)?;
    let mut intent = PlayingPart::playing(start);
    intent.from_schedule = true;
    Some((index, intent))
}

fn prepare_single(group: &Group, intents: &[(usize, PlayingPart)]) -> Option<PreparedPlayData> {
    // Latest start wins; later entries win ties
    let (index, intent) = intents
        .iter()
        .copied()
        .reduce(|best, next| if next.1.start_time >= best.1.start_time { next } else { best })?;
    let part = &group.parts[index];

    if intent.pause_time.is_some() {
        return Some(PreparedPlayData::Single {
            sections: vec![Section::frozen(part, &intent)],
        });
    }

    let start = intent.start_time;
    if !group.auto_play {
        let repeat = (part.looping || group.looping)
            && part.resolved_duration().is_some_and(|d| d > 0);
        let section = if repeat {
            Section::looping(part, start, &intent)
        } else {
            Section::single(part, start, &intent)
        };
        return Some(PreparedPlayData::Single {
            sections: vec![section],
        });
    }

    let mut sections = Vec::new();
    let (first, tail) = run_of_parts(&group.parts[index..], start, &intent);
    let mut cursor = first.as_ref().and_then(|s| s.end_time).unwrap_or(start);
    sections.extend(first);

    match tail {
        Tail::OpenEnded => {}
        Tail::Looping(part) => sections.push(Section::looping(part, cursor, &intent)),
        Tail::Finished if group.looping => {
            let (lap, lap_tail) = run_of_parts(&group.parts, cursor, &intent);
            match (lap, lap_tail) {
                (Some(mut lap), Tail::Finished) if lap.duration.is_some_and(|d| d > 0) => {
                    lap.end_time = None;
                    lap.repeating = true;
                    sections.push(lap);
                }
                (lap, lap_tail) => {
                    if let Some(lap) = lap {
                        cursor = lap.end_time.unwrap_or(cursor);
                        sections.push(lap);
                    }
                    if let Tail::Looping(part) = lap_tail {
                        sections.push(Section::looping(part, cursor, &intent));
                    }
                }
            }
        }
        Tail::Finished => {}
    }

    if sections.is_empty() {
        return None;
    }
    Some(PreparedPlayData::Single { sections })
}

fn prepare_multi(group: &Group, intents: &[(usize, PlayingPart)]) -> Option<PreparedPlayData> {
    let mut sections = IndexMap::new();
    for (index, intent) in intents {
        let part = &group.parts[*index];
        let section = if intent.pause_time.is_some() {
            Section::frozen(part, intent)
        } else if (part.looping || group.looping)
            && part.resolved_duration().is_some_and(|d| d > 0)
        {
            Section::looping(part, intent.start_time, intent)
        } else {
            Section::single(part, intent.start_time, intent)
        };
        sections.insert(part.id.clone(), vec![section]);
    }
    if sections.is_empty() {
        return None;
    }
    Some(PreparedPlayData::Multi { sections })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rundown::{Repeat, Schedule};

    fn group(durations: &[Option<Time>]) -> Group {
        let mut group = Group::new("G");
        for (i, duration) in durations.iter().enumerate() {
            let mut part = Part::new(format!("P{i}")).with_id(format!("p{i}"));
            part.duration = *duration;
            if duration.is_none() {
                // An object without an end keeps the part open-ended
                part.timeline.push(crate::object::TimelineObj::new(
                    crate::id::LayerId::from("l"),
                    crate::object::ObjContent::new(
                        crate::object::DeviceType::Obs,
                        crate::object::ContentKind::Scene,
                    ),
                ));
            }
            group.insert_part(part, None);
        }
        group
    }

    fn play(group: &mut Group, part: &str, at: Time) {
        group
            .playout
            .playing_parts
            .insert(PartId::from(part), PlayingPart::playing(at));
    }

    fn single(data: Option<PreparedPlayData>) -> Vec<Section> {
        match data {
            Some(PreparedPlayData::Single { sections }) => sections,
            other => panic!("expected single, got {other:?}"),
        }
    }

    fn layout(section: &Section) -> Vec<(String, Time)> {
        section
            .parts
            .iter()
            .map(|p| (p.part.id.to_string(), p.start_time))
            .collect()
    }

    #[test]
    fn test_not_playing() {
        let group = group(&[Some(1000)]);
        assert_eq!(prepare(&group, 0), None);
    }

    #[test]
    fn test_auto_play_sequence() {
        let mut g = group(&[Some(1000), Some(2000)]);
        g.auto_play = true;
        play(&mut g, "p0", 0);

        let sections = single(prepare(&g, 0));
        assert_eq!(sections.len(), 1);
        assert_eq!(layout(&sections[0]), vec![("p0".into(), 0), ("p1".into(), 1000)]);
        assert_eq!(sections[0].start_time, 0);
        assert_eq!(sections[0].end_time, Some(3000));
    }

    #[test]
    fn test_auto_play_stops_at_open_ended_part() {
        let mut g = group(&[Some(1000), None, Some(500)]);
        g.auto_play = true;
        g.looping = true;
        play(&mut g, "p0", 100);

        let sections = single(prepare(&g, 100));
        assert_eq!(sections.len(), 1);
        assert_eq!(layout(&sections[0]), vec![("p0".into(), 0), ("p1".into(), 1000)]);
        assert_eq!(sections[0].end_time, None);
    }

    #[test]
    fn test_auto_play_loop_adds_repeating_lap() {
        let mut g = group(&[Some(1000), Some(2000), Some(500)]);
        g.auto_play = true;
        g.looping = true;
        play(&mut g, "p1", 0);

        let sections = single(prepare(&g, 0));
        assert_eq!(sections.len(), 2);
        assert_eq!(layout(&sections[0]), vec![("p1".into(), 0), ("p2".into(), 2000)]);
        assert!(!sections[0].repeating);

        let lap = &sections[1];
        assert!(lap.repeating);
        assert_eq!(lap.start_time, 2500);
        assert_eq!(lap.duration, Some(3500));
        assert_eq!(lap.end_time, None);
        assert_eq!(lap.parts.len(), 3);
    }

    #[test]
    fn test_looping_part_without_auto_play() {
        let mut g = group(&[Some(1000), Some(2000)]);
        g.parts[0].looping = true;
        play(&mut g, "p0", 0);

        let sections = single(prepare(&g, 0));
        assert_eq!(sections.len(), 1);
        assert!(sections[0].repeating);
        assert_eq!(sections[0].loop_length(), Some(1000));
    }

    #[test]
    fn test_zero_length_loop_is_not_repeating() {
        let mut g = group(&[Some(0)]);
        g.looping = true;
        play(&mut g, "p0", 0);
        let sections = single(prepare(&g, 0));
        assert!(!sections[0].repeating);
    }

    #[test]
    fn test_paused_section_is_frozen() {
        let mut g = group(&[Some(1000), Some(2000)]);
        g.auto_play = true;
        g.playout
            .playing_parts
            .insert(PartId::from("p1"), PlayingPart::paused(5000, 300));

        let sections = single(prepare(&g, 9000));
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].pause_time, Some(300));
        assert_eq!(layout(&sections[0]), vec![("p1".into(), 0)]);
    }

    #[test]
    fn test_stale_entries_are_ignored() {
        let mut g = group(&[Some(1000)]);
        let mut stopped = PlayingPart::playing(0);
        stopped.stop_time = Some(500);
        g.playout.playing_parts.insert(PartId::from("p0"), stopped);
        g.playout
            .playing_parts
            .insert(PartId::from("gone"), PlayingPart::playing(0));
        assert_eq!(prepare(&g, 600), None);

        g.disabled = true;
        play(&mut g, "p0", 700);
        assert_eq!(prepare(&g, 800), None);
    }

    #[test]
    fn test_parallel_sections_per_part() {
        let mut g = group(&[Some(1000), Some(2000)]);
        g.one_at_a_time = false;
        play(&mut g, "p1", 0);
        play(&mut g, "p0", 0);

        match prepare(&g, 0) {
            Some(PreparedPlayData::Multi { sections }) => {
                let keys: Vec<_> = sections.keys().map(|k| k.to_string()).collect();
                assert_eq!(keys, vec!["p0", "p1"]);
                assert_eq!(sections["p1"][0].end_time, Some(2000));
            }
            other => panic!("expected multi, got {other:?}"),
        }
    }

    #[test]
    fn test_schedule_starts_first_part() {
        let mut g = group(&[Some(1000), Some(1000)]);
        g.auto_play = true;
        g.schedule = Some(Schedule {
            activate: true,
            start_time: Some(10_000),
            repeat: Repeat::Never,
        });
        assert_eq!(prepare(&g, 9_000), None);

        let sections = single(prepare(&g, 10_500));
        assert!(sections[0].from_schedule);
        assert_eq!(sections[0].start_time, 10_000);

        // A manual stop after the scheduled start overrides it
        let mut stopped = PlayingPart::playing(10_000);
        stopped.stop_time = Some(10_600);
        g.playout.playing_parts.insert(PartId::from("p0"), stopped);
        assert_eq!(prepare(&g, 10_700), None);
    }

    #[test]
    fn test_idempotent() {
        let mut g = group(&[Some(1000), Some(2000), None]);
        g.auto_play = true;
        g.looping = true;
        play(&mut g, "p0", 42);
        assert_eq!(prepare(&g, 1234), prepare(&g, 1234));
    }
}
