// SPDX-License-Identifier: MIT OR Apache-2.0
//! Playhead resolution.
//!
//! [`resolve_playhead`] is a pure function of `(now, prepared)` so it can be
//! polled every frame from a render loop.

use crate::id::PartId;
use crate::prepare::{PreparedPlayData, Section};
use crate::Time;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Where a part is right now
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Playhead {
    /// Playing part
    pub part_id: PartId,
    /// Elapsed time within the part
    pub offset: Time,
    /// Absolute time at which this pass of the part started
    pub part_start_time: Time,
    /// Absolute time at which the part ends; `None` when open-ended or paused
    pub part_end_time: Option<Time>,
    /// Resolved part length
    pub part_duration: Option<Time>,
    /// Frozen
    pub paused: bool,
    /// Started by the group schedule
    pub from_schedule: bool,
}

/// Playheads of a whole group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPlayhead {
    /// Part id to its playhead; at most one entry for solo groups
    pub playheads: IndexMap<PartId, Playhead>,
    /// End of the active section (solo groups)
    pub section_end_time: Option<Time>,
}

impl GroupPlayhead {
    /// Any part is advancing
    pub fn any_playing(&self) -> bool {
        self.playheads.values().any(|p| !p.paused)
    }

    /// Every part is frozen
    pub fn all_paused(&self) -> bool {
        self.playheads.values().all(|p| p.paused)
    }

    /// Time left in the active section
    pub fn time_to_end(&self, now: Time) -> Option<Time> {
        self.section_end_time.map(|end| (end - now).max(0))
    }
}

/// Resolve what is playing at `now`.
///
/// Returns `None` when nothing is playing.
pub fn resolve_playhead(now: Time, prepared: Option<&PreparedPlayData>) -> Option<GroupPlayhead> {
    match prepared? {
        PreparedPlayData::Single { sections } => {
            sections.iter().find_map(|section| {
                let playhead = resolve_section(now, section)?;
                Some(GroupPlayhead {
                    playheads: IndexMap::from([(playhead.part_id.clone(), playhead)]),
                    section_end_time: section.end_time,
                })
            })
        }
        PreparedPlayData::Multi { sections } => {
            let playheads: IndexMap<_, _> = sections
                .iter()
                .filter_map(|(part_id, list)| {
                    let playhead = list.iter().find_map(|s| resolve_section(now, s))?;
                    Some((part_id.clone(), playhead))
                })
                .collect();
            if playheads.is_empty() {
                return None;
            }
            Some(GroupPlayhead {
                playheads,
                section_end_time: None,
            })
        }
    }
}

/// Resolve a single section
pub fn resolve_section(now: Time, section: &Section) -> Option<Playhead> {
    if section.stop_time.is_some_and(|stop| now > stop) {
        return None;
    }

    let (elapsed, paused) = match section.pause_time {
        Some(frozen) => (frozen, true),
        None => {
            if now < section.start_time {
                return None;
            }
            let elapsed = now - section.start_time;
            match section.loop_length() {
                Some(length) => (elapsed.rem_euclid(length), false),
                None => {
                    if section.end_time.is_some_and(|end| now >= end) {
                        return None;
                    }
                    (elapsed, false)
                }
            }
        }
    };

    let entry = section
        .parts
        .iter()
        .rev()
        .find(|p| p.start_time <= elapsed)?;
    let offset = elapsed - entry.start_time;
    if !paused && entry.duration.is_some_and(|d| offset >= d) {
        return None;
    }

    let part_start_time = now - offset;
    Some(Playhead {
        part_id: entry.part.id.clone(),
        offset,
        part_start_time,
        part_end_time: if paused {
            None
        } else {
            entry.duration.map(|d| part_start_time + d)
        },
        part_duration: entry.duration,
        paused,
        from_schedule: section.from_schedule,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prepare::prepare;
    use crate::rundown::{Group, Part, PlayingPart};

    fn group(one_at_a_time: bool, auto_play: bool) -> Group {
        let mut group = Group::new("G");
        group.one_at_a_time = one_at_a_time;
        group.auto_play = auto_play;
        group.insert_part(Part::new("A").with_id("a").with_duration(1000), None);
        group.insert_part(Part::new("B").with_id("b").with_duration(2000), None);
        group
    }

    #[test]
    fn test_none_when_not_prepared() {
        assert_eq!(resolve_playhead(0, None), None);
    }

    #[test]
    fn test_auto_play_hands_over_to_next_part() {
        let mut g = group(true, true);
        g.playout
            .playing_parts
            .insert(PartId::from("a"), PlayingPart::playing(0));
        let prepared = prepare(&g, 0);

        let at_500 = resolve_playhead(500, prepared.as_ref()).unwrap();
        assert_eq!(at_500.playheads["a"].offset, 500);

        let at_1500 = resolve_playhead(1500, prepared.as_ref()).unwrap();
        let playhead = &at_1500.playheads["b"];
        assert_eq!(playhead.offset, 500);
        assert_eq!(playhead.part_start_time, 1000);
        assert_eq!(playhead.part_end_time, Some(3000));
        assert_eq!(at_1500.time_to_end(1500), Some(1500));

        assert_eq!(resolve_playhead(3000, prepared.as_ref()), None);
    }

    #[test]
    fn test_parallel_playheads_are_independent() {
        let mut g = group(false, false);
        g.playout
            .playing_parts
            .insert(PartId::from("a"), PlayingPart::playing(0));
        g.playout
            .playing_parts
            .insert(PartId::from("b"), PlayingPart::playing(0));
        let prepared = prepare(&g, 0);

        let both = resolve_playhead(700, prepared.as_ref()).unwrap();
        assert_eq!(both.playheads.len(), 2);
        assert_eq!(both.playheads["a"].offset, 700);
        assert_eq!(both.playheads["b"].offset, 700);

        let only_b = resolve_playhead(1500, prepared.as_ref()).unwrap();
        assert_eq!(only_b.playheads.len(), 1);
        assert!(only_b.playheads.contains_key("b"));
    }

    #[test]
    fn test_repeating_section_wraps() {
        let mut g = group(true, false);
        g.looping = true;
        g.playout
            .playing_parts
            .insert(PartId::from("a"), PlayingPart::playing(0));
        let prepared = prepare(&g, 0);

        let playhead = resolve_playhead(2250, prepared.as_ref()).unwrap();
        assert_eq!(playhead.playheads["a"].offset, 250);
        assert_eq!(playhead.playheads["a"].part_start_time, 2000);
    }

    #[test]
    fn test_paused_ignores_now() {
        let mut g = group(true, false);
        g.playout
            .playing_parts
            .insert(PartId::from("b"), PlayingPart::paused(1000, 400));
        let prepared = prepare(&g, 1000);

        for now in [1000, 5000, 100_000] {
            let playhead = resolve_playhead(now, prepared.as_ref()).unwrap();
            assert_eq!(playhead.playheads["b"].offset, 400);
            assert!(playhead.all_paused());
            assert!(!playhead.any_playing());
        }
    }

    #[test]
    fn test_stop_time_and_zero_length_loop() {
        let mut stopped = PlayingPart::playing(0);
        stopped.stop_time = Some(300);
        let mut g = group(true, false);
        g.playout.playing_parts.insert(PartId::from("a"), stopped);
        let prepared = prepare(&g, 100);
        assert!(resolve_playhead(300, prepared.as_ref()).is_some());
        assert_eq!(resolve_playhead(301, prepared.as_ref()), None);

        let section = Section {
            start_time: 0,
            end_time: None,
            pause_time: None,
            stop_time: None,
            repeating: true,
            duration: Some(0),
            from_schedule: false,
            parts: Vec::new(),
        };
        assert_eq!(resolve_section(50, &section), None);
    }

    #[test]
    fn test_open_ended_never_completes() {
        let mut g = Group::new("G");
        g.insert_part(
            Part::new("Open").with_id("open").with_object(crate::object::TimelineObj::new(
                crate::id::LayerId::from("l"),
                crate::object::ObjContent::new(
                    crate::object::DeviceType::Atem,
                    crate::object::ContentKind::Input,
                ),
            )),
            None,
        );
        g.playout
            .playing_parts
            .insert(PartId::from("open"), PlayingPart::playing(0));
        let prepared = prepare(&g, 0);
        let playhead = resolve_playhead(86_400_000, prepared.as_ref()).unwrap();
        assert_eq!(playhead.playheads["open"].offset, 86_400_000);
        assert_eq!(playhead.playheads["open"].part_end_time, None);
    }
}
