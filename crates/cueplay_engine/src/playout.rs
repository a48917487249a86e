// SPDX-License-Identifier: MIT OR Apache-2.0
//! Play/pause/stop state machine over a group's playing intents.
//!
//! ```text
//! Stopped ──play──▶ Playing ──pause──▶ Paused ──pause──▶ Playing
//!    ▲                 │                  │
//!    └──────stop───────┴──────────────────┘
//! ```
//!
//! Pausing a part that is not playing cues it, frozen at the given offset.

use cueplay_timeline::{prepare, resolve_playhead, Group, GroupPlayhead, PartId, PlayingPart, Time};

/// Where the group's parts are at `now`, computed from its playing intents
pub fn current_playhead(group: &Group, now: Time) -> Option<GroupPlayhead> {
    resolve_playhead(now, prepare(group, now).as_ref())
}

/// Play `part_id` from the start. Solo groups drop every other intent first.
pub fn play(group: &mut Group, part_id: &PartId, now: Time) {
    if group.one_at_a_time {
        group.playout.playing_parts.clear();
    }
    group
        .playout
        .playing_parts
        .insert(part_id.clone(), PlayingPart::playing(now));
}

/// Freeze, resume or cue `part_id`.
///
/// `at` overrides the offset to freeze or cue at; it is ignored on resume.
pub fn pause(group: &mut Group, part_id: &PartId, now: Time, at: Option<Time>) {
    let playhead = current_playhead(group, now).and_then(|p| p.playheads.get(part_id).cloned());

    let intent = match playhead {
        // Resume from the frozen offset
        Some(playhead) if playhead.paused => PlayingPart::playing(now - playhead.offset),
        Some(playhead) => PlayingPart::paused(now, at.unwrap_or(playhead.offset)),
        None => PlayingPart::paused(now, at.unwrap_or(0)),
    };

    if group.one_at_a_time {
        group.playout.playing_parts.clear();
    }
    group.playout.playing_parts.insert(part_id.clone(), intent);
}

/// Stop `part_id`; in a solo group, stop everything.
///
/// A stop is recorded even for parts without an intent so that it overrides
/// a scheduled start.
pub fn stop(group: &mut Group, part_id: &PartId, now: Time) {
    if group.one_at_a_time {
        stop_all(group, now);
    }
    let entry = group
        .playout
        .playing_parts
        .entry(part_id.clone())
        .or_insert_with(|| PlayingPart::playing(now));
    if entry.stop_time.is_none() {
        entry.stop_time = Some(now);
    }
}

/// Stop every intent of the group
pub fn stop_all(group: &mut Group, now: Time) {
    for intent in group.playout.playing_parts.values_mut() {
        if intent.stop_time.is_none() {
            intent.stop_time = Some(now);
        }
    }
    // Overrides a scheduled start that already happened
    if group.schedule.as_ref().is_some_and(|s| s.last_start(now).is_some()) {
        if let Some(first) = first_enabled(group) {
            let marker = group
                .playout
                .playing_parts
                .entry(first)
                .or_insert_with(|| PlayingPart::playing(now));
            marker.stop_time = Some(now);
        }
    }
}

/// Play the group: the first enabled part when solo, every enabled part otherwise
pub fn play_group(group: &mut Group, now: Time) -> bool {
    if group.one_at_a_time {
        match first_enabled(group) {
            Some(first) => {
                play(group, &first, now);
                true
            }
            None => false,
        }
    } else {
        let enabled: Vec<PartId> = group
            .parts
            .iter()
            .filter(|p| !p.disabled)
            .map(|p| p.id.clone())
            .collect();
        for part_id in &enabled {
            play(group, part_id, now);
        }
        !enabled.is_empty()
    }
}

/// Pause or resume whatever is playing; cue the first part when nothing is
pub fn pause_group(group: &mut Group, now: Time) -> bool {
    let active: Vec<PartId> = current_playhead(group, now)
        .map(|p| p.playheads.into_keys().collect())
        .unwrap_or_default();

    if active.is_empty() {
        return match first_enabled(group) {
            Some(first) => {
                pause(group, &first, now, None);
                true
            }
            None => false,
        };
    }
    for part_id in &active {
        pause(group, part_id, now, None);
    }
    true
}

/// Part `step` positions away from the current one, skipping disabled parts
/// and wrapping around
pub fn step_part(group: &Group, now: Time, step: isize) -> Option<PartId> {
    let enabled: Vec<usize> = group
        .parts
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.disabled)
        .map(|(i, _)| i)
        .collect();
    if enabled.is_empty() {
        return None;
    }

    let current = current_part_index(group, now)
        .and_then(|index| enabled.iter().position(|&i| i == index));
    let len = enabled.len();
    let distance = step.unsigned_abs() % len;
    let target = match current {
        Some(pos) if step >= 0 => (pos + distance) % len,
        Some(pos) => (pos + len - distance) % len,
        None if step >= 0 => 0,
        None => len - 1,
    };
    Some(group.parts[enabled[target]].id.clone())
}

/// Index of the part playing now, else of the most recently started intent
fn current_part_index(group: &Group, now: Time) -> Option<usize> {
    let playing = current_playhead(group, now).and_then(|p| p.playheads.into_keys().next());
    let part_id = playing.or_else(|| {
        group
            .playout
            .active()
            .max_by_key(|(_, intent)| intent.start_time)
            .map(|(id, _)| id.clone())
    })?;
    group.part_index(&part_id)
}

fn first_enabled(group: &Group) -> Option<PartId> {
    group.parts.iter().find(|p| !p.disabled).map(|p| p.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cueplay_timeline::{Part, Repeat, Schedule};

    fn group(one_at_a_time: bool) -> Group {
        let mut group = Group::new("G");
        group.one_at_a_time = one_at_a_time;
        for (id, duration) in [("a", 1000), ("b", 2000), ("c", 3000)] {
            group.insert_part(Part::new(id).with_id(id).with_duration(duration), None);
        }
        group
    }

    fn not_stopped(group: &Group) -> usize {
        group
            .playout
            .playing_parts
            .values()
            .filter(|p| p.stop_time.is_none())
            .count()
    }

    #[test]
    fn test_solo_keeps_one_intent() {
        let mut g = group(true);
        play(&mut g, &"a".into(), 0);
        play(&mut g, &"b".into(), 10);
        pause(&mut g, &"c".into(), 20, None);
        pause(&mut g, &"a".into(), 30, Some(100));
        play(&mut g, &"b".into(), 40);
        assert_eq!(not_stopped(&g), 1);
        assert!(g.is_part_playing(&"b".into()));
    }

    #[test]
    fn test_pause_resume_round_trip() {
        let mut g = group(true);
        let part: PartId = "c".into();
        play(&mut g, &part, 1000);
        pause(&mut g, &part, 1600, None);

        let frozen = current_playhead(&g, 9000).unwrap();
        assert_eq!(frozen.playheads[&part].offset, 600);
        assert!(frozen.playheads[&part].paused);

        pause(&mut g, &part, 5000, None);
        assert_eq!(current_playhead(&g, 5000).unwrap().playheads[&part].offset, 600);
        assert_eq!(current_playhead(&g, 5100).unwrap().playheads[&part].offset, 700);
    }

    #[test]
    fn test_pause_cues_stopped_part() {
        let mut g = group(true);
        pause(&mut g, &"b".into(), 500, Some(250));
        let playhead = current_playhead(&g, 10_000).unwrap();
        assert_eq!(playhead.playheads[&PartId::from("b")].offset, 250);
        assert!(playhead.all_paused());
    }

    #[test]
    fn test_stop_solo_stops_group() {
        let mut g = group(true);
        play(&mut g, &"a".into(), 0);
        stop(&mut g, &"b".into(), 100);
        assert_eq!(not_stopped(&g), 0);
        assert!(current_playhead(&g, 100).is_none());
    }

    #[test]
    fn test_parallel_stop_targets_one_part() {
        let mut g = group(false);
        assert!(play_group(&mut g, 0));
        assert_eq!(not_stopped(&g), 3);

        stop(&mut g, &"b".into(), 100);
        let playhead = current_playhead(&g, 200).unwrap();
        assert_eq!(playhead.playheads.len(), 2);
        assert!(!playhead.playheads.contains_key(&PartId::from("b")));
    }

    #[test]
    fn test_stop_overrides_schedule() {
        let mut g = group(true);
        g.schedule = Some(Schedule {
            activate: true,
            start_time: Some(0),
            repeat: Repeat::Never,
        });
        assert!(current_playhead(&g, 100).is_some());

        stop_all(&mut g, 200);
        assert!(current_playhead(&g, 300).is_none());
    }

    #[test]
    fn test_step_wraps_and_skips_disabled() {
        let mut g = group(true);
        g.parts[1].disabled = true;

        assert_eq!(step_part(&g, 0, 1), Some("a".into()));
        assert_eq!(step_part(&g, 0, -1), Some("c".into()));

        play(&mut g, &"a".into(), 0);
        assert_eq!(step_part(&g, 10, 1), Some("c".into()));
        assert_eq!(step_part(&g, 10, -1), Some("c".into()));

        play(&mut g, &"c".into(), 20);
        assert_eq!(step_part(&g, 30, 1), Some("a".into()));
    }

    #[test]
    fn test_step_larger_than_group() {
        let mut g = group(true);
        play(&mut g, &"b".into(), 0);
        assert_eq!(step_part(&g, 10, 4), Some("c".into()));
        assert_eq!(step_part(&g, 10, -4), Some("a".into()));
        assert_eq!(step_part(&g, 10, 3), Some("b".into()));
    }

    #[test]
    fn test_pause_group_toggles() {
        let mut g = group(true);
        assert!(pause_group(&mut g, 0));
        assert!(current_playhead(&g, 50).unwrap().all_paused());

        assert!(pause_group(&mut g, 100));
        assert!(current_playhead(&g, 150).unwrap().any_playing());
    }
}
