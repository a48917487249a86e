// SPDX-License-Identifier: MIT OR Apache-2.0
//! The command engine.
//!
//! [`Engine`] owns the undo ledger and talks to the outside world through
//! four seams: [`Storage`], [`Notifier`], [`DeviceOutput`] and [`Clock`].
//! Commands run to completion one at a time (`&mut self`), so the ledger
//! order is the invocation order.

use crate::clock::Clock;
use crate::commands::{Applied, Command, Inverse};
use crate::config::EngineConfig;
use crate::device::DeviceOutput;
use crate::error::{EngineError, Result};
use crate::history::{History, LedgerEntry};
use crate::notify::{AppData, Notifier};
use crate::playout;
use crate::storage::{Project, Storage};
use cueplay_timeline::{
    resolve_playhead, Group, GroupId, GroupPlayhead, Part, PartId, Rundown, RundownId, Time,
};
use std::collections::HashSet;
use std::sync::Arc;

/// Executes commands against stored rundowns
pub struct Engine {
    storage: Arc<dyn Storage>,
    notifier: Arc<dyn Notifier>,
    device: Arc<dyn DeviceOutput>,
    clock: Arc<dyn Clock>,
    history: History,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine over the given collaborators
    pub fn new(
        storage: Arc<dyn Storage>,
        notifier: Arc<dyn Notifier>,
        device: Arc<dyn DeviceOutput>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            storage,
            notifier,
            device,
            clock,
            history: History::with_max_depth(config.history_depth),
            config,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Undo ledger
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Storage collaborator
    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Current time
    pub fn now(&self) -> Time {
        self.clock.now()
    }

    /// Ledger state for clients
    pub fn app_data(&self) -> AppData {
        AppData {
            version: env!("CARGO_PKG_VERSION").to_string(),
            can_undo: self.history.can_undo(),
            can_redo: self.history.can_redo(),
            undo_description: self.history.undo_description().map(str::to_string),
            redo_description: self.history.redo_description().map(str::to_string),
        }
    }

    /// Run a command, recording it in the ledger when it is undoable.
    ///
    /// Returns the command's result value; `None` also for no-ops.
    pub fn execute(&mut self, command: Command) -> Result<Option<serde_json::Value>> {
        let Some(applied) = self.apply(&command)? else {
            tracing::debug!("Command had no effect");
            return Ok(None);
        };
        if let Some(undo) = applied.undo {
            tracing::debug!("Recorded \"{}\"", applied.description);
            self.history.commit(LedgerEntry {
                description: applied.description,
                command,
                undo,
            });
            self.notify_app_data();
        }
        Ok(applied.result)
    }

    /// Run a command without touching the ledger.
    ///
    /// `Ok(None)` means the command had no effect, e.g. because its target is
    /// locked. Locks only guard structural edits; locked groups and parts
    /// still play, pause and stop.
    pub fn apply(&mut self, command: &Command) -> Result<Option<Applied>> {
        match command {
            Command::PlayPart {
                rundown_id,
                group_id,
                part_id,
            } => self.playback(rundown_id, group_id, "Play part", |group, now| {
                require_part(group, part_id)?;
                playout::play(group, part_id, now);
                Ok(true)
            }),
            Command::PausePart {
                rundown_id,
                group_id,
                part_id,
                at,
            } => self.playback(rundown_id, group_id, "Pause part", |group, now| {
                require_part(group, part_id)?;
                playout::pause(group, part_id, now, *at);
                Ok(true)
            }),
            Command::StopPart {
                rundown_id,
                group_id,
                part_id,
            } => self.playback(rundown_id, group_id, "Stop part", |group, now| {
                require_part(group, part_id)?;
                playout::stop(group, part_id, now);
                Ok(true)
            }),
            Command::PlayGroup {
                rundown_id,
                group_id,
            } => self.playback(rundown_id, group_id, "Play group", |group, now| {
                Ok(playout::play_group(group, now))
            }),
            Command::PauseGroup {
                rundown_id,
                group_id,
            } => self.playback(rundown_id, group_id, "Pause group", |group, now| {
                Ok(playout::pause_group(group, now))
            }),
            Command::StopGroup {
                rundown_id,
                group_id,
            } => self.playback(rundown_id, group_id, "Stop group", |group, now| {
                playout::stop_all(group, now);
                Ok(true)
            }),
            Command::PlayNext {
                rundown_id,
                group_id,
            } => self.play_step(rundown_id, group_id, 1),
            Command::PlayPrev {
                rundown_id,
                group_id,
            } => self.play_step(rundown_id, group_id, -1),
            Command::StopAll => self.stop_everything(),

            Command::NewRundown { rundown_id, name } => self.new_rundown(rundown_id, name),
            Command::DeleteRundown { rundown_id } => self.delete_rundown(rundown_id),
            Command::NewPart {
                rundown_id,
                group_id,
                part,
                position,
            } => self.new_part(rundown_id, group_id.as_ref(), part, *position),
            Command::NewGroup {
                rundown_id,
                group,
                position,
            } => self.new_group(rundown_id, group, *position),
            Command::DeletePart {
                rundown_id,
                group_id,
                part_id,
            } => self.delete_part(rundown_id, group_id, part_id),
            Command::DeleteGroup {
                rundown_id,
                group_id,
            } => self.delete_group(rundown_id, group_id),
            Command::UpdatePart {
                rundown_id,
                group_id,
                part_id,
                settings,
            } => self.update_part(rundown_id, group_id, part_id, settings),
            Command::UpdateGroup {
                rundown_id,
                group_id,
                settings,
            } => self.update_group(rundown_id, group_id, settings),
            Command::MoveParts {
                rundown_id,
                part_ids,
                to_group_id,
                position,
            } => self.move_parts(rundown_id, part_ids, to_group_id.as_ref(), *position),
            Command::DuplicatePart {
                rundown_id,
                group_id,
                part_id,
                new_part_id,
            } => self.duplicate_part(rundown_id, group_id, part_id, new_part_id),
            Command::InsertTimelineObjs {
                rundown_id,
                group_id,
                part_id,
                objects,
            } => self.insert_timeline_objs(rundown_id, group_id, part_id, objects),
            Command::AddResourcesToPart {
                rundown_id,
                group_id,
                part_id,
                resource_ids,
                layer,
            } => self.add_resources_to_part(
                rundown_id,
                group_id,
                part_id,
                resource_ids,
                layer.as_ref(),
            ),
            Command::UpdateTimelineObj {
                rundown_id,
                group_id,
                part_id,
                object,
            } => self.update_timeline_obj(rundown_id, group_id, part_id, object),
            Command::DeleteTimelineObj {
                rundown_id,
                group_id,
                part_id,
                object_id,
            } => self.delete_timeline_obj(rundown_id, group_id, part_id, object_id),

            Command::Undo => {
                self.undo()?;
                Ok(Some(Applied::unrecorded("Undo")))
            }
            Command::Redo => {
                self.redo()?;
                Ok(Some(Applied::unrecorded("Redo")))
            }
        }
    }

    /// Revert the last recorded command.
    ///
    /// A failing inverse clears the whole ledger.
    pub fn undo(&mut self) -> Result<()> {
        let entry = self.history.peek_undo()?.clone();
        match self.revert(&entry.undo) {
            Ok(()) => {
                self.history.step_back()?;
                tracing::info!("Undo: {}", entry.description);
                self.notify_app_data();
                Ok(())
            }
            Err(err) => {
                tracing::error!("Undo of \"{}\" failed, clearing history: {err}", entry.description);
                self.history.clear();
                self.notify_app_data();
                Err(err)
            }
        }
    }

    /// Re-apply the last reverted command, storing its fresh inverse.
    ///
    /// A failing command clears the whole ledger.
    pub fn redo(&mut self) -> Result<()> {
        let entry = self.history.peek_redo()?.clone();
        match self.apply(&entry.command) {
            Ok(Some(Applied {
                undo: Some(undo), ..
            })) => {
                self.history.step_forward(undo)?;
                tracing::info!("Redo: {}", entry.description);
            }
            Ok(_) => {
                tracing::warn!(
                    "Redo of \"{}\" had no effect, clearing history",
                    entry.description
                );
                self.history.clear();
            }
            Err(err) => {
                tracing::error!("Redo of \"{}\" failed, clearing history: {err}", entry.description);
                self.history.clear();
                self.notify_app_data();
                return Err(err);
            }
        }
        self.notify_app_data();
        Ok(())
    }

    /// Playheads of a group at the current time, from its cached prepared data
    pub fn playhead(&self, rundown_id: &RundownId, group_id: &GroupId) -> Result<Option<GroupPlayhead>> {
        let rundown = self.storage.rundown(rundown_id)?;
        let group = rundown
            .group(group_id)
            .ok_or_else(|| EngineError::GroupNotFound(group_id.clone()))?;
        Ok(resolve_playhead(self.now(), group.prepared_play_data.as_ref()))
    }

    /// Re-prepare groups whose schedule may have fired since the last
    /// mutation. Returns the number of groups whose prepared data changed.
    pub fn tick(&mut self) -> Result<usize> {
        let now = self.now();
        let mut changed = 0;
        for rundown_id in self.storage.project().rundowns {
            let rundown = self.storage.rundown(&rundown_id)?;
            let stale = rundown.groups.iter().any(|group| {
                group.schedule.as_ref().is_some_and(|s| s.activate)
                    && cueplay_timeline::prepare(group, now) != group.prepared_play_data
            });
            if stale {
                changed += 1;
                tracing::debug!("Schedule changed playout of rundown {rundown_id}");
                self.commit_rundown(rundown);
            }
        }
        Ok(changed)
    }

    fn revert(&mut self, inverse: &Inverse) -> Result<()> {
        match inverse {
            Inverse::RemoveRundown { rundown_id } => {
                self.remove_rundown(rundown_id)?;
            }
            Inverse::RestoreRundown { rundown, position } => {
                let mut project = self.storage.project();
                if !project.rundowns.contains(&rundown.id) {
                    let index = (*position).min(project.rundowns.len());
                    project.rundowns.insert(index, rundown.id.clone());
                }
                self.update_project(project);
                self.commit_rundown(rundown.clone());
            }
            Inverse::RestoreGroups {
                rundown_id,
                snapshots,
                created,
            } => {
                let mut rundown = self.storage.rundown(rundown_id)?;
                let replaced: HashSet<&GroupId> = snapshots
                    .iter()
                    .map(|(_, g)| &g.id)
                    .chain(created.iter())
                    .collect();
                for group in rundown.groups.iter().filter(|g| replaced.contains(&g.id)) {
                    self.flush_group(rundown_id, group);
                }
                rundown.groups.retain(|g| !replaced.contains(&g.id));

                let mut ordered: Vec<&(usize, Group)> = snapshots.iter().collect();
                ordered.sort_by_key(|(index, _)| *index);
                for (index, group) in ordered {
                    let index = (*index).min(rundown.groups.len());
                    rundown.groups.insert(index, group.clone());
                }
                self.commit_rundown(rundown);
            }
            Inverse::RestoreGroupSettings {
                rundown_id,
                group_id,
                settings,
            } => {
                let mut rundown = self.storage.rundown(rundown_id)?;
                group_mut(&mut rundown, group_id)?.apply_settings(settings.clone());
                self.commit_rundown(rundown);
            }
            Inverse::RestorePartSettings {
                rundown_id,
                group_id,
                part_id,
                settings,
            } => {
                let mut rundown = self.storage.rundown(rundown_id)?;
                let group = group_mut(&mut rundown, group_id)?;
                part_mut(group, part_id)?.apply_settings(settings.clone());
                self.commit_rundown(rundown);
            }
            Inverse::RestoreTimeline {
                rundown_id,
                group_id,
                part_id,
                timeline,
            } => {
                let mut rundown = self.storage.rundown(rundown_id)?;
                let group = group_mut(&mut rundown, group_id)?;
                part_mut(group, part_id)?.timeline = timeline.clone();
                self.commit_rundown(rundown);
            }
            Inverse::RemoveMappings { layer_ids } => {
                let mut project = self.storage.project();
                for layer_id in layer_ids {
                    if project.mappings.shift_remove(layer_id).is_none() {
                        return Err(EngineError::LayerNotFound(layer_id.clone()));
                    }
                }
                self.update_project(project);
            }
            Inverse::Sequence(inverses) => {
                for inverse in inverses {
                    self.revert(inverse)?;
                }
            }
        }
        Ok(())
    }

    /// Apply a playback change to one group. Playback is not recorded.
    fn playback<F>(
        &mut self,
        rundown_id: &RundownId,
        group_id: &GroupId,
        description: &str,
        change: F,
    ) -> Result<Option<Applied>>
    where
        F: FnOnce(&mut Group, Time) -> Result<bool>,
    {
        let mut rundown = self.storage.rundown(rundown_id)?;
        let now = self.now();
        let group = group_mut(&mut rundown, group_id)?;
        if !change(group, now)? {
            return Ok(None);
        }
        tracing::debug!("{description} in group {group_id} at {now}");
        self.commit_rundown(rundown);
        Ok(Some(Applied::unrecorded(description)))
    }

    fn play_step(
        &mut self,
        rundown_id: &RundownId,
        group_id: &GroupId,
        step: isize,
    ) -> Result<Option<Applied>> {
        let description = if step > 0 { "Play next" } else { "Play previous" };
        self.playback(rundown_id, group_id, description, |group, now| {
            let Some(part_id) = playout::step_part(group, now, step) else {
                return Ok(false);
            };
            playout::play(group, &part_id, now);
            Ok(true)
        })
    }

    fn stop_everything(&mut self) -> Result<Option<Applied>> {
        let now = self.now();
        for rundown_id in self.storage.project().rundowns {
            let mut rundown = self.storage.rundown(&rundown_id)?;
            if !rundown.groups.iter().any(|g| g.is_playing() || g.schedule.is_some()) {
                continue;
            }
            for group in &mut rundown.groups {
                playout::stop_all(group, now);
            }
            self.commit_rundown(rundown);
        }
        tracing::info!("Stopped all playout");
        Ok(Some(Applied::unrecorded("Stop all")))
    }

    /// Remove a rundown from storage and the project, flushing its output.
    /// Returns the rundown and its former index in the project.
    pub(crate) fn remove_rundown(&mut self, rundown_id: &RundownId) -> Result<(Rundown, usize)> {
        let rundown = self.storage.rundown(rundown_id)?;
        for group in &rundown.groups {
            self.flush_group(rundown_id, group);
        }
        self.storage.remove_rundown(rundown_id);

        let mut project = self.storage.project();
        let position = project
            .rundowns
            .iter()
            .position(|id| id == rundown_id)
            .unwrap_or(project.rundowns.len());
        project.rundowns.retain(|id| id != rundown_id);
        self.update_project(project);
        self.notifier.rundown_removed(rundown_id);
        Ok((rundown, position))
    }

    /// Recompute prepared play data of every group, store and notify
    pub(crate) fn commit_rundown(&self, mut rundown: Rundown) {
        let now = self.now();
        for group in &mut rundown.groups {
            group.prepared_play_data = self.device.update_timeline(&rundown.id, group, now);
        }
        self.storage.update_rundown(rundown.clone());
        self.notifier.rundown_changed(&rundown);
        self.notifier.update_peripherals();
    }

    /// Recompute a single group's prepared play data in place
    pub(crate) fn refresh_group(&self, rundown_id: &RundownId, group: &mut Group) {
        group.prepared_play_data = self.device.update_timeline(rundown_id, group, self.now());
    }

    /// Tell the device output a group no longer plays
    pub(crate) fn flush_group(&self, rundown_id: &RundownId, group: &Group) {
        let mut silent = group.clone();
        silent.playout.playing_parts.clear();
        silent.schedule = None;
        self.device.update_timeline(rundown_id, &silent, self.now());
    }

    pub(crate) fn update_project(&self, project: Project) {
        self.storage.update_project(project.clone());
        self.notifier.project_changed(&project);
    }

    fn notify_app_data(&self) {
        self.notifier.app_data_changed(&self.app_data());
    }
}

/// Find a group or fail
pub(crate) fn group_mut<'a>(rundown: &'a mut Rundown, group_id: &GroupId) -> Result<&'a mut Group> {
    rundown
        .group_mut(group_id)
        .ok_or_else(|| EngineError::GroupNotFound(group_id.clone()))
}

/// Find a part or fail
pub(crate) fn part_mut<'a>(group: &'a mut Group, part_id: &PartId) -> Result<&'a mut Part> {
    group
        .part_mut(part_id)
        .ok_or_else(|| EngineError::PartNotFound(part_id.clone()))
}

fn require_part(group: &Group, part_id: &PartId) -> Result<()> {
    group
        .part(part_id)
        .map(|_| ())
        .ok_or_else(|| EngineError::PartNotFound(part_id.clone()))
}
