// SPDX-License-Identifier: MIT OR Apache-2.0
//! Structural edits: rundowns, groups, parts and timeline objects.
//!
//! Every edit returns the inverse that restores the previous state. Edits
//! on locked groups or parts have no effect, except for changing the lock.

use crate::commands::{Applied, Inverse};
use crate::engine::{group_mut, part_mut, Engine};
use crate::error::{EngineError, Result};
use crate::layers::find_best_or_create_layer;
use crate::playout;
use cueplay_timeline::{
    Group, GroupId, GroupSettings, LayerId, ObjectId, Part, PartId, PartSettings, PlayingPart,
    ResourceId, Rundown, RundownId, TimelineObj,
};
use serde_json::json;
use std::collections::{HashMap, HashSet};

/// Fail if any id is already used in the rundown or repeated in `ids`
fn ensure_unique(rundown: &Rundown, ids: impl IntoIterator<Item = String>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if rundown.contains_id(&id) || !seen.insert(id.clone()) {
            return Err(EngineError::IdCollision(id));
        }
    }
    Ok(())
}

fn part_ids(part: &Part) -> impl Iterator<Item = String> + '_ {
    std::iter::once(part.id.0.clone()).chain(part.object_ids().into_iter().map(|id| id.0))
}

fn group_ids(group: &Group) -> impl Iterator<Item = String> + '_ {
    std::iter::once(group.id.0.clone()).chain(group.parts.iter().flat_map(part_ids))
}

fn object_ids(objects: &[TimelineObj]) -> impl Iterator<Item = String> + '_ {
    objects.iter().flat_map(TimelineObj::ids).map(|id| id.0)
}

fn group_index(rundown: &Rundown, group_id: &GroupId) -> Result<usize> {
    rundown
        .group_index(group_id)
        .ok_or_else(|| EngineError::GroupNotFound(group_id.clone()))
}

fn as_value(value: impl serde::Serialize) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(value)?)
}

impl Engine {
    pub(crate) fn new_rundown(&mut self, rundown_id: &RundownId, name: &str) -> Result<Option<Applied>> {
        if self.storage().rundown(rundown_id).is_ok() {
            return Err(EngineError::IdCollision(rundown_id.to_string()));
        }
        let mut rundown = Rundown::new(name);
        rundown.id = rundown_id.clone();

        let mut project = self.storage().project();
        project.rundowns.push(rundown_id.clone());
        self.update_project(project);
        self.commit_rundown(rundown);
        tracing::info!("Created rundown \"{name}\"");

        Ok(Some(
            Applied::recorded(
                format!("New rundown \"{name}\""),
                Inverse::RemoveRundown {
                    rundown_id: rundown_id.clone(),
                },
            )
            .with_result(as_value(rundown_id)?),
        ))
    }

    pub(crate) fn delete_rundown(&mut self, rundown_id: &RundownId) -> Result<Option<Applied>> {
        let (rundown, position) = self.remove_rundown(rundown_id)?;
        tracing::info!("Deleted rundown \"{}\"", rundown.name);
        Ok(Some(Applied::recorded(
            format!("Delete rundown \"{}\"", rundown.name),
            Inverse::RestoreRundown { rundown, position },
        )))
    }

    pub(crate) fn new_part(
        &mut self,
        rundown_id: &RundownId,
        group_id: Option<&GroupId>,
        part: &Part,
        position: Option<usize>,
    ) -> Result<Option<Applied>> {
        let mut rundown = self.storage().rundown(rundown_id)?;
        ensure_unique(&rundown, part_ids(part))?;

        let (group_id, undo) = match group_id {
            Some(group_id) => {
                let index = group_index(&rundown, group_id)?;
                let group = &mut rundown.groups[index];
                if group.locked {
                    return Ok(None);
                }
                let snapshot = group.clone();
                group.insert_part(part.clone(), position);
                (
                    group_id.clone(),
                    Inverse::RestoreGroups {
                        rundown_id: rundown_id.clone(),
                        snapshots: vec![(index, snapshot)],
                        created: Vec::new(),
                    },
                )
            }
            None => {
                let group = Group::transparent(part.clone());
                ensure_unique(&rundown, [group.id.0.clone()])?;
                let group_id = group.id.clone();
                let index = position.unwrap_or(rundown.groups.len()).min(rundown.groups.len());
                rundown.groups.insert(index, group);
                (
                    group_id.clone(),
                    Inverse::RestoreGroups {
                        rundown_id: rundown_id.clone(),
                        snapshots: Vec::new(),
                        created: vec![group_id],
                    },
                )
            }
        };

        self.commit_rundown(rundown);
        Ok(Some(
            Applied::recorded(format!("New part \"{}\"", part.name), undo)
                .with_result(json!({ "groupId": group_id, "partId": part.id })),
        ))
    }

    pub(crate) fn new_group(
        &mut self,
        rundown_id: &RundownId,
        group: &Group,
        position: Option<usize>,
    ) -> Result<Option<Applied>> {
        let mut rundown = self.storage().rundown(rundown_id)?;
        ensure_unique(&rundown, group_ids(group))?;

        let mut group = group.clone();
        group.prepared_play_data = None;
        if group.parts.len() > 1 {
            group.transparent = false;
        }
        let group_id = group.id.clone();
        let description = format!("New group \"{}\"", group.name);
        let index = position.unwrap_or(rundown.groups.len()).min(rundown.groups.len());
        rundown.groups.insert(index, group);

        self.commit_rundown(rundown);
        Ok(Some(
            Applied::recorded(
                description,
                Inverse::RestoreGroups {
                    rundown_id: rundown_id.clone(),
                    snapshots: Vec::new(),
                    created: vec![group_id.clone()],
                },
            )
            .with_result(as_value(&group_id)?),
        ))
    }

    pub(crate) fn delete_part(
        &mut self,
        rundown_id: &RundownId,
        group_id: &GroupId,
        part_id: &PartId,
    ) -> Result<Option<Applied>> {
        let mut rundown = self.storage().rundown(rundown_id)?;
        let index = group_index(&rundown, group_id)?;
        let group = &mut rundown.groups[index];
        let part = group
            .part(part_id)
            .ok_or_else(|| EngineError::PartNotFound(part_id.clone()))?;
        if part.locked || group.locked {
            return Ok(None);
        }
        let name = part.name.clone();
        let snapshot = group.clone();

        if group.is_part_playing(part_id) {
            playout::stop(group, part_id, self.now());
            self.refresh_group(rundown_id, group);
        }
        group.remove_part(part_id);
        if group.transparent && group.parts.is_empty() {
            let removed = rundown.groups.remove(index);
            self.flush_group(rundown_id, &removed);
        }

        self.commit_rundown(rundown);
        Ok(Some(Applied::recorded(
            format!("Delete part \"{name}\""),
            Inverse::RestoreGroups {
                rundown_id: rundown_id.clone(),
                snapshots: vec![(index, snapshot)],
                created: Vec::new(),
            },
        )))
    }

    pub(crate) fn delete_group(
        &mut self,
        rundown_id: &RundownId,
        group_id: &GroupId,
    ) -> Result<Option<Applied>> {
        let mut rundown = self.storage().rundown(rundown_id)?;
        let index = group_index(&rundown, group_id)?;
        if rundown.groups[index].locked {
            return Ok(None);
        }
        let removed = rundown.groups.remove(index);
        self.flush_group(rundown_id, &removed);

        self.commit_rundown(rundown);
        Ok(Some(Applied::recorded(
            format!("Delete group \"{}\"", removed.name),
            Inverse::RestoreGroups {
                rundown_id: rundown_id.clone(),
                snapshots: vec![(index, removed)],
                created: Vec::new(),
            },
        )))
    }

    pub(crate) fn update_part(
        &mut self,
        rundown_id: &RundownId,
        group_id: &GroupId,
        part_id: &PartId,
        settings: &PartSettings,
    ) -> Result<Option<Applied>> {
        let mut rundown = self.storage().rundown(rundown_id)?;
        let group = group_mut(&mut rundown, group_id)?;
        let group_locked = group.locked;
        let part = part_mut(group, part_id)?;

        let previous = part.settings();
        if previous == *settings {
            return Ok(None);
        }
        let toggles_lock_only = PartSettings {
            locked: previous.locked,
            ..settings.clone()
        } == previous;
        if (group_locked || part.locked) && !toggles_lock_only {
            return Ok(None);
        }
        part.apply_settings(settings.clone());

        self.commit_rundown(rundown);
        Ok(Some(Applied::recorded(
            format!("Update part \"{}\"", previous.name),
            Inverse::RestorePartSettings {
                rundown_id: rundown_id.clone(),
                group_id: group_id.clone(),
                part_id: part_id.clone(),
                settings: previous,
            },
        )))
    }

    pub(crate) fn update_group(
        &mut self,
        rundown_id: &RundownId,
        group_id: &GroupId,
        settings: &GroupSettings,
    ) -> Result<Option<Applied>> {
        let mut rundown = self.storage().rundown(rundown_id)?;
        let index = group_index(&rundown, group_id)?;
        let group = &mut rundown.groups[index];

        let previous = group.settings();
        if previous == *settings {
            return Ok(None);
        }
        let toggles_lock_only = GroupSettings {
            locked: previous.locked,
            ..settings.clone()
        } == previous;
        if group.locked && !toggles_lock_only {
            return Ok(None);
        }

        let snapshot = group.clone();
        group.apply_settings(settings.clone());

        // Becoming solo keeps only the most recently started intent
        let mut dropped_intents = false;
        if group.one_at_a_time && group.playout.active().count() > 1 {
            let latest = group
                .playout
                .active()
                .max_by_key(|(_, intent)| intent.start_time)
                .map(|(id, _)| id.clone());
            group
                .playout
                .playing_parts
                .retain(|id, intent| intent.is_stopped() || Some(id) == latest.as_ref());
            dropped_intents = true;
        }

        let undo = if dropped_intents {
            Inverse::RestoreGroups {
                rundown_id: rundown_id.clone(),
                snapshots: vec![(index, snapshot)],
                created: Vec::new(),
            }
        } else {
            Inverse::RestoreGroupSettings {
                rundown_id: rundown_id.clone(),
                group_id: group_id.clone(),
                settings: previous.clone(),
            }
        };

        self.commit_rundown(rundown);
        Ok(Some(Applied::recorded(
            format!("Update group \"{}\"", previous.name),
            undo,
        )))
    }

    pub(crate) fn move_parts(
        &mut self,
        rundown_id: &RundownId,
        part_ids: &[PartId],
        to_group_id: Option<&GroupId>,
        position: Option<usize>,
    ) -> Result<Option<Applied>> {
        if part_ids.is_empty() {
            return Ok(None);
        }
        let mut rundown = self.storage().rundown(rundown_id)?;

        let mut touched = Vec::new();
        for part_id in part_ids {
            let index = rundown
                .groups
                .iter()
                .position(|g| g.part(part_id).is_some())
                .ok_or_else(|| EngineError::PartNotFound(part_id.clone()))?;
            let group = &rundown.groups[index];
            if group.locked || group.part(part_id).is_some_and(|p| p.locked) {
                return Ok(None);
            }
            touched.push(index);
        }
        if let Some(target) = to_group_id {
            let index = group_index(&rundown, target)?;
            if rundown.groups[index].locked {
                return Ok(None);
            }
            touched.push(index);
        }
        touched.sort_unstable();
        touched.dedup();
        let snapshots: Vec<(usize, Group)> = touched
            .iter()
            .map(|&i| (i, rundown.groups[i].clone()))
            .collect();

        // Detach, keeping playing intents so playback carries over
        let mut moving: Vec<(Part, Option<PlayingPart>)> = Vec::new();
        for part_id in part_ids {
            let Some(group) = rundown.groups.iter_mut().find(|g| g.part(part_id).is_some()) else {
                return Err(EngineError::PartNotFound(part_id.clone()));
            };
            let intent = group.playout.playing_parts.get(part_id).copied();
            if let Some((_, part)) = group.remove_part(part_id) {
                moving.push((part, intent));
            }
        }
        let (emptied, kept): (Vec<Group>, Vec<Group>) = std::mem::take(&mut rundown.groups)
            .into_iter()
            .partition(|g| g.transparent && g.parts.is_empty() && Some(&g.id) != to_group_id);
        rundown.groups = kept;
        for group in &emptied {
            self.flush_group(rundown_id, group);
        }

        let mut created = Vec::new();
        match to_group_id {
            Some(target) => {
                let group = group_mut(&mut rundown, target)?;
                let mut at = position;
                for (part, intent) in moving {
                    let part_id = part.id.clone();
                    group.insert_part(part, at);
                    at = at.map(|i| i + 1);
                    if let Some(intent) = intent {
                        if group.one_at_a_time && !intent.is_stopped() {
                            group.playout.playing_parts.clear();
                        }
                        group.playout.playing_parts.insert(part_id, intent);
                    }
                }
            }
            None => {
                let mut at = position.unwrap_or(rundown.groups.len());
                for (part, intent) in moving {
                    let part_id = part.id.clone();
                    let mut group = Group::transparent(part);
                    if let Some(intent) = intent {
                        group.playout.playing_parts.insert(part_id, intent);
                    }
                    created.push(group.id.clone());
                    rundown.groups.insert(at.min(rundown.groups.len()), group);
                    at += 1;
                }
            }
        }

        self.commit_rundown(rundown);
        let description = match part_ids.len() {
            1 => "Move part".to_string(),
            n => format!("Move {n} parts"),
        };
        Ok(Some(Applied::recorded(
            description,
            Inverse::RestoreGroups {
                rundown_id: rundown_id.clone(),
                snapshots,
                created,
            },
        )))
    }

    pub(crate) fn duplicate_part(
        &mut self,
        rundown_id: &RundownId,
        group_id: &GroupId,
        part_id: &PartId,
        new_part_id: &PartId,
    ) -> Result<Option<Applied>> {
        let mut rundown = self.storage().rundown(rundown_id)?;
        let index = group_index(&rundown, group_id)?;
        let group = &rundown.groups[index];
        let part_index = group
            .part_index(part_id)
            .ok_or_else(|| EngineError::PartNotFound(part_id.clone()))?;
        if group.locked {
            return Ok(None);
        }

        let mut copy = group.parts[part_index].clone();
        copy.id = new_part_id.clone();
        let renamed: HashMap<ObjectId, ObjectId> = copy
            .object_ids()
            .into_iter()
            .map(|id| (id, ObjectId::new()))
            .collect();
        for obj in &mut copy.timeline {
            obj.rename(&renamed);
        }
        ensure_unique(&rundown, part_ids(&copy))?;
        let name = copy.name.clone();

        let undo = if group.transparent {
            let wrapper = Group::transparent(copy);
            let created = vec![wrapper.id.clone()];
            rundown.groups.insert(index + 1, wrapper);
            Inverse::RestoreGroups {
                rundown_id: rundown_id.clone(),
                snapshots: Vec::new(),
                created,
            }
        } else {
            let group = &mut rundown.groups[index];
            let snapshot = group.clone();
            group.insert_part(copy, Some(part_index + 1));
            Inverse::RestoreGroups {
                rundown_id: rundown_id.clone(),
                snapshots: vec![(index, snapshot)],
                created: Vec::new(),
            }
        };

        self.commit_rundown(rundown);
        Ok(Some(
            Applied::recorded(format!("Duplicate part \"{name}\""), undo)
                .with_result(as_value(new_part_id)?),
        ))
    }

    pub(crate) fn insert_timeline_objs(
        &mut self,
        rundown_id: &RundownId,
        group_id: &GroupId,
        part_id: &PartId,
        objects: &[TimelineObj],
    ) -> Result<Option<Applied>> {
        let mut rundown = self.storage().rundown(rundown_id)?;
        ensure_unique(&rundown, object_ids(objects))?;
        let applied = self
            .edit_timeline(&mut rundown, group_id, part_id, |timeline| {
                timeline.extend(objects.iter().cloned());
                Ok(!objects.is_empty())
            })?
            .map(|undo| {
                Applied::recorded(format!("Insert {} timeline objects", objects.len()), undo)
            });
        self.commit_edit(rundown, applied)
    }

    pub(crate) fn add_resources_to_part(
        &mut self,
        rundown_id: &RundownId,
        group_id: &GroupId,
        part_id: &PartId,
        resource_ids: &[ResourceId],
        layer: Option<&LayerId>,
    ) -> Result<Option<Applied>> {
        let mut rundown = self.storage().rundown(rundown_id)?;
        let mut project = self.storage().project();
        let batch = resource_ids.len() > 1;

        {
            let group = group_mut(&mut rundown, group_id)?;
            let group_locked = group.locked;
            if part_mut(group, part_id)?.locked || group_locked {
                return Ok(None);
            }
        }

        // Scoring sees the objects placed earlier in the batch
        let mut scratch = rundown.clone();
        let mut objects = Vec::new();
        let mut created_layers = Vec::new();
        for resource_id in resource_ids {
            let resource = self.storage().resource(resource_id)?;
            let layer_id = match layer {
                Some(layer_id) => {
                    let mapping = project
                        .mappings
                        .get(layer_id)
                        .ok_or_else(|| EngineError::LayerNotFound(layer_id.clone()))?;
                    if !mapping.is_compatible_with(&resource) {
                        if batch {
                            tracing::warn!("Skipping resource {resource_id}: incompatible with layer {layer_id}");
                            continue;
                        }
                        return Err(EngineError::IncompatibleLayer {
                            resource: resource_id.clone(),
                            layer: layer_id.clone(),
                        });
                    }
                    layer_id.clone()
                }
                None => {
                    let part = scratch
                        .group(group_id)
                        .and_then(|g| g.part(part_id))
                        .ok_or_else(|| EngineError::PartNotFound(part_id.clone()))?;
                    let choice = find_best_or_create_layer(
                        &project.mappings,
                        &scratch,
                        part,
                        &resource,
                        self.config().new_layer_step,
                    );
                    if let Some(mapping) = choice.created {
                        created_layers.push(mapping.id.clone());
                        project.mappings.insert(mapping.id.clone(), mapping);
                    }
                    choice.layer_id
                }
            };
            let obj = resource.to_timeline_obj(layer_id);
            part_mut(group_mut(&mut scratch, group_id)?, part_id)?
                .timeline
                .push(obj.clone());
            objects.push(obj);
        }
        if objects.is_empty() {
            return Ok(None);
        }

        let count = objects.len();
        let object_ids: Vec<ObjectId> = objects.iter().map(|o| o.id.clone()).collect();
        let Some(restore) = self.edit_timeline(&mut rundown, group_id, part_id, |timeline| {
            timeline.extend(objects);
            Ok(true)
        })?
        else {
            return Ok(None);
        };

        let undo = if created_layers.is_empty() {
            restore
        } else {
            self.update_project(project);
            Inverse::Sequence(vec![
                restore,
                Inverse::RemoveMappings {
                    layer_ids: created_layers,
                },
            ])
        };
        let applied = Applied::recorded(format!("Add {count} resources"), undo)
            .with_result(as_value(&object_ids)?);
        self.commit_edit(rundown, Some(applied))
    }

    pub(crate) fn update_timeline_obj(
        &mut self,
        rundown_id: &RundownId,
        group_id: &GroupId,
        part_id: &PartId,
        object: &TimelineObj,
    ) -> Result<Option<Applied>> {
        let mut rundown = self.storage().rundown(rundown_id)?;
        // New nested ids must not clash with anything but the object itself
        let own: HashSet<String> = rundown
            .group(group_id)
            .and_then(|g| g.part(part_id))
            .and_then(|p| p.object(&object.id))
            .map(|o| o.ids().into_iter().map(|id| id.0).collect())
            .unwrap_or_default();
        ensure_unique(
            &rundown,
            object_ids(std::slice::from_ref(object)).filter(|id| !own.contains(id)),
        )?;

        let applied = self
            .edit_timeline(&mut rundown, group_id, part_id, |timeline| {
                let slot = timeline
                    .iter_mut()
                    .find(|o| o.id == object.id)
                    .ok_or_else(|| EngineError::TimelineObjNotFound(object.id.clone()))?;
                if *slot == *object {
                    return Ok(false);
                }
                *slot = object.clone();
                Ok(true)
            })?
            .map(|undo| Applied::recorded("Update timeline object", undo));
        self.commit_edit(rundown, applied)
    }

    pub(crate) fn delete_timeline_obj(
        &mut self,
        rundown_id: &RundownId,
        group_id: &GroupId,
        part_id: &PartId,
        object_id: &ObjectId,
    ) -> Result<Option<Applied>> {
        let mut rundown = self.storage().rundown(rundown_id)?;
        let applied = self
            .edit_timeline(&mut rundown, group_id, part_id, |timeline| {
                let index = timeline
                    .iter()
                    .position(|o| &o.id == object_id)
                    .ok_or_else(|| EngineError::TimelineObjNotFound(object_id.clone()))?;
                timeline.remove(index);
                Ok(true)
            })?
            .map(|undo| Applied::recorded("Delete timeline object", undo));
        self.commit_edit(rundown, applied)
    }

    /// Run `change` on a part's timeline unless the part or its group is
    /// locked. Returns the inverse when `change` reports an effect.
    fn edit_timeline<F>(
        &self,
        rundown: &mut Rundown,
        group_id: &GroupId,
        part_id: &PartId,
        change: F,
    ) -> Result<Option<Inverse>>
    where
        F: FnOnce(&mut Vec<TimelineObj>) -> Result<bool>,
    {
        let rundown_id = rundown.id.clone();
        let group = group_mut(rundown, group_id)?;
        let group_locked = group.locked;
        let part = part_mut(group, part_id)?;
        if group_locked || part.locked {
            return Ok(None);
        }
        let previous = part.timeline.clone();
        if !change(&mut part.timeline)? {
            return Ok(None);
        }
        Ok(Some(Inverse::RestoreTimeline {
            rundown_id,
            group_id: group_id.clone(),
            part_id: part_id.clone(),
            timeline: previous,
        }))
    }

    fn commit_edit(&self, rundown: Rundown, applied: Option<Applied>) -> Result<Option<Applied>> {
        if applied.is_some() {
            self.commit_rundown(rundown);
        }
        Ok(applied)
    }
}
