// SPDX-License-Identifier: MIT OR Apache-2.0
//! Automatic layer assignment for new timeline objects.

use cueplay_timeline::{LayerId, Mapping, Mappings, ObjContent, Part, Resource, Rundown};

/// Penalty for layers addressing a different channel/layer than the resource
const ADDRESSING_PENALTY: i64 = -1000;

/// Layer picked for a resource
#[derive(Debug, Clone, PartialEq)]
pub struct LayerChoice {
    /// Layer to place the object on
    pub layer_id: LayerId,
    /// Mapping to register, when no existing layer was good enough
    pub created: Option<Mapping>,
}

/// Pick the best existing layer for `resource` in `part`, or synthesize one.
///
/// Candidates target the resource's device, accept its content kind and are
/// not held by an open-ended object in the part. Each candidate scores one
/// point per matching content property (kind included) of every object
/// already on it anywhere in the rundown. The highest score wins, first in
/// id order on ties; nothing above zero means a new layer.
pub fn find_best_or_create_layer(
    mappings: &Mappings,
    rundown: &Rundown,
    part: &Part,
    resource: &Resource,
    new_layer_step: u32,
) -> LayerChoice {
    let content = resource.to_timeline_obj(LayerId::from("")).content;

    let mut candidates: Vec<&Mapping> = mappings
        .values()
        .filter(|m| m.is_compatible_with(resource))
        .filter(|m| !occupied_by_open_ended(part, &m.id))
        .collect();
    candidates.sort_by(|a, b| a.id.cmp(&b.id));

    let mut best: Option<(&Mapping, i64)> = None;
    for mapping in candidates {
        let score = score_layer(mapping, rundown, resource, &content);
        tracing::trace!("Layer {} scored {score} for {}", mapping.id, resource.id);
        if best.map_or(true, |(_, top)| score > top) {
            best = Some((mapping, score));
        }
    }

    if let Some((mapping, score)) = best {
        if score > 0 {
            return LayerChoice {
                layer_id: mapping.id.clone(),
                created: None,
            };
        }
    }

    let mapping = Mapping::for_resource(resource, next_layer_number(mappings, resource, new_layer_step));
    tracing::debug!("Created layer {} ({}) for {}", mapping.id, mapping.name, resource.id);
    LayerChoice {
        layer_id: mapping.id.clone(),
        created: Some(mapping),
    }
}

fn occupied_by_open_ended(part: &Part, layer: &LayerId) -> bool {
    part.timeline
        .iter()
        .any(|obj| &obj.layer == layer && obj.enable.is_open_ended())
}

fn score_layer(mapping: &Mapping, rundown: &Rundown, resource: &Resource, content: &ObjContent) -> i64 {
    let mut score: i64 = rundown
        .objects()
        .filter(|obj| obj.layer == mapping.id)
        .map(|obj| matching_properties(&obj.content, content))
        .sum();
    if mapping.addressing_mismatch(resource) {
        score += ADDRESSING_PENALTY;
    }
    score
}

fn matching_properties(existing: &ObjContent, new: &ObjContent) -> i64 {
    if existing.device_type != new.device_type {
        return 0;
    }
    let kind = i64::from(existing.kind == new.kind);
    let properties = new
        .properties
        .iter()
        .filter(|(key, value)| existing.properties.get(*key) == Some(*value))
        .count() as i64;
    kind + properties
}

/// Next free layer number on the resource's device
fn next_layer_number(mappings: &Mappings, resource: &Resource, step: u32) -> u32 {
    let highest = mappings
        .values()
        .filter(|m| m.device_id == resource.device_id)
        .filter_map(|m| m.layer)
        .max()
        .unwrap_or(0);
    highest + step.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cueplay_timeline::{ContentKind, DeviceType, Enable, Group};
    use serde_json::json;

    fn media(file: &str) -> Resource {
        let mut resource =
            Resource::new("caspar", DeviceType::CasparCG, ContentKind::Media, file).with_id(file);
        resource.properties.insert("format".into(), json!("1080i50"));
        resource
    }

    fn mappings() -> Mappings {
        [
            Mapping::new("a-empty", "Empty", "caspar", DeviceType::CasparCG)
                .accepting([ContentKind::Media]),
            Mapping::new("b-busy", "Busy", "caspar", DeviceType::CasparCG)
                .accepting([ContentKind::Media]),
            Mapping::new("c-audio", "Audio", "caspar", DeviceType::CasparCG)
                .accepting([ContentKind::Audio]),
        ]
        .into_iter()
        .map(|m| (m.id.clone(), m))
        .collect()
    }

    fn rundown_with(objects: &[(&str, Resource)]) -> Rundown {
        let mut part = Part::new("existing");
        for (layer, resource) in objects {
            part.timeline.push(
                resource
                    .to_timeline_obj(LayerId::from(*layer))
                    .with_enable(Enable::at(0).with_duration(1000)),
            );
        }
        let mut rundown = Rundown::new("Show");
        rundown.groups.push(Group::transparent(part));
        rundown
    }

    #[test]
    fn test_clusters_with_similar_content() {
        let rundown = rundown_with(&[("b-busy", media("one")), ("b-busy", media("two"))]);
        let choice = find_best_or_create_layer(
            &mappings(),
            &rundown,
            &Part::new("new"),
            &media("three"),
            10,
        );
        assert_eq!(choice.layer_id, LayerId::from("b-busy"));
        assert_eq!(choice.created, None);
    }

    #[test]
    fn test_ties_pick_first_by_id() {
        let rundown = rundown_with(&[("b-busy", media("one")), ("a-empty", media("two"))]);
        let choice =
            find_best_or_create_layer(&mappings(), &rundown, &Part::new("new"), &media("x"), 10);
        assert_eq!(choice.layer_id, LayerId::from("a-empty"));
    }

    #[test]
    fn test_skips_layers_held_open_ended() {
        let rundown = rundown_with(&[("b-busy", media("one"))]);
        let mut part = Part::new("new");
        part.timeline.push(media("loop").to_timeline_obj(LayerId::from("b-busy")));

        let choice = find_best_or_create_layer(&mappings(), &rundown, &part, &media("x"), 10);
        assert!(choice.created.is_some());
        assert_ne!(choice.layer_id, LayerId::from("b-busy"));
    }

    #[test]
    fn test_creates_layer_when_nothing_scores() {
        let mut mappings = mappings();
        mappings.insert(
            LayerId::from("d-numbered"),
            Mapping::new("d-numbered", "1-20", "caspar", DeviceType::CasparCG)
                .with_channel_layer(1, 20),
        );
        let choice = find_best_or_create_layer(
            &mappings,
            &Rundown::new("Empty"),
            &Part::new("new"),
            &media("x"),
            10,
        );
        let created = choice.created.unwrap();
        assert_eq!(created.id, choice.layer_id);
        assert_eq!(created.layer, Some(30));
        assert_eq!(created.channel, Some(1));
        assert!(created.is_compatible_with(&media("x")));
    }

    #[test]
    fn test_addressing_mismatch_is_penalized() {
        let mut mappings = Mappings::new();
        mappings.insert(
            LayerId::from("ch2"),
            Mapping::new("ch2", "2-10", "caspar", DeviceType::CasparCG).with_channel_layer(2, 10),
        );
        let rundown = rundown_with(&[("ch2", media("one")), ("ch2", media("two"))]);
        let resource = media("x").with_channel_layer(1, 10);

        let choice =
            find_best_or_create_layer(&mappings, &rundown, &Part::new("new"), &resource, 10);
        let created = choice.created.unwrap();
        assert_eq!((created.channel, created.layer), (Some(1), Some(10)));
    }
}
