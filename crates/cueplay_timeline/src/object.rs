// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timeline objects: device instructions bound to an output layer.

use crate::expression::Expression;
use crate::id::{LayerId, ObjectId, ResourceId};
use crate::Time;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Kind of playout device an object targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
    /// CasparCG graphics/video server
    CasparCG,
    /// Blackmagic ATEM switcher
    Atem,
    /// OBS Studio
    Obs,
    /// vMix
    Vmix,
    /// Generic OSC endpoint
    Osc,
    /// HTTP requests
    Http,
    /// HyperDeck recorder
    Hyperdeck,
    /// Device-less abstract layer
    Abstract,
}

impl DeviceType {
    /// Whether outputs on this device are addressed by channel and layer numbers
    pub fn is_channel_addressed(&self) -> bool {
        matches!(self, Self::CasparCG)
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::CasparCG => "CasparCG",
            Self::Atem => "ATEM",
            Self::Obs => "OBS",
            Self::Vmix => "vMix",
            Self::Osc => "OSC",
            Self::Http => "HTTP",
            Self::Hyperdeck => "HyperDeck",
            Self::Abstract => "Abstract",
        }
    }
}

/// What an object does on its device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentKind {
    /// Play a media file
    Media,
    /// Play a graphics template
    Template,
    /// Route a video input
    Input,
    /// Audio level or routing
    Audio,
    /// Switch scene
    Scene,
    /// Run a device macro
    Macro,
    /// Send a message (OSC/HTTP)
    Message,
}

/// Device content of a timeline object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjContent {
    /// Target device type
    pub device_type: DeviceType,
    /// Content kind
    pub kind: ContentKind,
    /// Device-specific properties (file name, template data, ...)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, serde_json::Value>,
}

impl ObjContent {
    /// Create content without properties
    pub fn new(device_type: DeviceType, kind: ContentKind) -> Self {
        Self {
            device_type,
            kind,
            properties: IndexMap::new(),
        }
    }

    /// Set a property
    pub fn with_property(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// When an object is active
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enable {
    /// Start time, relative to the parent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Expression>,
    /// End time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Expression>,
    /// Duration (used when `end` is absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Expression>,
    /// Repeat interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repeating: Option<Expression>,
}

impl Enable {
    /// Enable starting at a fixed time
    pub fn at(start: Time) -> Self {
        Self {
            start: Some(Expression::from(start)),
            ..Default::default()
        }
    }

    /// Set a fixed duration
    pub fn with_duration(mut self, duration: Time) -> Self {
        self.duration = Some(Expression::from(duration));
        self
    }

    /// Set an end expression
    pub fn with_end(mut self, end: Expression) -> Self {
        self.end = Some(end);
        self
    }

    /// Set a start expression
    pub fn with_start(mut self, start: Expression) -> Self {
        self.start = Some(start);
        self
    }

    /// Neither end nor duration is set, or the object repeats forever
    pub fn is_open_ended(&self) -> bool {
        (self.end.is_none() && self.duration.is_none()) || self.repeating.is_some()
    }

    /// Drop everything that makes the enable advance on its own
    pub fn freeze(&mut self) {
        self.end = None;
        self.duration = None;
        self.repeating = None;
    }

    /// Iterate over all expressions
    pub fn expressions_mut(&mut self) -> impl Iterator<Item = &mut Expression> {
        [
            self.start.as_mut(),
            self.end.as_mut(),
            self.duration.as_mut(),
            self.repeating.as_mut(),
        ]
        .into_iter()
        .flatten()
    }

    /// Iterate over all expressions
    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        [
            self.start.as_ref(),
            self.end.as_ref(),
            self.duration.as_ref(),
            self.repeating.as_ref(),
        ]
        .into_iter()
        .flatten()
    }

    /// Rewrite referenced ids
    pub fn rewrite_references(&mut self, map: &HashMap<ObjectId, ObjectId>) {
        for expr in self.expressions_mut() {
            expr.rewrite_references(map);
        }
    }
}

/// A keyframe changes some content properties during part of the object's life
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyframe {
    /// Keyframe id (shares the object id namespace)
    pub id: ObjectId,
    /// When the keyframe applies, relative to its object
    pub enable: Enable,
    /// Properties overridden while active
    #[serde(default)]
    pub properties: IndexMap<String, serde_json::Value>,
}

impl Keyframe {
    /// Create a keyframe
    pub fn new(enable: Enable) -> Self {
        Self {
            id: ObjectId::new(),
            enable,
            properties: IndexMap::new(),
        }
    }
}

/// A device-timeline instruction inside a part
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineObj {
    /// Object id, unique within the rundown
    pub id: ObjectId,
    /// Resource the object was created from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    /// Output layer
    pub layer: LayerId,
    /// Timing
    pub enable: Enable,
    /// Device content
    pub content: ObjContent,
    /// Nested objects, timed relative to this one
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TimelineObj>,
    /// Keyframes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keyframes: Vec<Keyframe>,
}

impl TimelineObj {
    /// Create an object starting at zero with no end
    pub fn new(layer: LayerId, content: ObjContent) -> Self {
        Self {
            id: ObjectId::new(),
            resource_id: None,
            layer,
            enable: Enable::at(0),
            content,
            children: Vec::new(),
            keyframes: Vec::new(),
        }
    }

    /// Set the id
    pub fn with_id(mut self, id: impl Into<ObjectId>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the enable
    pub fn with_enable(mut self, enable: Enable) -> Self {
        self.enable = enable;
        self
    }

    /// Add a nested object
    pub fn with_child(mut self, child: TimelineObj) -> Self {
        self.children.push(child);
        self
    }

    /// Add a keyframe
    pub fn with_keyframe(mut self, keyframe: Keyframe) -> Self {
        self.keyframes.push(keyframe);
        self
    }

    /// Collect this object's id and all nested object and keyframe ids
    pub fn collect_ids(&self, out: &mut Vec<ObjectId>) {
        out.push(self.id.clone());
        out.extend(self.keyframes.iter().map(|k| k.id.clone()));
        for child in &self.children {
            child.collect_ids(out);
        }
    }

    /// All ids owned by this object tree
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut out = Vec::new();
        self.collect_ids(&mut out);
        out
    }

    /// Rename ids and rewrite every enable reference through `map`
    pub fn rename(&mut self, map: &HashMap<ObjectId, ObjectId>) {
        if let Some(new_id) = map.get(&self.id) {
            self.id = new_id.clone();
        }
        self.enable.rewrite_references(map);
        for keyframe in &mut self.keyframes {
            if let Some(new_id) = map.get(&keyframe.id) {
                keyframe.id = new_id.clone();
            }
            keyframe.enable.rewrite_references(map);
        }
        for child in &mut self.children {
            child.rename(map);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::RefProperty;

    fn media(layer: &str) -> TimelineObj {
        TimelineObj::new(
            LayerId::from(layer),
            ObjContent::new(DeviceType::CasparCG, ContentKind::Media),
        )
    }

    #[test]
    fn test_open_ended() {
        assert!(Enable::at(0).is_open_ended());
        assert!(!Enable::at(0).with_duration(1000).is_open_ended());

        let mut looping = Enable::at(0).with_duration(1000);
        looping.repeating = Some(Expression::from(2000_i64));
        assert!(looping.is_open_ended());
    }

    #[test]
    fn test_rename_reaches_children_and_keyframes() {
        let keyframe = Keyframe {
            id: ObjectId::from("kf"),
            enable: Enable::default().with_start(Expression::reference("bg", RefProperty::Start)),
            properties: IndexMap::new(),
        };
        let child = media("l2")
            .with_id("fg")
            .with_enable(Enable::default().with_start(Expression::reference("bg", RefProperty::End)));
        let mut obj = media("l1").with_id("bg").with_child(child).with_keyframe(keyframe);

        assert_eq!(
            obj.ids(),
            vec![ObjectId::from("bg"), ObjectId::from("kf"), ObjectId::from("fg")]
        );

        let map = HashMap::from([
            (ObjectId::from("bg"), ObjectId::from("bg_1")),
            (ObjectId::from("kf"), ObjectId::from("kf_1")),
            (ObjectId::from("fg"), ObjectId::from("fg_1")),
        ]);
        obj.rename(&map);

        assert_eq!(obj.id.as_str(), "bg_1");
        assert_eq!(obj.keyframes[0].id.as_str(), "kf_1");
        assert_eq!(
            obj.keyframes[0].enable.start.as_ref().unwrap().to_string(),
            "#bg_1.start"
        );
        assert_eq!(obj.children[0].id.as_str(), "fg_1");
        assert_eq!(
            obj.children[0].enable.start.as_ref().unwrap().to_string(),
            "#bg_1.end"
        );
    }

    #[test]
    fn test_json_shape() {
        let obj = media("casparcg_1_10").with_id("clip");
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["layer"], "casparcg_1_10");
        assert_eq!(json["content"]["deviceType"], "casparCG");
        assert!(json.get("children").is_none());
    }
}
