// SPDX-License-Identifier: MIT OR Apache-2.0
//! Device resources and the objects created from them.

use crate::id::{DeviceId, LayerId, ResourceId};
use crate::object::{ContentKind, DeviceType, Enable, ObjContent, TimelineObj};
use crate::Time;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An asset available on a device (media file, template, input, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    /// Resource id
    pub id: ResourceId,
    /// Device the resource lives on
    pub device_id: DeviceId,
    /// Device type
    pub device_type: DeviceType,
    /// Content kind produced when played
    pub kind: ContentKind,
    /// Display name
    pub name: String,
    /// Channel the resource was recorded on (channel-addressed devices)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
    /// Layer the resource was recorded on (channel-addressed devices)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u32>,
    /// Natural length, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Time>,
    /// Properties copied into object content
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub properties: IndexMap<String, serde_json::Value>,
}

impl Resource {
    /// Create a resource
    pub fn new(
        device_id: impl Into<DeviceId>,
        device_type: DeviceType,
        kind: ContentKind,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: ResourceId::new(),
            device_id: device_id.into(),
            device_type,
            kind,
            name: name.into(),
            channel: None,
            layer: None,
            duration: None,
            properties: IndexMap::new(),
        }
    }

    /// Set the id
    pub fn with_id(mut self, id: impl Into<ResourceId>) -> Self {
        self.id = id.into();
        self
    }

    /// Record channel and layer numbers
    pub fn with_channel_layer(mut self, channel: u32, layer: u32) -> Self {
        self.channel = Some(channel);
        self.layer = Some(layer);
        self
    }

    /// Set the natural length
    pub fn with_duration(mut self, duration: Time) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Build a timeline object that plays this resource on `layer`
    pub fn to_timeline_obj(&self, layer: LayerId) -> TimelineObj {
        let mut content = ObjContent::new(self.device_type, self.kind);
        content.properties = self.properties.clone();
        let enable = match self.duration {
            Some(duration) => Enable::at(0).with_duration(duration),
            None => Enable::at(0),
        };
        let mut obj = TimelineObj::new(layer, content).with_enable(enable);
        obj.resource_id = Some(self.id.clone());
        obj
    }
}
