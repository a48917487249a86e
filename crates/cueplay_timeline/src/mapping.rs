// SPDX-License-Identifier: MIT OR Apache-2.0
//! Device output layers.

use crate::id::{DeviceId, LayerId};
use crate::object::{ContentKind, DeviceType};
use crate::resource::Resource;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// All layers of a project, keyed by id
pub type Mappings = IndexMap<LayerId, Mapping>;

/// An output layer on a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mapping {
    /// Layer id
    pub id: LayerId,
    /// Display name
    pub name: String,
    /// Device the layer outputs to
    pub device_id: DeviceId,
    /// Device type
    pub device_type: DeviceType,
    /// Content kinds the layer can play; empty accepts anything
    #[serde(default)]
    pub accepts: Vec<ContentKind>,
    /// Channel number (channel-addressed devices)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
    /// Layer number (channel-addressed devices)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u32>,
}

impl Mapping {
    /// Create a layer on a device
    pub fn new(
        id: impl Into<LayerId>,
        name: impl Into<String>,
        device_id: impl Into<DeviceId>,
        device_type: DeviceType,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_id: device_id.into(),
            device_type,
            accepts: Vec::new(),
            channel: None,
            layer: None,
        }
    }

    /// Restrict accepted content kinds
    pub fn accepting(mut self, kinds: impl IntoIterator<Item = ContentKind>) -> Self {
        self.accepts = kinds.into_iter().collect();
        self
    }

    /// Set channel and layer numbers
    pub fn with_channel_layer(mut self, channel: u32, layer: u32) -> Self {
        self.channel = Some(channel);
        self.layer = Some(layer);
        self
    }

    /// Whether the layer can play `kind`
    pub fn accepts(&self, kind: ContentKind) -> bool {
        self.accepts.is_empty() || self.accepts.contains(&kind)
    }

    /// Same device and an accepted content kind
    pub fn is_compatible_with(&self, resource: &Resource) -> bool {
        self.device_id == resource.device_id
            && self.device_type == resource.device_type
            && self.accepts(resource.kind)
    }

    /// The resource was recorded on a different channel/layer than this mapping addresses
    pub fn addressing_mismatch(&self, resource: &Resource) -> bool {
        if !self.device_type.is_channel_addressed() {
            return false;
        }
        let channel_differs = resource.channel.is_some() && resource.channel != self.channel;
        let layer_differs = resource.layer.is_some() && resource.layer != self.layer;
        channel_differs || layer_differs
    }

    /// Synthesize a layer suited to `resource`.
    ///
    /// `layer_number` is used for channel-addressed devices when the resource
    /// does not carry its own layer number.
    pub fn for_resource(resource: &Resource, layer_number: u32) -> Self {
        let mut mapping = Self::new(
            LayerId::new(),
            format!("{} {:?}", resource.device_type.name(), resource.kind),
            resource.device_id.clone(),
            resource.device_type,
        )
        .accepting([resource.kind]);

        if resource.device_type.is_channel_addressed() {
            let channel = resource.channel.unwrap_or(1);
            let layer = resource.layer.unwrap_or(layer_number);
            mapping.name = format!("{} {}-{}", resource.device_type.name(), channel, layer);
            mapping = mapping.with_channel_layer(channel, layer);
        }
        mapping
    }
}
