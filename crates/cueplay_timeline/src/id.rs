// SPDX-License-Identifier: MIT OR Apache-2.0
//! String identifiers for rundown entities.
//!
//! Identifiers are plain strings on the wire because timeline expressions
//! reference objects by id (`#intro.end`). New ids are random UUIDs.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new random identifier
            pub fn new() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            /// Borrow the raw identifier
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Unique identifier for a rundown
    RundownId
);
string_id!(
    /// Unique identifier for a group
    GroupId
);
string_id!(
    /// Unique identifier for a part
    PartId
);
string_id!(
    /// Identifier of a timeline object or keyframe
    ObjectId
);
string_id!(
    /// Identifier of a device output layer (mapping)
    LayerId
);
string_id!(
    /// Identifier of a device resource
    ResourceId
);
string_id!(
    /// Identifier of a playout device
    DeviceId
);

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_new_ids_are_unique() {
        assert_ne!(PartId::new(), PartId::new());
    }

    #[test]
    fn test_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(ObjectId::from("intro"), 1);
        assert_eq!(map.get("intro"), Some(&1));
    }

    #[test]
    fn test_serializes_as_plain_string() {
        let json = serde_json::to_string(&GroupId::from("g1")).unwrap();
        assert_eq!(json, "\"g1\"");
    }
}
