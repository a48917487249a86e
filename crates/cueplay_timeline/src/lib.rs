// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rundown data model and playout scheduling for CuePlay.
//!
//! Everything in this crate is pure: no clocks, no I/O, no locks. The engine
//! crate feeds it the current time and stores what comes out.
//!
//! ## Pipeline
//!
//! - [`prepare`] turns a group's playing intents into [`PreparedPlayData`]
//! - [`resolve_playhead`] answers "what is playing now" from prepared data
//! - [`materialize`] expands prepared data into a [`TimelineTree`] for devices
//!
//! ## Model
//!
//! A [`Rundown`] holds [`Group`]s, a group holds [`Part`]s, and a part holds
//! [`TimelineObj`]s placed on output layers described by [`Mapping`]s.

pub mod error;
pub mod expression;
pub mod id;
pub mod mapping;
pub mod materialize;
pub mod object;
pub mod playhead;
pub mod prepare;
pub mod resource;
pub mod rundown;
pub mod timing;

pub use error::ExpressionError;
pub use expression::{Expression, Operator, RefProperty, Reference};
pub use id::{DeviceId, GroupId, LayerId, ObjectId, PartId, ResourceId, RundownId};
pub use mapping::{Mapping, Mappings};
pub use materialize::{materialize, CustomPartContent, IdRewriter, NodeKind, TimelineNode, TimelineTree};
pub use object::{ContentKind, DeviceType, Enable, Keyframe, ObjContent, TimelineObj};
pub use playhead::{resolve_playhead, resolve_section, GroupPlayhead, Playhead};
pub use prepare::{prepare, PreparedPlayData, Section, SectionPart};
pub use resource::Resource;
pub use rundown::{
    Group, GroupSettings, Part, PartSettings, PlayingPart, Playout, Repeat, Rundown, Schedule,
    Trigger, TriggerAction, DAY,
};
pub use timing::{resolve_part_timing, PartTiming, ResolvedSpan};

/// Milliseconds since the Unix epoch, or a span in milliseconds
pub type Time = i64;
