// SPDX-License-Identifier: MIT OR Apache-2.0
//! CuePlay command engine.
//!
//! The single mutation entry point for rundown state:
//! - Playback commands (play, pause, stop, next/previous)
//! - Structural edits of rundowns, groups, parts and timeline objects
//! - A bounded undo/redo ledger of reified inverse operations
//! - Automatic layer assignment for inserted resources
//!
//! ## Architecture
//!
//! [`Engine`] is synchronous and owns the ledger. Storage, change
//! notification, device output and time are injected as trait objects so
//! the binary can wire real implementations and tests can use in-memory ones.

pub mod clock;
pub mod commands;
pub mod config;
pub mod device;
mod edit;
pub mod engine;
pub mod error;
pub mod history;
pub mod layers;
pub mod notify;
pub mod playout;
pub mod rpc;
pub mod storage;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::{Applied, Command, Inverse};
pub use config::EngineConfig;
pub use device::{DeviceOutput, TimelineOutput};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use history::{History, HistoryError, HistoryStats, LedgerEntry, MAX_HISTORY};
pub use layers::{find_best_or_create_layer, LayerChoice};
pub use notify::{spawn_pump, AppData, Broadcaster, Change, ChangeKey, Debouncer, Notifier};
pub use rpc::{dispatch, Request, Response, RpcError};
pub use storage::{MemoryStorage, Project, ProjectFile, Storage};
