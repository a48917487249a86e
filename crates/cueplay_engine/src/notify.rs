// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change notification.
//!
//! The engine reports every committed mutation through a [`Notifier`].
//! [`Broadcaster`] coalesces changes per key within a short window and
//! publishes them in batches to any number of subscribers. State is already
//! committed when a change is queued; only the notification waits.

use crate::storage::Project;
use cueplay_timeline::{Rundown, RundownId};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Application-level state shown by clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    /// Engine version
    pub version: String,
    /// An undo is available
    pub can_undo: bool,
    /// A redo is available
    pub can_redo: bool,
    /// Description of the next undo
    pub undo_description: Option<String>,
    /// Description of the next redo
    pub redo_description: Option<String>,
}

/// Observer of committed state
pub trait Notifier: Send + Sync {
    /// A rundown changed
    fn rundown_changed(&self, rundown: &Rundown);

    /// A rundown was deleted
    fn rundown_removed(&self, rundown_id: &RundownId);

    /// The project changed
    fn project_changed(&self, project: &Project);

    /// Ledger state or other app data changed
    fn app_data_changed(&self, app_data: &AppData);

    /// Peripherals (button panels, stream decks) should refresh
    fn update_peripherals(&self);
}

/// A queued notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Change {
    /// Latest state of a rundown
    Rundown {
        /// Rundown
        rundown: Rundown,
    },
    /// Rundown deleted
    RundownRemoved {
        /// Rundown
        rundown_id: RundownId,
    },
    /// Latest project
    Project {
        /// Project
        project: Project,
    },
    /// Latest app data
    AppData {
        /// App data
        app_data: AppData,
    },
    /// Peripherals should refresh
    Peripherals,
}

impl Change {
    /// Coalescing key; a newer change replaces a pending one with the same key
    pub fn key(&self) -> ChangeKey {
        match self {
            Self::Rundown { rundown } => ChangeKey::Rundown(rundown.id.clone()),
            Self::RundownRemoved { rundown_id } => ChangeKey::Rundown(rundown_id.clone()),
            Self::Project { .. } => ChangeKey::Project,
            Self::AppData { .. } => ChangeKey::AppData,
            Self::Peripherals => ChangeKey::Peripherals,
        }
    }
}

/// What a change is about
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeKey {
    /// A rundown
    Rundown(RundownId),
    /// The project
    Project,
    /// App data
    AppData,
    /// Peripherals
    Peripherals,
}

/// Collects changes until a window has passed since the first one
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: IndexMap<ChangeKey, Change>,
    deadline: Option<Instant>,
}

impl Debouncer {
    /// Create with a coalescing window
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: IndexMap::new(),
            deadline: None,
        }
    }

    /// Queue a change. The window starts with the first pending change and is
    /// not extended by later ones.
    pub fn schedule(&mut self, change: Change, now: Instant) {
        self.pending.insert(change.key(), change);
        if self.deadline.is_none() {
            self.deadline = Some(now + self.window);
        }
    }

    /// Pending changes, if the window has passed
    pub fn tick(&mut self, now: Instant) -> Option<Vec<Change>> {
        match self.deadline {
            Some(deadline) if now >= deadline => Some(self.take()),
            _ => None,
        }
    }

    /// All pending changes, regardless of the window
    pub fn take(&mut self) -> Vec<Change> {
        self.deadline = None;
        self.pending.drain(..).map(|(_, change)| change).collect()
    }

    /// Number of pending changes
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Debounced fan-out of changes to subscribers
#[derive(Debug)]
pub struct Broadcaster {
    debouncer: Mutex<Debouncer>,
    sender: broadcast::Sender<Vec<Change>>,
}

impl Broadcaster {
    /// Create with a coalescing window and a channel capacity in batches
    pub fn new(window: Duration, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            debouncer: Mutex::new(Debouncer::new(window)),
            sender,
        }
    }

    /// Receive published batches
    pub fn subscribe(&self) -> broadcast::Receiver<Vec<Change>> {
        self.sender.subscribe()
    }

    /// Publish pending changes if their window has passed
    pub fn flush_due(&self, now: Instant) -> usize {
        let batch = self.debouncer.lock().tick(now);
        batch.map_or(0, |batch| self.publish(batch))
    }

    /// Publish pending changes now
    pub fn flush(&self) -> usize {
        let batch = self.debouncer.lock().take();
        self.publish(batch)
    }

    /// Number of changes waiting for their window
    pub fn pending_count(&self) -> usize {
        self.debouncer.lock().pending_count()
    }

    fn queue(&self, change: Change) {
        self.debouncer.lock().schedule(change, Instant::now());
    }

    fn publish(&self, batch: Vec<Change>) -> usize {
        let count = batch.len();
        if count == 0 {
            return 0;
        }
        // No subscribers is not an error
        if self.sender.send(batch).is_err() {
            tracing::trace!("Dropped {count} changes, no subscribers");
        }
        count
    }
}

impl Notifier for Broadcaster {
    fn rundown_changed(&self, rundown: &Rundown) {
        self.queue(Change::Rundown {
            rundown: rundown.clone(),
        });
    }

    fn rundown_removed(&self, rundown_id: &RundownId) {
        self.queue(Change::RundownRemoved {
            rundown_id: rundown_id.clone(),
        });
    }

    fn project_changed(&self, project: &Project) {
        self.queue(Change::Project {
            project: project.clone(),
        });
    }

    fn app_data_changed(&self, app_data: &AppData) {
        self.queue(Change::AppData {
            app_data: app_data.clone(),
        });
    }

    fn update_peripherals(&self) {
        self.queue(Change::Peripherals);
    }
}

/// Drive `broadcaster` from a tokio task until the task is aborted
pub fn spawn_pump(broadcaster: Arc<Broadcaster>, window: Duration) -> JoinHandle<()> {
    let period = (window / 2).max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            broadcaster.flush_due(Instant::now());
        }
    })
}
