// SPDX-License-Identifier: MIT OR Apache-2.0
//! Project and rundown storage.

use crate::error::{EngineError, Result};
use cueplay_timeline::{Mappings, Resource, ResourceId, Rundown, RundownId};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Project-level state shared by all rundowns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Project id
    pub id: String,
    /// Display name
    pub name: String,
    /// Output layers
    #[serde(default)]
    pub mappings: Mappings,
    /// Device-side assets
    #[serde(default)]
    pub resources: IndexMap<ResourceId, Resource>,
    /// Rundowns, in display order
    #[serde(default)]
    pub rundowns: Vec<RundownId>,
}

impl Project {
    /// Create an empty project
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            mappings: Mappings::new(),
            resources: IndexMap::new(),
            rundowns: Vec::new(),
        }
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

/// Synchronous key-value store over the project and its rundowns
pub trait Storage: Send + Sync {
    /// Current project
    fn project(&self) -> Project;

    /// Replace the project
    fn update_project(&self, project: Project);

    /// Get a rundown
    fn rundown(&self, id: &RundownId) -> Result<Rundown>;

    /// Insert or replace a rundown
    fn update_rundown(&self, rundown: Rundown);

    /// Remove a rundown
    fn remove_rundown(&self, id: &RundownId) -> Option<Rundown>;

    /// Get a project resource
    fn resource(&self, id: &ResourceId) -> Result<Resource> {
        self.project()
            .resources
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::ResourceNotFound(id.clone()))
    }
}

/// On-disk shape of a project with its rundowns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectFile {
    /// Project
    pub project: Project,
    /// Every rundown
    #[serde(default)]
    pub rundowns: Vec<Rundown>,
}

/// In-memory [`Storage`]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    project: RwLock<Project>,
    rundowns: RwLock<IndexMap<RundownId, Rundown>>,
}

impl MemoryStorage {
    /// Create a storage holding `project` and no rundowns
    pub fn new(project: Project) -> Self {
        Self {
            project: RwLock::new(project),
            rundowns: RwLock::new(IndexMap::new()),
        }
    }

    /// Create from a loaded project file
    pub fn from_file_contents(file: ProjectFile) -> Self {
        let rundowns = file
            .rundowns
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        Self {
            project: RwLock::new(file.project),
            rundowns: RwLock::new(rundowns),
        }
    }

    /// Snapshot of everything stored
    pub fn to_file_contents(&self) -> ProjectFile {
        let project = self.project.read().clone();
        let rundowns = self.rundowns.read();
        // Project order first, then anything the project does not list
        let mut ordered: Vec<Rundown> = project
            .rundowns
            .iter()
            .filter_map(|id| rundowns.get(id).cloned())
            .collect();
        ordered.extend(
            rundowns
                .values()
                .filter(|r| !project.rundowns.contains(&r.id))
                .cloned(),
        );
        ProjectFile {
            project,
            rundowns: ordered,
        }
    }

    /// Load a JSON project file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: ProjectFile = serde_json::from_str(&content)?;
        tracing::info!(
            "Loaded project \"{}\" with {} rundowns from {}",
            file.project.name,
            file.rundowns.len(),
            path.display()
        );
        Ok(Self::from_file_contents(file))
    }

    /// Write a JSON project file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.to_file_contents())?;
        std::fs::write(path, content)?;
        tracing::info!("Saved project to {}", path.display());
        Ok(())
    }

    /// Ids of every stored rundown
    pub fn rundown_ids(&self) -> Vec<RundownId> {
        self.rundowns.read().keys().cloned().collect()
    }
}

impl Storage for MemoryStorage {
    fn project(&self) -> Project {
        self.project.read().clone()
    }

    fn update_project(&self, project: Project) {
        *self.project.write() = project;
    }

    fn rundown(&self, id: &RundownId) -> Result<Rundown> {
        self.rundowns
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::RundownNotFound(id.clone()))
    }

    fn update_rundown(&self, rundown: Rundown) {
        self.rundowns.write().insert(rundown.id.clone(), rundown);
    }

    fn remove_rundown(&self, id: &RundownId) -> Option<Rundown> {
        self.rundowns.write().shift_remove(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cueplay_timeline::{ContentKind, DeviceType};

    #[test]
    fn test_rundown_lookup() {
        let storage = MemoryStorage::default();
        let rundown = Rundown::new("Show");
        let id = rundown.id.clone();

        assert!(matches!(
            storage.rundown(&id),
            Err(EngineError::RundownNotFound(_))
        ));
        storage.update_rundown(rundown.clone());
        assert_eq!(storage.rundown(&id).unwrap(), rundown);
        assert_eq!(storage.remove_rundown(&id), Some(rundown));
        assert!(storage.rundown_ids().is_empty());
    }

    #[test]
    fn test_resource_lookup() {
        let mut project = Project::new("P");
        let resource =
            Resource::new("caspar", DeviceType::CasparCG, ContentKind::Media, "AMB").with_id("amb");
        project.resources.insert(resource.id.clone(), resource.clone());
        let storage = MemoryStorage::new(project);

        assert_eq!(storage.resource(&ResourceId::from("amb")).unwrap(), resource);
        assert!(matches!(
            storage.resource(&ResourceId::from("missing")),
            Err(EngineError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let storage = MemoryStorage::new(Project::new("P"));
        let first = Rundown::new("First");
        let second = Rundown::new("Second");
        let mut project = storage.project();
        project.rundowns = vec![second.id.clone(), first.id.clone()];
        storage.update_project(project);
        storage.update_rundown(first.clone());
        storage.update_rundown(second.clone());

        let path = std::env::temp_dir().join(format!("cueplay-{}.json", Uuid::new_v4()));
        storage.save(&path).unwrap();
        let loaded = MemoryStorage::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        let contents = loaded.to_file_contents();
        assert_eq!(contents.rundowns, vec![second, first]);
        assert_eq!(contents.project, storage.project());
    }
}
