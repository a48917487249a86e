// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine configuration, stored as RON.

use crate::error::{EngineError, Result};
use crate::history::MAX_HISTORY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of undoable steps kept
    pub history_depth: usize,
    /// Window in which change notifications are coalesced
    pub notify_debounce_ms: u64,
    /// Default tracing filter, overridden by `RUST_LOG`
    pub log_filter: String,
    /// Gap between layer numbers of synthesized channel layers
    pub new_layer_step: u32,
    /// Project file loaded at startup and written on shutdown
    pub project_file: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_depth: MAX_HISTORY,
            notify_debounce_ms: 20,
            log_filter: "cueplay_engine=info".to_string(),
            new_layer_step: 10,
            project_file: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        ron::from_str(&content).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);

        let content = ron::ser::to_string_pretty(self, config)
            .map_err(|e| EngineError::Config(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_round_trip() {
        let config = EngineConfig {
            history_depth: 20,
            project_file: Some(PathBuf::from("show.json")),
            ..Default::default()
        };
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::default()).unwrap();
        let loaded: EngineConfig = ron::from_str(&ron_str).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let loaded: EngineConfig = ron::from_str("(history_depth: 5)").unwrap();
        assert_eq!(loaded.history_depth, 5);
        assert_eq!(loaded.new_layer_step, 10);
    }

    #[test]
    fn test_save_and_load_file() {
        let path = std::env::temp_dir().join(format!("cueplay-config-{}.ron", uuid::Uuid::new_v4()));
        let config = EngineConfig::default();
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(EngineConfig::load(&path), Err(EngineError::Io(_))));
    }
}
