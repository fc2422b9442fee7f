//! Configuration for the simulator and the sync tool.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::SyncError;
use crate::wxss::DESIGN_WIDTH;

/// Name of the sync tool's config file, looked up in the project root.
pub const CONFIG_FILE: &str = "wx-preview.json";

#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Period of the safety-net full render of the current page.
    pub tick_interval: Duration,
    /// Design width the stylesheets were written against.
    pub design_width: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            tick_interval: Duration::from_secs(1),
            design_width: DESIGN_WIDTH,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceMapping {
    /// Local asset path → URL substituted in generated pages.
    pub local_images: BTreeMap<String, String>,
    /// API base URL → preview URL, substituted the same way.
    pub api_mapping: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub project_root: PathBuf,
    pub output_dir: PathBuf,
    pub sync_pages: Vec<String>,
    /// Preview page that receives the generated navigation links.
    pub html_template: String,
    pub resource_mapping: ResourceMapping,
    pub cache_dir: PathBuf,
    pub debounce_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            project_root: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            sync_pages: ["home", "frequency-match", "profile", "messages"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            html_template: "social-discovery-page.html".to_string(),
            resource_mapping: ResourceMapping::default(),
            cache_dir: PathBuf::from(".wx-preview/cache"),
            debounce_ms: 1000,
        }
    }
}

impl SyncConfig {
    /// Load `path`, falling back to defaults when the file does not exist.
    /// Relative directories are resolved against the config file's folder.
    pub fn load(path: &Path) -> Result<Self, SyncError> {
        if !path.exists() {
            log::debug!("no config at {}, using defaults", path.display());
            let mut config = SyncConfig::default();
            if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                config.resolve_paths(base);
            }
            return Ok(config);
        }

        let data = fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
        let mut config: SyncConfig =
            serde_json::from_str(&data).map_err(|source| SyncError::Config {
                path: path.display().to_string(),
                source,
            })?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for dir in [
            &mut self.project_root,
            &mut self.output_dir,
            &mut self.cache_dir,
        ] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn pages_dir(&self) -> PathBuf {
        self.project_root.join("pages")
    }

    pub fn components_dir(&self) -> PathBuf {
        self.project_root.join("components")
    }
}
