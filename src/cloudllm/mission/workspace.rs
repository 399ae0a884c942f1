//! Workspace Manager (§4.3).
//!
//! Owns every filesystem write under a mission's root: the fixed directory tree, the asset
//! manifest, agent/tool specs, mission-state checkpoints, and archival. A second process
//! attempting to open the same mission workspace is refused via an OS-level advisory lock
//! (`fs2`) colocated with `workspace_config.json`, per §4.3's "Workspace concurrency" note.

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::cloudllm::mission::error::WorkspaceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    Code,
    Data,
    Configs,
    Media,
}

impl AssetCategory {
    pub fn dirname(&self) -> &'static str {
        match self {
            AssetCategory::Code => "code",
            AssetCategory::Data => "data",
            AssetCategory::Configs => "configs",
            AssetCategory::Media => "media",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    Active,
    Paused,
    Completed,
    Failed,
    Archived,
}

/// `workspace_config.json` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub mission_id: String,
    pub mission_name: String,
    pub dir_name: String,
    pub created_at: DateTime<Utc>,
    pub status: WorkspaceStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetEntry {
    pub relative_path: String,
    pub bytes: u64,
}

/// `asset_manifest.json` (§3 "Workspace" invariants: every referenced path exists on disk;
/// `total_assets == Σ |category|`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetManifest {
    #[serde(default)]
    pub code: Vec<AssetEntry>,
    #[serde(default)]
    pub data: Vec<AssetEntry>,
    #[serde(default)]
    pub configs: Vec<AssetEntry>,
    #[serde(default)]
    pub media: Vec<AssetEntry>,
    pub total_assets: usize,
}

impl AssetManifest {
    fn recompute_total(&mut self) {
        self.total_assets = self.code.len() + self.data.len() + self.configs.len() + self.media.len();
    }

    fn category_mut(&mut self, category: AssetCategory) -> &mut Vec<AssetEntry> {
        match category {
            AssetCategory::Code => &mut self.code,
            AssetCategory::Data => &mut self.data,
            AssetCategory::Configs => &mut self.configs,
            AssetCategory::Media => &mut self.media,
        }
    }
}

fn slugify(name: &str, max_len: usize) -> String {
    let mut slug: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    while slug.contains("__") {
        slug = slug.replace("__", "_");
    }
    let slug = slug.trim_matches('_').to_string();
    slug.chars().take(max_len).collect()
}

/// A held, lock-guarded handle onto one mission's workspace directory.
pub struct WorkspaceHandle {
    root: PathBuf,
    mission_id: String,
    lock_file: File,
    manifest: Mutex<AssetManifest>,
}

impl WorkspaceHandle {
    /// Create (or reopen) the workspace for `mission_id`/`mission_name` under `base_dir`,
    /// per §4.3's name format `<mission_id>_<slug>`. Acquires the advisory lock for the
    /// lifetime of the handle; a second process racing for the same workspace gets
    /// [`WorkspaceError::Busy`].
    pub fn create_or_open(
        base_dir: &Path,
        mission_id: &str,
        mission_name: &str,
    ) -> Result<Self, WorkspaceError> {
        let slug = slugify(mission_name, 50);
        let dir_name = format!("{mission_id}_{slug}");
        let root = base_dir.join(&dir_name);
        let is_new = !root.exists();

        for sub in [
            "agents",
            "tools",
            "assets/code",
            "assets/data",
            "assets/configs",
            "assets/media",
            "logs/agents",
            "logs/cycles",
            "state/checkpoints",
            "state/progress",
            "docs/generated",
            "docs/templates",
        ] {
            fs::create_dir_all(root.join(sub))?;
        }

        let lock_path = root.join(".workspace.lock");
        let lock_file = File::create(&lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| WorkspaceError::Busy(dir_name.clone()))?;

        if is_new {
            let config = WorkspaceConfig {
                mission_id: mission_id.to_string(),
                mission_name: mission_name.to_string(),
                dir_name: dir_name.clone(),
                created_at: Utc::now(),
                status: WorkspaceStatus::Active,
            };
            fs::write(
                root.join("workspace_config.json"),
                serde_json::to_string_pretty(&config)?,
            )?;
            fs::write(
                root.join("asset_manifest.json"),
                serde_json::to_string_pretty(&AssetManifest::default())?,
            )?;
            fs::write(
                root.join("README.md"),
                format!("# {mission_name}\n\nMission workspace for `{mission_id}`.\n"),
            )?;
            fs::write(
                root.join(".gitignore"),
                "state/\nlogs/\nmemory/\n*.lock\n",
            )?;
        }

        let manifest = Self::read_manifest(&root)?;

        Ok(Self {
            root,
            mission_id: mission_id.to_string(),
            lock_file,
            manifest: Mutex::new(manifest),
        })
    }

    fn read_manifest(root: &Path) -> Result<AssetManifest, WorkspaceError> {
        let path = root.join("asset_manifest.json");
        if !path.exists() {
            return Ok(AssetManifest::default());
        }
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_manifest(&self, manifest: &AssetManifest) -> Result<(), WorkspaceError> {
        fs::write(
            self.root.join("asset_manifest.json"),
            serde_json::to_string_pretty(manifest)?,
        )?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mission_id(&self) -> &str {
        &self.mission_id
    }

    pub fn manifest(&self) -> AssetManifest {
        self.manifest.lock().expect("manifest mutex poisoned").clone()
    }

    /// Write `spec.json` (+ optional generated code) under `agents/<name>/` and record the
    /// addition in the manifest under the `configs` category.
    pub fn add_agent(
        &self,
        name: &str,
        spec: &Value,
        code: Option<&str>,
    ) -> Result<(), WorkspaceError> {
        self.write_named_artifact("agents", name, spec, code)
    }

    pub fn add_tool(
        &self,
        name: &str,
        spec: &Value,
        code: Option<&str>,
    ) -> Result<(), WorkspaceError> {
        self.write_named_artifact("tools", name, spec, code)
    }

    fn write_named_artifact(
        &self,
        kind_dir: &str,
        name: &str,
        spec: &Value,
        code: Option<&str>,
    ) -> Result<(), WorkspaceError> {
        let dir = self.root.join(kind_dir).join(name);
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("spec.json"), serde_json::to_string_pretty(spec)?)?;
        if let Some(code) = code {
            fs::write(dir.join(format!("{name}.py")), code)?;
        }
        Ok(())
    }

    /// `save_asset(name, data, type, category) -> relative_path` (§4.3). Writes a
    /// timestamp-prefixed file into the category subdirectory and updates the manifest.
    pub fn save_asset(
        &self,
        name: &str,
        data: &[u8],
        category: AssetCategory,
        extension: &str,
    ) -> Result<String, WorkspaceError> {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let filename = if extension.is_empty() {
            format!("{timestamp}_{name}")
        } else {
            format!("{timestamp}_{name}.{extension}")
        };
        let relative_path = format!("assets/{}/{}", category.dirname(), filename);
        let full_path = self.root.join(&relative_path);
        fs::write(&full_path, data)?;

        let mut manifest = self.manifest.lock().expect("manifest mutex poisoned");
        manifest.category_mut(category).push(AssetEntry {
            relative_path: relative_path.clone(),
            bytes: data.len() as u64,
        });
        manifest.recompute_total();
        self.write_manifest(&manifest)?;
        Ok(relative_path)
    }

    /// Convenience for JSON-shaped assets (`add_asset`/`get_asset_path` round-trip, §8).
    pub fn save_json_asset(
        &self,
        name: &str,
        data: &Value,
        category: AssetCategory,
    ) -> Result<String, WorkspaceError> {
        let bytes = serde_json::to_vec_pretty(data)?;
        self.save_asset(name, &bytes, category, "json")
    }

    /// `save_mission_state(state, checkpoint?)` — always updates `state/current_state.json`;
    /// additionally writes a timestamp-prefixed checkpoint file when `checkpoint` is supplied.
    pub fn save_mission_state(
        &self,
        state: &Value,
        checkpoint: Option<&str>,
    ) -> Result<(), WorkspaceError> {
        let bytes = serde_json::to_vec_pretty(state)?;
        fs::write(self.root.join("state/current_state.json"), &bytes)?;
        if let Some(checkpoint) = checkpoint {
            let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
            let path = self
                .root
                .join("state/checkpoints")
                .join(format!("{timestamp}_{checkpoint}.json"));
            fs::write(path, &bytes)?;
        }
        Ok(())
    }

    /// `load_mission_state(checkpoint?)` — with `checkpoint`, loads the lexicographically
    /// most-recent `*_<checkpoint>.json`; otherwise loads `current_state.json`.
    pub fn load_mission_state(&self, checkpoint: Option<&str>) -> Result<Value, WorkspaceError> {
        let path = match checkpoint {
            None => self.root.join("state/current_state.json"),
            Some(checkpoint) => {
                let checkpoints_dir = self.root.join("state/checkpoints");
                let suffix = format!("_{checkpoint}.json");
                let mut matches: Vec<PathBuf> = fs::read_dir(&checkpoints_dir)
                    .map(|entries| {
                        entries
                            .filter_map(|e| e.ok())
                            .map(|e| e.path())
                            .filter(|p| {
                                p.file_name()
                                    .and_then(|n| n.to_str())
                                    .map(|n| n.ends_with(&suffix))
                                    .unwrap_or(false)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                matches.sort();
                matches
                    .pop()
                    .ok_or_else(|| WorkspaceError::CheckpointNotFound(checkpoint.to_string()))?
            }
        };
        let raw = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Persist the mission log at the stable resume path, `state/mission_log.json` (§6).
    pub fn save_mission_log(&self, log: &Value) -> Result<(), WorkspaceError> {
        fs::write(
            self.root.join("state/mission_log.json"),
            serde_json::to_vec_pretty(log)?,
        )?;
        Ok(())
    }

    pub fn load_mission_log(&self) -> Result<Value, WorkspaceError> {
        let raw = fs::read_to_string(self.root.join("state/mission_log.json"))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save_cycle_log(&self, cycle_id: &str, cycle: &Value) -> Result<(), WorkspaceError> {
        fs::write(
            self.root.join("logs/cycles").join(format!("{cycle_id}.json")),
            serde_json::to_vec_pretty(cycle)?,
        )?;
        Ok(())
    }

    pub fn load_cycle_log(&self, cycle_id: &str) -> Result<Value, WorkspaceError> {
        let raw = fs::read_to_string(
            self.root.join("logs/cycles").join(format!("{cycle_id}.json")),
        )?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Bundle the workspace into a single deterministic archive file and mark it archived.
    /// A dependency-free `.bundle` (length-prefixed concatenation of every file under the
    /// workspace root) stands in for a zip — the teacher doesn't carry a zip crate and this
    /// keeps the dependency stack aligned (see DESIGN.md).
    pub fn archive(&self, archive_path: Option<&Path>) -> Result<PathBuf, WorkspaceError> {
        let target = archive_path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| self.root.with_extension("bundle"));
        let mut out = Vec::new();
        let mut entries: Vec<PathBuf> = walk(&self.root)?;
        entries.sort();
        for entry in entries {
            let rel = entry
                .strip_prefix(&self.root)
                .unwrap_or(&entry)
                .to_string_lossy()
                .to_string();
            let data = fs::read(&entry)?;
            out.extend_from_slice(&(rel.len() as u32).to_le_bytes());
            out.extend_from_slice(rel.as_bytes());
            out.extend_from_slice(&(data.len() as u64).to_le_bytes());
            out.extend_from_slice(&data);
        }
        fs::write(&target, out)?;

        let config_path = self.root.join("workspace_config.json");
        if let Ok(raw) = fs::read_to_string(&config_path) {
            if let Ok(mut config) = serde_json::from_str::<WorkspaceConfig>(&raw) {
                config.status = WorkspaceStatus::Archived;
                fs::write(config_path, serde_json::to_string_pretty(&config)?)?;
            }
        }
        Ok(target)
    }
}

impl Drop for WorkspaceHandle {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.lock_file);
    }
}

fn walk(dir: &Path) -> Result<Vec<PathBuf>, WorkspaceError> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.file_name().and_then(|n| n.to_str()) == Some(".workspace.lock") {
            continue;
        }
        if path.is_dir() {
            out.extend(walk(&path)?);
        } else {
            out.push(path);
        }
    }
    Ok(out)
}

/// `list(status_filter?) -> [WorkspaceConfig]`, sorted by creation time descending (§4.3).
pub fn list_workspaces(
    base_dir: &Path,
    status_filter: Option<WorkspaceStatus>,
) -> Result<Vec<WorkspaceConfig>, WorkspaceError> {
    let mut configs = Vec::new();
    if !base_dir.exists() {
        return Ok(configs);
    }
    for entry in fs::read_dir(base_dir)? {
        let entry = entry?;
        let config_path = entry.path().join("workspace_config.json");
        if !config_path.exists() {
            continue;
        }
        let raw = fs::read_to_string(&config_path)?;
        let config: WorkspaceConfig = serde_json::from_str(&raw)?;
        if status_filter.is_none_or_eq(config.status) {
            configs.push(config);
        }
    }
    configs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(configs)
}

trait OptionStatusExt {
    fn is_none_or_eq(&self, status: WorkspaceStatus) -> bool;
}

impl OptionStatusExt for Option<WorkspaceStatus> {
    fn is_none_or_eq(&self, status: WorkspaceStatus) -> bool {
        match self {
            None => true,
            Some(filter) => std::mem::discriminant(filter) == std::mem::discriminant(&status),
        }
    }
}
