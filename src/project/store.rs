// Project persistence for Brief Autopilot
//
// This module defines the store interface the engine persists through and its
// two backends: an in-memory store for demo mode and a JSON state file for
// durable local use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::types::{GlobalSettings, OwnerId, Project, ProjectId, ProjectUpdate};
use crate::error::{StoreError, StoreResult};

/// Document persistence for project records
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Load a single project
    async fn load(&self, id: &ProjectId) -> StoreResult<Project>;

    /// Apply a partial update to a stored project
    async fn save(&self, id: &ProjectId, update: &ProjectUpdate) -> StoreResult<()>;

    /// All projects owned by an account, oldest first
    async fn list(&self, owner_id: &OwnerId) -> StoreResult<Vec<Project>>;

    /// Create a new project record
    async fn insert(&self, project: Project) -> StoreResult<()>;

    /// Remove a project record
    async fn delete(&self, id: &ProjectId) -> StoreResult<()>;

    /// Load process-wide settings
    async fn load_settings(&self) -> StoreResult<GlobalSettings>;

    /// Persist process-wide settings
    async fn save_settings(&self, settings: &GlobalSettings) -> StoreResult<()>;
}

fn owned_by(projects: &HashMap<ProjectId, Project>, owner_id: &OwnerId) -> Vec<Project> {
    let mut owned: Vec<Project> = projects
        .values()
        .filter(|p| &p.owner_id == owner_id)
        .cloned()
        .collect();
    owned.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    owned
}

/// Volatile store used in demo mode
#[derive(Debug, Default)]
pub struct MemoryProjectStore {
    projects: RwLock<HashMap<ProjectId, Project>>,
    settings: RwLock<GlobalSettings>,
}

impl MemoryProjectStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with projects
    pub fn with_projects(projects: impl IntoIterator<Item = Project>) -> Self {
        let projects = projects.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            projects: RwLock::new(projects),
            settings: RwLock::new(GlobalSettings::default()),
        }
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn load(&self, id: &ProjectId) -> StoreResult<Project> {
        self.projects
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn save(&self, id: &ProjectId, update: &ProjectUpdate) -> StoreResult<()> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        update.apply_to(project);
        debug!("Saved project {} in memory", id);
        Ok(())
    }

    async fn list(&self, owner_id: &OwnerId) -> StoreResult<Vec<Project>> {
        Ok(owned_by(&*self.projects.read().await, owner_id))
    }

    async fn insert(&self, project: Project) -> StoreResult<()> {
        let mut projects = self.projects.write().await;
        if projects.contains_key(&project.id) {
            return Err(StoreError::AlreadyExists(project.id));
        }
        projects.insert(project.id.clone(), project);
        Ok(())
    }

    async fn delete(&self, id: &ProjectId) -> StoreResult<()> {
        self.projects
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn load_settings(&self) -> StoreResult<GlobalSettings> {
        Ok(self.settings.read().await.clone())
    }

    async fn save_settings(&self, settings: &GlobalSettings) -> StoreResult<()> {
        *self.settings.write().await = settings.clone();
        Ok(())
    }
}

/// Serializable state for persistence
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreState {
    projects: HashMap<ProjectId, Project>,
    #[serde(default)]
    settings: GlobalSettings,
    last_updated: Option<DateTime<Utc>>,
}

/// Store backed by a JSON state file
///
/// Every mutation rewrites the file before it is acknowledged. When the write
/// fails the in-memory copy is rolled back, so a failed save never leaves a
/// change visible to later reads.
#[derive(Debug)]
pub struct FileProjectStore {
    state: Mutex<StoreState>,
    state_file: PathBuf,
}

impl FileProjectStore {
    /// Open the store, loading existing state if the file exists
    pub async fn open<P: AsRef<Path>>(state_file: P) -> StoreResult<Self> {
        let state_file = state_file.as_ref().to_path_buf();

        if let Some(parent) = state_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let state = Self::read_state(&state_file).await?;
        Ok(Self {
            state: Mutex::new(state),
            state_file,
        })
    }

    async fn read_state(state_file: &Path) -> StoreResult<StoreState> {
        if !fs::try_exists(state_file).await.unwrap_or(false) {
            debug!("State file does not exist: {}", state_file.display());
            return Ok(StoreState::default());
        }

        let json = fs::read_to_string(state_file)
            .await
            .map_err(|source| StoreError::Io {
                path: state_file.to_path_buf(),
                source,
            })?;
        let state: StoreState = serde_json::from_str(&json)?;

        info!(
            "Loaded project store: {} projects (last updated: {})",
            state.projects.len(),
            state
                .last_updated
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "never".to_string())
        );
        Ok(state)
    }

    async fn write_state(&self, state: &mut StoreState) -> StoreResult<()> {
        state.last_updated = Some(Utc::now());
        let json = serde_json::to_string_pretty(state)?;

        // Write beside the state file, then rename over it
        let temp_file = self.state_file.with_extension("json.tmp");
        fs::write(&temp_file, json)
            .await
            .map_err(|source| StoreError::Io {
                path: temp_file.clone(),
                source,
            })?;
        fs::rename(&temp_file, &self.state_file)
            .await
            .map_err(|source| StoreError::Io {
                path: self.state_file.clone(),
                source,
            })?;

        debug!("Saved project store to: {}", self.state_file.display());
        Ok(())
    }
}

#[async_trait]
impl ProjectStore for FileProjectStore {
    async fn load(&self, id: &ProjectId) -> StoreResult<Project> {
        self.state
            .lock()
            .await
            .projects
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn save(&self, id: &ProjectId, update: &ProjectUpdate) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let previous = state
            .projects
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        let mut updated = previous.clone();
        update.apply_to(&mut updated);
        state.projects.insert(id.clone(), updated);

        if let Err(e) = self.write_state(&mut state).await {
            warn!("Rolling back update to project {}: {}", id, e);
            state.projects.insert(id.clone(), previous);
            return Err(e);
        }
        Ok(())
    }

    async fn list(&self, owner_id: &OwnerId) -> StoreResult<Vec<Project>> {
        Ok(owned_by(&self.state.lock().await.projects, owner_id))
    }

    async fn insert(&self, project: Project) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.projects.contains_key(&project.id) {
            return Err(StoreError::AlreadyExists(project.id));
        }

        let id = project.id.clone();
        state.projects.insert(id.clone(), project);
        if let Err(e) = self.write_state(&mut state).await {
            state.projects.remove(&id);
            return Err(e);
        }

        info!("Stored new project: {}", id);
        Ok(())
    }

    async fn delete(&self, id: &ProjectId) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let removed = state
            .projects
            .remove(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;

        if let Err(e) = self.write_state(&mut state).await {
            state.projects.insert(id.clone(), removed);
            return Err(e);
        }

        info!("Deleted project: {}", id);
        Ok(())
    }

    async fn load_settings(&self) -> StoreResult<GlobalSettings> {
        Ok(self.state.lock().await.settings.clone())
    }

    async fn save_settings(&self, settings: &GlobalSettings) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut state.settings, settings.clone());

        if let Err(e) = self.write_state(&mut state).await {
            state.settings = previous;
            return Err(e);
        }
        Ok(())
    }
}
