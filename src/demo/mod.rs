// Demo fixtures for Brief Autopilot
//
// This module discovers YAML project fixtures in a directory and inserts them
// into a project store so the engine can be exercised without the hosted
// backend.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::StoreError;
use crate::project::{
    BriefingStatus, ClientId, OwnerId, Project, ProjectId, ProjectStatus, ProjectStore,
};
use crate::workflow::WorkflowStage;

/// Project definition as stored in YAML files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFixture {
    /// Fixed id; generated when absent
    #[serde(default)]
    pub id: Option<ProjectId>,
    pub name: String,
    pub client_id: ClientId,
    pub owner_id: OwnerId,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub briefing_status: BriefingStatus,
    #[serde(default)]
    pub autopilot_enabled: bool,
    /// Starting stage; defaults to the first stage
    #[serde(default)]
    pub stage: Option<WorkflowStage>,
}

impl ProjectFixture {
    /// Check the fixture for problems that would make it unusable
    pub fn validate(&self) -> FixtureValidation {
        let mut validation = FixtureValidation::default();

        if self.name.trim().is_empty() {
            validation.errors.push("Project name cannot be empty".to_string());
        }
        if self.client_id.trim().is_empty() {
            validation.errors.push("client_id cannot be empty".to_string());
        }
        if self.owner_id.trim().is_empty() {
            validation.errors.push("owner_id cannot be empty".to_string());
        }
        if matches!(&self.id, Some(id) if id.trim().is_empty()) {
            validation.errors.push("id cannot be empty when given".to_string());
        }

        let stage = self.stage.unwrap_or_default();
        if stage > WorkflowStage::BriefReceived && self.briefing_status != BriefingStatus::Completed
        {
            validation.errors.push(format!(
                "Stage {} requires a completed briefing",
                stage
            ));
        }

        if self.autopilot_enabled && self.status != ProjectStatus::Active {
            validation
                .warnings
                .push("Autopilot is enabled but the project is not active".to_string());
        }

        validation
    }

    /// Build the project record this fixture describes
    pub fn into_project(self) -> Project {
        let mut project = Project::new(self.client_id, self.owner_id, self.name);
        if let Some(id) = self.id {
            project.id = id;
        }
        project.status = self.status;
        project.briefing_status = self.briefing_status;
        project.autopilot_enabled = self.autopilot_enabled;
        project.autopilot_settings.current_workflow_stage = self.stage.unwrap_or_default();
        project
    }
}

/// Outcome of validating one fixture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixtureValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl FixtureValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Summary of a seeding run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedReport {
    /// Ids of projects that were inserted
    pub imported: Vec<ProjectId>,
    /// Ids that already existed in the store
    pub skipped: Vec<ProjectId>,
    /// Fixture files that could not be used, with the reason
    pub errors: Vec<(PathBuf, String)>,
}

impl SeedReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Discovers fixtures in a directory and seeds a store with them
pub struct ProjectSeeder {
    /// Base directory for fixture files
    fixtures_dir: PathBuf,
}

impl ProjectSeeder {
    /// Create a seeder for a fixture directory
    pub fn new<P: AsRef<Path>>(fixtures_dir: P) -> Result<Self> {
        let fixtures_dir = fixtures_dir.as_ref().to_path_buf();

        if !fixtures_dir.exists() {
            return Err(anyhow::anyhow!(
                "Fixture directory does not exist: {}",
                fixtures_dir.display()
            ));
        }

        Ok(Self { fixtures_dir })
    }

    /// Find all fixture files, sorted by path
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.fixtures_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|path| {
                path.is_file()
                    && path
                        .extension()
                        .map_or(false, |ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        files.sort();

        tracing::debug!(
            "Found {} fixture files in {}",
            files.len(),
            self.fixtures_dir.display()
        );
        files
    }

    /// Load and parse a fixture from a YAML file
    pub fn load_fixture<P: AsRef<Path>>(path: P) -> Result<ProjectFixture> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture file: {}", path.display()))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse fixture YAML: {}", path.display()))
    }

    /// Insert every valid fixture that is not already stored
    ///
    /// Broken fixtures are reported and skipped; store failures other than an
    /// existing id abort the run.
    pub async fn seed(&self, store: &dyn ProjectStore) -> Result<SeedReport> {
        tracing::info!("Seeding projects from {}", self.fixtures_dir.display());
        let mut report = SeedReport::default();

        for path in self.discover() {
            let fixture = match Self::load_fixture(&path) {
                Ok(fixture) => fixture,
                Err(e) => {
                    tracing::error!("Skipping fixture {}: {:?}", path.display(), e);
                    report.errors.push((path, format!("{:#}", e)));
                    continue;
                }
            };

            let validation = fixture.validate();
            for warning in &validation.warnings {
                tracing::warn!("{}: {}", path.display(), warning);
            }
            if !validation.is_valid() {
                report.errors.push((path, validation.errors.join("; ")));
                continue;
            }

            let project = fixture.into_project();
            let id = project.id.clone();
            match store.insert(project).await {
                Ok(()) => {
                    tracing::debug!("Seeded project {} from {}", id, path.display());
                    report.imported.push(id);
                }
                Err(StoreError::AlreadyExists(_)) => {
                    tracing::debug!("Project {} already exists, skipping", id);
                    report.skipped.push(id);
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to store fixture {}", path.display()))
                }
            }
        }

        tracing::info!(
            "Seeded {} projects ({} skipped, {} invalid)",
            report.imported.len(),
            report.skipped.len(),
            report.errors.len()
        );
        Ok(report)
    }
}
