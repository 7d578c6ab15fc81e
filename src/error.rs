// Error types for Brief Autopilot
//
// Store and engine errors are typed so callers can tell a retryable
// persistence failure from a request that is invalid for the project's stage.

use std::path::PathBuf;
use thiserror::Error;

use crate::project::{AuditWorkflowType, ProjectId};
use crate::workflow::WorkflowStage;

/// Errors raised by a `ProjectStore` backend
#[derive(Debug, Error)]
pub enum StoreError {
    /// No project with the given id exists
    #[error("project not found: {0}")]
    NotFound(ProjectId),

    /// A project with the given id already exists
    #[error("project already exists: {0}")]
    AlreadyExists(ProjectId),

    /// Reading or writing the backing file failed
    #[error("store I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The stored state could not be encoded or decoded
    #[error("store serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend rejected or could not serve the request
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Io { .. } | StoreError::Unavailable(_))
    }
}

/// Result alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by the workflow engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Persisting a change failed; nothing was applied
    #[error("failed to persist project change: {0}")]
    Persistence(#[from] StoreError),

    /// The operation is not valid in the project's current stage
    #[error("project {project_id} is in stage {actual}, expected {expected}")]
    InvalidStage {
        project_id: ProjectId,
        expected: WorkflowStage,
        actual: WorkflowStage,
    },

    /// The requested audit step is already in flight
    #[error("audit step {workflow_type} is already running for project {project_id}")]
    StepAlreadyRunning {
        project_id: ProjectId,
        workflow_type: AuditWorkflowType,
    },

    /// The audit cycle cannot be reset while one of its steps is in flight
    #[error("project {project_id} has audit steps in flight")]
    AuditInProgress { project_id: ProjectId },
}

impl EngineError {
    /// Whether the caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Persistence(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// Result alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
