//! Brief Autopilot Library
//!
//! This library provides the project workflow engine for community-management
//! engagements: stage progression from briefing to production, audit
//! sub-workflow tracking, autopilot permission checks and project persistence.

pub mod config;
pub mod demo;
pub mod error;
pub mod notify;
pub mod project;
pub mod utils;
pub mod workflow;

// Re-export main types for convenience
pub use config::ConfigManager;
pub use demo::ProjectSeeder;
pub use error::{EngineError, StoreError};
pub use project::{Project, ProjectStore};
pub use workflow::WorkflowEngine;
