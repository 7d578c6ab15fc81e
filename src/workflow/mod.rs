// Workflow module for Brief Autopilot
//
// This module provides the stage engine that moves projects from briefing
// through audit, strategy and action plan into production, together with the
// audit runners it delegates analyses to.

pub mod client;
pub mod engine;
pub mod runner;
pub mod types;

use anyhow::Result;

use crate::config::EngineConfig;
use crate::project::{open_store, GlobalSettings};

// Re-export commonly used types
pub use client::HttpAuditRunner;
pub use engine::WorkflowEngine;
pub use runner::{build_runner, AuditContext, AuditRun, AuditRunner, DemoAuditRunner};
pub use types::*;

/// Assemble an engine from configuration
pub async fn build_engine(config: &EngineConfig) -> Result<WorkflowEngine> {
    tracing::debug!("Initializing workflow engine");

    let store = open_store(&config.store).await?;

    // The configured flag applies until the global toggle is used once
    let settings = store.load_settings().await?;
    if settings.updated_at.is_none() && settings.global_autopilot != config.autopilot.global_enabled
    {
        store
            .save_settings(&GlobalSettings {
                global_autopilot: config.autopilot.global_enabled,
                updated_at: None,
            })
            .await?;
    }

    let runner = build_runner(&config.runner)?;
    let options = EngineOptions {
        audit_timeout: config.autopilot.audit_timeout,
    };

    Ok(WorkflowEngine::new(store, runner).with_options(options))
}
