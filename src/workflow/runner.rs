// Audit runner interface for Brief Autopilot
//
// An audit runner executes one named analysis for a project. Runners never
// return errors: a failed analysis is reported as a `failed` result so the
// engine's completion counting always terminates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::{RunnerConfig, RunnerMode};
use crate::project::{
    AuditPayload, AuditResult, AuditStatus, AuditWorkflowType, ClientId, Project, ProjectId,
};

use super::client::HttpAuditRunner;

/// Summary recorded when an analysis fails
pub const GENERIC_FAILURE_SUMMARY: &str =
    "The analysis could not be completed. Restart the analysis to try again.";

/// Project facts handed to the runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditContext {
    pub project_id: ProjectId,
    pub project_name: String,
    pub client_id: ClientId,
    /// Summaries of steps that already completed
    pub prior_summaries: BTreeMap<AuditWorkflowType, String>,
}

impl AuditContext {
    /// Build the context from a loaded project
    pub fn from_project(project: &Project) -> Self {
        let prior_summaries = project
            .audit_results
            .values()
            .filter(|r| r.status == AuditStatus::Completed)
            .map(|r| (r.workflow_type, r.summary.clone()))
            .collect();

        Self {
            project_id: project.id.clone(),
            project_name: project.name.clone(),
            client_id: project.client_id.clone(),
            prior_summaries,
        }
    }
}

/// Output of a single runner call
#[derive(Debug, Clone, PartialEq)]
pub struct AuditRun {
    /// Terminal result for the step
    pub result: AuditResult,
    /// Research text the runner gathered, reusable by later steps
    pub research: Option<String>,
}

impl AuditRun {
    /// A failed run with the generic summary
    pub fn failed(workflow_type: AuditWorkflowType) -> Self {
        Self {
            result: AuditResult::failed(workflow_type, GENERIC_FAILURE_SUMMARY),
            research: None,
        }
    }
}

/// Executes audit sub-workflows
#[async_trait]
pub trait AuditRunner: Send + Sync {
    /// Run one analysis; failures come back as a `failed` result
    async fn run(
        &self,
        workflow_type: AuditWorkflowType,
        context: &AuditContext,
        cached_research: Option<&str>,
    ) -> AuditRun;
}

/// Runner producing deterministic results without any external call
#[derive(Debug, Clone, Default)]
pub struct DemoAuditRunner {
    failing: HashSet<AuditWorkflowType>,
    latency: Duration,
}

impl DemoAuditRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the given sub-workflows fail
    pub fn with_failures(mut self, failing: impl IntoIterator<Item = AuditWorkflowType>) -> Self {
        self.failing.extend(failing);
        self
    }

    /// Simulate service latency on every call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl AuditRunner for DemoAuditRunner {
    async fn run(
        &self,
        workflow_type: AuditWorkflowType,
        context: &AuditContext,
        cached_research: Option<&str>,
    ) -> AuditRun {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.failing.contains(&workflow_type) {
            return AuditRun::failed(workflow_type);
        }

        let index = AuditWorkflowType::ALL
            .iter()
            .position(|t| *t == workflow_type)
            .unwrap_or_default();

        let payload = AuditPayload {
            summary: format!(
                "{} for {}: demo findings based on {} earlier analyses",
                workflow_type.label(),
                context.project_name,
                context.prior_summaries.len()
            ),
            score: Some(60.0 + index as f64 * 3.0),
            sources: vec![format!("demo://{}/{}", context.client_id, workflow_type)],
            tables: Vec::new(),
        };

        AuditRun {
            result: AuditResult::completed(workflow_type, payload),
            research: match cached_research {
                Some(_) => None,
                None => Some(format!("Demo research notes for client {}", context.client_id)),
            },
        }
    }
}

/// Build the runner selected by configuration
pub fn build_runner(config: &RunnerConfig) -> anyhow::Result<Arc<dyn AuditRunner>> {
    match config.mode {
        RunnerMode::Demo => {
            tracing::info!("Using demo audit runner");
            Ok(Arc::new(DemoAuditRunner::new()))
        }
        RunnerMode::Http => {
            tracing::info!("Using audit service at {}", config.endpoint);
            Ok(Arc::new(HttpAuditRunner::new(config.clone())?))
        }
    }
}
