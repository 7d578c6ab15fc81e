// Hosted audit service client for Brief Autopilot
//
// This module posts audit requests to a generative analysis service and turns
// its responses into audit results. Transport and decoding errors are logged
// and reported as failed results.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

use super::runner::{AuditContext, AuditRun, AuditRunner};
use crate::config::RunnerConfig;
use crate::project::{AuditPayload, AuditPhase, AuditResult, AuditWorkflowType};

/// Request body sent to the audit service
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditRequest<'a> {
    workflow_type: AuditWorkflowType,
    phase: AuditPhase,
    model: &'a str,
    context: &'a AuditContext,
    #[serde(skip_serializing_if = "Option::is_none")]
    cached_research: Option<&'a str>,
}

/// Response body returned by the audit service
#[derive(Debug, Clone, Deserialize)]
struct AuditResponse {
    #[serde(flatten)]
    payload: AuditPayload,
    #[serde(default)]
    research: Option<String>,
}

/// Audit runner backed by an HTTP service
pub struct HttpAuditRunner {
    client: reqwest::Client,
    config: RunnerConfig,
}

impl HttpAuditRunner {
    /// Create a runner for the configured endpoint
    pub fn new(config: RunnerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client for the audit service")?;

        Ok(Self { client, config })
    }

    async fn request(
        &self,
        workflow_type: AuditWorkflowType,
        context: &AuditContext,
        cached_research: Option<&str>,
    ) -> Result<AuditResponse> {
        let body = AuditRequest {
            workflow_type,
            phase: workflow_type.phase(),
            model: &self.config.model,
            context,
            cached_research,
        };

        let mut request = self.client.post(&self.config.endpoint).json(&body);
        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to reach audit service: {}", self.config.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Audit service returned {}: {}", status, text);
        }

        response
            .json::<AuditResponse>()
            .await
            .context("Failed to parse audit service response")
    }
}

#[async_trait]
impl AuditRunner for HttpAuditRunner {
    async fn run(
        &self,
        workflow_type: AuditWorkflowType,
        context: &AuditContext,
        cached_research: Option<&str>,
    ) -> AuditRun {
        let start_time = Instant::now();
        info!(
            "Requesting {} for project {} (cached research: {})",
            workflow_type,
            context.project_id,
            cached_research.is_some()
        );

        match self.request(workflow_type, context, cached_research).await {
            Ok(response) => {
                debug!("{} completed in {:?}", workflow_type, start_time.elapsed());
                AuditRun {
                    result: AuditResult::completed(workflow_type, response.payload),
                    research: response.research,
                }
            }
            Err(e) => {
                warn!("{} failed for project {}: {:#}", workflow_type, context.project_id, e);
                AuditRun::failed(workflow_type)
            }
        }
    }
}
