// Project record types for Brief Autopilot
//
// This module defines the project document the engine reads and writes, the
// audit result records keyed by sub-workflow type, and the partial update the
// store applies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use uuid::Uuid;

use crate::workflow::WorkflowStage;

/// Unique identifier for a project
pub type ProjectId = String;

/// Reference to the client a project belongs to
pub type ClientId = String;

/// Account that owns a project
pub type OwnerId = String;

/// Audit results indexed by sub-workflow type
pub type AuditResults = BTreeMap<AuditWorkflowType, AuditResult>;

/// Commercial status of a project, independent from its workflow stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Active,
    Planned,
    Completed,
}

impl Default for ProjectStatus {
    fn default() -> Self {
        ProjectStatus::Planned
    }
}

impl FromStr for ProjectStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(ProjectStatus::Active),
            "planned" => Ok(ProjectStatus::Planned),
            "completed" => Ok(ProjectStatus::Completed),
            _ => Err(format!("Invalid project status: {}", s)),
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectStatus::Active => write!(f, "active"),
            ProjectStatus::Planned => write!(f, "planned"),
            ProjectStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Status of the client briefing questionnaire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BriefingStatus {
    NotSent,
    Sent,
    Completed,
}

impl Default for BriefingStatus {
    fn default() -> Self {
        BriefingStatus::NotSent
    }
}

impl std::fmt::Display for BriefingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BriefingStatus::NotSent => write!(f, "not sent"),
            BriefingStatus::Sent => write!(f, "sent"),
            BriefingStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Audit phase label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditPhase {
    #[serde(rename = "phase_1")]
    Phase1,
    #[serde(rename = "phase_2")]
    Phase2,
}

impl std::fmt::Display for AuditPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditPhase::Phase1 => write!(f, "phase_1"),
            AuditPhase::Phase2 => write!(f, "phase_2"),
        }
    }
}

/// The ten fixed audit sub-workflows
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditWorkflowType {
    BrandAudit,
    CompetitiveAnalysis,
    AudienceAnalysis,
    SocialPresenceAudit,
    ContentPerformance,
    MarketTrends,
    SentimentAnalysis,
    InfluencerMapping,
    ChannelBenchmark,
    SwotSynthesis,
}

impl AuditWorkflowType {
    /// All sub-workflows, phase 1 first
    pub const ALL: [AuditWorkflowType; 10] = [
        AuditWorkflowType::BrandAudit,
        AuditWorkflowType::CompetitiveAnalysis,
        AuditWorkflowType::AudienceAnalysis,
        AuditWorkflowType::SocialPresenceAudit,
        AuditWorkflowType::ContentPerformance,
        AuditWorkflowType::MarketTrends,
        AuditWorkflowType::SentimentAnalysis,
        AuditWorkflowType::InfluencerMapping,
        AuditWorkflowType::ChannelBenchmark,
        AuditWorkflowType::SwotSynthesis,
    ];

    /// Phase label derived from the position in `ALL`
    pub fn phase(self) -> AuditPhase {
        match self {
            AuditWorkflowType::BrandAudit
            | AuditWorkflowType::CompetitiveAnalysis
            | AuditWorkflowType::AudienceAnalysis
            | AuditWorkflowType::SocialPresenceAudit
            | AuditWorkflowType::ContentPerformance => AuditPhase::Phase1,
            AuditWorkflowType::MarketTrends
            | AuditWorkflowType::SentimentAnalysis
            | AuditWorkflowType::InfluencerMapping
            | AuditWorkflowType::ChannelBenchmark
            | AuditWorkflowType::SwotSynthesis => AuditPhase::Phase2,
        }
    }

    /// Stable wire name
    pub fn as_str(self) -> &'static str {
        match self {
            AuditWorkflowType::BrandAudit => "brand_audit",
            AuditWorkflowType::CompetitiveAnalysis => "competitive_analysis",
            AuditWorkflowType::AudienceAnalysis => "audience_analysis",
            AuditWorkflowType::SocialPresenceAudit => "social_presence_audit",
            AuditWorkflowType::ContentPerformance => "content_performance",
            AuditWorkflowType::MarketTrends => "market_trends",
            AuditWorkflowType::SentimentAnalysis => "sentiment_analysis",
            AuditWorkflowType::InfluencerMapping => "influencer_mapping",
            AuditWorkflowType::ChannelBenchmark => "channel_benchmark",
            AuditWorkflowType::SwotSynthesis => "swot_synthesis",
        }
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            AuditWorkflowType::BrandAudit => "Brand Audit",
            AuditWorkflowType::CompetitiveAnalysis => "Competitive Analysis",
            AuditWorkflowType::AudienceAnalysis => "Audience Analysis",
            AuditWorkflowType::SocialPresenceAudit => "Social Presence Audit",
            AuditWorkflowType::ContentPerformance => "Content Performance",
            AuditWorkflowType::MarketTrends => "Market Trends",
            AuditWorkflowType::SentimentAnalysis => "Sentiment Analysis",
            AuditWorkflowType::InfluencerMapping => "Influencer Mapping",
            AuditWorkflowType::ChannelBenchmark => "Channel Benchmark",
            AuditWorkflowType::SwotSynthesis => "SWOT Synthesis",
        }
    }
}

impl std::fmt::Display for AuditWorkflowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AuditWorkflowType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        AuditWorkflowType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("Unknown audit workflow type: {}", s))
    }
}

/// Execution status of an audit sub-workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Running,
    Completed,
    Failed,
}

impl AuditStatus {
    /// Whether the status is final
    pub fn is_terminal(self) -> bool {
        !matches!(self, AuditStatus::Running)
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditStatus::Running => write!(f, "running"),
            AuditStatus::Completed => write!(f, "completed"),
            AuditStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Opaque analysis output, not interpreted by the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditPayload {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub tables: Vec<serde_json::Value>,
}

/// Outcome of one audit sub-workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    pub workflow_type: AuditWorkflowType,
    pub status: AuditStatus,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub tables: Vec<serde_json::Value>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    /// Set only once the status is terminal
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl AuditResult {
    /// A step that has just started
    pub fn running(workflow_type: AuditWorkflowType) -> Self {
        Self {
            workflow_type,
            status: AuditStatus::Running,
            summary: String::new(),
            score: None,
            sources: Vec::new(),
            tables: Vec::new(),
            started_at: Some(Utc::now()),
            completed_at: None,
        }
    }

    /// A step that finished with a payload
    pub fn completed(workflow_type: AuditWorkflowType, payload: AuditPayload) -> Self {
        Self {
            workflow_type,
            status: AuditStatus::Completed,
            summary: payload.summary,
            score: payload.score,
            sources: payload.sources,
            tables: payload.tables,
            started_at: None,
            completed_at: Some(Utc::now()),
        }
    }

    /// A step that failed; the summary is shown to the user as-is
    pub fn failed(workflow_type: AuditWorkflowType, summary: impl Into<String>) -> Self {
        Self {
            workflow_type,
            status: AuditStatus::Failed,
            summary: summary.into(),
            score: None,
            sources: Vec::new(),
            tables: Vec::new(),
            started_at: None,
            completed_at: Some(Utc::now()),
        }
    }

    /// Carry the start time over from the running record
    pub fn with_started_at(mut self, started_at: Option<DateTime<Utc>>) -> Self {
        if self.started_at.is_none() {
            self.started_at = started_at;
        }
        self
    }

    /// Phase label of this result
    pub fn phase(&self) -> AuditPhase {
        self.workflow_type.phase()
    }
}

/// Per-project autopilot bookkeeping
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutopilotSettings {
    #[serde(default)]
    pub current_workflow_stage: WorkflowStage,
    #[serde(default)]
    pub last_transition_at: Option<DateTime<Utc>>,
}

/// A client project moving through the workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub client_id: ClientId,
    pub owner_id: OwnerId,
    pub name: String,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub briefing_status: BriefingStatus,
    #[serde(default)]
    pub autopilot_enabled: bool,
    #[serde(default)]
    pub autopilot_settings: AutopilotSettings,
    #[serde(default)]
    pub audit_results: AuditResults,
    #[serde(rename = "global_research_cache", default)]
    pub global_research_cache: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new planned project that has not been briefed
    pub fn new(client_id: ClientId, owner_id: OwnerId, name: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            client_id,
            owner_id,
            name,
            status: ProjectStatus::default(),
            briefing_status: BriefingStatus::default(),
            autopilot_enabled: false,
            autopilot_settings: AutopilotSettings::default(),
            audit_results: AuditResults::new(),
            global_research_cache: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current workflow stage
    pub fn stage(&self) -> WorkflowStage {
        self.autopilot_settings.current_workflow_stage
    }

    /// Result recorded for a sub-workflow, if any
    pub fn audit_result(&self, workflow_type: AuditWorkflowType) -> Option<&AuditResult> {
        self.audit_results.get(&workflow_type)
    }

    /// Sub-workflows with the given status
    pub fn audits_with_status(&self, status: AuditStatus) -> Vec<AuditWorkflowType> {
        self.audit_results
            .values()
            .filter(|r| r.status == status)
            .map(|r| r.workflow_type)
            .collect()
    }
}

/// Process-wide settings persisted alongside the projects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSettings {
    #[serde(default)]
    pub global_autopilot: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Partial update applied by a store to a single project
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectUpdate {
    pub briefing_status: Option<BriefingStatus>,
    pub autopilot_enabled: Option<bool>,
    pub current_workflow_stage: Option<WorkflowStage>,
    /// Replace the whole result map
    pub audit_results: Option<AuditResults>,
    /// Upsert individual results, applied after `audit_results`
    pub upsert_audit_results: Vec<AuditResult>,
    /// `Some(None)` clears the cache
    pub global_research_cache: Option<Option<String>>,
}

impl ProjectUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_briefing_status(mut self, status: BriefingStatus) -> Self {
        self.briefing_status = Some(status);
        self
    }

    pub fn with_autopilot_enabled(mut self, enabled: bool) -> Self {
        self.autopilot_enabled = Some(enabled);
        self
    }

    pub fn with_stage(mut self, stage: WorkflowStage) -> Self {
        self.current_workflow_stage = Some(stage);
        self
    }

    pub fn with_audit_result(mut self, result: AuditResult) -> Self {
        self.upsert_audit_results.push(result);
        self
    }

    pub fn with_research_cache(mut self, research: String) -> Self {
        self.global_research_cache = Some(Some(research));
        self
    }

    /// Clear all audit results and the research cache
    pub fn clear_audit_cycle(mut self) -> Self {
        self.audit_results = Some(AuditResults::new());
        self.upsert_audit_results.clear();
        self.global_research_cache = Some(None);
        self
    }

    /// Whether the update changes nothing
    pub fn is_empty(&self) -> bool {
        *self == ProjectUpdate::default()
    }

    /// Apply the update to a project record
    pub fn apply_to(&self, project: &mut Project) {
        if let Some(briefing_status) = self.briefing_status {
            project.briefing_status = briefing_status;
        }
        if let Some(enabled) = self.autopilot_enabled {
            project.autopilot_enabled = enabled;
        }
        if let Some(stage) = self.current_workflow_stage {
            if stage != project.autopilot_settings.current_workflow_stage {
                project.autopilot_settings.last_transition_at = Some(Utc::now());
            }
            project.autopilot_settings.current_workflow_stage = stage;
        }
        if let Some(results) = &self.audit_results {
            project.audit_results = results.clone();
        }
        for result in &self.upsert_audit_results {
            project
                .audit_results
                .insert(result.workflow_type, result.clone());
        }
        if let Some(research) = &self.global_research_cache {
            project.global_research_cache = research.clone();
        }
        project.updated_at = Utc::now();
    }
}
