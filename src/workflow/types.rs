// Core workflow types for Brief Autopilot
//
// This module defines the stage enum that drives a project through its
// lifecycle, the derived audit progress view, and the outcome and event types
// the engine reports to its callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::project::{AuditStatus, AuditWorkflowType, Project, ProjectId};

/// Number of audit sub-workflows that gate the audit stage
pub const AUDIT_STEP_COUNT: usize = 10;

/// Ordered lifecycle stage of a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStage {
    /// Project created, briefing not yet completed
    BriefReceived,
    /// Audit sub-workflows are being collected
    AuditSearch,
    /// Audit complete, strategy awaiting approval
    StrategyGen,
    /// Strategy approved, action plan awaiting finalization
    ActionPlan,
    /// Action plan finalized
    Production,
}

impl WorkflowStage {
    /// All stages in lifecycle order
    pub const ALL: [WorkflowStage; 5] = [
        WorkflowStage::BriefReceived,
        WorkflowStage::AuditSearch,
        WorkflowStage::StrategyGen,
        WorkflowStage::ActionPlan,
        WorkflowStage::Production,
    ];

    /// The stage that follows this one, if any
    pub fn next(self) -> Option<WorkflowStage> {
        match self {
            WorkflowStage::BriefReceived => Some(WorkflowStage::AuditSearch),
            WorkflowStage::AuditSearch => Some(WorkflowStage::StrategyGen),
            WorkflowStage::StrategyGen => Some(WorkflowStage::ActionPlan),
            WorkflowStage::ActionPlan => Some(WorkflowStage::Production),
            WorkflowStage::Production => None,
        }
    }

    /// Whether this is the last stage of the lifecycle
    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// Stable wire name of the stage
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowStage::BriefReceived => "BRIEF_RECEIVED",
            WorkflowStage::AuditSearch => "AUDIT_SEARCH",
            WorkflowStage::StrategyGen => "STRATEGY_GEN",
            WorkflowStage::ActionPlan => "ACTION_PLAN",
            WorkflowStage::Production => "PRODUCTION",
        }
    }
}

impl Default for WorkflowStage {
    fn default() -> Self {
        WorkflowStage::BriefReceived
    }
}

impl std::fmt::Display for WorkflowStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derived run state of a project's audit cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    /// At least one step is in flight
    Running,
    /// Idle, either never started or between steps
    Paused,
    /// Every audit step has completed
    Completed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Running => write!(f, "running"),
            RunState::Paused => write!(f, "paused"),
            RunState::Completed => write!(f, "completed"),
        }
    }
}

/// Aggregate audit progress for a project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditProgress {
    /// Derived run state
    pub status: RunState,
    /// Completed steps
    pub current: usize,
    /// Steps required to leave the audit stage
    pub total: usize,
}

impl AuditProgress {
    /// Completion ratio (0.0 to 1.0)
    pub fn progress_ratio(&self) -> f32 {
        if self.total == 0 {
            return 1.0;
        }
        self.current as f32 / self.total as f32
    }
}

impl std::fmt::Display for AuditProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}/{} ({:.0}%)",
            self.status,
            self.current,
            self.total,
            self.progress_ratio() * 100.0
        )
    }
}

/// Local, non-persisted run flags set by the caller for a project
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOverride {
    /// A step was started locally and has not reported back yet
    pub running: bool,
    /// The user paused automatic chaining
    pub paused: bool,
}

/// Process-wide autopilot state passed into eligibility checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutopilotContext {
    /// Global autopilot switch
    pub global_enabled: bool,
}

impl AutopilotContext {
    /// Effective automatic-progression permission for a project
    pub fn permits(&self, project: &Project) -> bool {
        self.global_enabled && project.autopilot_enabled
    }
}

/// Why an eligibility check or autopilot step did nothing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Project status is not `active`
    ProjectInactive,
    /// Global or project autopilot is off
    AutopilotDisabled,
    /// The user paused the project locally
    Paused,
    /// The current stage's completion gate is not met yet
    GateNotMet,
    /// The current stage is left only through an explicit approval
    AwaitingApproval,
    /// The project is in its last stage
    Terminal,
    /// The project is not in the audit stage
    NotAuditing(WorkflowStage),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::ProjectInactive => write!(f, "project is not active"),
            SkipReason::AutopilotDisabled => write!(f, "autopilot is disabled"),
            SkipReason::Paused => write!(f, "project is paused"),
            SkipReason::GateNotMet => write!(f, "stage completion gate not met"),
            SkipReason::AwaitingApproval => write!(f, "stage awaits external approval"),
            SkipReason::Terminal => write!(f, "project is in its final stage"),
            SkipReason::NotAuditing(stage) => write!(f, "project is in stage {}", stage),
        }
    }
}

/// Result of an eligibility check
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// The stage moved forward and the change was persisted
    Advanced {
        project: Project,
        from: WorkflowStage,
        to: WorkflowStage,
    },
    /// Nothing changed and nothing was written
    Unchanged(SkipReason),
}

impl AdvanceOutcome {
    /// Whether a transition happened
    pub fn is_advanced(&self) -> bool {
        matches!(self, AdvanceOutcome::Advanced { .. })
    }
}

/// Result of one autopilot step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A step ran to a terminal status
    Ran {
        project: Project,
        workflow_type: AuditWorkflowType,
        status: AuditStatus,
    },
    /// Autopilot did not run a step
    Suppressed(SkipReason),
    /// Only failed steps remain; a reset or manual rerun is needed
    Blocked { failed: Vec<AuditWorkflowType> },
    /// Nothing is left to start
    Idle(Project),
}

/// Change notification emitted by the engine after a confirmed write
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// An audit step began
    AuditStarted {
        project_id: ProjectId,
        workflow_type: AuditWorkflowType,
    },
    /// An audit step reached a terminal status
    AuditFinished {
        project_id: ProjectId,
        workflow_type: AuditWorkflowType,
        status: AuditStatus,
    },
    /// The project moved to the next stage
    StageAdvanced {
        project_id: ProjectId,
        from: WorkflowStage,
        to: WorkflowStage,
        at: DateTime<Utc>,
    },
    /// Audit results and research cache were cleared
    AuditCycleReset { project_id: ProjectId },
    /// Briefing was marked completed
    BriefingCompleted { project_id: ProjectId },
    /// The per-project autopilot flag changed
    ProjectAutopilotToggled { project_id: ProjectId, enabled: bool },
    /// The global autopilot flag changed
    GlobalAutopilotToggled { enabled: bool },
}

impl EngineEvent {
    /// Project the event refers to, if it is project-scoped
    pub fn project_id(&self) -> Option<&ProjectId> {
        match self {
            EngineEvent::AuditStarted { project_id, .. }
            | EngineEvent::AuditFinished { project_id, .. }
            | EngineEvent::StageAdvanced { project_id, .. }
            | EngineEvent::AuditCycleReset { project_id }
            | EngineEvent::BriefingCompleted { project_id }
            | EngineEvent::ProjectAutopilotToggled { project_id, .. } => Some(project_id),
            EngineEvent::GlobalAutopilotToggled { .. } => None,
        }
    }
}

/// Tunables for the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Upper bound for a single audit runner call
    pub audit_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            audit_timeout: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_is_linear() {
        let mut stage = WorkflowStage::BriefReceived;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            stage = next;
            visited.push(stage);
        }
        assert_eq!(visited, WorkflowStage::ALL.to_vec());
        assert!(WorkflowStage::Production.is_terminal());
    }

    #[test]
    fn test_stage_wire_names() {
        let json = serde_json::to_string(&WorkflowStage::AuditSearch).unwrap();
        assert_eq!(json, "\"AUDIT_SEARCH\"");

        let stage: WorkflowStage = serde_json::from_str("\"ACTION_PLAN\"").unwrap();
        assert_eq!(stage, WorkflowStage::ActionPlan);
        assert!(serde_json::from_str::<WorkflowStage>("\"UNKNOWN\"").is_err());
        assert_eq!(WorkflowStage::default(), WorkflowStage::BriefReceived);
    }

    #[test]
    fn test_progress_ratio() {
        let progress = AuditProgress {
            status: RunState::Paused,
            current: 5,
            total: AUDIT_STEP_COUNT,
        };
        assert!((progress.progress_ratio() - 0.5).abs() < f32::EPSILON);
        assert_eq!(progress.to_string(), "paused 5/10 (50%)");

        let done = AuditProgress {
            status: RunState::Completed,
            current: AUDIT_STEP_COUNT,
            total: AUDIT_STEP_COUNT,
        };
        assert_eq!(done.to_string(), "completed 10/10 (100%)");
    }

    #[test]
    fn test_event_project_scope() {
        let reset = EngineEvent::AuditCycleReset {
            project_id: "p-1".to_string(),
        };
        assert_eq!(reset.project_id().map(String::as_str), Some("p-1"));

        let toggled = EngineEvent::GlobalAutopilotToggled { enabled: true };
        assert!(toggled.project_id().is_none());
    }

    #[test]
    fn test_engine_options_default() {
        assert_eq!(EngineOptions::default().audit_timeout, Duration::from_secs(300));
    }
}
