// Workflow stage engine for Brief Autopilot
//
// This module drives projects through their workflow stages: it derives audit
// progress, runs audit sub-workflows, applies autopilot permission checks and
// persists stage transitions. Every change is persisted before it is reported;
// nothing is applied optimistically.

use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::runner::{AuditContext, AuditRun, AuditRunner};
use super::types::*;
use crate::error::{EngineError, EngineResult};
use crate::notify::{Notification, NotificationSink, TracingNotifier};
use crate::project::{
    AuditResult, AuditStatus, AuditWorkflowType, BriefingStatus, GlobalSettings, Project,
    ProjectId, ProjectStatus, ProjectStore, ProjectUpdate,
};

/// Engine that owns stage progression for projects
#[derive(Clone)]
pub struct WorkflowEngine {
    /// Project persistence
    store: Arc<dyn ProjectStore>,
    /// Executes audit sub-workflows
    runner: Arc<dyn AuditRunner>,
    /// User-facing messages
    notifier: Arc<dyn NotificationSink>,
    /// Local run flags, never persisted
    overrides: Arc<RwLock<HashMap<ProjectId, RunOverride>>>,
    /// Audit steps this engine is executing right now
    in_flight: Arc<RwLock<HashSet<(ProjectId, AuditWorkflowType)>>>,
    /// Change reporting channel
    event_sender: Option<mpsc::UnboundedSender<EngineEvent>>,
    /// Tunables
    options: EngineOptions,
}

impl WorkflowEngine {
    /// Create an engine over a store and a runner
    pub fn new(store: Arc<dyn ProjectStore>, runner: Arc<dyn AuditRunner>) -> Self {
        Self {
            store,
            runner,
            notifier: Arc::new(TracingNotifier),
            overrides: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Arc::new(RwLock::new(HashSet::new())),
            event_sender: None,
            options: EngineOptions::default(),
        }
    }

    /// Route user-facing messages to a custom sink
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Override the default tunables
    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Set up change reporting
    pub fn with_event_reporting(mut self) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.event_sender = Some(sender);
        (self, receiver)
    }

    /// The underlying store
    pub fn store(&self) -> &Arc<dyn ProjectStore> {
        &self.store
    }

    /// Derive audit progress from a project and its local run flags
    pub fn compute_audit_status(project: &Project, overrides: Option<&RunOverride>) -> AuditProgress {
        let total = AUDIT_STEP_COUNT;
        let current = project
            .audit_results
            .values()
            .filter(|r| r.status == AuditStatus::Completed)
            .count()
            .min(total);

        let status = if current >= total {
            RunState::Completed
        } else {
            let running = project
                .audit_results
                .values()
                .any(|r| r.status == AuditStatus::Running)
                || overrides.map_or(false, |o| o.running);
            let paused = overrides.map_or(false, |o| o.paused);

            if running && !paused {
                RunState::Running
            } else {
                RunState::Paused
            }
        };

        AuditProgress {
            status,
            current,
            total,
        }
    }

    /// Audit progress including this engine's local run flags
    pub async fn audit_status(&self, project: &Project) -> AuditProgress {
        let overrides = self.overrides.read().await;
        Self::compute_audit_status(project, overrides.get(&project.id))
    }

    /// Current process-wide autopilot state
    pub async fn autopilot_context(&self) -> EngineResult<AutopilotContext> {
        let settings = self.store.load_settings().await?;
        Ok(AutopilotContext {
            global_enabled: settings.global_autopilot,
        })
    }

    /// Move the project to its next stage when its gate is met
    ///
    /// Safe to call speculatively: an ineligible project is returned as
    /// `Unchanged` without touching the store. Only the briefing and audit
    /// gates are evaluated here; later stages wait for explicit approvals.
    pub async fn advance_if_eligible(
        &self,
        project: &Project,
        context: &AutopilotContext,
    ) -> EngineResult<AdvanceOutcome> {
        if project.status != ProjectStatus::Active {
            return Ok(AdvanceOutcome::Unchanged(SkipReason::ProjectInactive));
        }
        if !context.permits(project) {
            return Ok(AdvanceOutcome::Unchanged(SkipReason::AutopilotDisabled));
        }

        let from = project.stage();
        let gate_met = match from {
            WorkflowStage::BriefReceived => project.briefing_status == BriefingStatus::Completed,
            WorkflowStage::AuditSearch => {
                Self::compute_audit_status(project, None).status == RunState::Completed
            }
            WorkflowStage::StrategyGen | WorkflowStage::ActionPlan => {
                return Ok(AdvanceOutcome::Unchanged(SkipReason::AwaitingApproval))
            }
            WorkflowStage::Production => {
                return Ok(AdvanceOutcome::Unchanged(SkipReason::Terminal))
            }
        };

        if !gate_met {
            debug!("Project {} not ready to leave {}", project.id, from);
            return Ok(AdvanceOutcome::Unchanged(SkipReason::GateNotMet));
        }

        let to = match from.next() {
            Some(to) => to,
            None => return Ok(AdvanceOutcome::Unchanged(SkipReason::Terminal)),
        };

        let updated = self
            .persist(project, ProjectUpdate::new().with_stage(to))
            .await?;
        self.report_transition(&updated, from, to);

        Ok(AdvanceOutcome::Advanced {
            project: updated,
            from,
            to,
        })
    }

    /// Clear audit results and research cache to rerun the audit from scratch
    ///
    /// Rejected while a step of this project is executing, since its result
    /// would land in the fresh cycle.
    pub async fn reset_audit_cycle(&self, project: &Project) -> EngineResult<Project> {
        let actual = project.stage();
        if actual > WorkflowStage::AuditSearch {
            return Err(EngineError::InvalidStage {
                project_id: project.id.clone(),
                expected: WorkflowStage::AuditSearch,
                actual,
            });
        }

        // Held across the write so no step can start mid-reset
        let in_flight = self.in_flight.write().await;
        if in_flight.iter().any(|(id, _)| id == &project.id) {
            return Err(EngineError::AuditInProgress {
                project_id: project.id.clone(),
            });
        }
        let updated = self
            .persist(project, ProjectUpdate::new().clear_audit_cycle())
            .await?;
        self.overrides.write().await.remove(&project.id);
        drop(in_flight);

        info!("Reset audit cycle for project {}", project.id);
        self.emit(EngineEvent::AuditCycleReset {
            project_id: project.id.clone(),
        });
        self.notifier.notify(Notification::info(format!(
            "Analysis for {} restarted from scratch",
            project.name
        )));

        Ok(updated)
    }

    /// Switch autopilot on or off for every project
    pub async fn toggle_global_autopilot(&self, enabled: bool) -> EngineResult<AutopilotContext> {
        let settings = GlobalSettings {
            global_autopilot: enabled,
            updated_at: Some(Utc::now()),
        };
        self.store.save_settings(&settings).await?;

        info!("Global autopilot {}", if enabled { "enabled" } else { "disabled" });
        self.emit(EngineEvent::GlobalAutopilotToggled { enabled });

        Ok(AutopilotContext {
            global_enabled: enabled,
        })
    }

    /// Switch autopilot on or off for one project
    pub async fn toggle_project_autopilot(
        &self,
        project: &Project,
        enabled: bool,
    ) -> EngineResult<Project> {
        let updated = self
            .persist(project, ProjectUpdate::new().with_autopilot_enabled(enabled))
            .await?;

        info!(
            "Autopilot {} for project {}",
            if enabled { "enabled" } else { "disabled" },
            project.id
        );
        self.emit(EngineEvent::ProjectAutopilotToggled {
            project_id: project.id.clone(),
            enabled,
        });

        Ok(updated)
    }

    /// Record the completed briefing and open the audit stage
    pub async fn complete_briefing(&self, project: &Project) -> EngineResult<Project> {
        let from = project.stage();
        if from != WorkflowStage::BriefReceived {
            return Err(EngineError::InvalidStage {
                project_id: project.id.clone(),
                expected: WorkflowStage::BriefReceived,
                actual: from,
            });
        }

        let updated = self
            .persist(
                project,
                ProjectUpdate::new()
                    .with_briefing_status(BriefingStatus::Completed)
                    .with_stage(WorkflowStage::AuditSearch),
            )
            .await?;

        self.emit(EngineEvent::BriefingCompleted {
            project_id: project.id.clone(),
        });
        self.report_transition(&updated, from, WorkflowStage::AuditSearch);

        Ok(updated)
    }

    /// Approve the generated strategy and open the action plan stage
    pub async fn approve_strategy(&self, project: &Project) -> EngineResult<Project> {
        self.transition_on_approval(project, WorkflowStage::StrategyGen)
            .await
    }

    /// Finalize the action plan and move the project into production
    pub async fn finalize_action_plan(&self, project: &Project) -> EngineResult<Project> {
        self.transition_on_approval(project, WorkflowStage::ActionPlan)
            .await
    }

    /// Stop automatic chaining for a project until resumed
    pub async fn pause(&self, project_id: &ProjectId) {
        self.overrides
            .write()
            .await
            .entry(project_id.clone())
            .or_default()
            .paused = true;
        info!("Paused autopilot for project {}", project_id);
    }

    /// Clear a local pause
    pub async fn resume(&self, project_id: &ProjectId) {
        let mut overrides = self.overrides.write().await;
        if let Some(entry) = overrides.get_mut(project_id) {
            entry.paused = false;
            if *entry == RunOverride::default() {
                overrides.remove(project_id);
            }
        }
        info!("Resumed autopilot for project {}", project_id);
    }

    /// Whether the project is locally paused
    pub async fn is_paused(&self, project_id: &ProjectId) -> bool {
        self.overrides
            .read()
            .await
            .get(project_id)
            .map_or(false, |o| o.paused)
    }

    /// Run one audit sub-workflow on request
    ///
    /// Not gated by autopilot flags. After the result is stored the project is
    /// reloaded and offered to `advance_if_eligible`, which applies the flags.
    /// A persisted `running` record that this engine is not executing is stale
    /// and the step may be run again.
    pub async fn run_audit_step(
        &self,
        project: &Project,
        workflow_type: AuditWorkflowType,
    ) -> EngineResult<Project> {
        let stage = project.stage();
        if stage != WorkflowStage::AuditSearch {
            return Err(EngineError::InvalidStage {
                project_id: project.id.clone(),
                expected: WorkflowStage::AuditSearch,
                actual: stage,
            });
        }
        if !self.claim_step(&project.id, workflow_type).await {
            return Err(EngineError::StepAlreadyRunning {
                project_id: project.id.clone(),
                workflow_type,
            });
        }

        let running = AuditResult::running(workflow_type);
        let started_at = running.started_at;

        let project = match self
            .persist(project, ProjectUpdate::new().with_audit_result(running))
            .await
        {
            Ok(project) => project,
            Err(e) => {
                self.release_step(&project.id, workflow_type).await;
                return Err(e);
            }
        };

        info!(
            "Running {} ({}) for project {}",
            workflow_type,
            workflow_type.phase(),
            project.id
        );
        self.emit(EngineEvent::AuditStarted {
            project_id: project.id.clone(),
            workflow_type,
        });

        let run = self.execute_runner(&project, workflow_type).await;

        let mut result = run.result.with_started_at(started_at);
        result.workflow_type = workflow_type;
        if !result.status.is_terminal() {
            warn!("Runner returned a non-terminal result for {}", workflow_type);
            result = AuditResult::failed(workflow_type, super::runner::GENERIC_FAILURE_SUMMARY)
                .with_started_at(started_at);
        }
        let status = result.status;

        let mut update = ProjectUpdate::new().with_audit_result(result);
        if project.global_research_cache.is_none() {
            if let Some(research) = run.research {
                update = update.with_research_cache(research);
            }
        }

        let saved = self.store.save(&project.id, &update).await;
        self.release_step(&project.id, workflow_type).await;
        if let Err(e) = saved {
            warn!(
                "Failed to store {} result for project {}: {}",
                workflow_type, project.id, e
            );
            self.notifier.notify(Notification::error(format!(
                "{} for {} could not be saved. Run it again.",
                workflow_type.label(),
                project.name
            )));
            return Err(e.into());
        }

        self.emit(EngineEvent::AuditFinished {
            project_id: project.id.clone(),
            workflow_type,
            status,
        });
        match status {
            AuditStatus::Completed => self.notifier.notify(Notification::success(format!(
                "{} completed for {}",
                workflow_type.label(),
                project.name
            ))),
            _ => self.notifier.notify(Notification::warning(format!(
                "{} failed for {}. Restart the analysis to try again.",
                workflow_type.label(),
                project.name
            ))),
        }

        let project = self.store.load(&project.id).await?;
        let context = self.autopilot_context().await?;
        match self.advance_if_eligible(&project, &context).await? {
            AdvanceOutcome::Advanced { project, .. } => Ok(project),
            AdvanceOutcome::Unchanged(_) => Ok(project),
        }
    }

    /// Run the next pending audit step if autopilot permits it
    pub async fn run_next_audit_step(&self, project_id: &ProjectId) -> EngineResult<StepOutcome> {
        let project = self.store.load(project_id).await?;
        if project.status != ProjectStatus::Active {
            return Ok(StepOutcome::Suppressed(SkipReason::ProjectInactive));
        }

        let context = self.autopilot_context().await?;
        if !context.permits(&project) {
            return Ok(StepOutcome::Suppressed(SkipReason::AutopilotDisabled));
        }
        if self.is_paused(project_id).await {
            return Ok(StepOutcome::Suppressed(SkipReason::Paused));
        }

        let project = if project.stage() == WorkflowStage::BriefReceived {
            match self.advance_if_eligible(&project, &context).await? {
                AdvanceOutcome::Advanced { project, .. } => project,
                AdvanceOutcome::Unchanged(reason) => return Ok(StepOutcome::Suppressed(reason)),
            }
        } else {
            project
        };

        let stage = project.stage();
        if stage != WorkflowStage::AuditSearch {
            return Ok(StepOutcome::Suppressed(SkipReason::NotAuditing(stage)));
        }

        if let Some(workflow_type) = self.next_runnable_step(&project).await {
            let project = self.run_audit_step(&project, workflow_type).await?;
            let status = project
                .audit_result(workflow_type)
                .map_or(AuditStatus::Failed, |r| r.status);
            return Ok(StepOutcome::Ran {
                project,
                workflow_type,
                status,
            });
        }

        let failed = project.audits_with_status(AuditStatus::Failed);
        if !failed.is_empty() {
            return Ok(StepOutcome::Blocked { failed });
        }

        match self.advance_if_eligible(&project, &context).await? {
            AdvanceOutcome::Advanced { project, .. } => Ok(StepOutcome::Idle(project)),
            AdvanceOutcome::Unchanged(_) => Ok(StepOutcome::Idle(project)),
        }
    }

    /// Chain autopilot steps until none can run
    pub async fn run_autopilot(&self, project_id: &ProjectId) -> EngineResult<Project> {
        loop {
            match self.run_next_audit_step(project_id).await? {
                StepOutcome::Ran {
                    workflow_type,
                    status,
                    ..
                } => {
                    debug!("Autopilot step {} finished: {}", workflow_type, status);
                }
                StepOutcome::Idle(project) => return Ok(project),
                StepOutcome::Suppressed(reason) => {
                    debug!("Autopilot stopped for project {}: {}", project_id, reason);
                    break;
                }
                StepOutcome::Blocked { failed } => {
                    self.notifier.notify(Notification::warning(format!(
                        "{} analyses failed. Restart the analysis to continue.",
                        failed.len()
                    )));
                    break;
                }
            }
        }

        Ok(self.store.load(project_id).await?)
    }

    async fn transition_on_approval(
        &self,
        project: &Project,
        expected: WorkflowStage,
    ) -> EngineResult<Project> {
        let actual = project.stage();
        let to = match expected.next() {
            Some(to) if actual == expected => to,
            _ => {
                return Err(EngineError::InvalidStage {
                    project_id: project.id.clone(),
                    expected,
                    actual,
                })
            }
        };

        let updated = self
            .persist(project, ProjectUpdate::new().with_stage(to))
            .await?;
        self.report_transition(&updated, expected, to);
        Ok(updated)
    }

    async fn execute_runner(&self, project: &Project, workflow_type: AuditWorkflowType) -> AuditRun {
        let context = AuditContext::from_project(project);
        let cached_research = project.global_research_cache.as_deref();

        match timeout(
            self.options.audit_timeout,
            self.runner.run(workflow_type, &context, cached_research),
        )
        .await
        {
            Ok(run) => run,
            Err(_) => {
                warn!(
                    "{} timed out after {:?} for project {}",
                    workflow_type, self.options.audit_timeout, project.id
                );
                AuditRun::failed(workflow_type)
            }
        }
    }

    /// Persist an update, then return the project with it applied
    async fn persist(&self, project: &Project, update: ProjectUpdate) -> EngineResult<Project> {
        self.store.save(&project.id, &update).await?;
        let mut updated = project.clone();
        update.apply_to(&mut updated);
        Ok(updated)
    }

    /// First step without a result, or whose `running` record is stale
    async fn next_runnable_step(&self, project: &Project) -> Option<AuditWorkflowType> {
        let in_flight = self.in_flight.read().await;
        AuditWorkflowType::ALL.iter().copied().find(|t| {
            match project.audit_result(*t) {
                None => true,
                Some(r) => {
                    r.status == AuditStatus::Running
                        && !in_flight.contains(&(project.id.clone(), *t))
                }
            }
        })
    }

    /// Mark a step as executing; false if it already is
    async fn claim_step(&self, project_id: &ProjectId, workflow_type: AuditWorkflowType) -> bool {
        let claimed = self
            .in_flight
            .write()
            .await
            .insert((project_id.clone(), workflow_type));
        if claimed {
            self.set_running(project_id, true).await;
        }
        claimed
    }

    async fn release_step(&self, project_id: &ProjectId, workflow_type: AuditWorkflowType) {
        let still_running = {
            let mut in_flight = self.in_flight.write().await;
            in_flight.remove(&(project_id.clone(), workflow_type));
            in_flight.iter().any(|(id, _)| id == project_id)
        };
        self.set_running(project_id, still_running).await;
    }

    async fn set_running(&self, project_id: &ProjectId, running: bool) {
        let mut overrides = self.overrides.write().await;
        let entry = overrides.entry(project_id.clone()).or_default();
        entry.running = running;
        if *entry == RunOverride::default() {
            overrides.remove(project_id);
        }
    }

    fn report_transition(&self, project: &Project, from: WorkflowStage, to: WorkflowStage) {
        info!("Project {} advanced from {} to {}", project.id, from, to);
        self.emit(EngineEvent::StageAdvanced {
            project_id: project.id.clone(),
            from,
            to,
            at: Utc::now(),
        });
        self.notifier.notify(Notification::success(format!(
            "{} moved to {}",
            project.name, to
        )));
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(sender) = &self.event_sender {
            let _ = sender.send(event);
        }
    }
}
