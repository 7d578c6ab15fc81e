// Workflow engine behaviour tests for Brief Autopilot

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use brief_autopilot::error::{EngineError, StoreError, StoreResult};
use brief_autopilot::notify::{CollectingNotifier, NotificationLevel};
use brief_autopilot::project::{
    AuditPayload, AuditResult, AuditStatus, AuditWorkflowType, BriefingStatus, FileProjectStore,
    GlobalSettings, MemoryProjectStore, OwnerId, Project, ProjectId, ProjectStatus, ProjectStore,
    ProjectUpdate,
};
use brief_autopilot::workflow::{
    AdvanceOutcome, AutopilotContext, DemoAuditRunner, EngineEvent, RunState, SkipReason,
    StepOutcome, WorkflowEngine, WorkflowStage,
};

/// Memory store that counts writes and can be told to reject them
#[derive(Default)]
struct CountingStore {
    inner: MemoryProjectStore,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
    /// Writes accepted before the rest are rejected
    save_budget: Mutex<Option<usize>>,
}

impl CountingStore {
    fn with_project(project: Project) -> Self {
        Self {
            inner: MemoryProjectStore::with_projects(vec![project]),
            ..Default::default()
        }
    }

    fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn reject_saves(&self) {
        self.fail_saves.store(true, Ordering::SeqCst);
    }

    fn reject_saves_after(&self, accepted: usize) {
        *self.save_budget.lock().unwrap() = Some(accepted);
    }

    fn accept_saves(&self) {
        self.fail_saves.store(false, Ordering::SeqCst);
        *self.save_budget.lock().unwrap() = None;
    }
}

#[async_trait]
impl ProjectStore for CountingStore {
    async fn load(&self, id: &ProjectId) -> StoreResult<Project> {
        self.inner.load(id).await
    }

    async fn save(&self, id: &ProjectId, update: &ProjectUpdate) -> StoreResult<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write rejected".to_string()));
        }
        if let Some(budget) = self.save_budget.lock().unwrap().as_mut() {
            if *budget == 0 {
                return Err(StoreError::Unavailable("write rejected".to_string()));
            }
            *budget -= 1;
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(id, update).await
    }

    async fn list(&self, owner_id: &OwnerId) -> StoreResult<Vec<Project>> {
        self.inner.list(owner_id).await
    }

    async fn insert(&self, project: Project) -> StoreResult<()> {
        self.inner.insert(project).await
    }

    async fn delete(&self, id: &ProjectId) -> StoreResult<()> {
        self.inner.delete(id).await
    }

    async fn load_settings(&self) -> StoreResult<GlobalSettings> {
        self.inner.load_settings().await
    }

    async fn save_settings(&self, settings: &GlobalSettings) -> StoreResult<()> {
        self.inner.save_settings(settings).await
    }
}

const ENABLED: AutopilotContext = AutopilotContext {
    global_enabled: true,
};

fn create_test_project(stage: WorkflowStage) -> Project {
    let mut project = Project::new(
        "client-1".to_string(),
        "owner-1".to_string(),
        "Night Market".to_string(),
    );
    project.status = ProjectStatus::Active;
    project.briefing_status = BriefingStatus::Completed;
    project.autopilot_enabled = true;
    project.autopilot_settings.current_workflow_stage = stage;
    project
}

/// Project in the audit stage with the first `completed` steps done
fn audited_project(completed: usize) -> Project {
    let mut project = create_test_project(WorkflowStage::AuditSearch);
    for workflow_type in AuditWorkflowType::ALL.iter().take(completed) {
        project.audit_results.insert(
            *workflow_type,
            AuditResult::completed(*workflow_type, AuditPayload::default()),
        );
    }
    project
}

async fn engine_over(project: Project, global_enabled: bool) -> (WorkflowEngine, Arc<CountingStore>) {
    let store = Arc::new(CountingStore::with_project(project));
    store
        .save_settings(&GlobalSettings {
            global_autopilot: global_enabled,
            updated_at: None,
        })
        .await
        .unwrap();
    let engine = WorkflowEngine::new(store.clone(), Arc::new(DemoAuditRunner::new()));
    (engine, store)
}

fn drain(receiver: &mut mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_current_counts_completed_only() {
    let mut project = audited_project(6);
    project.audit_results.insert(
        AuditWorkflowType::SentimentAnalysis,
        AuditResult::failed(AuditWorkflowType::SentimentAnalysis, "failed"),
    );
    project.audit_results.insert(
        AuditWorkflowType::InfluencerMapping,
        AuditResult::running(AuditWorkflowType::InfluencerMapping),
    );

    let progress = WorkflowEngine::compute_audit_status(&project, None);
    assert_eq!(progress.current, 6);
    assert_eq!(progress.total, 10);
    assert_eq!(progress.status, RunState::Running);
}

#[tokio::test]
async fn test_nine_of_ten_does_not_advance() {
    let project = audited_project(9);
    let (engine, store) = engine_over(project.clone(), true).await;

    let outcome = engine.advance_if_eligible(&project, &ENABLED).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::Unchanged(SkipReason::GateNotMet));
    assert_eq!(store.saves(), 0);
}

#[tokio::test]
async fn test_ten_of_ten_advances_with_one_write() {
    let project = audited_project(10);
    let (engine, store) = engine_over(project.clone(), true).await;

    let outcome = engine.advance_if_eligible(&project, &ENABLED).await.unwrap();
    match outcome {
        AdvanceOutcome::Advanced { project, from, to } => {
            assert_eq!(from, WorkflowStage::AuditSearch);
            assert_eq!(to, WorkflowStage::StrategyGen);
            assert_eq!(project.stage(), WorkflowStage::StrategyGen);
            assert!(project.autopilot_settings.last_transition_at.is_some());
        }
        other => panic!("expected an advance, got {:?}", other),
    }
    assert_eq!(store.saves(), 1);

    let stored = store.load(&project.id).await.unwrap();
    assert_eq!(stored.stage(), WorkflowStage::StrategyGen);
}

#[tokio::test]
async fn test_inactive_project_never_advances() {
    for status in [ProjectStatus::Planned, ProjectStatus::Completed] {
        let mut project = audited_project(10);
        project.status = status;
        let (engine, store) = engine_over(project.clone(), true).await;

        let outcome = engine.advance_if_eligible(&project, &ENABLED).await.unwrap();
        assert_eq!(outcome, AdvanceOutcome::Unchanged(SkipReason::ProjectInactive));
        assert_eq!(store.saves(), 0);
    }
}

#[tokio::test]
async fn test_autopilot_requires_both_flags() {
    let project = audited_project(10);
    let (engine, store) = engine_over(project.clone(), false).await;

    let disabled = AutopilotContext {
        global_enabled: false,
    };
    let outcome = engine.advance_if_eligible(&project, &disabled).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::Unchanged(SkipReason::AutopilotDisabled));

    let mut project_off = project.clone();
    project_off.autopilot_enabled = false;
    let outcome = engine.advance_if_eligible(&project_off, &ENABLED).await.unwrap();
    assert_eq!(outcome, AdvanceOutcome::Unchanged(SkipReason::AutopilotDisabled));
    assert_eq!(store.saves(), 0);

    let outcome = engine.advance_if_eligible(&project, &ENABLED).await.unwrap();
    assert!(outcome.is_advanced());
    assert_eq!(store.saves(), 1);
}

#[tokio::test]
async fn test_failed_step_blocks_audit_gate() {
    let mut project = audited_project(9);
    project.audit_results.insert(
        AuditWorkflowType::SwotSynthesis,
        AuditResult::failed(AuditWorkflowType::SwotSynthesis, "failed"),
    );
    let (engine, store) = engine_over(project.clone(), true).await;

    for _ in 0..5 {
        let current = store.load(&project.id).await.unwrap();
        let outcome = engine.advance_if_eligible(&current, &ENABLED).await.unwrap();
        assert!(!outcome.is_advanced());
    }

    let stored = store.load(&project.id).await.unwrap();
    assert_eq!(stored.stage(), WorkflowStage::AuditSearch);
    assert_eq!(store.saves(), 0);

    match engine.run_next_audit_step(&project.id).await.unwrap() {
        StepOutcome::Blocked { failed } => {
            assert_eq!(failed, vec![AuditWorkflowType::SwotSynthesis])
        }
        other => panic!("expected a blocked audit, got {:?}", other),
    }
}

#[tokio::test]
async fn test_later_stages_wait_for_approval() {
    let project = create_test_project(WorkflowStage::StrategyGen);
    let (engine, _store) = engine_over(project.clone(), true).await;
    assert_eq!(
        engine.advance_if_eligible(&project, &ENABLED).await.unwrap(),
        AdvanceOutcome::Unchanged(SkipReason::AwaitingApproval)
    );

    let project = engine.approve_strategy(&project).await.unwrap();
    assert_eq!(project.stage(), WorkflowStage::ActionPlan);

    let err = engine.approve_strategy(&project).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidStage { .. }));

    let project = engine.finalize_action_plan(&project).await.unwrap();
    assert_eq!(project.stage(), WorkflowStage::Production);
    assert_eq!(
        engine.advance_if_eligible(&project, &ENABLED).await.unwrap(),
        AdvanceOutcome::Unchanged(SkipReason::Terminal)
    );
}

#[tokio::test]
async fn test_reset_is_idempotent() {
    let mut project = audited_project(4);
    project.global_research_cache = Some("cached research".to_string());
    let (engine, store) = engine_over(project.clone(), true).await;

    let once = engine.reset_audit_cycle(&project).await.unwrap();
    let stored_once = store.load(&project.id).await.unwrap();

    let twice = engine.reset_audit_cycle(&once).await.unwrap();
    let stored_twice = store.load(&project.id).await.unwrap();

    for p in [&once, &twice, &stored_once, &stored_twice] {
        assert!(p.audit_results.is_empty());
        assert!(p.global_research_cache.is_none());
        assert_eq!(p.stage(), WorkflowStage::AuditSearch);
    }
    assert_eq!(stored_once.audit_results, stored_twice.audit_results);
    assert_eq!(
        WorkflowEngine::compute_audit_status(&stored_twice, None).current,
        0
    );
}

#[tokio::test]
async fn test_reset_clears_local_pause() {
    let mut project = audited_project(3);
    project.audit_results.insert(
        AuditWorkflowType::SentimentAnalysis,
        AuditResult::running(AuditWorkflowType::SentimentAnalysis),
    );
    let (engine, _store) = engine_over(project.clone(), true).await;

    engine.pause(&project.id).await;
    assert!(engine.is_paused(&project.id).await);

    let reset = engine.reset_audit_cycle(&project).await.unwrap();
    assert!(!engine.is_paused(&project.id).await);
    let progress = engine.audit_status(&reset).await;
    assert_eq!(progress.status, RunState::Paused);
    assert_eq!(progress.current, 0);

    // Chaining is no longer suppressed by the old pause
    assert!(matches!(
        engine.run_next_audit_step(&project.id).await.unwrap(),
        StepOutcome::Ran {
            workflow_type: AuditWorkflowType::BrandAudit,
            ..
        }
    ));
}

#[tokio::test]
async fn test_reset_rejected_after_audit() {
    let project = create_test_project(WorkflowStage::ActionPlan);
    let (engine, store) = engine_over(project.clone(), true).await;

    let err = engine.reset_audit_cycle(&project).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::InvalidStage {
            actual: WorkflowStage::ActionPlan,
            ..
        }
    ));
    assert_eq!(store.saves(), 0);
}

#[tokio::test]
async fn test_persistence_failure_leaves_stage() {
    let project = audited_project(10);
    let (engine, store) = engine_over(project.clone(), true).await;
    let (engine, mut events) = engine.with_event_reporting();
    store.reject_saves();

    let err = engine.advance_if_eligible(&project, &ENABLED).await.unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));
    assert!(err.is_retryable());

    let stored = store.load(&project.id).await.unwrap();
    assert_eq!(stored.stage(), WorkflowStage::AuditSearch);
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_autopilot_runs_full_audit() {
    let project = create_test_project(WorkflowStage::BriefReceived);
    let (engine, store) = engine_over(project.clone(), true).await;
    let notifier = Arc::new(CollectingNotifier::new());
    let (engine, mut events) = engine
        .with_notifier(notifier.clone())
        .with_event_reporting();

    let finished = engine.run_autopilot(&project.id).await.unwrap();
    assert_eq!(finished.stage(), WorkflowStage::StrategyGen);
    assert_eq!(finished.audits_with_status(AuditStatus::Completed).len(), 10);
    assert!(finished.global_research_cache.is_some());
    assert_eq!(
        engine.audit_status(&finished).await.status,
        RunState::Completed
    );

    let events = drain(&mut events);
    let finished_steps = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::AuditFinished { .. }))
        .count();
    assert_eq!(finished_steps, 10);

    let transitions: Vec<(WorkflowStage, WorkflowStage)> = events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StageAdvanced { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (WorkflowStage::BriefReceived, WorkflowStage::AuditSearch),
            (WorkflowStage::AuditSearch, WorkflowStage::StrategyGen),
        ]
    );

    let stored = store.load(&project.id).await.unwrap();
    assert_eq!(stored, finished);
    assert!(notifier
        .drain()
        .iter()
        .all(|n| n.level != NotificationLevel::Error));
}

#[tokio::test]
async fn test_autopilot_stops_on_failed_step() {
    let project = create_test_project(WorkflowStage::AuditSearch);
    let store = Arc::new(CountingStore::with_project(project.clone()));
    store
        .save_settings(&GlobalSettings {
            global_autopilot: true,
            updated_at: None,
        })
        .await
        .unwrap();
    let engine = WorkflowEngine::new(
        store.clone(),
        Arc::new(DemoAuditRunner::new().with_failures([AuditWorkflowType::MarketTrends])),
    );

    let finished = engine.run_autopilot(&project.id).await.unwrap();
    assert_eq!(finished.stage(), WorkflowStage::AuditSearch);

    let progress = WorkflowEngine::compute_audit_status(&finished, None);
    assert_eq!(progress.current, 9);
    assert_eq!(progress.status, RunState::Paused);

    let failed = finished
        .audit_result(AuditWorkflowType::MarketTrends)
        .unwrap();
    assert_eq!(failed.status, AuditStatus::Failed);
    assert!(!failed.summary.is_empty());
}

#[tokio::test]
async fn test_next_step_respects_flags_and_pause() {
    let project = create_test_project(WorkflowStage::AuditSearch);
    let (engine, store) = engine_over(project.clone(), false).await;

    assert_eq!(
        engine.run_next_audit_step(&project.id).await.unwrap(),
        StepOutcome::Suppressed(SkipReason::AutopilotDisabled)
    );

    engine.toggle_global_autopilot(true).await.unwrap();
    assert!(engine.autopilot_context().await.unwrap().global_enabled);

    engine.pause(&project.id).await;
    assert_eq!(
        engine.run_next_audit_step(&project.id).await.unwrap(),
        StepOutcome::Suppressed(SkipReason::Paused)
    );
    assert_eq!(store.saves(), 0);

    engine.resume(&project.id).await;
    match engine.run_next_audit_step(&project.id).await.unwrap() {
        StepOutcome::Ran {
            workflow_type,
            status,
            ..
        } => {
            assert_eq!(workflow_type, AuditWorkflowType::BrandAudit);
            assert_eq!(status, AuditStatus::Completed);
        }
        other => panic!("expected a step to run, got {:?}", other),
    }
}

#[tokio::test]
async fn test_manual_steps_do_not_advance_without_autopilot() {
    let mut project = audited_project(9);
    project.autopilot_enabled = false;
    let (engine, store) = engine_over(project.clone(), true).await;

    let project = engine
        .run_audit_step(&project, AuditWorkflowType::SwotSynthesis)
        .await
        .unwrap();
    assert_eq!(WorkflowEngine::compute_audit_status(&project, None).current, 10);
    assert_eq!(project.stage(), WorkflowStage::AuditSearch);

    let project = engine.toggle_project_autopilot(&project, true).await.unwrap();
    let context = engine.autopilot_context().await.unwrap();
    assert!(engine
        .advance_if_eligible(&project, &context)
        .await
        .unwrap()
        .is_advanced());
    assert_eq!(
        store.load(&project.id).await.unwrap().stage(),
        WorkflowStage::StrategyGen
    );
}

#[tokio::test]
async fn test_run_step_rejected_outside_audit() {
    let project = create_test_project(WorkflowStage::BriefReceived);
    let (engine, store) = engine_over(project.clone(), true).await;

    let err = engine
        .run_audit_step(&project, AuditWorkflowType::BrandAudit)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidStage { .. }));
    assert_eq!(store.saves(), 0);
}

#[tokio::test]
async fn test_unsaved_result_can_be_rerun() {
    let project = audited_project(0);
    let (engine, store) = engine_over(project.clone(), true).await;
    let notifier = Arc::new(CollectingNotifier::new());
    let engine = engine.with_notifier(notifier.clone());

    // The running record is stored, the finished result is not
    store.reject_saves_after(1);
    let err = engine
        .run_audit_step(&project, AuditWorkflowType::BrandAudit)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Persistence(_)));

    let stored = store.load(&project.id).await.unwrap();
    assert_eq!(
        stored.audit_result(AuditWorkflowType::BrandAudit).unwrap().status,
        AuditStatus::Running
    );
    assert!(notifier
        .drain()
        .iter()
        .any(|n| n.level == NotificationLevel::Error));

    store.accept_saves();
    match engine.run_next_audit_step(&project.id).await.unwrap() {
        StepOutcome::Ran {
            workflow_type,
            status,
            ..
        } => {
            assert_eq!(workflow_type, AuditWorkflowType::BrandAudit);
            assert_eq!(status, AuditStatus::Completed);
        }
        other => panic!("expected the stale step to run again, got {:?}", other),
    }

    let finished = engine.run_autopilot(&project.id).await.unwrap();
    assert_eq!(finished.stage(), WorkflowStage::StrategyGen);
    assert_eq!(finished.audits_with_status(AuditStatus::Completed).len(), 10);
}

#[tokio::test]
async fn test_stale_running_record_can_be_run_manually() {
    let mut project = audited_project(0);
    project.audit_results.insert(
        AuditWorkflowType::BrandAudit,
        AuditResult::running(AuditWorkflowType::BrandAudit),
    );
    let (engine, _store) = engine_over(project.clone(), true).await;

    let project = engine
        .run_audit_step(&project, AuditWorkflowType::BrandAudit)
        .await
        .unwrap();
    assert_eq!(
        project.audit_result(AuditWorkflowType::BrandAudit).unwrap().status,
        AuditStatus::Completed
    );
}

#[tokio::test]
async fn test_step_in_flight_blocks_rerun_and_reset() {
    let project = audited_project(0);
    let store = Arc::new(CountingStore::with_project(project.clone()));
    let engine = WorkflowEngine::new(
        store.clone(),
        Arc::new(DemoAuditRunner::new().with_latency(Duration::from_millis(200))),
    );

    let task_engine = engine.clone();
    let task_project = project.clone();
    let handle = tokio::spawn(async move {
        task_engine
            .run_audit_step(&task_project, AuditWorkflowType::BrandAudit)
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = engine
        .run_audit_step(&project, AuditWorkflowType::BrandAudit)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::StepAlreadyRunning { .. }));

    let err = engine.reset_audit_cycle(&project).await.unwrap_err();
    assert!(matches!(err, EngineError::AuditInProgress { .. }));
    assert!(!err.is_retryable());

    let current = store.load(&project.id).await.unwrap();
    assert_eq!(engine.audit_status(&current).await.status, RunState::Running);

    let finished = handle.await.unwrap().unwrap();
    assert_eq!(
        finished.audit_result(AuditWorkflowType::BrandAudit).unwrap().status,
        AuditStatus::Completed
    );
    let stored = store.load(&project.id).await.unwrap();
    assert_eq!(stored.audit_results, finished.audit_results);

    // Once the step has finished the cycle can be reset
    let reset = engine.reset_audit_cycle(&stored).await.unwrap();
    assert!(reset.audit_results.is_empty());
    assert!(store.load(&project.id).await.unwrap().audit_results.is_empty());
}

#[tokio::test]
async fn test_file_store_round_trip() {
    let temp_dir = tempfile::TempDir::new().unwrap();
    let state_file = temp_dir.path().join("state").join("projects.json");

    let mut project = audited_project(7);
    project.audit_results.insert(
        AuditWorkflowType::ChannelBenchmark,
        AuditResult::failed(AuditWorkflowType::ChannelBenchmark, "failed"),
    );
    project.global_research_cache = Some("research".to_string());

    {
        let store = FileProjectStore::open(&state_file).await.unwrap();
        store.insert(project.clone()).await.unwrap();
    }

    let reopened = FileProjectStore::open(&state_file).await.unwrap();
    let loaded = reopened.load(&project.id).await.unwrap();
    assert_eq!(loaded.stage(), project.stage());
    assert_eq!(loaded.audit_results, project.audit_results);
    assert_eq!(loaded.global_research_cache, project.global_research_cache);
}
