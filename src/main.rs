// Brief Autopilot - Project workflow engine for community-management engagements
//
// This application drives client projects from briefing through the audit
// phase into strategy, action plan and production from the command line.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use brief_autopilot::config::{ConfigManager, EngineConfig, RunnerMode, StoreBackend};
use brief_autopilot::demo::ProjectSeeder;
use brief_autopilot::project::{
    AuditStatus, AuditWorkflowType, BriefingStatus, Project, ProjectStatus,
};
use brief_autopilot::workflow::{
    build_engine, AdvanceOutcome, EngineEvent, StepOutcome, WorkflowEngine, WorkflowStage,
};

/// Brief Autopilot - project workflow and audit automation
#[derive(Parser)]
#[command(name = "brief-autopilot")]
#[command(about = "Drive community-management projects from briefing to production")]
#[command(version)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Configuration directory
    #[arg(short, long, env = "BRIEF_AUTOPILOT_CONFIG_DIR")]
    config: Option<PathBuf>,

    /// Also write JSON logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List projects owned by an account
    List {
        #[arg(long)]
        owner: String,
    },
    /// Create a planned project
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        client: String,
        #[arg(long)]
        owner: String,
        /// Mark the project active right away
        #[arg(long)]
        active: bool,
        /// Enable autopilot for the project
        #[arg(long)]
        autopilot: bool,
    },
    /// Delete a project
    Delete { project_id: String },
    /// Show stage and audit progress
    Status { project_id: String },
    /// Record the completed briefing and open the audit stage
    Brief { project_id: String },
    /// Run one audit sub-workflow
    Run {
        project_id: String,
        workflow_type: AuditWorkflowType,
    },
    /// Run the next pending audit step if autopilot permits it
    Next { project_id: String },
    /// Chain audit steps until none can run; Ctrl-C pauses after the current step
    AutopilotRun { project_id: String },
    /// Advance the project if its stage gate is met
    Advance { project_id: String },
    /// Clear audit results and research cache
    Reset { project_id: String },
    /// Approve the strategy and open the action plan stage
    ApproveStrategy { project_id: String },
    /// Finalize the action plan and move to production
    FinalizePlan { project_id: String },
    /// Switch autopilot on or off
    Autopilot {
        #[command(subcommand)]
        scope: AutopilotScope,
    },
    /// Insert YAML project fixtures from a directory
    Seed { dir: PathBuf },
    /// Run a full project lifecycle against an in-memory store
    Demo {
        /// Fixture directory; a sample project is created when omitted
        #[arg(long)]
        fixtures: Option<PathBuf>,
    },
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum AutopilotScope {
    /// Process-wide flag
    Global { state: Switch },
    /// Per-project flag
    Project { project_id: String, state: Switch },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Check the configuration for problems
    Validate,
    /// Write the effective configuration to the config file
    Init,
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

impl Switch {
    fn enabled(self) -> bool {
        matches!(self, Switch::On)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut manager = match &args.config {
        Some(dir) => ConfigManager::with_config_dir(dir).await?,
        None => ConfigManager::new().await?,
    };

    let log_level = if args.verbose {
        "debug".to_string()
    } else {
        manager.config().log_level.to_string()
    };
    let _guard = init_logging(&log_level, args.log_file.as_deref())?;

    tracing::info!("Starting Brief Autopilot");

    if let Command::Config { action } = &args.command {
        return run_config_command(&manager, action).await;
    }

    let validation = manager.validate();
    for warning in &validation.warnings {
        tracing::warn!("{}", warning);
    }
    if !validation.is_valid {
        bail!("Invalid configuration: {}", validation.errors.join("; "));
    }

    if let Command::Demo { .. } = &args.command {
        let config = manager.config_mut();
        config.store.backend = StoreBackend::Memory;
        config.runner.mode = RunnerMode::Demo;
        config.autopilot.global_enabled = true;
    }

    let (engine, events) = build_engine(manager.config()).await?.with_event_reporting();
    let printer = tokio::spawn(print_events(events));

    let outcome = run_command(&engine, args.command).await;

    drop(engine);
    if let Err(e) = printer.await {
        tracing::warn!("Event printer stopped abnormally: {}", e);
    }

    tracing::info!("Brief Autopilot shutdown complete");
    outcome
}

async fn run_command(engine: &WorkflowEngine, command: Command) -> Result<()> {
    match command {
        Command::List { owner } => {
            let projects = engine.store().list(&owner).await?;
            if projects.is_empty() {
                println!("No projects found for {}", owner);
            }
            for project in &projects {
                let progress = engine.audit_status(project).await;
                println!(
                    "  {}  {:<24} {:<10} {:<14} audits {}/{}",
                    project.id,
                    project.name,
                    project.status.to_string(),
                    project.stage().as_str(),
                    progress.current,
                    progress.total
                );
            }
        }
        Command::Create {
            name,
            client,
            owner,
            active,
            autopilot,
        } => {
            let mut project = Project::new(client, owner, name);
            if active {
                project.status = ProjectStatus::Active;
            }
            project.autopilot_enabled = autopilot;
            let id = project.id.clone();
            engine.store().insert(project).await?;
            println!("Created project {}", id);
        }
        Command::Delete { project_id } => {
            engine.store().delete(&project_id).await?;
            println!("Deleted project {}", project_id);
        }
        Command::Status { project_id } => {
            let project = load_project(engine, &project_id).await?;
            print_status(engine, &project).await?;
        }
        Command::Brief { project_id } => {
            let project = load_project(engine, &project_id).await?;
            let project = engine.complete_briefing(&project).await?;
            println!("{} is now in {}", project.name, project.stage());
        }
        Command::Run {
            project_id,
            workflow_type,
        } => {
            let project = load_project(engine, &project_id).await?;
            let project = engine.run_audit_step(&project, workflow_type).await?;
            print_status(engine, &project).await?;
        }
        Command::Next { project_id } => match engine.run_next_audit_step(&project_id).await? {
            StepOutcome::Ran {
                workflow_type,
                status,
                ..
            } => println!("{} finished: {}", workflow_type.label(), status),
            StepOutcome::Suppressed(reason) => println!("Nothing run: {}", reason),
            StepOutcome::Blocked { failed } => print_blocked(&failed),
            StepOutcome::Idle(project) => {
                println!("No pending audit steps; {} is in {}", project.name, project.stage())
            }
        },
        Command::AutopilotRun { project_id } => {
            let pauser = engine.clone();
            let id = project_id.clone();
            let watcher = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    println!("Pausing after the current step...");
                    pauser.pause(&id).await;
                }
            });

            let result = engine.run_autopilot(&project_id).await;
            watcher.abort();
            let _ = watcher.await;

            print_status(engine, &result?).await?;
        }
        Command::Advance { project_id } => {
            let project = load_project(engine, &project_id).await?;
            let context = engine.autopilot_context().await?;
            match engine.advance_if_eligible(&project, &context).await? {
                AdvanceOutcome::Advanced { from, to, .. } => println!("Advanced {} -> {}", from, to),
                AdvanceOutcome::Unchanged(reason) => println!("Not advanced: {}", reason),
            }
        }
        Command::Reset { project_id } => {
            let project = load_project(engine, &project_id).await?;
            engine.reset_audit_cycle(&project).await?;
            println!("Audit cycle reset for {}", project.name);
        }
        Command::ApproveStrategy { project_id } => {
            let project = load_project(engine, &project_id).await?;
            let project = engine.approve_strategy(&project).await?;
            println!("{} is now in {}", project.name, project.stage());
        }
        Command::FinalizePlan { project_id } => {
            let project = load_project(engine, &project_id).await?;
            let project = engine.finalize_action_plan(&project).await?;
            println!("{} is now in {}", project.name, project.stage());
        }
        Command::Autopilot { scope } => match scope {
            AutopilotScope::Global { state } => {
                engine.toggle_global_autopilot(state.enabled()).await?;
                println!(
                    "Global autopilot {}",
                    if state.enabled() { "on" } else { "off" }
                );
            }
            AutopilotScope::Project { project_id, state } => {
                let project = load_project(engine, &project_id).await?;
                let project = engine
                    .toggle_project_autopilot(&project, state.enabled())
                    .await?;
                println!(
                    "Autopilot {} for {}",
                    if project.autopilot_enabled { "on" } else { "off" },
                    project.name
                );
            }
        },
        Command::Seed { dir } => {
            let report = ProjectSeeder::new(&dir)?.seed(engine.store().as_ref()).await?;
            println!(
                "Imported {} projects, skipped {} existing",
                report.imported.len(),
                report.skipped.len()
            );
            if report.has_errors() {
                eprintln!("{} fixtures could not be used:", report.errors.len());
                for (path, error) in &report.errors {
                    eprintln!("  ✗ {}: {}", path.display(), error);
                }
            }
        }
        Command::Demo { fixtures } => run_demo(engine, fixtures.as_deref()).await?,
        Command::Config { .. } => bail!("Configuration commands do not run against the engine"),
    }

    Ok(())
}

/// Walk seeded or sample projects through the whole lifecycle
async fn run_demo(engine: &WorkflowEngine, fixtures: Option<&Path>) -> Result<()> {
    let ids = match fixtures {
        Some(dir) => {
            let report = ProjectSeeder::new(dir)?.seed(engine.store().as_ref()).await?;
            for (path, error) in &report.errors {
                eprintln!("  ✗ {}: {}", path.display(), error);
            }
            report.imported
        }
        None => {
            let mut project = Project::new(
                "demo-client".to_string(),
                "demo-owner".to_string(),
                "Demo Coffee Roasters".to_string(),
            );
            project.status = ProjectStatus::Active;
            project.autopilot_enabled = true;
            let id = project.id.clone();
            engine.store().insert(project).await?;
            vec![id]
        }
    };

    for id in ids {
        let mut project = load_project(engine, &id).await?;
        println!("\n{} ({})", project.name, project.id);

        if project.stage() == WorkflowStage::BriefReceived
            && project.briefing_status != BriefingStatus::Completed
        {
            project = engine.complete_briefing(&project).await?;
        }

        project = engine.run_autopilot(&id).await?;
        if project.stage() == WorkflowStage::StrategyGen {
            project = engine.approve_strategy(&project).await?;
        }
        if project.stage() == WorkflowStage::ActionPlan {
            project = engine.finalize_action_plan(&project).await?;
        }

        print_status(engine, &project).await?;
    }

    Ok(())
}

async fn run_config_command(manager: &ConfigManager, action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("# {}", manager.config_file().display());
            print!("{}", render_config(manager.config())?);
        }
        ConfigAction::Validate => {
            let result = manager.validate();
            for error in &result.errors {
                println!("  ✗ {}", error);
            }
            for warning in &result.warnings {
                println!("  ! {}", warning);
            }
            if !result.is_valid {
                bail!("Configuration has {} errors", result.errors.len());
            }
            println!("Configuration is valid");
        }
        ConfigAction::Init => {
            manager.save().await?;
            println!("Wrote {}", manager.config_file().display());
        }
    }
    Ok(())
}

fn render_config(config: &EngineConfig) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to render configuration")
}

async fn load_project(engine: &WorkflowEngine, project_id: &str) -> Result<Project> {
    engine
        .store()
        .load(&project_id.to_string())
        .await
        .with_context(|| format!("Failed to load project {}", project_id))
}

async fn print_status(engine: &WorkflowEngine, project: &Project) -> Result<()> {
    let progress = engine.audit_status(project).await;
    let context = engine.autopilot_context().await?;

    println!("Project:   {} ({})", project.name, project.id);
    println!("Status:    {} / briefing {}", project.status, project.briefing_status);
    println!("Stage:     {}", project.stage());
    println!(
        "Autopilot: {} (global {}, project {})",
        if context.permits(project) { "on" } else { "off" },
        context.global_enabled,
        project.autopilot_enabled
    );
    println!("Audit:     {}", progress);

    for workflow_type in AuditWorkflowType::ALL {
        let marker = match project.audit_result(workflow_type).map(|r| r.status) {
            Some(AuditStatus::Completed) => "✓",
            Some(AuditStatus::Failed) => "✗",
            Some(AuditStatus::Running) => "…",
            None => " ",
        };
        println!(
            "  [{}] {} {}",
            marker,
            workflow_type.phase(),
            workflow_type.label()
        );
    }

    Ok(())
}

fn print_blocked(failed: &[AuditWorkflowType]) {
    println!("Audit blocked by failed steps:");
    for workflow_type in failed {
        println!("  ✗ {}", workflow_type.label());
    }
    println!("Run `reset` to restart the analysis.");
}

async fn print_events(mut events: mpsc::UnboundedReceiver<EngineEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::AuditStarted { workflow_type, .. } => {
                println!("  → {}", workflow_type.label());
            }
            EngineEvent::AuditFinished {
                workflow_type,
                status,
                ..
            } => {
                let marker = if status == AuditStatus::Completed { "✓" } else { "✗" };
                println!("  {} {}", marker, workflow_type.label());
            }
            EngineEvent::StageAdvanced { from, to, .. } => {
                println!("  ⇒ {} -> {}", from, to);
            }
            other => tracing::debug!(
                project = ?other.project_id(),
                "Engine event: {:?}",
                other
            ),
        }
    }
}

/// Initialize logging based on verbosity level
fn init_logging(log_level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .with_context(|| format!("Invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("brief_autopilot={}", log_level).into()),
        )
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}
