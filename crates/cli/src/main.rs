use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use db::{EventRepository, ProjectRepository, TaskRepository};
use events::EventBus;
use futures::FutureExt;
use orchestrator::config::{default_config_dir, CONFIG_FILE};
use orchestrator::{
    ActiveWork, ActivityRegistry, AuditLog, CrashRecovery, CycleReport, EngineConfig,
    HeartbeatActivity, IssueStore, ProjectRegistry, RecoveryTarget, ScopePredictor, Watchdog,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use swarmyard_core::{GitWorkingMode, OrchestratorEvent, Project};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vcs::GitWorktrees;

#[derive(Parser)]
#[command(name = "swarmyard")]
#[command(about = "Conflict-aware orchestration for concurrent coding agents", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.swarmyard/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config directory, default config and database
    Init,
    #[command(subcommand)]
    Project(ProjectCommand),
    /// Run one recovery sweep now
    Recover {
        #[arg(long)]
        project: Option<String>,

        /// Task ids to treat as actively worked on
        #[arg(long = "exclude")]
        exclude: Vec<String>,
    },
    /// Run the watchdog until Ctrl-C, printing the audit feed
    Watch,
    #[command(subcommand)]
    Audit(AuditCommand),
    #[command(subcommand)]
    Scope(ScopeCommand),
    /// Write a heartbeat file into a worker directory
    Heartbeat { dir: PathBuf, task_id: String },
}

#[derive(Subcommand)]
enum ProjectCommand {
    Add {
        path: PathBuf,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value_t = GitWorkingMode::Worktree)]
        mode: GitWorkingMode,
    },
    List,
    Archive { id: String },
}

#[derive(Subcommand)]
enum AuditCommand {
    Recent {
        repo: PathBuf,

        #[arg(short = 'n', default_value_t = 20)]
        count: u32,
    },
    Task { repo: PathBuf, task_id: String },
    Since { repo: PathBuf, since: String },
}

#[derive(Subcommand)]
enum ScopeCommand {
    Predict { repo: PathBuf, task_id: String },
    Overlaps {
        repo: PathBuf,
        task_a: String,
        task_b: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let (config_dir, config_path) = match cli.config {
        Some(path) => {
            let dir = path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."));
            (dir, path)
        }
        None => {
            let dir = default_config_dir();
            let path = dir.join(CONFIG_FILE);
            (dir, path)
        }
    };

    if let Commands::Init = cli.command {
        return init(&config_dir, &config_path).await;
    }

    let config = EngineConfig::load(&config_path)
        .await
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    if let Commands::Heartbeat { dir, task_id } = &cli.command {
        let path = orchestrator::write_heartbeat(dir, &config.recovery.heartbeat_file, task_id).await?;
        println!("Heartbeat written to {}", path.display());
        return Ok(());
    }

    let engine = Engine::open(config, &config_dir).await?;

    match cli.command {
        Commands::Project(cmd) => project(&engine, cmd).await,
        Commands::Recover { project, exclude } => recover(&engine, project, exclude).await,
        Commands::Watch => watch(&engine).await,
        Commands::Audit(cmd) => audit(&engine, cmd).await,
        Commands::Scope(cmd) => scope(&engine, cmd).await,
        Commands::Init | Commands::Heartbeat { .. } => Ok(()),
    }
}

/// Repositories and collaborators wired from one config.
struct Engine {
    config: EngineConfig,
    tasks: TaskRepository,
    projects: ProjectRepository,
    events: EventRepository,
    worktrees: Arc<GitWorktrees>,
    bus: EventBus,
}

impl Engine {
    async fn open(config: EngineConfig, config_dir: &Path) -> Result<Self> {
        let database_url = config.database_url(config_dir);
        tracing::debug!(url = %database_url, "Opening database");

        let pool = db::create_pool(&database_url)
            .await
            .context("Failed to create database pool")?;
        db::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            worktrees: Arc::new(GitWorktrees::new(config.worktree_config())),
            config,
            tasks: TaskRepository::new(pool.clone()),
            projects: ProjectRepository::new(pool.clone()),
            events: EventRepository::new(pool),
            bus: EventBus::new(),
        })
    }

    fn audit(&self) -> AuditLog {
        AuditLog::new(self.events.clone(), Arc::new(self.projects.clone())).with_bus(self.bus.clone())
    }

    fn recovery(&self) -> CrashRecovery {
        CrashRecovery::new(
            Arc::new(self.tasks.clone()),
            self.worktrees.clone(),
            Arc::new(self.config.heartbeat_source()),
            Arc::new(self.projects.clone()),
        )
        .with_audit(self.audit())
    }

    fn heartbeat_activity(&self) -> HeartbeatActivity {
        HeartbeatActivity::new(
            self.config.heartbeat_source(),
            self.worktrees.clone(),
            Arc::new(self.projects.clone()),
        )
    }

    async fn project_id_for(&self, repo: &Path) -> Result<String> {
        self.projects
            .project_id_for_repo(repo)
            .await?
            .with_context(|| format!("No project registered for {}", repo.display()))
    }
}

async fn init(config_dir: &Path, config_path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(config_dir)
        .await
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    let config = if config_path.exists() {
        println!("Config already present at {}", config_path.display());
        EngineConfig::load(config_path).await?
    } else {
        let config = EngineConfig::default();
        tokio::fs::write(config_path, config.to_toml()?).await?;
        println!("Wrote {}", config_path.display());
        config
    };

    let db_path = config.database_path(config_dir);
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let pool = db::create_pool(&config.database_url(config_dir)).await?;
    db::run_migrations(&pool).await?;
    println!("Database ready at {}", db_path.display());

    println!();
    println!("Next steps:");
    println!("  1. swarmyard project add <repo>");
    println!("  2. swarmyard watch");

    Ok(())
}

async fn project(engine: &Engine, cmd: ProjectCommand) -> Result<()> {
    match cmd {
        ProjectCommand::Add { path, name, mode } => {
            let repo = canonical_repo(&path)?;
            let name = match name {
                Some(name) => name,
                None => repo
                    .file_name()
                    .and_then(|n| n.to_str())
                    .context("Cannot derive a project name from the path, pass --name")?
                    .to_string(),
            };

            if engine.projects.find_by_id(&name).await?.is_some() {
                bail!("Project '{}' already exists", name);
            }

            let project = engine
                .projects
                .create(&Project::new(&name, &name, &repo).with_mode(mode))
                .await?;
            println!(
                "Registered {} ({}) at {}",
                project.id.bold(),
                project.git_working_mode,
                project.repo_path.display()
            );
        }
        ProjectCommand::List => {
            let projects = engine.projects.find_all().await?;
            if projects.is_empty() {
                println!("No projects registered.");
            }
            for project in projects {
                let state = if project.archived {
                    "archived".dimmed()
                } else {
                    "active".green()
                };
                println!(
                    "  {:<20} {:<9} {:<8} {}",
                    project.id,
                    state,
                    project.git_working_mode.as_str(),
                    project.repo_path.display()
                );
            }
        }
        ProjectCommand::Archive { id } => {
            engine.projects.set_archived(&id, true).await?;
            println!("Archived {}", id);
        }
    }
    Ok(())
}

async fn recover(engine: &Engine, project: Option<String>, exclude: Vec<String>) -> Result<()> {
    let mut targets = engine.projects.active_targets().await?;
    if let Some(id) = &project {
        targets.retain(|t| &t.project_id == id);
        if targets.is_empty() {
            bail!("No active project '{}'", id);
        }
    }

    let activity = ActivityRegistry::new();
    for task_id in exclude {
        activity.register_agent(task_id);
    }
    for task_id in engine.heartbeat_activity().active_agent_ids().await? {
        activity.register_agent(task_id);
    }

    let watchdog = Watchdog::new(Arc::new(engine.recovery()), Arc::new(activity));
    let report = watchdog.run_cycle(&targets).await;
    print_cycle(&report);

    if !report.failed.is_empty() {
        bail!("{} project(s) failed to sweep", report.failed.len());
    }
    Ok(())
}

async fn watch(engine: &Engine) -> Result<()> {
    let watchdog = Watchdog::new(
        Arc::new(engine.recovery()),
        Arc::new(engine.heartbeat_activity()),
    )
    .with_interval(engine.config.watchdog_interval());

    let mut feed = engine.bus.subscribe();

    let initial = engine.projects.active_targets().await?;
    print_cycle(&watchdog.run_cycle(&initial).await);

    let projects = engine.projects.clone();
    watchdog.start(move || {
        let projects = projects.clone();
        async move { projects.active_targets().await }.boxed()
    });

    println!(
        "Watching {} project(s) every {}s. Press Ctrl+C to stop",
        initial.len(),
        watchdog.interval().as_secs()
    );

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            received = feed.recv() => match received {
                Ok(envelope) => print_event(&envelope.event),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Audit feed lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    watchdog.stop();
    Ok(())
}

async fn audit(engine: &Engine, cmd: AuditCommand) -> Result<()> {
    let log = engine.audit();
    let events = match cmd {
        AuditCommand::Recent { repo, count } => log.read_recent(&canonical_repo(&repo)?, count).await?,
        AuditCommand::Task { repo, task_id } => {
            log.read_for_task(&canonical_repo(&repo)?, &task_id).await?
        }
        AuditCommand::Since { repo, since } => log.read_since(&canonical_repo(&repo)?, &since).await?,
    };

    if events.is_empty() {
        println!("No events.");
    }
    for event in &events {
        print_event(event);
    }
    Ok(())
}

async fn scope(engine: &Engine, cmd: ScopeCommand) -> Result<()> {
    let predictor = ScopePredictor::new();

    match cmd {
        ScopeCommand::Predict { repo, task_id } => {
            let repo = canonical_repo(&repo)?;
            let project_id = engine.project_id_for(&repo).await?;
            let task = load_task(engine, &project_id, &task_id).await?;

            let scope = predictor
                .predict(&project_id, &repo, &task, &engine.tasks, None)
                .await;
            println!("{}", serde_json::to_string_pretty(&scope)?);
        }
        ScopeCommand::Overlaps {
            repo,
            task_a,
            task_b,
        } => {
            let repo = canonical_repo(&repo)?;
            let project_id = engine.project_id_for(&repo).await?;
            let a = load_task(engine, &project_id, &task_a).await?;
            let b = load_task(engine, &project_id, &task_b).await?;

            let scope_a = predictor.predict(&project_id, &repo, &a, &engine.tasks, None).await;
            let scope_b = predictor.predict(&project_id, &repo, &b, &engine.tasks, None).await;

            if predictor.overlaps(&scope_a, &scope_b) {
                println!("{} {} and {} may touch the same code", "overlap".red().bold(), task_a, task_b);
            } else {
                println!("{} {} and {} can run concurrently", "clear".green().bold(), task_a, task_b);
            }
        }
    }
    Ok(())
}

async fn load_task(engine: &Engine, project_id: &str, task_id: &str) -> Result<swarmyard_core::Task> {
    engine
        .tasks
        .show(project_id, task_id)
        .await?
        .with_context(|| format!("Task {} not found in {}", task_id, project_id))
}

fn canonical_repo(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).with_context(|| format!("Cannot resolve {}", path.display()))
}

fn print_cycle(report: &CycleReport) {
    for (target, sweep) in &report.swept {
        print_target(target);
        if sweep.is_empty() {
            println!("    nothing to recover");
        }
        for id in &sweep.stale_recovered {
            println!("    {} {} (stale heartbeat)", "recovered".yellow(), id);
        }
        for id in &sweep.orphans_recovered {
            println!("    {} {} (orphan)", "recovered".yellow(), id);
        }
    }
    for (target, error) in &report.failed {
        print_target(target);
        println!("    {} {}", "failed".red(), error);
    }
}

fn print_target(target: &RecoveryTarget) {
    println!("  {} {}", target.project_id.bold(), target.repo_path.display().to_string().dimmed());
}

fn print_event(event: &OrchestratorEvent) {
    let data = event
        .data
        .as_ref()
        .map(|d| d.to_string())
        .unwrap_or_default();
    println!(
        "{} {:<10} {:<10} {:<22} {}",
        swarmyard_core::format_timestamp(&event.timestamp).dimmed(),
        event.project_id,
        event.task_id.bold(),
        event.event.cyan(),
        data
    );
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();
}
