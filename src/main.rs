use anyhow::{Context, Result};
use sitepipe::cli::commands::{
    DispatchCommand, HistoryCommand, RunCommand, ValidateCommand, WatchCommand,
};
use sitepipe::cli::output::*;
use sitepipe::cli::terminal_output::TerminalReporter;
use sitepipe::cli::{Cli, Command, LogFormat};
use sitepipe::core::config::WorkflowConfig;
use sitepipe::core::{ManualInputs, Run, RunStatus, Trigger};
use sitepipe::execution::{BranchWatcher, Dispatcher, ExecutionEngine};
use sitepipe::persistence::{InMemoryPersistence, PersistenceBackend, RunSummary};
use sitepipe::process::SubprocessRunner;
use sitepipe::stages::SiteStages;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[cfg(feature = "sqlite")]
use sitepipe::persistence::SqliteRunStore;

type SiteDispatcher = Dispatcher<SiteStages<SubprocessRunner>>;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();
    init_logging(&cli)?;

    let status = match &cli.command {
        Command::Run(cmd) => run_push(cmd).await?,
        Command::Dispatch(cmd) => run_manual(cmd).await?,
        Command::Watch(cmd) => watch(cmd).await?,
        Command::Validate(cmd) => validate_workflow(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    if matches!(status, Some(RunStatus::Failed | RunStatus::Cancelled)) {
        std::process::exit(1);
    }

    Ok(())
}

fn init_logging(cli: &Cli) -> Result<()> {
    let filter = if cli.verbose {
        EnvFilter::new(Level::DEBUG.to_string())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match cli.log_format {
        LogFormat::Full => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Compact => tracing::subscriber::set_global_default(builder.compact().finish()),
    }
    .context("Failed to set logging subscriber")
}

fn load_workflow(path: &Path) -> Result<Arc<WorkflowConfig>> {
    let config = WorkflowConfig::from_file(path)
        .with_context(|| format!("Failed to load workflow {}", path.display()))?;
    println!("{} Loaded workflow: {}", INFO, style(&config.name).bold());
    Ok(Arc::new(config))
}

async fn open_store(no_history: bool) -> Result<Arc<dyn PersistenceBackend>> {
    if no_history {
        return Ok(Arc::new(InMemoryPersistence::new()));
    }

    #[cfg(feature = "sqlite")]
    {
        Ok(Arc::new(SqliteRunStore::with_default_path().await?))
    }
    #[cfg(not(feature = "sqlite"))]
    {
        Ok(Arc::new(InMemoryPersistence::new()))
    }
}

fn build_dispatcher(
    config: Arc<WorkflowConfig>,
    store: Arc<dyn PersistenceBackend>,
    keep_workspace: bool,
) -> SiteDispatcher {
    let stage_timeout = config.stage_timeout_secs.map(Duration::from_secs);
    let engine = ExecutionEngine::new(SiteStages::new(SubprocessRunner::new()))
        .with_stage_timeout(stage_timeout);

    Dispatcher::new(config, Arc::new(engine))
        .with_persistence(store)
        .keep_workspace(keep_workspace)
}

/// Cancel every run of the dispatcher on Ctrl-C
fn cancel_on_ctrl_c(dispatcher: &SiteDispatcher) {
    let shutdown = dispatcher.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            shutdown.cancel();
        }
    });
}

fn resolve_branch(config: &WorkflowConfig, branch: Option<&String>) -> Result<String> {
    branch
        .cloned()
        .or_else(|| config.default_branch().map(str::to_string))
        .context("No branch given and the workflow has no push branches")
}

async fn run_push(cmd: &RunCommand) -> Result<Option<RunStatus>> {
    let config = load_workflow(&cmd.file)?;
    let branch = resolve_branch(&config, cmd.branch.as_ref())?;
    let trigger = Trigger::push(branch, cmd.sha.clone());

    let store = open_store(cmd.no_history).await?;
    let dispatcher = build_dispatcher(config, store, cmd.keep_workspace);
    execute_foreground(&dispatcher, trigger, cmd.no_history).await
}

async fn run_manual(cmd: &DispatchCommand) -> Result<Option<RunStatus>> {
    let config = load_workflow(&cmd.file)?;
    let branch = resolve_branch(&config, cmd.git_ref.as_ref())?;
    let inputs = ManualInputs::resolve(
        &config.manual_inputs(),
        cmd.log_level.clone(),
        cmd.tags.clone(),
    );
    println!(
        "{} Inputs: log_level={} tags={}",
        INFO,
        style(&inputs.log_level).cyan(),
        style(&inputs.tags).cyan()
    );
    let trigger = Trigger::manual(branch, inputs);

    let store = open_store(cmd.no_history).await?;
    let dispatcher = build_dispatcher(config, store, cmd.keep_workspace);
    execute_foreground(&dispatcher, trigger, cmd.no_history).await
}

async fn execute_foreground(
    dispatcher: &SiteDispatcher,
    trigger: Trigger,
    no_history: bool,
) -> Result<Option<RunStatus>> {
    let reporter = Arc::new(TerminalReporter::new());
    dispatcher
        .engine()
        .add_event_handler(move |event| reporter.on_event(&event))
        .await;
    cancel_on_ctrl_c(dispatcher);

    let run = dispatcher.dispatch(trigger).await?;

    if !no_history {
        println!(
            "\n{} Run saved to history (ID: {})",
            INFO,
            style(short_id(&run.id())).dim()
        );
    }
    print_outcome(&run);

    Ok(Some(run.status()))
}

fn print_outcome(run: &Run) {
    println!("\n{} Stages:", INFO);
    for record in &run.stages {
        println!(
            "  {:<10} {}",
            record.kind.title(),
            format_stage_state(&record.state)
        );
    }

    match run.status() {
        RunStatus::Succeeded => println!(
            "\n{} {} published {}",
            CHECK,
            style(&run.workflow).bold(),
            style(run.short_sha().unwrap_or("")).dim()
        ),
        RunStatus::Cancelled => println!(
            "\n{} {} {}",
            WARN,
            style(&run.workflow).bold(),
            style("cancelled").yellow()
        ),
        _ => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&run.workflow).bold(),
                style("failed").red()
            );
            if let Some(err) = &run.state.error {
                error!("{}", err);
            }
        }
    }
}

async fn watch(cmd: &WatchCommand) -> Result<Option<RunStatus>> {
    let config = load_workflow(&cmd.file)?;
    if config.triggers.push.is_none() {
        anyhow::bail!("Workflow '{}' has no push trigger to watch", config.name);
    }

    let store = open_store(cmd.no_history).await?;
    let dispatcher = Arc::new(build_dispatcher(config, store, false));
    dispatcher
        .engine()
        .add_event_handler(|event| println!("{}", format_run_event(&event)))
        .await;
    cancel_on_ctrl_c(&dispatcher);

    println!(
        "{} Watching {} every {}s (Ctrl-C to stop)",
        ROCKET,
        style(&dispatcher.config().source.repository).cyan(),
        cmd.interval
    );
    let shutdown = dispatcher.shutdown_token();
    let watcher = BranchWatcher::new(
        SubprocessRunner::new(),
        dispatcher,
        Duration::from_secs(cmd.interval.max(1)),
    );
    watcher.run(shutdown).await;

    Ok(None)
}

fn validate_workflow(cmd: &ValidateCommand) -> Result<Option<RunStatus>> {
    println!("{} Validating workflow...", INFO);

    match WorkflowConfig::from_file(&cmd.file) {
        Ok(config) => {
            println!("{} Workflow configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            if let Some(push) = &config.triggers.push {
                println!("  Push branches: {}", style(push.branches.join(", ")).cyan());
            }
            println!(
                "  Manual trigger: {}",
                style(config.triggers.manual.is_some()).cyan()
            );
            println!("  Concurrency group: {}", style(&config.concurrency.group).cyan());
            println!(
                "  Publish: {} ({})",
                style(config.publish.remote_url()).cyan(),
                config.publish.branch
            );

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(None)
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn show_history(cmd: &HistoryCommand) -> Result<Option<RunStatus>> {
    let store = open_store(false).await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary, cmd.details)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(None);
    }

    let mut runs = match &cmd.workflow {
        Some(workflow) => store.list_runs(workflow).await?,
        None => {
            let mut all = Vec::new();
            for workflow in store.list_workflows().await? {
                all.extend(store.list_runs(&workflow).await?);
            }
            all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            all
        }
    };
    runs.truncate(cmd.limit);

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(None);
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(None)
}

fn print_run_details(summary: &RunSummary, details: bool) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Workflow: {}", style(&summary.workflow).bold());
    println!("  Trigger: {} {}", summary.trigger, style(&summary.git_ref).cyan());
    println!("  Group: {}", style(&summary.concurrency_group).dim());
    if let Some(sha) = &summary.sha {
        println!("  Commit: {}", style(sha).dim());
    }
    println!("  Status: {}", format_status(summary.status));
    if let Some(stage) = summary.failed_stage {
        println!("  Stage: {}", style(stage).yellow());
    }
    if let Some(error) = &summary.error {
        println!("  Error: {}", style(error).red());
    }
    for (name, value) in &summary.inputs {
        println!("  Input {}: {}", name, style(value).cyan());
    }
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }

    if details {
        println!("\n  {}", style("Full details:").bold());
        let json = serde_json::to_string_pretty(summary)?;
        for line in json.lines() {
            println!("    {}", line);
        }
    }

    Ok(())
}
