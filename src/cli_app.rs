//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use reclaim_engine::core::cancel::CancellationToken;
use reclaim_engine::core::clock::{Clock, SystemClock};
use reclaim_engine::core::config::Config;
use reclaim_engine::core::errors::ReclaimError;
use reclaim_engine::core::units::{format_bytes, format_duration};
use reclaim_engine::daemon::automation::{AutomationSettings, DeletionMode};
use reclaim_engine::daemon::scheduler::{AutomationScheduler, RunOutcome, SchedulerParts};
use reclaim_engine::daemon::settings_store::{JsonSettingsStore, SettingsStore};
use reclaim_engine::deletion::model::{DeletionDisposition, DeletionOptions, DeletionResult};
use reclaim_engine::deletion::pipeline::DeletionPipeline;
use reclaim_engine::deletion::progress::DeletionProgress;
use reclaim_engine::deletion::reboot::{DrainReport, PendingRebootQueue};
use reclaim_engine::logger::dual::DualLogger;
use reclaim_engine::logger::{AuditEvent, AuditLevel, AuditSink};
use reclaim_engine::platform::locks::{LockInspector, ProcFdLockInspector, holders_by_candidate};
use reclaim_engine::platform::pal::{NativePlatform, Platform};
use reclaim_engine::platform::prompt::{Confirmer, TerminalConfirmer};
use reclaim_engine::scanner::preview::{Preview, PreviewBuilder, PreviewSource};
use reclaim_engine::scanner::protection::{PathSafetyClassifier, PathVerdict};

/// Environment override for the output format: `json`, `human` or `auto`.
const OUTPUT_FORMAT_ENV: &str = "RECLAIM_OUTPUT_FORMAT";

/// How often the foreground daemon checks for a shutdown signal.
const DAEMON_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Reclaim: scored cleanup of temp, cache and crash-dump clutter.
#[derive(Debug, Parser)]
#[command(
    name = "reclaim",
    author,
    version,
    about = "Reclaim - confidence-scored disk cleanup",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Preview cleanup candidates without deleting anything.
    Scan(ScanArgs),
    /// Preview, confirm and delete cleanup candidates.
    Clean(CleanArgs),
    /// Ask the path safety classifier about one path.
    Check(CheckArgs),
    /// Show or change unattended cleanup settings.
    Automation(AutomationArgs),
    /// Run the automation scheduler in the foreground until interrupted.
    Daemon,
    /// Inspect or process deletions deferred to the next restart.
    Pending(PendingArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct ScanArgs {
    /// Show at most this many candidates.
    #[arg(long, default_value_t = 50, value_name = "N")]
    top: usize,
}

#[derive(Debug, Clone, Args)]
struct CleanArgs {
    /// Delete at most this many of the largest candidates.
    #[arg(long, default_value_t = 100, value_name = "N")]
    top: usize,
    /// How stubborn items are handled.
    #[arg(long, value_enum, default_value_t = ModeArg::SkipLocked)]
    mode: ModeArg,
    /// Skip the confirmation prompt.
    #[arg(short, long)]
    yes: bool,
    /// Print the plan and stop.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Args)]
struct CheckArgs {
    /// Path to classify; relative paths resolve against the working directory.
    path: String,
}

#[derive(Debug, Clone, Args)]
struct AutomationArgs {
    #[command(subcommand)]
    command: AutomationCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum AutomationCommand {
    /// Print the stored settings and the next due time.
    Show,
    /// Change settings. Out-of-range values are clamped.
    Set(AutomationSetArgs),
    /// Run one automated cleanup now with the stored settings.
    RunOnce,
}

#[derive(Debug, Clone, Args)]
struct AutomationSetArgs {
    #[arg(long, value_name = "BOOL")]
    enabled: Option<bool>,
    /// Minutes between runs (30 to 43200).
    #[arg(long, value_name = "MINUTES")]
    interval_minutes: Option<u32>,
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    #[arg(long, value_name = "BOOL")]
    include_downloads: Option<bool>,
    #[arg(long, value_name = "BOOL")]
    include_browser_history: Option<bool>,
    /// Largest candidates deleted per run (10 to 1000).
    #[arg(long, value_name = "N")]
    top: Option<usize>,
}

#[derive(Debug, Clone, Args)]
struct PendingArgs {
    #[command(subcommand)]
    command: PendingCommand,
}

#[derive(Debug, Clone, Subcommand)]
enum PendingCommand {
    /// List queued items.
    List,
    /// Try to remove every queued item now.
    Process,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completions for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

/// Deletion mode as spelled on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    SkipLocked,
    Recycle,
    Force,
}

impl From<ModeArg> for DeletionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::SkipLocked => Self::SkipLocked,
            ModeArg::Recycle => Self::MoveToRecycleBin,
            ModeArg::Force => Self::ForceDelete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// Top-level CLI error type.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// Operation partially succeeded.
    #[error("{0}")]
    Partial(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
            Self::Partial(_) => 4,
        }
    }
}

impl From<ReclaimError> for CliError {
    fn from(err: ReclaimError) -> Self {
        match err {
            ReclaimError::InvalidConfig { .. }
            | ReclaimError::MissingConfig { .. }
            | ReclaimError::ConfigParse { .. }
            | ReclaimError::InvalidPath { .. } => Self::User(err.to_string()),
            ReclaimError::Cancelled { .. } | ReclaimError::DeletionCancelled { .. } => {
                Self::Partial(err.to_string())
            }
            ReclaimError::Serialization { .. } => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Scan(args) => run_scan(cli, args),
        Command::Clean(args) => run_clean(cli, args),
        Command::Check(args) => run_check(cli, args),
        Command::Automation(args) => run_automation(cli, args),
        Command::Daemon => run_daemon(cli),
        Command::Pending(args) => run_pending(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ──────────────────── engine wiring ────────────────────

/// Everything a command needs, built from one loaded configuration.
struct Engine {
    config: Config,
    platform: Arc<NativePlatform>,
    clock: Arc<dyn Clock>,
    preview: Arc<PreviewBuilder>,
    pipeline: Arc<DeletionPipeline>,
}

impl Engine {
    fn load(cli: &Cli) -> Result<Self, CliError> {
        let config = Config::load(cli.config.as_deref())?;
        let platform = Arc::new(NativePlatform::new(PendingRebootQueue::new(
            config.deletion.pending_reboot_path(),
        )));
        let dyn_platform: Arc<dyn Platform> = platform.clone();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let classifier = PathSafetyClassifier::with_additional_roots(&config.safety.additional_critical_roots)?;
        let preview = Arc::new(PreviewBuilder::from_config(&config, Arc::clone(&dyn_platform)));
        let pipeline = Arc::new(DeletionPipeline::new(classifier, dyn_platform, Arc::clone(&clock)));
        Ok(Self {
            config,
            platform,
            clock,
            preview,
            pipeline,
        })
    }

    fn base_options(&self) -> DeletionOptions {
        DeletionOptions::from(&self.config.deletion)
    }

    fn settings_store(&self) -> JsonSettingsStore {
        JsonSettingsStore::new(self.config.automation.settings_path.clone())
    }

    fn scheduler(&self, audit: Arc<dyn AuditSink>) -> Result<AutomationScheduler, CliError> {
        let preview: Arc<dyn PreviewSource> = self.preview.clone();
        let parts = SchedulerParts {
            preview,
            pipeline: Arc::clone(&self.pipeline),
            store: Arc::new(self.settings_store()),
            audit,
            locks: Arc::new(ProcFdLockInspector::default()),
            clock: Arc::clone(&self.clock),
            targets: self.config.effective_targets(),
            base_options: self.base_options(),
        };
        Ok(AutomationScheduler::new(parts)?)
    }

    fn build_preview(&self, cancel: &CancellationToken) -> Result<Preview, CliError> {
        let targets = self.config.effective_targets();
        Ok(self.preview.preview(&targets, self.clock.now(), cancel)?)
    }
}

/// Flip `token` on SIGINT or SIGTERM.
fn register_shutdown_signals(token: &CancellationToken) -> Result<(), CliError> {
    for signal in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        signal_hook::flag::register(signal, token.flag())
            .map_err(|e| CliError::Runtime(format!("failed to install signal handler: {e}")))?;
    }
    Ok(())
}

// ──────────────────── scan / clean ────────────────────

fn run_scan(cli: &Cli, args: &ScanArgs) -> Result<(), CliError> {
    let engine = Engine::load(cli)?;
    let cancel = CancellationToken::new();
    register_shutdown_signals(&cancel)?;
    let mut preview = engine.build_preview(&cancel)?;
    let candidate_count = preview.items.len();
    preview.truncate(args.top);

    match output_mode(cli) {
        OutputMode::Human => {
            if preview.items.is_empty() {
                println!(
                    "Evaluated {} item(s): no cleanup candidates found.",
                    preview.evaluated
                );
            } else {
                print_preview(&preview);
                println!(
                    "\nShowing {} of {candidate_count} candidate(s), {} reclaimable.",
                    preview.items.len(),
                    format_bytes(preview.total_bytes()).bold()
                );
            }
            print_scan_footnotes(&preview);
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "scan",
                "evaluated": preview.evaluated,
                "candidates_count": candidate_count,
                "total_bytes": preview.total_bytes(),
                "items": preview.items,
                "retained": preview.retained,
                "errors": preview.errors,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

fn run_clean(cli: &Cli, args: &CleanArgs) -> Result<(), CliError> {
    let engine = Engine::load(cli)?;
    let mode = output_mode(cli);
    let cancel = CancellationToken::new();
    register_shutdown_signals(&cancel)?;

    let mut preview = engine.build_preview(&cancel)?;
    preview.truncate(args.top);
    let deletion_mode = DeletionMode::from(args.mode);

    let mut items = preview.preview_items();
    let mut locked_skipped = 0_usize;
    if deletion_mode.skips_locked() && !items.is_empty() {
        let paths: Vec<PathBuf> = items.iter().map(|item| item.path.clone()).collect();
        let locked = holders_by_candidate(ProcFdLockInspector::default().blocking_processes(&paths));
        items.retain(|item| {
            let Some(holders) = locked.get(&item.path) else {
                return true;
            };
            locked_skipped += 1;
            if mode == OutputMode::Human {
                let names: Vec<String> = holders.iter().map(|p| format!("{} ({})", p.name, p.pid)).collect();
                println!(
                    "  {} {} is in use by {}",
                    "locked".yellow(),
                    item.path.display(),
                    names.join(", ")
                );
            }
            false
        });
    }

    if items.is_empty() {
        match mode {
            OutputMode::Human => println!("No cleanup candidates found."),
            OutputMode::Json => write_json_line(&json!({
                "command": "clean",
                "evaluated": preview.evaluated,
                "candidates_count": 0,
                "locked_skipped": locked_skipped,
                "dry_run": args.dry_run,
            }))?,
        }
        return Ok(());
    }

    let planned_bytes = items.iter().fold(0_u64, |acc, item| acc.saturating_add(item.size_bytes));
    if mode == OutputMode::Human {
        println!("The following items will be deleted ({}):\n", deletion_mode.label());
        print_preview(&preview);
        println!(
            "\nTotal: {} item(s), {}",
            items.len(),
            format_bytes(planned_bytes).bold()
        );
        println!();
    }

    if args.dry_run {
        match mode {
            OutputMode::Human => println!("Dry run: nothing was deleted."),
            OutputMode::Json => write_json_line(&json!({
                "command": "clean",
                "dry_run": true,
                "mode": deletion_mode.label(),
                "candidates_count": items.len(),
                "planned_bytes": planned_bytes,
                "locked_skipped": locked_skipped,
                "items": items,
            }))?,
        }
        return Ok(());
    }

    if !args.yes {
        if !io::stdin().is_terminal() {
            return Err(CliError::User(
                "refusing to delete without confirmation; pass --yes to run non-interactively".to_string(),
            ));
        }
        let message = format!("Delete {} item(s) ({})?", items.len(), format_bytes(planned_bytes));
        if !TerminalConfirmer.confirm("Confirm cleanup", &message) {
            println!("Aborted; nothing was deleted.");
            return Ok(());
        }
    }

    let options = deletion_mode
        .deletion_options(engine.base_options())
        .with_retained_paths(preview.retained.clone());
    let audit = DualLogger::from_config(&engine.config.logging);

    let show_progress = mode == OutputMode::Human && io::stderr().is_terminal();
    let mut on_progress = |progress: &DeletionProgress| {
        eprint!(
            "\r  [{}/{}] freed {}   ",
            progress.processed,
            progress.total,
            format_bytes(progress.bytes_freed)
        );
        let _ = io::stderr().flush();
    };
    let progress: Option<&mut dyn FnMut(&DeletionProgress)> =
        if show_progress { Some(&mut on_progress) } else { None };

    let outcome = engine.pipeline.delete(&items, &options, &cancel, progress);
    if show_progress {
        eprintln!();
    }

    match outcome {
        Ok(result) => {
            audit.record_event(clean_event(&result, deletion_mode, locked_skipped, false));
            emit_clean_result(mode, &result, deletion_mode, locked_skipped, false)?;
            if result.failed_count > 0 {
                return Err(CliError::Partial(format!(
                    "{} item(s) could not be deleted",
                    result.failed_count
                )));
            }
            Ok(())
        }
        Err(ReclaimError::DeletionCancelled { partial }) => {
            audit.record_event(clean_event(&partial, deletion_mode, locked_skipped, true));
            emit_clean_result(mode, &partial, deletion_mode, locked_skipped, true)?;
            Err(CliError::Partial(format!("cleanup interrupted: {}", partial.summary)))
        }
        Err(err) => Err(err.into()),
    }
}

fn clean_event(
    result: &DeletionResult,
    mode: DeletionMode,
    locked_skipped: usize,
    cancelled: bool,
) -> AuditEvent {
    let level = if cancelled || result.failed_count > 0 {
        AuditLevel::Warning
    } else {
        AuditLevel::Info
    };
    let verb = if cancelled { "interrupted" } else { "completed" };
    AuditEvent::cleanup(
        level,
        format!("Manual cleanup {verb}: {}", result.summary),
        json!({
            "trigger": "cli",
            "mode": mode.label(),
            "deleted": result.deleted_count,
            "skipped": result.skipped_count,
            "failed": result.failed_count,
            "pending_reboot": result.pending_reboot_count,
            "bytes_freed": result.bytes_freed,
            "locked_skipped": locked_skipped,
            "cancelled": cancelled,
        }),
    )
}

fn emit_clean_result(
    mode: OutputMode,
    result: &DeletionResult,
    deletion_mode: DeletionMode,
    locked_skipped: usize,
    cancelled: bool,
) -> Result<(), CliError> {
    match mode {
        OutputMode::Human => {
            print_deletion_result(result);
            if locked_skipped > 0 {
                println!("{locked_skipped} locked item(s) were left alone.");
            }
            if cancelled {
                println!("{}", "Cleanup was interrupted before finishing.".yellow());
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "command": "clean",
                "dry_run": false,
                "mode": deletion_mode.label(),
                "cancelled": cancelled,
                "locked_skipped": locked_skipped,
                "result": result,
            });
            write_json_line(&payload)?;
        }
    }
    Ok(())
}

// ──────────────────── check ────────────────────

fn run_check(cli: &Cli, args: &CheckArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let classifier = PathSafetyClassifier::with_additional_roots(&config.safety.additional_critical_roots)?;
    let raw = args.path.trim();
    if raw.is_empty() {
        return Err(CliError::User("path must not be empty".to_string()));
    }
    let absolute = std::path::absolute(raw).map_err(|e| CliError::User(format!("{raw}: {e}")))?;
    let verdict = classifier.classify(&absolute.to_string_lossy())?;

    match output_mode(cli) {
        OutputMode::Human => {
            let label = match &verdict {
                PathVerdict::Critical { .. } => "PROTECTED".red().bold(),
                PathVerdict::Exempted { .. } => "EXEMPTED".yellow().bold(),
                PathVerdict::Unprotected => "UNPROTECTED".green().bold(),
            };
            println!("{label} {}", absolute.display());
            println!("  {verdict}");
        }
        OutputMode::Json => {
            write_json_line(&json!({
                "command": "check",
                "path": absolute,
                "critical": verdict.is_critical(),
                "verdict": verdict.to_string(),
            }))?;
        }
    }
    Ok(())
}

// ──────────────────── automation / daemon ────────────────────

fn run_automation(cli: &Cli, args: &AutomationArgs) -> Result<(), CliError> {
    let engine = Engine::load(cli)?;
    let mode = output_mode(cli);
    match &args.command {
        AutomationCommand::Show => {
            let settings = engine.settings_store().load()?;
            emit_settings(mode, "automation show", &settings)
        }
        AutomationCommand::Set(set) => {
            let audit: Arc<dyn AuditSink> = Arc::new(DualLogger::from_config(&engine.config.logging));
            let scheduler = engine.scheduler(audit)?;
            let requested = apply_overrides(scheduler.settings(), set);
            let applied = scheduler.apply_settings(requested.clone())?;
            if mode == OutputMode::Human && applied != requested {
                println!("{}", "Some values were clamped into their allowed range.".yellow());
            }
            emit_settings(mode, "automation set", &applied)
        }
        AutomationCommand::RunOnce => {
            let audit: Arc<dyn AuditSink> = Arc::new(DualLogger::from_config(&engine.config.logging));
            let scheduler = engine.scheduler(audit)?;
            let cancel = CancellationToken::new();
            register_shutdown_signals(&cancel)?;
            let outcome = scheduler.run_once(&cancel);
            emit_run_outcome(mode, &outcome)
        }
    }
}

fn apply_overrides(mut settings: AutomationSettings, set: &AutomationSetArgs) -> AutomationSettings {
    if let Some(enabled) = set.enabled {
        settings.enabled = enabled;
    }
    if let Some(minutes) = set.interval_minutes {
        settings.interval_minutes = minutes;
    }
    if let Some(mode) = set.mode {
        settings.deletion_mode = mode.into();
    }
    if let Some(include) = set.include_downloads {
        settings.include_downloads = include;
    }
    if let Some(include) = set.include_browser_history {
        settings.include_browser_history = include;
    }
    if let Some(top) = set.top {
        settings.top_item_count = top;
    }
    settings
}

fn emit_settings(mode: OutputMode, command: &str, settings: &AutomationSettings) -> Result<(), CliError> {
    match mode {
        OutputMode::Human => {
            let state = if settings.enabled {
                "enabled".green()
            } else {
                "disabled".dimmed()
            };
            println!("Automation: {state}");
            println!("  interval:          {}", format_duration(settings.interval()));
            println!("  mode:              {}", settings.deletion_mode.label());
            println!("  top items:         {}", settings.top_item_count);
            println!("  downloads:         {}", yes_no(settings.include_downloads));
            println!("  browser history:   {}", yes_no(settings.include_browser_history));
            match settings.last_run_utc {
                Some(last) => println!("  last run:          {}", last.to_rfc3339()),
                None => println!("  last run:          never"),
            }
            if settings.enabled {
                match settings.last_run_utc {
                    Some(_) => println!("  next due:          {}", settings.next_due().to_rfc3339()),
                    None => println!("  next due:          now"),
                }
            }
        }
        OutputMode::Json => {
            let next_due = (settings.enabled && settings.last_run_utc.is_some())
                .then(|| settings.next_due().to_rfc3339());
            write_json_line(&json!({
                "command": command,
                "settings": settings,
                "next_due_utc": next_due,
            }))?;
        }
    }
    Ok(())
}

fn emit_run_outcome(mode: OutputMode, outcome: &RunOutcome) -> Result<(), CliError> {
    match mode {
        OutputMode::Human => match outcome {
            RunOutcome::Completed { result, locked_skipped } => {
                print_deletion_result(result);
                if *locked_skipped > 0 {
                    println!("{locked_skipped} locked item(s) were left alone.");
                }
            }
            RunOutcome::Skipped { reason } => println!("Skipped: {reason}"),
            RunOutcome::AlreadyRunning => println!("Another automated run is already in progress."),
            RunOutcome::Cancelled { partial } => {
                print_deletion_result(partial);
                println!("{}", "Run was interrupted before finishing.".yellow());
            }
            RunOutcome::Failed { error } => println!("{} {error}", "Run failed:".red()),
        },
        OutputMode::Json => {
            write_json_line(&json!({ "command": "automation run-once", "outcome": outcome }))?;
        }
    }
    match outcome {
        RunOutcome::Failed { error } => Err(CliError::Runtime(error.clone())),
        RunOutcome::Cancelled { partial } => Err(CliError::Partial(format!("run interrupted: {}", partial.summary))),
        _ => Ok(()),
    }
}

fn run_daemon(cli: &Cli) -> Result<(), CliError> {
    let engine = Engine::load(cli)?;
    let shutdown = CancellationToken::new();
    register_shutdown_signals(&shutdown)?;
    let audit: Arc<dyn AuditSink> = Arc::new(DualLogger::from_config(&engine.config.logging));

    let report = drain_pending(&engine, &shutdown)?;
    if !report.removed.is_empty() || !report.remaining.is_empty() {
        audit.record_event(drain_event(&report));
    }

    let scheduler = engine.scheduler(Arc::clone(&audit))?;
    scheduler.start()?;
    let settings = scheduler.settings();
    eprintln!(
        "reclaim daemon running: automation {}, every {}, mode {}",
        if settings.enabled { "enabled" } else { "disabled" },
        format_duration(settings.interval()),
        settings.deletion_mode.label()
    );

    while !shutdown.is_cancelled() {
        std::thread::sleep(DAEMON_POLL_INTERVAL);
    }
    eprintln!("reclaim daemon stopping");
    scheduler.stop();
    Ok(())
}

// ──────────────────── pending ────────────────────

fn run_pending(cli: &Cli, args: &PendingArgs) -> Result<(), CliError> {
    let engine = Engine::load(cli)?;
    let mode = output_mode(cli);
    let queue = engine.platform.reboot_queue();
    match args.command {
        PendingCommand::List => {
            let pending = queue
                .list()
                .map_err(|e| CliError::Runtime(format!("{}: {e}", queue.path().display())))?;
            match mode {
                OutputMode::Human => {
                    if pending.is_empty() {
                        println!("No deletions are waiting for a restart.");
                    }
                    for item in &pending {
                        println!("  {}  (queued {})", item.path.display(), item.scheduled_at.to_rfc3339());
                    }
                }
                OutputMode::Json => write_json_line(&json!({ "command": "pending list", "items": pending }))?,
            }
            Ok(())
        }
        PendingCommand::Process => {
            let cancel = CancellationToken::new();
            register_shutdown_signals(&cancel)?;
            let report = drain_pending(&engine, &cancel)?;
            if !report.removed.is_empty() || !report.remaining.is_empty() {
                DualLogger::from_config(&engine.config.logging).record_event(drain_event(&report));
            }
            match mode {
                OutputMode::Human => {
                    println!("Removed {} queued item(s).", report.removed.len());
                    for (path, reason) in &report.remaining {
                        println!("  {} {}: {reason}", "still pending".yellow(), path.display());
                    }
                }
                OutputMode::Json => write_json_line(&json!({ "command": "pending process", "report": report }))?,
            }
            if report.is_clean() {
                Ok(())
            } else {
                Err(CliError::Partial(format!(
                    "{} queued item(s) could not be removed",
                    report.remaining.len()
                )))
            }
        }
    }
}

fn drain_pending(engine: &Engine, cancel: &CancellationToken) -> Result<DrainReport, CliError> {
    let queue = engine.platform.reboot_queue();
    queue
        .drain(engine.pipeline.aggressive(), cancel)
        .map_err(|e| CliError::Runtime(format!("{}: {e}", queue.path().display())))
}

fn drain_event(report: &DrainReport) -> AuditEvent {
    let level = if report.is_clean() {
        AuditLevel::Info
    } else {
        AuditLevel::Warning
    };
    let remaining: Vec<Value> = report
        .remaining
        .iter()
        .map(|(path, reason)| json!({ "path": path, "reason": reason }))
        .collect();
    AuditEvent::cleanup(
        level,
        format!(
            "Processed deferred deletions: {} removed, {} remaining",
            report.removed.len(),
            report.remaining.len()
        ),
        json!({ "removed": report.removed, "remaining": remaining }),
    )
}

// ──────────────────── output helpers ────────────────────

fn print_preview(preview: &Preview) {
    for (i, scored) in preview.items.iter().enumerate() {
        let item = &scored.item;
        let kind = if item.is_directory { "dir " } else { "file" };
        println!(
            "  {:>3}. {} {} ({}, confidence {:.2}, {})",
            i + 1,
            kind.dimmed(),
            item.path.display(),
            format_bytes(item.size_bytes),
            scored.evaluation.confidence,
            scored.target,
        );
        if !scored.evaluation.signals.is_empty() {
            println!("       {}", scored.evaluation.signals.join("; ").dimmed());
        }
    }
}

fn print_scan_footnotes(preview: &Preview) {
    if !preview.retained.is_empty() {
        println!("  {} recent crash dump(s) kept by retention.", preview.retained.len());
    }
    for error in &preview.errors {
        eprintln!("  {} {error}", "warning:".yellow());
    }
}

fn print_deletion_result(result: &DeletionResult) {
    for entry in &result.entries {
        let tag = match entry.disposition {
            DeletionDisposition::Deleted => "deleted".green(),
            DeletionDisposition::Skipped => "skipped".yellow(),
            DeletionDisposition::PendingReboot => "pending".cyan(),
            DeletionDisposition::Failed => "failed".red(),
        };
        match &entry.reason {
            Some(reason) => println!("  {tag:<8} {} ({reason})", entry.path.display()),
            None => println!("  {tag:<8} {}", entry.path.display()),
        }
    }
    println!("{}", result.summary.bold());
}

const fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var(OUTPUT_FORMAT_ENV).ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
