//! Command-line interface for WinScout
//!
//! A thin debugging and operations shell over [`WindowService`]: one-shot
//! listing, polling, per-app lookup, permission checks and activation.

use crate::cache::CacheStatistics;
use crate::config::{self, ScoutConfig};
use crate::diagnostics;
use crate::discovery::{DiscoveryOptions, WindowSnapshot};
use crate::macos::notifications::{pump_run_loop, WorkspaceObserver};
use crate::permissions::{PermissionChecker, PermissionStatus, PermissionType};
use crate::services::WindowService;
use crate::{Result, ScoutError};
use anyhow::Context;
use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const TITLE_WIDTH: usize = 40;
const APP_WIDTH: usize = 25;

/// WinScout command-line interface
#[derive(Parser, Debug)]
#[command(name = "winscout")]
#[command(about = "Discover and activate macOS windows across desktops")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct ScoutCli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List windows once
    List(ListArgs),

    /// Poll windows and print count changes with cache statistics
    Watch(WatchArgs),

    /// List the windows of one application
    App(AppArgs),

    /// Show or request the permissions WinScout relies on
    Permissions {
        /// Trigger the system prompt for anything missing
        #[arg(long)]
        request: bool,
    },

    /// Bring one window to the front, switching desktops if needed
    Activate {
        #[arg(long)]
        window_id: u32,

        /// Owning process; resolved from the window list when omitted
        #[arg(long)]
        pid: Option<i32>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Compact,
}

/// Filter flags shared by every discovering command
#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    /// Keep hidden windows
    #[arg(long)]
    pub include_hidden: bool,

    /// Keep minimized windows
    #[arg(long)]
    pub include_minimized: bool,

    /// Window-server data only, no accessibility or desktop lookups
    #[arg(long)]
    pub fast: bool,

    /// Only windows on a currently visible desktop
    #[arg(long)]
    pub active_desktop_only: bool,

    /// Keep only these bundle identities (`*` wildcards allowed)
    #[arg(long = "bundle")]
    pub bundles: Vec<String>,

    #[arg(long)]
    pub min_width: Option<u32>,

    #[arg(long)]
    pub min_height: Option<u32>,

    /// Drop applications with this exact name
    #[arg(long = "exclude-app")]
    pub exclude_apps: Vec<String>,

    /// Drop applications whose name contains this text
    #[arg(long = "exclude-app-containing")]
    pub exclude_app_substrings: Vec<String>,
}

impl FilterArgs {
    pub fn to_options(&self, config: &ScoutConfig) -> DiscoveryOptions {
        let mut options = if self.fast {
            DiscoveryOptions::fast()
        } else {
            DiscoveryOptions::default()
        };

        config.discovery.apply_to(&mut options);
        options.include_hidden = self.include_hidden;
        options.include_minimized = self.include_minimized;
        if self.active_desktop_only {
            options.include_inactive_desktops = false;
        }
        if let Some(width) = self.min_width {
            options.min_width = width;
        }
        if let Some(height) = self.min_height {
            options.min_height = height;
        }
        options.bundle_whitelist = self.bundles.iter().cloned().collect();
        options.excluded_app_names = self.exclude_apps.iter().cloned().collect();
        options.excluded_app_name_substrings =
            self.exclude_app_substrings.iter().cloned().collect();
        options
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Case-insensitive application name filter
    #[arg(long)]
    pub app: Option<String>,

    /// Serve from the snapshot cache and report its statistics
    #[arg(long)]
    pub cached: bool,

    /// Also write a Markdown debug dump
    #[arg(long)]
    pub dump: bool,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Poll interval in milliseconds
    #[arg(long, default_value = "1000")]
    pub interval: u64,

    /// Stop after this many polls
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct AppArgs {
    /// Bundle identifier, e.g. com.apple.Safari
    pub bundle_id: String,

    #[command(flatten)]
    pub filters: FilterArgs,

    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

/// Render `snapshots` in the requested format
pub fn render(snapshots: &[WindowSnapshot], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Table => Ok(format_table(snapshots)),
        OutputFormat::Json => format_json(snapshots),
        OutputFormat::Compact => Ok(format_compact(snapshots)),
    }
}

/// App, title, id and pid columns followed by a total line
pub fn format_table(snapshots: &[WindowSnapshot]) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<app$} {:<title$} {:>8} {:>7}",
        "App",
        "Window Title",
        "ID",
        "PID",
        app = APP_WIDTH,
        title = TITLE_WIDTH
    );
    let _ = writeln!(out, "{}", "-".repeat(85));

    for snapshot in snapshots {
        let _ = writeln!(
            out,
            "{:<app$} {:<title$} {:>8} {:>7}",
            snapshot.app_name,
            truncate_title(&snapshot.title),
            snapshot.window_id,
            snapshot.pid,
            app = APP_WIDTH,
            title = TITLE_WIDTH
        );
    }

    let _ = writeln!(out, "\nTotal windows: {}", snapshots.len());
    if !snapshots.is_empty() {
        let _ = writeln!(out, "\nExample usage:");
        let _ = writeln!(out, "  winscout activate --window-id <ID> --pid <PID>");
    }
    out
}

/// One tab-separated line per window
pub fn format_compact(snapshots: &[WindowSnapshot]) -> String {
    snapshots
        .iter()
        .map(|snapshot| {
            format!(
                "{}\t{}\t{}\t{}\n",
                snapshot.window_id, snapshot.pid, snapshot.app_name, snapshot.title
            )
        })
        .collect()
}

/// Sorted-key JSON array with ISO-8601 timestamps
pub fn format_json(snapshots: &[WindowSnapshot]) -> Result<String> {
    // Round-tripping through `Value` orders every object's keys.
    let value = serde_json::to_value(snapshots).context("failed to serialize windows")?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Titles longer than the column keep 37 characters plus an ellipsis
pub fn truncate_title(title: &str) -> String {
    if title.chars().count() > TITLE_WIDTH {
        let kept: String = title.chars().take(TITLE_WIDTH - 3).collect();
        format!("{}...", kept)
    } else {
        title.to_string()
    }
}

/// Keep windows whose application name contains `needle`, ignoring case
pub fn filter_by_app(snapshots: Vec<WindowSnapshot>, needle: &str) -> Vec<WindowSnapshot> {
    let needle = needle.to_lowercase();
    snapshots
        .into_iter()
        .filter(|snapshot| snapshot.app_name.to_lowercase().contains(&needle))
        .collect()
}

/// `+added/-removed` between two polls
pub fn count_delta(previous: &BTreeSet<u32>, current: &BTreeSet<u32>) -> (usize, usize) {
    (
        current.difference(previous).count(),
        previous.difference(current).count(),
    )
}

fn format_statistics(stats: &CacheStatistics) -> String {
    format!(
        "cache hits: {} misses: {} rate: {:.0}% entries: {}",
        stats.hits,
        stats.misses,
        stats.hit_rate * 100.0,
        stats.entries
    )
}

/// CLI command executor
pub struct CliExecutor {
    service: Arc<WindowService>,
    config: ScoutConfig,
}

impl CliExecutor {
    pub fn new(service: Arc<WindowService>, config: ScoutConfig) -> Self {
        Self { service, config }
    }

    /// Execute a CLI command
    pub async fn execute(&self, command: Commands) -> Result<()> {
        match command {
            Commands::List(args) => self.execute_list(args).await,
            Commands::Watch(args) => self.execute_watch(args).await,
            Commands::App(args) => self.execute_app(args).await,
            Commands::Permissions { request } => self.execute_permissions(request),
            Commands::Activate { window_id, pid } => self.execute_activate(window_id, pid).await,
        }
    }

    async fn execute_list(&self, args: ListArgs) -> Result<()> {
        let options = args.filters.to_options(&self.config);
        if !args.cached {
            self.service.clear().await;
        }

        let mut windows = self.service.discover_windows(&options).await?;
        if let Some(app) = &args.app {
            windows = filter_by_app(windows, app);
        }
        info!(count = windows.len(), "Listed windows");

        if windows.is_empty() && !self.service.has_accessibility_permission() {
            eprintln!("No windows found. Accessibility permission is missing; run `winscout permissions --request`.");
        }

        print!("{}", render(&windows, args.format)?);

        if args.dump {
            let path = diagnostics::write_dump(&self.config.diagnostics.dump_dir(), &windows)?;
            eprintln!("Debug dump written to {}", path.display());
        }
        if args.cached {
            eprintln!("{}", format_statistics(&self.service.statistics().await));
        }
        Ok(())
    }

    async fn execute_watch(&self, args: WatchArgs) -> Result<()> {
        let options = args.filters.to_options(&self.config);
        let interval = Duration::from_millis(args.interval.max(1));

        let observer = match WorkspaceObserver::start() {
            Ok((observer, events)) => {
                self.service.attach_event_stream(events);
                Some(observer)
            }
            Err(err) => {
                warn!(error = %err, "Workspace notifications unavailable, relying on TTL expiry");
                None
            }
        };

        let mut previous: BTreeSet<u32> = BTreeSet::new();
        let mut polls = 0u64;
        loop {
            let windows = self.service.discover_windows(&options).await?;
            let current: BTreeSet<u32> = windows.iter().map(|w| w.window_id).collect();
            let (added, removed) = count_delta(&previous, &current);
            let stats = self.service.statistics().await;

            println!(
                "[{}] windows: {} (+{}/-{}) {}",
                Local::now().format("%H:%M:%S"),
                current.len(),
                added,
                removed,
                format_statistics(&stats)
            );
            previous = current;

            polls += 1;
            if args.count.is_some_and(|limit| polls >= limit) {
                break;
            }

            if observer.is_some() {
                tokio::task::block_in_place(|| pump_run_loop(interval));
            } else {
                tokio::time::sleep(interval).await;
            }
        }

        debug!(polls, "Watch finished");
        Ok(())
    }

    async fn execute_app(&self, args: AppArgs) -> Result<()> {
        let pids = self
            .service
            .running_pids_for_bundle(&args.bundle_id)
            .await?;
        if pids.is_empty() {
            return Err(ScoutError::InvalidIdentifier(format!(
                "bundle '{}' is not running",
                args.bundle_id
            ))
            .into());
        }

        let options = args.filters.to_options(&self.config);
        let windows = self
            .service
            .discover_for_bundle(&args.bundle_id, &options)
            .await?;

        if windows.is_empty() {
            println!(
                "{} is running (pid {:?}) but has no matching windows",
                args.bundle_id, pids
            );
            return Ok(());
        }

        print!("{}", render(&windows, args.format)?);
        Ok(())
    }

    fn execute_permissions(&self, request: bool) -> Result<()> {
        let mut checker = PermissionChecker::default();
        if request {
            checker.request_missing()?;
        }

        let summary = checker.get_permission_summary();
        println!("Permission Status:");
        for permission in [PermissionType::Accessibility, PermissionType::ScreenRecording] {
            let status = summary
                .statuses
                .get(&permission)
                .copied()
                .unwrap_or(PermissionStatus::Unknown);
            println!("  {:<18} {:?}", permission.to_string(), status);
        }
        println!("{}", summary.description());

        for permission in summary.missing_permissions() {
            println!("\n{}", checker.get_permission_instructions(permission));
        }
        Ok(())
    }

    async fn execute_activate(&self, window_id: u32, pid: Option<i32>) -> Result<()> {
        let report = self
            .service
            .activate(window_id, pid)?
            .await
            .context("activation task failed")?;

        match report.pid {
            Some(pid) => println!(
                "Activated window {} (pid {}, raised: {})",
                report.window_id, pid, report.raised
            ),
            None => {
                return Err(ScoutError::InvalidIdentifier(format!(
                    "no process owns window {}",
                    window_id
                ))
                .into())
            }
        }
        Ok(())
    }
}

/// Load configuration, build the service and run `cli`; returns the exit code
pub async fn run_cli(cli: ScoutCli) -> i32 {
    match execute_cli(cli).await {
        Ok(()) => 0,
        Err(err) => {
            error!("Command failed: {:#}", err);
            eprintln!("error: {:#}", err);
            1
        }
    }
}

async fn execute_cli(cli: ScoutCli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => config::load_from(path)?,
        None => config::load()?,
    };

    let service = Arc::new(WindowService::system(&config)?);
    let executor = CliExecutor::new(service, config);
    executor.execute(cli.command).await
}
