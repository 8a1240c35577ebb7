//! `self-defence` operator CLI.
//!
//! Provides `check`, `probe`, `dump`, and `watch` subcommands for validating
//! a configuration, evaluating a synthetic request against the live control
//! region, printing the region, and following its changes.

#![warn(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use self_defence::config::DefenceConfig;
use self_defence::region::ControlRegion;
use self_defence::scope::RoutePolicy;
use self_defence::watch::ChangeWatcher;
use self_defence::{logging, DefenceRuntime, Request, RequestFilter};

/// Self defence — shared-memory driven admission filter.
#[derive(Parser)]
#[command(name = "self-defence", version, about)]
struct Cli {
    /// Config file (default: `$SELF_DEFENCE_CONFIG` or `./self-defence.toml`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Validate the configuration, attach the region, print resolved scopes.
    Check,
    /// Decide one synthetic request against the live region.
    Probe {
        /// Server the request is routed to.
        #[arg(long)]
        server: String,
        /// Location inside the server.
        #[arg(long)]
        location: Option<String>,
        /// Connection number used for sampling.
        #[arg(long)]
        connection_id: u64,
        /// Query string, without the `?`.
        #[arg(long)]
        query: Option<String>,
        /// Treat the request as a sub-request.
        #[arg(long)]
        subrequest: bool,
        /// Print the verdict as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print every byte of the control region.
    Dump,
    /// Log control byte changes until interrupted.
    Watch {
        /// Poll period in milliseconds.
        #[arg(long, default_value_t = 200)]
        interval_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => DefenceConfig::load_from(path)?,
        None => DefenceConfig::load().context("failed to load configuration")?,
    };

    // Only the long-running mode writes log files.
    let _logging_guard = match (&cli.command, &config.logging.dir) {
        (Command::Watch { .. }, Some(dir)) => {
            Some(logging::init_production(dir, &config.logging.level)?)
        }
        _ => {
            logging::init_cli(&config.logging.level);
            None
        }
    };

    let runtime = DefenceRuntime::start(&config).context("invalid self defence configuration")?;

    match cli.command {
        Command::Check => handle_check(&runtime),
        Command::Probe {
            server,
            location,
            connection_id,
            query,
            subrequest,
            json,
        } => {
            let mut request = Request::new(&server, connection_id);
            if let Some(location) = location.as_deref() {
                request = request.location(location);
            }
            if let Some(query) = query.as_deref() {
                request = request.query(query);
            }
            if subrequest {
                request = request.subrequest();
            }
            handle_probe(&runtime, &request, json)
        }
        Command::Dump => handle_dump(&runtime),
        Command::Watch { interval_ms } => handle_watch(&runtime, interval_ms).await,
    }
}

/// Print the region and every resolved scope.
fn handle_check(runtime: &DefenceRuntime) -> Result<()> {
    let policies = runtime.policies();
    match policies.region() {
        Some(spec) => println!(
            "region: key {} length {} (attached)",
            spec.key(),
            spec.length()
        ),
        None => println!("region: not declared, filter disabled"),
    }

    for policy in policies.iter() {
        print_policy(policy);
    }

    println!("configuration ok");
    Ok(())
}

fn print_policy(policy: &RoutePolicy) {
    println!(
        "{}: offset {} ({}), {} action(s) ({})",
        policy.name(),
        policy.offset(),
        policy.offset_setting().origin(),
        policy.actions().len(),
        policy.actions_setting().origin(),
    );
    for action in policy.actions() {
        println!("  {action}");
    }
}

/// Decide `request` and print the verdict.
fn handle_probe(runtime: &DefenceRuntime, request: &Request<'_>, json: bool) -> Result<()> {
    let verdict = runtime.filter().decide(request);
    if json {
        let out = serde_json::to_string(&verdict).context("failed to encode verdict")?;
        println!("{out}");
    } else {
        println!("{verdict}");
    }
    Ok(())
}

fn attached_region(runtime: &DefenceRuntime) -> Result<&Arc<dyn ControlRegion>> {
    runtime
        .region()
        .ok_or_else(|| anyhow::anyhow!("no control region declared in configuration"))
}

/// Print `offset value` per line.
fn handle_dump(runtime: &DefenceRuntime) -> Result<()> {
    let region = attached_region(runtime)?;
    for (offset, value) in region.snapshot().iter().enumerate() {
        println!("{offset:>3} {value:>3}");
    }
    Ok(())
}

/// Follow region changes until Ctrl-C.
async fn handle_watch(runtime: &DefenceRuntime, interval_ms: u64) -> Result<()> {
    let region = Arc::clone(attached_region(runtime)?);
    info!(len = region.len(), interval_ms, "watching control region");

    let watcher = ChangeWatcher::new(region);
    let seen = watcher
        .run(Duration::from_millis(interval_ms.max(1)), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C, stopping watch");
            }
        })
        .await;

    info!(changes = seen, "watch stopped");
    Ok(())
}
