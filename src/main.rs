#![forbid(unsafe_code)]

//! `agentic-coder` binary.
//!
//! `serve` exposes the coding tools over MCP stdio; `exec` runs snippets
//! directly in one interpreter session and prints a record per snippet.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use agentic_coder::audit::writer::JsonlAuditWriter;
use agentic_coder::audit::{AuditEntry, AuditEventType, AuditLogger};
use agentic_coder::config::{log_level_directive, GlobalConfig};
use agentic_coder::kernel::{PackageSet, ProcessLauncher, SessionRegistry};
use agentic_coder::mcp::context::ToolContext;
use agentic_coder::mcp::handler::{CoderServer, ToolOptions};
use agentic_coder::mcp::tools::python_exec;
use agentic_coder::mcp::transport;
use agentic_coder::workspace::Workspace;
use agentic_coder::{AppError, Result};

/// Fallback log level variable consulted when `RUST_LOG` is unset.
const LOG_LEVEL_ENV: &str = "CODER_LOG_LEVEL";

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "agentic-coder", about = "Python coding tools over a persistent interpreter", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the tool surface over MCP stdio.
    Serve(ServeArgs),
    /// Run code snippets in one session and print their records.
    Exec(ExecArgs),
}

#[derive(Debug, Args)]
struct SessionArgs {
    /// Working directory for the interpreter and file tools.
    #[arg(long, default_value = ".")]
    dir: PathBuf,

    /// Package to inject into the session (repeatable).
    #[arg(long = "with", value_name = "PKG")]
    with: Vec<String>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Task file; its stem names the saved solution and the run log.
    #[arg(long)]
    task: Option<PathBuf>,

    /// Enable the `todo_write` tool.
    #[arg(long)]
    todo: bool,

    /// Enable the workspace file tools.
    #[arg(long)]
    file_tools: bool,
}

#[derive(Debug, Args)]
struct ExecArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Snippets to run in order; `-` reads one from stdin.
    #[arg(value_name = "CODE")]
    code: Vec<String>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let config = match &args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    info!("configuration loaded");

    match args.command {
        Command::Serve(serve) => run_serve(&config, serve).await,
        Command::Exec(exec) => run_exec(&config, exec).await,
    }
}

async fn run_serve(config: &GlobalConfig, args: ServeArgs) -> Result<()> {
    let packages = PackageSet::parse(&args.session.with)?;
    let workspace = Workspace::new(&args.session.dir)?;
    let basename = args.task.as_deref().and_then(task_basename);

    let audit: Arc<dyn AuditLogger> =
        Arc::new(JsonlAuditWriter::for_run(workspace.root(), basename.as_deref())?);
    let registry = Arc::new(
        SessionRegistry::new(ProcessLauncher::new(config.kernel_settings()))
            .with_audit(Arc::clone(&audit)),
    );
    let ctx = Arc::new(
        ToolContext::new(Arc::clone(&registry), workspace)
            .with_packages(packages)
            .with_task_basename(basename)
            .with_audit(audit),
    );

    ctx.record(
        AuditEntry::new(AuditEventType::RunStart).with_parameters(serde_json::json!({
            "working_dir": ctx.workspace().root().display().to_string(),
            "packages": ctx.packages().to_strings(),
            "task": args.task.as_ref().map(|t| t.display().to_string()),
            "todo": args.todo,
            "file_tools": args.file_tools,
        })),
    );

    let options = ToolOptions {
        todo: args.todo,
        file_tools: args.file_tools,
    };
    let server = CoderServer::new(Arc::clone(&ctx), options);

    // ── Serve until the client leaves or a signal arrives ──
    let ct = CancellationToken::new();
    let serve_ct = ct.clone();
    let mut serve_handle =
        tokio::spawn(async move { transport::serve_stdio(server, serve_ct).await });

    let served = tokio::select! {
        joined = &mut serve_handle => joined,
        () = shutdown_signal() => {
            info!("shutdown signal received");
            ct.cancel();
            serve_handle.await
        }
    };

    // ── Teardown ─────────────────────────────────────────
    let issues = ctx.finish();
    registry.release().await;
    info!(issues = issues.len(), "agentic-coder shut down");

    match served {
        Ok(result) => result,
        Err(err) => Err(AppError::Config(format!("transport task failed: {err}"))),
    }
}

async fn run_exec(config: &GlobalConfig, args: ExecArgs) -> Result<()> {
    let packages = PackageSet::parse(&args.session.with)?;
    let workspace = Workspace::new(&args.session.dir)?;
    let snippets = collect_snippets(args.code)?;

    let registry = Arc::new(SessionRegistry::new(ProcessLauncher::new(
        config.kernel_settings(),
    )));
    let ctx = ToolContext::new(Arc::clone(&registry), workspace).with_packages(packages);

    let run = async {
        for code in &snippets {
            let record = python_exec::python_exec(&ctx, code).await;
            println!("{}", record.to_json());
        }
    };

    tokio::select! {
        () = run => {}
        () = shutdown_signal() => info!("shutdown signal received"),
    }

    registry.release().await;
    Ok(())
}

fn collect_snippets(code: Vec<String>) -> Result<Vec<String>> {
    if code.is_empty() {
        return Ok(vec![read_stdin()?]);
    }
    code.into_iter()
        .map(|snippet| if snippet == "-" { read_stdin() } else { Ok(snippet) })
        .collect()
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

fn task_basename(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| {
            std::env::var(LOG_LEVEL_ENV)
                .ok()
                .and_then(|raw| EnvFilter::try_new(log_level_directive(&raw)).ok())
        })
        .unwrap_or_else(|| EnvFilter::new("warn"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
