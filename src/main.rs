//! school-vacation-mcp: MCP server for school vacation calendar lookups
//!
//! Loads the calendar dataset and serves vacation queries over stdio or one
//! of the HTTP transports.

use std::error::Error as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

use school_vacation_mcp::calendar::{CalendarTable, VacationQueryEngine};
use school_vacation_mcp::config::{self, Config, TransportKind};
use school_vacation_mcp::error::{ConfigError, StartupError};
use school_vacation_mcp::mcp::http::{self, AppState, Binding};
use school_vacation_mcp::mcp::server::McpServer;

/// MCP server for school vacation calendar lookups.
///
/// Answers school vacation questions for Belgium, the Netherlands and
/// Luxembourg from a day-by-day calendar dataset.
#[derive(Parser, Debug)]
#[command(name = "school-vacation-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Transport to serve (overrides the configuration file)
    #[arg(short, long, value_enum)]
    transport: Option<TransportKind>,

    /// Port for the HTTP transports (overrides configuration and PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to the calendar dataset
    #[arg(short, long, value_name = "CSV_FILE")]
    data: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    /// Applies command-line overrides on top of file and environment settings.
    fn apply(&self, cfg: &mut Config) {
        if let Some(transport) = self.transport {
            cfg.server.transport = transport;
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some(data) = &self.data {
            cfg.data_path = Some(data.clone());
        }
    }
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN, // Default to warn for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Builds the stderr subscriber; stdout carries the stdio transport.
fn build_subscriber<W>(level: Level, writer: W) -> impl tracing::Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(writer)
        .finish()
}

/// Installs the process-wide subscriber.
fn init_tracing(level: Level) {
    let subscriber = build_subscriber(level, std::io::stderr);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {e}");
    }
}

/// Loads configuration and applies environment and CLI overrides.
fn load_settings(args: &Args) -> Result<Config, ConfigError> {
    let mut cfg = config::load_config(args.config.as_deref())?;
    cfg.apply_env()?;
    args.apply(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Runs the configured transport to completion.
async fn run(cfg: Config, engine: Arc<VacationQueryEngine>) -> std::io::Result<()> {
    match Binding::for_transport(cfg.server.transport) {
        None => {
            info!("MCP server ready, waiting for client connection...");
            McpServer::new(engine).run().await
        }
        Some(binding) => {
            let state = AppState::new(engine, cfg.auth.token.clone());
            http::serve(&cfg.server, binding, state).await
        }
    }
}

/// Loads the dataset, then blocks on the transport until shutdown.
fn start(cfg: Config) -> Result<(), StartupError> {
    let data_path = cfg.data_path();
    let table = CalendarTable::load(&data_path)?;
    let engine = Arc::new(VacationQueryEngine::new(table));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(StartupError::Runtime)?;

    runtime
        .block_on(run(cfg, engine))
        .map_err(StartupError::Transport)
}

/// Logs an error together with every cause beneath it.
fn report(err: &StartupError) {
    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    error!(error = %err, causes = ?causes, "school-vacation-mcp stopped");
}

/// Entry point for the school-vacation-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    // Configuration is read before its log level is known, so loading logs
    // at the command-line level only.
    let bootstrap = build_subscriber(
        get_log_level(args.verbose, args.quiet, "warn"),
        std::io::stderr,
    );
    let cfg = match tracing::subscriber::with_default(bootstrap, || load_settings(&args)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(get_log_level(args.verbose, args.quiet, &cfg.logging.level));

    // GPLv3 Section 5d notice
    eprintln!(
        "school-vacation-mcp {}  Copyright (C) 2026  The Embedded Society",
        env!("CARGO_PKG_VERSION")
    );
    eprintln!("This program comes with ABSOLUTELY NO WARRANTY.");
    eprintln!("This is free software, licensed under GPL-3.0-or-later.");
    eprintln!("Source: {}", env!("CARGO_PKG_REPOSITORY"));
    eprintln!();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        transport = ?cfg.server.transport,
        "Starting school-vacation-mcp server"
    );

    match start(cfg) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&e);
            ExitCode::FAILURE
        }
    }
}
