//! Mastery Loop CLI
//!
//! Entry point for interactive learning, the local session server and
//! progress reports.

mod terminal;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use mastery_gateway::{GatewayOptions, HttpGateway};
use mastery_report::json::JsonGenerator;
use mastery_report::{AttemptInput, MarkdownGenerator, ProgressReport};
use mastery_session::{create_router, AppState, Config, ProgressRecord, SessionController};
use tokio::io::BufReader;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crate::terminal::Terminal;

/// Mastery Loop - Adaptive Tutoring Client
///
/// Explains a topic, quizzes the learner, grades the answers and re-explains
/// in simpler terms until the topic is mastered or the attempts run out.
#[derive(Parser, Debug)]
#[command(name = "mastery")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: mastery.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Base URL of the tutoring service (overrides backendUrl)
    #[arg(long, value_name = "URL", global = true)]
    backend_url: Option<String>,

    /// Bearer token for the tutoring service
    #[arg(long, env = "MASTERY_TOKEN", hide_env_values = true, global = true)]
    token: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start an interactive learning session in the terminal
    Learn {
        /// Topic to start with instead of choosing from the catalog
        #[arg(short, long)]
        topic: Option<String>,
    },

    /// Serve the session over HTTP and WebSocket
    Serve {
        /// Port for the HTTP API server (overrides port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print or save a progress report
    Progress {
        /// Report format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Write the report to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (warn while the
    // terminal session owns the screen, info otherwise)
    let default_level = match (&args.command, args.verbose) {
        (_, true) => "debug",
        (Command::Learn { .. }, false) => "warn",
        _ => "info",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(ref backend_url) = args.backend_url {
        config.backend_url.clone_from(backend_url);
    }
    if let Command::Serve { port: Some(port) } = args.command {
        config.port = port;
    }

    // Re-validate after overrides
    config.validate()?;

    let gateway = HttpGateway::new(GatewayOptions::from_config(&config, args.token))?;
    tracing::info!(backend = %gateway.base_url(), "Using tutoring service");

    match args.command {
        Command::Learn { topic } => learn(&config, gateway, topic).await,
        Command::Serve { .. } => serve(config, gateway).await,
        Command::Progress {
            format,
            pretty,
            output,
        } => progress(&config, gateway, format, pretty, output.as_deref()).await,
    }
}

/// Loads configuration from the specified path or the default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

// ============================================================================
// learn
// ============================================================================

async fn learn(config: &Config, gateway: HttpGateway, topic: Option<String>) -> anyhow::Result<()> {
    let controller = SessionController::new(Arc::new(gateway), config);

    if let Some(topic) = topic {
        if let Err(e) = controller.start_learning(&topic).await {
            println!("Error: {e}");
        }
    }

    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = std::io::stdout();
    Terminal::new(controller, stdin, stdout.lock()).run().await
}

// ============================================================================
// serve
// ============================================================================

async fn serve(config: Config, gateway: HttpGateway) -> anyhow::Result<()> {
    if let Err(e) = gateway.health_check().await {
        tracing::warn!(error = %e, "Tutoring service is not reachable yet");
    }

    let addr: SocketAddr = ([127, 0, 0, 1], config.port).into();
    let controller = SessionController::new(Arc::new(gateway), &config);
    let router = create_router(AppState::new(config, controller));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("Session API running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
            }
        })
        .await?;

    Ok(())
}

// ============================================================================
// progress
// ============================================================================

async fn progress(
    config: &Config,
    gateway: HttpGateway,
    format: ReportFormat,
    pretty: bool,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let controller = SessionController::new(Arc::new(gateway), config);
    let records = controller.list_progress().await?;

    let attempts = records.into_iter().map(convert_record).collect();
    let report = ProgressReport::from_attempts(attempts, config.display_utc_offset_minutes)?;

    let rendered = match format {
        ReportFormat::Markdown => MarkdownGenerator::new(&report).generate(),
        ReportFormat::Json => {
            let generator = JsonGenerator::new(&report);
            if pretty {
                generator.generate_pretty()?
            } else {
                generator.generate()?
            }
        }
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered).map_err(|e| {
                anyhow::anyhow!("Failed to write report: {e}\n\nPath: {}", path.display())
            })?;
            println!("Report written to {}", path.display());
        }
        None => println!("{rendered}"),
    }

    Ok(())
}

fn convert_record(record: ProgressRecord) -> AttemptInput {
    AttemptInput {
        topic: record.topic,
        attempt_number: record.attempt_number,
        score: record.score,
        date: record.date,
    }
}
