use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gcp_scheduler::config::Config;
use gcp_scheduler::gcp::client::GcpClient;
use gcp_scheduler::orchestrator::handle_trigger;
use gcp_scheduler::payload::Payload;
use gcp_scheduler::resource::{Action, Kind};
use gcp_scheduler::server::{self, AppState};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Scheduled start/stop for GCP compute resources
#[derive(Parser, Debug)]
#[command(name = "gcp-scheduler", version, about, long_about = None)]
struct Args {
    /// Log level (RUST_LOG takes precedence)
    #[arg(long, value_enum, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Path to a JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one start/stop invocation and print the report
    Run {
        /// Resource kind: compute, sql or gke
        kind: Kind,

        /// start or stop
        action: Action,

        /// Base64-encoded message, as published by the scheduler job
        #[arg(long, conflicts_with = "message")]
        data: Option<String>,

        /// Plain JSON message
        #[arg(long)]
        message: Option<String>,

        /// Project to act on, overriding the message
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Serve the Pub/Sub push endpoint
    Serve {
        /// Port to listen on (defaults to $PORT or 8080)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

fn setup_logging(level: LogLevel, format: LogFormat) -> tracing_appender::non_blocking::WorkerGuard {
    let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stdout());

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().with_current_span(true).init(),
    }

    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _log_guard = setup_logging(args.log_level, args.log_format);

    match run(args).await {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        },
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;

    match args.command {
        Command::Run {
            kind,
            action,
            data,
            message,
            project,
        } => {
            let payload = Payload::from_cli(data.as_deref(), message.as_deref(), project)
                .context("Invalid message")?;
            let client = GcpClient::new()
                .await
                .context("Failed to initialize GCP client")?;

            let report = handle_trigger(&client, &config, kind, action, payload).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        },
        Command::Serve { port } => {
            let client = GcpClient::new()
                .await
                .context("Failed to initialize GCP client")?;
            let port = port.unwrap_or(config.port);
            let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
                .await
                .with_context(|| format!("Failed to bind port {port}"))?;
            tracing::info!("Listening on {}", listener.local_addr()?);

            let state = AppState {
                client,
                config: Arc::new(config),
            };
            server::serve(listener, state).await?;
            Ok(ExitCode::SUCCESS)
        },
    }
}
