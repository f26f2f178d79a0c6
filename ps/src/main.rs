//! PlanSmith - conversational project planning
//!
//! CLI entry point: interactive chat plus commands to inspect, refresh,
//! export and reset a session.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{info, warn};

use plansmith::cli::{Cli, Command, OutputFormat};
use plansmith::config::Config;
use plansmith::export::export_plan;
use plansmith::gateway::{LlmGateway, OfflineGateway, SynthesisGateway};
use plansmith::llm::create_client;
use plansmith::repl;
use plansmith::session::{PlanSession, SynthesisOutcome};
use sessionstore::{FileStore, KeyValueStore};

fn setup_logging(level: &str) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("plansmith")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Write to log file, not stdout/stderr, so the REPL stays clean
    let parsed = level.parse::<tracing::Level>().ok();
    let log_file = fs::File::create(log_dir.join("plansmith.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(parsed.unwrap_or(tracing::Level::INFO).into()),
        )
        .init();

    if parsed.is_none() {
        warn!(requested = %level, "Unknown log level, using INFO");
    }
    info!("Logging initialized (level: {})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // CLI flag > config file > INFO
    let level = cli
        .log_level
        .clone()
        .or_else(|| Config::load_log_level(cli.config.as_ref()))
        .unwrap_or_else(|| "info".to_string());
    setup_logging(&level).context("Failed to setup logging")?;

    let mut config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    if let Some(session) = cli.session {
        config.session.id = session;
    }

    info!(
        "PlanSmith loaded config: provider={}, model={}, session={}",
        config.llm.provider, config.llm.model, config.session.id
    );

    match cli.command.unwrap_or(Command::Chat { new: false }) {
        Command::Chat { new } => cmd_chat(config, new).await,
        Command::Show { format } => cmd_show(config, format).await,
        Command::Export { output } => cmd_export(config, output.as_deref()).await,
        Command::History { format } => cmd_history(config, format).await,
        Command::Status { format } => cmd_status(config, format).await,
        Command::Refresh => cmd_refresh(config).await,
        Command::Reset => cmd_reset(config).await,
    }
}

/// Gateway backed by the configured model provider
fn llm_gateway(config: &Config) -> Result<Arc<dyn SynthesisGateway>> {
    config.validate()?;
    let llm = create_client(&config.llm).map_err(|e| eyre::eyre!("Failed to create LLM client: {}", e))?;
    Ok(Arc::new(LlmGateway::new(llm).with_max_tokens(config.llm.max_tokens)))
}

fn open_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    let store = FileStore::open(&config.storage.dir)
        .context(format!("Failed to open session store at {}", config.storage.dir.display()))?;
    Ok(Arc::new(store))
}

async fn open_session(config: &Config, gateway: Arc<dyn SynthesisGateway>) -> Result<PlanSession> {
    PlanSession::open(gateway, open_store(config)?, config.session.clone())
        .await
        .context("Failed to open session")
}

/// Open a session for read-only commands; nothing is written for a new session
async fn inspect_session(config: &Config) -> Result<PlanSession> {
    PlanSession::inspect(Arc::new(OfflineGateway), open_store(config)?, config.session.clone())
        .await
        .context("Failed to open session")
}

/// Interactive chat
async fn cmd_chat(mut config: Config, new: bool) -> Result<()> {
    if new {
        config.session.id = uuid::Uuid::now_v7().to_string();
        info!(session_id = %config.session.id, "Starting new session");
    }
    let gateway = llm_gateway(&config)?;
    let session = open_session(&config, gateway).await?;
    repl::run_interactive(session).await
}

/// Print the current plan
async fn cmd_show(config: Config, format: OutputFormat) -> Result<()> {
    let session = inspect_session(&config).await?;
    let Some(plan) = session.current_plan().await else {
        println!("No plan yet for session '{}'.", config.session.id);
        return Ok(());
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
        OutputFormat::Text => print!("{}", plan.to_markdown()),
    }
    Ok(())
}

/// Write the current plan to a markdown file
async fn cmd_export(config: Config, output: Option<&Path>) -> Result<()> {
    let session = inspect_session(&config).await?;
    let plan = session
        .current_plan()
        .await
        .ok_or_else(|| eyre::eyre!("No plan to export for session '{}'", config.session.id))?;

    let path = export_plan(&plan, output)?;
    println!("Plan written to {}", path.display());
    Ok(())
}

/// Print the conversation
async fn cmd_history(config: Config, format: OutputFormat) -> Result<()> {
    let session = inspect_session(&config).await?;
    let log = session.log().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&log)?),
        OutputFormat::Text => {
            for turn in log.all() {
                println!(
                    "[{}] {}: {}\n",
                    turn.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    turn.role.label(),
                    turn.text
                );
            }
        }
    }
    Ok(())
}

/// Show session status
async fn cmd_status(config: Config, format: OutputFormat) -> Result<()> {
    let session = inspect_session(&config).await?;
    let status = session.status().await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Text => {
            println!("PlanSmith Status");
            println!("----------------");
            println!("Session: {}", status.session_id);
            println!("Turns:   {}", status.turns);
            println!("Plan:    {}", if status.has_plan { "yes" } else { "no" });
            println!("Store:   {}", config.storage.dir.display());
        }
    }
    Ok(())
}

/// Force a synthesis and wait for it
async fn cmd_refresh(config: Config) -> Result<()> {
    let gateway = llm_gateway(&config)?;
    let session = open_session(&config, gateway).await?;

    let outcome = session.force_resynthesize().await;
    session.settle().await;
    match outcome {
        SynthesisOutcome::Applied => println!("Plan updated."),
        SynthesisOutcome::NoUpdate => println!("No plan could be synthesized; the previous plan is unchanged."),
        other => println!("Plan not updated ({:?}).", other),
    }
    Ok(())
}

/// Clear the conversation and plan
async fn cmd_reset(config: Config) -> Result<()> {
    let session = open_session(&config, Arc::new(OfflineGateway)).await?;
    session.reset_session().await.context("Failed to reset session")?;
    println!("Session '{}' reset.", config.session.id);
    Ok(())
}
