//! `dossier`: research companies from the command line.
//!
//! Subcommands: `chat` (interactive), `ask` (one message; answers a pending
//! clarification when there is one), `reset` (forget a session).

mod repl;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dossier_agent::prelude::*;
use dossier_checkpoint::prelude::*;
use dossier_core::config::WorkflowConfig;
use dossier_llm::openai::OpenAIOracle;
use dossier_research::prelude::*;

const DEFAULT_SESSION: &str = "default";

#[derive(Parser, Debug)]
#[command(name = "dossier", version)]
#[command(about = "Company research assistant with resumable sessions")]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Session identifier; conversation and pending questions are kept per session
    #[arg(long, global = true, value_name = "ID")]
    session: Option<String>,

    /// Where sessions are stored
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Sqlite)]
    store: StoreKind,

    /// SQLite database path (default: <data dir>/dossier/sessions.db)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    /// Workflow configuration (YAML); DOSSIER_* variables override it
    #[arg(long, global = true, value_name = "FILE", env = "DOSSIER_CONFIG")]
    config: Option<PathBuf>,

    /// Company catalog (YAML) used when DOSSIER_SEARCH_URL is not set
    #[arg(long, global = true, value_name = "FILE")]
    catalog: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Interactive session; clarifying questions are asked inline
    Chat,
    /// Send one message and print the reply
    Ask {
        #[arg(required = true, trailing_var_arg = true, value_name = "TEXT")]
        text: Vec<String>,
    },
    /// Forget everything stored for the session
    Reset,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum StoreKind {
    Memory,
    Sqlite,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dossier=info".into()),
        )
        .init();
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<WorkflowConfig> {
    let config = match path {
        Some(path) => WorkflowConfig::from_yaml_file(path)?
            .merge_env(|key| std::env::var(key).ok())?,
        None => WorkflowConfig::from_env()?,
    };
    Ok(config)
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let Some(base) = dirs::data_dir() else {
        bail!("no data directory on this platform; pass --db");
    };
    Ok(base.join("dossier").join("sessions.db"))
}

fn open_store(kind: StoreKind, db: Option<PathBuf>) -> anyhow::Result<Arc<dyn CheckpointStore>> {
    match kind {
        StoreKind::Memory => Ok(Arc::new(MemoryCheckpointStore::new())),
        StoreKind::Sqlite => {
            let path = match db {
                Some(path) => path,
                None => default_db_path()?,
            };
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            Ok(Arc::new(SqliteCheckpointStore::new(&path)?))
        }
    }
}

fn research_client(catalog: Option<&PathBuf>) -> anyhow::Result<Arc<dyn ResearchClient>> {
    if let Some(http) = HttpResearchClient::from_env()? {
        tracing::info!(url = http.base_url(), "using HTTP research provider");
        return Ok(Arc::new(http));
    }
    let catalog = match catalog {
        Some(path) => CatalogResearchClient::from_yaml_file(path)?,
        None => CatalogResearchClient::builtin()?,
    };
    tracing::info!(companies = catalog.companies().len(), "using company catalog");
    Ok(Arc::new(catalog))
}

fn build_agent(args: &Args) -> anyhow::Result<ResearchAgent> {
    let config = load_config(args.config.as_ref())?;
    let oracle = OpenAIOracle::from_env().context("configuring the language model")?;
    let research = research_client(args.catalog.as_ref())?;
    let store = open_store(args.store, args.db.clone())?;
    Ok(ResearchAgent::new(Arc::new(oracle), research, store, config)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();
    let session = args.session.clone();

    match &args.cmd {
        Command::Chat => {
            let agent = build_agent(&args)?;
            let session = session.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            repl::run(&agent, &session).await?;
        }
        Command::Ask { text } => {
            let agent = build_agent(&args)?;
            let session = session.unwrap_or_else(|| DEFAULT_SESSION.to_string());
            let outcome = agent.submit(&session, &text.join(" ")).await?;
            repl::print_outcome(&outcome);
            if outcome.clarification().is_some() {
                eprintln!("(answer with: dossier ask --session {session} <reply>)");
            }
        }
        Command::Reset => {
            if args.store == StoreKind::Memory {
                bail!("nothing to reset in a memory store");
            }
            let agent = build_agent(&args)?;
            let session = session.unwrap_or_else(|| DEFAULT_SESSION.to_string());
            agent.reset(&session).await?;
            println!("session '{session}' reset");
        }
    }
    Ok(())
}
