//! Binary entry point for contextkeep.
//!
//! This binary provides a thin CLI over the contextkeep services. Every
//! command prints pretty JSON on stdout.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(missing_docs)]
// Allow print_stderr in main binary for CLI output
#![allow(clippy::print_stderr)]
#![allow(clippy::print_stdout)]
// Allow needless_pass_by_value for command functions
#![allow(clippy::needless_pass_by_value)]
// Allow multiple crate versions from transitive dependencies
#![allow(clippy::multiple_crate_versions)]

use clap::{Parser, Subcommand};
use contextkeep::models::{ActivityQuery, DocumentPatch, HistoryQuery, PatchOp};
use contextkeep::observability;
use contextkeep::{
    ContextKeepConfig, ContextKind, ContextUpdate, SearchFilter, SearchMode, ServiceContainer,
    WorkspaceId,
};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::process::ExitCode;

/// Environment variable naming a configuration file.
const CONFIG_PATH_ENV: &str = "CONTEXTKEEP_CONFIG_PATH";

/// Contextkeep - workspace-scoped project context for AI coding assistants.
#[derive(Parser)]
#[command(name = "contextkeep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Workspace identifier (usually the project path).
    #[arg(short, long, global = true, env = "CONTEXTKEEP_WORKSPACE")]
    workspace: String,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Read, update or list the history of a context document.
    Doc {
        #[command(subcommand)]
        action: DocAction,
    },

    /// Search knowledge items.
    Search {
        /// The search query.
        query: String,

        /// Search mode: lexical, semantic, or hybrid.
        #[arg(short, long, default_value = "hybrid")]
        mode: String,

        /// Maximum number of results.
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print the stable context prefix.
    Prefix,

    /// Compare a prefix hash with the current prefix.
    CacheState {
        /// Hash of a previously built prefix.
        #[arg(long)]
        hash: Option<String>,
    },

    /// Pack query-specific context under a token budget.
    Dynamic {
        /// What the caller is about to ask.
        intent: String,

        /// Token budget.
        #[arg(short, long)]
        budget: Option<usize>,
    },

    /// Start a session: stable prefix hash plus the last day of activity.
    Session,

    /// Summarize recent activity.
    Activity {
        /// Look back this many hours.
        #[arg(long)]
        hours: Option<i64>,
    },
}

/// Document actions.
#[derive(Subcommand)]
enum DocAction {
    /// Print a document.
    Get {
        /// `product` or `active`.
        kind: String,
    },

    /// Replace or patch a document.
    Update {
        /// `product` or `active`.
        kind: String,

        /// Replacement content as a JSON object.
        #[arg(long, conflicts_with = "patch")]
        content: Option<String>,

        /// Patch as a JSON object; `null` values delete keys.
        #[arg(long)]
        patch: Option<String>,
    },

    /// Print the history of a document, most recent first.
    History {
        /// `product` or `active`.
        kind: String,

        /// Maximum number of versions.
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only this version.
        #[arg(long)]
        version: Option<u64>,
    },
}

/// Main entry point.
fn main() -> ExitCode {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        },
    };

    let logging = if cli.verbose {
        config.logging.clone().with_level("debug")
    } else {
        config.logging.clone()
    };
    if let Err(e) = observability::init(&logging) {
        eprintln!("Failed to initialize observability: {e}");
        return ExitCode::FAILURE;
    }

    match run_command(cli, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        },
    }
}

/// Runs the selected command.
fn run_command(cli: Cli, config: ContextKeepConfig) -> Result<(), Box<dyn std::error::Error>> {
    let services = ServiceContainer::new(config)?;
    let workspace = WorkspaceId::new(cli.workspace)?;

    match cli.command {
        Commands::Doc { action } => match action {
            DocAction::Get { kind } => print_json(&services.context().read(&workspace, parse_kind(&kind)?)?),
            DocAction::Update {
                kind,
                content,
                patch,
            } => {
                let update = ContextUpdate::from_parts(
                    content.as_deref().map(parse_object).transpose()?,
                    patch.as_deref().map(parse_patch).transpose()?,
                )?;
                print_json(&services.context().update(&workspace, parse_kind(&kind)?, update)?)
            },
            DocAction::History {
                kind,
                limit,
                version,
            } => {
                let mut query = HistoryQuery::new();
                if let Some(limit) = limit {
                    query = query.with_limit(limit);
                }
                if let Some(version) = version {
                    query = query.with_version(version);
                }
                print_json(&services.context().history(&workspace, parse_kind(&kind)?, &query)?)
            },
        },
        Commands::Search { query, mode, limit } => {
            let mode: SearchMode = mode.parse()?;
            let mut filter = SearchFilter::new();
            if let Some(limit) = limit {
                filter = filter.with_limit(limit);
            }
            print_json(&services.search().search(&workspace, &query, mode, &filter)?)
        },
        Commands::Prefix => print_json(&services.assembler().build_stable_prefix(&workspace)?),
        Commands::CacheState { hash } => print_json(
            &services
                .assembler()
                .get_cache_state(&workspace, hash.as_deref())?,
        ),
        Commands::Dynamic { intent, budget } => print_json(
            &services
                .assembler()
                .get_dynamic_context(&workspace, &intent, budget)?,
        ),
        Commands::Session => print_json(&services.assembler().session_init(&workspace)?),
        Commands::Activity { hours } => {
            let mut query = ActivityQuery::new();
            if let Some(hours) = hours {
                query = query.with_hours(hours);
            }
            print_json(&services.activity().recent_activity(&workspace, &query)?)
        },
    }
}

/// Loads configuration from `--config`, then `CONTEXTKEEP_CONFIG_PATH`, then
/// the default location, and applies environment overrides.
fn load_config(path: Option<&str>) -> Result<ContextKeepConfig, Box<dyn std::error::Error>> {
    let config = if let Some(config_path) = path {
        ContextKeepConfig::load_from_file(Path::new(config_path))?
    } else {
        match std::env::var(CONFIG_PATH_ENV) {
            Ok(config_path) if !config_path.trim().is_empty() => {
                ContextKeepConfig::load_from_file(Path::new(&config_path))?
            },
            _ => ContextKeepConfig::load_default(),
        }
    };
    Ok(config.apply_env_overrides()?)
}

fn parse_kind(s: &str) -> contextkeep::Result<ContextKind> {
    ContextKind::parse(s).ok_or_else(|| {
        contextkeep::Error::InvalidInput(format!("unknown document kind: {s} (expected product or active)"))
    })
}

fn parse_object(raw: &str) -> contextkeep::Result<serde_json::Map<String, Value>> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(contextkeep::Error::InvalidInput(
            "expected a JSON object".to_string(),
        )),
        Err(e) => Err(contextkeep::Error::InvalidInput(format!("invalid JSON: {e}"))),
    }
}

/// Parses a patch object; `null` values become deletions.
fn parse_patch(raw: &str) -> contextkeep::Result<DocumentPatch> {
    Ok(parse_object(raw)?
        .into_iter()
        .map(|(key, value)| {
            let op = if value.is_null() {
                PatchOp::Delete
            } else {
                PatchOp::Set(value)
            };
            (key, op)
        })
        .collect())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
