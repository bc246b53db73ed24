//! Hearth CLI: the main entry point.
//!
//! Commands:
//! - `context`   Gather and print merged memory for a conversation
//! - `prompt`    Build the system prompt for a turn
//! - `search`    Search working and semantic memory
//! - `save`      Persist a memory item
//! - `templates` List the resolved template registry
//! - `config`    Show, validate or locate configuration
//! - `doctor`    Check layer health

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "hearth",
    about = "Hearth — memory orchestration and prompt assembly for family assistants",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print command output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// Config file (defaults to ~/.hearth/config.toml)
    #[arg(short, long, global = true, env = "HEARTH_CONFIG")]
    config: Option<PathBuf>,

    /// Use in-process memory layers instead of the configured services
    #[arg(long, global = true)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Gather merged memory for a conversation
    Context {
        #[arg(short, long)]
        user: String,

        #[arg(short = 'C', long)]
        conversation: String,

        /// Query used for working-memory and semantic search
        #[arg(short, long)]
        query: Option<String>,

        /// Token budget for merged memory
        #[arg(short, long)]
        budget: Option<usize>,
    },

    /// Build the system prompt for a turn
    Prompt {
        #[arg(short, long)]
        user: String,

        #[arg(short = 'C', long)]
        conversation: String,

        /// The user's message for this turn
        #[arg(short, long)]
        query: Option<String>,

        /// Core, rules, role and a small memory slice only
        #[arg(long)]
        minimal: bool,

        /// Token budget for the whole prompt
        #[arg(short, long)]
        budget: Option<usize>,
    },

    /// Search working and semantic memory
    Search {
        query: String,

        #[arg(short, long)]
        user: String,

        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Persist a memory item
    Save {
        content: String,

        #[arg(short, long)]
        user: String,

        #[arg(short = 'C', long)]
        conversation: String,

        #[arg(short = 't', long = "type", value_enum, default_value = "conversation")]
        memory_type: ItemType,

        /// Item id (a fresh UUID when omitted)
        #[arg(long)]
        id: Option<String>,

        /// Who said it, for conversation turns
        #[arg(long)]
        speaker: Option<String>,

        /// Preference name, for preference items
        #[arg(long)]
        key: Option<String>,
    },

    /// List resolved templates
    Templates {
        /// Print the body of one template key (e.g. "role/child@es")
        #[arg(long)]
        show: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Check memory layer health
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the default configuration
    Default,
    /// Validate the configuration file
    Validate,
    /// Print the config file path
    Path,
}

#[derive(Clone, Copy, ValueEnum)]
enum ItemType {
    Conversation,
    Context,
    Preference,
    Fact,
}

impl From<ItemType> for hearth_core::MemoryType {
    fn from(t: ItemType) -> Self {
        match t {
            ItemType::Conversation => Self::Conversation,
            ItemType::Context => Self::Context,
            ItemType::Preference => Self::Preference,
            ItemType::Fact => Self::Fact,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    let global = commands::Global {
        config: cli.config,
        offline: cli.offline,
        json: cli.json,
    };

    match cli.command {
        Commands::Context {
            user,
            conversation,
            query,
            budget,
        } => commands::context::run(&global, user, conversation, query, budget).await?,
        Commands::Prompt {
            user,
            conversation,
            query,
            minimal,
            budget,
        } => commands::prompt::run(&global, user, conversation, query, minimal, budget).await?,
        Commands::Search { query, user, limit } => {
            commands::search::run(&global, &query, &user, limit).await?
        }
        Commands::Save {
            content,
            user,
            conversation,
            memory_type,
            id,
            speaker,
            key,
        } => {
            let item = commands::save::item(
                user,
                conversation,
                memory_type.into(),
                content,
                id,
                speaker,
                key,
            );
            commands::save::run(&global, item).await?
        }
        Commands::Templates { show } => commands::templates::run(&global, show.as_deref())?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config::show(&global)?,
            ConfigAction::Default => commands::config::default(),
            ConfigAction::Validate => commands::config::validate(&global)?,
            ConfigAction::Path => commands::config::path(&global),
        },
        Commands::Doctor => commands::doctor::run(&global).await?,
    }

    Ok(())
}
