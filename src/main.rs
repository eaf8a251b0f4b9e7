use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use deckforge::config::DeckforgeConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "deckforge")]
#[command(version, about = "Card deck editor back-end: merge, share, sync, and remix-aware art")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Address to bind (overrides deckforge.toml)
        #[arg(long)]
        host: Option<String>,

        /// Port to serve on (overrides deckforge.toml)
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable permissive CORS for a local front-end dev server
        #[arg(long)]
        dev: bool,
    },
    /// Create the database and run migrations
    InitDb,
    /// Merge curated, shared, and local copies of a deck
    Merge {
        /// Curated deck JSON file
        #[arg(long)]
        curated: Option<PathBuf>,

        /// Share hash (URL fragment) to use as the hash layer
        #[arg(long)]
        hash: Option<String>,

        /// Local deck JSON file
        #[arg(long)]
        local: Option<PathBuf>,

        /// Write the merged deck here instead of printing the full outcome
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Encode or decode share hashes
    Share {
        #[command(subcommand)]
        command: ShareCommands,
    },
    /// Manage the offline deck copy
    Decks {
        #[command(subcommand)]
        command: DeckCommands,
    },
    /// Inspect or adjust token balances
    Tokens {
        #[command(subcommand)]
        command: TokenCommands,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ShareCommands {
    /// Encode a deck JSON file into a share hash
    Encode { file: PathBuf },
    /// Decode a share hash and print the deck JSON
    Decode { hash: String },
}

#[derive(Subcommand, Clone)]
pub enum DeckCommands {
    /// List decks in the local store
    List,
    /// Print one local deck as JSON
    Show { id: String },
    /// Validate a deck JSON file and save it to the local store
    Import { file: PathBuf },
    /// Rename a local deck
    Rename { id: String, title: String },
    /// Remove a deck from the local store
    Delete { id: String },
    /// Upload a local deck to the sync server
    Push { id: String },
    /// Download a published deck into the local store
    Pull { slug: String },
}

#[derive(Subcommand, Clone)]
pub enum TokenCommands {
    /// Credit tokens to a user
    Grant {
        user: String,
        amount: i64,
        #[arg(long, default_value = "grant")]
        reason: String,
    },
    /// Show a user's balance and recent transactions
    Balance {
        user: String,
        #[arg(long, default_value = "10")]
        limit: usize,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default deckforge.toml file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let config = DeckforgeConfig::new(project_dir)?;
    let _log_guard = deckforge::logging::init(
        &config.toml.logging,
        config.log_dir().as_deref(),
        cli.verbose,
    )?;

    match &cli.command {
        Commands::Serve { host, port, dev } => {
            let config = config.with_cli_args(host.clone(), *port);
            cmd::cmd_serve(&config, *dev).await?;
        }
        Commands::InitDb => cmd::cmd_init_db(&config)?,
        Commands::Merge {
            curated,
            hash,
            local,
            output,
        } => cmd::cmd_merge(
            curated.as_deref(),
            hash.as_deref(),
            local.as_deref(),
            output.as_deref(),
        )?,
        Commands::Share { command } => cmd::cmd_share(command.clone())?,
        Commands::Decks { command } => cmd::cmd_decks(&config, command.clone()).await?,
        Commands::Tokens { command } => cmd::cmd_tokens(&config, command.clone())?,
        Commands::Config { command } => cmd::cmd_config(&config, command.clone())?,
    }

    Ok(())
}
