//! Intermission CLI - Content Descriptor Tools
//!
//! Features:
//! - Classify an item JSON document into content descriptors
//! - Normalize official ratings into age bands
//! - Fetch and classify a live item from a media server

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod output;

/// Intermission CLI - content descriptor toolkit
#[derive(Parser)]
#[command(name = "intermission")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Content descriptor and age rating toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an item JSON document
    Classify {
        /// Path to the item JSON (server item shape)
        item: PathBuf,

        /// Vocabulary JSON: a bucket -> tags map or a flat list of catalog tags
        #[arg(long)]
        vocabulary: Option<PathBuf>,

        /// Comma-separated bucket tie-break order
        #[arg(long, value_delimiter = ',')]
        priority: Vec<String>,
    },

    /// Normalize official ratings into age bands
    Rating {
        /// Raw rating strings (e.g. PG-13, TV-MA, DE-16)
        #[arg(required = true)]
        ratings: Vec<String>,
    },

    /// Fetch an item from a live server and classify it
    Inspect {
        /// Server base URL
        #[arg(long)]
        server: String,

        /// Access token
        #[arg(long, env = "INTERMISSION_TOKEN")]
        token: Option<String>,

        /// User id to act as
        #[arg(long)]
        user: String,

        /// Item id
        item_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Classify { item, vocabulary, priority } => {
            commands::classify(&item, vocabulary.as_deref(), &priority, &cli.format)?;
        }
        Commands::Rating { ratings } => {
            commands::rating(&ratings, &cli.format)?;
        }
        Commands::Inspect { server, token, user, item_id } => {
            commands::inspect(&server, token, &user, &item_id, &cli.format).await?;
        }
    }

    Ok(())
}
