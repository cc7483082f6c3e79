//! CLI definitions for friendrec.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// friendrec - embedding-based friend recommendations
#[derive(Parser, Debug)]
#[command(name = "friendrec")]
#[command(version)]
#[command(about = "Recommend friends to students from precomputed embeddings")]
#[command(long_about = r#"
friendrec ranks students by cosine similarity of their learned embeddings and
recommends the closest classmates as friends.

Inputs:
  - an embedding file: .npy (2-D float array) or .json (array of rows);
    row N holds the embedding of student N+1
  - an optional uid,info CSV roster (UTF-8 or GBK) for display names

Quick start:
  1. friendrec --embeddings user_embeddings.npy --directory users.csv recommend 10
  2. friendrec --embeddings user_embeddings.npy serve --port 5000
  3. curl 'http://127.0.0.1:5000/tuijian?id=10'
"#)]
pub struct Cli {
    /// Path to the embedding file (.npy or .json)
    #[arg(long, short = 'e', env = "FRIENDREC_EMBEDDINGS", global = true)]
    pub embeddings: Option<PathBuf>,

    /// Path to the uid,info CSV roster
    #[arg(long, short = 'd', env = "FRIENDREC_DIRECTORY", global = true)]
    pub directory: Option<PathBuf>,

    /// Path to a config file (default: ~/.config/friendrec/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recommend friends for a student
    Recommend(RecommendArgs),

    /// Show one student's directory entry
    User(UserArgs),

    /// List the student directory
    Users(UsersArgs),

    /// Show embedding store statistics
    Stats,

    /// Run health checks on the embeddings and directory
    Doctor,

    /// Serve recommendations over HTTP
    Serve(ServeArgs),

    /// Start an interactive session
    Repl,

    /// Show or manage configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct RecommendArgs {
    /// Student identifier (1-based)
    #[arg(allow_negative_numbers = true)]
    pub id: i64,

    /// Number of friends to recommend
    #[arg(long, short = 'k')]
    pub top_k: Option<usize>,

    /// Include similarity scores
    #[arg(long, short = 's')]
    pub scores: bool,
}

#[derive(Args, Debug)]
pub struct UserArgs {
    /// Student identifier
    #[arg(allow_negative_numbers = true)]
    pub id: i64,
}

#[derive(Args, Debug)]
pub struct UsersArgs {
    /// Limit number of entries
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on
    #[arg(long, short = 'p')]
    pub port: Option<u16>,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show the effective configuration
    #[arg(long)]
    pub show: bool,

    /// Print a single configuration value
    #[arg(long, value_name = "KEY")]
    pub get: Option<String>,

    /// Print a default config file
    #[arg(long)]
    pub init: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
    Compact,
    Csv,
}

impl OutputFormat {
    /// Parse a config-file format name, ignoring case.
    #[must_use]
    pub fn from_config(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value, true).ok()
    }
}
