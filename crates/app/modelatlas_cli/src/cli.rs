use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use modelatlas_core::catalog::SortKey;
use modelatlas_core::details::DEFAULT_FLAG_REASON;
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "modelatlas", about = "Browse and curate medical imaging AI model cards")]
pub struct Cli {
    /// Page URL carrying handoff tokens (`at`, `rt`) and optionally a record `id`.
    #[arg(long, global = true, env = "ATLAS_HANDOFF_URL")]
    pub handoff: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the version
    Version,

    /// Sign in with email and password
    Login {
        #[arg(long, env = "ATLAS_EMAIL")]
        email: String,
        #[arg(long, env = "ATLAS_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and clear the persisted session
    Logout,

    /// Show the current session
    Whoami,

    /// List catalog entries
    Browse(BrowseArgs),

    /// Dashboard statistics
    Stats {
        /// Print the chart series instead of raw counts.
        #[arg(long)]
        charts: bool,
    },

    /// Show one model record
    Show {
        /// Record id; falls back to the handoff URL's `id`.
        id: Option<String>,
        #[arg(long, value_enum, default_value_t = ShowFormat::Card)]
        format: ShowFormat,
    },

    /// Edit fields of a model record
    Edit {
        id: String,
        /// `Field.Path=value`; the value is parsed as JSON, falling back to a string.
        #[arg(long = "set", value_parser = parse_assignment, required = true)]
        assignments: Vec<(String, Value)>,
        /// Mark the change to this field path as major.
        #[arg(long)]
        major: Vec<String>,
        /// Verify the record (admins only).
        #[arg(long)]
        verify: bool,
    },

    /// Flag a model record for review
    Flag {
        id: String,
        #[arg(long, default_value = DEFAULT_FLAG_REASON)]
        reason: String,
        #[arg(long, default_value = "")]
        comment: String,
    },

    /// Withdraw your flag on a model record
    Unflag { id: String },

    /// Like or unlike a model record
    Like { id: String },

    /// Submit a new model card, or update a pending submission
    Submit {
        /// Submission form as JSON.
        #[arg(long)]
        file: PathBuf,
        /// Pending submission to update.
        #[arg(long)]
        edit: Option<String>,
    },

    /// Show or toggle the colour theme
    Theme {
        #[arg(long)]
        toggle: bool,
    },
}

#[derive(Args, Debug, Default)]
pub struct BrowseArgs {
    #[arg(long, default_value = "")]
    pub search: String,
    #[arg(long)]
    pub verified: bool,
    #[arg(long)]
    pub demo: bool,
    #[arg(long)]
    pub weights: bool,
    #[arg(long)]
    pub atlas: bool,
    /// Only models you liked.
    #[arg(long)]
    pub liked: bool,
    #[arg(long = "modality")]
    pub modalities: Vec<String>,
    #[arg(long = "specialty")]
    pub specialties: Vec<String>,
    #[arg(long = "use")]
    pub uses: Vec<String>,
    #[arg(long, default_value = "likes")]
    pub sort: SortKey,
    /// Number of pages to load.
    #[arg(long, default_value_t = 1)]
    pub pages: usize,
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShowFormat {
    /// Full card JSON
    Card,
    /// Descriptive fields only
    Summary,
    /// Download file name
    Filename,
}

fn parse_assignment(raw: &str) -> Result<(String, Value), String> {
    let (path, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected PATH=VALUE, got `{raw}`"))?;
    if path.trim().is_empty() {
        return Err("empty field path".into());
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((path.trim().to_string(), value))
}
