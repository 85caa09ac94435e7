//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Feed insight CLI
///
/// Finds posts in feed snapshots, attaches insight triggers and shows the
/// generated insights.
#[derive(Parser, Debug)]
#[command(name = "feedlens")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generation service credentials (API key, model)
    Credentials(CredentialsCommand),

    /// Scan a feed snapshot once and optionally fire a trigger
    Scan(ScanCommand),

    /// Watch a directory of feed fragments and keep triggers up to date
    Watch(WatchCommand),

    /// Analyze text directly (manual submission)
    Analyze(AnalyzeCommand),

    /// Show the latest insights
    Insights(InsightsCommand),

    /// Copy one insight to the clipboard
    Copy {
        /// Insight number as shown by `feedlens insights` (1-based)
        index: usize,
    },

    /// Show configuration and the state of the last analysis
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show version information
    Version,
}

// ─────────────────────────────────────────────────────────────────────────────
// Credentials Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct CredentialsCommand {
    #[command(subcommand)]
    pub action: CredentialsAction,
}

#[derive(Subcommand, Debug)]
pub enum CredentialsAction {
    /// Save the API key and model name
    Set {
        /// API key (prompted for when omitted)
        #[arg(long, env = "FEEDLENS_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Model name (default model when omitted)
        #[arg(short, long, default_value = "")]
        model: String,
    },

    /// Show the stored credentials (key masked)
    Show,
}

// ─────────────────────────────────────────────────────────────────────────────
// Page Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct ScanCommand {
    /// Feed snapshot (HTML)
    pub file: PathBuf,

    /// Activate the trigger with this number (1-based) after scanning
    #[arg(short, long)]
    pub trigger: Option<usize>,

    /// Seconds to wait for the analysis to complete
    #[arg(long, default_value = "120")]
    pub timeout: u64,
}

#[derive(Args, Debug)]
pub struct WatchCommand {
    /// Directory of feed fragments; each new *.html file is appended to the page
    pub dir: PathBuf,
}

// ─────────────────────────────────────────────────────────────────────────────
// Analysis Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct AnalyzeCommand {
    /// Text to analyze
    #[arg(short, long, conflicts_with = "file")]
    pub text: Option<String>,

    /// Read the text from a file ("-" for stdin)
    #[arg(short, long)]
    pub file: Option<PathBuf>,

    /// Seconds to wait for the analysis to complete
    #[arg(long, default_value = "120")]
    pub timeout: u64,
}

#[derive(Args, Debug)]
pub struct InsightsCommand {
    /// Keep running and re-render whenever the result changes
    #[arg(short, long)]
    pub follow: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
