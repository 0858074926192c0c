use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, ValueEnum)]
pub enum StoreKind {
    Json,
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum KindArg {
    Prompt,
    Phrase,
}

#[derive(Debug, Parser, Clone)]
#[command(name = "risevocab", version, about = "RiseVocab review scheduler CLI/API")]
pub struct Cli {
    /// Storage backend (applies to CLI and API)
    #[arg(long, value_enum, default_value_t = StoreKind::Json)]
    pub store: StoreKind,

    /// JSON progress file when --store json (defaults to app data dir)
    #[arg(long)]
    pub json_path: Option<PathBuf>,

    /// SQLite DB path when --store sqlite (defaults to app data dir)
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Postgres connection string when --store postgres
    #[arg(long, env = "RISEVOCAB_DATABASE_URL")]
    pub database_url: Option<String>,

    /// User whose cards the CLI works on
    #[arg(long, default_value = "local")]
    pub user: String,

    /// Log filter used when RUST_LOG is unset (e.g. "info", "risevocab_core=debug")
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Card operations
    #[command(subcommand)]
    Card(CardCmd),
    /// Record a scored attempt for a prompt, phrase, or card
    Drill(DrillCmd),
    /// Interactive review loop over due cards
    Review(ReviewCmd),
    /// List due cards, oldest first
    Due(DueCmd),
    /// List cards coming due soon
    Upcoming(UpcomingCmd),
    /// Review statistics and queue summary
    Stats,
    /// Remove the cards of a prompt or phrase
    Forget(SubjectArgs),
    /// Export data
    #[command(subcommand)]
    Export(ExportCmd),
    /// Import data
    #[command(subcommand)]
    Import(ImportCmd),
    /// Launch Axum HTTP API
    Api(ApiCmd),
}

#[derive(Debug, Args, Clone)]
#[group(required = true, multiple = false)]
pub struct SubjectArgs {
    #[arg(long)]
    pub prompt: Option<String>,
    #[arg(long)]
    pub phrase: Option<String>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum CardCmd {
    /// Create the card for a prompt or phrase (no-op if it exists)
    Add(SubjectArgs),
    List {
        #[arg(long, value_enum)]
        kind: Option<KindArg>,
        /// Only cards whose last error tags mention this text
        #[arg(long)]
        error_tag: Option<String>,
    },
    Show { card_id: String },
    Rm { card_id: String },
}

#[derive(Debug, Args, Clone)]
pub struct DrillCmd {
    /// Existing card id (alternative to --prompt/--phrase)
    #[arg(long, conflicts_with_all = ["prompt", "phrase"])]
    pub card: Option<String>,
    #[arg(long, conflicts_with = "phrase")]
    pub prompt: Option<String>,
    #[arg(long)]
    pub phrase: Option<String>,
    /// Feedback score, 0-100
    #[arg(long)]
    pub score: i64,
    /// Mistake reported by the feedback service (repeatable)
    #[arg(long = "mistake")]
    pub mistakes: Vec<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ReviewCmd {
    #[arg(long, default_value_t = 50)]
    pub max: usize,
}

#[derive(Debug, Args, Clone)]
pub struct DueCmd {
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Args, Clone)]
pub struct UpcomingCmd {
    #[arg(long, default_value_t = risevocab_core::UPCOMING_DEFAULT_DAYS)]
    pub days: u32,
}

#[derive(Debug, Subcommand, Clone)]
pub enum ExportCmd {
    Json { path: PathBuf },
    Csv { path: PathBuf },
}

#[derive(Debug, Subcommand, Clone)]
pub enum ImportCmd {
    /// Bundle written by `export json`
    Json { path: PathBuf },
    /// Anonymous browser progress snapshot ({"srs": [...]})
    Local { path: PathBuf },
}

#[derive(Debug, Args, Clone)]
pub struct ApiCmd {
    /// Bind address (host:port)
    #[arg(long, default_value = "127.0.0.1:8080")]
    pub addr: String,
}
