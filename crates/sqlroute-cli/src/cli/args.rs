use clap::{Parser, Subcommand, ValueEnum};
use sqlroute_core::config::DEFAULT_CONFIG_FILE;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sqlroute",
    version,
    about = "Answer questions over a SQLite database and CSV datasets"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample config file
    Init(InitArgs),
    /// Answer one natural-language question
    Ask(AskArgs),
    /// List stored interactions, oldest first
    History(HistoryArgs),
    /// Seed the question memory with one pair
    Train(TrainArgs),
    /// Seed the question memory from a JSON file of pairs
    Import(ImportArgs),
    /// Print the schema the translator sees
    Schema(SchemaArgs),
    /// Check config, store, database, datasets and translator settings
    Doctor(DoctorArgs),
    Version,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ConfigArgs {
    #[arg(long, env = "SQLROUTE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Reject unknown config keys
    #[arg(long)]
    pub strict: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct InitArgs {
    #[arg(long, env = "SQLROUTE_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,
}

#[derive(clap::Args, Debug, Clone)]
pub struct AskArgs {
    pub question: String,

    #[command(flatten)]
    pub cfg: ConfigArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct HistoryArgs {
    #[command(flatten)]
    pub cfg: ConfigArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct TrainArgs {
    #[arg(long)]
    pub question: String,

    #[arg(long)]
    pub sql: String,

    #[command(flatten)]
    pub cfg: ConfigArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct ImportArgs {
    /// JSON array of `{question, sql}` (or `{user_query, sql_query}`) objects
    pub input: PathBuf,

    /// Append every pair, even near-duplicates
    #[arg(long)]
    pub no_dedup: bool,

    #[command(flatten)]
    pub cfg: ConfigArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct SchemaArgs {
    /// Re-read the database before printing
    #[arg(long)]
    pub refresh: bool,

    #[command(flatten)]
    pub cfg: ConfigArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DoctorArgs {
    #[command(flatten)]
    pub cfg: ConfigArgs,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}
