use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "kindling")]
#[command(about = "Query FHIR servers and generate synthetic FHIR resources")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the configuration file (defaults to ./kindling.toml)
    #[arg(short, long, global = true, env = "KINDLING_CONFIG")]
    pub config: Option<PathBuf>,

    /// FHIR API base URL (overrides config)
    #[arg(short, long, global = true)]
    pub server: Option<String>,

    /// Output format
    #[arg(short, long, global = true)]
    pub output: Option<OutputFormat>,

    /// Log level (overrides config; RUST_LOG wins over both)
    #[arg(long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Search a resource type, following pagination
    Query(QueryArgs),
    /// Generate synthetic resources
    Generate(GenerateArgs),
    /// Inspect the effective configuration
    Config(ConfigArgs),
}

#[derive(clap::Args)]
pub struct QueryArgs {
    /// Resource type (e.g. Patient)
    pub resource_type: String,
    /// Maximum number of resources to collect
    #[arg(long, conflicts_with = "first")]
    pub limit: Option<usize>,
    /// Only fetch the first resource
    #[arg(long)]
    pub first: bool,
    /// Request XML instead of JSON (printed as returned)
    #[arg(long)]
    pub xml: bool,
    /// Raw search string appended to the server URL (e.g. "/Patient?gender=female")
    #[arg(long)]
    pub raw_query: Option<String>,
}

#[derive(clap::Args)]
pub struct GenerateArgs {
    /// Resource type (e.g. Patient)
    pub resource_type: String,
    /// Number of resources; omit for a single resource
    #[arg(short = 'n', long)]
    pub count: Option<usize>,
    /// Field value as field=JSON; a JSON array is spread over the resources
    #[arg(long = "value")]
    pub values: Vec<String>,
    /// Field value as field=JSON-array, assigned whole to every resource
    #[arg(long = "list-value")]
    pub list_values: Vec<String>,
    /// Pattern generator as field=PATTERN ({index}, {uuid}, {rand:N})
    #[arg(long = "pattern")]
    pub patterns: Vec<String>,
    /// Random choice generator as field=a,b,c
    #[arg(long = "choice")]
    pub choices: Vec<String>,
    /// Seed for the random generators
    #[arg(long)]
    pub seed: Option<u64>,
    /// Assign a random id to every resource
    #[arg(long)]
    pub ids: bool,
    /// Print raw field maps without resourceType
    #[arg(long)]
    pub raw: bool,
    /// Skip parameter and schema validation
    #[arg(long)]
    pub no_validate: bool,
}

#[derive(clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current config
    Show,
}
