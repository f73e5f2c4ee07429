//! Subcommand surface (spec §6 `ObsStore` operations), following the
//! teacher's clap-derive `Cli`/`Command` shape (`cli.rs`) minus the
//! basin/stream/access-token vocabulary that belongs to S2's own
//! hosted-account model.

use std::path::PathBuf;

use clap::{Parser, Subcommand, builder::styling};

const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::Green.on_default().bold())
    .usage(styling::AnsiColor::Green.on_default().bold())
    .literal(styling::AnsiColor::Blue.on_default().bold())
    .placeholder(styling::AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "obsdb", version, styles = STYLES)]
pub struct Cli {
    /// Path to the store's TOML config file.
    #[arg(long, global = true, default_value = "obsdb.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a system, or return its id if `string_id` already exists.
    RegisterSystem(RegisterSystemArgs),

    /// Print a registered system's metadata.
    GetSystem { system_id: u64 },

    /// Register a feature of interest, or return its id if `string_id`
    /// already exists.
    RegisterFoi(RegisterFoiArgs),

    /// Print a registered feature of interest's metadata.
    GetFoi { foi_id: u64 },

    /// Register an output stream on a system.
    RegisterStream(RegisterStreamArgs),

    /// Print a registered stream's metadata.
    GetStream { stream_id: u64 },

    /// Mark a stream retired as of a given instant; it accepts no further
    /// writes but stays readable.
    RetireStream {
        stream_id: u64,
        /// Retirement instant, seconds since the Unix epoch.
        end_time_secs: i64,
    },

    /// Delete a stream and every observation it owns.
    DeleteStream { stream_id: u64 },

    /// Ingest NDJSON observations (one JSON object per line) into a
    /// stream, from a file or stdin.
    Ingest(IngestArgs),

    /// Remove a single observation by its opaque hex id.
    Remove {
        #[arg(value_name = "OBSERVATION_ID")]
        observation_id: String,
    },

    /// Select observations matching a filter.
    Select(QueryArgs),

    /// Count observations matching a filter.
    Count(QueryArgs),

    /// Compute a histogram over observations matching a filter.
    Stats(StatsArgs),

    /// Total observation count across every stream.
    NumRecords,

    /// Drop every stream's observations, keeping systems and FoIs.
    Clear,
}

#[derive(clap::Args, Debug)]
pub struct RegisterSystemArgs {
    pub string_id: String,
    pub name: String,
    #[arg(long)]
    pub description: Option<String>,
    /// Registration instant, seconds since the Unix epoch.
    #[arg(long, default_value_t = 0)]
    pub valid_time_start_secs: i64,
}

#[derive(clap::Args, Debug)]
pub struct RegisterFoiArgs {
    pub string_id: String,
    #[arg(long)]
    pub geometry_wkt: Option<String>,
    #[arg(long)]
    pub metadata: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct RegisterStreamArgs {
    pub system_id: u64,
    pub output_name: String,
    /// Repeatable; each one names a result field, e.g. `--field
    /// temperature`.
    #[arg(long = "field")]
    pub fields: Vec<String>,
    #[arg(long, default_value_t = 0)]
    pub valid_time_start_secs: i64,
}

#[derive(clap::Args, Debug)]
pub struct IngestArgs {
    pub stream_id: u64,
    /// NDJSON file to read from; omit to read from stdin.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Use `put` semantics (overwrite an existing record at the same
    /// phenomenon time) instead of `add` (reject a duplicate).
    #[arg(long)]
    pub upsert: bool,
}

#[derive(clap::Args, Debug)]
pub struct QueryArgs {
    /// Repeatable; restricts to these stream ids (empty means all).
    #[arg(long = "stream")]
    pub streams: Vec<u64>,
    /// Repeatable; restricts to these feature-of-interest ids (empty
    /// means all).
    #[arg(long = "foi")]
    pub fois: Vec<u64>,
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct StatsArgs {
    #[arg(long = "stream")]
    pub streams: Vec<u64>,
    #[arg(long = "foi")]
    pub fois: Vec<u64>,
    /// Fixed bin width in seconds; omit to let the engine pick one off
    /// its own ladder.
    #[arg(long)]
    pub bin_width_secs: Option<u64>,
    /// Fold every matched series into one histogram instead of one per
    /// feature of interest.
    #[arg(long)]
    pub aggregate_fois: bool,
}
