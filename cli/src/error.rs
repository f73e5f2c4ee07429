//! Flat CLI error type (spec §6/§7 surfaced at the operator boundary).
//! Unlike the teacher's `miette::Diagnostic`-based `CliError` — which
//! exists to render hosted-support help text (`hi@s2.dev`, GitHub issue
//! links) — this crate has no support channel to point at, so errors are
//! plain `thiserror` wraps printed with `{:#}`-style chaining.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("reading config file {path}: {source}")]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing config file {path}: {source}")]
    ParseConfig {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("opening store: {0}")]
    Start(#[from] obsdb_store::StartError),

    #[error(transparent)]
    CreateSystem(#[from] obsdb_store::CreateSystemError),

    #[error(transparent)]
    GetSystem(#[from] obsdb_store::GetSystemError),

    #[error(transparent)]
    GetFoi(#[from] obsdb_store::GetFoiError),

    #[error(transparent)]
    CreateStream(#[from] obsdb_store::CreateStreamError),

    #[error(transparent)]
    GetStream(#[from] obsdb_store::GetStreamError),

    #[error(transparent)]
    DeleteStream(#[from] obsdb_store::DeleteStreamError),

    #[error(transparent)]
    AddObservation(#[from] obsdb_store::AddObservationError),

    #[error(transparent)]
    PutObservation(#[from] obsdb_store::PutObservationError),

    #[error(transparent)]
    RemoveObservation(#[from] obsdb_store::RemoveObservationError),

    #[error(transparent)]
    Select(#[from] obsdb_store::SelectError),

    #[error(transparent)]
    GetStatistics(#[from] obsdb_store::GetStatisticsError),

    #[error(transparent)]
    Storage(#[from] obsdb_store::StorageError),

    #[error("malformed observation on line {line}: {source}")]
    IngestLine {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("reading input: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid observation id {0:?}: must be hex-encoded bytes")]
    InvalidObservationId(String),

    #[error("opening object store at {path}: {message}")]
    ObjectStore { path: PathBuf, message: String },
}
