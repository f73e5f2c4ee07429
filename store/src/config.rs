//! Store startup configuration (spec §6). Mirrors the teacher's
//! `config` crate usage in `s2-cli`: a plain struct the embedding host
//! builds and hands to `Store::start`, deserializable from TOML for the
//! CLI's own config file.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use slatedb::object_store::ObjectStore;

use crate::error::StartError;
use crate::registry::streams::StreamIdStrategy;

/// `start(config)`'s argument (spec §6). `object_store` is not named by
/// the spec's option list directly — `slatedb` needs a backing
/// `object_store::ObjectStore` to open against, playing the role the
/// spec leaves implicit in "open the underlying engine" — the CLI wires
/// a local-filesystem or in-memory one depending on `storage_path`.
#[derive(Clone)]
pub struct StartConfig {
    pub storage_path: PathBuf,
    pub allowed_root: PathBuf,
    pub memory_cache_kb: u64,
    pub auto_commit_buffer_bytes: u64,
    pub use_compression: bool,
    pub stream_id_strategy: StreamIdStrategy,
    pub database_id: u64,
    /// Opt-in spatial index on per-observation sampling geometry. Out of
    /// scope (spec §1); carried only as a flag so a future geometric
    /// index can be gated on it without a config-shape break.
    pub index_obs_location: bool,
    pub object_store: Arc<dyn ObjectStore>,
}

impl StartConfig {
    /// Validates `storage_path` against path traversal and containment
    /// within `allowed_root` (spec §6 `start(config)`: "validate
    /// storagePath (no path traversal; path must be within a configured
    /// root)"). Both paths are compared component-wise rather than via
    /// `Path::canonicalize`, since the store file may not exist yet on
    /// first `start`.
    pub fn validate_storage_path(&self) -> Result<(), StartError> {
        if self
            .storage_path
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(StartError::PathTraversal(
                self.storage_path.display().to_string(),
            ));
        }
        if !within_root(&self.storage_path, &self.allowed_root) {
            return Err(StartError::PathTraversal(
                self.storage_path.display().to_string(),
            ));
        }
        Ok(())
    }
}

fn within_root(path: &Path, root: &Path) -> bool {
    let mut path_components = path.components();
    for root_component in root.components() {
        if path_components.next() != Some(root_component) {
            return false;
        }
    }
    true
}

/// TOML-deserializable mirror of [`StartConfig`] minus `object_store`,
/// which has no serializable representation — the CLI reads this shape
/// from a config file and constructs the real `object_store` itself
/// (local filesystem, matching the teacher's `s2-cli` config loading).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartConfigFile {
    pub storage_path: PathBuf,
    pub allowed_root: PathBuf,
    #[serde(default)]
    pub memory_cache_kb: u64,
    #[serde(default)]
    pub auto_commit_buffer_bytes: u64,
    #[serde(default)]
    pub use_compression: bool,
    #[serde(default = "default_stream_id_strategy")]
    pub stream_id_strategy: StreamIdStrategyConfig,
    pub database_id: u64,
    #[serde(default)]
    pub index_obs_location: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamIdStrategyConfig {
    Sequential,
    UidHash,
}

fn default_stream_id_strategy() -> StreamIdStrategyConfig {
    StreamIdStrategyConfig::Sequential
}

impl From<StreamIdStrategyConfig> for StreamIdStrategy {
    fn from(value: StreamIdStrategyConfig) -> Self {
        match value {
            StreamIdStrategyConfig::Sequential => StreamIdStrategy::Sequential,
            StreamIdStrategyConfig::UidHash => StreamIdStrategy::DeterministicHash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_dir_component_is_rejected() {
        let config = StartConfig {
            storage_path: PathBuf::from("/data/stores/../../etc/passwd"),
            allowed_root: PathBuf::from("/data/stores"),
            memory_cache_kb: 0,
            auto_commit_buffer_bytes: 0,
            use_compression: false,
            stream_id_strategy: StreamIdStrategy::Sequential,
            database_id: 1,
            index_obs_location: false,
            object_store: Arc::new(slatedb::object_store::memory::InMemory::new()),
        };
        assert!(matches!(
            config.validate_storage_path(),
            Err(StartError::PathTraversal(_))
        ));
    }

    #[test]
    fn path_within_root_is_accepted() {
        let config = StartConfig {
            storage_path: PathBuf::from("/data/stores/db-1"),
            allowed_root: PathBuf::from("/data/stores"),
            memory_cache_kb: 0,
            auto_commit_buffer_bytes: 0,
            use_compression: false,
            stream_id_strategy: StreamIdStrategy::Sequential,
            database_id: 1,
            index_obs_location: false,
            object_store: Arc::new(slatedb::object_store::memory::InMemory::new()),
        };
        assert!(config.validate_storage_path().is_ok());
    }

    #[test]
    fn path_outside_root_is_rejected() {
        let config = StartConfig {
            storage_path: PathBuf::from("/other/place"),
            allowed_root: PathBuf::from("/data/stores"),
            memory_cache_kb: 0,
            auto_commit_buffer_bytes: 0,
            use_compression: false,
            stream_id_strategy: StreamIdStrategy::Sequential,
            database_id: 1,
            index_obs_location: false,
            object_store: Arc::new(slatedb::object_store::memory::InMemory::new()),
        };
        assert!(config.validate_storage_path().is_err());
    }
}
