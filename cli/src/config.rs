//! Config-file loading (spec §6 `start(config)`), grounded on the
//! teacher's `load_config_file` (`config.rs`: read a TOML file at a
//! known path, deserialize into a plain struct) but scoped to obsdb's
//! own [`StartConfigFile`] shape instead of S2 endpoints and access
//! tokens.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use obsdb_store::StartConfig;
use obsdb_store::config::StartConfigFile;
use slatedb::object_store::ObjectStore;
use slatedb::object_store::local::LocalFileSystem;
use slatedb::object_store::memory::InMemory;

use crate::error::CliError;

pub fn load_start_config_file(path: &Path) -> Result<StartConfigFile, CliError> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::ReadConfig {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| CliError::ParseConfig {
        path: path.to_path_buf(),
        source,
    })
}

/// `storagePath == ":memory:"` opens an ephemeral in-memory store, for
/// demos and local experimentation; anything else is taken as a
/// directory on the local filesystem, rooted the way the teacher's
/// `StoreType::LocalFileSystem` arm opens one (`lite/src/server.rs`
/// `init_object_store`) — `storagePath` itself then becomes the prefix
/// `slatedb::Db` opens within that root.
pub fn resolve_object_store(storage_path: &Path) -> Result<Arc<dyn ObjectStore>, CliError> {
    if storage_path == Path::new(":memory:") {
        return Ok(Arc::new(InMemory::new()));
    }
    std::fs::create_dir_all(storage_path)?;
    let fs = LocalFileSystem::new_with_prefix(storage_path).map_err(|e| CliError::ObjectStore {
        path: storage_path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(Arc::new(fs))
}

/// `file.storage_path` plays two roles: it is the real filesystem
/// directory the object store is rooted at ([`resolve_object_store`]),
/// and — since that rooting already confines every key `slatedb` writes
/// — the `Store`'s own logical path within it is just `/`, with
/// `allowedRoot` set to match so `StartConfig::validate_storage_path`'s
/// containment check is satisfied trivially rather than bypassed.
pub async fn open_store(config_path: &Path) -> Result<obsdb_store::Store, CliError> {
    let file = load_start_config_file(config_path)?;
    let object_store = resolve_object_store(&file.storage_path)?;
    let config = StartConfig {
        storage_path: PathBuf::from("/"),
        allowed_root: PathBuf::from("/"),
        memory_cache_kb: file.memory_cache_kb,
        auto_commit_buffer_bytes: file.auto_commit_buffer_bytes,
        use_compression: file.use_compression,
        stream_id_strategy: file.stream_id_strategy.into(),
        database_id: file.database_id,
        index_obs_location: file.index_obs_location,
        object_store,
    };
    Ok(obsdb_store::Store::start(config).await?)
}
