// # File State Store
//
// File-based implementation of StateStore with crash recovery.
//
// ## Purpose
//
// Keeps the IP history of every record across daemon restarts and crashes,
// so the first cycle after a restart can short-circuit when nothing changed.
//
// ## Crash Recovery
//
// - Atomic writes: Uses write-then-rename for atomicity
// - Corruption detection: Validates JSON on load
// - Automatic backup: Keeps .backup of last known good state
// - Copy then swap: a mutation becomes visible only once it is on disk
// - Recovery: Falls back to backup if corruption detected
//
// ## File Format
//
// ```json
// {
//   "version": "1",
//   "records": [
//     {
//       "domain": "example.com",
//       "owner": "@",
//       "ips": [
//         {
//           "ip": "1.2.3.4",
//           "first_seen": "2025-01-09T12:00:00Z",
//           "last_seen": "2025-01-09T12:05:00Z",
//           "current": true
//         }
//       ]
//     }
//   ]
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use super::table::{HistoryTable, PairRows};
use crate::Error;
use crate::config::StateStoreConfig;
use crate::traits::state_store::{History, HistoryEntry, StateStore, StateStoreFactory};

/// State file format version
/// Used for future migration if format changes
const STATE_FILE_VERSION: &str = "1";

/// File-based state store with crash recovery
///
/// # Crash Recovery
///
/// - **Atomic writes**: New state written to temporary file, then renamed
/// - **Backup**: Last known good state kept in `.backup` file
/// - **Corruption detection**: JSON validation on load
/// - **Automatic recovery**: Falls back to backup if main file corrupted
///
/// # Example
///
/// ```rust,no_run
/// use ddns_core::state::FileStateStore;
/// use ddns_core::traits::StateStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileStateStore::new("/var/lib/ddns/updates.json").await?;
///
///     // Written to disk before returning
///     store
///         .record_new_ip("example.com", "@", "1.2.3.4".parse()?, chrono::Utc::now())
///         .await?;
///
///     let history = store.history("example.com", "@").await?;
///     assert_eq!(history.current, Some("1.2.3.4".parse()?));
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    table: Arc<RwLock<HistoryTable>>,
    /// Serializes mutations and writers of the file itself
    write_lock: Mutex<()>,
}

/// Serializable state file format
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    records: Vec<PairRows>,
}

/// Why a state file could not be loaded
enum LoadError {
    /// File content is not a valid state document
    Corrupt(String),
    /// File could not be read at all
    Unreadable(Error),
}

impl FileStateStore {
    /// Create or load a file state store
    ///
    /// This will:
    /// 1. Try to load existing state file
    /// 2. If corruption detected, try to load from backup
    /// 3. If both fail, start with empty state
    /// 4. Create parent directories if needed
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let table = Self::load_state_with_recovery(&path).await?;

        Ok(Self {
            path,
            table: Arc::new(RwLock::new(table)),
            write_lock: Mutex::new(()),
        })
    }

    /// Load state from file with automatic recovery
    ///
    /// Recovery strategy:
    /// 1. Try to load main state file
    /// 2. If it is corrupt, try loading backup
    /// 3. If backup also fails, start with empty state
    async fn load_state_with_recovery(path: &Path) -> Result<HistoryTable, Error> {
        let reason = match Self::load_state(path).await {
            Ok(table) => {
                tracing::debug!("Loaded state from file: {} rows", table.len());
                return Ok(table);
            }
            Err(LoadError::Unreadable(e)) => return Err(e),
            Err(LoadError::Corrupt(reason)) => reason,
        };

        tracing::warn!(
            "State file appears corrupted: {}. Attempting recovery from backup.",
            reason
        );

        let backup_path = Self::backup_path(path);
        if !backup_path.exists() {
            tracing::warn!("No backup file found. Starting with empty state.");
            return Ok(HistoryTable::default());
        }

        match Self::load_state(&backup_path).await {
            Ok(table) => {
                tracing::info!("Recovered state from backup: {} rows", table.len());

                if let Err(restore_err) = Self::restore_from_backup(path, &backup_path).await {
                    tracing::error!(
                        "Failed to restore state file from backup: {}",
                        restore_err
                    );
                }

                Ok(table)
            }
            Err(LoadError::Corrupt(backup_reason)) => {
                tracing::error!(
                    "Backup also corrupted: {}. Starting with empty state.",
                    backup_reason
                );
                Ok(HistoryTable::default())
            }
            Err(LoadError::Unreadable(e)) => {
                tracing::error!("Backup unreadable: {}. Starting with empty state.", e);
                Ok(HistoryTable::default())
            }
        }
    }

    /// Load state from file
    async fn load_state(path: &Path) -> Result<HistoryTable, LoadError> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(HistoryTable::default());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Unreadable(Error::state_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            )))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content)
            .map_err(|e| LoadError::Corrupt(format!("{}: {}", path.display(), e)))?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. \
                Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(HistoryTable::from_pairs(state_file.records))
    }

    /// Apply `mutate` to a copy of the table and swap it in once written
    ///
    /// `mutate` returns whether it changed anything. On a write failure the
    /// in-memory table keeps its previous content.
    async fn commit<F>(&self, mutate: F) -> Result<(), Error>
    where
        F: FnOnce(&mut HistoryTable) -> bool,
    {
        let _writer = self.write_lock.lock().await;

        let mut next = self.table.read().await.clone();
        if !mutate(&mut next) {
            return Ok(());
        }

        self.write_state(&next).await?;
        *self.table.write().await = next;
        Ok(())
    }

    /// Write `table` to file atomically
    ///
    /// Callers hold `write_lock`.
    async fn write_state(&self, table: &HistoryTable) -> Result<(), Error> {
        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            records: table.to_pairs(),
        };
        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::state_store(format!("Failed to serialize state: {}", e)))?;

        // Write to temporary file first
        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to write to temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        // Create backup of current file (if it exists)
        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        // Atomic rename (temp -> actual)
        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("State written to file: {}", self.path.display());
        Ok(())
    }

    /// Restore state file from backup
    async fn restore_from_backup(path: &Path, backup_path: &Path) -> Result<(), Error> {
        fs::copy(backup_path, path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to restore from backup {} to {}: {}",
                backup_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::info!("Restored state file from backup");
        Ok(())
    }

    /// Get path to temporary file for atomic writes
    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    /// Get path to backup file
    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn record_new_ip(
        &self,
        domain: &str,
        owner: &str,
        ip: IpAddr,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.commit(|table| {
            table.record_new_ip(domain, owner, ip, now);
            true
        })
        .await
    }

    async fn touch_current(
        &self,
        domain: &str,
        owner: &str,
        ip: IpAddr,
        now: DateTime<Utc>,
    ) -> Result<(), Error> {
        self.commit(|table| table.touch_current(domain, owner, ip, now))
            .await
    }

    async fn history(&self, domain: &str, owner: &str) -> Result<History, Error> {
        let table = self.table.read().await;
        Ok(History::from_entries(&table.entries(domain, owner)))
    }

    async fn entries(&self, domain: &str, owner: &str) -> Result<Vec<HistoryEntry>, Error> {
        Ok(self.table.read().await.entries(domain, owner))
    }

    /// Every accepted mutation is already on disk
    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Factory for creating file state stores
pub struct FileStateStoreFactory;

#[async_trait]
impl StateStoreFactory for FileStateStoreFactory {
    async fn create(&self, config: &serde_json::Value) -> Result<Box<dyn StateStore>, Error> {
        let config: StateStoreConfig = serde_json::from_value(config.clone())?;
        match config {
            StateStoreConfig::File { path } => Ok(Box::new(FileStateStore::new(path).await?)),
            other => Err(Error::config(format!(
                "Invalid config for file state store: {}",
                other.type_name()
            ))),
        }
    }
}
