use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::Migration;
use crate::error::Result;

/// Appends `suffix` to the path's file name, unlike `Path::with_extension`
/// which replaces the final extension component (`status.json` -> `status.tmp`,
/// silently dropping `.json`).
fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(suffix);
    path.with_file_name(name)
}

/// Per-migration progress, persisted as part of the status file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StatusEntry {
    #[serde(default)]
    pub marker: String,
    #[serde(default)]
    pub moved_count: u64,
    #[serde(default)]
    pub scanned_count: u64,
    #[serde(default)]
    pub bytes_count: u64,
    #[serde(default)]
    pub finished: Option<f64>,
    #[serde(default)]
    pub last_moved_count: u64,
    #[serde(default)]
    pub last_scanned_count: u64,
    #[serde(default)]
    pub last_bytes_count: u64,
    #[serde(default)]
    pub last_finished: Option<f64>,
}

impl StatusEntry {
    /// Applies the two-generation counter rotation rule: the previous pass's
    /// counters only rotate into `last_*` if that previous pass either moved
    /// something, or scanned a different number of entries than the pass
    /// before it. An unfinished previous pass never rotates.
    fn rotate(&mut self) {
        if self.finished.is_none() {
            return;
        }
        let should_rotate = self.last_moved_count != 0 || self.scanned_count != self.last_scanned_count;
        if should_rotate {
            self.last_moved_count = self.moved_count;
            self.last_scanned_count = self.scanned_count;
            self.last_bytes_count = self.bytes_count;
            self.last_finished = self.finished;
        }
    }

    pub fn apply_pass(
        &mut self,
        marker: String,
        moved: u64,
        scanned: u64,
        bytes: u64,
        reset: bool,
        now: f64,
    ) {
        if reset {
            self.rotate();
            self.marker = marker;
            self.moved_count = moved;
            self.scanned_count = scanned;
            self.bytes_count = bytes;
        } else {
            self.marker = marker;
            self.moved_count += moved;
            self.scanned_count += scanned;
            self.bytes_count += bytes;
        }
        self.finished = Some(now);
    }
}

/// A status-file entry: a shallow copy of the migration config (secret
/// stripped) plus its nested status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(flatten)]
    pub migration: Migration,
    pub status: StatusEntry,
}

/// Persists per-migration status to a JSON file, recovering from corruption
/// by rotating the bad file aside rather than losing the rest of the daemon's
/// state.
pub struct StatusStore {
    path: PathBuf,
    records: Vec<StatusRecord>,
}

impl StatusStore {
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                if bytes.is_empty() {
                    Vec::new()
                } else {
                    match serde_json::from_slice::<Vec<StatusRecord>>(&bytes) {
                        Ok(records) => records,
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "status file corrupted, rotating aside");
                            Self::rotate_corrupted(&path).await?;
                            Vec::new()
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, records })
    }

    async fn rotate_corrupted(path: &Path) -> Result<()> {
        let mut n = 1u32;
        loop {
            let candidate = append_suffix(path, &format!(".corrupted.{n}"));
            if tokio::fs::metadata(&candidate).await.is_err() {
                tokio::fs::rename(path, &candidate).await?;
                return Ok(());
            }
            n += 1;
        }
    }

    pub fn get(&self, migration: &Migration) -> Option<&StatusRecord> {
        self.records.iter().find(|r| r.migration.equal_to(migration))
    }

    pub fn get_mut(&mut self, migration: &Migration) -> Option<&mut StatusRecord> {
        self.records.iter_mut().find(|r| r.migration.equal_to(migration))
    }

    pub async fn save(
        &mut self,
        migration: &Migration,
        marker: String,
        moved: u64,
        scanned: u64,
        bytes: u64,
        reset: bool,
        now: f64,
    ) -> Result<()> {
        if let Some(record) = self.get_mut(migration) {
            record.status.apply_pass(marker, moved, scanned, bytes, reset, now);
        } else {
            let mut entry = StatusEntry::default();
            entry.apply_pass(marker, moved, scanned, bytes, reset, now);
            let mut stripped = migration.clone();
            stripped.aws_secret = None;
            self.records.push(StatusRecord {
                migration: stripped,
                status: entry,
            });
        }
        self.flush().await
    }

    /// Drops entries whose migration no longer matches any of `active`.
    pub fn prune(&mut self, active: &[Migration]) {
        self.records
            .retain(|r| active.iter().any(|m| m.equal_to(&r.migration)));
    }

    async fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let body = serde_json::to_vec_pretty(&self.records)
            .map_err(|e| crate::error::Error::Generic(format!("failed to serialize status: {e}")))?;

        let tmp_path = append_suffix(&self.path, ".tmp");
        tokio::fs::write(&tmp_path, &body).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    pub fn records(&self) -> &[StatusRecord] {
        &self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_skipped_when_previous_pass_unfinished() {
        let mut e = StatusEntry {
            moved_count: 5,
            scanned_count: 5,
            last_moved_count: 0,
            last_scanned_count: 0,
            finished: None,
            ..Default::default()
        };
        e.rotate();
        assert_eq!(e.last_moved_count, 0);
    }

    #[test]
    fn rotation_happens_when_previous_pass_moved_something() {
        let mut e = StatusEntry {
            moved_count: 5,
            scanned_count: 5,
            bytes_count: 50,
            last_moved_count: 3,
            last_scanned_count: 5,
            finished: Some(100.0),
            ..Default::default()
        };
        e.rotate();
        assert_eq!(e.last_moved_count, 5);
        assert_eq!(e.last_bytes_count, 50);
    }

    #[test]
    fn rotation_skipped_when_nothing_moved_and_scan_count_unchanged() {
        let mut e = StatusEntry {
            moved_count: 0,
            scanned_count: 5,
            last_moved_count: 0,
            last_scanned_count: 5,
            finished: Some(100.0),
            ..Default::default()
        };
        e.rotate();
        // nothing changes since neither rotation condition holds
        assert_eq!(e.last_scanned_count, 5);
    }

    #[tokio::test]
    async fn corrupt_status_file_is_rotated_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let store = StatusStore::load(&path).await.unwrap();
        assert!(store.records().is_empty());
        assert!(tokio::fs::metadata(dir.path().join("status.json.corrupted.1")).await.is_ok());
    }

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        let mut store = StatusStore::load(&path).await.unwrap();

        let migration = Migration {
            account: "a".into(),
            aws_identity: "id".into(),
            aws_secret: None,
            aws_endpoint: None,
            aws_bucket: "b".into(),
            container: None,
            protocol: crate::config::Protocol::S3,
            prefix: None,
            custom_prefix: None,
            older_than: 0,
            propagate_account_metadata: false,
            remote_account: None,
            storage_policy: None,
        };

        store.save(&migration, "k2".into(), 2, 2, 100, true, 1000.0).await.unwrap();

        let reloaded = StatusStore::load(&path).await.unwrap();
        let record = reloaded.get(&migration).unwrap();
        assert_eq!(record.status.marker, "k2");
        assert_eq!(record.status.moved_count, 2);
    }
}
