use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use crate::config::{AutoSaveConfig, ConfigPaths};
use crate::model::{Record, RecordId};

const SNAPSHOT_EXTENSION: &str = "json";
const SNAPSHOT_TMP_EXTENSION: &str = "json.tmp";

/// Unsaved draft found on disk.
#[derive(Debug, Clone)]
pub struct RecoverySnapshot<R> {
    pub record: R,
    pub saved_at: OffsetDateTime,
    /// Whether the record already existed in the gateway when the draft was written.
    pub persisted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile<R> {
    saved_at: i64,
    persisted: bool,
    record: R,
}

/// Crash-recovery journal: one JSON file per unsaved draft.
#[derive(Debug, Clone)]
pub struct RecoveryJournal {
    dir: PathBuf,
    retention: Option<Duration>,
}

impl RecoveryJournal {
    pub fn open(dir: PathBuf, retention: Option<Duration>) -> Result<Self> {
        fs::create_dir_all(&dir)
            .with_context(|| format!("creating recovery journal dir {}", dir.display()))?;
        Ok(Self { dir, retention })
    }

    /// `None` when crash recovery is disabled.
    pub fn from_config(paths: &ConfigPaths, config: &AutoSaveConfig) -> Result<Option<Self>> {
        if !config.crash_recovery {
            return Ok(None);
        }
        Self::open(paths.recovery_dir(), config.snapshot_retention()).map(Some)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write<R: Record>(&self, record: &R, persisted: bool) -> Result<()> {
        let file = SnapshotFile {
            saved_at: OffsetDateTime::now_utc().unix_timestamp(),
            persisted,
            record,
        };
        let json = serde_json::to_vec_pretty(&file).context("serialising draft snapshot")?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("ensuring recovery dir {}", self.dir.display()))?;
        let final_path = self.path_for::<R>(record.id());
        let tmp_path = final_path.with_extension(SNAPSHOT_TMP_EXTENSION);
        fs::write(&tmp_path, &json)
            .with_context(|| format!("writing temporary draft snapshot {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &final_path).with_context(|| {
            format!("atomically persisting draft snapshot {}", final_path.display())
        })?;
        Ok(())
    }

    pub fn read<R: Record>(&self, id: &RecordId) -> Result<Option<RecoverySnapshot<R>>> {
        let path = self.path_for::<R>(id);
        if !path.exists() {
            return Ok(None);
        }
        read_snapshot(&path).map(Some)
    }

    pub fn remove<R: Record>(&self, id: &RecordId) -> Result<()> {
        remove_snapshot_path(&self.path_for::<R>(id))
    }

    /// Newest first. Snapshots older than the retention window are deleted.
    pub fn list<R: Record>(&self) -> Result<Vec<RecoverySnapshot<R>>> {
        let dir = match fs::read_dir(&self.dir) {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("reading recovery journal {}", self.dir.display())
                })
            }
        };

        let prefix = format!("{}-", R::NOUN);
        let cutoff = self
            .retention
            .map(|retention| OffsetDateTime::now_utc() - retention);
        let mut snapshots = Vec::new();
        for entry in dir {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!(?err, "skipping unreadable recovery entry");
                    continue;
                }
            };
            let path = entry.path();
            let is_snapshot = path.is_file()
                && path.extension().and_then(|ext| ext.to_str()) == Some(SNAPSHOT_EXTENSION)
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(&prefix));
            if !is_snapshot {
                continue;
            }
            match read_snapshot::<R>(&path) {
                Ok(snapshot) if cutoff.is_some_and(|cutoff| snapshot.saved_at < cutoff) => {
                    tracing::info!(path = %path.display(), "pruning expired draft snapshot");
                    remove_snapshot_path(&path)?;
                }
                Ok(snapshot) => snapshots.push(snapshot),
                Err(err) => {
                    tracing::warn!(?err, "failed to parse draft snapshot {}", path.display());
                }
            }
        }

        snapshots.sort_by(|a, b| match b.saved_at.cmp(&a.saved_at) {
            Ordering::Equal => b.record.id().cmp(a.record.id()),
            other => other,
        });
        Ok(snapshots)
    }

    fn path_for<R: Record>(&self, id: &RecordId) -> PathBuf {
        let safe: String = id
            .as_str()
            .chars()
            .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' { ch } else { '_' })
            .collect();
        self.dir
            .join(format!("{}-{safe}.{}", R::NOUN, SNAPSHOT_EXTENSION))
    }
}

fn read_snapshot<R: Record>(path: &Path) -> Result<RecoverySnapshot<R>> {
    let raw =
        fs::read(path).with_context(|| format!("reading draft snapshot {}", path.display()))?;
    let file: SnapshotFile<R> = serde_json::from_slice(&raw)
        .with_context(|| format!("parsing draft snapshot {}", path.display()))?;
    let saved_at = OffsetDateTime::from_unix_timestamp(file.saved_at)
        .unwrap_or_else(|_| OffsetDateTime::now_utc());
    Ok(RecoverySnapshot {
        record: file.record,
        saved_at,
        persisted: file.persisted,
    })
}

fn remove_snapshot_path(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("removing draft snapshot {}", path.display()))
        }
    }
}
