//! Cross-process lock using exclusively created marker files
//!
//! `try_acquire` relies on `O_CREAT | O_EXCL` semantics: exactly one process
//! can create `{dir}/{name}.lock`. The marker body records the owner id, pid
//! and acquisition time for diagnostics and staleness checks.
//!
//! A holder that crashes leaves its marker behind. When a stale window is
//! configured, a marker older than the window is removed while holding an
//! exclusive advisory lock on `{dir}/{name}.reclaim`. Release takes the same
//! lock, so a marker re-read under it cannot be swapped before removal.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use fs4::fs_std::FileExt;
use ledgerlink_common::resilience::{Clock, SystemClock};
use ledgerlink_core::{LockClient, LockMarker};
use ledgerlink_domain::{LedgerError, Result, StorageConfig};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::storage_error;

const MARKER_EXTENSION: &str = "lock";
const RECLAIM_EXTENSION: &str = "reclaim";

/// [`LockClient`] over marker files in a shared directory.
pub struct FileLockClient {
    dir: PathBuf,
    owner: String,
    stale_after: Option<Duration>,
    clock: Arc<dyn Clock>,
}

/// What sits at the marker path when a create was refused.
enum Occupant {
    Absent,
    Marker(LockMarker),
    /// Present but empty or unparseable; carries the file mtime.
    Torn(Option<DateTime<Utc>>),
}

impl FileLockClient {
    /// Client with a fresh owner id and no stale reclaim.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            owner: Uuid::new_v4().to_string(),
            stale_after: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.lock_dir.clone()).with_stale_after(config.stale_after())
    }

    /// Reclaim markers older than `window`; `None` never reclaims.
    #[must_use]
    pub fn with_stale_after(mut self, window: Option<Duration>) -> Self {
        self.stale_after = window;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the marker file for `name`.
    pub fn marker_path(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.{MARKER_EXTENSION}")))
    }

    fn create_marker(&self, path: &Path) -> std::io::Result<LockMarker> {
        let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
        let marker = LockMarker {
            owner: self.owner.clone(),
            pid: std::process::id(),
            acquired_at: self.clock.now_utc(),
        };
        let written = serde_json::to_vec(&marker)
            .map_err(|err| std::io::Error::new(ErrorKind::InvalidData, err))
            .and_then(|body| {
                file.write_all(&body)?;
                file.sync_all()
            });
        if let Err(err) = written {
            // A half-written marker would block everyone.
            let _ = fs::remove_file(path);
            return Err(err);
        }
        Ok(marker)
    }

    fn is_older_than_window(&self, since: DateTime<Utc>) -> bool {
        let Some(window) = self.stale_after else {
            return false;
        };
        let age = self.clock.now_utc().signed_duration_since(since);
        age.to_std().is_ok_and(|age| age > window)
    }

    fn is_stale(&self, occupant: &Occupant) -> bool {
        match occupant {
            Occupant::Absent => false,
            Occupant::Marker(marker) => self.is_older_than_window(marker.acquired_at),
            Occupant::Torn(modified) => modified.is_some_and(|at| self.is_older_than_window(at)),
        }
    }

    /// Blocks until this process holds the reclaim guard for `name`. The
    /// guard is released when the returned file is dropped.
    fn lock_reclaim_guard(&self, name: &str) -> Result<File> {
        fs::create_dir_all(&self.dir).map_err(|err| storage_error("create", &self.dir, err))?;
        let path = self.dir.join(format!("{name}.{RECLAIM_EXTENSION}"));
        let guard = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|err| storage_error("open", &path, err))?;
        guard.lock_exclusive().map_err(|err| storage_error("lock", &path, err))?;
        Ok(guard)
    }

    /// Remove a stale marker under the reclaim guard and create ours in its
    /// place. Returns `true` when this process now holds the lock.
    fn reclaim(&self, name: &str, path: &Path) -> Result<bool> {
        let _guard = self.lock_reclaim_guard(name)?;

        // Only release and reclaim remove markers, and both hold the guard,
        // so what we read here is what we remove.
        let occupant = read_occupant(path)?;
        if !matches!(occupant, Occupant::Absent) {
            if !self.is_stale(&occupant) {
                debug!(lock = name, "lock.reclaim_lost_race");
                return Ok(false);
            }
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(storage_error("reclaim", path, err)),
            }
            match &occupant {
                Occupant::Marker(stale) => warn!(
                    lock = name,
                    stale_owner = %stale.owner,
                    stale_pid = stale.pid,
                    acquired_at = %stale.acquired_at,
                    "lock.stale_reclaimed"
                ),
                _ => warn!(lock = name, "lock.torn_marker_reclaimed"),
            }
        }

        match self.create_marker(path) {
            Ok(marker) => {
                info!(lock = name, owner = %marker.owner, pid = marker.pid, "lock.acquired");
                Ok(true)
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(err) => Err(storage_error("create", path, err)),
        }
    }
}

impl LockClient for FileLockClient {
    fn owner_id(&self) -> &str {
        &self.owner
    }

    fn try_acquire(&self, name: &str) -> Result<bool> {
        let path = self.marker_path(name)?;
        fs::create_dir_all(&self.dir).map_err(|err| storage_error("create", &self.dir, err))?;

        let mut retried = false;
        loop {
            match self.create_marker(&path) {
                Ok(marker) => {
                    info!(
                        lock = name,
                        owner = %marker.owner,
                        pid = marker.pid,
                        path = %path.display(),
                        "lock.acquired"
                    );
                    return Ok(true);
                }
                Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
                Err(err) => return Err(storage_error("create", &path, err)),
            }

            let occupant = read_occupant(&path)?;
            if matches!(occupant, Occupant::Absent) && !retried {
                // Released between our create and the read; try once more.
                retried = true;
                continue;
            }

            if !self.is_stale(&occupant) {
                match occupant {
                    Occupant::Marker(current) => debug!(
                        lock = name,
                        holder = %current.owner,
                        holder_pid = current.pid,
                        "lock.contended"
                    ),
                    _ => debug!(lock = name, "lock.contended"),
                }
                return Ok(false);
            }

            return self.reclaim(name, &path);
        }
    }

    fn release(&self, name: &str) -> Result<()> {
        let path = self.marker_path(name)?;
        let _guard = self.lock_reclaim_guard(name)?;
        let holder = read_marker(&path)?;

        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(LedgerError::LockState(format!("lock '{name}' is not held")));
            }
            Err(err) => return Err(storage_error("remove", &path, err)),
        }

        match holder {
            Some(marker) if marker.owner != self.owner => {
                warn!(lock = name, holder = %marker.owner, owner = %self.owner, "lock.released_foreign");
            }
            _ => info!(lock = name, owner = %self.owner, "lock.released"),
        }
        Ok(())
    }

    fn holder(&self, name: &str) -> Result<Option<LockMarker>> {
        let path = self.marker_path(name)?;
        match read_occupant(&path)? {
            Occupant::Marker(marker) => Ok(Some(marker)),
            // Exists but still being written by its creator.
            Occupant::Torn(modified) => Ok(Some(LockMarker {
                owner: String::new(),
                pid: 0,
                acquired_at: modified.unwrap_or_else(|| self.clock.now_utc()),
            })),
            Occupant::Absent => Ok(None),
        }
    }
}

/// Parse a marker; `None` when absent or not yet fully written.
fn read_marker(path: &Path) -> Result<Option<LockMarker>> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes).ok()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(storage_error("read", path, err)),
    }
}

fn read_occupant(path: &Path) -> Result<Occupant> {
    match read_marker(path)? {
        Some(marker) => Ok(Occupant::Marker(marker)),
        None if path.exists() => Ok(Occupant::Torn(modified_at(path))),
        None => Ok(Occupant::Absent),
    }
}

fn modified_at(path: &Path) -> Option<DateTime<Utc>> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok().map(DateTime::<Utc>::from)
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(LedgerError::LockState(format!("invalid lock name '{name}'")))
    }
}
