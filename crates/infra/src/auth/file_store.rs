//! Token store backed by a JSON file
//!
//! Writes go to a sibling temp file that is renamed over the target, so a
//! reader in another process sees either the previous pair or the new one,
//! never a torn write.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use ledgerlink_core::TokenStore;
use ledgerlink_domain::{LedgerError, Result, StorageConfig, TokenState};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::storage_error;

/// [`TokenStore`] persisting the token pair to a single file.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.token_path.clone())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self.path.file_name().and_then(|n| n.to_str()).unwrap_or("tokens");
        self.path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<TokenState>> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_error("read", &self.path, err)),
        };

        if contents.trim().is_empty() {
            return Ok(None);
        }

        let tokens: TokenState = serde_json::from_str(&contents).map_err(|err| {
            LedgerError::Storage(format!(
                "token file {} is not valid: {}",
                self.path.display(),
                err
            ))
        })?;

        debug!(path = %self.path.display(), expires_at = %tokens.expires_at, "token_store.loaded");
        Ok(Some(tokens))
    }

    fn save(&self, state: &TokenState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| storage_error("create", parent, err))?;
        }

        let json = serde_json::to_vec_pretty(state)
            .map_err(|err| LedgerError::Storage(format!("failed to encode tokens: {}", err)))?;

        let temp = self.temp_path();
        let written = fs::File::create(&temp).and_then(|mut file| {
            file.write_all(&json)?;
            file.sync_all()
        });
        if let Err(err) = written {
            let _ = fs::remove_file(&temp);
            return Err(storage_error("write", &temp, err));
        }

        if let Err(err) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(storage_error("replace", &self.path, err));
        }

        info!(path = %self.path.display(), expires_at = %state.expires_at, "token_store.saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                info!(path = %self.path.display(), "token_store.cleared");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_error("remove", &self.path, err)),
        }
    }
}
