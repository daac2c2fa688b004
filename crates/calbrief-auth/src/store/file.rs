//! Local JSON token file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::{StoreError, TokenStore};
use crate::BoxFuture;
use crate::token::TokenRecord;

/// Token record stored as pretty-printed JSON at a fixed path.
///
/// Saves go through a uniquely named temporary file in the same directory
/// followed by a rename, so concurrent readers in other processes see either
/// the old or the new record, never a partial one.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Option<TokenRecord> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no token file at {}", self.path.display());
                return None;
            }
            Err(e) => {
                warn!("ignoring unreadable token file {}: {}", self.path.display(), e);
                return None;
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => {
                debug!("loaded token from {}", self.path.display());
                Some(record)
            }
            Err(e) => {
                warn!("ignoring malformed token file {}: {}", self.path.display(), e);
                None
            }
        }
    }

    fn write(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(io_err)?;

        let content = serde_json::to_string_pretty(record)?;

        let mut temp = tempfile::Builder::new()
            .prefix(".token-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .map_err(io_err)?;
        temp.write_all(content.as_bytes()).map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(temp.path(), fs::Permissions::from_mode(0o600))
                .map_err(io_err)?;
        }

        temp.persist(&self.path).map_err(|e| io_err(e.error))?;

        info!("saved token to {}", self.path.display());
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn describe(&self) -> String {
        format!("token file {}", self.path.display())
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<TokenRecord>, StoreError>> {
        Box::pin(async move { Ok(self.read()) })
    }

    fn save<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move { self.write(record) })
    }
}
