//! Remote store with a local write-through cache.

use tracing::{debug, warn};

use super::{StoreError, TokenStore};
use crate::BoxFuture;
use crate::token::TokenRecord;

/// Composite store: `remote` is authoritative, `cache` is a best-effort copy.
///
/// `load` always consults the remote first. The cache is read only when the
/// remote holds nothing or cannot be reached; in the latter case the remote
/// error is returned if the cache is empty too.
///
/// `save` writes the remote and, once that succeeds, the cache. A cache write
/// failure is logged and does not fail the save.
pub struct WriteThroughStore {
    remote: Box<dyn TokenStore>,
    cache: Box<dyn TokenStore>,
}

impl WriteThroughStore {
    pub fn new(remote: impl TokenStore + 'static, cache: impl TokenStore + 'static) -> Self {
        Self {
            remote: Box::new(remote),
            cache: Box::new(cache),
        }
    }
}

impl TokenStore for WriteThroughStore {
    fn describe(&self) -> String {
        format!(
            "{} (cached in {})",
            self.remote.describe(),
            self.cache.describe()
        )
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<TokenRecord>, StoreError>> {
        Box::pin(async move {
            match self.remote.load().await {
                Ok(Some(record)) => Ok(Some(record)),
                Ok(None) => {
                    debug!(
                        "{} is empty, falling back to {}",
                        self.remote.describe(),
                        self.cache.describe()
                    );
                    self.cache.load().await
                }
                Err(remote_err) => {
                    warn!("failed to load from {}: {}", self.remote.describe(), remote_err);
                    match self.cache.load().await {
                        Ok(Some(record)) => {
                            warn!("using cached token from {}", self.cache.describe());
                            Ok(Some(record))
                        }
                        _ => Err(remote_err),
                    }
                }
            }
        })
    }

    fn save<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            self.remote.save(record).await?;

            if let Err(e) = self.cache.save(record).await {
                warn!("failed to update {}: {}", self.cache.describe(), e);
            }
            Ok(())
        })
    }
}
