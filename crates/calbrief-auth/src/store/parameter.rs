//! Token record kept as a named secret in a remote parameter store.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{StoreError, TokenStore};
use crate::BoxFuture;
use crate::token::TokenRecord;

/// Named-secret get/put, the narrow surface the token store needs from a
/// remote parameter service.
///
/// `get` returns `Ok(None)` when the parameter does not exist. Access and
/// transport failures are reported as the matching [`StoreError`] variant;
/// a concurrent update rejected by the service is [`StoreError::Conflict`].
pub trait ParameterStore: Send + Sync {
    fn get<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>>;

    /// Writes `value`, overwriting any previous version.
    fn put<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
        encrypted: bool,
    ) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// [`TokenStore`] over one parameter of a [`ParameterStore`].
#[derive(Clone)]
pub struct ParameterTokenStore {
    client: Arc<dyn ParameterStore>,
    name: String,
}

impl ParameterTokenStore {
    pub fn new(client: Arc<dyn ParameterStore>, name: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TokenStore for ParameterTokenStore {
    fn describe(&self) -> String {
        format!("parameter {}", self.name)
    }

    fn load(&self) -> BoxFuture<'_, Result<Option<TokenRecord>, StoreError>> {
        Box::pin(async move {
            let Some(value) = self.client.get(&self.name).await? else {
                debug!("parameter {} does not exist", self.name);
                return Ok(None);
            };

            match serde_json::from_str(&value) {
                Ok(record) => {
                    debug!("loaded token from parameter {}", self.name);
                    Ok(Some(record))
                }
                Err(e) => {
                    warn!("ignoring malformed token in parameter {}: {}", self.name, e);
                    Ok(None)
                }
            }
        })
    }

    fn save<'a>(&'a self, record: &'a TokenRecord) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let value = serde_json::to_string(record)?;
            self.client.put(&self.name, &value, true).await?;
            info!("saved token to parameter {}", self.name);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryParameterStore, valid_record};

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let params = Arc::new(MemoryParameterStore::default());
        let store = ParameterTokenStore::new(params.clone(), "/calbrief/token");

        let record = valid_record();
        store.save(&record).await.unwrap();

        assert_eq!(store.load().await.unwrap(), Some(record));
        assert!(params.was_encrypted("/calbrief/token"));
    }

    #[tokio::test]
    async fn missing_parameter_is_absent() {
        let store = ParameterTokenStore::new(Arc::new(MemoryParameterStore::default()), "p");
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn malformed_parameter_is_absent() {
        let params = Arc::new(MemoryParameterStore::default());
        params.insert("p", "not a token");
        let store = ParameterTokenStore::new(params, "p");
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn access_denied_is_reported() {
        let params = Arc::new(MemoryParameterStore::default());
        params.fail_next_get(StoreError::AccessDenied("p".to_string()));
        let store = ParameterTokenStore::new(params, "p");

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, StoreError::AccessDenied(_)));
    }

    #[tokio::test]
    async fn conflict_on_put_is_reported() {
        let params = Arc::new(MemoryParameterStore::default());
        params.fail_next_put(StoreError::Conflict("p".to_string()));
        let store = ParameterTokenStore::new(params, "p");

        let err = store.save(&valid_record()).await.unwrap_err();
        assert!(err.is_conflict());
    }
}
