//! AWS Systems Manager Parameter Store backend.

use std::time::Duration;

use aws_sdk_ssm::Client;
use aws_sdk_ssm::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ssm::types::ParameterType;
use tracing::debug;

use super::{ParameterStore, StoreError};
use crate::BoxFuture;

/// [`ParameterStore`] backed by SSM `GetParameter` / `PutParameter`.
///
/// Secrets are read with decryption and written as `SecureString` with
/// overwrite enabled.
#[derive(Debug, Clone)]
pub struct SsmParameterStore {
    client: Client,
}

impl SsmParameterStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client from the ambient AWS configuration (environment,
    /// execution role), bounding every operation by `timeout`.
    pub async fn from_env(timeout: Duration) -> Self {
        let timeouts = aws_config::timeout::TimeoutConfig::builder()
            .operation_timeout(timeout)
            .build();
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .timeout_config(timeouts)
            .load()
            .await;
        Self::new(Client::new(&config))
    }
}

impl ParameterStore for SsmParameterStore {
    fn get<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        Box::pin(async move {
            let result = self
                .client
                .get_parameter()
                .name(name)
                .with_decryption(true)
                .send()
                .await;

            match result {
                Ok(output) => Ok(output
                    .parameter()
                    .and_then(|p| p.value())
                    .map(str::to_owned)),
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(|e| e.is_parameter_not_found()) =>
                {
                    debug!("SSM parameter {} not found", name);
                    Ok(None)
                }
                Err(err) => Err(classify(name, err)),
            }
        })
    }

    fn put<'a>(
        &'a self,
        name: &'a str,
        value: &'a str,
        encrypted: bool,
    ) -> BoxFuture<'a, Result<(), StoreError>> {
        Box::pin(async move {
            let parameter_type = if encrypted {
                ParameterType::SecureString
            } else {
                ParameterType::String
            };

            self.client
                .put_parameter()
                .name(name)
                .value(value)
                .r#type(parameter_type)
                .overwrite(true)
                .send()
                .await
                .map(|_| ())
                .map_err(|err| classify(name, err))
        })
    }
}

/// Maps an SDK failure to a [`StoreError`] by transport outcome and error code.
fn classify<E, R>(name: &str, err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();

    if matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    ) {
        return StoreError::Transient {
            target: name.to_string(),
            message,
        };
    }

    let code = err.as_service_error().and_then(|e| e.code());
    classify_code(name, code, message)
}

fn classify_code(name: &str, code: Option<&str>, message: String) -> StoreError {
    match code {
        Some("AccessDeniedException" | "UnrecognizedClientException" | "KMSAccessDeniedException") => {
            StoreError::AccessDenied(name.to_string())
        }
        Some("TooManyUpdates") => StoreError::Conflict(name.to_string()),
        Some(
            "ThrottlingException" | "InternalServerError" | "ServiceUnavailable"
            | "KMSThrottlingException",
        )
        | None => StoreError::Transient {
            target: name.to_string(),
            message,
        },
        Some(_) => StoreError::Rejected {
            target: name.to_string(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_map_to_store_errors() {
        let map = |code| classify_code("p", code, "boom".to_string());

        assert!(matches!(map(Some("AccessDeniedException")), StoreError::AccessDenied(_)));
        assert!(matches!(map(Some("TooManyUpdates")), StoreError::Conflict(_)));
        assert!(matches!(map(Some("ThrottlingException")), StoreError::Transient { .. }));
        assert!(matches!(map(None), StoreError::Transient { .. }));
        assert!(matches!(
            map(Some("ParameterLimitExceeded")),
            StoreError::Rejected { .. }
        ));
    }
}
