//! Supabase REST (PostgREST) and Edge Functions client.
//!
//! Every call resolves to a `Result`; timeouts, missing tables, HTTP
//! failures and undecodable bodies all come back as [`RestError`] or
//! [`FunctionError`] values.
//!
//! # Endpoints
//!
//! - REST: `<SUPABASE_URL>/rest/v1/<table>` with PostgREST query syntax
//! - Functions: `<SUPABASE_URL>/functions/v1/<name>`
//!
//! Both are authenticated with the project's anon key, sent as `apikey`
//! and as a bearer token.

mod error;
mod mutation;
mod query;

pub use error::{
    FunctionError, PG_UNDEFINED_TABLE, PGRST_TABLE_NOT_FOUND, RestError, is_network_error,
};
pub use mutation::{MutationMethod, MutationOptions};
pub use query::{CountMode, Order, QueryOptions, QueryResponse, parse_content_range};

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_RANGE, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::SupabaseConfig;
use error::{classify_mutation_failure, classify_query_failure, function_error_message};

/// Client for a Supabase project's REST and Functions endpoints.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<SupabaseClientInner>,
}

struct SupabaseClientInner {
    client: reqwest::Client,
    rest_url: Url,
    functions_url: Url,
    default_timeout: Duration,
}

impl std::fmt::Debug for SupabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseClient")
            .field("rest_url", &self.inner.rest_url.as_str())
            .field("default_timeout", &self.inner.default_timeout)
            .field("anon_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Raw pieces of a response read within the timeout window.
struct RawResponse {
    status: StatusCode,
    content_range: Option<String>,
    body: String,
}

/// Why a request produced no response.
enum SendFailure {
    Timeout,
    Transport(String),
}

impl SupabaseClient {
    /// Create a new client for the configured project.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::InvalidRequest`] if the anon key is not a valid
    /// header value or the HTTP client fails to build.
    pub fn new(config: &SupabaseConfig) -> Result<Self, RestError> {
        let key = config.anon_key.expose_secret();

        let mut apikey = HeaderValue::from_str(key)
            .map_err(|e| RestError::InvalidRequest(format!("Invalid anon key format: {e}")))?;
        apikey.set_sensitive(true);
        let mut bearer = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|e| RestError::InvalidRequest(format!("Invalid anon key format: {e}")))?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert("apikey", apikey);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| RestError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            inner: Arc::new(SupabaseClientInner {
                client,
                rest_url: config.rest_url(),
                functions_url: config.functions_url(),
                default_timeout: config.request_timeout,
            }),
        })
    }

    /// Timeout applied when a call does not set its own.
    #[must_use]
    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }

    /// Run a PostgREST query against `table`.
    ///
    /// An empty body yields `data: None`. `count` is filled from the
    /// `Content-Range` header when [`QueryOptions::count`] was requested.
    ///
    /// # Errors
    ///
    /// - [`RestError::QueryTimeout`] when the timeout elapses
    /// - [`RestError::TableNotFound`] for a missing relation (`42P01`)
    /// - [`RestError::Http`] for other non-success statuses
    /// - [`RestError::Parse`] for an undecodable body
    /// - [`RestError::Network`] when no response arrives
    #[instrument(skip(self, options), fields(table = %table))]
    pub async fn query<T: DeserializeOwned>(
        &self,
        table: &str,
        options: &QueryOptions,
    ) -> Result<QueryResponse<T>, RestError> {
        let url = options.to_url(&self.inner.rest_url, table)?;
        let timeout = options.timeout.unwrap_or(self.inner.default_timeout);

        let mut request = self.inner.client.get(url);
        if let Some(count) = options.count {
            request = request.header("Prefer", count.prefer_header());
        }

        let raw = match self.send(request, timeout).await {
            Ok(raw) => raw,
            Err(SendFailure::Timeout) => {
                warn!(timeout_ms = timeout.as_millis(), "Query timed out");
                return Err(RestError::QueryTimeout {
                    table: table.to_string(),
                    after: timeout,
                });
            }
            Err(SendFailure::Transport(message)) => {
                warn!(error = %message, "Query failed before a response");
                return Err(RestError::Network(message));
            }
        };

        if !raw.status.is_success() {
            let err = classify_query_failure(table, raw.status.as_u16(), &raw.body);
            warn!(status = %raw.status, error = %err, "Query returned an error");
            return Err(err);
        }

        let data = decode_body(&raw.body)?;
        let count = raw.content_range.as_deref().and_then(parse_content_range);

        debug!(status = %raw.status, ?count, "Query completed");

        Ok(QueryResponse { data, count })
    }

    /// Run an insert, update or delete against `table`.
    ///
    /// Returns `Ok(None)` for a success with an empty body, which is the
    /// normal outcome when `returning` is off.
    ///
    /// # Errors
    ///
    /// - [`RestError::MutationTimeout`] when the timeout elapses
    /// - [`RestError::MutationFailed`] for non-success statuses
    /// - [`RestError::Parse`] for an undecodable body
    /// - [`RestError::Network`] when no response arrives
    #[instrument(skip(self, options), fields(table = %table, method = %options.method))]
    pub async fn mutate(
        &self,
        table: &str,
        options: &MutationOptions,
    ) -> Result<Option<Value>, RestError> {
        let url = options.to_url(&self.inner.rest_url, table)?;
        let timeout = options.timeout.unwrap_or(self.inner.default_timeout);

        let mut request = self
            .inner
            .client
            .request(options.method.as_reqwest(), url)
            .header("Prefer", options.prefer_header());
        if let Some(body) = &options.body {
            request = request.json(body);
        }

        let raw = match self.send(request, timeout).await {
            Ok(raw) => raw,
            Err(SendFailure::Timeout) => {
                warn!(timeout_ms = timeout.as_millis(), "Mutation timed out");
                return Err(RestError::MutationTimeout {
                    table: table.to_string(),
                });
            }
            Err(SendFailure::Transport(message)) => {
                warn!(error = %message, "Mutation failed before a response");
                return Err(RestError::Network(message));
            }
        };

        if !raw.status.is_success() {
            let err = classify_mutation_failure(raw.status.as_u16(), &raw.body);
            warn!(status = %raw.status, error = %err, "Mutation returned an error");
            return Err(err);
        }

        debug!(status = %raw.status, "Mutation completed");

        decode_body(&raw.body)
    }

    /// Invoke an Edge Function with a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`FunctionError`] on timeout, transport failure, non-success
    /// status (message taken from the body's `error` field when present),
    /// or an undecodable response.
    #[instrument(skip(self, body), fields(function = %function))]
    pub async fn invoke<B, T>(&self, function: &str, body: &B) -> Result<T, FunctionError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        if function.is_empty() || function.contains('/') {
            return Err(FunctionError::InvalidRequest(format!(
                "invalid function name: {function:?}"
            )));
        }
        let url = self
            .inner
            .functions_url
            .join(function)
            .map_err(|e| FunctionError::InvalidRequest(e.to_string()))?;

        let request = self.inner.client.post(url).json(body);

        let raw = match self.send(request, self.inner.default_timeout).await {
            Ok(raw) => raw,
            Err(SendFailure::Timeout) => {
                warn!("Function call timed out");
                return Err(FunctionError::Timeout {
                    function: function.to_string(),
                });
            }
            Err(SendFailure::Transport(message)) => {
                return Err(FunctionError::Network {
                    function: function.to_string(),
                    message,
                });
            }
        };

        if !raw.status.is_success() {
            let message = function_error_message(&raw.body);
            warn!(status = %raw.status, error = %message, "Function returned an error");
            return Err(FunctionError::Http {
                function: function.to_string(),
                status: raw.status.as_u16(),
                message,
            });
        }

        let body = if raw.body.trim().is_empty() {
            "null"
        } else {
            raw.body.as_str()
        };
        serde_json::from_str(body).map_err(|e| FunctionError::Parse {
            function: function.to_string(),
            message: e.to_string(),
        })
    }

    /// Send a request and read its body, all within `timeout`.
    ///
    /// Dropping the in-flight future on expiry aborts the request.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        timeout: Duration,
    ) -> Result<RawResponse, SendFailure> {
        let exchange = async {
            let response = request.send().await?;
            let status = response.status();
            let content_range = response
                .headers()
                .get(CONTENT_RANGE)
                .and_then(|v| v.to_str().ok())
                .map(String::from);
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(RawResponse {
                status,
                content_range,
                body,
            })
        };

        match tokio::time::timeout(timeout, exchange).await {
            Err(_) => Err(SendFailure::Timeout),
            Ok(Err(e)) if e.is_timeout() => Err(SendFailure::Timeout),
            Ok(Err(e)) => Err(SendFailure::Transport(e.to_string())),
            Ok(Ok(raw)) => Ok(raw),
        }
    }
}

/// Decode a response body, treating an empty body as `None`.
fn decode_body<T: DeserializeOwned>(body: &str) -> Result<Option<T>, RestError> {
    if body.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(body)
        .map(Some)
        .map_err(|e| RestError::Parse(e.to_string()))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use secrecy::SecretString;

    use super::*;

    fn config() -> SupabaseConfig {
        SupabaseConfig {
            url: Url::parse("https://abc.supabase.co").unwrap(),
            anon_key: SecretString::from("eyJhbGciOiJIUzI1NiJ9.test-anon-key"),
            request_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_decode_empty_body() {
        let data: Option<Value> = decode_body("").unwrap();
        assert!(data.is_none());
        let data: Option<Value> = decode_body("  \n").unwrap();
        assert!(data.is_none());
    }

    #[test]
    fn test_decode_invalid_body() {
        let result: Result<Option<Value>, _> = decode_body("{not json");
        assert!(matches!(result, Err(RestError::Parse(_))));
    }

    #[test]
    fn test_debug_redacts_anon_key() {
        let client = SupabaseClient::new(&config()).unwrap();
        let debug = format!("{client:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("test-anon-key"));
    }

    #[test]
    fn test_rejects_key_with_newline() {
        let mut config = config();
        config.anon_key = SecretString::from("bad\nkey");
        assert!(matches!(
            SupabaseClient::new(&config),
            Err(RestError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_function_name() {
        let client = SupabaseClient::new(&config()).unwrap();
        let result: Result<Value, _> = client.invoke("../admin", &serde_json::json!({})).await;
        assert!(matches!(result, Err(FunctionError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_invalid_table_name_is_an_error_value() {
        let client = SupabaseClient::new(&config()).unwrap();
        let result: Result<QueryResponse<Value>, _> =
            client.query("", &QueryOptions::new()).await;
        assert!(matches!(result, Err(RestError::InvalidRequest(_))));
    }
}
