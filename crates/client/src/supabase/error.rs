//! Supabase REST and Edge Function errors.
//!
//! Every failure of the REST helper is returned as a value; nothing on
//! the request path panics. Callers check the `Result` and can branch on
//! the variant (missing schema vs. timeout vs. HTTP failure).

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Postgres error code for "relation does not exist".
pub const PG_UNDEFINED_TABLE: &str = "42P01";

/// PostgREST error code for a table missing from the schema cache.
pub const PGRST_TABLE_NOT_FOUND: &str = "PGRST205";

/// Errors returned by [`SupabaseClient::query`](super::SupabaseClient::query)
/// and [`SupabaseClient::mutate`](super::SupabaseClient::mutate).
#[derive(Debug, Clone, Error)]
pub enum RestError {
    /// A query did not complete within its timeout.
    #[error("Query on {table} timed out after {}ms", .after.as_millis())]
    QueryTimeout { table: String, after: Duration },

    /// A mutation did not complete within its timeout.
    #[error("Operation timed out")]
    MutationTimeout { table: String },

    /// The target relation does not exist in the database.
    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    /// A query returned a non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// A mutation returned a non-success status.
    #[error("Mutation failed: {status} {message}")]
    MutationFailed { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The request never produced a response (DNS, connect, TLS).
    #[error("Network error: {0}")]
    Network(String),

    /// The request could not be built (bad table name, header value).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl RestError {
    /// Whether the call was cut off by its timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::QueryTimeout { .. } | Self::MutationTimeout { .. })
    }

    /// Whether the target table is missing from the schema.
    #[must_use]
    pub const fn is_table_not_found(&self) -> bool {
        matches!(self, Self::TableNotFound { .. })
    }

    /// Whether the failure looks like connectivity rather than a server answer.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::QueryTimeout { .. } | Self::MutationTimeout { .. }
        )
    }

    /// HTTP status of the failed response, if there was one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::MutationFailed { status, .. } => Some(*status),
            Self::TableNotFound { .. } => Some(404),
            _ => None,
        }
    }
}

/// Errors returned by [`SupabaseClient::invoke`](super::SupabaseClient::invoke).
#[derive(Debug, Clone, Error)]
pub enum FunctionError {
    /// The function did not answer within the timeout.
    #[error("Function {function} timed out")]
    Timeout { function: String },

    /// The function answered with a non-success status.
    #[error("Function {function} failed ({status}): {message}")]
    Http {
        function: String,
        status: u16,
        message: String,
    },

    /// The function's response body could not be decoded.
    #[error("Failed to parse {function} response: {message}")]
    Parse { function: String, message: String },

    /// The request never produced a response.
    #[error("Network error calling {function}: {message}")]
    Network { function: String, message: String },

    /// The request could not be built.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FunctionError {
    /// Whether the failure looks like connectivity rather than a server answer.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }
}

/// PostgREST error body (`{"code", "message", "details", "hint"}`).
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PostgrestErrorBody {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl PostgrestErrorBody {
    pub(crate) fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    /// Whether the body carries a missing-relation signature.
    pub(crate) fn is_missing_relation(&self, raw: &str) -> bool {
        matches!(
            self.code.as_deref(),
            Some(PG_UNDEFINED_TABLE | PGRST_TABLE_NOT_FOUND)
        ) || raw.contains(PG_UNDEFINED_TABLE)
    }

    /// Best human-readable message: the JSON `message`, else the raw body.
    pub(crate) fn message_or(self, raw: &str) -> String {
        self.message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| truncate(raw, 200))
    }
}

/// Classify a non-success query response.
///
/// A body carrying the Postgres `42P01` (or PostgREST `PGRST205`) signature
/// is reported as [`RestError::TableNotFound`]; everything else is a plain
/// HTTP error.
pub(crate) fn classify_query_failure(table: &str, status: u16, body: &str) -> RestError {
    let parsed = PostgrestErrorBody::parse(body);
    if (status == 404 || status == 400) && parsed.is_missing_relation(body) {
        return RestError::TableNotFound {
            table: table.to_string(),
        };
    }
    RestError::Http {
        status,
        message: parsed.message_or(body),
    }
}

/// Classify a non-success mutation response.
///
/// Every failed mutation is [`RestError::MutationFailed`], including one
/// against a missing table; only queries report [`RestError::TableNotFound`].
pub(crate) fn classify_mutation_failure(status: u16, body: &str) -> RestError {
    RestError::MutationFailed {
        status,
        message: PostgrestErrorBody::parse(body).message_or(body),
    }
}

/// Message for a failed function call, preferring the JSON `error` field.
pub(crate) fn function_error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        message: Option<String>,
    }

    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| truncate(body, 200))
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Heuristic check for connectivity failures.
///
/// Returns `true` when the error text contains "failed to fetch",
/// "network" or "timeout" (case-insensitive), and `false` for `None` or
/// unrelated text. Used to decide between an offline notice and a generic
/// error message.
///
/// ```
/// use prayerline_client::supabase::is_network_error;
///
/// assert!(is_network_error(Some("TypeError: Failed to fetch")));
/// assert!(!is_network_error(Some("duplicate key value")));
/// assert!(!is_network_error::<str>(None));
/// ```
#[must_use]
pub fn is_network_error<E: fmt::Display + ?Sized>(err: Option<&E>) -> bool {
    let Some(err) = err else {
        return false;
    };
    let text = err.to_string().to_lowercase();
    ["failed to fetch", "network", "timeout"]
        .iter()
        .any(|needle| text.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_relation_by_code() {
        let body = r#"{"code":"42P01","message":"relation \"public.prayers\" does not exist"}"#;
        let err = classify_query_failure("prayers", 404, body);
        assert!(err.is_table_not_found());
        assert!(err.to_string().to_lowercase().contains("table not found"));
    }

    #[test]
    fn test_missing_relation_by_postgrest_code() {
        let body = r#"{"code":"PGRST205","message":"Could not find the table 'public.x'"}"#;
        assert!(classify_query_failure("x", 404, body).is_table_not_found());
    }

    #[test]
    fn test_missing_relation_only_on_404_or_400() {
        let body = r#"{"code":"42P01","message":"relation does not exist"}"#;
        assert!(classify_query_failure("x", 400, body).is_table_not_found());
        assert!(matches!(
            classify_query_failure("x", 500, body),
            RestError::Http { status: 500, .. }
        ));
    }

    #[test]
    fn test_plain_404_is_http_error() {
        let err = classify_query_failure("prayers", 404, "Not Found");
        assert!(matches!(err, RestError::Http { status: 404, .. }));
        assert!(!err.to_string().to_lowercase().contains("table not found"));
    }

    #[test]
    fn test_server_error_uses_json_message() {
        let body = r#"{"code":"XX000","message":"boom"}"#;
        let err = classify_query_failure("prayers", 500, body);
        assert_eq!(err.to_string(), "HTTP 500: boom");
    }

    #[test]
    fn test_mutation_failure_message() {
        let err = classify_mutation_failure(409, "duplicate key");
        assert_eq!(err.to_string(), "Mutation failed: 409 duplicate key");
        assert_eq!(err.status(), Some(409));
    }

    #[test]
    fn test_mutation_on_missing_table_is_mutation_failure() {
        let body = r#"{"code":"42P01","message":"relation \"public.prayers\" does not exist"}"#;
        let err = classify_mutation_failure(404, body);
        assert!(!err.is_table_not_found());
        assert!(matches!(err, RestError::MutationFailed { status: 404, .. }));
        assert!(err.to_string().starts_with("Mutation failed: 404"));
    }

    #[test]
    fn test_timeout_messages() {
        let query = RestError::QueryTimeout {
            table: "prayers".to_string(),
            after: Duration::from_millis(5000),
        };
        assert!(query.to_string().contains("timed out"));
        assert!(query.is_timeout());

        let mutation = RestError::MutationTimeout {
            table: "prayers".to_string(),
        };
        assert_eq!(mutation.to_string(), "Operation timed out");
    }

    #[test]
    fn test_function_error_message_prefers_error_field() {
        assert_eq!(
            function_error_message(r#"{"error":"Invalid code"}"#),
            "Invalid code"
        );
        assert_eq!(function_error_message("plain text"), "plain text");
    }

    #[test]
    fn test_is_network_error_none() {
        assert!(!is_network_error::<str>(None));
        assert!(!is_network_error::<RestError>(None));
    }

    #[test]
    fn test_is_network_error_matches_case_insensitively() {
        assert!(is_network_error(Some("Failed to fetch")));
        assert!(is_network_error(Some("NETWORK request failed")));
        assert!(is_network_error(Some("Request Timeout")));
    }

    #[test]
    fn test_is_network_error_unrelated_text() {
        assert!(!is_network_error(Some("permission denied for table prayers")));
        assert!(!is_network_error(Some("")));
    }

    #[test]
    fn test_is_network_error_on_rest_errors() {
        let network = RestError::Network("connection refused".to_string());
        assert!(is_network_error(Some(&network)));

        let timeout = RestError::MutationTimeout {
            table: "prayers".to_string(),
        };
        // "Operation timed out" carries no "timeout" substring; the variant check covers it
        assert!(!is_network_error(Some(&timeout)));
        assert!(timeout.is_network());

        let http = RestError::Http {
            status: 500,
            message: "boom".to_string(),
        };
        assert!(!is_network_error(Some(&http)));
    }
}
