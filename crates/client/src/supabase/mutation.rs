//! Mutation options for inserts, updates and deletes.

use std::fmt::Display;
use std::time::Duration;

use serde_json::Value;
use url::Url;

use super::error::RestError;
use super::query::table_url;

/// HTTP method of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMethod {
    Post,
    Patch,
    Delete,
}

impl MutationMethod {
    #[must_use]
    pub fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Post => reqwest::Method::POST,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl std::fmt::Display for MutationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        })
    }
}

/// Options for [`SupabaseClient::mutate`](super::SupabaseClient::mutate).
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOptions {
    pub method: MutationMethod,
    pub body: Option<Value>,
    /// Row filters for PATCH and DELETE.
    pub eq: Vec<(String, String)>,
    /// Ask the server to return the affected rows.
    pub returning: bool,
    pub timeout: Option<Duration>,
}

impl MutationOptions {
    /// Insert `body` (an object or array of objects).
    #[must_use]
    pub const fn insert(body: Value) -> Self {
        Self {
            method: MutationMethod::Post,
            body: Some(body),
            eq: Vec::new(),
            returning: false,
            timeout: None,
        }
    }

    /// Patch rows matching the filters with `body`.
    #[must_use]
    pub const fn update(body: Value) -> Self {
        Self {
            method: MutationMethod::Patch,
            body: Some(body),
            eq: Vec::new(),
            returning: false,
            timeout: None,
        }
    }

    /// Delete rows matching the filters.
    #[must_use]
    pub const fn delete() -> Self {
        Self {
            method: MutationMethod::Delete,
            body: None,
            eq: Vec::new(),
            returning: false,
            timeout: None,
        }
    }

    /// Add a `column=eq.value` row filter.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Display) -> Self {
        self.eq.push((column.into(), value.to_string()));
        self
    }

    #[must_use]
    pub const fn returning(mut self) -> Self {
        self.returning = true;
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Value for the `Prefer` header.
    #[must_use]
    pub const fn prefer_header(&self) -> &'static str {
        if self.returning {
            "return=representation"
        } else {
            "return=minimal"
        }
    }

    /// Build `<rest_base>/<table>?<col>=eq.<val>`.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::InvalidRequest`] for an invalid table name.
    pub fn to_url(&self, rest_base: &Url, table: &str) -> Result<Url, RestError> {
        let mut url = table_url(rest_base, table)?;
        if !self.eq.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (column, value) in &self.eq {
                pairs.append_pair(column, &format!("eq.{value}"));
            }
        }
        Ok(url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_prefer_header() {
        let minimal = MutationOptions::delete();
        assert_eq!(minimal.prefer_header(), "return=minimal");
        assert_eq!(minimal.returning().prefer_header(), "return=representation");
    }

    #[test]
    fn test_update_url_has_filters() {
        let base = Url::parse("https://abc.supabase.co/rest/v1/").unwrap();
        let url = MutationOptions::update(json!({"status": "answered"}))
            .eq("id", "8f14e45f-ceea-467a-9af0-2c1f6b4d3e21")
            .to_url(&base, "prayers")
            .unwrap();
        assert_eq!(
            url.query(),
            Some("id=eq.8f14e45f-ceea-467a-9af0-2c1f6b4d3e21")
        );
    }

    #[test]
    fn test_insert_url_has_no_query() {
        let base = Url::parse("https://abc.supabase.co/rest/v1/").unwrap();
        let url = MutationOptions::insert(json!({}))
            .to_url(&base, "prayers")
            .unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_method_display() {
        assert_eq!(MutationMethod::Patch.to_string(), "PATCH");
        assert_eq!(MutationMethod::Delete.as_reqwest(), reqwest::Method::DELETE);
    }
}
