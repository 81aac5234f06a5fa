//! Declarative query options and PostgREST URL construction.

use std::fmt::Display;
use std::time::Duration;

use url::Url;

use super::error::RestError;

/// Sort order for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Row-count strategy requested through the `Prefer` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMode {
    Exact,
    Planned,
    Estimated,
}

impl CountMode {
    /// Value for the `Prefer` header.
    #[must_use]
    pub const fn prefer_header(self) -> &'static str {
        match self {
            Self::Exact => "count=exact",
            Self::Planned => "count=planned",
            Self::Estimated => "count=estimated",
        }
    }
}

/// Options for [`SupabaseClient::query`](super::SupabaseClient::query).
///
/// ```
/// use prayerline_client::supabase::QueryOptions;
///
/// let options = QueryOptions::new()
///     .select("id,title")
///     .eq("status", "current")
///     .order("created_at", false)
///     .limit(20);
/// assert_eq!(options.limit, Some(20));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    /// Column list; `*` when unset.
    pub select: Option<String>,
    /// Equality filters in insertion order.
    pub eq: Vec<(String, String)>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
    pub count: Option<CountMode>,
    /// Per-call timeout overriding the client default.
    pub timeout: Option<Duration>,
}

impl QueryOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn select(mut self, columns: impl Into<String>) -> Self {
        self.select = Some(columns.into());
        self
    }

    /// Add a `column=eq.value` filter.
    #[must_use]
    pub fn eq(mut self, column: impl Into<String>, value: impl Display) -> Self {
        self.eq.push((column.into(), value.to_string()));
        self
    }

    #[must_use]
    pub fn order(mut self, column: impl Into<String>, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.into(),
            ascending,
        });
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub const fn count(mut self, mode: CountMode) -> Self {
        self.count = Some(mode);
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build `<rest_base>/<table>?select=..&<col>=eq.<val>&order=..&limit=..`.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::InvalidRequest`] if the table name is empty or
    /// contains a path separator.
    pub fn to_url(&self, rest_base: &Url, table: &str) -> Result<Url, RestError> {
        let mut url = table_url(rest_base, table)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("select", self.select.as_deref().unwrap_or("*"));
            for (column, value) in &self.eq {
                pairs.append_pair(column, &format!("eq.{value}"));
            }
            if let Some(order) = &self.order {
                let direction = if order.ascending { "asc" } else { "desc" };
                pairs.append_pair("order", &format!("{}.{direction}", order.column));
            }
            if let Some(limit) = self.limit {
                pairs.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }
}

/// Successful query result.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse<T> {
    /// Decoded body; `None` when the body was empty.
    pub data: Option<T>,
    /// Total row count from `Content-Range`, when requested and reported.
    pub count: Option<u64>,
}

/// Join a table name onto the REST base URL.
///
/// Names are limited to ASCII letters, digits and `_`, so a name can never
/// rewrite the path, query or fragment of the resolved URL.
pub(crate) fn table_url(rest_base: &Url, table: &str) -> Result<Url, RestError> {
    if table.is_empty()
        || !table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(RestError::InvalidRequest(format!(
            "invalid table name: {table:?}"
        )));
    }
    rest_base
        .join(table)
        .map_err(|e| RestError::InvalidRequest(e.to_string()))
}

/// Parse the total from a `Content-Range` header (`0-9/42`, `*/0`).
///
/// Returns `None` when the total is unknown (`0-9/*`) or the header is
/// malformed.
#[must_use]
pub fn parse_content_range(header: &str) -> Option<u64> {
    let (_, total) = header.trim().rsplit_once('/')?;
    total.parse().ok()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://abc.supabase.co/rest/v1/").unwrap()
    }

    fn pairs(url: &Url) -> Vec<(String, String)> {
        url.query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn test_url_defaults_to_select_star() {
        let url = QueryOptions::new().to_url(&base(), "prayers").unwrap();
        assert_eq!(url.path(), "/rest/v1/prayers");
        assert_eq!(pairs(&url), vec![("select".to_string(), "*".to_string())]);
    }

    #[test]
    fn test_url_with_all_options() {
        let url = QueryOptions::new()
            .select("id,title")
            .eq("status", "current")
            .eq("approval_status", "approved")
            .order("created_at", false)
            .limit(10)
            .to_url(&base(), "prayers")
            .unwrap();

        assert_eq!(
            pairs(&url),
            vec![
                ("select".to_string(), "id,title".to_string()),
                ("status".to_string(), "eq.current".to_string()),
                ("approval_status".to_string(), "eq.approved".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "10".to_string()),
            ]
        );
    }

    #[test]
    fn test_url_ascending_order() {
        let url = QueryOptions::new()
            .order("title", true)
            .to_url(&base(), "prayers")
            .unwrap();
        assert!(pairs(&url).contains(&("order".to_string(), "title.asc".to_string())));
    }

    #[test]
    fn test_eq_values_are_encoded() {
        let url = QueryOptions::new()
            .eq("email", "a+b@example.com")
            .to_url(&base(), "email_subscribers")
            .unwrap();
        assert!(!url.as_str().contains("a+b@"));
        assert!(pairs(&url).contains(&("email".to_string(), "eq.a+b@example.com".to_string())));
    }

    #[test]
    fn test_invalid_table_name() {
        assert!(QueryOptions::new().to_url(&base(), "").is_err());
        assert!(QueryOptions::new().to_url(&base(), "../auth").is_err());
        for name in ["..", "prayers#frag", "http:evil", "a.b", "prayers?x=1", "pray ers"] {
            assert!(
                QueryOptions::new().to_url(&base(), name).is_err(),
                "{name:?} should be rejected"
            );
        }
        let url = QueryOptions::new()
            .to_url(&base(), "prayer_updates2")
            .unwrap();
        assert_eq!(url.path(), "/rest/v1/prayer_updates2");
    }

    #[test]
    fn test_parse_content_range() {
        assert_eq!(parse_content_range("0-9/42"), Some(42));
        assert_eq!(parse_content_range("*/0"), Some(0));
        assert_eq!(parse_content_range("0-9/*"), None);
        assert_eq!(parse_content_range("garbage"), None);
    }

    #[test]
    fn test_count_prefer_header() {
        assert_eq!(CountMode::Exact.prefer_header(), "count=exact");
        assert_eq!(CountMode::Planned.prefer_header(), "count=planned");
    }
}
