//! In-memory [`Backend`] and manual clock for tests.
//!
//! `FakeBackend` keeps rows per table and applies the subset of PostgREST
//! semantics the services use: `eq` filters, `order`, `limit`, column
//! projection, one level of embedding (`prayer_updates(*)` joins on
//! `prayer_id`), exact counts, and insert/patch/delete. Every call is
//! recorded, and errors can be scripted per table or function.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value};

use crate::backend::Backend;
use crate::clock::Clock;
use crate::supabase::{
    FunctionError, MutationMethod, MutationOptions, QueryOptions, QueryResponse, RestError,
};

/// A call received by the fake.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Query { table: String, options: QueryOptions },
    Mutate { table: String, options: MutationOptions },
    Invoke { function: String, body: Value },
}

impl Call {
    /// Table or function name the call targeted.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Query { table, .. } | Self::Mutate { table, .. } => table,
            Self::Invoke { function, .. } => function,
        }
    }
}

type FunctionHandler = Arc<dyn Fn(&Value) -> Result<Value, FunctionError> + Send + Sync>;

#[derive(Default)]
struct FakeState {
    tables: BTreeMap<String, Vec<Value>>,
    calls: Vec<Call>,
    /// Per-table script; `None` lets a call through, `Some` fails it.
    scripts: HashMap<String, VecDeque<Option<RestError>>>,
    functions: HashMap<String, FunctionHandler>,
}

/// In-memory backend with recorded calls and scripted failures.
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl std::fmt::Debug for FakeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("FakeBackend")
            .field("tables", &state.tables.keys().collect::<Vec<_>>())
            .field("calls", &state.calls.len())
            .finish_non_exhaustive()
    }
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Declare `table` with the given rows, replacing any existing rows.
    ///
    /// Tables that were never declared answer with a missing-relation error.
    #[must_use]
    pub fn with_table(self, table: &str, rows: Vec<Value>) -> Self {
        self.seed(table, rows);
        self
    }

    /// Replace the rows of `table`, declaring it if needed.
    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.lock().tables.insert(table.to_string(), rows);
    }

    /// Current rows of `table`.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Fail the next call to `table` with `error`.
    pub fn push_error(&self, table: &str, error: RestError) {
        self.lock()
            .scripts
            .entry(table.to_string())
            .or_default()
            .push_back(Some(error));
    }

    /// Let the next scripted call to `table` through.
    ///
    /// Used ahead of [`push_error`](Self::push_error) to fail a later call.
    pub fn push_ok(&self, table: &str) {
        self.lock()
            .scripts
            .entry(table.to_string())
            .or_default()
            .push_back(None);
    }

    /// Answer calls to `function` with `handler`.
    pub fn on_function<F>(&self, function: &str, handler: F)
    where
        F: Fn(&Value) -> Result<Value, FunctionError> + Send + Sync + 'static,
    {
        self.lock()
            .functions
            .insert(function.to_string(), Arc::new(handler));
    }

    /// All calls received, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Number of calls that targeted `name`.
    #[must_use]
    pub fn calls_to(&self, name: &str) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.target() == name)
            .count()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    fn run_query(&self, table: &str, options: &QueryOptions) -> Result<QueryResponse<Value>, RestError> {
        let mut state = self.lock();
        state.calls.push(Call::Query {
            table: table.to_string(),
            options: options.clone(),
        });
        take_scripted(&mut state, table)?;

        let rows = state.tables.get(table).ok_or_else(|| missing(table))?;
        let mut matched: Vec<&Value> = rows.iter().filter(|r| matches_eq(r, &options.eq)).collect();
        let total = matched.len() as u64;

        if let Some(order) = &options.order {
            matched.sort_by(|a, b| {
                let ordering = compare(a.get(&order.column), b.get(&order.column));
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }
        if let Some(limit) = options.limit {
            matched.truncate(limit);
        }

        let select = options.select.as_deref().unwrap_or("*");
        let projected = matched
            .into_iter()
            .map(|row| project(&state.tables, table, row, select))
            .collect();

        Ok(QueryResponse {
            data: Some(Value::Array(projected)),
            count: options.count.map(|_| total),
        })
    }

    fn run_mutation(&self, table: &str, options: &MutationOptions) -> Result<Option<Value>, RestError> {
        let mut state = self.lock();
        state.calls.push(Call::Mutate {
            table: table.to_string(),
            options: options.clone(),
        });
        take_scripted(&mut state, table)?;

        let rows = state
            .tables
            .get_mut(table)
            .ok_or_else(|| RestError::MutationFailed {
                status: 404,
                message: format!("relation \"public.{table}\" does not exist"),
            })?;
        let affected = match options.method {
            MutationMethod::Post => {
                let new_rows = match options.body.clone() {
                    Some(Value::Array(items)) => items,
                    Some(item @ Value::Object(_)) => vec![item],
                    _ => {
                        return Err(RestError::MutationFailed {
                            status: 400,
                            message: "insert body must be an object or array".to_string(),
                        });
                    }
                };
                let mut inserted = Vec::with_capacity(new_rows.len());
                for mut row in new_rows {
                    if let Value::Object(fields) = &mut row {
                        fields
                            .entry("id")
                            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
                        fields
                            .entry("created_at")
                            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
                    }
                    rows.push(row.clone());
                    inserted.push(row);
                }
                inserted
            }
            MutationMethod::Patch => {
                let patch = match &options.body {
                    Some(Value::Object(patch)) => patch.clone(),
                    _ => Map::new(),
                };
                let mut updated = Vec::new();
                for row in rows.iter_mut().filter(|r| matches_eq(r, &options.eq)) {
                    if let Value::Object(fields) = row {
                        for (key, value) in &patch {
                            fields.insert(key.clone(), value.clone());
                        }
                    }
                    updated.push(row.clone());
                }
                updated
            }
            MutationMethod::Delete => {
                let (removed, kept): (Vec<Value>, Vec<Value>) = std::mem::take(rows)
                    .into_iter()
                    .partition(|r| matches_eq(r, &options.eq));
                *rows = kept;
                removed
            }
        };

        Ok(options.returning.then_some(Value::Array(affected)))
    }

    fn run_function(&self, function: &str, body: &Value) -> Result<Value, FunctionError> {
        let handler = {
            let mut state = self.lock();
            state.calls.push(Call::Invoke {
                function: function.to_string(),
                body: body.clone(),
            });
            state.functions.get(function).cloned()
        };
        match handler {
            Some(handler) => handler(body),
            None => Err(FunctionError::Http {
                function: function.to_string(),
                status: 404,
                message: "Function not found".to_string(),
            }),
        }
    }
}

impl Backend for FakeBackend {
    fn query(
        &self,
        table: &str,
        options: &QueryOptions,
    ) -> impl Future<Output = Result<QueryResponse<Value>, RestError>> + Send {
        std::future::ready(self.run_query(table, options))
    }

    fn mutate(
        &self,
        table: &str,
        options: &MutationOptions,
    ) -> impl Future<Output = Result<Option<Value>, RestError>> + Send {
        std::future::ready(self.run_mutation(table, options))
    }

    fn invoke(
        &self,
        function: &str,
        body: &Value,
    ) -> impl Future<Output = Result<Value, FunctionError>> + Send {
        std::future::ready(self.run_function(function, body))
    }
}

fn take_scripted(state: &mut FakeState, table: &str) -> Result<(), RestError> {
    match state.scripts.get_mut(table).and_then(VecDeque::pop_front) {
        Some(Some(error)) => Err(error),
        _ => Ok(()),
    }
}

fn missing(table: &str) -> RestError {
    RestError::TableNotFound {
        table: table.to_string(),
    }
}

/// Render a JSON scalar the way it appears in a PostgREST filter.
fn filter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches_eq(row: &Value, filters: &[(String, String)]) -> bool {
    filters.iter().all(|(column, expected)| {
        row.get(column)
            .is_some_and(|actual| filter_text(actual) == *expected)
    })
}

fn compare(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(a)), Some(Value::Number(b))) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(a), Some(b)) => filter_text(a).cmp(&filter_text(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Split a select list on top-level commas.
fn split_select(select: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut start = 0;
    for (i, c) in select.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(select.get(start..i).unwrap_or_default().trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(select.get(start..).unwrap_or_default().trim());
    parts.retain(|p| !p.is_empty());
    parts
}

fn project(tables: &BTreeMap<String, Vec<Value>>, table: &str, row: &Value, select: &str) -> Value {
    let Value::Object(fields) = row else {
        return row.clone();
    };
    let mut out = Map::new();
    for item in split_select(select) {
        if item == "*" {
            out.extend(fields.clone());
        } else if let Some((child, inner)) = item.strip_suffix(')').and_then(|s| s.split_once('(')) {
            let foreign_key = format!("{}_id", table.trim_end_matches('s'));
            let parent_id = fields.get("id").map(filter_text).unwrap_or_default();
            let children = tables
                .get(child)
                .map(|rows| {
                    rows.iter()
                        .filter(|r| r.get(&foreign_key).map(filter_text) == Some(parent_id.clone()))
                        .map(|r| project(tables, child, r, inner))
                        .collect()
                })
                .unwrap_or_default();
            out.insert(child.to_string(), Value::Array(children));
        } else if let Some(value) = fields.get(item) {
            out.insert(item.to_string(), value.clone());
        }
    }
    Value::Object(out)
}

// =============================================================================
// ManualClock
// =============================================================================

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::supabase::CountMode;

    fn prayers() -> FakeBackend {
        FakeBackend::new()
            .with_table(
                "prayers",
                vec![
                    json!({"id": "p1", "title": "Healing", "status": "current", "created_at": "2024-01-01"}),
                    json!({"id": "p2", "title": "Job", "status": "answered", "created_at": "2024-01-03"}),
                    json!({"id": "p3", "title": "Travel", "status": "current", "created_at": "2024-01-02"}),
                ],
            )
            .with_table(
                "prayer_updates",
                vec![json!({"id": "u1", "prayer_id": "p1", "content": "Better"})],
            )
    }

    #[tokio::test]
    async fn test_query_filters_orders_and_limits() {
        let backend = prayers();
        let options = QueryOptions::new()
            .select("id")
            .eq("status", "current")
            .order("created_at", false)
            .limit(1)
            .count(CountMode::Exact);

        let response = backend.query("prayers", &options).await.unwrap();
        assert_eq!(response.data, Some(json!([{"id": "p3"}])));
        assert_eq!(response.count, Some(2));
    }

    #[tokio::test]
    async fn test_query_embeds_children() {
        let backend = prayers();
        let options = QueryOptions::new()
            .select("id,prayer_updates(content)")
            .eq("id", "p1");

        let response = backend.query("prayers", &options).await.unwrap();
        assert_eq!(
            response.data,
            Some(json!([{"id": "p1", "prayer_updates": [{"content": "Better"}]}]))
        );
    }

    #[tokio::test]
    async fn test_unknown_table_is_missing_relation() {
        let backend = FakeBackend::new();
        let err = backend.query("nope", &QueryOptions::new()).await.unwrap_err();
        assert!(err.is_table_not_found());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_table_mutation_fails() {
        let backend = FakeBackend::new();
        let err = backend
            .mutate("nope", &MutationOptions::delete().eq("id", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, RestError::MutationFailed { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_scripted_errors_apply_in_order() {
        let backend = prayers();
        backend.push_ok("prayers");
        backend.push_error("prayers", RestError::Network("offline".to_string()));

        assert!(backend.query("prayers", &QueryOptions::new()).await.is_ok());
        assert!(backend.query("prayers", &QueryOptions::new()).await.is_err());
        assert!(backend.query("prayers", &QueryOptions::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_mutations() {
        let backend = prayers();

        let inserted = backend
            .mutate("prayers", &MutationOptions::insert(json!({"title": "New"})).returning())
            .await
            .unwrap()
            .unwrap();
        assert!(inserted[0].get("id").is_some());

        let patched = backend
            .mutate(
                "prayers",
                &MutationOptions::update(json!({"status": "archived"})).eq("id", "p1"),
            )
            .await
            .unwrap();
        assert!(patched.is_none());
        assert_eq!(
            backend.rows("prayers").first().unwrap()["status"],
            json!("archived")
        );

        backend
            .mutate("prayers", &MutationOptions::delete().eq("id", "p2"))
            .await
            .unwrap();
        assert_eq!(backend.rows("prayers").len(), 3);
    }

    #[tokio::test]
    async fn test_functions() {
        let backend = FakeBackend::new();
        backend.on_function("echo", |body| Ok(body.clone()));

        let echoed = backend.invoke("echo", &json!({"a": 1})).await.unwrap();
        assert_eq!(echoed, json!({"a": 1}));

        let missing = backend.invoke("other", &json!({})).await.unwrap_err();
        assert!(matches!(missing, FunctionError::Http { status: 404, .. }));
        assert_eq!(backend.calls_to("echo"), 1);
    }

    #[tokio::test]
    async fn test_function_handler_can_read_backend() {
        let backend = Arc::new(
            FakeBackend::new().with_table("prayers", vec![json!({"id": "p1"})]),
        );
        let inner = Arc::clone(&backend);
        backend.on_function("count-prayers", move |_| {
            Ok(json!({"count": inner.rows("prayers").len(), "calls": inner.calls().len()}))
        });

        let reply = backend.invoke("count-prayers", &json!({})).await.unwrap();
        assert_eq!(reply, json!({"count": 1, "calls": 1}));
    }

    #[test]
    fn test_manual_clock() {
        let start = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(start);
        clock.advance(TimeDelta::minutes(5));
        assert_eq!(clock.now(), start + TimeDelta::minutes(5));
    }
}
