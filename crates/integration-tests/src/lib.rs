//! Integration tests for Prayerline.
//!
//! The tests drive the real [`SupabaseClient`] over HTTP against a
//! scripted stand-in for the Supabase endpoints, served by axum on an
//! ephemeral localhost port. Nothing outside the test process is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p prayerline-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `rest_helper` - query/mutation/function plumbing and error mapping
//! - `branding_refresh` - metadata-gated branding refresh over HTTP
//! - `admin_session` - sign-in, blocked check and session restore
//!
//! # Example
//!
//! ```rust,no_run
//! use axum::http::Method;
//! use prayerline_integration_tests::{Reply, TestServer};
//! use serde_json::json;
//!
//! # async fn demo() {
//! let server = TestServer::start().await;
//! server.on(Method::GET, "/rest/v1/prayers", Reply::json(json!([])));
//! let client = server.client();
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use prayerline_client::{SupabaseClient, SupabaseConfig};
use serde_json::Value;
use tokio::task::JoinHandle;
use url::Url;

/// Anon key handed to clients built by [`TestServer`].
pub const TEST_ANON_KEY: &str = "test-anon-key-8f2c1d9e4b7a";

/// Default client timeout for tests; short so timeout tests stay fast.
pub const TEST_TIMEOUT: Duration = Duration::from_millis(500);

/// A canned HTTP response.
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: String,
    delay: Option<Duration>,
}

impl Reply {
    /// `200 OK` with a JSON body.
    #[must_use]
    pub fn json(value: Value) -> Self {
        Self::status(200)
            .with_body(value.to_string())
            .with_header("content-type", "application/json")
    }

    /// A response with the given status and an empty body.
    ///
    /// # Panics
    ///
    /// Panics if `code` is not a valid HTTP status.
    #[must_use]
    pub fn status(code: u16) -> Self {
        Self {
            status: StatusCode::from_u16(code).expect("valid status code"),
            headers: HeaderMap::new(),
            body: String::new(),
            delay: None,
        }
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// # Panics
    ///
    /// Panics if `name` or `value` is not a valid header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(
            HeaderName::from_bytes(name.as_bytes()).expect("valid header name"),
            HeaderValue::from_str(value).expect("valid header value"),
        );
        self
    }

    /// Hold the response back for `delay`.
    #[must_use]
    pub const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// A request as the server received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: String,
}

impl RecordedRequest {
    /// Decoded query string pairs, in order.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.query
            .as_deref()
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .into_owned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Value of the first query parameter named `name`.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<String> {
        self.query_pairs()
            .into_iter()
            .find_map(|(k, v)| (k == name).then_some(v))
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The body parsed as JSON (`Null` when empty).
    ///
    /// # Panics
    ///
    /// Panics if the body is not JSON.
    #[must_use]
    pub fn json(&self) -> Value {
        if self.body.is_empty() {
            return Value::Null;
        }
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

type RouteKey = (Method, String);

#[derive(Debug, Default)]
struct Routes {
    /// One-shot replies, served before the standing reply.
    queued: HashMap<RouteKey, VecDeque<Reply>>,
    standing: HashMap<RouteKey, Reply>,
}

#[derive(Debug, Default)]
struct ServerState {
    routes: Mutex<Routes>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// Scripted Supabase stand-in.
///
/// Unrouted requests get a `404` with a PostgREST-shaped body that does
/// not carry a missing-relation code.
#[derive(Debug)]
pub struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Bind `127.0.0.1:0` and start serving.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound.
    pub async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");

        let state = Arc::new(ServerState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());
        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log_server_exit(&e);
            }
        });

        Self { addr, state, task }
    }

    /// Base URL of the server (the Supabase project URL).
    ///
    /// # Panics
    ///
    /// Panics if the address does not form a URL.
    #[must_use]
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.addr)).expect("server URL")
    }

    /// Config pointing at this server with [`TEST_TIMEOUT`].
    #[must_use]
    pub fn config(&self) -> SupabaseConfig {
        let mut config = SupabaseConfig::new(self.url(), TEST_ANON_KEY);
        config.request_timeout = TEST_TIMEOUT;
        config
    }

    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn client(&self) -> SupabaseClient {
        SupabaseClient::new(&self.config()).expect("build client")
    }

    /// Answer every `method path` request with `reply`.
    pub fn on(&self, method: Method, path: &str, reply: Reply) {
        lock(&self.state.routes)
            .standing
            .insert((method, path.to_string()), reply);
    }

    /// Answer the next `method path` request with `reply`, ahead of any
    /// standing reply.
    pub fn once(&self, method: Method, path: &str, reply: Reply) {
        lock(&self.state.routes)
            .queued
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state.requests).clone()
    }

    /// Requests received for `path`.
    #[must_use]
    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        lock(&self.state.requests)
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn clear_requests(&self) {
        lock(&self.state.requests).clear();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A config whose URL refuses connections.
///
/// # Panics
///
/// Panics if no ephemeral port can be reserved.
pub async fn unreachable_config() -> SupabaseConfig {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    let addr = listener.local_addr().expect("probe address");
    drop(listener);

    let url = Url::parse(&format!("http://{addr}")).expect("probe URL");
    let mut config = SupabaseConfig::new(url, TEST_ANON_KEY);
    config.request_timeout = TEST_TIMEOUT;
    config
}

/// PostgREST body for a missing relation.
#[must_use]
pub fn missing_table_body(table: &str) -> String {
    serde_json::json!({
        "code": "42P01",
        "message": format!("relation \"public.{table}\" does not exist"),
        "details": null,
        "hint": null,
    })
    .to_string()
}

async fn handle(
    State(state): State<Arc<ServerState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let path = uri.path().to_string();
    lock(&state.requests).push(RecordedRequest {
        method: method.clone(),
        path: path.clone(),
        query: uri.query().map(str::to_string),
        headers,
        body,
    });

    let reply = {
        let mut routes = lock(&state.routes);
        let key = (method, path);
        let queued = routes.queued.get_mut(&key).and_then(VecDeque::pop_front);
        queued.or_else(|| routes.standing.get(&key).cloned())
    };

    let Some(reply) = reply else {
        return (
            StatusCode::NOT_FOUND,
            r#"{"code":"PGRST000","message":"no route"}"#,
        )
            .into_response();
    };

    if let Some(delay) = reply.delay {
        tokio::time::sleep(delay).await;
    }
    (reply.status, reply.headers, reply.body).into_response()
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[allow(clippy::print_stderr)]
fn log_server_exit(e: &std::io::Error) {
    eprintln!("test server stopped: {e}");
}
