//! Request dispatcher.
//!
//! Resolves each request to a fixture and either replays it after the
//! route's artificial delay, or answers 404 and leaves an empty placeholder
//! fixture behind for the user to fill in.

use crate::config::{GlobalSettings, RouteConfig};
use crate::delay::delay_time_in_ms;
use crate::error::DispatchError;
use crate::fixture::FixtureRecord;
use crate::key::{mock_path, FixtureKey, RequestView};
use crate::replay::replay;
use crate::store::FixtureStore;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use http_body::Body;
use http_body_util::{BodyExt, Full};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Replays recorded fixtures for incoming requests.
pub struct MockDispatcher {
    store: Arc<dyn FixtureStore>,
    settings: GlobalSettings,
    /// Detached placeholder writes
    pending_writes: TaskTracker,
    /// Total requests processed.
    requests_total: AtomicU64,
    /// Requests answered from a fixture.
    requests_mocked: AtomicU64,
    /// Requests without a fixture.
    requests_missed: AtomicU64,
    /// Requests that failed with a dispatch error.
    requests_failed: AtomicU64,
}

impl MockDispatcher {
    pub fn new(store: Arc<dyn FixtureStore>, settings: GlobalSettings) -> Self {
        Self {
            store,
            settings,
            pending_writes: TaskTracker::new(),
            requests_total: AtomicU64::new(0),
            requests_mocked: AtomicU64::new(0),
            requests_missed: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
        }
    }

    /// Get total requests processed.
    pub fn total_requests(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Get total requests replayed from a fixture.
    pub fn total_mocked(&self) -> u64 {
        self.requests_mocked.load(Ordering::Relaxed)
    }

    /// Get total requests without a fixture.
    pub fn total_missed(&self) -> u64 {
        self.requests_missed.load(Ordering::Relaxed)
    }

    /// Get total requests that failed.
    pub fn total_failed(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    /// Wait for every placeholder write started so far.
    pub async fn flush(&self) {
        self.pending_writes.close();
        self.pending_writes.wait().await;
        self.pending_writes.reopen();
    }

    /// Answer `request` from the fixture store.
    ///
    /// The body is only read when the route hashes the full request.
    pub async fn handle_request<B>(
        &self,
        request: Request<B>,
        route: &RouteConfig,
    ) -> Result<Response<Full<Bytes>>, DispatchError>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let result = self.dispatch(request, route).await;
        if let Err(e) = &result {
            self.requests_failed.fetch_add(1, Ordering::Relaxed);
            error!(route = %route.name, error = %e, "Failed to serve request");
        }
        result
    }

    async fn dispatch<B>(
        &self,
        request: Request<B>,
        route: &RouteConfig,
    ) -> Result<Response<Full<Bytes>>, DispatchError>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = request.into_parts();
        let url = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());

        let mut view = RequestView::new(parts.method.as_str(), url);
        if route.hash_full_request {
            let collected = body
                .collect()
                .await
                .map_err(|e| DispatchError::BodyCapture(e.into()))?;
            view.body = Some(collected.to_bytes());
        }

        let key = mock_path(route, &view);

        let exists = self
            .store
            .exists(&key)
            .await
            .map_err(|source| DispatchError::Storage {
                key: key.path().to_path_buf(),
                source,
            })?;

        if exists {
            self.mock_response(&key, &view, route).await
        } else {
            Ok(self.respond_missing(key, &view, route))
        }
    }

    async fn mock_response(
        &self,
        key: &FixtureKey,
        view: &RequestView,
        route: &RouteConfig,
    ) -> Result<Response<Full<Bytes>>, DispatchError> {
        // Delay with some fake time so the mock behaves like a real API.
        let delay_ms = delay_time_in_ms(route.delay.as_ref());
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let bytes = self
            .store
            .read(key)
            .await
            .map_err(|source| DispatchError::Storage {
                key: key.path().to_path_buf(),
                source,
            })?;
        let response = replay(&bytes).map_err(|source| DispatchError::Malformed {
            key: key.path().to_path_buf(),
            source,
        })?;

        self.requests_mocked.fetch_add(1, Ordering::Relaxed);

        if delay_ms > 0 {
            debug!(delay_ms, url = %view.url, "Mock response delayed");
        }
        info!(url = %view.url, path = %key, "Dispatching request");
        if self.settings.log_mocked {
            info!(
                label = "Mocked",
                method = %view.method,
                url = %view.url,
                route = %route.name,
                status = response.status().as_u16(),
                "Request served"
            );
        }

        Ok(response)
    }

    fn respond_missing(
        &self,
        key: FixtureKey,
        view: &RequestView,
        route: &RouteConfig,
    ) -> Response<Full<Bytes>> {
        self.requests_missed.fetch_add(1, Ordering::Relaxed);

        let body = format!("No mock exists for {} - ({})", view.url, key);
        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = StatusCode::NOT_FOUND;
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        if self.settings.log_missed {
            debug!(url = %view.url, route = %route.name, "Returned 404");
        }

        self.persist_placeholder(key.placeholder(), view.url.clone());
        response
    }

    /// Write the empty mock without holding up the response.
    fn persist_placeholder(&self, placeholder: FixtureKey, url: String) {
        let store = Arc::clone(&self.store);
        let log_missed = self.settings.log_missed;

        self.pending_writes.spawn(async move {
            let bytes = match FixtureRecord::placeholder(url.as_str()).to_pretty_json() {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(url = %url, error = %e, "Failed to serialize empty mock");
                    return;
                }
            };
            match store.write(&placeholder, bytes).await {
                Ok(()) if log_missed => {
                    info!(url = %url, path = %placeholder, "Serialized empty 404 response");
                }
                Ok(()) => {}
                Err(e) => {
                    warn!(url = %url, path = %placeholder, error = %e, "Failed to persist empty mock");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::DelaySpec;
    use crate::error::StoreError;
    use crate::fixture::FixtureData;
    use crate::key::KeyStrategy;
    use crate::store::FsFixtureStore;
    use async_trait::async_trait;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::Instant;
    use tempfile::TempDir;
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log lines written while it is the default subscriber.
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn install(&self) -> tracing::subscriber::DefaultGuard {
            let subscriber = tracing_subscriber::fmt()
                .with_max_level(tracing::Level::DEBUG)
                .with_ansi(false)
                .with_writer(self.clone())
                .finish();
            tracing::subscriber::set_default(subscriber)
        }

        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    struct Harness {
        _dir: TempDir,
        route: RouteConfig,
        dispatcher: MockDispatcher,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let route = RouteConfig {
            name: "api".to_string(),
            mocks_path: dir.path().to_path_buf(),
            ..RouteConfig::default()
        };
        let dispatcher =
            MockDispatcher::new(Arc::new(FsFixtureStore::new()), GlobalSettings::default());
        Harness {
            _dir: dir,
            route,
            dispatcher,
        }
    }

    fn get(url: &str) -> Request<Full<Bytes>> {
        Request::get(url).body(Full::new(Bytes::new())).unwrap()
    }

    fn post(url: &str, body: &str) -> Request<Full<Bytes>> {
        Request::post(url)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap()
    }

    fn key_for(route: &RouteConfig, method: &str, url: &str) -> FixtureKey {
        mock_path(route, &RequestView::new(method, url))
    }

    async fn body_text(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn record(key: &FixtureKey, record: &FixtureRecord) {
        FsFixtureStore::new()
            .write(key, record.to_pretty_json().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_miss_returns_404_and_writes_placeholder() {
        let h = harness();
        let key = key_for(&h.route, "GET", "/users/42");

        let response = h
            .dispatcher
            .handle_request(get("/users/42"), &h.route)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/plain");
        assert_eq!(
            body_text(response).await,
            format!("No mock exists for /users/42 - ({})", key)
        );

        h.dispatcher.flush().await;
        let written = std::fs::read(key.placeholder().path()).unwrap();
        let placeholder = FixtureRecord::from_slice(&written).unwrap();
        assert_eq!(placeholder, FixtureRecord::placeholder("/users/42"));
        assert!(!key.path().exists());
        assert_eq!(h.dispatcher.total_missed(), 1);
    }

    #[tokio::test]
    async fn test_hit_replays_fixture() {
        let h = harness();
        let key = key_for(&h.route, "GET", "/users/42?expand=true");
        record(
            &key,
            &FixtureRecord {
                request_url: "/users/42?expand=true".to_string(),
                content_type: "application/json".to_string(),
                status_code: 200,
                data: FixtureData::Structured(serde_json::json!({"id": 42})),
            },
        )
        .await;

        let response = h
            .dispatcher
            .handle_request(get("/users/42?expand=true"), &h.route)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(body_text(response).await, r#"{"id":42}"#);
        assert_eq!(h.dispatcher.total_mocked(), 1);
        assert_eq!(h.dispatcher.total_requests(), 1);
    }

    #[tokio::test]
    async fn test_placeholder_does_not_satisfy_later_lookup() {
        let h = harness();
        for _ in 0..2 {
            let response = h
                .dispatcher
                .handle_request(get("/pending"), &h.route)
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            h.dispatcher.flush().await;
        }
        assert_eq!(h.dispatcher.total_missed(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_misses_leave_valid_placeholder() {
        let h = harness();
        let key = key_for(&h.route, "GET", "/race");

        let (a, b) = tokio::join!(
            h.dispatcher.handle_request(get("/race"), &h.route),
            h.dispatcher.handle_request(get("/race"), &h.route),
        );
        assert_eq!(a.unwrap().status(), StatusCode::NOT_FOUND);
        assert_eq!(b.unwrap().status(), StatusCode::NOT_FOUND);

        h.dispatcher.flush().await;
        let written = std::fs::read(key.placeholder().path()).unwrap();
        assert_eq!(
            FixtureRecord::from_slice(&written).unwrap(),
            FixtureRecord::placeholder("/race")
        );
    }

    #[tokio::test]
    async fn test_delay_holds_response() {
        let mut h = harness();
        h.route.delay = Some(DelaySpec::Millis(80));
        let key = key_for(&h.route, "GET", "/slow");
        record(
            &key,
            &FixtureRecord {
                request_url: "/slow".to_string(),
                content_type: "text/plain".to_string(),
                status_code: 200,
                data: FixtureData::Text("done".to_string()),
            },
        )
        .await;

        let started = Instant::now();
        let response = h
            .dispatcher
            .handle_request(get("/slow"), &h.route)
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(80));
        assert_eq!(body_text(response).await, "done");
    }

    async fn serve_text_fixture(h: &Harness, url: &str) -> Response<Full<Bytes>> {
        let key = key_for(&h.route, "GET", url);
        record(
            &key,
            &FixtureRecord {
                request_url: url.to_string(),
                content_type: "text/plain".to_string(),
                status_code: 200,
                data: FixtureData::Text("ok".to_string()),
            },
        )
        .await;
        h.dispatcher.handle_request(get(url), &h.route).await.unwrap()
    }

    #[tokio::test]
    async fn test_delay_is_logged_when_applied() {
        let mut h = harness();
        h.route.delay = Some(DelaySpec::Millis(80));
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        let response = serve_text_fixture(&h, "/delayed").await;
        assert_eq!(response.status(), StatusCode::OK);

        let output = logs.contents();
        assert!(output.contains("Mock response delayed"), "{}", output);
        assert!(output.contains("delay_ms=80"), "{}", output);
    }

    #[tokio::test]
    async fn test_zero_delay_is_not_logged() {
        for delay in [None, Some(DelaySpec::Millis(0))] {
            let mut h = harness();
            h.route.delay = delay;
            let logs = CapturedLogs::default();
            let _guard = logs.install();

            let response = serve_text_fixture(&h, "/prompt").await;
            assert_eq!(response.status(), StatusCode::OK);

            let output = logs.contents();
            assert!(output.contains("Dispatching request"), "{}", output);
            assert!(!output.contains("Mock response delayed"), "{}", output);
            assert!(!output.contains("delay_ms"), "{}", output);
        }
    }

    #[tokio::test]
    async fn test_log_mocked_only_gates_success_event() {
        let dir = TempDir::new().unwrap();
        let route = RouteConfig {
            name: "api".to_string(),
            mocks_path: dir.path().to_path_buf(),
            ..RouteConfig::default()
        };
        let settings = GlobalSettings {
            log_mocked: false,
            ..GlobalSettings::default()
        };
        let h = Harness {
            _dir: dir,
            route,
            dispatcher: MockDispatcher::new(Arc::new(FsFixtureStore::new()), settings),
        };
        let logs = CapturedLogs::default();
        let _guard = logs.install();

        serve_text_fixture(&h, "/quiet").await;

        let output = logs.contents();
        assert!(output.contains("Dispatching request"), "{}", output);
        assert!(!output.contains("Request served"), "{}", output);
    }

    #[tokio::test]
    async fn test_long_readable_url_still_gets_placeholder() {
        let mut h = harness();
        h.route.key_strategy = KeyStrategy::Readable;
        let url = format!("/search?q={}", "a".repeat(300));
        let key = key_for(&h.route, "GET", &url);

        let response = h
            .dispatcher
            .handle_request(get(&url), &h.route)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        h.dispatcher.flush().await;
        let written = std::fs::read(key.placeholder().path()).unwrap();
        assert_eq!(
            FixtureRecord::from_slice(&written).unwrap(),
            FixtureRecord::placeholder(url.as_str())
        );
    }

    #[tokio::test]
    async fn test_miss_is_not_delayed() {
        let mut h = harness();
        h.route.delay = Some(DelaySpec::Millis(5_000));

        let started = Instant::now();
        let response = h
            .dispatcher
            .handle_request(get("/nothing"), &h.route)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(started.elapsed() < Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn test_full_request_hash_uses_body() {
        let mut h = harness();
        h.route.hash_full_request = true;
        let key = mock_path(
            &h.route,
            &RequestView::new("POST", "/search").with_body("{\"q\":\"rust\"}"),
        );
        record(
            &key,
            &FixtureRecord {
                request_url: "/search".to_string(),
                content_type: "application/json".to_string(),
                status_code: 200,
                data: FixtureData::Structured(serde_json::json!(["crate"])),
            },
        )
        .await;

        let hit = h
            .dispatcher
            .handle_request(post("/search", "{\"q\":\"rust\"}"), &h.route)
            .await
            .unwrap();
        assert_eq!(hit.status(), StatusCode::OK);
        assert_eq!(body_text(hit).await, r#"["crate"]"#);

        let miss = h
            .dispatcher
            .handle_request(post("/search", "{\"q\":\"go\"}"), &h.route)
            .await
            .unwrap();
        assert_eq!(miss.status(), StatusCode::NOT_FOUND);
        h.dispatcher.flush().await;
    }

    #[tokio::test]
    async fn test_malformed_fixture_is_server_error() {
        let h = harness();
        let key = key_for(&h.route, "GET", "/broken");
        FsFixtureStore::new()
            .write(&key, b"{\"statusCode\": 200".to_vec())
            .await
            .unwrap();

        let err = h
            .dispatcher
            .handle_request(get("/broken"), &h.route)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Malformed { .. }));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(h.dispatcher.total_failed(), 1);
    }

    /// Store whose fixture disappears between `exists` and `read`, and
    /// which refuses every write.
    struct VanishingStore;

    #[async_trait]
    impl FixtureStore for VanishingStore {
        async fn exists(&self, _key: &FixtureKey) -> Result<bool, StoreError> {
            Ok(true)
        }

        async fn read(&self, key: &FixtureKey) -> Result<Vec<u8>, StoreError> {
            Err(StoreError::NotFound(key.path().to_path_buf()))
        }

        async fn write(&self, key: &FixtureKey, _bytes: Vec<u8>) -> Result<(), StoreError> {
            Err(StoreError::Write {
                path: key.path().to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            })
        }
    }

    struct EmptyReadOnlyStore;

    #[async_trait]
    impl FixtureStore for EmptyReadOnlyStore {
        async fn exists(&self, _key: &FixtureKey) -> Result<bool, StoreError> {
            Ok(false)
        }

        async fn read(&self, key: &FixtureKey) -> Result<Vec<u8>, StoreError> {
            Err(StoreError::NotFound(key.path().to_path_buf()))
        }

        async fn write(&self, key: &FixtureKey, bytes: Vec<u8>) -> Result<(), StoreError> {
            VanishingStore.write(key, bytes).await
        }
    }

    fn route_in(path: &str) -> RouteConfig {
        RouteConfig {
            name: "api".to_string(),
            mocks_path: PathBuf::from(path),
            ..RouteConfig::default()
        }
    }

    #[tokio::test]
    async fn test_vanished_fixture_is_server_error() {
        let dispatcher = MockDispatcher::new(Arc::new(VanishingStore), GlobalSettings::default());
        let err = dispatcher
            .handle_request(get("/gone"), &route_in("mocks"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Storage {
                source: StoreError::NotFound(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_placeholder_write_failure_keeps_404() {
        let dispatcher =
            MockDispatcher::new(Arc::new(EmptyReadOnlyStore), GlobalSettings::default());
        let response = dispatcher
            .handle_request(get("/readonly"), &route_in("mocks"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        dispatcher.flush().await;
        assert_eq!(dispatcher.total_failed(), 0);
    }
}
