//! Common test utilities for E2E testing with mocks.
//!
//! This module provides a test fixture that creates an in-process server
//! around a real engine with a mock scrape core, enabling end-to-end
//! testing without running the scrape program.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use curator_core::{
    config::{Config, ScanConfig},
    history::{FsAssetCleaner, SqliteHistoryStore},
    queue::{ExecutorConfig, NoopProbe, SqliteQueueJournal},
    rules::MemoryRuleStore,
    testing::MockScrapeCore,
    Engine, EngineParts,
};
use curator_server::{api::create_router, state::AppState};

/// Re-export fixtures for test convenience
pub use curator_core::testing::fixtures;

/// Test fixture for E2E testing with a mock scrape core.
///
/// # Example
///
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_submit() {
///     let fixture = TestFixture::new().await;
///     let file = fixture.media_file("ABC-123.mp4");
///
///     let response = fixture.post("/api/v1/tasks", json!({ "path": file })).await;
///
///     assert_eq!(response.status, 202);
/// }
/// ```
pub struct TestFixture {
    /// The Axum router for testing
    pub router: Router,
    /// The engine behind the router
    pub engine: Arc<Engine>,
    /// Mock scrape core - configure summaries, failures and delays
    pub scrape: Arc<MockScrapeCore>,
    /// Rule store - seed global rules
    pub rules: Arc<MemoryRuleStore>,
    /// Temporary directory for the database, media and output
    pub temp_dir: TempDir,
    /// Directory test media files are created in
    pub media_dir: PathBuf,
    /// Directory scrape output is confined to
    pub output_dir: PathBuf,
}

/// Response from a test request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

impl TestFixture {
    /// Create a new test fixture with a running engine.
    pub async fn new() -> Self {
        Self::with_config(TestConfig::default()).await
    }

    /// Create a test fixture with custom configuration.
    pub async fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.db");
        let media_dir = temp_dir.path().join("media");
        let output_dir = temp_dir.path().join("output");
        std::fs::create_dir_all(&media_dir).expect("Failed to create media dir");
        std::fs::create_dir_all(&output_dir).expect("Failed to create output dir");

        let scrape = Arc::new(MockScrapeCore::new());
        let rules = Arc::new(MemoryRuleStore::default());

        let mut config = Config {
            executor: ExecutorConfig {
                shutdown_grace_secs: 1,
                recovery_check_interval_secs: 3600,
                recency_window_secs: test_config.recency_window_secs,
                ..Default::default()
            },
            scan: ScanConfig::default(),
            ..Default::default()
        };
        config.database.path = db_path.clone();
        if test_config.enable_scheduler {
            config.scheduler.enabled = true;
            config.scheduler.root = Some(media_dir.clone());
        }

        let parts = EngineParts {
            rules: rules.clone(),
            history: Arc::new(
                SqliteHistoryStore::new(&db_path).expect("Failed to create history store"),
            ),
            journal: Arc::new(
                SqliteQueueJournal::new(&db_path).expect("Failed to create journal"),
            ),
            scrape: scrape.clone(),
            cleaner: Arc::new(FsAssetCleaner::confined_to(output_dir.clone())),
            probe: Arc::new(NoopProbe),
        };
        let engine = Arc::new(Engine::new(&config, parts).expect("Failed to build engine"));
        if test_config.start_engine {
            engine.start().expect("Failed to start engine");
        }

        let state = Arc::new(AppState::new(config, Arc::clone(&engine)));
        let router = create_router(state);

        Self {
            router,
            engine,
            scrape,
            rules,
            temp_dir,
            media_dir,
            output_dir,
        }
    }

    /// Create a media file and return its absolute path as a string.
    pub fn media_file(&self, relative: &str) -> String {
        let path = self.media_dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create media subdir");
        }
        std::fs::write(&path, b"media").expect("Failed to write media file");
        path.to_string_lossy().into_owned()
    }

    /// Submit one file and return the new task id.
    pub async fn submit(&self, relative: &str) -> String {
        let path = self.media_file(relative);
        let response = self.post("/api/v1/tasks", json!({ "path": path })).await;
        assert_eq!(response.status, StatusCode::ACCEPTED, "{}", response.body);
        response.body["outcomes"][0]["task_id"]
            .as_str()
            .expect("task_id missing")
            .to_string()
    }

    /// Poll history until the task has a record.
    pub async fn wait_for_history(&self, task_id: &str, timeout: Duration) -> Option<Value> {
        let start = std::time::Instant::now();
        while start.elapsed() < timeout {
            let response = self.get(&format!("/api/v1/history/{}", task_id)).await;
            if response.status == StatusCode::OK {
                return Some(response.body);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        None
    }

    /// Send a GET request to the test server.
    pub async fn get(&self, path: &str) -> TestResponse {
        self.request("GET", path, None).await
    }

    /// Send a POST request with JSON body.
    pub async fn post(&self, path: &str, body: Value) -> TestResponse {
        self.request("POST", path, Some(body)).await
    }

    /// Send a POST request without a body.
    pub async fn post_empty(&self, path: &str) -> TestResponse {
        self.request("POST", path, None).await
    }

    /// Send a PUT request with JSON body.
    pub async fn put(&self, path: &str, body: Value) -> TestResponse {
        self.request("PUT", path, Some(body)).await
    }

    /// Send a DELETE request.
    pub async fn delete(&self, path: &str) -> TestResponse {
        self.request("DELETE", path, None).await
    }

    /// Send a POST request with raw string body (for testing malformed JSON).
    pub async fn post_raw(&self, path: &str, body: &str) -> TestResponse {
        let request = Request::builder()
            .method("POST")
            .uri(path)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Send a GET request and return the raw body text.
    pub async fn get_text(&self, path: &str) -> (StatusCode, String) {
        let request = Request::builder().uri(path).body(Body::empty()).unwrap();
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Send a request to the test server.
    async fn request(&self, method: &str, path: &str, body: Option<Value>) -> TestResponse {
        let mut request_builder = Request::builder().method(method).uri(path);

        let body = if let Some(json_body) = body {
            request_builder = request_builder.header("Content-Type", "application/json");
            Body::from(serde_json::to_vec(&json_body).unwrap())
        } else {
            Body::empty()
        };

        self.send(request_builder.body(body).unwrap()).await
    }

    async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to collect body")
            .to_bytes();

        let body: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        TestResponse { status, body }
    }
}

/// Configuration for test fixture.
#[derive(Debug, Clone)]
pub struct TestConfig {
    /// Start workers; when false, submissions stay queued
    pub start_engine: bool,
    /// Enable the sweep scheduler over the media directory
    pub enable_scheduler: bool,
    pub recency_window_secs: Option<u64>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            start_engine: true,
            enable_scheduler: false,
            recency_window_secs: None,
        }
    }
}

impl TestConfig {
    /// Engine built but not started, so work stays queued.
    pub fn paused() -> Self {
        Self {
            start_engine: false,
            ..Default::default()
        }
    }

    /// Scheduler enabled over the media directory, engine paused.
    pub fn with_scheduler() -> Self {
        Self {
            start_engine: false,
            enable_scheduler: true,
            ..Default::default()
        }
    }
}

/// Helper to assert a response has expected status.
#[macro_export]
macro_rules! assert_status {
    ($response:expr, $status:expr) => {
        assert_eq!(
            $response.status, $status,
            "Expected status {:?}, got {:?}. Body: {}",
            $status,
            $response.status,
            serde_json::to_string_pretty(&$response.body).unwrap_or_default()
        );
    };
}

/// Helper to assert a JSON path equals expected value.
#[macro_export]
macro_rules! assert_json_path {
    ($json:expr, $path:expr, $expected:expr) => {
        let actual = &$json[$path];
        assert_eq!(
            actual, &$expected,
            "Path '{}' expected {:?}, got {:?}",
            $path, $expected, actual
        );
    };
}
