//! End-to-end tests with a mocked scrape core.
//!
//! These tests run the full server stack in-process: router, engine, queue,
//! workers and SQLite history, with only the scrape program replaced.

mod common;

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use curator_core::TaskState;
use common::{fixtures, TestConfig, TestFixture};

const WAIT: Duration = Duration::from_secs(5);

// =============================================================================
// Basic API Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/health").await;
    assert_status!(response, StatusCode::OK);
    assert_json_path!(response.body, "status", json!("ok"));
}

#[tokio::test]
async fn test_config_is_sanitized() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/config").await;
    assert_status!(response, StatusCode::OK);
    assert!(response.body["scrape"]["env"].is_array());
    assert_eq!(response.body["executor"]["workers"], 1);
}

#[tokio::test]
async fn test_status_and_alerts() {
    let fixture = TestFixture::new().await;

    let status = fixture.get("/api/v1/status").await;
    assert_status!(status, StatusCode::OK);
    assert_eq!(status.body["executor"]["running"], true);
    assert_eq!(status.body["executor"]["workers"], 1);
    assert_eq!(status.body["executor"]["halted"], false);
    assert_eq!(status.body["active_alerts"], 0);

    let alerts = fixture.get("/api/v1/alerts").await;
    assert_status!(alerts, StatusCode::OK);
    assert_eq!(alerts.body["alerts"].as_array().unwrap().len(), 0);

    let resume = fixture.post_empty("/api/v1/executor/resume").await;
    assert_status!(resume, StatusCode::OK);
    assert_eq!(resume.body["resumed"], false);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let fixture = TestFixture::new().await;
    fixture.get("/api/v1/health").await;

    let (status, body) = fixture.get_text("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("curator_tasks_queued"));
    assert!(body.contains("curator_http_requests_total"));
}

// =============================================================================
// Submission Tests
// =============================================================================

#[tokio::test]
async fn test_submit_runs_to_history() {
    let fixture = TestFixture::new().await;
    let task_id = fixture.submit("ABC-123.mp4").await;

    let record = fixture
        .wait_for_history(&task_id, WAIT)
        .await
        .expect("task never finished");
    assert_eq!(record["id"], task_id.as_str());
    assert_eq!(record["origin"], "manual");
    assert_eq!(record["state"]["type"], "succeeded");
    assert_eq!(record["state"]["summary"]["identifier"], "ABC-123");
    assert!(record["config_digest"].is_string());

    // The task endpoint falls back to history once the task is terminal.
    let task = fixture.get(&format!("/api/v1/tasks/{}", task_id)).await;
    assert_status!(task, StatusCode::OK);
    assert_eq!(task.body["state"]["type"], "succeeded");
}

#[tokio::test]
async fn test_submit_requires_a_path() {
    let fixture = TestFixture::new().await;
    let response = fixture.post("/api/v1/tasks", json!({})).await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_submit_rejects_relative_and_missing_paths() {
    let fixture = TestFixture::new().await;

    let relative = fixture
        .post("/api/v1/tasks", json!({ "path": "media/a.mp4" }))
        .await;
    assert_status!(relative, StatusCode::BAD_REQUEST);

    let missing = fixture
        .post("/api/v1/tasks", json!({ "path": "/definitely/not/here.mp4" }))
        .await;
    assert_status!(missing, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_submit_rejects_malformed_json() {
    let fixture = TestFixture::new().await;
    let response = fixture.post_raw("/api/v1/tasks", "{ not json").await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_preset_never_enters_queue() {
    let fixture = TestFixture::with_config(TestConfig::paused()).await;
    let path = fixture.media_file("a.mp4");

    let response = fixture
        .post("/api/v1/tasks", json!({ "path": path, "preset": "nope" }))
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
    assert!(response.body["error"].as_str().unwrap().contains("nope"));

    let tasks = fixture.get("/api/v1/tasks").await;
    assert_eq!(tasks.body["queued"], 0);
}

#[tokio::test]
async fn test_duplicate_submission_returns_active_task() {
    let fixture = TestFixture::with_config(TestConfig::paused()).await;
    let task_id = fixture.submit("ABC-123.mp4").await;
    let path = fixture.media_file("ABC-123.mp4");

    let response = fixture.post("/api/v1/tasks", json!({ "path": path })).await;
    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(response.body["queued"], 0);
    assert_eq!(response.body["outcomes"][0]["outcome"], "duplicate_active");
    assert_eq!(response.body["outcomes"][0]["task_id"], task_id.as_str());
}

#[tokio::test]
async fn test_directory_submission_expands_to_files() {
    let fixture = TestFixture::with_config(TestConfig::paused()).await;
    fixture.media_file("season/b.mkv");
    fixture.media_file("season/a.mp4");
    fixture.media_file("season/notes.txt");
    let dir = fixture.media_dir.join("season");

    let response = fixture
        .post("/api/v1/tasks", json!({ "path": dir.to_string_lossy() }))
        .await;
    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(response.body["queued"], 2);

    let tasks = fixture.get("/api/v1/tasks").await;
    let listed = tasks.body["tasks"].as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert!(listed[0]["paths"][0].as_str().unwrap().ends_with("a.mp4"));
    assert!(listed[1]["paths"][0].as_str().unwrap().ends_with("b.mkv"));
    assert_eq!(listed[0]["state"]["type"], "queued");
}

#[tokio::test]
async fn test_recent_success_is_skipped_unless_forced() {
    let fixture = TestFixture::with_config(TestConfig {
        recency_window_secs: Some(3600),
        ..Default::default()
    })
    .await;
    let first = fixture.submit("ABC-123.mp4").await;
    fixture.wait_for_history(&first, WAIT).await.unwrap();

    let path = fixture.media_file("ABC-123.mp4");
    let skipped = fixture.post("/api/v1/tasks", json!({ "path": path })).await;
    assert_status!(skipped, StatusCode::ACCEPTED);
    assert_eq!(skipped.body["outcomes"][0]["outcome"], "skipped");

    let forced = fixture
        .post("/api/v1/tasks", json!({ "path": path, "force": true }))
        .await;
    assert_eq!(forced.body["outcomes"][0]["outcome"], "queued");
}

// =============================================================================
// Task Control Tests
// =============================================================================

#[tokio::test]
async fn test_cancel_queued_task() {
    let fixture = TestFixture::with_config(TestConfig::paused()).await;
    let task_id = fixture.submit("a.mp4").await;

    let response = fixture
        .post_empty(&format!("/api/v1/tasks/{}/cancel", task_id))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["outcome"], "cancelled");

    let task = fixture.get(&format!("/api/v1/tasks/{}", task_id)).await;
    assert_eq!(task.body["state"]["type"], "cancelled");

    let tasks = fixture.get("/api/v1/tasks").await;
    assert_eq!(tasks.body["tasks"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_cancel_unknown_task() {
    let fixture = TestFixture::new().await;
    let response = fixture.post_empty("/api/v1/tasks/nope/cancel").await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_unknown_task() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/tasks/nope").await;
    assert_status!(response, StatusCode::NOT_FOUND);
}

// =============================================================================
// Log Tests
// =============================================================================

#[tokio::test]
async fn test_logs_after_completion() {
    let fixture = TestFixture::new().await;
    fixture
        .scrape
        .set_output_lines(vec!["searching".to_string(), "found ABC-123".to_string()])
        .await;
    let task_id = fixture.submit("ABC-123.mp4").await;
    fixture.wait_for_history(&task_id, WAIT).await.unwrap();

    let response = fixture.get(&format!("/api/v1/tasks/{}/logs", task_id)).await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["complete"], true);
    let lines: Vec<&str> = response.body["lines"]
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l.as_str().unwrap())
        .collect();
    assert!(lines.iter().any(|l| l.starts_with("[engine]")));
    let searching = lines.iter().position(|l| *l == "searching").unwrap();
    let found = lines.iter().position(|l| *l == "found ABC-123").unwrap();
    assert!(searching < found);

    let history_logs = fixture
        .get(&format!("/api/v1/history/{}/logs", task_id))
        .await;
    assert_eq!(history_logs.body["lines"], response.body["lines"]);
}

#[tokio::test]
async fn test_logstream_follows_running_task() {
    let fixture = TestFixture::new().await;
    fixture
        .scrape
        .set_run_duration(Duration::from_millis(300))
        .await;
    let task_id = fixture.submit("ABC-123.mp4").await;

    let start = std::time::Instant::now();
    while start.elapsed() < WAIT {
        if let Some(task) = fixture.engine.queue.active_task(&task_id) {
            if task.state == TaskState::Running {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // The body ends once the task is terminal.
    let (status, body) = fixture
        .get_text(&format!("/api/v1/tasks/{}/logstream", task_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("event: line"));
    assert!(body.contains("data: scraping"));
    assert!(body.contains("event: end"));
}

#[tokio::test]
async fn test_logstream_of_finished_task_replays_and_ends() {
    let fixture = TestFixture::new().await;
    let task_id = fixture.submit("a.mp4").await;
    fixture.wait_for_history(&task_id, WAIT).await.unwrap();

    let (status, body) = fixture
        .get_text(&format!("/api/v1/tasks/{}/logstream", task_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("data: scraping"));
    assert!(body.contains("event: end"));
}

// =============================================================================
// History Tests
// =============================================================================

#[tokio::test]
async fn test_history_list_pagination_and_filter() {
    let fixture = TestFixture::new().await;
    let mut ids = Vec::new();
    for i in 0..3 {
        ids.push(fixture.submit(&format!("title-{}.mp4", i)).await);
    }
    for id in &ids {
        fixture.wait_for_history(id, WAIT).await.unwrap();
    }

    let page = fixture.get("/api/v1/history?limit=2").await;
    assert_status!(page, StatusCode::OK);
    assert_eq!(page.body["total"], 3);
    assert_eq!(page.body["records"].as_array().unwrap().len(), 2);
    // Most recently completed first
    assert_eq!(page.body["records"][0]["id"], ids[2].as_str());

    let failed = fixture.get("/api/v1/history?state=failed").await;
    assert_eq!(failed.body["total"], 0);

    let bad_range = fixture
        .get("/api/v1/history?from=2025-02-01T00:00:00Z&to=2025-01-01T00:00:00Z")
        .await;
    assert_status!(bad_range, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_delete_active_task_is_rejected() {
    let fixture = TestFixture::with_config(TestConfig::paused()).await;
    let task_id = fixture.submit("a.mp4").await;

    let response = fixture.delete(&format!("/api/v1/history/{}", task_id)).await;
    assert_status!(response, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_delete_removes_record_and_output() {
    let fixture = TestFixture::new().await;
    let out = fixture.output_dir.join("ABC-123");
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join("movie.nfo"), "<movie/>").unwrap();
    fixture
        .scrape
        .set_summary(fixtures::summary("ABC-123", &out.to_string_lossy()))
        .await;

    let task_id = fixture.submit("ABC-123.mp4").await;
    fixture.wait_for_history(&task_id, WAIT).await.unwrap();

    let response = fixture
        .delete(&format!("/api/v1/history/{}?mode=both", task_id))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["record_removed"], true);
    assert_eq!(response.body["files_removed"], true);
    assert!(!out.exists());

    let gone = fixture.get(&format!("/api/v1/history/{}", task_id)).await;
    assert_status!(gone, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bulk_delete_reports_each_id() {
    let fixture = TestFixture::new().await;
    let a = fixture.submit("a.mp4").await;
    let b = fixture.submit("b.mp4").await;
    fixture.wait_for_history(&a, WAIT).await.unwrap();
    fixture.wait_for_history(&b, WAIT).await.unwrap();

    let response = fixture
        .post(
            "/api/v1/history/delete",
            json!({ "task_ids": [a, b, "missing"], "mode": "record" }),
        )
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["deleted"].as_array().unwrap().len(), 2);
    assert_eq!(response.body["failed"][0]["task_id"], "missing");

    let list = fixture.get("/api/v1/history").await;
    assert_eq!(list.body["total"], 0);
}

#[tokio::test]
async fn test_redo_resubmits_sources() {
    let fixture = TestFixture::with_config(TestConfig {
        recency_window_secs: Some(3600),
        ..Default::default()
    })
    .await;
    let task_id = fixture.submit("ABC-123.mp4").await;
    fixture.wait_for_history(&task_id, WAIT).await.unwrap();

    let response = fixture
        .post_empty(&format!("/api/v1/history/{}/redo", task_id))
        .await;
    assert_status!(response, StatusCode::ACCEPTED);
    assert_eq!(response.body["outcomes"][0]["outcome"], "queued");
    let redo_id = response.body["outcomes"][0]["task_id"].as_str().unwrap();
    assert_ne!(redo_id, task_id);

    let record = fixture.wait_for_history(redo_id, WAIT).await.unwrap();
    assert_eq!(record["force"], true);
    assert_eq!(record["state"]["type"], "succeeded");
}

// =============================================================================
// Rule Tests
// =============================================================================

#[tokio::test]
async fn test_preset_crud() {
    let fixture = TestFixture::new().await;

    let created = fixture
        .put(
            "/api/v1/rules/presets/deep",
            json!({ "scanner": { "depth": 2 } }),
        )
        .await;
    assert_status!(created, StatusCode::OK);
    assert_eq!(created.body["name"], "deep");

    let list = fixture.get("/api/v1/rules/presets").await;
    assert_eq!(list.body["presets"][0]["name"], "deep");

    let one = fixture.get("/api/v1/rules/presets/deep").await;
    assert_eq!(one.body["overlay"]["scanner"]["depth"], 2);

    let deleted = fixture.delete("/api/v1/rules/presets/deep").await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let gone = fixture.get("/api/v1/rules/presets/deep").await;
    assert_status!(gone, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_preset_must_be_an_object() {
    let fixture = TestFixture::new().await;

    let array = fixture
        .put("/api/v1/rules/presets/bad", json!(["not", "an", "object"]))
        .await;
    assert_status!(array, StatusCode::BAD_REQUEST);

    let reserved = fixture
        .put("/api/v1/rules/presets/default", json!({}))
        .await;
    assert_status!(reserved, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_task_runs_with_preset_overlay() {
    let fixture = TestFixture::new().await;
    let mut global = serde_json::Map::new();
    global.insert("scanner".to_string(), json!({ "depth": 1, "mode": "full" }));
    fixture.rules.set_global(global);

    let global = fixture.get("/api/v1/rules/global").await;
    assert_eq!(global.body["scanner"]["mode"], "full");

    fixture
        .put("/api/v1/rules/presets/deep", json!({ "scanner": { "depth": 3 } }))
        .await;
    let path = fixture.media_file("a.mp4");
    let response = fixture
        .post("/api/v1/tasks", json!({ "path": path, "preset": "deep" }))
        .await;
    let task_id = response.body["outcomes"][0]["task_id"].as_str().unwrap();

    let record = fixture.wait_for_history(task_id, WAIT).await.unwrap();
    assert_eq!(record["preset"], "deep");
    assert_eq!(record["config"]["scanner"]["depth"], 3);
    assert_eq!(record["config"]["scanner"]["mode"], "full");
    assert_eq!(record["config"]["scanner"]["manual"], false);
}

#[tokio::test]
async fn test_global_rules_update_merges() {
    let fixture = TestFixture::new().await;
    let mut global = serde_json::Map::new();
    global.insert("scanner".to_string(), json!({ "depth": 1, "mode": "full" }));
    fixture.rules.set_global(global);

    let response = fixture
        .put("/api/v1/rules/global", json!({ "scanner": { "depth": 4 }, "proxy": "socks" }))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["scanner"]["depth"], 4);

    let global = fixture.get("/api/v1/rules/global").await;
    assert_eq!(global.body["scanner"]["depth"], 4);
    assert_eq!(global.body["scanner"]["mode"], "full");
    assert_eq!(global.body["proxy"], "socks");
}

#[tokio::test]
async fn test_global_rules_update_rejects_invalid_patch() {
    let fixture = TestFixture::new().await;

    let scalar = fixture.put("/api/v1/rules/global", json!(42)).await;
    assert_status!(scalar, StatusCode::BAD_REQUEST);

    let dotted = fixture
        .put("/api/v1/rules/global", json!({ "scanner.depth": 2 }))
        .await;
    assert_status!(dotted, StatusCode::BAD_REQUEST);

    let global = fixture.get("/api/v1/rules/global").await;
    assert_eq!(global.body, json!({}));
}

// =============================================================================
// Media Browser Tests
// =============================================================================

#[tokio::test]
async fn test_browse_requires_media_root() {
    let fixture = TestFixture::new().await;
    let response = fixture.get("/api/v1/fs/browse").await;
    assert_status!(response, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_browse_lists_one_level_dirs_first() {
    let fixture = TestFixture::with_config(TestConfig::with_scheduler()).await;
    fixture.media_file("b.mp4");
    fixture.media_file("A.mkv");
    fixture.media_file("zeta/inner/deep.mp4");
    fixture.media_file("alpha/c.mp4");
    fixture.media_file(".hidden/x.mp4");
    fixture.media_file(".partial.mp4");

    let response = fixture.get("/api/v1/fs/browse").await;
    assert_status!(response, StatusCode::OK);
    let names: Vec<_> = response.body["entries"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, vec!["alpha", "zeta", "A.mkv", "b.mp4"]);
    assert_eq!(response.body["entries"][0]["is_dir"], true);
    assert!(response.body["entries"][0].get("size").is_none());
    assert_eq!(response.body["entries"][2]["is_dir"], false);
    assert!(response.body["entries"][2]["size"].is_u64());

    let nested = fixture.media_dir.join("zeta");
    let response = fixture
        .get(&format!("/api/v1/fs/browse?path={}", nested.display()))
        .await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["entries"][0]["name"], "inner");
    assert_eq!(
        response.body["entries"][0]["path"],
        json!(nested.join("inner"))
    );
}

#[tokio::test]
async fn test_browse_stays_inside_media_root() {
    let fixture = TestFixture::with_config(TestConfig::with_scheduler()).await;
    fixture.media_file("a.mp4");

    let parent = fixture.media_dir.parent().unwrap().to_path_buf();
    let outside = fixture
        .get(&format!("/api/v1/fs/browse?path={}", parent.display()))
        .await;
    assert_status!(outside, StatusCode::FORBIDDEN);

    let escape = fixture
        .get(&format!(
            "/api/v1/fs/browse?path={}/../output",
            fixture.media_dir.display()
        ))
        .await;
    assert_status!(escape, StatusCode::FORBIDDEN);

    let relative = fixture.get("/api/v1/fs/browse?path=media").await;
    assert_status!(relative, StatusCode::BAD_REQUEST);

    let missing = fixture
        .get(&format!(
            "/api/v1/fs/browse?path={}",
            fixture.media_dir.join("nope").display()
        ))
        .await;
    assert_status!(missing, StatusCode::NOT_FOUND);

    let file = fixture
        .get(&format!(
            "/api/v1/fs/browse?path={}",
            fixture.media_dir.join("a.mp4").display()
        ))
        .await;
    assert_status!(file, StatusCode::BAD_REQUEST);
}

#[cfg(unix)]
#[tokio::test]
async fn test_browse_refuses_symlink_out_of_root() {
    let fixture = TestFixture::with_config(TestConfig::with_scheduler()).await;
    std::os::unix::fs::symlink(&fixture.output_dir, fixture.media_dir.join("link")).unwrap();

    let response = fixture
        .get(&format!(
            "/api/v1/fs/browse?path={}",
            fixture.media_dir.join("link").display()
        ))
        .await;
    assert_status!(response, StatusCode::FORBIDDEN);
}

// =============================================================================
// Scheduler Tests
// =============================================================================

#[tokio::test]
async fn test_sweep_requires_scheduler() {
    let fixture = TestFixture::new().await;
    let response = fixture.post_empty("/api/v1/scheduler/sweep").await;
    assert_status!(response, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_manual_sweep_submits_media() {
    let fixture = TestFixture::with_config(TestConfig::with_scheduler()).await;
    fixture.media_file("a.mp4");
    fixture.media_file("nested/b.mkv");
    fixture.media_file("readme.txt");

    let response = fixture.post_empty("/api/v1/scheduler/sweep").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["scanned"], 2);
    assert_eq!(response.body["submitted"], 2);
    assert_eq!(response.body["trigger"], "manual");

    let again = fixture.post_empty("/api/v1/scheduler/sweep").await;
    assert_eq!(again.body["already_active"], 2);

    let status = fixture.get("/api/v1/status").await;
    assert_eq!(status.body["scheduler"]["last_sweep"]["already_active"], 2);
}
