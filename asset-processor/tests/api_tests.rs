//! Integration tests for the HTTP API.
//!
//! Requests go through the full router (CORS + tracing layers included) with
//! `tower::ServiceExt::oneshot`. Jobs are run by a scripted runner so the
//! tests control when and how each job settles.

use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Notify;
use tower::ServiceExt;

use asset_processor::api::{ApiServer, ApiServerConfig, AppState};
use asset_processor::jobs::{JobEntry, JobKind, JobRegistry, JobRunner, JobState};
use asset_processor::{Error, Result};

/// Ids starting with `hold` wait for `release`; `bad` ids fail.
#[derive(Default)]
struct ScriptedRunner {
    release: Notify,
}

#[async_trait]
impl JobRunner for ScriptedRunner {
    async fn run(&self, entry: Arc<JobEntry>) -> Result<()> {
        if entry.id().starts_with("hold") {
            self.release.notified().await;
        }
        if entry.id().starts_with("bad") {
            return Err(Error::external_tool("splat-transform", "exited with status 2"));
        }
        entry.set_progress(40.0);
        Ok(())
    }
}

struct TestApp {
    base: TempDir,
    router: Router,
    registry: Arc<JobRegistry>,
    runner: Arc<ScriptedRunner>,
    restarts: Arc<AtomicI32>,
}

impl TestApp {
    fn new(admin_token: Option<&str>) -> Self {
        let base = TempDir::new().expect("temp dir");
        let runner = Arc::new(ScriptedRunner::default());
        let registry = Arc::new(JobRegistry::new(base.path(), runner.clone()));

        let restarts = Arc::new(AtomicI32::new(0));
        let seen = Arc::clone(&restarts);
        let state = AppState::new(Arc::clone(&registry))
            .with_admin_token(admin_token.map(str::to_string))
            .with_restart_hook(Arc::new(move |code: i32| seen.store(code, Ordering::SeqCst)));

        let router = ApiServer::with_state(ApiServerConfig::default(), state).build_router();
        Self {
            base,
            router,
            registry,
            runner,
            restarts,
        }
    }

    fn upload_dir(&self, kind: &str, id: &str) {
        std::fs::create_dir_all(self.base.path().join(kind).join(id)).expect("upload dir");
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("JSON body")
        };
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn wait_for(&self, id: &str, state: JobState) {
        let entry = self.registry.get(id).expect("job registered");
        for _ in 0..200 {
            if entry.state() == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {id} never reached {state}, still {}", entry.state());
    }
}

mod status_tests {
    use super::*;

    #[tokio::test]
    async fn test_root_reports_ok() {
        let app = TestApp::new(None);
        let (status, body) = app.get("/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"status": "OK"}));
    }

    #[tokio::test]
    async fn test_health_counts_jobs() {
        let app = TestApp::new(None);
        app.upload_dir("model", "ok-1");
        app.get("/process/model/ok-1").await;
        app.wait_for("ok-1", JobState::Done).await;

        let (status, body) = app.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "OK");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        assert_eq!(body["jobs"]["total"], 1);
        assert_eq!(body["jobs"]["done"], 1);
        assert!(body["uptimeSecs"].is_u64());
    }
}

mod process_tests {
    use super::*;

    #[tokio::test]
    async fn test_process_queues_job() {
        let app = TestApp::new(None);
        app.upload_dir("cloud", "hold-1");

        let (status, body) = app.get("/process/cloud/hold-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            serde_json::json!({"status": "OK", "message": "Queued", "id": "hold-1"})
        );
        assert_eq!(
            app.registry.get("hold-1").unwrap().state(),
            JobState::Processing
        );
        app.runner.release.notify_one();
    }

    #[tokio::test]
    async fn test_type_aliases_are_accepted() {
        let app = TestApp::new(None);
        app.upload_dir("model", "ok-mesh");

        let (status, _) = app.get("/process/mesh/ok-mesh").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(app.registry.get("ok-mesh").unwrap().kind(), JobKind::Model);
    }

    #[tokio::test]
    async fn test_unknown_type_is_bad_request() {
        let app = TestApp::new(None);
        let (status, body) = app.get("/process/video/clip").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "ERROR");
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(body["message"].as_str().unwrap().contains("video"));
    }

    #[tokio::test]
    async fn test_invalid_id_is_unprocessable() {
        let app = TestApp::new(None);
        let long_id = "x".repeat(200);

        let (status, body) = app.get(&format!("/process/cloud/{long_id}")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, _) = app.get("/process/cloud/..").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_missing_input_directory_is_not_found() {
        let app = TestApp::new(None);
        let (status, body) = app.get("/process/ifc/nowhere").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "ERROR");
        assert!(app.registry.get("nowhere").is_none());
    }
}

mod progress_tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let app = TestApp::new(None);
        let (status, body) = app.get("/progress/ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_done_job_reports_complete() {
        let app = TestApp::new(None);
        app.upload_dir("splat", "ok-2");
        app.get("/process/splat/ok-2").await;
        app.wait_for("ok-2", JobState::Done).await;

        let (status, body) = app.get("/progress/ok-2").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["progress"], 100.0);
        assert_eq!(body["finished"], true);
        assert_eq!(body["state"], "DONE");
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn test_failed_job_reports_minus_one_with_message() {
        let app = TestApp::new(None);
        app.upload_dir("splat", "bad-1");
        app.get("/process/splat/bad-1").await;
        app.wait_for("bad-1", JobState::Error).await;

        let (status, body) = app.get("/progress/bad-1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["progress"], -1.0);
        assert_eq!(body["finished"], false);
        assert_eq!(body["state"], "ERROR");
        assert!(
            body["message"]
                .as_str()
                .unwrap()
                .contains("exited with status 2")
        );
    }

    #[tokio::test]
    async fn test_polling_admits_queued_job_once_active_settles() {
        let app = TestApp::new(None);
        app.upload_dir("cloud", "hold-a");
        app.upload_dir("cloud", "ok-b");

        app.get("/process/cloud/hold-a").await;
        app.get("/process/cloud/ok-b").await;

        let (_, body) = app.get("/progress/ok-b").await;
        assert_eq!(body["state"], "QUEUED");
        assert_eq!(body["progress"], 0.0);

        app.runner.release.notify_one();
        app.wait_for("hold-a", JobState::Done).await;

        let (_, body) = app.get("/progress/ok-b").await;
        assert_ne!(body["state"], "QUEUED");
        app.wait_for("ok-b", JobState::Done).await;
    }
}

mod queue_tests {
    use super::*;

    #[tokio::test]
    async fn test_queue_lists_pending_jobs_oldest_first() {
        let app = TestApp::new(None);
        for id in ["hold-1", "hold-2", "hold-3"] {
            app.upload_dir("model", id);
            app.get(&format!("/process/model/{id}")).await;
        }

        let (status, body) = app.get("/queue").await;
        assert_eq!(status, StatusCode::OK);
        let jobs = body.as_array().unwrap();
        let ids: Vec<&str> = jobs.iter().map(|j| j["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["hold-1", "hold-2", "hold-3"]);

        assert_eq!(jobs[0]["type"], "model");
        assert_eq!(jobs[0]["state"], "PROCESSING");
        assert!(jobs[0]["startedAt"].is_string());
        assert_eq!(jobs[1]["state"], "QUEUED");
        assert!(jobs[1].get("startedAt").is_none());
        assert!(jobs[1]["createdAt"].is_string());

        app.runner.release.notify_one();
        app.wait_for("hold-1", JobState::Done).await;
        let (_, body) = app.get("/queue").await;
        assert_eq!(body.as_array().unwrap().len(), 2);
    }
}

mod admin_tests {
    use super::*;

    fn restart_request(token: Option<&str>) -> Request<Body> {
        let mut builder = Request::post("/admin/restart");
        if let Some(token) = token {
            builder = builder.header("x-admin-token", token);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_restart_disabled_without_token() {
        let app = TestApp::new(None);
        let (status, _) = app.send(restart_request(Some("anything"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_restart_rejects_wrong_token() {
        let app = TestApp::new(Some("secret"));
        let (status, body) = app.send(restart_request(Some("guess"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = app.send(restart_request(None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(app.restarts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_restart_exits_with_non_zero_status() {
        let app = TestApp::new(Some("secret"));
        let (status, body) = app.send(restart_request(Some("secret"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "OK");

        for _ in 0..100 {
            if app.restarts.load(Ordering::SeqCst) != 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(app.restarts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_restart_requires_post() {
        let app = TestApp::new(Some("secret"));
        let (status, _) = app.get("/admin/restart").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}
