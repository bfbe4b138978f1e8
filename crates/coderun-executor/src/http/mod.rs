//! HTTP server for the executor.
//!
//! Provides endpoints for:
//! - Task execution (`POST /execute`)
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::any::Any;
use std::sync::Arc;

use axum::{
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::state::AppState;

mod handlers;
pub mod responses;

use responses::ApiError;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    Router::new()
        .route("/execute", post(handlers::execute_task))
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    error!(panic = %detail, "Handler panicked");
    ApiError::internal("Internal server error").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing::ScriptedEngine;
    use clap::Parser;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use std::path::Path;
    use tokio::net::TcpListener;

    fn config(workspace_base: &Path, timeout_secs: u64) -> Config {
        let timeout = timeout_secs.to_string();
        Config::try_parse_from([
            "coderun-executor",
            "--api-key",
            "sk-test",
            "--file-handler-url",
            "http://127.0.0.1:9",
            "--task-timeout-secs",
            timeout.as_str(),
            "--workspace-base",
            workspace_base.to_str().unwrap(),
        ])
        .unwrap()
    }

    async fn serve(state: Arc<AppState>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_router(state)).await.unwrap();
        });
        addr
    }

    async fn start(engine: ScriptedEngine, timeout_secs: u64) -> (SocketAddr, Arc<AppState>, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let state = AppState::new(&config(tmp.path(), timeout_secs), Arc::new(engine)).unwrap();
        let addr = serve(state.clone()).await;
        (addr, state, tmp)
    }

    async fn post_execute(addr: SocketAddr, body: String) -> (u16, Value) {
        let response = reqwest::Client::new()
            .post(format!("http://{addr}/execute"))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (addr, _state, _tmp) = start(ScriptedEngine::answering("x"), 5).await;

        let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn test_execute_answer() {
        let (addr, _state, tmp) = start(ScriptedEngine::answering("4"), 5).await;

        let (status, body) = post_execute(
            addr,
            json!({ "task": "compute 2+2", "contextId": "ctx-1" }).to_string(),
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["result"], json!("4"));
        assert_eq!(body["artifacts"], json!([]));
        assert!(body.get("error").is_none());
        assert!(body["duration_ms"].is_u64());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_execute_validation_errors() {
        let (addr, state, _tmp) = start(ScriptedEngine::answering("x"), 5).await;

        let (status, body) = post_execute(addr, json!({ "task": "compute 2+2" }).to_string()).await;
        assert_eq!(status, 400);
        assert_eq!(
            body,
            json!({ "success": false, "error": "Missing 'contextId' field" })
        );

        let (status, body) = post_execute(addr, "{not json".to_string()).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], json!("Invalid JSON body"));

        let (status, body) = post_execute(
            addr,
            json!({ "task": "x", "contextId": "c", "taskId": "a/b" }).to_string(),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], json!("Invalid 'taskId' field"));

        assert!(state.render_metrics().contains("coderun_tasks_total{outcome=\"success\"} 0"));
    }

    #[tokio::test]
    async fn test_execute_timeout() {
        let (addr, _state, tmp) = start(ScriptedEngine::answering("late").hanging(), 1).await;

        let (status, body) = post_execute(
            addr,
            json!({ "task": "sleep", "contextId": "c", "taskId": "hang-1" }).to_string(),
        )
        .await;

        assert_eq!(status, 200);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Task timed out after 1s"));
        assert!(body.get("result").is_none());
        assert!(!tmp.path().join("hang-1").exists());
    }

    #[tokio::test]
    async fn test_execute_after_close_is_internal_error() {
        let (addr, state, _tmp) = start(ScriptedEngine::answering("x"), 5).await;
        state.admission.close();

        let (status, body) =
            post_execute(addr, json!({ "task": "x", "contextId": "c" }).to_string()).await;

        assert_eq!(status, 500);
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error"], json!("Executor is shutting down"));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (addr, _state, _tmp) = start(ScriptedEngine::answering("4"), 5).await;
        post_execute(addr, json!({ "task": "t", "contextId": "c" }).to_string()).await;

        let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let text = response.text().await.unwrap();
        assert!(text.contains("coderun_tasks_total{outcome=\"success\"} 1"));
        assert!(text.contains("coderun_admission_slots_available 5"));
        assert!(text.contains("coderun_tasks_in_flight 0"));
    }
}
