mod support;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt as _;
use sitescope::app::manager::{ManagerOptions, TaskManager};
use sitescope::app::task_store::NoopTaskStore;
use support::{CountingLlm, StubSite};
use tower::ServiceExt as _;

async fn manager() -> Arc<TaskManager> {
    let site = StubSite::default().page(
        "https://example.com/",
        "Example widgets",
        "widgets for every workshop",
        &[],
    );
    TaskManager::start(
        ManagerOptions::default(),
        Arc::new(NoopTaskStore),
        Arc::new(site),
        Arc::new(CountingLlm::default()),
    )
    .await
}

async fn send(
    app: axum::Router,
    request: Request<Body>,
) -> anyhow::Result<(StatusCode, serde_json::Value)> {
    let response = app.oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    Ok((status, serde_json::from_slice(&bytes)?))
}

fn post_analyze(body: serde_json::Value) -> Request<Body> {
    Request::post("/api/v1/analyze")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("build request")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("build request")
}

#[tokio::test]
async fn create_then_poll_until_completed() -> anyhow::Result<()> {
    let manager = manager().await;
    let app = sitescope::app::api::router(Arc::clone(&manager));

    let (status, created) = send(
        app.clone(),
        post_analyze(serde_json::json!({ "url": "https://example.com", "follow_links": false })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["status"], "pending");
    let task_id = created["task_id"].as_str().expect("task id").to_string();
    assert_eq!(created["status_url"], format!("/api/v1/tasks/{task_id}"));

    manager.join(&task_id).await;

    let (status, view) = send(app.clone(), get(&format!("/api/v1/tasks/{task_id}"))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "completed");
    assert_eq!(view["progress"], 100);
    assert!(view.get("result").is_none());
    let result_url = view["result_url"].as_str().expect("result url").to_string();

    let (status, result) = send(app, get(&result_url)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["analyzed_url"], "https://example.com/");
    assert_eq!(result["pages"].as_array().map(Vec::len), Some(1));
    Ok(())
}

#[tokio::test]
async fn invalid_requests_are_unprocessable() -> anyhow::Result<()> {
    let manager = manager().await;
    let app = sitescope::app::api::router(Arc::clone(&manager));

    let (status, body) = send(
        app.clone(),
        post_analyze(serde_json::json!({ "url": "https://example.com", "max_pages": 101 })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap_or("").contains("max_pages"));

    let (status, body) = send(
        app.clone(),
        post_analyze(serde_json::json!({ "url": "https://example.com", "analysis_mode": "turbo" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].is_string());

    let (status, _) = send(app, post_analyze(serde_json::json!({ "url": "mailto:a@b.c" }))).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    assert_eq!(manager.task_count(), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_tasks_are_not_found() -> anyhow::Result<()> {
    let app = sitescope::app::api::router(manager().await);

    let (status, body) = send(app.clone(), get("/api/v1/tasks/nope")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap_or("").contains("nope"));

    let (status, _) = send(app, get("/api/v1/tasks/nope/result")).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn failed_task_has_no_result() -> anyhow::Result<()> {
    let manager = manager().await;
    let app = sitescope::app::api::router(Arc::clone(&manager));

    let (_, created) = send(
        app.clone(),
        post_analyze(serde_json::json!({ "url": "https://elsewhere.example.com" })),
    )
    .await?;
    let task_id = created["task_id"].as_str().expect("task id").to_string();
    manager.join(&task_id).await;

    let (status, view) = send(app.clone(), get(&format!("/api/v1/tasks/{task_id}"))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "failed");
    assert!(view["error"].is_string());
    assert!(view.get("result_url").is_none());

    let (status, _) = send(app, get(&format!("/api/v1/tasks/{task_id}/result"))).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn healthz_reports_task_count() -> anyhow::Result<()> {
    let app = sitescope::app::api::router(manager().await);
    let (status, body) = send(app, get("/healthz")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["tasks"], 0);
    Ok(())
}
