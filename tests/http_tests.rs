// HTTP control API tests
//
// Requests go straight to the router with `oneshot`, no socket involved.

use anyhow::Result;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use decibel_recorder::{
    create_router, AppState, MemorySink, SessionConfig, SessionController, SyntheticMeter,
    SyntheticMeterConfig,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

fn app() -> Result<(Router, Arc<SessionController>, Arc<MemorySink>)> {
    let meter = Arc::new(SyntheticMeter::new(
        SyntheticMeterConfig::default(),
        Duration::from_millis(10),
    ));
    let sink = Arc::new(MemorySink::new());
    let config = SessionConfig {
        poll_period: Duration::from_millis(10),
        ..SessionConfig::default()
    };
    let controller = Arc::new(SessionController::new(config, meter, sink.clone())?);
    let router = create_router(AppState::new(Arc::clone(&controller)));
    Ok((router, controller, sink))
}

async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => request.body(Body::empty())?,
    };

    let response = router.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };
    Ok((status, value))
}

#[tokio::test]
async fn test_health() -> Result<()> {
    let (router, _controller, _sink) = app()?;
    let (status, body) = send(&router, "GET", "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_start_stop_cycle() -> Result<()> {
    let (router, _controller, sink) = app()?;

    let (status, body) = send(&router, "POST", "/record/start", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "recording");
    assert!(body["session_id"].is_string());

    let (status, _) = send(&router, "POST", "/record/start", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    tokio::time::sleep(Duration::from_millis(60)).await;

    let (status, body) = send(&router, "POST", "/record/stop", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
    assert_eq!(body["message"], "Stopped");
    let persisted = body["stats"]["readings_persisted"].as_u64().unwrap_or(0);
    assert!(persisted > 0);
    assert_eq!(persisted as usize, sink.batch_sizes().iter().sum::<usize>());

    let (status, _) = send(&router, "POST", "/record/stop", None).await?;
    assert_eq!(status, StatusCode::CONFLICT);

    Ok(())
}

#[tokio::test]
async fn test_set_interval_number_and_text() -> Result<()> {
    let (router, controller, _sink) = app()?;

    let body = json!({ "interval": 30 });
    let (status, body) = send(&router, "PUT", "/record/interval", Some(body)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["interval_secs"], 30.0);

    let body = json!({ "interval": "2.5" });
    let (status, body) = send(&router, "PUT", "/record/interval", Some(body)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["interval_secs"], 2.5);
    assert_eq!(controller.flush_interval(), Duration::from_millis(2500));

    Ok(())
}

#[tokio::test]
async fn test_invalid_interval_keeps_previous() -> Result<()> {
    let (router, controller, _sink) = app()?;

    for bad in [json!(0), json!(-5), json!("abc"), json!("")] {
        let (status, body) =
            send(&router, "PUT", "/record/interval", Some(json!({ "interval": bad }))).await?;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "interval {}", bad);
        assert!(body["error"].is_string());
    }

    assert_eq!(controller.flush_interval(), Duration::from_secs(60));
    Ok(())
}

#[tokio::test]
async fn test_status_reports_stats() -> Result<()> {
    let (router, controller, _sink) = app()?;

    let (status, body) = send(&router, "GET", "/record/status", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");
    assert_eq!(body["status"], "Idle");
    assert_eq!(body["flush_interval_secs"], 60.0);
    assert!(body["session_id"].is_null());

    controller.start().await;
    let (_, body) = send(&router, "GET", "/record/status", None).await?;
    assert_eq!(body["state"], "recording");
    assert!(body["session_id"].is_string());

    controller.stop().await;
    Ok(())
}
