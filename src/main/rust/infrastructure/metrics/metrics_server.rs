use tokio::sync::watch;
use warp::Filter;

use super::PrometheusReporter;
use crate::application::services::StatusBoard;

/// Health check response structure
#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    sessions: usize,
}

pub fn routes(
    board: StatusBoard,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    // CORS configuration for browser access
    let cors = warp::cors()
        .allow_any_origin()
        .allow_methods(vec!["GET", "OPTIONS"])
        .allow_headers(vec!["Content-Type"]);

    let metrics_route = warp::path("metrics").map(|| {
        let body = PrometheusReporter::gather_metrics();
        warp::reply::with_header(body, "content-type", "text/plain; version=0.0.4; charset=utf-8")
    });

    let health_board = board.clone();
    let health_route = warp::path("health").map(move || {
        let response = HealthResponse {
            status: "healthy",
            service: "pipeline-camera-grid",
            version: env!("CARGO_PKG_VERSION"),
            sessions: health_board.len(),
        };
        warp::reply::json(&response)
    });

    // Per-device session status, ordered by device id
    let devices_route =
        warp::path("devices").map(move || warp::reply::json(&board.snapshot()));

    metrics_route.or(health_route).or(devices_route).with(cors)
}

/// Serve metrics and status until `shutdown` is set
pub async fn serve_metrics(port: u16, board: StatusBoard, mut shutdown: watch::Receiver<bool>) {
    let (addr, server) =
        warp::serve(routes(board)).bind_with_graceful_shutdown(([0, 0, 0, 0], port), async move {
            while !*shutdown.borrow_and_update() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        });

    tracing::info!("Metrics server listening on http://{}", addr);
    server.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_session_count() {
        let response = warp::test::request()
            .path("/health")
            .reply(&routes(StatusBoard::new()))
            .await;

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["sessions"], 0);
    }

    #[tokio::test]
    async fn test_devices_is_a_json_array() {
        let response = warp::test::request()
            .path("/devices")
            .reply(&routes(StatusBoard::new()))
            .await;

        assert_eq!(response.status(), 200);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_metrics_is_plain_text() {
        let response = warp::test::request()
            .path("/metrics")
            .reply(&routes(StatusBoard::new()))
            .await;

        assert_eq!(response.status(), 200);
        assert!(response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }
}
