//! HTTP handlers. Each one is thin glue over [`DeviceHub`].

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use volcon_core::{Command, DeviceState};

use crate::api::{AdjustVolumeRequest, ApiError, ApiResponse, SetMuteRequest, SetVolumeRequest};
use crate::discovery;
use crate::server::AppState;

pub async fn ping() -> &'static str {
    "Ping"
}

pub async fn list_devices(State(state): State<AppState>) -> ApiResponse {
    let devices = discovery::describe(state.hub.list_live());
    ApiResponse::success(json!({ "devices": devices }))
}

pub async fn adjust_volume(
    State(state): State<AppState>,
    body: Result<Json<AdjustVolumeRequest>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let Json(req) = body?;
    run(&state, Command::adjust_volume(req.device_id, req.volume_delta)).await
}

pub async fn set_volume(
    State(state): State<AppState>,
    body: Result<Json<SetVolumeRequest>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let Json(req) = body?;
    run(&state, Command::set_volume(req.device_id, req.volume)).await
}

pub async fn set_mute(
    State(state): State<AppState>,
    body: Result<Json<SetMuteRequest>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let Json(req) = body?;
    run(&state, Command::set_mute(req.device_id, req.is_muted)).await
}

async fn run(state: &AppState, command: Command) -> Result<ApiResponse, ApiError> {
    let device_id = command.device_id.clone();
    let action = command.action.name();
    match state.hub.execute(command).await {
        Ok(device_state) => Ok(ApiResponse::success(state_payload(&device_state)?)),
        Err(e) => {
            tracing::info!(device_id = %device_id, action, error = %e, "command failed");
            Err(e.into())
        }
    }
}

fn state_payload(state: &DeviceState) -> Result<serde_json::Value, ApiError> {
    serde_json::to_value(state).map_err(|e| ApiError::internal(e.to_string()))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "devices": state.hub.registry().live_count(),
        "pendingRequests": state.hub.pending().len(),
    }))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.hub.metrics().report())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use volcon_core::{DeviceId, DeviceReply, Volume};
    use volcon_telemetry::MetricsRecorder;

    use crate::connection::{Connection, ConnectionConfig};
    use crate::hub::DeviceHub;
    use crate::server::{build_router, AppState};
    use crate::testing::MockTransport;

    fn state() -> AppState {
        AppState::new(
            DeviceHub::new(Arc::new(MetricsRecorder::new()), None),
            ConnectionConfig::default(),
            tokio_util::sync::CancellationToken::new(),
        )
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn ping_answers() {
        let app = build_router(state());
        let resp = app
            .oneshot(Request::get("/ping").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Ping");
    }

    #[tokio::test]
    async fn devices_lists_live_descriptors() {
        let state = state();
        let conn = Connection::new(MockTransport::new());
        state.hub.route(&conn, r#"{"type":"CONNECT","deviceId":"D1"}"#);

        let resp = build_router(state)
            .oneshot(Request::get("/devices").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["payload"]["devices"][0]["endpointId"], "D1");
        assert_eq!(body["payload"]["devices"][0]["displayCategories"][0], "SPEAKER");
    }

    #[tokio::test]
    async fn unknown_device_is_404_with_envelope() {
        let resp = build_router(state())
            .oneshot(post("/setVolume", r#"{"deviceId":"ghost","volume":10}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "device ghost is not connected");
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        for (uri, body) in [
            ("/setVolume", r#"{"deviceId":"D1","volume":150}"#),
            ("/adjustVolume", r#"{"deviceId":"D1","volumeDelta":"10"}"#),
            ("/setMute", r#"{"deviceId":"D1"}"#),
            ("/setMute", "not json"),
        ] {
            let resp = build_router(state()).oneshot(post(uri, body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{uri} {body}");
            assert_eq!(body_json(resp).await["success"], false);
        }
    }

    #[tokio::test]
    async fn set_volume_round_trip_through_router() {
        let state = state();
        let transport = MockTransport::new();
        let conn = Connection::new(transport.clone());
        state.hub.route(&conn, r#"{"type":"CONNECT","deviceId":"D1"}"#);

        let app = build_router(state.clone());
        let request = tokio::spawn(app.oneshot(post("/setVolume", r#"{"deviceId":"D1","volume":70}"#)));

        // Answer as the device once the command has been queued.
        let frame = loop {
            if let Some(frame) = transport.commands().pop() {
                break frame;
            }
            tokio::task::yield_now().await;
        };
        let reply = DeviceReply::StateUpdate {
            device_id: DeviceId::from_raw("D1"),
            message_id: frame.message_id,
            volume: Volume::try_from(70).unwrap(),
            is_muted: false,
        };
        state.hub.route(&conn, &reply.to_json().unwrap());

        let resp = request.await.unwrap().unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({"success": true, "payload": {"deviceId": "D1", "volume": 70, "isMuted": false}})
        );
        assert!(state.hub.pending().is_empty());
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let state = state();
        let conn = Connection::new(MockTransport::new());
        state.hub.route(&conn, r#"{"type":"CONNECT","deviceId":"D1"}"#);

        let resp = build_router(state)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["devices"], 1);
        assert_eq!(body["pendingRequests"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_returns_report() {
        let state = state();
        state.hub.metrics().counter_inc("frames.unrecognized", &[], 2);

        let resp = build_router(state)
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["counters"][0]["name"], "frames.unrecognized");
        assert_eq!(body["counters"][0]["value"], 2);
    }
}
