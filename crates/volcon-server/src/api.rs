use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use volcon_core::{DeviceId, DispatchError, Volume, VolumeDelta};

/// HTTP response envelope: `{ success, payload? , error? }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            error: Some(message.into()),
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// A failed API call, rendered as an error envelope with a status code.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        let status = match &err {
            DispatchError::DeviceNotFound(_) => StatusCode::NOT_FOUND,
            DispatchError::DuplicateCorrelation(_) => StatusCode::CONFLICT,
            DispatchError::DeviceDisconnected(_) => StatusCode::BAD_GATEWAY,
            DispatchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            DispatchError::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, ApiResponse::error(self.message)).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustVolumeRequest {
    pub device_id: DeviceId,
    pub volume_delta: VolumeDelta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVolumeRequest {
    pub device_id: DeviceId,
    pub volume: Volume,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMuteRequest {
    pub device_id: DeviceId,
    pub is_muted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn success_omits_error() {
        let json = serde_json::to_value(ApiResponse::success(serde_json::json!({"volume": 70}))).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "payload": {"volume": 70}}));
    }

    #[test]
    fn error_omits_payload() {
        let json = serde_json::to_value(ApiResponse::error("nope")).unwrap();
        assert_eq!(json, serde_json::json!({"success": false, "error": "nope"}));
    }

    #[test]
    fn dispatch_errors_map_to_statuses() {
        let d = DeviceId::from_raw("D1");
        let cases = [
            (DispatchError::DeviceNotFound(d.clone()), StatusCode::NOT_FOUND),
            (DispatchError::DeviceDisconnected(d), StatusCode::BAD_GATEWAY),
            (DispatchError::Timeout(Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
            (DispatchError::Encode("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn request_bodies_validate_values() {
        let ok: SetVolumeRequest = serde_json::from_str(r#"{"deviceId":"D1","volume":70}"#).unwrap();
        assert_eq!(ok.volume.get(), 70);
        assert!(serde_json::from_str::<SetVolumeRequest>(r#"{"deviceId":"D1","volume":101}"#).is_err());

        let adjust: AdjustVolumeRequest =
            serde_json::from_str(r#"{"deviceId":"D1","volumeDelta":"-15"}"#).unwrap();
        assert_eq!(adjust.volume_delta, VolumeDelta::down(15));
        assert!(serde_json::from_str::<AdjustVolumeRequest>(r#"{"deviceId":"D1","volumeDelta":"15"}"#).is_err());

        let mute: SetMuteRequest = serde_json::from_str(r#"{"deviceId":"D1","isMuted":true}"#).unwrap();
        assert!(mute.is_muted);
    }
}
