use std::time::Duration;

use crate::ids::{ConnectionId, CorrelationId, DeviceId};

/// Terminal failures a caller of `dispatch` can observe.
/// Each request reaches at most one of these, and never after it was fulfilled.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The command targets a device with no live connection. Not retried.
    #[error("device {0} is not connected")]
    DeviceNotFound(DeviceId),
    /// The correlation id is already pending. Fatal to this call only.
    #[error("correlation id {0} is already pending")]
    DuplicateCorrelation(CorrelationId),
    /// The device went away before answering.
    #[error("device {0} disconnected before replying")]
    DeviceDisconnected(DeviceId),
    /// The device did not answer within the configured window.
    #[error("device did not reply within {0:?}")]
    Timeout(Duration),
    /// The command could not be serialized for the wire.
    #[error("failed to encode command: {0}")]
    Encode(String),
}

impl DispatchError {
    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::DeviceNotFound(_) => "device_not_found",
            Self::DuplicateCorrelation(_) => "duplicate_correlation",
            Self::DeviceDisconnected(_) => "device_disconnected",
            Self::Timeout(_) => "timeout",
            Self::Encode(_) => "encode",
        }
    }
}

/// Reply-side pending-table failures. Logged by the router, never surfaced to a device.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum PendingError {
    /// Late, duplicate or spoofed reply.
    #[error("no pending request for correlation id {0}")]
    UnknownCorrelation(CorrelationId),
    #[error("reply for {correlation_id} came from {actual}, request was sent to {expected}")]
    DeviceMismatch {
        correlation_id: CorrelationId,
        expected: DeviceId,
        actual: DeviceId,
    },
    #[error("reply for {correlation_id} arrived on {actual}, request was sent over {expected}")]
    ConnectionMismatch {
        correlation_id: CorrelationId,
        expected: ConnectionId,
        actual: ConnectionId,
    },
}

/// Why an inbound frame could not be classified.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("empty frame")]
    Empty,
    #[error("frame is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("frame has no string \"type\" field")]
    MissingType,
    #[error("unrecognized message type {0:?}")]
    UnknownType(String),
    #[error("invalid {kind} message: {source}")]
    Invalid {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_strings() {
        let device = DeviceId::from_raw("D1");
        assert_eq!(DispatchError::DeviceNotFound(device.clone()).error_kind(), "device_not_found");
        assert_eq!(
            DispatchError::DeviceDisconnected(device).error_kind(),
            "device_disconnected"
        );
        assert_eq!(DispatchError::Timeout(Duration::from_secs(1)).error_kind(), "timeout");
        assert_eq!(
            DispatchError::DuplicateCorrelation(CorrelationId::from_raw("x")).error_kind(),
            "duplicate_correlation"
        );
    }

    #[test]
    fn display_names_the_device() {
        let err = DispatchError::DeviceNotFound(DeviceId::from_raw("kitchen"));
        assert_eq!(err.to_string(), "device kitchen is not connected");
    }

    #[test]
    fn decode_error_display() {
        assert_eq!(
            DecodeError::UnknownType("PING".into()).to_string(),
            "unrecognized message type \"PING\""
        );
    }
}
