//! Wire messages exchanged with devices.
//!
//! Commands travel server → device as
//! `{ "type": "SET_VOLUME", "deviceId": "...", "messageId": "...", "volume": 70 }`,
//! replies travel device → server as
//! `{ "type": "CONNECT" | "DISCONNECT" | "UPDATE", "deviceId": "...", ... }`.
//!
//! Decoding is a single closed step: a frame either becomes one of the known
//! variants or a [`DecodeError`]. There is no partial or order-dependent
//! shape matching.

use serde::{Deserialize, Serialize};

use crate::errors::DecodeError;
use crate::ids::{CorrelationId, DeviceId};
use crate::volume::{Volume, VolumeDelta};

const COMMAND_TYPES: &[&str] = &["ADJUST_VOLUME", "SET_VOLUME", "SET_MUTE"];
const REPLY_TYPES: &[&str] = &["CONNECT", "DISCONNECT", "UPDATE"];

/// What a command asks the device to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    #[serde(rename_all = "camelCase")]
    AdjustVolume { volume_delta: VolumeDelta },
    SetVolume { volume: Volume },
    #[serde(rename_all = "camelCase")]
    SetMute { is_muted: bool },
}

impl Action {
    /// Short name for logs and metric labels.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AdjustVolume { .. } => "adjust_volume",
            Self::SetVolume { .. } => "set_volume",
            Self::SetMute { .. } => "set_mute",
        }
    }
}

/// A typed command addressed to one device.
///
/// `correlation_id` is normally left empty and assigned by the dispatcher;
/// callers that already own a token may supply it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Command {
    pub device_id: DeviceId,
    pub correlation_id: Option<CorrelationId>,
    pub action: Action,
}

impl Command {
    pub fn new(device_id: DeviceId, action: Action) -> Self {
        Self {
            device_id,
            correlation_id: None,
            action,
        }
    }

    pub fn adjust_volume(device_id: DeviceId, volume_delta: VolumeDelta) -> Self {
        Self::new(device_id, Action::AdjustVolume { volume_delta })
    }

    pub fn set_volume(device_id: DeviceId, volume: Volume) -> Self {
        Self::new(device_id, Action::SetVolume { volume })
    }

    pub fn set_mute(device_id: DeviceId, is_muted: bool) -> Self {
        Self::new(device_id, Action::SetMute { is_muted })
    }

    pub fn with_correlation(mut self, id: CorrelationId) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Bind the command to its correlation id for transmission.
    pub fn into_frame(self, message_id: CorrelationId) -> CommandFrame {
        CommandFrame {
            device_id: self.device_id,
            message_id,
            action: self.action,
        }
    }
}

/// A command as it appears on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandFrame {
    pub device_id: DeviceId,
    pub message_id: CorrelationId,
    #[serde(flatten)]
    pub action: Action,
}

impl CommandFrame {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Reported device state; the payload a fulfilled command resolves to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceState {
    pub device_id: DeviceId,
    pub volume: Volume,
    pub is_muted: bool,
}

/// Messages a device sends to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeviceReply {
    #[serde(rename = "CONNECT", rename_all = "camelCase")]
    Connect {
        device_id: DeviceId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    #[serde(rename = "DISCONNECT", rename_all = "camelCase")]
    Disconnect {
        device_id: DeviceId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    #[serde(rename = "UPDATE", rename_all = "camelCase")]
    StateUpdate {
        device_id: DeviceId,
        message_id: CorrelationId,
        volume: Volume,
        is_muted: bool,
    },
}

impl DeviceReply {
    pub fn device_id(&self) -> &DeviceId {
        match self {
            Self::Connect { device_id, .. }
            | Self::Disconnect { device_id, .. }
            | Self::StateUpdate { device_id, .. } => device_id,
        }
    }

    pub fn state_update(correlation_id: CorrelationId, state: DeviceState) -> Self {
        Self::StateUpdate {
            device_id: state.device_id,
            message_id: correlation_id,
            volume: state.volume,
            is_muted: state.is_muted,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Decode a device → server frame.
pub fn decode_reply(raw: &str) -> Result<DeviceReply, DecodeError> {
    decode_tagged(raw, REPLY_TYPES)
}

/// Decode a server → device frame.
pub fn decode_command(raw: &str) -> Result<CommandFrame, DecodeError> {
    decode_tagged(raw, COMMAND_TYPES)
}

fn decode_tagged<T: serde::de::DeserializeOwned>(
    raw: &str,
    known: &[&str],
) -> Result<T, DecodeError> {
    if raw.trim().is_empty() {
        return Err(DecodeError::Empty);
    }
    let value: serde_json::Value = serde_json::from_str(raw).map_err(DecodeError::Json)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(DecodeError::MissingType)?
        .to_string();
    if !known.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownType(kind));
    }
    serde_json::from_value(value).map_err(|source| DecodeError::Invalid { kind, source })
}
