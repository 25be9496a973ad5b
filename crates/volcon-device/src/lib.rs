//! # volcon-device
//!
//! A simulated volume-controlled device. It connects to the server over a
//! WebSocket, registers itself, and answers every command with its new state.

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use volcon_core::{decode_command, Action, CommandFrame, DecodeError, DeviceId, DeviceReply, DeviceState, Volume};

/// Volume a freshly started device reports.
pub const INITIAL_VOLUME: u8 = 50;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("failed to encode reply: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Device state and the command handling rules, without any I/O.
#[derive(Clone, Debug)]
pub struct SimulatedDevice {
    device_id: DeviceId,
    volume: Volume,
    is_muted: bool,
}

impl SimulatedDevice {
    pub fn new(device_id: DeviceId) -> Self {
        Self {
            device_id,
            volume: Volume::clamped(i64::from(INITIAL_VOLUME)),
            is_muted: false,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn state(&self) -> DeviceState {
        DeviceState {
            device_id: self.device_id.clone(),
            volume: self.volume,
            is_muted: self.is_muted,
        }
    }

    pub fn connect_frame(&self) -> DeviceReply {
        DeviceReply::Connect {
            device_id: self.device_id.clone(),
            message_id: Some("connect".to_string()),
        }
    }

    pub fn disconnect_frame(&self) -> DeviceReply {
        DeviceReply::Disconnect {
            device_id: self.device_id.clone(),
            message_id: None,
        }
    }

    /// Apply a command and produce the UPDATE answering it.
    pub fn apply(&mut self, frame: CommandFrame) -> DeviceReply {
        match frame.action {
            Action::SetVolume { volume } => self.volume = volume,
            Action::AdjustVolume { volume_delta } => self.volume = volume_delta.apply(self.volume),
            Action::SetMute { is_muted } => self.is_muted = is_muted,
        }
        DeviceReply::state_update(frame.message_id, self.state())
    }

    /// Handle one raw text frame. Keep-alives, unrecognized frames and
    /// commands addressed to another device produce no reply.
    pub fn handle_raw(&mut self, raw: &str) -> Option<DeviceReply> {
        match decode_command(raw) {
            Ok(frame) if frame.device_id == self.device_id => Some(self.apply(frame)),
            Ok(frame) => {
                debug!(target_device = %frame.device_id, "ignoring command for another device");
                None
            }
            Err(DecodeError::Empty) => None,
            Err(e) => {
                warn!(error = %e, "bad message received");
                None
            }
        }
    }
}

/// Connect to `url` as `device_id` and serve commands until the server
/// closes the socket or `shutdown` fires. Returns the final state.
pub async fn run(url: &str, device_id: DeviceId, shutdown: CancellationToken) -> Result<DeviceState, DeviceError> {
    let (socket, _) = connect_async(url).await?;
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut device = SimulatedDevice::new(device_id);

    ws_tx.send(Message::text(device.connect_frame().to_json()?)).await?;
    info!(device_id = %device.device_id(), url, "device connected");

    loop {
        tokio::select! {
            message = ws_rx.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = device.handle_raw(text.as_str()) {
                        ws_tx.send(Message::text(reply.to_json()?)).await?;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(device_id = %device.device_id(), "server closed the connection");
                    return Ok(device.state());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            },
            () = shutdown.cancelled() => {
                ws_tx.send(Message::text(device.disconnect_frame().to_json()?)).await?;
                let _ = ws_tx.close().await;
                info!(device_id = %device.device_id(), "device disconnected");
                return Ok(device.state());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use volcon_core::{Command, CorrelationId, VolumeDelta};

    fn device() -> SimulatedDevice {
        SimulatedDevice::new(DeviceId::from_raw("D1"))
    }

    fn frame(command: Command, id: &str) -> String {
        command
            .into_frame(CorrelationId::from_raw(id))
            .to_json()
            .unwrap()
    }

    fn volume_of(reply: &DeviceReply) -> u8 {
        match reply {
            DeviceReply::StateUpdate { volume, .. } => volume.get(),
            other => panic!("expected UPDATE, got {other:?}"),
        }
    }

    #[test]
    fn starts_at_fifty_unmuted() {
        let state = device().state();
        assert_eq!(state.volume.get(), 50);
        assert!(!state.is_muted);
    }

    #[test]
    fn set_volume_replies_with_message_id() {
        let mut dev = device();
        let raw = frame(Command::set_volume(DeviceId::from_raw("D1"), Volume::try_from(70).unwrap()), "m-1");
        let reply = dev.handle_raw(&raw).unwrap();

        assert_eq!(
            reply,
            DeviceReply::StateUpdate {
                device_id: DeviceId::from_raw("D1"),
                message_id: CorrelationId::from_raw("m-1"),
                volume: Volume::try_from(70).unwrap(),
                is_muted: false,
            }
        );
    }

    #[test]
    fn adjust_volume_caps_and_floors() {
        let mut dev = device();
        let d1 = DeviceId::from_raw("D1");
        let up = dev
            .handle_raw(&frame(Command::adjust_volume(d1.clone(), VolumeDelta::up(30)), "a"))
            .unwrap();
        assert_eq!(volume_of(&up), 80);
        let up = dev
            .handle_raw(&frame(Command::adjust_volume(d1.clone(), VolumeDelta::up(30)), "b"))
            .unwrap();
        assert_eq!(volume_of(&up), 100);
        let down = dev
            .handle_raw(&frame(Command::adjust_volume(d1, VolumeDelta::down(250)), "c"))
            .unwrap();
        assert_eq!(volume_of(&down), 0);
    }

    #[test]
    fn set_mute_keeps_volume() {
        let mut dev = device();
        let reply = dev
            .handle_raw(&frame(Command::set_mute(DeviceId::from_raw("D1"), true), "m"))
            .unwrap();
        match reply {
            DeviceReply::StateUpdate { volume, is_muted, .. } => {
                assert!(is_muted);
                assert_eq!(volume.get(), 50);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn ignores_keepalive_garbage_and_other_devices() {
        let mut dev = device();
        assert!(dev.handle_raw("").is_none());
        assert!(dev.handle_raw("nonsense").is_none());
        assert!(dev.handle_raw(r#"{"type":"UPDATE","deviceId":"D1"}"#).is_none());
        let other = frame(Command::set_mute(DeviceId::from_raw("D2"), true), "m");
        assert!(dev.handle_raw(&other).is_none());
        assert!(!dev.state().is_muted);
    }

    #[test]
    fn connect_and_disconnect_frames() {
        let dev = device();
        let connect: serde_json::Value = serde_json::from_str(&dev.connect_frame().to_json().unwrap()).unwrap();
        assert_eq!(
            connect,
            serde_json::json!({"type": "CONNECT", "deviceId": "D1", "messageId": "connect"})
        );
        let disconnect: serde_json::Value =
            serde_json::from_str(&dev.disconnect_frame().to_json().unwrap()).unwrap();
        assert_eq!(disconnect, serde_json::json!({"type": "DISCONNECT", "deviceId": "D1"}));
    }

    #[tokio::test]
    async fn run_registers_answers_and_says_goodbye() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let shutdown = CancellationToken::new();
        let device_task = tokio::spawn(run_device(url, shutdown.clone()));

        let (stream, _) = listener.accept().await.unwrap();
        let mut server = tokio_tungstenite::accept_async(stream).await.unwrap();

        let connect = next_text(&mut server).await;
        assert!(connect.contains(r#""type":"CONNECT""#));

        let command = frame(Command::set_volume(DeviceId::from_raw("D1"), Volume::try_from(70).unwrap()), "m-9");
        server.send(Message::text(command)).await.unwrap();
        let update = next_text(&mut server).await;
        assert!(update.contains(r#""messageId":"m-9""#));
        assert!(update.contains(r#""volume":70"#));

        shutdown.cancel();
        let goodbye = next_text(&mut server).await;
        assert!(goodbye.contains(r#""type":"DISCONNECT""#));

        let final_state = device_task.await.unwrap().unwrap();
        assert_eq!(final_state.volume.get(), 70);
    }

    async fn run_device(url: String, shutdown: CancellationToken) -> Result<DeviceState, DeviceError> {
        run(&url, DeviceId::from_raw("D1"), shutdown).await
    }

    async fn next_text<S>(server: &mut tokio_tungstenite::WebSocketStream<S>) -> String
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        loop {
            match server.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
                Some(Ok(_)) => continue,
                other => panic!("socket ended: {other:?}"),
            }
        }
    }
}
