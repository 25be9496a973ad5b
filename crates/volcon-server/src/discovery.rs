//! Discovery descriptors for live devices, in the smart-home "endpoint" shape.

use serde::Serialize;
use volcon_core::DeviceId;

pub const FRIENDLY_NAME: &str = "Volume Control";
pub const DESCRIPTION: &str = "Volcon Volume Control";
pub const MANUFACTURER: &str = "Volcon";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDescriptor {
    pub endpoint_id: DeviceId,
    pub friendly_name: String,
    pub description: String,
    pub manufacturer_name: String,
    pub display_categories: Vec<String>,
    pub cookie: serde_json::Map<String, serde_json::Value>,
    pub capabilities: Vec<Capability>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Capability {
    #[serde(rename = "type")]
    pub kind: String,
    pub interface: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<CapabilityProperties>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CapabilityProperties {
    pub supported: Vec<SupportedProperty>,
    pub retrievable: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SupportedProperty {
    pub name: String,
}

impl DeviceDescriptor {
    /// A volume-controllable speaker endpoint.
    pub fn speaker(device: DeviceId) -> Self {
        Self {
            endpoint_id: device,
            friendly_name: FRIENDLY_NAME.to_string(),
            description: DESCRIPTION.to_string(),
            manufacturer_name: MANUFACTURER.to_string(),
            display_categories: vec!["SPEAKER".to_string()],
            cookie: serde_json::Map::new(),
            capabilities: vec![
                Capability::interface("Alexa", None),
                Capability::interface(
                    "Alexa.Speaker",
                    Some(CapabilityProperties {
                        supported: ["volume", "muted"]
                            .into_iter()
                            .map(|name| SupportedProperty { name: name.to_string() })
                            .collect(),
                        retrievable: true,
                    }),
                ),
            ],
        }
    }
}

impl Capability {
    fn interface(name: &str, properties: Option<CapabilityProperties>) -> Self {
        Self {
            kind: "AlexaInterface".to_string(),
            interface: name.to_string(),
            version: "3".to_string(),
            properties,
        }
    }
}

/// Descriptors for `devices`, in order.
pub fn describe(devices: impl IntoIterator<Item = DeviceId>) -> Vec<DeviceDescriptor> {
    devices.into_iter().map(DeviceDescriptor::speaker).collect()
}
