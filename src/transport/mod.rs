//! Outbound transport for published frames.
//!
//! MQTT is the only transport. Broker endpoints are loopback-only unless
//! remote access is explicitly allowed.

pub mod mqtt;
mod tls;

pub use mqtt::{MqttPublisher, MqttPublisherConfig, Topics};
pub use tls::{parse_mqtt_endpoint, validate_loopback_addr, MqttEndpoint, TlsMaterials};
