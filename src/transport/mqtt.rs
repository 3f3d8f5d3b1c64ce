//! MQTT publisher for frame and calibration messages.
//!
//! Topics, relative to the configured prefix:
//! - `image_raw`: binary image envelope (QoS 0)
//! - `camera_info`: calibration JSON (QoS 0)
//! - `status`: retained `online`/`offline` availability (QoS 1, also the last will)

use anyhow::{Context, Result};
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::{mqttbytes::QoS, Client, Connection, Event, MqttOptions};
use rumqttc::Outgoing;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::tls::{MqttEndpoint, TlsMaterials};
use crate::publish::{CameraInfoMessage, FrameSink, ImageMessage};

pub const IMAGE_TOPIC_SUFFIX: &str = "image_raw";
pub const CAMERA_INFO_TOPIC_SUFFIX: &str = "camera_info";
pub const AVAILABILITY_TOPIC_SUFFIX: &str = "status";
const PAYLOAD_ONLINE: &str = "online";
const PAYLOAD_OFFLINE: &str = "offline";
/// Outgoing request queue depth.
const REQUEST_QUEUE_CAPACITY: usize = 10;

/// Topic names derived from a prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    pub image: String,
    pub camera_info: String,
    pub availability: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        let prefix = prefix.trim_end_matches('/');
        Self {
            image: format!("{}/{}", prefix, IMAGE_TOPIC_SUFFIX),
            camera_info: format!("{}/{}", prefix, CAMERA_INFO_TOPIC_SUFFIX),
            availability: format!("{}/{}", prefix, AVAILABILITY_TOPIC_SUFFIX),
        }
    }
}

/// Broker connection parameters.
#[derive(Clone, Debug)]
pub struct MqttPublisherConfig {
    pub endpoint: MqttEndpoint,
    pub tls: TlsMaterials,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
}

pub struct MqttPublisher {
    client: Client,
    topics: Topics,
    stopping: Arc<AtomicBool>,
    connection_handle: Option<std::thread::JoinHandle<()>>,
}

impl MqttPublisher {
    /// Start the client and its network thread, then announce availability.
    pub fn connect(config: &MqttPublisherConfig) -> Result<Self> {
        let topics = Topics::new(&config.topic_prefix);

        let mut options = MqttOptions::new(
            config.client_id.as_str(),
            config.endpoint.host.as_str(),
            config.endpoint.port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        options.set_clean_start(true);
        if let Some(user) = config.username.as_deref() {
            options.set_credentials(user, config.password.as_deref().unwrap_or_default());
        }
        options.set_last_will(LastWill::new(
            topics.availability.as_str(),
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        ));
        options.set_transport(config.endpoint.transport(&config.tls)?);

        let (client, connection) = Client::new(options, REQUEST_QUEUE_CAPACITY);
        let stopping = Arc::new(AtomicBool::new(false));
        let connection_handle = spawn_event_loop(connection, stopping.clone());
        log::info!(
            "MQTT publisher started for {}:{} (TLS: {}, auth: {})",
            config.endpoint.host,
            config.endpoint.port,
            config.endpoint.use_tls,
            config.username.is_some()
        );

        let publisher = Self {
            client,
            topics,
            stopping,
            connection_handle: Some(connection_handle),
        };
        publisher.publish_availability(PAYLOAD_ONLINE)?;
        Ok(publisher)
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Announce `offline`, then stop the network thread.
    pub fn disconnect(self) -> Result<()> {
        if let Err(err) = self.publish_availability(PAYLOAD_OFFLINE) {
            log::warn!("could not announce offline status: {:#}", err);
        }
        let Self {
            client,
            stopping,
            mut connection_handle,
            ..
        } = self;
        stopping.store(true, Ordering::SeqCst);
        let disconnected = client.try_disconnect().context("disconnect MQTT client");
        drop(client);
        if let Some(handle) = connection_handle.take() {
            let _ = handle.join();
        }
        disconnected
    }

    /// Queue a retained availability update without blocking.
    fn publish_availability(&self, payload: &str) -> Result<()> {
        self.client
            .try_publish(
                self.topics.availability.as_str(),
                QoS::AtLeastOnce,
                true,
                payload.as_bytes().to_vec(),
            )
            .with_context(|| format!("publish {}", self.topics.availability))
    }
}

// Data publishes never block: a full request queue (broker unreachable)
// surfaces as an error and the frame is dropped.
impl FrameSink for MqttPublisher {
    fn publish_image(&mut self, image: &ImageMessage) -> Result<()> {
        let payload = image.encode()?;
        self.client
            .try_publish(self.topics.image.as_str(), QoS::AtMostOnce, false, payload)
            .with_context(|| format!("publish {}", self.topics.image))
    }

    fn publish_camera_info(&mut self, info: &CameraInfoMessage<'_>) -> Result<()> {
        let payload = info.encode()?;
        self.client
            .try_publish(self.topics.camera_info.as_str(), QoS::AtMostOnce, false, payload)
            .with_context(|| format!("publish {}", self.topics.camera_info))
    }
}

/// Drive the rumqttc event loop until the publisher is stopped.
///
/// rumqttc reconnects on its own after errors; while running, errors are only logged.
fn spawn_event_loop(
    mut connection: Connection,
    stopping: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let mut connected = false;
        for event in connection.iter() {
            match event {
                Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {
                    if !connected {
                        log::info!("MQTT broker connection established");
                        connected = true;
                    }
                }
                Err(e) => {
                    if stopping.load(Ordering::SeqCst) {
                        break;
                    }
                    if connected {
                        log::warn!("MQTT connection error: {}", e);
                    } else {
                        log::debug!("MQTT connection error: {}", e);
                    }
                    connected = false;
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
    })
}
