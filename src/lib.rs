//! RTSP camera driver
//!
//! Pulls frames from a network camera, pairs each frame with the camera's
//! calibration, and republishes both with identical timestamps. Lost
//! connections are retried on the next tick, indefinitely.
//!
//! # Module Structure
//!
//! - `calibration`: calibration file loading with a fixed fallback record
//! - `ingest`: frame sources (`stub://` synthetic, RTSP via GStreamer)
//! - `session`: connect/read/close state machine around one source handle
//! - `acquisition`: fixed-rate loop pairing frames with calibration
//! - `publish`: outbound messages and the `FrameSink` seam
//! - `transport`: MQTT publisher
//! - `config` / `context`: layered configuration and the explicit runtime context

pub mod acquisition;
pub mod calibration;
pub mod config;
pub mod context;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod publish;
pub mod rate;
pub mod session;
pub mod transport;

pub use acquisition::{AcquisitionLoop, AcquisitionStats};
pub use calibration::{CalibrationProvider, CalibrationRecord};
pub use config::{ConfigOverrides, DriverConfig};
pub use context::{DriverContext, ShutdownSignal};
pub use error::AcquisitionError;
pub use frame::{FrameSample, Header, Stamp};
pub use ingest::{FrameSource, RawImage, RtspConnector, RtspSource, SourceConnector};
pub use publish::{CameraInfoMessage, FrameSink, ImageMessage, LogSink};
pub use rate::Rate;
pub use session::{SessionState, StreamSession};
pub use transport::{MqttPublisher, MqttPublisherConfig};
