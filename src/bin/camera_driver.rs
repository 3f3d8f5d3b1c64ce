//! camera_driver - RTSP camera driver daemon
//!
//! This daemon:
//! 1. Loads the camera calibration once (falling back to a default model)
//! 2. Connects to the configured stream, retrying on every tick until it succeeds
//! 3. Publishes each frame and its calibration with identical timestamps
//! 4. Stops cleanly on Ctrl-C, releasing the stream and announcing `offline`

use anyhow::{anyhow, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use rtsp_camera_driver::transport::{parse_mqtt_endpoint, validate_loopback_addr, TlsMaterials};
use rtsp_camera_driver::{
    AcquisitionLoop, CalibrationProvider, ConfigOverrides, DriverConfig, DriverContext, LogSink,
    MqttPublisher, MqttPublisherConfig, RtspConnector, StreamSession,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// Publish to an MQTT broker.
    Mqtt,
    /// Log frames at debug level only (no broker required).
    Log,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Publish RTSP camera frames with calibration metadata"
)]
struct Args {
    /// TOML config file (stream, calibration and mqtt tables).
    #[arg(long, env = "CAMERA_DRIVER_CONFIG")]
    config: Option<PathBuf>,

    /// Stream address (rtsp://... or stub://name).
    #[arg(long)]
    rtsp_url: Option<String>,

    /// Coordinate frame identifier stamped on every message.
    #[arg(long)]
    frame_id: Option<String>,

    /// Calibration YAML file.
    #[arg(long)]
    calibration_file: Option<PathBuf>,

    /// Publish rate in frames per second.
    #[arg(long)]
    publish_rate: Option<f64>,

    /// Where frames are published.
    #[arg(long, value_enum, default_value_t = SinkKind::Mqtt)]
    sink: SinkKind,

    /// MQTT broker address.
    #[arg(long)]
    mqtt_broker_addr: Option<String>,

    /// MQTT topic prefix.
    #[arg(long)]
    mqtt_topic_prefix: Option<String>,

    /// MQTT client identifier.
    #[arg(long)]
    mqtt_client_id: Option<String>,

    /// Allow non-loopback MQTT connections.
    #[arg(long)]
    allow_remote_mqtt: bool,

    /// Enable TLS for MQTT (implied by mqtts:// brokers).
    #[arg(long)]
    mqtt_use_tls: bool,

    /// MQTT username for authentication.
    #[arg(long, env = "MQTT_USERNAME")]
    mqtt_username: Option<String>,

    /// MQTT password for authentication.
    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    mqtt_password: Option<String>,

    /// Path to a PEM-encoded CA certificate to trust for MQTT TLS.
    #[arg(long, env = "MQTT_TLS_CA_PATH")]
    mqtt_tls_ca_path: Option<PathBuf>,

    /// Path to a PEM-encoded client certificate for MQTT TLS.
    #[arg(long, env = "MQTT_TLS_CLIENT_CERT_PATH")]
    mqtt_tls_client_cert_path: Option<PathBuf>,

    /// Path to a PEM-encoded client private key for MQTT TLS.
    #[arg(long, env = "MQTT_TLS_CLIENT_KEY_PATH")]
    mqtt_tls_client_key_path: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            url: self.rtsp_url.clone(),
            frame_id: self.frame_id.clone(),
            publish_rate: self.publish_rate,
            calibration_file: self.calibration_file.clone(),
            broker_addr: self.mqtt_broker_addr.clone(),
            topic_prefix: self.mqtt_topic_prefix.clone(),
            client_id: self.mqtt_client_id.clone(),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = DriverConfig::load(args.config.as_deref())?.with_overrides(args.overrides())?;
    config.mqtt.allow_remote |= args.allow_remote_mqtt;
    config.mqtt.use_tls |= args.mqtt_use_tls;

    let ctx = DriverContext::new(config);
    let shutdown = ctx.shutdown.clone();
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        shutdown.request();
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let calibration = CalibrationProvider::load(&ctx.config.calibration_file, ctx.frame_id());
    let mut session = StreamSession::new(RtspConnector);

    match args.sink {
        SinkKind::Log => {
            let mut acquisition = AcquisitionLoop::new(&ctx, &calibration, LogSink::new());
            acquisition.run(&mut session)?;
        }
        SinkKind::Mqtt => {
            let publisher = MqttPublisher::connect(&publisher_config(&ctx, &args)?)?;
            log::info!(
                "publishing to {} and {}",
                publisher.topics().image,
                publisher.topics().camera_info
            );
            let mut acquisition = AcquisitionLoop::new(&ctx, &calibration, publisher);
            let outcome = acquisition.run(&mut session);
            acquisition.into_sink().disconnect()?;
            outcome?;
        }
    }

    log::info!("camera_driver stopped");
    Ok(())
}

fn publisher_config(ctx: &DriverContext, args: &Args) -> Result<MqttPublisherConfig> {
    let mqtt = &ctx.config.mqtt;
    let endpoint = parse_mqtt_endpoint(&mqtt.broker_addr, mqtt.use_tls)?;
    if mqtt.allow_remote {
        log::warn!("remote MQTT enabled - ensure broker is in a trusted network");
    } else {
        validate_loopback_addr(&endpoint, &mqtt.broker_addr)?;
    }
    let tls = TlsMaterials::load(
        args.mqtt_tls_ca_path.as_deref(),
        args.mqtt_tls_client_cert_path.as_deref(),
        args.mqtt_tls_client_key_path.as_deref(),
    )?;
    Ok(MqttPublisherConfig {
        endpoint,
        tls,
        client_id: mqtt.client_id.clone(),
        username: args.mqtt_username.clone(),
        password: args.mqtt_password.clone(),
        topic_prefix: mqtt.topic_prefix.clone(),
    })
}
