use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use rtsp_camera_driver::config::DriverConfig;
use rtsp_camera_driver::ConfigOverrides;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "CAMERA_RTSP_URL",
        "CAMERA_FRAME_ID",
        "CAMERA_PUBLISH_RATE",
        "CAMERA_CALIBRATION_FILE",
        "MQTT_BROKER_ADDR",
        "MQTT_TOPIC_PREFIX",
        "MQTT_CLIENT_ID",
        "ALLOW_REMOTE_MQTT",
        "MQTT_USE_TLS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"
        [stream]
        url = "rtsp://camera-1:554/main"
        frame_id = "front_camera"
        publish_rate = 12.5

        [calibration]
        file = "/etc/camera/front.yml"

        [mqtt]
        broker_addr = "127.0.0.1:8883"
        topic_prefix = "cameras/front"
        client_id = "front-driver"
        "#,
    );

    std::env::set_var("CAMERA_FRAME_ID", "rear_camera");
    std::env::set_var("CAMERA_PUBLISH_RATE", "5");
    std::env::set_var("MQTT_USE_TLS", "true");

    let cfg = DriverConfig::load(Some(file.path())).expect("load config");
    clear_env();

    assert_eq!(cfg.stream.url, "rtsp://camera-1:554/main");
    assert_eq!(cfg.stream.frame_id, "rear_camera");
    assert_eq!(cfg.stream.publish_rate, 5.0);
    assert_eq!(cfg.calibration_file, PathBuf::from("/etc/camera/front.yml"));
    assert_eq!(cfg.mqtt.broker_addr, "127.0.0.1:8883");
    assert_eq!(cfg.mqtt.topic_prefix, "cameras/front");
    assert_eq!(cfg.mqtt.client_id, "front-driver");
    assert!(cfg.mqtt.use_tls);
    assert!(!cfg.mqtt.allow_remote);
}

#[test]
fn command_line_overrides_win_over_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAMERA_RTSP_URL", "rtsp://from-env/stream");
    let cfg = DriverConfig::load(None).expect("load config");
    clear_env();
    assert_eq!(cfg.stream.url, "rtsp://from-env/stream");

    let cfg = cfg
        .with_overrides(ConfigOverrides {
            url: Some("stub://bench".to_string()),
            calibration_file: Some(PathBuf::from("bench.yml")),
            client_id: Some("bench-driver".to_string()),
            ..ConfigOverrides::default()
        })
        .expect("apply overrides");
    assert_eq!(cfg.mqtt.client_id, "bench-driver");
    assert_eq!(cfg.stream.url, "stub://bench");
    assert_eq!(cfg.calibration_file, PathBuf::from("bench.yml"));
    assert_eq!(cfg.stream.frame_id, "camera_optical_frame");
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("CAMERA_PUBLISH_RATE", "fast");
    assert!(DriverConfig::load(None).is_err());
    clear_env();

    std::env::set_var("ALLOW_REMOTE_MQTT", "sometimes");
    assert!(DriverConfig::load(None).is_err());
    clear_env();

    let file = write_config("[stream]\npublish_rate = -1.0\n");
    assert!(DriverConfig::load(Some(file.path())).is_err());

    let file = write_config("[stream]\nfps = 30\n");
    assert!(DriverConfig::load(Some(file.path())).is_err());

    let file = write_config("[mqtt]\ntopic_prefix = \"/\"\n");
    assert!(DriverConfig::load(Some(file.path())).is_err());

    let file = write_config("[stream]\npublish_rate = 1e-20\n");
    assert!(DriverConfig::load(Some(file.path())).is_err());

    let blank_client = ConfigOverrides {
        client_id: Some("  ".to_string()),
        ..ConfigOverrides::default()
    };
    assert!(DriverConfig::default().with_overrides(blank_client).is_err());
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.toml");
    assert!(DriverConfig::load(Some(&missing)).is_err());
}
