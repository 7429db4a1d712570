use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use fall_sentinel::config::{SentinelConfig, DEFAULT_SERVER_URL};
use fall_sentinel::Resolution;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FALL_CONFIG",
        "FALL_THRESHOLD",
        "FALL_COOLDOWN_SECS",
        "FALL_SERVER_URL",
        "FALL_UPLOAD_CAPACITY",
        "FALL_UPLOAD_TIMEOUT_SECS",
        "FALL_RESOLUTION",
    ] {
        std::env::remove_var(key);
    }
}

fn config_file(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SentinelConfig::load().expect("load config");
    assert_eq!(cfg.resolution, Resolution::R640x480);
    assert_eq!(cfg.fall.threshold, 50.0);
    assert_eq!(cfg.fall.cooldown, Duration::from_secs(5));
    assert_eq!(cfg.fall.history_capacity, 10);
    assert_eq!(cfg.upload.server_url, DEFAULT_SERVER_URL);
    assert_eq!(cfg.upload.capacity, 10);
    assert_eq!(cfg.upload.timeout, Duration::from_secs(10));
    assert_eq!(cfg.feed.url, "stub://camera");
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = config_file(
        r#"{
            "resolution": "1280x720",
            "fall": { "threshold": 40.0, "cooldown_secs": 2.5 },
            "upload": {
                "server_url": "http://10.0.0.2:5000/upload",
                "capacity": 4,
                "timeout_secs": 3,
                "jpeg_quality": 75
            },
            "feed": { "url": "stub://hallway", "target_fps": 15 }
        }"#,
    );

    std::env::set_var("FALL_CONFIG", file.path());
    std::env::set_var("FALL_THRESHOLD", "65");
    std::env::set_var("FALL_SERVER_URL", "https://alerts.example.org/upload");

    let cfg = SentinelConfig::load().expect("load config");

    assert_eq!(cfg.resolution, Resolution::R1280x720);
    assert_eq!(cfg.fall.threshold, 65.0);
    assert_eq!(cfg.fall.cooldown, Duration::from_millis(2500));
    assert_eq!(cfg.upload.server_url, "https://alerts.example.org/upload");
    assert_eq!(cfg.upload.capacity, 4);
    assert_eq!(cfg.upload.timeout, Duration::from_secs(3));
    assert_eq!(cfg.upload.jpeg_quality, 75);
    assert_eq!(cfg.feed.url, "stub://hallway");
    assert_eq!(cfg.feed.target_fps, 15);

    clear_env();
}

#[test]
fn env_overrides_apply_without_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FALL_COOLDOWN_SECS", "0.5");
    std::env::set_var("FALL_UPLOAD_CAPACITY", "2");
    std::env::set_var("FALL_UPLOAD_TIMEOUT_SECS", "1");
    std::env::set_var("FALL_RESOLUTION", "480x360");

    let cfg = SentinelConfig::load_from(None).expect("load config");
    assert_eq!(cfg.fall.cooldown, Duration::from_millis(500));
    assert_eq!(cfg.upload.capacity, 2);
    assert_eq!(cfg.upload.timeout, Duration::from_secs(1));
    assert_eq!(cfg.resolution, Resolution::R480x360);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();

    for (key, value) in [
        ("FALL_UPLOAD_CAPACITY", "0"),
        ("FALL_UPLOAD_CAPACITY", "many"),
        ("FALL_SERVER_URL", "ftp://10.0.0.2/upload"),
        ("FALL_SERVER_URL", "not a url"),
        ("FALL_THRESHOLD", "-5"),
        ("FALL_COOLDOWN_SECS", "-1"),
        ("FALL_COOLDOWN_SECS", "0"),
        ("FALL_UPLOAD_TIMEOUT_SECS", "0"),
        ("FALL_RESOLUTION", "800x600"),
    ] {
        clear_env();
        std::env::set_var(key, value);
        assert!(
            SentinelConfig::load().is_err(),
            "{}={} should be rejected",
            key,
            value
        );
    }
    clear_env();
}

#[test]
fn rejects_bad_config_files() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let unknown = config_file(r#"{ "fall": { "threshhold": 40.0 } }"#);
    assert!(SentinelConfig::load_from(Some(unknown.path())).is_err());

    let malformed = config_file("{ resolution: ");
    let err = SentinelConfig::load_from(Some(malformed.path())).unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    let missing = malformed.path().with_extension("missing");
    let err = SentinelConfig::load_from(Some(&missing)).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));
}
