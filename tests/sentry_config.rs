use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use dock_sentry::config::SentryConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENTRY_CONFIG",
        "SENTRY_STREAM_URL",
        "SENTRY_UPLOAD_DIR",
        "SENTRY_MOTION_ENABLED",
        "SENTRY_INTERACTIVE_TIMEOUT_SECS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "stream": {
            "url": "http://robot.local:44445/?action=stream",
            "width": 640,
            "height": 480,
            "fps_low": 4
        },
        "storage": {
            "upload_dir": "/var/lib/sentry/uploads",
            "video_name": "event.avi"
        },
        "motion": {
            "buffer_secs": 20,
            "pre_event_secs": 2
        },
        "control": {
            "liveness_timeout_secs": 2.5
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SENTRY_CONFIG", file.path());
    std::env::set_var("SENTRY_MOTION_ENABLED", "false");
    std::env::set_var("SENTRY_INTERACTIVE_TIMEOUT_SECS", "30");

    let cfg = SentryConfig::load(None).expect("load config");

    assert_eq!(cfg.stream.url, "http://robot.local:44445/?action=stream");
    assert_eq!((cfg.stream.width, cfg.stream.height), (640, 480));
    assert_eq!(cfg.stream.fps_low, 4);
    assert_eq!(cfg.stream.fps_high, 10);
    assert_eq!(
        cfg.video_path(),
        std::path::Path::new("/var/lib/sentry/uploads/event.avi")
    );
    assert_eq!(cfg.motion.buffer_len(cfg.stream.fps_low), 80);
    assert_eq!(cfg.motion.pre_event_len(cfg.stream.fps_low), 8);
    assert!(!cfg.motion.enabled);
    assert_eq!(cfg.control.interactive_timeout, Duration::from_secs(30));
    assert_eq!(cfg.control.liveness_timeout, Duration::from_millis(2500));

    clear_env();
}

#[test]
fn loads_toml_config_from_explicit_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
        [stream]
        url = "http://10.0.0.5:8080/stream"

        [motion]
        observe_only = true
        confirm_frames = 5
    "#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("SENTRY_STREAM_URL", "http://override:9000/stream");

    let cfg = SentryConfig::load(Some(file.path())).expect("load config");
    assert_eq!(cfg.stream.url, "http://override:9000/stream");
    assert!(cfg.motion.observe_only);
    assert_eq!(cfg.motion.confirm_frames, 5);
    assert_eq!(cfg.stream.width, 800);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(
        &mut file,
        br#"{ "motion": { "buffer_secs": 3, "pre_event_secs": 3 } }"#,
    )
    .expect("write config");
    let err = SentryConfig::load(Some(file.path())).expect_err("offset must be below buffer");
    assert!(err.to_string().contains("pre_event_secs"));

    std::env::set_var("SENTRY_MOTION_ENABLED", "sometimes");
    assert!(SentryConfig::load(None).is_err());

    clear_env();
}

#[test]
fn rejects_negative_timeout_from_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{ "control": { "interactive_timeout_secs": -1.0 } }"#)
        .expect("write config");
    let err = SentryConfig::load(Some(file.path())).expect_err("negative timeout");
    assert!(err.to_string().contains("interactive_timeout_secs"));

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    std::io::Write::write_all(&mut file, b"[control]\nliveness_timeout_secs = inf\n")
        .expect("write config");
    let err = SentryConfig::load(Some(file.path())).expect_err("infinite timeout");
    assert!(err.to_string().contains("liveness_timeout_secs"));

    clear_env();
}

#[test]
fn missing_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let dir = tempfile::tempdir().unwrap();
    let err = SentryConfig::load(Some(&dir.path().join("absent.json"))).unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    let defaults = SentryConfig::load(None).expect("defaults");
    assert_eq!(defaults.stream.fps_low, 2);
}
