use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use headcount::config::HeadcountConfig;
use headcount::ObjectClass;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "HEADCOUNT_CONFIG",
        "HEADCOUNT_SOURCE",
        "HEADCOUNT_MAX_FRAMES",
        "HEADCOUNT_DETECTOR",
        "HEADCOUNT_MODEL_PATH",
        "HEADCOUNT_LABEL",
        "HEADCOUNT_MIN_CONFIDENCE",
        "HEADCOUNT_SINK",
        "HEADCOUNT_SINK_URL",
        "HEADCOUNT_SINK_PATH",
        "HEADCOUNT_CREDENTIAL_PATH",
        "HEADCOUNT_CREDENTIAL",
        "HEADCOUNT_PUBLISH_PERIOD_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let credential = write_temp("  db-secret\n");
    let json = format!(
        r#"{{
            "source": {{
                "uri": "stub://lobby",
                "target_fps": 5,
                "width": 320,
                "height": 240
            }},
            "count": {{ "label": "person", "min_confidence": 0.5 }},
            "sink": {{
                "kind": "rest",
                "url": "https://alarm-panel.example.com",
                "path": "fire_alarm/detectedHumans",
                "credential_path": "{}",
                "timeout_ms": 750
            }},
            "publish": {{ "period_ms": 1000 }},
            "render": {{ "enabled": false }}
        }}"#,
        credential.path().display()
    );
    let file = write_temp(&json);

    std::env::set_var("HEADCOUNT_CONFIG", file.path());
    std::env::set_var("HEADCOUNT_MAX_FRAMES", "120");
    std::env::set_var("HEADCOUNT_SINK_PATH", "building_a/lobby");
    std::env::set_var("HEADCOUNT_PUBLISH_PERIOD_MS", "250");

    let cfg = HeadcountConfig::load().expect("load config");

    assert_eq!(cfg.source.uri, "stub://lobby");
    assert_eq!(cfg.source.target_fps, 5);
    assert_eq!((cfg.source.width, cfg.source.height), (320, 240));
    assert_eq!(cfg.source.max_frames, Some(120));
    assert_eq!(cfg.policy.label, ObjectClass::Person);
    assert_eq!(cfg.policy.min_confidence, 0.5);
    assert_eq!(cfg.sink.kind, "rest");
    assert_eq!(cfg.sink.path, "building_a/lobby");
    assert_eq!(cfg.sink.credential.as_deref(), Some("db-secret"));
    assert_eq!(cfg.sink.timeout, Duration::from_millis(750));
    assert_eq!(cfg.publish_period, Duration::from_millis(250));
    assert!(!cfg.render);

    let settings = cfg.pipeline_settings();
    assert_eq!(settings.sink_path, "building_a/lobby");
    assert_eq!(settings.publish_period, Duration::from_millis(250));

    clear_env();
}

#[test]
fn missing_credential_is_invalid_configuration() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("HEADCOUNT_SINK_URL", "https://alarm-panel.example.com");
    let err = HeadcountConfig::load().unwrap_err();
    let rendered = format!("{:#}", err);
    assert!(rendered.starts_with("invalid configuration"), "{}", rendered);
    assert!(rendered.contains("HEADCOUNT_CREDENTIAL"), "{}", rendered);

    clear_env();
}

#[test]
fn env_only_log_sink_needs_no_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("HEADCOUNT_SINK", "log");
    std::env::set_var("HEADCOUNT_LABEL", "vehicle");
    std::env::set_var("HEADCOUNT_MIN_CONFIDENCE", "0.6");

    let cfg = HeadcountConfig::load().expect("load config");
    assert_eq!(cfg.sink.kind, "log");
    assert_eq!(cfg.policy.label, ObjectClass::Vehicle);
    assert_eq!(cfg.policy.min_confidence, 0.6);
    assert_eq!(cfg.publish_period, Duration::from_millis(500));

    clear_env();
}

#[test]
fn rejects_bad_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();

    for (key, value) in [
        ("HEADCOUNT_PUBLISH_PERIOD_MS", "0"),
        ("HEADCOUNT_PUBLISH_PERIOD_MS", "soon"),
        ("HEADCOUNT_MIN_CONFIDENCE", "1.2"),
        ("HEADCOUNT_LABEL", "dragon"),
        ("HEADCOUNT_SINK_PATH", "fire.alarm"),
        ("HEADCOUNT_SINK", "carrier-pigeon"),
    ] {
        clear_env();
        std::env::set_var("HEADCOUNT_SINK", "log");
        std::env::set_var(key, value);
        assert!(
            HeadcountConfig::load().is_err(),
            "{}={} was accepted",
            key,
            value
        );
    }

    clear_env();
}

#[test]
fn unreadable_config_file_is_reported() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_temp("{ not json");
    std::env::set_var("HEADCOUNT_CONFIG", file.path());
    std::env::set_var("HEADCOUNT_SINK", "log");
    let err = HeadcountConfig::load().unwrap_err();
    assert!(err.to_string().contains("invalid config file"));

    clear_env();
}

#[test]
fn device_source_from_env_runs_at_natural_rate() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("HEADCOUNT_SINK", "log");
    let cfg = HeadcountConfig::load().expect("load config");
    assert_eq!(cfg.source.uri, "stub://camera");
    assert_eq!(cfg.source.target_fps, 10);

    std::env::set_var("HEADCOUNT_SOURCE", "/dev/video0");
    let cfg = HeadcountConfig::load().expect("load config");
    assert_eq!(cfg.source.uri, "/dev/video0");
    assert_eq!(cfg.source.target_fps, 0);

    clear_env();
}
