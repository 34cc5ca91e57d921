use std::env;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use collector_app::CollectorConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

#[test]
fn toml_config_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("SUNGROW_CONFIG", fixture_path("config-valid.toml"));

    let config = CollectorConfig::load().expect("load config");
    config.validate().expect("validate config");
    assert_eq!(config.devices.len(), 2);
    assert_eq!(config.devices[0].name, "Roof");
    assert_eq!(config.devices[1].name, "SunGrow Inverter");
    assert_eq!(config.http_listen.as_deref(), Some("127.0.0.1:9108"));

    env::remove_var("SUNGROW_CONFIG");
}

#[test]
fn json_config_validates() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("SUNGROW_CONFIG", fixture_path("config-valid.json"));

    let config = CollectorConfig::load().expect("load config");
    config.validate().expect("validate config");
    assert_eq!(config.poller.poll_interval, Duration::from_secs(30));
    assert_eq!(config.client.locale, "de_DE");
    assert!(!config.client.translations);
    assert!(config.http_listen.is_none());

    env::remove_var("SUNGROW_CONFIG");
}

#[test]
fn invalid_config_fails_validation() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("SUNGROW_CONFIG", fixture_path("config-invalid.toml"));

    let config = CollectorConfig::load().expect("load config");
    let err = config.validate().expect_err("duplicate device");
    assert!(err.to_string().contains("already configured"));

    env::remove_var("SUNGROW_CONFIG");
}

#[test]
fn translation_settings_come_from_env() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("SUNGROW_CONFIG", fixture_path("config-valid.toml"));
    env::set_var("SUNGROW_HTTP_PORT", "8080");
    env::set_var("SUNGROW_TRANSLATIONS", "off");

    let config = CollectorConfig::load().expect("load config");
    config.validate().expect("validate config");
    assert_eq!(config.client.http_port, 8080);
    assert!(!config.client.translations);

    env::remove_var("SUNGROW_TRANSLATIONS");
    env::remove_var("SUNGROW_HTTP_PORT");
    env::remove_var("SUNGROW_CONFIG");
}

#[test]
fn client_timeout_longer_than_poll_budget_is_rejected() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("SUNGROW_CONFIG", fixture_path("config-valid.toml"));
    env::set_var("SUNGROW_CLIENT_TIMEOUT_MS", "10000");

    let config = CollectorConfig::load().expect("load config");
    let err = config.validate().expect_err("timeout budget");
    assert!(err.to_string().contains("request_timeout_ms"));

    env::remove_var("SUNGROW_CLIENT_TIMEOUT_MS");
    env::remove_var("SUNGROW_CONFIG");
}

#[test]
fn env_overrides_file_values() {
    let _guard = ENV_LOCK.lock().expect("env lock");
    env::set_var("SUNGROW_CONFIG", fixture_path("config-valid.toml"));
    env::set_var("SUNGROW_DEVICES", "10.0.0.7=Shed");
    env::set_var("SUNGROW_POLL_INTERVAL_MS", "5000");

    let config = CollectorConfig::load().expect("load config");
    config.validate().expect("validate config");
    assert_eq!(config.devices.len(), 1);
    assert_eq!(config.devices[0].address, "10.0.0.7");
    assert_eq!(config.devices[0].name, "Shed");
    assert_eq!(config.poller.poll_interval, Duration::from_secs(5));
    assert_eq!(config.poller.request_timeout, Duration::from_secs(10));

    env::remove_var("SUNGROW_POLL_INTERVAL_MS");
    env::remove_var("SUNGROW_DEVICES");
    env::remove_var("SUNGROW_CONFIG");
}

fn fixture_path(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    path.to_string_lossy().to_string()
}
