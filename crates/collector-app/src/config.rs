use std::collections::HashSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use poller_actor::ActorConfig;
use sungrow_client::ClientConfig;
use types::DeviceIdentity;

const DEFAULT_HTTP_LISTEN: &str = "127.0.0.1:9108";

/// Config file path from `--config <path>`, `--config=<path>` or `-c <path>`.
pub fn config_path_from_args(args: impl IntoIterator<Item = String>) -> Option<String> {
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-c" | "--config" => return args.next(),
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    return Some(path.to_string());
                }
            }
        }
    }
    None
}

#[derive(Clone, Debug)]
pub struct CollectorConfig {
    pub devices: Vec<DeviceIdentity>,
    /// Shared client options; `host` is replaced per device.
    pub client: ClientConfig,
    pub poller: ActorConfig,
    /// Status server address, `None` disables it.
    pub http_listen: Option<String>,
}

impl CollectorConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config);
        }

        apply_env_overrides(&mut config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.devices.is_empty() {
            anyhow::bail!("at least one device must be configured");
        }
        let mut seen = HashSet::new();
        for device in &self.devices {
            let address = device.address.trim();
            if address.is_empty() {
                anyhow::bail!("devices.address must be non-empty");
            }
            if !seen.insert(address.to_ascii_lowercase()) {
                anyhow::bail!("device {address} is already configured");
            }
            if device.name.trim().is_empty() {
                anyhow::bail!("devices.name must be non-empty when set ({address})");
            }
        }
        if self.poller.poll_interval.as_millis() == 0 {
            anyhow::bail!("poller.poll_interval_ms must be >= 1");
        }
        if self.poller.request_timeout.as_millis() == 0 {
            anyhow::bail!("poller.request_timeout_ms must be >= 1");
        }
        if self.poller.setup_retry.as_millis() == 0 {
            anyhow::bail!("poller.setup_retry_ms must be >= 1");
        }
        if self.client.port == 0 {
            anyhow::bail!("client.port must be between 1 and 65535");
        }
        if self.client.http_port == 0 {
            anyhow::bail!("client.http_port must be between 1 and 65535");
        }
        if self.client.timeout_ms == 0 {
            anyhow::bail!("client.timeout_ms must be >= 1");
        }
        if u128::from(self.client.timeout_ms) >= self.poller.request_timeout.as_millis() {
            anyhow::bail!(
                "client.timeout_ms ({}) must be below poller.request_timeout_ms ({})",
                self.client.timeout_ms,
                self.poller.request_timeout.as_millis()
            );
        }
        if self.client.locale.trim().is_empty() {
            anyhow::bail!("client.locale must be non-empty");
        }
        if let Some(ref listen) = self.http_listen {
            listen
                .parse::<SocketAddr>()
                .map_err(|_| anyhow::anyhow!("http.listen must be a socket address (e.g. 0.0.0.0:9108)"))?;
        }

        Ok(())
    }

    /// Client options for one device.
    pub fn client_for(&self, device: &DeviceIdentity) -> ClientConfig {
        ClientConfig {
            host: device.address.clone(),
            ..self.client.clone()
        }
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            devices: Vec::new(),
            client: ClientConfig::default(),
            poller: ActorConfig::default(),
            http_listen: Some(DEFAULT_HTTP_LISTEN.to_string()),
        }
    }
}

fn apply_env_overrides(config: &mut CollectorConfig) {
    if let Ok(value) = env::var("SUNGROW_DEVICES") {
        config.devices = parse_devices(&value);
    }

    if let Some(interval_ms) = parse_env_u64("SUNGROW_POLL_INTERVAL_MS") {
        config.poller.poll_interval = Duration::from_millis(interval_ms);
    }

    if let Some(timeout_ms) = parse_env_u64("SUNGROW_REQUEST_TIMEOUT_MS") {
        config.poller.request_timeout = Duration::from_millis(timeout_ms);
    }

    if let Some(retry_ms) = parse_env_u64("SUNGROW_SETUP_RETRY_MS") {
        config.poller.setup_retry = Duration::from_millis(retry_ms);
    }

    if let Some(port) = parse_env_u16("SUNGROW_WS_PORT") {
        config.client.port = port;
    }

    if let Some(port) = parse_env_u16("SUNGROW_HTTP_PORT") {
        config.client.http_port = port;
    }

    if let Some(translations) = parse_env_bool("SUNGROW_TRANSLATIONS") {
        config.client.translations = translations;
    }

    if let Some(timeout_ms) = parse_env_u64("SUNGROW_CLIENT_TIMEOUT_MS") {
        config.client.timeout_ms = timeout_ms;
    }

    if let Ok(value) = env::var("SUNGROW_LOCALE") {
        config.client.locale = value;
    }

    if let Ok(value) = env::var("SUNGROW_HTTP_LISTEN") {
        config.http_listen = listen_setting(value);
    }
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    devices: Option<Vec<FileDeviceConfig>>,
    poller: Option<FilePollerConfig>,
    client: Option<FileClientConfig>,
    http: Option<FileHttpConfig>,
}

#[derive(Debug, Deserialize)]
struct FileDeviceConfig {
    address: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilePollerConfig {
    poll_interval_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    setup_retry_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileClientConfig {
    port: Option<u16>,
    http_port: Option<u16>,
    locale: Option<String>,
    timeout_ms: Option<u64>,
    translations: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct FileHttpConfig {
    listen: Option<String>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("SUNGROW_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut CollectorConfig, file: FileConfig) {
    if let Some(devices) = file.devices {
        config.devices = devices
            .into_iter()
            .map(|device| DeviceIdentity::new(device.address.trim(), device.name))
            .collect();
    }

    if let Some(poller) = file.poller {
        if let Some(interval_ms) = poller.poll_interval_ms {
            config.poller.poll_interval = Duration::from_millis(interval_ms);
        }
        if let Some(timeout_ms) = poller.request_timeout_ms {
            config.poller.request_timeout = Duration::from_millis(timeout_ms);
        }
        if let Some(retry_ms) = poller.setup_retry_ms {
            config.poller.setup_retry = Duration::from_millis(retry_ms);
        }
    }

    if let Some(client) = file.client {
        if let Some(port) = client.port {
            config.client.port = port;
        }
        if let Some(http_port) = client.http_port {
            config.client.http_port = http_port;
        }
        if let Some(locale) = client.locale {
            config.client.locale = locale;
        }
        if let Some(timeout_ms) = client.timeout_ms {
            config.client.timeout_ms = timeout_ms;
        }
        if let Some(translations) = client.translations {
            config.client.translations = translations;
        }
    }

    if let Some(http) = file.http {
        config.http_listen = http.listen.and_then(listen_setting);
    }
}

fn parse_env_u16(key: &str) -> Option<u16> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_bool(key: &str) -> Option<bool> {
    let value = env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn listen_setting(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("off") {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses `addr[=name],addr[=name]`.
fn parse_devices(value: &str) -> Vec<DeviceIdentity> {
    value
        .split(',')
        .filter_map(|entry| {
            let trimmed = entry.trim();
            if trimmed.is_empty() {
                return None;
            }
            let (address, name) = match trimmed.split_once('=') {
                Some((address, name)) if !name.trim().is_empty() => {
                    (address.trim(), Some(name.trim().to_string()))
                }
                Some((address, _)) => (address.trim(), None),
                None => (trimmed, None),
            };
            Some(DeviceIdentity::new(address, name))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use types::DEFAULT_DEVICE_NAME;

    use super::*;

    fn with_devices(devices: Vec<DeviceIdentity>) -> CollectorConfig {
        CollectorConfig {
            devices,
            ..CollectorConfig::default()
        }
    }

    #[test]
    fn parses_device_list() {
        let devices = parse_devices("192.168.1.50=Roof, 192.168.1.51 ,,inverter.lan=");
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[0].address, "192.168.1.50");
        assert_eq!(devices[0].name, "Roof");
        assert_eq!(devices[1].address, "192.168.1.51");
        assert_eq!(devices[1].name, DEFAULT_DEVICE_NAME);
        assert_eq!(devices[2].address, "inverter.lan");
        assert_eq!(devices[2].name, DEFAULT_DEVICE_NAME);
    }

    #[test]
    fn reads_config_path_from_args() {
        let args = |list: &[&str]| list.iter().map(|arg| arg.to_string()).collect::<Vec<_>>();
        assert_eq!(
            config_path_from_args(args(&["--config", "/etc/sungrow.toml"])),
            Some("/etc/sungrow.toml".to_string())
        );
        assert_eq!(
            config_path_from_args(args(&["-v", "--config=collector.json"])),
            Some("collector.json".to_string())
        );
        assert_eq!(
            config_path_from_args(args(&["-c", "a.toml"])),
            Some("a.toml".to_string())
        );
        assert_eq!(config_path_from_args(args(&["--config"])), None);
        assert_eq!(config_path_from_args(args(&[])), None);
    }

    #[test]
    fn requires_a_device() {
        assert!(CollectorConfig::default().validate().is_err());
    }

    #[test]
    fn rejects_duplicate_addresses() {
        let config = with_devices(vec![
            DeviceIdentity::new("Inverter.lan", None),
            DeviceIdentity::new("inverter.lan", Some("Garage".to_string())),
        ]);
        let err = config.validate().expect_err("duplicate");
        assert!(err.to_string().contains("already configured"));
    }

    #[test]
    fn rejects_blank_address_and_bad_listen() {
        assert!(with_devices(vec![DeviceIdentity::new("  ", None)])
            .validate()
            .is_err());

        let mut config = with_devices(vec![DeviceIdentity::new("10.0.0.2", None)]);
        config.http_listen = Some("not-an-address".to_string());
        assert!(config.validate().is_err());

        config.http_listen = None;
        config.validate().expect("valid without status server");
    }

    #[test]
    fn client_timeout_must_fit_poll_budget() {
        let mut config = with_devices(vec![DeviceIdentity::new("10.0.0.2", None)]);
        config.client.timeout_ms = 10_000;
        config.poller.request_timeout = Duration::from_millis(10_000);
        let err = config.validate().expect_err("client timeout too long");
        assert!(err.to_string().contains("client.timeout_ms"));

        config.client.timeout_ms = 9_999;
        config.validate().expect("client timeout below poll budget");
    }

    #[test]
    fn client_config_targets_device() {
        let config = with_devices(vec![DeviceIdentity::new("10.0.0.2", None)]);
        let client = config.client_for(&config.devices[0]);
        assert_eq!(client.host, "10.0.0.2");
        assert_eq!(client.port, 8082);
    }

    #[test]
    fn listen_can_be_disabled() {
        assert_eq!(listen_setting("off".to_string()), None);
        assert_eq!(listen_setting(" ".to_string()), None);
        assert_eq!(
            listen_setting("0.0.0.0:9108".to_string()),
            Some("0.0.0.0:9108".to_string())
        );
    }
}
