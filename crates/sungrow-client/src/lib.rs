use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use types::Snapshot;

pub mod i18n;
pub mod protocol;

pub use i18n::Translations;

use protocol::{ConnectData, DeviceEntry, DeviceListData, Envelope, RealData, Request};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Wait before another translation download after a failed one.
pub const TRANSLATION_RETRY: Duration = Duration::from_secs(60);

/// Connection options for one inverter's websocket service.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    /// Websocket port of the inverter's local web service.
    pub port: u16,
    /// Plain HTTP port serving the `i18n/*.properties` files.
    pub http_port: u16,
    pub locale: String,
    /// Per-step timeout in milliseconds (connect, each request/response, translation fetch).
    pub timeout_ms: u64,
    /// Resolve `I18N_*` identifiers into display text.
    pub translations: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8082,
            http_port: 80,
            locale: "en_US".to_string(),
            timeout_ms: 5_000,
            translations: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid inverter address {0:?}")]
    InvalidAddress(String),
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("connection closed before a response arrived")]
    Closed,
    #[error("invalid json frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected {0} frame")]
    UnexpectedFrame(&'static str),
    #[error("service {service} failed with result code {code}: {message}")]
    ServiceFailed {
        service: &'static str,
        code: i64,
        message: String,
    },
    #[error("response is missing {0}")]
    MissingData(&'static str),
}

impl ClientError {
    /// True when the device could not be reached or the transport broke,
    /// false when it answered with something unexpected.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            ClientError::InvalidAddress(_)
                | ClientError::WebSocket(_)
                | ClientError::Http(_)
                | ClientError::Timeout { .. }
                | ClientError::Closed
        )
    }
}

/// Translation table shared between reads and the background download.
#[derive(Debug, Default)]
struct TranslationCache {
    table: Option<Arc<Translations>>,
    loading: bool,
    retry_at: Option<Instant>,
}

impl TranslationCache {
    fn finish(
        &mut self,
        result: Result<Translations, ClientError>,
    ) -> Result<Arc<Translations>, ClientError> {
        self.loading = false;
        match result {
            Ok(translations) => {
                let table = Arc::new(translations);
                self.table = Some(table.clone());
                self.retry_at = None;
                Ok(table)
            }
            Err(err) => {
                self.retry_at = Some(Instant::now() + TRANSLATION_RETRY);
                Err(err)
            }
        }
    }
}

/// Client for the inverter's local websocket service. Every read opens its own connection.
///
/// Translations never delay a read: the first read starts a background download
/// and goes ahead with raw identifiers.
#[derive(Debug)]
pub struct SungrowClient {
    config: ClientConfig,
    http: reqwest::Client,
    translations: Arc<Mutex<TranslationCache>>,
}

impl SungrowClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        if config.host.trim().is_empty() {
            return Err(ClientError::InvalidAddress(config.host));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            config,
            http,
            translations: Arc::default(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn websocket_url(&self) -> String {
        format!(
            "ws://{}:{}{}",
            self.url_host(),
            self.config.port,
            protocol::OVERVIEW_PATH
        )
    }

    pub fn translations_url(&self) -> String {
        format!(
            "http://{}:{}/i18n/{}.properties",
            self.url_host(),
            self.config.http_port,
            self.config.locale
        )
    }

    /// Reads one full telemetry snapshot over a fresh connection.
    pub async fn fetch_snapshot(&self) -> Result<Snapshot, ClientError> {
        let table = self.cached_translations();
        let empty = Translations::default();
        let translations = table.as_deref().unwrap_or(&empty);

        let url = self.websocket_url();
        let (mut socket, _) = self.bounded(connect_async(url.as_str())).await?;
        debug!(host = %self.config.host, %url, "websocket connected");

        let result = self.read_real_data(&mut socket, translations).await;
        if let Err(err) = socket.close(None).await {
            debug!(host = %self.config.host, error = %err, "websocket close failed");
        }
        result
    }

    pub async fn fetch_translations(&self) -> Result<Translations, ClientError> {
        download_translations(&self.http, &self.translations_url()).await
    }

    /// Downloads the translation table now and caches it for later reads.
    pub async fn load_translations(&self) -> Result<usize, ClientError> {
        let result = self.fetch_translations().await;
        let table = lock_cache(&self.translations).finish(result)?;
        debug!(host = %self.config.host, entries = table.len(), "translations loaded");
        Ok(table.len())
    }

    /// The cached table, if any. Starts a background download when none is
    /// cached, none is running and the retry delay after a failure has passed.
    fn cached_translations(&self) -> Option<Arc<Translations>> {
        if !self.config.translations {
            return None;
        }
        let mut cache = lock_cache(&self.translations);
        if cache.table.is_some() {
            return cache.table.clone();
        }
        if cache.loading || cache.retry_at.is_some_and(|at| Instant::now() < at) {
            return None;
        }
        cache.loading = true;
        drop(cache);

        let http = self.http.clone();
        let url = self.translations_url();
        let host = self.config.host.clone();
        let shared = self.translations.clone();
        tokio::spawn(async move {
            let result = download_translations(&http, &url).await;
            match lock_cache(&shared).finish(result) {
                Ok(table) => info!(%host, entries = table.len(), "translations loaded"),
                Err(err) => warn!(
                    %host,
                    error = %err,
                    retry_s = TRANSLATION_RETRY.as_secs(),
                    "translation fetch failed, using raw identifiers"
                ),
            }
        });
        None
    }

    async fn read_real_data(
        &self,
        socket: &mut Socket,
        translations: &Translations,
    ) -> Result<Snapshot, ClientError> {
        let lang = self.config.locale.to_ascii_lowercase();

        let connect: ConnectData = self
            .request(socket, "connect", &Request::connect(&lang))
            .await?;
        let token = connect
            .token
            .filter(|token| !token.is_empty())
            .ok_or(ClientError::MissingData("token"))?;

        let devices: DeviceListData = self
            .request(socket, "devicelist", &Request::device_list(&lang, &token))
            .await?;
        let dev_id = devices
            .list
            .first()
            .and_then(DeviceEntry::id)
            .ok_or(ClientError::MissingData("dev_id"))?;

        let real: RealData = self
            .request(
                socket,
                "real",
                &Request::real(&lang, &token, &dev_id, unix_secs()),
            )
            .await?;

        let snapshot: Snapshot = real
            .list
            .into_iter()
            .map(|raw| raw.into_item(translations))
            .collect();
        debug!(
            host = %self.config.host,
            dev_id = %dev_id,
            fields = snapshot.len(),
            "telemetry read ok"
        );
        Ok(snapshot)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        socket: &mut Socket,
        service: &'static str,
        request: &Request<'_>,
    ) -> Result<T, ClientError> {
        let payload = serde_json::to_string(request)?;
        self.bounded(socket.send(Message::Text(payload))).await?;
        let text = self.bounded(next_text(socket)).await?;

        let envelope: Envelope<Value> = serde_json::from_str(&text)?;
        if envelope.result_code != protocol::RESULT_SUCCESS {
            return Err(ClientError::ServiceFailed {
                service,
                code: envelope.result_code,
                message: envelope.result_msg.unwrap_or_default(),
            });
        }
        let data = envelope
            .result_data
            .ok_or(ClientError::MissingData("result_data"))?;
        Ok(serde_json::from_value(data)?)
    }

    async fn bounded<F, T, E>(&self, future: F) -> Result<T, ClientError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ClientError>,
    {
        match timeout(Duration::from_millis(self.config.timeout_ms), future).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(ClientError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }),
        }
    }

    fn url_host(&self) -> String {
        let host = self.config.host.trim();
        if host.contains(':') && !host.starts_with('[') {
            format!("[{host}]")
        } else {
            host.to_string()
        }
    }
}

async fn download_translations(
    http: &reqwest::Client,
    url: &str,
) -> Result<Translations, ClientError> {
    let body = http
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(Translations::parse(&body))
}

fn lock_cache(cache: &Mutex<TranslationCache>) -> MutexGuard<'_, TranslationCache> {
    match cache.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn next_text(socket: &mut Socket) -> Result<String, ClientError> {
    while let Some(message) = socket.next().await {
        match message? {
            Message::Text(text) => return Ok(text),
            Message::Binary(bytes) => {
                return String::from_utf8(bytes).map_err(|_| ClientError::UnexpectedFrame("binary"))
            }
            Message::Close(_) => return Err(ClientError::Closed),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        }
    }
    Err(ClientError::Closed)
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_host() {
        let config = ClientConfig {
            host: "  ".to_string(),
            ..ClientConfig::default()
        };
        let err = SungrowClient::new(config).expect_err("empty host");
        assert!(matches!(err, ClientError::InvalidAddress(_)));
        assert!(err.is_connection());
    }

    #[test]
    fn builds_urls() {
        let client = SungrowClient::new(ClientConfig {
            host: "192.168.1.50".to_string(),
            ..ClientConfig::default()
        })
        .expect("client");
        assert_eq!(client.websocket_url(), "ws://192.168.1.50:8082/ws/home/overview");
        assert_eq!(
            client.translations_url(),
            "http://192.168.1.50:80/i18n/en_US.properties"
        );
    }

    #[test]
    fn brackets_ipv6_hosts() {
        let client = SungrowClient::new(ClientConfig {
            host: "fe80::1".to_string(),
            ..ClientConfig::default()
        })
        .expect("client");
        assert_eq!(client.websocket_url(), "ws://[fe80::1]:8082/ws/home/overview");
    }

    #[test]
    fn classifies_errors() {
        assert!(ClientError::Timeout { timeout_ms: 10 }.is_connection());
        assert!(ClientError::Closed.is_connection());
        assert!(!ClientError::MissingData("token").is_connection());
        assert!(!ClientError::ServiceFailed {
            service: "connect",
            code: 106,
            message: "token invalid".to_string(),
        }
        .is_connection());
    }
}
