//! Request and response frames of the inverter's websocket service.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use types::{FieldValue, InverterItem};

use crate::i18n::Translations;

pub const RESULT_SUCCESS: i64 = 1;
pub const OVERVIEW_PATH: &str = "/ws/home/overview";

#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub lang: &'a str,
    pub token: &'a str,
    pub service: &'a str,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub device_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_check_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_id: Option<&'a str>,
    #[serde(rename = "time123456", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl<'a> Request<'a> {
    pub fn connect(lang: &'a str) -> Self {
        Self::bare(lang, "", "connect")
    }

    pub fn device_list(lang: &'a str, token: &'a str) -> Self {
        Self {
            device_type: Some("0"),
            is_check_token: Some("0"),
            ..Self::bare(lang, token, "devicelist")
        }
    }

    pub fn real(lang: &'a str, token: &'a str, dev_id: &'a str, timestamp: u64) -> Self {
        Self {
            dev_id: Some(dev_id),
            timestamp: Some(timestamp),
            ..Self::bare(lang, token, "real")
        }
    }

    fn bare(lang: &'a str, token: &'a str, service: &'a str) -> Self {
        Self {
            lang,
            token,
            service,
            device_type: None,
            is_check_token: None,
            dev_id: None,
            timestamp: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub result_code: i64,
    #[serde(default)]
    pub result_msg: Option<String>,
    #[serde(default)]
    pub result_data: Option<T>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectData {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceListData {
    #[serde(default)]
    pub list: Vec<DeviceEntry>,
}

#[derive(Debug, Deserialize)]
pub struct DeviceEntry {
    pub dev_id: Value,
}

impl DeviceEntry {
    /// The device id is echoed back as a string regardless of its JSON type.
    pub fn id(&self) -> Option<String> {
        match &self.dev_id {
            Value::String(id) if !id.is_empty() => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RealData {
    pub list: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
pub struct RawItem {
    pub data_name: String,
    #[serde(default)]
    pub data_value: Value,
    #[serde(default)]
    pub data_unit: Option<String>,
}

impl RawItem {
    pub fn into_item(self, translations: &Translations) -> InverterItem {
        let description = translations.get(&self.data_name).map(str::to_string);
        let unit = self.data_unit.filter(|unit| !unit.trim().is_empty());
        InverterItem {
            name: normalize_field_name(&self.data_name),
            description,
            unit,
            value: parse_value(self.data_value, translations),
        }
    }
}

/// `I18N_COMMON_TOTAL_YIELD` becomes `total_yield`, `I18N_COMMONUA` becomes `commonua`.
pub fn normalize_field_name(raw: &str) -> String {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("I18N_COMMON_")
        .or_else(|| trimmed.strip_prefix("I18N_"))
        .unwrap_or(trimmed);
    stripped.to_ascii_lowercase()
}

pub fn parse_value(value: Value, translations: &Translations) -> Option<FieldValue> {
    match value {
        Value::Number(number) => number.as_f64().map(FieldValue::Number),
        Value::String(text) => {
            let trimmed = text.trim();
            if let Ok(number) = trimmed.parse::<f64>() {
                if number.is_finite() {
                    return Some(FieldValue::Number(number));
                }
            }
            let text = translations.get(trimmed).unwrap_or(trimmed);
            Some(FieldValue::Text(text.to_string()))
        }
        Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}
