use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use field_catalog::PublishedData;
use poller_actor::{LastError, Sink};
use types::DeviceIdentity;

/// Exports published numeric fields as Prometheus gauges.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsSink;

impl Sink for MetricsSink {
    fn publish(&self, device: &DeviceIdentity, data: &PublishedData) {
        for (field, value) in data.iter() {
            let Some(number) = value.as_f64() else {
                continue;
            };
            metrics::gauge!(
                "sungrow_field_value",
                "device" => device.address.clone(),
                "field" => field.as_str(),
                "unit" => field.descriptor().unit.unwrap_or("")
            )
            .set(number);
        }
        metrics::gauge!(
            "sungrow_last_success_timestamp_seconds",
            "device" => device.address.clone()
        )
        .set(unix_secs());
        debug!(address = %device.address, fields = data.len(), "published data exported");
    }

    fn record_error(&self, device: &DeviceIdentity, error: &LastError) {
        metrics::counter!(
            "sungrow_poll_errors_total",
            "device" => device.address.clone(),
            "kind" => error.kind.as_str()
        )
        .increment(1);
    }
}

fn unix_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
