use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use poller_actor::{DevicePoller, Sink};
use sungrow_client::SungrowClient;

use crate::config::CollectorConfig;

/// All configured pollers, keyed by device address. Built once at startup.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<String, Arc<DevicePoller>>,
}

impl DeviceRegistry {
    pub fn from_config(config: &CollectorConfig, sink: Arc<dyn Sink>) -> Result<Self> {
        let mut registry = Self::default();
        for device in &config.devices {
            let client = SungrowClient::new(config.client_for(device))
                .with_context(|| format!("create client for {}", device.address))?;
            registry.insert(Arc::new(DevicePoller::new(
                device.clone(),
                Arc::new(client),
                sink.clone(),
                config.poller.clone(),
            )));
        }
        Ok(registry)
    }

    pub fn insert(&mut self, poller: Arc<DevicePoller>) {
        self.devices
            .insert(poller.identity().address.clone(), poller);
    }

    pub fn get(&self, address: &str) -> Option<&Arc<DevicePoller>> {
        self.devices.get(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DevicePoller>> {
        self.devices.values()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
