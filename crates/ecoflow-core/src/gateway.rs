// ── Gateway facade ──
//
// Owns the connection registry and every device handle of the process.
// The host calls `add_device` during startup and `shutdown` on exit.

use std::sync::Arc;

use dashmap::DashMap;
use ecoflow_api::{RumqttcConnector, TransportConnector};
use tracing::info;

use crate::config::{DeviceConfig, GatewayConfig};
use crate::connection::{CloudFactory, ConnectionRegistry, http_cloud_factory};
use crate::device::Device;
use crate::error::CoreError;

pub struct Gateway {
    config: GatewayConfig,
    registry: ConnectionRegistry,
    devices: DashMap<String, Vec<Device>>,
}

impl Gateway {
    /// Gateway talking to the EcoFlow cloud over HTTP and rumqttc.
    pub fn new(config: GatewayConfig) -> Self {
        let cloud = http_cloud_factory(config.api_url.clone(), config.transport.clone());
        Self::with_backend(config, cloud, Arc::new(RumqttcConnector))
    }

    /// Gateway with explicit cloud and broker backends.
    pub fn with_backend(
        config: GatewayConfig,
        cloud_factory: CloudFactory,
        connector: Arc<dyn TransportConnector>,
    ) -> Self {
        let registry = ConnectionRegistry::new(cloud_factory, connector, config.mqtt.clone());
        Self {
            config,
            registry,
            devices: DashMap::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Register a device with the connection of its credentials.
    ///
    /// Nothing is fetched or connected until the handle is initialized or
    /// subscribed.
    pub fn add_device(&self, device: &DeviceConfig) -> Result<Device, CoreError> {
        let connection = self.registry.connection(&device.credentials)?;
        let handle = Device::new(
            device.name.clone(),
            device.serial_number.clone(),
            device.model,
            connection,
            self.config.reply_timeout,
        );
        self.devices
            .entry(device.serial_number.clone())
            .or_default()
            .push(handle.clone());
        info!(
            sn = %device.serial_number,
            model = %device.model,
            name = %device.name,
            "Device added"
        );
        Ok(handle)
    }

    /// First handle registered for `sn`.
    pub fn device(&self, sn: &str) -> Option<Device> {
        self.devices
            .get(sn)
            .and_then(|handles| handles.first().cloned())
    }

    pub fn devices(&self) -> Vec<Device> {
        self.devices
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// Tear down every broker session. Device handles stay registered; the
    /// next command or subscription reconnects.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}
