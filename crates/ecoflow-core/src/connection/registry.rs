// ── Process-wide connection registry ──
//
// One `Connection` per distinct credential pair. Devices sharing credentials
// share the broker session.

use std::sync::Arc;

use dashmap::DashMap;
use ecoflow_api::TransportConnector;
use tracing::{debug, info};

use super::cloud::CloudFactory;
use super::session::Connection;
use crate::config::{CredentialKey, Credentials, MqttSettings};
use crate::error::CoreError;

pub struct ConnectionRegistry {
    connections: DashMap<CredentialKey, Arc<Connection>>,
    cloud_factory: CloudFactory,
    connector: Arc<dyn TransportConnector>,
    mqtt: MqttSettings,
    client_id: String,
}

impl ConnectionRegistry {
    pub fn new(
        cloud_factory: CloudFactory,
        connector: Arc<dyn TransportConnector>,
        mqtt: MqttSettings,
    ) -> Self {
        let client_id = mqtt
            .client_id
            .clone()
            .unwrap_or_else(super::client_id::default_client_id);
        debug!(client_id = %client_id, "Connection registry created");
        Self {
            connections: DashMap::new(),
            cloud_factory,
            connector,
            mqtt,
            client_id,
        }
    }

    /// The connection of `credentials`, created on first request.
    pub fn connection(&self, credentials: &Credentials) -> Result<Arc<Connection>, CoreError> {
        let key = credentials.key();
        let entry = self.connections.entry(key.clone()).or_try_insert_with(|| {
            info!(access_key = %credentials.access_key, "Creating connection");
            let cloud = (self.cloud_factory)(credentials)?;
            Ok::<_, CoreError>(Arc::new(Connection::new(
                key,
                cloud,
                Arc::clone(&self.connector),
                self.client_id.clone(),
                self.mqtt.clone(),
            )))
        })?;
        Ok(Arc::clone(entry.value()))
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.connections
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Tear down every session. Connections stay registered and reconnect
    /// on their next use.
    pub async fn shutdown(&self) {
        for connection in self.connections() {
            connection.teardown().await;
        }
        info!("All connections closed");
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.connections.len())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}
