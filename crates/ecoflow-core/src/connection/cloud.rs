// Cloud HTTP collaborator of a connection.

use std::sync::Arc;

use async_trait::async_trait;
use ecoflow_api::{AllQuotaData, Certificate, EcoflowClient, Signer, TransportConfig};
use serde_json::Value;
use url::Url;

use crate::config::Credentials;
use crate::error::CoreError;

/// What a connection needs from the cloud API for one credential pair.
#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn get_all_quotas(&self, sn: &str) -> Result<Option<AllQuotaData>, ecoflow_api::Error>;

    async fn acquire_certificate(&self) -> Result<Certificate, ecoflow_api::Error>;

    /// HTTP fallback for set commands.
    async fn send_set_envelope(&self, envelope: &Value) -> Result<(), ecoflow_api::Error>;
}

#[async_trait]
impl CloudApi for EcoflowClient {
    async fn get_all_quotas(&self, sn: &str) -> Result<Option<AllQuotaData>, ecoflow_api::Error> {
        EcoflowClient::get_all_quotas(self, sn).await
    }

    async fn acquire_certificate(&self) -> Result<Certificate, ecoflow_api::Error> {
        EcoflowClient::acquire_certificate(self).await
    }

    async fn send_set_envelope(&self, envelope: &Value) -> Result<(), ecoflow_api::Error> {
        EcoflowClient::send_set_envelope(self, envelope).await
    }
}

/// Builds the cloud client of a credential pair.
pub type CloudFactory =
    Arc<dyn Fn(&Credentials) -> Result<Arc<dyn CloudApi>, CoreError> + Send + Sync>;

/// Signed HTTP clients against `api_url`.
pub fn http_cloud_factory(api_url: Url, transport: TransportConfig) -> CloudFactory {
    Arc::new(move |credentials: &Credentials| {
        let signer = Signer::new(
            credentials.access_key.clone(),
            credentials.secret_key.clone(),
        );
        let client = EcoflowClient::new(api_url.as_str(), signer, &transport)?;
        Ok(Arc::new(client) as Arc<dyn CloudApi>)
    })
}
