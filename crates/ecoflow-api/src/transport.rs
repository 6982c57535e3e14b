// HTTP transport settings for the EcoFlow cloud API.
//
// `EcoflowClient` builds its `reqwest::Client` here. The broker connection
// has its own options in `mqtt`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

const USER_AGENT: &str = concat!("ecoflow-bridge/", env!("CARGO_PKG_VERSION"));

/// Which roots the HTTP client trusts.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Platform roots.
    #[default]
    System,
    /// Platform roots plus one extra PEM certificate (corporate proxies).
    CustomCa(PathBuf),
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    /// Whole-request timeout. Connecting gets at most a third of it.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(30),
        }
    }
}

fn load_ca(path: &Path) -> Result<reqwest::Certificate, Error> {
    let pem = std::fs::read(path)
        .map_err(|e| Error::Tls(format!("cannot read CA certificate {}: {e}", path.display())))?;
    reqwest::Certificate::from_pem(&pem)
        .map_err(|e| Error::Tls(format!("{} is not a PEM certificate: {e}", path.display())))
}

impl TransportConfig {
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let builder = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .connect_timeout(self.timeout / 3);

        let builder = match &self.tls {
            TlsMode::System => builder,
            TlsMode::CustomCa(path) => builder.add_root_certificate(load_ca(path)?),
        };

        builder
            .build()
            .map_err(|e| Error::Tls(format!("HTTP client setup failed: {e}")))
    }
}
