// ecoflow-api: Async Rust client for the EcoFlow IoT open platform (HTTP + MQTT)

pub mod error;
pub mod http;
pub mod mqtt;
pub mod sign;
pub mod transport;

pub use error::Error;
pub use http::{AllQuotaData, Certificate, DEFAULT_API_URL, EcoflowClient};
pub use mqtt::{
    InboundMessage, MqttConnectOptions, MqttConnection, MqttTransport, ReconnectConfig,
    RumqttcConnector, TransportConnector,
};
pub use sign::{Signature, Signer};
pub use transport::{TlsMode, TransportConfig};
