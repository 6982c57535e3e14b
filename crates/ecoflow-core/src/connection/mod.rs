//! Credential-scoped cloud and MQTT connections.

pub mod client_id;
pub mod cloud;
pub mod registry;
pub mod session;
pub mod topics;

pub use cloud::{CloudApi, CloudFactory, http_cloud_factory};
pub use registry::ConnectionRegistry;
pub use session::{Connection, SessionState};
pub use topics::TopicKind;
