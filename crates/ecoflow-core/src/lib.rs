// ecoflow-core: Connection registry, message routing and device codecs
// between ecoflow-api and consumers (CLI, bridge hosts).

pub mod codec;
pub mod config;
pub mod connection;
pub mod device;
pub mod error;
pub mod gateway;
pub mod model;
pub mod router;
pub mod simulator;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use codec::{QuotaCodec, codec_for};
pub use config::{CredentialKey, Credentials, DeviceConfig, GatewayConfig, MqttSettings};
pub use connection::{CloudApi, CloudFactory, Connection, ConnectionRegistry, SessionState};
pub use device::{CommandError, CommandRoute, Device, Revert};
pub use error::{CodecError, CoreError};
pub use gateway::Gateway;
pub use simulator::{CodecSimulator, SimulatedConnector, Simulator};
pub use stream::{MessageStream, SnapshotStream};

pub use model::{
    DeviceModel, DeviceStatus, EnableType, ProductLine, QuotaPatch, QuotaSnapshot, SetCommand,
    SetEnvelope, SetReply, SupplyPriority,
};
