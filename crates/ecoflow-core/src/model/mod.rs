// ── Domain model ──

pub mod command;
pub mod device_model;
pub mod snapshot;
pub mod status;

pub use command::{ENVELOPE_VERSION, Framing, SetCommand, SetEnvelope, SetReply, SupplyPriority};
pub use device_model::{DeviceModel, ProductLine};
pub use snapshot::{EnableType, QuotaPatch, QuotaSnapshot};
pub use status::DeviceStatus;
