// Signed HTTP surface of the open platform: quota reads/writes and the
// MQTT certificate endpoint.

pub mod cache;
pub mod client;
pub mod models;

pub use cache::QuotaCache;
pub use client::{DEFAULT_API_URL, EcoflowClient};
pub use models::{AllQuotaData, ApiResponse, Certificate};
