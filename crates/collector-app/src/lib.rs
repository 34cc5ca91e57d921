pub mod config;
pub mod http;
pub mod registry;
pub mod sink;
pub mod supervisor;
pub mod systemd;

pub use config::CollectorConfig;
pub use registry::DeviceRegistry;
