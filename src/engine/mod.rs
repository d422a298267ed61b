// AuditDB Engine - Core module structure
pub mod cli;
pub mod config;
pub mod lock;
pub mod store;
pub mod xml;

pub use config::Config;
pub use store::XmlStore;
