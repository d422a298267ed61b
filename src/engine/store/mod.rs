//! AuditDB document store
//!
//! An embedded XML-backed store for audit records:
//! - one backing file, fully loaded at open, fully rewritten on mutation
//! - replace-in-place saves keyed by record id
//! - structured criteria matching plus a raw path-query escape hatch
//! - statistics, multi-format export, backup, schema validation

pub mod engine;
pub mod error;
pub mod export;
pub mod query;
pub mod record;
pub mod schema;
pub mod stats;

pub use engine::XmlStore;
pub use error::{Result, StoreError};
pub use export::ExportFormat;
pub use query::{Criteria, PathQuery};
pub use record::AuditRecord;
pub use schema::{Diagnostic, SchemaDoc};
pub use stats::Statistics;
