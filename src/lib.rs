//! AuditDB - Embedded XML-backed document store for audit records
//! Library crate behind the `auditdb` CLI

pub mod engine;

pub use engine::store::{
    AuditRecord, Criteria, ExportFormat, PathQuery, StoreError, XmlStore,
};
