//! XML document store engine
//!
//! Owns the backing file and the in-memory tree. The tree is loaded once
//! at open and fully rewritten to disk after every mutation; mutating
//! operations hold the writer lock for their mutate-persist sequence.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::engine::lock::WriterLock;
use crate::engine::xml::{parse_document, write_document, Element};

use super::error::{Result, StoreError};
use super::export::{self, ExportFormat};
use super::query::{Criteria, PathQuery};
use super::record::{generate_record_id, AuditRecord, TIMESTAMP_FORMAT};
use super::schema::SchemaDoc;
use super::stats::Statistics;

/// Root element name of the backing file
pub const ROOT_ELEMENT: &str = "audit-database";

/// On-disk format version written into the root element
pub const FORMAT_VERSION: &str = "1.0";

/// Default schema document, relative to the database file's directory
pub const DEFAULT_SCHEMA_FILE: &str = "schema/audit.schema.json";

/// The embedded document store: one backing XML file, one in-memory tree.
///
/// Handles are request-scoped: open, perform one logical operation,
/// discard. A failed persist leaves the in-memory tree ahead of disk;
/// the handle must be re-opened rather than reused across that boundary.
pub struct XmlStore {
    db_path: PathBuf,
    schema_path: PathBuf,
    root: Element,
}

impl XmlStore {
    /// Open the store, creating a fresh empty database (and any missing
    /// parent directories) if the backing file does not exist. A parse
    /// failure of an existing file is fatal.
    pub fn open(path: &Path) -> Result<Self> {
        let root = if path.exists() {
            let content = fs::read_to_string(path)?;
            parse_document(&content)?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            let root = new_database_tree();
            fs::write(path, write_document(&root))?;
            info!(path = %path.display(), "created new audit database");
            root
        };

        if root.find_child("records").is_none() {
            return Err(StoreError::InvalidInput(format!(
                "malformed database {}: missing records container",
                path.display()
            )));
        }

        let schema_path = path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(DEFAULT_SCHEMA_FILE);

        debug!(path = %path.display(), "opened audit database");
        Ok(Self {
            db_path: path.to_path_buf(),
            schema_path,
            root,
        })
    }

    /// Override the default schema document location
    pub fn with_schema_path(mut self, path: &Path) -> Self {
        self.schema_path = path.to_path_buf();
        self
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Save a record, generating an id if it carries none. An existing
    /// record with the same id is replaced in place; otherwise the record
    /// is appended. Returns the (possibly generated) id.
    pub fn save(&mut self, record: &mut AuditRecord) -> Result<String> {
        let id = match record.id() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let id = generate_record_id();
                record.set_id(&id);
                id
            }
        };

        let _guard = WriterLock::for_database(&self.db_path).acquire()?;

        let node = record.to_node();
        let container = self.records_mut()?;
        match container
            .children
            .iter_mut()
            .find(|c| c.name == "record" && c.attr("id") == Some(id.as_str()))
        {
            Some(existing) => *existing = node,
            None => container.children.push(node),
        }

        self.persist()?;
        info!(id = %id, "saved record");
        Ok(id)
    }

    /// Linear scan for an exact id match; absent is `None`, never an error
    pub fn find_by_id(&self, id: &str) -> Option<AuditRecord> {
        self.root
            .descendants_named("record")
            .into_iter()
            .find(|node| node.attr("id") == Some(id))
            .map(AuditRecord::from_node)
    }

    /// Every record matching all of the criteria's field equalities
    pub fn find_by(&self, criteria: &Criteria) -> Vec<AuditRecord> {
        criteria
            .to_path_query()
            .evaluate(&self.root)
            .into_iter()
            .map(AuditRecord::from_node)
            .collect()
    }

    /// Every record, in document order
    pub fn find_all(&self) -> Vec<AuditRecord> {
        self.root
            .descendants_named("record")
            .into_iter()
            .map(AuditRecord::from_node)
            .collect()
    }

    /// Remove the record with the given id. Returns whether anything was
    /// removed; a missing id is `Ok(false)`, not an error.
    pub fn delete(&mut self, id: &str) -> Result<bool> {
        let _guard = WriterLock::for_database(&self.db_path).acquire()?;

        let container = self.records_mut()?;
        let before = container.children.len();
        container
            .children
            .retain(|c| !(c.name == "record" && c.attr("id") == Some(id)));

        if container.children.len() == before {
            return Ok(false);
        }

        self.persist()?;
        info!(id = %id, "deleted record");
        Ok(true)
    }

    pub fn count(&self) -> usize {
        self.root.descendants_named("record").len()
    }

    /// Single-pass aggregation over all current records
    pub fn statistics(&self) -> Statistics {
        Statistics::collect(&self.root)
    }

    /// Serialize all current records to the requested format
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        match format {
            ExportFormat::Json => export::to_json(&self.find_all()),
            ExportFormat::Csv => Ok(export::to_csv(&self.find_all())),
            ExportFormat::Xml => Ok(write_document(&self.root)),
        }
    }

    /// Copy the backing file byte-for-byte to a timestamped sibling path.
    /// Reads the on-disk bytes, not the in-memory tree, so it captures
    /// exactly what a prior successful persist wrote.
    pub fn backup(&self) -> Result<PathBuf> {
        let parent = self.db_path.parent().unwrap_or_else(|| Path::new("."));
        self.backup_to(parent)
    }

    /// Same as [`backup`](Self::backup) but into an explicit directory,
    /// which is created if missing.
    pub fn backup_to(&self, dir: &Path) -> Result<PathBuf> {
        let file_name = self.db_path.file_name().ok_or_else(|| {
            StoreError::InvalidInput(format!(
                "database path has no file name: {}",
                self.db_path.display()
            ))
        })?;

        fs::create_dir_all(dir)?;
        let mut name = file_name.to_os_string();
        name.push(format!(
            ".backup.{}.xml",
            Utc::now().format("%Y-%m-%d_%H-%M-%S")
        ));
        let backup_path = dir.join(name);

        fs::copy(&self.db_path, &backup_path)?;
        info!(path = %backup_path.display(), "created backup");
        Ok(backup_path)
    }

    /// Validate the tree against a schema document; `None` uses the
    /// store's configured default path. Violations surface as a
    /// `Validation` error carrying one diagnostic per violation.
    pub fn validate(&self, schema_path: Option<&Path>) -> Result<bool> {
        let path = schema_path.unwrap_or(&self.schema_path);
        let schema = SchemaDoc::load(path)?;

        let diagnostics = schema.validate_tree(&self.root);
        if diagnostics.is_empty() {
            Ok(true)
        } else {
            warn!(
                violations = diagnostics.len(),
                "schema validation failed"
            );
            Err(StoreError::Validation(diagnostics))
        }
    }

    /// Raw path-query escape hatch for trusted callers. Matched nodes
    /// that are not records are silently skipped.
    pub fn query(&self, raw: &str) -> Result<Vec<AuditRecord>> {
        let query = PathQuery::parse(raw)?;
        Ok(query
            .evaluate(&self.root)
            .into_iter()
            .filter(|node| node.name == "record")
            .map(AuditRecord::from_node)
            .collect())
    }

    fn records_mut(&mut self) -> Result<&mut Element> {
        self.root.find_child_mut("records").ok_or_else(|| {
            StoreError::InvalidInput("database has no records container".to_string())
        })
    }

    /// Rewrite the whole backing file from the in-memory tree. On failure
    /// the tree stays mutated and the handle is considered diverged from
    /// disk.
    fn persist(&self) -> Result<()> {
        let content = write_document(&self.root);
        fs::write(&self.db_path, content).map_err(|e| {
            StoreError::Persistence(format!("{}: {e}", self.db_path.display()))
        })
    }
}

fn new_database_tree() -> Element {
    let mut root = Element::new(ROOT_ELEMENT);
    root.set_attr("version", FORMAT_VERSION);
    root.set_attr("created", &Utc::now().format(TIMESTAMP_FORMAT).to_string());
    root.children.push(Element::new("records"));
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn record(pairs: &[(&str, &str)]) -> AuditRecord {
        let mut r = AuditRecord::new();
        for (k, v) in pairs {
            r.set(k, Some(v));
        }
        r
    }

    #[test]
    fn test_open_creates_loadable_database() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data/audits.xml");

        {
            let store = XmlStore::open(&path).unwrap();
            assert_eq!(store.count(), 0);
        }
        // The freshly created file must load back
        let store = XmlStore::open(&path).unwrap();
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_save_generates_sortable_id() {
        let dir = tempdir().unwrap();
        let mut store = XmlStore::open(&dir.path().join("audits.xml")).unwrap();

        let mut r = record(&[("gender", "female")]);
        let id = store.save(&mut r).unwrap();
        assert!(id.starts_with("AUD"));
        assert_eq!(r.id(), Some(id.as_str()));
        assert_eq!(store.find_by_id(&id).unwrap().get("gender"), Some("female"));
    }

    #[test]
    fn test_idempotent_save_replaces_in_place() {
        let dir = tempdir().unwrap();
        let mut store = XmlStore::open(&dir.path().join("audits.xml")).unwrap();

        let mut first = record(&[("gender", "female")]);
        first.set_id("AUD1");
        store.save(&mut first).unwrap();

        store.save(&mut record(&[("gender", "male")])).unwrap();
        assert_eq!(store.count(), 2);

        // Same id again: replaced, not duplicated, position preserved
        let mut updated = record(&[("gender", "female"), ("services", "surgery")]);
        updated.set_id("AUD1");
        store.save(&mut updated).unwrap();

        assert_eq!(store.count(), 2);
        let all = store.find_all();
        assert_eq!(all[0].id(), Some("AUD1"));
        assert_eq!(all[0].get("services"), Some("surgery"));
    }

    #[test]
    fn test_saves_without_ids_are_unique() {
        let dir = tempdir().unwrap();
        let mut store = XmlStore::open(&dir.path().join("audits.xml")).unwrap();

        let mut ids: Vec<String> = (0..20)
            .map(|_| store.save(&mut record(&[("k", "v")])).unwrap())
            .collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
        assert_eq!(store.count(), 20);
    }

    #[test]
    fn test_delete_then_find() {
        let dir = tempdir().unwrap();
        let mut store = XmlStore::open(&dir.path().join("audits.xml")).unwrap();

        let id = store.save(&mut record(&[("k", "v")])).unwrap();
        assert_eq!(store.count(), 1);

        assert!(store.delete(&id).unwrap());
        assert!(store.find_by_id(&id).is_none());
        assert_eq!(store.count(), 0);

        // Deleting a nonexistent id is false, not an error
        assert!(!store.delete(&id).unwrap());
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn test_persistence_across_handles() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audits.xml");

        let id = {
            let mut store = XmlStore::open(&path).unwrap();
            store
                .save(&mut record(&[("note", "value with <markup> & quotes \"'")]))
                .unwrap()
        };

        let store = XmlStore::open(&path).unwrap();
        let found = store.find_by_id(&id).unwrap();
        assert_eq!(found.get("note"), Some("value with <markup> & quotes \"'"));
    }

    #[test]
    fn test_find_by_conjunction() {
        let dir = tempdir().unwrap();
        let mut store = XmlStore::open(&dir.path().join("audits.xml")).unwrap();

        store
            .save(&mut record(&[
                ("gender", "female"),
                ("primary-diagnosis", "breast-cancer"),
            ]))
            .unwrap();
        store
            .save(&mut record(&[
                ("gender", "male"),
                ("primary-diagnosis", "breast-cancer"),
            ]))
            .unwrap();

        let criteria = Criteria::new()
            .with("gender", "female")
            .with("primary-diagnosis", "breast-cancer");
        let matches = store.find_by(&criteria);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].get("gender"), Some("female"));
    }

    #[test]
    fn test_backup_is_byte_identical() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audits.xml");
        let mut store = XmlStore::open(&path).unwrap();
        store.save(&mut record(&[("gender", "female")])).unwrap();

        let backup_path = store.backup().unwrap();
        assert_eq!(
            fs::read(&path).unwrap(),
            fs::read(&backup_path).unwrap()
        );
    }

    #[test]
    fn test_backup_to_configured_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audits.xml");
        let mut store = XmlStore::open(&path).unwrap();
        store.save(&mut record(&[("gender", "male")])).unwrap();

        // Destination does not exist yet
        let dest = dir.path().join("backups");
        let backup_path = store.backup_to(&dest).unwrap();

        assert_eq!(backup_path.parent(), Some(dest.as_path()));
        assert_eq!(fs::read(&path).unwrap(), fs::read(&backup_path).unwrap());
    }

    #[test]
    fn test_corrupt_database_fails_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audits.xml");
        fs::write(&path, "<audit-database><records>").unwrap();

        assert!(matches!(XmlStore::open(&path), Err(StoreError::Xml(_))));
    }

    #[test]
    fn test_raw_query_skips_non_record_matches() {
        let dir = tempdir().unwrap();
        let mut store = XmlStore::open(&dir.path().join("audits.xml")).unwrap();
        store.save(&mut record(&[("gender", "female")])).unwrap();

        // Matches field nodes, which are not records
        assert!(store.query("//field").unwrap().is_empty());

        let records = store.query("//record[field[@name='gender' and text()='female']]");
        assert_eq!(records.unwrap().len(), 1);
    }
}
