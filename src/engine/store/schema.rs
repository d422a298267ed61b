//! Schema validation for the on-disk tree
//!
//! Schema documents are JSON descriptions of what a valid record looks
//! like. The store treats them as an opaque validation contract: load the
//! document, walk the tree, collect one diagnostic per violation.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::xml::Element;

use super::error::{Result, StoreError};

/// One schema violation: a node position plus a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub position: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.position, self.message)
    }
}

/// Expected field value shape
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    #[default]
    Any,
    String,
    Number,
}

/// Per-field rule in a schema document
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FieldRule {
    #[serde(rename = "type", default)]
    pub field_type: FieldType,

    #[serde(default)]
    pub required: bool,
}

fn default_true() -> bool {
    true
}

/// A schema document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDoc {
    pub version: u32,

    /// Field names required on every record (shorthand for a rule with
    /// `required: true`)
    #[serde(default)]
    pub required: Vec<String>,

    #[serde(default)]
    pub fields: BTreeMap<String, FieldRule>,

    /// Whether fields not listed in `fields` are allowed
    #[serde(default = "default_true")]
    pub allow_additional: bool,
}

impl SchemaDoc {
    pub fn new() -> Self {
        Self {
            version: 1,
            required: Vec::new(),
            fields: BTreeMap::new(),
            allow_additional: true,
        }
    }

    /// A schema requiring the given fields on every record
    pub fn with_required(names: &[String]) -> Self {
        let mut schema = Self::new();
        schema.required = names.to_vec();
        schema
    }

    /// Load a schema document; a missing file is a configuration error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(StoreError::Configuration(format!(
                "schema file not found: {}",
                path.display()
            )));
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Walk the tree and collect every violation. An empty result means
    /// the tree is valid.
    pub fn validate_tree(&self, root: &Element) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();

        let records = match root.find_child("records") {
            Some(records) => records,
            None => {
                diagnostics.push(Diagnostic {
                    position: format!("/{}", root.name),
                    message: "missing records container".to_string(),
                });
                return diagnostics;
            }
        };

        for (i, record) in records.children_named("record").enumerate() {
            let position = format!("/{}/records/record[{}]", root.name, i + 1);
            self.validate_record(record, &position, &mut diagnostics);
        }

        diagnostics
    }

    fn validate_record(&self, record: &Element, position: &str, out: &mut Vec<Diagnostic>) {
        if record.attr("id").map_or(true, str::is_empty) {
            out.push(Diagnostic {
                position: position.to_string(),
                message: "record has no id attribute".to_string(),
            });
        }

        let field_names: Vec<&str> = record
            .children_named("field")
            .filter_map(|f| f.attr("name"))
            .collect();

        for name in &self.required {
            if !field_names.contains(&name.as_str()) {
                out.push(Diagnostic {
                    position: position.to_string(),
                    message: format!("missing required field: {name}"),
                });
            }
        }
        for (name, rule) in &self.fields {
            if rule.required && !field_names.contains(&name.as_str()) {
                out.push(Diagnostic {
                    position: position.to_string(),
                    message: format!("missing required field: {name}"),
                });
            }
        }

        for (j, field) in record.children_named("field").enumerate() {
            let field_position = format!("{}/field[{}]", position, j + 1);
            let name = match field.attr("name") {
                Some(name) => name,
                None => {
                    out.push(Diagnostic {
                        position: field_position,
                        message: "field has no name attribute".to_string(),
                    });
                    continue;
                }
            };

            match self.fields.get(name) {
                Some(rule) => {
                    if rule.field_type == FieldType::Number
                        && !field.text.is_empty()
                        && field.text.trim().parse::<f64>().is_err()
                    {
                        out.push(Diagnostic {
                            position: field_position,
                            message: format!("field '{name}' is not numeric: {:?}", field.text),
                        });
                    }
                }
                None => {
                    if !self.allow_additional && !self.required.contains(&name.to_string()) {
                        out.push(Diagnostic {
                            position: field_position,
                            message: format!("unknown field: {name}"),
                        });
                    }
                }
            }
        }
    }
}

impl Default for SchemaDoc {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::xml::parse_document;
    use tempfile::tempdir;

    fn schema() -> SchemaDoc {
        let mut schema = SchemaDoc::with_required(&["gender".to_string()]);
        schema.fields.insert(
            "waiting-days".to_string(),
            FieldRule {
                field_type: FieldType::Number,
                required: false,
            },
        );
        schema
    }

    #[test]
    fn test_valid_tree_has_no_diagnostics() {
        let tree = parse_document(
            r#"<db><records>
  <record id="A1"><field name="gender">female</field><field name="waiting-days">21</field></record>
</records></db>"#,
        )
        .unwrap();

        assert!(schema().validate_tree(&tree).is_empty());
    }

    #[test]
    fn test_one_diagnostic_per_violation_with_position() {
        let tree = parse_document(
            r#"<db><records>
  <record id="A1"><field name="waiting-days">soon</field></record>
  <record id=""><field name="gender">male</field></record>
</records></db>"#,
        )
        .unwrap();

        let diagnostics = schema().validate_tree(&tree);
        assert_eq!(diagnostics.len(), 3);
        assert_eq!(diagnostics[0].position, "/db/records/record[1]");
        assert!(diagnostics[0].message.contains("gender"));
        assert!(diagnostics[1].message.contains("not numeric"));
        assert!(diagnostics[2].message.contains("no id"));

        // one line per violation
        let rendered = diagnostics
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("\n");
        assert_eq!(rendered.lines().count(), 3);
    }

    #[test]
    fn test_unknown_field_rejected_when_strict() {
        let mut strict = schema();
        strict.allow_additional = false;

        let tree = parse_document(
            r#"<db><records>
  <record id="A1"><field name="gender">female</field><field name="surprise">x</field></record>
</records></db>"#,
        )
        .unwrap();

        let diagnostics = strict.validate_tree(&tree);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("unknown field"));
    }

    #[test]
    fn test_load_missing_file_is_configuration_error() {
        let dir = tempdir().unwrap();
        let err = SchemaDoc::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("schema/audit.schema.json");
        schema().save(&path).unwrap();

        let loaded = SchemaDoc::load(&path).unwrap();
        assert_eq!(loaded.required, vec!["gender"]);
        assert_eq!(
            loaded.fields.get("waiting-days").unwrap().field_type,
            FieldType::Number
        );
    }
}
