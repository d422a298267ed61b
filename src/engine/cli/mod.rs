//! AuditDB CLI Module
//! Command-line interface for AuditDB operations

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::engine::store::ExportFormat;

pub mod formatter;

#[derive(Parser, Debug)]
#[command(name = "auditdb")]
#[command(author = "AuditDB Team")]
#[command(version)]
#[command(about = "Embedded XML-backed document store for audit records", long_about = None)]
pub struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new AuditDB project
    Init,

    /// Save a record (creates or replaces by id)
    Save {
        /// Record id; omit to generate one
        #[arg(long)]
        id: Option<String>,

        /// Field values as key=value pairs
        #[arg(required = true, value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Look up a record by id
    Get {
        /// Record id
        id: String,
    },

    /// Find records matching every given field equality
    Find {
        /// Condition as key=value (repeatable)
        #[arg(short = 'w', long = "where", required = true, value_parser = parse_key_value)]
        conditions: Vec<(String, String)>,
    },

    /// List all records
    List,

    /// Delete a record by id
    Delete {
        /// Record id
        id: String,
    },

    /// Show aggregate statistics
    Stats,

    /// Export all records
    Export {
        /// Export format
        #[arg(short = 'F', long, value_enum, default_value = "json")]
        export_format: ExportFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Back up the database file
    Backup,

    /// Validate the database against a schema document
    Validate {
        /// Schema document path (defaults to the configured schema)
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Run a raw path query (trusted input only)
    Query {
        /// Path expression, e.g. //record[@id='AUD1']
        expr: String,
    },

    /// Show project status
    Status,
}

impl Cli {
    pub fn project_dir(&self) -> PathBuf {
        self.project
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

/// Parse a `key=value` argument
fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {s:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("gender=female").unwrap(),
            ("gender".to_string(), "female".to_string())
        );
        // values may contain '='
        assert_eq!(
            parse_key_value("note=a=b").unwrap(),
            ("note".to_string(), "a=b".to_string())
        );
        assert!(parse_key_value("no-separator").is_err());
        assert!(parse_key_value("=value").is_err());
    }

    #[test]
    fn test_cli_parses_find_command() {
        let cli = Cli::parse_from([
            "auditdb",
            "find",
            "--where",
            "gender=female",
            "-w",
            "primary-diagnosis=breast-cancer",
        ]);
        match cli.command {
            Commands::Find { conditions } => assert_eq!(conditions.len(), 2),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
