//! AuditDB CLI - Main entry point for CLI binary
//!
//! This binary provides the `auditdb` CLI tool for managing audit stores.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use auditdb_lib::engine::{
    cli::{formatter, Cli, Commands, OutputFormat},
    config::{Config, ConfigError},
    store::{AuditRecord, Criteria, ExportFormat, SchemaDoc, XmlStore},
};
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_cli(cli) {
        formatter::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let project_dir = cli.project_dir();
    let json_output = cli.format == OutputFormat::Json;

    match cli.command {
        Commands::Init => cmd_init(&project_dir, json_output),
        Commands::Save { id, fields } => cmd_save(&project_dir, id, fields, json_output),
        Commands::Get { id } => cmd_get(&project_dir, &id, json_output),
        Commands::Find { conditions } => cmd_find(&project_dir, conditions, json_output),
        Commands::List => cmd_list(&project_dir, json_output),
        Commands::Delete { id } => cmd_delete(&project_dir, &id, json_output),
        Commands::Stats => cmd_stats(&project_dir, json_output),
        Commands::Export { export_format, out } => {
            cmd_export(&project_dir, export_format, out, json_output)
        }
        Commands::Backup => cmd_backup(&project_dir, json_output),
        Commands::Validate { schema } => cmd_validate(&project_dir, schema, json_output),
        Commands::Query { expr } => cmd_query(&project_dir, &expr, json_output),
        Commands::Status => cmd_status(&project_dir, json_output),
    }
}

/// Load the project config, falling back to defaults when none exists
fn load_config(project_dir: &Path) -> anyhow::Result<Config> {
    match Config::load(project_dir) {
        Ok(config) => Ok(config),
        Err(ConfigError::NotFound(_)) => Ok(Config::default_for_project()),
        Err(e) => Err(e).context("failed to load auditdb.config.json"),
    }
}

fn open_store(project_dir: &Path) -> anyhow::Result<(Config, XmlStore)> {
    let config = load_config(project_dir)?;
    let store = XmlStore::open(&config.database_path(project_dir))?
        .with_schema_path(&config.schema_path(project_dir));
    Ok((config, store))
}

fn cmd_init(project_dir: &Path, json: bool) -> anyhow::Result<()> {
    if project_dir.join("auditdb.config.json").exists() {
        anyhow::bail!("project already initialized: {}", project_dir.display());
    }

    fs::create_dir_all(project_dir)?;
    let config = Config::default_for_project();
    config.save(project_dir)?;

    // Default schema generated from the required form fields
    let schema = SchemaDoc::with_required(&config.form.required_fields);
    schema.save(&config.schema_path(project_dir))?;

    // Create an empty, immediately loadable database
    let store = XmlStore::open(&config.database_path(project_dir))?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "success": true,
                "project_dir": project_dir,
                "database": store.path(),
            }))?
        );
    } else {
        formatter::success(&format!("Initialized project in {}", project_dir.display()));
        formatter::kv("database", &store.path().display().to_string());
        formatter::kv(
            "schema",
            &config.schema_path(project_dir).display().to_string(),
        );
    }
    Ok(())
}

fn cmd_save(
    project_dir: &Path,
    id: Option<String>,
    fields: Vec<(String, String)>,
    json: bool,
) -> anyhow::Result<()> {
    let (_, mut store) = open_store(project_dir)?;

    let mut record = AuditRecord::new();
    if let Some(id) = id {
        record.set_id(&id);
    }
    for (key, value) in &fields {
        record.set(key, Some(value));
    }

    let id = store.save(&mut record)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "success": true, "id": id }))?
        );
    } else {
        formatter::success(&format!("Saved record {id}"));
    }
    Ok(())
}

fn cmd_get(project_dir: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let (_, store) = open_store(project_dir)?;

    match store.find_by_id(id) {
        Some(record) => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "success": true,
                        "record": record.to_summary(),
                    }))?
                );
            } else {
                print_record(&record);
            }
        }
        // Not found is an empty payload, not an error
        None => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({
                        "success": true,
                        "record": null,
                    }))?
                );
            } else {
                formatter::info(&format!("No record with id {id}"));
            }
        }
    }
    Ok(())
}

fn cmd_find(
    project_dir: &Path,
    conditions: Vec<(String, String)>,
    json: bool,
) -> anyhow::Result<()> {
    let (_, store) = open_store(project_dir)?;

    let mut criteria = Criteria::new();
    for (field, value) in &conditions {
        criteria.push(field, value);
    }

    print_records(&store.find_by(&criteria), json)
}

fn cmd_list(project_dir: &Path, json: bool) -> anyhow::Result<()> {
    let (_, store) = open_store(project_dir)?;
    print_records(&store.find_all(), json)
}

fn cmd_delete(project_dir: &Path, id: &str, json: bool) -> anyhow::Result<()> {
    let (_, mut store) = open_store(project_dir)?;
    let deleted = store.delete(id)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "success": true, "deleted": deleted }))?
        );
    } else if deleted {
        formatter::success(&format!("Deleted record {id}"));
    } else {
        formatter::info(&format!("No record with id {id}"));
    }
    Ok(())
}

fn cmd_stats(project_dir: &Path, json: bool) -> anyhow::Result<()> {
    let (_, store) = open_store(project_dir)?;
    let stats = store.statistics();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        formatter::header("Statistics");
        formatter::kv("total_records", &stats.total_records.to_string());
        formatter::kv(
            "gender",
            &format!(
                "male {} / female {}",
                stats.gender_breakdown.male, stats.gender_breakdown.female
            ),
        );
        formatter::kv("avg_waiting_time", &format!("{:.1}", stats.avg_waiting_time));
        for (diagnosis, count) in &stats.diagnosis_breakdown {
            formatter::item(&format!("diagnosis {diagnosis}: {count}"));
        }
        for (service, count) in &stats.services_breakdown {
            formatter::item(&format!("service {service}: {count}"));
        }
    }
    Ok(())
}

fn cmd_export(
    project_dir: &Path,
    format: ExportFormat,
    out: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let (_, store) = open_store(project_dir)?;
    let data = store.export(format)?;

    match out {
        Some(path) => {
            fs::write(&path, &data)
                .with_context(|| format!("failed to write {}", path.display()))?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&json!({ "success": true, "path": path }))?
                );
            } else {
                formatter::success(&format!("Exported to {}", path.display()));
            }
        }
        None => print!("{data}"),
    }
    Ok(())
}

fn cmd_backup(project_dir: &Path, json: bool) -> anyhow::Result<()> {
    let (config, store) = open_store(project_dir)?;
    if !config.backup.enabled {
        anyhow::bail!("backups are disabled in auditdb.config.json");
    }

    let path = match config.backup_dir(project_dir) {
        Some(dest) => store.backup_to(&dest)?,
        None => store.backup()?,
    };
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "success": true, "path": path }))?
        );
    } else {
        formatter::success(&format!("Backup written to {}", path.display()));
    }
    Ok(())
}

fn cmd_validate(
    project_dir: &Path,
    schema: Option<PathBuf>,
    json: bool,
) -> anyhow::Result<()> {
    let (config, store) = open_store(project_dir)?;
    if schema.is_none() && !config.validation.enabled {
        anyhow::bail!("validation is disabled in auditdb.config.json");
    }

    store.validate(schema.as_deref())?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "success": true, "valid": true }))?
        );
    } else {
        formatter::success("Database is valid");
    }
    Ok(())
}

fn cmd_query(project_dir: &Path, expr: &str, json: bool) -> anyhow::Result<()> {
    let (_, store) = open_store(project_dir)?;
    print_records(&store.query(expr)?, json)
}

fn cmd_status(project_dir: &Path, json: bool) -> anyhow::Result<()> {
    let config = load_config(project_dir)?;
    let db_path = config.database_path(project_dir);
    let initialized = db_path.exists();
    let count = if initialized {
        XmlStore::open(&db_path)?.count()
    } else {
        0
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "initialized": initialized,
                "database": db_path,
                "records": count,
                "validation_enabled": config.validation.enabled,
                "backup_enabled": config.backup.enabled,
            }))?
        );
    } else {
        formatter::header("Project Status");
        formatter::kv("database", &db_path.display().to_string());
        formatter::kv("initialized", if initialized { "yes" } else { "no" });
        formatter::kv("records", &count.to_string());
        if !config.validation.enabled {
            formatter::warning("schema validation is disabled");
        }
    }
    Ok(())
}

fn print_record(record: &AuditRecord) {
    formatter::header(&format!("Record {}", record.id().unwrap_or("<no id>")));
    formatter::kv("created_at", &record.created_at().to_string());
    formatter::kv("updated_at", &record.updated_at().to_string());
    for (name, value) in record.fields() {
        formatter::kv(name, value.as_str().unwrap_or(""));
    }
}

fn print_records(records: &[AuditRecord], json: bool) -> anyhow::Result<()> {
    if json {
        let summaries: Vec<_> = records.iter().map(AuditRecord::to_summary).collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "success": true,
                "count": records.len(),
                "records": summaries,
            }))?
        );
    } else if records.is_empty() {
        formatter::info("No matching records");
    } else {
        for record in records {
            print_record(record);
        }
    }
    Ok(())
}
