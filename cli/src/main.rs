#![allow(clippy::print_stdout, reason = "this binary's whole job is printing query results")]
use crate::cli::{Args, Command};
use anyhow::{Context, Result};
use clap::Parser;
use rdfsql_engine::{EngineOptions, SparqlEngine};
use rdfsql_model::Value;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod cli;
mod ontology_file;

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    match args.command {
        Command::Query { database, ontology, query_file } => run_query(&database, &ontology, &query_file),
        Command::Update { database, ontology, update_file } => run_update(&database, &ontology, &update_file),
    }
}

fn open_engine(database: &str, ontology_path: &Path) -> Result<SparqlEngine> {
    let ontology = ontology_file::load(ontology_path)?;
    SparqlEngine::open(database, ontology, EngineOptions::default())
        .with_context(|| format!("opening database {database}"))
}

fn run_query(database: &str, ontology_path: &Path, query_file: &Path) -> Result<()> {
    let engine = open_engine(database, ontology_path)?;
    let text = fs::read_to_string(query_file).with_context(|| format!("reading {}", query_file.display()))?;
    let handle = engine.open_query(&text).context("compiling query")?;
    if handle.is_serializable() {
        println!("# CONSTRUCT/DESCRIBE result; graph serialization is left to a caller that walks the solutions below");
    }
    let mut cursor = engine.execute_cursor(&handle, &HashMap::new()).context("running query")?;
    let headers: Vec<String> = (0..cursor.n_columns()).map(|i| cursor.variable_name(i).to_owned()).collect();
    println!("{}", headers.join("\t"));
    while cursor.next() {
        let row: Vec<String> = (0..cursor.n_columns()).map(|i| format_value(cursor.get_value(i))).collect();
        println!("{}", row.join("\t"));
    }
    Ok(())
}

fn run_update(database: &str, ontology_path: &Path, update_file: &Path) -> Result<()> {
    let engine = open_engine(database, ontology_path)?;
    let text = fs::read_to_string(update_file).with_context(|| format!("reading {}", update_file.display()))?;
    let handle = engine.open_update(&text).context("planning update")?;
    let bnodes = engine
        .execute_update(&handle, &HashMap::new(), HashMap::new(), true)
        .context("running update")?;
    for binding in bnodes.iter().flat_map(|row| row.iter()) {
        println!("_:{} -> {}", binding.0, binding.1);
    }
    Ok(())
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Int64(i) => i.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::DateTime(dt) => dt.to_string(),
        Value::Bytes(bytes) => format!("{bytes:?}"),
        Value::LangString(bytes) => {
            let (text, lang) = Value::lang_string_parts(bytes);
            format!("{text}@{lang}")
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use assert_fs::prelude::*;
    use assert_fs::{NamedTempFile, TempDir};
    use predicates::prelude::*;

    fn cli_command() -> Command {
        let mut command = Command::new(env!("CARGO"));
        command.arg("run").arg("--bin").arg("rdfsql-cli").arg("--");
        command
    }

    const CATALOG: &str = "property <http://ex/name> string Person name single\n";

    #[test]
    fn clap_debug() {
        use super::cli::Args;
        use clap::CommandFactory;

        Args::command().debug_assert();
    }

    #[test]
    fn update_then_query_round_trips_through_a_database_file() {
        let dir = TempDir::new().expect("creates temp dir");
        let db = dir.child("store.sqlite");
        let catalog = NamedTempFile::new("catalog.rdfsql").expect("creates temp file");
        catalog.write_str(CATALOG).expect("writes catalog");
        let update_file = NamedTempFile::new("insert.ru").expect("creates temp file");
        update_file.write_str("INSERT DATA { <http://ex/a> <http://ex/name> \"Ada\" }").expect("writes update");

        cli_command()
            .arg("update")
            .arg(db.path())
            .arg("--ontology")
            .arg(catalog.path())
            .arg(update_file.path())
            .assert()
            .success();

        let query_file = NamedTempFile::new("select.rq").expect("creates temp file");
        query_file
            .write_str("SELECT ?name WHERE { <http://ex/a> <http://ex/name> ?name }")
            .expect("writes query");
        cli_command()
            .arg("query")
            .arg(db.path())
            .arg("--ontology")
            .arg(catalog.path())
            .arg(query_file.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("Ada"));
    }
}
