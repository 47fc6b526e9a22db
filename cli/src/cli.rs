use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

#[derive(Parser)]
#[command(about, version, name = "rdfsql-cli")]
/// Runs a SPARQL query or update against an rdfsql-engine database file
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile and run a SPARQL query, printing its solutions
    Query {
        /// Path to the SQLite database file, or ":memory:" for a scratch one
        #[arg(value_hint = ValueHint::FilePath)]
        database: String,
        /// Ontology catalog describing the database's tables and columns
        #[arg(long, value_hint = ValueHint::FilePath)]
        ontology: PathBuf,
        /// File containing the SPARQL query text
        #[arg(value_hint = ValueHint::FilePath)]
        query_file: PathBuf,
    },
    /// Compile and run a SPARQL update, reporting any blank nodes it allocated
    Update {
        /// Path to the SQLite database file, or ":memory:" for a scratch one
        #[arg(value_hint = ValueHint::FilePath)]
        database: String,
        /// Ontology catalog describing the database's tables and columns
        #[arg(long, value_hint = ValueHint::FilePath)]
        ontology: PathBuf,
        /// File containing the SPARQL update text
        #[arg(value_hint = ValueHint::FilePath)]
        update_file: PathBuf,
    },
}
