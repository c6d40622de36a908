//! Invocation glue around the reconciliation engine.
//!
//! Thin by design: validate the input, fetch credentials, open a session,
//! run `ensure_schema`, and print the `{status, message}` record on stdout.
//! Errors never escape as panics — the caller always gets the record.

mod secrets;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use trueup::{
    CredentialProvider, DbConfig, Outcome, ReconcileOptions, Status, connect, ensure_schema,
};

use crate::secrets::{EnvCredentials, FileCredentials};

/// Environment variable holding the inline secret payload when no secret
/// file is configured.
const DEFAULT_SECRET_ID: &str = "DB_SECRET";

/// Ensure a Postgres embeddings table matches its desired schema.
#[derive(Parser, Debug)]
#[command(name = "trueup", version)]
struct Cli {
    /// Table to reconcile
    table: String,

    /// Embedding dimensionality for the vector column
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value_t = trueup::DEFAULT_DIMENSIONS)]
    dimensions: u32,

    /// Permit destructive migration of a mismatched table
    #[arg(long, env = "TRUEUP_ALLOW_DESTRUCTIVE")]
    allow_destructive: bool,

    /// Skip the per-table advisory lock
    #[arg(long)]
    no_advisory_lock: bool,

    /// Database host
    #[arg(long, env = "DB_HOST")]
    host: String,

    /// Database port
    #[arg(long, env = "DB_PORT", default_value_t = 5432)]
    port: u16,

    /// Database name
    #[arg(long, env = "DB_NAME")]
    dbname: String,

    /// Path to a JSON file holding {"username": ..., "password": ...};
    /// falls back to the DB_SECRET environment variable
    #[arg(long, env = "DB_SECRET_FILE")]
    secret_file: Option<String>,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let outcome = run(cli).await;

    match serde_json::to_string(&outcome) {
        Ok(json) => println!("{json}"),
        Err(_) => println!(r#"{{"status":"error","message":"failed to encode outcome"}}"#),
    }
    if outcome.status == Status::Error {
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Outcome {
    let credentials = match &cli.secret_file {
        Some(path) => FileCredentials.get_credentials(path),
        None => EnvCredentials.get_credentials(DEFAULT_SECRET_ID),
    };
    let credentials = match credentials {
        Ok(c) => c,
        Err(e) => return Outcome::error(e.to_string()),
    };

    let config = DbConfig::new(cli.host, cli.port, cli.dbname);
    let session = match connect(&config, &credentials).await {
        Ok(s) => s,
        Err(e) => return Outcome::error(e.to_string()),
    };

    let options = ReconcileOptions {
        dimensions: cli.dimensions,
        allow_destructive: cli.allow_destructive,
        advisory_lock: !cli.no_advisory_lock,
    };
    Outcome::from_result(ensure_schema(&session, &cli.table, &options).await)
}
