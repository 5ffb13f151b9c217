use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use object_path_analyzer::{read_addresses, report_min_max};
use rating_kernel_api::{RatingApi, API_CONTRACT_VERSION};
use rating_kernel_core::{Record, RecordIdentity};
use rating_kernel_store_fs::{RecordStore, StoreError};
use serde_json::{json, Value};

const CLI_CONTRACT_VERSION: &str = "cli.v1";

/// Exit status of `store save` when identical content is already stored.
const EXIT_DUPLICATE: u8 = 3;

#[derive(Debug, Parser)]
#[command(name = "rk")]
#[command(about = "Rating Kernel CLI")]
struct Cli {
    #[arg(long, global = true, env = "DATA_DIRECTORY", default_value = "./ratings")]
    data_directory: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Store {
        #[command(subcommand)]
        command: StoreCommand,
    },
    Api {
        #[command(subcommand)]
        command: ApiCommand,
    },
    Paths {
        #[command(subcommand)]
        command: PathsCommand,
    },
}

#[derive(Debug, Subcommand)]
enum StoreCommand {
    /// Store a flat JSON object unless identical content already exists.
    Save(JsonArgs),
    Exists(IdentityArgs),
    State(IdentityArgs),
    /// Count written slots and list claimed-but-unwritten ones.
    Scan,
    /// Print the identity and canonical form of a JSON object without storing it.
    Hash(JsonArgs),
}

#[derive(Debug, Subcommand)]
enum ApiCommand {
    Rate(JsonArgs),
    Save(JsonArgs),
    /// Save any flat JSON object through the API status mapping.
    SaveRecord(JsonArgs),
}

#[derive(Debug, Subcommand)]
enum PathsCommand {
    /// Write the earliest and latest month per id under one bucket path.
    Report(PathsReportArgs),
}

#[derive(Debug, Args)]
struct JsonArgs {
    #[arg(long)]
    json: String,
}

#[derive(Debug, Args)]
struct IdentityArgs {
    identity: String,
}

#[derive(Debug, Args)]
struct PathsReportArgs {
    #[arg(long = "input")]
    input: PathBuf,
    #[arg(long)]
    bucket: String,
    #[arg(long)]
    full_path: String,
    #[arg(long)]
    out: PathBuf,
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn parse_json_arg(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).with_context(|| format!("--json is not valid JSON: {raw}"))
}

fn parse_record(raw: &str) -> Result<Record> {
    Record::from_json(&parse_json_arg(raw)?).context("record cannot be stored")
}

fn parse_identity(raw: &str) -> Result<RecordIdentity> {
    RecordIdentity::parse(raw).with_context(|| format!("invalid record identity {raw:?}"))
}

fn init_tracing() {
    // stdout carries the JSON contract; logs only appear on stderr when asked for.
    if std::env::var_os("RUST_LOG").is_none() {
        return;
    }
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();
    tracing::debug!(data_directory = %cli.data_directory.display(), "rk starting");

    match cli.command {
        Command::Store { command } => run_store(command, &cli.data_directory),
        Command::Api { command } => run_api(command, &cli.data_directory),
        Command::Paths { command } => run_paths(command),
    }
}

fn open_store(data_directory: &Path) -> Result<RecordStore> {
    RecordStore::open(data_directory)
        .with_context(|| format!("failed to open data directory {}", data_directory.display()))
}

fn run_store(command: StoreCommand, data_directory: &Path) -> Result<ExitCode> {
    match command {
        StoreCommand::Save(args) => {
            let record = parse_record(&args.json)?;
            let store = open_store(data_directory)?;
            match store.save(&record) {
                Ok(location) => {
                    emit_json(json!({
                        "status": "saved",
                        "identity": record.identity(),
                        "location": location,
                    }))?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(StoreError::DuplicateRecord { identity }) => {
                    emit_json(json!({ "status": "duplicate", "identity": identity }))?;
                    Ok(ExitCode::from(EXIT_DUPLICATE))
                }
                Err(err) => Err(err).context("failed to save record"),
            }
        }
        StoreCommand::Exists(args) => {
            let identity = parse_identity(&args.identity)?;
            let exists = open_store(data_directory)?.exists(&identity)?;
            emit_json(json!({ "identity": identity, "exists": exists }))?;
            Ok(ExitCode::SUCCESS)
        }
        StoreCommand::State(args) => {
            let identity = parse_identity(&args.identity)?;
            let state = open_store(data_directory)?.slot_state(&identity)?;
            emit_json(json!({ "identity": identity, "state": state }))?;
            Ok(ExitCode::SUCCESS)
        }
        StoreCommand::Scan => {
            let report = open_store(data_directory)?.scan()?;
            emit_json(serde_json::to_value(report)?)?;
            Ok(ExitCode::SUCCESS)
        }
        StoreCommand::Hash(args) => {
            let record = parse_record(&args.json)?;
            emit_json(json!({
                "identity": record.identity(),
                "canonical_json": record.canonical_json(),
            }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn run_api(command: ApiCommand, data_directory: &Path) -> Result<ExitCode> {
    let api = RatingApi::open(data_directory)
        .with_context(|| format!("failed to open data directory {}", data_directory.display()))?;
    let response = match command {
        ApiCommand::Rate(args) => api.rate(&parse_json_arg(&args.json)?),
        ApiCommand::Save(args) => api.save_rating(&parse_json_arg(&args.json)?),
        ApiCommand::SaveRecord(args) => api.save_record(&parse_json_arg(&args.json)?),
    };
    emit_json(json!({
        "api_contract_version": API_CONTRACT_VERSION,
        "status": response.status,
        "body": response.body,
    }))?;
    Ok(ExitCode::SUCCESS)
}

fn run_paths(command: PathsCommand) -> Result<ExitCode> {
    match command {
        PathsCommand::Report(args) => {
            let addresses = read_addresses(&args.input)?;
            let ranges = report_min_max(&addresses, &args.bucket, &args.full_path, &args.out)?;
            emit_json(json!({
                "addresses": addresses.len(),
                "ids": ranges.len(),
                "out": args.out.display().to_string(),
            }))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
