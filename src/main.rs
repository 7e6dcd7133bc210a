use clap::{ArgAction, Parser};
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use std::process::ExitCode;
use todostore::{BridgeError, Config, Store, bridge};
use tracing::{Level, info, info_span};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "todostore")]
#[command(about = "TodoStore CLI - run a single task or label operation with a JSON payload")]
#[command(version = env!("GIT_DESCRIBE"))]
struct Cli {
    /// Path to the database file (default: $DB_PATH, then todo.db)
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log more to stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Operation to run: get_tasks, get_task, add_task, update_task, mark_completed,
    /// delete_task, add_label, get_label, get_labels, delete_label, link_task_label,
    /// get_task_labels, clear_task_labels
    command: String,

    /// JSON payload for the operation
    #[arg(default_value = "{}")]
    payload: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing; stdout is reserved for results
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(value) => {
            println!("{}", value);
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}", e.to_json());
            eprintln!("{} [{}] {}", "error:".red().bold(), e.code().yellow(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<Value, BridgeError> {
    let config = match &cli.config {
        Some(path) => Config::load(path).map_err(BridgeError::Config)?,
        None => Config::default(),
    };
    let payload = bridge::parse_payload(&cli.payload)?;
    let db_path = config.resolve_db_path(cli.db.as_deref());

    let span = info_span!("request", request_id = %Uuid::now_v7(), command = %cli.command);
    span.in_scope(|| info!(db = %db_path.display(), "Bridge started"));

    let mut store = Store::open_with(&db_path, &config, span.clone())?;
    let result = span.in_scope(|| bridge::dispatch(&mut store, &cli.command, payload));
    store.close();
    result
}
