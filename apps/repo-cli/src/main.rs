use std::env;
use std::process;

use chrono::Utc;
use repo_domain::adapters::memory_backend::MemoryBackend;
use repo_domain::{Backend, Context, ReadRepo, Repo, WriteRepo};
use sqlite_adapter::SqliteBackend;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

mod config;
mod note;

use config::{Config, LogFormat, StorageProvider};
use note::Note;

fn print_usage() {
    eprintln!(
        "{}\n\nUsage:\n  repo-cli save <body> [--id <uuid>] [--version <n>]\n  repo-cli find <id>\n  repo-cli list\n  repo-cli remove <id>\n  repo-cli clear\n\nEnvironment:\n  REPO_STORAGE=memory|sqlite  REPO_DB_PATH  REPO_DB_BUSY_TIMEOUT_MS\n  REPO_TABLE  REPO_NAMESPACE  LOG_FORMAT=pretty|json",
        repo_domain::about()
    );
}

#[derive(Debug, PartialEq)]
enum Command {
    Save {
        body: String,
        id: Option<Uuid>,
        version: i64,
    },
    Find(Uuid),
    List,
    Remove(Uuid),
    Clear,
}

fn parse_id(raw: Option<String>, cmd: &str) -> Result<Uuid, String> {
    let Some(raw) = raw else {
        return Err(format!("missing <id> for {}", cmd));
    };
    Uuid::parse_str(&raw).map_err(|e| format!("invalid id '{}': {}", raw, e))
}

/// Parse the arguments after the program name. `Ok(None)` means print usage.
fn parse_args<I: Iterator<Item = String>>(mut args: I) -> Result<Option<Command>, String> {
    let Some(cmd) = args.next() else {
        return Ok(None);
    };

    let command = match cmd.as_str() {
        "save" => {
            let Some(body) = args.next() else {
                return Err("missing <body> for save".into());
            };
            let mut id = None;
            let mut version = 1;

            // Parse simple flags: --id <uuid>, --version <n>
            let rest: Vec<String> = args.collect();
            let mut i = 0;
            while i < rest.len() {
                let Some(val) = rest.get(i + 1) else {
                    return Err(format!("{} requires a value", rest[i]));
                };
                match rest[i].as_str() {
                    "--id" => {
                        id = Some(
                            Uuid::parse_str(val).map_err(|e| format!("invalid --id: {}", e))?,
                        );
                    }
                    "--version" => {
                        version = val
                            .parse()
                            .map_err(|e| format!("invalid --version: {}", e))?;
                    }
                    unk => return Err(format!("unknown argument: {}", unk)),
                }
                i += 2;
            }
            Command::Save { body, id, version }
        }
        "find" => Command::Find(parse_id(args.next(), "find")?),
        "list" => Command::List,
        "remove" => Command::Remove(parse_id(args.next(), "remove")?),
        "clear" => Command::Clear,
        _ => return Ok(None),
    };
    Ok(Some(command))
}

fn to_json(note: &Note) -> Result<String, String> {
    serde_json::to_string(note).map_err(|e| format!("encode failed: {}", e))
}

fn execute<B: Backend + 'static>(
    repo: &Repo<Note, B>,
    ctx: &Context,
    command: Command,
) -> Result<(), String> {
    match command {
        Command::Save { body, id, version } => {
            let note = Note {
                id: id.unwrap_or_else(Uuid::new_v4),
                version,
                body,
                created_at: Utc::now(),
            };
            repo.save(ctx, &note)
                .map_err(|e| format!("save failed: {}", e))?;
            println!("{}", to_json(&note)?);
        }
        Command::Find(id) => {
            let note = repo.find(ctx, id).map_err(|e| format!("find failed: {}", e))?;
            println!("{}", to_json(&note)?);
        }
        Command::List => {
            let notes = repo.find_all(ctx).map_err(|e| format!("list failed: {}", e))?;
            for note in &notes {
                println!("{}", to_json(note)?);
            }
        }
        Command::Remove(id) => {
            repo.remove(ctx, id)
                .map_err(|e| format!("remove failed: {}", e))?;
            println!("removed: {}", id);
        }
        Command::Clear => {
            repo.clear(ctx).map_err(|e| format!("clear failed: {}", e))?;
            println!("cleared: {}", repo.table());
        }
    }
    Ok(())
}

/// Run `command`, then release the connection whatever the outcome.
fn run_with<B: Backend + 'static>(
    repo: Repo<Note, B>,
    ctx: &Context,
    command: Command,
) -> Result<(), String> {
    let result = execute(&repo, ctx, command);
    if let Err(e) = repo.close(ctx) {
        error!(error = %e, "failed to close repository");
        if result.is_ok() {
            return Err(format!("close failed: {}", e));
        }
    }
    result
}

fn run(cfg: &Config, command: Command) -> Result<(), String> {
    let ctx = Context::with_namespace(cfg.namespace.clone());
    info!(table = %cfg.table, storage = ?cfg.storage_provider, "opening repository");

    match cfg.storage_provider {
        StorageProvider::Sqlite => {
            let repo = Repo::<Note, SqliteBackend>::connect(cfg.table.clone(), &cfg.sqlite())
                .map_err(|e| format!("connect failed: {}", e))?
                .with_default_factory();
            repo.backend()
                .ensure_table::<Note>(&cfg.table)
                .map_err(|e| format!("table setup failed: {}", e))?;
            run_with(repo, &ctx, command)
        }
        StorageProvider::Memory => {
            let repo = Repo::<Note, MemoryBackend>::connect(cfg.table.clone(), &())
                .map_err(|e| format!("connect failed: {}", e))?
                .with_default_factory();
            run_with(repo, &ctx, command)
        }
    }
}

fn init_tracing(cfg: &Config) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries command output, so logs go to stderr.
    let registry = tracing_subscriber::registry().with(env_filter);
    match cfg.log_format {
        LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_timer(fmt::time::SystemTime)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Pretty => {
            registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }
}

fn main() {
    // Load and validate config first (fail fast on misconfiguration)
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            process::exit(1);
        }
    };

    let command = match parse_args(env::args().skip(1)) {
        Ok(Some(c)) => c,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(msg) => {
            eprintln!("error: {}", msg);
            process::exit(2);
        }
    };

    init_tracing(&cfg);

    if let Err(msg) = run(&cfg, command) {
        eprintln!("error: {}", msg);
        process::exit(1);
    }
}
