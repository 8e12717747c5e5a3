//! Taskboard command line probe.
//!
//! # Responsibility
//! - Drive the core dispatcher end to end against the SQLite reference
//!   server or a live HTTP API.
//! - Keep output line-oriented for quick local sanity checks.

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use taskboard_core::{
    core_version, default_log_level, init_logging, CommandDispatcher, CommandOutcome,
    HttpRemote, NewTask, RemoteErrorKind, RemoteFailure, RemoteSyncClient, SqliteServer,
    SyncConfig, TaskPatch, TaskStatus, VisibleEntity, TASKS_COLLECTION,
};

#[derive(Debug, Parser)]
#[command(name = "taskboard", version = core_version(), about = "Optimistic task sync probe")]
struct Cli {
    /// SQLite file for the reference server; in-memory when omitted.
    #[arg(long, env = "TASKBOARD_DB")]
    db: Option<PathBuf>,

    /// JSON sync configuration; built-in collections when omitted.
    #[arg(long, env = "TASKBOARD_CONFIG")]
    config: Option<PathBuf>,

    /// Absolute directory for rolling log files.
    #[arg(long, env = "TASKBOARD_LOG_DIR")]
    log_dir: Option<String>,

    #[arg(long, default_value_t = default_log_level().to_string())]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Seed the reference server and run a create/update/delete round.
    Demo {
        /// Make the status update fail to show the rollback.
        #[arg(long)]
        fail_update: bool,
    },
    /// Refresh a collection and print its entities.
    List {
        #[arg(long, default_value = TASKS_COLLECTION)]
        collection: String,

        #[arg(long, value_enum, default_value_t = Backend::Local)]
        remote: Backend,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    Local,
    Http,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(log_dir) = cli.log_dir.as_deref() {
        init_logging(&cli.log_level, log_dir)?;
    }
    let config = match cli.config.as_ref() {
        Some(path) => SyncConfig::load(path)?,
        None => SyncConfig::builtin(),
    }
    .with_env_overrides()?;
    info!(
        "event=cli_start module=cli status=ok version={} collections={}",
        core_version(),
        config.collections.len()
    );

    match cli.command {
        Command::Demo { fail_update } => {
            let server = Arc::new(open_server(cli.db.as_ref(), &config)?);
            run_demo(server, &config, fail_update).await
        }
        Command::List { collection, remote } => {
            let client: Arc<dyn RemoteSyncClient> = match remote {
                Backend::Local => {
                    let server = open_server(cli.db.as_ref(), &config)?;
                    server.seed_demo_data()?;
                    Arc::new(server)
                }
                Backend::Http => Arc::new(HttpRemote::new(
                    &config.remote,
                    &config.schema_registry()?,
                )?),
            };
            let registry = config.schema_registry()?;
            let schema = registry
                .get(&collection)
                .cloned()
                .ok_or_else(|| format!("unknown collection `{collection}`"))?;
            let dispatcher = CommandDispatcher::new(schema, client);
            let count = dispatcher.refresh().await?;
            println!("{collection}: {count} entities");
            print_visible(&dispatcher.visible());
            Ok(())
        }
    }
}

fn open_server(
    db: Option<&PathBuf>,
    config: &SyncConfig,
) -> Result<SqliteServer, Box<dyn std::error::Error>> {
    let registry = config.schema_registry()?;
    Ok(match db {
        Some(path) => SqliteServer::open(path, registry)?,
        None => SqliteServer::in_memory(registry)?,
    })
}

async fn run_demo(
    server: Arc<SqliteServer>,
    config: &SyncConfig,
    fail_update: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    server.seed_demo_data()?;
    let schema = config
        .schema_registry()?
        .get(TASKS_COLLECTION)
        .cloned()
        .ok_or("tasks collection is not configured")?;
    let client: Arc<dyn RemoteSyncClient> = server.clone();
    let dispatcher = CommandDispatcher::new(schema, client);
    dispatcher.refresh().await?;

    let pending = dispatcher.create(NewTask::new("Write docs").into_fields())?;
    println!("issued create, visible={}", dispatcher.visible().len());
    let created = match pending.resolve().await? {
        CommandOutcome::Created(entity) => entity,
        other => return Err(format!("unexpected create outcome {other:?}").into()),
    };
    println!("created id={}", created.id);

    if fail_update {
        server.fail_next(RemoteFailure::new(
            RemoteErrorKind::Status(500),
            "injected by --fail-update",
        ));
    }
    let pending = dispatcher.update(
        created.id,
        TaskPatch::status(TaskStatus::Completed).into_fields(),
    )?;
    println!(
        "issued update, visible status={}",
        dispatcher
            .get_visible(created.id)
            .and_then(|entity| entity.text("status").map(str::to_string))
            .unwrap_or_default()
    );
    match pending.resolve().await {
        Ok(outcome) => println!("update resolved: {}", describe(&outcome)),
        Err(err) => println!("update rolled back: {err}"),
    }

    let pending = dispatcher.delete(created.id)?;
    println!("issued delete, hidden={}", dispatcher.get_visible(created.id).is_none());
    println!("delete resolved: {}", describe(&pending.resolve().await?));

    print_visible(&dispatcher.visible());
    Ok(())
}

fn describe(outcome: &CommandOutcome) -> String {
    match outcome {
        CommandOutcome::Created(entity) => format!("created {}", entity.id),
        CommandOutcome::Updated(entity) => format!("updated {}", entity.id),
        CommandOutcome::Deleted(id) => format!("deleted {id}"),
        CommandOutcome::Superseded { id, op } => format!("{op} of {id} superseded"),
    }
}

fn print_visible(entities: &[VisibleEntity]) {
    for entity in entities {
        let id = entity
            .id()
            .map_or_else(|| "pending".to_string(), |id| id.to_string());
        let fields = entity
            .fields
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("{id}\t{fields}{}", if entity.pending { "\t*" } else { "" });
    }
}
