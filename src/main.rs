use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use cubelink::config::{self, Config};
use cubelink::cube;
use cubelink::retry::RetryConfig;
use cubelink::router::{ConsolePrompt, Router};
use cubelink::session::SessionStore;
use cubelink::tracker::api::{ActivityApi, HttpApi};
use cubelink::tracker::TaskClient;

#[derive(Parser)]
#[command(
    name = "cubelinkd",
    about = "cubelinkd — links a Timeular tracking cube to a Hackaru time tracker",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file path (default: {data_dir}/config.yml)
    #[arg(long, env = "CUBELINK_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for the persisted session
    #[arg(long, env = "CUBELINK_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CUBELINK_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "CUBELINK_LOG_FILE")]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the cube and route orientation changes (default when no
    /// subcommand given).
    ///
    /// Loads the config, reuses the persisted session or prompts for the
    /// password, adopts any activity already running on the server, then
    /// subscribes to the cube. Ctrl-C / SIGTERM stops the current activity
    /// once (best effort) before exiting.
    ///
    /// Examples:
    ///   cubelinkd serve
    ///   cubelinkd
    Serve,
    /// Discard the persisted session and log in again.
    ///
    /// Use after a password change or when the server rejects the stored
    /// session.
    ///
    /// Examples:
    ///   cubelinkd login
    Login,
    /// List the account's projects and their ids.
    ///
    /// The ids go into the `mapping` section of the config file.
    ///
    /// Examples:
    ///   cubelinkd projects
    ///   cubelinkd projects --json
    Projects {
        /// Output as JSON array (for piping)
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Init once — must happen before any tracing calls.
    let log_level = args.log.as_deref().unwrap_or("info").to_owned();
    let _file_guard = setup_logging(&log_level, args.log_file.as_deref());

    let data_dir = args.data_dir.clone().unwrap_or_else(config::default_data_dir);
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join("config.yml"));

    // Fatal before anything touches BLE or HTTP.
    let config = Config::load(&config_path)?;
    let store = SessionStore::new(&data_dir);
    let client = Arc::new(TaskClient::new(HttpApi::new(config.endpoint())?));

    match args.command {
        Some(Command::Login) => {
            store.clear();
            ensure_session(&client, &config, &store).await?;
            println!("Session saved.");
        }
        Some(Command::Projects { json }) => {
            ensure_session(&client, &config, &store).await?;
            let projects = client.projects().await.context("listing projects")?;
            if json {
                println!("{}", serde_json::to_string(&projects)?);
            } else if projects.is_empty() {
                println!("No projects.");
            } else {
                println!("{:<10}  NAME", "ID");
                println!("{}", "-".repeat(40));
                for p in &projects {
                    println!("{:<10}  {}", p.id, p.name);
                }
            }
        }
        None | Some(Command::Serve) => {
            run_serve(&config, &store, client).await?;
        }
    }

    Ok(())
}

async fn run_serve(
    config: &Config,
    store: &SessionStore,
    client: Arc<TaskClient<HttpApi>>,
) -> Result<()> {
    ensure_session(&client, config, store).await?;

    // The server is the source of truth for "is something running".
    client
        .reconcile()
        .await
        .context("querying the working activity")?;

    let router = Router::new(config.mapping.clone(), client.clone(), ConsolePrompt);

    tokio::select! {
        res = cube::run(&config.cube.address, &router) => res?,
        _ = shutdown_signal() => {
            info!("shutdown signal received — stopping current activity");
            // One best-effort attempt; exit proceeds regardless of outcome.
            client.stop_current().await;
        }
    }
    info!("cubelinkd stopped");
    Ok(())
}

/// Reuse the persisted session when present, otherwise prompt for the
/// password and log in (retried with backoff on transient failures; fatal
/// otherwise).
async fn ensure_session(
    client: &TaskClient<HttpApi>,
    config: &Config,
    store: &SessionStore,
) -> Result<()> {
    if let Some(session) = store.load() {
        info!("reusing persisted session");
        client.api().set_session(&session);
        return Ok(());
    }

    let email = config.hackaru.email.clone();
    let password = tokio::task::spawn_blocking(move || {
        use std::io::Write;
        print!("Password for {email}: ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok();
        line.trim_end_matches(['\r', '\n']).to_string()
    })
    .await?;

    client
        .login(
            &config.hackaru.email,
            &password,
            &RetryConfig::default(),
            store,
        )
        .await
        .context("login failed")?;
    Ok(())
}

/// Resolves when a shutdown signal is received.
///
/// On Unix we listen for SIGTERM *and* Ctrl-C.
/// On other platforms we listen for Ctrl-C only.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("cubelinkd.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            tracing_subscriber::fmt()
                .with_env_filter(log_level)
                .compact()
                .init();
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(EnvFilter::new(log_level))
            .with(fmt::layer().compact())
            .with(fmt::layer().with_writer(non_blocking))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .init();
        None
    }
}
