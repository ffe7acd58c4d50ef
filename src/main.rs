use anyhow::Result;
use clap::{Parser, Subcommand};
use nexusd::{config::DaemonConfig, guard, ipc, janitor, storage::Storage, AppContext};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "nexusd",
    about = "Nexus Core — B2B business-networking backend daemon",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "NEXUSD_PORT")]
    port: Option<u16>,

    /// Data directory for config and the SQLite database
    #[arg(long, env = "NEXUSD_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "NEXUSD_LOG")]
    log: Option<String>,

    /// Bind address for the WebSocket server (default: 127.0.0.1; use 0.0.0.0 for LAN access)
    #[arg(long, env = "NEXUSD_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "NEXUSD_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    ///
    /// Runs nexusd in the foreground.
    ///
    /// Examples:
    ///   nexusd serve
    ///   nexusd
    Serve,
    /// Create the first platform super-admin and print a bearer token.
    ///
    /// Refuses to run once any user exists — bootstrap is a first-run
    /// operation only. Subsequent admins are created over RPC.
    ///
    /// Example:
    ///   nexusd bootstrap --email ops@platform.example --password '...'
    Bootstrap {
        /// E-mail for the super-admin account
        #[arg(long)]
        email: String,
        /// Password for the super-admin account (min 8 chars)
        #[arg(long)]
        password: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        match args.command {
            None | Some(Command::Serve) => {
                run_server(
                    args.port,
                    args.data_dir,
                    args.log,
                    args.bind_address,
                    args.log_file,
                )
                .await
            }
            Some(Command::Bootstrap { email, password }) => {
                run_bootstrap(args.data_dir, email, password).await
            }
        }
    })
}

async fn run_server(
    port: Option<u16>,
    data_dir: Option<std::path::PathBuf>,
    log: Option<String>,
    bind_address: Option<String>,
    log_file: Option<std::path::PathBuf>,
) -> Result<()> {
    let config = Arc::new(DaemonConfig::new(port, data_dir, log, bind_address));
    let _log_guard = setup_logging(&config.log, log_file.as_deref());

    info!(version = env!("CARGO_PKG_VERSION"), "nexusd starting");
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        "config loaded"
    );

    let storage = Arc::new(
        Storage::new_with_slow_query(
            &config.data_dir,
            config.observability.slow_query_threshold_ms,
        )
        .await?,
    );

    let ctx = AppContext::build(config, storage);

    let _janitor = janitor::spawn(ctx.clone());

    ipc::run(ctx).await
}

async fn run_bootstrap(
    data_dir: Option<std::path::PathBuf>,
    email: String,
    password: String,
) -> Result<()> {
    let config = Arc::new(DaemonConfig::new(None, data_dir, None, None));
    let storage = Arc::new(Storage::new(&config.data_dir).await?);

    if storage.count_users().await? > 0 {
        anyhow::bail!("users already exist — bootstrap is a first-run operation");
    }
    guard::validate_email(&email)?;
    if password.len() < 8 {
        anyhow::bail!("password must be at least 8 characters");
    }

    let salt = guard::new_salt();
    let hash = guard::hash_password(&salt, &password);
    let user = storage
        .create_user(&email, &hash, &salt, "super_admin", None)
        .await?;

    let access = guard::AccessGuard::new(storage.clone(), config.token_ttl_hours);
    let token = access.issue_token(&user.id).await?;

    println!("super-admin created: {}", user.email);
    println!("bearer token (valid {}h): {}", config.token_ttl_hours, token);
    Ok(())
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
            .unwrap_or_else(|| std::ffi::OsStr::new("nexusd.log"));

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
