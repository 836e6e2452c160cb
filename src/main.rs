//! Loadvisor binary: flag parsing, signal wiring, exit-code contract.
//!
//! Exit codes: 0 on normal exit (including signal-driven shutdown of the
//! server loop), 1 when a task fails or the status server cannot bind.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use loadvisor::config::Backend;
use loadvisor::core::wait_for_shutdown_signal;
use loadvisor::error::Error;
use loadvisor::restore::default_engine_builder;
use loadvisor::{GlobalConfig, Supervisor, TaskConfig};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser)]
#[command(name = "loadvisor", version)]
#[command(about = "Bulk data loads into a distributed SQL cluster", long_about = None)]
struct Cli {
    /// Global configuration TOML file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run as a long-lived server accepting tasks over HTTP
    #[arg(long)]
    server_mode: bool,

    /// Status server bind address; omit for lazy, signal-triggered start
    #[arg(long, value_name = "ADDR")]
    status_addr: Option<String>,

    /// Dump source directory or URL
    #[arg(short = 'd', long, value_name = "DIR")]
    source_dir: Option<String>,

    /// Ingestion backend: local, importer or tidb
    #[arg(long, value_name = "KIND")]
    backend: Option<String>,

    /// Log file path; omit to log to stderr
    #[arg(long, value_name = "FILE")]
    log_file: Option<String>,

    /// Log level: trace, debug, info, warn or error
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Cluster host
    #[arg(long, value_name = "HOST")]
    tidb_host: Option<String>,

    /// Cluster port
    #[arg(long, value_name = "PORT")]
    tidb_port: Option<u16>,

    /// Cluster user
    #[arg(long, value_name = "USER")]
    tidb_user: Option<String>,

    /// Cluster password
    #[arg(long, value_name = "PASSWORD")]
    tidb_password: Option<String>,
}

fn load_global(cli: &Cli) -> Result<GlobalConfig, Error> {
    let mut cfg = match &cli.config {
        Some(path) => {
            let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
                reason: format!("cannot read {}: {e}", path.display()),
            })?;
            toml::from_str(&text).map_err(|e| Error::Config {
                reason: format!("cannot parse {}: {e}", path.display()),
            })?
        }
        None => GlobalConfig::default(),
    };

    cfg.app.server_mode |= cli.server_mode;
    if let Some(addr) = &cli.status_addr {
        cfg.app.status_addr = addr.clone();
    }
    if let Some(dir) = &cli.source_dir {
        cfg.mydumper.source_dir = dir.clone();
    }
    if let Some(backend) = &cli.backend {
        cfg.tikv_importer.backend = match backend.as_str() {
            "local" => Backend::Local,
            "importer" => Backend::Importer,
            "tidb" => Backend::Tidb,
            other => {
                return Err(Error::Config {
                    reason: format!("unknown backend '{other}'"),
                })
            }
        };
    }
    if let Some(file) = &cli.log_file {
        cfg.app.log.file = file.clone();
    }
    if let Some(level) = &cli.log_level {
        cfg.app.log.level = level.clone();
    }
    if let Some(host) = &cli.tidb_host {
        cfg.tidb.host = host.clone();
    }
    if let Some(port) = cli.tidb_port {
        cfg.tidb.port = port;
    }
    if let Some(user) = &cli.tidb_user {
        cfg.tidb.user = user.clone();
    }
    if let Some(password) = &cli.tidb_password {
        cfg.tidb.password = password.clone();
    }
    Ok(cfg)
}

/// The downstream engine is dominated by short-lived allocations; letting
/// jemalloc purge in the background trades peak memory for throughput.
/// The local backend already runs memory-heavy, and an operator-provided
/// MALLOC_CONF always wins, so the knob is only touched outside both.
fn tune_allocator(global: &GlobalConfig) {
    if global.tikv_importer.backend == Backend::Local {
        return;
    }
    if std::env::var_os("MALLOC_CONF").is_some() {
        return;
    }
    #[cfg(not(target_env = "msvc"))]
    {
        // SAFETY: the name is a valid null-terminated mallctl key and the
        // value type matches the key.
        let result = unsafe { tikv_jemalloc_ctl::raw::write(b"background_thread\0", true) };
        match result {
            Ok(()) => debug!("enabled jemalloc background purging"),
            Err(e) => debug!(error = %e, "cannot tune allocator"),
        }
    }
}

async fn run_main() -> i32 {
    let cli = Cli::parse();
    let global = match load_global(&cli) {
        Ok(global) => global,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };

    if !global.app.log.file.is_empty() {
        println!("Verbose debug logs will be written to {}\n", global.app.log.file);
    }

    let app = match Supervisor::new(global.clone(), default_engine_builder()) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("failed to initialize environment: {e}");
            return 1;
        }
    };

    tune_allocator(&global);

    {
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            match wait_for_shutdown_signal().await {
                Ok(signal) => {
                    info!(signal, "got signal to exit");
                    app.stop();
                }
                Err(e) => error!(error = %e, "cannot install signal handlers"),
            }
        });
    }

    if let Err(e) = app.go_serve().await {
        error!(error = %e, "failed to start HTTP server");
        eprintln!("failed to start HTTP server: {e}");
        return 1;
    }

    let result = if global.app.server_mode {
        app.run_server().await
    } else {
        let task = TaskConfig::from_global(&global);
        app.run_once(CancellationToken::new(), task, None).await
    };

    match result {
        Ok(()) => {
            info!("loadvisor exit");
            println!("loadvisor exit");
            0
        }
        Err(e) => {
            error!(error = ?e, "loadvisor encountered error stack info");
            error!(error = %e, "loadvisor encountered error");
            eprintln!("loadvisor encountered error: {e}");
            1
        }
    }
}

#[tokio::main]
async fn main() {
    let code = run_main().await;
    // Flushing is owned by the non-blocking log worker; stdout sinks are
    // known to error on sync and are skipped.
    std::process::exit(code);
}
