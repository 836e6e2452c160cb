//! # Supervisor: top-level lifecycle of the bulk-load control plane.
//!
//! The [`Supervisor`] owns the runtime components (task queue, cancellation
//! registry, pause gate, event bus, progress tracker, status server) and
//! drives task execution from dequeue to engine shutdown.
//!
//! - One-shot mode: [`Supervisor::run_once`] executes a single task.
//! - Server mode: [`Supervisor::run_server`] loops on the queue until the
//!   root token cancels; both modes share the same execution path.
//!
//! ## Architecture
//! ```text
//! HTTP clients ──► ControlPlane ──► TaskQueue ──► run_server() loop
//!                                                      │
//!                                                      ▼
//!                                              run(parent, cfg, glue)
//!                                                      │
//!                      ┌───────────────────────────────┤
//!                      │ register child token + cfg    │ CancelRegistry
//!                      │ publish TaskStarted           │ Bus ──► ProgressTracker
//!                      │ register SQL TLS ("cluster")  │
//!                      │ default glue (if none given)  │
//!                      │ parse backend / open storage  │
//!                      │ enumerate dump metadata       │
//!                      │ preflight checks              │
//!                      │ build engine ──► engine.run() │
//!                      └── cleanup on every exit path ─┘
//! ```
//!
//! ## Rules
//! - Exactly zero or one task is in flight at any instant.
//! - The per-task token is a child of the *caller's* token, not the root:
//!   `Stop` reaches it through the registry, `DELETE /tasks/{id}` through
//!   `cancel_if`, and a library caller through its own parent token.
//! - On a server-mode task error the pause gate is force-paused and the
//!   dequeue loop continues.
//! - Root-token cancellation drains the dequeue loop with `Ok(())`.

use std::sync::{Arc, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{mint_task_id, GlobalConfig, TaskConfig};
use crate::core::preflight;
use crate::core::queue::TaskQueue;
use crate::core::registry::CancelRegistry;
use crate::core::shutdown;
use crate::core::PauseGate;
use crate::error::Error;
use crate::events::{Bus, Event, EventKind};
use crate::glue::{DefaultGlue, Glue};
use crate::http::{router, AppState, StatusServer};
use crate::logging::{self, LogGuard};
use crate::metrics::Metrics;
use crate::mydump;
use crate::progress::ProgressTracker;
use crate::restore::{EngineBuilder, EngineParams};
use crate::storage::{self, ExternalStorageOptions};
use crate::tls::{self, TlsMaterial};

/// Capacity of the runtime event bus.
const BUS_CAPACITY: usize = 1024;

/// Top-level control plane for bulk-load tasks.
pub struct Supervisor {
    global: Arc<GlobalConfig>,
    root: CancellationToken,
    queue: Arc<OnceLock<Arc<TaskQueue>>>,
    registry: Arc<CancelRegistry>,
    pause: Arc<PauseGate>,
    bus: Bus,
    progress: Arc<ProgressTracker>,
    metrics: Arc<Metrics>,
    server: Arc<StatusServer>,
    engine_builder: Arc<dyn EngineBuilder>,
    _log_guard: LogGuard,
}

impl Supervisor {
    /// Initializes logging, validates TLS material, and wires the runtime.
    ///
    /// Must be called from within a tokio runtime: the progress listener is
    /// spawned here.
    pub fn new(
        global: GlobalConfig,
        engine_builder: Arc<dyn EngineBuilder>,
    ) -> Result<Arc<Self>, Error> {
        let log_guard = logging::init(&global.app.log)?;
        // Status-server TLS material is validated up front so a typo fails
        // fast; termination itself is delegated (plain TCP listener).
        let _tls = TlsMaterial::from_security(&global.security)?;

        let root = CancellationToken::new();
        let bus = Bus::new(BUS_CAPACITY);
        let metrics = Arc::new(Metrics::new().map_err(|e| Error::Internal {
            reason: format!("metrics registry: {e}"),
        })?);
        let progress = Arc::new(ProgressTracker::new());
        Arc::clone(&progress).spawn_listener(&bus, root.clone());

        let global = Arc::new(global);
        let queue: Arc<OnceLock<Arc<TaskQueue>>> = Arc::new(OnceLock::new());
        let registry = Arc::new(CancelRegistry::new());
        let pause = Arc::new(PauseGate::new());

        let state = AppState {
            global: Arc::clone(&global),
            queue: Arc::clone(&queue),
            registry: Arc::clone(&registry),
            pause: Arc::clone(&pause),
            progress: Arc::clone(&progress),
            metrics: Arc::clone(&metrics),
        };
        let server = Arc::new(StatusServer::new(
            global.app.status_addr.clone(),
            root.clone(),
            router(state),
        ));

        Ok(Arc::new(Self {
            global,
            root,
            queue,
            registry,
            pause,
            bus,
            progress,
            metrics,
            server,
            engine_builder,
            _log_guard: log_guard,
        }))
    }

    /// The process-wide root token; canceled by [`Supervisor::stop`].
    pub fn root_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// The process-wide pause gate.
    pub fn pause_gate(&self) -> Arc<PauseGate> {
        Arc::clone(&self.pause)
    }

    /// The status server (bound address introspection for tests and logs).
    pub fn status_server(&self) -> Arc<StatusServer> {
        Arc::clone(&self.server)
    }

    /// Starts the status server now if an address is configured, and
    /// arranges the signal-triggered lazy start otherwise.
    ///
    /// A bind failure for a *configured* address is returned to the caller
    /// (fatal); a lazy-start bind failure is only logged.
    pub async fn go_serve(&self) -> Result<(), Error> {
        let server = Arc::clone(&self.server);
        let root = self.root.clone();
        tokio::spawn(async move { user_signal_loop(server, root).await });

        let configured = self.global.app.status_addr.clone();
        if configured.is_empty() {
            return Ok(());
        }
        self.server.start(&configured, false).await?;
        Ok(())
    }

    /// Adjusts the config, assigns a task id, and runs one task to
    /// completion under the caller's token.
    ///
    /// For the binary the parent token is a fresh one (the task is then
    /// stoppable only through [`Supervisor::stop`] or `DELETE /tasks/{id}`);
    /// a library caller may pass a token it cancels itself. `glue` may be
    /// `None` to let the supervisor build a default glue from the task's
    /// connection block.
    pub async fn run_once(
        &self,
        parent: CancellationToken,
        mut cfg: TaskConfig,
        glue: Option<Arc<dyn Glue>>,
    ) -> Result<(), Error> {
        cfg.adjust()?;
        if cfg.task_id == 0 {
            cfg.task_id = mint_task_id();
        }
        self.run(&parent, Arc::new(cfg), glue).await
    }

    /// Installs the task queue and serves it until the root token cancels.
    ///
    /// Each dequeued task runs under a fresh parent token so that deleting
    /// or stopping one task never tears down the loop. A task error pauses
    /// the gate and the loop continues with the next task.
    pub async fn run_server(&self) -> Result<(), Error> {
        let queue = Arc::new(TaskQueue::new());
        self.queue
            .set(Arc::clone(&queue))
            .map_err(|_| Error::Internal {
                reason: "server mode already started".to_string(),
            })?;
        info!(
            address = ?self.server.bound_addr(),
            "server is running, post to /tasks to start a bulk load task"
        );

        loop {
            let cfg = match queue.pop(&self.root).await {
                Ok(cfg) => cfg,
                // Root token canceled: clean shutdown of the loop.
                Err(_) => return Ok(()),
            };
            self.metrics.queue_length.set(queue.len() as i64);

            let parent = CancellationToken::new();
            if let Err(e) = self.run(&parent, cfg, None).await {
                self.pause.pause();
                error!(error = %e, "bulk load task encountered error");
            }
        }
    }

    /// Cancels the in-flight task, shuts the status server down through the
    /// root token, and cancels the root token.
    pub fn stop(&self) {
        self.bus.publish(Event::now(EventKind::ShutdownRequested));
        self.registry.cancel_current();
        self.root.cancel();
    }

    /// Executes one task: registration, TLS, glue, storage, preflight,
    /// engine. Cleanup runs on every exit path.
    async fn run(
        &self,
        parent: &CancellationToken,
        cfg: Arc<TaskConfig>,
        glue: Option<Arc<dyn Glue>>,
    ) -> Result<(), Error> {
        info!(task_id = cfg.task_id, cfg = %cfg.to_json(), "task configuration");
        log_env_variables();

        let token = parent.child_token();
        self.registry.set(token.clone(), Arc::clone(&cfg));
        self.bus
            .publish(Event::now(EventKind::TaskStarted).with_task_id(cfg.task_id));
        self.metrics.tasks_total.with_label_values(&["started"]).inc();
        let timer = self.metrics.task_duration_seconds.start_timer();

        let result = self.run_task(&token, &cfg, glue).await;

        token.cancel();
        self.registry.clear();
        timer.observe_duration();
        let mut end = Event::now(EventKind::TaskEnded).with_task_id(cfg.task_id);
        let state = match &result {
            Ok(()) => "succeeded",
            Err(e) => {
                end = end.with_error(e.to_string());
                if e.is_canceled() {
                    "canceled"
                } else {
                    "failed"
                }
            }
        };
        self.metrics.tasks_total.with_label_values(&[state]).inc();
        self.bus.publish(end);
        result
    }

    /// Registers SQL TLS for the duration of the task body.
    async fn run_task(
        &self,
        token: &CancellationToken,
        cfg: &Arc<TaskConfig>,
        glue: Option<Arc<dyn Glue>>,
    ) -> Result<(), Error> {
        tls::register_sql(&cfg.tidb.security)?;
        let result = self.run_task_inner(token, cfg, glue).await;
        tls::deregister(tls::SQL_TLS_NAME);
        result
    }

    async fn run_task_inner(
        &self,
        token: &CancellationToken,
        cfg: &Arc<TaskConfig>,
        glue: Option<Arc<dyn Glue>>,
    ) -> Result<(), Error> {
        // Default glue construction must come after SQL TLS registration:
        // the pool it builds consults the registered material.
        let glue = match glue {
            Some(glue) => glue,
            None => Arc::new(DefaultGlue::from_config(&cfg.tidb)?) as Arc<dyn Glue>,
        };
        let counter = glue.record_counter();

        let desc = storage::parse_backend(&cfg.mydumper.source_dir)?;
        // Path checking is skipped in favor of delaying the error to the
        // first actual access; remote stores need extra permissions for the
        // existence probe.
        let store = storage::new(
            desc,
            &ExternalStorageOptions {
                skip_check_path: true,
            },
        )
        .await?;

        info!("load data source");
        let db_metas = mydump::load_dump_metadata(store.as_ref()).await?;

        preflight::check_system_requirement(cfg, &db_metas).map_err(|e| {
            error!(error = %e, "check system requirements failed");
            e
        })?;
        preflight::check_schema_conflict(cfg, &db_metas).map_err(|e| {
            error!(error = %e, "checkpoint schema conflicts with data files");
            e
        })?;

        for db in &db_metas {
            for table in &db.tables {
                self.bus.publish(
                    Event::now(EventKind::ProgressInitialized)
                        .with_table(table.qualified_name())
                        .with_total_bytes(table.total_size),
                );
            }
        }

        let params = EngineParams {
            db_metas,
            cfg: Arc::clone(cfg),
            storage: store,
            glue,
            bus: self.bus.clone(),
            pause: Arc::clone(&self.pause),
        };
        let mut engine = self.engine_builder.build(params).await.map_err(|e| {
            error!(error = %e, "restore failed");
            e
        })?;

        let result = engine.run(token).await;
        engine.close().await;
        self.metrics.imported_bytes_total.inc_by(counter.bytes());
        result
    }
}

/// Watches for the designated user signal; the first one binds an
/// ephemeral port and announces it on stderr, later ones re-log the
/// address without rebinding. Exits when the root token fires.
async fn user_signal_loop(server: Arc<StatusServer>, root: CancellationToken) {
    loop {
        tokio::select! {
            _ = root.cancelled() => return,
            res = shutdown::wait_for_user_signal() => {
                if res.is_err() {
                    return;
                }
            }
        }
        if server.claim_lazy_start() {
            if let Err(e) = server.start("0.0.0.0:0", true).await {
                warn!(error = %e, "failed to start HTTP server");
            }
        } else if let Some(addr) = server.bound_addr() {
            info!(address = %addr, "already started HTTP server");
        }
    }
}

/// Logs the names of environment variables that influence behavior.
/// Values stay out of the logs: they may carry credentials.
fn log_env_variables() {
    let names: Vec<&str> = ["RUST_LOG", "MALLOC_CONF", "HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"]
        .into_iter()
        .filter(|name| std::env::var_os(name).is_some())
        .collect();
    if !names.is_empty() {
        debug!(?names, "environment variables present");
    }
}
