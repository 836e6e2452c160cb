//! # Glue: the capability bundle the restore engine needs from its host.
//!
//! [`Glue`] exposes SQL execution, table metadata lookup, checkpoint store
//! opening and a record-counter sink. Library embedders implement it
//! themselves; the binary uses [`DefaultGlue`], backed by the task's SQL
//! database through a lazy `mysql_async` pool (no connection is opened until
//! first use, mirroring the lazy driver-open the supervisor relies on).
//!
//! ## Rules
//! - [`DefaultGlue::from_config`] consults the TLS registry under
//!   [`crate::tls::SQL_TLS_NAME`], so the supervisor must register the
//!   task's SQL TLS material **before** constructing the default glue.
//! - The record counter is shared with the engine and is monotonic for the
//!   lifetime of the glue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mysql_async::prelude::Queryable;
use mysql_async::{OptsBuilder, Pool, SslOpts};

use crate::checkpoints::{CheckpointStatus, CheckpointsStore};
use crate::config::{CheckpointConfig, CheckpointDriver, TaskTidb};
use crate::error::Error;
use crate::tls;

/// SQL execution capability.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Executes a statement, discarding any result set.
    async fn execute(&self, query: &str) -> Result<(), Error>;

    /// Executes a query and returns the first column of every row.
    async fn query_strings(&self, query: &str) -> Result<Vec<String>, Error>;
}

/// Monotonic sink for delivered record counts.
pub trait RecordCounter: Send + Sync {
    fn add(&self, rows: u64, bytes: u64);
    fn rows(&self) -> u64;
    fn bytes(&self) -> u64;
}

/// Capability bundle consumed by the restore engine.
#[async_trait]
pub trait Glue: Send + Sync {
    /// Whether this glue owns its SQL executor (and thus its lifetime).
    fn owns_sql_executor(&self) -> bool;

    /// The SQL executor used for schema and delivery statements.
    fn sql_executor(&self) -> Arc<dyn SqlExecutor>;

    /// SQL mode applied to delivery sessions.
    fn sql_mode(&self) -> &str;

    /// Lists table names in a schema on the target cluster.
    async fn get_tables(&self, schema: &str) -> Result<Vec<String>, Error>;

    /// Opens the checkpoint store configured for the task.
    async fn open_checkpoints(
        &self,
        cfg: &CheckpointConfig,
    ) -> Result<Box<dyn CheckpointsStore>, Error>;

    /// The record-counter sink shared with the engine.
    fn record_counter(&self) -> Arc<dyn RecordCounter>;
}

/// Atomic record counter used by [`DefaultGlue`].
#[derive(Default)]
pub struct CounterSink {
    rows: AtomicU64,
    bytes: AtomicU64,
}

impl RecordCounter for CounterSink {
    fn add(&self, rows: u64, bytes: u64) {
        self.rows.fetch_add(rows, Ordering::Relaxed);
        self.bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn rows(&self) -> u64 {
        self.rows.load(Ordering::Relaxed)
    }

    fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Default glue backed by the task's SQL database.
pub struct DefaultGlue {
    executor: Arc<PoolExecutor>,
    sql_mode: String,
    counter: Arc<CounterSink>,
}

impl DefaultGlue {
    /// Builds a glue from the task's connection block.
    ///
    /// The pool is lazy: construction performs no I/O. TLS material
    /// registered under [`tls::SQL_TLS_NAME`] is applied to the pool.
    pub fn from_config(tidb: &TaskTidb) -> Result<Self, Error> {
        let mut opts = OptsBuilder::default()
            .ip_or_hostname(tidb.host.clone())
            .tcp_port(tidb.port)
            .user(Some(tidb.user.clone()))
            .pass(Some(tidb.password.clone()));

        if let Some(material) = tls::lookup(tls::SQL_TLS_NAME) {
            if let Some(ca) = material.ca_path {
                let roots = vec![ca.into()];
                opts = opts.ssl_opts(SslOpts::default().with_root_certs(roots));
            }
        }

        Ok(Self {
            executor: Arc::new(PoolExecutor {
                pool: Pool::new(opts),
            }),
            sql_mode: tidb.sql_mode.clone(),
            counter: Arc::new(CounterSink::default()),
        })
    }
}

#[async_trait]
impl Glue for DefaultGlue {
    fn owns_sql_executor(&self) -> bool {
        true
    }

    fn sql_executor(&self) -> Arc<dyn SqlExecutor> {
        Arc::clone(&self.executor) as Arc<dyn SqlExecutor>
    }

    fn sql_mode(&self) -> &str {
        &self.sql_mode
    }

    async fn get_tables(&self, schema: &str) -> Result<Vec<String>, Error> {
        self.executor
            .query_strings(&format!("SHOW TABLES FROM `{schema}`"))
            .await
    }

    async fn open_checkpoints(
        &self,
        cfg: &CheckpointConfig,
    ) -> Result<Box<dyn CheckpointsStore>, Error> {
        open_checkpoints(cfg, self.sql_executor()).await
    }

    fn record_counter(&self) -> Arc<dyn RecordCounter> {
        Arc::clone(&self.counter) as Arc<dyn RecordCounter>
    }
}

/// Opens a checkpoint store against the given executor.
///
/// Shared by [`DefaultGlue`] and custom glues that reuse the built-in
/// drivers.
pub async fn open_checkpoints(
    cfg: &CheckpointConfig,
    executor: Arc<dyn SqlExecutor>,
) -> Result<Box<dyn CheckpointsStore>, Error> {
    if !cfg.enable {
        return Ok(Box::new(NoopCheckpoints));
    }
    match cfg.driver {
        CheckpointDriver::File => {
            let path = if cfg.dsn.is_empty() {
                "loadvisor-checkpoint.json".to_string()
            } else {
                cfg.dsn.clone()
            };
            Ok(Box::new(FileCheckpoints::new(path)))
        }
        CheckpointDriver::Mysql => Ok(Box::new(MysqlCheckpoints {
            executor,
            schema: cfg.schema.clone(),
        })),
    }
}

struct PoolExecutor {
    pool: Pool,
}

#[async_trait]
impl SqlExecutor for PoolExecutor {
    async fn execute(&self, query: &str) -> Result<(), Error> {
        let mut conn = self.pool.get_conn().await.map_err(glue_err)?;
        conn.query_drop(query).await.map_err(glue_err)
    }

    async fn query_strings(&self, query: &str) -> Result<Vec<String>, Error> {
        let mut conn = self.pool.get_conn().await.map_err(glue_err)?;
        conn.query(query).await.map_err(glue_err)
    }
}

fn glue_err(e: mysql_async::Error) -> Error {
    Error::Glue {
        reason: e.to_string(),
    }
}

/// Checkpoint store that records nothing (checkpoints disabled).
struct NoopCheckpoints;

#[async_trait]
impl CheckpointsStore for NoopCheckpoints {
    async fn initialize(&mut self, _task_id: i64) -> Result<(), Error> {
        Ok(())
    }

    async fn update(&mut self, _table: &str, _status: CheckpointStatus) -> Result<(), Error> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// File-driver checkpoint store: a JSON map of table → status.
struct FileCheckpoints {
    path: String,
    state: std::collections::BTreeMap<String, CheckpointStatus>,
}

impl FileCheckpoints {
    fn new(path: String) -> Self {
        Self {
            path,
            state: std::collections::BTreeMap::new(),
        }
    }

    async fn flush(&self) -> Result<(), Error> {
        let body = serde_json::to_vec_pretty(&self.state).map_err(|e| Error::Glue {
            reason: format!("serialize checkpoints: {e}"),
        })?;
        tokio::fs::write(&self.path, body).await.map_err(|e| Error::Glue {
            reason: format!("write checkpoints to {}: {e}", self.path),
        })
    }
}

#[async_trait]
impl CheckpointsStore for FileCheckpoints {
    async fn initialize(&mut self, _task_id: i64) -> Result<(), Error> {
        self.flush().await
    }

    async fn update(&mut self, table: &str, status: CheckpointStatus) -> Result<(), Error> {
        self.state.insert(table.to_string(), status);
        self.flush().await
    }

    async fn close(&mut self) -> Result<(), Error> {
        self.flush().await
    }
}

/// SQL-driver checkpoint store inside the configured schema.
struct MysqlCheckpoints {
    executor: Arc<dyn SqlExecutor>,
    schema: String,
}

#[async_trait]
impl CheckpointsStore for MysqlCheckpoints {
    async fn initialize(&mut self, task_id: i64) -> Result<(), Error> {
        let schema = &self.schema;
        self.executor
            .execute(&format!("CREATE DATABASE IF NOT EXISTS `{schema}`"))
            .await?;
        self.executor
            .execute(&format!(
                "CREATE TABLE IF NOT EXISTS `{schema}`.`cp_task` \
                 (task_id BIGINT NOT NULL PRIMARY KEY, \
                  started_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP)"
            ))
            .await?;
        self.executor
            .execute(&format!(
                "CREATE TABLE IF NOT EXISTS `{schema}`.`cp_table` \
                 (table_name VARCHAR(261) NOT NULL PRIMARY KEY, \
                  status VARCHAR(32) NOT NULL, \
                  updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP \
                  ON UPDATE CURRENT_TIMESTAMP)"
            ))
            .await?;
        self.executor
            .execute(&format!(
                "REPLACE INTO `{schema}`.`cp_task` (task_id) VALUES ({task_id})"
            ))
            .await
    }

    async fn update(&mut self, table: &str, status: CheckpointStatus) -> Result<(), Error> {
        let status = serde_json::to_string(&status).unwrap_or_default();
        let status = status.trim_matches('"');
        self.executor
            .execute(&format!(
                "REPLACE INTO `{}`.`cp_table` (table_name, status) VALUES ('{}', '{}')",
                self.schema,
                table.replace('\'', "''"),
                status
            ))
            .await
    }

    async fn close(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
