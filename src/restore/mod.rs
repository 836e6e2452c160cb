//! # Restore engine interface and the built-in SQL-backend controller.
//!
//! The engine is the opaque pipeline the supervisor drives: it is built once
//! per task from [`EngineParams`], run to completion (or cancellation), and
//! closed on every exit path. Library embedders supply their own
//! [`EngineBuilder`]; the binary uses [`default_engine_builder`], a thin
//! controller for the SQL backend that replays dump schema and data
//! statements through the glue. The resource-heavy local backend engine
//! lives outside this crate behind the same traits.
//!
//! ## Rules
//! - `run` must be cancellation-responsive: it checks the task token and
//!   consults the pause gate between delivery units.
//! - `close` is invoked unconditionally after `run`, success or not.
//! - Progress is published to the bus; the engine never touches the HTTP
//!   layer or the progress tracker directly.

mod controller;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::TaskConfig;
use crate::core::PauseGate;
use crate::error::Error;
use crate::events::Bus;
use crate::glue::Glue;
use crate::mydump::DatabaseMeta;
use crate::storage::ExternalStorage;

pub use controller::RestoreController;

/// Everything an engine needs from its host, gathered by the supervisor.
pub struct EngineParams {
    pub db_metas: Vec<DatabaseMeta>,
    pub cfg: Arc<TaskConfig>,
    pub storage: Arc<dyn ExternalStorage>,
    pub glue: Arc<dyn Glue>,
    pub bus: Bus,
    pub pause: Arc<PauseGate>,
}

/// One restore pipeline instance.
#[async_trait]
pub trait Engine: Send {
    /// Runs the pipeline to completion or cancellation.
    async fn run(&mut self, token: &CancellationToken) -> Result<(), Error>;

    /// Releases pipeline resources. Invoked on every exit path.
    async fn close(&mut self);
}

/// Factory constructing an engine per task.
#[async_trait]
pub trait EngineBuilder: Send + Sync {
    async fn build(&self, params: EngineParams) -> Result<Box<dyn Engine>, Error>;
}

struct ControllerBuilder;

#[async_trait]
impl EngineBuilder for ControllerBuilder {
    async fn build(&self, params: EngineParams) -> Result<Box<dyn Engine>, Error> {
        Ok(Box::new(RestoreController::new(params).await?))
    }
}

/// The builder the binary wires in: the built-in SQL-backend controller.
pub fn default_engine_builder() -> Arc<dyn EngineBuilder> {
    Arc::new(ControllerBuilder)
}
