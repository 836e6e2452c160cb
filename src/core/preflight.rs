//! # Preflight checks run after dump enumeration, before the engine starts.
//!
//! Two checks guard task startup:
//! - **Resource limit** (local backend only): the local backend reads and
//!   writes many sorted data files concurrently, so the estimated open-file
//!   demand is compared against the process soft limit.
//! - **Checkpoint schema conflict**: with SQL-driver checkpoints, a dump
//!   table whose name collides with a reserved checkpoint table inside the
//!   checkpoint schema would be clobbered; the task fails with a
//!   remediation message instead.
//!
//! The resource check honors `check-requirements = false`; the conflict
//! check always runs when SQL-mode checkpoints are enabled.

use tracing::info;

use crate::checkpoints::is_checkpoint_table;
use crate::config::{Backend, CheckpointDriver, TaskConfig};
use crate::error::Error;
use crate::mydump::DatabaseMeta;

/// Estimates the maximum number of files the local backend holds open:
/// one writer per region worker, plus two memory-cache files per
/// `engine-mem-cache-size` of the largest `table-concurrency` tables.
pub fn estimate_max_open_files(cfg: &TaskConfig, db_metas: &[DatabaseMeta]) -> u64 {
    let mut table_sizes: Vec<u64> = db_metas
        .iter()
        .flat_map(|db| db.tables.iter().map(|t| t.total_size))
        .collect();
    table_sizes.sort_unstable_by(|a, b| b.cmp(a));

    let top_total: u64 = table_sizes
        .iter()
        .take(cfg.app.table_concurrency)
        .sum();

    cfg.app.region_concurrency as u64
        + top_total / cfg.tikv_importer.engine_mem_cache_size.bytes() * 2
}

/// Verifies the process open-file limit can sustain the local backend.
pub fn check_system_requirement(cfg: &TaskConfig, db_metas: &[DatabaseMeta]) -> Result<(), Error> {
    if !cfg.app.check_requirements {
        info!("check-requirements is disabled, skip check system rlimit");
        return Ok(());
    }
    if cfg.tikv_importer.backend != Backend::Local {
        return Ok(());
    }

    let estimated = estimate_max_open_files(cfg, db_metas);
    let Some(soft_limit) = nofile_soft_limit() else {
        // No rlimit concept on this platform.
        return Ok(());
    };
    if soft_limit < estimated {
        return Err(Error::ResourceLimit {
            estimated,
            soft_limit,
        });
    }
    Ok(())
}

/// Fails if a dump table inside the checkpoint schema collides with a
/// reserved checkpoint table name.
pub fn check_schema_conflict(cfg: &TaskConfig, db_metas: &[DatabaseMeta]) -> Result<(), Error> {
    if !(cfg.checkpoint.enable && cfg.checkpoint.driver == CheckpointDriver::Mysql) {
        return Ok(());
    }
    for db in db_metas {
        if db.name != cfg.checkpoint.schema {
            continue;
        }
        for table in &db.tables {
            if is_checkpoint_table(&table.name) {
                return Err(Error::CheckpointConflict {
                    schema: db.name.clone(),
                    table: table.name.clone(),
                });
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn nofile_soft_limit() -> Option<u64> {
    let mut limit = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: getrlimit writes into the provided struct and has no other
    // side effects.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut limit) };
    if rc == 0 {
        Some(limit.rlim_cur as u64)
    } else {
        None
    }
}

#[cfg(not(unix))]
fn nofile_soft_limit() -> Option<u64> {
    None
}
