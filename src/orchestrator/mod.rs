//! Application-level orchestration.
//!
//! This module owns the console's long-lived objects (organ registry, patient store,
//! ledger, host metrics), the server lifecycle, and post-restart processing such as
//! ledger recording. CLI and HTTP layers call into this module so both drive the same
//! code paths.

mod boot;
mod controller;
mod post_process;

use crate::config::ConsoleConfig;
use crate::metrics::HostMetrics;
use crate::model::SystemsOverview;
use crate::storage::{Ledger, PatientStore};
use crate::supervisor::{OrganRegistry, RestartPolicy};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

pub(crate) use boot::boot_all;
pub(crate) use controller::run_server;
pub(crate) use post_process::{restart_and_record, RecordedRestart};

/// Explicitly owned console state, shared by handlers through `Arc`s.
#[derive(Clone)]
pub(crate) struct Console {
    pub registry: Arc<OrganRegistry>,
    pub patients: Arc<PatientStore>,
    pub ledger: Arc<Ledger>,
    pub metrics: Arc<HostMetrics>,
    pub app_dir: Option<PathBuf>,
}

impl Console {
    /// Build every component from configuration, loading persisted state from disk.
    pub(crate) fn open(cfg: &ConsoleConfig) -> Result<Self> {
        let policy = RestartPolicy {
            timeout: cfg.restart_timeout,
            poll_interval: cfg.poll_interval,
            startup_grace: cfg.startup_grace,
            kill_after_timeout: cfg.kill_after_timeout,
            dry_run: cfg.dry_run,
        };
        let specs = cfg.organ_specs().context("invalid organ registry")?;
        let patients = PatientStore::open(cfg.patients_path(), cfg.patients.transitions.clone())
            .context("failed to open patient store")?;

        Ok(Self {
            registry: Arc::new(OrganRegistry::new(specs, policy)),
            patients: Arc::new(patients),
            ledger: Arc::new(Ledger::new(cfg.ledger_path())),
            metrics: Arc::new(HostMetrics::new(cfg.metrics.window)),
            app_dir: cfg.app_dir.clone(),
        })
    }

    /// Organ and patient counts for the overview page. Reads every pid file.
    pub(crate) fn overview(&self) -> SystemsOverview {
        let organs = self.registry.list_organs();
        SystemsOverview {
            organs_total: organs.total,
            organs_running: organs.running,
            organs_runnable: organs.runnable,
            patients: self.patients.counts(),
        }
    }
}
