use super::liveness;
use super::pidfile;
use super::restart::{RestartMachine, RestartPolicy};
use crate::error::OrganError;
use crate::model::{OrganListing, OrganSpec, OrganStatus, RestartOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Static organ registry with liveness queries and restart control.
///
/// There is no start or stop operation: a down organ comes up through
/// [`OrganRegistry::restart`], the same path used for a live one.
pub struct OrganRegistry {
    organs: Vec<OrganSpec>,
    policy: RestartPolicy,
    // Restarts of one organ never overlap; different organs restart independently.
    restart_locks: HashMap<String, Arc<Mutex<()>>>,
}

impl OrganRegistry {
    pub fn new(organs: Vec<OrganSpec>, policy: RestartPolicy) -> Self {
        let restart_locks = organs
            .iter()
            .map(|o| (o.name.clone(), Arc::new(Mutex::new(()))))
            .collect();
        Self {
            organs,
            policy,
            restart_locks,
        }
    }

    pub fn spec(&self, name: &str) -> Result<&OrganSpec, OrganError> {
        self.organs
            .iter()
            .find(|o| o.name == name)
            .ok_or_else(|| OrganError::OrganNotFound(name.to_string()))
    }

    /// All organs with fresh liveness, plus totals.
    pub fn list_organs(&self) -> OrganListing {
        let organs: Vec<OrganStatus> = self.organs.iter().map(inspect).collect();
        let running = organs.iter().filter(|o| o.running).count();
        let runnable = organs.iter().filter(|o| o.runnable).count();
        OrganListing {
            total: organs.len(),
            running,
            runnable,
            organs,
        }
    }

    pub fn status(&self, name: &str) -> Result<OrganStatus, OrganError> {
        self.spec(name).map(inspect)
    }

    /// Terminate `name` if it is alive, launch it again and record the new pid.
    pub async fn restart(&self, name: &str) -> Result<RestartOutcome, OrganError> {
        let spec = self.spec(name)?;
        let lock = self
            .restart_locks
            .get(name)
            .cloned()
            .ok_or_else(|| OrganError::OrganNotFound(name.to_string()))?;
        let _guard = lock.lock().await;

        info!(organ = name, tier = %spec.tier, dry_run = self.policy.dry_run, "restarting organ");
        let result = RestartMachine::new(spec, &self.policy).run().await;
        if let Err(e) = &result {
            warn!(organ = name, error = %e, "restart failed");
        }
        result
    }
}

fn inspect(spec: &OrganSpec) -> OrganStatus {
    let pid = pidfile::read_pid(&spec.pid_file);
    OrganStatus {
        name: spec.name.clone(),
        tier: spec.tier,
        glyph: spec.glyph.clone(),
        running: pid.is_some_and(liveness::is_organ_running),
        pid,
        pid_file: spec.pid_file.clone(),
        log: spec.log_file.clone(),
        runnable: spec.command.is_file(),
    }
}
