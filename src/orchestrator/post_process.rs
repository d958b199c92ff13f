//! Post-restart processing.
//!
//! Records successful restarts in the ledger. A ledger failure does not undo the restart
//! (the organ is already running under its new pid); it is reported alongside the outcome.

use crate::error::OrganError;
use crate::model::RestartOutcome;
use crate::storage::ledger::LedgerEntry;
use crate::storage::Ledger;
use crate::supervisor::OrganRegistry;
use serde::Serialize;
use tracing::warn;

/// Result of a restart plus its ledger bookkeeping, ready for presentation layers.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct RecordedRestart {
    pub outcome: RestartOutcome,
    pub ledger_entry: Option<LedgerEntry>,
    pub ledger_error: Option<String>,
}

/// Restart `name` and append a ledger entry when a new pid was recorded.
pub(crate) async fn restart_and_record(
    registry: &OrganRegistry,
    ledger: &Ledger,
    name: &str,
) -> Result<RecordedRestart, OrganError> {
    let outcome = registry.restart(name).await?;
    Ok(record_outcome(ledger, outcome))
}

pub(crate) fn record_outcome(ledger: &Ledger, outcome: RestartOutcome) -> RecordedRestart {
    if outcome.dry_run || outcome.new_pid.is_none() {
        return RecordedRestart {
            outcome,
            ledger_entry: None,
            ledger_error: None,
        };
    }
    match ledger.append(&outcome.organ, outcome.tier) {
        Ok(entry) => RecordedRestart {
            outcome,
            ledger_entry: Some(entry),
            ledger_error: None,
        },
        Err(e) => {
            warn!(organ = %outcome.organ, error = %format!("{e:#}"), "ledger append failed");
            RecordedRestart {
                outcome,
                ledger_entry: None,
                ledger_error: Some(format!("{e:#}")),
            }
        }
    }
}
