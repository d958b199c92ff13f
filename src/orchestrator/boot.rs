//! Bring every down organ up, in tier order.

use super::post_process::record_outcome;
use crate::model::{BootReport, Tier};
use crate::storage::Ledger;
use crate::supervisor::OrganRegistry;
use tracing::info;

/// Restart each organ that is not running: all P0 first, then P1, then P2. Failures are
/// reported per organ and do not stop the remaining organs.
pub(crate) async fn boot_all(registry: &OrganRegistry, ledger: &Ledger) -> Vec<BootReport> {
    let listing = registry.list_organs();
    let mut reports = Vec::with_capacity(listing.total);

    for tier in Tier::ALL {
        for organ in listing.by_tier(tier) {
            if organ.running {
                reports.push(BootReport {
                    organ: organ.name.clone(),
                    tier,
                    already_running: true,
                    outcome: None,
                    error: None,
                    ledger_error: None,
                });
                continue;
            }
            info!(organ = %organ.name, %tier, "booting organ");
            let report = match registry.restart(&organ.name).await {
                Ok(outcome) => {
                    let recorded = record_outcome(ledger, outcome);
                    BootReport {
                        organ: organ.name.clone(),
                        tier,
                        already_running: false,
                        outcome: Some(recorded.outcome),
                        error: None,
                        ledger_error: recorded.ledger_error,
                    }
                }
                Err(e) => BootReport {
                    organ: organ.name.clone(),
                    tier,
                    already_running: false,
                    outcome: None,
                    error: Some(e.to_string()),
                    ledger_error: None,
                },
            };
            reports.push(report);
        }
    }
    reports
}
