//! Text summary builder for CLI output.
//!
//! Formats human-readable lines for text mode; `--json` bypasses this module entirely.

use crate::model::{BootReport, OrganListing, OrganStatus, Patient, RestartState, Tier};
use crate::orchestrator::RecordedRestart;
use crate::storage::ledger::{LedgerEntry, VerifyReport};

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

fn organ_line(o: &OrganStatus) -> String {
    let state = if o.running { "running" } else { "down" };
    let pid = o.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
    let runnable = if o.runnable { "" } else { " (no launcher)" };
    format!("  {} {:<16} {:<8} pid {pid}{runnable}", o.glyph, o.name, state)
}

pub(crate) fn organ_listing(listing: &OrganListing) -> TextSummary {
    let mut lines = Vec::new();
    for tier in Tier::ALL {
        let mut rows = listing.by_tier(tier).peekable();
        if rows.peek().is_none() {
            continue;
        }
        lines.push(format!("{tier}:"));
        lines.extend(rows.map(organ_line));
    }
    lines.push(format!(
        "{} of {} organs running ({} runnable)",
        listing.running, listing.total, listing.runnable
    ));
    TextSummary { lines }
}

pub(crate) fn organ_status(status: &OrganStatus) -> TextSummary {
    TextSummary {
        lines: vec![
            format!("{} {} [{}]", status.glyph, status.name, status.tier),
            format!("Running:  {}", if status.running { "yes" } else { "no" }),
            format!(
                "Pid:      {}",
                status.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
            ),
            format!("Pid file: {}", status.pid_file.display()),
            format!("Log:      {}", status.log.display()),
        ],
    }
}

fn trace_line(trace: &[RestartState]) -> String {
    trace
        .iter()
        .map(|s| match s {
            RestartState::Alive { pid }
            | RestartState::Terminating { pid }
            | RestartState::Recorded { pid } => format!("{}({pid})", s.label()),
            _ => s.label().to_string(),
        })
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub(crate) fn restart(recorded: &RecordedRestart) -> TextSummary {
    let o = &recorded.outcome;
    let mut lines = Vec::new();
    let prev = o.previous_pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
    if o.dry_run {
        lines.push(format!("Dry run: {} would be restarted (pid {prev})", o.organ));
    } else {
        let new = o.new_pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        lines.push(format!("Restarted {}: pid {prev} -> {new}", o.organ));
    }
    lines.push(format!("Transitions: {}", trace_line(&o.trace)));
    if let Some(entry) = &recorded.ledger_entry {
        lines.push(format!("Ledger: entry {} ({})", entry.index, short_hash(&entry.hash)));
    }
    if let Some(err) = &recorded.ledger_error {
        lines.push(format!("Ledger: not recorded: {err}"));
    }
    TextSummary { lines }
}

pub(crate) fn boot(reports: &[BootReport]) -> TextSummary {
    let mut lines = Vec::new();
    for r in reports {
        let detail = if r.already_running {
            "already running".to_string()
        } else if let Some(err) = &r.error {
            format!("FAILED: {err}")
        } else if let Some(o) = &r.outcome {
            let launched = match (o.dry_run, o.new_pid) {
                (true, _) => "would launch".to_string(),
                (false, Some(pid)) => format!("launched (pid {pid})"),
                (false, None) => "launched".to_string(),
            };
            match &r.ledger_error {
                Some(err) => format!("{launched}; ledger not recorded: {err}"),
                None => launched,
            }
        } else {
            "skipped".to_string()
        };
        lines.push(format!("[{}] {:<16} {detail}", r.tier, r.organ));
    }
    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    lines.push(format!("{} organs checked, {failed} failed", reports.len()));
    TextSummary { lines }
}

pub(crate) fn patient(p: &Patient) -> String {
    let mut line = format!("#{:<4} {:<24} {:<12} {}", p.id, p.name, p.date_of_birth, p.status);
    if let Some(notes) = p.notes.as_deref() {
        line.push_str(&format!("  ({notes})"));
    }
    line
}

pub(crate) fn patients(list: &[Patient]) -> TextSummary {
    let mut lines: Vec<String> = list.iter().map(patient).collect();
    lines.push(format!("{} patient(s)", list.len()));
    TextSummary { lines }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

pub(crate) fn ledger_entries(entries: &[LedgerEntry]) -> TextSummary {
    let mut lines: Vec<String> = entries
        .iter()
        .map(|e| {
            format!(
                "{:>4} {:<16} {} {:.3} {}",
                e.index,
                e.organ,
                e.tier,
                e.timestamp,
                short_hash(&e.hash)
            )
        })
        .collect();
    lines.push(format!("{} ledger entries", entries.len()));
    TextSummary { lines }
}

pub(crate) fn ledger_verify(report: &VerifyReport) -> TextSummary {
    let line = if report.intact {
        format!("Ledger intact ({} entries)", report.entries)
    } else {
        format!(
            "Ledger BROKEN: {} ({} entries)",
            report.reason.as_deref().unwrap_or("unknown failure"),
            report.entries
        )
    };
    TextSummary { lines: vec![line] }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PatientStatus, RestartOutcome};
    use std::path::PathBuf;

    fn status(name: &str, tier: Tier, running: bool) -> OrganStatus {
        OrganStatus {
            name: name.into(),
            tier,
            glyph: "◻️".into(),
            running,
            pid: running.then_some(100),
            pid_file: PathBuf::from(format!("/run/{name}.pid")),
            log: PathBuf::from(format!("/log/{name}.log")),
            runnable: true,
        }
    }

    #[test]
    fn listing_groups_by_tier() {
        let listing = OrganListing {
            organs: vec![
                status("sentinel", Tier::P0, true),
                status("logger", Tier::P2, false),
            ],
            total: 2,
            running: 1,
            runnable: 2,
        };
        let lines = organ_listing(&listing).lines;
        assert_eq!(lines[0], "P0:");
        assert!(lines[1].contains("sentinel") && lines[1].contains("pid 100"));
        assert_eq!(lines[2], "P2:");
        assert!(lines[3].contains("down"));
        assert_eq!(lines.last().unwrap(), "1 of 2 organs running (2 runnable)");
    }

    #[test]
    fn restart_shows_transitions() {
        let recorded = RecordedRestart {
            outcome: RestartOutcome {
                organ: "vault".into(),
                tier: Tier::P1,
                previous_pid: Some(7),
                new_pid: Some(9),
                dry_run: false,
                trace: vec![
                    RestartState::Unknown,
                    RestartState::Alive { pid: 7 },
                    RestartState::Terminating { pid: 7 },
                    RestartState::Launching,
                    RestartState::Recorded { pid: 9 },
                ],
            },
            ledger_entry: None,
            ledger_error: Some("disk full".into()),
        };
        let lines = restart(&recorded).lines;
        assert_eq!(lines[0], "Restarted vault: pid 7 -> 9");
        assert_eq!(
            lines[1],
            "Transitions: unknown -> alive(7) -> terminating(7) -> launching -> recorded(9)"
        );
        assert_eq!(lines[2], "Ledger: not recorded: disk full");
    }

    #[test]
    fn boot_counts_failures() {
        let reports = vec![
            BootReport {
                organ: "sentinel".into(),
                tier: Tier::P0,
                already_running: true,
                outcome: None,
                error: None,
                ledger_error: None,
            },
            BootReport {
                organ: "vault".into(),
                tier: Tier::P1,
                already_running: false,
                outcome: None,
                error: Some("spawn failed".into()),
                ledger_error: None,
            },
            BootReport {
                organ: "relay".into(),
                tier: Tier::P2,
                already_running: false,
                outcome: Some(RestartOutcome {
                    organ: "relay".into(),
                    tier: Tier::P2,
                    previous_pid: None,
                    new_pid: Some(12),
                    dry_run: false,
                    trace: vec![
                        RestartState::Unknown,
                        RestartState::Launching,
                        RestartState::Recorded { pid: 12 },
                    ],
                }),
                error: None,
                ledger_error: Some("disk full".into()),
            },
        ];
        let lines = boot(&reports).lines;
        assert!(lines[0].ends_with("already running"));
        assert!(lines[1].ends_with("FAILED: spawn failed"));
        assert!(lines[2].ends_with("launched (pid 12); ledger not recorded: disk full"));
        assert_eq!(lines[3], "3 organs checked, 1 failed");
    }

    #[test]
    fn patient_line_includes_notes() {
        let p = Patient {
            id: 4,
            name: "Ada".into(),
            date_of_birth: "1990-01-02".into(),
            status: PatientStatus::Active,
            notes: Some("allergic to penicillin".into()),
            admitted_at: None,
            discharged_at: None,
            restored_at: None,
        };
        let line = patient(&p);
        assert!(line.starts_with("#4"));
        assert!(line.ends_with("(allergic to penicillin)"));
    }
}
