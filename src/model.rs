use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Static priority class of an organ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    /// Life support: catastrophic if down.
    P0,
    /// Primary operational backbone.
    P1,
    /// Secondary / supporting.
    P2,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::P0, Tier::P1, Tier::P2];

    pub fn as_str(self) -> &'static str {
        match self {
            Tier::P0 => "P0",
            Tier::P1 => "P1",
            Tier::P2 => "P2",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "P0" => Ok(Tier::P0),
            "P1" => Ok(Tier::P1),
            "P2" => Ok(Tier::P2),
            other => Err(format!("unknown tier '{other}' (expected P0, P1 or P2)")),
        }
    }
}

/// A configured organ. Never created or destroyed at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganSpec {
    pub name: String,
    pub tier: Tier,
    pub glyph: String,
    pub pid_file: PathBuf,
    pub log_file: PathBuf,
    pub command: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Point-in-time view of an organ, with liveness computed at listing time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganStatus {
    pub name: String,
    pub tier: Tier,
    pub glyph: String,
    pub running: bool,
    pub pid: Option<i32>,
    pub pid_file: PathBuf,
    pub log: PathBuf,
    pub runnable: bool,
}

/// Result of `list_organs`: per-organ status plus the count pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganListing {
    pub organs: Vec<OrganStatus>,
    pub total: usize,
    pub running: usize,
    pub runnable: usize,
}

impl OrganListing {
    pub fn by_tier(&self, tier: Tier) -> impl Iterator<Item = &OrganStatus> {
        self.organs.iter().filter(move |o| o.tier == tier)
    }
}

/// States of the restart workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RestartState {
    Unknown,
    Alive { pid: i32 },
    Terminating { pid: i32 },
    Launching,
    Recorded { pid: i32 },
}

impl RestartState {
    pub fn label(&self) -> &'static str {
        match self {
            RestartState::Unknown => "unknown",
            RestartState::Alive { .. } => "alive",
            RestartState::Terminating { .. } => "terminating",
            RestartState::Launching => "launching",
            RestartState::Recorded { .. } => "recorded",
        }
    }
}

/// Successful restart report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestartOutcome {
    pub organ: String,
    pub tier: Tier,
    pub previous_pid: Option<i32>,
    pub new_pid: Option<i32>,
    pub dry_run: bool,
    /// Every state the workflow passed through, in order.
    pub trace: Vec<RestartState>,
}

/// Per-organ entry of a boot run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootReport {
    pub organ: String,
    pub tier: Tier,
    pub already_running: bool,
    pub outcome: Option<RestartOutcome>,
    /// Why the organ could not be brought up.
    pub error: Option<String>,
    /// The organ came up but its ledger entry could not be written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientStatus {
    Active,
    Discharged,
    Restored,
}

impl PatientStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PatientStatus::Active => "active",
            PatientStatus::Discharged => "discharged",
            PatientStatus::Restored => "restored",
        }
    }
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PatientStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(PatientStatus::Active),
            "discharged" => Ok(PatientStatus::Discharged),
            "restored" => Ok(PatientStatus::Restored),
            other => Err(format!("unknown patient status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: u64,
    pub name: String,
    #[serde(rename = "dob")]
    pub date_of_birth: String,
    pub status: PatientStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admitted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discharged_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientCounts {
    pub total: usize,
    pub active: usize,
    pub discharged: usize,
    pub restored: usize,
}

/// One host metrics sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HostSample {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub load: [f64; 3],
}

/// Window statistics (mean, median, 25th, 75th percentile).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowSummary {
    pub mean: f64,
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub load: [f64; 3],
    pub samples: usize,
    pub cpu_window: Option<WindowSummary>,
    pub mem_window: Option<WindowSummary>,
}

/// Overview counts for the systems page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemsOverview {
    pub organs_total: usize,
    pub organs_running: usize,
    pub organs_runnable: usize,
    pub patients: PatientCounts,
}

/// Current UTC time as RFC3339.
pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "now".into())
}
