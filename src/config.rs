//! Console configuration.
//!
//! Settings come from an optional TOML file; anything not set falls back to the defaults
//! below. The organ registry is static for the lifetime of the process.

use crate::model::{OrganSpec, Tier};
use crate::storage::TransitionTable;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Organs registered when the configuration file lists none.
const DEFAULT_ORGANS: &[(&str, Tier)] = &[
    ("sentinel", Tier::P0),
    ("guardian", Tier::P1),
    ("audit_log", Tier::P1),
    ("vault", Tier::P1),
    ("firewall", Tier::P1),
    ("hospital", Tier::P1),
    ("api", Tier::P1),
    ("engine", Tier::P1),
    ("cockpit_backend", Tier::P1),
    ("watchdog", Tier::P1),
    ("scheduler", Tier::P1),
    ("dispatcher", Tier::P1),
    ("roster", Tier::P1),
    ("metrics", Tier::P2),
    ("telemetry", Tier::P2),
    ("logger", Tier::P2),
    ("journal", Tier::P2),
    ("zombie_sweeper", Tier::P2),
];

const FALLBACK_GLYPH: &str = "◻️";

fn default_glyph(name: &str) -> &'static str {
    match name {
        "sentinel" | "guardian" => "🛡️",
        "audit_log" => "📘",
        "vault" => "🔒",
        "firewall" => "⛔",
        "hospital" => "🏥",
        "api" => "🔗",
        "engine" => "⚙️",
        "cockpit_backend" => "🖥️",
        "watchdog" => "👁️",
        "scheduler" => "⏱️",
        "dispatcher" => "📨",
        "roster" => "🧑‍⚕️",
        _ => FALLBACK_GLYPH,
    }
}

fn default_tier(name: &str) -> Tier {
    DEFAULT_ORGANS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, t)| *t)
        .unwrap_or(Tier::P2)
}

/// One `[[organ]]` table. Only `name` is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganEntry {
    pub name: String,
    #[serde(default)]
    pub tier: Option<Tier>,
    #[serde(default)]
    pub glyph: Option<String>,
    #[serde(default)]
    pub pid_file: Option<PathBuf>,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    #[serde(default)]
    pub command: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
}

impl OrganEntry {
    fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tier: None,
            glyph: None,
            pid_file: None,
            log_file: None,
            command: None,
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub window: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(2),
            window: 60,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientConfig {
    pub transitions: TransitionTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub data_dir: PathBuf,
    pub pid_dir: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub organs_dir: PathBuf,
    pub app_dir: Option<PathBuf>,
    pub listen: String,
    /// Bound on waiting for a terminated organ to exit.
    #[serde(with = "humantime_serde")]
    pub restart_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// How long a freshly launched organ must stay up before its pid is recorded.
    #[serde(with = "humantime_serde")]
    pub startup_grace: Duration,
    /// Escalate to SIGKILL when SIGTERM does not end the process in time.
    pub kill_after_timeout: bool,
    pub dry_run: bool,
    pub metrics: MetricsConfig,
    pub patients: PatientConfig,
    #[serde(rename = "organ")]
    pub organs: Vec<OrganEntry>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pid_dir: None,
            log_dir: None,
            organs_dir: PathBuf::from("/opt/veil_os/organs"),
            app_dir: None,
            listen: "127.0.0.1:8000".to_string(),
            restart_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
            startup_grace: Duration::from_millis(250),
            kill_after_timeout: false,
            dry_run: false,
            metrics: MetricsConfig::default(),
            patients: PatientConfig::default(),
            organs: Vec::new(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("veil-console")
}

impl ConsoleConfig {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn pid_dir(&self) -> PathBuf {
        self.pid_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("run"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("log"))
    }

    pub fn patients_path(&self) -> PathBuf {
        self.data_dir.join("patients.json")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("ledger.json")
    }

    /// Resolve the registry into concrete organ specs, filling in per-organ defaults.
    pub fn organ_specs(&self) -> Result<Vec<OrganSpec>> {
        let entries: Vec<OrganEntry> = if self.organs.is_empty() {
            DEFAULT_ORGANS
                .iter()
                .map(|(n, _)| OrganEntry::named(n))
                .collect()
        } else {
            self.organs.clone()
        };

        let pid_dir = self.pid_dir();
        let log_dir = self.log_dir();
        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(entries.len());
        for e in entries {
            let name = e.name.trim().to_string();
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                bail!("invalid organ name '{}'", e.name);
            }
            if !seen.insert(name.clone()) {
                bail!("organ '{name}' is configured more than once");
            }
            specs.push(OrganSpec {
                tier: e.tier.unwrap_or_else(|| default_tier(&name)),
                glyph: e.glyph.unwrap_or_else(|| default_glyph(&name).to_string()),
                pid_file: e
                    .pid_file
                    .unwrap_or_else(|| pid_dir.join(format!("{name}.pid"))),
                log_file: e
                    .log_file
                    .unwrap_or_else(|| log_dir.join(format!("{name}.log"))),
                command: e
                    .command
                    .unwrap_or_else(|| self.organs_dir.join(&name).join("run.sh")),
                args: e.args,
                name,
            });
        }
        Ok(specs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PatientStatus;

    #[test]
    fn defaults_cover_builtin_registry() {
        let mut cfg = ConsoleConfig::default();
        cfg.data_dir = PathBuf::from("/srv/veil");
        let specs = cfg.organ_specs().unwrap();
        assert_eq!(specs.len(), DEFAULT_ORGANS.len());

        let sentinel = &specs[0];
        assert_eq!(sentinel.tier, Tier::P0);
        assert_eq!(sentinel.glyph, "🛡️");
        assert_eq!(sentinel.pid_file, PathBuf::from("/srv/veil/run/sentinel.pid"));
        assert_eq!(
            sentinel.command,
            PathBuf::from("/opt/veil_os/organs/sentinel/run.sh")
        );
        let telemetry = specs.iter().find(|s| s.name == "telemetry").unwrap();
        assert_eq!(telemetry.glyph, FALLBACK_GLYPH);
    }

    #[test]
    fn parses_toml_registry() {
        let cfg = ConsoleConfig::from_toml(
            r#"
            data_dir = "/var/lib/veil"
            pid_dir = "/run/veil"
            restart_timeout = "2s 500ms"
            kill_after_timeout = true

            [metrics]
            interval = "5s"

            [patients]
            transitions = [["active", "discharged"], ["discharged", "restored"], ["restored", "discharged"]]

            [[organ]]
            name = "sentinel"
            command = "/usr/bin/sleep"
            args = ["600"]

            [[organ]]
            name = "relay"
            tier = "P1"
            glyph = "📡"
            pid_file = "/tmp/relay.pid"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.restart_timeout, Duration::from_millis(2500));
        assert!(cfg.kill_after_timeout);
        assert_eq!(cfg.metrics.interval, Duration::from_secs(5));
        assert_eq!(cfg.metrics.window, 60);
        assert!(cfg
            .patients
            .transitions
            .permits(PatientStatus::Restored, PatientStatus::Discharged));

        let specs = cfg.organ_specs().unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].tier, Tier::P0);
        assert_eq!(specs[0].pid_file, PathBuf::from("/run/veil/sentinel.pid"));
        assert_eq!(specs[0].args, vec!["600".to_string()]);
        assert_eq!(specs[1].tier, Tier::P1);
        assert_eq!(specs[1].pid_file, PathBuf::from("/tmp/relay.pid"));
        assert_eq!(specs[1].log_file, PathBuf::from("/var/lib/veil/log/relay.log"));
    }

    #[test]
    fn rejects_duplicate_and_unsafe_names() {
        let dup = ConsoleConfig::from_toml("[[organ]]\nname = \"a\"\n[[organ]]\nname = \"a\"\n").unwrap();
        assert!(dup.organ_specs().is_err());
        let unsafe_name = ConsoleConfig::from_toml("[[organ]]\nname = \"../etc\"\n").unwrap();
        assert!(unsafe_name.organ_specs().is_err());
    }
}
