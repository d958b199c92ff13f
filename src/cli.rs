use crate::config::ConsoleConfig;
use crate::model::PatientStatus;
use crate::orchestrator::{self, Console};
use crate::text_summary::{self, TextSummary};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (
    mpsc::UnboundedSender<OutputLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "veil-console",
    version,
    about = "Organ supervision and patient records console"
)]
pub struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, global = true, env = "VEIL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory for pid files, logs, patients.json and ledger.json
    #[arg(long, global = true, env = "VEIL_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Plan restarts without signalling, launching or writing anything
    #[arg(
        long,
        global = true,
        env = "VEIL_DRY_RUN",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub dry_run: bool,

    /// Log filter (e.g. info, debug, veil_console=trace); RUST_LOG wins when set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP console
    Serve(ServeArgs),
    /// List every configured organ with its liveness
    Organs,
    /// Show one organ
    Status { name: String },
    /// Restart one organ (launches it if it is down)
    Restart { name: String },
    /// Bring every down organ up, in tier order
    Boot,
    /// Patient records
    #[command(subcommand)]
    Patients(PatientsCommand),
    /// Organ activation ledger
    #[command(subcommand)]
    Ledger(LedgerCommand),
}

#[derive(Debug, Args, Clone)]
pub struct ServeArgs {
    /// Address to listen on (overrides the config file)
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Directory of the built dashboard, served under /app
    #[arg(long)]
    pub app_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum PatientsCommand {
    /// List patients, optionally filtered by status
    List {
        #[arg(long)]
        status: Option<PatientStatus>,
    },
    /// Admit a new patient
    Add {
        name: String,
        dob: String,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Discharge an active patient
    Discharge { id: u64 },
    /// Restore a discharged patient
    Restore { id: u64 },
}

#[derive(Debug, Subcommand, Clone)]
pub enum LedgerCommand {
    /// Recompute every hash and check the chain
    Verify,
    /// Print every entry
    Show,
}

/// Build the effective configuration: file (or defaults) with CLI overrides on top.
pub fn build_config(args: &Cli) -> Result<ConsoleConfig> {
    let mut cfg = ConsoleConfig::load(args.config.as_deref())?;
    if let Some(dir) = args.data_dir.clone() {
        cfg.data_dir = dir;
    }
    if args.dry_run {
        cfg.dry_run = true;
    }
    if let Command::Serve(serve) = &args.command {
        if let Some(listen) = serve.listen {
            cfg.listen = listen.to_string();
        }
        if let Some(dir) = serve.app_dir.clone() {
            cfg.app_dir = Some(dir);
        }
    }
    Ok(cfg)
}

pub async fn run(args: Cli) -> Result<()> {
    let cfg = build_config(&args)?;
    let console = Console::open(&cfg)?;

    if let Command::Serve(_) = args.command {
        let listen: SocketAddr = cfg
            .listen
            .parse()
            .with_context(|| format!("invalid listen address '{}'", cfg.listen))?;
        return orchestrator::run_server(console, listen, cfg.metrics.interval).await;
    }

    let (out_tx, out_handle) = spawn_output_writer();
    let result = run_command(&args, &console, &out_tx).await;
    drop(out_tx);
    let _ = out_handle.await;
    result
}

/// Emit `value` as pretty JSON in `--json` mode, otherwise the text summary.
fn emit<T: Serialize>(
    tx: &mpsc::UnboundedSender<OutputLine>,
    json: bool,
    value: &T,
    text: impl FnOnce() -> TextSummary,
) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(value)?;
        let _ = tx.send(OutputLine::Stdout(out));
    } else {
        for line in text().lines {
            let _ = tx.send(OutputLine::Stdout(line));
        }
    }
    Ok(())
}

async fn run_command(
    args: &Cli,
    console: &Console,
    tx: &mpsc::UnboundedSender<OutputLine>,
) -> Result<()> {
    let json = args.json;
    match &args.command {
        Command::Serve(_) => bail!("serve does not produce command output"),
        Command::Organs => {
            let listing = console.registry.list_organs();
            emit(tx, json, &listing, || text_summary::organ_listing(&listing))
        }
        Command::Status { name } => {
            let status = console.registry.status(name)?;
            emit(tx, json, &status, || text_summary::organ_status(&status))
        }
        Command::Restart { name } => {
            let recorded =
                orchestrator::restart_and_record(&console.registry, &console.ledger, name)
                    .await
                    .with_context(|| format!("restart of '{name}' failed"))?;
            emit(tx, json, &recorded, || text_summary::restart(&recorded))
        }
        Command::Boot => {
            let reports = orchestrator::boot_all(&console.registry, &console.ledger).await;
            emit(tx, json, &reports, || text_summary::boot(&reports))?;
            let failed = reports.iter().filter(|r| r.error.is_some()).count();
            if failed > 0 {
                bail!("{failed} organ(s) failed to boot");
            }
            Ok(())
        }
        Command::Patients(cmd) => run_patients(cmd, console, tx, json),
        Command::Ledger(LedgerCommand::Show) => {
            let entries = console.ledger.load()?;
            emit(tx, json, &entries, || text_summary::ledger_entries(&entries))
        }
        Command::Ledger(LedgerCommand::Verify) => {
            let report = console.ledger.verify()?;
            emit(tx, json, &report, || text_summary::ledger_verify(&report))?;
            if !report.intact {
                let _ = tx.send(OutputLine::Stderr(format!(
                    "ledger file: {}",
                    console.ledger.path().display()
                )));
                bail!("ledger integrity check failed");
            }
            Ok(())
        }
    }
}

fn run_patients(
    cmd: &PatientsCommand,
    console: &Console,
    tx: &mpsc::UnboundedSender<OutputLine>,
    json: bool,
) -> Result<()> {
    let store = &console.patients;
    let single = |p: crate::model::Patient| {
        emit(tx, json, &p, || TextSummary {
            lines: vec![text_summary::patient(&p)],
        })
    };
    match cmd {
        PatientsCommand::List { status } => {
            let list = store.list(*status);
            emit(tx, json, &list, || text_summary::patients(&list))
        }
        PatientsCommand::Add { name, dob, notes } => {
            let p = store
                .add(name, dob, notes.clone())
                .context("patient intake failed")?;
            let _ = tx.send(OutputLine::Stderr(format!(
                "Saved: {}",
                store.path().display()
            )));
            single(p)
        }
        PatientsCommand::Discharge { id } => single(
            store
                .transition(*id, PatientStatus::Discharged)
                .with_context(|| format!("discharge of patient {id} failed"))?,
        ),
        PatientsCommand::Restore { id } => single(
            store
                .transition(*id, PatientStatus::Restored)
                .with_context(|| format!("restore of patient {id} failed"))?,
        ),
    }
}
