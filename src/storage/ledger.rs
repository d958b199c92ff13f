//! Hash-chained record of organ activations.
//!
//! Each entry commits to its predecessor through `prev_hash`; the first entry links to
//! [`GENESIS`]. The hash covers the canonical fields only (`index`, `organ`, `prev_hash`,
//! `tier`, `timestamp`), serialized as JSON with keys in that sorted order.

use crate::model::Tier;
use crate::storage::atomic;
use crate::storage::lock::DocumentLock;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

pub const GENESIS: &str = "GENESIS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub index: u64,
    pub organ: String,
    pub tier: Tier,
    pub timestamp: f64,
    pub prev_hash: String,
    pub hash: String,
}

/// Field order here is the hashing order; keep it alphabetical.
#[derive(Serialize)]
struct Canonical<'a> {
    index: u64,
    organ: &'a str,
    prev_hash: &'a str,
    tier: Tier,
    timestamp: f64,
}

pub fn hash_entry(index: u64, organ: &str, tier: Tier, timestamp: f64, prev_hash: &str) -> String {
    let canonical = Canonical {
        index,
        organ,
        prev_hash,
        tier,
        timestamp,
    };
    let mut bytes = Vec::with_capacity(128);
    let mut ser = serde_json::Serializer::with_formatter(&mut bytes, SpacedAsciiFormatter);
    // Serializing a plain struct of strings and numbers into memory cannot fail.
    let _ = canonical.serialize(&mut ser);
    hex::encode(Sha256::digest(&bytes))
}

/// JSON with `", "` / `": "` separators and non-ASCII escaped as `\uXXXX`, matching the
/// byte layout of ledgers written by the Python console (`json.dumps(sort_keys=True)`).
struct SpacedAsciiFormatter;

impl serde_json::ser::Formatter for SpacedAsciiFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(&mut self, writer: &mut W, first: bool) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()> {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }
        let mut units = [0u16; 2];
        for c in fragment.chars() {
            if c.is_ascii() {
                writer.write_all(&[c as u8])?;
            } else {
                for unit in c.encode_utf16(&mut units) {
                    write!(writer, "\\u{unit:04x}")?;
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyReport {
    pub entries: usize,
    pub intact: bool,
    /// Position of the first entry that failed verification.
    pub broken_at: Option<usize>,
    pub reason: Option<String>,
}

pub struct Ledger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Ledger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<LedgerEntry>> {
        let data = match fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("read ledger {}", self.path.display()))
            }
        };
        if data.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(&data)
            .with_context(|| format!("ledger is not valid JSON: {}", self.path.display()))
    }

    /// Append an entry for `organ` linked to the current tail.
    pub fn append(&self, organ: &str, tier: Tier) -> Result<LedgerEntry> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let _doc = DocumentLock::exclusive(&self.path)
            .with_context(|| format!("lock ledger {}", self.path.display()))?;
        let mut entries = self.load()?;
        let prev_hash = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS.to_string());
        let index = entries.len() as u64;
        let timestamp = unix_now();
        let entry = LedgerEntry {
            index,
            organ: organ.to_string(),
            tier,
            timestamp,
            hash: hash_entry(index, organ, tier, timestamp, &prev_hash),
            prev_hash,
        };
        entries.push(entry.clone());
        atomic::write_json_atomic(&self.path, &entries)
            .with_context(|| format!("write ledger {}", self.path.display()))?;
        info!(organ, tier = %tier, index, "organ recorded in ledger");
        Ok(entry)
    }

    pub fn verify(&self) -> Result<VerifyReport> {
        let entries = self.load()?;
        Ok(verify_entries(&entries))
    }
}

/// Check every stored hash and every `prev_hash` link.
pub fn verify_entries(entries: &[LedgerEntry]) -> VerifyReport {
    let mut expected_prev = GENESIS.to_string();
    for (pos, e) in entries.iter().enumerate() {
        let fail = |reason: String| {
            warn!(position = pos, %reason, "ledger verification failed");
            VerifyReport {
                entries: entries.len(),
                intact: false,
                broken_at: Some(pos),
                reason: Some(reason),
            }
        };
        if e.prev_hash != expected_prev {
            return fail(format!("broken chain at index {}", e.index));
        }
        let recomputed = hash_entry(e.index, &e.organ, e.tier, e.timestamp, &e.prev_hash);
        if recomputed != e.hash {
            return fail(format!("tampering detected at index {}", e.index));
        }
        expected_prev = recomputed;
    }
    VerifyReport {
        entries: entries.len(),
        intact: true,
        broken_at: None,
        reason: None,
    }
}

fn unix_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
