//! Patient record store.
//!
//! The store keeps an in-memory record book backed by one JSON document. Other console
//! processes may write the same document, so every mutation runs through
//! [`PatientStore::mutate`]: take the exclusive document lock, reload the book from disk,
//! apply the change, persist the full document atomically, and only then publish the new
//! book. A failed write leaves both disk and memory exactly as they were. Reads serve the
//! in-memory book and reload it when the document changed underneath.

use crate::error::RecordError;
use crate::model::{now_rfc3339, Patient, PatientCounts, PatientStatus};
use crate::storage::atomic;
use crate::storage::lock::DocumentLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Allowed status changes. Anything not listed is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransitionTable {
    allowed: Vec<(PatientStatus, PatientStatus)>,
}

impl Default for TransitionTable {
    fn default() -> Self {
        Self::new(vec![
            (PatientStatus::Active, PatientStatus::Discharged),
            (PatientStatus::Discharged, PatientStatus::Restored),
        ])
    }
}

impl TransitionTable {
    pub fn new(allowed: Vec<(PatientStatus, PatientStatus)>) -> Self {
        Self { allowed }
    }

    pub fn permits(&self, from: PatientStatus, to: PatientStatus) -> bool {
        from == to || self.allowed.contains(&(from, to))
    }
}

/// Modification time and length of the document when the book was last synced.
type Stamp = Option<(SystemTime, u64)>;

#[derive(Debug, Clone, Default)]
struct PatientBook {
    patients: Vec<Patient>,
    next_id: u64,
    stamp: Stamp,
}

impl PatientBook {
    /// Read the document at `path`. Caller holds the document lock.
    fn load(path: &Path) -> Result<Self, RecordError> {
        let stamp = stamp_of(path);
        let patients = load_records(path)?;
        let mut seen = HashSet::new();
        if let Some(dup) = patients.iter().find(|p| !seen.insert(p.id)) {
            return Err(RecordError::persistence(
                path,
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("duplicate patient id {}", dup.id),
                ),
            ));
        }
        let next_id = patients.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        Ok(Self {
            patients,
            next_id,
            stamp,
        })
    }
}

pub struct PatientStore {
    path: PathBuf,
    transitions: TransitionTable,
    book: Mutex<PatientBook>,
}

impl PatientStore {
    /// Load the store from `path`. A missing file is an empty book; a malformed one is an
    /// error, never silently replaced.
    pub fn open(path: impl Into<PathBuf>, transitions: TransitionTable) -> Result<Self, RecordError> {
        let path = path.into();
        let book = {
            let _doc = DocumentLock::exclusive(&path)
                .map_err(|e| RecordError::persistence(&path, e))?;
            sweep_temp_artifacts(&path);
            PatientBook::load(&path)?
        };
        info!(path = %path.display(), records = book.patients.len(), "patient store loaded");
        Ok(Self {
            path,
            transitions,
            book: Mutex::new(book),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Intake a new Active patient.
    pub fn add(
        &self,
        name: &str,
        date_of_birth: &str,
        notes: Option<String>,
    ) -> Result<Patient, RecordError> {
        let name = name.trim();
        let dob = date_of_birth.trim();
        if name.is_empty() {
            return Err(RecordError::Validation { field: "name" });
        }
        if dob.is_empty() {
            return Err(RecordError::Validation { field: "dob" });
        }
        let notes = notes.filter(|n| !n.trim().is_empty());

        let patient = self.mutate(|book| {
            let patient = Patient {
                id: book.next_id,
                name: name.to_string(),
                date_of_birth: dob.to_string(),
                status: PatientStatus::Active,
                notes,
                admitted_at: Some(now_rfc3339()),
                discharged_at: None,
                restored_at: None,
            };
            book.next_id += 1;
            book.patients.push(patient.clone());
            Ok((patient, true))
        })?;
        info!(id = patient.id, "patient admitted");
        Ok(patient)
    }

    /// Records matching `status` (all when `None`), in stored order.
    pub fn list(&self, status: Option<PatientStatus>) -> Vec<Patient> {
        self.synced()
            .patients
            .iter()
            .filter(|p| status.map_or(true, |s| p.status == s))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: u64) -> Result<Patient, RecordError> {
        self.synced()
            .patients
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or(RecordError::NotFound(id))
    }

    /// Move patient `id` to `to`. Moving to the current status is a no-op.
    pub fn transition(&self, id: u64, to: PatientStatus) -> Result<Patient, RecordError> {
        let transitions = &self.transitions;
        let mut changed = false;
        let patient = self.mutate(|book| {
            let patient = book
                .patients
                .iter_mut()
                .find(|p| p.id == id)
                .ok_or(RecordError::NotFound(id))?;
            let from = patient.status;
            if !transitions.permits(from, to) {
                return Err(RecordError::InvalidTransition { id, from, to });
            }
            if from == to {
                return Ok((patient.clone(), false));
            }
            patient.status = to;
            match to {
                PatientStatus::Discharged => patient.discharged_at = Some(now_rfc3339()),
                PatientStatus::Restored => patient.restored_at = Some(now_rfc3339()),
                PatientStatus::Active => {}
            }
            changed = true;
            Ok((patient.clone(), true))
        })?;

        if changed {
            info!(id, status = %to, "patient status changed");
        } else {
            debug!(id, status = %to, "transition is a no-op");
        }
        Ok(patient)
    }

    pub fn counts(&self) -> PatientCounts {
        let book = self.synced();
        let mut c = PatientCounts {
            total: book.patients.len(),
            ..Default::default()
        };
        for p in &book.patients {
            match p.status {
                PatientStatus::Active => c.active += 1,
                PatientStatus::Discharged => c.discharged += 1,
                PatientStatus::Restored => c.restored += 1,
            }
        }
        c
    }

    /// Single mutation entry point. `apply` returns the value to hand back and whether the
    /// book changed; unchanged books are not rewritten.
    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut PatientBook) -> Result<(T, bool), RecordError>,
    ) -> Result<T, RecordError> {
        let mut guard = self.lock();
        let _doc = DocumentLock::exclusive(&self.path)
            .map_err(|e| RecordError::persistence(&self.path, e))?;
        let mut draft = PatientBook::load(&self.path)?;
        let (out, changed) = apply(&mut draft)?;
        if changed {
            atomic::write_json_atomic(&self.path, &draft.patients)
                .map_err(|e| RecordError::persistence(&self.path, e))?;
            draft.stamp = stamp_of(&self.path);
        }
        *guard = draft;
        Ok(out)
    }

    /// The book, reloaded first if the document changed since the last sync. A failed
    /// reload keeps serving the last good book.
    fn synced(&self) -> MutexGuard<'_, PatientBook> {
        let mut guard = self.lock();
        if stamp_of(&self.path) == guard.stamp {
            return guard;
        }
        let reloaded = DocumentLock::shared(&self.path)
            .map_err(|e| RecordError::persistence(&self.path, e))
            .and_then(|_doc| PatientBook::load(&self.path));
        match reloaded {
            Ok(book) => {
                debug!(path = %self.path.display(), records = book.patients.len(), "patient store reloaded");
                *guard = book;
            }
            Err(e) => warn!(error = %e, "patient store reload failed; serving last good records"),
        }
        guard
    }

    fn lock(&self) -> MutexGuard<'_, PatientBook> {
        // A panic while holding the lock cannot leave a half-applied book: mutations only
        // publish a fully persisted draft.
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn load_records(path: &Path) -> Result<Vec<Patient>, RecordError> {
    let data = match fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(RecordError::persistence(path, e)),
    };
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&data).map_err(|e| RecordError::persistence(path, e.into()))
}

fn stamp_of(path: &Path) -> Stamp {
    let meta = fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}

/// Remove temp files left behind by a write that was interrupted before its rename.
fn sweep_temp_artifacts(path: &Path) {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return;
    };
    let prefix = format!(".{}.", name.to_string_lossy());
    let Ok(entries) = fs::read_dir(if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    }) else {
        return;
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let p = entry.path();
        let matches = p
            .file_name()
            .map(|n| n.to_string_lossy().starts_with(&prefix))
            .unwrap_or(false);
        if matches && atomic::is_temp_artifact(&p) {
            debug!(path = %p.display(), "removing interrupted write");
            let _ = fs::remove_file(&p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn open_in(dir: &Path) -> PatientStore {
        PatientStore::open(dir.join("patients.json"), TransitionTable::default()).unwrap()
    }

    fn on_disk(store: &PatientStore) -> Vec<Patient> {
        serde_json::from_str(&fs::read_to_string(store.path()).unwrap()).unwrap()
    }

    #[test]
    fn add_assigns_ids_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(dir.path());
        let a = store.add("Ada Lovelace", "1815-12-10", None).unwrap();
        let b = store.add("  Grace Hopper ", "1906-12-09", Some("night shift".into())).unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(b.name, "Grace Hopper");
        assert_eq!(a.status, PatientStatus::Active);
        assert!(a.admitted_at.is_some());

        let disk = on_disk(&store);
        assert_eq!(disk.len(), 2);
        assert_eq!(disk[1].notes.as_deref(), Some("night shift"));

        let reopened = open_in(dir.path());
        assert_eq!(reopened.list(None), store.list(None));
        assert_eq!(reopened.add("Alan", "1912-06-23", None).unwrap().id, 3);
    }

    #[test]
    fn empty_fields_are_rejected_without_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(dir.path());
        store.add("Ada", "1815-12-10", None).unwrap();
        let before = fs::read_to_string(store.path()).unwrap();

        match store.add("   ", "2000-01-01", None) {
            Err(RecordError::Validation { field }) => assert_eq!(field, "name"),
            other => panic!("unexpected: {other:?}"),
        }
        match store.add("Bob", "", None) {
            Err(RecordError::Validation { field }) => assert_eq!(field, "dob"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(store.list(None).len(), 1);
        assert_eq!(fs::read_to_string(store.path()).unwrap(), before);
    }

    #[test]
    fn discharge_then_restore_keeps_identity() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(dir.path());
        let p = store.add("Ada", "1815-12-10", None).unwrap();

        let d = store.transition(p.id, PatientStatus::Discharged).unwrap();
        assert_eq!(d.status, PatientStatus::Discharged);
        assert!(d.discharged_at.is_some());

        let r = store.transition(p.id, PatientStatus::Restored).unwrap();
        assert_eq!(r.status, PatientStatus::Restored);
        assert_eq!((r.id, r.name.as_str()), (p.id, "Ada"));
        assert_eq!(on_disk(&store)[0].status, PatientStatus::Restored);
    }

    #[test]
    fn transitions_follow_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(dir.path());
        let p = store.add("Ada", "1815-12-10", None).unwrap();

        assert!(matches!(
            store.transition(p.id, PatientStatus::Restored),
            Err(RecordError::InvalidTransition { from: PatientStatus::Active, .. })
        ));
        assert!(matches!(
            store.transition(99, PatientStatus::Discharged),
            Err(RecordError::NotFound(99))
        ));
        // Same status: accepted, nothing rewritten.
        let same = store.transition(p.id, PatientStatus::Active).unwrap();
        assert_eq!(same.status, PatientStatus::Active);

        let cyclic = PatientStore::open(
            dir.path().join("cyclic.json"),
            TransitionTable::new(vec![
                (PatientStatus::Active, PatientStatus::Discharged),
                (PatientStatus::Discharged, PatientStatus::Restored),
                (PatientStatus::Restored, PatientStatus::Active),
            ]),
        )
        .unwrap();
        let q = cyclic.add("Bob", "1970-01-01", None).unwrap();
        cyclic.transition(q.id, PatientStatus::Discharged).unwrap();
        cyclic.transition(q.id, PatientStatus::Restored).unwrap();
        assert_eq!(
            cyclic.transition(q.id, PatientStatus::Active).unwrap().status,
            PatientStatus::Active
        );
    }

    #[test]
    fn list_filters_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(dir.path());
        for n in ["a", "b", "c"] {
            store.add(n, "2001-01-01", None).unwrap();
        }
        store.transition(2, PatientStatus::Discharged).unwrap();

        let active: Vec<_> = store
            .list(Some(PatientStatus::Active))
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(active, vec![1, 3]);
        assert_eq!(store.list(Some(PatientStatus::Discharged))[0].name, "b");
        assert_eq!(
            store.counts(),
            PatientCounts {
                total: 3,
                active: 2,
                discharged: 1,
                restored: 0
            }
        );
    }

    #[test]
    fn concurrent_adds_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(open_in(dir.path()));
        let handles: Vec<_> = (0..2)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store.add(&format!("p{t}-{i}"), "1999-09-09", None).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut ids: Vec<_> = on_disk(&store).iter().map(|p| p.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn interrupted_write_leaves_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(dir.path());
        store.add("Ada", "1815-12-10", None).unwrap();
        let committed = fs::read_to_string(store.path()).unwrap();

        // Simulate a crash after the temp file was partially written but before rename.
        let torn = dir.path().join(".patients.json.deadbeef0000.tmp");
        fs::write(&torn, &committed.as_bytes()[..committed.len() / 2]).unwrap();
        drop(store);

        let reopened = open_in(dir.path());
        assert_eq!(reopened.list(None).len(), 1);
        assert_eq!(fs::read_to_string(reopened.path()).unwrap(), committed);
        assert!(!torn.exists());
    }

    #[test]
    fn failed_persist_keeps_memory_and_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(dir.path());
        store.add("Ada", "1815-12-10", None).unwrap();

        // Replace the document with a non-empty directory so the rename must fail.
        fs::remove_file(store.path()).unwrap();
        fs::create_dir(store.path()).unwrap();
        fs::write(store.path().join("occupied"), b"x").unwrap();

        assert!(matches!(
            store.add("Bob", "1970-01-01", None),
            Err(RecordError::Persistence { .. })
        ));
        assert!(matches!(
            store.transition(1, PatientStatus::Discharged),
            Err(RecordError::Persistence { .. })
        ));
        assert_eq!(store.list(None).len(), 1);
        assert_eq!(store.get(1).unwrap().status, PatientStatus::Active);
    }

    #[test]
    fn two_stores_on_one_document_do_not_lose_updates() {
        let dir = tempfile::tempdir().unwrap();
        let server = open_in(dir.path());
        server.add("Ada", "1815-12-10", None).unwrap();

        let cli = open_in(dir.path());
        let bob = cli.add("Bob", "1970-01-01", None).unwrap();
        assert_eq!(bob.id, 2);

        let cy = server.add("Cy", "1980-05-05", None).unwrap();
        assert_eq!(cy.id, 3);
        cli.transition(3, PatientStatus::Discharged).unwrap();

        let disk: Vec<(u64, String)> = on_disk(&server)
            .into_iter()
            .map(|p| (p.id, p.name))
            .collect();
        assert_eq!(
            disk,
            vec![(1, "Ada".into()), (2, "Bob".into()), (3, "Cy".into())]
        );
        assert_eq!(server.get(3).unwrap().status, PatientStatus::Discharged);
        assert_eq!(server.counts().total, 3);
    }

    #[test]
    fn duplicate_ids_are_rejected_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patients.json");
        fs::write(
            &path,
            r#"[{"id": 1, "name": "Ada", "dob": "1815-12-10", "status": "active"},
                {"id": 1, "name": "Bob", "dob": "1970-01-01", "status": "discharged"}]"#,
        )
        .unwrap();
        match PatientStore::open(&path, TransitionTable::default()) {
            Err(RecordError::Persistence { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::InvalidData);
                assert!(source.to_string().contains("duplicate patient id 1"));
            }
            other => panic!("unexpected: {:?}", other.map(|s| s.list(None))),
        }
    }

    #[test]
    fn malformed_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patients.json");
        fs::write(&path, "[{\"id\": 1, \"name\": ").unwrap();
        assert!(matches!(
            PatientStore::open(&path, TransitionTable::default()),
            Err(RecordError::Persistence { .. })
        ));
    }
}
