//! Persisted state: atomic file replacement, advisory document locks, the patient record
//! store, and the organ activation ledger.

pub mod atomic;
pub mod ledger;
pub mod lock;
pub mod patients;

pub use ledger::Ledger;
pub use patients::{PatientStore, TransitionTable};
