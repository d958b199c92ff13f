use crate::model::PatientStatus;
use std::path::PathBuf;
use std::time::Duration;

/// Failures of the organ subsystem.
#[derive(Debug, thiserror::Error)]
pub enum OrganError {
    #[error("organ '{0}' is not configured")]
    OrganNotFound(String),
    #[error("organ '{organ}' (pid {pid}) did not exit within {}", humantime::format_duration(*waited))]
    RestartTimeout {
        organ: String,
        pid: i32,
        waited: Duration,
    },
    #[error("failed to launch organ '{organ}': {reason}")]
    LaunchFailure { organ: String, reason: String },
    #[error("failed to record pid for organ '{organ}' at {}: {source}", path.display())]
    Persistence {
        organ: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the patient record subsystem.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("validation failed: '{field}' must not be empty")]
    Validation { field: &'static str },
    #[error("patient {0} not found")]
    NotFound(u64),
    #[error("patient {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: u64,
        from: PatientStatus,
        to: PatientStatus,
    },
    #[error("persistence failed for {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl RecordError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RecordError::Persistence {
            path: path.into(),
            source,
        }
    }
}
