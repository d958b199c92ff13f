//! Organ supervision: registry, pid files, liveness checks and the restart workflow.

pub mod liveness;
pub mod pidfile;
mod registry;
mod restart;

pub use registry::OrganRegistry;
pub use restart::RestartPolicy;
