use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
    /// Rejected at construction or parse time, never retried.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The snapshot could not be written. Monitor state is left as it was before the call.
    #[error("failed to persist snapshot to {}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

/// NVML failure, carried inline in [`crate::GpuStat`] rather than returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("device query failed: {0}")]
pub struct DeviceQueryError(pub String);
