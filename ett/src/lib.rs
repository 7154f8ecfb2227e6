pub mod checkpoint;
pub mod device;
pub mod early_stopping;
pub mod error;
pub mod seed;

pub use checkpoint::Checkpoint;
pub use device::{auto_selection, gpustat, GpuStat, GpuStatus, Selection};
pub use early_stopping::{EarlyStopping, EarlyStoppingConfig, Metrics, Monitor, Status};
pub use error::{DeviceQueryError, Error};
pub use seed::{manual_seed, Rngs};
