pub mod config;
pub mod cycle;
pub mod errors;
pub mod model;
pub mod providers;
pub mod reconcile;
pub mod report_url;
pub mod scan;
pub mod select;
pub mod status;
pub mod types;

pub use crate::config::{BackendConfig, BackendKind, BoardConfig};
pub use crate::errors::{ConfigError, DataShapeError, ScanError, TransportError};
pub use crate::model::{BuildSummary, Status};
pub use crate::providers::{Backend, BuildProvider, ResultFilter, create_backends};
pub use crate::scan::Aggregator;
