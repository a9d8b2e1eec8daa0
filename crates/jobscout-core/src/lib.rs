pub mod batch;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod dom;
pub mod error;
pub mod listing;
pub mod models;
pub mod monitor;
pub mod throttle;
pub mod traits;
pub mod util;
pub mod validator;

#[cfg(test)]
pub(crate) mod testutil;

pub use batch::{BatchOptions, BatchProcessor, BatchResult};
pub use cache::Cache;
pub use config::DiscoveryConfig;
pub use error::AppError;
pub use models::{
    DiscoveredJob, JobCandidate, JobSource, JobStatus, JobValidation, UrlAnalysis, UrlKind,
    UrlOutcome,
};
pub use monitor::OperationMonitor;
pub use traits::{Browser, JobSink, PageSession};
pub use util::{compute_hash, normalize_url};
