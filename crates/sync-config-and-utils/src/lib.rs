//! Configuration, paths and logging bootstrap for offline-sync tools.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_API_BASE_URL, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_in, normalize_level, SERVICE_NAME};
pub use paths::Paths;
