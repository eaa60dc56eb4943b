//! Remote API client for replaying queued mutations.
//!
//! [`RemoteApiClient`] is the seam the sync engine depends on. Failures come
//! back classified as [`RemoteFailure`] values (retryable or not; client,
//! server or network) rather than as errors.
//!
//! [`HttpApiClient`] is the JSON-over-HTTP implementation and
//! [`HealthProbe`] turns a health endpoint into connectivity signals.

mod client;
mod error;
mod http;
mod outcome;
mod probe;

pub use client::RemoteApiClient;
pub use error::{RemoteError, RemoteResult};
pub use http::{HttpApiClient, HttpClientConfig, DEFAULT_RESOURCE_PATH};
pub use outcome::{RemoteFailure, ReplayOutcome, StatusCategory};
pub use probe::{HealthProbe, ProbeConfig};
