//! builds-e2e - condition polling for OpenShift builds end-to-end tests
//!
//! Asserts that cluster-managed resources (secrets, pods, Shipwright BuildRuns,
//! BuildConfigs) eventually reach a desired state. Transient absence is
//! retried; retrieval errors and terminal resource failures fail fast; every
//! wait is bounded by a hard deadline.
//!
//! # Modules
//!
//! - [`poll`] - Fixed-interval poll loop with deadline and cancellation
//! - [`condition`] - Per-kind conditions evaluated against snapshots
//! - [`fetch`] - Resource retrieval with NotFound/Other classification
//! - [`scenario`] - Fixture lifecycle and poll assertions for test cases
//! - [`manifest`] - Apply/delete fixture manifests from YAML files
//! - [`config`] - Environment-driven suite configuration
//! - [`kube_utils`] - Client construction and dynamic API resources
//! - [`telemetry`] - Logging initialization
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod condition;
pub mod config;
pub mod error;
pub mod fetch;
pub mod kube_utils;
pub mod manifest;
pub mod poll;
pub mod scenario;
pub mod telemetry;

pub use condition::{Condition, ConditionResult};
pub use error::Error;
pub use fetch::{FetchError, KubeFetcher, ObjectKey, ResourceFetcher, ResourceKind, Snapshot};
pub use poll::{PollExecutor, PollOutcome, PollReport, PollSpec};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
