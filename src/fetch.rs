//! Resource retrieval for condition polling
//!
//! A [`ResourceFetcher`] returns the current state of one namespaced object as a
//! [`Snapshot`], or a [`FetchError`] classified as either "not found" or any
//! other failure. The poll loop treats the two very differently, so every
//! binding to a concrete store must preserve the classification.

use std::fmt;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Secret};
use kube::api::{Api, DynamicObject};
use kube::discovery::ApiResource;
use kube::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::trace;

#[cfg(test)]
use mockall::automock;

use crate::kube_utils::build_api_resource;

/// Shipwright BuildRun API version
pub const BUILD_RUN_API_VERSION: &str = "shipwright.io/v1beta1";

/// OpenShift BuildConfig API version
pub const BUILD_CONFIG_API_VERSION: &str = "build.openshift.io/v1";

/// Namespace and name of the object being polled
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    /// Object namespace
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ObjectKey {
    /// Create a key for a namespaced object
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Last observed state of a resource.
///
/// Wraps the object's JSON representation. Carries no identity beyond the key
/// used to fetch it.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot(Value);

impl Snapshot {
    /// Wrap an object's JSON representation
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Look up a field by JSON pointer (e.g. `/status/phase`)
    pub fn pointer(&self, pointer: &str) -> Option<&Value> {
        self.0.pointer(pointer)
    }

    /// Look up a string field by JSON pointer
    pub fn str_at(&self, pointer: &str) -> Option<&str> {
        self.pointer(pointer).and_then(Value::as_str)
    }

    /// Look up an integer field by JSON pointer
    pub fn i64_at(&self, pointer: &str) -> Option<i64> {
        self.pointer(pointer).and_then(Value::as_i64)
    }

    /// The object's `status` sub-object, if any
    pub fn status(&self) -> Option<&Value> {
        self.pointer("/status").filter(|s| !s.is_null())
    }

    /// The object's `kind`, if set
    pub fn kind(&self) -> Option<&str> {
        self.str_at("/kind")
    }
}

impl fmt::Display for Snapshot {
    // Only status is rendered; a Secret's data must never end up in a test log.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status() {
            Some(status) => write!(f, "status: {}", status),
            None => write!(
                f,
                "{} {} (no status)",
                self.kind().unwrap_or("object"),
                self.str_at("/metadata/name").unwrap_or("<unnamed>")
            ),
        }
    }
}

/// Classified retrieval failure
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The object does not currently exist
    #[error("{namespace}/{name} not found")]
    NotFound {
        /// Namespace that was queried
        namespace: String,
        /// Name that was queried
        name: String,
    },

    /// Any other retrieval failure (permissions, connectivity, decoding)
    #[error("failed to get {namespace}/{name}: {message}")]
    Other {
        /// Namespace that was queried
        namespace: String,
        /// Name that was queried
        name: String,
        /// Underlying error
        message: String,
    },
}

impl FetchError {
    /// Not-found error for the given key
    pub fn not_found(key: &ObjectKey) -> Self {
        Self::NotFound {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
        }
    }

    /// Non-recoverable retrieval error for the given key
    pub fn other(key: &ObjectKey, msg: impl Into<String>) -> Self {
        Self::Other {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
            message: msg.into(),
        }
    }

    /// Whether the object simply does not exist yet
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Classify a kube-rs error: HTTP 404 is NotFound, everything else Other
    pub fn from_kube(key: &ObjectKey, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(e) if e.code == 404 => Self::not_found(key),
            e => Self::other(key, e.to_string()),
        }
    }
}

/// Source of resource snapshots for the poll loop
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Get the current state of the object identified by `key`
    async fn get(&self, key: &ObjectKey) -> Result<Snapshot, FetchError>;
}

/// Resource kinds the entitlement scenarios poll
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// core/v1 Secret
    Secret,
    /// core/v1 Pod
    Pod,
    /// Shipwright BuildRun
    BuildRun,
    /// OpenShift BuildConfig
    BuildConfig,
}

impl ResourceKind {
    /// Kubernetes kind name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Secret => "Secret",
            Self::Pod => "Pod",
            Self::BuildRun => "BuildRun",
            Self::BuildConfig => "BuildConfig",
        }
    }

    /// ApiResource used to query this kind dynamically
    pub fn api_resource(&self) -> ApiResource {
        match self {
            Self::Secret => ApiResource::erase::<Secret>(&()),
            Self::Pod => ApiResource::erase::<Pod>(&()),
            Self::BuildRun => build_api_resource(BUILD_RUN_API_VERSION, "BuildRun"),
            Self::BuildConfig => build_api_resource(BUILD_CONFIG_API_VERSION, "BuildConfig"),
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// [`ResourceFetcher`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeFetcher {
    client: Client,
    api_resource: ApiResource,
}

impl KubeFetcher {
    /// Fetcher for one resource kind using an explicit client
    pub fn new(client: Client, kind: ResourceKind) -> Self {
        Self::with_api_resource(client, kind.api_resource())
    }

    /// Fetcher for an arbitrary resource type
    pub fn with_api_resource(client: Client, api_resource: ApiResource) -> Self {
        Self {
            client,
            api_resource,
        }
    }
}

#[async_trait]
impl ResourceFetcher for KubeFetcher {
    async fn get(&self, key: &ObjectKey) -> Result<Snapshot, FetchError> {
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &key.namespace, &self.api_resource);

        let obj = api
            .get(&key.name)
            .await
            .map_err(|e| FetchError::from_kube(key, e))?;

        trace!(kind = %self.api_resource.kind, key = %key, "fetched object");
        serde_json::to_value(&obj)
            .map(Snapshot::new)
            .map_err(|e| FetchError::other(key, format!("failed to encode object: {}", e)))
    }
}
