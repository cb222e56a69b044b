//! Environment-driven configuration for the e2e suite

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::poll::PollSpec;
use crate::Error;

/// Namespace the entitlement secret is synced into by the cluster
pub const DEFAULT_ENTITLEMENT_NAMESPACE: &str = "openshift-config-managed";
/// Namespace build fixtures are created in
pub const DEFAULT_BUILDS_NAMESPACE: &str = "builds-test";

const ENV_KUBECONFIG: &str = "KUBECONFIG";
const ENV_PROJECT_DIR: &str = "BUILDS_E2E_PROJECT_DIR";
const ENV_POLL_INTERVAL: &str = "BUILDS_E2E_POLL_INTERVAL_SECS";
const ENV_POLL_TIMEOUT: &str = "BUILDS_E2E_POLL_TIMEOUT_SECS";
const ENV_ENTITLEMENT_NAMESPACE: &str = "BUILDS_E2E_ENTITLEMENT_NAMESPACE";
const ENV_BUILDS_NAMESPACE: &str = "BUILDS_E2E_BUILDS_NAMESPACE";

/// Configuration for e2e scenarios
#[derive(Clone, Debug, PartialEq)]
pub struct E2eConfig {
    /// Explicit kubeconfig; `None` infers from the environment
    pub kubeconfig: Option<PathBuf>,
    /// Project root containing `tests/data`
    pub project_dir: PathBuf,
    /// Namespace holding the entitlement secret and test pod
    pub entitlement_namespace: String,
    /// Namespace for build fixtures
    pub builds_namespace: String,
    /// Override for every poll interval
    pub poll_interval: Option<Duration>,
    /// Override for every poll timeout
    pub poll_timeout: Option<Duration>,
}

impl Default for E2eConfig {
    fn default() -> Self {
        Self {
            kubeconfig: None,
            project_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")),
            entitlement_namespace: DEFAULT_ENTITLEMENT_NAMESPACE.to_string(),
            builds_namespace: DEFAULT_BUILDS_NAMESPACE.to_string(),
            poll_interval: None,
            poll_timeout: None,
        }
    }
}

impl E2eConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Ok(Self {
            kubeconfig: non_empty(ENV_KUBECONFIG).map(PathBuf::from),
            project_dir: non_empty(ENV_PROJECT_DIR)
                .map(PathBuf::from)
                .unwrap_or(defaults.project_dir),
            entitlement_namespace: non_empty(ENV_ENTITLEMENT_NAMESPACE)
                .unwrap_or(defaults.entitlement_namespace),
            builds_namespace: non_empty(ENV_BUILDS_NAMESPACE).unwrap_or(defaults.builds_namespace),
            poll_interval: non_empty(ENV_POLL_INTERVAL)
                .map(|v| parse_secs(ENV_POLL_INTERVAL, &v))
                .transpose()?,
            poll_timeout: non_empty(ENV_POLL_TIMEOUT)
                .map(|v| parse_secs(ENV_POLL_TIMEOUT, &v))
                .transpose()?,
        })
    }

    /// Path of a fixture file under `tests/data`
    pub fn data_path(&self, file: impl AsRef<Path>) -> PathBuf {
        self.project_dir.join("tests").join("data").join(file)
    }

    /// Apply the configured overrides on top of a base spec
    pub fn poll_spec(&self, base: PollSpec) -> Result<PollSpec, Error> {
        let spec = match self.poll_interval {
            Some(interval) => base.with_interval(interval)?,
            None => base,
        };
        Ok(match self.poll_timeout {
            Some(timeout) => spec.with_timeout(timeout),
            None => spec,
        })
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration, Error> {
    let secs: u64 = value.trim().parse().map_err(|_| {
        Error::config(format!(
            "{} must be a whole number of seconds, got {:?}",
            key, value
        ))
    })?;
    if secs == 0 {
        return Err(Error::config(format!("{} must be greater than zero", key)));
    }
    Ok(Duration::from_secs(secs))
}
