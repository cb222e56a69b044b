//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction and dynamic `ApiResource` building for kinds that have no
//! typed k8s-openapi binding (Shipwright, OpenShift build and image APIs).

use std::path::Path;
use std::time::Duration;

use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use kube::{Client, Config};
use tracing::debug;

use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            debug!(path = %path.display(), "loading kubeconfig");
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::config(format!(
                    "failed to read kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::config(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::config(format!("failed to infer kube config: {}", e)))?,
    };

    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Ok(Client::try_from(config)?)
}

/// Build an ApiResource from a known apiVersion and kind.
///
/// The version is used exactly as given; no discovery round-trip is made.
///
/// # Example
/// ```
/// use builds_e2e::kube_utils::build_api_resource;
///
/// let ar = build_api_resource("shipwright.io/v1beta1", "BuildRun");
/// assert_eq!(ar.group, "shipwright.io");
/// assert_eq!(ar.plural, "buildruns");
/// ```
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    let gvk = GroupVersionKind::gvk(&group, &version, kind);
    ApiResource::from_gvk_with_plural(&gvk, &pluralize_kind(kind))
}

/// Parse apiVersion into (group, version)
///
/// # Examples
/// ```
/// use builds_e2e::kube_utils::parse_api_version;
///
/// let (group, version) = parse_api_version("build.openshift.io/v1");
/// assert_eq!(group, "build.openshift.io");
/// assert_eq!(version, "v1");
///
/// let (group, version) = parse_api_version("v1");
/// assert_eq!(group, "");
/// assert_eq!(version, "v1");
/// ```
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Kinds whose plural is not derivable by the simple rules below
const KIND_PLURALS: &[(&str, &str)] = &[
    ("endpoints", "endpoints"),
    ("securitycontextconstraints", "securitycontextconstraints"),
];

/// Lowercase plural used in API paths for `kind`.
///
/// Irregular kinds come from a table; everything else follows English
/// suffix rules (`-es` after sibilants, `-ies` after a consonant plus `y`).
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = KIND_PLURALS.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }

    let sibilant =
        lower.ends_with(['s', 'x', 'z']) || lower.ends_with("ch") || lower.ends_with("sh");
    match lower.strip_suffix('y') {
        _ if sibilant => format!("{lower}es"),
        Some(stem) if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) => format!("{stem}ies"),
        _ => format!("{lower}s"),
    }
}
