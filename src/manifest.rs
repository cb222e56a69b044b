//! Applying and deleting fixture manifests
//!
//! Fixture files are multi-document YAML. Every document is converted to JSON
//! with yaml-rust2 and sent through a dynamic `Api<DynamicObject>` built from
//! its apiVersion and kind, so CRDs (Shipwright, OpenShift) need no typed
//! bindings.

use std::path::Path;

use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::discovery::ApiResource;
use kube::Client;
use serde_json::{Map, Number, Value};
use tracing::{debug, info};
use yaml_rust2::{Yaml, YamlLoader};

use crate::kube_utils::build_api_resource;
use crate::Error;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "builds-e2e";

/// Why a fixture document could not be turned into a [`Manifest`]
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ManifestError {
    /// The text is not valid YAML
    #[error("invalid YAML: {0}")]
    InvalidYaml(String),

    /// The YAML uses a construct with no JSON equivalent
    #[error("unsupported YAML: {0}")]
    Unsupported(String),

    /// A required identity field is absent
    #[error("{kind} manifest missing {field}")]
    MissingField {
        /// Kind of the document, or `object` when the kind itself is missing
        kind: String,
        /// Dotted path of the missing field
        field: &'static str,
    },
}

impl ManifestError {
    fn missing(kind: Option<&str>, field: &'static str) -> Self {
        Self::MissingField {
            kind: kind.unwrap_or("object").to_string(),
            field,
        }
    }
}

/// One parsed manifest document
#[derive(Debug, Clone)]
pub struct Manifest {
    /// The document as JSON
    pub value: Value,
    /// Resource name
    pub name: String,
    /// Namespace, `None` for cluster-scoped objects
    pub namespace: Option<String>,
    /// API resource derived from apiVersion and kind
    pub api_resource: ApiResource,
}

impl Manifest {
    /// Build from a JSON document, checking the required identity fields
    pub fn from_value(value: Value) -> Result<Self, ManifestError> {
        let kind = value.get("kind").and_then(Value::as_str);
        let api_version = value
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| ManifestError::missing(kind, "apiVersion"))?;
        let kind = kind.ok_or_else(|| ManifestError::missing(None, "kind"))?;
        let name = value
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| ManifestError::missing(Some(kind), "metadata.name"))?
            .to_string();
        let namespace = value
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .map(str::to_string);
        let api_resource = build_api_resource(api_version, kind);

        Ok(Self {
            value,
            name,
            namespace,
            api_resource,
        })
    }

    fn api(&self, client: &Client) -> Api<DynamicObject> {
        match &self.namespace {
            Some(ns) => Api::namespaced_with(client.clone(), ns, &self.api_resource),
            None => Api::all_with(client.clone(), &self.api_resource),
        }
    }

    fn describe(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{} {}/{}", self.api_resource.kind, ns, self.name),
            None => format!("{} {}", self.api_resource.kind, self.name),
        }
    }
}

/// Parse multi-document YAML into manifests, skipping empty documents
pub fn parse_manifests(input: &str) -> Result<Vec<Manifest>, ManifestError> {
    let docs = YamlLoader::load_from_str(input)
        .map_err(|e| ManifestError::InvalidYaml(e.to_string()))?;

    let mut manifests = Vec::with_capacity(docs.len());
    for doc in docs {
        match to_json(doc)? {
            Value::Null => continue,
            value => manifests.push(Manifest::from_value(value)?),
        }
    }
    Ok(manifests)
}

/// Read and parse a manifest file
pub async fn read_manifests(path: &Path) -> Result<Vec<Manifest>, Error> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::manifest(path.display().to_string(), format!("read failed: {}", e)))?;
    parse_manifests(&content)
        .map_err(|e| Error::manifest(path.display().to_string(), e.to_string()))
}

/// Apply every document in a manifest file with server-side apply
pub async fn apply_file(client: &Client, path: &Path) -> Result<(), Error> {
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for manifest in read_manifests(path).await? {
        manifest
            .api(client)
            .patch(&manifest.name, &params, &Patch::Apply(&manifest.value))
            .await
            .map_err(|e| {
                Error::manifest(
                    path.display().to_string(),
                    format!("failed to apply {}: {}", manifest.describe(), e),
                )
            })?;
        debug!(object = %manifest.describe(), "applied");
    }

    info!(path = %path.display(), "applied manifest file");
    Ok(())
}

/// Delete every document in a manifest file. Objects already gone are skipped.
pub async fn delete_file(client: &Client, path: &Path) -> Result<(), Error> {
    for manifest in read_manifests(path).await? {
        match manifest
            .api(client)
            .delete(&manifest.name, &DeleteParams::background())
            .await
        {
            Ok(_) => debug!(object = %manifest.describe(), "deleted"),
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(object = %manifest.describe(), "already deleted");
            }
            Err(e) => {
                return Err(Error::manifest(
                    path.display().to_string(),
                    format!("failed to delete {}: {}", manifest.describe(), e),
                ))
            }
        }
    }

    info!(path = %path.display(), "deleted manifest file");
    Ok(())
}

/// Convert one YAML node into JSON. Mapping keys must be scalars.
fn to_json(yaml: Yaml) -> Result<Value, ManifestError> {
    let value = match yaml {
        Yaml::Null => Value::Null,
        Yaml::Boolean(b) => b.into(),
        Yaml::Integer(i) => i.into(),
        Yaml::Real(raw) => real_to_json(&raw)?,
        Yaml::String(s) => s.into(),
        Yaml::Array(items) => Value::Array(
            items
                .into_iter()
                .map(to_json)
                .collect::<Result<Vec<_>, ManifestError>>()?,
        ),
        Yaml::Hash(entries) => {
            let mut object = Map::with_capacity(entries.len());
            for (key, value) in entries {
                object.insert(scalar_key(key)?, to_json(value)?);
            }
            Value::Object(object)
        }
        Yaml::Alias(_) => return Err(ManifestError::Unsupported("aliases".to_string())),
        Yaml::BadValue => return Err(ManifestError::Unsupported("bad value".to_string())),
    };
    Ok(value)
}

fn real_to_json(raw: &str) -> Result<Value, ManifestError> {
    let f: f64 = raw
        .parse()
        .map_err(|_| ManifestError::Unsupported(format!("float {:?}", raw)))?;
    // NaN and infinities have no JSON form
    Ok(Number::from_f64(f).map_or(Value::Null, Value::Number))
}

fn scalar_key(key: Yaml) -> Result<String, ManifestError> {
    match key {
        Yaml::String(s) | Yaml::Real(s) => Ok(s),
        Yaml::Integer(i) => Ok(i.to_string()),
        Yaml::Boolean(b) => Ok(b.to_string()),
        other => Err(ManifestError::Unsupported(format!("mapping key {:?}", other))),
    }
}
