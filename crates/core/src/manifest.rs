//! Parsing of instance manifests.
//!
//! YAML manifests may hold several documents separated by `---`; JSON
//! manifests hold either one object or an array of objects.

use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::instance::{Instance, KIND};

/// Encoding of a manifest file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Yaml,
    Json,
}

impl ManifestFormat {
    /// Pick the format from a file extension, defaulting to YAML.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        if path.extension().is_some_and(|e| e == "json") {
            Self::Json
        } else {
            Self::Yaml
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonManifest {
    Many(Vec<Instance>),
    One(Box<Instance>),
}

/// Parse every instance declared in `content`.
///
/// # Errors
///
/// Returns [`Error::ManifestParseFailed`] when a document cannot be decoded
/// or declares a kind other than `Instance`.
pub fn parse_manifests(content: &str, format: ManifestFormat) -> Result<Vec<Instance>> {
    let instances = match format {
        ManifestFormat::Json => {
            match serde_json::from_str::<JsonManifest>(content)
                .map_err(|e| Error::manifest_parse_failed(e.to_string()))?
            {
                JsonManifest::Many(instances) => instances,
                JsonManifest::One(instance) => vec![*instance],
            }
        }
        ManifestFormat::Yaml => parse_yaml_documents(content)?,
    };

    if let Some(other) = instances.iter().find(|i| i.type_meta.kind != KIND) {
        return Err(Error::manifest_parse_failed(format!(
            "unsupported kind '{}' for '{}'",
            other.type_meta.kind,
            other.key()
        )));
    }

    debug!(count = instances.len(), "Parsed instance manifests");
    Ok(instances)
}

fn parse_yaml_documents(content: &str) -> Result<Vec<Instance>> {
    let mut instances = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_yaml::Value::deserialize(document)
            .map_err(|e| Error::manifest_parse_failed(e.to_string()))?;
        if value.is_null() {
            continue;
        }
        let instance = serde_yaml::from_value::<Instance>(value)
            .map_err(|e| Error::manifest_parse_failed(e.to_string()))?;
        instances.push(instance);
    }
    Ok(instances)
}
