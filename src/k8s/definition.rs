/**
 * Explicit registry of the collection types a process mirrors.
 */
use crate::error::{Error, Result};
use kube::api::{ApiResource, GroupVersionKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies one Kubernetes collection type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// API group, empty for the core group
    #[serde(default)]
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Plural name used in URLs (see `spec.names.plural`)
    pub plural: String,
    #[serde(default = "default_namespaced")]
    pub namespaced: bool,
}

const fn default_namespaced() -> bool {
    true
}

impl ResourceDefinition {
    #[must_use]
    pub fn new(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            plural: plural.to_string(),
            namespaced: true,
        }
    }

    #[must_use]
    pub fn cluster_scoped(mut self) -> Self {
        self.namespaced = false;
        self
    }

    /// `<group>/<version>`, or just `<version>` for the core group
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    #[must_use]
    pub fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk(&self.group, &self.version, &self.kind),
            &self.plural,
        )
    }
}

impl fmt::Display for ResourceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version(), self.plural)
    }
}

/// Definitions keyed by kind, supplied at construction instead of discovered at runtime
#[derive(Debug, Clone, Default)]
pub struct DefinitionRegistry {
    definitions: BTreeMap<String, ResourceDefinition>,
}

impl DefinitionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a JSON array of definitions.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or a kind appears twice
    pub fn from_json(json: &str) -> Result<Self> {
        let definitions: Vec<ResourceDefinition> = k8s_openapi::serde_json::from_str(json)?;
        let mut registry = Self::new();
        for definition in definitions {
            registry.register(definition)?;
        }
        Ok(registry)
    }

    /// # Errors
    ///
    /// Returns an error if a definition for the same kind is already registered
    pub fn register(&mut self, definition: ResourceDefinition) -> Result<()> {
        if self.definitions.contains_key(&definition.kind) {
            return Err(Error::Custom(format!(
                "definition for kind {} already registered",
                definition.kind
            )));
        }
        self.definitions.insert(definition.kind.clone(), definition);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, kind: &str) -> Option<&ResourceDefinition> {
        self.definitions.get(kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.definitions.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
