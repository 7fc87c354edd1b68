/**
 * Identity, version and payload of the objects kept in a mirror.
 */
use k8s_openapi::serde_json::Value;
use kube::api::DynamicObject;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Stable identity of a managed object (namespace + name).
///
/// A missing namespace and an empty one denote the same identity.
#[derive(Debug, Clone)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn namespaced(namespace: &str, name: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn cluster(name: &str) -> Self {
        Self {
            namespace: None,
            name: name.to_string(),
        }
    }

    /// Namespace with `None` and `""` treated alike
    #[must_use]
    pub fn namespace_or_empty(&self) -> &str {
        self.namespace.as_deref().unwrap_or_default()
    }
}

impl PartialEq for ObjectKey {
    fn eq(&self, other: &Self) -> bool {
        self.namespace_or_empty() == other.namespace_or_empty() && self.name == other.name
    }
}

impl Eq for ObjectKey {}

impl Hash for ObjectKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.namespace_or_empty().hash(state);
        self.name.hash(state);
    }
}

impl PartialOrd for ObjectKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ObjectKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.namespace_or_empty()
            .cmp(other.namespace_or_empty())
            .then_with(|| self.name.cmp(&other.name))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace.as_deref() {
            Some(ns) if !ns.is_empty() => write!(f, "{ns}/{}", self.name),
            _ => write!(f, "{}", self.name),
        }
    }
}

/// Opaque, collaborator-issued revision marker
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version(String);

impl Version {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compares two tokens as unsigned integers; `None` when either is not numeric.
    #[must_use]
    pub fn numeric_cmp(&self, other: &Self) -> Option<Ordering> {
        let a = self.0.parse::<u64>().ok()?;
        let b = other.0.parse::<u64>().ok()?;
        Some(a.cmp(&b))
    }
}

impl From<&str> for Version {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for Version {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An object that can be mirrored and reconciled.
///
/// Equality of identity (`key`) is distinct from equality of content (`payload_eq`):
/// reconciliation only updates objects whose payload differs from the desired one.
pub trait ManagedObject: Clone + fmt::Debug + Send + Sync + 'static {
    fn key(&self) -> ObjectKey;

    fn version(&self) -> Option<Version>;

    fn payload_eq(&self, other: &Self) -> bool;

    /// Checks that the identity of the object can be determined.
    ///
    /// # Errors
    ///
    /// Returns a description of the defect when the object cannot be keyed
    fn validate(&self) -> Result<(), String> {
        if self.key().name.is_empty() {
            Err("object has no name".to_string())
        } else {
            Ok(())
        }
    }
}

impl ManagedObject for DynamicObject {
    fn key(&self) -> ObjectKey {
        ObjectKey {
            namespace: self.metadata.namespace.clone(),
            name: self.metadata.name.clone().unwrap_or_default(),
        }
    }

    fn version(&self) -> Option<Version> {
        self.metadata.resource_version.clone().map(Version::from)
    }

    fn payload_eq(&self, other: &Self) -> bool {
        payload(&self.data) == payload(&other.data)
    }
}

/// The body of an object without its server-maintained `status`
fn payload(data: &Value) -> Value {
    match data {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| k.as_str() != "status")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::serde_json::json;
    use kube::api::{ApiResource, GroupVersionKind};

    fn widget(name: &str, data: Value) -> DynamicObject {
        let ar = ApiResource::from_gvk_with_plural(
            &GroupVersionKind::gvk("example.com", "v1", "Widget"),
            "widgets",
        );
        DynamicObject::new(name, &ar).within("default").data(data)
    }

    #[test]
    fn test_numeric_version_ordering() {
        assert_eq!(
            Version::from("9").numeric_cmp(&Version::from("10")),
            Some(Ordering::Less)
        );
        assert_eq!(
            Version::from("12").numeric_cmp(&Version::from("12")),
            Some(Ordering::Equal)
        );
        assert_eq!(Version::from("abc").numeric_cmp(&Version::from("10")), None);
    }

    #[test]
    fn test_key_display() {
        assert_eq!(ObjectKey::namespaced("default", "a").to_string(), "default/a");
        assert_eq!(ObjectKey::cluster("a").to_string(), "a");
    }

    #[test]
    fn test_missing_and_empty_namespace_are_one_identity() {
        use std::collections::HashSet;

        let empty = ObjectKey::namespaced("", "a");
        let missing = ObjectKey::cluster("a");
        assert_eq!(empty, missing);
        assert_eq!(empty.cmp(&missing), Ordering::Equal);

        let keys: HashSet<ObjectKey> = [empty, missing].into_iter().collect();
        assert_eq!(keys.len(), 1);
        assert_ne!(ObjectKey::namespaced("default", "a"), ObjectKey::cluster("a"));
    }

    #[test]
    fn test_dynamic_object_payload_ignores_status() {
        let a = widget("a", json!({"spec": {"size": 1}, "status": {"ready": true}}));
        let b = widget("a", json!({"spec": {"size": 1}}));
        let c = widget("a", json!({"spec": {"size": 2}}));

        assert!(a.payload_eq(&b));
        assert!(!a.payload_eq(&c));
        assert_eq!(a.key(), ObjectKey::namespaced("default", "a"));
    }

    #[test]
    fn test_nameless_object_fails_validation() {
        let mut obj = widget("a", json!({}));
        obj.metadata.name = None;
        assert!(obj.validate().is_err());
    }
}
