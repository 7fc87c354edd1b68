use kube::ResourceExt;
use std::collections::HashSet;

/// Label and annotation lookups for any Kubernetes resource
pub trait MetadataExt: ResourceExt {
    /// Gets a label from the resource or an empty string
    fn label_or_empty(&self, key: &str) -> String {
        self.labels().get(key).cloned().unwrap_or_default()
    }

    fn has_label(&self, key: &str, expected: &str) -> bool {
        self.labels().get(key).is_some_and(|v| v == expected)
    }

    /// True if the label is present with a value from `expected`
    fn has_label_in(&self, key: &str, expected: &HashSet<String>) -> bool {
        self.labels().get(key).is_some_and(|v| expected.contains(v))
    }

    /// Gets an annotation from the resource or an empty string
    fn annotation_or_empty(&self, key: &str) -> String {
        self.annotations().get(key).cloned().unwrap_or_default()
    }

    fn has_annotation(&self, key: &str, expected: &str) -> bool {
        self.annotations().get(key).is_some_and(|v| v == expected)
    }

    fn has_annotation_in(&self, key: &str, expected: &HashSet<String>) -> bool {
        self.annotations()
            .get(key)
            .is_some_and(|v| expected.contains(v))
    }
}

impl<K: ResourceExt> MetadataExt for K {}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn config_map() -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("settings".to_string()),
                labels: Some(BTreeMap::from([("tier".to_string(), "web".to_string())])),
                annotations: Some(BTreeMap::from([(
                    "owner".to_string(),
                    "platform".to_string(),
                )])),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }
    }

    #[test]
    fn test_label_lookups() {
        let cm = config_map();
        assert_eq!(cm.label_or_empty("tier"), "web");
        assert_eq!(cm.label_or_empty("missing"), "");
        assert!(cm.has_label("tier", "web"));
        assert!(!cm.has_label("tier", "db"));

        let set = HashSet::from(["db".to_string(), "web".to_string()]);
        assert!(cm.has_label_in("tier", &set));
    }

    #[test]
    fn test_annotation_lookups() {
        let cm = config_map();
        assert_eq!(cm.annotation_or_empty("owner"), "platform");
        assert!(cm.has_annotation("owner", "platform"));
        assert!(!cm.has_annotation_in("owner", &HashSet::new()));
    }
}
