use crate::k8s::object::{ManagedObject, Version};

/// An object held in an [`ObjectCache`](super::ObjectCache) together with the version it was stored at
#[derive(Debug, Clone)]
pub struct CachedObject<K> {
    pub object: K,
    pub version: Option<Version>,
}

impl<K: ManagedObject> CachedObject<K> {
    pub fn new(object: K) -> Self {
        Self {
            version: object.version(),
            object,
        }
    }

    /// Whether storing `candidate` would change this entry
    pub fn differs_from(&self, candidate: &K) -> bool {
        self.version != candidate.version() || !self.object.payload_eq(candidate)
    }

    pub fn update(&mut self, object: K) {
        self.version = object.version();
        self.object = object;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::k8s::object::ObjectKey;

    #[derive(Debug, Clone)]
    struct Item(Option<&'static str>, &'static str);

    impl ManagedObject for Item {
        fn key(&self) -> ObjectKey {
            ObjectKey::cluster("item")
        }
        fn version(&self) -> Option<Version> {
            self.0.map(Version::from)
        }
        fn payload_eq(&self, other: &Self) -> bool {
            self.1 == other.1
        }
    }

    #[test]
    fn test_cached_object_update() {
        let mut entry = CachedObject::new(Item(Some("1"), "a"));
        assert!(!entry.differs_from(&Item(Some("1"), "a")));
        assert!(entry.differs_from(&Item(Some("2"), "a")));

        entry.update(Item(Some("2"), "a"));
        assert_eq!(entry.version, Some(Version::from("2")));
    }

    #[test]
    fn test_unversioned_payload_change_differs() {
        let entry = CachedObject::new(Item(None, "a"));
        assert!(!entry.differs_from(&Item(None, "a")));
        assert!(entry.differs_from(&Item(None, "b")));
    }
}
