use super::cached_object::CachedObject;
use super::errors::lock_poisoned_error;
use crate::error::Result;
use crate::k8s::object::{ManagedObject, ObjectKey, Version};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, trace};

/// Thread-safe identity -> object map; the materialized view of a watched collection.
///
/// Every mutation and every `snapshot()` goes through the same lock, so readers never observe
/// a half-applied change.
#[derive(Debug)]
pub struct ObjectCache<K> {
    entries: RwLock<HashMap<ObjectKey, CachedObject<K>>>,
}

impl<K: ManagedObject> Default for ObjectCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ManagedObject> ObjectCache<K> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<ObjectKey, CachedObject<K>>>> {
        self.entries
            .read()
            .map_err(|_| lock_poisoned_error("object cache lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<ObjectKey, CachedObject<K>>>> {
        self.entries
            .write()
            .map_err(|_| lock_poisoned_error("object cache lock poisoned"))
    }

    /// Stores `object`; returns true if it was absent or its version differs.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn upsert(&self, object: K) -> Result<bool> {
        let mut entries = self.write()?;
        Ok(Self::upsert_locked(&mut entries, object))
    }

    fn upsert_locked(entries: &mut HashMap<ObjectKey, CachedObject<K>>, object: K) -> bool {
        let key = object.key();
        match entries.get_mut(&key) {
            Some(existing) if !existing.differs_from(&object) => {
                trace!("Unchanged {}", key);
                false
            }
            Some(existing) => {
                existing.update(object);
                debug!("Upserted {}", key);
                true
            }
            None => {
                entries.insert(key.clone(), CachedObject::new(object));
                debug!("Upserted {}", key);
                true
            }
        }
    }

    /// Removes the entry for `key`; returns true if one was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn remove(&self, key: &ObjectKey) -> Result<bool> {
        let removed = self.write()?.remove(key).is_some();
        if removed {
            debug!("Removed {}", key);
        } else {
            trace!("Already removed {}", key);
        }
        Ok(removed)
    }

    /// Drops every entry; returns true if the cache was not already empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn clear(&self) -> Result<bool> {
        let mut entries = self.write()?;
        let had_entries = !entries.is_empty();
        entries.clear();
        Ok(had_entries)
    }

    /// Replaces the whole content with `objects` in one critical section.
    ///
    /// Returns true if anything was added, changed or removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn replace_all(&self, objects: Vec<K>) -> Result<bool> {
        let mut entries = self.write()?;
        let mut changed = false;
        let mut expected = HashSet::with_capacity(objects.len());

        for object in objects {
            expected.insert(object.key());
            changed |= Self::upsert_locked(&mut entries, object);
        }

        let before = entries.len();
        entries.retain(|key, _| expected.contains(key));
        changed |= entries.len() != before;

        Ok(changed)
    }

    /// A consistent copy of all objects, ordered by identity.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn snapshot(&self) -> Result<Vec<K>> {
        let entries = self.read()?;
        let mut items: Vec<(&ObjectKey, &CachedObject<K>)> = entries.iter().collect();
        items.sort_by(|a, b| a.0.cmp(b.0));
        Ok(items.into_iter().map(|(_, e)| e.object.clone()).collect())
    }

    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn get(&self, key: &ObjectKey) -> Result<Option<K>> {
        Ok(self.read()?.get(key).map(|e| e.object.clone()))
    }

    /// The version currently stored for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn version_of(&self, key: &ObjectKey) -> Result<Option<Version>> {
        Ok(self.read()?.get(key).and_then(|e| e.version.clone()))
    }

    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: &'static str,
        version: &'static str,
    }

    impl ManagedObject for Item {
        fn key(&self) -> ObjectKey {
            ObjectKey::namespaced("default", self.name)
        }
        fn version(&self) -> Option<Version> {
            Some(Version::from(self.version))
        }
        fn payload_eq(&self, _other: &Self) -> bool {
            true
        }
    }

    const fn item(name: &'static str, version: &'static str) -> Item {
        Item { name, version }
    }

    #[test]
    fn test_upsert_reports_changes() {
        let cache = ObjectCache::new();
        assert!(cache.upsert(item("a", "1")).unwrap());
        assert!(!cache.upsert(item("a", "1")).unwrap());
        assert!(cache.upsert(item("a", "2")).unwrap());
        assert_eq!(cache.len().unwrap(), 1);
        assert_eq!(
            cache.version_of(&ObjectKey::namespaced("default", "a")).unwrap(),
            Some(Version::from("2"))
        );
    }

    #[test]
    fn test_remove_and_clear() {
        let cache = ObjectCache::new();
        cache.upsert(item("a", "1")).unwrap();
        cache.upsert(item("b", "1")).unwrap();

        let a = ObjectKey::namespaced("default", "a");
        assert!(cache.remove(&a).unwrap());
        assert!(!cache.remove(&a).unwrap());

        assert!(cache.clear().unwrap());
        assert!(!cache.clear().unwrap());
        assert!(cache.is_empty().unwrap());
    }

    #[test]
    fn test_replace_all_removes_missing_entries() {
        let cache = ObjectCache::new();
        cache.upsert(item("a", "1")).unwrap();
        cache.upsert(item("b", "1")).unwrap();

        assert!(cache.replace_all(vec![item("b", "1"), item("c", "3")]).unwrap());
        assert_eq!(cache.snapshot().unwrap(), vec![item("b", "1"), item("c", "3")]);

        assert!(!cache.replace_all(vec![item("b", "1"), item("c", "3")]).unwrap());
    }

    #[test]
    fn test_snapshot_is_ordered_by_identity() {
        let cache = ObjectCache::new();
        cache.upsert(item("z", "1")).unwrap();
        cache.upsert(item("m", "1")).unwrap();
        cache.upsert(item("a", "1")).unwrap();

        let names: Vec<_> = cache.snapshot().unwrap().iter().map(|i| i.name).collect();
        assert_eq!(names, vec!["a", "m", "z"]);
    }
}
