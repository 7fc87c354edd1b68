use super::errors::{missing_version_error, no_such_resource_error};
use super::watch_session::WatchSessionHandle;
use crate::error::Result;
use crate::k8s::collection::ResourceCollection;
use crate::k8s::object::{ManagedObject, ObjectKey};
use std::sync::Arc;
use tracing::info;

/// Queries against the mirror kept by a running watch session
pub struct ReadonlyStore<K> {
    session: WatchSessionHandle<K>,
}

impl<K: ManagedObject> ReadonlyStore<K> {
    #[must_use]
    pub fn new(session: WatchSessionHandle<K>) -> Self {
        Self { session }
    }

    #[must_use]
    pub const fn session(&self) -> &WatchSessionHandle<K> {
        &self.session
    }

    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn all(&self) -> Result<Vec<K>> {
        self.session.snapshot()
    }

    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn find(&self, query: impl Fn(&K) -> bool) -> Result<Vec<K>> {
        Ok(self.all()?.into_iter().filter(|o| query(o)).collect())
    }

    /// First object whose name matches, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no object has the name
    pub fn find_by_name(&self, name: &str) -> Result<K> {
        self.all()?
            .into_iter()
            .find(|o| o.key().name.eq_ignore_ascii_case(name))
            .ok_or_else(|| no_such_resource_error(name))
    }

    /// All objects in `namespace`, ignoring case; empty if none.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn find_by_namespace(&self, namespace: &str) -> Result<Vec<K>> {
        self.find(|o| o.key().namespace_or_empty().eq_ignore_ascii_case(namespace))
    }

    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn count(&self) -> Result<usize> {
        self.session.cache().len()
    }
}

/// A [`ReadonlyStore`] that also writes through to the remote collection.
///
/// Writes are not applied to the mirror directly; they show up once the watch delivers them.
pub struct ResourceStore<C: ResourceCollection> {
    reader: ReadonlyStore<C::Object>,
    collection: Arc<C>,
}

impl<C: ResourceCollection> ResourceStore<C> {
    #[must_use]
    pub fn new(session: WatchSessionHandle<C::Object>, collection: Arc<C>) -> Self {
        Self {
            reader: ReadonlyStore::new(session),
            collection,
        }
    }

    #[must_use]
    pub const fn reader(&self) -> &ReadonlyStore<C::Object> {
        &self.reader
    }

    /// # Errors
    ///
    /// Returns the collaborator error if the create fails
    pub async fn add(&self, object: &C::Object) -> Result<C::Object> {
        info!("➕ Adding {}", object.key());
        self.collection.create(object).await
    }

    /// Writes `object` guarded by its own version.
    ///
    /// # Errors
    ///
    /// Returns `MissingVersion` if the object carries no version, or the collaborator error
    pub async fn update(&self, object: &C::Object) -> Result<C::Object> {
        let version = object
            .version()
            .ok_or_else(|| missing_version_error(&object.key()))?;
        info!("📝 Updating {} at version {}", object.key(), version);
        self.collection.replace(object, &version).await
    }

    /// # Errors
    ///
    /// Returns the collaborator error if the delete fails
    pub async fn delete(&self, key: &ObjectKey) -> Result<Option<C::Object>> {
        info!("🗑️  Deleting {}", key);
        self.collection.delete(key).await
    }
}
