/**
 * The resource-access collaborator: list, watch and write a remote collection.
 */
use super::object::{ManagedObject, ObjectKey, Version};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::cmp::Ordering;
use std::fmt;

/// Restricts list/watch/reconcile operations to part of a collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub namespace: Option<String>,
    pub label_selector: Option<String>,
}

impl Scope {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn namespace(namespace: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
            label_selector: None,
        }
    }

    #[must_use]
    pub fn with_labels(mut self, selector: &str) -> Self {
        self.label_selector = Some(selector.to_string());
        self
    }

    /// Whether `key` falls inside the namespace part of this scope
    #[must_use]
    pub fn contains_key(&self, key: &ObjectKey) -> bool {
        match self.namespace.as_deref() {
            None | Some("") => true,
            Some(ns) => key.namespace_or_empty() == ns,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "namespace={} selector={}",
            self.namespace.as_deref().unwrap_or("*"),
            self.label_selector.as_deref().unwrap_or("*")
        )
    }
}

/// An item that could not be turned into a usable object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedItem {
    pub reason: String,
    /// Whatever identity could still be read from the item
    pub name: Option<String>,
}

/// Result of one `list` call; replaces a mirror wholesale
#[derive(Debug, Clone)]
pub struct Snapshot<K> {
    pub items: Vec<K>,
    pub version: Option<Version>,
    pub rejected: Vec<RejectedItem>,
}

impl<K: ManagedObject> Snapshot<K> {
    /// Splits raw items into valid objects and rejected ones
    #[must_use]
    pub fn from_items(raw: Vec<K>, version: Option<Version>) -> Self {
        let mut items = Vec::with_capacity(raw.len());
        let mut rejected = Vec::new();
        for item in raw {
            match item.validate() {
                Ok(()) => items.push(item),
                Err(reason) => rejected.push(RejectedItem {
                    reason,
                    name: Some(item.key().name).filter(|n| !n.is_empty()),
                }),
            }
        }
        Self {
            items,
            version,
            rejected,
        }
    }
}

/// One incremental change delivered by a watch subscription
#[derive(Debug, Clone)]
pub enum ObjectEvent<K> {
    Added(K),
    Modified(K),
    Deleted(K),
    /// Progress marker carrying only a version
    Bookmark(Version),
    /// A single malformed item; the rest of the stream is unaffected
    Rejected(RejectedItem),
}

impl<K: ManagedObject> ObjectEvent<K> {
    /// Wraps a typed event, turning invalid objects into `Rejected`
    #[must_use]
    pub fn checked(self) -> Self {
        let defect = match &self {
            Self::Added(o) | Self::Modified(o) | Self::Deleted(o) => {
                o.validate().err().map(|reason| RejectedItem {
                    reason,
                    name: Some(o.key().name).filter(|n| !n.is_empty()),
                })
            }
            Self::Bookmark(_) | Self::Rejected(_) => None,
        };
        defect.map_or(self, Self::Rejected)
    }
}

/// A watch subscription; ends on normal completion or with an error
pub type EventStream<K> = BoxStream<'static, Result<ObjectEvent<K>>>;

/// Access to one remote collection of versioned objects
#[async_trait]
pub trait ResourceCollection: Send + Sync + 'static {
    type Object: ManagedObject;

    /// Human-readable name for logs
    fn describe(&self) -> String;

    async fn list(&self, scope: &Scope) -> Result<Snapshot<Self::Object>>;

    async fn watch(
        &self,
        scope: &Scope,
        from_version: Option<&Version>,
    ) -> Result<EventStream<Self::Object>>;

    async fn get(&self, key: &ObjectKey) -> Result<Self::Object>;

    async fn create(&self, object: &Self::Object) -> Result<Self::Object>;

    /// Writes `object` only if the stored version still equals `precondition`
    async fn replace(&self, object: &Self::Object, precondition: &Version) -> Result<Self::Object>;

    /// Returns the last known state of the object when the server reports it
    async fn delete(&self, key: &ObjectKey) -> Result<Option<Self::Object>>;

    /// Recency ordering of two version tokens, `None` when they cannot be compared
    fn compare_versions(&self, a: &Version, b: &Version) -> Option<Ordering> {
        a.numeric_cmp(b)
    }
}
