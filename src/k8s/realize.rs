/**
 * Drives a remote collection toward a desired set of objects.
 */
use super::cache::errors::missing_version_error;
use super::collection::{ResourceCollection, Scope};
use super::object::{ManagedObject, ObjectKey};
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// What `realize_state` changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RealizeReport {
    pub created: Vec<ObjectKey>,
    pub updated: Vec<ObjectKey>,
    pub deleted: Vec<ObjectKey>,
    pub unchanged: Vec<ObjectKey>,
}

impl RealizeReport {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Realizes `desired` by creating, updating and deleting objects within `scope`.
///
/// Creates and updates are issued one at a time in the order of `desired`, then every live
/// object in scope that is not desired is deleted. Listed objects outside the namespace of
/// `scope` are never deleted. The first failing request aborts the call;
/// requests already issued are not rolled back. Updates carry the live object's version as
/// precondition, so a concurrent writer makes the call fail rather than be overwritten.
///
/// Callers reconciling overlapping scopes concurrently must serialize externally.
///
/// # Errors
///
/// Returns `DuplicateIdentity` if `desired` names an object twice, otherwise the first
/// collaborator error encountered
pub async fn realize_state<C: ResourceCollection>(
    collection: &C,
    desired: &[C::Object],
    scope: &Scope,
) -> Result<RealizeReport> {
    let mut desired_keys = HashSet::with_capacity(desired.len());
    for object in desired {
        let key = object.key();
        if !desired_keys.insert(key.clone()) {
            return Err(Error::DuplicateIdentity(key));
        }
    }

    let live = collection.list(scope).await?;
    let existing: HashMap<ObjectKey, &C::Object> =
        live.items.iter().map(|o| (o.key(), o)).collect();
    let mut report = RealizeReport::default();

    info!(
        "🎯 Realizing {} desired objects in {} against {} live",
        desired.len(),
        collection.describe(),
        existing.len()
    );

    for object in desired {
        let key = object.key();
        match existing.get(&key) {
            None => {
                debug!("➕ Creating {}", key);
                collection.create(object).await?;
                report.created.push(key);
            }
            Some(current) if !current.payload_eq(object) => {
                let version = current
                    .version()
                    .ok_or_else(|| missing_version_error(&key))?;
                debug!("📝 Updating {} at version {}", key, version);
                collection.replace(object, &version).await?;
                report.updated.push(key);
            }
            Some(_) => report.unchanged.push(key),
        }
    }

    for current in &live.items {
        let key = current.key();
        if !scope.contains_key(&key) {
            warn!("⚠️  Listed {} outside of {}, leaving it alone", key, scope);
            continue;
        }
        if !desired_keys.contains(&key) {
            debug!("🗑️  Deleting {}", key);
            collection.delete(&key).await?;
            report.deleted.push(key);
        }
    }

    info!(
        "🎯 Realized {}: {} created, {} updated, {} deleted, {} unchanged",
        collection.describe(),
        report.created.len(),
        report.updated.len(),
        report.deleted.len(),
        report.unchanged.len()
    );
    Ok(report)
}
