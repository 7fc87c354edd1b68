/**
 * Helper functions for creating common cache error types
 */
use crate::error::Error;
use crate::k8s::object::ObjectKey;

/// Create a `LockPoisoned` error for mutex/rwlock poisoning (indicates prior panic)
#[must_use]
pub fn lock_poisoned_error(message: &str) -> Error {
    Error::LockPoisoned(message.to_string())
}

/// Create a `NotFound` error for a lookup by name in a mirror
#[must_use]
pub fn no_such_resource_error(name: &str) -> Error {
    Error::NotFound(format!("No such resource '{name}'"))
}

/// Create a `MissingVersion` error for an object that cannot carry a write precondition
#[must_use]
pub fn missing_version_error(key: &ObjectKey) -> Error {
    Error::MissingVersion(key.clone())
}
