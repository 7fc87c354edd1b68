/**
 * Optimistic read-modify-write updates of single objects.
 */
use super::cache::config::UpdateConfig;
use super::cache::errors::missing_version_error;
use super::collection::ResourceCollection;
use super::object::{ManagedObject, ObjectKey};
use crate::error::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retries read-modify-write cycles until the write is accepted.
///
/// Stateless apart from its configuration; safe to share between tasks updating different
/// objects.
#[derive(Debug, Clone, Default)]
pub struct OptimisticUpdater {
    config: UpdateConfig,
    cancel: CancellationToken,
}

impl OptimisticUpdater {
    #[must_use]
    pub fn new(config: UpdateConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Makes retry delays observe `cancel`
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Reads the object, applies `modify`, and writes the result guarded by the version read.
    ///
    /// A version conflict waits the configured delay and starts over with a fresh read, with
    /// no bound on the number of attempts. Any other error is returned immediately.
    ///
    /// # Errors
    ///
    /// Returns the first non-conflict collaborator error, `MissingVersion` if the object read
    /// has no version, or `Cancelled` if cancellation interrupts a retry delay
    pub async fn update<C, F>(&self, collection: &C, key: &ObjectKey, mut modify: F) -> Result<C::Object>
    where
        C: ResourceCollection,
        F: FnMut(C::Object) -> C::Object + Send,
    {
        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            let current = collection.get(key).await?;
            let version = current
                .version()
                .ok_or_else(|| missing_version_error(key))?;
            let desired = modify(current);

            match collection.replace(&desired, &version).await {
                Ok(updated) => {
                    debug!("📝 Updated {} on attempt {}", key, attempt);
                    return Ok(updated);
                }
                Err(e) if e.is_conflict() => {
                    warn!(
                        "Version conflict updating {} at {} (attempt {}), retrying in {:?}",
                        key, version, attempt, self.config.conflict_retry_delay
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(Error::Cancelled),
                        () = tokio::time::sleep(self.config.conflict_retry_delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
