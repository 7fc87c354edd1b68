/**
 * Watch Session
 *
 * Drives the list+watch cycle for one collection, keeps an `ObjectCache` consistent with it
 * and publishes change/connection notifications. Survives stream failures by re-listing
 * after a fixed backoff, and invalidates the cache when the server reports that the
 * watched version expired.
 */
use super::config::WatchConfig;
use super::object_cache::ObjectCache;
use super::subscription::{SessionEvent, SubscriptionManager};
use crate::error::{Error, Result};
use crate::k8s::collection::{ObjectEvent, ResourceCollection, Scope, Snapshot};
use crate::k8s::object::{ManagedObject, ObjectKey, Version};
use futures::StreamExt;
use std::cmp::Ordering;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listing,
    Watching,
    /// The watch stream ended normally
    Completed,
    /// The list or watch call failed
    Error,
    /// Waiting out the backoff before the next list
    Reconnecting,
    Stopped,
}

#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub list_calls: u64,
    pub events_applied: u64,
    /// Stale or duplicate events rejected by the per-object version check
    pub events_dropped: u64,
    pub items_rejected: u64,
    pub reconnects: u64,
    pub expirations: u64,
    pub last_seen_version: Option<Version>,
}

enum CycleEnd {
    Completed,
    Cancelled,
}

/// A list+watch session that has not been started yet
pub struct WatchSession<C: ResourceCollection> {
    collection: Arc<C>,
    scope: Scope,
    config: WatchConfig,
    cache: Arc<ObjectCache<C::Object>>,
    subscriptions: Arc<SubscriptionManager>,
    stats: Arc<RwLock<SessionStats>>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
}

impl<C: ResourceCollection> WatchSession<C> {
    #[must_use]
    pub fn new(collection: Arc<C>, scope: Scope, config: WatchConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Self {
            subscriptions: Arc::new(SubscriptionManager::new(config.channel_capacity)),
            collection,
            scope,
            config,
            cache: Arc::new(ObjectCache::new()),
            stats: Arc::new(RwLock::new(SessionStats::default())),
            state_tx,
            cancel: CancellationToken::new(),
        }
    }

    /// Ties the session lifetime to `parent`: cancelling it stops the session
    #[must_use]
    pub fn with_parent_token(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    /// Subscribes before start so the initial `DataChanged` is not missed
    pub async fn subscribe(&self) -> (String, mpsc::Receiver<SessionEvent>) {
        self.subscriptions.subscribe().await
    }

    /// Spawns the session loop: list, replace the cache, then watch from the listed version
    #[must_use]
    pub fn start(self) -> WatchSessionHandle<C::Object> {
        let name = format!("{} ({})", self.collection.describe(), self.scope);
        let handle_state = self.state_tx.subscribe();

        let runner = SessionLoop {
            name: name.clone(),
            collection: self.collection,
            scope: self.scope,
            config: self.config,
            cache: self.cache.clone(),
            subscriptions: self.subscriptions.clone(),
            stats: self.stats.clone(),
            state_tx: self.state_tx,
            cancel: self.cancel.clone(),
            last_seen: None,
            first_list: true,
        };

        let task = tokio::spawn(async move { runner.run().await });

        WatchSessionHandle {
            name,
            cache: self.cache,
            subscriptions: self.subscriptions,
            stats: self.stats,
            state_rx: handle_state,
            cancel: self.cancel,
            task: Some(task),
        }
    }
}

/// A running session. Dropping the handle stops the session.
pub struct WatchSessionHandle<K> {
    name: String,
    cache: Arc<ObjectCache<K>>,
    subscriptions: Arc<SubscriptionManager>,
    stats: Arc<RwLock<SessionStats>>,
    state_rx: watch::Receiver<SessionState>,
    cancel: CancellationToken,
    task: Option<JoinHandle<std::result::Result<(), Arc<Error>>>>,
}

impl<K: ManagedObject> WatchSessionHandle<K> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Consistent copy of the mirrored objects.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache lock is poisoned
    pub fn snapshot(&self) -> Result<Vec<K>> {
        self.cache.snapshot()
    }

    #[must_use]
    pub fn cache(&self) -> Arc<ObjectCache<K>> {
        self.cache.clone()
    }

    pub async fn subscribe(&self) -> (String, mpsc::Receiver<SessionEvent>) {
        self.subscriptions.subscribe().await
    }

    pub async fn unsubscribe(&self, subscription_id: &str) {
        self.subscriptions.unsubscribe(subscription_id).await;
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Receiver that observes every state transition
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
            .read()
            .map_or_else(|_| SessionStats::default(), |stats| stats.clone())
    }

    /// Stops the session: pending waits are abandoned and the subscription is dropped
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Waits for the session loop to end.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the session, if any
    pub async fn join(mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(Error::SessionFailed(e)),
            Err(e) => Err(Error::Custom(format!("watch session task failed: {e}"))),
        }
    }

    /// [`stop`](Self::stop) followed by [`join`](Self::join).
    ///
    /// # Errors
    ///
    /// Returns the fatal error that ended the session, if any
    pub async fn shutdown(self) -> Result<()> {
        self.stop();
        self.join().await
    }
}

impl<K> Drop for WatchSessionHandle<K> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// State owned by the spawned session task
struct SessionLoop<C: ResourceCollection> {
    name: String,
    collection: Arc<C>,
    scope: Scope,
    config: WatchConfig,
    cache: Arc<ObjectCache<C::Object>>,
    subscriptions: Arc<SubscriptionManager>,
    stats: Arc<RwLock<SessionStats>>,
    state_tx: watch::Sender<SessionState>,
    cancel: CancellationToken,
    last_seen: Option<Version>,
    first_list: bool,
}

impl<C: ResourceCollection> SessionLoop<C> {
    async fn run(mut self) -> std::result::Result<(), Arc<Error>> {
        info!("🔍 Starting watch for {}", self.name);

        let result = loop {
            let failure = match self.cycle().await {
                Ok(CycleEnd::Cancelled) => break Ok(()),
                Ok(CycleEnd::Completed) => {
                    self.set_state(SessionState::Completed);
                    debug!("Subscription for {} closed normally", self.name);
                    None
                }
                Err(e) => {
                    self.set_state(SessionState::Error);
                    Some(e)
                }
            };

            if let Some(e) = failure {
                if let Err(fatal) = self.handle_failure(e).await {
                    break Err(fatal);
                }
            }

            if self.cancel.is_cancelled() {
                break Ok(());
            }

            self.set_state(SessionState::Reconnecting);
            self.update_stats(|s| s.reconnects += 1);
            debug!(
                "Resubscribing for {} in {:?}",
                self.name, self.config.reconnect_backoff
            );
            if !self.backoff().await {
                break Ok(());
            }
        };

        self.set_state(SessionState::Stopped);
        info!("🛑 Stopped watch for {}", self.name);
        result
    }

    /// One list followed by one watch subscription, until the stream ends
    async fn cycle(&mut self) -> Result<CycleEnd> {
        let cancel = self.cancel.clone();
        let collection = self.collection.clone();

        self.set_state(SessionState::Listing);
        self.update_stats(|s| s.list_calls += 1);
        let Some(snapshot) = cancellable(&cancel, collection.list(&self.scope)).await else {
            return Ok(CycleEnd::Cancelled);
        };
        self.apply_snapshot(snapshot?).await?;

        let from = self.last_seen.clone();
        let Some(stream) = cancellable(&cancel, collection.watch(&self.scope, from.as_ref())).await
        else {
            return Ok(CycleEnd::Cancelled);
        };
        let mut stream = stream?;

        self.set_state(SessionState::Watching);
        debug!(
            "Subscribed to {} from version {}",
            self.name,
            from.as_ref().map_or("<none>", Version::as_str)
        );
        self.subscriptions.notify(SessionEvent::Connected).await;

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Ok(CycleEnd::Cancelled),
                next = stream.next() => next,
            };
            match next {
                None => return Ok(CycleEnd::Completed),
                Some(Ok(event)) => self.apply_event(event).await?,
                Some(Err(e)) => return Err(e),
            }
        }
    }

    /// Reports a failed cycle. Returns `Err` only for fatal errors, which end the session.
    async fn handle_failure(&mut self, e: Error) -> std::result::Result<(), Arc<Error>> {
        if e.is_fatal() {
            error!("❌ Watch for {} failed fatally: {}", self.name, e);
            let e = Arc::new(e);
            self.subscriptions
                .notify(SessionEvent::ConnectionError(e.clone()))
                .await;
            return Err(e);
        }

        if e.is_expired() {
            warn!("⏳ Version expired for {}, invalidating cache: {}", self.name, e);
            self.last_seen = None;
            self.update_stats(|s| {
                s.expirations += 1;
                s.last_seen_version = None;
            });
            if let Err(fatal) = self.cache.clear() {
                return Err(Arc::new(fatal));
            }
            self.subscriptions.notify(SessionEvent::DataChanged).await;
        } else {
            warn!("Subscription for {} closed with error: {}", self.name, e);
        }

        self.subscriptions
            .notify(SessionEvent::ConnectionError(Arc::new(e)))
            .await;
        Ok(())
    }

    async fn apply_snapshot(&mut self, snapshot: Snapshot<C::Object>) -> Result<()> {
        for rejected in &snapshot.rejected {
            warn!(
                "Skipping invalid item {} in list of {}: {}",
                rejected.name.as_deref().unwrap_or("<unnamed>"),
                self.name,
                rejected.reason
            );
        }
        let rejected = snapshot.rejected.len() as u64;
        let count = snapshot.items.len();

        let changed = self.cache.replace_all(snapshot.items)?;
        self.last_seen = snapshot.version;
        let last_seen = self.last_seen.clone();
        self.update_stats(|s| {
            s.items_rejected += rejected;
            s.last_seen_version = last_seen;
        });

        info!(
            "📋 Listed {} objects for {} at version {}",
            count,
            self.name,
            self.last_seen.as_ref().map_or("<none>", Version::as_str)
        );

        if changed || self.first_list {
            self.subscriptions.notify(SessionEvent::DataChanged).await;
        }
        self.first_list = false;
        Ok(())
    }

    async fn apply_event(&mut self, event: ObjectEvent<C::Object>) -> Result<()> {
        let (version, changed) = match event {
            ObjectEvent::Added(object) | ObjectEvent::Modified(object) => {
                if !self.is_newer(&object)? {
                    return Ok(());
                }
                (object.version(), self.cache.upsert(object)?)
            }
            ObjectEvent::Deleted(object) => {
                if !self.is_newer(&object)? {
                    return Ok(());
                }
                (object.version(), self.cache.remove(&object.key())?)
            }
            ObjectEvent::Bookmark(version) => {
                trace!("Bookmark for {} at {}", self.name, version);
                self.advance_watermark(version);
                return Ok(());
            }
            ObjectEvent::Rejected(item) => {
                warn!(
                    "Skipping invalid item {} in watch of {}: {}",
                    item.name.as_deref().unwrap_or("<unnamed>"),
                    self.name,
                    item.reason
                );
                self.update_stats(|s| s.items_rejected += 1);
                return Ok(());
            }
        };

        if let Some(version) = version {
            self.advance_watermark(version);
        }
        self.update_stats(|s| s.events_applied += 1);

        if changed {
            self.subscriptions.notify(SessionEvent::DataChanged).await;
        }
        Ok(())
    }

    /// Compares against the version stored for the same identity, not the session watermark:
    /// unrelated objects may legitimately carry smaller versions than the watermark.
    fn is_newer(&self, object: &C::Object) -> Result<bool> {
        let key: ObjectKey = object.key();
        let (Some(incoming), Some(stored)) = (object.version(), self.cache.version_of(&key)?)
        else {
            return Ok(true);
        };

        let newer = match self.collection.compare_versions(&incoming, &stored) {
            Some(ordering) => ordering == Ordering::Greater,
            None => incoming != stored,
        };
        if !newer {
            debug!(
                "Dropping stale event for {} (version {} <= stored {})",
                key, incoming, stored
            );
            self.update_stats(|s| s.events_dropped += 1);
        }
        Ok(newer)
    }

    fn advance_watermark(&mut self, version: Version) {
        let advance = self.last_seen.as_ref().is_none_or(|current| {
            match self.collection.compare_versions(&version, current) {
                Some(ordering) => ordering == Ordering::Greater,
                None => &version != current,
            }
        });
        if advance {
            self.last_seen = Some(version.clone());
            self.update_stats(|s| s.last_seen_version = Some(version));
        }
    }

    /// Waits the fixed backoff; false if the session was stopped meanwhile
    async fn backoff(&self) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            () = tokio::time::sleep(self.config.reconnect_backoff) => true,
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    fn update_stats(&self, f: impl FnOnce(&mut SessionStats)) {
        if let Ok(mut stats) = self.stats.write() {
            f(&mut stats);
        }
    }
}

/// Runs `fut` unless `cancel` fires first
async fn cancellable<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}
