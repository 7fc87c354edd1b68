use crate::error::Error;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Notifications published by a watch session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The mirrored content changed
    DataChanged,
    /// A (re)subscription to the watch stream succeeded
    Connected,
    /// A transport failure; the session recovers by itself unless the error is fatal
    ConnectionError(Arc<Error>),
}

pub struct Subscription {
    pub id: String,
    pub sender: mpsc::Sender<SessionEvent>,
}

impl Subscription {
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let id = Uuid::new_v4().to_string();

        (Self { id, sender: tx }, rx)
    }
}

/// Fan-out of session notifications to any number of subscribers
pub struct SubscriptionManager {
    subscriptions: RwLock<Vec<Subscription>>,
    capacity: usize,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            subscriptions: RwLock::new(Vec::new()),
            capacity,
        }
    }

    pub async fn subscribe(&self) -> (String, mpsc::Receiver<SessionEvent>) {
        let (subscription, receiver) = Subscription::new(self.capacity);
        let id = subscription.id.clone();
        self.subscriptions.write().await.push(subscription);
        (id, receiver)
    }

    pub async fn unsubscribe(&self, subscription_id: &str) {
        self.subscriptions
            .write()
            .await
            .retain(|s| s.id != subscription_id);
    }

    /// Delivers `event` to every subscriber without blocking the publisher.
    ///
    /// Subscribers whose receiver was dropped are removed. A subscriber that is not keeping up
    /// loses the event; notifications are edge triggers, so the queued ones already tell it to
    /// look at the mirror again.
    pub async fn notify(&self, event: SessionEvent) {
        let mut subs = self.subscriptions.write().await;
        subs.retain(|subscription| match subscription.sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Subscriber {} is lagging, dropping {:?}", subscription.id, event);
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Subscriber {} went away", subscription.id);
                false
            }
        });
    }

    pub async fn active_subscriptions(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}
