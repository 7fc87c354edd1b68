/**
 * Merges `DataChanged` notifications from several watch sessions and debounces them into a
 * single downstream trigger.
 */
use super::clock::{Clock, TokioClock};
use super::config::AggregatorConfig;
use super::subscription::SessionEvent;
use super::watch_session::WatchSessionHandle;
use crate::error::Result;
use crate::k8s::object::ManagedObject;
use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reacts to aggregated changes
#[async_trait]
pub trait ChangeHandler: Send + Sync + 'static {
    /// Called once per quiet period after one or more `DataChanged` notifications
    async fn on_changed(&self) -> Result<()>;
}

#[async_trait]
impl<F, Fut> ChangeHandler for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn on_changed(&self) -> Result<()> {
        (self)().await
    }
}

/// Running aggregation task. Dropping it stops the aggregation.
pub struct ChangeAggregator {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ChangeAggregator {
    /// Starts aggregating the given notification sources with the tokio clock
    #[must_use]
    pub fn spawn<H: ChangeHandler>(
        sources: Vec<mpsc::Receiver<SessionEvent>>,
        config: AggregatorConfig,
        handler: H,
    ) -> Self {
        Self::spawn_with_clock(sources, config, Arc::new(TokioClock), handler)
    }

    /// Starts aggregating with an explicit time source
    #[must_use]
    pub fn spawn_with_clock<H: ChangeHandler>(
        sources: Vec<mpsc::Receiver<SessionEvent>>,
        config: AggregatorConfig,
        clock: Arc<dyn Clock>,
        handler: H,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            run_debounce(sources, config, clock, handler, task_cancel).await;
        });

        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Subscribes to each session and starts aggregating their notifications
    pub async fn for_sessions<K: ManagedObject, H: ChangeHandler>(
        sessions: &[&WatchSessionHandle<K>],
        config: AggregatorConfig,
        handler: H,
    ) -> Self {
        let mut sources = Vec::with_capacity(sessions.len());
        for session in sessions {
            let (_id, rx) = session.subscribe().await;
            sources.push(rx);
        }
        Self::spawn(sources, config, handler)
    }

    /// Stops listening to notifications and waits for the task to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ChangeAggregator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_debounce<H: ChangeHandler>(
    sources: Vec<mpsc::Receiver<SessionEvent>>,
    config: AggregatorConfig,
    clock: Arc<dyn Clock>,
    handler: H,
    cancel: CancellationToken,
) {
    let source_count = sources.len();
    let mut merged = futures::stream::select_all(sources.into_iter().map(ReceiverStream::new));
    let mut deadline: Option<Instant> = None;
    let mut sources_open = source_count > 0;

    info!(
        "📡 Change aggregator started ({} sources, debounce {:?})",
        source_count, config.debounce
    );

    loop {
        if !sources_open && deadline.is_none() {
            debug!("All notification sources closed");
            break;
        }

        let timer = {
            let clock = clock.clone();
            async move {
                match deadline {
                    Some(at) => clock.sleep_until(at).await,
                    None => futures::future::pending::<()>().await,
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            event = merged.next(), if sources_open => match event {
                Some(SessionEvent::DataChanged) => {
                    deadline = Some(clock.now() + config.debounce);
                }
                Some(_) => {}
                None => sources_open = false,
            },
            () = timer => {
                deadline = None;
                fire(&handler).await;
            }
        }
    }

    info!("📡 Change aggregator stopped");
}

/// Invokes the handler; failures are logged and never end the aggregation
async fn fire<H: ChangeHandler>(handler: &H) {
    match AssertUnwindSafe(handler.on_changed()).catch_unwind().await {
        Ok(Ok(())) => debug!("Aggregated change handled"),
        Ok(Err(e)) => warn!("Execution of change handler failed: {}", e),
        Err(_) => warn!("Execution of change handler panicked"),
    }
}
