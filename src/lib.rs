//! Consistent in-memory mirrors of Kubernetes collections.
//!
//! A [`WatchSession`](k8s::cache::WatchSession) lists a collection, then follows its watch
//! stream, keeping an [`ObjectCache`](k8s::cache::ObjectCache) consistent across stream
//! failures and version expiry. A [`ChangeAggregator`](k8s::cache::ChangeAggregator) debounces
//! change notifications from several sessions. [`realize_state`](k8s::realize::realize_state)
//! and [`OptimisticUpdater`](k8s::retry::OptimisticUpdater) write back to the collection.
pub mod error;
pub mod k8s;
