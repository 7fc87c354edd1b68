pub mod aggregator;
pub mod cached_object;
pub mod clock;
pub mod config;
pub mod errors;
pub mod object_cache;
pub mod store;
pub mod subscription;
pub mod watch_session;

pub use aggregator::{ChangeAggregator, ChangeHandler};
pub use cached_object::CachedObject;
pub use clock::{Clock, ManualClock, TokioClock};
pub use config::{AggregatorConfig, KubeCollectionConfig, MirrorConfig, UpdateConfig, WatchConfig};
pub use object_cache::ObjectCache;
pub use store::{ReadonlyStore, ResourceStore};
pub use subscription::{SessionEvent, SubscriptionManager};
pub use watch_session::{SessionState, SessionStats, WatchSession, WatchSessionHandle};
