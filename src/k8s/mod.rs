pub mod cache;
pub mod client;
pub mod collection;
pub mod definition;
pub mod kube_collection;
pub mod metadata;
pub mod object;
pub mod realize;
pub mod retry;

/// Default user agent for `kubemirror` - automatically uses the package version
///
/// Use `client::new(None)` to send it; it can be overridden via the
/// `KUBEMIRROR_USER_AGENT` environment variable.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
