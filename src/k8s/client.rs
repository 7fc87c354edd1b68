// Client creation with custom user-agent support for kube 2.x
use super::USER_AGENT;
use crate::error::Result as KmResult;
use hyper::http::{HeaderName, HeaderValue};
use kube::{Client, Config};
use tracing::warn;

/// Environment variable overriding the default user agent
pub const USER_AGENT_ENV: &str = "KUBEMIRROR_USER_AGENT";

/// The user agent to send: `KUBEMIRROR_USER_AGENT` if set, otherwise `fallback`
#[must_use]
pub fn resolve_user_agent(fallback: &str) -> String {
    std::env::var(USER_AGENT_ENV)
        .ok()
        .filter(|ua| !ua.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

/// Adds a `user-agent` header to `config`, logging and skipping invalid values
pub fn add_user_agent_header(config: &mut Config, user_agent: Option<&str>) {
    if let Some(user_agent) = user_agent {
        match HeaderValue::from_str(user_agent) {
            Ok(value) => config
                .headers
                .push((HeaderName::from_static("user-agent"), value)),
            Err(e) => warn!("Ignoring invalid user agent {:?}: {}", user_agent, e),
        }
    }
}

/// Strict variant of [`add_user_agent_header`].
///
/// # Errors
///
/// Returns an error if the user agent is not a valid header value
pub fn try_add_user_agent_header(config: &mut Config, user_agent: &str) -> KmResult<()> {
    let value = HeaderValue::from_str(user_agent).map_err(hyper::http::Error::from)?;
    config
        .headers
        .push((HeaderName::from_static("user-agent"), value));
    Ok(())
}

/// Builds a client from `config` with the resolved user agent.
///
/// In strict mode an invalid user agent is an error, otherwise it is logged and skipped.
///
/// # Errors
///
/// Will return `Err` if the client cannot be built, or in strict mode if the user agent is invalid
pub fn from_config(mut config: Config, custom_user_agent: Option<&str>, strict: bool) -> KmResult<Client> {
    let user_agent = resolve_user_agent(custom_user_agent.unwrap_or(USER_AGENT));
    if strict {
        try_add_user_agent_header(&mut config, &user_agent)?;
    } else {
        add_user_agent_header(&mut config, Some(&user_agent));
    }
    Ok(Client::try_from(config)?)
}

/// Create a new k8s client from the inferred kubeconfig (lenient about the user agent)
///
/// # Errors
///
/// Will return `Err` if the configuration cannot be inferred or the client cannot be built
pub async fn new(custom_user_agent: Option<&str>) -> KmResult<Client> {
    from_config(Config::infer().await?, custom_user_agent, false)
}

/// Like [`new`] but fails on an invalid user agent
///
/// # Errors
///
/// Will return `Err` if the configuration cannot be inferred, the user agent is invalid, or
/// the client cannot be built
pub async fn new_strict(custom_user_agent: Option<&str>) -> KmResult<Client> {
    from_config(Config::infer().await?, custom_user_agent, true)
}
