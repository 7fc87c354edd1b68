use crate::k8s::object::ObjectKey;
use derive_more::From;
use k8s_openapi::serde_json;
use std::sync::Arc;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Json(serde_json::Error),

    #[from]
    Kube(kube::Error),

    #[from]
    Infer(kube::config::InferConfigError),

    #[from]
    HttpHeader(hyper::http::Error),

    #[from]
    Io(std::io::Error),

    /// Stream or network failure, recovered by reconnecting
    Transport(String),

    /// The requested version is too old ("gone"); the mirror must re-list
    Expired(String),

    /// A write precondition on the object version failed
    Conflict(String),

    /// An event kind outside the known set; the watch protocol is violated
    MalformedEvent(String),

    NotFound(String),

    DuplicateIdentity(ObjectKey),

    MissingVersion(ObjectKey),

    /// Mutex/RwLock poisoning (indicates prior panic)
    LockPoisoned(String),

    Cancelled,

    /// A watch session stopped because of a fatal error
    SessionFailed(Arc<Error>),

    /// Custom error message
    Custom(String),
}

impl Error {
    /// True for "gone"/too-old version errors, including kube API status 410
    #[must_use]
    pub const fn is_expired(&self) -> bool {
        match self {
            Self::Expired(_) => true,
            Self::Kube(kube::Error::Api(resp)) => resp.code == 410,
            _ => false,
        }
    }

    /// True for failed optimistic-concurrency preconditions, including kube API status 409
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        match self {
            Self::Conflict(_) => true,
            Self::Kube(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Kube(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Errors that must stop a watch session instead of triggering a reconnect
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::MalformedEvent(_) | Self::LockPoisoned(_) => true,
            Self::SessionFailed(inner) => inner.is_fatal(),
            _ => false,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::Json(e) => write!(fmt, "json: {e}"),
            Self::Kube(e) => write!(fmt, "kube: {e}"),
            Self::Infer(e) => write!(fmt, "kubeconfig: {e}"),
            Self::HttpHeader(e) => write!(fmt, "http header: {e}"),
            Self::Io(e) => write!(fmt, "io: {e}"),
            Self::Transport(msg) => write!(fmt, "transport failure: {msg}"),
            Self::Expired(msg) => write!(fmt, "version expired: {msg}"),
            Self::Conflict(msg) => write!(fmt, "version conflict: {msg}"),
            Self::MalformedEvent(msg) => write!(fmt, "malformed watch event: {msg}"),
            Self::NotFound(msg) => write!(fmt, "not found: {msg}"),
            Self::DuplicateIdentity(key) => write!(fmt, "duplicate identity in desired set: {key}"),
            Self::MissingVersion(key) => write!(fmt, "object {key} has no version"),
            Self::LockPoisoned(msg) => write!(
                fmt,
                "{msg} - this indicates a prior panic, application may be in an inconsistent state"
            ),
            Self::Cancelled => write!(fmt, "operation cancelled"),
            Self::SessionFailed(e) => write!(fmt, "watch session failed: {e}"),
            Self::Custom(msg) => write!(fmt, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16) -> Error {
        Error::Kube(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "test".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn test_classification_of_kube_status_codes() {
        assert!(api_error(410).is_expired());
        assert!(api_error(409).is_conflict());
        assert!(api_error(404).is_not_found());
        assert!(!api_error(500).is_expired());
        assert!(!api_error(500).is_conflict());
    }

    #[test]
    fn test_only_protocol_violations_are_fatal() {
        assert!(Error::MalformedEvent("UNKNOWN".to_string()).is_fatal());
        assert!(!Error::Transport("reset".to_string()).is_fatal());
        assert!(!Error::Expired("too old".to_string()).is_fatal());
    }
}
