//! Dispatch failures.

use crate::message::MessageError;
use crate::net::TransportError;
use crate::origin::{AppId, Origin};
use crate::pool::PoolError;
use crate::stream::{AggregateError, StreamError};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("no available hosts for application '{app_id}'")]
    NoAvailableHosts { app_id: AppId },

    #[error("bad response from origin {origin}: {source}")]
    BadResponse {
        origin: Origin,
        #[source]
        source: TransportError,
    },

    #[error("request to origin {origin} failed: {source}")]
    Transport {
        origin: Origin,
        #[source]
        source: TransportError,
    },

    #[error("no connection to origin {origin}: {source}")]
    Pool {
        origin: Origin,
        #[source]
        source: PoolError,
    },

    #[error("request body exceeds {max_bytes} bytes")]
    ContentOverflow { max_bytes: usize },

    #[error("failed to read request body: {0}")]
    RequestBody(#[source] StreamError),

    #[error(transparent)]
    Message(#[from] MessageError),

    #[error("request cancelled by the client")]
    Cancelled,
}

impl DispatchError {
    /// Failures another origin might not have.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::NoAvailableHosts { .. } | DispatchError::BadResponse { .. } => true,
            DispatchError::Transport { source, .. } => source.is_retryable(),
            DispatchError::Pool { source, .. } => source.is_retryable(),
            DispatchError::ContentOverflow { .. }
            | DispatchError::RequestBody(_)
            | DispatchError::Message(_)
            | DispatchError::Cancelled => false,
        }
    }

    /// Classify a transport failure on `origin`.
    pub fn from_transport(origin: &Origin, source: TransportError) -> Self {
        if source.is_bad_response() {
            DispatchError::BadResponse {
                origin: origin.clone(),
                source,
            }
        } else {
            DispatchError::Transport {
                origin: origin.clone(),
                source,
            }
        }
    }

    /// The origin the failure is attributed to, if any.
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            DispatchError::BadResponse { origin, .. }
            | DispatchError::Transport { origin, .. }
            | DispatchError::Pool { origin, .. } => Some(origin),
            _ => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NoAvailableHosts { .. } => "no_available_hosts",
            DispatchError::BadResponse { .. } => "bad_response",
            DispatchError::Transport { .. } => "transport",
            DispatchError::Pool { .. } => "pool",
            DispatchError::ContentOverflow { .. } => "content_overflow",
            DispatchError::RequestBody(_) => "request_body",
            DispatchError::Message(_) => "invalid_message",
            DispatchError::Cancelled => "cancelled",
        }
    }
}

impl From<AggregateError> for DispatchError {
    fn from(e: AggregateError) -> Self {
        match e {
            AggregateError::ContentOverflow { max_bytes } => DispatchError::ContentOverflow { max_bytes },
            AggregateError::Stream(cause) => DispatchError::RequestBody(cause),
        }
    }
}
