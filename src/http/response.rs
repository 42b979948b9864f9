//! Outbound response conversion and error mapping.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::client::DispatchError;
use crate::message::LiveResponse;
use crate::net::TransportError;
use crate::pool::PoolError;

/// Status returned to the client for a failed dispatch.
pub fn status_for(error: &DispatchError) -> StatusCode {
    match error {
        DispatchError::NoAvailableHosts { .. } | DispatchError::BadResponse { .. } => {
            StatusCode::BAD_GATEWAY
        }
        DispatchError::Transport { source, .. } | DispatchError::Pool { source: PoolError::Connect(source), .. } => {
            match source {
                TransportError::ConnectTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            }
        }
        DispatchError::Pool { source: PoolError::PendingTimeout { .. }, .. } => StatusCode::GATEWAY_TIMEOUT,
        DispatchError::Pool { .. } => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::ContentOverflow { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        DispatchError::RequestBody(_) | DispatchError::Message(_) => StatusCode::BAD_REQUEST,
        // The client is gone; nobody reads this.
        DispatchError::Cancelled => StatusCode::BAD_GATEWAY,
    }
}

pub fn error_response(error: &DispatchError) -> Response {
    (status_for(error), error.to_string()).into_response()
}

pub fn into_axum_response(response: LiveResponse) -> Response {
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::Origin;
    use crate::stream::{AggregateError, ByteStream};
    use http_body_util::BodyExt;

    fn origin() -> Origin {
        Origin::new("shop", "a", "127.0.0.1", 9000)
    }

    #[test]
    fn maps_failures_to_statuses() {
        let no_hosts = DispatchError::NoAvailableHosts { app_id: "shop".into() };
        assert_eq!(status_for(&no_hosts), StatusCode::BAD_GATEWAY);

        let timeout = DispatchError::Pool {
            origin: origin(),
            source: PoolError::Connect(TransportError::ConnectTimeout {
                address: "127.0.0.1:9000".into(),
                timeout_ms: 100,
            }),
        };
        assert_eq!(status_for(&timeout), StatusCode::GATEWAY_TIMEOUT);

        let closed = DispatchError::Pool {
            origin: origin(),
            source: PoolError::Closed { origin: "a".into() },
        };
        assert_eq!(status_for(&closed), StatusCode::SERVICE_UNAVAILABLE);

        let overflow = DispatchError::from(AggregateError::ContentOverflow { max_bytes: 4 });
        assert_eq!(status_for(&overflow), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn streams_live_body() {
        let live = http::Response::builder()
            .status(201)
            .body(ByteStream::from_bytes("created"))
            .unwrap();

        let response = into_axum_response(live);
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"created");
    }
}
