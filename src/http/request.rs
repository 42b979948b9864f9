//! Inbound request conversion.
//!
//! # Responsibilities
//! - Read the request id set by the request-id layer
//! - Turn an axum request into a [`LiveRequest`] with a streamed body

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Request};

use crate::message::LiveRequest;
use crate::stream::ByteStream;

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// The request id, or `"unknown"` when the header is missing or not text.
pub fn request_id(headers: &HeaderMap) -> &str {
    headers
        .get(&X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
}

pub fn into_live_request(request: Request<Body>) -> LiveRequest {
    let (parts, body) = request.into_parts();
    LiveRequest::from_parts(parts, ByteStream::from_body(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn keeps_head_and_body() {
        let request = Request::post("/orders?id=1")
            .header("x-request-id", "abc")
            .body(Body::from("payload"))
            .unwrap();
        assert_eq!(request_id(request.headers()), "abc");

        let live = into_live_request(request);
        assert_eq!(live.uri().path(), "/orders");
        assert_eq!(live.headers()["x-request-id"], "abc");

        let body = live.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"payload");
    }

    #[test]
    fn missing_request_id() {
        assert_eq!(request_id(&HeaderMap::new()), "unknown");
    }
}
