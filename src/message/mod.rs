//! HTTP messages with streaming bodies.
//!
//! Requests and responses are plain `http` types carrying a [`ByteStream`]
//! body. A message is consumed once: forwarding it moves the body along.
//!
//! [`ByteStream`]: crate::stream::ByteStream

pub mod cookies;
pub mod headers;

use crate::stream::ByteStream;

pub type LiveRequest = http::Request<ByteStream>;
pub type LiveResponse = http::Response<ByteStream>;

pub use cookies::{request_cookie, ResponseCookie};
pub use headers::{content_length, has_body, is_chunked, MessageError};
