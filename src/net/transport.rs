//! Plain HTTP/1.1 connections to origins over hyper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use http::header::{HeaderName, HOST};
use http::{HeaderValue, Uri, Version};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::message::{content_length, LiveRequest, LiveResponse, MessageError};
use crate::net::connection::{Connection, ConnectionFactory, ConnectionId, ConnectionSettings};
use crate::origin::Origin;
use crate::stream::{BufferTracker, ByteStream};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connecting to {address} timed out after {timeout_ms}ms")]
    ConnectTimeout { address: String, timeout_ms: u64 },

    #[error("origin sent a malformed response: {0}")]
    Malformed(#[source] hyper::Error),

    #[error("origin sent an invalid response: {0}")]
    InvalidResponse(#[from] MessageError),

    #[error("http protocol error: {0}")]
    Protocol(#[source] hyper::Error),

    #[error("connection closed")]
    Closed,

    #[error("origin {0} requires TLS, which plain HTTP connections do not support")]
    TlsUnsupported(String),
}

impl TransportError {
    fn from_hyper(e: hyper::Error) -> Self {
        if e.is_parse() || e.is_parse_status() {
            TransportError::Malformed(e)
        } else if e.is_closed() || e.is_canceled() || e.is_incomplete_message() {
            TransportError::Closed
        } else {
            TransportError::Protocol(e)
        }
    }

    /// The origin answered with something that could not be decoded.
    pub fn is_bad_response(&self) -> bool {
        matches!(self, TransportError::Malformed(_) | TransportError::InvalidResponse(_))
    }

    /// The failure happened before the origin could have acted on the request,
    /// or the origin's answer was unusable.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Connect { .. }
            | TransportError::ConnectTimeout { .. }
            | TransportError::Closed
            | TransportError::Malformed(_)
            | TransportError::InvalidResponse(_) => true,
            TransportError::Protocol(_) | TransportError::TlsUnsupported(_) => false,
        }
    }
}

/// Hop-by-hop headers that describe the inbound connection, not the message.
const HOP_BY_HOP: [&str; 6] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "te",
    "trailer",
    "upgrade",
];

/// One HTTP/1.1 connection driven by a background task.
pub struct HttpConnection {
    id: ConnectionId,
    origin: Origin,
    created_at: Instant,
    sender: Arc<Mutex<http1::SendRequest<ByteStream>>>,
    closed: Arc<AtomicBool>,
    driver: JoinHandle<()>,
    tracker: Option<BufferTracker>,
}

impl HttpConnection {
    pub async fn connect(
        origin: &Origin,
        settings: ConnectionSettings,
        tracker: Option<BufferTracker>,
    ) -> Result<Self, TransportError> {
        if origin.tls().is_some() {
            return Err(TransportError::TlsUnsupported(origin.to_string()));
        }

        let address = origin.host_and_port();
        let stream = tokio::time::timeout(settings.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                address: address.clone(),
                timeout_ms: settings.connect_timeout.as_millis() as u64,
            })?
            .map_err(|source| TransportError::Connect {
                address: address.clone(),
                source,
            })?;
        let _ = stream.set_nodelay(true);

        let (sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(TransportError::from_hyper)?;

        let id = ConnectionId::new();
        let closed = Arc::new(AtomicBool::new(false));
        let driver = {
            let closed = Arc::clone(&closed);
            tokio::spawn(async move {
                if let Err(e) = conn.await {
                    tracing::debug!(connection_id = %id, error = %e, "Origin connection ended with error");
                }
                closed.store(true, Ordering::Release);
            })
        };

        tracing::debug!(connection_id = %id, origin = %origin, "Origin connection established");

        Ok(Self {
            id,
            origin: origin.clone(),
            created_at: Instant::now(),
            sender: Arc::new(Mutex::new(sender)),
            closed,
            driver,
            tracker,
        })
    }
}

impl Connection for HttpConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn origin(&self) -> &Origin {
        &self.origin
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn created_at(&self) -> Instant {
        self.created_at
    }

    fn write(&self, request: LiveRequest) -> BoxFuture<'static, Result<LiveResponse, TransportError>> {
        let sender = Arc::clone(&self.sender);
        let closed = Arc::clone(&self.closed);
        let tracker = self.tracker.clone();
        let request = prepare_outbound(request, &self.origin);

        Box::pin(async move {
            if closed.load(Ordering::Acquire) {
                return Err(TransportError::Closed);
            }

            let pending = {
                let mut sender = sender.lock().await;
                sender.ready().await.map_err(TransportError::from_hyper)?;
                sender.send_request(request)
            };
            let response = pending.await.map_err(TransportError::from_hyper)?;

            content_length(response.headers())?;

            let (parts, body) = response.into_parts();
            let body = ByteStream::from_body(body);
            let body = match tracker {
                Some(tracker) => body.track(tracker),
                None => body,
            };
            Ok(http::Response::from_parts(parts, body))
        })
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(connection_id = %self.id, origin = %self.origin, "Closing origin connection");
        }
        self.driver.abort();
    }
}

impl Drop for HttpConnection {
    fn drop(&mut self) {
        self.driver.abort();
    }
}

/// Origin-form URI, HTTP/1.1, a Host header and no hop-by-hop headers.
fn prepare_outbound(mut request: LiveRequest, origin: &Origin) -> LiveRequest {
    if request.uri().authority().is_some() {
        let path = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        if let Ok(uri) = path.parse::<Uri>() {
            *request.uri_mut() = uri;
        }
    }
    *request.version_mut() = Version::HTTP_11;

    let headers = request.headers_mut();
    for name in HOP_BY_HOP {
        headers.remove(HeaderName::from_static(name));
    }
    if !headers.contains_key(HOST) {
        if let Ok(host) = HeaderValue::from_str(&origin.host_and_port()) {
            headers.insert(HOST, host);
        }
    }
    request
}

/// Opens [`HttpConnection`]s.
#[derive(Debug, Clone, Default)]
pub struct HttpConnectionFactory {
    tracker: Option<BufferTracker>,
}

impl HttpConnectionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account every response body chunk against `tracker`.
    pub fn with_tracker(tracker: BufferTracker) -> Self {
        Self {
            tracker: Some(tracker),
        }
    }
}

impl ConnectionFactory for HttpConnectionFactory {
    fn create_connection(
        &self,
        origin: &Origin,
        settings: ConnectionSettings,
    ) -> BoxFuture<'static, Result<Arc<dyn Connection>, TransportError>> {
        let origin = origin.clone();
        let tracker = self.tracker.clone();
        Box::pin(async move {
            let connection = HttpConnection::connect(&origin, settings, tracker).await?;
            Ok(Arc::new(connection) as Arc<dyn Connection>)
        })
    }
}
