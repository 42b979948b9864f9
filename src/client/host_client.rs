//! Pool-backed client for a single origin.

use std::sync::Arc;

use futures_util::future::BoxFuture;

use crate::client::DispatchError;
use crate::load_balancer::HostClient;
use crate::message::{LiveRequest, LiveResponse};
use crate::pool::ConnectionPool;
use crate::stream::Completion;

/// Sends each request on a connection borrowed from the origin's pool.
///
/// The connection goes back to the pool once the response body has been
/// fully consumed. It is closed instead when the write fails, the body
/// fails, or the body is dropped before its end.
#[derive(Clone)]
pub struct HostHttpClient {
    pool: Arc<dyn ConnectionPool>,
}

impl HostHttpClient {
    pub fn new(pool: Arc<dyn ConnectionPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }
}

impl HostClient for HostHttpClient {
    fn send(&self, request: LiveRequest) -> BoxFuture<'static, Result<LiveResponse, DispatchError>> {
        let pool = Arc::clone(&self.pool);
        Box::pin(async move {
            let origin = pool.origin().clone();
            let borrowed = pool.borrow().await.map_err(|source| DispatchError::Pool {
                origin: origin.clone(),
                source,
            })?;
            let connection_id = borrowed.id();

            let response = match borrowed.connection().write(request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::debug!(origin = %origin, connection = %connection_id, error = %e, "Write failed, closing connection");
                    borrowed.close();
                    return Err(DispatchError::from_transport(&origin, e));
                }
            };

            let (parts, body) = response.into_parts();
            let body = body.on_completion(move |completion| match completion {
                Completion::Ended => borrowed.release(),
                Completion::Failed(cause) => {
                    tracing::debug!(connection = %connection_id, error = %cause, "Response body failed, closing connection");
                    borrowed.close();
                }
                Completion::Cancelled => {
                    tracing::debug!(connection = %connection_id, "Response body abandoned, closing connection");
                    borrowed.close();
                }
            });
            Ok(LiveResponse::from_parts(parts, body))
        })
    }

    fn load_balancing_metric(&self) -> usize {
        let stats = self.pool.stats();
        stats.busy + stats.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::Origin;
    use crate::pool::simple::tests::StubFactory;
    use crate::pool::{ConnectionPoolSettings, SimpleConnectionPool};
    use crate::stream::ByteStream;
    use futures_util::StreamExt;
    use std::sync::atomic::Ordering;

    fn client() -> (HostHttpClient, Arc<dyn ConnectionPool>, Arc<StubFactory>) {
        let factory = Arc::new(StubFactory::default());
        let pool: Arc<dyn ConnectionPool> = Arc::new(SimpleConnectionPool::new(
            Origin::new("shop", "shop-01", "127.0.0.1", 9000),
            ConnectionPoolSettings::default(),
            factory.clone(),
        ));
        (HostHttpClient::new(Arc::clone(&pool)), pool, factory)
    }

    fn request() -> LiveRequest {
        http::Request::new(ByteStream::empty())
    }

    #[tokio::test]
    async fn consumed_body_returns_connection() {
        let (client, pool, factory) = client();

        let response = client.send(request()).await.unwrap();
        assert_eq!(client.load_balancing_metric(), 1);

        let chunks: Vec<_> = response.into_body().collect().await;
        assert!(chunks.is_empty());
        assert_eq!(pool.stats().available, 1);
        assert_eq!(client.load_balancing_metric(), 0);

        client.send(request()).await.unwrap();
        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_body_closes_connection() {
        let (client, pool, _) = client();

        let response = client.send(request()).await.unwrap();
        drop(response);

        let stats = pool.stats();
        assert_eq!(stats.busy, 0);
        assert_eq!(stats.available, 0);
        assert_eq!(stats.closed_connections, 1);
    }

    #[tokio::test]
    async fn connect_failure_is_attributed_to_origin() {
        let (client, _, factory) = client();
        factory.fail.store(true, Ordering::SeqCst);

        let error = client.send(request()).await.unwrap_err();
        assert!(matches!(error, DispatchError::Pool { .. }));
        assert_eq!(error.origin().map(|o| o.id().as_str()), Some("shop-01"));
        assert!(error.is_retryable());
    }
}
