//! Bounded aggregation of a [`ByteStream`] into one [`Buffer`].

use bytes::BytesMut;
use futures_util::StreamExt;

use crate::stream::buffer::Buffer;
use crate::stream::byte_stream::{ByteStream, StreamError};

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("content overflow: body exceeds {max_bytes} bytes")]
    ContentOverflow { max_bytes: usize },

    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl ByteStream {
    /// Collect the whole stream into one buffer of at most `max_bytes`.
    ///
    /// Every chunk is released as soon as it has been copied. On overflow the
    /// offending chunk and the partial aggregate are released and the
    /// upstream is cancelled by dropping it. The result is accounted against
    /// the tracker of the first tracked chunk, if there was one.
    pub async fn aggregate(self, max_bytes: usize) -> Result<Buffer, AggregateError> {
        let mut upstream = self;
        let mut aggregated = BytesMut::new();
        let mut tracker = None;

        while let Some(chunk) = upstream.next().await {
            let chunk = chunk?;
            if tracker.is_none() {
                tracker = chunk.tracker().cloned();
            }
            if aggregated.len() + chunk.len() > max_bytes {
                chunk.release();
                drop(aggregated);
                drop(upstream);
                return Err(AggregateError::ContentOverflow { max_bytes });
            }
            aggregated.extend_from_slice(chunk.content());
            chunk.release();
        }

        let bytes = aggregated.freeze();
        Ok(match tracker {
            Some(tracker) => tracker.track(bytes),
            None => Buffer::new(bytes),
        })
    }
}
