//! Message body as a lazy stream of [`Buffer`]s.

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use http_body::{Body, Frame, SizeHint};
use http_body_util::BodyExt;
use tokio::sync::mpsc;

use crate::stream::buffer::{Buffer, BufferTracker};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A body stream failed before it completed.
#[derive(Debug, thiserror::Error)]
#[error("body stream failed: {0}")]
pub struct StreamError(#[source] BoxError);

impl StreamError {
    pub fn new(cause: impl Into<BoxError>) -> Self {
        Self(cause.into())
    }

    pub fn cause(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.0.as_ref()
    }
}

type Inner = Pin<Box<dyn Stream<Item = Result<Buffer, StreamError>> + Send>>;

/// How a stream finished, reported to [`ByteStream::on_completion`] hooks.
#[derive(Debug)]
pub enum Completion<'a> {
    /// The producer signalled end of stream.
    Ended,
    /// The producer failed.
    Failed(&'a StreamError),
    /// The consumer dropped the stream before it finished.
    Cancelled,
}

type CompletionHook = Box<dyn FnOnce(Completion<'_>) + Send>;

/// An ordered, consume-once sequence of body chunks.
///
/// Every chunk is moved out to the consumer, so each [`Buffer`] has exactly
/// one owner at a time. Dropping the stream cancels the producer.
pub struct ByteStream {
    inner: Inner,
    remaining: Option<u64>,
}

impl ByteStream {
    pub fn empty() -> Self {
        Self::from_stream(stream::empty()).with_exact_len(0)
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Buffer, StreamError>> + Send + 'static,
    {
        Self {
            inner: Box::pin(stream),
            remaining: None,
        }
    }

    fn with_exact_len(mut self, len: u64) -> Self {
        self.remaining = Some(len);
        self
    }

    pub fn from_buffer(buffer: Buffer) -> Self {
        let len = buffer.len() as u64;
        Self::from_stream(stream::once(async move { Ok(buffer) })).with_exact_len(len)
    }

    pub fn from_buffers(buffers: Vec<Buffer>) -> Self {
        let len = buffers.iter().map(|b| b.len() as u64).sum();
        Self::from_stream(stream::iter(buffers.into_iter().map(Ok))).with_exact_len(len)
    }

    /// Bytes still to come, when the producer declared an exact length.
    pub fn exact_len(&self) -> Option<u64> {
        self.remaining
    }

    fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Buffer, StreamError>>> {
        let polled = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(Some(Ok(chunk))) = &polled {
            self.remaining = self.remaining.map(|r| r.saturating_sub(chunk.len() as u64));
        }
        polled
    }

    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Self::empty();
        }
        Self::from_buffer(Buffer::new(bytes))
    }

    /// Adapt any `http_body::Body`; trailers are ignored.
    pub fn from_body<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let data = body
            .into_data_stream()
            .map(|chunk| chunk.map(Buffer::new).map_err(StreamError::new));
        Self::from_stream(data)
    }

    /// A push-based stream fed through the returned [`BodySender`].
    pub fn channel(capacity: usize) -> (BodySender, ByteStream) {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));
        let stream = Self::from_stream(stream::poll_fn(move |cx| rx.poll_recv(cx)));
        (BodySender { tx }, stream)
    }

    /// Re-mint every chunk as a buffer accounted against `tracker`.
    pub fn track(self, tracker: BufferTracker) -> Self {
        let remaining = self.remaining;
        let mut tracked = self.map(move |buffer| {
            if buffer.tracker().is_some() {
                buffer
            } else {
                tracker.track(buffer.into_bytes())
            }
        });
        tracked.remaining = remaining;
        tracked
    }

    /// Transform each chunk. The mapping owns the incoming buffer: it either
    /// passes it on or releases it.
    pub fn map<F>(self, mut mapping: F) -> Self
    where
        F: FnMut(Buffer) -> Buffer + Send + 'static,
    {
        Self::from_stream(self.inner.map(move |chunk| chunk.map(&mut mapping)))
    }

    /// An empty stream that drains and releases every chunk of this one.
    ///
    /// The source is consumed only as the returned stream is polled, so the
    /// producer still reaches its end and its connection stays reusable.
    pub fn discard(self) -> Self {
        let mut source = self.inner;
        Self::from_stream(stream::poll_fn(move |cx| loop {
            match source.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => chunk.release(),
                Poll::Ready(Some(Err(cause))) => return Poll::Ready(Some(Err(cause))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }))
    }

    pub fn concat(self, next: ByteStream) -> Self {
        Self::from_stream(self.inner.chain(next.inner))
    }

    /// Discard this stream's content and continue with `replacement`.
    pub fn replace_with(self, replacement: ByteStream) -> Self {
        self.discard().concat(replacement)
    }

    /// Run `hook` exactly once, when the stream ends, fails or is dropped early.
    pub fn on_completion<F>(self, hook: F) -> Self
    where
        F: FnOnce(Completion<'_>) + Send + 'static,
    {
        let remaining = self.remaining;
        let mut observed = Self::from_stream(Observed {
            inner: self.inner,
            hook: Some(Box::new(hook)),
        });
        observed.remaining = remaining;
        observed
    }

    /// Run `action` when the stream ends or fails.
    pub fn do_on_end<F>(self, action: F) -> Self
    where
        F: FnOnce(Result<(), &StreamError>) + Send + 'static,
    {
        self.on_completion(move |completion| match completion {
            Completion::Ended => action(Ok(())),
            Completion::Failed(cause) => action(Err(cause)),
            Completion::Cancelled => {}
        })
    }

    /// Run `action` when the consumer drops the stream before it finished.
    pub fn do_on_cancel<F>(self, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.on_completion(move |completion| {
            if let Completion::Cancelled = completion {
                action()
            }
        })
    }
}

impl Default for ByteStream {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ByteStream")
    }
}

impl Stream for ByteStream {
    type Item = Result<Buffer, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_chunk(cx)
    }
}

impl Body for ByteStream {
    type Data = Bytes;
    type Error = StreamError;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, StreamError>>> {
        match self.get_mut().poll_chunk(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(Frame::data(chunk.into_bytes())))),
            Poll::Ready(Some(Err(cause))) => Poll::Ready(Some(Err(cause))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }

    fn is_end_stream(&self) -> bool {
        self.remaining == Some(0)
    }

    fn size_hint(&self) -> SizeHint {
        match self.remaining {
            Some(len) => SizeHint::with_exact(len),
            None => SizeHint::default(),
        }
    }
}

struct Observed {
    inner: Inner,
    hook: Option<CompletionHook>,
}

impl Stream for Observed {
    type Item = Result<Buffer, StreamError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.hook.is_none() {
            // Finished already; the producer must not be polled past its end.
            return Poll::Ready(None);
        }
        match this.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(cause))) => {
                if let Some(hook) = this.hook.take() {
                    hook(Completion::Failed(&cause));
                }
                Poll::Ready(Some(Err(cause)))
            }
            Poll::Ready(None) => {
                if let Some(hook) = this.hook.take() {
                    hook(Completion::Ended);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Observed {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook(Completion::Cancelled);
        }
    }
}

/// Producer half of [`ByteStream::channel`]. Dropping it ends the stream.
#[derive(Debug, Clone)]
pub struct BodySender {
    tx: mpsc::Sender<Result<Buffer, StreamError>>,
}

impl BodySender {
    /// Push a chunk, waiting for capacity. Gives the chunk back if the
    /// consumer is gone.
    pub async fn send(&self, chunk: Buffer) -> Result<(), Buffer> {
        self.tx.send(Ok(chunk)).await.map_err(|rejected| match rejected.0 {
            Ok(chunk) => chunk,
            Err(_) => Buffer::new(Bytes::new()),
        })
    }

    /// Terminate the stream with an error.
    pub async fn fail(self, cause: impl Into<BoxError>) {
        let _ = self.tx.send(Err(StreamError::new(cause))).await;
    }

    /// True once the consumer has dropped the stream.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
