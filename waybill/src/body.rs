//! Message body types.
//!
//! This module provides [`Body`], a unified HTTP message body that can hold
//! text, raw bytes, a lazily produced byte stream, or a structured JSON value.
//! Every variant can be coerced into bytes or text; only JSON decoding can fail.
//!
//! `Body` implements both [`futures::Stream`] and [`http_body::Body`], so it can
//! be handed to hyper or axum as-is, and any transport body can be wrapped with
//! [`Body::from_http_body`].

use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes, BytesMut};
use futures::{Stream, StreamExt};
use http_body::Frame;
use pin_project_lite::pin_project;
use serde::Serialize;
use serde::de::DeserializeOwned;
use waybill_core::{Error, query};

use crate::multipart::{self, Part};

/// A lazily produced sequence of byte chunks.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// An HTTP message body.
///
/// Consuming operations take `self`, so a [`Body::Stream`] is read at most once.
#[derive(Default)]
pub enum Body {
    /// No content.
    #[default]
    Empty,
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
    /// Chunks produced on demand.
    Stream(BodyStream),
    /// A JSON value, serialized on demand.
    Structured(serde_json::Value),
}

impl Body {
    /// Create an empty body.
    pub fn empty() -> Self {
        Body::Empty
    }

    /// Create a streaming body from the given stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, Error>> + Send + 'static,
    {
        Body::Stream(Box::pin(stream))
    }

    /// Wrap a transport body (hyper, axum, `http_body_util::Full`, ...).
    ///
    /// Data frames become chunks, trailers are dropped and transport errors
    /// surface as [`Error::Stream`].
    pub fn from_http_body<B>(body: B) -> Self
    where
        B: http_body::Body + Send + 'static,
        B::Error: fmt::Display,
    {
        Body::from_stream(HttpBodyStream { body })
    }

    /// Serialize any value into a [`Body::Structured`].
    pub fn json_value<T: Serialize>(value: &T) -> Result<Self, Error> {
        Ok(Body::Structured(serde_json::to_value(value)?))
    }

    /// Encode parts as a `multipart/form-data` stream.
    ///
    /// Returns the boundary actually used (the given one, or a random one)
    /// together with the encoded body.
    pub fn encode_multipart(parts: Vec<Part>, boundary: Option<&str>) -> (String, Body) {
        let boundary = boundary
            .map(str::to_string)
            .unwrap_or_else(multipart::random_boundary);
        let body = multipart::encode(parts, &boundary);
        (boundary, body)
    }

    /// Returns `true` when the body is known to carry no bytes.
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Empty => true,
            Body::Text(text) => text.is_empty(),
            Body::Bytes(bytes) => bytes.is_empty(),
            Body::Stream(_) | Body::Structured(_) => false,
        }
    }

    /// Exact length in bytes, when known without draining the body.
    pub fn exact_len(&self) -> Option<u64> {
        match self {
            Body::Empty => Some(0),
            Body::Text(text) => Some(text.len() as u64),
            Body::Bytes(bytes) => Some(bytes.len() as u64),
            Body::Stream(_) | Body::Structured(_) => None,
        }
    }

    /// Drain the body into a single buffer.
    ///
    /// A stream that fails midway (aborted or destroyed transport) yields an
    /// empty buffer and a warning; the failure has already been reported
    /// through the transport.
    pub async fn bytes(self) -> Bytes {
        match self.into_full() {
            Ok(bytes) => bytes,
            Err(stream) => drain(stream).await,
        }
    }

    /// Drain the body and decode it as UTF-8, replacing invalid sequences.
    pub async fn text(self) -> String {
        match self {
            Body::Text(text) => text,
            other => {
                let bytes = other.bytes().await;
                String::from_utf8_lossy(&bytes).into_owned()
            }
        }
    }

    /// Drain the body and decode it as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] on malformed JSON, including an empty body.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, Error> {
        match self {
            Body::Structured(value) => Ok(serde_json::from_value(value)?),
            other => {
                let bytes = other.bytes().await;
                Ok(serde_json::from_slice(&bytes)?)
            }
        }
    }

    /// Drain the body and decode it as `application/x-www-form-urlencoded`.
    pub async fn form(self) -> HashMap<String, String> {
        query::parse(&self.text().await)
    }

    /// Normalize any variant into a [`Body::Stream`]. A stream is returned unchanged.
    pub fn wrap(self) -> Body {
        Body::Stream(self.into_stream())
    }

    /// Normalize any variant into a [`BodyStream`].
    pub fn into_stream(self) -> BodyStream {
        match self.into_full() {
            Ok(bytes) if bytes.is_empty() => Box::pin(futures::stream::empty()),
            Ok(bytes) => Box::pin(futures::stream::iter([Ok(bytes)])),
            Err(stream) => stream,
        }
    }

    /// Materialize non-streaming variants; hand streams back untouched.
    fn into_full(self) -> Result<Bytes, BodyStream> {
        match self {
            Body::Empty => Ok(Bytes::new()),
            Body::Text(text) => Ok(Bytes::from(text)),
            Body::Bytes(bytes) => Ok(bytes),
            // Serializing a `Value` cannot fail: its map keys are always strings.
            Body::Structured(value) => Ok(serde_json::to_vec(&value)
                .map(Bytes::from)
                .unwrap_or_default()),
            Body::Stream(stream) => Err(stream),
        }
    }
}

async fn drain(mut stream: BodyStream) -> Bytes {
    let mut buffer = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(chunk) => buffer.extend_from_slice(&chunk),
            Err(err) => {
                tracing::warn!(
                    target: "waybill",
                    error = %err,
                    "body stream failed while reading, returning empty body"
                );
                return Bytes::new();
            }
        }
    }
    buffer.freeze()
}

impl Stream for Body {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Body::Stream(stream) = this {
            return stream.as_mut().poll_next(cx);
        }

        match std::mem::take(this).into_full() {
            Ok(bytes) if bytes.is_empty() => Poll::Ready(None),
            Ok(bytes) => Poll::Ready(Some(Ok(bytes))),
            Err(stream) => {
                *this = Body::Stream(stream);
                Poll::Ready(None)
            }
        }
    }
}

impl http_body::Body for Body {
    type Data = Bytes;
    type Error = Error;

    fn poll_frame(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        self.poll_next(cx)
            .map(|item| item.map(|chunk| chunk.map(Frame::data)))
    }

    fn is_end_stream(&self) -> bool {
        match self {
            Body::Stream(_) => false, // Can't know without polling
            other => other.is_empty(),
        }
    }

    fn size_hint(&self) -> http_body::SizeHint {
        match self.exact_len() {
            Some(len) => http_body::SizeHint::with_exact(len),
            None => http_body::SizeHint::default(),
        }
    }
}

pin_project! {
    /// Adapts an [`http_body::Body`] into a chunk stream.
    struct HttpBodyStream<B> {
        #[pin]
        body: B,
    }
}

impl<B> Stream for HttpBodyStream<B>
where
    B: http_body::Body,
    B::Error: fmt::Display,
{
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        loop {
            match ready!(this.body.as_mut().poll_frame(cx)) {
                Some(Ok(frame)) => {
                    // Trailers carry no body bytes.
                    if let Ok(mut data) = frame.into_data() {
                        let chunk = data.copy_to_bytes(data.remaining());
                        return Poll::Ready(Some(Ok(chunk)));
                    }
                }
                Some(Err(err)) => return Poll::Ready(Some(Err(Error::stream(err)))),
                None => return Poll::Ready(None),
            }
        }
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Self {
        Body::Empty
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static [u8]> for Body {
    fn from(bytes: &'static [u8]) -> Self {
        Body::Bytes(Bytes::from_static(bytes))
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Body::Bytes(bytes)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Structured(value)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Body::Empty => write!(f, "Body::Empty"),
            Body::Text(text) => f
                .debug_struct("Body::Text")
                .field("len", &text.len())
                .finish(),
            Body::Bytes(bytes) => f
                .debug_struct("Body::Bytes")
                .field("len", &bytes.len())
                .finish(),
            Body::Stream(_) => write!(f, "Body::Stream"),
            Body::Structured(value) => f.debug_tuple("Body::Structured").field(value).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde::Deserialize;

    fn chunked(chunks: &[&'static str]) -> Body {
        let items: Vec<Result<Bytes, Error>> = chunks
            .iter()
            .copied()
            .map(|c| Ok(Bytes::from_static(c.as_bytes())))
            .collect();
        Body::from_stream(futures::stream::iter(items))
    }

    #[tokio::test]
    async fn test_empty_body() {
        assert!(Body::empty().is_empty());
        assert!(Body::empty().bytes().await.is_empty());
        assert_eq!(Body::from(()).text().await, "");
    }

    #[tokio::test]
    async fn test_text_concatenates_chunks_in_order() {
        let body = chunked(&["chunk1", "chunk2", "chunk3"]);
        assert_eq!(body.text().await, "chunk1chunk2chunk3");
    }

    #[tokio::test]
    async fn test_structured_bytes_are_json() {
        let body = Body::from(serde_json::json!({"a": 1}));
        assert_eq!(body.bytes().await, Bytes::from_static(br#"{"a":1}"#));
    }

    #[tokio::test]
    async fn test_json_from_text() {
        #[derive(Deserialize, Debug, PartialEq)]
        struct Pet {
            name: String,
        }

        let pet: Pet = Body::from(r#"{"name":"rex"}"#).json().await.unwrap();
        assert_eq!(pet.name, "rex");

        let pet: Pet = Body::json_value(&serde_json::json!({"name": "tom"}))
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(pet.name, "tom");
    }

    #[tokio::test]
    async fn test_json_malformed_rejects() {
        let result = Body::from("{malformed").json::<serde_json::Value>().await;
        assert!(matches!(result, Err(Error::Parse(_))));

        let result = Body::empty().json::<serde_json::Value>().await;
        assert!(matches!(result, Err(Error::Parse(_))));
    }

    #[tokio::test]
    async fn test_aborted_stream_reads_empty() {
        let items: Vec<Result<Bytes, Error>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(Error::stream("connection reset")),
        ];
        let body = Body::from_stream(futures::stream::iter(items));
        assert_eq!(body.text().await, "");
    }

    #[tokio::test]
    async fn test_form() {
        let form = Body::from("name=J%C3%BCrgen+M&age=42").form().await;
        assert_eq!(form["name"], "Jürgen M");
        assert_eq!(form["age"], "42");
    }

    #[tokio::test]
    async fn test_wrap_is_idempotent() {
        let wrapped = Body::from("hello").wrap();
        assert!(matches!(wrapped, Body::Stream(_)));

        let rewrapped = wrapped.wrap();
        assert!(matches!(rewrapped, Body::Stream(_)));
        assert_eq!(rewrapped.text().await, "hello");
    }

    #[tokio::test]
    async fn test_http_body_collect() {
        let mut body = Body::from(Bytes::from_static(b"hello world"));
        assert_eq!(http_body::Body::size_hint(&body).exact(), Some(11));

        let collected = BodyExt::collect(Pin::new(&mut body)).await.unwrap();
        assert_eq!(collected.to_bytes(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_from_http_body() {
        let full = http_body_util::Full::new(Bytes::from_static(b"from transport"));
        let body = Body::from_http_body(full);
        assert_eq!(body.text().await, "from transport");
    }

    #[tokio::test]
    async fn test_stream_yields_once_for_full_bodies() {
        let mut body = Body::from("once");
        assert_eq!(body.next().await.unwrap().unwrap(), Bytes::from_static(b"once"));
        assert!(body.next().await.is_none());
        assert!(body.is_empty());
    }
}
