//! Streaming `multipart/form-data` decoder.
//!
//! The decoder is a pull-based state machine. [`Multipart`] and the body of
//! the part currently being read share one reader behind an
//! `Arc<Mutex<_>>`; the lock is taken for the duration of a single poll and
//! never held across an await point. Input is only pulled from the
//! underlying body while someone polls, so unread parts keep the transport
//! paused.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, ready};

use bytes::{Buf, Bytes, BytesMut};
use futures::Stream;
use waybill_core::Error;

use super::{HeaderField, MultipartLimits, Part, parse_boundary};
use crate::body::{Body, BodyStream};

/// Line ending fixed by the first boundary line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LineEnding {
    Crlf,
    Lf,
}

impl LineEnding {
    fn as_bytes(self) -> &'static [u8] {
        match self {
            LineEnding::Crlf => b"\r\n",
            LineEnding::Lf => b"\n",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    /// Nothing read yet; the message must open with `--boundary`.
    Start,
    /// Reading the header block of the next part.
    Headers,
    /// Streaming the body of the current part.
    Body,
    /// A delimiter was consumed; `--` closes the message, a line ending opens a part.
    AfterDelimiter,
    Done,
}

struct Reader {
    stream: BodyStream,
    buffer: BytesMut,
    /// `--boundary`
    boundary: Bytes,
    /// Line ending followed by `--boundary`, known once the first line is read.
    delimiter: Bytes,
    line_ending: LineEnding,
    state: State,
    eof: bool,
    limits: MultipartLimits,
    /// Index of the part whose body is currently readable.
    part: usize,
    pending_headers: Vec<HeaderField>,
    header_bytes: usize,
}

impl Reader {
    fn new(stream: BodyStream, boundary: &str, limits: MultipartLimits) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            boundary: Bytes::from(format!("--{boundary}")),
            delimiter: Bytes::new(),
            line_ending: LineEnding::Crlf,
            state: State::Start,
            eof: false,
            limits,
            part: 0,
            pending_headers: Vec::new(),
            header_bytes: 0,
        }
    }

    fn boundary_name(&self) -> String {
        String::from_utf8_lossy(&self.boundary[2..]).into_owned()
    }

    /// Pull one chunk from the underlying stream into the buffer.
    fn poll_fill(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        match ready!(self.stream.as_mut().poll_next(cx)) {
            Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
            Some(Err(err)) => return Poll::Ready(Err(err)),
            None => self.eof = true,
        }
        Poll::Ready(Ok(()))
    }

    /// Wait until at least `len` bytes are buffered or the input ends.
    fn poll_buffered(&mut self, cx: &mut Context<'_>, len: usize) -> Poll<Result<(), Error>> {
        while self.buffer.len() < len && !self.eof {
            ready!(self.poll_fill(cx))?;
        }
        Poll::Ready(Ok(()))
    }

    fn poll_start(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        let opening = self.boundary.len();
        ready!(self.poll_buffered(cx, opening + 2))?;

        if !self.buffer.starts_with(&self.boundary) {
            return Poll::Ready(Err(Error::BoundaryMismatch {
                boundary: self.boundary_name(),
            }));
        }

        let rest = &self.buffer[opening..];
        let (line_ending, consumed) = if rest.starts_with(b"\r\n") {
            (LineEnding::Crlf, 2)
        } else if rest.starts_with(b"\n") {
            (LineEnding::Lf, 1)
        } else if rest.starts_with(b"--") {
            self.finish();
            return Poll::Ready(Ok(()));
        } else if rest.is_empty() {
            return Poll::Ready(Err(Error::Incomplete(
                "body ends after the opening boundary".into(),
            )));
        } else {
            return Poll::Ready(Err(Error::BoundaryMismatch {
                boundary: self.boundary_name(),
            }));
        };

        self.buffer.advance(opening + consumed);
        self.line_ending = line_ending;

        let mut delimiter = BytesMut::from(line_ending.as_bytes());
        delimiter.extend_from_slice(&self.boundary);
        self.delimiter = delimiter.freeze();

        tracing::trace!(target: "waybill", ?line_ending, "multipart opening boundary found");
        self.state = State::Headers;
        Poll::Ready(Ok(()))
    }

    fn poll_headers(&mut self, cx: &mut Context<'_>) -> Poll<Result<Vec<HeaderField>, Error>> {
        loop {
            let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') else {
                // An unterminated line still counts against the budget.
                self.limits
                    .check_header_size(self.header_bytes + self.buffer.len())?;
                if self.eof {
                    return Poll::Ready(Err(Error::MalformedHeaders(
                        "body ended before the end of part headers".into(),
                    )));
                }
                ready!(self.poll_fill(cx))?;
                continue;
            };

            let line = self.buffer.split_to(pos + 1);
            self.header_bytes += line.len();
            self.limits.check_header_size(self.header_bytes)?;

            let line = line.strip_suffix(b"\n").unwrap_or(&line[..]);
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                return Poll::Ready(self.take_headers());
            }

            let text = String::from_utf8_lossy(line);
            let Some(field) = HeaderField::parse_line(&text)? else {
                continue;
            };
            if matches!(field, HeaderField::ContentDisposition { .. })
                && self
                    .pending_headers
                    .iter()
                    .any(|f| matches!(f, HeaderField::ContentDisposition { .. }))
            {
                return Poll::Ready(Err(Error::MalformedHeaders(
                    "duplicate content-disposition header".into(),
                )));
            }
            self.pending_headers.push(field);
        }
    }

    fn take_headers(&mut self) -> Result<Vec<HeaderField>, Error> {
        self.header_bytes = 0;
        let headers = std::mem::take(&mut self.pending_headers);
        if !headers
            .iter()
            .any(|f| matches!(f, HeaderField::ContentDisposition { .. }))
        {
            return Err(Error::MalformedHeaders(
                "part has no content-disposition header".into(),
            ));
        }
        Ok(headers)
    }

    /// Yield the next slice of the current part body.
    ///
    /// Everything except a lookback window one byte shorter than the
    /// delimiter is released as soon as it arrives.
    fn poll_body(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, Error>>> {
        loop {
            if self.state != State::Body {
                return Poll::Ready(None);
            }

            if let Some(pos) = find(&self.buffer, &self.delimiter) {
                let chunk = self.buffer.split_to(pos).freeze();
                self.buffer.advance(self.delimiter.len());
                self.state = State::AfterDelimiter;
                if chunk.is_empty() {
                    return Poll::Ready(None);
                }
                return Poll::Ready(Some(Ok(chunk)));
            }

            let lookback = self.delimiter.len() - 1;
            if self.buffer.len() > lookback {
                let chunk = self.buffer.split_to(self.buffer.len() - lookback).freeze();
                return Poll::Ready(Some(Ok(chunk)));
            }

            if self.eof {
                return Poll::Ready(Some(Err(Error::Incomplete(format!(
                    "missing closing boundary `{}--`",
                    String::from_utf8_lossy(&self.boundary)
                )))));
            }
            ready!(self.poll_fill(cx))?;
        }
    }

    fn poll_after_delimiter(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        ready!(self.poll_buffered(cx, 2))?;

        if self.buffer.starts_with(b"--") {
            self.finish();
        } else if self.buffer.starts_with(self.line_ending.as_bytes()) {
            self.buffer.advance(self.line_ending.as_bytes().len());
            self.state = State::Headers;
        } else if self.eof && self.buffer.is_empty() {
            // Closing `--` missing after the last delimiter.
            self.finish();
        } else {
            return Poll::Ready(Err(Error::MalformedHeaders(
                "unexpected data after boundary delimiter".into(),
            )));
        }
        Poll::Ready(Ok(()))
    }

    fn poll_next_headers(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Vec<HeaderField>>, Error>> {
        loop {
            match self.state {
                State::Start => ready!(self.poll_start(cx))?,
                State::Body => match ready!(self.poll_body(cx)) {
                    // Remainder of a part the caller did not drain.
                    Some(Ok(_)) => {}
                    Some(Err(err)) => return Poll::Ready(Err(err)),
                    None => {}
                },
                State::AfterDelimiter => ready!(self.poll_after_delimiter(cx))?,
                State::Headers => {
                    let headers = ready!(self.poll_headers(cx))?;
                    self.state = State::Body;
                    self.part += 1;
                    return Poll::Ready(Ok(Some(headers)));
                }
                State::Done => return Poll::Ready(Ok(None)),
            }
        }
    }

    fn poll_next_part(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Vec<HeaderField>>, Error>> {
        let result = ready!(self.poll_next_headers(cx));
        if result.is_err() {
            self.finish();
        }
        Poll::Ready(result)
    }

    fn poll_part_body(
        &mut self,
        cx: &mut Context<'_>,
        part: usize,
    ) -> Poll<Option<Result<Bytes, Error>>> {
        if self.part != part {
            return Poll::Ready(None);
        }
        let item = ready!(self.poll_body(cx));
        if matches!(item, Some(Err(_))) {
            self.finish();
        }
        Poll::Ready(item)
    }

    fn finish(&mut self) {
        self.state = State::Done;
        self.buffer.clear();
        self.pending_headers.clear();
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

type Shared = Arc<Mutex<Reader>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Reader> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Body of a decoded part, reading directly from the shared decoder.
///
/// Ends early once the decoder has moved on to a later part.
struct PartStream {
    shared: Shared,
    part: usize,
}

impl Stream for PartStream {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let part = self.part;
        lock(&self.shared).poll_part_body(cx, part)
    }
}

/// Lazy decoder over a `multipart/form-data` body.
///
/// ```
/// use waybill::Body;
/// use waybill::multipart::{Multipart, MultipartLimits, Part};
///
/// # futures::executor::block_on(async {
/// let (boundary, body) = Body::encode_multipart(vec![Part::text("title", "hi")], None);
/// let mut multipart = Multipart::new(body, &boundary, MultipartLimits::default());
///
/// let part = multipart.next_part().await.unwrap();
/// assert_eq!(part.name(), Some("title"));
/// assert_eq!(part.body.text().await, "hi");
///
/// assert!(multipart.next_part().await.unwrap().is_empty());
/// # });
/// ```
pub struct Multipart {
    shared: Shared,
}

impl Multipart {
    /// Decode `body` using the given boundary (without the leading `--`).
    pub fn new(body: Body, boundary: &str, limits: MultipartLimits) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Reader::new(body.into_stream(), boundary, limits))),
        }
    }

    /// Decode `body` according to its `content-type`.
    ///
    /// Anything other than `multipart/*` with a boundary yields a decoder
    /// without parts.
    pub fn from_content_type(body: Body, content_type: Option<&str>, limits: MultipartLimits) -> Self {
        match content_type.and_then(parse_boundary) {
            Some(boundary) => Self::new(body, &boundary, limits),
            None => {
                tracing::debug!(
                    target: "waybill",
                    content_type = content_type.unwrap_or_default(),
                    "not a multipart content type, decoder has no parts"
                );
                Self::empty()
            }
        }
    }

    /// A decoder that produces no parts.
    pub fn empty() -> Self {
        let mut reader = Reader::new(Body::Empty.into_stream(), "", MultipartLimits::default());
        reader.finish();
        Self {
            shared: Arc::new(Mutex::new(reader)),
        }
    }

    /// Read the next part, or `None` once the closing boundary was reached.
    ///
    /// The body of the previously returned part is discarded if it was not
    /// fully read.
    ///
    /// # Errors
    ///
    /// Returns the first decoding or transport error; the decoder yields no
    /// further parts afterwards.
    pub async fn try_next_part(&mut self) -> Result<Option<Part>, Error> {
        let headers =
            futures::future::poll_fn(|cx| lock(&self.shared).poll_next_part(cx)).await?;

        let Some(headers) = headers else {
            tracing::debug!(target: "waybill", "multipart message finished");
            return Ok(None);
        };

        let index = lock(&self.shared).part;
        let body = Body::from_stream(PartStream {
            shared: Arc::clone(&self.shared),
            part: index,
        });
        let part = Part::new(headers, body);
        tracing::debug!(
            target: "waybill",
            index,
            name = part.name().unwrap_or_default(),
            filename = part.filename(),
            "multipart part started"
        );
        Ok(Some(part))
    }

    /// Read the next part.
    ///
    /// Past the last part this returns an empty part (no headers, empty
    /// body) instead of failing.
    ///
    /// # Errors
    ///
    /// Same as [`Multipart::try_next_part`].
    pub async fn next_part(&mut self) -> Result<Part, Error> {
        Ok(self.try_next_part().await?.unwrap_or_default())
    }

    /// Consume the decoder as a stream of parts.
    ///
    /// The stream ends after the closing boundary or after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Part, Error>> + Send {
        futures::stream::unfold(Some(self), |state| async move {
            let mut multipart = state?;
            match multipart.try_next_part().await {
                Ok(Some(part)) => Some((Ok(part), Some(multipart))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    /// Collect every non-file field into a map, last value winning.
    ///
    /// File parts are skipped without being buffered.
    ///
    /// # Errors
    ///
    /// Returns the first decoding error.
    pub async fn text_fields(mut self) -> Result<HashMap<String, String>, Error> {
        let mut fields = HashMap::new();
        while let Some(part) = self.try_next_part().await? {
            if part.is_file() {
                continue;
            }
            let Some(name) = part.name().map(str::to_string) else {
                continue;
            };
            let value = part.decoded_bytes().await?;
            fields.insert(name, String::from_utf8_lossy(&value).into_owned());
        }
        Ok(fields)
    }
}

impl std::fmt::Debug for Multipart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reader = lock(&self.shared);
        f.debug_struct("Multipart")
            .field("state", &reader.state)
            .field("part", &reader.part)
            .finish()
    }
}
