//! A single part of a multipart message.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use waybill_core::Error;

use super::{HeaderField, TransferEncoding};
use crate::body::Body;

/// One part of a `multipart/form-data` message.
///
/// Decoded parts carry a streaming body that reads straight from the
/// underlying message; it must be consumed before asking the decoder for the
/// next part or the remainder is discarded.
#[derive(Debug, Default)]
pub struct Part {
    /// Header fields in wire order.
    pub headers: Vec<HeaderField>,
    /// Part content.
    pub body: Body,
}

impl Part {
    /// Create a part from raw header fields and a body.
    pub fn new(headers: Vec<HeaderField>, body: impl Into<Body>) -> Self {
        Self {
            headers,
            body: body.into(),
        }
    }

    /// The part returned when reading past the last part: no headers, empty body.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a plain form field.
    pub fn text<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self::new(vec![HeaderField::disposition(name)], Body::Text(value.into()))
    }

    /// Create a file field with the given content type.
    pub fn file<N, F, C>(name: N, filename: F, content_type: C, body: impl Into<Body>) -> Self
    where
        N: Into<String>,
        F: Into<String>,
        C: Into<String>,
    {
        Self::new(
            vec![
                HeaderField::file_disposition(name, filename),
                HeaderField::ContentType(content_type.into()),
            ],
            body,
        )
    }

    /// Add a header field.
    pub fn with_header(mut self, field: HeaderField) -> Self {
        self.headers.push(field);
        self
    }

    /// Returns `true` for the placeholder part produced past the end of a message.
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.body.is_empty()
    }

    /// Field name from the content-disposition header.
    pub fn name(&self) -> Option<&str> {
        self.headers.iter().find_map(|field| match field {
            HeaderField::ContentDisposition { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }

    /// File name from the content-disposition header, if this is a file field.
    pub fn filename(&self) -> Option<&str> {
        self.headers.iter().find_map(|field| match field {
            HeaderField::ContentDisposition { filename, .. } => filename.as_deref(),
            _ => None,
        })
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.iter().find_map(|field| match field {
            HeaderField::ContentType(value) => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn transfer_encoding(&self) -> Option<TransferEncoding> {
        self.headers.iter().find_map(|field| match field {
            HeaderField::ContentTransferEncoding(encoding) => Some(*encoding),
            _ => None,
        })
    }

    pub fn is_file(&self) -> bool {
        self.filename().is_some()
    }

    /// Consume the part and return its body.
    pub fn into_body(self) -> Body {
        self.body
    }

    /// Drain the body, undoing any base64 transfer encoding.
    ///
    /// Unlike [`Body::bytes`], a truncated or failing stream is reported.
    ///
    /// # Errors
    ///
    /// Returns the decoder error that interrupted the body, or
    /// [`Error::Parse`] when base64 content is invalid.
    pub async fn decoded_bytes(self) -> Result<Bytes, Error> {
        let encoding = self.transfer_encoding();

        let mut stream = self.body.into_stream();
        let mut raw = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            raw.extend_from_slice(&chunk?);
        }

        match encoding {
            Some(TransferEncoding::Base64) => {
                let compact: Vec<u8> = raw
                    .iter()
                    .copied()
                    .filter(|b| !b.is_ascii_whitespace())
                    .collect();
                STANDARD
                    .decode(compact)
                    .map(Bytes::from)
                    .map_err(|e| Error::Parse(format!("invalid base64 part body: {e}")))
            }
            _ => Ok(raw.freeze()),
        }
    }
}
