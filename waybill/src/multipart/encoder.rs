//! `multipart/form-data` encoder.
//!
//! Output always uses CRLF line endings, whatever the input was decoded from.

use async_stream::try_stream;
use bytes::Bytes;
use futures::StreamExt;

use super::Part;
use crate::body::Body;

/// Encode parts into a `multipart/form-data` body using `boundary`.
///
/// Parts are written strictly in order; each part body is drained before the
/// next part header is emitted. Zero parts encode as `--boundary--`.
pub fn encode(parts: Vec<Part>, boundary: &str) -> Body {
    let boundary = boundary.to_string();

    Body::from_stream(try_stream! {
        let mut first = true;
        for part in parts {
            let mut head = String::new();
            if !first {
                head.push_str("\r\n");
            }
            first = false;

            head.push_str(&format!("--{boundary}\r\n"));
            for field in &part.headers {
                head.push_str(&format!("{field}\r\n"));
            }
            head.push_str("\r\n");
            yield Bytes::from(head);

            let mut body = part.body.into_stream();
            while let Some(chunk) = body.next().await {
                yield chunk?;
            }
        }

        let closing = if first {
            format!("--{boundary}--")
        } else {
            format!("\r\n--{boundary}--")
        };
        yield Bytes::from(closing);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::{HeaderField, Multipart, MultipartLimits, TransferEncoding};
    use waybill_core::Error;

    #[tokio::test]
    async fn test_encode_wire_format() {
        let parts = vec![
            Part::text("title", "Hello"),
            Part::file("file", "a.txt", "text/plain", "Test-- file-- contents"),
        ];
        let encoded = encode(parts, "XyZ").text().await;
        assert_eq!(
            encoded,
            "--XyZ\r\n\
             content-disposition: form-data; name=\"title\"\r\n\
             \r\n\
             Hello\r\n\
             --XyZ\r\n\
             content-disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
             content-type: text/plain\r\n\
             \r\n\
             Test-- file-- contents\r\n\
             --XyZ--"
        );
    }

    #[tokio::test]
    async fn test_encode_zero_parts() {
        assert_eq!(encode(Vec::new(), "b").text().await, "--b--");
        let mut multipart = Multipart::new(encode(Vec::new(), "b"), "b", MultipartLimits::default());
        assert!(multipart.try_next_part().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_encode_then_decode() {
        let streamed = Body::from_stream(futures::stream::iter(vec![
            Ok::<_, Error>(Bytes::from_static(b"chunk one, ")),
            Ok(Bytes::from_static(b"chunk two")),
        ]));
        let parts = vec![
            Part::text("a", "1"),
            Part::file("doc", "notes.md", "text/markdown", streamed),
            Part::text("b", "aGk=")
                .with_header(HeaderField::ContentTransferEncoding(TransferEncoding::Base64)),
        ];
        let (boundary, body) = Body::encode_multipart(parts, None);
        let mut multipart = Multipart::new(body, &boundary, MultipartLimits::default());

        let a = multipart.next_part().await.unwrap();
        assert_eq!(a.name(), Some("a"));
        assert_eq!(a.body.text().await, "1");

        let doc = multipart.next_part().await.unwrap();
        assert_eq!(doc.filename(), Some("notes.md"));
        assert_eq!(doc.content_type(), Some("text/markdown"));
        assert_eq!(doc.body.text().await, "chunk one, chunk two");

        let b = multipart.next_part().await.unwrap();
        assert_eq!(b.decoded_bytes().await.unwrap(), Bytes::from_static(b"hi"));

        assert!(multipart.next_part().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_encode_propagates_body_errors() {
        let failing = Body::from_stream(futures::stream::iter(vec![Err::<Bytes, _>(
            Error::stream("disk read failed"),
        )]));
        let mut encoded = encode(vec![Part::file("f", "x.bin", "application/octet-stream", failing)], "b");

        let head = encoded.next().await.unwrap().unwrap();
        assert!(head.starts_with(b"--b\r\n"));
        assert!(encoded.next().await.unwrap().unwrap_err().is_stream());
    }
}
