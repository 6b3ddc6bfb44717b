//! Request and response messages.
//!
//! These are transport-neutral: [`Request::from_http`] adapts any
//! `http::Request` whose body implements [`http_body::Body`], and
//! [`Response::into_http`] produces an `http::Response` that hyper or axum
//! can serve directly.

use std::collections::HashMap;
use std::fmt;

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde::Serialize;
use waybill_core::{Error, Uri, query};

use crate::body::Body;
use crate::multipart::{Multipart, MultipartLimits};

/// An incoming request.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Convert an `http::Request`, wrapping its body as a stream.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUri`] if the request target cannot be parsed.
    pub fn from_http<B>(request: http::Request<B>) -> Result<Self, Error>
    where
        B: http_body::Body + Send + 'static,
        B::Error: fmt::Display,
    {
        let (parts, body) = request.into_parts();
        Ok(Self {
            method: parts.method,
            uri: Uri::try_from(&parts.uri)?,
            headers: parts.headers,
            body: Body::from_http_body(body),
        })
    }

    /// Look up a header value by case-insensitive name.
    ///
    /// Values that are not visible ASCII are treated as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header(CONTENT_TYPE.as_str())
    }

    /// Request path, `/` when the URI has none.
    pub fn path(&self) -> &str {
        self.uri.path_or_root()
    }

    /// Parsed query string.
    pub fn query(&self) -> HashMap<String, String> {
        self.uri.query_str().map(query::parse).unwrap_or_default()
    }

    /// Take the body and decode it as multipart.
    ///
    /// Only a `multipart/*` content type with a boundary activates decoding;
    /// any other request yields a decoder without parts. The request body is
    /// left empty.
    pub fn multipart(&mut self, limits: MultipartLimits) -> Multipart {
        let body = std::mem::take(&mut self.body);
        Multipart::from_content_type(body, self.content_type(), limits)
    }
}

/// Reason phrase attached to an outgoing `http::Response` as an extension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusText(pub String);

/// An outgoing response.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    /// Custom reason phrase; the canonical one is used when `None`.
    pub status_text: Option<String>,
    pub headers: HeaderMap,
    pub body: Body,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            status_text: None,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }
}

impl Response {
    /// A `200 OK` response with the given body.
    pub fn new(body: impl Into<Body>) -> Self {
        Self {
            body: body.into(),
            ..Default::default()
        }
    }

    /// A `text/plain` response.
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(Body::Text(text.into())).with_header(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )
    }

    /// An `application/json` response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if `value` cannot be represented as JSON.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, Error> {
        Ok(Self::new(Body::json_value(value)?)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json")))
    }

    /// A plain `404 Not Found` response.
    pub fn not_found() -> Self {
        Self::text("Not Found").with_status(StatusCode::NOT_FOUND)
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_status_text(mut self, text: impl Into<String>) -> Self {
        self.status_text = Some(text.into());
        self
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Convert into an `http::Response`.
    ///
    /// A body of known length sets `content-length` unless one is present;
    /// streams leave framing to the transport.
    pub fn into_http(self) -> http::Response<Body> {
        let Response {
            status,
            status_text,
            mut headers,
            body,
        } = self;

        if let Some(len) = body.exact_len() {
            headers
                .entry(CONTENT_LENGTH)
                .or_insert_with(|| HeaderValue::from(len));
        }

        let mut response = http::Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        if let Some(text) = status_text {
            response.extensions_mut().insert(StatusText(text));
        }
        response
    }
}

impl From<Response> for http::Response<Body> {
    fn from(response: Response) -> Self {
        response.into_http()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multipart::Part;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = Request::new(Method::GET, Uri::parse("/").unwrap())
            .with_header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert_eq!(request.header("Content-Type"), Some("text/plain"));
        assert_eq!(request.content_type(), Some("text/plain"));
        assert_eq!(request.header("x-missing"), None);
    }

    #[test]
    fn test_path_and_query() {
        let request = Request::new(Method::GET, Uri::parse("?q=a+b").unwrap());
        assert_eq!(request.path(), "/");
        assert_eq!(request.query()["q"], "a b");
    }

    #[tokio::test]
    async fn test_from_http() {
        let http_request = http::Request::builder()
            .method(Method::POST)
            .uri("/upload?x=1")
            .header("x-trace", "abc")
            .body(http_body_util::Full::new(bytes::Bytes::from_static(b"payload")))
            .unwrap();

        let request = Request::from_http(http_request).unwrap();
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.path(), "/upload");
        assert_eq!(request.header("X-Trace"), Some("abc"));
        assert_eq!(request.body.text().await, "payload");
    }

    #[tokio::test]
    async fn test_request_multipart() {
        let (boundary, body) = Body::encode_multipart(vec![Part::text("a", "1")], None);
        let content_type = crate::multipart::content_type(&boundary);
        let mut request = Request::new(Method::POST, Uri::parse("/upload").unwrap())
            .with_header(CONTENT_TYPE, HeaderValue::from_str(&content_type).unwrap())
            .with_body(body);

        let fields = request
            .multipart(MultipartLimits::default())
            .text_fields()
            .await
            .unwrap();
        assert_eq!(fields["a"], "1");
        assert!(request.body.is_empty());
    }

    #[tokio::test]
    async fn test_request_multipart_requires_multipart_content_type() {
        let mut request = Request::new(Method::POST, Uri::parse("/upload").unwrap())
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body("{}");
        let mut multipart = request.multipart(MultipartLimits::default());
        assert!(multipart.next_part().await.unwrap().is_empty());
    }

    #[test]
    fn test_response_builders() {
        let response = Response::not_found();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers.get(CONTENT_TYPE).unwrap(),
            "text/plain; charset=utf-8"
        );

        let response = Response::json(&serde_json::json!({"ok": true})).unwrap();
        assert_eq!(response.headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert!(matches!(response.body, Body::Structured(_)));
    }

    #[tokio::test]
    async fn test_into_http() {
        let response = Response::text("hello")
            .with_status(StatusCode::CREATED)
            .with_status_text("Made It");
        let http_response = response.into_http();

        assert_eq!(http_response.status(), StatusCode::CREATED);
        assert_eq!(http_response.headers().get(CONTENT_LENGTH).unwrap(), "5");
        assert_eq!(
            http_response.extensions().get::<StatusText>(),
            Some(&StatusText("Made It".into()))
        );
        assert_eq!(http_response.into_body().text().await, "hello");
    }

    #[test]
    fn test_into_http_stream_has_no_length() {
        let response = Response::new(Body::from("streamed").wrap());
        let http_response: http::Response<Body> = response.into();
        assert!(http_response.headers().get(CONTENT_LENGTH).is_none());
    }
}
