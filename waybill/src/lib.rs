//! # Waybill
//!
//! Building blocks for handling HTTP messages without committing to a
//! framework.
//!
//! ## Features
//!
//! - **Unified bodies:** [`Body`] holds text, bytes, a lazy stream or a JSON
//!   value. Reading as bytes or text never fails; JSON decoding reports
//!   malformed input.
//! - **Streaming multipart:** [`multipart::Multipart`] decodes
//!   `multipart/form-data` part by part with bounded memory, and
//!   [`multipart::encode`] writes it back out.
//! - **Declarative routing:** [`router::Router`] matches method, path
//!   template, mandatory query keys and headers, then extracts path,
//!   wildcard and query variables for the handler.
//! - **Transport interop:** `Body` implements [`http_body::Body`], and
//!   [`Request::from_http`] / [`Response::into_http`] convert to and from
//!   the `http` crate types used by hyper and axum.
//!
//! The URI parser and query-string codec live in `waybill-core` and are
//! re-exported here.

pub mod body;
pub mod message;
pub mod multipart;
pub mod router;

pub use body::{Body, BodyStream};
pub use message::{Request, Response, StatusText};
pub use waybill_core::{Error, Uri, query};

// Re-export several crates
pub use bytes;
pub use futures;
pub use http;

pub mod prelude {
    //! A prelude for `waybill` providing the most common types.
    pub use crate::body::Body;
    pub use crate::message::{Request, Response};
    pub use crate::multipart::{Multipart, MultipartLimits, Part};
    pub use crate::router::{Route, RouteMatch, Router};
    pub use waybill_core::{Error, Uri};
}
