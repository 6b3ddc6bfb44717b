//! Streaming `multipart/form-data` codec.
//!
//! Decoding is lazy: [`Multipart`] pulls parts one at a time and each
//! [`Part`] body streams straight from the underlying message. Encoding with
//! [`encode`] is the inverse and always emits CRLF line endings.
//!
//! ```
//! use waybill::multipart;
//!
//! assert_eq!(
//!     multipart::parse_boundary("multipart/form-data; boundary=\"abc\"").as_deref(),
//!     Some("abc")
//! );
//! assert_eq!(multipart::content_type("abc"), "multipart/form-data; boundary=abc");
//! ```

mod decoder;
mod encoder;
pub mod header;
pub mod limits;
mod part;

pub use decoder::Multipart;
pub use encoder::encode;
pub use header::{HeaderField, TransferEncoding};
pub use limits::{DEFAULT_MAX_HEADER_SIZE, MultipartLimits};
pub use part::Part;

use rand::Rng;
use rand::distr::Alphanumeric;

const BOUNDARY_PREFIX: &str = "----WaybillFormBoundary";

/// Generate a boundary from the given random source.
pub fn generate_boundary<R: Rng>(rng: &mut R) -> String {
    let suffix: String = (0..16)
        .map(|_| char::from(rng.sample::<u8, _>(Alphanumeric)))
        .collect();
    format!("{BOUNDARY_PREFIX}{suffix}")
}

/// Generate a boundary from the thread-local random source.
pub fn random_boundary() -> String {
    generate_boundary(&mut rand::rng())
}

/// Extract the boundary from a `multipart/*` content type.
///
/// Returns `None` for other media types or when the boundary parameter is
/// missing or empty. Quoted boundaries are unquoted.
pub fn parse_boundary(content_type: &str) -> Option<String> {
    let mut params = content_type.split(';');

    let media_type = params.next()?.trim();
    if !media_type
        .get(..10)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("multipart/"))
    {
        return None;
    }

    params
        .filter_map(|param| param.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|boundary| !boundary.is_empty())
}

/// Build the `content-type` value announcing `boundary`.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={boundary}")
}
