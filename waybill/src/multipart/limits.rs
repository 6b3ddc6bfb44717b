//! Size limits for multipart decoding.
//!
//! Part headers are buffered in memory until their terminating blank line,
//! so their size is capped. Part bodies are streamed and never buffered.

use waybill_core::Error;

/// Default budget for the headers of a single part (2 KiB).
pub const DEFAULT_MAX_HEADER_SIZE: usize = 2048;

/// Configuration for multipart decoding limits.
///
/// # Example
///
/// ```rust
/// use waybill::multipart::MultipartLimits;
///
/// // Default 2 KiB header budget
/// let limits = MultipartLimits::default();
///
/// // Tight budget for small form posts
/// let limits = MultipartLimits::new(256);
/// assert_eq!(limits.max_header_size(), 256);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MultipartLimits {
    max_header_size: usize,
}

impl Default for MultipartLimits {
    fn default() -> Self {
        Self {
            max_header_size: DEFAULT_MAX_HEADER_SIZE,
        }
    }
}

impl MultipartLimits {
    /// Create limits with the given per-part header budget in bytes.
    pub fn new(max_header_size: usize) -> Self {
        Self { max_header_size }
    }

    /// Set the per-part header budget in bytes.
    pub fn max_header_size_of(mut self, max_header_size: usize) -> Self {
        self.max_header_size = max_header_size;
        self
    }

    /// Returns the per-part header budget in bytes.
    pub fn max_header_size(&self) -> usize {
        self.max_header_size
    }

    /// Check the number of header bytes read so far for one part.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MaxHeaderSizeExceeded`] once `size` exceeds the budget.
    pub fn check_header_size(&self, size: usize) -> Result<(), Error> {
        if size > self.max_header_size {
            return Err(Error::MaxHeaderSizeExceeded {
                limit: self.max_header_size,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = MultipartLimits::default();
        assert_eq!(limits.max_header_size(), DEFAULT_MAX_HEADER_SIZE);
    }

    #[test]
    fn test_custom_limits() {
        assert_eq!(MultipartLimits::new(64).max_header_size(), 64);
        assert_eq!(
            MultipartLimits::default()
                .max_header_size_of(10)
                .max_header_size(),
            10
        );
    }

    #[test]
    fn test_check_header_size() {
        let limits = MultipartLimits::new(10);
        assert!(limits.check_header_size(0).is_ok());
        assert!(limits.check_header_size(10).is_ok());

        let err = limits.check_header_size(11).unwrap_err();
        assert_eq!(err, Error::MaxHeaderSizeExceeded { limit: 10 });
        assert!(err.to_string().contains("10"));
    }
}
