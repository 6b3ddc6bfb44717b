//! Multipart part headers.
//!
//! Each part line `name: value` is parsed into a [`HeaderField`]. Only the
//! headers meaningful for `multipart/form-data` are kept; anything else is
//! skipped by the decoder.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use waybill_core::Error;

static NAME_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|[;\s])name\s*=\s*"([^"]*)""#).expect("name pattern is a valid regex")
});

static FILENAME_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(?:^|[;\s])filename\s*=\s*"([^"]*)""#)
        .expect("filename pattern is a valid regex")
});

/// `content-transfer-encoding` values accepted in form data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferEncoding {
    /// Body is base64 text.
    Base64,
    /// Body is raw bytes (`binary`, `7bit` and `8bit` all mean this).
    Binary,
}

impl TransferEncoding {
    /// Get the wire representation of this encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferEncoding::Base64 => "base64",
            TransferEncoding::Binary => "binary",
        }
    }
}

impl FromStr for TransferEncoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base64" => Ok(TransferEncoding::Base64),
            "binary" | "7bit" | "8bit" => Ok(TransferEncoding::Binary),
            other => Err(Error::MalformedHeaders(format!(
                "unsupported content-transfer-encoding `{other}`"
            ))),
        }
    }
}

/// A single multipart part header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderField {
    /// `content-disposition: form-data; name="..."[; filename="..."]`
    ContentDisposition {
        name: String,
        filename: Option<String>,
    },
    /// `content-type: ...`
    ContentType(String),
    /// `content-transfer-encoding: base64|binary`
    ContentTransferEncoding(TransferEncoding),
}

impl HeaderField {
    /// Build a content-disposition for a simple value field.
    pub fn disposition<S: Into<String>>(name: S) -> Self {
        HeaderField::ContentDisposition {
            name: name.into(),
            filename: None,
        }
    }

    /// Build a content-disposition for a file field.
    pub fn file_disposition<S: Into<String>, F: Into<String>>(name: S, filename: F) -> Self {
        HeaderField::ContentDisposition {
            name: name.into(),
            filename: Some(filename.into()),
        }
    }

    /// Parse one header line (without its line ending).
    ///
    /// Returns `Ok(None)` for headers that are not part of the form-data
    /// vocabulary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHeaders`] for a line without a colon, a
    /// content-disposition without a non-empty `name`, or an unsupported
    /// transfer encoding.
    pub fn parse_line(line: &str) -> Result<Option<Self>, Error> {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::MalformedHeaders(format!("header line without colon: {line:?}")))?;
        let value = value.trim();

        match name.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => parse_disposition(value).map(Some),
            "content-type" => Ok(Some(HeaderField::ContentType(value.to_string()))),
            "content-transfer-encoding" => {
                Ok(Some(HeaderField::ContentTransferEncoding(value.parse()?)))
            }
            _ => Ok(None),
        }
    }
}

fn parse_disposition(value: &str) -> Result<HeaderField, Error> {
    let name = NAME_PARAM
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            Error::MalformedHeaders(format!("content-disposition without a name: {value:?}"))
        })?;

    let filename = FILENAME_PARAM
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());

    Ok(HeaderField::ContentDisposition {
        name: name.to_string(),
        filename,
    })
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderField::ContentDisposition { name, filename } => {
                write!(f, "content-disposition: form-data; name=\"{name}\"")?;
                if let Some(filename) = filename {
                    write!(f, "; filename=\"{filename}\"")?;
                }
                Ok(())
            }
            HeaderField::ContentType(value) => write!(f, "content-type: {value}"),
            HeaderField::ContentTransferEncoding(encoding) => {
                write!(f, "content-transfer-encoding: {}", encoding.as_str())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_disposition_field() {
        let field = HeaderField::parse_line(r#"Content-Disposition: form-data; name="title""#)
            .unwrap()
            .unwrap();
        assert_eq!(field, HeaderField::disposition("title"));
    }

    #[test]
    fn test_parse_disposition_file() {
        let field = HeaderField::parse_line(
            r#"content-disposition: form-data; name="upload"; filename="report.pdf""#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(field, HeaderField::file_disposition("upload", "report.pdf"));
    }

    #[test]
    fn test_filename_does_not_shadow_name() {
        let field =
            HeaderField::parse_line(r#"content-disposition: form-data; filename="a.txt"; name="f""#)
                .unwrap()
                .unwrap();
        assert_eq!(field, HeaderField::file_disposition("f", "a.txt"));
    }

    #[test]
    fn test_disposition_without_name_fails() {
        let err = HeaderField::parse_line(r#"content-disposition: form-data; filename="a.txt""#)
            .unwrap_err();
        assert!(matches!(err, Error::MalformedHeaders(_)));

        let err = HeaderField::parse_line(r#"content-disposition: form-data; name="""#).unwrap_err();
        assert!(matches!(err, Error::MalformedHeaders(_)));
    }

    #[test]
    fn test_parse_content_type_and_encoding() {
        assert_eq!(
            HeaderField::parse_line("CONTENT-TYPE:  image/png ").unwrap(),
            Some(HeaderField::ContentType("image/png".into()))
        );
        assert_eq!(
            HeaderField::parse_line("Content-Transfer-Encoding: BASE64").unwrap(),
            Some(HeaderField::ContentTransferEncoding(TransferEncoding::Base64))
        );
        assert_eq!(
            HeaderField::parse_line("content-transfer-encoding: 8bit").unwrap(),
            Some(HeaderField::ContentTransferEncoding(TransferEncoding::Binary))
        );
        assert!(HeaderField::parse_line("content-transfer-encoding: quoted-printable").is_err());
    }

    #[test]
    fn test_unknown_header_is_skipped() {
        assert_eq!(HeaderField::parse_line("x-trace: 1").unwrap(), None);
    }

    #[test]
    fn test_line_without_colon_fails() {
        assert!(matches!(
            HeaderField::parse_line("garbage"),
            Err(Error::MalformedHeaders(_))
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            HeaderField::file_disposition("f", "a.txt").to_string(),
            r#"content-disposition: form-data; name="f"; filename="a.txt""#
        );
        assert_eq!(
            HeaderField::ContentTransferEncoding(TransferEncoding::Binary).to_string(),
            "content-transfer-encoding: binary"
        );
    }
}
