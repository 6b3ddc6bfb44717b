//! Query-string parsing and serialization.
//!
//! Decoding turns `+` into a space and percent-decodes keys and values;
//! encoding always percent-encodes (a space becomes `%20`, never `+`).
//! Duplicate keys keep the last value.

use std::borrow::Cow;
use std::collections::HashMap;

/// Parse a `key=value&...` query string into a map.
///
/// A leading `?` is ignored, empty pairs are skipped and keys without `=`
/// map to the empty string.
///
/// ```
/// use waybill_core::query;
///
/// let q = query::parse("?name=J%C3%BCrgen+M&tag=a&tag=b&flag");
/// assert_eq!(q["name"], "Jürgen M");
/// assert_eq!(q["tag"], "b");
/// assert_eq!(q["flag"], "");
/// ```
pub fn parse(input: &str) -> HashMap<String, String> {
    let input = input.strip_prefix('?').unwrap_or(input);

    input
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode(key), decode(value)),
            None => (decode(pair), String::new()),
        })
        .collect()
}

/// Serialize key/value pairs into a query string (without a leading `?`).
///
/// ```
/// use waybill_core::query;
///
/// assert_eq!(query::stringify([("q", "a b"), ("n", "1&2")]), "q=a%20b&n=1%262");
/// ```
pub fn stringify<I, K, V>(pairs: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    pairs
        .into_iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                urlencoding::encode(k.as_ref()),
                urlencoding::encode(v.as_ref())
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Decode a single query component: `+` to space, then percent-decoding.
///
/// Invalid UTF-8 after decoding is replaced lossily instead of failing.
pub fn decode(component: &str) -> String {
    let spaced: Cow<'_, str> = if component.contains('+') {
        Cow::Owned(component.replace('+', " "))
    } else {
        Cow::Borrowed(component)
    };

    decode_path(&spaced)
}

/// Percent-decode a path segment. `+` is kept as is.
pub fn decode_path(segment: &str) -> String {
    match urlencoding::decode(segment) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => String::from_utf8_lossy(&urlencoding::decode_binary(segment.as_bytes()))
            .into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let q = parse("a=1&b=2");
        assert_eq!(q.len(), 2);
        assert_eq!(q["a"], "1");
        assert_eq!(q["b"], "2");
    }

    #[test]
    fn test_parse_leading_question_mark() {
        let q = parse("?token=abc");
        assert_eq!(q["token"], "abc");
    }

    #[test]
    fn test_parse_last_value_wins() {
        let q = parse("limit=10&limit=20");
        assert_eq!(q["limit"], "20");
    }

    #[test]
    fn test_parse_plus_and_percent() {
        let q = parse("q=hello+world&path=%2Fa%2Fb&plus=%2B");
        assert_eq!(q["q"], "hello world");
        assert_eq!(q["path"], "/a/b");
        assert_eq!(q["plus"], "+");
    }

    #[test]
    fn test_parse_empty_and_valueless() {
        assert!(parse("").is_empty());
        assert!(parse("?").is_empty());

        let q = parse("a&&b=");
        assert_eq!(q.len(), 2);
        assert_eq!(q["a"], "");
        assert_eq!(q["b"], "");
    }

    #[test]
    fn test_parse_value_with_equals() {
        let q = parse("expr=a=b");
        assert_eq!(q["expr"], "a=b");
    }

    #[test]
    fn test_decode_invalid_utf8_is_lossy() {
        assert_eq!(decode("%FF"), "\u{FFFD}");
    }

    #[test]
    fn test_decode_path_keeps_plus() {
        assert_eq!(decode_path("a+b%20c"), "a+b c");
    }

    #[test]
    fn test_stringify_encodes_space_as_percent() {
        assert_eq!(stringify([("k", "a b")]), "k=a%20b");
        assert_eq!(stringify(Vec::<(String, String)>::new()), "");
    }

    #[test]
    fn test_stringify_then_parse() {
        let encoded = stringify([("name", "Jürgen & co"), ("x", "+")]);
        let q = parse(&encoded);
        assert_eq!(q["name"], "Jürgen & co");
        assert_eq!(q["x"], "+");
    }
}
