//! Route template compilation.
//!
//! A template such as `/files/{id}/*?format&!token#preview` is split into
//! path segments, query keys and an optional fragment. The path compiles
//! to a single anchored regex: `{name}` becomes a named capture over one
//! segment and `*` an unnamed capture that may span slashes. Trailing
//! slashes are never significant.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use waybill_core::{Error, query};

static PARAM_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("parameter name pattern is a valid regex")
});

/// One `/`-separated piece of a template path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    /// `{name}`
    Param(String),
    /// `*`
    Wildcard,
}

/// A query key named in the template suffix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryKey {
    pub name: String,
    /// Declared with a `!` prefix: the key must be present for a match.
    pub mandatory: bool,
}

/// Path, query and fragment variables captured by a successful match.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Captures {
    pub path: HashMap<String, String>,
    pub wildcards: Vec<String>,
}

/// A compiled route template.
#[derive(Clone, Debug)]
pub struct RouteTemplate {
    source: String,
    /// Normalized template path, used for exact literal matches.
    path: String,
    segments: Vec<Segment>,
    query_keys: Vec<QueryKey>,
    fragment: Option<String>,
    regex: Regex,
}

impl RouteTemplate {
    /// Compile a template.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTemplate`] for a path that does not start with
    /// `/`, stray or empty braces, invalid or duplicate parameter names, or an
    /// empty query key.
    pub fn parse(source: &str) -> Result<Self, Error> {
        let (rest, fragment) = match source.split_once('#') {
            Some((rest, fragment)) => (rest, Some(fragment.to_string())),
            None => (source, None),
        };
        let (raw_path, raw_query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };

        if !raw_path.starts_with('/') {
            return Err(Error::invalid_template(source, "path must start with '/'"));
        }

        let path = normalize(raw_path).to_string();
        let segments = parse_segments(source, &path)?;
        let query_keys = match raw_query {
            Some(raw) => parse_query_keys(source, raw)?,
            None => Vec::new(),
        };
        let regex = compile(&segments).map_err(|e| Error::invalid_template(source, e.to_string()))?;

        Ok(Self {
            source: source.to_string(),
            path,
            segments,
            query_keys,
            fragment,
            regex,
        })
    }

    /// The template as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn query_keys(&self) -> &[QueryKey] {
        &self.query_keys
    }

    /// Fragment declared in the template, without `#`.
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Names of the `{param}` segments in template order.
    pub fn param_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Param(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Returns `true` when every mandatory query key is present in `query`.
    pub fn query_satisfied(&self, query: &HashMap<String, String>) -> bool {
        self.query_keys
            .iter()
            .filter(|key| key.mandatory)
            .all(|key| query.contains_key(&key.name))
    }

    /// Match a request path (query and fragment excluded).
    ///
    /// An exact match against the normalized template succeeds without
    /// captures; otherwise the compiled pattern decides. Captured parameters
    /// are percent-decoded.
    pub fn captures(&self, path: &str) -> Option<Captures> {
        let path = normalize(path);
        if path == self.path {
            return Some(Captures::default());
        }

        let caps = self.regex.captures(path)?;
        let mut captures = Captures::default();
        for (group, name) in caps.iter().zip(self.regex.capture_names()).skip(1) {
            let value = group.map(|m| query::decode_path(m.as_str())).unwrap_or_default();
            match name {
                Some(name) => {
                    captures.path.insert(name.to_string(), value);
                }
                None => captures.wildcards.push(value),
            }
        }
        Some(captures)
    }
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Strip trailing slashes, keeping the root as `/`.
fn normalize(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

fn parse_segments(source: &str, path: &str) -> Result<Vec<Segment>, Error> {
    let mut seen = Vec::new();
    let mut segments = Vec::new();

    // `path` is normalized and starts with '/', so the first piece is empty.
    for piece in path.split('/').skip(1) {
        if piece.is_empty() && path == "/" {
            break;
        }

        let segment = if piece == "*" {
            Segment::Wildcard
        } else if let Some(inner) = piece.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
            if inner.is_empty() {
                return Err(Error::invalid_template(source, "empty parameter name `{}`"));
            }
            if !PARAM_NAME.is_match(inner) {
                return Err(Error::invalid_template(
                    source,
                    format!("invalid parameter name `{inner}`"),
                ));
            }
            if seen.contains(&inner) {
                return Err(Error::invalid_template(
                    source,
                    format!("duplicate parameter name `{inner}`"),
                ));
            }
            seen.push(inner);
            Segment::Param(inner.to_string())
        } else if piece.contains(['{', '}']) {
            return Err(Error::invalid_template(
                source,
                format!("stray brace in segment `{piece}`"),
            ));
        } else {
            Segment::Literal(piece.to_string())
        };
        segments.push(segment);
    }

    Ok(segments)
}

fn parse_query_keys(source: &str, raw: &str) -> Result<Vec<QueryKey>, Error> {
    raw.split('&')
        .filter(|key| !key.is_empty())
        .map(|key| {
            let (name, mandatory) = match key.strip_prefix('!') {
                Some(name) => (name, true),
                None => (key, false),
            };
            if name.is_empty() {
                return Err(Error::invalid_template(source, "empty query key"));
            }
            Ok(QueryKey {
                name: name.to_string(),
                mandatory,
            })
        })
        .collect()
}

fn compile(segments: &[Segment]) -> Result<Regex, regex::Error> {
    if segments.is_empty() {
        return Regex::new(r"^/$");
    }

    let mut pattern = String::with_capacity(segments.len() * 12 + 2);
    pattern.push('^');
    for segment in segments {
        pattern.push('/');
        match segment {
            Segment::Literal(literal) => pattern.push_str(&regex::escape(literal)),
            Segment::Param(name) => {
                pattern.push_str("(?P<");
                pattern.push_str(name);
                pattern.push_str(">[^/]+)");
            }
            Segment::Wildcard => pattern.push_str("(.+)"),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
}
