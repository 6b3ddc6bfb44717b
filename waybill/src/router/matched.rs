use std::collections::HashMap;

use serde::de::DeserializeOwned;
use waybill_core::{Error, query};

/// Variables extracted by a successful route match.
///
/// Handed to the handler alongside the request; the request itself is never
/// modified.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteMatch {
    /// `{name}` captures, percent-decoded.
    pub path: HashMap<String, String>,
    /// Every key of the request query string, mandatory or not.
    pub query: HashMap<String, String>,
    /// `*` captures in template order.
    pub wildcards: Vec<String>,
    /// Request fragment without the leading `#`.
    pub fragment: Option<String>,
}

impl RouteMatch {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.path.get(name).map(String::as_str)
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn wildcard(&self, index: usize) -> Option<&str> {
        self.wildcards.get(index).map(String::as_str)
    }

    /// Deserialize the path captures into `T`.
    ///
    /// ```
    /// use serde::Deserialize;
    /// use waybill::router::RouteMatch;
    ///
    /// #[derive(Deserialize)]
    /// struct FileParams {
    ///     id: u64,
    /// }
    ///
    /// let mut matched = RouteMatch::default();
    /// matched.path.insert("id".into(), "42".into());
    /// assert_eq!(matched.path_as::<FileParams>().unwrap().id, 42);
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when a capture is missing or has the wrong type.
    pub fn path_as<T: DeserializeOwned>(&self) -> Result<T, Error> {
        from_map(&self.path)
    }

    /// Deserialize the query variables into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] when a key is missing or has the wrong type.
    pub fn query_as<T: DeserializeOwned>(&self) -> Result<T, Error> {
        from_map(&self.query)
    }
}

fn from_map<T: DeserializeOwned>(map: &HashMap<String, String>) -> Result<T, Error> {
    let encoded = query::stringify(map);
    serde_qs::from_str(&encoded).map_err(|err| Error::Parse(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Search {
        q: String,
        limit: Option<u32>,
    }

    fn matched() -> RouteMatch {
        RouteMatch {
            path: HashMap::from([("id".to_string(), "7".to_string())]),
            query: HashMap::from([
                ("q".to_string(), "rust lang".to_string()),
                ("limit".to_string(), "20".to_string()),
            ]),
            wildcards: vec!["a/b".to_string()],
            fragment: Some("top".to_string()),
        }
    }

    #[test]
    fn test_accessors() {
        let m = matched();
        assert_eq!(m.param("id"), Some("7"));
        assert_eq!(m.query_param("q"), Some("rust lang"));
        assert_eq!(m.wildcard(0), Some("a/b"));
        assert_eq!(m.wildcard(1), None);
    }

    #[test]
    fn test_query_as() {
        let search: Search = matched().query_as().unwrap();
        assert_eq!(
            search,
            Search {
                q: "rust lang".into(),
                limit: Some(20)
            }
        );
    }

    #[test]
    fn test_path_as_type_mismatch() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Params {
            id: bool,
        }
        assert!(matches!(matched().path_as::<Params>(), Err(Error::Parse(_))));
    }
}
