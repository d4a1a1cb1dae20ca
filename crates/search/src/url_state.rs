//! URL query parameters as a key-value store.
//!
//! The browser location is the shared store for `href`, `dateRange` and
//! `clientFilter`. Every read and write of those parameters goes through
//! this module so the nested encodings live in one place.

use url::form_urlencoded;

use crate::date_range::DateRange;

/// Parameter holding the resource currently shown.
pub const HREF_PARAM: &str = "href";
/// Parameter holding the server-derived range.
pub const DATE_RANGE_PARAM: &str = "dateRange";
/// Parameter holding the user's client filter range.
pub const CLIENT_FILTER_PARAM: &str = "clientFilter";

/// A location whose query string can be read and rewritten.
///
/// Mirrors the history API: `replace_query` rewrites the current entry,
/// `push_query` adds a new one, and `back` / `forward` move between entries
/// (the equivalent of a `popstate`).
pub trait UrlStore {
    /// The current query string, without the leading `?`.
    fn query(&self) -> String;

    fn replace_query(&mut self, query: &str);

    fn push_query(&mut self, query: &str);

    /// Move one entry back; false if already at the oldest entry.
    fn back(&mut self) -> bool;

    /// Move one entry forward; false if already at the newest entry.
    fn forward(&mut self) -> bool;
}

/// An in-process location with a history stack.
#[derive(Debug, Clone)]
pub struct MemoryLocation {
    path: String,
    entries: Vec<String>,
    current: usize,
}

impl MemoryLocation {
    pub fn new(path: &str, query: &str) -> Self {
        Self {
            path: path.to_string(),
            entries: vec![query.trim_start_matches('?').to_string()],
            current: 0,
        }
    }

    /// Parse `path?query`.
    pub fn parse(location: &str) -> Self {
        match location.split_once('?') {
            Some((path, query)) => Self::new(path, query),
            None => Self::new(location, ""),
        }
    }

    /// `path?query`, or just `path` when the query is empty.
    pub fn url(&self) -> String {
        let query = self.query();
        if query.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, query)
        }
    }

    pub fn history_len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for MemoryLocation {
    fn default() -> Self {
        Self::new("/", "")
    }
}

impl UrlStore for MemoryLocation {
    fn query(&self) -> String {
        self.entries[self.current].clone()
    }

    fn replace_query(&mut self, query: &str) {
        self.entries[self.current] = query.trim_start_matches('?').to_string();
    }

    fn push_query(&mut self, query: &str) {
        self.entries.truncate(self.current + 1);
        self.entries.push(query.trim_start_matches('?').to_string());
        self.current += 1;
    }

    fn back(&mut self) -> bool {
        if self.current == 0 {
            return false;
        }
        self.current -= 1;
        true
    }

    fn forward(&mut self) -> bool {
        if self.current + 1 >= self.entries.len() {
            return false;
        }
        self.current += 1;
        true
    }
}

/// Read one parameter from a query string.
pub fn get_param(query: &str, key: &str) -> Option<String> {
    form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Set (`Some`) or remove (`None`) one parameter, keeping the others in
/// order.
pub fn with_param(query: &str, key: &str, value: Option<&str>) -> String {
    let mut out = form_urlencoded::Serializer::new(String::new());
    let mut written = false;
    for (k, v) in form_urlencoded::parse(query.as_bytes()) {
        if k != key {
            out.append_pair(&k, &v);
        } else if let (Some(value), false) = (value, written) {
            out.append_pair(key, value);
            written = true;
        }
    }
    if let (Some(value), false) = (value, written) {
        out.append_pair(key, value);
    }
    out.finish()
}

/// The `href` parameter, if present and non-empty.
pub fn read_href(store: &dyn UrlStore) -> Option<String> {
    get_param(&store.query(), HREF_PARAM).filter(|h| !h.is_empty())
}

/// Decode a range parameter; absent means the empty (inactive) range.
pub fn read_date_range(store: &dyn UrlStore, param: &str) -> DateRange {
    get_param(&store.query(), param)
        .map(|nested| DateRange::from_query(&nested))
        .unwrap_or_default()
}

/// Write a range parameter in place, removing it for an inactive range.
pub fn write_date_range(store: &mut dyn UrlStore, param: &str, range: &DateRange) {
    let query = with_param(&store.query(), param, range.to_query().as_deref());
    store.replace_query(&query);
}

/// Push a new history entry for `href`, unless it is already current.
///
/// The new entry carries only the href; the range parameters are written
/// again by their owners.
pub fn push_href(store: &mut dyn UrlStore, href: &str) -> bool {
    if read_href(store).as_deref() == Some(href) {
        return false;
    }
    store.push_query(&with_param("", HREF_PARAM, Some(href)));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    #[test]
    fn set_replace_and_remove_params() {
        let q = with_param("a=1&b=2", "b", Some("3"));
        assert_eq!(q, "a=1&b=3");
        let q = with_param(&q, "c", Some("x y"));
        assert_eq!(q, "a=1&b=3&c=x+y");
        let q = with_param(&q, "a", None);
        assert_eq!(q, "b=3&c=x+y");
        assert_eq!(get_param(&q, "c").as_deref(), Some("x y"));
    }

    #[test]
    fn range_parameter_is_nested_and_removed_when_empty() {
        let mut location =
            MemoryLocation::parse("/?href=https%3A%2F%2Fexample.com%2Fcollection.json");
        let range = DateRange::between(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 6, 1, 0, 0, 0).unwrap(),
        )
        .unwrap();

        write_date_range(&mut location, CLIENT_FILTER_PARAM, &range);
        assert!(location.query().contains("clientFilter=startDate%3D2020-01-01T00%253A00"));
        assert_eq!(read_date_range(&location, CLIENT_FILTER_PARAM), range);
        assert_eq!(read_href(&location).as_deref(), Some("https://example.com/collection.json"));

        write_date_range(&mut location, CLIENT_FILTER_PARAM, &DateRange::default());
        assert!(!location.query().contains(CLIENT_FILTER_PARAM));
        assert!(!read_date_range(&location, CLIENT_FILTER_PARAM).is_active());
    }

    #[test]
    fn history_back_and_forward() {
        let mut location = MemoryLocation::default();
        assert!(push_href(&mut location, "https://a.example/catalog.json"));
        assert!(!push_href(&mut location, "https://a.example/catalog.json"));
        assert!(push_href(&mut location, "https://b.example/catalog.json"));
        assert_eq!(location.history_len(), 3);

        assert!(location.back());
        assert_eq!(read_href(&location).as_deref(), Some("https://a.example/catalog.json"));
        assert!(location.forward());
        assert!(!location.forward());
        assert!(location.back() && location.back());
        assert!(!location.back());
        assert_eq!(read_href(&location), None);
    }

    #[test]
    fn url_includes_path() {
        let mut location = MemoryLocation::parse("/app");
        assert_eq!(location.url(), "/app");
        location.replace_query("?href=x");
        assert_eq!(location.url(), "/app?href=x");
    }
}
