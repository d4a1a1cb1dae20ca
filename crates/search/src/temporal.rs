//! Temporal extents of STAC values.
//!
//! Resolves the `{start, end}` pair the sliding window works over, and the
//! instant parsing/formatting shared by the URL and request layers.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};

use crate::date_range::DateRange;
use crate::error::{Result, SearchError};
use crate::models::{Collection, Item, ItemCollection, StacValue};

/// A `[start, end]` pair of instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalExtent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TemporalExtent {
    /// A usable interval has `end > start` strictly.
    pub fn is_valid(&self) -> bool {
        self.end > self.start
    }

    fn union(self, other: TemporalExtent) -> TemporalExtent {
        TemporalExtent {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_instant(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| SearchError::InvalidDate {
            input: input.to_string(),
            reason: "expected RFC 3339 or YYYY-MM-DD".to_string(),
        })
}

/// Millisecond-precision ISO-8601 in UTC, e.g. `2020-01-01T00:00:00.000Z`.
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Epoch milliseconds back to an instant; `None` when out of chrono's range.
pub fn from_millis(ms: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
}

fn parse_opt(value: Option<&str>) -> Option<DateTime<Utc>> {
    value.and_then(|s| parse_instant(s).ok())
}

/// The temporal extent declared by `value`, with open collection ends
/// resolved against the current time.
pub fn extract_temporal_extent(value: &StacValue) -> Option<TemporalExtent> {
    extract_temporal_extent_at(value, Utc::now())
}

/// Like [`extract_temporal_extent`] with an explicit "now".
///
/// The result may be zero-width (a single-datetime item); callers that
/// need an interval check [`TemporalExtent::is_valid`].
pub fn extract_temporal_extent_at(value: &StacValue, now: DateTime<Utc>) -> Option<TemporalExtent> {
    match value {
        StacValue::Catalog(_) => None,
        StacValue::Collection(collection) => collection_extent(collection, now),
        StacValue::Item(item) => item_extent(item),
        StacValue::ItemCollection(collection) => item_collection_extent(collection),
    }
}

/// An item's own extent: `start_datetime`/`end_datetime`, else `datetime`.
pub fn item_extent(item: &Item) -> Option<TemporalExtent> {
    let props = &item.properties;
    let start = parse_opt(props.start_datetime.as_deref());
    let end = parse_opt(props.end_datetime.as_deref());
    if let (Some(start), Some(end)) = (start, end) {
        return Some(TemporalExtent { start, end });
    }
    parse_opt(props.datetime.as_deref()).map(|dt| TemporalExtent { start: dt, end: dt })
}

fn collection_extent(collection: &Collection, now: DateTime<Utc>) -> Option<TemporalExtent> {
    let [start, end] = collection
        .extent
        .as_ref()?
        .temporal
        .as_ref()?
        .interval
        .first()?;
    let start = parse_opt(start.as_deref())?;
    let end = match end {
        Some(end) => parse_instant(end).ok()?,
        None => now,
    };
    Some(TemporalExtent { start, end })
}

fn item_collection_extent(collection: &ItemCollection) -> Option<TemporalExtent> {
    collection
        .features
        .iter()
        .filter_map(item_extent)
        .reduce(TemporalExtent::union)
}

/// The server date range to install when `value` loads.
///
/// `None` means the value has no usable interval and the server range
/// should be cleared.
pub fn date_range_from_temporal_extent(value: &StacValue) -> Option<DateRange> {
    extract_temporal_extent(value)
        .filter(TemporalExtent::is_valid)
        .and_then(|e| DateRange::between(e.start, e.end))
}

/// Resolve the extent the sliding window works over.
///
/// Sources are tried in order: the picked item, a complete server range,
/// then the loaded value. The first one yielding a valid interval wins.
pub fn resolve_domain_extent(
    picked: Option<&Item>,
    server_range: &DateRange,
    value: Option<&StacValue>,
    now: DateTime<Utc>,
) -> Option<TemporalExtent> {
    let sources: [&dyn Fn() -> Option<TemporalExtent>; 3] = [
        &|| picked.and_then(item_extent),
        &|| match (server_range.start_date, server_range.end_date) {
            (Some(start), Some(end)) => Some(TemporalExtent { start, end }),
            _ => None,
        },
        &|| value.and_then(|v| extract_temporal_extent_at(v, now)),
    ];
    sources
        .iter()
        .filter_map(|source| source())
        .find(TemporalExtent::is_valid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn value(json: serde_json::Value) -> StacValue {
        serde_json::from_value(json).unwrap()
    }

    fn item(json: serde_json::Value) -> Item {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn parse_and_format_instants() {
        assert_eq!(parse_instant("2020-01-01").unwrap(), utc(2020, 1, 1));
        assert_eq!(parse_instant("2020-01-01T02:00:00+02:00").unwrap(), utc(2020, 1, 1));
        assert_eq!(format_instant(&utc(2020, 1, 1)), "2020-01-01T00:00:00.000Z");
        assert!(matches!(
            parse_instant("2020-13-45"),
            Err(SearchError::InvalidDate { .. })
        ));
    }

    #[test]
    fn collection_interval() {
        let v = value(serde_json::json!({
            "type": "Collection",
            "id": "c",
            "extent": {"temporal": {"interval": [["2020-01-01T00:00:00Z", "2021-01-01T00:00:00Z"]]}}
        }));
        let e = extract_temporal_extent(&v).unwrap();
        assert_eq!(e.start, utc(2020, 1, 1));
        assert_eq!(e.end, utc(2021, 1, 1));
    }

    #[test]
    fn open_ended_collection_runs_to_now() {
        let v = value(serde_json::json!({
            "type": "Collection",
            "id": "c",
            "extent": {"temporal": {"interval": [["2020-01-01T00:00:00Z", null]]}}
        }));
        let now = utc(2024, 5, 1);
        assert_eq!(extract_temporal_extent_at(&v, now).unwrap().end, now);

        let open_start = value(serde_json::json!({
            "type": "Collection",
            "id": "c",
            "extent": {"temporal": {"interval": [[null, "2020-01-01T00:00:00Z"]]}}
        }));
        assert!(extract_temporal_extent_at(&open_start, now).is_none());
    }

    #[test]
    fn item_prefers_start_end_pair() {
        let i = item(serde_json::json!({
            "id": "i",
            "properties": {
                "datetime": null,
                "start_datetime": "2020-01-01T00:00:00Z",
                "end_datetime": "2020-02-01T00:00:00Z"
            }
        }));
        let e = item_extent(&i).unwrap();
        assert!(e.is_valid());
        assert_eq!(e.end, utc(2020, 2, 1));

        let single = item(serde_json::json!({
            "id": "j",
            "properties": {"datetime": "2020-01-01T00:00:00Z"}
        }));
        let e = item_extent(&single).unwrap();
        assert_eq!(e.start, e.end);
        assert!(!e.is_valid());
    }

    #[test]
    fn item_collection_unions_features() {
        let v = value(serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "id": "a", "properties": {"datetime": "2020-03-01T00:00:00Z"}},
                {"type": "Feature", "id": "b", "properties": {"datetime": "2020-01-01T00:00:00Z"}},
                {"type": "Feature", "id": "c", "properties": {"datetime": "not a date"}}
            ]
        }));
        let e = extract_temporal_extent(&v).unwrap();
        assert_eq!((e.start, e.end), (utc(2020, 1, 1), utc(2020, 3, 1)));
    }

    #[test]
    fn catalog_has_no_extent() {
        let v = value(serde_json::json!({
            "type": "Catalog",
            "id": "root",
            "description": "",
            "links": []
        }));
        assert!(extract_temporal_extent(&v).is_none());
        assert!(date_range_from_temporal_extent(&v).is_none());
    }

    #[test]
    fn precedence_picked_then_server_then_value() {
        let picked = item(serde_json::json!({
            "id": "p",
            "properties": {
                "start_datetime": "2021-06-01T00:00:00Z",
                "end_datetime": "2021-07-01T00:00:00Z"
            }
        }));
        let server = DateRange::between(utc(2019, 1, 1), utc(2019, 6, 1)).unwrap();
        let v = value(serde_json::json!({
            "type": "Collection",
            "id": "c",
            "extent": {"temporal": {"interval": [["2010-01-01T00:00:00Z", "2011-01-01T00:00:00Z"]]}}
        }));
        let now = utc(2024, 1, 1);

        let e = resolve_domain_extent(Some(&picked), &server, Some(&v), now).unwrap();
        assert_eq!(e.start, utc(2021, 6, 1));

        let e = resolve_domain_extent(None, &server, Some(&v), now).unwrap();
        assert_eq!(e.start, utc(2019, 1, 1));

        let e = resolve_domain_extent(None, &DateRange::default(), Some(&v), now).unwrap();
        assert_eq!(e.start, utc(2010, 1, 1));
    }

    #[test]
    fn zero_width_picked_item_falls_through() {
        let picked = item(serde_json::json!({
            "id": "p",
            "properties": {"datetime": "2021-06-01T00:00:00Z"}
        }));
        let server = DateRange::between(utc(2019, 1, 1), utc(2019, 6, 1)).unwrap();
        let e = resolve_domain_extent(Some(&picked), &server, None, utc(2024, 1, 1)).unwrap();
        assert_eq!(e.start, utc(2019, 1, 1));
    }

    #[test]
    fn nothing_resolvable() {
        let none = resolve_domain_extent(None, &DateRange::default(), None, utc(2024, 1, 1));
        assert!(none.is_none());
    }
}
