//! Date ranges and their URL encoding.

use chrono::{DateTime, Utc};
use tracing::warn;
use url::form_urlencoded;

use crate::temporal::{format_instant, parse_instant};

const START_DATE: &str = "startDate";
const END_DATE: &str = "endDate";
const START_TIME: &str = "startTime";
const END_TIME: &str = "endTime";

/// A possibly-open temporal range.
///
/// Both dates set implies `start_date < end_date`. A range with a single
/// date is incomplete; one with no field set is inactive ("no filter").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateRange {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl DateRange {
    /// A complete range, or `None` when `start >= end`.
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Option<Self> {
        (start < end).then(|| Self {
            start_date: Some(start),
            end_date: Some(end),
            start_time: None,
            end_time: None,
        })
    }

    /// A range with only its start set.
    pub fn starting(start: DateTime<Utc>) -> Self {
        Self {
            start_date: Some(start),
            ..Self::default()
        }
    }

    /// A range with only its end set.
    pub fn ending(end: DateTime<Utc>) -> Self {
        Self {
            end_date: Some(end),
            ..Self::default()
        }
    }

    /// Replace this range; inverted input is refused and leaves it untouched.
    pub fn set(&mut self, other: DateRange) -> bool {
        if !other.is_ordered() {
            return false;
        }
        *self = other;
        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// True if any of the four fields is set.
    pub fn is_active(&self) -> bool {
        self.start_date.is_some()
            || self.end_date.is_some()
            || self.start_time.is_some()
            || self.end_time.is_some()
    }

    /// True if both dates are set.
    pub fn is_complete(&self) -> bool {
        self.start_date.is_some() && self.end_date.is_some()
    }

    fn is_ordered(&self) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => start < end,
            _ => true,
        }
    }

    /// The STAC `start/end` interval, `..` for a missing bound.
    ///
    /// `None` when neither date is set; time-of-day fields alone do not
    /// name an instant.
    pub fn to_interval(&self) -> Option<String> {
        if self.start_date.is_none() && self.end_date.is_none() {
            return None;
        }
        let bound = |d: &Option<DateTime<Utc>>| {
            d.as_ref()
                .map(format_instant)
                .unwrap_or_else(|| "..".to_string())
        };
        Some(format!("{}/{}", bound(&self.start_date), bound(&self.end_date)))
    }

    /// Encode as a form-urlencoded query holding only the present fields.
    ///
    /// `None` for an inactive range: the URL parameter is removed rather
    /// than written empty.
    pub fn to_query(&self) -> Option<String> {
        if !self.is_active() {
            return None;
        }
        let mut query = form_urlencoded::Serializer::new(String::new());
        if let Some(start) = &self.start_date {
            query.append_pair(START_DATE, &format_instant(start));
        }
        if let Some(end) = &self.end_date {
            query.append_pair(END_DATE, &format_instant(end));
        }
        if let Some(time) = &self.start_time {
            query.append_pair(START_TIME, time);
        }
        if let Some(time) = &self.end_time {
            query.append_pair(END_TIME, time);
        }
        Some(query.finish())
    }

    /// Decode a query produced by [`DateRange::to_query`].
    ///
    /// Unparseable dates are dropped, and an inverted pair yields the empty
    /// range.
    pub fn from_query(query: &str) -> Self {
        let mut range = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                START_DATE => range.start_date = decode_date(&value),
                END_DATE => range.end_date = decode_date(&value),
                START_TIME => range.start_time = Some(value.into_owned()),
                END_TIME => range.end_time = Some(value.into_owned()),
                _ => {}
            }
        }
        if !range.is_ordered() {
            warn!(query, "discarding inverted date range");
            return Self::default();
        }
        range
    }
}

fn decode_date(value: &str) -> Option<DateTime<Utc>> {
    match parse_instant(value) {
        Ok(dt) => Some(dt),
        Err(e) => {
            warn!("ignoring date in url: {e}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn ms(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn clear_on_inactive_is_noop() {
        let mut range = DateRange::default();
        assert!(!range.is_active());
        range.clear();
        assert!(!range.is_active());
        assert_eq!(range, DateRange::default());
    }

    #[test]
    fn time_fields_alone_are_active() {
        let range = DateRange {
            start_time: Some("10:00".into()),
            ..DateRange::default()
        };
        assert!(range.is_active());
        assert!(!range.is_complete());
        assert_eq!(range.to_interval(), None);
    }

    #[test]
    fn between_refuses_inverted_and_empty() {
        assert!(DateRange::between(ms(10), ms(5)).is_none());
        assert!(DateRange::between(ms(5), ms(5)).is_none());
        assert!(DateRange::between(ms(5), ms(10)).unwrap().is_complete());
    }

    #[test]
    fn set_keeps_prior_value_on_inverted_input() {
        let mut range = DateRange::between(ms(0), ms(10)).unwrap();
        let inverted = DateRange {
            start_date: Some(ms(20)),
            end_date: Some(ms(5)),
            ..DateRange::default()
        };
        assert!(!range.set(inverted));
        assert_eq!(range.end_date, Some(ms(10)));
        assert!(range.set(DateRange::starting(ms(3))));
        assert!(!range.is_complete());
    }

    #[test]
    fn interval_uses_open_markers() {
        let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            DateRange::starting(start).to_interval().unwrap(),
            "2020-01-01T00:00:00.000Z/.."
        );
        assert_eq!(DateRange::ending(start).to_interval().unwrap(), "../2020-01-01T00:00:00.000Z");
    }

    #[test]
    fn query_round_trip_keeps_milliseconds() {
        let range = DateRange {
            start_date: Some(ms(1_577_836_800_123)),
            end_date: Some(ms(1_577_923_200_999)),
            start_time: Some("08:30".into()),
            end_time: None,
        };
        let query = range.to_query().unwrap();
        assert!(query.starts_with("startDate=2020-01-01T00%3A00%3A00.123Z"));
        assert!(!query.contains("endTime"));
        assert_eq!(DateRange::from_query(&query), range);
    }

    #[test]
    fn inactive_range_has_no_query() {
        assert_eq!(DateRange::default().to_query(), None);
    }

    #[test]
    fn malformed_url_input_is_dropped() {
        let range =
            DateRange::from_query("startDate=yesterday&endDate=2020-01-01T00%3A00%3A00.000Z");
        assert!(range.start_date.is_none());
        assert!(range.end_date.is_some());

        let inverted = DateRange::from_query("startDate=2021-01-01&endDate=2020-01-01");
        assert!(!inverted.is_active());
    }
}
