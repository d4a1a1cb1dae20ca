//! Sliding temporal window over the loaded extent.
//!
//! Slider positions are epoch milliseconds. The domain is a pure function
//! of its inputs and is recomputed whenever any of them changes; the only
//! state kept here is the last committed selection, used to break ties when
//! a drag would collapse the window.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::date_range::DateRange;
use crate::error::Result;
use crate::models::{Item, StacValue};
use crate::temporal::{from_millis, parse_instant, resolve_domain_extent, TemporalExtent};

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Upper bound on the number of discrete slider positions.
const MAX_POSITIONS: i64 = 1000;

/// Derived slider bounds.
///
/// Invariant: `has_valid_range` implies `max > min` and
/// `0 < step < max - min`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliderDomain {
    pub min: i64,
    pub max: i64,
    /// Slider step in milliseconds; also the minimum window width.
    pub step: i64,
    pub has_valid_range: bool,
}

impl SliderDomain {
    /// The placeholder domain shown when no temporal data is available.
    pub fn invalid() -> Self {
        Self {
            min: 0,
            max: 100,
            step: 1,
            has_valid_range: false,
        }
    }

    /// Build a domain over `extent`, invalid if the interval is too short.
    pub fn from_extent(extent: &TemporalExtent) -> Self {
        let min = extent.start.timestamp_millis();
        let max = extent.end.timestamp_millis();
        if min >= max {
            return Self::invalid();
        }
        let duration = max - min;
        let step = (duration / MAX_POSITIONS).clamp(1, HOUR_MS);
        if step <= 0 || step >= duration {
            return Self::invalid();
        }
        Self {
            min,
            max,
            step,
            has_valid_range: true,
        }
    }

    pub fn duration(&self) -> i64 {
        self.max - self.min
    }

    pub fn contains(&self, ms: i64) -> bool {
        self.min <= ms && ms <= self.max
    }
}

/// The three sources the domain is derived from.
#[derive(Debug, Clone, Copy)]
pub struct DomainInputs<'a> {
    pub picked: Option<&'a Item>,
    pub server_range: &'a DateRange,
    pub value: Option<&'a StacValue>,
}

/// Derive the slider domain from the highest-priority usable extent.
pub fn compute_domain(inputs: DomainInputs<'_>) -> SliderDomain {
    compute_domain_at(inputs, Utc::now())
}

/// Like [`compute_domain`] with an explicit "now" for open-ended extents.
pub fn compute_domain_at(inputs: DomainInputs<'_>, now: DateTime<Utc>) -> SliderDomain {
    resolve_domain_extent(inputs.picked, inputs.server_range, inputs.value, now)
        .map(|extent| SliderDomain::from_extent(&extent))
        .unwrap_or_else(SliderDomain::invalid)
}

/// Default window width: 5% of the domain, never under an hour.
pub fn window_size(domain: &SliderDomain) -> i64 {
    if !domain.has_valid_range {
        return DAY_MS;
    }
    HOUR_MS.max(domain.duration() / 20)
}

/// Clamp `[low, high]` into the domain keeping at least `step` between them.
///
/// `low` is clamped first and `high` takes its floor from the clamped low,
/// so separation always holds even if that moves the other handle.
pub fn clamp_selection(domain: &SliderDomain, low: i64, high: i64) -> [i64; 2] {
    let min_distance = domain.step;
    let low = low.clamp(domain.min, domain.max - min_distance);
    let high = high.clamp(low + min_distance, domain.max);
    [low, high]
}

/// The handle positions to display for the current client filter.
pub fn current_selection(domain: &SliderDomain, client_range: &DateRange, window: i64) -> [i64; 2] {
    if !domain.has_valid_range {
        return [domain.min, domain.min + DAY_MS];
    }
    if client_range.start_date.is_none() && client_range.end_date.is_none() {
        return [domain.min, domain.max];
    }
    let low = client_range
        .start_date
        .map(|d| d.timestamp_millis())
        .unwrap_or(domain.min);
    let high = client_range
        .end_date
        .map(|d| d.timestamp_millis())
        .unwrap_or(low + window);
    clamp_selection(domain, low, high)
}

/// True if a complete `client_range` has a bound outside a valid domain.
///
/// Such a filter is stale (left over from a previous dataset) and must be
/// cleared rather than clamped. A half-open range is never stale: it is
/// clamped for display by [`current_selection`].
pub fn is_outside_domain(domain: &SliderDomain, client_range: &DateRange) -> bool {
    if !domain.has_valid_range {
        return false;
    }
    match (client_range.start_date, client_range.end_date) {
        (Some(start), Some(end)) => {
            !domain.contains(start.timestamp_millis()) || !domain.contains(end.timestamp_millis())
        }
        _ => false,
    }
}

/// A committed drag: the clamped handles and the client filter they imply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DragOutcome {
    pub selection: [i64; 2],
    pub range: DateRange,
}

/// Resolve a raw drag into a valid selection.
///
/// When the handles end up closer than `step`, the one that moved less
/// relative to `prev` is pushed outward (ties push the low handle). Without
/// a previous selection the high handle is pushed.
pub fn handle_drag(
    values: &[i64],
    domain: &SliderDomain,
    prev: Option<[i64; 2]>,
) -> Option<DragOutcome> {
    if !domain.has_valid_range {
        return None;
    }
    let [mut low, mut high] = <[i64; 2]>::try_from(values).ok()?;
    let min_distance = domain.step;

    if high - low < min_distance {
        match prev {
            Some([prev_low, prev_high]) => {
                let low_moved = (low - prev_low).abs();
                let high_moved = (high - prev_high).abs();
                if low_moved > high_moved {
                    high = low + min_distance;
                } else {
                    low = high - min_distance;
                }
            }
            None => high = low + min_distance,
        }
    }

    let selection = clamp_selection(domain, low, high);
    let range = DateRange::between(from_millis(selection[0])?, from_millis(selection[1])?)?;
    Some(DragOutcome { selection, range })
}

/// Which handle a typed date targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handle {
    Start,
    End,
}

/// The stateful part of the window controller: the last committed
/// selection.
#[derive(Debug, Default, Clone)]
pub struct SlidingWindow {
    previous: Option<[i64; 2]>,
}

impl SlidingWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> Option<[i64; 2]> {
        self.previous
    }

    /// Forget the last selection, e.g. when the filter is cleared.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Record `selection` as committed without a drag, e.g. for a filter
    /// restored from the URL.
    pub fn seed(&mut self, selection: [i64; 2]) {
        self.previous = Some(selection);
    }

    /// Apply a drag and remember the committed selection.
    pub fn drag(&mut self, values: &[i64], domain: &SliderDomain) -> Option<DateRange> {
        let outcome = handle_drag(values, domain, self.previous)?;
        debug!(low = outcome.selection[0], high = outcome.selection[1], "window dragged");
        self.previous = Some(outcome.selection);
        Some(outcome.range)
    }

    /// Apply a typed start date.
    ///
    /// Malformed input is an error and leaves the window untouched. A
    /// missing end is filled in one window width later.
    pub fn set_window_start(
        &mut self,
        input: &str,
        domain: &SliderDomain,
        client_range: &DateRange,
    ) -> Result<Option<DateRange>> {
        self.set_window_bound(Handle::Start, input, domain, client_range)
    }

    /// Apply a typed end date; a missing start is one window width earlier.
    pub fn set_window_end(
        &mut self,
        input: &str,
        domain: &SliderDomain,
        client_range: &DateRange,
    ) -> Result<Option<DateRange>> {
        self.set_window_bound(Handle::End, input, domain, client_range)
    }

    fn set_window_bound(
        &mut self,
        handle: Handle,
        input: &str,
        domain: &SliderDomain,
        client_range: &DateRange,
    ) -> Result<Option<DateRange>> {
        if input.trim().is_empty() || !domain.has_valid_range {
            return Ok(None);
        }
        let instant = parse_instant(input)?.timestamp_millis();
        let window = window_size(domain);
        let (low, high) = match handle {
            Handle::Start => {
                let high = client_range
                    .end_date
                    .map(|d| d.timestamp_millis())
                    .unwrap_or(instant + window);
                (instant, high)
            }
            Handle::End => {
                let low = client_range
                    .start_date
                    .map(|d| d.timestamp_millis())
                    .unwrap_or(instant - window);
                (low, instant)
            }
        };
        let [low, high] = clamp_selection(domain, low, high);
        let range = from_millis(low)
            .zip(from_millis(high))
            .and_then(|(start, end)| DateRange::between(start, end));
        if range.is_some() {
            self.previous = Some([low, high]);
        }
        Ok(range)
    }
}

/// `"{h}h {m}m"`, or `"{m}m"` under an hour.
pub fn describe_duration(ms: i64) -> String {
    let duration = Duration::milliseconds(ms);
    let hours = duration.num_hours();
    let minutes = duration.num_minutes() % 60;
    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}
