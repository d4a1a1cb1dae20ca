//! Shared map state: the loaded value, the two date ranges, their URL
//! persistence, and the item search they drive.
//!
//! [`MapState`] owns two range slots:
//!
//! - the server range (`dateRange`), derived from the loaded value's
//!   temporal extent and written to the URL synchronously;
//! - the client filter (`clientFilter`), edited by the user through the
//!   sliding window and written to the URL through a [`Debouncer`].
//!
//! Every change to an input of the slider domain goes through
//! [`MapState::recompute`], which clears a client filter left outside the
//! new domain. Every change to the client filter or the viewport is fed to
//! the owned [`SearchOrchestrator`], and search results are read back from
//! it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, warn};
use url::Url;

use crate::bbox::{sanitize, value_bbox, BBox};
use crate::client::{PageFetcher, StacClient};
use crate::date_range::DateRange;
use crate::debounce::Debouncer;
use crate::error::Result;
use crate::models::{Item, Link, SearchRequest, StacValue};
use crate::orchestrator::SearchOrchestrator;
use crate::temporal::{date_range_from_temporal_extent, from_millis};
use crate::url_state::{
    push_href, read_date_range, read_href, write_date_range, UrlStore, CLIENT_FILTER_PARAM,
    DATE_RANGE_PARAM,
};
use crate::window::{
    compute_domain, current_selection, is_outside_domain, window_size, DomainInputs, SliderDomain,
    SlidingWindow,
};

/// Tunables for [`MapState`].
#[derive(Debug, Clone)]
pub struct StateOptions {
    /// Quiet period before a client filter change reaches the URL
    /// (default 300 ms).
    pub client_filter_debounce: Duration,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            client_filter_debounce: Duration::from_millis(300),
        }
    }
}

/// Application state backing the map, the slider, and the search panel.
pub struct MapState<L: UrlStore + Send + 'static, F: PageFetcher = StacClient> {
    location: Arc<Mutex<L>>,
    href: Option<String>,
    value: Option<StacValue>,
    picked: Option<Item>,
    date_range: DateRange,
    client_filter: DateRange,
    viewport: Option<BBox>,
    domain: SliderDomain,
    window: SlidingWindow,
    client_filter_writer: Debouncer<DateRange>,
    search: SearchOrchestrator<F>,
}

impl<L: UrlStore + Send + 'static, F: PageFetcher> MapState<L, F> {
    /// Restore state from `location`; searches go through `fetcher`.
    ///
    /// Both ranges are read from the URL; an `href` that is not an absolute
    /// URL is ignored.
    pub fn new(location: L, fetcher: Arc<F>, options: StateOptions) -> Self {
        let href = valid_href(&location);
        let date_range = read_date_range(&location, DATE_RANGE_PARAM);
        let client_filter = read_date_range(&location, CLIENT_FILTER_PARAM);
        debug!(
            ?href,
            date_range = ?date_range.to_interval(),
            client_filter = ?client_filter.to_interval(),
            "state restored"
        );

        let location = Arc::new(Mutex::new(location));
        let sink_location = Arc::clone(&location);
        let client_filter_writer =
            Debouncer::new(options.client_filter_debounce, move |range: DateRange| {
                write_date_range(&mut *lock(&sink_location), CLIENT_FILTER_PARAM, &range);
            });

        let mut state = Self {
            location,
            href,
            value: None,
            picked: None,
            date_range,
            client_filter,
            viewport: None,
            domain: SliderDomain::invalid(),
            window: SlidingWindow::new(),
            client_filter_writer,
            search: SearchOrchestrator::new(fetcher),
        };
        state.domain = state.domain();
        state
    }

    // -- href and history ---------------------------------------------------

    pub fn href(&self) -> Option<&str> {
        self.href.as_deref()
    }

    /// Show a new resource.
    ///
    /// Pushes a history entry when `href` differs from the URL and drops the
    /// loaded value, the picked item, the server range and any search.
    pub fn set_href(&mut self, href: &str) {
        if self.href.as_deref() == Some(href) {
            return;
        }
        self.href = Some(href.to_string());
        self.forget_resource();

        let mut location = lock(&self.location);
        if push_href(&mut *location, href) {
            debug!(href, "pushed history entry");
            if self.client_filter.is_active() {
                write_date_range(&mut *location, CLIENT_FILTER_PARAM, &self.client_filter);
            }
        }
        drop(location);
        self.recompute();
    }

    /// Re-derive `href` after the user moved through history.
    ///
    /// Only `href` follows the URL; the client filter keeps its in-memory
    /// value. Returns true if the href changed.
    pub fn on_pop_state(&mut self) -> bool {
        let href = valid_href(&*lock(&self.location));
        if href == self.href {
            return false;
        }
        debug!(?href, "href changed by history navigation");
        self.href = href;
        self.forget_resource();
        self.recompute();
        true
    }

    fn forget_resource(&mut self) {
        self.value = None;
        self.picked = None;
        self.date_range.clear();
        self.search.clear();
    }

    /// Run `f` against the location, e.g. to navigate history.
    pub fn with_location<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        f(&mut lock(&self.location))
    }

    /// The current URL query.
    pub fn query(&self) -> String {
        lock(&self.location).query()
    }

    // -- loaded value and picked item ---------------------------------------

    pub fn value(&self) -> Option<&StacValue> {
        self.value.as_ref()
    }

    /// Install a freshly loaded value.
    ///
    /// The server range becomes the value's temporal extent (or empty) and is
    /// written to the URL immediately.
    pub fn set_value(&mut self, value: StacValue) -> SliderDomain {
        self.date_range = date_range_from_temporal_extent(&value).unwrap_or_default();
        write_date_range(&mut *lock(&self.location), DATE_RANGE_PARAM, &self.date_range);
        self.value = Some(value);
        self.recompute()
    }

    pub fn picked(&self) -> Option<&Item> {
        self.picked.as_ref()
    }

    pub fn set_picked(&mut self, picked: Option<Item>) -> SliderDomain {
        self.picked = picked;
        self.recompute()
    }

    /// Bounding box to fit the map to: the picked item's, else the value's.
    pub fn fit_bbox(&self) -> Option<BBox> {
        self.picked
            .as_ref()
            .and_then(|item| item.bbox.as_deref())
            .and_then(|bbox| sanitize(bbox).ok())
            .or_else(|| self.value.as_ref().and_then(value_bbox))
    }

    // -- viewport and search ------------------------------------------------

    pub fn viewport(&self) -> Option<&BBox> {
        self.viewport.as_ref()
    }

    /// Move the map; a running search restarts if its bbox came from the
    /// viewport.
    pub fn set_viewport(&mut self, viewport: Option<BBox>) {
        if self.viewport == viewport {
            return;
        }
        self.viewport = viewport;
        self.sync_search();
    }

    /// Start an item search for `base` under the current filters.
    pub fn submit_search(&mut self, base: SearchRequest, search_link: Link) -> Result<()> {
        self.search
            .submit(base, search_link, &self.client_filter, self.viewport.as_ref())
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
    }

    pub fn search(&self) -> &SearchOrchestrator<F> {
        &self.search
    }

    pub fn search_mut(&mut self) -> &mut SearchOrchestrator<F> {
        &mut self.search
    }

    /// Items accumulated by the current search.
    pub fn search_items(&self) -> Vec<Item> {
        self.search.items()
    }

    fn sync_search(&mut self) {
        if let Err(e) = self.search.update(&self.client_filter, self.viewport.as_ref()) {
            warn!("could not restart search: {e}");
        }
    }

    // -- ranges -------------------------------------------------------------

    pub fn date_range(&self) -> &DateRange {
        &self.date_range
    }

    pub fn client_filter(&self) -> &DateRange {
        &self.client_filter
    }

    /// True if the server-derived range is set.
    pub fn is_date_filter_active(&self) -> bool {
        self.date_range.is_active()
    }

    pub fn is_client_filter_active(&self) -> bool {
        self.client_filter.is_active()
    }

    /// Replace the server range, writing it to the URL immediately.
    ///
    /// Inverted input is refused; returns whether the range was accepted.
    pub fn set_date_range(&mut self, range: DateRange) -> bool {
        if !self.date_range.set(range) {
            return false;
        }
        write_date_range(&mut *lock(&self.location), DATE_RANGE_PARAM, &self.date_range);
        self.recompute();
        true
    }

    pub fn clear_date_range(&mut self) {
        if !self.date_range.is_active() {
            return;
        }
        self.date_range.clear();
        write_date_range(&mut *lock(&self.location), DATE_RANGE_PARAM, &self.date_range);
        self.recompute();
    }

    /// Replace the client filter; the URL follows after the debounce delay.
    ///
    /// Inverted input is refused and leaves the filter untouched. A filter
    /// outside the current domain is not stored: the filter is cleared
    /// instead. Returns whether `range` was accepted.
    pub fn set_client_filter(&mut self, range: DateRange) -> bool {
        let mut candidate = self.client_filter.clone();
        if !candidate.set(range) {
            return false;
        }
        if is_outside_domain(&self.domain(), &candidate) {
            debug!(filter = ?candidate.to_interval(), "refusing client filter outside the domain");
            self.clear_client_filter();
            return false;
        }
        self.client_filter = candidate;
        if !self.client_filter.is_active() {
            self.window.reset();
        }
        self.client_filter_writer.call(self.client_filter.clone());
        self.sync_search();
        true
    }

    pub fn clear_client_filter(&mut self) {
        if !self.client_filter.is_active() {
            return;
        }
        self.client_filter.clear();
        self.window.reset();
        self.client_filter_writer.call(DateRange::default());
        self.sync_search();
    }

    /// Write a pending client filter to the URL now.
    pub fn flush(&mut self) {
        self.client_filter_writer.flush();
    }

    // -- sliding window -----------------------------------------------------

    pub fn domain(&self) -> SliderDomain {
        compute_domain(DomainInputs {
            picked: self.picked.as_ref(),
            server_range: &self.date_range,
            value: self.value.as_ref(),
        })
    }

    pub fn has_temporal_data(&self) -> bool {
        self.domain().has_valid_range
    }

    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    /// Handle positions for the current client filter.
    pub fn selection(&self) -> [i64; 2] {
        let domain = self.domain();
        current_selection(&domain, &self.client_filter, window_size(&domain))
    }

    /// The selection as instants, for labels.
    pub fn selection_range(&self) -> Option<DateRange> {
        let [low, high] = self.selection();
        from_millis(low)
            .zip(from_millis(high))
            .and_then(|(start, end)| DateRange::between(start, end))
    }

    /// Apply a slider drag. Returns the new client filter, or `None` if the
    /// drag was ignored.
    ///
    /// A filter shown without a committed drag (restored from the URL, or
    /// typed) is the reference the drag's tie-break compares against.
    pub fn drag(&mut self, values: &[i64]) -> Option<DateRange> {
        let has_dates =
            self.client_filter.start_date.is_some() || self.client_filter.end_date.is_some();
        if self.window.previous().is_none() && has_dates {
            let selection = self.selection();
            self.window.seed(selection);
        }
        let range = self.window.drag(values, &self.domain())?;
        self.set_client_filter(range.clone()).then_some(range)
    }

    /// Apply a typed window start; malformed input is an error and changes
    /// nothing.
    pub fn set_window_start(&mut self, input: &str) -> Result<Option<DateRange>> {
        let range = self
            .window
            .set_window_start(input, &self.domain(), &self.client_filter)?;
        Ok(range.filter(|range| self.set_client_filter(range.clone())))
    }

    pub fn set_window_end(&mut self, input: &str) -> Result<Option<DateRange>> {
        let range = self
            .window
            .set_window_end(input, &self.domain(), &self.client_filter)?;
        Ok(range.filter(|range| self.set_client_filter(range.clone())))
    }

    /// Recompute the domain and clear a client filter that no longer fits.
    ///
    /// A changed domain also forgets the last committed selection.
    pub fn recompute(&mut self) -> SliderDomain {
        let domain = self.domain();
        if domain != self.domain {
            self.domain = domain;
            self.window.reset();
        }
        if is_outside_domain(&domain, &self.client_filter) {
            debug!(
                min = domain.min,
                max = domain.max,
                filter = ?self.client_filter.to_interval(),
                "clearing client filter outside the domain"
            );
            self.clear_client_filter();
        }
        domain
    }
}

fn valid_href(location: &dyn UrlStore) -> Option<String> {
    let href = read_href(location)?;
    match Url::parse(&href) {
        Ok(_) => Some(href),
        Err(e) => {
            warn!(%href, "ignoring href that is not an absolute URL: {e}");
            None
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
