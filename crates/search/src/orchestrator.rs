//! Merges the temporal window and the map viewport into item searches.

use std::sync::Arc;

use tracing::{debug, info};

use crate::bbox::BBox;
use crate::client::PageFetcher;
use crate::date_range::DateRange;
use crate::error::Result;
use crate::models::{Item, Link, SearchRequest};
use crate::search::{SearchHandle, SearchSnapshot};
use crate::session::{Progress, SearchStatus};

/// The request actually sent for `base` under the current filters.
///
/// An active client filter naming at least one date replaces `datetime`
/// with its `start/end` interval. The viewport only fills `bbox` when the
/// base request has none.
pub fn build_request(
    base: &SearchRequest,
    client_filter: &DateRange,
    viewport: Option<&BBox>,
) -> SearchRequest {
    let mut request = base.clone();
    if client_filter.is_active() {
        if let Some(interval) = client_filter.to_interval() {
            request.datetime = Some(interval);
        }
    }
    if request.bbox.is_none() {
        request.bbox = viewport.map(BBox::to_vec);
    }
    request
}

/// Owns the current search session and restarts it when the effective
/// request changes.
///
/// The filter inputs are not stored here: callers pass the current client
/// filter and viewport on every [`submit`](Self::submit) and
/// [`update`](Self::update).
pub struct SearchOrchestrator<F: PageFetcher> {
    fetcher: Arc<F>,
    submitted: Option<(SearchRequest, Link)>,
    session: Option<SearchHandle>,
    error_reported: bool,
}

impl<F: PageFetcher> SearchOrchestrator<F> {
    pub fn new(fetcher: Arc<F>) -> Self {
        Self {
            fetcher,
            submitted: None,
            session: None,
            error_reported: false,
        }
    }

    /// Start a search for `base` against `search_link`, replacing any
    /// running session.
    pub fn submit(
        &mut self,
        base: SearchRequest,
        search_link: Link,
        client_filter: &DateRange,
        viewport: Option<&BBox>,
    ) -> Result<()> {
        let request = build_request(&base, client_filter, viewport);
        self.submitted = Some((base, search_link));
        self.restart(request)
    }

    /// Feed new filter inputs. Returns true if the session was restarted.
    pub fn update(&mut self, client_filter: &DateRange, viewport: Option<&BBox>) -> Result<bool> {
        let Some((base, _)) = &self.submitted else {
            return Ok(false);
        };
        let effective = build_request(base, client_filter, viewport);
        if self.effective_request().as_ref() == Some(&effective) {
            return Ok(false);
        }
        debug!(datetime = ?effective.datetime, bbox = ?effective.bbox, "search inputs changed");
        self.restart(effective)?;
        Ok(true)
    }

    /// The request the current session sends.
    pub fn effective_request(&self) -> Option<SearchRequest> {
        self.session.as_ref().and_then(SearchHandle::request)
    }

    fn restart(&mut self, request: SearchRequest) -> Result<()> {
        self.session = None;
        self.error_reported = false;
        let Some((_, link)) = &self.submitted else {
            return Ok(());
        };
        info!(href = %link.href, method = %link.method(), "starting search");
        self.session = Some(SearchHandle::spawn(Arc::clone(&self.fetcher), link, request)?);
        Ok(())
    }

    pub fn pause(&self) {
        if let Some(session) = &self.session {
            session.pause();
        }
    }

    pub fn resume(&self) {
        if let Some(session) = &self.session {
            session.resume();
        }
    }

    /// Drop the session and its results. Filter changes no longer start a
    /// search until the next [`submit`](Self::submit).
    pub fn clear(&mut self) {
        self.submitted = None;
        self.session = None;
        self.error_reported = false;
    }

    pub fn is_running(&self) -> bool {
        self.session.is_some()
    }

    pub fn status(&self) -> SearchStatus {
        self.session.as_ref().map_or(SearchStatus::Idle, SearchHandle::status)
    }

    pub fn progress(&self) -> Progress {
        self.session.as_ref().map(SearchHandle::progress).unwrap_or_default()
    }

    pub fn items(&self) -> Vec<Item> {
        self.session.as_ref().map(SearchHandle::items).unwrap_or_default()
    }

    pub fn session(&self) -> Option<&SearchHandle> {
        self.session.as_ref()
    }

    /// Wait for the current session to settle.
    pub async fn settled(&self) -> Option<SearchSnapshot> {
        match &self.session {
            Some(session) => Some(session.settled().await),
            None => None,
        }
    }

    /// The session's error message, returned once per session.
    pub fn take_error(&mut self) -> Option<String> {
        if self.error_reported {
            return None;
        }
        match self.status() {
            SearchStatus::Errored(message) => {
                self.error_reported = true;
                Some(message)
            }
            _ => None,
        }
    }
}
