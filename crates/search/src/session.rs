//! Pagination state machine for one search session.
//!
//! ```text
//! Idle -> FirstRequest -> Fetching <-> Paused
//!                            |  \
//!                     Exhausted  Errored        (clear: any -> Idle)
//! ```
//!
//! The machine does no I/O. A driver asks [`Pagination::next_fetch`] for the
//! cursor to request, performs it, and hands the outcome back through
//! [`Pagination::apply`] tagged with the generation it was issued under.
//! Clearing or restarting bumps the generation, so results of fetches that
//! were in flight at the time are dropped instead of repopulating the new
//! session.

use tracing::{debug, warn};

use crate::client::{first_page_link, next_page_body};
use crate::error::{Result, SearchError};
use crate::models::{Item, ItemCollection, Link, SearchRequest};

/// Observable state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    Idle,
    /// The first page has been requested but not received.
    FirstRequest,
    /// Streaming with auto-advance.
    Fetching,
    /// Streaming, auto-advance halted by the user.
    Paused,
    /// The last page had no `next` link.
    Exhausted,
    /// A fetch failed; the message is kept for display.
    Errored(String),
}

impl SearchStatus {
    /// No further requests will be made in this session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Errored(_))
    }
}

/// `(features accumulated, numberMatched from the first page)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub accumulated: usize,
    /// `None` means the total is unknown and progress is indeterminate.
    pub matched: Option<u64>,
}

impl Progress {
    /// Completed fraction in `[0, 1]`, when the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.matched {
            Some(0) => Some(1.0),
            Some(total) => Some((self.accumulated as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// A request the driver should perform.
#[derive(Debug, Clone)]
pub struct PageFetch {
    pub generation: u64,
    pub cursor: Link,
}

/// State of one search session.
#[derive(Debug, Default)]
pub struct Pagination {
    generation: u64,
    request: Option<SearchRequest>,
    cursor: Option<Link>,
    in_flight: bool,
    paused: bool,
    pages: usize,
    items: Vec<Item>,
    matched: Option<u64>,
    error: Option<String>,
}

impl Pagination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session, discarding the previous one.
    ///
    /// Returns the new generation.
    pub fn start(&mut self, search_link: &Link, request: SearchRequest) -> Result<u64> {
        let cursor = first_page_link(search_link, &request)?;
        self.reset();
        debug!(generation = self.generation, href = %cursor.href, "search started");
        self.request = Some(request);
        self.cursor = Some(cursor);
        Ok(self.generation)
    }

    /// Discard results and cursor, returning to `Idle`.
    pub fn clear(&mut self) {
        self.reset();
        debug!(generation = self.generation, "search cleared");
    }

    fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self {
            generation,
            ..Self::default()
        };
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn request(&self) -> Option<&SearchRequest> {
        self.request.as_ref()
    }

    pub fn pause(&mut self) {
        if self.request.is_some() && !self.status().is_terminal() {
            self.paused = true;
        }
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// The next cursor to request, if the session should advance now.
    ///
    /// Advances only when not paused, a cursor exists, and no fetch is in
    /// flight; the returned fetch is marked in flight.
    pub fn next_fetch(&mut self) -> Option<PageFetch> {
        if self.paused || self.in_flight || self.error.is_some() {
            return None;
        }
        let cursor = self.cursor.clone()?;
        self.in_flight = true;
        Some(PageFetch {
            generation: self.generation,
            cursor,
        })
    }

    /// Apply the outcome of a fetch issued under `generation`.
    ///
    /// Returns false, changing nothing, if the session has since been
    /// cleared or restarted. A page appends its features and advances the
    /// cursor to its `next` link; an error ends the session and keeps the
    /// items received so far.
    pub fn apply(&mut self, generation: u64, outcome: Result<ItemCollection>) -> bool {
        if generation != self.generation || !self.in_flight {
            debug!(generation, current = self.generation, "dropping stale page");
            return false;
        }
        self.in_flight = false;
        match outcome {
            Ok(page) => self.apply_page(page),
            Err(e) => {
                warn!("search failed: {e}");
                self.cursor = None;
                self.error = Some(e.to_string());
            }
        }
        true
    }

    fn apply_page(&mut self, mut page: ItemCollection) {
        if self.pages == 0 {
            self.matched = page.matched();
        }
        self.pages += 1;
        let next = page.next_link().cloned();
        self.items.append(&mut page.features);

        self.cursor = match next {
            Some(link) => match self.resolve_next(link) {
                Ok(cursor) => Some(cursor),
                Err(e) => {
                    self.error = Some(e.to_string());
                    None
                }
            },
            None => None,
        };
        debug!(
            pages = self.pages,
            items = self.items.len(),
            has_next = self.cursor.is_some(),
            "page applied"
        );
    }

    fn resolve_next(&self, mut link: Link) -> Result<Link> {
        let request = self.request.as_ref().ok_or_else(|| SearchError::NoSearchLink {
            id: "next".to_string(),
        })?;
        link.body = next_page_body(&link, request)?;
        link.merge = None;
        Ok(link)
    }

    pub fn status(&self) -> SearchStatus {
        if let Some(error) = &self.error {
            return SearchStatus::Errored(error.clone());
        }
        if self.request.is_none() {
            return SearchStatus::Idle;
        }
        if self.pages == 0 {
            return SearchStatus::FirstRequest;
        }
        if self.cursor.is_none() {
            return SearchStatus::Exhausted;
        }
        if self.paused {
            SearchStatus::Paused
        } else {
            SearchStatus::Fetching
        }
    }

    pub fn progress(&self) -> Progress {
        Progress {
            accumulated: self.items.len(),
            matched: self.matched,
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn has_next(&self) -> bool {
        self.cursor.is_some()
    }
}
