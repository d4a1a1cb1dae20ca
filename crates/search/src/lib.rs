//! # stacmap search
//!
//! Incremental search-and-filter engine for STAC browsing.
//!
//! The crate drives paginated item searches against a STAC API, keeps a
//! sliding temporal window over whatever extent is loaded, and merges that
//! window and the map viewport into outgoing requests.
//!
//! ## Components
//!
//! - [`bbox`]: bounding-box sanitizing and unions
//! - [`temporal`]: temporal extent extraction and domain precedence
//! - [`window`]: slider domain, selection clamping, drag handling
//! - [`date_range`], [`url_state`], [`debounce`], [`state`]: the date-range
//!   slots and their URL persistence
//! - [`client`], [`session`], [`search`]: request construction, HTTP, and
//!   the pausable pagination session
//! - [`orchestrator`]: restarts the search when its inputs change

pub mod bbox;
pub mod client;
pub mod date_range;
pub mod debounce;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod search;
pub mod session;
pub mod state;
pub mod temporal;
pub mod url_state;
pub mod window;

pub use bbox::{sanitize, BBox};
pub use client::{find_search_link, first_page_link, PageFetcher, StacClient, StacClientOptions};
pub use date_range::DateRange;
pub use error::{Result, SearchError};
pub use models::{Collection, Item, ItemCollection, Link, SearchRequest, StacValue};
pub use orchestrator::{build_request, SearchOrchestrator};
pub use search::{SearchHandle, SearchSnapshot};
pub use session::{Pagination, Progress, SearchStatus};
pub use state::{MapState, StateOptions};
pub use temporal::{extract_temporal_extent, TemporalExtent};
pub use url_state::{MemoryLocation, UrlStore};
pub use window::{compute_domain, SliderDomain, SlidingWindow};
