//! Async driver for a [`Pagination`] session.
//!
//! [`SearchHandle::spawn`] starts one tokio task per session. The task asks
//! the state machine for the next cursor, fetches it, applies the page, and
//! repeats until the session is exhausted, errored, or cleared. While paused
//! it parks on a [`Notify`] until [`SearchHandle::resume`].
//!
//! The state lock is a `std::sync::Mutex` and is never held across an
//! `.await`.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::client::PageFetcher;
use crate::error::Result;
use crate::models::{Item, Link, SearchRequest};
use crate::session::{Pagination, Progress, SearchStatus};

/// What observers see after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSnapshot {
    pub status: SearchStatus,
    pub progress: Progress,
    pub in_flight: bool,
}

impl SearchSnapshot {
    fn of(state: &Pagination) -> Self {
        Self {
            status: state.status(),
            progress: state.progress(),
            in_flight: state.is_in_flight(),
        }
    }

    /// Nothing will happen until the user acts.
    pub fn is_settled(&self) -> bool {
        match self.status {
            SearchStatus::Idle | SearchStatus::Exhausted | SearchStatus::Errored(_) => true,
            SearchStatus::Paused => !self.in_flight,
            SearchStatus::FirstRequest | SearchStatus::Fetching => false,
        }
    }
}

struct Shared {
    state: Mutex<Pagination>,
    wake: Notify,
    snapshots: watch::Sender<SearchSnapshot>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Pagination> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn publish(&self, state: &Pagination) {
        self.snapshots.send_replace(SearchSnapshot::of(state));
    }
}

/// A running search session.
///
/// Dropping the handle clears the session and stops its task.
pub struct SearchHandle {
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl SearchHandle {
    /// Start a session for `request` against `search_link`.
    ///
    /// Must be called inside a tokio runtime.
    pub fn spawn<F: PageFetcher>(
        fetcher: Arc<F>,
        search_link: &Link,
        request: SearchRequest,
    ) -> Result<Self> {
        let mut state = Pagination::new();
        let generation = state.start(search_link, request)?;
        let (snapshots, _) = watch::channel(SearchSnapshot::of(&state));
        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            wake: Notify::new(),
            snapshots,
        });
        let task = tokio::spawn(drive(Arc::clone(&shared), fetcher, generation));
        Ok(Self {
            shared,
            task: Some(task),
        })
    }

    /// Stop auto-advancing once the in-flight page, if any, lands.
    pub fn pause(&self) {
        let mut state = self.shared.lock();
        state.pause();
        self.shared.publish(&state);
    }

    pub fn resume(&self) {
        {
            let mut state = self.shared.lock();
            state.resume();
            self.shared.publish(&state);
        }
        self.shared.wake.notify_one();
    }

    /// Discard everything; a page still in flight is dropped when it lands.
    pub fn clear(&self) {
        {
            let mut state = self.shared.lock();
            state.clear();
            self.shared.publish(&state);
        }
        self.shared.wake.notify_one();
    }

    pub fn snapshot(&self) -> SearchSnapshot {
        self.shared.snapshots.borrow().clone()
    }

    pub fn progress(&self) -> Progress {
        self.shared.lock().progress()
    }

    pub fn status(&self) -> SearchStatus {
        self.shared.lock().status()
    }

    /// A copy of the features accumulated so far.
    pub fn items(&self) -> Vec<Item> {
        self.shared.lock().items().to_vec()
    }

    pub fn request(&self) -> Option<SearchRequest> {
        self.shared.lock().request().cloned()
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchSnapshot> {
        self.shared.snapshots.subscribe()
    }

    /// Wait until the session is exhausted, errored, cleared, or paused with
    /// nothing in flight.
    pub async fn settled(&self) -> SearchSnapshot {
        let mut rx = self.subscribe();
        let snapshot = match rx.wait_for(SearchSnapshot::is_settled).await {
            Ok(snapshot) => snapshot.clone(),
            Err(_) => self.snapshot(),
        };
        snapshot
    }

    /// Wait for the driver task to exit. It exits when the session ends or
    /// is cleared, never while merely paused.
    pub async fn join(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    std::panic::resume_unwind(e.into_panic());
                }
            }
        }
    }
}

impl Drop for SearchHandle {
    fn drop(&mut self) {
        self.clear();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn drive<F: PageFetcher>(shared: Arc<Shared>, fetcher: Arc<F>, generation: u64) {
    loop {
        let fetch = {
            let mut state = shared.lock();
            if state.generation() != generation || state.status().is_terminal() {
                debug!(generation, "search driver exiting");
                return;
            }
            let fetch = state.next_fetch();
            shared.publish(&state);
            fetch
        };

        let Some(fetch) = fetch else {
            shared.wake.notified().await;
            continue;
        };

        let outcome = fetcher.fetch_page(&fetch.cursor).await;

        let mut state = shared.lock();
        if state.apply(fetch.generation, outcome) {
            shared.publish(&state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;
    use tokio::sync::Semaphore;

    use crate::error::SearchError;
    use crate::models::ItemCollection;

    /// Serves scripted pages; each fetch waits for one semaphore permit.
    struct ScriptedFetcher {
        pages: Mutex<VecDeque<Result<ItemCollection>>>,
        gate: Semaphore,
        calls: AtomicUsize,
    }

    impl ScriptedFetcher {
        fn new(pages: Vec<Result<ItemCollection>>, permits: usize) -> Arc<Self> {
            Arc::new(Self {
                pages: Mutex::new(pages.into()),
                gate: Semaphore::new(permits),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl PageFetcher for ScriptedFetcher {
        fn fetch_page<'a>(&'a self, _cursor: &'a Link) -> BoxFuture<'a, Result<ItemCollection>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                self.gate.acquire().await.unwrap().forget();
                self.pages
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(ItemCollection::new(Vec::new())))
            })
        }
    }

    fn page(n: usize, matched: Option<u64>, next: Option<&str>) -> ItemCollection {
        let features = (0..n)
            .map(|i| {
                serde_json::from_value(serde_json::json!({"id": format!("item-{i}")})).unwrap()
            })
            .collect();
        let mut page = ItemCollection::new(features);
        page.number_matched = matched;
        if let Some(href) = next {
            page.links.push(Link::new("next", href));
        }
        page
    }

    fn search_link() -> Link {
        Link::new("search", "https://example.com/search")
    }

    async fn settle(times: usize) {
        for _ in 0..times {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn runs_to_exhaustion() {
        let fetcher = ScriptedFetcher::new(
            vec![
                Ok(page(100, Some(150), Some("https://example.com/search?page=2"))),
                Ok(page(50, None, None)),
            ],
            16,
        );
        let mut handle =
            SearchHandle::spawn(Arc::clone(&fetcher), &search_link(), SearchRequest::new())
                .unwrap();
        handle.join().await;

        assert_eq!(handle.status(), SearchStatus::Exhausted);
        assert_eq!(handle.progress(), Progress { accumulated: 150, matched: Some(150) });
        assert_eq!(fetcher.calls(), 2);
        assert!(handle.snapshot().is_settled());
    }

    #[tokio::test]
    async fn pause_halts_after_first_page_until_resumed() {
        let fetcher = ScriptedFetcher::new(
            vec![
                Ok(page(100, Some(500), Some("https://example.com/search?page=2"))),
                Ok(page(100, None, None)),
            ],
            0,
        );
        let handle =
            SearchHandle::spawn(Arc::clone(&fetcher), &search_link(), SearchRequest::new())
                .unwrap();
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.in_flight).await.unwrap();

        handle.pause();
        fetcher.gate.add_permits(1);
        let snapshot = handle.settled().await;
        assert_eq!(snapshot.status, SearchStatus::Paused);
        assert_eq!(snapshot.progress, Progress { accumulated: 100, matched: Some(500) });

        settle(10).await;
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(handle.items().len(), 100);

        handle.resume();
        fetcher.gate.add_permits(1);
        let snapshot = handle.settled().await;
        assert_eq!(snapshot.status, SearchStatus::Exhausted);
        assert_eq!(snapshot.progress.accumulated, 200);
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn clear_while_in_flight_drops_the_page() {
        let fetcher = ScriptedFetcher::new(vec![Ok(page(10, Some(10), None))], 0);
        let mut handle =
            SearchHandle::spawn(Arc::clone(&fetcher), &search_link(), SearchRequest::new())
                .unwrap();
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.in_flight).await.unwrap();

        handle.clear();
        fetcher.gate.add_permits(1);
        handle.join().await;

        assert_eq!(handle.status(), SearchStatus::Idle);
        assert!(handle.items().is_empty());
        assert_eq!(handle.progress(), Progress::default());
    }

    #[tokio::test]
    async fn error_ends_session_with_partial_results() {
        let fetcher = ScriptedFetcher::new(
            vec![
                Ok(page(20, Some(40), Some("https://example.com/search?page=2"))),
                Err(SearchError::InvalidBbox { len: 3 }),
            ],
            2,
        );
        let mut handle =
            SearchHandle::spawn(Arc::clone(&fetcher), &search_link(), SearchRequest::new())
                .unwrap();
        handle.join().await;

        assert!(matches!(handle.status(), SearchStatus::Errored(_)));
        assert_eq!(handle.items().len(), 20);
        handle.resume();
        settle(5).await;
        assert_eq!(fetcher.calls(), 2);
    }
}
