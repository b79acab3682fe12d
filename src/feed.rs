//! Paginated restaurant feed with search and infinite scroll.
//!
//! A search session starts on mount and restarts whenever the search term
//! changes. Within a session pages are fetched one at a time, in order, and
//! appended; a response that belongs to an earlier session is dropped.

use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::freshness::{Generation, Ticket};
use crate::model::{PageQuery, RestaurantSummary};
use crate::observable::{Observable, Subscription};

pub const DEFAULT_PAGE_SIZE: usize = 6;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedState {
    /// Everything fetched in the current search session, in fetch order.
    pub items: Vec<RestaurantSummary>,
    /// Index of the last requested page.
    pub page: usize,
    pub has_more: bool,
    pub loading: bool,
    pub search: String,
    pub started: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedPhase {
    Idle,
    Loading { page: usize },
    Loaded { page: usize, has_more: bool },
}

impl FeedState {
    pub fn phase(&self) -> FeedPhase {
        match (self.started, self.loading) {
            (false, _) => FeedPhase::Idle,
            (true, true) => FeedPhase::Loading { page: self.page },
            (true, false) => FeedPhase::Loaded {
                page: self.page,
                has_more: self.has_more,
            },
        }
    }

    /// The "you reached the end" footer.
    pub fn reached_end(&self) -> bool {
        self.started && !self.loading && !self.has_more && !self.items.is_empty()
    }

    pub fn is_empty_result(&self) -> bool {
        self.started && !self.loading && self.items.is_empty()
    }
}

/// One per mounted feed view.
#[derive(Clone)]
pub struct FeedController {
    backend: Arc<dyn Backend>,
    page_size: usize,
    state: Observable<FeedState>,
    generation: Arc<Generation>,
}

impl std::fmt::Debug for FeedController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedController")
            .field("page_size", &self.page_size)
            .finish_non_exhaustive()
    }
}

impl FeedController {
    pub fn new(backend: Arc<dyn Backend>, page_size: usize) -> Self {
        Self {
            backend,
            page_size: page_size.max(1),
            state: Observable::new(FeedState::default()),
            generation: Arc::new(Generation::new()),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn state(&self) -> FeedState {
        self.state.get()
    }

    pub fn subscribe(&self) -> Subscription<FeedState> {
        self.state.subscribe()
    }

    /// Mount: load page zero for the current (initially empty) term.
    pub fn start(&self) -> BoxFuture<'static, ()> {
        let term = self.state.with(|s| s.search.clone());
        self.begin(term)
    }

    /// Restart the feed for a new term. Setting the active term again is a
    /// no-op once the feed has started.
    pub fn set_search_term(&self, term: &str) -> BoxFuture<'static, ()> {
        let term = term.trim().to_string();
        let unchanged = self.state.with(|s| s.started && s.search == term);
        if unchanged {
            return futures::future::ready(()).boxed();
        }
        self.begin(term)
    }

    /// The view saw the last item. Ignored (returns `None`) unless more pages
    /// may exist and nothing is in flight, so duplicate signals are harmless.
    pub fn load_next_page(&self) -> Option<BoxFuture<'static, ()>> {
        let (ticket, term, page) = self.state.update_if(|s| {
            if !s.started || s.loading || !s.has_more {
                return (false, None);
            }
            s.page += 1;
            s.loading = true;
            (true, Some((self.generation.current(), s.search.clone(), s.page)))
        })?;
        Some(self.fetch(ticket, &term, page))
    }

    fn begin(&self, term: String) -> BoxFuture<'static, ()> {
        let ticket = self.state.update(|s| {
            let ticket = self.generation.advance();
            s.items.clear();
            s.page = 0;
            s.has_more = true;
            s.loading = true;
            s.search = term.clone();
            s.started = true;
            ticket
        });
        debug!(search = %term, "feed search session started");
        self.fetch(ticket, &term, 0)
    }

    fn fetch(&self, ticket: Ticket, term: &str, page: usize) -> BoxFuture<'static, ()> {
        let query = PageQuery::new(term, page, self.page_size);
        let page_size = self.page_size;
        let backend = Arc::clone(&self.backend);
        let state = self.state.clone();
        let generation = Arc::clone(&self.generation);
        async move {
            let result = backend.fetch_restaurants(&query).await;
            state.update_if(|s| {
                if !generation.is_current(ticket) {
                    debug!(page, search = ?query.search, "dropping page from superseded search");
                    return (false, ());
                }
                match result {
                    Ok(mut items) => {
                        s.has_more = items.len() >= page_size;
                        items.truncate(page_size);
                        s.items.extend(items);
                    }
                    Err(err) => {
                        warn!(?err, page, "failed to fetch restaurants; stopping pagination");
                        s.has_more = false;
                    }
                }
                s.loading = false;
                (true, ())
            })
        }
        .boxed()
    }
}
