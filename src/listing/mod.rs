//! Cursor-driven iteration over paginated collections.
//!
//! A [`Listing`] walks a collection in one of two directions:
//!
//! - **Backward** (the default) follows the `after` token toward older
//!   things and ends when the server stops handing out tokens or the
//!   configured maximum has been yielded.
//! - **Streaming** follows the `before` token toward newer things and never
//!   ends. An empty page means the caller has caught up; the listing backs
//!   off and asks again.
//!
//! A listing is single-writer: every method that advances it takes
//! `&mut self`. Callers that share one across tasks must serialize access
//! themselves.

use futures::Stream;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::client::{Params, RedditClientError, Transport};
use crate::models::{flatten, Page, Thing};

mod dedup;

pub use dedup::SeenSet;

/// Largest page the API will serve.
pub const MAX_PAGE_SIZE: i32 = 100;
/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: i32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListingMode {
    #[default]
    Backward,
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingState {
    NotStarted,
    FetchingFirstPage,
    Ready,
    FetchingNextPage,
    /// Backward listing ran out of pages. Terminal.
    Exhausted,
    /// A fetch failed for good. Terminal.
    Failed,
}

/// Backoff applied by streaming listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay added per consecutive unproductive attempt.
    pub step: Duration,
    pub max_delay: Duration,
    /// Consecutive failed fetches after which the error is returned.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(5),
            max_delay: Duration::from_secs(180),
            max_attempts: 36,
        }
    }
}

impl RetryPolicy {
    /// `min(tries * step, max_delay)`
    pub fn delay_for(&self, tries: u32) -> Duration {
        self.step.saturating_mul(tries).min(self.max_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingOptions {
    pub mode: ListingMode,
    pub per_request_limit: i32,
    /// Total number of things to yield; negative means unbounded.
    pub maximum_limit: i32,
    pub retry: RetryPolicy,
    /// Bound for the streaming dedup set; `None` keeps every id.
    pub dedup_capacity: Option<usize>,
}

impl Default for ListingOptions {
    fn default() -> Self {
        Self {
            mode: ListingMode::Backward,
            per_request_limit: DEFAULT_PAGE_SIZE,
            maximum_limit: -1,
            retry: RetryPolicy::default(),
            dedup_capacity: None,
        }
    }
}

impl ListingOptions {
    pub fn streaming(mut self) -> Self {
        self.mode = ListingMode::Streaming;
        self
    }

    pub fn with_limit(mut self, per_request_limit: i32) -> Self {
        self.per_request_limit = per_request_limit;
        self
    }

    pub fn with_maximum(mut self, maximum_limit: i32) -> Self {
        self.maximum_limit = maximum_limit;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_dedup_capacity(mut self, capacity: usize) -> Self {
        self.dedup_capacity = Some(capacity);
        self
    }
}

/// Pagination state. Tokens are opaque and only ever echoed back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursor {
    pub after: Option<String>,
    pub before: Option<String>,
    /// Things handed out so far.
    pub count: i32,
    pub per_request_limit: i32,
    pub maximum_limit: i32,
}

impl Cursor {
    fn new(per_request_limit: i32, maximum_limit: i32) -> Self {
        Self {
            per_request_limit,
            maximum_limit,
            ..Default::default()
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.maximum_limit >= 0
    }

    /// How many more things may be yielded, `None` when unbounded.
    pub fn remaining(&self) -> Option<i32> {
        self.is_bounded()
            .then(|| (self.maximum_limit - self.count).max(0))
    }

    /// `limit` for the next backward request. Not sent when non-positive.
    pub fn request_limit(&self) -> i32 {
        match self.remaining() {
            Some(remaining) => self.per_request_limit.min(remaining),
            None => self.per_request_limit,
        }
    }

    fn clear(&mut self) {
        self.after = None;
        self.before = None;
        self.count = 0;
    }
}

pub struct Listing {
    transport: Arc<dyn Transport>,
    path: String,
    params: Params,
    mode: ListingMode,
    retry: RetryPolicy,
    cursor: Cursor,
    state: ListingState,
    buffer: VecDeque<Thing>,
    seen: SeenSet,
    /// Consecutive unproductive streaming attempts; drives the delay.
    tries: u32,
    /// Consecutive failed streaming fetches; drives the ceiling.
    failures: u32,
    cancel: CancelToken,
}

impl Listing {
    pub fn new(transport: Arc<dyn Transport>, path: impl Into<String>, options: ListingOptions) -> Self {
        // Non-positive sizes are kept: the `limit` parameter is then left
        // out and the server picks its default page size.
        let per_request_limit = options.per_request_limit.min(MAX_PAGE_SIZE);
        if per_request_limit != options.per_request_limit {
            warn!(
                "Page size {} out of range, using {}",
                options.per_request_limit, per_request_limit
            );
        }

        Self {
            transport,
            path: path.into(),
            params: Vec::new(),
            mode: options.mode,
            retry: options.retry,
            cursor: Cursor::new(per_request_limit, options.maximum_limit),
            state: ListingState::NotStarted,
            buffer: VecDeque::new(),
            seen: SeenSet::new(options.dedup_capacity),
            tries: 0,
            failures: 0,
            cancel: CancelToken::new(),
        }
    }

    /// Fixed query parameters sent with every request, e.g. `("t", "week")`.
    pub fn with_params<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> ListingState {
        self.state
    }

    pub fn mode(&self) -> ListingMode {
        self.mode
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Ids already emitted by a streaming listing.
    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Back to `NotStarted`: tokens, count and buffered things are dropped.
    /// The streaming dedup set is kept so nothing is emitted twice.
    pub fn reset(&mut self) {
        debug!("Resetting listing {}", self.path);
        self.cursor.clear();
        self.buffer.clear();
        self.state = ListingState::NotStarted;
        self.tries = 0;
        self.failures = 0;
    }

    /// The next thing, fetching pages as needed. `Ok(None)` once a
    /// backward listing is exhausted; a streaming listing only returns on a
    /// thing, a fatal error or cancellation.
    pub async fn next(&mut self) -> Result<Option<Thing>, RedditClientError> {
        loop {
            if let Some(thing) = self.buffer.pop_front() {
                return Ok(Some(thing));
            }
            match self.fetch_batch().await? {
                Some(batch) => self.buffer.extend(batch),
                None => return Ok(None),
            }
        }
    }

    /// The next batch of things: whatever is buffered, otherwise one
    /// freshly fetched page.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Thing>>, RedditClientError> {
        if !self.buffer.is_empty() {
            return Ok(Some(self.buffer.drain(..).collect()));
        }
        self.fetch_batch().await
    }

    /// Drain a backward listing.
    pub async fn collect_all(&mut self) -> Result<Vec<Thing>, RedditClientError> {
        if self.mode == ListingMode::Streaming {
            return Err(RedditClientError::ConfigError(
                "A streaming listing never ends and cannot be collected".to_string(),
            ));
        }
        let mut out = Vec::new();
        while let Some(batch) = self.next_page().await? {
            out.extend(batch);
        }
        Ok(out)
    }

    /// Adapt the listing into a `Stream`. The stream ends after the first
    /// error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Thing, RedditClientError>> {
        futures::stream::unfold(Some(self), |listing| async move {
            let mut listing = listing?;
            match listing.next().await {
                Ok(Some(thing)) => Some((Ok(thing), Some(listing))),
                Ok(None) => None,
                Err(err) => Some((Err(err), None)),
            }
        })
    }

    fn build_query(&self) -> Params {
        let mut query = Params::new();
        match self.mode {
            ListingMode::Backward => {
                let limit = self.cursor.request_limit();
                if limit > 0 {
                    query.push(("limit".to_string(), limit.to_string()));
                }
                if let Some(after) = &self.cursor.after {
                    query.push(("after".to_string(), after.clone()));
                }
                if self.cursor.count > 0 {
                    query.push(("count".to_string(), self.cursor.count.to_string()));
                }
            }
            ListingMode::Streaming => {
                if self.cursor.per_request_limit > 0 {
                    query.push(("limit".to_string(), self.cursor.per_request_limit.to_string()));
                }
                if let Some(before) = &self.cursor.before {
                    query.push(("before".to_string(), before.clone()));
                }
            }
        }
        query.extend(self.params.iter().cloned());
        query
    }

    async fn fetch_page(&self) -> Result<Page, RedditClientError> {
        let query = self.build_query();
        debug!("Fetching {} with {:?}", self.path, query);
        let json = self
            .cancel
            .guard(self.transport.get(&self.path, &query))
            .await?;
        Page::from_value(json)
    }

    fn begin_fetch(&mut self) -> ListingState {
        let previous = self.state;
        self.state = match previous {
            ListingState::NotStarted => ListingState::FetchingFirstPage,
            _ => ListingState::FetchingNextPage,
        };
        previous
    }

    async fn fetch_batch(&mut self) -> Result<Option<Vec<Thing>>, RedditClientError> {
        match self.mode {
            ListingMode::Backward => self.fetch_backward().await,
            ListingMode::Streaming => self.fetch_streaming().await.map(Some),
        }
    }

    async fn fetch_backward(&mut self) -> Result<Option<Vec<Thing>>, RedditClientError> {
        if matches!(self.state, ListingState::Exhausted | ListingState::Failed) {
            return Ok(None);
        }
        if self.cursor.remaining() == Some(0) {
            self.state = ListingState::Exhausted;
            return Ok(None);
        }

        let previous = self.begin_fetch();
        let page = match self.fetch_page().await {
            Ok(page) => page,
            Err(RedditClientError::Cancelled) => {
                self.state = previous;
                return Err(RedditClientError::Cancelled);
            }
            Err(err) => {
                warn!("Listing {} failed: {}", self.path, err);
                self.state = ListingState::Failed;
                return Err(err);
            }
        };

        let mut things = page.things;
        if let Some(remaining) = self.cursor.remaining() {
            things.truncate(remaining as usize);
        }
        self.cursor.count += things.len() as i32;
        self.cursor.after = page.after;
        self.cursor.before = page.before;

        let done = self.cursor.after.is_none() || things.is_empty() || self.cursor.remaining() == Some(0);
        self.state = if done {
            debug!("Listing {} exhausted after {} things", self.path, self.cursor.count);
            ListingState::Exhausted
        } else {
            ListingState::Ready
        };

        if things.is_empty() {
            Ok(None)
        } else {
            Ok(Some(things))
        }
    }

    async fn fetch_streaming(&mut self) -> Result<Vec<Thing>, RedditClientError> {
        loop {
            if self.state == ListingState::Failed {
                return Err(RedditClientError::ApiError(format!(
                    "Stream {} already failed",
                    self.path
                )));
            }

            let previous = self.begin_fetch();
            match self.fetch_page().await {
                Ok(page) => {
                    self.failures = 0;
                    self.state = ListingState::Ready;
                    let fresh = self.absorb_stream_page(page);
                    if !fresh.is_empty() {
                        self.tries = 0;
                        return Ok(fresh);
                    }
                    self.tries = self.tries.saturating_add(1);
                    let delay = self.retry.delay_for(self.tries);
                    debug!(
                        "Stream {} caught up, polling again in {}s",
                        self.path,
                        delay.as_secs()
                    );
                    self.cancel.sleep(delay).await?;
                }
                Err(RedditClientError::Cancelled) => {
                    self.state = previous;
                    return Err(RedditClientError::Cancelled);
                }
                Err(err) => {
                    self.tries = self.tries.saturating_add(1);
                    self.failures += 1;
                    if !err.is_transient() || self.failures >= self.retry.max_attempts {
                        warn!(
                            "Stream {} giving up after {} failed attempts: {}",
                            self.path, self.failures, err
                        );
                        self.state = ListingState::Failed;
                        return Err(err);
                    }
                    self.state = previous;
                    let delay = self.retry.delay_for(self.tries);
                    info!(
                        "Stream {} fetch failed ({}), retrying in {}s",
                        self.path,
                        err,
                        delay.as_secs()
                    );
                    self.cancel.sleep(delay).await?;
                }
            }
        }
    }

    /// Turn a newest-first page into the unseen things, oldest first.
    /// Nested replies are deduped and surfaced as top-level things right
    /// after their parent.
    fn absorb_stream_page(&mut self, page: Page) -> Vec<Thing> {
        let newest = page.things.first().map(|t| t.full_id().to_string());
        if let Some(before) = page.before.or(newest) {
            self.cursor.before = Some(before);
        }

        let mut fresh = Vec::new();
        for thing in page.things.into_iter().rev() {
            let mut entry = match thing {
                Thing::Entry(entry) => entry,
                Thing::Continuation(more) => {
                    debug!("Skipping continuation {} in stream", more.full_id);
                    continue;
                }
            };

            let replies = std::mem::take(&mut entry.replies);
            if self.seen.insert(&entry.full_id) {
                fresh.push(Thing::Entry(entry));
            }
            for reply in flatten(replies) {
                if let Thing::Entry(reply) = reply {
                    if self.seen.insert(&reply.full_id) {
                        fresh.push(Thing::Entry(reply));
                    }
                }
            }
        }

        self.cursor.count += fresh.len() as i32;
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_limit_is_clamped_by_maximum() {
        let mut cursor = Cursor::new(25, 10);
        assert_eq!(cursor.request_limit(), 10);
        cursor.count = 8;
        assert_eq!(cursor.request_limit(), 2);
        cursor.count = 10;
        assert_eq!(cursor.request_limit(), 0);
        assert_eq!(cursor.remaining(), Some(0));
    }

    #[test]
    fn unbounded_cursor_uses_page_size() {
        let cursor = Cursor::new(25, -1);
        assert_eq!(cursor.request_limit(), 25);
        assert_eq!(cursor.remaining(), None);
    }

    #[test]
    fn non_positive_page_size_is_passed_through() {
        let unbounded = Cursor::new(-1, -1);
        assert_eq!(unbounded.request_limit(), -1);

        let bounded = Cursor::new(0, 10);
        assert!(bounded.request_limit() <= 0);
        assert_eq!(bounded.remaining(), Some(10));
    }

    #[test]
    fn retry_delay_grows_linearly_then_caps() {
        let retry = RetryPolicy::default();
        assert_eq!(retry.delay_for(1), Duration::from_secs(5));
        assert_eq!(retry.delay_for(3), Duration::from_secs(15));
        assert_eq!(retry.delay_for(36), Duration::from_secs(180));
        assert_eq!(retry.delay_for(u32::MAX), Duration::from_secs(180));
    }

    #[test]
    fn options_builders_compose() {
        let options = ListingOptions::default()
            .streaming()
            .with_limit(50)
            .with_maximum(200)
            .with_dedup_capacity(1000);
        assert_eq!(options.mode, ListingMode::Streaming);
        assert_eq!(options.per_request_limit, 50);
        assert_eq!(options.maximum_limit, 200);
        assert_eq!(options.dedup_capacity, Some(1000));
    }
}
