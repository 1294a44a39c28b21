//! Read-only access to the reading store for API clients and the monitor.
//!
//! Two access modes share the store's `latest`/`recent` queries:
//! a point query for the most recent readings, and a continuous feed that
//! re-queries the latest reading on a fixed interval. Every subscriber gets
//! its own lazily polled stream, so dropping the stream is all it takes to
//! stop its polling.

use crate::error::Result;
use crate::readings::{FeedFrame, Reading, ReadingStore};
use futures_util::stream::{self, BoxStream, StreamExt};
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Serves the latest readings on demand and as a feed.
#[derive(Clone)]
pub struct FeedService {
    store: ReadingStore,
    recent_limit: usize,
    interval: Duration,
}

impl FeedService {
    pub fn new(store: ReadingStore) -> Self {
        Self {
            store,
            recent_limit: crate::DEFAULT_RECENT_LIMIT,
            interval: Duration::from_millis(crate::DEFAULT_FEED_INTERVAL_MS),
        }
    }

    /// Number of readings returned by the point query.
    pub fn with_recent_limit(mut self, limit: usize) -> Self {
        self.recent_limit = limit;
        self
    }

    /// Tick interval of the continuous feed.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn store(&self) -> &ReadingStore {
        &self.store
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Most recent readings, newest first. An empty store gives an empty list.
    pub async fn recent(&self) -> Result<Vec<Reading>> {
        self.store.recent(self.recent_limit).await
    }

    /// Most recent readings in wire form, newest first.
    pub async fn recent_frames(&self) -> Result<Vec<FeedFrame>> {
        Ok(self.recent().await?.iter().map(FeedFrame::from).collect())
    }

    /// Latest reading as a feed frame, or the all-null sentinel.
    pub async fn latest_frame(&self) -> Result<FeedFrame> {
        Ok(FeedFrame::from(self.store.latest().await?.as_ref()))
    }

    /// Start a fresh feed for one subscriber.
    ///
    /// The first frame is produced immediately, then one per interval. A
    /// failed store query is logged and that tick is skipped.
    pub fn subscribe(&self) -> BoxStream<'static, FeedFrame> {
        let mut ticker = time::interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        stream::unfold(
            (self.clone(), ticker),
            |(feed, mut ticker)| async move {
                loop {
                    ticker.tick().await;
                    match feed.latest_frame().await {
                        Ok(frame) => return Some((frame, (feed, ticker))),
                        Err(e) => warn!(error = %e, "Feed query failed, skipping tick"),
                    }
                }
            },
        )
        .boxed()
    }

    /// Like [`FeedService::subscribe`], ending once `shutdown` fires.
    pub fn subscribe_until(&self, shutdown: CancellationToken) -> BoxStream<'static, FeedFrame> {
        self.subscribe()
            .take_until(shutdown.cancelled_owned())
            .boxed()
    }
}
