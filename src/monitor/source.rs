//! Where the monitoring loop gets its readings.

use crate::error::Result;
use crate::feed::FeedService;
use crate::readings::FeedFrame;
use std::future::Future;

/// Supplies the current reading to the monitoring loop.
pub trait ReadingSource {
    /// The latest reading, or the all-null sentinel when none exists yet.
    fn current(&self) -> impl Future<Output = Result<FeedFrame>> + Send;
}

impl ReadingSource for FeedService {
    async fn current(&self) -> Result<FeedFrame> {
        self.latest_frame().await
    }
}
