//! Real-time page pacer
//!
//! Releases one container page per tick into a [`TrackSink`], with the
//! page's playout duration derived from its granule position. The ticker is
//! scheduled against its start instant, so time spent parsing and writing a
//! page does not push later pages back.

use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::error::Result;
use crate::gate::StartGate;
use crate::granule::GranuleClock;
use crate::page::PageSource;
use crate::sink::TrackSink;

/// Default page cadence for 20 ms Opus pages
pub const DEFAULT_PAGE_INTERVAL: Duration = Duration::from_millis(20);

/// Summary of a completed pacing run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PaceReport {
    /// Pages handed to the sink
    pub pages: u64,
    /// Sum of the durations handed to the sink
    pub media_time: Duration,
}

/// How a pacing run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceOutcome {
    /// The container ran out of pages
    Finished(PaceReport),
    /// The run was stopped from outside
    Stopped(PaceReport),
}

/// Paces pages from a source into a sink
pub struct PagePacer<P, K> {
    source: P,
    sink: K,
    interval: Duration,
    clock: GranuleClock,
}

impl<P, K> PagePacer<P, K>
where
    P: PageSource,
    K: TrackSink,
{
    /// Create a pacer releasing one page per `interval`
    pub fn new(source: P, sink: K, interval: Duration) -> Self {
        Self {
            source,
            sink,
            interval,
            clock: GranuleClock::default(),
        }
    }

    /// Run until the source is exhausted, `stop` is cancelled, or an error.
    ///
    /// Nothing is read from the source before `gate` opens.
    pub async fn run(mut self, gate: &StartGate, stop: &CancellationToken) -> Result<PaceOutcome> {
        let mut report = PaceReport::default();

        tokio::select! {
            biased;
            _ = stop.cancelled() => {
                debug!("Pacer stopped before the connection came up");
                return Ok(PaceOutcome::Stopped(report));
            }
            _ = gate.opened() => {}
        }

        info!("Connection established, pacing pages every {:?}", self.interval);

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => {
                    debug!("Pacer stopped after {} pages", report.pages);
                    return Ok(PaceOutcome::Stopped(report));
                }
                _ = ticker.tick() => {}
            }

            let page = match self.source.next_page()? {
                Some(page) => page,
                None => {
                    info!(
                        "All audio pages parsed and sent ({} pages, {:?} of audio)",
                        report.pages, report.media_time
                    );
                    return Ok(PaceOutcome::Finished(report));
                }
            };

            let duration = self.clock.advance(page.granule_position);
            trace!(
                "Page {} granule={} bytes={} duration={:?}",
                report.pages,
                page.granule_position,
                page.payload.len(),
                duration
            );

            self.sink.write(page.payload, duration).await?;

            report.pages += 1;
            report.media_time += duration;
        }
    }
}
