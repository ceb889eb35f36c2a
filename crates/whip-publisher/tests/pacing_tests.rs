//! Media pacing integration tests
//!
//! All tests run on a paused clock so page timing can be asserted exactly.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use whip_publisher::pacer::DEFAULT_PAGE_INTERVAL;
use whip_publisher::publisher::spawn_pacer;
use whip_publisher::{
    shutdown_channel, AudioPage, IceConnectionState, LifecycleMonitor, PaceOutcome, PaceReport,
    PagePacer, PageSource, PeerConnectionState, Result, StartGate, Termination, TrackSink,
    WhipError,
};

struct ScriptedSource {
    pages: VecDeque<AudioPage>,
    fail_at_end: bool,
}

impl ScriptedSource {
    fn from_granules(granules: &[u64]) -> Self {
        Self {
            pages: granules
                .iter()
                .enumerate()
                .map(|(i, g)| AudioPage::new(vec![i as u8; 8], *g))
                .collect(),
            fail_at_end: false,
        }
    }
}

impl PageSource for ScriptedSource {
    fn next_page(&mut self) -> Result<Option<AudioPage>> {
        match self.pages.pop_front() {
            Some(page) => Ok(Some(page)),
            None if self.fail_at_end => Err(WhipError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "corrupt page",
            ))),
            None => Ok(None),
        }
    }
}

/// Produces 20 ms pages forever
struct EndlessSource {
    granule: u64,
}

impl PageSource for EndlessSource {
    fn next_page(&mut self) -> Result<Option<AudioPage>> {
        self.granule += 960;
        Ok(Some(AudioPage::new(vec![0u8; 8], self.granule)))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Written {
    at: Instant,
    payload: Bytes,
    duration: Duration,
}

#[derive(Default)]
struct RecordingSink {
    written: Mutex<Vec<Written>>,
    reject: bool,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.written.lock().unwrap().len()
    }

    fn durations(&self) -> Vec<Duration> {
        self.written.lock().unwrap().iter().map(|w| w.duration).collect()
    }
}

#[async_trait]
impl TrackSink for RecordingSink {
    async fn write(&self, payload: Bytes, duration: Duration) -> Result<()> {
        if self.reject {
            return Err(WhipError::sink("track closed"));
        }
        self.written.lock().unwrap().push(Written {
            at: Instant::now(),
            payload,
            duration,
        });
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_no_writes_before_gate() {
    let sink = Arc::new(RecordingSink::default());
    let gate = StartGate::new();
    let stop = CancellationToken::new();

    let pacer = PagePacer::new(
        ScriptedSource::from_granules(&[0, 960, 1920]),
        sink.clone(),
        DEFAULT_PAGE_INTERVAL,
    );
    let task = {
        let gate = gate.clone();
        let stop = stop.clone();
        tokio::spawn(async move { pacer.run(&gate, &stop).await })
    };

    sleep(Duration::from_secs(5)).await;
    assert_eq!(sink.count(), 0);

    stop.cancel();
    let outcome = task.await.unwrap().unwrap();
    assert_eq!(outcome, PaceOutcome::Stopped(PaceReport::default()));
    assert_eq!(sink.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_pages_are_paced_with_granule_durations() {
    let sink = Arc::new(RecordingSink::default());
    let gate = StartGate::new();

    let pacer = PagePacer::new(
        ScriptedSource::from_granules(&[0, 960, 1920]),
        sink.clone(),
        DEFAULT_PAGE_INTERVAL,
    );
    let task = {
        let gate = gate.clone();
        tokio::spawn(async move { pacer.run(&gate, &CancellationToken::new()).await })
    };

    sleep(Duration::from_millis(250)).await;
    let opened_at = Instant::now();
    assert!(gate.fire());

    let outcome = task.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        PaceOutcome::Finished(PaceReport {
            pages: 3,
            media_time: Duration::from_millis(40),
        })
    );

    let written = sink.written.lock().unwrap().clone();
    assert_eq!(
        written.iter().map(|w| w.duration).collect::<Vec<_>>(),
        vec![Duration::ZERO, Duration::from_millis(20), Duration::from_millis(20)]
    );

    // Payloads arrive untouched and in file order
    for (i, w) in written.iter().enumerate() {
        assert_eq!(w.payload.as_ref(), &[i as u8; 8]);
    }

    // First page on the first tick, then one per interval
    assert_eq!(written[0].at, opened_at);
    assert_eq!(written[1].at - written[0].at, DEFAULT_PAGE_INTERVAL);
    assert_eq!(written[2].at - written[1].at, DEFAULT_PAGE_INTERVAL);
}

#[tokio::test(start_paused = true)]
async fn test_empty_stream_finishes_without_writes() {
    let sink = Arc::new(RecordingSink::default());
    let gate = StartGate::new();
    gate.fire();

    let outcome = PagePacer::new(
        ScriptedSource::from_granules(&[]),
        sink.clone(),
        DEFAULT_PAGE_INTERVAL,
    )
    .run(&gate, &CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(outcome, PaceOutcome::Finished(PaceReport::default()));
    assert_eq!(sink.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_granule_gaps_and_sentinels() {
    let sink = Arc::new(RecordingSink::default());
    let gate = StartGate::new();
    gate.fire();

    // 2.5 ms of samples is floored to 2 ms; the sentinel and the rewind are zero
    let granules = [0, 120, 1080, u64::MAX, 2040, 1000];
    PagePacer::new(
        ScriptedSource::from_granules(&granules),
        sink.clone(),
        DEFAULT_PAGE_INTERVAL,
    )
    .run(&gate, &CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(
        sink.durations(),
        vec![
            Duration::ZERO,
            Duration::from_millis(2),
            Duration::from_millis(20),
            Duration::ZERO,
            Duration::from_millis(20),
            Duration::ZERO,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_connection_failure_before_connect() {
    let sink = Arc::new(RecordingSink::default());
    let gate = StartGate::new();
    let (trigger, shutdown) = shutdown_channel();
    let monitor = LifecycleMonitor::new(gate.clone(), trigger.clone());

    let task = spawn_pacer(
        PagePacer::new(EndlessSource { granule: 0 }, sink.clone(), DEFAULT_PAGE_INTERVAL),
        gate.clone(),
        trigger,
    );

    monitor.handle_ice_state(IceConnectionState::Checking);
    monitor.handle_peer_state(PeerConnectionState::Failed);

    // A late "connected" must not start the stream
    monitor.handle_ice_state(IceConnectionState::Connected);

    task.await.unwrap();
    assert!(matches!(shutdown.wait().await, Some(Termination::ConnectionFailed)));
    assert_eq!(sink.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_connection_failure_while_streaming() {
    let sink = Arc::new(RecordingSink::default());
    let gate = StartGate::new();
    let (trigger, shutdown) = shutdown_channel();
    let monitor = LifecycleMonitor::new(gate.clone(), trigger.clone());

    let task = spawn_pacer(
        PagePacer::new(EndlessSource { granule: 0 }, sink.clone(), DEFAULT_PAGE_INTERVAL),
        gate.clone(),
        trigger,
    );

    monitor.handle_peer_state(PeerConnectionState::Connecting);
    monitor.handle_ice_state(IceConnectionState::Connected);
    assert!(gate.is_open());

    sleep(Duration::from_millis(110)).await;
    let sent = sink.count();
    assert!(sent >= 5);

    monitor.handle_peer_state(PeerConnectionState::Failed);
    task.await.unwrap();

    assert!(matches!(shutdown.wait().await, Some(Termination::ConnectionFailed)));

    sleep(Duration::from_secs(1)).await;
    assert_eq!(sink.count(), sent);
}

#[tokio::test(start_paused = true)]
async fn test_finished_stream_reported_once() {
    let sink = Arc::new(RecordingSink::default());
    let gate = StartGate::new();
    let (trigger, shutdown) = shutdown_channel();
    let monitor = LifecycleMonitor::new(gate.clone(), trigger.clone());

    let task = spawn_pacer(
        PagePacer::new(
            ScriptedSource::from_granules(&[0, 960]),
            sink.clone(),
            DEFAULT_PAGE_INTERVAL,
        ),
        gate,
        trigger.clone(),
    );

    monitor.handle_ice_state(IceConnectionState::Connected);
    task.await.unwrap();

    // The connection failing after the stream ended does not override the result
    monitor.handle_peer_state(PeerConnectionState::Failed);
    assert!(!trigger.terminate(Termination::ConnectionFailed));

    match shutdown.wait().await {
        Some(Termination::StreamFinished(report)) => {
            assert_eq!(report.pages, 2);
            assert_eq!(report.media_time, Duration::from_millis(20));
        }
        other => panic!("unexpected termination: {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_source_error_fails_media() {
    let sink = Arc::new(RecordingSink::default());
    let gate = StartGate::new();
    let (trigger, shutdown) = shutdown_channel();

    let mut source = ScriptedSource::from_granules(&[0, 960]);
    source.fail_at_end = true;

    let task = spawn_pacer(
        PagePacer::new(source, sink.clone(), DEFAULT_PAGE_INTERVAL),
        gate.clone(),
        trigger,
    );
    gate.fire();
    task.await.unwrap();

    assert!(matches!(
        shutdown.wait().await,
        Some(Termination::MediaFailed(WhipError::Io(_)))
    ));
    assert_eq!(sink.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_sink_error_fails_media() {
    let sink = Arc::new(RecordingSink {
        reject: true,
        ..Default::default()
    });
    let gate = StartGate::new();
    let (trigger, shutdown) = shutdown_channel();

    let task = spawn_pacer(
        PagePacer::new(ScriptedSource::from_granules(&[0, 960]), sink, DEFAULT_PAGE_INTERVAL),
        gate.clone(),
        trigger,
    );
    gate.fire();
    task.await.unwrap();

    match shutdown.wait().await {
        Some(Termination::MediaFailed(e)) => assert_eq!(e.stage(), "media"),
        other => panic!("unexpected termination: {:?}", other),
    }
}
