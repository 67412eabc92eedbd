//! Threaded processing core
//!
//! Three workers each run on a dedicated thread and own their state
//! exclusively. Callers reach them through cloneable handles; every result
//! comes back as a [`CoreEvent`] on one bounded event channel.
//!
//! # Architecture
//!
//! - [`IngestWorker`] - batches, decodes and filters inbound frames, keeps the
//!   retained buffer and publishes statistics
//! - [`SearchWorker`] - keyword search over the catalog with a result cache
//! - [`TransmitWorker`] - composes outgoing frames and runs periodic tasks
//! - [`Coordinator`] - spawns the workers, routes commands and shuts them down
//!
//! The catalog is the only thing the workers share. It is handed to each of
//! them as an `Arc` and replaced wholesale, never mutated.
//!
//! # Example
//!
//! ```ignore
//! use canvis_rs::backend::{Coordinator, CoreEvent};
//! use canvis_rs::config::AppConfig;
//! use canvis_rs::types::RawFrame;
//!
//! let mut core = Coordinator::start(AppConfig::default())?;
//! core.submit_frame(RawFrame::new(0x100, vec![0x01, 0x02]));
//!
//! for event in core.drain() {
//!     if let CoreEvent::Batch(frames) = event {
//!         // Hand the frames to the display
//!     }
//! }
//! core.shutdown();
//! ```

pub mod filter;
pub mod ingest;
pub mod search;
pub mod search_cache;
pub mod stats;
pub mod transmit;

pub use filter::FilterCriteria;
pub use ingest::{IngestCommand, IngestHandle, IngestWorker};
pub use search::{CatalogSearcher, SearchCommand, SearchHandle, SearchKind, SearchRequest, SearchResult, SearchWorker};
pub use search_cache::{CacheKey, SearchCache};
pub use stats::StatsWindow;
pub use transmit::{PeriodicHandle, TransmitCommand, TransmitHandle, TransmitWorker};

use crate::catalog::SharedCatalog;
use crate::config::{AppConfig, CoordinatorConfig};
use crate::error::{CanVisError, Result};
use crate::types::{ComposedFrame, Frame, PipelineStats, RawFrame, SignalMap};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Event sent from the core to the display/control layer
#[derive(Debug, Clone)]
pub enum CoreEvent {
    /// Frames from one batch cycle that passed the filter
    Batch(Vec<Frame>),
    /// Statistics snapshot
    Statistics(PipelineStats),
    /// Result of re-scanning the retained buffer after a filter update
    FilterApplied(Vec<Frame>),
    /// A frame could not be processed
    ProcessingError(String),
    SearchProgress {
        request_id: u64,
        current: usize,
        total: usize,
    },
    SearchCompleted {
        request_id: u64,
        results: Vec<SearchResult>,
    },
    SearchError {
        request_id: u64,
        message: String,
    },
    /// Response to a compose request
    Composed {
        request_id: u64,
        frame: ComposedFrame,
    },
    /// One periodic tick went out
    Transmitted {
        frame: ComposedFrame,
        sent_count: u64,
    },
    /// Compose or periodic transmission failed
    TransmissionError {
        message_id: u32,
        message: String,
    },
}

/// Non-blocking sender for [`CoreEvent`]s
///
/// The event channel is bounded so a stalled consumer cannot grow memory
/// without limit. Events that do not fit are dropped and counted.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<CoreEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSink {
    pub fn new(tx: Sender<CoreEvent>) -> Self {
        Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Send without blocking. Returns false if the event was dropped.
    pub fn emit(&self, event: CoreEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 1000 == 0 {
                    tracing::warn!("Event channel full, {} events dropped so far", dropped);
                }
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Events dropped because the channel was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// How often an idle worker re-checks its stop flag
pub(crate) const STOP_POLL: Duration = Duration::from_millis(50);

/// Queue a command for `worker` without blocking the caller.
///
/// Fails when the worker is stopping, has exited or its queue is full.
pub(crate) fn try_queue<T>(
    tx: &Sender<T>,
    stopping: &AtomicBool,
    worker: &str,
    command: T,
) -> Result<()> {
    if stopping.load(Ordering::Acquire) {
        return Err(CanVisError::Channel(format!("{} worker is shutting down", worker)));
    }
    match tx.try_send(command) {
        Ok(()) => Ok(()),
        Err(TrySendError::Full(_)) => {
            Err(CanVisError::Channel(format!("{} queue full", worker)))
        }
        Err(TrySendError::Disconnected(_)) => {
            Err(CanVisError::Channel(format!("{} worker is not running", worker)))
        }
    }
}

/// Raise `stopping` and post the stop command if there is room for it.
///
/// A worker whose queue is full still sees the flag once it has served what
/// is queued.
pub(crate) fn request_stop<T>(tx: &Sender<T>, stopping: &AtomicBool, worker: &str, command: T) {
    stopping.store(true, Ordering::Release);
    match tx.try_send(command) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            tracing::debug!("{} queue full, worker will stop on its flag", worker)
        }
        Err(TrySendError::Disconnected(_)) => {
            tracing::debug!("{} worker already stopped", worker)
        }
    }
}

/// Sends the worker's name when its thread exits, including by panic
struct DoneGuard {
    name: &'static str,
    tx: Sender<&'static str>,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        let _ = self.tx.send(self.name);
    }
}

struct WorkerThread {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    finished: bool,
}

/// Owner of the three worker threads and the caller's command surface
pub struct Coordinator {
    config: CoordinatorConfig,
    ingest: IngestHandle,
    search: SearchHandle,
    transmit: TransmitHandle,
    event_rx: Receiver<CoreEvent>,
    sink: EventSink,
    workers: Vec<WorkerThread>,
    done_rx: Receiver<&'static str>,
    shut_down: bool,
}

impl Coordinator {
    /// Spawn the workers
    pub fn start(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let coordinator_config = config.coordinator.clone();
        let capacity = coordinator_config.command_capacity;

        let (event_tx, event_rx) = bounded(coordinator_config.event_capacity);
        let sink = EventSink::new(event_tx);
        let (done_tx, done_rx) = bounded(3);

        let (mut ingest_worker, ingest) = IngestWorker::new(config.pipeline, sink.clone(), capacity);
        let (mut search_worker, search) = SearchWorker::new(config.search, sink.clone(), capacity);
        let (mut transmit_worker, transmit) =
            TransmitWorker::new(config.transmit, sink.clone(), Some(ingest.clone()), capacity);

        let mut coordinator = Self {
            config: coordinator_config,
            ingest,
            search,
            transmit,
            event_rx,
            sink,
            workers: Vec::with_capacity(3),
            done_rx,
            shut_down: false,
        };

        coordinator.spawn("canvis-ingest", done_tx.clone(), move || ingest_worker.run())?;
        coordinator.spawn("canvis-search", done_tx.clone(), move || search_worker.run())?;
        coordinator.spawn("canvis-transmit", done_tx, move || transmit_worker.run())?;

        tracing::info!("Coordinator started");
        Ok(coordinator)
    }

    fn spawn(
        &mut self,
        name: &'static str,
        done_tx: Sender<&'static str>,
        body: impl FnOnce() + Send + 'static,
    ) -> Result<()> {
        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _guard = DoneGuard { name, tx: done_tx };
                body();
            })
            .map_err(|e| {
                tracing::error!("Failed to spawn {}: {}", name, e);
                e
            })?;
        self.workers.push(WorkerThread {
            name,
            handle: Some(handle),
            finished: false,
        });
        Ok(())
    }

    /// Queue a raw frame. Returns false when processing is disabled.
    pub fn submit_frame(&self, frame: RawFrame) -> bool {
        self.ingest.submit(frame)
    }

    /// Queue several frames; returns how many were accepted
    pub fn submit_frames(&self, frames: impl IntoIterator<Item = RawFrame>) -> usize {
        self.ingest.submit_all(frames)
    }

    /// Replace the filter. Fails without blocking when the ingestion queue
    /// is full.
    pub fn update_filter(&self, criteria: FilterCriteria) -> Result<()> {
        self.ingest.update_filter(criteria)
    }

    pub fn set_processing_enabled(&self, enabled: bool) {
        self.ingest.set_processing_enabled(enabled);
    }

    pub fn is_processing_enabled(&self) -> bool {
        self.ingest.is_processing_enabled()
    }

    /// Hand a catalog (or none) to every worker.
    ///
    /// Every worker is offered the catalog; the first refusal is returned.
    pub fn set_catalog(&self, catalog: Option<SharedCatalog>) -> Result<()> {
        let ingest = self.ingest.set_catalog(catalog.clone());
        let search = self.search.set_catalog(catalog.clone());
        let transmit = self.transmit.set_catalog(catalog);
        ingest.and(search).and(transmit)
    }

    /// Queue a search. A refused request is answered with `SearchError`.
    pub fn search(&self, request: SearchRequest) -> bool {
        self.search.search(request)
    }

    /// Queue a compose request. A refused request is answered with
    /// `TransmissionError`.
    pub fn compose(&self, request_id: u64, message_id: u32, values: SignalMap) -> bool {
        self.transmit.compose(request_id, message_id, values)
    }

    pub fn start_periodic(&self, message_id: u32, values: SignalMap, interval_ms: u64) -> PeriodicHandle {
        self.transmit.start_periodic(message_id, values, interval_ms)
    }

    pub fn stop_periodic(&self, message_id: u32) -> bool {
        self.transmit.stop_periodic(message_id)
    }

    pub fn request_stats(&self) -> Result<()> {
        self.ingest.request_stats()
    }

    /// Drop retained frames and repeat counts
    pub fn clear(&self) -> Result<()> {
        self.ingest.clear()
    }

    pub fn retained_len(&self) -> usize {
        self.ingest.retained_len()
    }

    /// Events dropped because the consumer fell behind
    pub fn dropped_events(&self) -> u64 {
        self.sink.dropped()
    }

    pub fn ingest(&self) -> &IngestHandle {
        &self.ingest
    }

    pub fn transmit(&self) -> &TransmitHandle {
        &self.transmit
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&self) -> Option<CoreEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event
    pub fn recv_timeout(&self, timeout: Duration) -> Option<CoreEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    /// Receive all pending events
    pub fn drain(&self) -> Vec<CoreEvent> {
        self.event_rx.try_iter().collect()
    }

    /// Stop all workers, waiting up to the configured timeout.
    ///
    /// Never blocks on a worker's queue. Returns true when every worker
    /// finished in time. Workers that did not are detached.
    pub fn shutdown(&mut self) -> bool {
        if self.shut_down {
            return self.workers.iter().all(|w| w.finished);
        }
        self.shut_down = true;
        tracing::info!("Shutting down coordinator");

        self.transmit.stop_all();
        self.ingest.shutdown();
        self.search.shutdown();
        self.transmit.shutdown();

        let deadline = Instant::now() + self.config.shutdown_timeout();
        while self.workers.iter().any(|w| !w.finished) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.done_rx.recv_timeout(remaining) {
                Ok(name) => {
                    if let Some(worker) = self.workers.iter_mut().find(|w| w.name == name) {
                        worker.finished = true;
                    }
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let mut clean = true;
        for worker in &mut self.workers {
            let Some(handle) = worker.handle.take() else {
                continue;
            };
            if worker.finished {
                if handle.join().is_err() {
                    tracing::warn!("Worker {} panicked", worker.name);
                }
            } else {
                tracing::warn!(
                    "Worker {} did not stop within {:?}, detaching",
                    worker.name,
                    self.config.shutdown_timeout()
                );
                clean = false;
            }
        }

        tracing::info!("Coordinator stopped");
        clean
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_sink_counts_drops() {
        let (tx, rx) = bounded(2);
        let sink = EventSink::new(tx);
        assert!(sink.emit(CoreEvent::ProcessingError("a".into())));
        assert!(sink.emit(CoreEvent::ProcessingError("b".into())));
        assert!(!sink.emit(CoreEvent::ProcessingError("c".into())));

        // Clones share the counter
        let clone = sink.clone();
        assert!(!clone.emit(CoreEvent::ProcessingError("d".into())));
        assert_eq!(sink.dropped(), 2);

        drop(rx);
        assert!(!sink.emit(CoreEvent::ProcessingError("e".into())));
        assert_eq!(sink.dropped(), 2);
    }

    #[test]
    fn test_coordinator_start_and_shutdown() {
        let mut core = Coordinator::start(AppConfig::default()).unwrap();
        assert_eq!(core.workers.len(), 3);
        assert!(core.is_processing_enabled());
        assert!(core.shutdown());
        // Second call is a no-op
        assert!(core.shutdown());
    }

    #[test]
    fn test_search_without_catalog() {
        let core = Coordinator::start(AppConfig::default()).unwrap();
        core.search(SearchRequest::new(3, "x", SearchKind::Message));
        match core.recv_timeout(Duration::from_secs(2)) {
            Some(CoreEvent::SearchError { request_id, .. }) => assert_eq!(request_id, 3),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
