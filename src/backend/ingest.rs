//! Ingestion & decode worker
//!
//! Frames arrive from any thread through [`IngestHandle::submit`], which only
//! appends to the pending list and nudges the worker. The worker thread owns
//! the filter, the catalog reference and the statistics, and runs batch
//! cycles:
//!
//! 1. Drain up to `batch_size` pending frames (pending lock only)
//! 2. Normalise, count and decode each frame independently
//! 3. Evaluate the filter
//! 4. Append every frame to the retained buffer (buffer lock only)
//! 5. Emit the frames that passed as one batch
//!
//! # Debounce
//!
//! The first frame after an idle period arms a cycle one batch window out.
//! Reaching `batch_size` pending frames fires the cycle at once. Backlog left
//! after a cycle arms a follow-up cycle right away instead of waiting for a
//! full window.
//!
//! Filter updates, catalog swaps and cycles all run on the worker thread, so
//! a re-scan never interleaves with a cycle.
//!
//! # Shutdown
//!
//! Stopping closes the submission gate and the worker flushes only the frames
//! that were pending at that moment.

use crate::backend::filter::FilterCriteria;
use crate::backend::stats::StatsWindow;
use crate::backend::{request_stop, try_queue, CoreEvent, EventSink};
use crate::catalog::SharedCatalog;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::types::{Frame, RawFrame};
use crossbeam_channel::{select, Receiver, Sender, TrySendError};
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Commands processed on the ingestion worker thread
#[derive(Clone)]
pub enum IngestCommand {
    /// Replace the filter and re-scan the retained buffer
    UpdateFilter(FilterCriteria),
    /// Swap the catalog reference
    SetCatalog(Option<SharedCatalog>),
    /// Drop retained frames and per-id counts
    Clear,
    /// Emit a statistics snapshot now
    RequestStats,
    /// Flush pending frames and stop
    Shutdown,
}

impl std::fmt::Debug for IngestCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestCommand::UpdateFilter(c) => f.debug_tuple("UpdateFilter").field(c).finish(),
            IngestCommand::SetCatalog(c) => f.debug_tuple("SetCatalog").field(&c.is_some()).finish(),
            IngestCommand::Clear => write!(f, "Clear"),
            IngestCommand::RequestStats => write!(f, "RequestStats"),
            IngestCommand::Shutdown => write!(f, "Shutdown"),
        }
    }
}

/// Containers shared between producers and the worker
#[derive(Debug)]
struct IngestShared {
    /// Frames submitted but not yet processed
    pending: Mutex<Vec<RawFrame>>,
    /// Processed frames kept for filter re-scans, oldest first
    buffer: Mutex<VecDeque<Frame>>,
    /// Submission gate
    processing_enabled: AtomicBool,
    /// Set once shutdown was requested
    stopping: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Producer-side handle to the ingestion worker
#[derive(Debug, Clone)]
pub struct IngestHandle {
    shared: Arc<IngestShared>,
    wake_tx: Sender<()>,
    command_tx: Sender<IngestCommand>,
}

impl IngestHandle {
    fn accepting(&self) -> bool {
        self.shared.processing_enabled.load(Ordering::Acquire)
            && !self.shared.stopping.load(Ordering::Acquire)
    }

    /// Queue a frame. Never blocks; returns false when processing is disabled
    /// or the worker is stopping.
    pub fn submit(&self, frame: RawFrame) -> bool {
        if !self.accepting() {
            tracing::trace!("Processing disabled, dropping frame 0x{:X}", frame.id);
            return false;
        }
        lock(&self.shared.pending).push(frame);
        self.wake();
        true
    }

    /// Queue several frames under one lock acquisition
    pub fn submit_all(&self, frames: impl IntoIterator<Item = RawFrame>) -> usize {
        if !self.accepting() {
            return 0;
        }
        let accepted = {
            let mut pending = lock(&self.shared.pending);
            let before = pending.len();
            pending.extend(frames);
            pending.len() - before
        };
        if accepted > 0 {
            self.wake();
        }
        accepted
    }

    fn wake(&self) {
        // A full slot means a wake-up is already queued
        match self.wake_tx.try_send(()) {
            Ok(()) | Err(TrySendError::Full(())) => {}
            Err(TrySendError::Disconnected(())) => {
                tracing::debug!("Ingestion worker gone, frame left pending");
            }
        }
    }

    /// Replace the filter; the worker re-scans the retained buffer
    pub fn update_filter(&self, criteria: FilterCriteria) -> Result<()> {
        self.send(IngestCommand::UpdateFilter(criteria))
    }

    /// Open or close the submission gate
    pub fn set_processing_enabled(&self, enabled: bool) {
        self.shared
            .processing_enabled
            .store(enabled, Ordering::Release);
        tracing::info!(
            "Frame processing {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub fn is_processing_enabled(&self) -> bool {
        self.shared.processing_enabled.load(Ordering::Acquire)
    }

    pub fn set_catalog(&self, catalog: Option<SharedCatalog>) -> Result<()> {
        self.send(IngestCommand::SetCatalog(catalog))
    }

    pub fn clear(&self) -> Result<()> {
        self.send(IngestCommand::Clear)
    }

    pub fn request_stats(&self) -> Result<()> {
        self.send(IngestCommand::RequestStats)
    }

    /// Close the submission gate and ask the worker to flush and stop
    pub fn shutdown(&self) {
        request_stop(
            &self.command_tx,
            &self.shared.stopping,
            "ingestion",
            IngestCommand::Shutdown,
        );
    }

    /// Frames currently retained
    pub fn retained_len(&self) -> usize {
        lock(&self.shared.buffer).len()
    }

    /// Copy of the retained frames, oldest first
    pub fn retained_frames(&self) -> Vec<Frame> {
        lock(&self.shared.buffer).iter().cloned().collect()
    }

    /// Frames waiting for a cycle
    pub fn pending_len(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    fn send(&self, command: IngestCommand) -> Result<()> {
        try_queue(&self.command_tx, &self.shared.stopping, "ingestion", command)
    }
}

/// The ingestion worker state, owned by its thread
pub struct IngestWorker {
    config: PipelineConfig,
    shared: Arc<IngestShared>,
    command_rx: Receiver<IngestCommand>,
    wake_rx: Receiver<()>,
    events: EventSink,
    catalog: Option<SharedCatalog>,
    filter: FilterCriteria,
    stats: StatsWindow,
    /// Occurrences per identifier
    occurrences: HashMap<u32, u64>,
    /// When the next batch cycle is due
    next_cycle: Option<Instant>,
    running: bool,
}

impl IngestWorker {
    /// Create a worker and the handle producers use to reach it
    pub fn new(
        config: PipelineConfig,
        events: EventSink,
        command_capacity: usize,
    ) -> (Self, IngestHandle) {
        let (command_tx, command_rx) = crossbeam_channel::bounded(command_capacity);
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(1);
        let shared = Arc::new(IngestShared {
            pending: Mutex::new(Vec::new()),
            buffer: Mutex::new(VecDeque::with_capacity(config.max_buffer_size.min(65_536))),
            processing_enabled: AtomicBool::new(true),
            stopping: AtomicBool::new(false),
        });

        let worker = Self {
            stats: StatsWindow::new(config.stats_window()),
            config,
            shared: shared.clone(),
            command_rx,
            wake_rx,
            events,
            catalog: None,
            filter: FilterCriteria::default(),
            occurrences: HashMap::new(),
            next_cycle: None,
            running: true,
        };
        let handle = IngestHandle {
            shared,
            wake_tx,
            command_tx,
        };
        (worker, handle)
    }

    /// Run the worker loop until shutdown
    pub fn run(&mut self) {
        tracing::info!(
            "Ingestion worker started (batch {} / {} ms, buffer {})",
            self.config.batch_size,
            self.config.batch_window_ms,
            self.config.max_buffer_size
        );

        let command_rx = self.command_rx.clone();
        let wake_rx = self.wake_rx.clone();

        while self.running {
            let timeout = self
                .next_deadline()
                .saturating_duration_since(Instant::now());

            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(_) => self.running = false,
                },
                recv(wake_rx) -> wake => match wake {
                    Ok(()) => self.on_frames_pending(Instant::now()),
                    Err(_) => self.running = false,
                },
                default(timeout) => {}
            }

            self.service_timers(Instant::now());

            if self.shared.stopping.load(Ordering::Acquire) && command_rx.is_empty() {
                self.running = false;
            }
        }

        let flushed = self.flush_pending();
        if flushed > 0 {
            tracing::info!("Flushed {} pending frames on shutdown", flushed);
        }
        tracing::info!("Ingestion worker stopped");
    }

    /// Process the frames pending right now, ignoring later arrivals
    fn flush_pending(&mut self) -> usize {
        let mut remaining = lock(&self.shared.pending).len();
        let mut flushed = 0;
        while remaining > 0 {
            let drained = self.run_cycle();
            if drained == 0 {
                break;
            }
            flushed += drained;
            remaining = remaining.saturating_sub(drained);
        }
        flushed
    }

    fn next_deadline(&self) -> Instant {
        let stats_deadline = self.stats.window_deadline();
        match self.next_cycle {
            Some(cycle) => cycle.min(stats_deadline),
            None => stats_deadline,
        }
    }

    fn handle_command(&mut self, cmd: IngestCommand) {
        match cmd {
            IngestCommand::UpdateFilter(criteria) => self.apply_filter(criteria),
            IngestCommand::SetCatalog(catalog) => {
                tracing::info!(
                    "Ingestion catalog {}",
                    if catalog.is_some() { "set" } else { "cleared" }
                );
                self.catalog = catalog;
            }
            IngestCommand::Clear => {
                lock(&self.shared.buffer).clear();
                self.occurrences.clear();
                self.send_stats();
            }
            IngestCommand::RequestStats => self.send_stats(),
            IngestCommand::Shutdown => self.running = false,
        }
    }

    /// Arm or advance the batch timer after new frames arrived
    fn on_frames_pending(&mut self, now: Instant) {
        let pending = lock(&self.shared.pending).len();
        if pending == 0 {
            return;
        }
        if pending >= self.config.batch_size {
            self.next_cycle = Some(now);
        } else if self.next_cycle.is_none() {
            self.next_cycle = Some(now + self.config.batch_window());
        }
    }

    fn service_timers(&mut self, now: Instant) {
        if self.next_cycle.is_some_and(|due| due <= now) {
            self.run_cycle();
        }

        if self.stats.poll(Instant::now())
            && self.shared.processing_enabled.load(Ordering::Acquire)
        {
            self.send_stats();
        }
    }

    /// Process one batch. Returns the number of frames drained.
    fn run_cycle(&mut self) -> usize {
        self.next_cycle = None;

        let (drained, remaining) = {
            let mut pending = lock(&self.shared.pending);
            let take = pending.len().min(self.config.batch_size);
            let drained: Vec<RawFrame> = pending.drain(..take).collect();
            (drained, pending.len())
        };
        if drained.is_empty() {
            return 0;
        }
        let drained_len = drained.len();

        let started = Instant::now();
        let mut frames = Vec::with_capacity(drained_len);
        for raw in drained {
            match Frame::from_raw(raw) {
                Ok(mut frame) => {
                    let count = self.occurrences.entry(frame.id).or_insert(0);
                    *count += 1;
                    frame.count = *count;
                    self.decode_frame(&mut frame);
                    frames.push(frame);
                }
                Err(e) => {
                    tracing::error!("Dropping frame: {}", e);
                    self.events.emit(CoreEvent::ProcessingError(e.to_string()));
                }
            }
        }

        let passed: Vec<Frame> = frames
            .iter()
            .filter(|f| self.filter.matches(f))
            .cloned()
            .collect();

        let processed = frames.len() as u64;
        {
            let mut buffer = lock(&self.shared.buffer);
            buffer.extend(frames);
            let excess = buffer.len().saturating_sub(self.config.max_buffer_size);
            if excess > 0 {
                buffer.drain(..excess);
            }
        }

        self.stats
            .record_cycle(processed, passed.len() as u64, started.elapsed());
        tracing::debug!(
            "Batch cycle: {} processed, {} passed, {} still pending",
            processed,
            passed.len(),
            remaining
        );

        if !passed.is_empty() {
            self.events.emit(CoreEvent::Batch(passed));
        }

        if remaining > 0 {
            let delay = if remaining >= self.config.batch_size {
                Duration::ZERO
            } else {
                self.config.follow_up()
            };
            self.next_cycle = Some(Instant::now() + delay);
        }

        drained_len
    }

    /// Decode one frame; failures leave the frame undecoded
    fn decode_frame(&mut self, frame: &mut Frame) {
        let Some(catalog) = self.catalog.as_ref() else {
            return;
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            (
                catalog.message_name(frame.id),
                catalog.decode(frame.id, &frame.data),
            )
        }));

        match outcome {
            Ok((name, Ok(signals))) => {
                frame.message_name = name;
                self.stats.record_decode(signals.is_some());
                frame.signals = signals;
            }
            Ok((name, Err(e))) => {
                frame.message_name = name;
                tracing::warn!("Decode failed for {}: {}", frame.id_label(), e);
                self.stats.record_decode(false);
            }
            Err(_) => {
                tracing::warn!("Catalog panicked decoding {}", frame.id_label());
                self.stats.record_decode(false);
            }
        }
    }

    /// Swap the filter and re-scan the retained buffer
    fn apply_filter(&mut self, criteria: FilterCriteria) {
        self.filter = criteria;

        let started = Instant::now();
        let passed: Vec<Frame> = {
            let buffer = lock(&self.shared.buffer);
            buffer
                .iter()
                .filter(|f| self.filter.matches(f))
                .cloned()
                .collect()
        };
        tracing::debug!(
            "Filter re-scan: {} frames passed in {:?}",
            passed.len(),
            started.elapsed()
        );

        self.stats.record_rescan(passed.len() as u64);
        self.events.emit(CoreEvent::FilterApplied(passed));
        self.send_stats();
    }

    fn send_stats(&mut self) {
        let buffer_len = lock(&self.shared.buffer).len();
        let snapshot = self.stats.snapshot(buffer_len, self.events.dropped());
        self.events.emit(CoreEvent::Statistics(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{InMemoryCatalog, MessageDef, SignalDef};
    use crate::types::Direction;
    use crossbeam_channel::bounded;

    fn create_test_worker(
        config: PipelineConfig,
    ) -> (IngestWorker, IngestHandle, Receiver<CoreEvent>) {
        let (event_tx, event_rx) = bounded(1024);
        let (worker, handle) = IngestWorker::new(config, EventSink::new(event_tx), 16);
        (worker, handle, event_rx)
    }

    fn batches(rx: &Receiver<CoreEvent>) -> Vec<Vec<Frame>> {
        rx.try_iter()
            .filter_map(|e| match e {
                CoreEvent::Batch(frames) => Some(frames),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_cycle_drains_at_most_batch_size() {
        let config = PipelineConfig {
            batch_size: 3,
            ..Default::default()
        };
        let (mut worker, handle, rx) = create_test_worker(config);
        for i in 0..5 {
            handle.submit(RawFrame::new(0x100 + i, vec![0u8; 8]));
        }

        assert_eq!(worker.run_cycle(), 3);
        assert_eq!(handle.pending_len(), 2);
        assert!(worker.next_cycle.is_some());
        assert_eq!(worker.run_cycle(), 2);

        let sizes: Vec<usize> = batches(&rx).iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 2]);
        assert_eq!(handle.retained_len(), 5);
    }

    #[test]
    fn test_buffer_evicts_oldest() {
        let config = PipelineConfig {
            max_buffer_size: 4,
            ..Default::default()
        };
        let (mut worker, handle, _rx) = create_test_worker(config);
        for i in 0..6 {
            handle.submit(RawFrame::new(i, vec![]));
        }
        worker.run_cycle();

        let ids: Vec<u32> = handle.retained_frames().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_disabled_processing_drops_frames() {
        let (_worker, handle, _rx) = create_test_worker(PipelineConfig::default());
        handle.set_processing_enabled(false);
        assert!(!handle.submit(RawFrame::new(0x100, vec![])));
        assert_eq!(handle.submit_all(vec![RawFrame::new(0x100, vec![])]), 0);
        assert_eq!(handle.pending_len(), 0);
    }

    #[test]
    fn test_timer_arming() {
        let config = PipelineConfig {
            batch_size: 2,
            batch_window_ms: 20,
            ..Default::default()
        };
        let (mut worker, handle, _rx) = create_test_worker(config);
        let now = Instant::now();

        worker.on_frames_pending(now);
        assert!(worker.next_cycle.is_none(), "nothing pending, nothing armed");

        handle.submit(RawFrame::new(1, vec![]));
        worker.on_frames_pending(now);
        assert_eq!(worker.next_cycle, Some(now + Duration::from_millis(20)));

        // Already armed: a later wake does not push the deadline out
        worker.on_frames_pending(now + Duration::from_millis(5));
        assert_eq!(worker.next_cycle, Some(now + Duration::from_millis(20)));

        handle.submit(RawFrame::new(2, vec![]));
        worker.on_frames_pending(now + Duration::from_millis(6));
        assert_eq!(worker.next_cycle, Some(now + Duration::from_millis(6)));
    }

    #[test]
    fn test_invalid_frame_reports_error() {
        let (mut worker, handle, rx) = create_test_worker(PipelineConfig::default());
        handle.submit(RawFrame::new(0x100, vec![0u8; 12]));
        handle.submit(RawFrame::new(0x101, vec![0u8; 8]));
        worker.run_cycle();

        let events: Vec<CoreEvent> = rx.try_iter().collect();
        assert!(events
            .iter()
            .any(|e| matches!(e, CoreEvent::ProcessingError(msg) if msg.contains("0x100"))));
        assert_eq!(handle.retained_len(), 1);
    }

    #[test]
    fn test_decode_and_repeat_count() {
        let catalog = InMemoryCatalog::default().with_message(
            MessageDef::new("Engine_Data", 0x200, 2).with_signal(SignalDef::new("Rpm", 0, 16)),
        );
        let (mut worker, handle, rx) = create_test_worker(PipelineConfig::default());
        worker.handle_command(IngestCommand::SetCatalog(Some(Arc::new(catalog))));

        handle.submit(RawFrame::new(0x200, vec![0x10, 0x00]));
        handle.submit(RawFrame::new(0x200, vec![0x20, 0x00]));
        handle.submit(RawFrame::new(0x300, vec![0x20, 0x00]));
        worker.run_cycle();

        let frames = batches(&rx).concat();
        assert_eq!(frames[0].message_name.as_deref(), Some("Engine_Data"));
        assert_eq!(frames[0].signals.as_ref().unwrap()["Rpm"], 16.0);
        assert_eq!(frames[1].count, 2);
        assert!(frames[2].signals.is_none());
        assert_eq!(frames[2].count, 1);
        // 2 of 3 attempts produced signals
        assert!((worker.stats.decode_success_rate() - 66.666).abs() < 0.01);
    }

    #[test]
    fn test_filter_rescan_is_emitted_with_stats() {
        let (mut worker, handle, rx) = create_test_worker(PipelineConfig::default());
        handle.submit(RawFrame::new(0x050, vec![]));
        handle.submit(RawFrame::new(0x120, vec![]));
        handle.submit(RawFrame::new(0x150, vec![]).with_direction(Direction::Tx));
        worker.run_cycle();
        let _ = batches(&rx);

        worker.handle_command(IngestCommand::UpdateFilter(
            FilterCriteria::enabled()
                .id_range(0x100, 0x1FF)
                .direction(Direction::Rx),
        ));

        let events: Vec<CoreEvent> = rx.try_iter().collect();
        let applied = events.iter().find_map(|e| match e {
            CoreEvent::FilterApplied(frames) => Some(frames.clone()),
            _ => None,
        });
        let ids: Vec<u32> = applied.unwrap().iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![0x120]);
        assert!(events.iter().any(
            |e| matches!(e, CoreEvent::Statistics(s) if s.filtered_count == 1 && s.buffer_len == 3)
        ));
    }

    #[test]
    fn test_shutdown_closes_gate_and_flushes_only_pending() {
        let config = PipelineConfig {
            batch_size: 2,
            ..Default::default()
        };
        let (mut worker, handle, rx) = create_test_worker(config);
        for i in 0..3 {
            handle.submit(RawFrame::new(i, vec![]));
        }

        handle.shutdown();
        assert!(!handle.submit(RawFrame::new(0x10, vec![])));
        assert!(handle.update_filter(FilterCriteria::enabled()).is_err());

        // A producer that raced the gate
        lock(&handle.shared.pending).push(RawFrame::new(0x20, vec![]));
        lock(&handle.shared.pending).push(RawFrame::new(0x21, vec![]));
        lock(&handle.shared.pending).push(RawFrame::new(0x22, vec![]));

        // The six frames pending now are flushed, then the worker stops
        assert_eq!(worker.flush_pending(), 6);
        assert_eq!(batches(&rx).concat().len(), 6);

        lock(&handle.shared.pending).push(RawFrame::new(0x30, vec![]));
        worker.run();
        assert_eq!(handle.pending_len(), 0);
        assert_eq!(handle.retained_len(), 7);
    }

    #[test]
    fn test_full_command_queue_is_reported() {
        let (event_tx, _event_rx) = bounded(16);
        let (_worker, handle) = IngestWorker::new(PipelineConfig::default(), EventSink::new(event_tx), 1);
        assert!(handle.request_stats().is_ok());
        assert!(handle.request_stats().is_err());
        // Shutdown still gets through to the flag
        handle.shutdown();
        assert!(handle.shared.stopping.load(Ordering::Acquire));
    }

    #[test]
    fn test_clear_resets_buffer_and_counts() {
        let (mut worker, handle, _rx) = create_test_worker(PipelineConfig::default());
        handle.submit(RawFrame::new(0x10, vec![]));
        worker.run_cycle();
        worker.handle_command(IngestCommand::Clear);
        assert_eq!(handle.retained_len(), 0);
        assert!(worker.occurrences.is_empty());
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn test_buffer_keeps_newest_within_bound(
            max_buffer_size in 1usize..64,
            batch_size in 1usize..20,
            count in 0usize..200,
            cycle_every in 1usize..10
        ) {
            let config = PipelineConfig {
                batch_size,
                max_buffer_size,
                ..Default::default()
            };
            let (mut worker, handle, _rx) = create_test_worker(config);
            for i in 0..count {
                handle.submit(RawFrame::new(i as u32, vec![]));
                if i % cycle_every == 0 {
                    worker.run_cycle();
                    prop_assert!(handle.retained_len() <= max_buffer_size);
                }
            }
            worker.flush_pending();

            let ids: Vec<u32> = handle.retained_frames().iter().map(|f| f.id).collect();
            let expected: Vec<u32> = (count.saturating_sub(max_buffer_size)..count)
                .map(|i| i as u32)
                .collect();
            prop_assert_eq!(ids, expected);
        }

        #[test]
        fn test_disabled_filter_counts_every_frame(
            ids in prop::collection::vec(0u32..0x800, 0..150),
            batch_size in 1usize..40,
            id_min in proptest::option::of(0u32..0x800)
        ) {
            let config = PipelineConfig {
                batch_size,
                ..Default::default()
            };
            let (mut worker, handle, _rx) = create_test_worker(config);
            // Clauses are set but the criteria are switched off
            worker.handle_command(IngestCommand::UpdateFilter(FilterCriteria {
                id_min,
                data_pattern: Some("FFFF".to_string()),
                ..FilterCriteria::disabled()
            }));

            handle.submit_all(ids.iter().map(|id| RawFrame::new(*id, vec![0x01, 0x02])));
            worker.flush_pending();

            prop_assert_eq!(worker.stats.filtered_count(), ids.len() as u64);
            prop_assert_eq!(worker.stats.total_received(), ids.len() as u64);
        }
    }
}
