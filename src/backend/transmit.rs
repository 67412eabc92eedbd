//! Transmit composer and periodic scheduler
//!
//! Composition encodes signal values through the catalog and reports the
//! resulting frame. Periodic tasks re-compose the same values on a fixed
//! schedule until stopped.
//!
//! Each periodic task shares a [`PeriodicState`] between the worker and the
//! caller. Stopping takes the `enabled` lock and clears the flag from the
//! caller's thread; the worker holds the same lock while it re-checks the flag
//! and emits a tick, so no tick is observed once `stop` has returned.

use crate::backend::ingest::IngestHandle;
use crate::backend::{request_stop, try_queue, CoreEvent, EventSink, STOP_POLL};
use crate::catalog::SharedCatalog;
use crate::config::TransmitConfig;
use crate::error::{CanVisError, Result};
use crate::types::{ComposedFrame, SignalMap, TransmissionConfig};
use chrono::{DateTime, Utc};
use crossbeam_channel::{select, Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// State shared between a periodic task and its handles
#[derive(Debug)]
pub struct PeriodicState {
    message_id: u32,
    interval: Duration,
    start_time: DateTime<Utc>,
    enabled: Mutex<bool>,
    sent: AtomicU64,
}

impl PeriodicState {
    fn new(message_id: u32, interval: Duration) -> Self {
        Self {
            message_id,
            interval,
            start_time: Utc::now(),
            enabled: Mutex::new(true),
            sent: AtomicU64::new(0),
        }
    }

    fn disable(&self) -> bool {
        std::mem::replace(&mut *lock(&self.enabled), false)
    }
}

/// Caller-side view of one periodic transmission
#[derive(Debug, Clone)]
pub struct PeriodicHandle {
    state: Arc<PeriodicState>,
}

impl PeriodicHandle {
    pub fn message_id(&self) -> u32 {
        self.state.message_id
    }

    /// Ticks transmitted so far
    pub fn sent_count(&self) -> u64 {
        self.state.sent.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self) -> bool {
        *lock(&self.state.enabled)
    }

    /// Stop this task. Idempotent.
    pub fn stop(&self) {
        self.state.disable();
    }

    /// Snapshot as a [`TransmissionConfig`]
    pub fn config(&self) -> TransmissionConfig {
        TransmissionConfig {
            message_id: self.state.message_id,
            interval_ms: self.state.interval.as_millis() as u64,
            enabled: self.is_enabled(),
            start_time: self.state.start_time,
            sent_count: self.sent_count(),
        }
    }
}

/// Commands processed on the transmit worker thread
#[derive(Clone)]
pub enum TransmitCommand {
    Compose {
        request_id: u64,
        message_id: u32,
        values: SignalMap,
    },
    StartPeriodic {
        state: Arc<PeriodicState>,
        values: SignalMap,
    },
    SetCatalog(Option<SharedCatalog>),
    Shutdown,
}

type Registry = Arc<Mutex<HashMap<u32, Arc<PeriodicState>>>>;

/// Drop `message_id` from the registry if it still maps to `state`
fn unregister(registry: &Registry, state: &Arc<PeriodicState>) {
    let mut registry = lock(registry);
    if registry
        .get(&state.message_id)
        .is_some_and(|current| Arc::ptr_eq(current, state))
    {
        registry.remove(&state.message_id);
    }
}

/// Caller-side handle to the transmit worker
#[derive(Debug, Clone)]
pub struct TransmitHandle {
    command_tx: Sender<TransmitCommand>,
    registry: Registry,
    min_interval: Duration,
    events: EventSink,
    stopping: Arc<AtomicBool>,
}

impl TransmitHandle {
    /// Queue a compose request; the frame arrives as a `Composed` event.
    ///
    /// Never blocks. A request the worker cannot take is answered with a
    /// `TransmissionError` and false is returned.
    pub fn compose(&self, request_id: u64, message_id: u32, values: SignalMap) -> bool {
        let queued = self.send(TransmitCommand::Compose {
            request_id,
            message_id,
            values,
        });
        match queued {
            Ok(()) => true,
            Err(e) => {
                self.refuse(message_id, &e);
                false
            }
        }
    }

    fn refuse(&self, message_id: u32, error: &CanVisError) {
        tracing::warn!("Transmit request for 0x{:X} refused: {}", message_id, error);
        self.events.emit(CoreEvent::TransmissionError {
            message_id,
            message: error.to_string(),
        });
    }

    /// Start repeating `message_id` every `interval_ms`, replacing any task
    /// already running for that id.
    ///
    /// If the worker cannot take the task the returned handle is already
    /// disabled and a `TransmissionError` is emitted.
    pub fn start_periodic(&self, message_id: u32, values: SignalMap, interval_ms: u64) -> PeriodicHandle {
        let interval = Duration::from_millis(interval_ms).max(self.min_interval);
        if interval.as_millis() as u64 != interval_ms {
            tracing::debug!(
                "Periodic interval for 0x{:X} clamped to {:?}",
                message_id,
                interval
            );
        }
        let state = Arc::new(PeriodicState::new(message_id, interval));

        if let Some(previous) = lock(&self.registry).insert(message_id, state.clone()) {
            previous.disable();
            tracing::info!("Replacing periodic transmission for 0x{:X}", message_id);
        }
        let queued = self.send(TransmitCommand::StartPeriodic {
            state: state.clone(),
            values,
        });
        if let Err(e) = queued {
            state.disable();
            unregister(&self.registry, &state);
            self.refuse(message_id, &e);
        }

        PeriodicHandle { state }
    }

    /// Stop the task for `message_id`. Returns false when none was running.
    pub fn stop_periodic(&self, message_id: u32) -> bool {
        match lock(&self.registry).remove(&message_id) {
            Some(state) => {
                let was_enabled = state.disable();
                tracing::info!(
                    "Stopped periodic transmission for 0x{:X} after {} frames",
                    message_id,
                    state.sent.load(Ordering::Acquire)
                );
                was_enabled
            }
            None => false,
        }
    }

    /// Stop every periodic task
    pub fn stop_all(&self) {
        let states: Vec<Arc<PeriodicState>> =
            lock(&self.registry).drain().map(|(_, state)| state).collect();
        for state in states {
            state.disable();
        }
    }

    /// Handle for the live task of `message_id`, if any
    pub fn periodic(&self, message_id: u32) -> Option<PeriodicHandle> {
        lock(&self.registry)
            .get(&message_id)
            .map(|state| PeriodicHandle {
                state: state.clone(),
            })
    }

    /// Configs of every live task, ordered by id
    pub fn active_periodic(&self) -> Vec<TransmissionConfig> {
        let mut configs: Vec<TransmissionConfig> = lock(&self.registry)
            .values()
            .map(|state| {
                PeriodicHandle {
                    state: state.clone(),
                }
                .config()
            })
            .collect();
        configs.sort_by_key(|c| c.message_id);
        configs
    }

    pub fn set_catalog(&self, catalog: Option<SharedCatalog>) -> Result<()> {
        self.send(TransmitCommand::SetCatalog(catalog))
    }

    pub fn shutdown(&self) {
        request_stop(&self.command_tx, &self.stopping, "transmit", TransmitCommand::Shutdown);
    }

    fn send(&self, command: TransmitCommand) -> Result<()> {
        try_queue(&self.command_tx, &self.stopping, "transmit", command)
    }
}

struct PeriodicTask {
    state: Arc<PeriodicState>,
    values: SignalMap,
    next_due: Instant,
}

/// The transmit worker state, owned by its thread
pub struct TransmitWorker {
    command_rx: Receiver<TransmitCommand>,
    events: EventSink,
    catalog: Option<SharedCatalog>,
    tasks: HashMap<u32, PeriodicTask>,
    /// Shared with the handles
    registry: Registry,
    /// Where transmitted frames are echoed
    echo: Option<IngestHandle>,
    stopping: Arc<AtomicBool>,
    running: bool,
}

impl TransmitWorker {
    pub fn new(
        config: TransmitConfig,
        events: EventSink,
        echo: Option<IngestHandle>,
        command_capacity: usize,
    ) -> (Self, TransmitHandle) {
        let (command_tx, command_rx) = crossbeam_channel::bounded(command_capacity);
        let registry: Registry = Arc::new(Mutex::new(HashMap::new()));
        let stopping = Arc::new(AtomicBool::new(false));
        let handle = TransmitHandle {
            command_tx,
            registry: registry.clone(),
            min_interval: Duration::from_millis(config.min_interval_ms.max(1)),
            events: events.clone(),
            stopping: stopping.clone(),
        };
        let echo = if config.echo_transmitted { echo } else { None };
        let worker = Self {
            command_rx,
            events,
            catalog: None,
            tasks: HashMap::new(),
            registry,
            echo,
            stopping,
            running: true,
        };
        (worker, handle)
    }

    /// Serve commands and fire periodic ticks until shutdown
    pub fn run(&mut self) {
        tracing::info!(
            "Transmit worker started (echo {})",
            if self.echo.is_some() { "on" } else { "off" }
        );
        let command_rx = self.command_rx.clone();

        while self.running {
            let timeout = match self.next_deadline() {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => STOP_POLL,
            };
            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(cmd) => self.handle_command(cmd),
                    Err(_) => self.running = false,
                },
                default(timeout) => {}
            }

            if self.stopping.load(Ordering::Acquire) && command_rx.is_empty() {
                self.running = false;
            }
            if self.running {
                self.fire_due(Instant::now());
            }
        }

        for task in self.tasks.values() {
            task.state.disable();
        }
        tracing::info!("Transmit worker stopped");
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.tasks.values().map(|t| t.next_due).min()
    }

    fn handle_command(&mut self, cmd: TransmitCommand) {
        match cmd {
            TransmitCommand::Compose {
                request_id,
                message_id,
                values,
            } => match self.compose(message_id, &values) {
                Ok(frame) => {
                    tracing::debug!("Composed 0x{:X} for request #{}", message_id, request_id);
                    self.events.emit(CoreEvent::Composed { request_id, frame });
                }
                Err(e) => self.report_error(message_id, &e),
            },
            TransmitCommand::StartPeriodic { state, values } => {
                let message_id = state.message_id;
                tracing::info!(
                    "Periodic transmission for 0x{:X} every {:?}",
                    message_id,
                    state.interval
                );
                let task = PeriodicTask {
                    next_due: Instant::now() + state.interval,
                    state,
                    values,
                };
                if let Some(old) = self.tasks.insert(message_id, task) {
                    old.state.disable();
                }
            }
            TransmitCommand::SetCatalog(catalog) => self.catalog = catalog,
            TransmitCommand::Shutdown => self.running = false,
        }
    }

    /// Encode `values` for `message_id`
    fn compose(&self, message_id: u32, values: &SignalMap) -> Result<ComposedFrame> {
        let catalog = self.catalog.as_ref().ok_or(CanVisError::NoCatalog)?;
        let message = catalog
            .message(message_id)
            .ok_or(CanVisError::UnknownMessage(message_id))?;
        let dlc = message.length;
        let data = catalog.encode(message_id, values)?;
        Ok(ComposedFrame {
            id: message_id,
            dlc,
            data,
            signals: values.clone(),
        })
    }

    fn report_error(&self, message_id: u32, error: &CanVisError) {
        tracing::warn!("Compose failed for 0x{:X}: {}", message_id, error);
        self.events.emit(CoreEvent::TransmissionError {
            message_id,
            message: error.to_string(),
        });
    }

    /// Fire every task whose deadline has passed
    fn fire_due(&mut self, now: Instant) {
        // Tasks stopped from the caller side are dropped here
        self.tasks.retain(|_, task| *lock(&task.state.enabled));

        let due: Vec<u32> = self
            .tasks
            .iter()
            .filter(|(_, task)| task.next_due <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in due {
            let Some(task) = self.tasks.get(&id) else {
                continue;
            };
            let state = task.state.clone();

            match self.compose(id, &task.values) {
                Ok(frame) => self.transmit(&state, frame),
                Err(e) => {
                    self.report_error(id, &e);
                    state.disable();
                    unregister(&self.registry, &state);
                    self.tasks.remove(&id);
                    continue;
                }
            }

            if let Some(task) = self.tasks.get_mut(&id) {
                task.next_due += task.state.interval;
                if task.next_due <= now {
                    // Fell more than one interval behind; skip the missed ticks
                    task.next_due = now + task.state.interval;
                }
            }
        }
    }

    fn transmit(&self, state: &PeriodicState, frame: ComposedFrame) {
        let enabled = lock(&state.enabled);
        if !*enabled {
            tracing::trace!("Discarding tick for stopped 0x{:X}", state.message_id);
            return;
        }
        let sent_count = state.sent.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(echo) = &self.echo {
            echo.submit(frame.to_raw());
        }
        self.events.emit(CoreEvent::Transmitted { frame, sent_count });
    }
}
