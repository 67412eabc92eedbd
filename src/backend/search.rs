//! Catalog search worker
//!
//! Keyword lookups over messages, signals, nodes and value tables run on a
//! dedicated thread. Each request produces zero or more progress events
//! followed by exactly one completed or error event, all tagged with the
//! caller's request id so stale responses can be discarded.
//!
//! # Matching
//!
//! Terms match by substring against names; messages also match against
//! their hex identifier (`0x200`). Unless the request is case-sensitive both
//! sides are lowercased first. A combined search splits the result limit
//! three ways across messages, signals and nodes.
//!
//! # Caching
//!
//! Result lists are cached by term, kind and case-sensitivity in a
//! [`SearchCache`], together with the limit they were built under. Swapping
//! the catalog clears the cache.

use crate::backend::search_cache::{CacheKey, SearchCache};
use crate::backend::{request_stop, try_queue, CoreEvent, EventSink, STOP_POLL};
use crate::catalog::{ByteOrder, Catalog, SharedCatalog};
use crate::config::SearchConfig;
use crate::error::{CanVisError, Result as CanVisResult};
use crossbeam_channel::{select, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Collection a search scans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchKind {
    Message,
    Signal,
    Node,
    ValueTable,
    #[default]
    All,
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchKind::Message => "message",
            SearchKind::Signal => "signal",
            SearchKind::Node => "node",
            SearchKind::ValueTable => "value_table",
            SearchKind::All => "all",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SearchKind {
    type Err = CanVisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "message" | "messages" => Ok(SearchKind::Message),
            "signal" | "signals" => Ok(SearchKind::Signal),
            "node" | "nodes" => Ok(SearchKind::Node),
            "value_table" | "value-table" | "choices" => Ok(SearchKind::ValueTable),
            "all" => Ok(SearchKind::All),
            other => Err(CanVisError::Config(format!("unknown search kind '{}'", other))),
        }
    }
}

/// A search request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Caller-chosen id echoed on every response
    pub request_id: u64,
    pub term: String,
    pub kind: SearchKind,
    pub max_results: usize,
    pub case_sensitive: bool,
}

impl SearchRequest {
    /// Case-insensitive request with a result limit of 100
    pub fn new(request_id: u64, term: impl Into<String>, kind: SearchKind) -> Self {
        Self {
            request_id,
            term: term.into(),
            kind,
            max_results: 100,
            case_sensitive: false,
        }
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    fn cache_key(&self) -> CacheKey {
        CacheKey {
            term: self.term.clone(),
            kind: self.kind,
            case_sensitive: self.case_sensitive,
        }
    }
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchResult {
    Message {
        name: String,
        id: String,
        dlc: u8,
        signal_count: usize,
        comment: Option<String>,
    },
    Signal {
        name: String,
        message_name: String,
        message_id: String,
        start_bit: u16,
        length: u16,
        byte_order: ByteOrder,
        is_signed: bool,
        scale: f64,
        offset: f64,
        unit: String,
        minimum: Option<f64>,
        maximum: Option<f64>,
        comment: Option<String>,
    },
    Node {
        name: String,
        comment: Option<String>,
    },
    ValueTable {
        signal_name: String,
        message_name: String,
        message_id: String,
        value: i64,
        label: String,
    },
}

impl SearchResult {
    /// Display name of the hit
    pub fn name(&self) -> &str {
        match self {
            SearchResult::Message { name, .. }
            | SearchResult::Signal { name, .. }
            | SearchResult::Node { name, .. } => name,
            SearchResult::ValueTable { label, .. } => label,
        }
    }

    pub fn kind(&self) -> SearchKind {
        match self {
            SearchResult::Message { .. } => SearchKind::Message,
            SearchResult::Signal { .. } => SearchKind::Signal,
            SearchResult::Node { .. } => SearchKind::Node,
            SearchResult::ValueTable { .. } => SearchKind::ValueTable,
        }
    }
}

/// Progress counter shared across the sub-scans of one request
struct Progress<'a> {
    current: usize,
    total: usize,
    report: &'a mut dyn FnMut(usize, usize),
}

impl Progress<'_> {
    fn step(&mut self, every: usize) {
        self.current += 1;
        if every > 0 && self.current % every == 0 {
            (self.report)(self.current, self.total);
        }
    }

    fn finish(&mut self) {
        (self.report)(self.total, self.total);
    }
}

/// Linear catalog scan for one request
pub struct CatalogSearcher<'a> {
    catalog: &'a dyn Catalog,
    config: &'a SearchConfig,
}

impl<'a> CatalogSearcher<'a> {
    pub fn new(catalog: &'a dyn Catalog, config: &'a SearchConfig) -> Self {
        Self { catalog, config }
    }

    /// Run a search, reporting `(current, total)` progress along the way
    pub fn run(
        &self,
        request: &SearchRequest,
        report: &mut dyn FnMut(usize, usize),
    ) -> Vec<SearchResult> {
        let term = self.normalize(&request.term, request.case_sensitive);
        let limit = request.max_results;

        let total = match request.kind {
            SearchKind::Message => self.message_total(),
            SearchKind::Signal | SearchKind::ValueTable => self.signal_total(),
            SearchKind::Node => self.node_total(),
            SearchKind::All => self.message_total() + self.signal_total() + self.node_total(),
        };
        let mut progress = Progress {
            current: 0,
            total,
            report,
        };

        let mut results = Vec::new();
        if limit > 0 {
            match request.kind {
                SearchKind::Message => {
                    self.scan_messages(&term, request.case_sensitive, limit, &mut progress, &mut results)
                }
                SearchKind::Signal => {
                    self.scan_signals(&term, request.case_sensitive, limit, &mut progress, &mut results)
                }
                SearchKind::Node => {
                    self.scan_nodes(&term, request.case_sensitive, limit, &mut progress, &mut results)
                }
                SearchKind::ValueTable => self.scan_value_tables(
                    &term,
                    request.case_sensitive,
                    limit,
                    &mut progress,
                    &mut results,
                ),
                SearchKind::All => {
                    let share = limit.div_ceil(3);
                    let cs = request.case_sensitive;
                    let mut part = Vec::new();
                    self.scan_messages(&term, cs, share, &mut progress, &mut part);
                    results.append(&mut part);
                    self.scan_signals(&term, cs, share, &mut progress, &mut part);
                    results.append(&mut part);
                    self.scan_nodes(&term, cs, share, &mut progress, &mut part);
                    results.append(&mut part);
                }
            }
        }
        results.truncate(limit);

        progress.finish();
        results
    }

    fn normalize(&self, text: &str, case_sensitive: bool) -> String {
        if case_sensitive {
            text.to_string()
        } else {
            text.to_lowercase()
        }
    }

    fn matches(&self, candidate: &str, term: &str, case_sensitive: bool) -> bool {
        if case_sensitive {
            candidate.contains(term)
        } else {
            candidate.to_lowercase().contains(term)
        }
    }

    fn message_total(&self) -> usize {
        self.catalog.messages().len()
    }

    fn signal_total(&self) -> usize {
        self.catalog.messages().iter().map(|m| m.signals.len()).sum()
    }

    fn node_total(&self) -> usize {
        self.catalog.nodes().len()
    }

    fn scan_messages(
        &self,
        term: &str,
        case_sensitive: bool,
        limit: usize,
        progress: &mut Progress<'_>,
        results: &mut Vec<SearchResult>,
    ) {
        let every = self.config.message_progress_every;
        for message in self.catalog.messages() {
            progress.step(every);
            let id = message.id_label();
            if self.matches(&message.name, term, case_sensitive)
                || self.matches(&id, term, case_sensitive)
            {
                results.push(SearchResult::Message {
                    name: message.name.clone(),
                    id,
                    dlc: message.length,
                    signal_count: message.signals.len(),
                    comment: message.comment.clone(),
                });
                if results.len() >= limit {
                    return;
                }
            }
        }
    }

    fn scan_signals(
        &self,
        term: &str,
        case_sensitive: bool,
        limit: usize,
        progress: &mut Progress<'_>,
        results: &mut Vec<SearchResult>,
    ) {
        let every = self.config.signal_progress_every;
        for message in self.catalog.messages() {
            for signal in &message.signals {
                progress.step(every);
                if !self.matches(&signal.name, term, case_sensitive) {
                    continue;
                }
                results.push(SearchResult::Signal {
                    name: signal.name.clone(),
                    message_name: message.name.clone(),
                    message_id: message.id_label(),
                    start_bit: signal.start_bit,
                    length: signal.length,
                    byte_order: signal.byte_order,
                    is_signed: signal.is_signed,
                    scale: signal.scale,
                    offset: signal.offset,
                    unit: signal.unit.clone(),
                    minimum: signal.minimum,
                    maximum: signal.maximum,
                    comment: signal.comment.clone(),
                });
                if results.len() >= limit {
                    return;
                }
            }
        }
    }

    fn scan_nodes(
        &self,
        term: &str,
        case_sensitive: bool,
        limit: usize,
        progress: &mut Progress<'_>,
        results: &mut Vec<SearchResult>,
    ) {
        let every = self.config.message_progress_every;
        for node in self.catalog.nodes() {
            progress.step(every);
            if self.matches(&node.name, term, case_sensitive) {
                results.push(SearchResult::Node {
                    name: node.name.clone(),
                    comment: node.comment.clone(),
                });
                if results.len() >= limit {
                    return;
                }
            }
        }
    }

    fn scan_value_tables(
        &self,
        term: &str,
        case_sensitive: bool,
        limit: usize,
        progress: &mut Progress<'_>,
        results: &mut Vec<SearchResult>,
    ) {
        let every = self.config.signal_progress_every;
        for message in self.catalog.messages() {
            for signal in &message.signals {
                progress.step(every);
                for (value, label) in &signal.choices {
                    if !self.matches(label, term, case_sensitive) {
                        continue;
                    }
                    results.push(SearchResult::ValueTable {
                        signal_name: signal.name.clone(),
                        message_name: message.name.clone(),
                        message_id: message.id_label(),
                        value: *value,
                        label: label.clone(),
                    });
                    if results.len() >= limit {
                        return;
                    }
                }
            }
        }
    }
}

/// Commands processed on the search worker thread
#[derive(Clone)]
pub enum SearchCommand {
    Search(SearchRequest),
    SetCatalog(Option<SharedCatalog>),
    ClearCache,
    Shutdown,
}

/// Caller-side handle to the search worker
#[derive(Debug, Clone)]
pub struct SearchHandle {
    command_tx: Sender<SearchCommand>,
    events: EventSink,
    stopping: Arc<AtomicBool>,
}

impl SearchHandle {
    /// Queue a search; results arrive as events.
    ///
    /// Never blocks. A request the worker cannot take is answered with a
    /// `SearchError` and false is returned.
    pub fn search(&self, request: SearchRequest) -> bool {
        let request_id = request.request_id;
        match self.send(SearchCommand::Search(request)) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Search #{} refused: {}", request_id, e);
                self.events.emit(CoreEvent::SearchError {
                    request_id,
                    message: e.to_string(),
                });
                false
            }
        }
    }

    pub fn set_catalog(&self, catalog: Option<SharedCatalog>) -> CanVisResult<()> {
        self.send(SearchCommand::SetCatalog(catalog))
    }

    pub fn clear_cache(&self) -> CanVisResult<()> {
        self.send(SearchCommand::ClearCache)
    }

    /// Ask the worker to stop once the requests queued so far are served
    pub fn shutdown(&self) {
        request_stop(&self.command_tx, &self.stopping, "search", SearchCommand::Shutdown);
    }

    fn send(&self, command: SearchCommand) -> CanVisResult<()> {
        try_queue(&self.command_tx, &self.stopping, "search", command)
    }
}

/// The search worker state, owned by its thread
pub struct SearchWorker {
    config: SearchConfig,
    command_rx: Receiver<SearchCommand>,
    events: EventSink,
    catalog: Option<SharedCatalog>,
    cache: SearchCache,
    stopping: Arc<AtomicBool>,
}

impl SearchWorker {
    pub fn new(
        config: SearchConfig,
        events: EventSink,
        command_capacity: usize,
    ) -> (Self, SearchHandle) {
        let (command_tx, command_rx) = crossbeam_channel::bounded(command_capacity);
        let stopping = Arc::new(AtomicBool::new(false));
        let handle = SearchHandle {
            command_tx,
            events: events.clone(),
            stopping: stopping.clone(),
        };
        let worker = Self {
            cache: SearchCache::new(config.cache_capacity),
            config,
            command_rx,
            events,
            catalog: None,
            stopping,
        };
        (worker, handle)
    }

    /// Serve requests until shutdown
    pub fn run(&mut self) {
        tracing::info!("Search worker started");
        let command_rx = self.command_rx.clone();
        let mut running = true;
        while running {
            if self.stopping.load(Ordering::Acquire) && command_rx.is_empty() {
                break;
            }
            select! {
                recv(command_rx) -> cmd => match cmd {
                    Ok(SearchCommand::Search(request)) => self.handle_search(request),
                    Ok(SearchCommand::SetCatalog(catalog)) => self.set_catalog(catalog),
                    Ok(SearchCommand::ClearCache) => self.cache.clear(),
                    Ok(SearchCommand::Shutdown) | Err(_) => running = false,
                },
                default(STOP_POLL) => {}
            }
        }
        tracing::info!("Search worker stopped");
    }

    fn set_catalog(&mut self, catalog: Option<SharedCatalog>) {
        self.catalog = catalog;
        self.cache.clear();
        tracing::info!("Search catalog replaced, cache cleared");
    }

    fn handle_search(&mut self, request: SearchRequest) {
        let request_id = request.request_id;
        let key = request.cache_key();

        if let Some(cached) = self.cache.get(&key, request.max_results) {
            let results = cached.to_vec();
            tracing::debug!(
                "Search #{} '{}' ({}) served from cache",
                request_id,
                request.term,
                request.kind
            );
            self.events
                .emit(CoreEvent::SearchCompleted { request_id, results });
            return;
        }

        let Some(catalog) = self.catalog.clone() else {
            self.events.emit(CoreEvent::SearchError {
                request_id,
                message: CanVisError::NoCatalog.to_string(),
            });
            return;
        };

        let events = self.events.clone();
        let mut report = |current: usize, total: usize| {
            events.emit(CoreEvent::SearchProgress {
                request_id,
                current,
                total,
            });
        };
        let results = CatalogSearcher::new(catalog.as_ref(), &self.config).run(&request, &mut report);

        tracing::debug!(
            "Search #{} '{}' ({}): {} results",
            request_id,
            request.term,
            request.kind,
            results.len()
        );
        self.cache.insert(key, results.clone(), request.max_results);
        self.events
            .emit(CoreEvent::SearchCompleted { request_id, results });
    }
}
