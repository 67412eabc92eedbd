//! # CanVis-RS: CAN Bus Frame Pipeline
//!
//! A processing core for CAN bus monitoring tools. High-rate frame streams
//! are batched, decoded against a message catalog and filtered off the
//! interactive thread, so the display layer only ever receives finished
//! batches. Alongside the pipeline run a catalog search service and a
//! transmit composer with periodic scheduling.
//!
//! ## Architecture
//!
//! - **Ingestion**: debounced batch cycles, decode isolation, bounded
//!   retained buffer and rolling statistics
//! - **Search**: keyword lookups over messages, signals, nodes and value
//!   tables with progress events and a result cache
//! - **Transmit**: signal encoding and periodic transmissions
//! - **Coordinator**: owns the worker threads and routes commands
//! - **Communication**: Crossbeam channels; results come back as
//!   [`CoreEvent`]s on one bounded channel
//!
//! ## Configuration
//!
//! Settings are read from `config.toml` in the platform config directory
//! under `canvis-rs`:
//!
//! - **Linux**: `~/.config/canvis-rs/`
//! - **macOS**: `~/Library/Application Support/canvis-rs/`
//! - **Windows**: `%APPDATA%\canvis-rs\`
//!
//! ## Example
//!
//! ```ignore
//! use canvis_rs::{AppConfig, Coordinator, CoreEvent, InMemoryCatalog, RawFrame};
//! use std::sync::Arc;
//!
//! fn main() -> canvis_rs::Result<()> {
//!     let mut core = Coordinator::start(AppConfig::load_or_default())?;
//!     core.set_catalog(Some(Arc::new(InMemoryCatalog::load("vehicle.json")?)));
//!
//!     core.submit_frame(RawFrame::new(0x200, vec![0x10, 0x27, 0, 0, 0, 0, 0, 0]));
//!
//!     while let Some(event) = core.recv_timeout(std::time::Duration::from_millis(100)) {
//!         if let CoreEvent::Batch(frames) = event {
//!             for frame in frames {
//!                 println!("{} {:?}", frame.id_label(), frame.signals);
//!             }
//!         }
//!     }
//!
//!     core.shutdown();
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod replay;
pub mod types;

// Re-export commonly used types
pub use backend::{
    Coordinator, CoreEvent, FilterCriteria, PeriodicHandle, SearchKind, SearchRequest,
    SearchResult,
};
pub use catalog::{Catalog, InMemoryCatalog, SharedCatalog};
pub use config::AppConfig;
pub use error::{CanVisError, Result};
pub use types::{ComposedFrame, Direction, Frame, PipelineStats, RawFrame, SignalMap};
