//! Integration tests for the ingestion pipeline
//!
//! These tests drive a running coordinator and validate:
//! - Debounced batching and backlog handling
//! - Filter re-scans and filtered counts
//! - Decode failure isolation
//! - Best-effort flush on shutdown

mod common;

use canvis_rs::catalog::{MessageDef, NodeDef};
use canvis_rs::config::{AppConfig, PipelineConfig};
use canvis_rs::{
    Catalog, Coordinator, CoreEvent, Direction, FilterCriteria, RawFrame, SignalMap,
};
use common::builders::{vehicle_catalog, FrameBuilder};
use common::{assert_float_eq, batch_count, batch_frames, collect_until, test_timeout, wait_for};
use serial_test::serial;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn start(pipeline: PipelineConfig) -> Coordinator {
    let config = AppConfig {
        pipeline,
        ..Default::default()
    };
    Coordinator::start(config).unwrap()
}

#[test]
#[serial]
fn test_single_frame_arrives_in_one_window() {
    let core = start(PipelineConfig::default());
    let submitted = Instant::now();
    assert!(core.submit_frame(FrameBuilder::new(0x100).data(&[1, 2, 3]).build()));

    let frames = wait_for(&core, test_timeout(), |e| match e {
        CoreEvent::Batch(frames) => Some(frames),
        _ => None,
    })
    .expect("batch");
    let elapsed = submitted.elapsed();

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].id, 0x100);
    assert_eq!(frames[0].dlc, 3);
    assert_eq!(frames[0].count, 1);
    assert!(frames[0].signals.is_none());
    assert!(elapsed >= Duration::from_millis(15), "batched too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_millis(500), "batched too late: {:?}", elapsed);
}

#[test]
#[serial]
fn test_burst_is_split_into_batches() {
    let core = start(PipelineConfig {
        batch_size: 50,
        ..Default::default()
    });
    let frames: Vec<RawFrame> = (0..200).map(|i| FrameBuilder::new(0x100 + i).build()).collect();
    assert_eq!(core.submit_frames(frames), 200);

    let events = collect_until(&core, test_timeout(), |events| {
        batch_frames(events).len() >= 200
    });
    let batches: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            CoreEvent::Batch(frames) => Some(frames.len()),
            _ => None,
        })
        .collect();

    assert_eq!(batches, vec![50, 50, 50, 50]);
    assert_eq!(core.retained_len(), 200);
}

#[test]
#[serial]
fn test_retained_buffer_is_bounded() {
    let core = start(PipelineConfig {
        max_buffer_size: 100,
        ..Default::default()
    });
    core.submit_frames((0..250).map(|i| FrameBuilder::new(i % 0x7FF).build()));

    collect_until(&core, test_timeout(), |events| batch_frames(events).len() >= 250);
    assert_eq!(core.retained_len(), 100);

    let retained = core.ingest().retained_frames();
    assert_eq!(retained.first().map(|f| f.id), Some(150));
    assert_eq!(retained.last().map(|f| f.id), Some(249));
}

#[test]
#[serial]
fn test_filter_update_rescans_buffer() {
    let core = start(PipelineConfig::default());
    core.submit_frame(FrameBuilder::new(0x050).build());
    core.submit_frame(FrameBuilder::new(0x120).build());
    core.submit_frame(FrameBuilder::new(0x150).tx().build());
    collect_until(&core, test_timeout(), |events| batch_frames(events).len() >= 3);

    core.update_filter(
        FilterCriteria::enabled()
            .id_range(0x100, 0x1FF)
            .direction(Direction::Rx),
    )
    .unwrap();
    let applied = wait_for(&core, test_timeout(), |e| match e {
        CoreEvent::FilterApplied(frames) => Some(frames),
        _ => None,
    })
    .expect("filter result");
    let ids: Vec<u32> = applied.iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![0x120]);

    // New frames go through the same filter
    core.submit_frame(FrameBuilder::new(0x180).build());
    core.submit_frame(FrameBuilder::new(0x400).build());
    let events = collect_until(&core, test_timeout(), |events| batch_count(events) >= 1);
    let ids: Vec<u32> = batch_frames(&events).iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![0x180]);
}

#[test]
#[serial]
fn test_filtered_count_matches_passed_frames() {
    let core = start(PipelineConfig::default());
    core.submit_frames((0..120).map(|i| FrameBuilder::new(0x10 + i).build()));
    collect_until(&core, test_timeout(), |events| batch_frames(events).len() >= 120);

    core.request_stats().unwrap();
    let stats = wait_for(&core, test_timeout(), |e| match e {
        CoreEvent::Statistics(stats) if stats.total_received == 120 => Some(stats),
        _ => None,
    })
    .expect("stats");
    assert_eq!(stats.filtered_count, 120);
    assert_eq!(stats.buffer_len, 120);
    assert_float_eq(stats.decode_success_rate, 100.0, 1e-9);

    // A re-scan replaces the count with the re-scan size
    core.update_filter(FilterCriteria::enabled().id_range(0x10, 0x19)).unwrap();
    let applied = wait_for(&core, test_timeout(), |e| match e {
        CoreEvent::FilterApplied(frames) => Some(frames.len()),
        _ => None,
    });
    assert_eq!(applied, Some(10));
    // The re-scan publishes statistics right after its result
    let stats = wait_for(&core, test_timeout(), |e| match e {
        CoreEvent::Statistics(stats) => Some(stats),
        _ => None,
    })
    .expect("stats after re-scan");
    assert_eq!(stats.filtered_count, 10);
}

#[test]
#[serial]
fn test_processing_gate() {
    let core = start(PipelineConfig::default());
    core.set_processing_enabled(false);
    assert!(!core.submit_frame(FrameBuilder::new(0x100).build()));
    assert_eq!(core.submit_frames(vec![FrameBuilder::new(0x101).build()]), 0);

    core.set_processing_enabled(true);
    assert!(core.submit_frame(FrameBuilder::new(0x102).build()));
    let events = collect_until(&core, test_timeout(), |events| batch_count(events) >= 1);
    let ids: Vec<u32> = batch_frames(&events).iter().map(|f| f.id).collect();
    assert_eq!(ids, vec![0x102]);
}

/// Catalog that panics when asked to decode 0x666
struct PanickingCatalog {
    inner: canvis_rs::InMemoryCatalog,
}

impl Catalog for PanickingCatalog {
    fn decode(&self, id: u32, payload: &[u8]) -> canvis_rs::Result<Option<SignalMap>> {
        if id == 0x666 {
            panic!("corrupt catalog entry");
        }
        self.inner.decode(id, payload)
    }

    fn message_name(&self, id: u32) -> Option<String> {
        self.inner.message_name(id)
    }

    fn encode(&self, id: u32, values: &SignalMap) -> canvis_rs::Result<Vec<u8>> {
        self.inner.encode(id, values)
    }

    fn messages(&self) -> &[MessageDef] {
        self.inner.messages()
    }

    fn nodes(&self) -> &[NodeDef] {
        self.inner.nodes()
    }
}

#[test]
#[serial]
fn test_decode_failures_are_isolated() {
    let core = start(PipelineConfig::default());
    core.set_catalog(Some(Arc::new(PanickingCatalog {
        inner: vehicle_catalog(),
    })))
    .unwrap();

    let good = [0xA0, 0x0F, 0x5A, 0x03, 0, 0, 0, 0];
    core.submit_frames(vec![
        FrameBuilder::new(0x200).data(&good).build(),
        // Too short for the 8-byte message layout
        FrameBuilder::new(0x200).data(&[0x01, 0x02]).build(),
        FrameBuilder::new(0x666).build(),
        FrameBuilder::new(0x200).data(&good).build(),
    ]);

    let events = collect_until(&core, test_timeout(), |events| batch_frames(events).len() >= 4);
    let frames = batch_frames(&events);
    assert_eq!(frames.len(), 4);

    let signals = frames[0].signals.as_ref().expect("decoded");
    assert_float_eq(signals["EngineSpeed"], 1000.0, 1e-9);
    assert_float_eq(signals["CoolantTemp"], 50.0, 1e-9);
    assert_float_eq(signals["GearState"], 3.0, 1e-9);
    assert_eq!(frames[0].message_name.as_deref(), Some("Engine_Data"));

    assert!(frames[1].signals.is_none());
    assert_eq!(frames[1].message_name.as_deref(), Some("Engine_Data"));
    assert!(frames[2].signals.is_none());
    assert!(frames[3].signals.is_some());
    assert_eq!(frames[3].count, 3);

    core.request_stats().unwrap();
    let stats = wait_for(&core, test_timeout(), |e| match e {
        CoreEvent::Statistics(stats) => Some(stats),
        _ => None,
    })
    .expect("stats");
    assert_float_eq(stats.decode_success_rate, 50.0, 1e-9);
}

#[test]
#[serial]
fn test_unusable_frames_are_reported() {
    let core = start(PipelineConfig::default());
    core.submit_frame(FrameBuilder::new(0x100).data(&[0u8; 9]).build());
    core.submit_frame(FrameBuilder::new(0x800).build());
    core.submit_frame(FrameBuilder::new(0x800).extended().build());

    let events = collect_until(&core, test_timeout(), |events| batch_count(events) >= 1);
    let errors = events
        .iter()
        .filter(|e| matches!(e, CoreEvent::ProcessingError(_)))
        .count();
    assert_eq!(errors, 2);
    let frames = batch_frames(&events);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].is_extended);
}

#[test]
#[serial]
fn test_shutdown_flushes_pending_frames() {
    let mut core = start(PipelineConfig {
        batch_window_ms: 200,
        ..Default::default()
    });
    core.submit_frames((0..10).map(|i| FrameBuilder::new(0x100 + i).build()));

    assert!(core.shutdown());
    assert_eq!(core.retained_len(), 10);
    assert_eq!(core.ingest().pending_len(), 0);
}
