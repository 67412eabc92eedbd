//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use canvis_rs::{Coordinator, CoreEvent, Frame};
use std::time::{Duration, Instant};

/// Generous upper bound for waiting on worker events
pub fn test_timeout() -> Duration {
    Duration::from_secs(3)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Collect events until `done` holds for the collected list or the timeout
/// elapses
pub fn collect_until(
    core: &Coordinator,
    timeout: Duration,
    mut done: impl FnMut(&[CoreEvent]) -> bool,
) -> Vec<CoreEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while !done(&events) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        if let Some(event) = core.recv_timeout(remaining.min(Duration::from_millis(20))) {
            events.push(event);
        }
    }
    events
}

/// Wait for the first event `pick` accepts
pub fn wait_for<T>(
    core: &Coordinator,
    timeout: Duration,
    mut pick: impl FnMut(CoreEvent) -> Option<T>,
) -> Option<T> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return None;
        }
        if let Some(event) = core.recv_timeout(remaining) {
            if let Some(found) = pick(event) {
                return Some(found);
            }
        }
    }
}

/// Frames delivered in batch events, flattened in order
pub fn batch_frames(events: &[CoreEvent]) -> Vec<Frame> {
    events
        .iter()
        .filter_map(|e| match e {
            CoreEvent::Batch(frames) => Some(frames.clone()),
            _ => None,
        })
        .flatten()
        .collect()
}

/// Number of batch events in the list
pub fn batch_count(events: &[CoreEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, CoreEvent::Batch(_)))
        .count()
}
