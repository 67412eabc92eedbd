//! Capture replay from candump log files
//!
//! Reads the `candump -l` log format:
//!
//! ```text
//! (1436509052.249713) vcan0 044#2A366C2BBA
//! (1436509052.250015) vcan0 12345678#DEADBEEF
//! (1436509052.251200) can1 1F0##1112233
//! (1436509052.252000) vcan0 123#R
//! ```
//!
//! Three hex digits mean a standard identifier, eight an extended one. `##`
//! marks a CAN FD frame whose first nibble holds the FD flags. `#R` is a
//! remote request with no payload.
//!
//! [`ReplayPlayer`] feeds the parsed frames back into the pipeline, paced by
//! the recorded timestamps at a speed multiplier.

use crate::error::{CanVisError, Result, ResultExt};
use crate::types::{Frame, RawFrame};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::{Duration, Instant};

/// Slowest and fastest paced playback
const SPEED_RANGE: (f64, f64) = (0.1, 100.0);

/// One parsed log line
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRecord {
    /// Time since the first record
    pub offset: Duration,
    /// Interface name, e.g. `vcan0`
    pub interface: String,
    pub frame: RawFrame,
}

/// A parsed candump log
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandumpLog {
    pub records: Vec<ReplayRecord>,
}

impl CandumpLog {
    /// Parse log text. Blank lines and `#` comments are skipped.
    pub fn parse(text: &str) -> Result<Self> {
        let mut records = Vec::new();
        let mut first: Option<DateTime<Utc>> = None;

        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (timestamp, interface, mut frame) = parse_line(line).map_err(|message| {
                CanVisError::Replay {
                    line: idx + 1,
                    message,
                }
            })?;

            let origin = *first.get_or_insert(timestamp);
            let offset = (timestamp - origin).to_std().unwrap_or(Duration::ZERO);
            frame.timestamp = Some(timestamp);
            records.push(ReplayRecord {
                offset,
                interface,
                frame,
            });
        }

        Ok(Self { records })
    }

    /// Read and parse a log file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(CanVisError::from)
            .with_context(|| format!("reading {}", path.display()))?;
        let log = Self::parse(&text)?;
        tracing::info!("Loaded {} frames from {}", log.len(), path.display());
        Ok(log)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Offset of the last record
    pub fn duration(&self) -> Duration {
        self.records.last().map(|r| r.offset).unwrap_or(Duration::ZERO)
    }
}

fn parse_line(line: &str) -> std::result::Result<(DateTime<Utc>, String, RawFrame), String> {
    let mut parts = line.split_whitespace();
    let (Some(stamp), Some(interface), Some(body)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err("expected '(secs) iface frame'".to_string());
    };

    let timestamp = parse_timestamp(stamp)?;
    let frame = parse_frame(body)?;
    Ok((timestamp, interface.to_string(), frame))
}

fn parse_timestamp(stamp: &str) -> std::result::Result<DateTime<Utc>, String> {
    let inner = stamp
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| format!("bad timestamp '{}'", stamp))?;
    let (secs, frac) = inner.split_once('.').unwrap_or((inner, "0"));

    let secs: i64 = secs
        .parse()
        .map_err(|_| format!("bad timestamp '{}'", stamp))?;
    if frac.is_empty() || frac.len() > 9 || !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("bad timestamp '{}'", stamp));
    }
    // Right-pad the fraction to nanoseconds
    let nanos: u32 = format!("{:0<9}", frac)
        .parse()
        .map_err(|_| format!("bad timestamp '{}'", stamp))?;

    DateTime::from_timestamp(secs, nanos).ok_or_else(|| format!("timestamp '{}' out of range", stamp))
}

fn parse_frame(body: &str) -> std::result::Result<RawFrame, String> {
    let (id_text, rest) = body
        .split_once('#')
        .ok_or_else(|| format!("missing '#' in '{}'", body))?;

    let id = u32::from_str_radix(id_text, 16).map_err(|_| format!("bad identifier '{}'", id_text))?;
    let is_extended = match id_text.len() {
        3 => false,
        8 => true,
        n => return Err(format!("identifier '{}' has {} digits, expected 3 or 8", id_text, n)),
    };

    let mut frame = if let Some(fd_body) = rest.strip_prefix('#') {
        // First nibble is the FD flags field
        let payload = fd_body
            .get(1..)
            .ok_or_else(|| format!("missing FD flags in '{}'", body))?;
        RawFrame::new(id, decode_hex(payload)?).fd()
    } else if rest.starts_with('R') {
        RawFrame::new(id, Vec::new())
    } else {
        RawFrame::new(id, decode_hex(rest)?)
    };
    if is_extended {
        frame = frame.extended();
    }
    Ok(frame)
}

fn decode_hex(text: &str) -> std::result::Result<Vec<u8>, String> {
    // candump may separate bytes with '.'
    let digits: Vec<u8> = text.bytes().filter(|b| *b != b'.').collect();
    if digits.len() % 2 != 0 {
        return Err(format!("odd number of hex digits in '{}'", text));
    }
    digits
        .chunks(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| format!("bad hex byte in '{}'", text))
        })
        .collect()
}

/// Format a processed frame as a candump log line
pub fn format_line(frame: &Frame, interface: &str) -> String {
    let secs = frame.timestamp.timestamp();
    let micros = frame.timestamp.timestamp_subsec_micros();
    let id = if frame.is_extended {
        format!("{:08X}", frame.id)
    } else {
        format!("{:03X}", frame.id)
    };
    let separator = if frame.is_fd { "##0" } else { "#" };
    format!(
        "({}.{:06}) {} {}{}{}",
        secs,
        micros,
        interface,
        id,
        separator,
        frame.hex_data()
    )
}

/// Result of a replay run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub submitted: usize,
    pub rejected: usize,
}

/// Plays a [`CandumpLog`] back in (scaled) real time
#[derive(Debug)]
pub struct ReplayPlayer {
    log: CandumpLog,
    /// Next record to emit
    position: usize,
    /// Speed multiplier; zero means as fast as possible
    speed: f64,
    playback_start: Option<Instant>,
}

impl ReplayPlayer {
    pub fn new(log: CandumpLog) -> Self {
        Self {
            log,
            position: 0,
            speed: 1.0,
            playback_start: None,
        }
    }

    /// Set the speed multiplier. Zero or less disables pacing.
    pub fn set_speed(&mut self, speed: f64) {
        self.speed = if speed <= 0.0 {
            0.0
        } else {
            speed.clamp(SPEED_RANGE.0, SPEED_RANGE.1)
        };
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.log.len()
    }

    /// Fraction of records emitted (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.log.is_empty() {
            return 1.0;
        }
        self.position as f64 / self.log.len() as f64
    }

    /// Start the playback clock at `now`
    pub fn start(&mut self, now: Instant) {
        self.position = 0;
        self.playback_start = Some(now);
    }

    /// Wall-clock time at which a record offset is due
    fn due_at(&self, offset: Duration) -> Option<Instant> {
        let start = self.playback_start?;
        if self.speed == 0.0 {
            return Some(start);
        }
        Some(start + Duration::from_secs_f64(offset.as_secs_f64() / self.speed))
    }

    /// Frames due at `now`, advancing the position past them
    pub fn due(&mut self, now: Instant) -> Vec<RawFrame> {
        let mut frames = Vec::new();
        while let Some(record) = self.log.records.get(self.position) {
            match self.due_at(record.offset) {
                Some(at) if at <= now => {
                    frames.push(record.frame.clone());
                    self.position += 1;
                }
                _ => break,
            }
        }
        frames
    }

    /// How long until the next record is due
    pub fn next_due_in(&self, now: Instant) -> Option<Duration> {
        let record = self.log.records.get(self.position)?;
        self.due_at(record.offset)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Play the whole log, handing each frame to `submit`. Blocks the
    /// calling thread while pacing.
    pub fn run(&mut self, mut submit: impl FnMut(RawFrame) -> bool) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        self.start(Instant::now());

        while !self.is_finished() {
            for frame in self.due(Instant::now()) {
                if submit(frame) {
                    summary.submitted += 1;
                } else {
                    summary.rejected += 1;
                }
            }
            if let Some(wait) = self.next_due_in(Instant::now()) {
                if !wait.is_zero() {
                    std::thread::sleep(wait);
                }
            }
        }

        tracing::info!(
            "Replay finished: {} submitted, {} rejected",
            summary.submitted,
            summary.rejected
        );
        summary
    }
}
