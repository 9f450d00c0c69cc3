//! Feeds a recorded HCI event dump through the dispatcher.
//!
//! Each line holds a capture timestamp in microseconds and the raw event
//! packet in hex, as read from the HCI socket:
//!
//! ```text
//! # timestamp   packet
//! 1700000000000000 043e2b02010000332211...
//! ```

use std::fmt;
use std::io::BufRead;

use log::{debug, warn};

use crate::advertisement;
use crate::dispatcher::Dispatcher;
use crate::presence::Timestamp;
use crate::sink::ReportSink;

#[derive(Debug)]
pub enum LineError {
    MissingPacket,
    Timestamp(std::num::ParseIntError),
    Hex(hex::FromHexError),
    Utf8(std::str::Utf8Error),
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::MissingPacket => write!(f, "expected '<timestamp> <hex packet>'"),
            LineError::Timestamp(err) => write!(f, "invalid timestamp: {}", err),
            LineError::Hex(err) => write!(f, "invalid packet: {}", err),
            LineError::Utf8(err) => write!(f, "not text: {}", err),
        }
    }
}

impl std::error::Error for LineError {}

/// Parses one dump line. Blank lines and `#` comments yield `None`.
pub fn parse_line(line: &str) -> Result<Option<(Timestamp, Vec<u8>)>, LineError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut fields = line.split_whitespace();
    let timestamp = fields
        .next()
        .ok_or(LineError::MissingPacket)?
        .parse::<u64>()
        .map_err(LineError::Timestamp)?;
    let packet = fields.next().ok_or(LineError::MissingPacket)?;
    let packet = hex::decode(packet).map_err(LineError::Hex)?;

    Ok(Some((Timestamp::from_micros(timestamp), packet)))
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub records: usize,
    pub skipped: usize,
}

/// Dispatches every advertising record in the dump. Unreadable lines and
/// truncated records are logged and skipped.
pub fn replay<R: BufRead, S: ReportSink>(
    input: R,
    dispatcher: &mut Dispatcher<S>,
) -> std::io::Result<ReplayStats> {
    let mut stats = ReplayStats::default();

    for (index, line) in input.split(b'\n').enumerate() {
        let line = line?;
        let parsed = std::str::from_utf8(&line)
            .map_err(LineError::Utf8)
            .and_then(parse_line);
        let (timestamp, packet) = match parsed {
            Ok(Some(parsed)) => parsed,
            Ok(None) => continue,
            Err(err) => {
                warn!("Line {}: {}", index + 1, err);
                stats.skipped += 1;
                continue;
            }
        };

        for record in advertisement::reports(&packet) {
            match record {
                Ok(record) => {
                    stats.records += 1;
                    dispatcher.dispatch_at(&record, timestamp);
                }
                Err(err) => {
                    warn!("Line {}: {}", index + 1, err);
                    stats.skipped += 1;
                }
            }
        }
    }

    debug!(
        "Replayed {} records, skipped {}",
        stats.records, stats.skipped
    );
    Ok(stats)
}
