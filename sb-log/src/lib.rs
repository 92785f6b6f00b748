//! sb-log: NDJSON debug-log events + writer.
//!
//! Append-only NDJSON for post-mortems of a search session; activated by the
//! `debuglog` engine option.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use serde::Serialize;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// One progress snapshot of a running search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchTickEventV1 {
    pub event: &'static str,
    pub ts_ms: u64,
    pub depth: u16,
    pub seldepth: u16,
    pub time_ms: u64,
    pub nodes: u64,
    pub nps: u64,
    pub hashfull: u32,
    pub score_cp: i32,
    pub pv: Vec<String>,
}

/// The final answer of one search.
#[derive(Debug, Clone, Serialize)]
pub struct BestMoveEventV1 {
    pub event: &'static str,
    pub ts_ms: u64,
    pub best: String,
    pub ponder: Option<String>,
}

/// Milliseconds since the unix epoch, for event timestamps.
pub fn ts_ms_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug)]
pub enum NdjsonError {
    Io(io::Error),
    Json(serde_json::Error),
}

impl From<io::Error> for NdjsonError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for NdjsonError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl std::fmt::Display for NdjsonError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Json(e) => write!(f, "json: {e}"),
        }
    }
}

/// Append-only NDJSON writer.
///
/// Contract: each call writes exactly one JSON object followed by a newline.
pub struct NdjsonWriter {
    w: BufWriter<File>,
    lines_since_flush: u64,
    flush_every_lines: u64,
}

impl NdjsonWriter {
    /// Open a file for append. Creates it if it doesn't exist.
    pub fn open_append(path: impl AsRef<Path>) -> Result<Self, NdjsonError> {
        Self::open_append_with_flush(path, 1)
    }

    /// `flush_every_lines=0` disables periodic flushing.
    pub fn open_append_with_flush(
        path: impl AsRef<Path>,
        flush_every_lines: u64,
    ) -> Result<Self, NdjsonError> {
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            w: BufWriter::new(f),
            lines_since_flush: 0,
            flush_every_lines,
        })
    }

    pub fn write_event<T: Serialize>(&mut self, event: &T) -> Result<(), NdjsonError> {
        let mut buf = serde_json::to_vec(event)?;
        buf.push(b'\n');
        self.w.write_all(&buf)?;
        self.lines_since_flush += 1;
        if self.flush_every_lines > 0 && self.lines_since_flush >= self.flush_every_lines {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), NdjsonError> {
        self.w.flush()?;
        self.lines_since_flush = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::fs;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn writes_one_valid_json_object_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("debug.ndjson");
        let mut w = NdjsonWriter::open_append(&path).unwrap();

        w.write_event(&BestMoveEventV1 {
            event: "bestmove",
            ts_ms: 1,
            best: "e2e4".to_string(),
            ponder: None,
        })
        .unwrap();
        w.write_event(&BestMoveEventV1 {
            event: "bestmove",
            ts_ms: 2,
            best: "d2d4".to_string(),
            ponder: None,
        })
        .unwrap();
        w.flush().unwrap();

        let s = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = s.lines().collect();
        assert_eq!(lines.len(), 2);
        let v: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(v["best"], "e2e4");
        let v: Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(v["ts_ms"], 2);
    }

    #[test]
    fn search_tick_serializes_all_fields() {
        let tick = SearchTickEventV1 {
            event: "tick",
            ts_ms: 42,
            depth: 3,
            seldepth: 9,
            time_ms: 100,
            nodes: 1234,
            nps: 12340,
            hashfull: 17,
            score_cp: -35,
            pv: vec!["e2e4".into(), "e7e5".into()],
        };
        let v: Value = serde_json::from_str(&serde_json::to_string(&tick).unwrap()).unwrap();
        assert_eq!(v["seldepth"], 9);
        assert_eq!(v["pv"][1], "e7e5");
    }
}
