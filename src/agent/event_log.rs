//! JSONL conversation log.
//!
//! One object per line, each with a monotonically increasing `ordinal` and a
//! UTC timestamp `t`:
//!
//! ```text
//! {"ordinal":0,"t":"...","type":"start","model":"gpt-4.1-mini","tools":["safe_search"]}
//! {"ordinal":1,"t":"...","type":"assistant","msg":{...}}
//! {"ordinal":2,"t":"...","type":"tool","name":"safe_search","args":{...},"out":{...}}
//! {"ordinal":3,"t":"...","type":"end","steps":2}
//! ```
//!
//! Logging is best effort: a failed write is reported once per event at
//! `warn` and never interrupts the conversation.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single logged event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    Start {
        model: String,
        tools: Vec<String>,
    },
    Assistant {
        msg: serde_json::Value,
    },
    Tool {
        name: String,
        args: serde_json::Value,
        out: serde_json::Value,
    },
    End {
        steps: usize,
    },
}

#[derive(Serialize)]
struct Record<'a> {
    ordinal: u64,
    t: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a Event,
}

struct Sink {
    path: PathBuf,
    file: File,
    next_ordinal: u64,
}

/// Append-only event sink.
pub struct EventLog {
    sink: Option<Mutex<Sink>>,
}

impl EventLog {
    /// Create (or truncate) a log file.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            sink: Some(Mutex::new(Sink {
                path: path.to_path_buf(),
                file,
                next_ordinal: 0,
            })),
        })
    }

    /// A sink that drops everything.
    pub fn disabled() -> Self {
        Self { sink: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn record(&self, event: Event) {
        let Some(sink) = &self.sink else {
            return;
        };
        let Ok(mut sink) = sink.lock() else {
            tracing::warn!("Event log lock poisoned, dropping event");
            return;
        };

        let record = Record {
            ordinal: sink.next_ordinal,
            t: Utc::now(),
            event: &event,
        };
        let line = match serde_json::to_string(&record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode event");
                return;
            }
        };
        sink.next_ordinal += 1;

        if let Err(e) = writeln!(sink.file, "{line}").and_then(|_| sink.file.flush()) {
            tracing::warn!(path = %sink.path.display(), error = %e, "Failed to write event log");
        }
    }

    /// Latest `out` recorded for tool `name` in an existing log.
    pub fn last_tool_output(path: &Path, name: &str) -> io::Result<Option<serde_json::Value>> {
        let reader = BufReader::new(File::open(path)?);
        let mut last = None;
        for line in reader.lines() {
            let line = line?;
            let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
                continue;
            };
            if value["type"] == "tool" && value["name"] == name {
                last = value.get("out").cloned();
            }
        }
        Ok(last)
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_records_have_ordinal_type_and_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/run.jsonl");
        let log = EventLog::open(&path).unwrap();
        log.record(Event::Start {
            model: "m".to_string(),
            tools: vec!["safe_search".to_string()],
        });
        log.record(Event::End { steps: 1 });

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "start");
        assert_eq!(lines[0]["ordinal"], 0);
        assert_eq!(lines[0]["tools"][0], "safe_search");
        assert_eq!(lines[1]["type"], "end");
        assert_eq!(lines[1]["ordinal"], 1);
        assert!(lines[1]["t"].is_string());
    }

    #[test]
    fn test_last_tool_output_picks_latest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.jsonl");
        let log = EventLog::open(&path).unwrap();
        for n in 1..=2 {
            log.record(Event::Tool {
                name: "safe_video_search".to_string(),
                args: serde_json::json!({}),
                out: serde_json::json!({"n": n}),
            });
        }
        log.record(Event::Tool {
            name: "safe_search".to_string(),
            args: serde_json::json!({}),
            out: serde_json::json!({"n": 9}),
        });

        let out = EventLog::last_tool_output(&path, "safe_video_search").unwrap();
        assert_eq!(out, Some(serde_json::json!({"n": 2})));
        assert_eq!(EventLog::last_tool_output(&path, "open_safe_url").unwrap(), None);
    }

    #[test]
    fn test_disabled_log_is_noop() {
        let log = EventLog::disabled();
        log.record(Event::End { steps: 0 });
        assert!(!log.is_enabled());
    }
}
