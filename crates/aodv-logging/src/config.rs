//! What gets logged where
//!
//! A simulation run logs to the console for whoever watches it and,
//! optionally, to a JSONL trace file kept for later analysis. Both sinks
//! have their own level so a quiet console can sit next to a detailed trace.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Logging configuration of one process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Console level; `RUST_LOG` overrides it
    pub level: String,
    /// Console output format
    pub console: ConsoleFormat,
    /// ANSI colors on the pretty console
    pub ansi: bool,
    /// Per-run trace file
    pub trace_file: Option<TraceFile>,
    /// JSON line layout, shared by console and trace file
    pub jsonl: JsonlConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: ConsoleFormat::Jsonl,
            ansi: false,
            trace_file: None,
            jsonl: JsonlConfig::default(),
        }
    }
}

impl LogConfig {
    /// Human-readable console: `debug` when verbose, warnings only otherwise
    pub fn interactive(verbose: bool) -> Self {
        Self {
            level: if verbose { "debug" } else { "warn" }.to_string(),
            console: ConsoleFormat::Pretty,
            ansi: true,
            ..Default::default()
        }
    }

    /// Warnings only, plain text; for tests
    pub fn testing() -> Self {
        Self {
            level: "warn".to_string(),
            console: ConsoleFormat::Pretty,
            ansi: false,
            ..Default::default()
        }
    }

    /// Also trace the run to `<directory>/<run_name>.jsonl`
    pub fn with_trace_file(mut self, directory: impl Into<PathBuf>, run_name: impl Into<String>) -> Self {
        self.trace_file = Some(TraceFile::new(directory, run_name));
        self
    }
}

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleFormat {
    /// Multi-line human-readable events
    Pretty,
    /// One JSON object per line
    #[default]
    Jsonl,
    /// No console output
    Off,
}

/// JSONL trace of a single run
///
/// The file is truncated when the run starts, so repeating a run with the
/// same name replaces its trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceFile {
    /// Directory, created if missing
    pub directory: PathBuf,
    /// File stem; the file is `<run_name>.jsonl`
    pub run_name: String,
    /// Level of the trace, independent of the console
    pub level: String,
}

impl Default for TraceFile {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            run_name: "aodv-sim".to_string(),
            level: "debug".to_string(),
        }
    }
}

impl TraceFile {
    /// Trace at `debug` into `directory`
    pub fn new(directory: impl Into<PathBuf>, run_name: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            run_name: run_name.into(),
            ..Default::default()
        }
    }

    /// Full path of the trace file
    pub fn path(&self) -> PathBuf {
        self.directory.join(format!("{}.jsonl", self.run_name))
    }
}

/// JSON line layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonlConfig {
    /// Event fields at the top level instead of under `fields`
    pub flatten_events: bool,
    /// List of entered spans on every line
    pub include_spans: bool,
    /// Source file and line
    pub include_location: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            include_spans: true,
            include_location: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interactive_levels() {
        assert_eq!(LogConfig::interactive(true).level, "debug");
        let quiet = LogConfig::interactive(false);
        assert_eq!(quiet.level, "warn");
        assert_eq!(quiet.console, ConsoleFormat::Pretty);
        assert!(quiet.trace_file.is_none());
    }

    #[test]
    fn test_trace_file_path() {
        let config = LogConfig::default().with_trace_file("/tmp/aodv", "seed-7-trust");
        let trace = config.trace_file.unwrap();
        assert_eq!(trace.path(), PathBuf::from("/tmp/aodv/seed-7-trust.jsonl"));
        assert_eq!(trace.level, "debug");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: LogConfig = serde_json::from_str(
            r#"{"console": "off", "trace_file": {"directory": "runs", "level": "trace"}}"#,
        )
        .unwrap();
        assert_eq!(config.level, "info");
        assert_eq!(config.console, ConsoleFormat::Off);
        let trace = config.trace_file.unwrap();
        assert_eq!(trace.path(), PathBuf::from("runs/aodv-sim.jsonl"));
        assert_eq!(trace.level, "trace");
        assert!(config.jsonl.flatten_events);
    }
}
