//! Bulk compile progress reporting.
//!
//! Reports observable progress during `netref concept compile-many` so users
//! see how many slugs are done and which ones failed. Progress is emitted on
//! **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

/// A single progress event for a bulk compile.
#[derive(Clone, Debug, PartialEq)]
pub enum CompileProgressEvent {
    /// The batch has been accepted; `total` slugs will be compiled.
    Started { total: u64 },
    /// One slug finished, successfully or with an error code.
    Finished {
        slug: String,
        n: u64,
        total: u64,
        /// `None` on success, otherwise the error code.
        error: Option<String>,
    },
}

/// Reports compile progress. Implementations write to stderr (human or JSON).
pub trait CompileProgressReporter: Send + Sync {
    fn report(&self, event: CompileProgressEvent);
}

/// Human-friendly progress on stderr: "compile  12 / 40  ospf  ok".
pub struct StderrProgress;

impl CompileProgressReporter for StderrProgress {
    fn report(&self, event: CompileProgressEvent) {
        let line = match &event {
            CompileProgressEvent::Started { total } => {
                format!("compile  {} concepts\n", format_number(*total))
            }
            CompileProgressEvent::Finished {
                slug,
                n,
                total,
                error,
            } => format!(
                "compile  {} / {}  {}  {}\n",
                format_number(*n),
                format_number(*total),
                slug,
                error.as_deref().unwrap_or("ok")
            ),
        };
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl CompileProgressReporter for JsonProgress {
    fn report(&self, event: CompileProgressEvent) {
        let obj = match &event {
            CompileProgressEvent::Started { total } => serde_json::json!({
                "event": "progress",
                "phase": "started",
                "total": total
            }),
            CompileProgressEvent::Finished {
                slug,
                n,
                total,
                error,
            } => serde_json::json!({
                "event": "progress",
                "phase": "finished",
                "slug": slug,
                "n": n,
                "total": total,
                "error": error
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl CompileProgressReporter for NoProgress {
    fn report(&self, _event: CompileProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode, shareable across compile tasks.
    pub fn reporter(&self) -> Arc<dyn CompileProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }
}
