//! Request lifecycle tracking.

use std::time::{Duration, Instant};

/// Mark recorded once the shell has been produced.
pub const MARK_SHELL_READY: &str = "shell-ready";
/// Mark recorded once every suspended subtree has settled.
pub const MARK_ALL_READY: &str = "all-ready";

/// Lifecycle phases for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Request received, processing started.
    Start,
    /// Shell HTML is complete and safe to flush.
    ShellReady,
    /// Every suspended subtree has settled.
    AllReady,
    /// Rendering was aborted.
    Aborted,
    /// An error occurred.
    Error(String),
}

/// A single named timing.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingMark {
    /// Mark name.
    pub name: String,
    /// Time since request start.
    pub elapsed: Duration,
}

/// Append-only, ordered timing marks for one request.
///
/// Marks are stored in call order and are never removed or rewritten.
/// Recording the same name twice keeps both entries.
#[derive(Debug, Clone)]
pub struct TimingMarks {
    start: Instant,
    marks: Vec<TimingMark>,
}

impl TimingMarks {
    /// Start timing now.
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    /// Start timing from a given instant.
    pub fn starting_at(start: Instant) -> Self {
        Self {
            start,
            marks: Vec::new(),
        }
    }

    /// Record a timing mark.
    pub fn mark(&mut self, name: &str) -> Duration {
        let elapsed = self.start.elapsed();
        self.marks.push(TimingMark {
            name: name.to_string(),
            elapsed,
        });
        elapsed
    }

    /// When timing started.
    pub fn start(&self) -> Instant {
        self.start
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// All marks in recording order.
    pub fn marks(&self) -> &[TimingMark] {
        &self.marks
    }

    /// First mark with the given name.
    pub fn get(&self, name: &str) -> Option<Duration> {
        self.marks.iter().find(|m| m.name == name).map(|m| m.elapsed)
    }

    /// Get time to shell flush.
    pub fn time_to_shell(&self) -> Option<Duration> {
        self.get(MARK_SHELL_READY)
    }

    /// Get time until every suspended subtree settled.
    pub fn time_to_all_ready(&self) -> Option<Duration> {
        self.get(MARK_ALL_READY)
    }

    /// Render the `Server-Timing` header value (`name;dur=ms`, comma-joined).
    pub fn server_timing(&self) -> String {
        self.marks
            .iter()
            .map(|m| format!("{};dur={:.1}", m.name, m.elapsed.as_secs_f64() * 1000.0))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Number of marks recorded.
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    /// Whether no marks were recorded.
    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }
}

impl Default for TimingMarks {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marks_keep_call_order() {
        let mut marks = TimingMarks::new();
        marks.mark("b");
        marks.mark("a");
        marks.mark("b");

        let names: Vec<&str> = marks.marks().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", "b"]);
        assert_eq!(marks.len(), 3);
    }

    #[test]
    fn test_marks_are_monotonic() {
        let mut marks = TimingMarks::new();
        let first = marks.mark("first");
        std::thread::sleep(Duration::from_millis(2));
        let second = marks.mark("second");

        assert!(second > first);
    }

    #[test]
    fn test_server_timing_format() {
        let start = Instant::now() - Duration::from_millis(10);
        let mut marks = TimingMarks::starting_at(start);
        marks.mark(MARK_SHELL_READY);
        marks.mark(MARK_ALL_READY);

        let header = marks.server_timing();
        let parts: Vec<&str> = header.split(", ").collect();

        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with("shell-ready;dur="));
        assert!(parts[1].starts_with("all-ready;dur="));
    }

    #[test]
    fn test_server_timing_empty() {
        assert_eq!(TimingMarks::new().server_timing(), "");
        assert!(TimingMarks::new().is_empty());
    }

    #[test]
    fn test_time_to_shell() {
        let mut marks = TimingMarks::new();
        assert!(marks.time_to_shell().is_none());

        marks.mark(MARK_SHELL_READY);
        assert!(marks.time_to_shell().is_some());
        assert!(marks.time_to_all_ready().is_none());
    }
}
