/*!
 * Progress reporting interface.
 *
 * The core reports per-file percentages and leveled log strings through
 * this trait; rendering (bars, GUI, webhooks) is the caller's business.
 */

use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};

/// Log levels forwarded to reporters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Receives 0..=100 progress values per file and free-form log strings
pub trait ProgressReporter: Send + Sync {
    /// Progress for the current file, 0 to 100
    fn progress(&self, percent: u8);

    /// A categorized message
    fn message(&self, level: ReportLevel, text: &str);

    /// A new file started
    fn file_started(&self, _name: &str) {}

    /// The current file finished (successfully or not)
    fn file_finished(&self, _name: &str) {}
}

/// Reporter that forwards everything to the log facade
#[derive(Default)]
pub struct LogReporter;

impl ProgressReporter for LogReporter {
    fn progress(&self, percent: u8) {
        debug!("progress: {}%", percent);
    }

    fn message(&self, level: ReportLevel, text: &str) {
        match level {
            ReportLevel::Debug => debug!("{}", text),
            ReportLevel::Info => info!("{}", text),
            ReportLevel::Warning => warn!("{}", text),
            ReportLevel::Error => error!("{}", text),
        }
    }
}

/// Reporter drawing an indicatif progress bar, used by the CLI driver
pub struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new(100);
        bar.set_style(
            ProgressStyle::with_template("{msg:30!} [{bar:40.cyan/blue}] {pos:>3}%")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        Self { bar }
    }
}

impl Default for BarReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressReporter for BarReporter {
    fn progress(&self, percent: u8) {
        self.bar.set_position(percent.min(100) as u64);
    }

    fn message(&self, level: ReportLevel, text: &str) {
        match level {
            ReportLevel::Debug => debug!("{}", text),
            ReportLevel::Info => self.bar.println(text.to_string()),
            ReportLevel::Warning => self.bar.println(format!("warning: {}", text)),
            ReportLevel::Error => self.bar.println(format!("error: {}", text)),
        }
    }

    fn file_started(&self, name: &str) {
        self.bar.set_message(name.to_string());
        self.bar.set_position(0);
    }

    fn file_finished(&self, _name: &str) {
        self.bar.set_position(100);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU8, Ordering};

    struct Capture {
        last: AtomicU8,
    }

    impl ProgressReporter for Capture {
        fn progress(&self, percent: u8) {
            self.last.store(percent, Ordering::SeqCst);
        }
        fn message(&self, _level: ReportLevel, _text: &str) {}
    }

    #[test]
    fn test_reporter_trait_objectSafety() {
        let capture = Capture { last: AtomicU8::new(0) };
        let reporter: &dyn ProgressReporter = &capture;

        reporter.progress(42);
        assert_eq!(capture.last.load(Ordering::SeqCst), 42);
    }

    #[test]
    fn test_logReporter_shouldNotPanic() {
        let reporter = LogReporter;
        reporter.progress(50);
        reporter.message(ReportLevel::Info, "hello");
        reporter.message(ReportLevel::Error, "boom");
    }
}
