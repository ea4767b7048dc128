//! Progress reporter implementation
//!
//! Uses indicatif for terminal progress bars with:
//! - Byte transfer progress
//! - Throughput and ETA display
//! - A status line for the current object

use super::ProgressFn;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Progress reporter for device transfers
pub struct ProgressReporter {
    /// Multi-progress container
    multi: MultiProgress,
    /// Main progress bar (bytes)
    bytes_bar: ProgressBar,
    /// Current status message
    status: ProgressBar,
    /// Start time
    start_time: Instant,
    /// Total bytes to transfer
    total_bytes: AtomicU64,
    /// Bytes transferred so far
    bytes_sent: AtomicU64,
    /// Is progress enabled
    enabled: AtomicBool,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let multi = MultiProgress::new();

        let status = multi.add(ProgressBar::new_spinner());
        status.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        let bytes_bar = multi.add(ProgressBar::new(0));
        bytes_bar.set_style(
            ProgressStyle::default_bar()
                .template("{prefix:.bold.dim} [{bar:40.green/white}] {bytes}/{total_bytes} ({bytes_per_sec}, ETA {eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bytes_bar.set_prefix("Data");

        Self {
            multi,
            bytes_bar,
            status,
            start_time: Instant::now(),
            total_bytes: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            enabled: AtomicBool::new(true),
        }
    }

    /// Create a disabled progress reporter (for quiet mode)
    pub fn disabled() -> Self {
        let reporter = Self::new();
        reporter.enabled.store(false, Ordering::SeqCst);
        reporter.multi.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    /// Record an absolute `(sent, total)` update from a transfer
    pub fn update(&self, sent: u64, total: u64) {
        if self.total_bytes.swap(total, Ordering::Relaxed) != total {
            self.bytes_bar.set_length(total);
        }
        self.bytes_sent.store(sent, Ordering::Relaxed);
        self.bytes_bar.set_position(sent);
    }

    /// Set current status message
    pub fn set_status(&self, msg: &str) {
        self.status.set_message(msg.to_string());
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get current throughput in bytes/second
    pub fn throughput(&self) -> f64 {
        let bytes = self.bytes_sent.load(Ordering::Relaxed);
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            bytes as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Finish progress with success message
    pub fn finish_success(&self, message: &str) {
        self.status.finish_with_message(format!("✓ {}", message));
        self.bytes_bar.finish();
    }

    /// Finish progress with error message
    pub fn finish_error(&self, message: &str) {
        self.status.finish_with_message(format!("✗ {}", message));
        self.bytes_bar.abandon();
    }

    /// Check if progress is enabled
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Get progress summary
    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            total_bytes: self.total_bytes.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            elapsed: self.elapsed(),
            throughput: self.throughput(),
        }
    }

    /// Callback that feeds this reporter, for handing to an operation
    pub fn callback(self: &Arc<Self>) -> ProgressFn {
        let reporter = Arc::clone(self);
        Arc::new(move |sent, total| reporter.update(sent, total))
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Progress summary
#[derive(Debug, Clone)]
pub struct ProgressSummary {
    /// Total bytes to transfer
    pub total_bytes: u64,
    /// Bytes transferred so far
    pub bytes_sent: u64,
    /// Elapsed time
    pub elapsed: Duration,
    /// Throughput in bytes/second
    pub throughput: f64,
}

impl ProgressSummary {
    /// Get completion percentage
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.bytes_sent as f64 / self.total_bytes as f64) * 100.0
        }
    }

    /// Print summary to console
    pub fn print(&self) {
        println!("Progress: {:.1}%", self.percentage());
        println!("Bytes:    {}/{}",
            humansize::format_size(self.bytes_sent, humansize::BINARY),
            humansize::format_size(self.total_bytes, humansize::BINARY)
        );
        println!("Elapsed:  {}", humantime::format_duration(round_millis(self.elapsed)));
        println!("Speed:    {}/s", humansize::format_size(self.throughput as u64, humansize::BINARY));
    }
}

fn round_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_reporter() {
        let reporter = ProgressReporter::disabled();

        reporter.update(250, 1000);
        reporter.update(500, 1000);

        let summary = reporter.summary();
        assert_eq!(summary.bytes_sent, 500);
        assert_eq!(summary.total_bytes, 1000);
        assert_eq!(summary.percentage(), 50.0);
        assert!(!reporter.is_enabled());
    }

    #[test]
    fn test_callback_feeds_reporter() {
        let reporter = Arc::new(ProgressReporter::disabled());
        let callback = reporter.callback();

        callback(64, 128);
        assert_eq!(reporter.summary().bytes_sent, 64);
    }
}
