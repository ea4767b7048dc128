//! Ordered progress delivery
//!
//! Transports may report progress out of order or skip the final tick.
//! `MonotonicProgress` sits between a transport and a caller's callback and
//! guarantees the sequence the caller sees is non-decreasing and, on
//! success, ends with `(total, total)`.

/// Shared progress callback a caller hands to an operation
pub type ProgressFn = std::sync::Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Non-decreasing progress adapter
pub struct MonotonicProgress<F: FnMut(u64, u64)> {
    inner: F,
    last: Option<u64>,
}

impl<F: FnMut(u64, u64)> MonotonicProgress<F> {
    /// Wrap a callback
    pub fn new(inner: F) -> Self {
        Self { inner, last: None }
    }

    /// Forward `(sent, total)` unless it would go backwards
    pub fn report(&mut self, sent: u64, total: u64) {
        let sent = sent.min(total);
        if self.last.map(|last| sent < last).unwrap_or(false) {
            return;
        }
        self.last = Some(sent);
        (self.inner)(sent, total);
    }

    /// Emit the final `(total, total)` if it has not been reported yet
    pub fn finish(&mut self, total: u64) {
        if self.last != Some(total) {
            self.last = Some(total);
            (self.inner)(total, total);
        }
    }

    /// Last value forwarded, if any
    pub fn last(&self) -> Option<u64> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drops_regressions() {
        let mut seen = Vec::new();
        {
            let mut progress = MonotonicProgress::new(|sent, _total| seen.push(sent));
            progress.report(10, 100);
            progress.report(5, 100);
            progress.report(10, 100);
            progress.report(60, 100);
            progress.finish(100);
        }
        assert_eq!(seen, vec![10, 10, 60, 100]);
    }

    #[test]
    fn test_finish_not_duplicated() {
        let mut seen = Vec::new();
        {
            let mut progress = MonotonicProgress::new(|sent, total| seen.push((sent, total)));
            progress.report(100, 100);
            progress.finish(100);
        }
        assert_eq!(seen, vec![(100, 100)]);
    }

    #[test]
    fn test_empty_transfer_still_finishes() {
        let mut seen = Vec::new();
        {
            let mut progress = MonotonicProgress::new(|sent, total| seen.push((sent, total)));
            progress.finish(0);
        }
        assert_eq!(seen, vec![(0, 0)]);
    }

    #[test]
    fn test_clamps_overshoot() {
        let mut seen = Vec::new();
        {
            let mut progress = MonotonicProgress::new(|sent, _| seen.push(sent));
            progress.report(150, 100);
        }
        assert_eq!(seen, vec![100]);
    }
}
