use std::time::{Duration, SystemTime};

/// History of append events, one timestamp per character added to the
/// typed prefix. Corrections never remove entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeystrokeLog {
    timestamps: Vec<SystemTime>,
}

impl KeystrokeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` characters accepted together at `at`
    pub fn record(&mut self, count: usize, at: SystemTime) {
        self.timestamps.extend(std::iter::repeat(at).take(count));
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[SystemTime] {
        &self.timestamps
    }

    /// Entries strictly newer than `window` before `now`
    pub fn recent(&self, now: SystemTime, window: Duration) -> &[SystemTime] {
        let cutoff = now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);
        // the log is append-only with non-decreasing timestamps
        let first = self.timestamps.partition_point(|t| *t <= cutoff);
        &self.timestamps[first..]
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
    }
}
