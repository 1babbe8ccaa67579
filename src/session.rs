use crate::keystrokes::KeystrokeLog;
use crate::metrics::{self, Metrics, WpmModel, WpmSettings};
use crate::store::ReferenceText;
use crate::util::{char_prefix, word_count};
use std::time::{Duration, SystemTime};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum Lifecycle {
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    /// Longer than the reference, or the session is already complete
    Rejected,
    Accepted { appended: usize, completed: bool },
}

/// Periodic callback owned by a session. Armed when typing starts, cancelled
/// on completion, retry and teardown.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickSchedule {
    interval: Duration,
    next_due: Option<SystemTime>,
}

impl TickSchedule {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_due: None,
        }
    }

    pub fn arm(&mut self, now: SystemTime) {
        self.next_due = Some(now + self.interval);
    }

    pub fn cancel(&mut self) {
        self.next_due = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next_due.is_some()
    }

    /// True when the tick is due; reschedules one interval after `now`
    pub fn poll(&mut self, now: SystemTime) -> bool {
        match self.next_due {
            Some(due) if due <= now => {
                self.next_due = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

/// One user typing one reference text
#[derive(Debug, Clone)]
pub struct TypingSession {
    reference_id: String,
    reference: Vec<char>,
    typed: Vec<char>,
    keystrokes: KeystrokeLog,
    started_at: Option<SystemTime>,
    lifecycle: Lifecycle,
    metrics: Metrics,
    wpm_settings: WpmSettings,
    tick: TickSchedule,
    // mismatches in `typed`, kept in step with per-key edits
    errors: usize,
    // words already present when this session began appending (resume)
    baseline_words: usize,
}

impl TypingSession {
    pub fn new(reference: &ReferenceText, wpm_settings: WpmSettings) -> Self {
        Self {
            reference_id: reference.id.clone(),
            reference: reference.content.chars().collect(),
            typed: Vec::new(),
            keystrokes: KeystrokeLog::new(),
            started_at: None,
            lifecycle: Lifecycle::NotStarted,
            metrics: Metrics::default(),
            wpm_settings,
            tick: TickSchedule::new(wpm_settings.refresh),
            errors: 0,
            baseline_words: 0,
        }
    }

    /// Rebuild a session from a saved character count.
    ///
    /// The first `chars_typed` characters are assumed to have been typed
    /// correctly: the stored record has a count, not the actual input.
    pub fn resume(
        reference: &ReferenceText,
        chars_typed: usize,
        completed: bool,
        wpm_settings: WpmSettings,
    ) -> Self {
        let mut session = Self::new(reference, wpm_settings);
        let total = session.reference.len();
        let restored = if completed { total } else { chars_typed.min(total) };

        session.typed = char_prefix(&reference.content, restored);
        session.baseline_words = word_count(&session.typed);
        session.lifecycle = match restored {
            0 => Lifecycle::NotStarted,
            n if n == total => Lifecycle::Completed,
            _ => Lifecycle::InProgress,
        };
        session.metrics = metrics::text_metrics(&session.reference, &session.typed);

        info!(
            reference_id = %session.reference_id,
            restored,
            total,
            lifecycle = %session.lifecycle,
            "session resumed"
        );
        session
    }

    pub fn submit_input(&mut self, candidate: &str) -> InputOutcome {
        self.submit_input_at(candidate, SystemTime::now())
    }

    /// Replace the typed prefix with `candidate`, accepted at `now`
    pub fn submit_input_at(&mut self, candidate: &str, now: SystemTime) -> InputOutcome {
        if self.lifecycle == Lifecycle::Completed {
            return InputOutcome::Rejected;
        }

        let candidate: Vec<char> = candidate.chars().collect();
        if candidate.len() > self.reference.len() {
            debug!(
                len = candidate.len(),
                max = self.reference.len(),
                "input past end of reference ignored"
            );
            return InputOutcome::Rejected;
        }

        let appended = candidate.len().saturating_sub(self.typed.len());
        self.errors = metrics::error_count(&self.reference, &candidate);
        self.typed = candidate;
        self.apply_edit(appended, now)
    }

    /// Append one character, accepted at `now`
    pub fn type_char_at(&mut self, c: char, now: SystemTime) -> InputOutcome {
        if self.lifecycle == Lifecycle::Completed || self.typed.len() >= self.reference.len() {
            return InputOutcome::Rejected;
        }

        if self.reference[self.typed.len()] != c {
            self.errors += 1;
        }
        self.typed.push(c);
        self.apply_edit(1, now)
    }

    /// Remove the last typed character, at `now`
    pub fn backspace_at(&mut self, now: SystemTime) -> InputOutcome {
        if self.lifecycle == Lifecycle::Completed {
            return InputOutcome::Rejected;
        }

        if let Some(c) = self.typed.pop() {
            if self.reference[self.typed.len()] != c {
                self.errors = self.errors.saturating_sub(1);
            }
        }
        self.apply_edit(0, now)
    }

    fn apply_edit(&mut self, appended: usize, now: SystemTime) -> InputOutcome {
        if appended > 0 {
            if self.started_at.is_none() {
                self.start(now);
            }
            self.keystrokes.record(appended, now);
        }
        if self.lifecycle == Lifecycle::NotStarted && !self.typed.is_empty() {
            self.lifecycle = Lifecycle::InProgress;
        }

        self.recompute(now);

        let completed = self.typed.len() == self.reference.len() && !self.typed.is_empty();
        if completed {
            self.complete(now);
        }

        InputOutcome::Accepted {
            appended,
            completed,
        }
    }

    /// Start over after completing. Returns false outside `Completed`.
    pub fn retry(&mut self) -> bool {
        if self.lifecycle != Lifecycle::Completed {
            return false;
        }

        self.typed.clear();
        self.keystrokes.clear();
        self.started_at = None;
        self.metrics = Metrics::default();
        self.errors = 0;
        self.baseline_words = 0;
        self.tick.cancel();
        self.lifecycle = Lifecycle::NotStarted;

        info!(reference_id = %self.reference_id, "session reset for retry");
        true
    }

    /// Periodic refresh for the session-average model. Returns true when the
    /// displayed WPM was recomputed.
    pub fn on_tick(&mut self, now: SystemTime) -> bool {
        if self.wpm_settings.model != WpmModel::SessionAverage || !self.tick.poll(now) {
            return false;
        }
        self.metrics.wpm = self.session_average_wpm(now);
        true
    }

    /// Stop periodic work; the session will receive no further events
    pub fn teardown(&mut self) {
        self.tick.cancel();
    }

    fn start(&mut self, now: SystemTime) {
        self.started_at = Some(now);
        if self.wpm_settings.model == WpmModel::SessionAverage {
            self.tick.arm(now);
        }
        info!(reference_id = %self.reference_id, "typing started");
    }

    fn complete(&mut self, now: SystemTime) {
        self.lifecycle = Lifecycle::Completed;
        self.tick.cancel();
        if self.wpm_settings.model == WpmModel::SessionAverage {
            // final reading in place of the cancelled tick
            self.metrics.wpm = self.session_average_wpm(now);
        }
        info!(
            reference_id = %self.reference_id,
            wpm = self.metrics.wpm,
            accuracy = self.metrics.accuracy,
            errors = self.metrics.error_count,
            "session completed"
        );
    }

    fn recompute(&mut self, now: SystemTime) {
        let wpm = match self.wpm_settings.model {
            WpmModel::SlidingWindow => metrics::sliding_window_wpm(
                &self.keystrokes,
                now,
                self.wpm_settings.window,
                self.wpm_settings.min_keystrokes,
            ),
            WpmModel::SessionAverage => self.metrics.wpm,
        };
        self.metrics = Metrics {
            wpm,
            ..metrics::counts_metrics(self.typed.len(), self.reference.len(), self.errors)
        };
    }

    fn session_average_wpm(&self, now: SystemTime) -> u32 {
        let words = word_count(&self.typed).saturating_sub(self.baseline_words);
        metrics::session_average_wpm(words, self.started_at, now)
    }

    /// Sliding-window WPM as of `now`, without waiting for new input
    pub fn refresh_wpm(&mut self, now: SystemTime) {
        if self.wpm_settings.model == WpmModel::SlidingWindow
            && self.lifecycle == Lifecycle::InProgress
        {
            self.metrics.wpm = metrics::sliding_window_wpm(
                &self.keystrokes,
                now,
                self.wpm_settings.window,
                self.wpm_settings.min_keystrokes,
            );
        }
    }

    pub fn reference_id(&self) -> &str {
        &self.reference_id
    }

    pub fn reference(&self) -> &[char] {
        &self.reference
    }

    pub fn typed(&self) -> &[char] {
        &self.typed
    }

    pub fn typed_prefix(&self) -> String {
        self.typed.iter().collect()
    }

    pub fn keystrokes(&self) -> &KeystrokeLog {
        &self.keystrokes
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics
    }

    pub fn wpm_model(&self) -> WpmModel {
        self.wpm_settings.model
    }

    pub fn tick_armed(&self) -> bool {
        self.tick.is_armed()
    }

    pub fn chars_typed(&self) -> usize {
        self.typed.len()
    }

    pub fn total_chars(&self) -> usize {
        self.reference.len()
    }

    pub fn is_completed(&self) -> bool {
        self.lifecycle == Lifecycle::Completed
    }

    pub fn mismatch_positions(&self) -> Vec<usize> {
        metrics::mismatch_positions(&self.reference, &self.typed)
    }
}
