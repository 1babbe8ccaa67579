use crate::checkpoint::{CheckpointController, CheckpointOutcome, SaveStatus};
use crate::error::EngineError;
use crate::metrics::WpmSettings;
use crate::session::{InputOutcome, Lifecycle, TypingSession};
use crate::store::{ProgressStore, ReferenceSource, ReferenceText};
use crate::writer::CheckpointWriter;
use std::time::SystemTime;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub wpm: WpmSettings,
    pub checkpoint_interval: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            wpm: WpmSettings::default(),
            checkpoint_interval: crate::checkpoint::DEFAULT_CHECKPOINT_INTERVAL,
        }
    }
}

/// Live view of a session for display
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub wpm: u32,
    pub accuracy: u32,
    pub error_count: usize,
    pub progress_percent: f64,
    pub chars_typed: usize,
    pub total_chars: usize,
    pub lifecycle: Lifecycle,
    pub save_status: SaveStatus,
}

/// Drives one typing session: input, metrics and checkpoints
pub struct Engine<W: CheckpointWriter> {
    reference: ReferenceText,
    session: TypingSession,
    checkpoints: CheckpointController,
    writer: W,
}

impl<W: CheckpointWriter> Engine<W> {
    /// Load the reference text and any saved progress for `owner_id`.
    ///
    /// Fails when the text does not exist or storage cannot be read; no
    /// session exists until that is resolved.
    pub fn start_or_resume<S>(
        store: &S,
        reference_id: &str,
        owner_id: &str,
        settings: EngineSettings,
        writer: W,
    ) -> Result<Self, EngineError>
    where
        S: ReferenceSource + ProgressStore,
    {
        let reference = store
            .reference(reference_id)
            .map_err(EngineError::ProgressLoad)?
            .ok_or_else(|| EngineError::ReferenceNotFound(reference_id.to_string()))?;

        let saved = store
            .progress(owner_id, reference_id)
            .map_err(EngineError::ProgressLoad)?;

        let (session, checkpoints) = match saved {
            Some(record) => (
                TypingSession::resume(
                    &reference,
                    record.chars_typed,
                    record.completed,
                    settings.wpm,
                ),
                CheckpointController::resumed(&record, settings.checkpoint_interval),
            ),
            None => {
                info!(reference_id, owner_id, "new session");
                (
                    TypingSession::new(&reference, settings.wpm),
                    CheckpointController::new(owner_id, reference_id, settings.checkpoint_interval),
                )
            }
        };

        let mut engine = Self {
            reference,
            session,
            checkpoints,
            writer,
        };
        if engine.session.is_completed() {
            // a full-length record saved before its completion was recorded
            engine.evaluate_checkpoint();
        }
        Ok(engine)
    }

    pub fn submit_input(&mut self, candidate: &str) -> InputOutcome {
        self.submit_input_at(candidate, SystemTime::now())
    }

    pub fn submit_input_at(&mut self, candidate: &str, now: SystemTime) -> InputOutcome {
        let outcome = self.session.submit_input_at(candidate, now);
        if let InputOutcome::Accepted { .. } = outcome {
            self.evaluate_checkpoint();
        }
        outcome
    }

    /// Append one character to the current prefix
    pub fn type_char(&mut self, c: char) -> InputOutcome {
        self.type_char_at(c, SystemTime::now())
    }

    pub fn type_char_at(&mut self, c: char, now: SystemTime) -> InputOutcome {
        let outcome = self.session.type_char_at(c, now);
        if let InputOutcome::Accepted { .. } = outcome {
            self.evaluate_checkpoint();
        }
        outcome
    }

    /// Remove the last character of the current prefix
    pub fn backspace(&mut self) -> InputOutcome {
        self.backspace_at(SystemTime::now())
    }

    pub fn backspace_at(&mut self, now: SystemTime) -> InputOutcome {
        let outcome = self.session.backspace_at(now);
        if let InputOutcome::Accepted { .. } = outcome {
            self.evaluate_checkpoint();
        }
        outcome
    }

    /// Issue a checkpoint if the policy calls for one. Returns the sequence
    /// number of the issued write.
    pub fn evaluate_checkpoint(&mut self) -> Option<u64> {
        let request = self
            .checkpoints
            .evaluate(self.session.chars_typed(), self.session.is_completed())?;
        let seq = request.seq;

        if let Some(outcome) = self.writer.write(request) {
            // reported through the save status
            let _ = self.on_checkpoint_outcome(outcome);
        }
        Some(seq)
    }

    /// Apply a write result delivered by the writer
    pub fn on_checkpoint_outcome(&mut self, outcome: CheckpointOutcome) -> Result<(), EngineError> {
        self.checkpoints.on_outcome(outcome)
    }

    pub fn retry(&mut self) -> bool {
        let reset = self.session.retry();
        if reset {
            self.checkpoints.on_retry();
        }
        reset
    }

    /// Periodic work: the session-average refresh tick, and decay of the
    /// sliding window while the user pauses
    pub fn on_tick(&mut self, now: SystemTime) -> bool {
        let before = self.session.metrics().wpm;
        if !self.session.on_tick(now) {
            self.session.refresh_wpm(now);
        }
        self.session.metrics().wpm != before
    }

    pub fn snapshot(&self) -> Snapshot {
        let metrics = self.session.metrics();
        Snapshot {
            wpm: metrics.wpm,
            accuracy: metrics.accuracy,
            error_count: metrics.error_count,
            progress_percent: metrics.progress_percent,
            chars_typed: self.session.chars_typed(),
            total_chars: self.session.total_chars(),
            lifecycle: self.session.lifecycle(),
            save_status: self.checkpoints.status().clone(),
        }
    }

    /// Stop the session. Writes already handed to the writer may still
    /// finish; their results are not observed.
    pub fn teardown(mut self) -> W {
        self.session.teardown();
        info!(
            reference_id = self.session.reference_id(),
            chars_typed = self.session.chars_typed(),
            last_checkpoint_len = self.checkpoints.last_checkpoint_len(),
            "session closed"
        );
        self.writer
    }

    pub fn reference(&self) -> &ReferenceText {
        &self.reference
    }

    pub fn session(&self) -> &TypingSession {
        &self.session
    }

    pub fn last_checkpoint_len(&self) -> usize {
        self.checkpoints.last_checkpoint_len()
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::writer::InlineWriter;
    use assert_matches::assert_matches;
    use std::time::Duration;

    fn store_with(content: &str) -> MemoryStore {
        let store = MemoryStore::new();
        store
            .insert_reference(ReferenceText {
                id: "b1".into(),
                title: "Book".into(),
                author: "Author".into(),
                content: content.into(),
            })
            .unwrap();
        store
    }

    fn engine(store: &MemoryStore) -> Engine<InlineWriter<MemoryStore>> {
        Engine::start_or_resume(
            store,
            "b1",
            "me",
            EngineSettings::default(),
            InlineWriter::new(store.clone()),
        )
        .unwrap()
    }

    fn at(ms: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_millis(ms)
    }

    #[test]
    fn test_missing_reference() {
        let store = MemoryStore::new();
        let result = Engine::start_or_resume(
            &store,
            "nope",
            "me",
            EngineSettings::default(),
            InlineWriter::new(store.clone()),
        );

        assert_matches!(result.err(), Some(EngineError::ReferenceNotFound(id)) if id == "nope");
    }

    #[test]
    fn test_load_failure() {
        let store = store_with("abc");
        store.set_fail_reads(true);
        let result = Engine::start_or_resume(
            &store,
            "b1",
            "me",
            EngineSettings::default(),
            InlineWriter::new(store.clone()),
        );

        assert_matches!(result.err(), Some(EngineError::ProgressLoad(_)));
    }

    #[test]
    fn test_fresh_snapshot() {
        let store = store_with("hello");
        let e = engine(&store);
        let snap = e.snapshot();

        assert_eq!(snap.lifecycle, Lifecycle::NotStarted);
        assert_eq!(snap.accuracy, 100);
        assert_eq!(snap.chars_typed, 0);
        assert_eq!(snap.total_chars, 5);
        assert_eq!(snap.save_status, SaveStatus::Idle);
    }

    #[test]
    fn test_evaluate_twice_writes_once() {
        let store = store_with(&"a".repeat(300));
        let mut e = engine(&store);
        e.submit_input_at(&"a".repeat(100), at(0));
        assert_eq!(store.writes().len(), 1);

        assert!(e.evaluate_checkpoint().is_none());
        assert!(e.evaluate_checkpoint().is_none());
        assert_eq!(store.writes().len(), 1);
        assert_eq!(e.last_checkpoint_len(), 100);
    }

    #[test]
    fn test_type_char_and_backspace() {
        let store = store_with("abc");
        let mut e = engine(&store);

        e.type_char('a');
        e.type_char('x');
        assert_eq!(e.snapshot().error_count, 1);
        e.backspace();
        e.type_char('b');
        assert_eq!(e.session().typed_prefix(), "ab");
        assert_eq!(e.snapshot().error_count, 0);
    }

    #[test]
    fn test_failed_write_is_recoverable() {
        let store = store_with(&"a".repeat(300));
        store.set_fail_writes(true);
        let mut e = engine(&store);

        e.submit_input_at(&"a".repeat(100), at(0));
        assert_matches!(e.snapshot().save_status, SaveStatus::Failed(_));
        assert_eq!(e.last_checkpoint_len(), 0);
        assert_eq!(e.snapshot().chars_typed, 100);

        store.set_fail_writes(false);
        e.submit_input_at(&"a".repeat(101), at(10));
        assert_eq!(e.last_checkpoint_len(), 101);
        assert_eq!(e.snapshot().save_status, SaveStatus::Saved);
        assert_eq!(store.writes().last().unwrap().chars_typed, 101);
    }

    #[test]
    fn test_rejected_input_issues_nothing() {
        let store = store_with("ab");
        let mut e = engine(&store);

        assert_eq!(e.submit_input_at("abc", at(0)), InputOutcome::Rejected);
        assert!(store.writes().is_empty());
    }

    #[test]
    fn test_retry_then_complete_rewrites_record() {
        let store = store_with("ab");
        let mut e = engine(&store);
        e.submit_input_at("ab", at(0));
        assert_eq!(store.writes().len(), 1);

        assert!(e.retry());
        assert_eq!(e.snapshot().lifecycle, Lifecycle::NotStarted);
        e.submit_input_at("a", at(10));
        assert_eq!(store.writes().len(), 1);
        e.submit_input_at("ab", at(20));

        let writes = store.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes[1].completed);
    }

    #[test]
    fn test_on_tick_decays_sliding_wpm() {
        let store = store_with("the quick brown fox");
        let mut e = engine(&store);
        for (i, prefix) in ["t", "th", "the", "the ", "the q"].iter().enumerate() {
            e.submit_input_at(prefix, at(i as u64 * 1_000));
        }
        assert!(e.snapshot().wpm > 0);

        assert!(e.on_tick(at(30_000)));
        assert_eq!(e.snapshot().wpm, 0);
    }

    #[test]
    fn test_resume_full_length_record_writes_completion() {
        let store = store_with("done");
        store
            .upsert_progress(&crate::store::ProgressRecord::new("me", "b1", 4, false))
            .unwrap();

        let e = engine(&store);
        assert_eq!(e.snapshot().lifecycle, Lifecycle::Completed);

        let writes = store.writes();
        assert_eq!(writes.len(), 2);
        assert!(writes[1].completed);
        assert_eq!(writes[1].chars_typed, 4);
        assert!(store.progress("me", "b1").unwrap().unwrap().completed);
    }

    #[test]
    fn test_resume_completed_record_writes_nothing() {
        let store = store_with("done");
        store
            .upsert_progress(&crate::store::ProgressRecord::new("me", "b1", 4, true))
            .unwrap();

        engine(&store);
        assert_eq!(store.writes().len(), 1);
    }

    #[test]
    fn test_per_key_typing_checkpoints() {
        let store = store_with(&"ab".repeat(150));
        let mut e = engine(&store);

        for i in 0..100u64 {
            let c = if i % 2 == 0 { 'a' } else { 'b' };
            e.type_char_at(c, at(i * 50));
        }
        assert_eq!(store.writes().len(), 1);
        assert_eq!(e.last_checkpoint_len(), 100);

        e.backspace_at(at(6_000));
        e.type_char_at('x', at(6_100));
        assert_eq!(e.snapshot().error_count, 1);
        assert_eq!(store.writes().len(), 1);
    }
}
