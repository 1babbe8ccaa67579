//! Checkpoint policy: when to persist progress, and how write results are
//! reconciled with the in-memory session.
//!
//! Requests are tagged with a sequence number and the character count they
//! carry. Only a successful result for a count above the current mark moves
//! the mark, so late or out-of-order completions can never move it back.

use crate::error::{EngineError, StoreError};
use crate::store::ProgressRecord;
use std::collections::BTreeMap;
use tracing::{debug, warn};

pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointRequest {
    pub seq: u64,
    pub record: ProgressRecord,
}

#[derive(Debug)]
pub struct CheckpointOutcome {
    pub seq: u64,
    pub chars_typed: usize,
    pub completed: bool,
    pub result: Result<(), StoreError>,
}

impl CheckpointOutcome {
    pub fn for_request(request: &CheckpointRequest, result: Result<(), StoreError>) -> Self {
        Self {
            seq: request.seq,
            chars_typed: request.record.chars_typed,
            completed: request.record.completed,
            result,
        }
    }
}

/// What the UI shows next to the stats
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CheckpointController {
    owner_id: String,
    reference_id: String,
    interval: usize,
    last_checkpoint_len: usize,
    // (chars_typed, completed) of the newest applied write
    last_confirmed: Option<(usize, bool)>,
    newest_applied_seq: Option<u64>,
    in_flight: BTreeMap<u64, (usize, bool)>,
    next_seq: u64,
    status: SaveStatus,
}

impl CheckpointController {
    pub fn new(owner_id: &str, reference_id: &str, interval: usize) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            reference_id: reference_id.to_string(),
            interval: interval.max(1),
            last_checkpoint_len: 0,
            last_confirmed: None,
            newest_applied_seq: None,
            in_flight: BTreeMap::new(),
            next_seq: 0,
            status: SaveStatus::Idle,
        }
    }

    /// Controller for a session rebuilt from `record`
    pub fn resumed(record: &ProgressRecord, interval: usize) -> Self {
        let mut controller = Self::new(&record.owner_id, &record.reference_id, interval);
        controller.last_checkpoint_len = record.chars_typed;
        controller.last_confirmed = Some((record.chars_typed, record.completed));
        controller
    }

    /// Decide whether the current progress needs a durable write.
    ///
    /// Completion always qualifies; otherwise at least `interval` characters
    /// must have been added since the last checkpoint (or the one in flight).
    /// A record identical to one already written or being written is skipped.
    pub fn evaluate(&mut self, chars_typed: usize, completed: bool) -> Option<CheckpointRequest> {
        let candidate = (chars_typed, completed);
        if self.last_confirmed == Some(candidate) || self.in_flight.values().any(|v| *v == candidate)
        {
            return None;
        }

        if !completed {
            let baseline = self
                .in_flight
                .values()
                .map(|(chars, _)| *chars)
                .fold(self.last_checkpoint_len, usize::max);
            if chars_typed.saturating_sub(baseline) < self.interval {
                return None;
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.in_flight.insert(seq, candidate);
        self.status = SaveStatus::Saving;
        debug!(
            seq,
            chars_typed,
            completed,
            last_checkpoint_len = self.last_checkpoint_len,
            "checkpoint issued"
        );

        Some(CheckpointRequest {
            seq,
            record: ProgressRecord::new(&self.owner_id, &self.reference_id, chars_typed, completed),
        })
    }

    /// Apply the result of a write issued by `evaluate`
    pub fn on_outcome(&mut self, outcome: CheckpointOutcome) -> Result<(), EngineError> {
        if self.in_flight.remove(&outcome.seq).is_none() {
            debug!(seq = outcome.seq, "outcome for unknown checkpoint ignored");
            return Ok(());
        }

        match outcome.result {
            Ok(()) => {
                if outcome.chars_typed > self.last_checkpoint_len {
                    self.last_checkpoint_len = outcome.chars_typed;
                }
                if self.newest_applied_seq.map_or(true, |seq| outcome.seq > seq) {
                    self.newest_applied_seq = Some(outcome.seq);
                    self.last_confirmed = Some((outcome.chars_typed, outcome.completed));
                }
                self.status = if self.in_flight.is_empty() {
                    SaveStatus::Saved
                } else {
                    SaveStatus::Saving
                };
                debug!(
                    seq = outcome.seq,
                    last_checkpoint_len = self.last_checkpoint_len,
                    "checkpoint saved"
                );
                Ok(())
            }
            Err(err) => {
                let err = EngineError::Persistence(err);
                warn!(
                    seq = outcome.seq,
                    chars_typed = outcome.chars_typed,
                    error = %err,
                    "checkpoint failed"
                );
                self.status = SaveStatus::Failed(err.to_string());
                Err(err)
            }
        }
    }

    /// A retried session must be able to write its next completion even
    /// though an identical completed record already exists. The mark stays.
    pub fn on_retry(&mut self) {
        self.last_confirmed = None;
    }

    pub fn last_checkpoint_len(&self) -> usize {
        self.last_checkpoint_len
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn status(&self) -> &SaveStatus {
        &self.status
    }

    pub fn interval(&self) -> usize {
        self.interval
    }
}
