//! Live performance metrics for a typing session.
//!
//! Everything here is a pure function of the reference text, the typed
//! prefix and the keystroke log, evaluated at an explicit `now`.

use crate::keystrokes::KeystrokeLog;
use crate::util::time_diff_ms;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Standard word length used by WPM conventions
pub const CHARS_PER_WORD: f64 = 5.0;

/// How words-per-minute is derived. Chosen once per session.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum WpmModel {
    /// Recent keystrokes only, recomputed on every input
    #[default]
    SlidingWindow,
    /// Words typed since the session started, recomputed on a fixed tick
    SessionAverage,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WpmSettings {
    pub model: WpmModel,
    pub window: Duration,
    pub min_keystrokes: usize,
    pub refresh: Duration,
}

impl Default for WpmSettings {
    fn default() -> Self {
        Self {
            model: WpmModel::SlidingWindow,
            window: Duration::from_secs(10),
            min_keystrokes: 5,
            refresh: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub wpm: u32,
    pub accuracy: u32,
    pub error_count: usize,
    pub progress_percent: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            wpm: 0,
            accuracy: 100,
            error_count: 0,
            progress_percent: 0.0,
        }
    }
}

/// Indices where the typed prefix differs from the reference
pub fn mismatch_positions(reference: &[char], typed: &[char]) -> Vec<usize> {
    typed
        .iter()
        .zip(reference.iter())
        .positions(|(t, r)| t != r)
        .collect()
}

pub fn error_count(reference: &[char], typed: &[char]) -> usize {
    typed
        .iter()
        .zip(reference.iter())
        .filter(|(t, r)| t != r)
        .count()
}

/// Rounded percentage of correct characters; 100 for an empty prefix
pub fn accuracy(typed_len: usize, errors: usize) -> u32 {
    if typed_len == 0 {
        return 100;
    }
    let matches = typed_len.saturating_sub(errors);
    ((matches as f64 / typed_len as f64) * 100.0).round() as u32
}

pub fn progress_percent(typed_len: usize, reference_len: usize) -> f64 {
    if reference_len == 0 {
        return 100.0;
    }
    ((typed_len as f64 / reference_len as f64) * 100.0).min(100.0)
}

/// WPM over the keystrokes that landed within `window` of `now`.
///
/// Fewer than `min_keystrokes` recent entries reports 0 so that the start of
/// a session, or the first keys after a pause, do not produce spikes.
pub fn sliding_window_wpm(
    log: &KeystrokeLog,
    now: SystemTime,
    window: Duration,
    min_keystrokes: usize,
) -> u32 {
    let recent = log.recent(now, window);
    if recent.is_empty() || recent.len() < min_keystrokes {
        return 0;
    }

    let minutes = time_diff_ms(recent[0], now) as f64 / 60_000.0;
    if minutes <= 0.0 {
        return 0;
    }

    let words = recent.len() as f64 / CHARS_PER_WORD;
    (words / minutes).round() as u32
}

/// WPM averaged over the whole session from whitespace-delimited words
pub fn session_average_wpm(words: usize, started_at: Option<SystemTime>, now: SystemTime) -> u32 {
    let Some(started_at) = started_at else {
        return 0;
    };

    let minutes = time_diff_ms(started_at, now) as f64 / 60_000.0;
    if minutes <= 0.0 {
        return 0;
    }

    (words as f64 / minutes).round() as u32
}

/// Accuracy, error count and progress for the current prefix, leaving `wpm`
/// to the caller's model
pub fn text_metrics(reference: &[char], typed: &[char]) -> Metrics {
    counts_metrics(typed.len(), reference.len(), error_count(reference, typed))
}

/// Same as `text_metrics`, from an error count the caller already tracks
pub fn counts_metrics(typed_len: usize, reference_len: usize, errors: usize) -> Metrics {
    Metrics {
        wpm: 0,
        accuracy: accuracy(typed_len, errors),
        error_count: errors,
        progress_percent: progress_percent(typed_len, reference_len),
    }
}
