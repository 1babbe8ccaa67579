use std::time::{Duration, SystemTime};

use assert_matches::assert_matches;
use typebook::checkpoint::SaveStatus;
use typebook::engine::{Engine, EngineSettings};
use typebook::session::{InputOutcome, Lifecycle};
use typebook::store::{MemoryStore, ProgressRecord, ProgressStore, ReferenceText};
use typebook::writer::InlineWriter;

/// End-to-end behaviour of typing sessions against an in-memory store:
/// checkpoint cadence, completion, resume and the correction flow.

fn library(content: &str) -> MemoryStore {
    let store = MemoryStore::new();
    store
        .insert_reference(ReferenceText {
            id: "book-1".to_string(),
            title: "A Book".to_string(),
            author: "Someone".to_string(),
            content: content.to_string(),
        })
        .unwrap();
    store
}

fn open(store: &MemoryStore) -> Engine<InlineWriter<MemoryStore>> {
    Engine::start_or_resume(
        store,
        "book-1",
        "reader",
        EngineSettings::default(),
        InlineWriter::new(store.clone()),
    )
    .unwrap()
}

fn at(ms: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_millis(ms)
}

fn text(len: usize) -> String {
    "the quick brown fox jumps over the lazy dog "
        .chars()
        .cycle()
        .take(len)
        .collect()
}

#[test]
fn checkpoint_cadence_99_then_100() {
    let reference = text(250);
    let store = library(&reference);
    let mut engine = open(&store);

    for n in 1..=99 {
        engine.submit_input_at(&reference[..n], at(n as u64 * 50));
    }
    assert!(store.writes().is_empty(), "no write before 100 chars");

    engine.submit_input_at(&reference[..100], at(5_000));
    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].chars_typed, 100);
    assert!(!writes[0].completed);
    assert_eq!(engine.last_checkpoint_len(), 100);
}

#[test]
fn checkpoint_cadence_is_delta_not_multiple() {
    let reference = text(400);
    let store = library(&reference);
    let mut engine = open(&store);

    // a batch that jumps past 100 still checkpoints
    engine.submit_input_at(&reference[..150], at(0));
    engine.submit_input_at(&reference[..249], at(100));
    engine.submit_input_at(&reference[..250], at(200));

    let chars: Vec<usize> = store.writes().iter().map(|r| r.chars_typed).collect();
    assert_eq!(chars, vec![150, 250]);
}

#[test]
fn completion_always_forces_a_write() {
    let reference = text(42);
    let store = library(&reference);
    let mut engine = open(&store);

    engine.submit_input_at(&reference[..41], at(0));
    assert!(store.writes().is_empty());

    assert_matches!(
        engine.submit_input_at(&reference, at(1_000)),
        InputOutcome::Accepted {
            completed: true,
            ..
        }
    );
    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].chars_typed, 42);
    assert!(writes[0].completed);
}

#[test]
fn hello_world_with_correction() {
    let store = library("hello world");
    let mut engine = open(&store);

    let steps = [
        "h",
        "he",
        "hel",
        "hell",
        "hello",
        "hello ",
        "hello w",
        "hello wo",
        "hello wx",
        "hello wxr",
        "hello wxrl",
        // correct the mistake
        "hello wxr",
        "hello wx",
        "hello w",
        "hello wo",
        "hello wor",
        "hello worl",
        "hello world",
    ];
    for (i, prefix) in steps.iter().enumerate() {
        engine.submit_input_at(prefix, at(i as u64 * 200));
        if *prefix == "hello wxrl" {
            assert_eq!(engine.snapshot().error_count, 1);
        }
    }

    let snapshot = engine.snapshot();
    assert_eq!(engine.session().typed_prefix(), "hello world");
    assert_eq!(snapshot.error_count, 0);
    assert_eq!(snapshot.accuracy, 100);
    assert_eq!(snapshot.lifecycle, Lifecycle::Completed);
    assert_eq!(snapshot.save_status, SaveStatus::Saved);

    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert!(writes[0].completed);
    assert_eq!(writes[0].chars_typed, 11);
}

#[test]
fn prefix_never_exceeds_reference_and_completion_tracks_length() {
    let reference = "short text";
    let store = library(reference);
    let mut engine = open(&store);

    let attempts = [
        "s",
        "short text and more",
        "sh",
        "",
        "shxrt",
        "short tex",
        "short text!",
        "short texx",
    ];
    for (i, attempt) in attempts.iter().enumerate() {
        engine.submit_input_at(attempt, at(i as u64 * 10));
        let session = engine.session();
        assert!(session.chars_typed() <= session.total_chars());
        assert_eq!(
            session.lifecycle() == Lifecycle::Completed,
            session.chars_typed() == session.total_chars()
        );
    }

    // the last attempt filled the text with one wrong character
    assert_eq!(engine.snapshot().lifecycle, Lifecycle::Completed);
    assert_eq!(engine.snapshot().error_count, 1);
}

#[test]
fn resume_round_trip() {
    let reference = text(300);
    let store = library(&reference);

    {
        let mut engine = open(&store);
        engine.submit_input_at(&reference[..120], at(0));
        // typed further, but only the checkpoint survives
        engine.submit_input_at(&reference[..180], at(1_000));
        engine.teardown();
    }

    let engine = open(&store);
    assert_eq!(engine.session().typed_prefix(), &reference[..120]);
    assert_eq!(engine.snapshot().lifecycle, Lifecycle::InProgress);
    assert_eq!(engine.last_checkpoint_len(), 120);
    assert_eq!(engine.snapshot().wpm, 0);
}

#[test]
fn resume_discards_unsaved_errors() {
    let reference = text(200);
    let store = library(&reference);

    {
        let mut engine = open(&store);
        let mut typed: String = reference[..100].to_string();
        typed.replace_range(0..1, "X");
        engine.submit_input_at(&typed, at(0));
        assert_eq!(engine.snapshot().error_count, 1);
    }

    let engine = open(&store);
    assert_eq!(engine.snapshot().chars_typed, 100);
    assert_eq!(engine.snapshot().error_count, 0);
}

#[test]
fn resume_completed_then_retry() {
    let store = library("done");
    store
        .upsert_progress(&ProgressRecord::new("reader", "book-1", 4, true))
        .unwrap();

    let mut engine = open(&store);
    assert_eq!(engine.snapshot().lifecycle, Lifecycle::Completed);
    assert_eq!(engine.submit_input_at("d", at(0)), InputOutcome::Rejected);

    assert!(engine.retry());
    engine.submit_input_at("do", at(10));
    // the completed record is left alone until the next completion
    assert_eq!(store.writes().len(), 1);
    assert!(store.progress("reader", "book-1").unwrap().unwrap().completed);

    engine.submit_input_at("done", at(20));
    assert_eq!(store.writes().len(), 2);
}

#[test]
fn persistence_failure_keeps_typing_and_retries() {
    let reference = text(300);
    let store = library(&reference);
    let mut engine = open(&store);

    store.set_fail_writes(true);
    engine.submit_input_at(&reference[..100], at(0));
    assert_matches!(engine.snapshot().save_status, SaveStatus::Failed(_));

    // input continues against in-memory state
    engine.submit_input_at(&reference[..140], at(100));
    assert_eq!(engine.snapshot().chars_typed, 140);

    store.set_fail_writes(false);
    engine.submit_input_at(&reference[..141], at(200));
    assert_eq!(engine.last_checkpoint_len(), 141);
    assert_eq!(store.writes().len(), 1);
}

#[test]
fn progress_is_scoped_to_owner() {
    let reference = text(150);
    let store = library(&reference);
    let mut engine = open(&store);
    engine.submit_input_at(&reference[..100], at(0));

    let other = Engine::start_or_resume(
        &store,
        "book-1",
        "someone-else",
        EngineSettings::default(),
        InlineWriter::new(store.clone()),
    )
    .unwrap();
    assert_eq!(other.snapshot().lifecycle, Lifecycle::NotStarted);
    assert_eq!(other.snapshot().chars_typed, 0);
}
