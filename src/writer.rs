use crate::checkpoint::{CheckpointOutcome, CheckpointRequest};
use crate::store::ProgressStore;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Performs checkpoint writes on behalf of the engine
pub trait CheckpointWriter {
    /// Perform or enqueue `request`. Returns the outcome when the write
    /// finished before returning; queued writes report their outcome
    /// through whatever channel the writer was built with.
    fn write(&mut self, request: CheckpointRequest) -> Option<CheckpointOutcome>;
}

/// Writes on the caller's thread
#[derive(Debug, Clone)]
pub struct InlineWriter<S: ProgressStore> {
    store: S,
}

impl<S: ProgressStore> InlineWriter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: ProgressStore> CheckpointWriter for InlineWriter<S> {
    fn write(&mut self, request: CheckpointRequest) -> Option<CheckpointOutcome> {
        let result = self.store.upsert_progress(&request.record);
        Some(CheckpointOutcome::for_request(&request, result))
    }
}

/// Writes on a worker thread so input never waits on storage.
///
/// Dropping the writer closes its queue; writes already queued still run,
/// and their outcomes go to the callback unobserved by the engine.
pub struct BackgroundWriter {
    tx: Option<Sender<CheckpointRequest>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundWriter {
    pub fn spawn<S, F>(store: S, on_outcome: F) -> Self
    where
        S: ProgressStore + Send + 'static,
        F: Fn(CheckpointOutcome) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<CheckpointRequest>();

        let handle = thread::spawn(move || {
            for request in rx {
                let result = store.upsert_progress(&request.record);
                debug!(seq = request.seq, ok = result.is_ok(), "checkpoint write finished");
                on_outcome(CheckpointOutcome::for_request(&request, result));
            }
        });

        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Close the queue and wait for queued writes to finish
    pub fn shutdown(mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("checkpoint writer thread panicked");
            }
        }
    }
}

impl CheckpointWriter for BackgroundWriter {
    fn write(&mut self, request: CheckpointRequest) -> Option<CheckpointOutcome> {
        let Some(tx) = &self.tx else {
            return None;
        };
        if let Err(mpsc::SendError(request)) = tx.send(request) {
            warn!(seq = request.seq, "checkpoint writer stopped; write dropped");
        }
        None
    }
}
