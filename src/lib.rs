// Library surface for headless/integration tests and reuse.
// Keep this lean to avoid coupling to bin-only types in main.rs.
pub mod app_dirs;
pub mod checkpoint;
pub mod config;
pub mod engine;
pub mod error;
pub mod keystrokes;
pub mod metrics;
pub mod runtime;
pub mod session;
pub mod store;
pub mod util;
pub mod writer;

pub use engine::{Engine, EngineSettings, Snapshot};
pub use error::{EngineError, StoreError};
