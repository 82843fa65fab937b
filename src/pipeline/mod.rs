//! The stage graph pipeline.
//!
//! Each inbound email flows through:
//! 1. `SessionRecorder::start()` — fingerprint dedupe / resume
//! 2. `Orchestrator::run()` — Classify, conditional branching, retrieval,
//!    drafting, editing, reviewer notification, draft artifact
//! 3. Session finalized completed or failed; per-stage timings persisted

pub mod orchestrator;
pub mod parse;
pub mod poller;
pub mod prompts;
pub mod state;

pub use orchestrator::{Orchestrator, PipelineOptions, Stage};
pub use poller::spawn_poller;
pub use state::{PipelineState, RejectionContext, RejectionType};
