//! Session layer — fingerprint-keyed idempotent sessions, per-stage timing,
//! and quality scoring.

pub mod feedback;
pub mod recorder;
pub mod scoring;

pub use feedback::{FeedbackSink, HumanFeedback};
pub use recorder::{SessionHandle, SessionRecorder, StartOutcome, fingerprint};
