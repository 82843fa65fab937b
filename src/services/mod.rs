//! External collaborator interfaces.
//!
//! Each collaborator is reached through a narrow async trait; the pipeline
//! never sees transport details. HTTP-backed implementations live alongside
//! each trait, plus "unavailable" fallbacks for unconfigured deployments.

pub mod docs;
pub mod drafts;
pub mod notify;
pub mod source;
pub mod vector;

pub use docs::{DocumentStore, FolderEntry, HttpDocumentStore, UnavailableDocumentStore};
pub use drafts::{DraftService, HttpDraftService, UnavailableDraftService};
pub use notify::{Notifier, NotifyRequest, SlackWebhookNotifier, UnavailableNotifier};
pub use source::{IdleMessageSource, InboundEmail, MessageSource};
pub use vector::{HttpVectorSearch, UnavailableVectorSearch, VectorSearch};
