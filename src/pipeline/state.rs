//! Shared state record threaded through the stage graph.
//!
//! Every stage reads the fields it needs and writes the fields it owns.
//! All post-entry fields are `Option` so an unreached stage leaves no trace.

use serde::{Deserialize, Serialize};

/// Hard vs. soft classification of a rejection response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionType {
    /// A complete dead-end with no possibility of booking.
    Hard,
    /// Could potentially be challenged with additional information.
    Soft,
}

impl RejectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hard => "Hard Rejection",
            Self::Soft => "Soft Rejection",
        }
    }
}

/// Outcome of the rejection-strategy analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectionContext {
    pub rejection_type: RejectionType,
    /// Up to three angles for challenging a soft rejection.
    pub challenge_angles: Vec<String>,
}

impl RejectionContext {
    /// Fallback used whenever the analysis output cannot be parsed.
    pub fn hard_default() -> Self {
        Self {
            rejection_type: RejectionType::Hard,
            challenge_angles: Vec::new(),
        }
    }

    pub fn is_soft(&self) -> bool {
        self.rejection_type == RejectionType::Soft
    }
}

/// Accumulated pipeline state for one session.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    /// Classification label from the Classify stage.
    pub label: Option<String>,
    /// Search query produced by GenerateQuery.
    pub vector_query: Option<String>,
    /// Reference threads returned by Retrieve, best match first.
    pub reference_threads: Vec<String>,
    /// Rejection analysis, present only for rejection-labeled emails.
    pub rejection: Option<RejectionContext>,
    /// Extracted client document text, when DocumentExtraction succeeded.
    pub document_content: Option<String>,
    /// Human-readable outcome of DocumentExtraction ("Success" or why not).
    pub extraction_status: Option<String>,
    /// Browser link to the matched client folder.
    pub doc_link: Option<String>,
    /// CRM record link, when one was discovered upstream.
    pub crm_link: Option<String>,
    /// Raw draft from GenerateDraft or SoftRejectionDrafting.
    pub draft: Option<String>,
    /// Refined draft from EditDraft; the canonical outbound text.
    pub final_draft: Option<String>,
    pub notification_status: Option<String>,
    pub draft_status: Option<String>,
}

impl PipelineState {
    /// True when the extracted document text is nonempty.
    pub fn context_used(&self) -> bool {
        self.document_content
            .as_deref()
            .is_some_and(|c| !c.is_empty())
    }
}
