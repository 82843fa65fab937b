//! Parsing of structured LLM output.
//!
//! Models wrap JSON in markdown fences, prose, or analysis tags; every parser
//! here is tolerant of that and has an explicit fallback policy. Malformed
//! output is an expected case, never an abort.

use serde::Deserialize;
use tracing::warn;

use crate::pipeline::state::{RejectionContext, RejectionType};

/// Max challenge angles carried forward from the rejection analysis.
const MAX_CHALLENGE_ANGLES: usize = 3;

/// Extract a JSON object from LLM output (handles markdown wrapping).
pub fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    // The rejection analysis emits a long reasoning block before the object,
    // so take the LAST object bounds.
    if let (Some(start), Some(end)) = (trimmed.rfind('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[derive(Debug, Deserialize)]
struct RejectionAnalysisResponse {
    rejection_type: String,
    #[serde(default)]
    angles: Vec<String>,
}

/// Parse the rejection-strategy analysis into a `RejectionContext`.
///
/// Any failure (no JSON, bad JSON, unknown type string) falls back to
/// `{Hard Rejection, []}`; angles are capped at three.
pub fn parse_rejection_analysis(raw: &str) -> RejectionContext {
    let json_str = extract_json_object(raw);
    let parsed: RejectionAnalysisResponse = match serde_json::from_str(&json_str) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!(error = %e, "Unparsable rejection analysis, defaulting to hard rejection");
            return RejectionContext::hard_default();
        }
    };

    let rejection_type = if parsed.rejection_type.eq_ignore_ascii_case("soft rejection") {
        RejectionType::Soft
    } else {
        RejectionType::Hard
    };

    let mut challenge_angles = parsed.angles;
    challenge_angles.truncate(MAX_CHALLENGE_ANGLES);

    RejectionContext {
        rejection_type,
        challenge_angles,
    }
}

/// Result of the client-folder identification call. All fields may be null
/// when the model finds no match.
#[derive(Debug, Deserialize)]
pub struct FolderMatch {
    pub folder_id: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub client_name: Option<String>,
}

/// Parse the folder-identification response; `Err` carries a status message.
pub fn parse_folder_match(raw: &str) -> Result<FolderMatch, String> {
    let json_str = extract_json_object(raw);
    serde_json::from_str(&json_str)
        .map_err(|e| format!("Failed to parse client identification response: {e}"))
}

/// Result of the document-selection call.
#[derive(Debug, Deserialize)]
pub struct DocumentSelection {
    pub document_id: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Parse the document-selection response; `Err` carries a status message.
pub fn parse_document_selection(raw: &str) -> Result<DocumentSelection, String> {
    let json_str = extract_json_object(raw);
    serde_json::from_str(&json_str)
        .map_err(|e| format!("Failed to parse document selection response: {e}"))
}

/// Strip enclosing `<response>...</response>` markers from a draft, if present.
pub fn strip_response_markers(draft: &str) -> String {
    if let Some(start) = draft.find("<response>")
        && let Some(end) = draft.find("</response>")
        && end > start
    {
        return draft[start + "<response>".len()..end].trim().to_string();
    }
    draft.trim().to_string()
}

/// Crude placeholder count for a draft: bracket openers the editor will fill.
pub fn count_placeholders(draft: &str) -> usize {
    draft.chars().filter(|c| *c == '[' || *c == '{').count()
}
