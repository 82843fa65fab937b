//! Stage graph orchestrator — drives one session through the decision graph.
//!
//! Entry is Classify, terminal is End. Each stage makes at most one kind of
//! external call and reports its timing to the session recorder. Stage fault
//! policy:
//! - Classify, ContinuationGate, GenerateQuery, GenerateDraft,
//!   SoftRejectionDrafting, EditDraft: unrecoverable — abort this session.
//! - RejectionStrategy, DocumentExtraction: degrade to documented defaults.
//! - Retrieve: best-effort, empty results on error.
//! - Notify, CreateDraftArtifact: failures fold into status strings; both
//!   skipped entirely under quiet mode.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::llm::Completions;
use crate::pipeline::parse;
use crate::pipeline::prompts;
use crate::pipeline::state::{PipelineState, RejectionContext};
use crate::services::{
    DocumentStore, DraftService, FolderEntry, InboundEmail, Notifier, NotifyRequest, VectorSearch,
};
use crate::session::recorder::{SessionHandle, SessionRecorder, StageOutcome};
use crate::store::{DraftMetrics, SessionStatus};

/// Labels that route through the rejection-handling branch.
const REJECTION_LABELS: [&str; 3] = [
    "Identity-based rejection",
    "Topic-based rejection",
    "Qualification-based rejection",
];

/// Nodes of the stage graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    ContinuationGate,
    RejectionRouting,
    RejectionStrategy,
    GenerateQuery,
    Retrieve,
    DocumentExtraction,
    GenerateDraft,
    SoftRejectionDrafting,
    EditDraft,
    Notify,
    CreateDraftArtifact,
    End,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Classify => "classify",
            Self::ContinuationGate => "continuation_gate",
            Self::RejectionRouting => "rejection_routing",
            Self::RejectionStrategy => "rejection_strategy",
            Self::GenerateQuery => "generate_query",
            Self::Retrieve => "retrieve",
            Self::DocumentExtraction => "document_extraction",
            Self::GenerateDraft => "generate_draft",
            Self::SoftRejectionDrafting => "soft_rejection_drafting",
            Self::EditDraft => "edit_draft",
            Self::Notify => "notify",
            Self::CreateDraftArtifact => "create_draft_artifact",
            Self::End => "end",
        }
    }
}

/// Tuning knobs for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Root folder id for client document extraction; `None` degrades the
    /// DocumentExtraction stage to a status string.
    pub client_root_folder: Option<String>,
    /// Reference threads requested from vector search.
    pub top_k: usize,
    /// Skip Notify and CreateDraftArtifact (testing / dry runs).
    pub quiet_mode: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            client_root_folder: None,
            top_k: 5,
            quiet_mode: false,
        }
    }
}

/// Executes the stage graph for one session at a time.
///
/// Holds only shared stateless collaborators, so one instance serves many
/// concurrent sessions.
pub struct Orchestrator {
    llm: Arc<dyn Completions>,
    vector: Arc<dyn VectorSearch>,
    docs: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    drafts: Arc<dyn DraftService>,
    recorder: Arc<SessionRecorder>,
    options: PipelineOptions,
}

impl Orchestrator {
    pub fn new(
        llm: Arc<dyn Completions>,
        vector: Arc<dyn VectorSearch>,
        docs: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        drafts: Arc<dyn DraftService>,
        recorder: Arc<SessionRecorder>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            llm,
            vector,
            docs,
            notifier,
            drafts,
            recorder,
            options,
        }
    }

    /// Run the full graph for one started session.
    ///
    /// On success the session is finalized completed; any unrecoverable stage
    /// error finalizes it failed with the captured message and propagates.
    /// Either way, only this session is affected.
    pub async fn run(
        &self,
        handle: &SessionHandle,
        email: &InboundEmail,
    ) -> Result<PipelineState, PipelineError> {
        info!(
            session = %handle.id,
            sender = %email.sender_email,
            subject = %email.subject,
            "Running pipeline"
        );

        let mut state = PipelineState::default();
        match self.drive(handle, email, &mut state).await {
            Ok(()) => {
                self.recorder
                    .complete(
                        handle,
                        SessionStatus::Completed,
                        state.label.as_deref(),
                        None,
                    )
                    .await?;
                info!(session = %handle.id, label = state.label.as_deref().unwrap_or("-"),
                    "Pipeline completed");
                Ok(state)
            }
            Err(e) => {
                error!(session = %handle.id, error = %e, "Pipeline failed");
                if let Err(db_err) = self
                    .recorder
                    .complete(
                        handle,
                        SessionStatus::Failed,
                        state.label.as_deref(),
                        Some(&e.to_string()),
                    )
                    .await
                {
                    error!(session = %handle.id, error = %db_err,
                        "Failed to record session failure");
                }
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        handle: &SessionHandle,
        email: &InboundEmail,
        state: &mut PipelineState,
    ) -> Result<(), PipelineError> {
        let mut stage = Stage::Classify;
        while stage != Stage::End {
            stage = self.execute(stage, handle, email, state).await?;
        }
        Ok(())
    }

    /// Execute one stage and return the next one.
    async fn execute(
        &self,
        stage: Stage,
        handle: &SessionHandle,
        email: &InboundEmail,
        state: &mut PipelineState,
    ) -> Result<Stage, PipelineError> {
        match stage {
            Stage::Classify => self.classify(handle, email, state).await,
            Stage::ContinuationGate => self.continuation_gate(email).await,
            Stage::RejectionRouting => Ok(route_by_label(state.label.as_deref())),
            Stage::RejectionStrategy => self.rejection_strategy(handle, email, state).await,
            Stage::GenerateQuery => self.generate_query(handle, email, state).await,
            Stage::Retrieve => self.retrieve(handle, state).await,
            Stage::DocumentExtraction => self.document_extraction(handle, email, state).await,
            Stage::GenerateDraft => self.generate_draft(handle, email, state).await,
            Stage::SoftRejectionDrafting => {
                self.soft_rejection_drafting(handle, email, state).await
            }
            Stage::EditDraft => self.edit_draft(handle, email, state).await,
            Stage::Notify => self.notify(handle, email, state).await,
            Stage::CreateDraftArtifact => self.create_draft_artifact(handle, email, state).await,
            Stage::End => Ok(Stage::End),
        }
    }

    async fn classify(
        &self,
        handle: &SessionHandle,
        email: &InboundEmail,
        state: &mut PipelineState,
    ) -> Result<Stage, PipelineError> {
        let stage = Stage::Classify.name();
        self.recorder.start_stage(handle, stage).await;

        match self.llm.complete(prompts::CLASSIFICATION, &email.body).await {
            Ok(raw) => {
                let label = raw.trim().to_string();
                info!(session = %handle.id, label = %label, "Classified email");
                self.recorder
                    .log_classification(handle, &label, None)
                    .await?;
                self.recorder
                    .end_stage(
                        handle,
                        stage,
                        StageOutcome::ok(Some(serde_json::json!({ "label": label }))),
                    )
                    .await?;
                state.label = Some(label);
                Ok(Stage::ContinuationGate)
            }
            Err(e) => {
                self.recorder
                    .end_stage(handle, stage, StageOutcome::failed(e.to_string()))
                    .await?;
                Err(PipelineError::stage(stage, e))
            }
        }
    }

    /// Decision only; deliberately records no stage execution of its own.
    async fn continuation_gate(&self, email: &InboundEmail) -> Result<Stage, PipelineError> {
        let decision = self
            .llm
            .complete(prompts::CONTINUATION_DECISION, &email.body)
            .await
            .map_err(|e| PipelineError::stage(Stage::ContinuationGate.name(), e))?;

        if decision.trim().eq_ignore_ascii_case("no") {
            info!("Continuation gate says no, ending session");
            Ok(Stage::End)
        } else {
            Ok(Stage::RejectionRouting)
        }
    }

    /// Never aborts: LLM or parse failure falls back to a hard rejection
    /// with no angles.
    async fn rejection_strategy(
        &self,
        handle: &SessionHandle,
        email: &InboundEmail,
        state: &mut PipelineState,
    ) -> Result<Stage, PipelineError> {
        let stage = Stage::RejectionStrategy.name();
        self.recorder.start_stage(handle, stage).await;

        let rejection = match self
            .llm
            .complete(prompts::REJECTION_STRATEGY, &email.body)
            .await
        {
            Ok(raw) => parse::parse_rejection_analysis(&raw),
            Err(e) => {
                warn!(session = %handle.id, error = %e,
                    "Rejection analysis call failed, defaulting to hard rejection");
                RejectionContext::hard_default()
            }
        };

        self.recorder
            .log_rejection(
                handle,
                rejection.rejection_type.as_str(),
                &rejection.challenge_angles,
            )
            .await?;
        self.recorder
            .end_stage(
                handle,
                stage,
                StageOutcome::ok(Some(serde_json::json!({
                    "rejection_type": rejection.rejection_type.as_str(),
                    "angles": rejection.challenge_angles,
                }))),
            )
            .await?;

        state.rejection = Some(rejection);
        Ok(Stage::GenerateQuery)
    }

    async fn generate_query(
        &self,
        handle: &SessionHandle,
        email: &InboundEmail,
        state: &mut PipelineState,
    ) -> Result<Stage, PipelineError> {
        let stage = Stage::GenerateQuery.name();
        self.recorder.start_stage(handle, stage).await;

        match self
            .llm
            .complete(prompts::QUERY_GENERATION, &email.body)
            .await
        {
            Ok(query) => {
                self.recorder
                    .end_stage(handle, stage, StageOutcome::ok(None))
                    .await?;
                state.vector_query = Some(query);
                Ok(Stage::Retrieve)
            }
            Err(e) => {
                self.recorder
                    .end_stage(handle, stage, StageOutcome::failed(e.to_string()))
                    .await?;
                Err(PipelineError::stage(stage, e))
            }
        }
    }

    /// Best-effort: search failure leaves the reference list empty.
    async fn retrieve(
        &self,
        handle: &SessionHandle,
        state: &mut PipelineState,
    ) -> Result<Stage, PipelineError> {
        let stage = Stage::Retrieve.name();
        self.recorder.start_stage(handle, stage).await;

        let query = state.vector_query.as_deref().unwrap_or_default();
        match self.vector.search(query, self.options.top_k).await {
            Ok(threads) => {
                self.recorder
                    .end_stage(
                        handle,
                        stage,
                        StageOutcome::ok(Some(serde_json::json!({ "count": threads.len() }))),
                    )
                    .await?;
                state.reference_threads = threads;
            }
            Err(e) => {
                warn!(session = %handle.id, error = %e,
                    "Vector search failed, proceeding without reference threads");
                self.recorder
                    .end_stage(handle, stage, StageOutcome::failed(e.to_string()))
                    .await?;
                state.reference_threads = Vec::new();
            }
        }
        Ok(Stage::DocumentExtraction)
    }

    /// Never aborts: every failure mode degrades to a descriptive status.
    /// Routes soft rejections into SoftRejectionDrafting.
    async fn document_extraction(
        &self,
        handle: &SessionHandle,
        email: &InboundEmail,
        state: &mut PipelineState,
    ) -> Result<Stage, PipelineError> {
        let stage = Stage::DocumentExtraction.name();
        self.recorder.start_stage(handle, stage).await;

        let status = self.extract_documents(email, state).await;
        let success = status == "Success";
        if !success {
            info!(session = %handle.id, status = %status, "Document extraction degraded");
        }

        self.recorder
            .end_stage(
                handle,
                stage,
                StageOutcome {
                    success,
                    error: (!success).then(|| status.clone()),
                    input_snapshot: None,
                    output_snapshot: Some(serde_json::json!({ "status": status })),
                },
            )
            .await?;
        state.extraction_status = Some(status);

        if state.rejection.as_ref().is_some_and(RejectionContext::is_soft) {
            Ok(Stage::SoftRejectionDrafting)
        } else {
            Ok(Stage::GenerateDraft)
        }
    }

    async fn extract_documents(&self, email: &InboundEmail, state: &mut PipelineState) -> String {
        let Some(root) = self.options.client_root_folder.as_deref() else {
            return "Client root folder not configured".into();
        };

        let entries = match self.docs.list_folder(root).await {
            Ok(entries) => entries,
            Err(e) => return format!("Folder listing failed: {e}"),
        };
        let folders: Vec<FolderEntry> = entries.into_iter().filter(|e| e.is_folder()).collect();
        if folders.is_empty() {
            return "No client folders found in the root directory".into();
        }

        let raw = match self
            .llm
            .complete(&prompts::folder_match_prompt(&folders), &email.body)
            .await
        {
            Ok(raw) => raw,
            Err(e) => return format!("Client identification call failed: {e}"),
        };
        let matched = match parse::parse_folder_match(&raw) {
            Ok(matched) => matched,
            Err(status) => return status,
        };
        state.doc_link = matched.link;
        let Some(folder_id) = matched.folder_id else {
            return "No matching client folder found".into();
        };

        let entries = match self.docs.list_folder(&folder_id).await {
            Ok(entries) => entries,
            Err(e) => return format!("Client folder listing failed: {e}"),
        };
        let documents: Vec<FolderEntry> = entries.into_iter().filter(|e| e.is_document()).collect();
        if documents.is_empty() {
            return "No documents found in the client folder".into();
        }

        let raw = match self
            .llm
            .complete(&prompts::document_selection_prompt(&documents), &email.body)
            .await
        {
            Ok(raw) => raw,
            Err(e) => return format!("Document selection call failed: {e}"),
        };
        let selection = match parse::parse_document_selection(&raw) {
            Ok(selection) => selection,
            Err(status) => return status,
        };
        let Some(document_id) = selection.document_id else {
            return "No relevant document selected".into();
        };

        match self.docs.read_document(&document_id).await {
            Ok(content) => {
                state.document_content = Some(content);
                "Success".into()
            }
            Err(e) => format!("Document read failed: {e}"),
        }
    }

    async fn generate_draft(
        &self,
        handle: &SessionHandle,
        email: &InboundEmail,
        state: &mut PipelineState,
    ) -> Result<Stage, PipelineError> {
        let stage = Stage::GenerateDraft.name();
        self.recorder.start_stage(handle, stage).await;

        let prompt =
            prompts::drafting_prompt(&state.reference_threads, state.document_content.as_deref());
        match self.llm.complete(&prompt, &email.body).await {
            Ok(draft) => {
                self.recorder
                    .end_stage(
                        handle,
                        stage,
                        StageOutcome::ok(Some(serde_json::json!({
                            "draft_length": draft.len(),
                            "context_used": state.context_used(),
                        }))),
                    )
                    .await?;
                state.draft = Some(draft);
                Ok(Stage::EditDraft)
            }
            Err(e) => {
                self.recorder
                    .end_stage(handle, stage, StageOutcome::failed(e.to_string()))
                    .await?;
                Err(PipelineError::stage(stage, e))
            }
        }
    }

    async fn soft_rejection_drafting(
        &self,
        handle: &SessionHandle,
        email: &InboundEmail,
        state: &mut PipelineState,
    ) -> Result<Stage, PipelineError> {
        let stage = Stage::SoftRejectionDrafting.name();
        self.recorder.start_stage(handle, stage).await;

        let scenario = state.label.clone().unwrap_or_else(|| "Rejection".into());
        let rejection = state
            .rejection
            .clone()
            .unwrap_or_else(RejectionContext::hard_default);
        let prompt = prompts::soft_rejection_prompt(
            &scenario,
            &rejection,
            state.document_content.as_deref(),
        );

        match self.llm.complete(&prompt, &email.body).await {
            Ok(raw) => {
                let draft = parse::strip_response_markers(&raw);
                self.recorder
                    .end_stage(
                        handle,
                        stage,
                        StageOutcome::ok(Some(serde_json::json!({
                            "draft_length": draft.len(),
                        }))),
                    )
                    .await?;
                state.draft = Some(draft);
                Ok(Stage::EditDraft)
            }
            Err(e) => {
                self.recorder
                    .end_stage(handle, stage, StageOutcome::failed(e.to_string()))
                    .await?;
                Err(PipelineError::stage(stage, e))
            }
        }
    }

    async fn edit_draft(
        &self,
        handle: &SessionHandle,
        email: &InboundEmail,
        state: &mut PipelineState,
    ) -> Result<Stage, PipelineError> {
        let stage = Stage::EditDraft.name();
        let draft = state
            .draft
            .clone()
            .ok_or_else(|| PipelineError::stage(stage, "no draft to edit"))?;

        self.recorder.start_stage(handle, stage).await;
        let user = format!(
            "Original Email:\n{}\n\nDraft Response:\n{}",
            email.body, draft
        );

        match self.llm.complete(prompts::DRAFT_EDITING, &user).await {
            Ok(final_draft) => {
                self.recorder
                    .end_stage(
                        handle,
                        stage,
                        StageOutcome::ok(Some(serde_json::json!({
                            "final_length": final_draft.len(),
                        }))),
                    )
                    .await?;
                self.recorder
                    .log_draft(
                        handle,
                        DraftMetrics {
                            draft_length: draft.len(),
                            final_draft_length: Some(final_draft.len()),
                            context_used: state.context_used(),
                            context_length: state
                                .document_content
                                .as_deref()
                                .map_or(0, str::len),
                            reference_threads_used: state.reference_threads.len(),
                            placeholders_count: parse::count_placeholders(&draft),
                            template_adherence_score: 0.0, // derived by the recorder
                            draft_content: Some(draft),
                            final_content: Some(final_draft.clone()),
                        },
                    )
                    .await?;
                state.final_draft = Some(final_draft);
                Ok(Stage::Notify)
            }
            Err(e) => {
                self.recorder
                    .end_stage(handle, stage, StageOutcome::failed(e.to_string()))
                    .await?;
                Err(PipelineError::stage(stage, e))
            }
        }
    }

    /// Failures fold into the notification status; skipped under quiet mode.
    async fn notify(
        &self,
        handle: &SessionHandle,
        email: &InboundEmail,
        state: &mut PipelineState,
    ) -> Result<Stage, PipelineError> {
        let stage = Stage::Notify.name();
        self.recorder.start_stage(handle, stage).await;

        let status = if self.options.quiet_mode {
            "SKIPPED (quiet mode)".to_string()
        } else {
            self.send_notification(email, state).await
        };
        let success = !status.starts_with("Failed");

        self.recorder
            .end_stage(
                handle,
                stage,
                StageOutcome {
                    success,
                    error: (!success).then(|| status.clone()),
                    input_snapshot: None,
                    output_snapshot: Some(serde_json::json!({ "status": status })),
                },
            )
            .await?;
        state.notification_status = Some(status);
        Ok(Stage::CreateDraftArtifact)
    }

    async fn send_notification(&self, email: &InboundEmail, state: &PipelineState) -> String {
        let summary = match self
            .llm
            .complete(prompts::NOTIFICATION_SUMMARY, &email.body)
            .await
        {
            Ok(summary) => summary,
            Err(e) => return format!("Failed: summary call: {e}"),
        };

        let mut summary = format!(
            "{summary}\n\nClassification: {}",
            state.label.as_deref().unwrap_or("unknown")
        );
        if let Some(ref rejection) = state.rejection {
            summary.push_str(&format!(
                "\nRejection Type: {}",
                rejection.rejection_type.as_str()
            ));
        }

        let request = NotifyRequest {
            summary,
            draft: state.final_draft.clone().unwrap_or_default(),
            recipient: email.sender_email.clone(),
            subject: email.subject.clone(),
            crm_link: state.crm_link.clone(),
            doc_link: state.doc_link.clone(),
        };

        match self.notifier.send(&request).await {
            Ok(code) => format!("Notification sent (status {code})"),
            Err(e) => format!("Failed: {e}"),
        }
    }

    /// Failures fold into the draft status; skipped under quiet mode.
    async fn create_draft_artifact(
        &self,
        handle: &SessionHandle,
        email: &InboundEmail,
        state: &mut PipelineState,
    ) -> Result<Stage, PipelineError> {
        let stage = Stage::CreateDraftArtifact.name();
        self.recorder.start_stage(handle, stage).await;

        let status = if self.options.quiet_mode {
            "SKIPPED (quiet mode)".to_string()
        } else {
            let subject = format!("Re: {}", email.subject);
            let body = state.final_draft.as_deref().unwrap_or_default();
            match self
                .drafts
                .create_draft(&email.sender_email, &subject, body)
                .await
            {
                Ok(status) => status,
                Err(e) => {
                    let reason: String = e.to_string().chars().take(100).collect();
                    format!("Failed: {reason}")
                }
            }
        };
        let success = !status.starts_with("Failed");

        self.recorder
            .end_stage(
                handle,
                stage,
                StageOutcome {
                    success,
                    error: (!success).then(|| status.clone()),
                    input_snapshot: None,
                    output_snapshot: Some(serde_json::json!({ "status": status })),
                },
            )
            .await?;
        state.draft_status = Some(status);
        Ok(Stage::End)
    }
}

/// RejectionRouting decision: rejection labels branch into the strategy
/// stage, everything else goes straight to query generation.
fn route_by_label(label: Option<&str>) -> Stage {
    match label {
        Some(label) if REJECTION_LABELS.contains(&label) => Stage::RejectionStrategy,
        _ => Stage::GenerateQuery,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LlmError, ServiceError};
    use crate::services::{UnavailableDocumentStore, UnavailableVectorSearch};
    use crate::session::StartOutcome;
    use crate::store::{ConnectionPool, SessionStore, migrations};
    use async_trait::async_trait;

    #[test]
    fn rejection_labels_route_to_strategy() {
        assert_eq!(
            route_by_label(Some("Identity-based rejection")),
            Stage::RejectionStrategy
        );
        assert_eq!(
            route_by_label(Some("Topic-based rejection")),
            Stage::RejectionStrategy
        );
        assert_eq!(
            route_by_label(Some("Qualification-based rejection")),
            Stage::RejectionStrategy
        );
    }

    #[test]
    fn other_labels_route_to_query() {
        assert_eq!(route_by_label(Some("Accepted")), Stage::GenerateQuery);
        assert_eq!(route_by_label(Some("No Guests")), Stage::GenerateQuery);
        assert_eq!(route_by_label(None), Stage::GenerateQuery);
    }

    /// Scripted LLM keyed off the system prompt of each stage.
    struct ScriptedLlm {
        label: String,
        continuation: String,
        rejection_json: String,
    }

    impl ScriptedLlm {
        fn accepting() -> Self {
            Self {
                label: "Accepted".into(),
                continuation: "yes".into(),
                rejection_json: String::new(),
            }
        }
    }

    #[async_trait]
    impl Completions for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, system: &str, _user: &str) -> Result<String, LlmError> {
            if system == prompts::CLASSIFICATION {
                Ok(self.label.clone())
            } else if system == prompts::CONTINUATION_DECISION {
                Ok(self.continuation.clone())
            } else if system == prompts::REJECTION_STRATEGY {
                Ok(self.rejection_json.clone())
            } else if system == prompts::QUERY_GENERATION {
                Ok("Rejection sentiment; we aim for a warm follow-up.".into())
            } else if system == prompts::DRAFT_EDITING {
                Ok("Final draft text ready for [signature].".into())
            } else if system == prompts::NOTIFICATION_SUMMARY {
                Ok("New response received from Jane.".into())
            } else if system.contains("<challenge_angles>") {
                Ok("<analysis>weighing</analysis>\n<response>Challenge draft</response>".into())
            } else {
                Ok("Draft with [placeholder] details.".into())
            }
        }
    }

    struct OkNotifier;

    #[async_trait]
    impl Notifier for OkNotifier {
        async fn send(&self, _request: &NotifyRequest) -> Result<u16, ServiceError> {
            Ok(200)
        }
    }

    struct OkDraftService;

    #[async_trait]
    impl DraftService for OkDraftService {
        async fn create_draft(
            &self,
            _to: &str,
            _subject: &str,
            _body: &str,
        ) -> Result<String, ServiceError> {
            Ok("Draft created".into())
        }
    }

    async fn test_fixture(
        llm: ScriptedLlm,
        options: PipelineOptions,
    ) -> (tempfile::TempDir, Arc<SessionRecorder>, Orchestrator) {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("orchestrator.db");
        let pool = ConnectionPool::open_local(path.to_str().unwrap(), 2)
            .await
            .unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let store = Arc::new(SessionStore::new(pool));
        let recorder = Arc::new(SessionRecorder::new(store));

        let orchestrator = Orchestrator::new(
            Arc::new(llm),
            Arc::new(UnavailableVectorSearch),
            Arc::new(UnavailableDocumentStore),
            Arc::new(OkNotifier),
            Arc::new(OkDraftService),
            recorder.clone(),
            options,
        );
        (tmp, recorder, orchestrator)
    }

    fn test_email(body: &str) -> InboundEmail {
        InboundEmail {
            sender_email: "jane@show.example".into(),
            sender_name: "Jane Doe".into(),
            subject: "Podcast Guest".into(),
            body: body.into(),
        }
    }

    async fn start(recorder: &SessionRecorder, email: &InboundEmail) -> SessionHandle {
        match recorder.start(email).await.unwrap() {
            StartOutcome::Started(handle) => handle,
            other => panic!("expected Started, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gate_no_ends_completed_with_only_classify_recorded() {
        let llm = ScriptedLlm {
            label: "No Guests".into(),
            continuation: "no".into(),
            rejection_json: String::new(),
        };
        let (_tmp, recorder, orchestrator) = test_fixture(llm, PipelineOptions::default()).await;
        let email = test_email("We do not allow guests.");
        let handle = start(&recorder, &email).await;

        let state = orchestrator.run(&handle, &email).await.unwrap();
        assert_eq!(state.label.as_deref(), Some("No Guests"));
        assert!(state.draft.is_none());
        assert!(state.final_draft.is_none());

        let session = recorder.store().get_session(handle.id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.classification.as_deref(), Some("No Guests"));

        let executions = recorder.store().stage_executions(handle.id).await.unwrap();
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].stage, "classify");
        assert_eq!(recorder.store().draft_count(handle.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn standard_path_reaches_draft_and_artifact() {
        let (_tmp, recorder, orchestrator) =
            test_fixture(ScriptedLlm::accepting(), PipelineOptions::default()).await;
        let email = test_email("We'd love to have your client on the show!");
        let handle = start(&recorder, &email).await;

        let state = orchestrator.run(&handle, &email).await.unwrap();
        assert_eq!(
            state.final_draft.as_deref(),
            Some("Final draft text ready for [signature].")
        );
        assert_eq!(state.draft_status.as_deref(), Some("Draft created"));
        assert!(state.notification_status.unwrap().starts_with("Notification sent"));
        assert!(state.rejection.is_none());

        let stages: Vec<String> = recorder
            .store()
            .stage_executions(handle.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.stage)
            .collect();
        assert!(!stages.contains(&"rejection_strategy".to_string()));
        assert!(stages.contains(&"generate_draft".to_string()));
        assert_eq!(recorder.store().draft_count(handle.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unparsable_rejection_analysis_defaults_hard_and_still_drafts() {
        let llm = ScriptedLlm {
            label: "Qualification-based rejection".into(),
            continuation: "yes".into(),
            rejection_json: "I couldn't decide, sorry.".into(),
        };
        let (_tmp, recorder, orchestrator) = test_fixture(llm, PipelineOptions::default()).await;
        let email = test_email("We only accept CEOs with 10k followers.");
        let handle = start(&recorder, &email).await;

        let state = orchestrator.run(&handle, &email).await.unwrap();
        let rejection = state.rejection.unwrap();
        assert_eq!(rejection, RejectionContext::hard_default());
        // Hard rejection still converges through GenerateDraft and EditDraft.
        assert!(state.final_draft.is_some());
        assert!(state.notification_status.is_some());

        let stages: Vec<String> = recorder
            .store()
            .stage_executions(handle.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.stage)
            .collect();
        assert!(stages.contains(&"rejection_strategy".to_string()));
        assert!(stages.contains(&"edit_draft".to_string()));
    }

    #[tokio::test]
    async fn soft_rejection_routes_through_challenge_drafting() {
        let llm = ScriptedLlm {
            label: "Topic-based rejection".into(),
            continuation: "yes".into(),
            rejection_json:
                r#"{"rejection_type": "Soft Rejection", "angles": ["audience overlap"]}"#.into(),
        };
        let (_tmp, recorder, orchestrator) = test_fixture(llm, PipelineOptions::default()).await;
        let email = test_email("We only feature tech guests.");
        let handle = start(&recorder, &email).await;

        let state = orchestrator.run(&handle, &email).await.unwrap();
        assert_eq!(state.draft.as_deref(), Some("Challenge draft"));

        let stages: Vec<String> = recorder
            .store()
            .stage_executions(handle.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.stage)
            .collect();
        assert!(stages.contains(&"soft_rejection_drafting".to_string()));
        assert!(!stages.contains(&"generate_draft".to_string()));
    }

    #[tokio::test]
    async fn quiet_mode_skips_outbound_stages() {
        let options = PipelineOptions {
            quiet_mode: true,
            ..Default::default()
        };
        let (_tmp, recorder, orchestrator) = test_fixture(ScriptedLlm::accepting(), options).await;
        let email = test_email("We'd love to have your client!");
        let handle = start(&recorder, &email).await;

        let state = orchestrator.run(&handle, &email).await.unwrap();
        assert_eq!(state.notification_status.as_deref(), Some("SKIPPED (quiet mode)"));
        assert_eq!(state.draft_status.as_deref(), Some("SKIPPED (quiet mode)"));
    }

    #[tokio::test]
    async fn classify_failure_marks_session_failed() {
        struct FailingLlm;

        #[async_trait]
        impl Completions for FailingLlm {
            fn model_name(&self) -> &str {
                "failing"
            }

            async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
                Err(LlmError::RequestFailed {
                    provider: "failing".into(),
                    reason: "boom".into(),
                })
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("failing.db");
        let pool = ConnectionPool::open_local(path.to_str().unwrap(), 2)
            .await
            .unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let recorder = Arc::new(SessionRecorder::new(Arc::new(SessionStore::new(pool))));
        let orchestrator = Orchestrator::new(
            Arc::new(FailingLlm),
            Arc::new(UnavailableVectorSearch),
            Arc::new(UnavailableDocumentStore),
            Arc::new(OkNotifier),
            Arc::new(OkDraftService),
            recorder.clone(),
            PipelineOptions::default(),
        );

        let email = test_email("Anything");
        let handle = start(&recorder, &email).await;
        let err = orchestrator.run(&handle, &email).await.unwrap_err();
        assert!(matches!(err, PipelineError::Stage { .. }));

        let session = recorder.store().get_session(handle.id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Failed);
        assert!(session.error_message.unwrap().contains("classify"));

        let executions = recorder.store().stage_executions(handle.id).await.unwrap();
        assert_eq!(executions.len(), 1);
        assert!(!executions[0].success);
    }
}
