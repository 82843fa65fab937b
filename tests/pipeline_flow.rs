//! End-to-end pipeline tests with mocked collaborators: full store, recorder,
//! and orchestrator wiring against a real on-disk database.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use booking_assist::error::{LlmError, ServiceError};
use booking_assist::llm::Completions;
use booking_assist::pipeline::{Orchestrator, PipelineOptions};
use booking_assist::services::{
    DraftService, InboundEmail, Notifier, NotifyRequest, UnavailableDocumentStore,
    UnavailableVectorSearch,
};
use booking_assist::session::{SessionRecorder, StartOutcome};
use booking_assist::store::{ConnectionPool, SessionStatus, SessionStore, migrations};

/// LLM stub driven by the stage it recognizes from the system prompt.
struct StubLlm {
    label: String,
    continuation: String,
    rejection_json: String,
}

#[async_trait]
impl Completions for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, system: &str, _user: &str) -> Result<String, LlmError> {
        if system.contains("classifies incoming emails") {
            Ok(self.label.clone())
        } else if system.contains("requires a draft response") {
            Ok(self.continuation.clone())
        } else if system.contains("Hard Rejection\" or \"Soft Rejection") {
            Ok(self.rejection_json.clone())
        } else if system.contains("query a vector database") {
            Ok("The show rejected our client's booking request.".into())
        } else if system.contains("editing a draft email response") {
            Ok("Hi Jane, happy to send the bio over. [signature]".into())
        } else if system.contains("notifying a person") {
            Ok("New response received from Jane Doe.".into())
        } else {
            Ok("Hi Jane, thanks for the reply! [signature]".into())
        }
    }
}

/// LLM that always fails; used to force a failed session.
struct DownLlm;

#[async_trait]
impl Completions for DownLlm {
    fn model_name(&self) -> &str {
        "down"
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "down".into(),
            reason: "connection refused".into(),
        })
    }
}

struct CountingNotifier {
    sent: AtomicU32,
}

#[async_trait]
impl Notifier for CountingNotifier {
    async fn send(&self, _request: &NotifyRequest) -> Result<u16, ServiceError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(200)
    }
}

struct RecordingDraftService {
    created: AtomicU32,
}

#[async_trait]
impl DraftService for RecordingDraftService {
    async fn create_draft(
        &self,
        _to: &str,
        _subject: &str,
        _body: &str,
    ) -> Result<String, ServiceError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok("Draft created".into())
    }
}

struct Fixture {
    _tmp: tempfile::TempDir,
    recorder: Arc<SessionRecorder>,
    notifier: Arc<CountingNotifier>,
    drafts: Arc<RecordingDraftService>,
    options: PipelineOptions,
}

impl Fixture {
    async fn new() -> Self {
        Self::with_options(PipelineOptions::default()).await
    }

    async fn with_options(options: PipelineOptions) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("flow.db");
        let pool = ConnectionPool::open_local(path.to_str().unwrap(), 3)
            .await
            .unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let store = Arc::new(SessionStore::new(pool));
        let recorder = Arc::new(SessionRecorder::new(store));
        Self {
            _tmp: tmp,
            recorder,
            notifier: Arc::new(CountingNotifier {
                sent: AtomicU32::new(0),
            }),
            drafts: Arc::new(RecordingDraftService {
                created: AtomicU32::new(0),
            }),
            options,
        }
    }

    fn orchestrator(&self, llm: Arc<dyn Completions>) -> Orchestrator {
        Orchestrator::new(
            llm,
            Arc::new(UnavailableVectorSearch),
            Arc::new(UnavailableDocumentStore),
            self.notifier.clone(),
            self.drafts.clone(),
            self.recorder.clone(),
            self.options.clone(),
        )
    }
}

fn email(body: &str) -> InboundEmail {
    InboundEmail {
        sender_email: "jane@show.example".into(),
        sender_name: "Jane Doe".into(),
        subject: "Re: Podcast Guest - Tom Elliot".into(),
        body: body.into(),
    }
}

#[tokio::test]
async fn no_guests_email_completes_without_draft_or_notification() {
    let fixture = Fixture::new().await;
    let llm = Arc::new(StubLlm {
        label: "No Guests".into(),
        continuation: "no".into(),
        rejection_json: String::new(),
    });
    let orchestrator = fixture.orchestrator(llm);

    let email = email("We do not allow guests on our show. Good luck!");
    let StartOutcome::Started(handle) = fixture.recorder.start(&email).await.unwrap() else {
        panic!("expected a fresh session");
    };

    let state = orchestrator.run(&handle, &email).await.unwrap();
    assert_eq!(state.label.as_deref(), Some("No Guests"));
    assert!(state.final_draft.is_none());

    let session = fixture
        .recorder
        .store()
        .get_session(handle.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.classification.as_deref(), Some("No Guests"));
    assert!(session.total_duration_ms.unwrap() >= 0);

    assert_eq!(fixture.recorder.store().draft_count(handle.id).await.unwrap(), 0);
    assert_eq!(fixture.notifier.sent.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.drafts.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn completed_fingerprint_skips_on_resubmission() {
    let fixture = Fixture::new().await;
    let llm = Arc::new(StubLlm {
        label: "Accepted".into(),
        continuation: "yes".into(),
        rejection_json: String::new(),
    });
    let orchestrator = fixture.orchestrator(llm);

    let email = email("We'd love to have Tom on the show!");
    let StartOutcome::Started(handle) = fixture.recorder.start(&email).await.unwrap() else {
        panic!("expected a fresh session");
    };
    orchestrator.run(&handle, &email).await.unwrap();
    assert_eq!(fixture.drafts.created.load(Ordering::SeqCst), 1);

    // Same body and sender → same fingerprint → skip, no second run.
    let outcome = fixture.recorder.start(&email).await.unwrap();
    assert!(matches!(outcome, StartOutcome::Skipped));
    assert_eq!(fixture.drafts.created.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_session_resumes_under_same_identity_and_completes() {
    let fixture = Fixture::new().await;
    let email = email("Could you send over his bio and talking points?");

    let broken = fixture.orchestrator(Arc::new(DownLlm));
    let StartOutcome::Started(handle) = fixture.recorder.start(&email).await.unwrap() else {
        panic!("expected a fresh session");
    };
    broken.run(&handle, &email).await.unwrap_err();

    let session = fixture
        .recorder
        .store()
        .get_session(handle.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.error_message.is_some());

    // Resubmitting the same input resumes the same session, then completes.
    let working = fixture.orchestrator(Arc::new(StubLlm {
        label: "Conditional".into(),
        continuation: "yes".into(),
        rejection_json: String::new(),
    }));
    let StartOutcome::Resumed(resumed) = fixture.recorder.start(&email).await.unwrap() else {
        panic!("expected a resumed session");
    };
    assert_eq!(resumed.id, handle.id);

    working.run(&resumed, &email).await.unwrap();
    let session = fixture
        .recorder
        .store()
        .get_session(handle.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.classification.as_deref(), Some("Conditional"));
    assert!(session.error_message.is_none());
}

#[tokio::test]
async fn quiet_mode_never_calls_outbound_services() {
    let fixture = Fixture::with_options(PipelineOptions {
        quiet_mode: true,
        ..Default::default()
    })
    .await;
    let llm = Arc::new(StubLlm {
        label: "Accepted".into(),
        continuation: "yes".into(),
        rejection_json: String::new(),
    });
    let orchestrator = fixture.orchestrator(llm);

    let email = email("Sounds great, let's set it up.");
    let StartOutcome::Started(handle) = fixture.recorder.start(&email).await.unwrap() else {
        panic!("expected a fresh session");
    };

    let state = orchestrator.run(&handle, &email).await.unwrap();
    assert_eq!(state.notification_status.as_deref(), Some("SKIPPED (quiet mode)"));
    assert_eq!(state.draft_status.as_deref(), Some("SKIPPED (quiet mode)"));
    assert_eq!(fixture.notifier.sent.load(Ordering::SeqCst), 0);
    assert_eq!(fixture.drafts.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unparsable_rejection_analysis_defaults_and_still_reaches_notify() {
    let fixture = Fixture::new().await;
    let llm = Arc::new(StubLlm {
        label: "Qualification-based rejection".into(),
        continuation: "yes".into(),
        rejection_json: "Hmm, I'd rather write an essay than JSON here.".into(),
    });
    let orchestrator = fixture.orchestrator(llm);

    let email = email("We only accept CEOs with 10000+ followers on Twitter.");
    let StartOutcome::Started(handle) = fixture.recorder.start(&email).await.unwrap() else {
        panic!("expected a fresh session");
    };

    let state = orchestrator.run(&handle, &email).await.unwrap();
    assert!(state.final_draft.is_some());
    assert_eq!(fixture.notifier.sent.load(Ordering::SeqCst), 1);
    assert_eq!(fixture.drafts.created.load(Ordering::SeqCst), 1);

    // The persisted rejection context carries the documented default.
    let rows = fixture
        .recorder
        .store()
        .pool()
        .query(
            "SELECT rejection_type, challenge_angles FROM rejection_contexts
             WHERE session_id = ?1",
            libsql::params![handle.id.to_string()],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get::<String>(0).unwrap(), "Hard Rejection");
    assert_eq!(rows[0].get::<String>(1).unwrap(), "[]");

    // One draft record with a derived adherence score.
    let rows = fixture
        .recorder
        .store()
        .pool()
        .query(
            "SELECT template_adherence_score FROM draft_generations WHERE session_id = ?1",
            libsql::params![handle.id.to_string()],
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let score = rows[0].get::<f64>(0).unwrap();
    assert!(score > 0.0 && score <= 1.0);
}
