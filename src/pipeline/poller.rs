//! Background poller — periodically fetches new inbound emails and runs each
//! one through the pipeline.
//!
//! Any cycle error is logged and retried on the next tick; the loop only
//! terminates through the shutdown flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::pipeline::orchestrator::Orchestrator;
use crate::services::MessageSource;
use crate::session::{SessionRecorder, StartOutcome};

/// Spawn the background poll loop.
///
/// Returns a `JoinHandle` and a shutdown flag. Set the flag to stop polling
/// after the current cycle.
pub fn spawn_poller(
    source: Arc<dyn MessageSource>,
    recorder: Arc<SessionRecorder>,
    orchestrator: Arc<Orchestrator>,
    poll_interval: Duration,
) -> (JoinHandle<()>, Arc<AtomicBool>) {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!("Poller started, polling every {}s", poll_interval.as_secs());
        let mut tick = tokio::time::interval(poll_interval);

        loop {
            tick.tick().await;

            if shutdown.load(Ordering::Relaxed) {
                info!("Poller shutting down");
                return;
            }

            poll_once(&source, &recorder, &orchestrator).await;
        }
    });

    (handle, shutdown_flag)
}

/// Run one poll cycle: fetch new emails, start/resume a session for each,
/// and run the pipeline. Per-email failures never stop the cycle.
async fn poll_once(
    source: &Arc<dyn MessageSource>,
    recorder: &Arc<SessionRecorder>,
    orchestrator: &Arc<Orchestrator>,
) {
    let emails = match source.fetch_new().await {
        Ok(emails) => emails,
        Err(e) => {
            error!("Poll cycle fetch failed: {e}");
            return;
        }
    };

    if emails.is_empty() {
        return;
    }
    debug!("Fetched {} new emails", emails.len());

    for email in emails {
        let handle = match recorder.start(&email).await {
            Ok(StartOutcome::Skipped) => {
                debug!(sender = %email.sender_email, "Already processed, skipping");
                continue;
            }
            Ok(StartOutcome::Started(handle)) | Ok(StartOutcome::Resumed(handle)) => handle,
            Err(e) => {
                error!(sender = %email.sender_email, error = %e, "Failed to start session");
                continue;
            }
        };

        // run() records the failure itself; nothing more to do here.
        if let Err(e) = orchestrator.run(&handle, &email).await {
            error!(session = %handle.id, error = %e, "Session failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::services::InboundEmail;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    /// Source that fails on the first fetch and succeeds afterwards.
    struct FlakySource {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MessageSource for FlakySource {
        async fn fetch_new(&self) -> Result<Vec<InboundEmail>, ServiceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Err(ServiceError::MessageFetch("imap timed out".into()))
            } else {
                Ok(Vec::new())
            }
        }
    }

    #[tokio::test]
    async fn poller_survives_fetch_errors_and_polls_again() {
        use crate::llm::Completions;
        use crate::pipeline::orchestrator::PipelineOptions;
        use crate::services::{UnavailableDocumentStore, UnavailableVectorSearch};
        use crate::store::{ConnectionPool, SessionStore, migrations};

        struct NoopLlm;

        #[async_trait]
        impl Completions for NoopLlm {
            fn model_name(&self) -> &str {
                "noop"
            }

            async fn complete(
                &self,
                _system: &str,
                _user: &str,
            ) -> Result<String, crate::error::LlmError> {
                Ok("Others".into())
            }
        }

        struct NoopNotifier;

        #[async_trait]
        impl crate::services::Notifier for NoopNotifier {
            async fn send(
                &self,
                _request: &crate::services::NotifyRequest,
            ) -> Result<u16, ServiceError> {
                Ok(200)
            }
        }

        struct NoopDrafts;

        #[async_trait]
        impl crate::services::DraftService for NoopDrafts {
            async fn create_draft(
                &self,
                _to: &str,
                _subject: &str,
                _body: &str,
            ) -> Result<String, ServiceError> {
                Ok("Draft created".into())
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("poller.db");
        let pool = ConnectionPool::open_local(path.to_str().unwrap(), 2)
            .await
            .unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let recorder = Arc::new(SessionRecorder::new(Arc::new(SessionStore::new(pool))));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(NoopLlm),
            Arc::new(UnavailableVectorSearch),
            Arc::new(UnavailableDocumentStore),
            Arc::new(NoopNotifier),
            Arc::new(NoopDrafts),
            recorder.clone(),
            PipelineOptions::default(),
        ));

        let source = Arc::new(FlakySource {
            calls: AtomicU32::new(0),
        });
        let (handle, shutdown) = spawn_poller(
            source.clone(),
            recorder,
            orchestrator,
            Duration::from_millis(10),
        );

        // Give the loop time for the failing first cycle plus at least one more.
        tokio::time::sleep(Duration::from_millis(60)).await;
        shutdown.store(true, Ordering::Relaxed);
        handle.await.unwrap();

        assert!(source.calls.load(Ordering::SeqCst) >= 2);
    }
}
