use std::sync::Arc;
use std::sync::atomic::Ordering;

use booking_assist::config::Config;
use booking_assist::llm::create_completions;
use booking_assist::pipeline::{Orchestrator, PipelineOptions, spawn_poller};
use booking_assist::services::{
    DocumentStore, DraftService, HttpDocumentStore, HttpDraftService, HttpVectorSearch,
    IdleMessageSource, MessageSource, Notifier, SlackWebhookNotifier, UnavailableDocumentStore,
    UnavailableDraftService, UnavailableNotifier, UnavailableVectorSearch, VectorSearch,
};
use booking_assist::session::SessionRecorder;
use booking_assist::store::{ConnectionPool, SessionStore, migrations};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export OPENAI_API_KEY=sk-...");
        std::process::exit(1);
    });

    eprintln!("📬 Booking Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Database: {}", config.db_path);
    eprintln!("   Poll interval: {}s", config.poll_interval.as_secs());
    if config.quiet_mode {
        eprintln!("   Quiet mode: notifications and drafts skipped");
    }

    // ── Persistence ──────────────────────────────────────────────────────
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let pool = ConnectionPool::open_local(&config.db_path, config.pool_size)
        .await
        .unwrap_or_else(|e| {
            eprintln!("Error: Failed to open database at {}: {e}", config.db_path);
            std::process::exit(1);
        });
    migrations::run_migrations(&pool).await?;

    let store = Arc::new(SessionStore::new(pool));
    let recorder = Arc::new(SessionRecorder::new(store));

    // ── Collaborators ────────────────────────────────────────────────────
    let llm = create_completions(&config.llm)?;

    let vector: Arc<dyn VectorSearch> = match config.vector_endpoint.clone() {
        Some(endpoint) => {
            eprintln!("   Vector search: {endpoint}");
            Arc::new(HttpVectorSearch::new(endpoint))
        }
        None => {
            eprintln!("   Vector search: disabled");
            Arc::new(UnavailableVectorSearch)
        }
    };

    let (docs, client_root_folder): (Arc<dyn DocumentStore>, Option<String>) = match &config.docs {
        Some(docs_config) => {
            eprintln!("   Document store: {}", docs_config.base_url);
            (
                Arc::new(HttpDocumentStore::new(docs_config)),
                Some(docs_config.root_folder_id.clone()),
            )
        }
        None => {
            eprintln!("   Document store: disabled");
            (Arc::new(UnavailableDocumentStore), None)
        }
    };

    let notifier: Arc<dyn Notifier> = match config.slack_webhook_url.clone() {
        Some(url) => {
            eprintln!("   Notifications: Slack webhook");
            Arc::new(SlackWebhookNotifier::new(url))
        }
        None => {
            eprintln!("   Notifications: disabled");
            Arc::new(UnavailableNotifier)
        }
    };

    let drafts: Arc<dyn DraftService> = match &config.drafts {
        Some(drafts_config) => {
            eprintln!("   Draft service: {}", drafts_config.base_url);
            Arc::new(HttpDraftService::new(drafts_config))
        }
        None => {
            eprintln!("   Draft service: disabled");
            Arc::new(UnavailableDraftService)
        }
    };

    // ── Pipeline ─────────────────────────────────────────────────────────
    let orchestrator = Arc::new(Orchestrator::new(
        llm,
        vector,
        docs,
        notifier,
        drafts,
        Arc::clone(&recorder),
        PipelineOptions {
            client_root_folder,
            top_k: config.top_k,
            quiet_mode: config.quiet_mode,
        },
    ));

    // Inbound retrieval lives behind MessageSource; without a configured
    // channel the poller idles.
    let source: Arc<dyn MessageSource> = Arc::new(IdleMessageSource);

    let (poller_handle, poller_shutdown) =
        spawn_poller(source, recorder, orchestrator, config.poll_interval);

    tokio::signal::ctrl_c().await?;
    eprintln!("\nShutting down...");
    poller_shutdown.store(true, Ordering::Relaxed);
    poller_handle.abort();

    Ok(())
}
