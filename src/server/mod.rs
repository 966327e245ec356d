//! HTTP API for the orchestrator.
//!
//! Exposes the public request-routing surface: upload registration,
//! document listing/retrieval, the review completion callback, and status
//! counts. Auth and UI rendering live outside this service.

mod handlers;
mod routes;

pub use routes::create_router;

use std::sync::Arc;

use crate::config::Settings;
use crate::extraction::{ExtractionGateway, JsonExtractor};
use crate::pipeline::{DocumentStateMachine, ReviewDispatcher, ReviewQueue};
use crate::repository::{DocumentRepository, ReviewTaskRepository};
use crate::services::ProcessingService;
use crate::storage::{FsObjectStore, ObjectStore};

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<DocumentRepository>,
    pub store: Arc<dyn ObjectStore>,
    pub dispatcher: Arc<ReviewDispatcher>,
    pub processing: Arc<ProcessingService>,
}

impl AppState {
    /// Wire the repositories, object store, and pipeline services from
    /// settings.
    pub fn new(settings: &Settings, queue: Arc<dyn ReviewQueue>) -> anyhow::Result<Self> {
        let db_path = settings.db_path();
        let repo = Arc::new(DocumentRepository::new(&db_path)?);
        let tasks = Arc::new(ReviewTaskRepository::new(&db_path)?);
        let store: Arc<dyn ObjectStore> = Arc::new(FsObjectStore::new(settings.objects_dir()));

        let state_machine = Arc::new(DocumentStateMachine::new(repo.clone()));
        let gateway = Arc::new(ExtractionGateway::new(
            store.clone(),
            Arc::new(JsonExtractor::new()),
            settings.extraction_timeout(),
        ));
        let dispatcher = Arc::new(ReviewDispatcher::new(
            tasks,
            queue,
            settings.review_submit_timeout(),
            settings.review_expiry(),
        ));
        let processing = Arc::new(ProcessingService::new(
            repo.clone(),
            state_machine,
            gateway,
            dispatcher.clone(),
            settings.thresholds.clone(),
            settings.retry,
        ));

        Ok(Self {
            repo,
            store,
            dispatcher,
            processing,
        })
    }
}

/// Start the web server, including the review expiry sweep.
pub async fn serve(settings: &Settings, state: AppState) -> anyhow::Result<()> {
    let sweep = state.processing.clone();
    let sweep_interval = std::time::Duration::from_secs(settings.expiry_sweep_interval_secs);
    tokio::spawn(async move { sweep.run_expiry_sweep(sweep_interval).await });

    let app = create_router(state);
    let addr = format!("{}:{}", settings.host, settings.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
