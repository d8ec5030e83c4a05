//! Fomentos API Gateway
//!
//! The single binary hosting the whole pipeline:
//! - Startup wiring (config, stores, clients, orchestrator, scheduler)
//! - Authentication and request routing
//! - Observability (structured logging, request ids)

mod handlers;

use axum::{
    routing::{delete, get, post},
    Router,
};
use fomentos_chat::ChatEngine;
use fomentos_common::{
    auth::JwtManager,
    config::AppConfig,
    db::{self, models::User, Repository},
    embeddings::OpenAiEmbedder,
    llm::ChatCompletions,
    metrics,
    vector::VectorService,
};
use fomentos_ingestion::{
    chunker::ChunkingConfig,
    extractor::VariableExtractor,
    jobs::{scheduler, JobOrchestrator},
    processor::EditalProcessor,
    HttpFetcher, PdfExtractor,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repo: Repository,
    pub jwt: Arc<JwtManager>,
    pub orchestrator: Arc<JobOrchestrator>,
    pub vector: Arc<VectorService>,
    pub chat: Arc<ChatEngine>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {e}");
        e
    })?;

    init_tracing(config.server.debug);
    info!("Starting Fomentos API Gateway v{}", fomentos_common::VERSION);

    metrics::register_metrics();

    let config = Arc::new(config);

    // Canonical store
    info!("Connecting to MongoDB...");
    let database = db::connect(&config.mongo).await?;
    let repo = Repository::new(database);
    bootstrap_admin(&repo).await?;

    // Vector index: enforce the embedding-model invariant, then warm up
    info!("Initializing vector collection...");
    let embedder = Arc::new(OpenAiEmbedder::new(&config.openai)?);
    let vector = Arc::new(VectorService::initialize(&config.chroma, embedder).await?);
    vector.warmup().await;

    // OpenAI chat client shared by extractor and RAG engine
    let chat_client = Arc::new(ChatCompletions::new(&config.openai)?);

    // Ingestion pipeline
    let fetcher = Arc::new(HttpFetcher::new()?);
    let pdf = Arc::new(PdfExtractor::new(config.jobs.max_workers));
    let extractor = Arc::new(VariableExtractor::new(
        chat_client.clone(),
        repo.clone(),
        vector.clone(),
        ChunkingConfig {
            chunk_size: config.jobs.chunk_size,
            chunk_overlap: config.jobs.chunk_overlap,
        },
        config.chunk_delay(),
    ));
    let processor = Arc::new(EditalProcessor::new(
        fetcher.clone(),
        pdf,
        extractor,
        repo.clone(),
    ));
    let orchestrator = Arc::new(JobOrchestrator::new(
        repo.clone(),
        fetcher,
        processor,
        config.pdf_processing_delay(),
    ));

    // One daily cron per source
    let _schedules = scheduler::start(orchestrator.clone());

    // RAG chat engine
    let chat = Arc::new(ChatEngine::new(
        chat_client,
        vector.clone(),
        repo.clone(),
        config.chat.clone(),
    ));

    let jwt = Arc::new(JwtManager::new(
        &config.auth.secret_key,
        config.auth.access_token_expire_minutes,
    ));

    let state = AppState {
        config: config.clone(),
        repo,
        jwt,
        orchestrator,
        vector,
        chat,
    };

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(debug: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .init();
    }
}

/// Seed the first user from the environment so login works on a fresh
/// deployment. No-op once any user exists.
async fn bootstrap_admin(repo: &Repository) -> Result<(), Box<dyn std::error::Error>> {
    if repo.count_users().await? > 0 {
        return Ok(());
    }

    let (Ok(email), Ok(password)) = (
        std::env::var("ADMIN_EMAIL"),
        std::env::var("ADMIN_PASSWORD"),
    ) else {
        warn!("No users exist and ADMIN_EMAIL/ADMIN_PASSWORD are unset; login will fail");
        return Ok(());
    };

    let hash = fomentos_common::auth::hash_password(&password)?;
    let user = User::create(&email, Some("Administrador".to_string()), hash);
    repo.create_user(&user).await?;
    info!(%email, "Bootstrap admin user created");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_v1 = Router::new()
        // Job endpoints
        .route("/jobs/{source}/execute", post(handlers::jobs::execute_job))
        .route("/jobs", get(handlers::jobs::list_jobs))
        .route(
            "/jobs/{id}",
            get(handlers::jobs::get_job).delete(handlers::jobs::cancel_job),
        )
        // Chat endpoints
        .route(
            "/chat/conversations",
            post(handlers::chat::create_conversation).get(handlers::chat::list_conversations),
        )
        .route(
            "/chat/conversations/{id}",
            get(handlers::chat::get_conversation).delete(handlers::chat::delete_conversation),
        )
        .route(
            "/chat/conversations/{id}/messages",
            post(handlers::chat::send_message),
        )
        // Editais read API
        .route("/editais", get(handlers::editais::list_editais))
        .route("/editais/{uuid}", get(handlers::editais::get_edital));

    let chroma_api = Router::new()
        .route("/documents", get(handlers::chroma::all_documents))
        .route("/stats", get(handlers::chroma::stats))
        .route("/search", post(handlers::chroma::search))
        .route("/editais/{uuid}", delete(handlers::chroma::delete_edital_chunks));

    Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Token issuance
        .route("/login", post(handlers::auth::login))
        .nest("/api/v1", api_v1)
        .nest("/api/chroma", chroma_api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
