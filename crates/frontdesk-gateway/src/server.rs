//! HTTP server implementation using Axum.

use std::path::Path;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use frontdesk_channels::WhatsAppChannel;
use frontdesk_core::config::FrontDeskConfig;
use frontdesk_core::store::RecordStore;
use frontdesk_core::traits::NotifyChannel;
use frontdesk_queue::{
    ChangeNotifier, SessionRegistry, SuggestionManager, TaskDispatcher, TokenQueue,
};

use super::db::SqliteStore;

/// Shared state for the gateway server.
#[derive(Clone)]
pub struct AppState {
    pub config: FrontDeskConfig,
    pub start_time: std::time::Instant,
    pub store: Arc<dyn RecordStore>,
    pub tokens: Arc<TokenQueue>,
    pub tasks: TaskDispatcher,
    pub suggestions: Arc<SuggestionManager>,
    /// Poll sessions keyed by (assignee, session id).
    pub sessions: Arc<SessionRegistry>,
    pub events: ChangeNotifier,
    pub channel_name: String,
}

impl AppState {
    /// Wire every component around one store and one channel.
    pub fn new(
        config: FrontDeskConfig,
        store: Arc<dyn RecordStore>,
        channel: Arc<dyn NotifyChannel>,
    ) -> Self {
        let events = ChangeNotifier::default();
        let tasks = TaskDispatcher::new(store.clone(), events.clone());
        let suggestions = SuggestionManager::new(
            store.clone(),
            tasks.clone(),
            events.clone(),
            config.tasks.suggestion_assigned_by.clone(),
        );
        let sessions = SessionRegistry::new(
            tasks.clone(),
            config.poller.cooldown(),
            config.poller.session_idle(),
        );
        let channel_name = channel.name().to_string();
        Self {
            tokens: Arc::new(TokenQueue::new(store.clone(), channel, events.clone())),
            tasks,
            suggestions: Arc::new(suggestions),
            sessions: Arc::new(sessions),
            events,
            store,
            start_time: std::time::Instant::now(),
            channel_name,
            config,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    build_router_from_arc(Arc::new(state))
}

pub fn build_router_from_arc(shared: Arc<AppState>) -> Router {
    let api = Router::new()
        // Token queue
        .route(
            "/api/v1/tokens",
            get(super::routes::list_tokens)
                .post(super::routes::assign_token)
                .put(super::routes::update_token)
                .delete(super::routes::delete_token),
        )
        .route("/api/v1/tokens/call", post(super::routes::call_token))
        // Staff tasks
        .route(
            "/api/v1/tasks",
            get(super::routes::list_tasks).post(super::routes::create_tasks),
        )
        .route(
            "/api/v1/tasks/{id}/status",
            put(super::routes::update_task_status),
        )
        // Notification popups
        .route(
            "/api/v1/notifications",
            get(super::routes::poll_notifications)
                .post(super::routes::acknowledge_notification)
                .delete(super::routes::close_notification_session),
        )
        // Live change feed
        .route("/ws/events", get(super::ws::ws_handler))
        // Suggested tasks
        .route(
            "/api/v1/suggested",
            get(super::routes::list_suggested)
                .post(super::routes::create_suggested)
                .delete(super::routes::delete_suggested)
                .patch(super::routes::patch_suggested),
        )
        .route(
            "/api/v1/suggested/{id}/promote",
            post(super::routes::promote_suggested),
        )
        // Patients
        .route("/api/v1/patients", post(super::routes::create_patient))
        .route("/api/v1/patients/{id}", get(super::routes::get_patient));

    let public = Router::new().route("/health", get(super::routes::health_check));

    api.merge(public)
        .layer({
            let cors = CorsLayer::new()
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::PUT,
                    axum::http::Method::PATCH,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers(Any)
                .max_age(std::time::Duration::from_secs(3600));

            // Example: FRONTDESK_CORS_ORIGINS=https://clinic.example,https://desk.clinic.example
            if let Ok(origins_str) = std::env::var("FRONTDESK_CORS_ORIGINS") {
                let origins: Vec<_> = origins_str
                    .split(',')
                    .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
                    .collect();
                cors.allow_origin(origins)
            } else {
                // Development fallback: any origin
                cors.allow_origin(Any)
            }
        })
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

/// Open the store, build the channel and serve until the listener fails.
pub async fn start(config: FrontDeskConfig, db_path: &Path) -> anyhow::Result<()> {
    let store = SqliteStore::open(db_path)?;
    tracing::info!("💾 Record store ready: {}", db_path.display());

    let channel = WhatsAppChannel::new(config.whatsapp.clone())?;
    if channel.is_simulated() {
        tracing::info!("📴 Patient messages run in simulated mode");
    }

    let state = AppState::new(config.clone(), Arc::new(store), Arc::new(channel));

    let app = build_router(state);
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("🌐 FrontDesk listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
