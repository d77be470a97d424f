//! LifeLink Backend
//!
//! REST backend for coordinating blood donation: donor profiles, a request
//! board with blood-type matching, donations, appointments, messaging and
//! notifications, persisted in SQLite.

mod api;
mod auth;
mod config;
mod db;
mod domain;
mod errors;
mod models;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use config::Config;
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting LifeLink Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Donation deferral: {} days", config.deferral_days);

    if config.api_psk.is_none() {
        tracing::warn!("No API PSK configured (LIFELINK_API_PSK). Gateway authentication is disabled!");
    }

    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool, config.deferral_policy()));

    let state = AppState {
        repo,
        config: Arc::new(config.clone()),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let psk = state.config.api_psk.clone();

    let api_routes = Router::new()
        // Users
        .route(
            "/users/me",
            get(api::get_me).put(api::upsert_me).patch(api::update_me),
        )
        .route("/users/me/location", put(api::update_my_location))
        .route("/users/{subject}", get(api::get_user))
        // Requests
        .route("/requests", get(api::list_requests).post(api::create_request))
        .route("/requests/by-type/{blood_type}", get(api::list_requests_by_type))
        .route("/requests/matching", get(api::list_matching_requests))
        .route(
            "/requests/{id}",
            get(api::get_request)
                .put(api::update_request)
                .delete(api::delete_request),
        )
        .route("/requests/{id}/status", put(api::update_request_status))
        .route("/requests/{id}/donate", post(api::donate_to_request))
        // Donations
        .route("/donations", get(api::list_donations).post(api::log_donation))
        // Appointments
        .route("/appointments/slots", get(api::list_slots))
        .route(
            "/appointments",
            get(api::list_appointments).post(api::book_appointment),
        )
        .route("/appointments/{id}/cancel", post(api::cancel_appointment))
        // Messaging
        .route(
            "/conversations",
            get(api::list_conversations).post(api::start_conversation),
        )
        .route(
            "/conversations/{id}/messages",
            get(api::list_messages).post(api::send_message),
        )
        // Notifications
        .route(
            "/notifications",
            get(api::list_notifications).post(api::create_notification),
        )
        .route("/notifications/unread-count", get(api::unread_count))
        .route("/notifications/read-all", post(api::mark_all_read))
        .route("/notifications/{id}/read", post(api::mark_read))
        // Revision
        .route("/revision", get(api::get_revision))
        // Apply PSK auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(psk.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
