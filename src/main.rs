mod auth;
mod checklist;
mod dashboard;
mod db;
mod error;
mod models;
mod report;
mod settings;
mod tasks;
mod users;

use auth::{AppState, SharedState};
use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post, put},
    Router,
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // ── Configuration & storage ────────────────────────────────
    let settings = settings::Settings::load().expect("Failed to load settings");

    let db = db::Db::open(&settings.database_path).expect("Failed to open database");

    if db
        .ensure_default_admin(&settings)
        .expect("Failed to seed admin user")
    {
        tracing::info!(email = %settings.default_admin_email, "created default admin user");
    }

    // ── CORS ───────────────────────────────────────────────────
    let cors = if settings.allowed_origin == "*" {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origin = settings
            .allowed_origin
            .parse::<HeaderValue>()
            .expect("Invalid allowed_origin in settings");
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let binding: IpAddr = settings
        .tcp_socket_binding
        .parse()
        .expect("Invalid tcp_socket_binding in settings");
    let addr = SocketAddr::from((binding, settings.tcp_socket_port));

    // ── Shared state & router ──────────────────────────────────
    let state: SharedState = Arc::new(AppState { db, settings });

    let app = router(state).layer(cors);

    // ── Start ──────────────────────────────────────────────────
    tracing::info!(%addr, "server running");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

fn router(state: SharedState) -> Router {
    // Everything except register/login sits behind the bearer middleware.
    // Admin-only handlers additionally call auth::require_admin.
    let protected = Router::new()
        .route(
            "/api/auth/profile",
            get(auth::profile).put(auth::update_profile),
        )
        .route(
            "/api/tasks",
            get(tasks::list_tasks).post(tasks::create_task),
        )
        .route("/api/tasks/dashboard-data", get(dashboard::dashboard_data))
        .route(
            "/api/tasks/user-dashboard-data",
            get(dashboard::user_dashboard_data),
        )
        .route(
            "/api/tasks/:id",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/api/tasks/:id/status", put(tasks::update_task_status))
        .route("/api/tasks/:id/todo", put(tasks::update_task_checklist))
        .route("/api/users", get(users::list_users))
        .route(
            "/api/users/:id",
            get(users::get_user).delete(users::delete_user),
        )
        .route("/api/reports/export/tasks", get(report::export_tasks))
        .route("/api/reports/export/users", get(report::export_users))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .merge(protected)
        .with_state(state)
}
