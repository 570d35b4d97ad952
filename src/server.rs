use std::sync::Arc;
use std::time::Duration;

use axum::middleware;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_cookies::CookieManagerLayer;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::compression::CompressionLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::queries::users;
use crate::db::{create_pool, migrations, DbPool};
use crate::error_pages::{error_page_middleware, fallback_handler, panic_response};
use crate::handlers;
use crate::mail::Mailer;
use crate::models::NewUser;
use crate::session::session_middleware;
use crate::state::AppState;
use crate::tasks::{TaskQueue, WorkerSettings};
use crate::timezone::timezone_middleware;
use crate::xsrf::xsrf_middleware;

/// Delay before the first retry of a failed background task.
const RETRY_BACKOFF: Duration = Duration::from_secs(1);

/// Build the application state and Axum router from a [`Config`].
///
/// Creates the database pool, runs migrations, ensures the configured
/// superuser, and starts the background worker. Must be called inside a
/// tokio runtime.
pub fn build_app(config: Config) -> Result<(AppState, Router), Box<dyn std::error::Error>> {
    let db = create_pool(&config.database_path)?;
    let mailer = Mailer::from_config(&config.email_backend)?;
    let state = build_state(config, db, mailer)?;
    let app = router(state.clone());
    Ok((state, app))
}

/// Prepare `db` and wire up the shared state around it.
pub fn build_state(
    config: Config,
    db: DbPool,
    mailer: Mailer,
) -> Result<AppState, Box<dyn std::error::Error>> {
    {
        let conn = db.get()?;
        migrations::run_migrations(&conn, &config.migrations_path)?;

        if let Some(superuser) = &config.superuser {
            users::ensure_superuser(
                &conn,
                &NewUser {
                    username: superuser.username.clone(),
                    email: superuser.email.clone(),
                    password_hash: superuser.password_hash.clone(),
                    is_active: true,
                    is_staff: true,
                },
            )?;
        }
    }

    tracing::info!(backend = mailer.backend_name(), "Configured email backend");

    let tasks = TaskQueue::start(
        Arc::new(mailer),
        db.clone(),
        WorkerSettings {
            retries: config.task_retries,
            retry_backoff: RETRY_BACKOFF,
            housekeeping_interval: Duration::from_secs(config.housekeeping_interval_secs),
            account_activation_days: config.account_activation_days,
        },
    );

    Ok(AppState {
        db,
        config: Arc::new(config),
        tasks,
    })
}

/// The full router with its middleware stack. Requests pass the layers from
/// the bottom of this list to the top.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(handlers::routes())
        .fallback(fallback_handler)
        .nest_service("/static", ServeDir::new(&state.config.static_path))
        .layer(middleware::from_fn(xsrf_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            timezone_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            error_page_middleware,
        ))
        .layer(CookieManagerLayer::new())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the router to `host:port` and spawn the server as a tokio task.
///
/// Returns the actual port the server bound to (useful when `port` is 0 for
/// OS-assigned ports) and a [`JoinHandle`] for the server task.
pub async fn serve(
    app: Router,
    host: &str,
    port: u16,
) -> Result<(u16, JoinHandle<()>), Box<dyn std::error::Error>> {
    let addr = format!("{host}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    let actual_port = listener.local_addr()?.port();

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((actual_port, handle))
}
