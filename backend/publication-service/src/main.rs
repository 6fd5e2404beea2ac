use actix_web::{web, App, HttpResponse, HttpServer};
use publication_service::clock::{Clock, SystemClock};
use publication_service::services::{Mailer, Services, SmtpMailer};
use publication_service::{db, metrics, Config};
use serde_json::json;
use sqlx::SqlitePool;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

async fn health(pool: web::Data<SqlitePool>) -> HttpResponse {
    match sqlx::query("SELECT 1").execute(pool.get_ref()).await {
        Ok(_) => HttpResponse::Ok().json(json!({
            "status": "healthy",
            "service": "publication-service",
            "version": env!("CARGO_PKG_VERSION"),
        })),
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed");
            HttpResponse::ServiceUnavailable().json(json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }))
        }
    }
}

/// Re-read `.env` and the environment on SIGHUP and apply the SMTP settings.
#[cfg(unix)]
fn spawn_mail_reloader(services: Services) -> io::Result<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    Ok(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            dotenvy::dotenv_override().ok();
            let result = Config::from_env()
                .map_err(|e| e.to_string())
                .and_then(|config| {
                    services
                        .reload_mail(&config.notifications)
                        .map_err(|e| e.to_string())
                });
            if let Err(e) = result {
                tracing::warn!(error = %e, "SMTP reload failed; keeping previous settings");
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_mail_reloader(_services: Services) -> io::Result<JoinHandle<()>> {
    Ok(tokio::spawn(async {}))
}

fn to_io(context: &str, err: impl std::fmt::Display) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,actix_web=info,sqlx=warn".into());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!("Configuration loading failed: {}", e);
            eprintln!("ERROR: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Starting publication-service v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.app.env);

    let pool = db::connect(&config.database)
        .await
        .map_err(|e| to_io("Failed to create database pool", e))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| to_io("Failed to run migrations", e))?;

    let mailer = SmtpMailer::new(&config.notifications)
        .map_err(|e| to_io("Failed to configure SMTP mailer", e))?;
    if !mailer.is_enabled() {
        tracing::warn!("SMTP_HOST not set; new-post notifications are logged only");
    }
    let mailer: Arc<dyn Mailer> = Arc::new(mailer);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let (services, worker) = Services::build(pool.clone(), &config, clock, mailer)
        .map_err(|e| to_io("Failed to build services", e))?;

    let reloader = spawn_mail_reloader(services.clone())?;
    let services = web::Data::new(services);
    let pool_data = web::Data::new(pool.clone());
    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Starting HTTP server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(services.clone())
            .app_data(pool_data.clone())
            .wrap(TracingLogger::default())
            .route("/health", web::get().to(health))
            .route("/metrics", web::get().to(metrics::serve_metrics))
    })
    .bind(&bind_address)?
    .run()
    .await?;

    reloader.abort();
    let _ = reloader.await;

    // The HTTP workers held the last service handles; the dispatcher drains
    // whatever is still queued before exiting.
    match tokio::time::timeout(Duration::from_secs(10), worker).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Notification worker ended abnormally"),
        Err(_) => tracing::warn!("Notification worker did not drain within 10s"),
    }
    pool.close().await;
    tracing::info!("publication-service stopped");
    Ok(())
}
