//! Prometheus metrics for publication-service.
//!
//! Index, engagement, notification and storage collectors, plus the
//! `/metrics` handler.

use actix_web::{web, HttpResponse};
use lazy_static::lazy_static;
use prometheus::{register_int_gauge_vec, Encoder, IntGaugeVec, TextEncoder};
use sqlx::SqlitePool;

pub mod engagement;
pub mod index_sync;
pub mod notifications;

lazy_static! {
    /// SQLite pool connections by state (open, idle), sampled per scrape.
    pub static ref DB_POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "publication_db_pool_connections",
        "SQLite pool connections segmented by state",
        &["state"]
    )
    .expect("failed to register publication_db_pool_connections");
}

/// Copy the pool's current size into [`DB_POOL_CONNECTIONS`].
pub fn sample_pool(pool: &SqlitePool) {
    DB_POOL_CONNECTIONS
        .with_label_values(&["open"])
        .set(i64::from(pool.size()));
    DB_POOL_CONNECTIONS
        .with_label_values(&["idle"])
        .set(i64::try_from(pool.num_idle()).unwrap_or(i64::MAX));
}

/// Encode every registered collector in the Prometheus text format.
pub fn render() -> Result<(String, Vec<u8>), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok((encoder.format_type().to_string(), buffer))
}

/// `/metrics`: samples the pool, then renders the registry.
pub async fn serve_metrics(pool: web::Data<SqlitePool>) -> HttpResponse {
    sample_pool(pool.get_ref());
    match render() {
        Ok((content_type, body)) => HttpResponse::Ok().content_type(content_type).body(body),
        Err(err) => {
            tracing::error!(error = %err, "Failed to encode metrics");
            HttpResponse::InternalServerError().body(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::notifications::NOTIFICATION_DISPATCH_TOTAL;
    use actix_web::{body::to_bytes, http::StatusCode, test, App};

    #[actix_web::test]
    async fn scrape_reports_pool_and_service_collectors() {
        let pool = crate::db::connect_in_memory().await.unwrap();
        NOTIFICATION_DISPATCH_TOTAL.with_label_values(&["queued"]).inc();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(pool))
                .route("/metrics", web::get().to(serve_metrics)),
        )
        .await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("publication_db_pool_connections{state=\"open\"} 1"));
        assert!(text.contains("notification_dispatch_total"));
    }
}
