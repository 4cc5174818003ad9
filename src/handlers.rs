use actix_web::{http::StatusCode, web, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::config::LineageConfig;
use crate::error::LineageError;
use crate::field_lineage::FieldLineage;
use crate::models::Catalog;

/// Shared, read-only state of the HTTP workers.
pub struct AppState {
    pub catalog: Catalog,
    pub lineage: LineageConfig,
}

/// Query parameters of the lineage endpoints
#[derive(Debug, Deserialize)]
pub struct LineageQuery {
    pub fqdn: String,
}

/// Error response model
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Handler for the table-level lineage network
pub async fn table_lineage(
    state: web::Data<AppState>,
    query: web::Query<LineageQuery>,
) -> impl Responder {
    tracing::info!("Building table lineage for fqdn={}", query.fqdn);

    let json = crate::table_lineage_network(&state.catalog, &query.fqdn, &state.lineage)
        .and_then(|network| network.to_json());
    match json {
        Ok(body) => HttpResponse::Ok()
            .content_type("application/json")
            .body(body),
        Err(e) => error_response(&query.fqdn, e),
    }
}

/// Handler for the field-level (schema) lineage
pub async fn schema_lineage(
    state: web::Data<AppState>,
    query: web::Query<LineageQuery>,
) -> impl Responder {
    tracing::info!("Building schema lineage for fqdn={}", query.fqdn);

    let json = FieldLineage::build(&state.catalog, &query.fqdn, &state.lineage)
        .and_then(|lineage| lineage.to_json());
    match json {
        Ok(body) => HttpResponse::Ok()
            .content_type("application/json")
            .body(body),
        Err(e) => error_response(&query.fqdn, e),
    }
}

/// Health check handler
pub async fn health_check() -> impl Responder {
    HttpResponse::Ok().body("OK")
}

fn error_response(fqdn: &str, err: LineageError) -> HttpResponse {
    let status = status_for(&err);
    if status.is_server_error() {
        tracing::error!("Lineage for {} failed: {}", fqdn, err);
    } else {
        tracing::warn!("Lineage for {} rejected: {}", fqdn, err);
    }
    HttpResponse::build(status).json(ErrorResponse {
        error: err.to_string(),
    })
}

pub fn status_for(err: &LineageError) -> StatusCode {
    match err {
        e if e.is_not_found() => StatusCode::NOT_FOUND,
        e if e.is_limit_exceeded() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
