use actix_web::{middleware, web, App, HttpServer};
use std::io;

use crate::handlers::{health_check, schema_lineage, table_lineage, AppState};

/// Registers the lineage endpoints.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/table/lineage", web::get().to(table_lineage))
        .route("/table/schema/lineage", web::get().to(schema_lineage));
}

/// Start the HTTP server
pub async fn start_server(
    host: &str,
    port: u16,
    workers: usize,
    state: web::Data<AppState>,
) -> io::Result<()> {
    let bind_addr = format!("{}:{}", host, port);

    log::info!("Starting server on {} with {} workers", bind_addr, workers);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .configure(routes)
    })
    .workers(workers)
    .bind(&bind_addr)?
    .run()
    .await
}
