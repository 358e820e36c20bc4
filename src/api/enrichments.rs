use actix_web::{get, web, HttpResponse, Responder};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppCore;
use crate::enrichment::ConfigField;

/// Catalog entry for one registered enrichment. The `config_schema` is
/// served verbatim for the external configuration UI to render.
#[derive(Serialize)]
struct EnrichmentInfo {
    slug: &'static str,
    name: &'static str,
    description: &'static str,
    batch_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    secret: Option<&'static str>,
    config_schema: Vec<ConfigField>,
}

#[derive(Serialize)]
struct EnrichmentListResponse {
    enrichments: Vec<EnrichmentInfo>,
}

#[get("/enrichments")]
async fn list_enrichments(core: web::Data<Arc<AppCore>>) -> impl Responder {
    let enrichments = core
        .registry
        .all()
        .iter()
        .map(|e| EnrichmentInfo {
            slug: e.slug(),
            name: e.name(),
            description: e.description(),
            batch_size: e.batch_size(),
            secret: e.secret().map(|s| s.name),
            config_schema: e.config_schema(),
        })
        .collect();
    HttpResponse::Ok().json(EnrichmentListResponse { enrichments })
}

pub fn enrichments_config(config: &mut web::ServiceConfig) {
    config.service(list_enrichments);
}
