//! REST API endpoints for cached stance and project reports

use actix_web::{HttpResponse, get, web};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::api::error::{ApiError, ErrorResponse};
use crate::model::{ProjectReport, StanceReport};
use crate::service::reports::ReportService;

/// Query parameters for report endpoints
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ReportParams {
    /// Regenerate even when a cached report exists (default: false)
    #[serde(default)]
    pub force_regenerate: bool,
}

/// Stance distribution and analysis for one question
#[utoipa::path(
    get,
    path = "/v1/projects/{id}/questions/{question_id}/report",
    params(
        ("id" = Uuid, Path, description = "Project ID"),
        ("question_id" = String, Path, description = "Question ID"),
        ReportParams
    ),
    responses(
        (status = 200, description = "Report retrieved", body = StanceReport),
        (status = 404, description = "Project or question not found", body = ErrorResponse),
        (status = 502, description = "Report generation failed", body = ErrorResponse)
    ),
    tag = "reports"
)]
#[get("/v1/projects/{id}/questions/{question_id}/report")]
pub async fn get_stance_report(
    service: web::Data<ReportService>,
    path: web::Path<(Uuid, String)>,
    query: web::Query<ReportParams>,
) -> Result<HttpResponse, ApiError> {
    let (project_id, question_id) = path.into_inner();
    let report = service
        .get_stance_report(project_id, &question_id, query.force_regenerate)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Synthesis across every question of a project
#[utoipa::path(
    get,
    path = "/v1/projects/{id}/report",
    params(
        ("id" = Uuid, Path, description = "Project ID"),
        ReportParams
    ),
    responses(
        (status = 200, description = "Report retrieved", body = ProjectReport),
        (status = 404, description = "Project not found", body = ErrorResponse),
        (status = 502, description = "Report generation failed", body = ErrorResponse)
    ),
    tag = "reports"
)]
#[get("/v1/projects/{id}/report")]
pub async fn get_project_report(
    service: web::Data<ReportService>,
    path: web::Path<Uuid>,
    query: web::Query<ReportParams>,
) -> Result<HttpResponse, ApiError> {
    let report = service
        .get_project_report(path.into_inner(), query.force_regenerate)
        .await?;
    Ok(HttpResponse::Ok().json(report))
}

/// Configure report routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_stance_report).service(get_project_report);
}
