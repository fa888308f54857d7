//! OpenAPI specification endpoints

use actix_web::{HttpResponse, Responder, get};
use utoipa::OpenApi;

use crate::api::error::ErrorResponse;
use crate::api::{comments, health, projects, reports};
use crate::model::comment::{Comment, CommentInput, CommentStance, SourceType};
use crate::model::project::{NewProject, Project, ProjectSummary, ProjectUpdate, Question, QuestionInput, Stance, StanceInput};
use crate::model::report::{ProjectReport, QuestionDigest, StanceCount, StanceReport, StanceTally};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Stance Intel API",
        description = "Public comment stance classification and reporting"
    ),
    paths(
        health::liveness,
        health::readiness,
        projects::list_projects,
        projects::create_project,
        projects::get_project,
        projects::update_project,
        projects::replace_questions,
        projects::generate_questions,
        comments::list_comments,
        comments::create_comment,
        comments::create_comments_bulk,
        comments::export_comments_csv,
        reports::get_stance_report,
        reports::get_project_report,
    ),
    components(schemas(
        ErrorResponse,
        Project,
        ProjectSummary,
        NewProject,
        ProjectUpdate,
        Question,
        QuestionInput,
        Stance,
        StanceInput,
        Comment,
        CommentInput,
        CommentStance,
        SourceType,
        StanceReport,
        StanceTally,
        ProjectReport,
        QuestionDigest,
        StanceCount,
        projects::ReplaceQuestionsRequest,
        comments::CreateCommentRequest,
        comments::BulkCommentRequest,
        comments::BulkCommentItem,
    )),
    tags(
        (name = "health", description = "Liveness and readiness probes"),
        (name = "projects", description = "Projects and discussion questions"),
        (name = "comments", description = "Comment ingestion and listing"),
        (name = "reports", description = "Cached stance and project reports")
    )
)]
pub struct ApiDoc;

/// Serve OpenAPI JSON specification
#[get("/openapi.json")]
pub async fn openapi_json() -> impl Responder {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

/// Serve OpenAPI YAML specification
#[get("/openapi.yaml")]
pub async fn openapi_yaml() -> impl Responder {
    match ApiDoc::openapi().to_yaml() {
        Ok(yaml) => HttpResponse::Ok().content_type("text/yaml").body(yaml),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render OpenAPI YAML");
            HttpResponse::InternalServerError().finish()
        }
    }
}

/// Configure OpenAPI routes
pub fn configure(cfg: &mut actix_web::web::ServiceConfig) {
    cfg.service(openapi_json).service(openapi_yaml);
}
