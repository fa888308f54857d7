//! REST API endpoints for projects and their questions

use actix_web::{HttpResponse, get, post, put, web};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::{ApiError, ErrorResponse};
use crate::model::project::QuestionInput;
use crate::model::{NewProject, Project, ProjectSummary, ProjectUpdate};
use crate::service::projects::ProjectService;

/// Body of `PUT /v1/projects/{id}/questions`
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceQuestionsRequest {
    pub questions: Vec<QuestionInput>,
}

/// List projects with comment counts, newest first
#[utoipa::path(
    get,
    path = "/v1/projects",
    responses(
        (status = 200, description = "Projects retrieved successfully", body = [ProjectSummary]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "projects"
)]
#[get("/v1/projects")]
pub async fn list_projects(service: web::Data<ProjectService>) -> Result<HttpResponse, ApiError> {
    let projects = service.list_projects().await?;
    Ok(HttpResponse::Ok().json(projects))
}

/// Create a project
#[utoipa::path(
    post,
    path = "/v1/projects",
    request_body = NewProject,
    responses(
        (status = 201, description = "Project created", body = Project),
        (status = 400, description = "Invalid project", body = ErrorResponse)
    ),
    tag = "projects"
)]
#[post("/v1/projects")]
pub async fn create_project(
    service: web::Data<ProjectService>,
    body: web::Json<NewProject>,
) -> Result<HttpResponse, ApiError> {
    let project = service.create_project(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(project))
}

/// Get a project by ID
#[utoipa::path(
    get,
    path = "/v1/projects/{id}",
    params(
        ("id" = Uuid, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Project retrieved successfully", body = Project),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "projects"
)]
#[get("/v1/projects/{id}")]
pub async fn get_project(
    service: web::Data<ProjectService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let project = service.get_project(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(project))
}

/// Update project metadata and, optionally, its questions
///
/// A changed question list triggers stance reanalysis of every comment.
#[utoipa::path(
    put,
    path = "/v1/projects/{id}",
    params(
        ("id" = Uuid, Path, description = "Project ID")
    ),
    request_body = ProjectUpdate,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 400, description = "Invalid update", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "projects"
)]
#[put("/v1/projects/{id}")]
pub async fn update_project(
    service: web::Data<ProjectService>,
    path: web::Path<Uuid>,
    body: web::Json<ProjectUpdate>,
) -> Result<HttpResponse, ApiError> {
    let project = service.update_project(path.into_inner(), body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(project))
}

/// Replace the question list of a project
#[utoipa::path(
    put,
    path = "/v1/projects/{id}/questions",
    params(
        ("id" = Uuid, Path, description = "Project ID")
    ),
    request_body = ReplaceQuestionsRequest,
    responses(
        (status = 200, description = "Questions replaced", body = Project),
        (status = 400, description = "Malformed question list", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "projects"
)]
#[put("/v1/projects/{id}/questions")]
pub async fn replace_questions(
    service: web::Data<ProjectService>,
    path: web::Path<Uuid>,
    body: web::Json<ReplaceQuestionsRequest>,
) -> Result<HttpResponse, ApiError> {
    let project = service
        .replace_questions(path.into_inner(), body.into_inner().questions)
        .await?;
    Ok(HttpResponse::Ok().json(project))
}

/// Generate questions from the project's extracted claims
#[utoipa::path(
    post,
    path = "/v1/projects/{id}/questions/generate",
    params(
        ("id" = Uuid, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Questions generated", body = Project),
        (status = 400, description = "No extracted comments", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse),
        (status = 502, description = "Generation failed", body = ErrorResponse)
    ),
    tag = "projects"
)]
#[post("/v1/projects/{id}/questions/generate")]
pub async fn generate_questions(
    service: web::Data<ProjectService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let project = service.generate_questions(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(project))
}

/// Configure project routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_projects)
        .service(create_project)
        .service(generate_questions)
        .service(replace_questions)
        .service(get_project)
        .service(update_project);
}
