//! REST API endpoints for comment listing and ingestion

use actix_web::{HttpResponse, get, http::header, post, web};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::api::error::{ApiError, ErrorResponse};
use crate::model::{Comment, CommentInput, SourceType};
use crate::service::comments::CommentService;

fn default_skip_duplicates() -> bool {
    true
}

/// Body of `POST /v1/projects/{id}/comments`
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCommentRequest {
    pub content: String,
    pub source_type: Option<SourceType>,
    pub source_url: Option<String>,
    /// Drop content already stored for the project (default: true)
    #[serde(default = "default_skip_duplicates")]
    pub skip_duplicates: bool,
}

/// A bulk item: plain text or a full submission
#[derive(Debug, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum BulkCommentItem {
    Text(String),
    Detailed(CommentInput),
}

impl From<BulkCommentItem> for CommentInput {
    fn from(item: BulkCommentItem) -> Self {
        match item {
            BulkCommentItem::Text(content) => CommentInput::new(content),
            BulkCommentItem::Detailed(input) => input,
        }
    }
}

/// Body of `POST /v1/projects/{id}/comments/bulk`
#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkCommentRequest {
    pub comments: Vec<BulkCommentItem>,
    /// Drop content already stored and repeats within the request (default: true)
    #[serde(default = "default_skip_duplicates")]
    pub skip_duplicates: bool,
}

/// List the comments of a project, newest first
#[utoipa::path(
    get,
    path = "/v1/projects/{id}/comments",
    params(
        ("id" = Uuid, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Comments retrieved successfully", body = [Comment]),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "comments"
)]
#[get("/v1/projects/{id}/comments")]
pub async fn list_comments(
    service: web::Data<CommentService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let comments = service.list_comments(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(comments))
}

/// Classify and store one comment
///
/// Returns one record per extracted claim, or an empty list when the comment
/// was a duplicate.
#[utoipa::path(
    post,
    path = "/v1/projects/{id}/comments",
    params(
        ("id" = Uuid, Path, description = "Project ID")
    ),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment processed", body = [Comment]),
        (status = 400, description = "Invalid comment", body = ErrorResponse),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "comments"
)]
#[post("/v1/projects/{id}/comments")]
pub async fn create_comment(
    service: web::Data<CommentService>,
    path: web::Path<Uuid>,
    body: web::Json<CreateCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    let input = CommentInput {
        content: request.content,
        source_type: request.source_type,
        source_url: request.source_url,
    };
    let created = service
        .ingest_comment(path.into_inner(), input, request.skip_duplicates)
        .await?;
    Ok(HttpResponse::Created().json(created))
}

/// Classify and store many comments in batches
#[utoipa::path(
    post,
    path = "/v1/projects/{id}/comments/bulk",
    params(
        ("id" = Uuid, Path, description = "Project ID")
    ),
    request_body = BulkCommentRequest,
    responses(
        (status = 201, description = "Comments processed", body = [Comment]),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "comments"
)]
#[post("/v1/projects/{id}/comments/bulk")]
pub async fn create_comments_bulk(
    service: web::Data<CommentService>,
    path: web::Path<Uuid>,
    body: web::Json<BulkCommentRequest>,
) -> Result<HttpResponse, ApiError> {
    let request = body.into_inner();
    let items = request.comments.into_iter().map(CommentInput::from).collect();
    let created = service
        .ingest_comments_bulk(path.into_inner(), items, request.skip_duplicates)
        .await?;
    Ok(HttpResponse::Created().json(created))
}

/// Download the project's comments and stance labels as CSV
#[utoipa::path(
    get,
    path = "/v1/projects/{id}/export.csv",
    params(
        ("id" = Uuid, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "CSV export", body = String, content_type = "text/csv"),
        (status = 404, description = "Project not found", body = ErrorResponse)
    ),
    tag = "comments"
)]
#[get("/v1/projects/{id}/export.csv")]
pub async fn export_comments_csv(
    service: web::Data<CommentService>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    let project_id = path.into_inner();
    let csv = service.export_csv(project_id).await?;
    Ok(HttpResponse::Ok()
        .content_type("text/csv; charset=utf-8")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=project-{}-export.csv", project_id),
        ))
        .body(csv))
}

/// Configure comment routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(list_comments)
        .service(export_comments_csv)
        .service(create_comments_bulk)
        .service(create_comment);
}
