use std::sync::Arc;

use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt as _;

use crate::error::ApiError;
use crate::models::*;
use crate::query::QueryService;
use crate::reconcile::PhotoUpload;
use crate::repo::Repo;
use crate::storage::{PhotoStore, PhotoStoreError};
use crate::workflow::{Outcome, SubmissionWorkflow};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/submitData")
            .service(
                web::resource("")
                    .route(web::post().to(submit_data))
                    .route(web::get().to(get_data_by_email)),
            )
            .service(
                web::resource("/{id}")
                    .route(web::get().to(get_data_by_id))
                    .route(web::patch().to(edit_data_by_id)),
            ),
    );
    // photo binaries are public by storage name, so <img src="/photos/{name}"> works
    cfg.route("/photos/{name}", web::get().to(get_photo));
}

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<SubmissionWorkflow>,
    pub query: Arc<QueryService>,
    pub photos: Arc<dyn PhotoStore>,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, photos: Arc<dyn PhotoStore>) -> Self {
        Self {
            workflow: Arc::new(SubmissionWorkflow::new(repo.clone(), photos.clone())),
            query: Arc::new(QueryService::new(repo)),
            photos,
        }
    }
}

// The submission JSON rides in one multipart field; photos follow in
// request order, which is also their pairing order.
const DATA_FIELD: &str = "data";
const PHOTO_FIELD: &str = "photo_files";

const DATA_SIZE_LIMIT: usize = 1024 * 1024; // 1 MiB of JSON is already generous
const PHOTO_SIZE_LIMIT: usize = 25 * 1024 * 1024; // 25 MiB per photo

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, ApiError> {
    let mut bytes: Vec<u8> = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(|e| {
        log::error!("multipart stream error: {e}");
        ApiError::BadRequest("malformed multipart payload".into())
    })? {
        if bytes.len() + chunk.len() > limit {
            return Err(ApiError::PayloadTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

/// Splits a multipart request into the decoded submission payload and
/// the uploaded photo binaries, preserving upload order.
async fn read_submission(
    payload: &mut Multipart,
) -> Result<(MountainPassSubmission, Vec<PhotoUpload>), ApiError> {
    let mut data: Option<MountainPassSubmission> = None;
    let mut uploads: Vec<PhotoUpload> = Vec::new();

    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::BadRequest("malformed multipart payload".into())
    })? {
        let name = field
            .content_disposition()
            .get_name()
            .unwrap_or_default()
            .to_string();
        match name.as_str() {
            DATA_FIELD => {
                let bytes = read_field(&mut field, DATA_SIZE_LIMIT).await?;
                let parsed = serde_json::from_slice(&bytes)
                    .map_err(|e| ApiError::BadRequest(format!("invalid submission JSON: {e}")))?;
                data = Some(parsed);
            }
            PHOTO_FIELD => {
                let filename = field
                    .content_disposition()
                    .get_filename()
                    .map(|s| s.to_string());
                let bytes = read_field(&mut field, PHOTO_SIZE_LIMIT).await?;
                uploads.push(PhotoUpload::from_bytes(filename, bytes));
            }
            _ => {
                // drain and ignore unknown fields
                while field
                    .try_next()
                    .await
                    .map_err(|_| ApiError::BadRequest("malformed multipart payload".into()))?
                    .is_some()
                {}
            }
        }
    }

    let data = data.ok_or_else(|| ApiError::BadRequest(format!("missing '{DATA_FIELD}' field")))?;
    Ok((data, uploads))
}

#[utoipa::path(
    post,
    path = "/submitData",
    responses(
        (status = 200, description = "Submission outcome; state 0 carries the rejection reason", body = Outcome),
        (status = 400, description = "Malformed multipart or JSON payload"),
        (status = 413, description = "A photo exceeds the per-file size limit")
    )
)]
pub async fn submit_data(
    state: web::Data<AppState>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let (data, uploads) = read_submission(&mut payload).await?;
    let outcome = state.workflow.submit(data, uploads).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[utoipa::path(
    patch,
    path = "/submitData/{id}",
    params(("id" = Id, Path, description = "Mountain pass id")),
    responses(
        (status = 200, description = "Edit outcome; success carries the replacement id", body = Outcome),
        (status = 400, description = "Malformed multipart or JSON payload")
    )
)]
pub async fn edit_data_by_id(
    state: web::Data<AppState>,
    path: web::Path<Id>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    let (data, uploads) = read_submission(&mut payload).await?;
    let outcome = state.workflow.edit(path.into_inner(), data, uploads).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

#[utoipa::path(
    get,
    path = "/submitData/{id}",
    params(("id" = Id, Path, description = "Mountain pass id")),
    responses(
        (status = 200, description = "Expanded record, or a state-0 not-found body", body = MountainPassView)
    )
)]
pub async fn get_data_by_id(
    state: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    match state.query.get_by_id(path.into_inner()).await? {
        Some(view) => Ok(HttpResponse::Ok().json(view)),
        None => Ok(HttpResponse::Ok().json(Outcome::rejected("Data not found"))),
    }
}

#[derive(serde::Deserialize)]
pub struct ByEmailQuery {
    #[serde(rename = "user__email")]
    pub user_email: String,
}

#[utoipa::path(
    get,
    path = "/submitData",
    params(("user__email" = String, Query, description = "Submitter email")),
    responses(
        (status = 200, description = "Expanded records for the submitter, or a state-0 not-found body", body = [MountainPassView])
    )
)]
pub async fn get_data_by_email(
    state: web::Data<AppState>,
    query: web::Query<ByEmailQuery>,
) -> Result<HttpResponse, ApiError> {
    let views = state.query.get_by_email(&query.user_email).await?;
    if views.is_empty() {
        return Ok(HttpResponse::Ok().json(Outcome::rejected("Data not found")));
    }
    Ok(HttpResponse::Ok().json(views))
}

/// Serve a stored photo binary by its storage name (`<id-hex>.<ext>`).
pub async fn get_photo(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    match state.photos.load(&name).await {
        Ok((bytes, mime)) => Ok(HttpResponse::Ok()
            .insert_header(("Content-Type", mime))
            .body(bytes)),
        Err(PhotoStoreError::NotFound) | Err(PhotoStoreError::BadName(_)) => {
            Err(ApiError::NotFound)
        }
        Err(e) => {
            log::error!("photo store load error: {e}");
            Err(ApiError::Internal)
        }
    }
}
