use actix_web::{
    get, post,
    web::{scope, Data, Path, Query, ServiceConfig},
    HttpResponse, Responder,
};
use actix_web_validator::Json;
use serde::Deserialize;

use super::models::SubjectCreate;
use super::SubjectService;
use crate::api::error::ServiceError;

#[derive(Deserialize)]
struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[post("")]
async fn create_subject(
    service: Data<SubjectService>,
    payload: Json<SubjectCreate>,
) -> Result<impl Responder, ServiceError> {
    let response = service.create(&payload).await?;
    Ok(HttpResponse::Created().json(response))
}

#[get("")]
async fn list_subjects(
    service: Data<SubjectService>,
    page: Query<PageQuery>,
) -> Result<impl Responder, ServiceError> {
    let limit = page.limit.unwrap_or(50).clamp(1, 200);
    let offset = page.offset.unwrap_or(0).max(0);
    let rows = service.list(limit, offset).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[get("/{id}")]
async fn get_subject(
    service: Data<SubjectService>,
    id: Path<i32>,
) -> Result<impl Responder, ServiceError> {
    let row = service.get(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(row))
}

/// Re-run the credential check against the live portal
#[post("/{id}/verify")]
async fn verify_subject(
    service: Data<SubjectService>,
    id: Path<i32>,
) -> Result<impl Responder, ServiceError> {
    let response = service.verify(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

pub fn subject_config(config: &mut ServiceConfig) {
    config.service(
        scope("subjects")
            .service(create_subject)
            .service(list_subjects)
            .service(get_subject)
            .service(verify_subject),
    );
}
