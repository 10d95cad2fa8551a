use actix_web::{
    delete, get, post,
    web::{scope, Data, Path, Query, ServiceConfig},
    HttpResponse, Responder,
};
use actix_web_validator::Json;
use serde::Deserialize;

use super::dto::ReScheduleLogsResponse;
use super::models::ReScheduleCreate;
use super::ReScheduleService;
use crate::api::error::ServiceError;

#[derive(Deserialize)]
struct PageQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[post("")]
async fn create_re_schedule(
    service: Data<ReScheduleService>,
    payload: Json<ReScheduleCreate>,
) -> Result<impl Responder, ServiceError> {
    let response = service.create(&payload).await?;
    Ok(HttpResponse::Created().json(response))
}

#[get("")]
async fn list_re_schedules(
    service: Data<ReScheduleService>,
    page: Query<PageQuery>,
) -> Result<impl Responder, ServiceError> {
    let limit = page.limit.unwrap_or(50).clamp(1, 200);
    let offset = page.offset.unwrap_or(0).max(0);
    let rows = service.list(limit, offset).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[get("/{id}")]
async fn get_re_schedule(
    service: Data<ReScheduleService>,
    id: Path<i32>,
) -> Result<impl Responder, ServiceError> {
    let row = service.get(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(row))
}

#[get("/{id}/logs")]
async fn get_re_schedule_logs(
    service: Data<ReScheduleService>,
    id: Path<i32>,
) -> Result<impl Responder, ServiceError> {
    let id = id.into_inner();
    let logs = service.logs(id).await?;
    Ok(HttpResponse::Ok().json(ReScheduleLogsResponse {
        re_schedule_id: id,
        logs,
    }))
}

#[delete("/{id}")]
async fn delete_re_schedule(
    service: Data<ReScheduleService>,
    id: Path<i32>,
) -> Result<impl Responder, ServiceError> {
    service.delete(id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub fn re_schedule_config(config: &mut ServiceConfig) {
    config.service(
        scope("reschedules")
            .service(create_re_schedule)
            .service(list_re_schedules)
            .service(get_re_schedule)
            .service(get_re_schedule_logs)
            .service(delete_re_schedule),
    );
}
