use actix_web::{
    get, post,
    web::{Data, Path, Query, ServiceConfig, scope},
    HttpResponse,
};
use actix_web_validator::Json;

use super::dto::{JobDetailResponse, JobListResponse, JobResponse};
use super::models::{ListJobsQuery, ReasonRequest, SubmitJobRequest};
use super::service::{JobService, ServiceError};

#[post("")]
async fn submit_job(
    service: Data<JobService>,
    req: Json<SubmitJobRequest>,
) -> Result<HttpResponse, ServiceError> {
    let job = service.submit(req.into_inner()).await?;
    Ok(HttpResponse::Created().json(JobResponse {
        message: "Job created successfully".to_string(),
        job,
    }))
}

#[post("/{database}/{id}/pause")]
async fn pause_job(
    service: Data<JobService>,
    path: Path<(String, i64)>,
    req: Json<ReasonRequest>,
) -> Result<HttpResponse, ServiceError> {
    let (database, id) = path.into_inner();
    let job = service.pause(&database, id, &req.reason).await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Job paused".to_string(),
        job,
    }))
}

#[post("/{database}/{id}/resume")]
async fn resume_job(
    service: Data<JobService>,
    path: Path<(String, i64)>,
) -> Result<HttpResponse, ServiceError> {
    let (database, id) = path.into_inner();
    let job = service.resume(&database, id).await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Job resumed".to_string(),
        job,
    }))
}

#[post("/{database}/{id}/cancel")]
async fn cancel_job(
    service: Data<JobService>,
    path: Path<(String, i64)>,
    req: Json<ReasonRequest>,
) -> Result<HttpResponse, ServiceError> {
    let (database, id) = path.into_inner();
    let job = service.cancel(&database, id, &req.reason).await?;
    Ok(HttpResponse::Ok().json(JobResponse {
        message: "Job cancelled".to_string(),
        job,
    }))
}

#[get("/{database}/{id}")]
async fn job_status(
    service: Data<JobService>,
    path: Path<(String, i64)>,
) -> Result<HttpResponse, ServiceError> {
    let (database, id) = path.into_inner();
    let (job, messages, errors) = service.get_status(&database, id).await?;
    Ok(HttpResponse::Ok().json(JobDetailResponse {
        job,
        messages,
        errors,
    }))
}

#[get("/{database}")]
async fn list_jobs(
    service: Data<JobService>,
    path: Path<String>,
    query: Query<ListJobsQuery>,
) -> Result<HttpResponse, ServiceError> {
    let database = path.into_inner();
    let jobs = service.list(&database, query.table.as_deref()).await?;
    Ok(HttpResponse::Ok().json(JobListResponse { jobs }))
}

pub fn job_config(config: &mut ServiceConfig) {
    config.service(
        scope("jobs")
            .service(submit_job)
            .service(pause_job)
            .service(resume_job)
            .service(cancel_job)
            .service(job_status)
            .service(list_jobs),
    );
}
