use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use utoipa::OpenApi;

use super::{
    dto::{HealthDto, TargetTemperatureRequest, TrvActivityDto, TrvInfoDto, TrvTemperatureDto},
    errors::{AppError, ErrorBody},
    AppState,
};
use crate::{
    db::models::{NewSchedule, NewTrv, Schedule, SchedulePatch, Trv, TrvPatch},
    validation,
};

// ---------------------------------------------------------------------------
// TRV
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/api/v1/trv",
    request_body = NewTrv,
    responses(
        (status = 201, description = "TRV created", body = Trv),
        (status = 400, description = "Invalid body", body = ErrorBody),
        (status = 401, description = "Missing or wrong credentials", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody),
    ),
    tag = "trv"
)]
pub async fn create_trv(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Trv>), AppError> {
    let trv = state.trvs.create(validation::parse_body(&body)?).await?;
    Ok((StatusCode::CREATED, Json(trv)))
}

/// All TRVs, sorted by id ascending.
#[utoipa::path(
    get,
    path = "/api/v1/trv",
    responses(
        (status = 200, description = "Every TRV", body = Vec<Trv>),
        (status = 500, description = "Internal server error", body = ErrorBody),
    ),
    tag = "trv"
)]
pub async fn list_trvs(State(state): State<AppState>) -> Result<Json<Vec<Trv>>, AppError> {
    Ok(Json(state.trvs.list().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/trv/{id}",
    params(("id" = String, Path, description = "TRV id")),
    responses(
        (status = 200, description = "The TRV", body = Trv),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 404, description = "No such TRV", body = ErrorBody),
    ),
    tag = "trv"
)]
pub async fn get_trv(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Trv>, AppError> {
    let id = validation::parse_id(&id)?;
    Ok(Json(state.trvs.get(id).await?))
}

/// Merge the body over the stored TRV. Omitted fields keep their values.
#[utoipa::path(
    put,
    path = "/api/v1/trv/{id}",
    params(("id" = String, Path, description = "TRV id")),
    request_body = TrvPatch,
    responses(
        (status = 200, description = "Updated TRV", body = Trv),
        (status = 400, description = "Invalid body or id", body = ErrorBody),
        (status = 404, description = "No such TRV", body = ErrorBody),
        (status = 409, description = "Body id or serialId differs from the stored TRV", body = ErrorBody),
    ),
    tag = "trv"
)]
pub async fn update_trv(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Trv>, AppError> {
    let id = validation::parse_id(&id)?;
    let trv = state.trvs.update(id, validation::parse_body(&body)?).await?;
    Ok(Json(trv))
}

#[utoipa::path(
    delete,
    path = "/api/v1/trv/{id}",
    params(("id" = String, Path, description = "TRV id")),
    responses(
        (status = 204, description = "TRV deleted"),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 404, description = "No such TRV", body = ErrorBody),
    ),
    tag = "trv"
)]
pub async fn delete_trv(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = validation::parse_id(&id)?;
    state.trvs.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/v1/trv/{id}/isActive",
    params(("id" = String, Path, description = "TRV id")),
    responses(
        (status = 200, description = "Whether a schedule currently drives the TRV", body = TrvActivityDto),
        (status = 404, description = "No such TRV", body = ErrorBody),
    ),
    tag = "trv"
)]
pub async fn get_trv_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TrvActivityDto>, AppError> {
    let id = validation::parse_id(&id)?;
    let active = state.trvs.is_active(id).await?;
    Ok(Json(TrvActivityDto { active }))
}

#[utoipa::path(
    get,
    path = "/api/v1/trv/{id}/temperature",
    params(("id" = String, Path, description = "TRV id")),
    responses(
        (status = 200, description = "Current temperature, one decimal place", body = TrvTemperatureDto),
        (status = 404, description = "No such TRV", body = ErrorBody),
    ),
    tag = "trv"
)]
pub async fn get_trv_temperature(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TrvTemperatureDto>, AppError> {
    let id = validation::parse_id(&id)?;
    let current_temperature = state.trvs.current_temperature(id).await?;
    Ok(Json(TrvTemperatureDto { current_temperature }))
}

/// Set only `targetTemperature`.
#[utoipa::path(
    put,
    path = "/api/v1/trv/{id}/temperature",
    params(("id" = String, Path, description = "TRV id")),
    request_body = TargetTemperatureRequest,
    responses(
        (status = 200, description = "Updated TRV", body = Trv),
        (status = 400, description = "Invalid body or id", body = ErrorBody),
        (status = 404, description = "No such TRV", body = ErrorBody),
    ),
    tag = "trv"
)]
pub async fn set_trv_target_temperature(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Trv>, AppError> {
    let id = validation::parse_id(&id)?;
    let trv = state
        .trvs
        .set_target_temperature(id, validation::parse_body(&body)?)
        .await?;
    Ok(Json(trv))
}

#[utoipa::path(
    get,
    path = "/api/v1/trv/{id}/info",
    params(("id" = String, Path, description = "TRV id")),
    responses(
        (status = 200, description = "Snapshot of the TRV state", body = TrvInfoDto),
        (status = 404, description = "No such TRV", body = ErrorBody),
    ),
    tag = "trv"
)]
pub async fn get_trv_info(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TrvInfoDto>, AppError> {
    let id = validation::parse_id(&id)?;
    let trv = state.trvs.get(id).await?;
    Ok(Json(TrvInfoDto::new(&trv, Utc::now())))
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// Create a schedule and register it on every TRV in `trvsAppliedOn`.
/// Nothing is kept if any registration fails.
#[utoipa::path(
    post,
    path = "/api/v1/schedule",
    request_body = NewSchedule,
    responses(
        (status = 201, description = "Schedule created", body = Schedule),
        (status = 400, description = "Invalid body or unknown TRV", body = ErrorBody),
        (status = 500, description = "Internal server error", body = ErrorBody),
    ),
    tag = "schedule"
)]
pub async fn create_schedule(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Schedule>), AppError> {
    let schedule = state.schedules.create(validation::parse_body(&body)?).await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

/// All schedules, sorted by id ascending.
#[utoipa::path(
    get,
    path = "/api/v1/schedule",
    responses(
        (status = 200, description = "Every schedule", body = Vec<Schedule>),
        (status = 500, description = "Internal server error", body = ErrorBody),
    ),
    tag = "schedule"
)]
pub async fn list_schedules(
    State(state): State<AppState>,
) -> Result<Json<Vec<Schedule>>, AppError> {
    Ok(Json(state.schedules.list().await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/schedule/{id}",
    params(("id" = String, Path, description = "Schedule id")),
    responses(
        (status = 200, description = "The schedule", body = Schedule),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 404, description = "No such schedule", body = ErrorBody),
    ),
    tag = "schedule"
)]
pub async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Schedule>, AppError> {
    let id = validation::parse_id(&id)?;
    Ok(Json(state.schedules.get(id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/schedule/{id}",
    params(("id" = String, Path, description = "Schedule id")),
    request_body = SchedulePatch,
    responses(
        (status = 200, description = "Updated schedule", body = Schedule),
        (status = 400, description = "Invalid body, id or TRV reference", body = ErrorBody),
        (status = 404, description = "No such schedule", body = ErrorBody),
        (status = 409, description = "Body id differs from the path id", body = ErrorBody),
    ),
    tag = "schedule"
)]
pub async fn update_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Schedule>, AppError> {
    let id = validation::parse_id(&id)?;
    let schedule = state.schedules.update(id, validation::parse_body(&body)?).await?;
    Ok(Json(schedule))
}

#[utoipa::path(
    delete,
    path = "/api/v1/schedule/{id}",
    params(("id" = String, Path, description = "Schedule id")),
    responses(
        (status = 204, description = "Schedule deleted"),
        (status = 400, description = "Malformed id", body = ErrorBody),
        (status = 404, description = "No such schedule", body = ErrorBody),
    ),
    tag = "schedule"
)]
pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = validation::parse_id(&id)?;
    state.schedules.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Liveness plus the package name, version and server time.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthDto),
    ),
    tag = "system"
)]
pub async fn health() -> Json<HealthDto> {
    Json(HealthDto::ok(Utc::now()))
}

// ---------------------------------------------------------------------------
// OpenAPI document
// ---------------------------------------------------------------------------

#[derive(OpenApi)]
#[openapi(
    paths(
        create_trv,
        list_trvs,
        get_trv,
        update_trv,
        delete_trv,
        get_trv_activity,
        get_trv_temperature,
        set_trv_target_temperature,
        get_trv_info,
        create_schedule,
        list_schedules,
        get_schedule,
        update_schedule,
        delete_schedule,
        health,
    ),
    components(schemas(
        Trv,
        NewTrv,
        TrvPatch,
        Schedule,
        NewSchedule,
        SchedulePatch,
        TrvActivityDto,
        TrvTemperatureDto,
        TrvInfoDto,
        TargetTemperatureRequest,
        HealthDto,
        ErrorBody,
    )),
    tags(
        (name = "trv",      description = "Thermostatic radiator valves"),
        (name = "schedule", description = "Daily temperature schedules"),
        (name = "system",   description = "System endpoints"),
    ),
    info(
        title = "TRV Schedule API",
        version = "0.1.0",
        description = "REST API for radiator valves and their heating schedules"
    )
)]
pub struct ApiDoc;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
