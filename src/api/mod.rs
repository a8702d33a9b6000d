pub mod auth;
pub mod dto;
pub mod errors;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_axum::router::OpenApiRouter;

use crate::{schedule::ScheduleService, trv::TrvService};
use auth::Credentials;
use handlers::ApiDoc;

#[derive(Debug, Clone)]
pub struct AppState {
    pub trvs: TrvService,
    pub schedules: ScheduleService,
}

/// `/api/v1` behind Basic auth; `/health` and the OpenAPI document open.
pub fn router(state: AppState, credentials: Credentials) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(ApiDoc::openapi())
        .route(
            "/api/v1/trv",
            post(handlers::create_trv).get(handlers::list_trvs),
        )
        .route(
            "/api/v1/trv/{id}",
            get(handlers::get_trv)
                .put(handlers::update_trv)
                .delete(handlers::delete_trv),
        )
        .route("/api/v1/trv/{id}/isActive", get(handlers::get_trv_activity))
        .route(
            "/api/v1/trv/{id}/temperature",
            get(handlers::get_trv_temperature).put(handlers::set_trv_target_temperature),
        )
        .route("/api/v1/trv/{id}/info", get(handlers::get_trv_info))
        .route(
            "/api/v1/schedule",
            post(handlers::create_schedule).get(handlers::list_schedules),
        )
        .route(
            "/api/v1/schedule/{id}",
            get(handlers::get_schedule)
                .put(handlers::update_schedule)
                .delete(handlers::delete_schedule),
        )
        .with_state(state)
        .split_for_parts();

    router
        .route_layer(middleware::from_fn_with_state(
            Arc::new(credentials),
            auth::require_basic_auth,
        ))
        .route("/health", get(handlers::health))
        .route(
            "/api-docs/openapi.json",
            get(move || async move { axum::Json(api) }),
        )
}
