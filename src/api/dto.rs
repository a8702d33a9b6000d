use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::db::models::Trv;

/// Response of `GET /trv/{id}/isActive`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TrvActivityDto {
    pub active: bool,
}

/// Response of `GET /trv/{id}/temperature`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrvTemperatureDto {
    /// Rounded to one decimal place.
    pub current_temperature: f64,
}

/// Response of `GET /trv/{id}/info`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrvInfoDto {
    pub id: Uuid,
    pub current_temperature: f64,
    pub target_temperature: i64,
    pub active: bool,
    /// When the request was served.
    pub timestamp: DateTime<Utc>,
}

/// Response of `GET /health`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthDto {
    pub status: String,
    pub name: String,
    pub version: String,
    pub time: DateTime<Utc>,
}

/// Request body for `PUT /trv/{id}/temperature`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TargetTemperatureRequest {
    pub target_temperature: i64,
}

impl TrvInfoDto {
    pub fn new(trv: &Trv, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: trv.id,
            current_temperature: trv.rounded_current_temperature(),
            target_temperature: trv.target_temperature,
            active: trv.active,
            timestamp,
        }
    }
}

impl HealthDto {
    pub fn ok(time: DateTime<Utc>) -> Self {
        Self {
            status: "ok".to_owned(),
            name: env!("CARGO_PKG_NAME").to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
            time,
        }
    }
}
