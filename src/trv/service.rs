use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    db::{
        models::{NewTrv, Schedule, Trv, TrvPatch},
        RecordStore, Stores,
    },
    error::{Result, ServiceError},
    validation::{self, Field, FieldKind},
};

const CREATE_FIELDS: &[Field] = &[
    Field::required("name", FieldKind::String),
    Field::required("currentTemperature", FieldKind::Number),
    Field::required("ambientTemperature", FieldKind::Integer),
    Field::optional("targetTemperature", FieldKind::Integer),
    Field::optional("metadata", FieldKind::Object),
];

const UPDATE_FIELDS: &[Field] = &[
    Field::optional("id", FieldKind::String),
    Field::optional("serialId", FieldKind::String),
    Field::optional("name", FieldKind::String),
    Field::optional("currentTemperature", FieldKind::Number),
    Field::optional("targetTemperature", FieldKind::Integer),
    Field::optional("ambientTemperature", FieldKind::Integer),
    Field::optional("active", FieldKind::Boolean),
    Field::optional("activeSchedules", FieldKind::IdArray),
    Field::optional("metadata", FieldKind::Object),
];

const TARGET_FIELDS: &[Field] = &[Field::required("targetTemperature", FieldKind::Integer)];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetTemperature {
    target_temperature: i64,
}

/// TRV request handling on top of the TRV store.
///
/// Also holds the schedule store so that deleting a TRV can detach it from
/// every schedule that references it.
#[derive(Debug, Clone)]
pub struct TrvService {
    trvs: Arc<RecordStore<Trv>>,
    schedules: Arc<RecordStore<Schedule>>,
}

impl TrvService {
    pub fn new(stores: &Stores) -> Self {
        Self {
            trvs: stores.trvs.clone(),
            schedules: stores.schedules.clone(),
        }
    }

    pub async fn create(&self, body: Option<Value>) -> Result<Trv> {
        let body = validation::require_object(body)?;
        validation::check_body_id(&body, None)?;
        let input: NewTrv = validation::decode("trv", body, CREATE_FIELDS)?;

        let trv = Trv::new(input);
        validation::ensure_valid("trv", trv.violations())?;

        let created = self.trvs.create(&trv).await?;
        info!(trv_id = %created.id, serial_id = %created.serial_id, "TRV created");
        Ok(created)
    }

    /// Every TRV, sorted by id ascending.
    pub async fn list(&self) -> Result<Vec<Trv>> {
        let mut trvs = self.trvs.list().await?;
        trvs.sort_by_key(|t| t.id);
        Ok(trvs)
    }

    pub async fn get(&self, id: Uuid) -> Result<Trv> {
        Ok(self.trvs.get(id).await?)
    }

    /// Merge the body over the stored TRV.
    ///
    /// `id` and `serialId` may be echoed back but never changed.
    pub async fn update(&self, id: Uuid, body: Option<Value>) -> Result<Trv> {
        let body = validation::require_object(body)?;
        validation::check_body_id(&body, Some(id))?;
        let serial_id = body.get("serialId").and_then(Value::as_str).map(str::to_owned);
        let patch: TrvPatch = validation::decode("trv", body, UPDATE_FIELDS)?;

        let updated = self
            .trvs
            .update(id, |trv| {
                if let Some(serial_id) = serial_id.filter(|s| *s != trv.serial_id) {
                    return Err(ServiceError::Conflict(format!(
                        "serialId {serial_id} does not match stored serialId {}",
                        trv.serial_id
                    )));
                }
                patch.merge_into(trv);
                validation::ensure_valid("trv", trv.violations())
            })
            .await?;

        info!(trv_id = %id, "TRV updated");
        Ok(updated)
    }

    /// Delete the TRV, then drop it from every schedule's `trvsAppliedOn`.
    ///
    /// The delete stands once the record is gone; detach failures are only
    /// logged.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        self.trvs.delete(id).await?;
        info!(trv_id = %id, "TRV deleted");

        let schedules = match self.schedules.list().await {
            Ok(schedules) => schedules,
            Err(e) => {
                warn!(trv_id = %id, error = %e, "Failed to list schedules; TRV not detached");
                return Ok(());
            }
        };

        for schedule in schedules {
            if !schedule.applies_to(id) {
                continue;
            }
            let detached = self
                .schedules
                .update(schedule.id, |s| {
                    s.trvs_applied_on.retain(|t| *t != id);
                    Ok::<_, ServiceError>(())
                })
                .await;
            match detached {
                Ok(_) => debug!(trv_id = %id, schedule_id = %schedule.id, "TRV detached from schedule"),
                Err(e) => warn!(
                    trv_id = %id,
                    schedule_id = %schedule.id,
                    error = %e,
                    "Failed to detach TRV from schedule"
                ),
            }
        }
        Ok(())
    }

    pub async fn is_active(&self, id: Uuid) -> Result<bool> {
        Ok(self.get(id).await?.active)
    }

    /// `currentTemperature` rounded to one decimal place.
    pub async fn current_temperature(&self, id: Uuid) -> Result<f64> {
        Ok(self.get(id).await?.rounded_current_temperature())
    }

    /// Overwrite only `targetTemperature`.
    pub async fn set_target_temperature(&self, id: Uuid, body: Option<Value>) -> Result<Trv> {
        let body = validation::require_object(body)?;
        let TargetTemperature { target_temperature } =
            validation::decode("temperature", body, TARGET_FIELDS)?;

        let updated = self
            .trvs
            .update(id, |trv| {
                TrvPatch::target_temperature(target_temperature).merge_into(trv);
                Ok::<_, ServiceError>(())
            })
            .await?;

        info!(trv_id = %id, target_temperature, "TRV target temperature set");
        Ok(updated)
    }

    /// Add `schedule_id` to the TRV's `activeSchedules`.
    /// Returns `false` if it was already present.
    pub async fn register_schedule(&self, trv_id: Uuid, schedule_id: Uuid) -> Result<bool> {
        let mut added = false;
        self.trvs
            .update(trv_id, |trv| {
                added = trv.register_schedule(schedule_id);
                Ok::<_, ServiceError>(())
            })
            .await?;

        debug!(trv_id = %trv_id, schedule_id = %schedule_id, added, "Schedule registered on TRV");
        Ok(added)
    }

    /// Remove `schedule_id` from the TRV's `activeSchedules`.
    /// Returns `false` if it was not present.
    pub async fn unregister_schedule(&self, trv_id: Uuid, schedule_id: Uuid) -> Result<bool> {
        let mut removed = false;
        self.trvs
            .update(trv_id, |trv| {
                removed = trv.unregister_schedule(schedule_id);
                Ok::<_, ServiceError>(())
            })
            .await?;

        debug!(trv_id = %trv_id, schedule_id = %schedule_id, removed, "Schedule unregistered from TRV");
        Ok(removed)
    }

    /// Drive a TRV from the activity checker: `Some(target)` activates it at
    /// that setpoint, `None` deactivates it. Returns whether anything changed.
    pub async fn apply_setpoint(&self, id: Uuid, target: Option<i64>) -> Result<bool> {
        let mut changed = false;
        self.trvs
            .update(id, |trv| {
                changed = !trv.at_setpoint(target);
                trv.active = target.is_some();
                if let Some(t) = target {
                    trv.target_temperature = t;
                }
                Ok::<_, ServiceError>(())
            })
            .await?;

        if changed {
            info!(trv_id = %id, target_temperature = ?target, active = target.is_some(), "TRV setpoint applied");
        }
        Ok(changed)
    }
}
