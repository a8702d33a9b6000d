use std::sync::Arc;

use anyhow::anyhow;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    db::{
        models::{NewSchedule, Schedule, SchedulePatch},
        RecordStore, Stores,
    },
    error::{Result, ServiceError},
    trv::TrvService,
    validation::{self, Field, FieldKind},
};

const CREATE_FIELDS: &[Field] = &[
    Field::required("name", FieldKind::String),
    Field::required("targetTemperature", FieldKind::IntegerArray),
    Field::required("startTime", FieldKind::StringArray),
    Field::required("endTime", FieldKind::StringArray),
    Field::required("trvsAppliedOn", FieldKind::IdArray),
];

const UPDATE_FIELDS: &[Field] = &[
    Field::optional("id", FieldKind::String),
    Field::optional("name", FieldKind::String),
    Field::optional("targetTemperature", FieldKind::IntegerArray),
    Field::optional("startTime", FieldKind::StringArray),
    Field::optional("endTime", FieldKind::StringArray),
    Field::optional("trvsAppliedOn", FieldKind::IdArray),
];

/// Schedule request handling, including registration of each schedule on
/// the TRVs it governs.
#[derive(Debug, Clone)]
pub struct ScheduleService {
    schedules: Arc<RecordStore<Schedule>>,
    trvs: TrvService,
}

impl ScheduleService {
    pub fn new(stores: &Stores) -> Self {
        Self {
            schedules: stores.schedules.clone(),
            trvs: TrvService::new(stores),
        }
    }

    /// Persist a new schedule and register it on every TRV in
    /// `trvsAppliedOn`.
    ///
    /// Registrations run concurrently and all of them settle before this
    /// returns. If any fails, the successful ones are undone and the schedule
    /// is deleted again.
    pub async fn create(&self, body: Option<Value>) -> Result<Schedule> {
        let body = validation::require_object(body)?;
        validation::check_body_id(&body, None)?;
        let input: NewSchedule = validation::decode("schedule", body, CREATE_FIELDS)?;

        let schedule = Schedule::new(input);
        validation::ensure_valid("schedule", schedule.violations())?;

        let created = self.schedules.create(&schedule).await?;
        info!(
            schedule_id = %created.id,
            trvs = created.trvs_applied_on.len(),
            "Schedule created"
        );

        if let Err(e) = self.register_all(created.id, &created.trvs_applied_on).await {
            if let Err(rollback) = self.schedules.delete(created.id).await {
                error!(
                    schedule_id = %created.id,
                    error = %rollback,
                    "Failed to delete schedule after registration failure"
                );
            }
            return Err(e);
        }

        Ok(created)
    }

    /// Every schedule, sorted by id ascending.
    pub async fn list(&self) -> Result<Vec<Schedule>> {
        let mut schedules = self.schedules.list().await?;
        schedules.sort_by_key(|s| s.id);
        Ok(schedules)
    }

    pub async fn get(&self, id: Uuid) -> Result<Schedule> {
        Ok(self.schedules.get(id).await?)
    }

    /// Merge the body over the stored schedule.
    ///
    /// TRVs newly added to `trvsAppliedOn` are registered before the write
    /// and TRVs dropped from it are unregistered after it.
    pub async fn update(&self, id: Uuid, body: Option<Value>) -> Result<Schedule> {
        let body = validation::require_object(body)?;
        validation::check_body_id(&body, Some(id))?;
        let patch: SchedulePatch = validation::decode("schedule", body, UPDATE_FIELDS)?;

        let current = self.get(id).await?;
        let mut candidate = current.clone();
        patch.clone().merge_into(&mut candidate);
        validation::ensure_valid("schedule", candidate.violations())?;

        let added: Vec<Uuid> = candidate
            .trvs_applied_on
            .iter()
            .copied()
            .filter(|t| !current.applies_to(*t))
            .collect();
        let dropped: Vec<Uuid> = current
            .trvs_applied_on
            .iter()
            .copied()
            .filter(|t| !candidate.applies_to(*t))
            .collect();

        self.register_all(id, &added).await?;

        let written = self
            .schedules
            .update(id, |s| {
                patch.merge_into(s);
                validation::ensure_valid("schedule", s.violations())
            })
            .await;
        let updated = match written {
            Ok(updated) => updated,
            Err(e) => {
                self.unregister_all(id, &added).await;
                return Err(e);
            }
        };

        self.unregister_all(id, &dropped).await;
        info!(
            schedule_id = %id,
            added = added.len(),
            dropped = dropped.len(),
            "Schedule updated"
        );
        Ok(updated)
    }

    /// Delete the schedule and unregister it from its TRVs.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let schedule = self.get(id).await?;
        self.schedules.delete(id).await?;
        info!(schedule_id = %id, "Schedule deleted");

        self.unregister_all(id, &schedule.trvs_applied_on).await;
        Ok(())
    }

    /// Register `schedule_id` on every TRV in `trv_ids`, all at once.
    ///
    /// On any failure the registrations this call made are undone. Missing
    /// TRVs are reported as a `BadRequest`; anything else is `Unexpected`.
    async fn register_all(&self, schedule_id: Uuid, trv_ids: &[Uuid]) -> Result<()> {
        let outcomes = join_all(trv_ids.iter().map(|&trv_id| async move {
            (trv_id, self.trvs.register_schedule(trv_id, schedule_id).await)
        }))
        .await;

        let mut registered = Vec::new();
        let mut missing = Vec::new();
        let mut failed = Vec::new();
        for (trv_id, outcome) in outcomes {
            match outcome {
                Ok(true) => registered.push(trv_id),
                Ok(false) => {}
                Err(e) if e.is_not_found() => missing.push(trv_id),
                Err(e) => failed.push((trv_id, e)),
            }
        }

        if missing.is_empty() && failed.is_empty() {
            return Ok(());
        }

        warn!(
            schedule_id = %schedule_id,
            missing = missing.len(),
            failed = failed.len(),
            rolled_back = registered.len(),
            "Schedule registration failed; rolling back"
        );
        self.unregister_all(schedule_id, &registered).await;

        if let Some((trv_id, e)) = failed.into_iter().next() {
            return Err(ServiceError::Unexpected(anyhow!(
                "failed to register schedule {schedule_id} on TRV {trv_id}: {e}"
            )));
        }
        Err(ServiceError::invalid(
            "trvsAppliedOn references TRVs that do not exist",
            missing
                .iter()
                .map(|id| format!("TRV {id} does not exist"))
                .collect(),
        ))
    }

    /// Best-effort removal of `schedule_id` from every TRV in `trv_ids`.
    async fn unregister_all(&self, schedule_id: Uuid, trv_ids: &[Uuid]) {
        let outcomes = join_all(trv_ids.iter().map(|&trv_id| async move {
            (trv_id, self.trvs.unregister_schedule(trv_id, schedule_id).await)
        }))
        .await;

        for (trv_id, outcome) in outcomes {
            match outcome {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    debug!(trv_id = %trv_id, schedule_id = %schedule_id, "TRV already gone")
                }
                Err(e) => warn!(
                    trv_id = %trv_id,
                    schedule_id = %schedule_id,
                    error = %e,
                    "Failed to unregister schedule from TRV"
                ),
            }
        }
    }
}
