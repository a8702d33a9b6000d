use std::{sync::Arc, time::Duration};

use chrono::Local;
use tokio::{
    sync::Mutex,
    time::{self, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use super::evaluator;
use crate::{
    schedule::{window::ClockTime, ScheduleService},
    trv::TrvService,
};

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub active_windows: usize,
    pub activated: usize,
    pub deactivated: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Completed(TickReport),
    /// Another tick was still running.
    Skipped,
    Failed,
}

/// Periodically applies active schedule windows to TRVs.
#[derive(Clone)]
pub struct ActivityChecker {
    schedules: ScheduleService,
    trvs: TrvService,
    interval: Duration,
    in_flight: Arc<Mutex<()>>,
}

impl ActivityChecker {
    pub fn new(schedules: ScheduleService, trvs: TrvService, interval: Duration) -> Self {
        Self {
            schedules,
            trvs,
            interval,
            in_flight: Arc::new(Mutex::new(())),
        }
    }

    /// Runs the checker indefinitely.
    /// Spawn this via `tokio::spawn`.
    pub async fn run(self) {
        info!(interval_ms = self.interval.as_millis() as u64, "Activity checker started");
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// One pass at the current local wall-clock time. Failures are logged and
    /// swallowed.
    pub async fn tick(&self) -> Tick {
        let Ok(_guard) = self.in_flight.try_lock() else {
            warn!("Previous activity check still running; skipping tick");
            return Tick::Skipped;
        };

        let now = ClockTime::from(Local::now().time());
        match self.run_once(now).await {
            Ok(report) => Tick::Completed(report),
            Err(e) => {
                error!(error = %e, "Activity check failed");
                Tick::Failed
            }
        }
    }

    async fn run_once(&self, now: ClockTime) -> anyhow::Result<TickReport> {
        let schedules = self.schedules.list().await?;
        if schedules.is_empty() {
            debug!("No schedules stored");
        }

        let activations = evaluator::evaluate(now, &schedules);
        let setpoints = evaluator::resolve(&activations);
        let mut report = TickReport {
            active_windows: activations.len(),
            ..TickReport::default()
        };

        for trv in self.trvs.list().await? {
            let target = setpoints.get(&trv.id).map(|s| s.target_temperature);
            if trv.at_setpoint(target) {
                continue;
            }

            match self.trvs.apply_setpoint(trv.id, target).await {
                Ok(false) => {}
                Ok(true) if target.is_some() => report.activated += 1,
                Ok(true) => report.deactivated += 1,
                Err(e) => {
                    warn!(trv_id = %trv.id, error = %e, "Failed to apply setpoint");
                    report.failed += 1;
                }
            }
        }

        debug!(
            now = %now,
            active_windows = report.active_windows,
            activated = report.activated,
            deactivated = report.deactivated,
            failed = report.failed,
            "Activity check complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;
    use uuid::Uuid;

    use super::*;
    use crate::{db::models::Trv, test_support::services};

    async fn setup(tmp: &TempDir) -> (ActivityChecker, TrvService, ScheduleService) {
        let (trvs, schedules) = services(tmp).await;
        let checker = ActivityChecker::new(schedules.clone(), trvs.clone(), Duration::from_secs(1));
        (checker, trvs, schedules)
    }

    async fn trv(trvs: &TrvService) -> Trv {
        trvs.create(Some(json!({
            "name": "Bedroom",
            "currentTemperature": 18.2,
            "ambientTemperature": 16,
        })))
        .await
        .unwrap()
    }

    async fn office_hours(schedules: &ScheduleService, target: i64, trv_ids: &[Uuid]) {
        schedules
            .create(Some(json!({
                "name": "office hours",
                "targetTemperature": [target],
                "startTime": ["09:00"],
                "endTime": ["17:00"],
                "trvsAppliedOn": trv_ids.iter().map(Uuid::to_string).collect::<Vec<_>>(),
            })))
            .await
            .unwrap();
    }

    fn at(raw: &str) -> ClockTime {
        ClockTime::parse(raw).unwrap()
    }

    #[tokio::test]
    async fn no_schedules_is_a_quiet_tick() {
        let tmp = TempDir::new().unwrap();
        let (checker, trvs, _) = setup(&tmp).await;
        trv(&trvs).await;

        let report = checker.run_once(at("12:00")).await.unwrap();
        assert_eq!(report, TickReport::default());
    }

    #[tokio::test]
    async fn active_window_drives_trv() {
        let tmp = TempDir::new().unwrap();
        let (checker, trvs, schedules) = setup(&tmp).await;
        let t = trv(&trvs).await;
        office_hours(&schedules, 21, &[t.id]).await;

        let report = checker.run_once(at("09:00")).await.unwrap();
        assert_eq!(report.active_windows, 1);
        assert_eq!(report.activated, 1);

        let driven = trvs.get(t.id).await.unwrap();
        assert!(driven.active);
        assert_eq!(driven.target_temperature, 21);
    }

    #[tokio::test]
    async fn steady_state_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let (checker, trvs, schedules) = setup(&tmp).await;
        let t = trv(&trvs).await;
        office_hours(&schedules, 21, &[t.id]).await;

        checker.run_once(at("10:00")).await.unwrap();
        let report = checker.run_once(at("10:01")).await.unwrap();
        assert_eq!(report.activated, 0);
        assert_eq!(report.deactivated, 0);
    }

    #[tokio::test]
    async fn window_end_deactivates_trv() {
        let tmp = TempDir::new().unwrap();
        let (checker, trvs, schedules) = setup(&tmp).await;
        let t = trv(&trvs).await;
        office_hours(&schedules, 21, &[t.id]).await;

        checker.run_once(at("16:59")).await.unwrap();
        let report = checker.run_once(at("17:00")).await.unwrap();
        assert_eq!(report.deactivated, 1);
        assert!(!trvs.get(t.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn overlap_applies_highest_target() {
        let tmp = TempDir::new().unwrap();
        let (checker, trvs, schedules) = setup(&tmp).await;
        let t = trv(&trvs).await;
        office_hours(&schedules, 19, &[t.id]).await;
        office_hours(&schedules, 23, &[t.id]).await;

        checker.run_once(at("12:00")).await.unwrap();
        assert_eq!(trvs.get(t.id).await.unwrap().target_temperature, 23);
    }

    #[tokio::test]
    async fn unreferenced_trv_stays_inactive() {
        let tmp = TempDir::new().unwrap();
        let (checker, trvs, schedules) = setup(&tmp).await;
        let driven = trv(&trvs).await;
        let idle = trv(&trvs).await;
        office_hours(&schedules, 21, &[driven.id]).await;

        checker.run_once(at("12:00")).await.unwrap();
        assert!(!trvs.get(idle.id).await.unwrap().active);
    }

    #[tokio::test]
    async fn tick_is_skipped_while_another_runs() {
        let tmp = TempDir::new().unwrap();
        let (checker, _, _) = setup(&tmp).await;

        let held = checker.in_flight.clone().lock_owned().await;
        assert_eq!(checker.tick().await, Tick::Skipped);

        drop(held);
        assert!(matches!(checker.tick().await, Tick::Completed(_)));
    }

    #[tokio::test]
    async fn storage_failure_is_swallowed() {
        let tmp = TempDir::new().unwrap();
        let (checker, _, _) = setup(&tmp).await;
        std::fs::write(
            tmp.path().join(crate::db::SCHEDULE_DIR).join(format!("{}.json", Uuid::new_v4())),
            b"not json",
        )
        .unwrap();

        assert_eq!(checker.tick().await, Tick::Failed);
        assert!(matches!(checker.tick().await, Tick::Failed));
    }
}
