//! Decide which schedule windows are active at a given time of day and which
//! setpoint each TRV should be driven to.

use std::collections::BTreeMap;

use tracing::warn;
use uuid::Uuid;

use crate::{db::models::Schedule, schedule::window::ClockTime};

/// One active window of one schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub schedule_id: Uuid,
    pub window_index: usize,
    pub target_temperature: i64,
    pub trv_ids: Vec<Uuid>,
}

/// The activation that won control of a TRV.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setpoint {
    pub schedule_id: Uuid,
    pub window_index: usize,
    pub target_temperature: i64,
}

/// Every window active at `now`, ordered by schedule id then window index.
///
/// Windows are half-open: active iff `start <= now < end`. A window that
/// does not parse is skipped and logged.
pub fn evaluate(now: ClockTime, schedules: &[Schedule]) -> Vec<Activation> {
    let mut ordered: Vec<&Schedule> = schedules.iter().collect();
    ordered.sort_by_key(|s| s.id);

    let mut activations = Vec::new();
    for schedule in ordered {
        for index in 0..schedule.window_count() {
            let window = match schedule.window(index) {
                Ok(window) => window,
                Err(e) => {
                    warn!(schedule_id = %schedule.id, window = index, error = %e, "Skipping malformed window");
                    continue;
                }
            };
            let Some(&target_temperature) = schedule.target_temperature.get(index) else {
                warn!(schedule_id = %schedule.id, window = index, "Skipping window without a target temperature");
                continue;
            };

            if window.contains(now) {
                activations.push(Activation {
                    schedule_id: schedule.id,
                    window_index: index,
                    target_temperature,
                    trv_ids: schedule.trvs_applied_on.clone(),
                });
            }
        }
    }
    activations
}

/// Resolve overlapping activations to one setpoint per TRV.
///
/// The highest target temperature wins; ties go to the lowest schedule id,
/// then the lowest window index.
pub fn resolve(activations: &[Activation]) -> BTreeMap<Uuid, Setpoint> {
    let mut setpoints: BTreeMap<Uuid, Setpoint> = BTreeMap::new();

    for activation in activations {
        let candidate = Setpoint {
            schedule_id: activation.schedule_id,
            window_index: activation.window_index,
            target_temperature: activation.target_temperature,
        };
        for &trv_id in &activation.trv_ids {
            setpoints
                .entry(trv_id)
                .and_modify(|current| {
                    if beats(&candidate, current) {
                        *current = candidate;
                    }
                })
                .or_insert(candidate);
        }
    }
    setpoints
}

fn beats(candidate: &Setpoint, current: &Setpoint) -> bool {
    let rank = |s: &Setpoint| {
        (
            std::cmp::Reverse(s.target_temperature),
            s.schedule_id,
            s.window_index,
        )
    };
    rank(candidate) < rank(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewSchedule;

    fn at(raw: &str) -> ClockTime {
        ClockTime::parse(raw).unwrap()
    }

    fn schedule(windows: &[(&str, &str, i64)], trvs: &[Uuid]) -> Schedule {
        Schedule::new(NewSchedule {
            name: "test".into(),
            target_temperature: windows.iter().map(|w| w.2).collect(),
            start_time: windows.iter().map(|w| w.0.to_owned()).collect(),
            end_time: windows.iter().map(|w| w.1.to_owned()).collect(),
            trvs_applied_on: trvs.to_vec(),
        })
    }

    #[test]
    fn no_schedules_no_activations() {
        assert!(evaluate(at("12:00"), &[]).is_empty());
    }

    #[test]
    fn window_bounds_are_half_open() {
        let trv = Uuid::new_v4();
        let s = schedule(&[("09:00", "17:00", 21)], &[trv]);
        let schedules = [s.clone()];

        let active = evaluate(at("09:00"), &schedules);
        assert_eq!(
            active,
            vec![Activation {
                schedule_id: s.id,
                window_index: 0,
                target_temperature: 21,
                trv_ids: vec![trv],
            }]
        );
        assert!(evaluate(at("08:59"), &schedules).is_empty());
        assert_eq!(evaluate(at("16:59"), &schedules).len(), 1);
        assert!(evaluate(at("17:00"), &schedules).is_empty());
    }

    #[test]
    fn minutes_are_compared_with_hours() {
        let s = schedule(&[("09:45", "17:00", 20)], &[]);
        assert_eq!(evaluate(at("10:15"), &[s.clone()]).len(), 1);
        assert!(evaluate(at("09:50"), &[schedule(&[("10:15", "11:00", 20)], &[])]).is_empty());
    }

    #[test]
    fn only_matching_window_of_a_schedule_is_active() {
        let s = schedule(&[("06:00", "08:30", 21), ("17:00", "22:00", 19)], &[]);
        let active = evaluate(at("18:00"), &[s]);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].window_index, 1);
        assert_eq!(active[0].target_temperature, 19);
    }

    #[test]
    fn malformed_windows_are_skipped() {
        let mut s = schedule(&[("06:00", "08:30", 21), ("09:00", "12:00", 18)], &[]);
        s.start_time[0] = "6am".into();
        s.target_temperature.truncate(1);

        // Window 0 fails to parse, window 1 has no target.
        assert!(evaluate(at("07:00"), &[s.clone()]).is_empty());
        assert!(evaluate(at("10:00"), &[s]).is_empty());
    }

    #[test]
    fn highest_target_wins_overlap() {
        let trv = Uuid::new_v4();
        let warm = schedule(&[("06:00", "09:00", 22)], &[trv]);
        let cool = schedule(&[("07:00", "10:00", 18)], &[trv]);

        let setpoints = resolve(&evaluate(at("08:00"), &[cool, warm.clone()]));
        assert_eq!(setpoints[&trv].target_temperature, 22);
        assert_eq!(setpoints[&trv].schedule_id, warm.id);
    }

    #[test]
    fn ties_go_to_lowest_schedule_id() {
        let trv = Uuid::new_v4();
        let a = schedule(&[("06:00", "09:00", 20)], &[trv]);
        let b = schedule(&[("06:00", "09:00", 20)], &[trv]);
        let lowest = a.id.min(b.id);

        let setpoints = resolve(&evaluate(at("07:00"), &[a, b]));
        assert_eq!(setpoints[&trv].schedule_id, lowest);
    }

    #[test]
    fn resolve_covers_every_referenced_trv() {
        let (t1, t2, t3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let a = schedule(&[("06:00", "09:00", 20)], &[t1, t2]);
        let b = schedule(&[("12:00", "13:00", 25)], &[t3]);

        let setpoints = resolve(&evaluate(at("07:00"), &[a, b]));
        assert_eq!(setpoints.len(), 2);
        assert!(setpoints.contains_key(&t1));
        assert!(setpoints.contains_key(&t2));
        assert!(!setpoints.contains_key(&t3));
    }
}
