use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;
use uuid::Uuid;

use super::Record;
use crate::schedule::window::TimeWindow;

pub const SERIAL_PREFIX: &str = "OTRV-";
const SERIAL_LEN: usize = 10;
const SERIAL_ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// ---------------------------------------------------------------------------
// TRV
// ---------------------------------------------------------------------------

/// A thermostatic radiator valve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Trv {
    pub id: Uuid,
    /// `OTRV-` followed by 10 characters from `[0-9A-Z]`.
    pub serial_id: String,
    pub name: String,
    /// Degrees Celsius, last observed.
    pub current_temperature: f64,
    /// Degrees Celsius.
    pub target_temperature: i64,
    /// Degrees Celsius.
    pub ambient_temperature: i64,
    /// True while at least one schedule window drives this TRV.
    pub active: bool,
    /// Ids of the schedules registered on this TRV.
    pub active_schedules: Vec<Uuid>,
    #[schema(value_type = Object)]
    pub metadata: Map<String, Value>,
}

/// Body of `POST /trv`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewTrv {
    pub name: String,
    pub current_temperature: f64,
    /// Defaults to `ambientTemperature`.
    pub target_temperature: Option<i64>,
    pub ambient_temperature: i64,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Map<String, Value>>,
}

/// Partial update of a TRV; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrvPatch {
    pub name: Option<String>,
    pub current_temperature: Option<f64>,
    pub target_temperature: Option<i64>,
    pub ambient_temperature: Option<i64>,
    pub active: Option<bool>,
    pub active_schedules: Option<Vec<Uuid>>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Map<String, Value>>,
}

impl Trv {
    pub fn new(input: NewTrv) -> Self {
        Self {
            id: Uuid::new_v4(),
            serial_id: generate_serial_id(),
            name: input.name,
            current_temperature: input.current_temperature,
            target_temperature: input.target_temperature.unwrap_or(input.ambient_temperature),
            ambient_temperature: input.ambient_temperature,
            active: false,
            active_schedules: Vec::new(),
            metadata: input.metadata.unwrap_or_default(),
        }
    }

    /// `currentTemperature` rounded to one decimal place. Magnitudes too
    /// large to scale are already integral and come back unchanged.
    pub fn rounded_current_temperature(&self) -> f64 {
        let scaled = self.current_temperature * 10.0;
        if !scaled.is_finite() {
            return self.current_temperature;
        }
        scaled.round() / 10.0
    }

    /// Whether the TRV already matches what the activity checker wants:
    /// active at `target`, or inactive for `None`.
    pub fn at_setpoint(&self, target: Option<i64>) -> bool {
        match target {
            Some(t) => self.active && self.target_temperature == t,
            None => !self.active,
        }
    }

    /// Returns `false` if the schedule was already registered.
    pub fn register_schedule(&mut self, schedule_id: Uuid) -> bool {
        if self.active_schedules.contains(&schedule_id) {
            return false;
        }
        self.active_schedules.push(schedule_id);
        true
    }

    /// Returns `false` if the schedule was not registered.
    pub fn unregister_schedule(&mut self, schedule_id: Uuid) -> bool {
        let before = self.active_schedules.len();
        self.active_schedules.retain(|id| *id != schedule_id);
        self.active_schedules.len() != before
    }

    /// Semantic checks on a fully constructed TRV. Empty means valid.
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if self.name.trim().is_empty() {
            violations.push("name must not be empty".to_owned());
        }
        if !is_serial_id(&self.serial_id) {
            violations.push(format!("serialId {:?} is not a valid serial", self.serial_id));
        }
        if !self.current_temperature.is_finite() {
            violations.push("currentTemperature must be a finite number".to_owned());
        }
        if let Some(dup) = first_duplicate(&self.active_schedules) {
            violations.push(format!("activeSchedules contains {dup} more than once"));
        }

        violations
    }
}

impl TrvPatch {
    pub fn target_temperature(value: i64) -> Self {
        Self {
            target_temperature: Some(value),
            ..Self::default()
        }
    }

    pub fn merge_into(self, trv: &mut Trv) {
        if let Some(v) = self.name {
            trv.name = v;
        }
        if let Some(v) = self.current_temperature {
            trv.current_temperature = v;
        }
        if let Some(v) = self.target_temperature {
            trv.target_temperature = v;
        }
        if let Some(v) = self.ambient_temperature {
            trv.ambient_temperature = v;
        }
        if let Some(v) = self.active {
            trv.active = v;
        }
        if let Some(v) = self.active_schedules {
            trv.active_schedules = v;
        }
        if let Some(v) = self.metadata {
            trv.metadata = v;
        }
    }
}

impl Record for Trv {
    fn id(&self) -> Uuid {
        self.id
    }
}

/// `OTRV-` plus 10 symbols drawn uniformly from `[0-9A-Z]`.
pub fn generate_serial_id() -> String {
    let mut rng = rand::rng();
    let symbols = (0..SERIAL_LEN)
        .map(|_| SERIAL_ALPHABET[rng.random_range(0..SERIAL_ALPHABET.len())] as char);
    SERIAL_PREFIX.chars().chain(symbols).collect()
}

pub fn is_serial_id(s: &str) -> bool {
    s.strip_prefix(SERIAL_PREFIX).is_some_and(|rest| {
        rest.len() == SERIAL_LEN && rest.bytes().all(|b| SERIAL_ALPHABET.contains(&b))
    })
}

// ---------------------------------------------------------------------------
// Schedule
// ---------------------------------------------------------------------------

/// A named daily program: window `i` is `[startTime[i], endTime[i])` at
/// `targetTemperature[i]`, applied to every TRV in `trvsAppliedOn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub id: Uuid,
    pub name: String,
    /// Degrees Celsius, one per window.
    pub target_temperature: Vec<i64>,
    /// `HH:MM`, one per window.
    pub start_time: Vec<String>,
    /// `HH:MM`, one per window. `24:00` means end of day.
    pub end_time: Vec<String>,
    pub trvs_applied_on: Vec<Uuid>,
}

/// Body of `POST /schedule`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewSchedule {
    pub name: String,
    pub target_temperature: Vec<i64>,
    pub start_time: Vec<String>,
    pub end_time: Vec<String>,
    pub trvs_applied_on: Vec<Uuid>,
}

/// Partial update of a schedule; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePatch {
    pub name: Option<String>,
    pub target_temperature: Option<Vec<i64>>,
    pub start_time: Option<Vec<String>>,
    pub end_time: Option<Vec<String>>,
    pub trvs_applied_on: Option<Vec<Uuid>>,
}

impl Schedule {
    pub fn new(input: NewSchedule) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: input.name,
            target_temperature: input.target_temperature,
            start_time: input.start_time,
            end_time: input.end_time,
            trvs_applied_on: input.trvs_applied_on,
        }
    }

    pub fn window_count(&self) -> usize {
        self.start_time.len()
    }

    /// Parsed window `index`, or why it cannot be used.
    pub fn window(&self, index: usize) -> Result<TimeWindow, String> {
        match (self.start_time.get(index), self.end_time.get(index)) {
            (Some(start), Some(end)) => TimeWindow::parse(start, end).map_err(|e| e.to_string()),
            _ => Err(format!("window {index} has no matching start/end time")),
        }
    }

    pub fn applies_to(&self, trv_id: Uuid) -> bool {
        self.trvs_applied_on.contains(&trv_id)
    }

    /// Semantic checks on a fully constructed schedule. Empty means valid.
    pub fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        if self.name.trim().is_empty() {
            violations.push("name must not be empty".to_owned());
        }

        let (targets, starts, ends) = (
            self.target_temperature.len(),
            self.start_time.len(),
            self.end_time.len(),
        );
        if starts == 0 {
            violations.push("a schedule needs at least one time window".to_owned());
        }
        if starts != ends || starts != targets {
            violations.push(format!(
                "startTime ({starts}), endTime ({ends}) and targetTemperature ({targets}) \
                 must have the same length"
            ));
        } else {
            for i in 0..starts {
                if let Err(e) = self.window(i) {
                    violations.push(format!("window {i}: {e}"));
                }
            }
        }

        if let Some(dup) = first_duplicate(&self.trvs_applied_on) {
            violations.push(format!("trvsAppliedOn contains {dup} more than once"));
        }

        violations
    }
}

impl SchedulePatch {
    pub fn merge_into(self, schedule: &mut Schedule) {
        if let Some(v) = self.name {
            schedule.name = v;
        }
        if let Some(v) = self.target_temperature {
            schedule.target_temperature = v;
        }
        if let Some(v) = self.start_time {
            schedule.start_time = v;
        }
        if let Some(v) = self.end_time {
            schedule.end_time = v;
        }
        if let Some(v) = self.trvs_applied_on {
            schedule.trvs_applied_on = v;
        }
    }
}

impl Record for Schedule {
    fn id(&self) -> Uuid {
        self.id
    }
}

fn first_duplicate(ids: &[Uuid]) -> Option<Uuid> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().copied().find(|id| !seen.insert(*id))
}
