//! Time-applicability leaf action.
//!
//! Gates an action set on the current day and time-of-day in a configurable
//! time zone. Per-date override ranges take precedence over the weekly
//! allowed ranges and fully decide the day they cover; an include and an
//! exclude covering the same moment conflict and resolve to not continuing.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use runbook_model::{Context, ExecuteContext, ModelManipulator, ParseContext};

use crate::defs::{ActionRef, Validatable};
use crate::error::ActionError;
use crate::factory::ActionFactory;
use crate::op::{extract_args, ActionInfo, ActionKind};

pub const ACTION_TYPE: &str = "APPLICABILITY-TIME";

/// Zone applied when the arguments name none.
pub const DEFAULT_TIME_ZONE: &str = "America/Los_Angeles";

/// Day selector for allowed ranges: a specific weekday, or the weekday /
/// weekend classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeekExt {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Weekday,
    Weekend,
}

impl From<Weekday> for DayOfWeekExt {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Sun => DayOfWeekExt::Sunday,
            Weekday::Mon => DayOfWeekExt::Monday,
            Weekday::Tue => DayOfWeekExt::Tuesday,
            Weekday::Wed => DayOfWeekExt::Wednesday,
            Weekday::Thu => DayOfWeekExt::Thursday,
            Weekday::Fri => DayOfWeekExt::Friday,
            Weekday::Sat => DayOfWeekExt::Saturday,
        }
    }
}

/// A `[start, end)` span of the day; an absent bound extends to the edge of
/// the day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TimeRange {
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
}

impl TimeRange {
    fn contains(&self, time: NaiveTime) -> bool {
        time >= self.start.unwrap_or(NaiveTime::MIN)
            && self.end.map_or(true, |end| time < end)
    }
}

/// A per-date range that either includes or excludes the moment it covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TimeRangeOverride {
    #[serde(flatten)]
    pub range: TimeRange,
    pub exclude: bool,
}

/// Definition of a time-applicability gate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TimeApplicabilityDef {
    pub allowed_days_and_times: Option<BTreeMap<DayOfWeekExt, Vec<TimeRange>>>,
    pub overrides: Option<BTreeMap<NaiveDate, Vec<TimeRangeOverride>>>,
}

impl Validatable for TimeApplicabilityDef {}

/// Arguments bound through the reference's argument transform.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
struct TimeApplicabilityArgs {
    time_zone_id: Option<String>,
    /// Evaluation instant override; the context clock applies otherwise.
    now: Option<DateTime<Utc>>,
}

impl Validatable for TimeApplicabilityArgs {}

/// The time gate.
pub struct TimeApplicabilityAction {
    manipulator: ModelManipulator,
    def: RwLock<Option<TimeApplicabilityDef>>,
}

impl TimeApplicabilityAction {
    pub fn new() -> Self {
        Self {
            manipulator: ModelManipulator::new(),
            def: RwLock::new(None),
        }
    }
}

impl Default for TimeApplicabilityAction {
    fn default() -> Self {
        Self::new()
    }
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

#[async_trait]
impl ActionKind for TimeApplicabilityAction {
    type Def = TimeApplicabilityDef;

    fn type_name(&self) -> &'static str {
        ACTION_TYPE
    }

    fn process_definition(
        &self,
        _ctx: &ParseContext,
        _factory: &dyn ActionFactory,
        _info: &ActionInfo,
        definition: Option<Self::Def>,
    ) -> bool {
        match definition {
            Some(def) => {
                *self.def.write().expect("time def lock poisoned") = Some(def);
                true
            }
            None => false,
        }
    }

    async fn execute_internal(
        &self,
        ctx: &ExecuteContext,
        info: &ActionInfo,
        action_ref: &ActionRef,
        model: &mut Value,
    ) -> Result<(bool, Option<Value>), ActionError> {
        let args: TimeApplicabilityArgs =
            extract_args(ctx, &self.manipulator, info, action_ref, model)?;

        let def = self
            .def
            .read()
            .expect("time def lock poisoned")
            .clone()
            .unwrap_or_default();

        let zone_name = args
            .time_zone_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string());

        let zone: Tz = match zone_name.parse() {
            Ok(zone) => zone,
            Err(_) => {
                ctx.log_error(&format!("[{zone_name}] is not a recognized time zone id"));
                return Err(ActionError::ExecuteValidation(format!(
                    "[{zone_name}] is not a recognized time zone id"
                )));
            }
        };

        let now = args.now.unwrap_or_else(|| ctx.now_utc());
        let local = now.with_timezone(&zone);
        let weekday = local.weekday();
        let is_weekend = matches!(weekday, Weekday::Sat | Weekday::Sun);
        let day_class = if is_weekend { "Weekend" } else { "Weekday" };

        ctx.log(&format!(
            "Evaluating applicability at [{}] in zone [{}] ({}, {})",
            local.format("%Y-%m-%dT%H:%M:%S"),
            zone_name,
            weekday_name(weekday),
            day_class
        ));

        let date = local.date_naive();
        let time = local.time();

        // overrides for the current date take precedence and decide fully
        if let Some(overrides) = def.overrides.as_ref().and_then(|map| map.get(&date)) {
            let mut include_hit = false;
            let mut exclude_hit = false;
            for entry in overrides {
                if entry.range.contains(time) {
                    if entry.exclude {
                        exclude_hit = true;
                    } else {
                        include_hit = true;
                    }
                }
            }

            let applicable = include_hit && !exclude_hit;
            if include_hit || exclude_hit {
                ctx.log(&format!(
                    "Override range matched for [{date}]: {} to process the containing action set",
                    if applicable { "continuing" } else { "NOT continuing" }
                ));
            } else {
                ctx.log(&format!(
                    "Overrides are defined for [{date}] but none cover the current time; processing should NOT continue"
                ));
            }
            return Ok((applicable, None));
        }

        if let Some(allowed) = def.allowed_days_and_times.as_ref() {
            let day_keys = [
                DayOfWeekExt::from(weekday),
                if is_weekend {
                    DayOfWeekExt::Weekend
                } else {
                    DayOfWeekExt::Weekday
                },
            ];

            let matched = day_keys
                .iter()
                .filter_map(|key| allowed.get(key))
                .flatten()
                .any(|range| range.contains(time));

            if matched {
                ctx.log(&format!(
                    "Time range matched for ({}, {day_class}): continuing to process the containing action set",
                    weekday_name(weekday)
                ));
                return Ok((true, None));
            }
        }

        ctx.log("No applicable time ranges or overrides matched; processing should NOT continue");
        Ok((false, None))
    }
}
