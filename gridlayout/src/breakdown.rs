//! Per-course and per-project time totals for the stats cards.
//!
//! Pure aggregation over exported study sessions: filter to the current week
//! or month, sum durations per entity and per category, and express each sum
//! in hours and as a share of the period total. Nothing here fails; an empty
//! or fully filtered input yields an all-zero breakdown.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Duration, OffsetDateTime, PrimitiveDateTime, Time};
use tracing::debug;

#[cfg(test)]
#[path = "breakdown_test.rs"]
mod tests;

pub const UNKNOWN_COURSE: &str = "Unknown Course";
pub const UNKNOWN_PROJECT: &str = "Unknown Project";

const SECONDS_PER_HOUR: f64 = 3600.0;

// =============================================================================
// INPUT
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Course,
    Project,
    /// Counted toward the total but neither category.
    #[serde(other)]
    Other,
}

/// One exported study session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.fff]` read as UTC.
    pub start_time: String,
    /// Seconds.
    pub duration: u64,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    #[serde(deserialize_with = "deserialize_id")]
    pub reference_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Week,
    Month,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown period {0:?}, expected \"week\" or \"month\"")]
pub struct UnknownPeriod(pub String);

impl FromStr for Period {
    type Err = UnknownPeriod;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            _ => Err(UnknownPeriod(s.to_owned())),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Week => "week",
            Self::Month => "month",
        })
    }
}

/// Display names keyed by entity id: course titles and project names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EntityNames {
    pub courses: HashMap<String, String>,
    pub projects: HashMap<String, String>,
}

impl EntityNames {
    #[must_use]
    pub fn with_course(mut self, id: &str, title: &str) -> Self {
        self.courses.insert(id.to_owned(), title.to_owned());
        self
    }

    #[must_use]
    pub fn with_project(mut self, id: &str, name: &str) -> Self {
        self.projects.insert(id.to_owned(), name.to_owned());
        self
    }
}

// =============================================================================
// OUTPUT
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTotal {
    pub id: String,
    pub name: String,
    pub duration: u64,
    pub hours: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySplit {
    pub courses: u64,
    pub projects: u64,
    pub courses_hours: f64,
    pub projects_hours: f64,
    pub courses_percentage: f64,
    pub projects_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeBreakdown {
    pub total: u64,
    pub total_hours: f64,
    pub courses: Vec<EntityTotal>,
    pub projects: Vec<EntityTotal>,
    pub by_category: CategorySplit,
}

// =============================================================================
// AGGREGATION
// =============================================================================

/// Start of the period containing `now`: the most recent Sunday 00:00 for a
/// week, the 1st 00:00 for a month. Uses `now`'s UTC offset.
#[must_use]
pub fn period_start(period: Period, now: OffsetDateTime) -> OffsetDateTime {
    let date = now.date();
    let days_back = match period {
        Period::Week => now.weekday().number_days_from_sunday(),
        Period::Month => date.day() - 1,
    };
    now.replace_date(date.saturating_sub(Duration::days(i64::from(days_back))))
        .replace_time(Time::MIDNIGHT)
}

/// Parse a session start time: RFC 3339 first, then the naive form read as UTC.
///
/// # Errors
///
/// Returns the naive-format parse error when neither form matches.
pub fn parse_start_time(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    let raw = raw.trim();
    OffsetDateTime::parse(raw, &Rfc3339).or_else(|_| {
        let naive = format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]");
        PrimitiveDateTime::parse(raw, naive).map(PrimitiveDateTime::assume_utc)
    })
}

/// Bucket `sessions` inside `[period_start, now]` by course and project.
#[must_use]
pub fn time_breakdown(sessions: &[SessionRecord], period: Period, now: OffsetDateTime, names: &EntityNames) -> TimeBreakdown {
    let start = period_start(period, now);

    let mut total = 0_u64;
    let mut course_sums: HashMap<&str, u64> = HashMap::new();
    let mut project_sums: HashMap<&str, u64> = HashMap::new();

    for session in sessions {
        let started = match parse_start_time(&session.start_time) {
            Ok(started) => started,
            Err(err) => {
                debug!(start_time = %session.start_time, error = %err, "skipping session with unreadable start time");
                continue;
            }
        };
        if started < start || started > now {
            continue;
        }

        total = total.saturating_add(session.duration);
        let bucket = match session.kind {
            SessionKind::Course => &mut course_sums,
            SessionKind::Project => &mut project_sums,
            SessionKind::Other => continue,
        };
        let sum = bucket.entry(session.reference_id.as_str()).or_default();
        *sum = sum.saturating_add(session.duration);
    }

    let course_total: u64 = course_sums.values().sum();
    let project_total: u64 = project_sums.values().sum();

    TimeBreakdown {
        total,
        total_hours: hours(total),
        courses: entity_totals(&course_sums, &names.courses, UNKNOWN_COURSE, total),
        projects: entity_totals(&project_sums, &names.projects, UNKNOWN_PROJECT, total),
        by_category: CategorySplit {
            courses: course_total,
            projects: project_total,
            courses_hours: hours(course_total),
            projects_hours: hours(project_total),
            courses_percentage: percentage(course_total, total),
            projects_percentage: percentage(project_total, total),
        },
    }
}

fn entity_totals(sums: &HashMap<&str, u64>, names: &HashMap<String, String>, unknown: &str, total: u64) -> Vec<EntityTotal> {
    let mut entries: Vec<EntityTotal> = sums
        .iter()
        .map(|(id, &duration)| EntityTotal {
            id: (*id).to_owned(),
            name: names
                .get(*id)
                .filter(|name| !name.is_empty())
                .cloned()
                .unwrap_or_else(|| unknown.to_owned()),
            duration,
            hours: hours(duration),
            percentage: percentage(duration, total),
        })
        .collect();
    entries.sort_by(|a, b| b.duration.cmp(&a.duration).then_with(|| a.id.cmp(&b.id)));
    entries
}

/// Seconds to hours, two decimals.
#[allow(clippy::cast_precision_loss)]
fn hours(seconds: u64) -> f64 {
    round_to(seconds as f64 / SECONDS_PER_HOUR, 2)
}

/// Share of `total`, one decimal. Zero when `total` is zero.
#[allow(clippy::cast_precision_loss)]
fn percentage(value: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(value as f64 / total as f64 * 100.0, 1)
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10_f64.powi(decimals);
    (value * scale).round() / scale
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(id) => Ok(id),
        Value::Number(id) => Ok(id.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number id, got {other}"))),
    }
}
