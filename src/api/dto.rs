//! JSON shapes of the Conflict API, shared by the server and `ConflictClient`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckRequest {
    pub resource_ids: Vec<Id>,
    pub start_time: String,
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_entry_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub has_conflicts: bool,
    pub conflicts: Vec<ConflictDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDto {
    pub resource_id: Id,
    pub resource_name: String,
    #[serde(default)]
    pub conflicting_entry_id: Id,
    pub conflicting_event_id: Id,
    pub conflicting_event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicting_task_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conflicting_task_title: Option<String>,
    pub existing_start_time: DateTime<Utc>,
    pub existing_end_time: DateTime<Utc>,
    pub message: String,
}

impl From<&ConflictResult> for ConflictDto {
    fn from(c: &ConflictResult) -> Self {
        Self {
            resource_id: c.resource_id,
            resource_name: c.resource_name.clone(),
            conflicting_entry_id: c.entry_id,
            conflicting_event_id: c.event_id,
            conflicting_event_name: c.event_name.clone(),
            conflicting_task_id: c.task_id,
            conflicting_task_title: c.task_title.clone(),
            existing_start_time: ms_to_datetime(c.existing.start),
            existing_end_time: ms_to_datetime(c.existing.end),
            message: c.message.clone(),
        }
    }
}

impl From<ConflictDto> for ConflictResult {
    fn from(c: ConflictDto) -> Self {
        Self {
            resource_id: c.resource_id,
            resource_name: c.resource_name,
            entry_id: c.conflicting_entry_id,
            event_id: c.conflicting_event_id,
            event_name: c.conflicting_event_name,
            task_id: c.conflicting_task_id,
            task_title: c.conflicting_task_title,
            existing: Span {
                start: datetime_to_ms(&c.existing_start_time),
                end: datetime_to_ms(&c.existing_end_time),
            },
            message: c.message,
        }
    }
}

impl From<&ConflictReport> for CheckResponse {
    fn from(report: &ConflictReport) -> Self {
        Self {
            has_conflicts: report.has_conflicts(),
            conflicts: report.conflicts.iter().map(ConflictDto::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailabilityParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub resource_id: Id,
    pub entries: Vec<EntryDto>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryDto {
    pub id: Id,
    pub event_id: Id,
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Id>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_title: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl From<BookedEntry> for EntryDto {
    fn from(e: BookedEntry) -> Self {
        Self {
            id: e.id,
            event_id: e.event_id,
            event_name: e.event_name,
            task_id: e.task_id,
            task_title: e.task_title,
            start_time: ms_to_datetime(e.span.start),
            end_time: ms_to_datetime(e.span.end),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub store_reachable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

// ── Timestamp parsing ───────────────────────────────────────────

/// RFC 3339 instant to Unix milliseconds.
pub fn parse_instant(field: &str, raw: &str) -> Result<Ms, String> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
        .map_err(|e| format!("{field}: invalid RFC 3339 timestamp {raw:?}: {e}"))
}

/// RFC 3339 instant, or a `YYYY-MM-DD` date at UTC midnight. A plain date
/// used as an upper bound means the end of that day.
pub fn parse_date_bound(field: &str, raw: &str, upper: bool) -> Result<Ms, String> {
    if let Ok(ms) = parse_instant(field, raw) {
        return Ok(ms);
    }
    let date = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("{field}: expected RFC 3339 timestamp or YYYY-MM-DD, got {raw:?}"))?;
    let date = if upper { date.succ_opt().unwrap_or(date) } else { date };
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| format!("{field}: date out of range"))?;
    Ok(midnight.and_utc().timestamp_millis())
}

pub fn format_instant(ms: Ms) -> String {
    ms_to_datetime(ms).to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_offsets_to_utc() {
        let a = parse_instant("start_time", "2024-06-01T09:00:00Z").unwrap();
        let b = parse_instant("start_time", "2024-06-01T11:00:00+02:00").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, 1_717_232_400_000);
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_instant("end_time", "yesterday").unwrap_err();
        assert!(err.starts_with("end_time"));
    }

    #[test]
    fn plain_dates_cover_whole_day() {
        let start = parse_date_bound("start_date", "2024-06-01", false).unwrap();
        let end = parse_date_bound("end_date", "2024-06-01", true).unwrap();
        assert_eq!(start, 1_717_200_000_000);
        assert_eq!(end - start, 86_400_000);
    }

    #[test]
    fn optional_fields_omitted_when_absent() {
        let dto = ConflictDto {
            resource_id: 1,
            resource_name: "Chef".into(),
            conflicting_entry_id: 4,
            conflicting_event_id: 2,
            conflicting_event_name: "Gala".into(),
            conflicting_task_id: None,
            conflicting_task_title: None,
            existing_start_time: ms_to_datetime(0),
            existing_end_time: ms_to_datetime(1000),
            message: "m".into(),
        };
        let json = serde_json::to_value(&dto).unwrap();
        assert!(json.get("conflicting_task_id").is_none());
        assert_eq!(json["existing_end_time"], "1970-01-01T00:00:01Z");
        let back: ConflictDto = serde_json::from_value(json).unwrap();
        assert_eq!(back, dto);
    }
}
