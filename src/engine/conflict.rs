use std::collections::HashSet;

use chrono::SecondsFormat;

use crate::limits::*;
use crate::model::*;

use super::EngineError;
use super::store::ScheduleStore;

/// Reject inverted, empty, or out-of-range windows.
pub fn validate_span(start: Ms, end: Ms) -> Result<Span, EngineError> {
    if end <= start {
        return Err(EngineError::InvalidRange { start, end });
    }
    if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    Ok(Span::new(start, end))
}

impl ConflictQuery {
    /// Validated query. Duplicate resource ids collapse to their first occurrence.
    pub fn new(
        resource_ids: &[Id],
        start: Ms,
        end: Ms,
        exclude_entry_id: Option<Id>,
    ) -> Result<Self, EngineError> {
        if resource_ids.is_empty() {
            return Err(EngineError::EmptyResourceSet);
        }
        if resource_ids.len() > MAX_RESOURCE_IDS_PER_QUERY {
            return Err(EngineError::LimitExceeded("too many resource IDs"));
        }
        let span = validate_span(start, end)?;
        let mut seen = HashSet::with_capacity(resource_ids.len());
        let resource_ids = resource_ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        Ok(Self {
            resource_ids,
            span,
            exclude_entry_id,
        })
    }
}

fn fmt_instant(ms: Ms) -> String {
    ms_to_datetime(ms).to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn describe_conflict(
    resource_name: &str,
    event_name: &str,
    task_title: Option<&str>,
    existing: &Span,
) -> String {
    let owner = match task_title {
        Some(title) => format!("task '{title}' of event '{event_name}'"),
        None => format!("event '{event_name}'"),
    };
    format!(
        "{resource_name} is already booked for {owner} from {} to {}",
        fmt_instant(existing.start),
        fmt_instant(existing.end)
    )
}

/// Every entry on `tl` overlapping `span`, skipping `exclude`, with names
/// resolved from the store catalog.
pub fn find_conflicts(
    store: &ScheduleStore,
    tl: &ResourceTimeline,
    span: &Span,
    exclude: Option<Id>,
) -> Vec<ConflictResult> {
    let mut out = Vec::new();
    let mut resource_name: Option<String> = None;

    for entry in tl.overlapping(span) {
        if exclude == Some(entry.id) {
            continue;
        }
        let resource_name = resource_name
            .get_or_insert_with(|| store.resource_name(&tl.resource_id))
            .clone();
        let event_name = store.event_name(&entry.event_id);
        let task_title = entry.task_id.and_then(|id| store.task_title(&id));
        let message = describe_conflict(&resource_name, &event_name, task_title.as_deref(), &entry.span);
        out.push(ConflictResult {
            resource_id: tl.resource_id,
            resource_name,
            entry_id: entry.id,
            event_id: entry.event_id,
            event_name,
            task_id: entry.task_id,
            task_title,
            existing: entry.span,
            message,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_inverted_and_empty() {
        assert!(matches!(
            validate_span(200, 100),
            Err(EngineError::InvalidRange { start: 200, end: 100 })
        ));
        assert!(matches!(validate_span(100, 100), Err(EngineError::InvalidRange { .. })));
        assert_eq!(validate_span(100, 101).unwrap(), Span::new(100, 101));
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert!(matches!(validate_span(-5, 100), Err(EngineError::LimitExceeded(_))));
        assert!(matches!(
            validate_span(0, MAX_VALID_TIMESTAMP_MS + 1),
            Err(EngineError::LimitExceeded(_))
        ));
    }

    #[test]
    fn query_dedups_and_validates() {
        let q = ConflictQuery::new(&[3, 1, 3, 2, 1], 0, 10, Some(9)).unwrap();
        assert_eq!(q.resource_ids, vec![3, 1, 2]);
        assert_eq!(q.exclude_entry_id, Some(9));
        assert!(matches!(ConflictQuery::new(&[], 0, 10, None), Err(EngineError::EmptyResourceSet)));
        assert!(matches!(
            ConflictQuery::new(&[1], 10, 10, None),
            Err(EngineError::InvalidRange { .. })
        ));
    }

    #[test]
    fn message_names_task_when_present() {
        let span = Span::new(1_717_232_400_000, 1_717_261_200_000); // 2024-06-01 09:00 → 17:00 UTC
        let msg = describe_conflict("Chef", "Gala", Some("Plating"), &span);
        assert_eq!(
            msg,
            "Chef is already booked for task 'Plating' of event 'Gala' from 2024-06-01T09:00:00Z to 2024-06-01T17:00:00Z"
        );
        let msg = describe_conflict("Chef", "Gala", None, &span);
        assert!(msg.starts_with("Chef is already booked for event 'Gala' from"));
    }
}
