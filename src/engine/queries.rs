use std::time::Instant;

use crate::limits::*;
use crate::model::*;

use super::conflict::{find_conflicts, validate_span};
use super::{Engine, EngineError};

impl Engine {
    /// Evaluate every resource in the query independently and union the results.
    ///
    /// Unknown resources have no bookings and contribute nothing. The list is
    /// never truncated: the call either returns all overlaps or an error.
    pub async fn check_conflicts(&self, query: &ConflictQuery) -> Result<ConflictReport, EngineError> {
        let started = Instant::now();
        let mut report = ConflictReport::default();

        for resource_id in &query.resource_ids {
            let Some(tl) = self.store.get_timeline(resource_id) else {
                continue;
            };
            let guard = tl.read().await;
            report
                .conflicts
                .extend(find_conflicts(&self.store, &guard, &query.span, query.exclude_entry_id));
        }

        tracing::debug!(
            resources = query.resource_ids.len(),
            conflicts = report.conflicts.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "conflict check"
        );
        Ok(report)
    }

    /// Entries on one resource intersecting `[start, end)`, in start order.
    pub async fn resource_availability(
        &self,
        resource_id: Id,
        start: Ms,
        end: Ms,
    ) -> Result<Vec<BookedEntry>, EngineError> {
        let span = validate_span(start, end)?;
        if span.duration_ms() > MAX_QUERY_WINDOW_MS {
            return Err(EngineError::LimitExceeded("query window too wide"));
        }
        let Some(tl) = self.store.get_timeline(&resource_id) else {
            return Ok(vec![]);
        };
        let guard = tl.read().await;
        Ok(guard
            .overlapping(&span)
            .into_iter()
            .map(|e| BookedEntry {
                id: e.id,
                event_id: e.event_id,
                event_name: self.store.event_name(&e.event_id),
                task_id: e.task_id,
                task_title: e.task_id.and_then(|id| self.store.task_title(&id)),
                span: e.span,
            })
            .collect())
    }

    pub async fn get_entry(&self, entry_id: Id) -> Option<ScheduleEntry> {
        let resource_id = self.store.get_resource_for_entry(&entry_id)?;
        let tl = self.store.get_timeline(&resource_id)?;
        let guard = tl.read().await;
        guard.get_entry(entry_id).cloned()
    }

    pub async fn entries_for_resource(&self, resource_id: Id) -> Vec<ScheduleEntry> {
        match self.store.get_timeline(&resource_id) {
            Some(tl) => tl.read().await.to_vec(),
            None => vec![],
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            store_reachable: self.store_reachable(),
        }
    }
}
