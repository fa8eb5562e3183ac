use std::collections::HashMap;

use crate::limits::*;
use crate::model::*;

use super::conflict::{find_conflicts, validate_span};
use super::{Engine, EngineError};

/// A schedule entry about to be committed; the engine assigns its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub resource_id: Id,
    pub event_id: Id,
    pub task_id: Option<Id>,
    pub start: Ms,
    pub end: Ms,
    pub note: Option<String>,
}

/// Whether the write path re-checks overlaps under its own locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitMode {
    /// Reject the whole unit if any entry overlaps an existing one.
    Exclusive,
    /// Write regardless of overlaps (force override, or advisory-only setups).
    Unchecked,
}

impl Engine {
    pub async fn upsert_resource(&self, resource: Resource) -> Result<(), EngineError> {
        if resource.name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("resource name too long"));
        }
        self.commit_catalog(Change::ResourceUpserted(resource)).await
    }

    pub async fn upsert_event(&self, event: CateringEvent) -> Result<(), EngineError> {
        if event.name.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("event name too long"));
        }
        self.commit_catalog(Change::EventUpserted(event)).await
    }

    pub async fn upsert_task(&self, task: Task) -> Result<(), EngineError> {
        if task.title.len() > MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("task title too long"));
        }
        if !self.store.contains_event(&task.event_id) {
            return Err(EngineError::NotFound { kind: "event", id: task.event_id });
        }
        self.commit_catalog(Change::TaskUpserted(task)).await
    }

    async fn commit_catalog(&self, change: Change) -> Result<(), EngineError> {
        let _gate = self.commit_gate.read().await;
        self.wal_append(vec![change.clone()]).await?;
        self.store.apply_catalog(&change);
        Ok(())
    }

    fn validate_new_entry(&self, entry: &NewEntry) -> Result<Span, EngineError> {
        let span = validate_span(entry.start, entry.end)?;
        if span.duration_ms() > MAX_SPAN_DURATION_MS {
            return Err(EngineError::LimitExceeded("entry too long"));
        }
        if let Some(note) = &entry.note
            && note.len() > MAX_NOTE_LEN {
                return Err(EngineError::LimitExceeded("note too long"));
            }
        if self.store.get_resource(&entry.resource_id).is_none() {
            return Err(EngineError::NotFound { kind: "resource", id: entry.resource_id });
        }
        if !self.store.contains_event(&entry.event_id) {
            return Err(EngineError::NotFound { kind: "event", id: entry.event_id });
        }
        if let Some(task_id) = entry.task_id {
            let task = self
                .store
                .get_task(&task_id)
                .ok_or(EngineError::NotFound { kind: "task", id: task_id })?;
            if task.event_id != entry.event_id {
                return Err(EngineError::InvalidEntry(format!(
                    "task {task_id} belongs to event {}, not {}",
                    task.event_id, entry.event_id
                )));
            }
        }
        Ok(span)
    }

    /// Commit every entry of one assignment, or none of them.
    ///
    /// `replaces` names an existing entry superseded by this unit (an edit);
    /// it is removed in the same WAL flush and never counts as an overlap.
    /// Write locks are taken in sorted resource order to prevent deadlocks.
    pub async fn commit_assignment(
        &self,
        entries: Vec<NewEntry>,
        replaces: Option<Id>,
        mode: CommitMode,
    ) -> Result<Vec<ScheduleEntry>, EngineError> {
        if entries.is_empty() {
            return Err(EngineError::EmptyResourceSet);
        }
        if entries.len() > MAX_BATCH_SIZE {
            return Err(EngineError::LimitExceeded("batch too large"));
        }
        let mut spans = Vec::with_capacity(entries.len());
        for entry in &entries {
            spans.push(self.validate_new_entry(entry)?);
        }

        let _gate = self.commit_gate.read().await;

        let replaced_resource = match replaces {
            Some(id) => Some(
                self.store
                    .get_resource_for_entry(&id)
                    .ok_or(EngineError::NotFound { kind: "entry", id })?,
            ),
            None => None,
        };

        let mut resource_ids: Vec<Id> = entries.iter().map(|e| e.resource_id).collect();
        resource_ids.extend(replaced_resource);
        resource_ids.sort();
        resource_ids.dedup();

        let mut guards = Vec::with_capacity(resource_ids.len());
        let mut slot = HashMap::new();
        for rid in &resource_ids {
            let tl = self
                .store
                .get_timeline(rid)
                .ok_or(EngineError::NotFound { kind: "resource", id: *rid })?;
            let guard = tl.write_owned().await;
            if guard.len() >= MAX_ENTRIES_PER_RESOURCE {
                return Err(EngineError::LimitExceeded("too many entries on resource"));
            }
            slot.insert(*rid, guards.len());
            guards.push(guard);
        }

        // Phase 1: validate against current state and within the unit.
        if mode == CommitMode::Exclusive {
            let mut overlaps = Vec::new();
            for (entry, span) in entries.iter().zip(&spans) {
                let guard = &guards[slot[&entry.resource_id]];
                overlaps.extend(find_conflicts(&self.store, guard, span, replaces));
            }
            if !overlaps.is_empty() {
                return Err(EngineError::Overlap(overlaps));
            }
            for i in 0..entries.len() {
                for j in (i + 1)..entries.len() {
                    if entries[i].resource_id == entries[j].resource_id && spans[i].overlaps(&spans[j]) {
                        return Err(EngineError::InvalidEntry(format!(
                            "entries in one assignment overlap on resource {}",
                            entries[i].resource_id
                        )));
                    }
                }
            }
        }

        // Phase 2: one WAL flush for the whole unit, then apply.
        let mut changes = Vec::with_capacity(entries.len() + 1);
        if let (Some(id), Some(resource_id)) = (replaces, replaced_resource) {
            changes.push(Change::EntryRemoved { id, resource_id });
        }
        let mut committed = Vec::with_capacity(entries.len());
        for (entry, span) in entries.into_iter().zip(spans) {
            let scheduled = ScheduleEntry {
                id: self.allocate_entry_id(),
                resource_id: entry.resource_id,
                event_id: entry.event_id,
                task_id: entry.task_id,
                span,
                note: entry.note,
            };
            changes.push(Change::EntryCommitted(scheduled.clone()));
            committed.push(scheduled);
        }

        self.wal_append(changes.clone()).await?;
        for change in &changes {
            if let Some(rid) = super::ScheduleStore::change_resource_id(change) {
                let guard = &mut guards[slot[&rid]];
                self.store.apply_to_timeline(guard, change);
            }
        }

        tracing::info!(
            entries = committed.len(),
            replaced = ?replaces,
            mode = ?mode,
            "assignment committed"
        );
        Ok(committed)
    }

    pub async fn remove_entry(&self, id: Id) -> Result<ScheduleEntry, EngineError> {
        let _gate = self.commit_gate.read().await;
        let resource_id = self
            .store
            .get_resource_for_entry(&id)
            .ok_or(EngineError::NotFound { kind: "entry", id })?;
        let tl = self
            .store
            .get_timeline(&resource_id)
            .ok_or(EngineError::NotFound { kind: "resource", id: resource_id })?;
        let mut guard = tl.write().await;
        let existing = guard
            .get_entry(id)
            .cloned()
            .ok_or(EngineError::NotFound { kind: "entry", id })?;

        let change = Change::EntryRemoved { id, resource_id };
        self.wal_append(vec![change.clone()]).await?;
        self.store.apply_to_timeline(&mut guard, &change);
        Ok(existing)
    }

    /// Drop every entry owned by a cancelled task. Returns the removed ids.
    pub async fn remove_entries_for_task(&self, task_id: Id) -> Result<Vec<Id>, EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut removed = Vec::new();
        for resource_id in self.store.timeline_ids() {
            let Some(tl) = self.store.get_timeline(&resource_id) else { continue };
            let mut guard = tl.write().await;
            let changes: Vec<Change> = guard
                .iter()
                .filter(|e| e.task_id == Some(task_id))
                .map(|e| Change::EntryRemoved { id: e.id, resource_id })
                .collect();
            if changes.is_empty() {
                continue;
            }
            self.wal_append(changes.clone()).await?;
            for change in &changes {
                if let Change::EntryRemoved { id, .. } = change {
                    removed.push(*id);
                }
                self.store.apply_to_timeline(&mut guard, change);
            }
        }
        tracing::info!(task_id, removed = removed.len(), "task entries removed");
        Ok(removed)
    }
}
