use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;

pub type SharedTimeline = Arc<RwLock<ResourceTimeline>>;

/// In-memory Schedule Store: the catalog the business layer owns plus one
/// range-indexed timeline per resource.
pub struct ScheduleStore {
    resources: DashMap<Id, Resource>,
    events: DashMap<Id, CateringEvent>,
    tasks: DashMap<Id, Task>,
    timelines: DashMap<Id, SharedTimeline>,
    entry_to_resource: DashMap<Id, Id>,
}

impl Default for ScheduleStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
            events: DashMap::new(),
            tasks: DashMap::new(),
            timelines: DashMap::new(),
            entry_to_resource: DashMap::new(),
        }
    }

    // ── Catalog ──────────────────────────────────────────────

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn get_resource(&self, id: &Id) -> Option<Resource> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn resource_name(&self, id: &Id) -> String {
        self.resources
            .get(id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| format!("resource #{id}"))
    }

    pub fn list_resources(&self) -> Vec<Resource> {
        let mut out: Vec<Resource> = self.resources.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|r| r.id);
        out
    }

    pub fn contains_event(&self, id: &Id) -> bool {
        self.events.contains_key(id)
    }

    pub fn event_name(&self, id: &Id) -> String {
        self.events
            .get(id)
            .map(|e| e.name.clone())
            .unwrap_or_else(|| format!("event #{id}"))
    }

    pub fn list_events(&self) -> Vec<CateringEvent> {
        let mut out: Vec<CateringEvent> = self.events.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|e| e.id);
        out
    }

    pub fn get_task(&self, id: &Id) -> Option<Task> {
        self.tasks.get(id).map(|e| e.value().clone())
    }

    pub fn task_title(&self, id: &Id) -> Option<String> {
        self.tasks.get(id).map(|t| t.title.clone())
    }

    pub fn list_tasks(&self) -> Vec<Task> {
        let mut out: Vec<Task> = self.tasks.iter().map(|e| e.value().clone()).collect();
        out.sort_by_key(|t| t.id);
        out
    }

    // ── Timelines ────────────────────────────────────────────

    pub fn get_timeline(&self, resource_id: &Id) -> Option<SharedTimeline> {
        self.timelines.get(resource_id).map(|e| e.value().clone())
    }

    pub fn timeline_ids(&self) -> Vec<Id> {
        let mut ids: Vec<Id> = self.timelines.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    // ── Entry index ──────────────────────────────────────────

    pub fn get_resource_for_entry(&self, entry_id: &Id) -> Option<Id> {
        self.entry_to_resource.get(entry_id).map(|e| *e.value())
    }

    pub fn contains_entry(&self, entry_id: &Id) -> bool {
        self.entry_to_resource.contains_key(entry_id)
    }

    // ── Change application ───────────────────────────────────

    /// Apply a catalog change. Entry changes need the timeline's write lock
    /// and go through `apply_to_timeline` instead.
    pub fn apply_catalog(&self, change: &Change) {
        match change {
            Change::ResourceUpserted(resource) => {
                self.timelines
                    .entry(resource.id)
                    .or_insert_with(|| Arc::new(RwLock::new(ResourceTimeline::new(resource.id))));
                self.resources.insert(resource.id, resource.clone());
            }
            Change::EventUpserted(event) => {
                self.events.insert(event.id, event.clone());
            }
            Change::TaskUpserted(task) => {
                self.tasks.insert(task.id, task.clone());
            }
            Change::EntryCommitted(_)
            | Change::EntryRemoved { .. }
            | Change::EntryIdHighWater(_) => {}
        }
    }

    /// Apply an entry change to a timeline (caller holds the write lock).
    pub fn apply_to_timeline(&self, tl: &mut ResourceTimeline, change: &Change) {
        match change {
            Change::EntryCommitted(entry) => {
                self.entry_to_resource.insert(entry.id, entry.resource_id);
                tl.insert_entry(entry.clone());
            }
            Change::EntryRemoved { id, .. } => {
                tl.remove_entry(*id);
                self.entry_to_resource.remove(id);
            }
            Change::ResourceUpserted(_)
            | Change::EventUpserted(_)
            | Change::TaskUpserted(_)
            | Change::EntryIdHighWater(_) => {}
        }
    }

    /// The timeline an entry change belongs to, if any.
    pub fn change_resource_id(change: &Change) -> Option<Id> {
        match change {
            Change::EntryCommitted(entry) => Some(entry.resource_id),
            Change::EntryRemoved { resource_id, .. } => Some(*resource_id),
            _ => None,
        }
    }

    /// Changes that recreate the current state, for WAL compaction.
    /// Timelines are read with `try_read`; a contended one is reported as `None`.
    pub fn snapshot(&self) -> Option<Vec<Change>> {
        let mut changes: Vec<Change> = Vec::new();
        changes.extend(self.list_resources().into_iter().map(Change::ResourceUpserted));
        changes.extend(self.list_events().into_iter().map(Change::EventUpserted));
        changes.extend(self.list_tasks().into_iter().map(Change::TaskUpserted));
        for id in self.timeline_ids() {
            let Some(tl) = self.get_timeline(&id) else { continue };
            let guard = tl.try_read().ok()?;
            changes.extend(guard.iter().cloned().map(Change::EntryCommitted));
        }
        Some(changes)
    }
}
