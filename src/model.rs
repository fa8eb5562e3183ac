use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unix milliseconds, the only time type inside the store.
pub type Ms = i64;

/// Identifier shared with the business layer's schema.
pub type Id = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching spans (`a.end == b.start`) do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

pub fn ms_to_datetime(ms: Ms) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub fn datetime_to_ms(dt: &DateTime<Utc>) -> Ms {
    dt.timestamp_millis()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Staff,
    Equipment,
    Materials,
}

/// A bookable entity. Owned by the business layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: Id,
    pub name: String,
    pub kind: ResourceKind,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CateringEvent {
    pub id: Id,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Id,
    pub event_id: Id,
    pub title: String,
}

/// One committed booking of one resource for one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: Id,
    pub resource_id: Id,
    pub event_id: Id,
    pub task_id: Option<Id>,
    pub span: Span,
    pub note: Option<String>,
}

/// Duration class of an entry: `c` such that `2^(c-1) <= duration < 2^c`.
fn lane_of(duration: Ms) -> u32 {
    64 - (duration.max(1) as u64).leading_zeros()
}

/// All entries of one resource, indexed for overlap lookups.
///
/// Entries are split into lanes by duration class, each lane sorted by
/// `span.start`. Every entry in lane `c` is shorter than `2^c` ms, so an
/// entry overlapping `[s, e)` must start in `(s - 2^c, e)`. A lookup is two
/// binary searches per occupied lane, and a long booking only widens the
/// search in its own lane.
#[derive(Debug, Clone)]
pub struct ResourceTimeline {
    pub resource_id: Id,
    lanes: BTreeMap<u32, Vec<ScheduleEntry>>,
    /// entry id -> (lane, start)
    index: HashMap<Id, (u32, Ms)>,
}

impl ResourceTimeline {
    pub fn new(resource_id: Id) -> Self {
        Self {
            resource_id,
            lanes: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Entries in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &ScheduleEntry> {
        self.lanes.values().flatten()
    }

    /// Entries sorted by start, ties by id.
    pub fn to_vec(&self) -> Vec<ScheduleEntry> {
        let mut out: Vec<ScheduleEntry> = self.iter().cloned().collect();
        out.sort_by_key(|e| (e.span.start, e.id));
        out
    }

    pub fn insert_entry(&mut self, entry: ScheduleEntry) {
        let lane_id = lane_of(entry.span.duration_ms());
        if let Some((old_lane, old_start)) = self.index.insert(entry.id, (lane_id, entry.span.start)) {
            self.take(entry.id, old_lane, old_start);
        }
        let lane = self.lanes.entry(lane_id).or_default();
        let pos = lane.partition_point(|e| e.span.start <= entry.span.start);
        lane.insert(pos, entry);
    }

    pub fn remove_entry(&mut self, id: Id) -> Option<ScheduleEntry> {
        let (lane_id, start) = self.index.remove(&id)?;
        self.take(id, lane_id, start)
    }

    fn take(&mut self, id: Id, lane_id: u32, start: Ms) -> Option<ScheduleEntry> {
        let lane = self.lanes.get_mut(&lane_id)?;
        let from = lane.partition_point(|e| e.span.start < start);
        let offset = lane[from..]
            .iter()
            .take_while(|e| e.span.start == start)
            .position(|e| e.id == id)?;
        let removed = lane.remove(from + offset);
        if lane.is_empty() {
            self.lanes.remove(&lane_id);
        }
        Some(removed)
    }

    pub fn get_entry(&self, id: Id) -> Option<&ScheduleEntry> {
        let (lane_id, start) = self.index.get(&id)?;
        let lane = self.lanes.get(lane_id)?;
        let from = lane.partition_point(|e| e.span.start < *start);
        lane[from..]
            .iter()
            .take_while(|e| e.span.start == *start)
            .find(|e| e.id == id)
    }

    /// Per lane, the slice of entries starting in `(query.start - 2^c, query.end)`.
    fn candidates<'a>(&'a self, query: &Span) -> impl Iterator<Item = &'a [ScheduleEntry]> + use<'a> {
        let query = *query;
        self.lanes.iter().map(move |(lane_id, lane)| {
            let bound = if *lane_id >= 63 { Ms::MAX } else { 1 << lane_id };
            let floor = query.start.saturating_sub(bound);
            let right = lane.partition_point(|e| e.span.start < query.end);
            let left = lane[..right].partition_point(|e| e.span.start <= floor);
            &lane[left..right]
        })
    }

    /// Entries whose span overlaps the query window, sorted by start.
    pub fn overlapping(&self, query: &Span) -> Vec<&ScheduleEntry> {
        let mut out: Vec<&ScheduleEntry> = self
            .candidates(query)
            .flatten()
            .filter(|e| e.span.end > query.start)
            .collect();
        out.sort_by_key(|e| (e.span.start, e.id));
        out
    }
}

/// Log record format. Every store mutation is one of these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Change {
    ResourceUpserted(Resource),
    EventUpserted(CateringEvent),
    TaskUpserted(Task),
    EntryCommitted(ScheduleEntry),
    EntryRemoved { id: Id, resource_id: Id },
    /// Highest entry id ever handed out. Written by compaction so ids of
    /// removed entries are never reissued.
    EntryIdHighWater(Id),
}

impl Change {
    /// Entry id this record proves was allocated, if any.
    pub fn allocated_entry_id(&self) -> Option<Id> {
        match self {
            Change::EntryCommitted(entry) => Some(entry.id),
            Change::EntryRemoved { id, .. } => Some(*id),
            Change::EntryIdHighWater(id) => Some(*id),
            _ => None,
        }
    }
}

// ── Query and result types ───────────────────────────────────────

/// Ephemeral request value for an overlap check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictQuery {
    pub resource_ids: Vec<Id>,
    pub span: Span,
    pub exclude_entry_id: Option<Id>,
}

/// One overlap between the requested window and an existing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictResult {
    pub resource_id: Id,
    pub resource_name: String,
    pub entry_id: Id,
    pub event_id: Id,
    pub event_name: String,
    pub task_id: Option<Id>,
    pub task_title: Option<String>,
    pub existing: Span,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConflictReport {
    pub conflicts: Vec<ConflictResult>,
}

impl ConflictReport {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Entry as listed for calendar display, with names resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookedEntry {
    pub id: Id,
    pub event_id: Id,
    pub event_name: String,
    pub task_id: Option<Id>,
    pub task_title: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthReport {
    pub store_reachable: bool,
}
