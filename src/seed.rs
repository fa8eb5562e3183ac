//! Fixture loading for a fresh store.
//!
//! The document mirrors the business layer's export:
//!
//! ```json
//! {
//!   "resources": [{ "id": 1, "name": "Chef", "kind": "staff", "active": true }],
//!   "events":    [{ "id": 10, "name": "Gala" }],
//!   "tasks":     [{ "id": 100, "event_id": 10, "title": "Plating" }],
//!   "entries":   [{ "resource_id": 1, "event_id": 10, "task_id": 100,
//!                   "start_time": "2024-06-01T09:00:00Z",
//!                   "end_time": "2024-06-01T17:00:00Z" }]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::api::dto::parse_instant;
use crate::engine::{CommitMode, Engine, EngineError, NewEntry};
use crate::model::*;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("cannot read seed file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed seed file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("seed entry {index}: {message}")]
    Entry { index: usize, message: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedDocument {
    pub resources: Vec<Resource>,
    pub events: Vec<CateringEvent>,
    pub tasks: Vec<Task>,
    pub entries: Vec<SeedEntry>,
}

#[derive(Debug, Deserialize)]
pub struct SeedEntry {
    pub resource_id: Id,
    pub event_id: Id,
    #[serde(default)]
    pub task_id: Option<Id>,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub resources: usize,
    pub events: usize,
    pub tasks: usize,
    pub entries: usize,
}

impl SeedDocument {
    pub fn from_file(path: &Path) -> Result<Self, SeedError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SeedError> {
        Ok(serde_json::from_str(raw)?)
    }

    fn new_entries(&self) -> Result<Vec<NewEntry>, SeedError> {
        self.entries
            .iter()
            .enumerate()
            .map(|(index, e)| {
                let start = parse_instant("start_time", &e.start_time)
                    .map_err(|message| SeedError::Entry { index, message })?;
                let end = parse_instant("end_time", &e.end_time)
                    .map_err(|message| SeedError::Entry { index, message })?;
                Ok(NewEntry {
                    resource_id: e.resource_id,
                    event_id: e.event_id,
                    task_id: e.task_id,
                    start,
                    end,
                    note: e.note.clone(),
                })
            })
            .collect()
    }

    /// Write the catalog, then the entries. Seeded entries are historical
    /// data, so overlaps among them are kept as-is.
    pub async fn apply(&self, engine: &Engine) -> Result<SeedSummary, SeedError> {
        let entries = self.new_entries()?;
        for resource in &self.resources {
            engine.upsert_resource(resource.clone()).await?;
        }
        for event in &self.events {
            engine.upsert_event(event.clone()).await?;
        }
        for task in &self.tasks {
            engine.upsert_task(task.clone()).await?;
        }
        for entry in entries {
            engine
                .commit_assignment(vec![entry], None, CommitMode::Unchecked)
                .await?;
        }
        Ok(SeedSummary {
            resources: self.resources.len(),
            events: self.events.len(),
            tasks: self.tasks.len(),
            entries: self.entries.len(),
        })
    }
}

/// Load `path` into `engine` unless the store already holds data.
pub async fn seed_if_empty(engine: &Engine, path: &Path) -> Result<Option<SeedSummary>, SeedError> {
    if engine.store.resource_count() > 0 {
        tracing::info!(path = %path.display(), "store not empty, seed file ignored");
        return Ok(None);
    }
    let doc = SeedDocument::from_file(path)?;
    let summary = doc.apply(engine).await?;
    tracing::info!(
        path = %path.display(),
        resources = summary.resources,
        events = summary.events,
        tasks = summary.tasks,
        entries = summary.entries,
        "store seeded"
    );
    Ok(Some(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "resources": [
            { "id": 1, "name": "Chef", "kind": "staff", "active": true },
            { "id": 2, "name": "Oven", "kind": "equipment", "active": true }
        ],
        "events": [{ "id": 10, "name": "Gala" }],
        "tasks": [{ "id": 100, "event_id": 10, "title": "Plating" }],
        "entries": [
            { "resource_id": 1, "event_id": 10, "task_id": 100,
              "start_time": "2024-06-01T09:00:00Z", "end_time": "2024-06-01T17:00:00Z" },
            { "resource_id": 1, "event_id": 10,
              "start_time": "2024-06-01T10:00:00Z", "end_time": "2024-06-01T11:00:00Z" }
        ]
    }"#;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("conflictd_test_seed");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(format!("{name}.wal"));
        let _ = std::fs::remove_file(&path);
        path
    }

    #[tokio::test]
    async fn seeds_catalog_and_overlapping_history() {
        let engine = Engine::new(test_wal_path("seed_apply")).unwrap();
        let doc = SeedDocument::from_json(FIXTURE).unwrap();
        let summary = doc.apply(&engine).await.unwrap();
        assert_eq!(summary.resources, 2);
        assert_eq!(summary.entries, 2);
        assert_eq!(engine.store.resource_name(&1), "Chef");
        assert_eq!(engine.entries_for_resource(1).await.len(), 2);
        assert!(engine.entries_for_resource(2).await.is_empty());
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let doc = SeedDocument::from_json(r#"{ "events": [{ "id": 1, "name": "Brunch" }] }"#).unwrap();
        assert!(doc.resources.is_empty());
        assert_eq!(doc.events.len(), 1);
    }

    #[tokio::test]
    async fn bad_timestamp_names_the_entry() {
        let engine = Engine::new(test_wal_path("seed_bad_ts")).unwrap();
        let doc = SeedDocument::from_json(
            r#"{ "entries": [{ "resource_id": 1, "event_id": 1,
                 "start_time": "yesterday", "end_time": "2024-06-01T17:00:00Z" }] }"#,
        )
        .unwrap();
        match doc.apply(&engine).await {
            Err(SeedError::Entry { index, .. }) => assert_eq!(index, 0),
            other => panic!("expected entry error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_empty_store_is_left_alone() {
        let path = test_wal_path("seed_non_empty");
        let engine = Engine::new(path.clone()).unwrap();
        engine
            .upsert_resource(Resource {
                id: 7,
                name: "Van".into(),
                kind: ResourceKind::Equipment,
                active: true,
            })
            .await
            .unwrap();
        let fixture = path.with_extension("json");
        std::fs::write(&fixture, FIXTURE).unwrap();
        assert!(seed_if_empty(&engine, &fixture).await.unwrap().is_none());
        assert!(engine.store.get_resource(&1).is_none());
    }
}
