//! Assignment orchestration: check with the Conflict API, decide, then write.
//!
//! This is the contract the business layer honors when it books resources.
//! The check is advisory and goes over HTTP; the write goes to the schedule
//! store as one all-or-nothing unit. When the check cannot be made, the
//! assignment still proceeds under the degraded-mode fallback.

mod breaker;
mod client;

pub use breaker::{BreakerState, CircuitBreaker};
pub use client::{CheckError, ConflictChecker, ConflictClient};

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::OrchestratorConfig;
use crate::engine::{CommitMode, Engine, EngineError, NewEntry};
use crate::model::*;
use crate::observability::{DEGRADED_FALLBACKS_TOTAL, FORCED_OVERRIDES_TOTAL};

/// Advisory shown to the end user when the check could not be made.
pub const DEGRADED_WARNING: &str =
    "Conflict checking was unavailable; the assignment was saved without checking for overlaps.";

/// Advisory attached when the check was unavailable and the store itself
/// refused the write; the conflicts come from the write-side check.
pub const DEGRADED_REJECT_WARNING: &str =
    "Conflict checking was unavailable; the overlaps below were found while saving and nothing was saved.";

/// The store-side half of an assignment.
#[async_trait]
pub trait ScheduleWriter: Send + Sync {
    async fn commit(
        &self,
        entries: Vec<NewEntry>,
        replaces: Option<Id>,
        mode: CommitMode,
    ) -> Result<Vec<ScheduleEntry>, EngineError>;
}

#[async_trait]
impl ScheduleWriter for Engine {
    async fn commit(
        &self,
        entries: Vec<NewEntry>,
        replaces: Option<Id>,
        mode: CommitMode,
    ) -> Result<Vec<ScheduleEntry>, EngineError> {
        self.commit_assignment(entries, replaces, mode).await
    }
}

#[async_trait]
impl<T: ScheduleWriter + ?Sized> ScheduleWriter for Arc<T> {
    async fn commit(
        &self,
        entries: Vec<NewEntry>,
        replaces: Option<Id>,
        mode: CommitMode,
    ) -> Result<Vec<ScheduleEntry>, EngineError> {
        (**self).commit(entries, replaces, mode).await
    }
}

/// One user-facing "assign these resources to this event/task" action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentRequest {
    pub event_id: Id,
    pub task_id: Option<Id>,
    pub resource_ids: Vec<Id>,
    pub start: Ms,
    pub end: Ms,
    pub note: Option<String>,
    /// Commit even if overlaps are reported.
    pub force: bool,
    /// Entry being edited: excluded from the check and superseded by the write.
    pub replaces: Option<Id>,
}

impl AssignmentRequest {
    pub fn new(event_id: Id, resource_ids: Vec<Id>, start: Ms, end: Ms) -> Self {
        Self {
            event_id,
            task_id: None,
            resource_ids,
            start,
            end,
            note: None,
            force: false,
            replaces: None,
        }
    }

    pub fn for_task(mut self, task_id: Id) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn replacing(mut self, entry_id: Id) -> Self {
        self.replaces = Some(entry_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedAssignment {
    pub entries: Vec<ScheduleEntry>,
    /// Overlaps the caller forced through. Empty unless `force` was set.
    pub overridden: Vec<ConflictResult>,
    /// Degraded-mode advisory for the end user.
    pub warning: Option<String>,
}

impl CommittedAssignment {
    pub fn is_override(&self) -> bool {
        !self.overridden.is_empty()
    }

    pub fn is_degraded(&self) -> bool {
        self.warning.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentOutcome {
    Committed(CommittedAssignment),
    /// Nothing was written.
    Rejected {
        conflicts: Vec<ConflictResult>,
        warning: Option<String>,
    },
}

impl AssignmentOutcome {
    pub fn committed(&self) -> Option<&CommittedAssignment> {
        match self {
            AssignmentOutcome::Committed(c) => Some(c),
            AssignmentOutcome::Rejected { .. } => None,
        }
    }

    pub fn conflicts(&self) -> &[ConflictResult] {
        match self {
            AssignmentOutcome::Committed(c) => &c.overridden,
            AssignmentOutcome::Rejected { conflicts, .. } => conflicts,
        }
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            AssignmentOutcome::Committed(c) => c.warning.as_deref(),
            AssignmentOutcome::Rejected { warning, .. } => warning.as_deref(),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid assignment: {0}")]
    Invalid(#[source] EngineError),
    #[error(transparent)]
    CheckRejected(CheckError),
    #[error("schedule write failed: {0}")]
    Write(#[source] EngineError),
}

enum CheckOutcome {
    Checked(ConflictReport),
    Degraded(String),
}

pub struct Orchestrator<C, W> {
    checker: C,
    writer: W,
    breaker: Arc<CircuitBreaker>,
    enforce_exclusion: bool,
}

impl<C: ConflictChecker, W: ScheduleWriter> Orchestrator<C, W> {
    pub fn new(checker: C, writer: W, breaker: Arc<CircuitBreaker>) -> Self {
        Self {
            checker,
            writer,
            breaker,
            enforce_exclusion: true,
        }
    }

    /// Re-validate overlaps under the store's write locks on unforced commits.
    pub fn with_exclusion(mut self, enforce: bool) -> Self {
        self.enforce_exclusion = enforce;
        self
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    async fn run_check(&self, query: &ConflictQuery) -> Result<CheckOutcome, OrchestratorError> {
        if !self.breaker.should_attempt() {
            return Ok(CheckOutcome::Degraded(
                self.breaker
                    .last_error()
                    .unwrap_or_else(|| "conflict check skipped while degraded".into()),
            ));
        }
        match self.checker.check(query).await {
            Ok(report) => {
                self.breaker.record_success();
                Ok(CheckOutcome::Checked(report))
            }
            Err(e) if e.triggers_fallback() => {
                let reason = e.to_string();
                self.breaker.record_failure(&reason);
                Ok(CheckOutcome::Degraded(reason))
            }
            Err(e) => Err(OrchestratorError::CheckRejected(e)),
        }
    }

    /// Check, decide, write.
    pub async fn assign(&self, req: AssignmentRequest) -> Result<AssignmentOutcome, OrchestratorError> {
        let query = ConflictQuery::new(&req.resource_ids, req.start, req.end, req.replaces)
            .map_err(OrchestratorError::Invalid)?;

        let mut overridden = Vec::new();
        let mut warning = None;
        match self.run_check(&query).await? {
            CheckOutcome::Checked(report) if report.has_conflicts() && !req.force => {
                tracing::info!(
                    event_id = req.event_id,
                    conflicts = report.conflicts.len(),
                    "assignment rejected: resources already booked"
                );
                return Ok(AssignmentOutcome::Rejected {
                    conflicts: report.conflicts,
                    warning: None,
                });
            }
            CheckOutcome::Checked(report) => {
                if report.has_conflicts() {
                    tracing::warn!(
                        event_id = req.event_id,
                        task_id = ?req.task_id,
                        conflicts = report.conflicts.len(),
                        "forced override of conflicting assignment"
                    );
                    metrics::counter!(FORCED_OVERRIDES_TOTAL).increment(1);
                }
                overridden = report.conflicts;
            }
            CheckOutcome::Degraded(reason) => {
                tracing::warn!(
                    event_id = req.event_id,
                    task_id = ?req.task_id,
                    resources = ?query.resource_ids,
                    %reason,
                    "conflict check unavailable, assuming no conflicts"
                );
                metrics::counter!(DEGRADED_FALLBACKS_TOTAL).increment(1);
                warning = Some(DEGRADED_WARNING.to_string());
            }
        }

        let mode = if self.enforce_exclusion && !req.force {
            CommitMode::Exclusive
        } else {
            CommitMode::Unchecked
        };
        let entries = query
            .resource_ids
            .iter()
            .map(|&resource_id| NewEntry {
                resource_id,
                event_id: req.event_id,
                task_id: req.task_id,
                start: query.span.start,
                end: query.span.end,
                note: req.note.clone(),
            })
            .collect();

        match self.writer.commit(entries, req.replaces, mode).await {
            Ok(entries) => Ok(AssignmentOutcome::Committed(CommittedAssignment {
                entries,
                overridden,
                warning,
            })),
            Err(EngineError::Overlap(conflicts)) => {
                tracing::warn!(
                    event_id = req.event_id,
                    conflicts = conflicts.len(),
                    degraded = warning.is_some(),
                    "overlap detected at commit, assignment rejected"
                );
                Ok(AssignmentOutcome::Rejected {
                    conflicts,
                    warning: warning.map(|_| DEGRADED_REJECT_WARNING.to_string()),
                })
            }
            Err(e) if e.is_validation() => Err(OrchestratorError::Invalid(e)),
            Err(e) => Err(OrchestratorError::Write(e)),
        }
    }
}

impl<W: ScheduleWriter> Orchestrator<ConflictClient, W> {
    /// HTTP checker and breaker built from configuration.
    pub fn from_config(config: &OrchestratorConfig, writer: W) -> Result<Self, CheckError> {
        let client = ConflictClient::new(&config.base_url, config.check_timeout)?;
        let breaker = Arc::new(CircuitBreaker::new(config.probe_cooldown));
        Ok(Self::new(client, writer, breaker).with_exclusion(config.enforce_exclusion))
    }
}
