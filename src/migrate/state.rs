//! Migration attempt state machine

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::backup::BackupRecord;

/// States a migration attempt moves through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationState {
    Idle,
    Validating,
    Snapshotting,
    Applying,
    Verifying,
    Committed,
    RollingBack,
    RolledBack,
    FailedNoRollback,
}

impl MigrationState {
    /// Whether an attempt may move from `self` to `next`
    pub fn can_transition_to(self, next: MigrationState) -> bool {
        use MigrationState::*;

        matches!(
            (self, next),
            (Idle, Validating)
                | (Validating, Snapshotting)
                | (Validating, Applying)
                | (Snapshotting, Applying)
                | (Snapshotting, FailedNoRollback)
                | (Applying, Verifying)
                | (Applying, RollingBack)
                | (Applying, FailedNoRollback)
                | (Verifying, Committed)
                | (Verifying, RollingBack)
                | (Verifying, FailedNoRollback)
                | (RollingBack, RolledBack)
                | (RollingBack, FailedNoRollback)
        )
    }
}

impl std::fmt::Display for MigrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            MigrationState::Idle => "IDLE",
            MigrationState::Validating => "VALIDATING",
            MigrationState::Snapshotting => "SNAPSHOTTING",
            MigrationState::Applying => "APPLYING",
            MigrationState::Verifying => "VERIFYING",
            MigrationState::Committed => "COMMITTED",
            MigrationState::RollingBack => "ROLLING_BACK",
            MigrationState::RolledBack => "ROLLED_BACK",
            MigrationState::FailedNoRollback => "FAILED_NO_ROLLBACK",
        };
        write!(f, "{}", label)
    }
}

/// How an attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationOutcome {
    Committed,
    RolledBack,
    FailedNoRollback,
    /// Pending migrations were reported and nothing was changed
    DryRun,
}

impl std::fmt::Display for MigrationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationOutcome::Committed => write!(f, "committed"),
            MigrationOutcome::RolledBack => write!(f, "rolled back"),
            MigrationOutcome::FailedNoRollback => write!(f, "failed without rollback"),
            MigrationOutcome::DryRun => write!(f, "dry run"),
        }
    }
}

/// One invocation of `migrate`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationAttempt {
    pub id: Uuid,
    pub environment: String,
    /// Pre-migration snapshot; rollback is only possible when present
    pub snapshot: Option<BackupRecord>,
    /// Migrations pending when the attempt started
    pub pending: Vec<String>,
    /// Migrations the apply step reported
    pub applied: Vec<String>,
    /// Every state visited, in order
    pub states: Vec<MigrationState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: Option<MigrationOutcome>,
}

impl MigrationAttempt {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            environment: environment.into(),
            snapshot: None,
            pending: Vec::new(),
            applied: Vec::new(),
            states: vec![MigrationState::Idle],
            started_at: Utc::now(),
            finished_at: None,
            outcome: None,
        }
    }

    /// The state the attempt is currently in
    pub fn state(&self) -> MigrationState {
        self.states
            .last()
            .copied()
            .unwrap_or(MigrationState::Idle)
    }

    /// Move to `next`, recording it
    ///
    /// Illegal transitions are a programming error and only checked in
    /// debug builds.
    pub(crate) fn transition(&mut self, next: MigrationState) {
        let current = self.state();
        debug_assert!(
            current.can_transition_to(next),
            "illegal migration transition {} -> {}",
            current,
            next
        );
        tracing::info!(attempt = %self.id, from = %current, to = %next, "migration state change");
        self.states.push(next);
    }

    /// Record the final outcome and finish time
    pub(crate) fn finish(&mut self, outcome: MigrationOutcome) {
        self.outcome = Some(outcome);
        self.finished_at = Some(Utc::now());
    }

    pub fn outcome_label(&self) -> String {
        match self.outcome {
            Some(outcome) => outcome.to_string(),
            None => format!("in state {}", self.state()),
        }
    }

    /// Whether a rollback is possible for this attempt
    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }
}
