//! Multi-step wizard over one entity.
//!
//! The wizard is a state machine over the ordered step ids plus a terminal
//! [`Position::Complete`]. Leaving a step forward (`next`, `finish`,
//! `jump_to`) runs validate-then-persist: the step's validator must pass,
//! then the patch restricted to the step's fields is sent to the store, and
//! only after the store accepts it does the baseline move and the position
//! advance. `back` never validates or persists.
//!
//! The async transitions compose two synchronous halves, [`prepare`] and
//! [`complete_persist`], which callers driving their own event loop can use
//! directly. While a persist is in flight no other forward transition may
//! start, and its resolution is applied even if the user navigated back in
//! the meantime.
//!
//! [`prepare`]: WizardStepController::prepare
//! [`complete_persist`]: WizardStepController::complete_persist

use std::collections::BTreeSet;
use std::sync::Arc;

use formsync_core::{
    diff_fields, ClearPolicy, DependencyGraph, DiffPolicy, EntitySchema, FieldPath, GraphError,
    Patch, Record, Snapshot, Value, WorkingState,
};
use formsync_storage::{RecordStore, StorageError};
use tracing::{debug, info, warn};

use crate::cascade::{CascadeError, CascadingFieldController, SetOutcome};
use crate::step::{StepDefinition, ValidationIssue};

// ──────────────────────────────────────────────
// Types
// ──────────────────────────────────────────────

/// Where the session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Step(usize),
    Complete,
}

/// A forward transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Next,
    Finish,
    JumpTo(usize),
}

/// A validated step whose patch must be persisted before the transition
/// can finish. Produced by [`WizardStepController::prepare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPersist {
    step: usize,
    target: Position,
    patch: Patch,
}

impl PendingPersist {
    /// Index of the step being left.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn target(&self) -> Position {
        self.target
    }

    pub fn patch(&self) -> &Patch {
        &self.patch
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WizardError {
    /// The current step's validator rejected the working state. Nothing
    /// was sent to the store.
    #[error("step '{step}' failed validation ({} issue(s))", .issues.len())]
    Validation {
        step: String,
        issues: Vec<ValidationIssue>,
    },

    /// The store rejected or failed the patch. State is unchanged; the
    /// transition may be retried.
    #[error("persist failed: {0}")]
    Persist(#[from] StorageError),

    #[error("a persist for this session is already in flight")]
    PersistInFlight,

    #[error("already at the last step; use finish")]
    AtLastStep,

    #[error("step '{step}' is not the last step; use next")]
    NotLastStep { step: String },

    #[error("unknown step '{step}'")]
    UnknownStep { step: String },

    #[error("cannot jump to step '{step}' before the steps leading to it are completed")]
    JumpNotAllowed { step: String },

    #[error("the wizard is already complete")]
    SessionComplete,

    #[error("a wizard needs at least one step")]
    NoSteps,

    #[error("duplicate step id '{step}'")]
    DuplicateStep { step: String },

    #[error(transparent)]
    Config(#[from] GraphError),

    #[error(transparent)]
    Cascade(#[from] CascadeError),
}

// ──────────────────────────────────────────────
// Controller
// ──────────────────────────────────────────────

/// Drives one entity-edit session through its steps.
pub struct WizardStepController<S: RecordStore + ?Sized> {
    store: Arc<S>,
    entity_id: String,
    steps: Vec<StepDefinition>,
    cascade: CascadingFieldController,
    snapshot: Snapshot,
    policy: DiffPolicy,
    position: Position,
    visited: BTreeSet<usize>,
    completed: BTreeSet<usize>,
    issues: Vec<ValidationIssue>,
    in_flight: Option<usize>,
}

impl<S: RecordStore + ?Sized> WizardStepController<S> {
    /// Start a session on the first step with `snapshot` as baseline.
    pub fn new(
        store: Arc<S>,
        entity_id: impl Into<String>,
        steps: Vec<StepDefinition>,
        graph: Arc<DependencyGraph>,
        snapshot: Snapshot,
    ) -> Result<Self, WizardError> {
        if steps.is_empty() {
            return Err(WizardError::NoSteps);
        }
        let mut ids = BTreeSet::new();
        for step in &steps {
            if !ids.insert(step.id.as_str()) {
                return Err(WizardError::DuplicateStep {
                    step: step.id.clone(),
                });
            }
        }

        Ok(WizardStepController {
            store,
            entity_id: entity_id.into(),
            steps,
            cascade: CascadingFieldController::new(graph, snapshot.fork()),
            snapshot,
            policy: DiffPolicy::default(),
            position: Position::Step(0),
            visited: BTreeSet::from([0]),
            completed: BTreeSet::new(),
            issues: Vec::new(),
            in_flight: None,
        })
    }

    pub fn with_diff_policy(mut self, policy: DiffPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clear_policy(mut self, policy: ClearPolicy) -> Self {
        self.cascade = self.cascade.with_clear_policy(policy);
        self
    }

    /// Seed the baseline from the store. An entity the store has never
    /// seen starts from an empty record.
    pub async fn load(
        store: Arc<S>,
        entity_id: impl Into<String>,
        steps: Vec<StepDefinition>,
        graph: Arc<DependencyGraph>,
    ) -> Result<Self, WizardError> {
        let entity_id = entity_id.into();
        let snapshot = load_snapshot(store.as_ref(), &entity_id).await?;
        Self::new(store, entity_id, steps, graph, snapshot)
    }

    /// Build steps, graph and policies from a schema.
    pub fn from_schema(
        store: Arc<S>,
        entity_id: impl Into<String>,
        schema: &EntitySchema,
        snapshot: Snapshot,
    ) -> Result<Self, WizardError> {
        let steps = schema.steps.iter().map(StepDefinition::from_schema).collect();
        let graph = Arc::new(schema.graph()?);
        Ok(Self::new(store, entity_id, steps, graph, snapshot)?
            .with_diff_policy(schema.diff)
            .with_clear_policy(schema.cascade.clear))
    }

    /// [`from_schema`](Self::from_schema) with the baseline read from the store.
    pub async fn load_from_schema(
        store: Arc<S>,
        entity_id: impl Into<String>,
        schema: &EntitySchema,
    ) -> Result<Self, WizardError> {
        let entity_id = entity_id.into();
        let snapshot = load_snapshot(store.as_ref(), &entity_id).await?;
        Self::from_schema(store, entity_id, schema, snapshot)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn current_step_id(&self) -> Option<&str> {
        match self.position {
            Position::Step(i) => Some(self.steps[i].id.as_str()),
            Position::Complete => None,
        }
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    pub fn is_completed(&self, step_id: &str) -> bool {
        self.index_of(step_id)
            .is_some_and(|i| self.completed.contains(&i))
    }

    pub fn is_persisting(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Issues from the last failed validation; cleared when a step
    /// validates.
    pub fn validation_issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn working(&self) -> &WorkingState {
        self.cascade.working()
    }

    pub fn cascade(&self) -> &CascadingFieldController {
        &self.cascade
    }

    pub fn cascade_mut(&mut self) -> &mut CascadingFieldController {
        &mut self.cascade
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.working().diff(&self.policy, &self.snapshot).is_empty()
    }

    pub fn dirty_fields(&self) -> Vec<FieldPath> {
        self.working().dirty_fields(&self.policy, &self.snapshot)
    }

    /// Write through the cascade.
    pub fn set_field(&mut self, path: &FieldPath, value: Value) -> Result<SetOutcome, WizardError> {
        Ok(self.cascade.set_field(path, value)?)
    }

    pub fn clear_field(&mut self, path: &FieldPath) -> Result<SetOutcome, WizardError> {
        Ok(self.cascade.clear_field(path)?)
    }

    /// A step may be jumped to once visited, or when it is the first step
    /// past everything completed. The current step counts as completed
    /// here since a jump only happens after it validates and persists.
    pub fn can_jump_to(&self, index: usize) -> bool {
        if index >= self.steps.len() {
            return false;
        }
        if self.visited.contains(&index) {
            return true;
        }
        let current = match self.position {
            Position::Step(i) => Some(i),
            Position::Complete => None,
        };
        let frontier = self.completed.iter().copied().chain(current).max();
        index == frontier.map_or(0, |f| f + 1)
    }

    fn index_of(&self, step_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == step_id)
    }

    // ── Transitions ───────────────────────────────────────────────────────────

    pub async fn next(&mut self) -> Result<(), WizardError> {
        self.run(Transition::Next).await
    }

    pub async fn finish(&mut self) -> Result<(), WizardError> {
        self.run(Transition::Finish).await
    }

    pub async fn jump_to(&mut self, step_id: &str) -> Result<(), WizardError> {
        let index = self.index_of(step_id).ok_or_else(|| WizardError::UnknownStep {
            step: step_id.to_string(),
        })?;
        self.run(Transition::JumpTo(index)).await
    }

    async fn run(&mut self, transition: Transition) -> Result<(), WizardError> {
        let Some(pending) = self.prepare(transition)? else {
            return Ok(());
        };
        let result = self.store.persist(&self.entity_id, &pending.patch).await;
        self.complete_persist(pending, result)
    }

    /// Step back without validation or persistence. A no-op on the first
    /// step. Allowed while a persist is in flight.
    pub fn back(&mut self) -> Result<(), WizardError> {
        let Position::Step(current) = self.position else {
            return Err(WizardError::SessionComplete);
        };
        if current > 0 {
            self.move_to(Position::Step(current - 1));
        }
        self.issues.clear();
        Ok(())
    }

    /// First half of a forward transition.
    ///
    /// Validates the current step and computes its patch. Returns
    /// `Ok(None)` when the transition already happened (nothing to persist,
    /// or a jump to the current step); otherwise the caller must persist
    /// the returned patch and hand the store's answer to
    /// [`complete_persist`](Self::complete_persist).
    pub fn prepare(&mut self, transition: Transition) -> Result<Option<PendingPersist>, WizardError> {
        let Position::Step(current) = self.position else {
            return Err(WizardError::SessionComplete);
        };
        if self.in_flight.is_some() {
            return Err(WizardError::PersistInFlight);
        }
        let last = self.steps.len() - 1;
        let target = match transition {
            Transition::Next if current < last => Position::Step(current + 1),
            Transition::Next => return Err(WizardError::AtLastStep),
            Transition::Finish if current == last => Position::Complete,
            Transition::Finish => {
                return Err(WizardError::NotLastStep {
                    step: self.steps[current].id.clone(),
                })
            }
            Transition::JumpTo(index) if index >= self.steps.len() => {
                return Err(WizardError::UnknownStep {
                    step: index.to_string(),
                })
            }
            Transition::JumpTo(index) if index == current => return Ok(None),
            Transition::JumpTo(index) if !self.can_jump_to(index) => {
                return Err(WizardError::JumpNotAllowed {
                    step: self.steps[index].id.clone(),
                })
            }
            Transition::JumpTo(index) => Position::Step(index),
        };

        let step = &self.steps[current];
        if let Err(issues) = step.validate(self.cascade.working()) {
            info!(
                target: "formsync.wizard",
                entity_id = %self.entity_id,
                step = %step.id,
                issues = issues.len(),
                "step failed validation"
            );
            self.issues = issues.clone();
            return Err(WizardError::Validation {
                step: step.id.clone(),
                issues,
            });
        }
        self.issues.clear();

        let patch = diff_fields(
            &self.policy,
            self.snapshot.record(),
            self.cascade.working().record(),
            &step.fields,
        );
        if patch.is_empty() {
            debug!(
                target: "formsync.wizard",
                entity_id = %self.entity_id,
                step = %step.id,
                "nothing to persist"
            );
            self.completed.insert(current);
            self.move_to(target);
            return Ok(None);
        }

        debug!(
            target: "formsync.wizard",
            entity_id = %self.entity_id,
            step = %step.id,
            fields = patch.len(),
            "persisting step"
        );
        self.in_flight = Some(current);
        Ok(Some(PendingPersist {
            step: current,
            target,
            patch,
        }))
    }

    /// Second half of a forward transition.
    ///
    /// On failure nothing changes and the error is returned. On success the
    /// persisted fields become the new baseline and the step is completed.
    /// The position only advances if the session is still on that step.
    pub fn complete_persist(
        &mut self,
        pending: PendingPersist,
        result: Result<Record, StorageError>,
    ) -> Result<(), WizardError> {
        self.in_flight = None;
        let persisted = match result {
            Ok(persisted) => persisted,
            Err(err) => {
                warn!(
                    target: "formsync.wizard",
                    entity_id = %self.entity_id,
                    step = %self.steps[pending.step].id,
                    error = %err,
                    "persist failed"
                );
                return Err(WizardError::Persist(err));
            }
        };

        let next = self.snapshot.rebase(&pending.patch, &persisted);
        self.cascade
            .working_mut()
            .adopt(&pending.patch, &persisted, &self.snapshot);
        self.snapshot = next;
        self.completed.insert(pending.step);

        if self.position == Position::Step(pending.step) {
            self.move_to(pending.target);
        } else {
            info!(
                target: "formsync.wizard",
                entity_id = %self.entity_id,
                step = %self.steps[pending.step].id,
                "persist resolved after navigating away"
            );
        }
        Ok(())
    }

    fn move_to(&mut self, position: Position) {
        if let Position::Step(i) = position {
            self.visited.insert(i);
        }
        self.position = position;
        info!(
            target: "formsync.wizard",
            entity_id = %self.entity_id,
            step = self.current_step_id().unwrap_or("complete"),
            "moved"
        );
    }
}

async fn load_snapshot<S: RecordStore + ?Sized>(
    store: &S,
    entity_id: &str,
) -> Result<Snapshot, StorageError> {
    match store.load(entity_id).await {
        Ok(record) => Ok(Snapshot::new(record)),
        Err(StorageError::EntityNotFound { .. }) => Ok(Snapshot::default()),
        Err(err) => Err(err),
    }
}
