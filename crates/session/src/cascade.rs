//! Dependent-field cascade and option-fetch bookkeeping.
//!
//! Every write goes through [`CascadingFieldController::set_field`] (or
//! [`clear_field`](CascadingFieldController::clear_field)). When the write
//! changes an upstream field, its transitive dependents are cleared in
//! topological order and marked blocked until their option lists arrive.
//!
//! Option fetches are modelled as [`FetchTicket`]s. Each dependent field
//! carries its own generation counter; a ticket is only honoured if its
//! generation is still the field's current one, so a slow response for an
//! old upstream selection can never overwrite a newer one.

use std::collections::BTreeMap;
use std::sync::Arc;

use formsync_core::{
    compare, ClearPolicy, DependencyGraph, FieldPath, PathError, Record, Value, WorkingState,
};
use tracing::{debug, info, warn};

use crate::options::{OptionError, OptionItem, OptionSource};

// ──────────────────────────────────────────────
// Types
// ──────────────────────────────────────────────

/// Whether a field's control may be edited.
///
/// Callers must keep the control disabled while `Blocked` or `Loading`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Ready,
    Loading,
    Blocked,
}

/// A pending option fetch for one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub field: FieldPath,
    pub generation: u64,
    /// Direct upstream values the options must be fetched for.
    pub upstream: Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    /// The field moved on to a newer generation; the result was dropped.
    Stale,
}

/// What a write did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SetOutcome {
    /// False when the write was a no-op.
    pub changed: bool,
    /// Dependents cleared by the cascade, upstream before downstream.
    pub cleared: Vec<FieldPath>,
    /// Fetches the caller should run now.
    pub fetches: Vec<FetchTicket>,
}

#[derive(Debug, thiserror::Error)]
pub enum CascadeError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("cannot load options for '{field}': upstream '{upstream}' is unset")]
    UpstreamUnset { field: String, upstream: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum Phase {
    #[default]
    Idle,
    /// A ticket is out but has not started.
    Requested,
    Loading,
    Ready,
    Failed(OptionError),
}

#[derive(Debug, Clone, Default)]
struct FieldState {
    generation: u64,
    phase: Phase,
    options: Vec<OptionItem>,
}

// ──────────────────────────────────────────────
// Controller
// ──────────────────────────────────────────────

/// Owns a session's [`WorkingState`] and keeps dependent fields consistent
/// with their upstreams.
#[derive(Debug, Clone)]
pub struct CascadingFieldController {
    graph: Arc<DependencyGraph>,
    policy: ClearPolicy,
    working: WorkingState,
    fields: BTreeMap<FieldPath, FieldState>,
}

impl CascadingFieldController {
    pub fn new(graph: Arc<DependencyGraph>, working: WorkingState) -> Self {
        CascadingFieldController {
            graph,
            policy: ClearPolicy::default(),
            working,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_clear_policy(mut self, policy: ClearPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn clear_policy(&self) -> ClearPolicy {
        self.policy
    }

    pub fn working(&self) -> &WorkingState {
        &self.working
    }

    pub(crate) fn working_mut(&mut self) -> &mut WorkingState {
        &mut self.working
    }

    // ── Writes ────────────────────────────────────────────────────────────────

    /// Write `value` at `path` and cascade to dependents if an upstream
    /// field changed. Writing a structurally equal value is a no-op.
    pub fn set_field(&mut self, path: &FieldPath, value: Value) -> Result<SetOutcome, CascadeError> {
        if compare::equal_opt(self.working.get(path), Some(&value)) {
            return Ok(SetOutcome::default());
        }
        let availability = self.availability(path);
        if availability != Availability::Ready {
            warn!(
                target: "formsync.cascade",
                field = %path,
                ?availability,
                "write to a field that is not ready"
            );
        }

        let before = self.upstream_values(path);
        self.working.set(path, value)?;
        self.after_write(path, before)
    }

    /// Clear the value at `path` according to the clear policy and cascade
    /// like [`set_field`](Self::set_field).
    pub fn clear_field(&mut self, path: &FieldPath) -> Result<SetOutcome, CascadeError> {
        let current = self.working.get(path).cloned();
        if current.is_none() {
            return Ok(SetOutcome::default());
        }
        let before = self.upstream_values(path);
        self.clear_value(path)?;
        if compare::equal_opt(current.as_ref(), self.working.get(path)) {
            return Ok(SetOutcome::default());
        }
        self.after_write(path, before)
    }

    /// Current values of every upstream field the write to `path` can touch.
    fn upstream_values(&self, path: &FieldPath) -> Vec<(FieldPath, Option<Value>)> {
        self.graph
            .upstreams_touching(path)
            .map(|u| (u.clone(), self.working.get(u).cloned()))
            .collect()
    }

    fn after_write(
        &mut self,
        path: &FieldPath,
        before: Vec<(FieldPath, Option<Value>)>,
    ) -> Result<SetOutcome, CascadeError> {
        let changed: Vec<FieldPath> = before
            .into_iter()
            .filter(|(u, old)| !compare::equal_opt(old.as_ref(), self.working.get(u)))
            .map(|(u, _)| u)
            .collect();

        let mut outcome = SetOutcome {
            changed: true,
            ..SetOutcome::default()
        };
        if changed.is_empty() {
            return Ok(outcome);
        }

        outcome.cleared = self.graph.invalidate_many(&changed);
        for field in &outcome.cleared {
            self.clear_value(field)?;
            let state = self.fields.entry(field.clone()).or_default();
            state.generation += 1;
            state.phase = Phase::Idle;
            state.options.clear();
        }
        for field in &outcome.cleared {
            if self.upstreams_set(field) {
                outcome.fetches.push(self.issue(field));
            }
        }

        info!(
            target: "formsync.cascade",
            field = %path,
            cleared = outcome.cleared.len(),
            fetches = outcome.fetches.len(),
            "upstream changed, dependents cleared"
        );
        Ok(outcome)
    }

    /// `Delete` marks only top-level fields that hold a value and keeps
    /// existing markers; nested fields are always removed since their
    /// parent is patched whole.
    fn clear_value(&mut self, field: &FieldPath) -> Result<(), PathError> {
        let marks = self.policy == ClearPolicy::Delete && field.is_top_level();
        match self.working.get(field) {
            Some(Value::Delete) if marks => {}
            Some(value) if marks && value.is_set() => {
                self.working.set(field, Value::Delete)?;
            }
            _ => {
                self.working.unset(field);
            }
        }
        Ok(())
    }

    // ── Option fetches ────────────────────────────────────────────────────────

    fn upstreams_set(&self, field: &FieldPath) -> bool {
        self.graph
            .upstreams(field)
            .iter()
            .all(|u| self.working.is_set(u))
    }

    fn ticket(&self, field: &FieldPath) -> FetchTicket {
        let upstream = self
            .graph
            .upstreams(field)
            .iter()
            .filter_map(|u| self.working.get(u).map(|v| (u.to_string(), v.clone())))
            .collect();
        FetchTicket {
            field: field.clone(),
            generation: self.generation(field),
            upstream,
        }
    }

    /// Issue a fresh ticket for `path`: the first load of a root field's
    /// options, or a retry after a failed fetch. Any ticket issued earlier
    /// for the same field becomes stale.
    pub fn request_options(&mut self, path: &FieldPath) -> Result<FetchTicket, CascadeError> {
        if let Some(upstream) = self
            .graph
            .upstreams(path)
            .iter()
            .find(|u| !self.working.is_set(u))
        {
            return Err(CascadeError::UpstreamUnset {
                field: path.to_string(),
                upstream: upstream.to_string(),
            });
        }
        let state = self.fields.entry(path.clone()).or_default();
        state.generation += 1;
        state.options.clear();
        Ok(self.issue(path))
    }

    /// Mark `field` as waiting on the ticket returned.
    fn issue(&mut self, field: &FieldPath) -> FetchTicket {
        self.fields.entry(field.clone()).or_default().phase = Phase::Requested;
        self.ticket(field)
    }

    /// Tickets for every dependent field whose upstreams are set but whose
    /// options were never requested. Used right after a session is seeded;
    /// fields with a ticket already out are skipped, so calling it again
    /// never stales a ticket the caller holds.
    pub fn initial_fetches(&mut self) -> Vec<FetchTicket> {
        let pending: Vec<FieldPath> = self
            .graph
            .topological_order()
            .into_iter()
            .filter(|f| self.graph.is_dependent(f))
            .filter(|f| self.fields.get(*f).map_or(true, |s| s.phase == Phase::Idle))
            .filter(|f| self.upstreams_set(f))
            .cloned()
            .collect();

        pending
            .iter()
            .map(|f| {
                self.fields.entry(f.clone()).or_default().generation += 1;
                self.issue(f)
            })
            .collect()
    }

    /// Mark the ticket's field as loading. Returns false for a stale ticket.
    pub fn start_fetch(&mut self, ticket: &FetchTicket) -> bool {
        match self.fields.get_mut(&ticket.field) {
            Some(state) if state.generation == ticket.generation => {
                state.phase = Phase::Loading;
                true
            }
            _ => false,
        }
    }

    /// Apply a fetch result if the ticket is still current.
    pub fn complete_fetch(
        &mut self,
        ticket: FetchTicket,
        result: Result<Vec<OptionItem>, OptionError>,
    ) -> FetchOutcome {
        let Some(state) = self.fields.get_mut(&ticket.field) else {
            return FetchOutcome::Stale;
        };
        if state.generation != ticket.generation {
            debug!(
                target: "formsync.cascade",
                field = %ticket.field,
                ticket = ticket.generation,
                current = state.generation,
                "discarding stale option response"
            );
            return FetchOutcome::Stale;
        }

        match result {
            Ok(options) => {
                debug!(
                    target: "formsync.cascade",
                    field = %ticket.field,
                    options = options.len(),
                    "options ready"
                );
                state.options = options;
                state.phase = Phase::Ready;
            }
            Err(err) => {
                warn!(
                    target: "formsync.cascade",
                    field = %ticket.field,
                    error = %err,
                    "option fetch failed"
                );
                state.options.clear();
                state.phase = Phase::Failed(err);
            }
        }
        FetchOutcome::Applied
    }

    /// Run one ticket against `source` to completion.
    pub async fn fetch(&mut self, ticket: FetchTicket, source: &dyn OptionSource) -> FetchOutcome {
        if !self.start_fetch(&ticket) {
            return FetchOutcome::Stale;
        }
        let result = source.fetch_options(&ticket.field, &ticket.upstream).await;
        self.complete_fetch(ticket, result)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn availability(&self, path: &FieldPath) -> Availability {
        if !self.upstreams_set(path) {
            return Availability::Blocked;
        }
        match self.fields.get(path).map(|s| &s.phase) {
            Some(Phase::Loading) => Availability::Loading,
            Some(Phase::Ready) => Availability::Ready,
            Some(Phase::Failed(_)) => Availability::Blocked,
            Some(Phase::Idle | Phase::Requested) | None => {
                if self.graph.is_dependent(path) {
                    Availability::Blocked
                } else {
                    Availability::Ready
                }
            }
        }
    }

    /// Options from the last applied fetch. Empty until one succeeds.
    pub fn options(&self, path: &FieldPath) -> &[OptionItem] {
        self.fields.get(path).map_or(&[][..], |s| s.options.as_slice())
    }

    /// The error of the last applied fetch, if it failed.
    pub fn option_error(&self, path: &FieldPath) -> Option<&OptionError> {
        match self.fields.get(path).map(|s| &s.phase) {
            Some(Phase::Failed(err)) => Some(err),
            _ => None,
        }
    }

    pub fn generation(&self, path: &FieldPath) -> u64 {
        self.fields.get(path).map_or(0, |s| s.generation)
    }
}

/// Run a ticket without holding the controller, so several fetches can be
/// in flight at once. Hand the pair back to
/// [`CascadingFieldController::complete_fetch`] in whatever order they
/// finish.
pub async fn run_fetch(
    source: &dyn OptionSource,
    ticket: FetchTicket,
) -> (FetchTicket, Result<Vec<OptionItem>, OptionError>) {
    let result = source.fetch_options(&ticket.field, &ticket.upstream).await;
    (ticket, result)
}
