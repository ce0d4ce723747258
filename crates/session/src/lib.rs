//! formsync-session: one entity-edit session.
//!
//! - [`CascadingFieldController`] -- dependent fields, option fetches and
//!   the generation guard against stale responses
//! - [`WizardStepController`] -- step navigation with validate-then-persist
//! - [`OptionSource`] -- the external option-list collaborator

pub mod cascade;
pub mod options;
pub mod step;
pub mod wizard;

pub use cascade::{
    run_fetch, Availability, CascadeError, CascadingFieldController, FetchOutcome, FetchTicket,
    SetOutcome,
};
pub use options::static_source::StaticOptionSource;
pub use options::{OptionError, OptionItem, OptionSource};
pub use step::{RequiredFields, StepDefinition, StepValidator, ValidationIssue};
pub use wizard::{PendingPersist, Position, Transition, WizardError, WizardStepController};
