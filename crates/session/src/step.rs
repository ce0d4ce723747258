//! Wizard step definitions and validation.

use std::fmt;

use formsync_core::{FieldPath, Record, StepSchema, WorkingState};

/// One problem found by a step validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    /// The offending field, or `None` for a step-level problem.
    pub field: Option<FieldPath>,
    pub message: String,
}

impl ValidationIssue {
    pub fn field(field: FieldPath, message: impl Into<String>) -> Self {
        ValidationIssue {
            field: Some(field),
            message: message.into(),
        }
    }

    pub fn step(message: impl Into<String>) -> Self {
        ValidationIssue {
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{}: {}", field, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// A step's validation predicate.
///
/// `fields` is the working record restricted to the step's own fields.
pub trait StepValidator: Send + Sync {
    fn validate(&self, fields: &Record) -> Result<(), Vec<ValidationIssue>>;
}

impl<F> StepValidator for F
where
    F: Fn(&Record) -> Result<(), Vec<ValidationIssue>> + Send + Sync,
{
    fn validate(&self, fields: &Record) -> Result<(), Vec<ValidationIssue>> {
        self(fields)
    }
}

/// Every listed field must hold a value: not missing, `Null`, `Delete`,
/// or blank text.
#[derive(Debug, Clone, Default)]
pub struct RequiredFields(pub Vec<FieldPath>);

impl StepValidator for RequiredFields {
    fn validate(&self, fields: &Record) -> Result<(), Vec<ValidationIssue>> {
        let issues: Vec<ValidationIssue> = self
            .0
            .iter()
            .filter(|path| match fields.get_path(path) {
                None => true,
                Some(value) => {
                    !value.is_set() || value.as_str().is_some_and(|s| s.trim().is_empty())
                }
            })
            .map(|path| ValidationIssue::field(path.clone(), "is required"))
            .collect();
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }
}

/// One wizard step: the fields it edits and the check run before leaving it.
pub struct StepDefinition {
    pub id: String,
    pub fields: Vec<FieldPath>,
    validator: Box<dyn StepValidator>,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

impl StepDefinition {
    /// A step that always validates.
    pub fn new(id: impl Into<String>, fields: Vec<FieldPath>) -> Self {
        StepDefinition {
            id: id.into(),
            fields,
            validator: Box::new(RequiredFields::default()),
        }
    }

    pub fn with_validator(mut self, validator: impl StepValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn from_schema(step: &StepSchema) -> Self {
        StepDefinition::new(step.id.clone(), step.fields.clone())
            .with_validator(RequiredFields(step.required.clone()))
    }

    pub fn validate(&self, working: &WorkingState) -> Result<(), Vec<ValidationIssue>> {
        self.validator.validate(&working.restrict(&self.fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formsync_core::Value;
    use serde_json::json;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    fn working(json: serde_json::Value) -> WorkingState {
        WorkingState::new(Record::from_json(&json).unwrap())
    }

    #[test]
    fn required_fields_reports_each_missing_field() {
        let step = StepDefinition::new("details", vec![p("firstName"), p("lastName"), p("phone")])
            .with_validator(RequiredFields(vec![p("firstName"), p("lastName"), p("phone")]));

        let issues = step
            .validate(&working(json!({ "firstName": "Jo", "lastName": "  ", "phone": null })))
            .unwrap_err();
        let rendered: Vec<String> = issues.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["lastName: is required", "phone: is required"]);

        assert!(step
            .validate(&working(json!({ "firstName": "Jo", "lastName": "B", "phone": "1" })))
            .is_ok());
    }

    #[test]
    fn validators_only_see_their_step_fields() {
        let step = StepDefinition::new("location", vec![p("stateId")]).with_validator(
            |fields: &Record| -> Result<(), Vec<ValidationIssue>> {
                if fields.contains_key("firstName") {
                    Err(vec![ValidationIssue::step("leaked field")])
                } else {
                    Ok(())
                }
            },
        );
        assert!(step
            .validate(&working(json!({ "firstName": "Jo", "stateId": "NSW-1" })))
            .is_ok());
    }

    #[test]
    fn nested_required_fields() {
        let step = StepDefinition::new("contact", vec![p("emergencyContact")])
            .with_validator(RequiredFields(vec![p("emergencyContact.phone")]));
        assert!(step.validate(&working(json!({ "emergencyContact": {} }))).is_err());

        let mut state = working(json!({}));
        state
            .set(&p("emergencyContact.phone"), Value::from("000"))
            .unwrap();
        assert!(step.validate(&state).is_ok());
    }
}
