//! Static option source: option lists held in memory, keyed by field and
//! by the upstream values they apply to.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use formsync_core::{FieldPath, Record};

use super::{OptionError, OptionItem, OptionSource};

/// Option source for fixtures and offline catalogs.
///
/// Lookup order for a field:
/// 1. the list registered for the exact upstream values
/// 2. the field's fallback list, if one was registered
/// 3. an empty list
///
/// A field with no registration at all is `OptionError::NotFound`.
#[derive(Debug, Clone, Default)]
pub struct StaticOptionSource {
    by_upstream: HashMap<FieldPath, BTreeMap<String, Vec<OptionItem>>>,
    fallback: HashMap<FieldPath, Vec<OptionItem>>,
}

impl StaticOptionSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the options of `field` when its upstreams hold exactly
    /// `upstream`.
    pub fn with_options(
        mut self,
        field: FieldPath,
        upstream: Record,
        options: Vec<OptionItem>,
    ) -> Self {
        self.by_upstream
            .entry(field)
            .or_default()
            .insert(Self::key(&upstream), options);
        self
    }

    /// Register the options of `field` for any upstream combination without
    /// a specific list. Root fields use this.
    pub fn with_fallback(mut self, field: FieldPath, options: Vec<OptionItem>) -> Self {
        self.fallback.insert(field, options);
        self
    }

    /// Canonical lookup key: records serialize with sorted keys.
    fn key(upstream: &Record) -> String {
        upstream.to_json().to_string()
    }
}

#[async_trait]
impl OptionSource for StaticOptionSource {
    async fn fetch_options(
        &self,
        field: &FieldPath,
        upstream: &Record,
    ) -> Result<Vec<OptionItem>, OptionError> {
        let specific = self.by_upstream.get(field);
        let fallback = self.fallback.get(field);
        if specific.is_none() && fallback.is_none() {
            return Err(OptionError::NotFound {
                field: field.to_string(),
            });
        }

        if let Some(options) = specific.and_then(|m| m.get(&Self::key(upstream))) {
            return Ok(options.clone());
        }
        Ok(fallback.cloned().unwrap_or_default())
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    fn source() -> StaticOptionSource {
        StaticOptionSource::new()
            .with_fallback(
                p("stateId"),
                vec![OptionItem::new("NSW-1", "New South Wales")],
            )
            .with_options(
                p("regionId"),
                Record::new().with("stateId", "NSW-1"),
                vec![
                    OptionItem::new("R1", "Sydney"),
                    OptionItem::new("R2", "Hunter"),
                ],
            )
    }

    #[tokio::test]
    async fn returns_list_for_matching_upstream() {
        let options = source()
            .fetch_options(&p("regionId"), &Record::new().with("stateId", "NSW-1"))
            .await
            .unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].label, "Sydney");
    }

    #[tokio::test]
    async fn unknown_upstream_combination_is_empty() {
        let options = source()
            .fetch_options(&p("regionId"), &Record::new().with("stateId", "TAS-1"))
            .await
            .unwrap();
        assert!(options.is_empty());
    }

    #[tokio::test]
    async fn fallback_serves_root_fields() {
        let options = source()
            .fetch_options(&p("stateId"), &Record::new())
            .await
            .unwrap();
        assert_eq!(options, vec![OptionItem::new("NSW-1", "New South Wales")]);
    }

    #[tokio::test]
    async fn unregistered_field_is_not_found() {
        let err = source()
            .fetch_options(&p("suburbId"), &Record::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            OptionError::NotFound {
                field: "suburbId".into()
            }
        );
    }
}
