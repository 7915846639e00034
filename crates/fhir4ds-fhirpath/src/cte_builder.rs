//! Converts an ordered [`SQLFragment`] list into [`CTE`] records (spec §4.6).
//!
//! One CTE per fragment, named `cte_<n>` in emission order. A fragment's
//! source table is either the prior CTE (fragments chain) or the fragment's
//! own `source_table` when it is the first in the list. Fragments tagged
//! `requires_unnest` lower through `Dialect::generate_lateral_unnest` and
//! must carry the `array_column`/`result_alias` metadata the unnest needs;
//! everything else is wrapped as a plain row-numbered projection.

use crate::cte::CTE;
use crate::fragment::SQLFragment;
use fhir4ds_dialect::Dialect;
use fhir4ds_support::{BuildError, MetadataKey};
use tracing::debug;

pub struct CTEBuilder<'a> {
    dialect: &'a dyn Dialect,
    counter: usize,
}

impl<'a> CTEBuilder<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect, counter: 0 }
    }

    /// Builds one `CTE` per fragment, threading each fragment's emitted CTE
    /// name as the next fragment's default source table (spec §4.6, "Core
    /// algorithm").
    pub fn build(&mut self, fragments: &[SQLFragment]) -> Result<Vec<CTE>, BuildError> {
        let mut ctes = Vec::with_capacity(fragments.len());
        let mut previous_name: Option<String> = None;

        for fragment in fragments {
            let name = self.next_name();
            let source = fragment
                .source_table
                .clone()
                .or_else(|| previous_name.clone())
                .ok_or_else(|| BuildError::MissingSourceTable { cte_name: name.clone() })?;

            let query = if fragment.requires_unnest {
                self.build_unnest_query(&name, &source, fragment)?
            } else {
                self.build_projection_query(&source, fragment)?
            };

            let mut depends_on: Vec<String> = fragment.dependencies.clone();
            if let Some(prior) = &previous_name {
                if !depends_on.contains(prior) {
                    depends_on.push(prior.clone());
                }
            }
            depends_on.retain(|dep| dep != &name);

            debug!(cte = %name, source = %source, requires_unnest = fragment.requires_unnest, "built CTE");
            ctes.push(CTE {
                name: name.clone(),
                query,
                depends_on,
                requires_unnest: fragment.requires_unnest,
                source_fragment: Some(fragment.expression.clone()),
                metadata: fragment.metadata.clone(),
            });

            previous_name = Some(name);
        }

        Ok(ctes)
    }

    fn next_name(&mut self) -> String {
        self.counter += 1;
        let name = format!("cte_{}", self.counter);
        debug_assert!(CTE::is_valid_name(&name), "generated CTE name must be a valid SQL identifier: {name}");
        name
    }

    fn build_unnest_query(&self, name: &str, source: &str, fragment: &SQLFragment) -> Result<String, BuildError> {
        if fragment.expression.trim_start().to_uppercase().starts_with("SELECT") {
            return Ok(fragment.expression.clone());
        }

        let array_expr = fragment
            .metadata
            .get(MetadataKey::ArrayColumn)
            .and_then(|v| v.as_text())
            .ok_or_else(|| BuildError::MissingMetadataKey {
                cte_name: name.to_string(),
                key: MetadataKey::ArrayColumn.to_string(),
            })?;
        let alias = fragment
            .metadata
            .get(MetadataKey::ResultAlias)
            .and_then(|v| v.as_text())
            .ok_or_else(|| BuildError::MissingMetadataKey {
                cte_name: name.to_string(),
                key: MetadataKey::ResultAlias.to_string(),
            })?;
        Ok(format!(
            "SELECT {source}.id AS id, {alias}.unnest AS value, ROW_NUMBER() OVER () AS ord \
             FROM {lateral}",
            lateral = self.dialect.generate_lateral_unnest(source, array_expr, alias),
        ))
    }

    fn build_projection_query(&self, source: &str, fragment: &SQLFragment) -> Result<String, BuildError> {
        if fragment.expression.trim().is_empty() {
            return Err(BuildError::EmptyExpression { cte_name: source.to_string() });
        }
        let alias = fragment
            .metadata
            .get(MetadataKey::ResultAlias)
            .and_then(|v| v.as_text())
            .unwrap_or("value");
        Ok(format!(
            "SELECT {source}.id AS id, {expr} AS {alias}, ROW_NUMBER() OVER () AS ord FROM {source}",
            expr = fragment.expression,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir4ds_dialect::JsonDialect;
    use fhir4ds_support::Metadata;

    #[test]
    fn first_fragment_uses_its_own_source_table() {
        let dialect = JsonDialect::new();
        let mut builder = CTEBuilder::new(&dialect);
        let fragment = SQLFragment::new("json_extract(resource, '$.birthDate')").with_source_table("resource");
        let ctes = builder.build(&[fragment]).unwrap();
        assert_eq!(ctes.len(), 1);
        assert_eq!(ctes[0].name, "cte_1");
        assert!(ctes[0].query.contains("FROM resource"));
    }

    #[test]
    fn chained_fragment_without_source_table_uses_prior_cte() {
        let dialect = JsonDialect::new();
        let mut builder = CTEBuilder::new(&dialect);
        let first = SQLFragment::new("resource").with_source_table("resource");
        let second = SQLFragment::new("json_extract(cte_1, '$.name')");
        let ctes = builder.build(&[first, second]).unwrap();
        assert_eq!(ctes[1].depends_on, vec!["cte_1".to_string()]);
        assert!(ctes[1].query.contains("FROM cte_1"));
    }

    #[test]
    fn missing_source_table_on_first_fragment_is_an_error() {
        let dialect = JsonDialect::new();
        let mut builder = CTEBuilder::new(&dialect);
        let fragment = SQLFragment::new("1 + 1");
        let err = builder.build(&[fragment]).unwrap_err();
        assert!(matches!(err, BuildError::MissingSourceTable { .. }));
    }

    #[test]
    fn unnest_fragment_missing_array_column_metadata_is_an_error() {
        let dialect = JsonDialect::new();
        let mut builder = CTEBuilder::new(&dialect);
        let mut fragment = SQLFragment::new("json_extract(resource, '$.name[*]')")
            .with_source_table("resource")
            .requiring_unnest();
        fragment.metadata = Metadata::new();
        let err = builder.build(&[fragment]).unwrap_err();
        assert!(matches!(err, BuildError::MissingMetadataKey { .. }));
    }

    #[test]
    fn unnest_fragment_already_a_select_passes_through_unchanged() {
        let dialect = JsonDialect::new();
        let mut builder = CTEBuilder::new(&dialect);
        let fragment = SQLFragment::new("SELECT id, value FROM cte_1")
            .with_source_table("cte_1")
            .requiring_unnest();
        let ctes = builder.build(&[fragment]).unwrap();
        assert_eq!(ctes[0].query, "SELECT id, value FROM cte_1");
    }

    #[test]
    fn generated_cte_names_are_valid_identifiers() {
        assert!(CTE::is_valid_name("cte_1"));
        assert!(CTE::is_valid_name("cte_42"));
    }
}
