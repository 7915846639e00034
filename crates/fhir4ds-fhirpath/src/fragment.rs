//! [`SQLFragment`], a single lowered sub-expression (spec §3).

use fhir4ds_support::Metadata;

/// A lowered sub-expression produced by one AST visit (spec §3).
///
/// Invariants enforced by the constructor: `expression` is never empty or
/// whitespace-only; `requires_unnest` and `is_aggregate` are mutually
/// exclusive.
#[derive(Debug, Clone)]
pub struct SQLFragment {
    pub expression: String,
    pub source_table: Option<String>,
    pub dependencies: Vec<String>,
    pub requires_unnest: bool,
    pub is_aggregate: bool,
    pub metadata: Metadata,
}

impl SQLFragment {
    pub fn new(expression: impl Into<String>) -> Self {
        let expression = expression.into();
        assert!(
            !expression.trim().is_empty(),
            "SQLFragment expression must not be empty or whitespace-only"
        );
        Self {
            expression,
            source_table: None,
            dependencies: Vec::new(),
            requires_unnest: false,
            is_aggregate: false,
            metadata: Metadata::new(),
        }
    }

    pub fn with_source_table(mut self, source_table: impl Into<String>) -> Self {
        self.source_table = Some(source_table.into());
        self
    }

    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.dependencies.contains(&name) {
            self.dependencies.push(name);
        }
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn requiring_unnest(mut self) -> Self {
        assert!(!self.is_aggregate, "a fragment cannot both require unnest and be an aggregate");
        self.requires_unnest = true;
        self
    }

    pub fn as_aggregate(mut self) -> Self {
        assert!(!self.requires_unnest, "a fragment cannot both require unnest and be an aggregate");
        self.is_aggregate = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "must not be empty")]
    fn rejects_empty_expression() {
        SQLFragment::new("   ");
    }

    #[test]
    #[should_panic(expected = "cannot both require unnest")]
    fn rejects_unnest_and_aggregate_together() {
        SQLFragment::new("1").requiring_unnest().as_aggregate();
    }

    #[test]
    fn with_dependency_deduplicates() {
        let fragment = SQLFragment::new("x").with_dependency("cte_1").with_dependency("cte_1");
        assert_eq!(fragment.dependencies, vec!["cte_1".to_string()]);
    }
}
