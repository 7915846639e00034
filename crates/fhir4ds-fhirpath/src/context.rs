//! Mutable translation state threaded through one `translate()` call
//! (spec §3, "TranslationContext").

use std::collections::HashMap;

/// A FHIRPath variable (`$this`, `$index`, `$total`, or a user-declared
/// `$name`) bound to a SQL alias while lowering a lambda-style function
/// argument (spec §4.4, "where(pred) / select(proj)").
#[derive(Debug, Clone)]
pub struct VariableBinding {
    pub sql_alias: String,
    pub declared_type: Option<String>,
    pub array_alias: Option<String>,
}

/// Per-compilation mutable state (spec §3). Owned exclusively by one
/// `translate()` call; never shared across threads (spec §5).
#[derive(Debug, Clone)]
pub struct TranslationContext {
    pub current_resource_type: String,
    pub current_table: String,
    pub parent_path: Vec<String>,
    pub variable_bindings: HashMap<String, VariableBinding>,
    pub cte_counter: usize,
}

impl TranslationContext {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            current_resource_type: resource_type.into(),
            current_table: "resource".to_string(),
            parent_path: Vec::new(),
            variable_bindings: HashMap::new(),
            cte_counter: 0,
        }
    }

    /// Resets all mutable fields to their initial state while keeping the
    /// resource type, matching the "fully reset between top-level
    /// translations" lifecycle note in spec §3.
    pub fn reset(&mut self) {
        self.current_table = "resource".to_string();
        self.parent_path.clear();
        self.variable_bindings.clear();
        self.cte_counter = 0;
    }

    pub fn joined_path(&self) -> String {
        self.parent_path.join(".")
    }

    pub fn next_cte_name(&mut self) -> String {
        self.cte_counter += 1;
        format!("cte_{}", self.cte_counter)
    }

    /// Push a path segment, run `f`, then restore the prior path — the
    /// scope-guard pattern spec §9 suggests for `parent_path` push/pop.
    pub fn with_pushed_segment<T>(&mut self, segment: impl Into<String>, f: impl FnOnce(&mut Self) -> T) -> T {
        self.parent_path.push(segment.into());
        let result = f(self);
        self.parent_path.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_clears_mutable_fields_but_keeps_resource_type() {
        let mut ctx = TranslationContext::new("Patient");
        ctx.current_table = "cte_3".to_string();
        ctx.parent_path.push("name".to_string());
        ctx.cte_counter = 5;

        ctx.reset();

        assert_eq!(ctx.current_resource_type, "Patient");
        assert_eq!(ctx.current_table, "resource");
        assert!(ctx.parent_path.is_empty());
        assert_eq!(ctx.cte_counter, 0);
    }

    #[test]
    fn scope_guard_restores_parent_path_after_use() {
        let mut ctx = TranslationContext::new("Patient");
        ctx.with_pushed_segment("name", |ctx| {
            assert_eq!(ctx.joined_path(), "name");
        });
        assert!(ctx.parent_path.is_empty());
    }

    #[test]
    fn cte_names_increment_monotonically() {
        let mut ctx = TranslationContext::new("Patient");
        assert_eq!(ctx.next_cte_name(), "cte_1");
        assert_eq!(ctx.next_cte_name(), "cte_2");
    }
}
