//! # FHIRPath-to-SQL compiler
//!
//! Lexes, parses, validates, translates, and assembles a single FHIRPath
//! expression into a portable SQL `WITH` statement over a JSON/JSONB
//! document store (spec §1, §6). [`compile`] is the single public entry
//! point; everything else is exposed for callers who want to drive the
//! pipeline stage by stage (e.g. to inspect the AST or the fragment list).

pub mod ast;
pub mod context;
pub mod cte;
pub mod cte_assembler;
pub mod cte_builder;
pub mod fragment;
pub mod lexer;
pub mod parser;
pub mod semantic_validator;
pub mod translator;

pub use ast::AstNode;
pub use context::TranslationContext;
pub use cte::CTE;
pub use cte_assembler::CTEAssembler;
pub use cte_builder::CTEBuilder;
pub use fragment::SQLFragment;
pub use parser::{parse, ParseOutput};
pub use semantic_validator::ValidationContext;
pub use translator::ASTToSQLTranslator;

use fhir4ds_dialect::Dialect;
use fhir4ds_registry::TypeRegistry;
use fhir4ds_support::CompileError;

/// Caller-supplied context for one [`compile`] call (spec §6, "Inputs").
pub struct CompileContext<'a> {
    pub resource_type: Option<&'a str>,
}

/// The rendered SQL plus the dependency-ordered CTE names that produced it
/// (spec §6, "Output").
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    pub sql: String,
    pub dependencies: Vec<String>,
}

/// Runs the full pipeline — lex, parse, semantic-validate, translate,
/// build, assemble — stopping at the first phase that fails (spec §6,
/// "Core algorithm").
pub fn compile(
    expression: &str,
    context: &CompileContext,
    dialect: &dyn Dialect,
    registry: &dyn TypeRegistry,
) -> Result<CompiledQuery, CompileError> {
    let parsed = parser::parse(expression)?;

    let validation_context = ValidationContext { resource_type: context.resource_type };
    semantic_validator::validate(&parsed, &validation_context, registry)?;

    let resource_type = context.resource_type.unwrap_or("Resource");
    let mut translator = ASTToSQLTranslator::new(dialect, registry, resource_type);
    let fragments = translator.translate(&parsed.ast)?;

    let mut builder = CTEBuilder::new(dialect);
    let ctes = builder.build(&fragments)?;

    let dependencies = ctes.iter().map(|c| c.name.clone()).collect();
    let assembler = CTEAssembler::new();
    let sql = assembler.assemble(&ctes)?;

    Ok(CompiledQuery { sql, dependencies })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhir4ds_dialect::JsonDialect;
    use fhir4ds_registry::StaticTypeRegistry;

    #[test]
    fn compiles_a_scalar_path_to_a_single_cte_statement() {
        let dialect = JsonDialect::new();
        let registry = StaticTypeRegistry::new();
        let context = CompileContext { resource_type: Some("Patient") };
        let result = compile("Patient.birthDate", &context, &dialect, &registry).unwrap();
        assert_eq!(result.dependencies, vec!["cte_1".to_string()]);
        assert!(result.sql.starts_with("WITH\n"));
        assert!(result.sql.contains("json_extract(resource, '$.birthDate')"));
        assert!(result.sql.trim_end().ends_with("SELECT * FROM cte_1;"));
    }

    #[test]
    fn array_navigation_emits_two_dependency_ordered_ctes() {
        let dialect = JsonDialect::new();
        let registry = StaticTypeRegistry::new();
        let context = CompileContext { resource_type: Some("Patient") };
        let result = compile("Patient.name.given", &context, &dialect, &registry).unwrap();
        assert_eq!(result.dependencies, vec!["cte_1".to_string(), "cte_2".to_string()]);
        assert!(result.sql.contains("cte_2 AS"));
    }

    #[test]
    fn unknown_function_is_rejected_before_translation() {
        let dialect = JsonDialect::new();
        let registry = StaticTypeRegistry::new();
        let context = CompileContext { resource_type: Some("Patient") };
        let err = compile("Patient.bogusFn()", &context, &dialect, &registry).unwrap_err();
        assert!(matches!(err, CompileError::Validation(_)));
    }

    #[test]
    fn context_root_mismatch_is_rejected() {
        let dialect = JsonDialect::new();
        let registry = StaticTypeRegistry::new();
        let context = CompileContext { resource_type: Some("Patient") };
        let err = compile("Observation.code", &context, &dialect, &registry).unwrap_err();
        assert!(matches!(err, CompileError::Validation(_)));
    }
}
