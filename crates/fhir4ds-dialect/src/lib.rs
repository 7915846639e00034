//! # SQL Dialect Abstraction
//!
//! Encapsulates every piece of SQL syntax that differs between the two
//! supported backends (spec §4.1). The translator never emits a JSON
//! function literally — it always calls through [`Dialect`]. Both
//! implementations are total and side-effect-free: every operation takes
//! already-formed SQL sub-expressions and returns a new SQL string, never
//! touching a connection (spec §6 treats execution as external).

mod json_dialect;
mod jsonb_dialect;

pub use json_dialect::JsonDialect;
pub use jsonb_dialect::JsonbDialect;

/// All SQL syntax that varies by backend (spec §4.1).
///
/// Implementations must be safe for shared immutable access across threads
/// (spec §5) — the reference implementations hold no mutable state, so
/// `Send + Sync` falls out for free.
pub trait Dialect: Send + Sync {
    // -- JSON -----------------------------------------------------------
    fn extract_json_field(&self, col: &str, path: &str) -> String;
    fn extract_json_object(&self, col: &str, path: &str) -> String;
    fn check_json_exists(&self, col: &str, path: &str) -> String;
    fn get_json_type(&self, expr: &str) -> String;
    fn get_json_array_length(&self, expr: &str, path: Option<&str>) -> String;
    fn unnest_json_array(&self, col: &str, path: &str, alias: &str) -> String;
    fn generate_lateral_unnest(&self, source_table: &str, array_expr: &str, alias: &str) -> String;
    fn iterate_json_array(&self, col: &str, path: &str) -> String;
    fn aggregate_to_json_array(&self, expr: &str) -> String;
    fn create_json_array(&self, parts: &[String]) -> String;
    fn create_json_object(&self, pairs: &[(String, String)]) -> String;
    fn wrap_json_array(&self, expr: &str) -> String;
    fn empty_json_array(&self) -> String;
    fn is_json_array(&self, expr: &str) -> String;
    fn enumerate_json_array(&self, array_expr: &str, value_alias: &str, index_alias: &str) -> String;
    fn serialize_json_value(&self, expr: &str) -> String;

    // -- Scalar -----------------------------------------------------------
    fn string_concat(&self, a: &str, b: &str) -> String {
        format!("({a} || {b})")
    }
    fn substring(&self, expr: &str, start: &str, length: Option<&str>) -> String;
    fn split_string(&self, expr: &str, separator: &str) -> String;
    fn try_cast(&self, expr: &str, sql_type: &str) -> String;
    fn cast_to_timestamp(&self, expr: &str) -> String;
    fn cast_to_time(&self, expr: &str) -> String;
    fn cast_to_double(&self, expr: &str) -> String;
    fn is_finite(&self, expr: &str) -> String;

    // -- Math -----------------------------------------------------------
    fn generate_math_function(&self, name: &str, args: &[String]) -> String;
    fn generate_power_operation(&self, base: &str, exp: &str) -> String;

    // -- Dates -----------------------------------------------------------
    fn generate_current_timestamp(&self) -> String;
    fn generate_current_date(&self) -> String;
    fn generate_date_diff(&self, unit: &str, a: &str, b: &str) -> String;
    fn generate_date_literal(&self, text: &str) -> String;
    fn generate_datetime_literal(&self, text: &str) -> String;

    // -- Aggregation -----------------------------------------------------------
    fn generate_aggregate_function(
        &self,
        name: &str,
        expr: &str,
        distinct: bool,
        filter: Option<&str>,
    ) -> String;

    // -- Type codegen -----------------------------------------------------------
    fn generate_type_check(&self, expr: &str, fhir_type: &str) -> String;
    fn generate_type_cast(&self, expr: &str, fhir_type: &str) -> String;
    fn generate_collection_type_filter(&self, array_expr: &str, fhir_type: &str) -> String;

    // -- Comparison, logical, conditional -----------------------------------------------------------
    fn generate_comparison(&self, left: &str, op: &str, right: &str) -> String;
    fn generate_logical_combine(&self, a: &str, op: &str, b: &str) -> String;
    fn generate_conditional_expression(&self, cond: &str, then: &str, otherwise: &str) -> String;

    // -- Control -----------------------------------------------------------
    fn generate_exists_check(&self, expr: &str, is_collection: bool) -> String;
    fn generate_where_clause_filter(&self, collection: &str, predicate: &str) -> String;
    fn generate_select_transformation(&self, collection: &str, projection: &str) -> String;
    fn generate_collection_combine(&self, a: &str, b: &str) -> String;
    fn generate_collection_exclude(&self, collection: &str, values: &str) -> String;
    fn generate_string_join(&self, collection: &str, separator: &str, is_json: bool) -> String;

    /// String-function family shared by `startsWith`, `contains`, `matches`,
    /// `replace`, `upper`, `lower`, `indexOf`, `split`, `join`, `toChars`,
    /// ... (spec §4.4, "String family"). `args` are already-lowered SQL
    /// sub-expressions in the function's declared order.
    fn generate_string_function(&self, name: &str, target: &str, args: &[String]) -> String;
}
