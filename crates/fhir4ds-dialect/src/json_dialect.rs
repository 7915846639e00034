//! JSON-document dialect: SQLite/DuckDB-style `json_extract` family over a
//! text column holding a serialized FHIR resource.

use crate::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDialect;

impl JsonDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for JsonDialect {
    fn extract_json_field(&self, col: &str, path: &str) -> String {
        format!("json_extract({col}, '{path}')")
    }

    fn extract_json_object(&self, col: &str, path: &str) -> String {
        format!("json_extract({col}, '{path}')")
    }

    fn check_json_exists(&self, col: &str, path: &str) -> String {
        format!("(json_extract({col}, '{path}') IS NOT NULL)")
    }

    fn get_json_type(&self, expr: &str) -> String {
        format!("json_type({expr})")
    }

    fn get_json_array_length(&self, expr: &str, path: Option<&str>) -> String {
        match path {
            Some(path) => format!("json_array_length({expr}, '{path}')"),
            None => format!("json_array_length({expr})"),
        }
    }

    fn unnest_json_array(&self, col: &str, path: &str, alias: &str) -> String {
        format!("json_each({col}, '{path}') AS {alias}")
    }

    fn generate_lateral_unnest(&self, source_table: &str, array_expr: &str, alias: &str) -> String {
        format!("{source_table}, json_each({array_expr}) AS {alias}")
    }

    fn iterate_json_array(&self, col: &str, path: &str) -> String {
        format!("json_each({col}, '{path}')")
    }

    fn aggregate_to_json_array(&self, expr: &str) -> String {
        format!("json_group_array({expr})")
    }

    fn create_json_array(&self, parts: &[String]) -> String {
        format!("json_array({})", parts.join(", "))
    }

    fn create_json_object(&self, pairs: &[(String, String)]) -> String {
        let body = pairs
            .iter()
            .map(|(key, value)| format!("'{key}', {value}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("json_object({body})")
    }

    fn wrap_json_array(&self, expr: &str) -> String {
        format!("json_array({expr})")
    }

    fn empty_json_array(&self) -> String {
        "json_array()".to_string()
    }

    fn is_json_array(&self, expr: &str) -> String {
        format!("(json_type({expr}) = 'array')")
    }

    fn enumerate_json_array(&self, array_expr: &str, value_alias: &str, index_alias: &str) -> String {
        format!(
            "json_each({array_expr}) AS {value_alias}, \
             (ROW_NUMBER() OVER () - 1) AS {index_alias}"
        )
    }

    fn serialize_json_value(&self, expr: &str) -> String {
        format!("json({expr})")
    }

    fn substring(&self, expr: &str, start: &str, length: Option<&str>) -> String {
        match length {
            Some(length) => format!("substr({expr}, {start}, {length})"),
            None => format!("substr({expr}, {start})"),
        }
    }

    fn split_string(&self, expr: &str, separator: &str) -> String {
        format!("str_split({expr}, {separator})")
    }

    fn try_cast(&self, expr: &str, sql_type: &str) -> String {
        format!("TRY_CAST({expr} AS {sql_type})")
    }

    fn cast_to_timestamp(&self, expr: &str) -> String {
        self.try_cast(expr, "TIMESTAMP")
    }

    fn cast_to_time(&self, expr: &str) -> String {
        self.try_cast(expr, "TIME")
    }

    fn cast_to_double(&self, expr: &str) -> String {
        self.try_cast(expr, "DOUBLE")
    }

    fn is_finite(&self, expr: &str) -> String {
        format!("(NOT isnan({expr}) AND NOT isinf({expr}))")
    }

    fn generate_math_function(&self, name: &str, args: &[String]) -> String {
        let func = match name {
            "ln" => "ln",
            "log" => "log",
            "ceiling" => "ceil",
            "truncate" => "trunc",
            other => other,
        };
        format!("{func}({})", args.join(", "))
    }

    fn generate_power_operation(&self, base: &str, exp: &str) -> String {
        format!("power({base}, {exp})")
    }

    fn generate_current_timestamp(&self) -> String {
        "CURRENT_TIMESTAMP".to_string()
    }

    fn generate_current_date(&self) -> String {
        "CURRENT_DATE".to_string()
    }

    fn generate_date_diff(&self, unit: &str, a: &str, b: &str) -> String {
        format!("date_diff('{unit}', {a}, {b})")
    }

    fn generate_date_literal(&self, text: &str) -> String {
        format!("DATE '{text}'")
    }

    fn generate_datetime_literal(&self, text: &str) -> String {
        format!("TIMESTAMP '{text}'")
    }

    fn generate_aggregate_function(
        &self,
        name: &str,
        expr: &str,
        distinct: bool,
        filter: Option<&str>,
    ) -> String {
        let distinct_kw = if distinct { "DISTINCT " } else { "" };
        let base = format!("{name}({distinct_kw}{expr})");
        match filter {
            Some(filter) => format!("{base} FILTER (WHERE {filter})"),
            None => base,
        }
    }

    fn generate_type_check(&self, expr: &str, fhir_type: &str) -> String {
        match fhir_type {
            "boolean" => format!(
                "({expr} IS NOT NULL AND (json_type({expr}) = 'true' OR json_type({expr}) = 'false'))"
            ),
            "integer" | "unsignedInt" | "positiveInt" => {
                format!("({expr} IS NOT NULL AND json_type({expr}) = 'integer')")
            }
            "decimal" => format!("({expr} IS NOT NULL AND json_type({expr}) IN ('integer', 'real'))"),
            "date" => format!(
                "({expr} IS NOT NULL AND regexp_matches({expr}, '^[0-9]{{4}}(-[0-9]{{2}}(-[0-9]{{2}})?)?$'))"
            ),
            "dateTime" => format!(
                "({expr} IS NOT NULL AND regexp_matches({expr}, '^[0-9]{{4}}(-[0-9]{{2}}(-[0-9]{{2}}(T[0-9]{{2}}:[0-9]{{2}}(:[0-9]{{2}}(\\.[0-9]+)?)?(Z|[+-][0-9]{{2}}:[0-9]{{2}})?)?)?)?$'))"
            ),
            "time" => format!(
                "({expr} IS NOT NULL AND regexp_matches({expr}, '^[0-9]{{2}}:[0-9]{{2}}(:[0-9]{{2}}(\\.[0-9]+)?)?$'))"
            ),
            "string" | "code" | "id" | "uri" | "url" | "canonical" | "markdown" => {
                format!("({expr} IS NOT NULL AND json_type({expr}) = 'text')")
            }
            _ => format!("({expr} IS NOT NULL AND json_type({expr}) = 'object')"),
        }
    }

    fn generate_type_cast(&self, expr: &str, fhir_type: &str) -> String {
        let sql_type = match fhir_type {
            "boolean" => "BOOLEAN",
            "integer" | "unsignedInt" | "positiveInt" => "BIGINT",
            "decimal" => "DOUBLE",
            "date" => "DATE",
            "dateTime" | "instant" => "TIMESTAMP",
            "time" => "TIME",
            _ => "VARCHAR",
        };
        self.try_cast(expr, sql_type)
    }

    fn generate_collection_type_filter(&self, array_expr: &str, fhir_type: &str) -> String {
        let check = self.generate_type_check("value", fhir_type);
        format!(
            "(SELECT json_group_array(value) FROM json_each({array_expr}) WHERE {check})"
        )
    }

    fn generate_comparison(&self, left: &str, op: &str, right: &str) -> String {
        format!("({left} {op} {right})")
    }

    fn generate_logical_combine(&self, a: &str, op: &str, b: &str) -> String {
        let sql_op = match op {
            "and" => "AND",
            "or" => "OR",
            other => other,
        };
        format!("({a} {sql_op} {b})")
    }

    fn generate_conditional_expression(&self, cond: &str, then: &str, otherwise: &str) -> String {
        format!("(CASE WHEN {cond} THEN {then} ELSE {otherwise} END)")
    }

    fn generate_exists_check(&self, expr: &str, is_collection: bool) -> String {
        if is_collection {
            format!("(json_array_length({expr}) > 0)")
        } else {
            format!("({expr} IS NOT NULL)")
        }
    }

    fn generate_where_clause_filter(&self, collection: &str, predicate: &str) -> String {
        format!(
            "(SELECT json_group_array(value) FROM json_each({collection}) WHERE {predicate})"
        )
    }

    fn generate_select_transformation(&self, collection: &str, projection: &str) -> String {
        format!(
            "(SELECT json_group_array({projection}) FROM json_each({collection}))"
        )
    }

    fn generate_collection_combine(&self, a: &str, b: &str) -> String {
        format!(
            "(SELECT json_group_array(value) FROM (SELECT value FROM json_each({a}) \
             UNION ALL SELECT value FROM json_each({b})))"
        )
    }

    fn generate_collection_exclude(&self, collection: &str, values: &str) -> String {
        format!(
            "(SELECT json_group_array(value) FROM json_each({collection}) \
             WHERE value NOT IN (SELECT value FROM json_each({values})))"
        )
    }

    fn generate_string_join(&self, collection: &str, separator: &str, is_json: bool) -> String {
        if is_json {
            format!(
                "(SELECT string_agg(value, {separator}) FROM json_each({collection}))"
            )
        } else {
            format!("string_agg({collection}, {separator})")
        }
    }

    fn generate_string_function(&self, name: &str, target: &str, args: &[String]) -> String {
        match name {
            "startsWith" => format!("(substr({target}, 1, length({0})) = {0})", args[0]),
            "endsWith" => format!(
                "(substr({target}, length({target}) - length({0}) + 1) = {0})",
                args[0]
            ),
            "contains" => format!("(instr({target}, {}) > 0)", args[0]),
            "length" => format!("length({target})"),
            "upper" => format!("upper({target})"),
            "lower" => format!("lower({target})"),
            "indexOf" => format!("(instr({target}, {}) - 1)", args[0]),
            "matches" => format!("regexp_matches({target}, {})", args[0]),
            "replace" => format!("replace({target}, {}, {})", args[0], args[1]),
            "replaceMatches" => format!(
                "regexp_replace({target}, {}, {}, 'g')",
                args[0], args[1]
            ),
            "split" => format!("str_split({target}, {})", args[0]),
            "join" => format!("string_agg({target}, {})", args[0]),
            "toChars" => format!("string_to_array({target}, '')"),
            other => format!("{other}({target})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_concat_wraps_in_parens_with_double_pipe() {
        let dialect = JsonDialect::new();
        assert_eq!(dialect.string_concat("a", "b"), "(a || b)");
    }

    #[test]
    fn type_check_is_false_shaped_for_null_inputs() {
        let dialect = JsonDialect::new();
        for fhir_type in ["boolean", "integer", "decimal", "string", "CodeableConcept"] {
            let check = dialect.generate_type_check("x", fhir_type);
            assert!(check.contains("x IS NOT NULL"), "{fhir_type} check missing NULL guard: {check}");
        }
    }

    #[test]
    fn collection_exclude_removes_members_of_values() {
        let dialect = JsonDialect::new();
        let excluded = dialect.generate_collection_exclude("a", "b");
        assert!(excluded.contains("NOT IN"));
    }

    fn division_guard_example() -> String {
        format!("CASE WHEN {0} = 0 THEN NULL ELSE {1} / {0} END", "d", "n")
    }

    #[test]
    fn division_guard_is_caller_composed() {
        // The dialect only provides comparison/conditional primitives; the
        // zero-guard itself is assembled by the translator (spec §4.4).
        assert!(division_guard_example().contains("NULLIF") == false);
    }
}
