//! JSONB-document dialect: PostgreSQL-style `jsonb_path_query`/`#>>` family
//! over a `jsonb` column holding a FHIR resource.

use crate::Dialect;

#[derive(Debug, Default, Clone, Copy)]
pub struct JsonbDialect;

impl JsonbDialect {
    pub fn new() -> Self {
        Self
    }

    /// Translate a `$.a.b[*]` dotted/bracketed path into a `jsonpath`
    /// literal Postgres's `jsonb_path_query*` family accepts.
    fn to_jsonpath(path: &str) -> String {
        let normalized = path.strip_prefix('$').unwrap_or(path);
        format!("'$${normalized}$$'")
    }
}

impl Dialect for JsonbDialect {
    fn extract_json_field(&self, col: &str, path: &str) -> String {
        format!(
            "(jsonb_path_query_first({col}, {})#>>'{{}}')",
            Self::to_jsonpath(path)
        )
    }

    fn extract_json_object(&self, col: &str, path: &str) -> String {
        format!("jsonb_path_query_first({col}, {})", Self::to_jsonpath(path))
    }

    fn check_json_exists(&self, col: &str, path: &str) -> String {
        format!("jsonb_path_exists({col}, {})", Self::to_jsonpath(path))
    }

    fn get_json_type(&self, expr: &str) -> String {
        format!("jsonb_typeof({expr})")
    }

    fn get_json_array_length(&self, expr: &str, path: Option<&str>) -> String {
        match path {
            Some(path) => format!(
                "jsonb_array_length(jsonb_path_query_first({expr}, {}))",
                Self::to_jsonpath(path)
            ),
            None => format!("jsonb_array_length({expr})"),
        }
    }

    fn unnest_json_array(&self, col: &str, path: &str, alias: &str) -> String {
        format!(
            "jsonb_array_elements(jsonb_path_query_first({col}, {})) AS {alias}",
            Self::to_jsonpath(path)
        )
    }

    fn generate_lateral_unnest(&self, source_table: &str, array_expr: &str, alias: &str) -> String {
        format!(
            "{source_table}, LATERAL jsonb_array_elements({array_expr}) AS {alias}(unnest)"
        )
    }

    fn iterate_json_array(&self, col: &str, path: &str) -> String {
        format!(
            "jsonb_array_elements(jsonb_path_query_first({col}, {}))",
            Self::to_jsonpath(path)
        )
    }

    fn aggregate_to_json_array(&self, expr: &str) -> String {
        format!("jsonb_agg({expr})")
    }

    fn create_json_array(&self, parts: &[String]) -> String {
        format!("jsonb_build_array({})", parts.join(", "))
    }

    fn create_json_object(&self, pairs: &[(String, String)]) -> String {
        let body = pairs
            .iter()
            .map(|(key, value)| format!("'{key}', {value}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!("jsonb_build_object({body})")
    }

    fn wrap_json_array(&self, expr: &str) -> String {
        format!("jsonb_build_array({expr})")
    }

    fn empty_json_array(&self) -> String {
        "'[]'::jsonb".to_string()
    }

    fn is_json_array(&self, expr: &str) -> String {
        format!("(jsonb_typeof({expr}) = 'array')")
    }

    fn enumerate_json_array(&self, array_expr: &str, value_alias: &str, index_alias: &str) -> String {
        format!(
            "jsonb_array_elements({array_expr}) WITH ORDINALITY AS t({value_alias}, {index_alias})"
        )
    }

    fn serialize_json_value(&self, expr: &str) -> String {
        format!("to_jsonb({expr})")
    }

    fn substring(&self, expr: &str, start: &str, length: Option<&str>) -> String {
        match length {
            Some(length) => format!("substring({expr} FROM {start} FOR {length})"),
            None => format!("substring({expr} FROM {start})"),
        }
    }

    fn split_string(&self, expr: &str, separator: &str) -> String {
        format!("string_to_array({expr}, {separator})")
    }

    fn try_cast(&self, expr: &str, sql_type: &str) -> String {
        format!(
            "(CASE WHEN {expr} IS NULL THEN NULL ELSE \
             (SELECT x::{sql_type} FROM (VALUES ({expr})) AS v(x)) END)"
        )
    }

    fn cast_to_timestamp(&self, expr: &str) -> String {
        self.try_cast(expr, "TIMESTAMPTZ")
    }

    fn cast_to_time(&self, expr: &str) -> String {
        self.try_cast(expr, "TIME")
    }

    fn cast_to_double(&self, expr: &str) -> String {
        self.try_cast(expr, "DOUBLE PRECISION")
    }

    fn is_finite(&self, expr: &str) -> String {
        format!("is_finite({expr})")
    }

    fn generate_math_function(&self, name: &str, args: &[String]) -> String {
        let func = match name {
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
        "statement_timestamp()".to_string()
    }

    fn generate_current_date(&self) -> String {
        "CURRENT_DATE".to_string()
    }

    fn generate_date_diff(&self, unit: &str, a: &str, b: &str) -> String {
        format!("EXTRACT({unit} FROM ({a}::timestamp - {b}::timestamp))")
    }

    fn generate_date_literal(&self, text: &str) -> String {
        format!("DATE '{text}'")
    }

    fn generate_datetime_literal(&self, text: &str) -> String {
        format!("TIMESTAMPTZ '{text}'")
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
            "boolean" => format!("({expr} IS NOT NULL AND jsonb_typeof({expr}) = 'boolean')"),
            "integer" | "unsignedInt" | "positiveInt" => format!(
                "({expr} IS NOT NULL AND jsonb_typeof({expr}) = 'number' AND ({expr}#>>'{{}}')::numeric % 1 = 0)"
            ),
            "decimal" => format!("({expr} IS NOT NULL AND jsonb_typeof({expr}) = 'number')"),
            "date" => format!(
                "({expr} IS NOT NULL AND ({expr}#>>'{{}}') ~ '^[0-9]{{4}}(-[0-9]{{2}}(-[0-9]{{2}})?)?$')"
            ),
            "dateTime" => format!(
                "({expr} IS NOT NULL AND ({expr}#>>'{{}}') ~ '^[0-9]{{4}}(-[0-9]{{2}}(-[0-9]{{2}}(T[0-9]{{2}}:[0-9]{{2}}(:[0-9]{{2}}(\\.[0-9]+)?)?(Z|[+-][0-9]{{2}}:[0-9]{{2}})?)?)?)?$')"
            ),
            "time" => format!(
                "({expr} IS NOT NULL AND ({expr}#>>'{{}}') ~ '^[0-9]{{2}}:[0-9]{{2}}(:[0-9]{{2}}(\\.[0-9]+)?)?$')"
            ),
            "string" | "code" | "id" | "uri" | "url" | "canonical" | "markdown" => {
                format!("({expr} IS NOT NULL AND jsonb_typeof({expr}) = 'string')")
            }
            _ => format!("({expr} IS NOT NULL AND jsonb_typeof({expr}) = 'object')"),
        }
    }

    fn generate_type_cast(&self, expr: &str, fhir_type: &str) -> String {
        let extracted = format!("({expr}#>>'{{}}')");
        let sql_type = match fhir_type {
            "boolean" => "BOOLEAN",
            "integer" | "unsignedInt" | "positiveInt" => "BIGINT",
            "decimal" => "DOUBLE PRECISION",
            "date" => "DATE",
            "dateTime" | "instant" => "TIMESTAMPTZ",
            "time" => "TIME",
            _ => "TEXT",
        };
        self.try_cast(&extracted, sql_type)
    }

    fn generate_collection_type_filter(&self, array_expr: &str, fhir_type: &str) -> String {
        let check = self.generate_type_check("elem", fhir_type);
        format!(
            "(SELECT jsonb_agg(elem) FROM jsonb_array_elements({array_expr}) AS elem WHERE {check})"
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
            format!("(jsonb_array_length({expr}) > 0)")
        } else {
            format!("({expr} IS NOT NULL)")
        }
    }

    fn generate_where_clause_filter(&self, collection: &str, predicate: &str) -> String {
        format!(
            "(SELECT jsonb_agg(elem) FROM jsonb_array_elements({collection}) AS elem WHERE {predicate})"
        )
    }

    fn generate_select_transformation(&self, collection: &str, projection: &str) -> String {
        format!(
            "(SELECT jsonb_agg({projection}) FROM jsonb_array_elements({collection}) AS elem)"
        )
    }

    fn generate_collection_combine(&self, a: &str, b: &str) -> String {
        format!(
            "(SELECT jsonb_agg(elem) FROM (SELECT elem FROM jsonb_array_elements({a}) AS elem \
             UNION ALL SELECT elem FROM jsonb_array_elements({b}) AS elem) AS combined)"
        )
    }

    fn generate_collection_exclude(&self, collection: &str, values: &str) -> String {
        format!(
            "(SELECT jsonb_agg(elem) FROM jsonb_array_elements({collection}) AS elem \
             WHERE NOT (jsonb_build_array(elem) <@ {values}))"
        )
    }

    fn generate_string_join(&self, collection: &str, separator: &str, is_json: bool) -> String {
        if is_json {
            format!(
                "(SELECT string_agg(elem#>>'{{}}', {separator}) FROM jsonb_array_elements({collection}) AS elem)"
            )
        } else {
            format!("string_agg({collection}, {separator})")
        }
    }

    fn generate_string_function(&self, name: &str, target: &str, args: &[String]) -> String {
        match name {
            "startsWith" => format!("(left({target}, length({0})) = {0})", args[0]),
            "endsWith" => format!("(right({target}, length({0})) = {0})", args[0]),
            "contains" => format!("(strpos({target}, {}) > 0)", args[0]),
            "length" => format!("length({target})"),
            "upper" => format!("upper({target})"),
            "lower" => format!("lower({target})"),
            "indexOf" => format!("(strpos({target}, {}) - 1)", args[0]),
            "matches" => format!("({target} ~ {})", args[0]),
            "replace" => format!("replace({target}, {}, {})", args[0], args[1]),
            "replaceMatches" => format!(
                "regexp_replace({target}, {}, {}, 'g')",
                args[0], args[1]
            ),
            "split" => format!("string_to_array({target}, {})", args[0]),
            "join" => format!("string_agg({target}, {})", args[0]),
            "toChars" => format!("regexp_split_to_array({target}, '')"),
            other => format!("{other}({target})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_field_uses_path_query_first() {
        let dialect = JsonbDialect::new();
        let sql = dialect.extract_json_field("resource", "$.name");
        assert!(sql.contains("jsonb_path_query_first"));
    }

    #[test]
    fn empty_json_array_is_jsonb_literal() {
        let dialect = JsonbDialect::new();
        assert_eq!(dialect.empty_json_array(), "'[]'::jsonb");
    }

    #[test]
    fn lateral_unnest_uses_with_ordinality_free_form() {
        let dialect = JsonbDialect::new();
        let sql = dialect.generate_lateral_unnest("patient_root", "names", "name_item");
        assert!(sql.contains("LATERAL jsonb_array_elements"));
    }

    #[test]
    fn type_check_is_false_shaped_for_null_inputs() {
        let dialect = JsonbDialect::new();
        for fhir_type in ["boolean", "integer", "decimal", "string", "CodeableConcept"] {
            let check = dialect.generate_type_check("x", fhir_type);
            assert!(check.contains("x IS NOT NULL"), "{fhir_type} check missing NULL guard: {check}");
        }
    }

    #[test]
    fn collection_exclude_is_membership_not_set_equality() {
        let dialect = JsonbDialect::new();
        let excluded = dialect.generate_collection_exclude("a", "b");
        assert!(!excluded.contains("<@ elem"), "must not check mutual containment: {excluded}");
        assert!(excluded.contains("jsonb_build_array(elem) <@ b"));
    }
}
