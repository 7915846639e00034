//! Post-parse semantic validation (spec §4.3).
//!
//! Runs after parsing, before lowering. Mirrors the ten rules of the
//! original source's lightweight validator, largely lexical (regex over the
//! raw text) where the original worked that way, but tree-based wherever the
//! AST already gives us a cleaner answer (temporal comparisons, literal
//! arithmetic, path-segment walking).

use crate::ast::{AstNode, LiteralKind, OperatorKind};
use crate::parser::ParseOutput;
use fhir4ds_registry::TypeRegistry;
use fhir4ds_support::{position::mask_expression, suggest, SourcePosition, ValidationError};
use regex::Regex;
use std::sync::OnceLock;

/// Resource-type context supplied by the caller (spec §4.3 rule 1).
pub struct ValidationContext<'a> {
    pub resource_type: Option<&'a str>,
}

const BUILTIN_FUNCTIONS: &[&str] = &[
    "where", "select", "all", "any", "exists", "empty", "count", "distinct", "combine",
    "first", "last", "tail", "skip", "take", "single", "iif", "convertsToBoolean",
    "toBoolean", "convertsToInteger", "toInteger", "convertsToDecimal", "toDecimal",
    "convertsToString", "toString", "convertsToQuantity", "toQuantity", "convertsToDate",
    "toDate", "convertsToDateTime", "toDateTime", "convertsToTime", "toTime", "startsWith",
    "endsWith", "contains", "substring", "length", "upper", "lower", "matches", "replace",
    "replaceMatches", "split", "join", "indexOf", "toChars", "abs", "ceiling", "exp",
    "floor", "ln", "log", "power", "round", "sqrt", "truncate", "is", "as", "ofType",
    "conformsTo", "now", "today", "exclude", "isDistinct", "intersect", "repeat",
    "aggregate", "extension", "allTrue", "anyTrue", "allFalse", "anyFalse", "sum",
    "average", "subsetOf", "supersetOf",
];

fn digit_suffix_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.([A-Za-z_]+[0-9]+)(?:[^A-Za-z0-9_]|$)").unwrap())
}

fn period_function_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.as\(Period\)\.([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

fn period_cast_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"asPeriod\)\.([A-Za-z_][A-Za-z0-9_]*)").unwrap())
}

fn time_literal_timezone_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"@T\d{2}(?::\d{2})?(?::\d{2}(?:\.\d+)?)?(Z|[+-]\d{2}:\d{2})").unwrap()
    })
}

fn time_literal_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@T\d{2}(?::\d{2})?(?::\d{2}(?:\.\d+)?)?").unwrap())
}

const INCOMPLETE_EXPRESSION_OPERATORS: &[&str] = &[
    "!=", "<=", ">=", "+", "-", "*", "/", "|", "&", "=", "<", ">", "~", "!", "or", "and",
    "in", "contains", "is", "as",
];

pub fn validate(
    parsed: &ParseOutput,
    context: &ValidationContext,
    registry: &dyn TypeRegistry,
) -> Result<(), ValidationError> {
    // Mask string/backtick/comment regions before any regex- or
    // substring-based snippet search, so a match can never land inside a
    // literal.
    let masked = mask_expression(&parsed.text, false);

    validate_context_root(&parsed.text, context)?;
    validate_choice_aliases(&masked, registry)?;
    validate_identifier_suffixes(&masked)?;
    validate_period_property_access(&masked)?;
    validate_time_literal_timezones(&masked)?;
    validate_incomplete_expressions(&masked)?;
    validate_temporal_comparisons(&parsed.ast, registry)?;
    validate_function_names(parsed)?;
    validate_literal_arithmetic(&parsed.ast)?;
    validate_path_elements(parsed, context, registry)?;
    Ok(())
}

fn validate_context_root(text: &str, context: &ValidationContext) -> Result<(), ValidationError> {
    let Some(resource_type) = context.resource_type else {
        return Ok(());
    };

    let mut trimmed = text.trim_start();
    while let Some(rest) = trimmed.strip_prefix('(') {
        trimmed = rest.trim_start();
    }
    let root: String = trimmed
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if root.is_empty() {
        return Ok(());
    }
    if !root.chars().next().unwrap().is_uppercase() {
        return Ok(());
    }
    if root != resource_type {
        return Err(ValidationError::ContextRootMismatch {
            root,
            resource_type: resource_type.to_string(),
        });
    }
    Ok(())
}

fn validate_choice_aliases(text: &str, registry: &dyn TypeRegistry) -> Result<(), ValidationError> {
    let collapsed: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    for type_name in registry.get_all_type_names() {
        if !type_name.chars().next().is_some_and(|c| c.is_uppercase()) {
            continue;
        }
        let alias = format!(".value{type_name}");
        if collapsed.contains(&alias) {
            return Err(ValidationError::ChoiceAliasAccess { alias: alias[1..].to_string() });
        }
    }
    Ok(())
}

fn validate_identifier_suffixes(text: &str) -> Result<(), ValidationError> {
    if let Some(captures) = digit_suffix_regex().captures(text) {
        return Err(ValidationError::DigitSuffixedIdentifier {
            identifier: captures[1].to_string(),
        });
    }
    Ok(())
}

fn validate_period_property_access(text: &str) -> Result<(), ValidationError> {
    let collapsed: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    for re in [period_function_regex(), period_cast_regex()] {
        for captures in re.captures_iter(&collapsed) {
            let property = &captures[1];
            if property != "start" && property != "end" {
                return Err(ValidationError::InvalidPeriodProperty {
                    property: property.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn validate_time_literal_timezones(text: &str) -> Result<(), ValidationError> {
    if let Some(m) = time_literal_timezone_regex().find(text) {
        let captures = time_literal_timezone_regex().captures(text).unwrap();
        return Err(ValidationError::TimeLiteralWithTimezone {
            literal: m.as_str().to_string(),
            timezone: captures[1].to_string(),
        });
    }
    Ok(())
}

fn validate_incomplete_expressions(text: &str) -> Result<(), ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(());
    }
    if trimmed.ends_with("*/") {
        return Ok(());
    }

    for op in INCOMPLETE_EXPRESSION_OPERATORS {
        if let Some(rest) = trimmed.strip_suffix(op) {
            if *op == "-" && is_bare_negative_literal(trimmed) {
                continue;
            }
            // A word operator must be preceded by a boundary, not glued to an identifier.
            if op.chars().next().unwrap().is_alphabetic() {
                let boundary_ok = rest
                    .chars()
                    .last()
                    .map(|c| !c.is_alphanumeric() && c != '_')
                    .unwrap_or(true);
                if !boundary_ok {
                    continue;
                }
            }
            return Err(ValidationError::IncompleteExpression {
                detail: format!("expression ends with operator '{op}'"),
            });
        }
    }
    Ok(())
}

fn is_bare_negative_literal(trimmed: &str) -> bool {
    let body = trimmed.trim_start_matches('-').trim();
    !body.is_empty() && body.chars().all(|c| c.is_ascii_digit())
}

fn temporal_kind(node: &AstNode) -> Option<&'static str> {
    match node {
        AstNode::Literal { kind: LiteralKind::Time, .. } => Some("time"),
        AstNode::Literal { kind: LiteralKind::Date, .. } => Some("date"),
        AstNode::Literal { kind: LiteralKind::DateTime, .. } => Some("datetime"),
        _ => None,
    }
}

fn registry_temporal_kind(node: &AstNode, registry: &dyn TypeRegistry) -> Option<&'static str> {
    let (target_type, element) = last_path_segment(node)?;
    let element_type = registry.get_element_type(&target_type, &element)?;
    match element_type.as_str() {
        "date" => Some("date"),
        "dateTime" | "instant" => Some("datetime"),
        "time" => Some("time"),
        _ => None,
    }
}

/// Walk a right-leaning member-access chain to `(receiver_type, last_element)`,
/// used for registry-based temporal typing of plain path expressions.
fn last_path_segment(node: &AstNode) -> Option<(String, String)> {
    match node {
        AstNode::FunctionCall { name, target: Some(target), args, .. } if args.is_empty() => {
            match target.as_ref() {
                AstNode::Identifier { name: receiver, .. } => Some((receiver.clone(), name.clone())),
                deeper @ AstNode::FunctionCall { .. } => {
                    let (_, parent_element) = last_path_segment(deeper)?;
                    Some((parent_element, name.clone()))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn operand_temporal_kind(node: &AstNode, registry: &dyn TypeRegistry) -> Option<&'static str> {
    if let Some(kind) = temporal_kind(node) {
        return Some(kind);
    }
    for child in node.children() {
        if let Some(kind) = temporal_kind(child) {
            return Some(kind);
        }
    }
    registry_temporal_kind(node, registry)
}

fn validate_temporal_comparisons(
    ast: &AstNode,
    registry: &dyn TypeRegistry,
) -> Result<(), ValidationError> {
    if let AstNode::Operator { kind: OperatorKind::Comparison, children, .. } = ast {
        if let [left, right] = children.as_slice() {
            let left_kind = operand_temporal_kind(left, registry);
            let right_kind = operand_temporal_kind(right, registry);
            if let (Some(l), Some(r)) = (left_kind, right_kind) {
                let mismatch = (l == "time" && (r == "date" || r == "datetime"))
                    || (r == "time" && (l == "date" || l == "datetime"));
                if mismatch {
                    return Err(ValidationError::TemporalComparisonMismatch {
                        left: l.to_string(),
                        right: r.to_string(),
                    });
                }
            }
        }
    }
    for child in ast.children() {
        validate_temporal_comparisons(child, registry)?;
    }
    Ok(())
}

fn validate_function_names(parsed: &ParseOutput) -> Result<(), ValidationError> {
    for (name, position) in &parsed.function_calls {
        if is_known_function(name) {
            continue;
        }
        let suggestion = suggest::best_match(name, BUILTIN_FUNCTIONS.iter().copied());
        return Err(ValidationError::UnknownFunction {
            name: name.clone(),
            position: *position,
            suggestion: suggestion.map(|s| s.to_string()),
        });
    }
    Ok(())
}

fn is_known_function(name: &str) -> bool {
    BUILTIN_FUNCTIONS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

fn literal_string_kind(node: &AstNode) -> Option<&'static str> {
    match node {
        AstNode::Literal { kind: LiteralKind::String, .. } => Some("string"),
        AstNode::Literal { .. } => Some("other"),
        _ => None,
    }
}

fn validate_literal_arithmetic(ast: &AstNode) -> Result<(), ValidationError> {
    if let AstNode::Operator { kind: OperatorKind::Binary, operator_text, children, .. } = ast {
        if matches!(operator_text.as_str(), "+" | "-" | "*" | "/") {
            if let [left, right] = children.as_slice() {
                let left_kind = literal_string_kind(left);
                let right_kind = literal_string_kind(right);
                if (left_kind.is_some() || right_kind.is_some())
                    && (left_kind == Some("string") || right_kind == Some("string"))
                {
                    return Err(ValidationError::LiteralStringArithmetic {
                        operator: operator_text.clone(),
                        position: SourcePosition::default(),
                    });
                }
            }
        }
    }
    for child in ast.children() {
        validate_literal_arithmetic(child)?;
    }
    Ok(())
}

const TYPE_CHANGING_FUNCTIONS: &[&str] = &["ofType", "as", "asType", "convertsTo"];

fn contains_type_changing_call(parsed: &ParseOutput) -> bool {
    parsed
        .function_calls
        .iter()
        .any(|(name, _)| TYPE_CHANGING_FUNCTIONS.iter().any(|t| t.eq_ignore_ascii_case(name)))
}

fn validate_path_elements(
    parsed: &ParseOutput,
    context: &ValidationContext,
    registry: &dyn TypeRegistry,
) -> Result<(), ValidationError> {
    if contains_type_changing_call(parsed) {
        return Ok(());
    }
    validate_path_node(&parsed.ast, None, context.resource_type, registry)
}

/// Recursively checks member-access chains against the registry. `current_type`
/// is `None` until a registered root type (or explicit context override) is
/// established; until then, navigation is opaque and skipped (spec §4.3 rule
/// 10, "Skip validation when ... ").
fn validate_path_node(
    node: &AstNode,
    current_type: Option<&str>,
    context_root: Option<&str>,
    registry: &dyn TypeRegistry,
) -> Result<(), ValidationError> {
    match node {
        AstNode::Identifier { name, .. } => {
            if name.starts_with('$') || name.eq_ignore_ascii_case("true") || name.eq_ignore_ascii_case("false") {
                return Ok(());
            }
            Ok(())
        }
        AstNode::FunctionCall { name, target: Some(target), args, .. } if args.is_empty() => {
            validate_path_node(target, current_type, context_root, registry)?;

            let receiver_type = match target.as_ref() {
                AstNode::Identifier { name: receiver, .. } => {
                    if registry.is_registered_type(receiver) {
                        Some(registry.get_canonical_name(receiver))
                    } else {
                        context_root.map(|r| registry.get_canonical_name(r))
                    }
                }
                _ => resolved_type_of(target, current_type, context_root, registry),
            };

            let Some(receiver_type) = receiver_type else {
                return Ok(());
            };

            if name.eq_ignore_ascii_case("true") || name.eq_ignore_ascii_case("false") {
                return Ok(());
            }
            if matches!(receiver_type.as_str(), "BackboneElement" | "Element") {
                return Ok(());
            }

            if registry.get_element_type(&receiver_type, name).is_none() {
                let available = registry.get_element_names(&receiver_type);
                let choice_candidate = format!("{name}[x]");
                if available.contains(&choice_candidate) {
                    return Ok(());
                }
                let suggestions: Vec<String> = suggest::close_matches(
                    name,
                    available.iter().map(|s| s.as_str()),
                    3,
                    0.5,
                )
                .into_iter()
                .map(|s| s.to_string())
                .collect();
                return Err(ValidationError::UnknownElement {
                    element: name.clone(),
                    on_type: receiver_type,
                    position: SourcePosition { line: 1, column: 1 },
                    suggestions,
                });
            }
            Ok(())
        }
        _ => {
            for child in node.children() {
                validate_path_node(child, current_type, context_root, registry)?;
            }
            Ok(())
        }
    }
}

fn resolved_type_of(
    node: &AstNode,
    current_type: Option<&str>,
    context_root: Option<&str>,
    registry: &dyn TypeRegistry,
) -> Option<String> {
    match node {
        AstNode::Identifier { name, .. } => {
            if registry.is_registered_type(name) {
                Some(registry.get_canonical_name(name))
            } else {
                context_root.map(|r| registry.get_canonical_name(r))
            }
        }
        AstNode::FunctionCall { name, target: Some(target), args, .. } if args.is_empty() => {
            let receiver_type = resolved_type_of(target, current_type, context_root, registry)?;
            registry.get_element_type(&receiver_type, name)
        }
        _ => current_type.map(|s| s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use fhir4ds_registry::StaticTypeRegistry;

    fn registry() -> StaticTypeRegistry {
        StaticTypeRegistry::new()
    }

    fn ctx(resource_type: Option<&str>) -> ValidationContext {
        ValidationContext { resource_type }
    }

    #[test]
    fn accepts_valid_scalar_path() {
        let parsed = parse("Patient.birthDate").unwrap();
        let r = registry();
        validate(&parsed, &ctx(None), &r).unwrap();
    }

    #[test]
    fn rejects_choice_alias_access() {
        let parsed = parse("Observation.valueQuantity").unwrap();
        let r = registry();
        let err = validate(&parsed, &ctx(None), &r).unwrap_err();
        assert!(matches!(err, ValidationError::ChoiceAliasAccess { .. }));
    }

    #[test]
    fn allows_generic_value_access() {
        let parsed = parse("Observation.value").unwrap();
        let r = registry();
        validate(&parsed, &ctx(None), &r).unwrap();
    }

    #[test]
    fn rejects_digit_suffixed_identifier() {
        let parsed = parse("Patient.name.given1").unwrap();
        let r = registry();
        let err = validate(&parsed, &ctx(None), &r).unwrap_err();
        assert!(matches!(err, ValidationError::DigitSuffixedIdentifier { .. }));
    }

    #[test]
    fn rejects_mismatched_context_root() {
        let parsed = parse("Encounter.status").unwrap();
        let r = registry();
        let err = validate(&parsed, &ctx(Some("Patient")), &r).unwrap_err();
        assert!(matches!(err, ValidationError::ContextRootMismatch { .. }));
    }

    #[test]
    fn rejects_time_literal_with_timezone() {
        let parsed = parse("@T12:14:15Z = @T12:14:15Z").unwrap();
        let r = registry();
        let err = validate(&parsed, &ctx(None), &r).unwrap_err();
        assert!(matches!(err, ValidationError::TimeLiteralWithTimezone { .. }));
    }

    #[test]
    fn rejects_temporal_mismatch_between_time_and_datetime_field() {
        let parsed = parse("@T12:14:15 = Observation.effectiveDateTime").unwrap();
        let r = registry();
        let err = validate(&parsed, &ctx(None), &r).unwrap_err();
        assert!(matches!(err, ValidationError::TemporalComparisonMismatch { .. }));
    }

    #[test]
    fn rejects_literal_string_arithmetic() {
        let parsed = parse("'a' + 1").unwrap();
        let r = registry();
        let err = validate(&parsed, &ctx(None), &r).unwrap_err();
        assert!(matches!(err, ValidationError::LiteralStringArithmetic { .. }));
    }

    #[test]
    fn parser_itself_rejects_trailing_operator_before_validation_runs() {
        // The hand-written parser requires both operands eagerly, so most
        // occurrences of spec rule 6 ("incomplete expressions") never reach
        // the validator at all; `validate_incomplete_expressions` remains as
        // defense-in-depth, exercised directly below.
        let parsed = parse("Patient.active =").unwrap_err();
        assert!(matches!(parsed, fhir4ds_support::ParseError::UnexpectedEndOfInput { .. }));
    }

    #[test]
    fn incomplete_expression_rule_rejects_trailing_operator_text() {
        let err = validate_incomplete_expressions("Patient.active and").unwrap_err();
        assert!(matches!(err, ValidationError::IncompleteExpression { .. }));
    }

    #[test]
    fn incomplete_expression_rule_allows_negative_literal() {
        validate_incomplete_expressions("-5").unwrap();
    }

    #[test]
    fn rejects_unknown_function_with_suggestion() {
        let parsed = parse("Patient.name.wher(use = 'official')").unwrap();
        let r = registry();
        let err = validate(&parsed, &ctx(None), &r).unwrap_err();
        match err {
            ValidationError::UnknownFunction { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("where"));
            }
            other => panic!("expected UnknownFunction, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_element_with_suggestions() {
        let parsed = parse("Patient.nam").unwrap();
        let r = registry();
        let err = validate(&parsed, &ctx(None), &r).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownElement { .. }));
    }

    #[test]
    fn skips_path_validation_when_type_changing_function_present() {
        let parsed = parse("Observation.value.ofType(Quantity).nonsense").unwrap();
        let r = registry();
        validate(&parsed, &ctx(None), &r).unwrap();
    }

    #[test]
    fn rejects_invalid_period_property() {
        let parsed = parse("Encounter.period.as(Period).bogus").unwrap();
        let r = registry();
        let err = validate(&parsed, &ctx(None), &r).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPeriodProperty { .. }));
    }

    #[test]
    fn choice_alias_text_inside_a_string_literal_is_not_flagged() {
        // The masked text, not the raw text, feeds the snippet-search rules —
        // a string literal that happens to spell out ".valueQuantity" must
        // not be mistaken for the actual choice-alias path access rejected
        // by `rejects_choice_alias_access` above.
        let parsed = parse("Observation.code.where(text = 'note.valueQuantity')").unwrap();
        let r = registry();
        validate(&parsed, &ctx(None), &r).unwrap();
    }
}
