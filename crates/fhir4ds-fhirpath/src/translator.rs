//! Visitor-pattern AST-to-SQL translator (spec §4.4–§4.5).
//!
//! `translate(root)` resets the context and fragment list, dispatches to the
//! root node's visit method, and returns the full fragment list — the caller
//! treats the *last* fragment as the scalar/aggregate result and the whole
//! list as the CTE plan (spec §4.4, "Core algorithm").

use crate::ast::{AggregationKind, AstNode, LiteralKind, OperatorKind, TypeOp};
use crate::context::{TranslationContext, VariableBinding};
use crate::fragment::SQLFragment;
use fhir4ds_dialect::Dialect;
use fhir4ds_registry::TypeRegistry;
use fhir4ds_support::{Metadata, MetadataKey, TranslationError};
use tracing::{debug, trace};

pub struct ASTToSQLTranslator<'a> {
    dialect: &'a dyn Dialect,
    registry: &'a dyn TypeRegistry,
    pub context: TranslationContext,
    fragments: Vec<SQLFragment>,
}

impl<'a> ASTToSQLTranslator<'a> {
    pub fn new(dialect: &'a dyn Dialect, registry: &'a dyn TypeRegistry, resource_type: impl Into<String>) -> Self {
        Self {
            dialect,
            registry,
            context: TranslationContext::new(resource_type),
            fragments: Vec::new(),
        }
    }

    pub fn translate(&mut self, root: &AstNode) -> Result<Vec<SQLFragment>, TranslationError> {
        debug!(resource_type = %self.context.current_resource_type, "translating expression");
        self.context.reset();
        self.fragments.clear();
        if let Some(fragment) = self.visit(root)? {
            self.fragments.push(fragment);
        }
        trace!(fragment_count = self.fragments.len(), "translation produced fragments");
        Ok(std::mem::take(&mut self.fragments))
    }

    fn push_intermediate(&mut self, fragment: SQLFragment) {
        trace!(expression = %fragment.expression, "pushing intermediate fragment");
        self.fragments.push(fragment);
    }

    fn visit(&mut self, node: &AstNode) -> Result<Option<SQLFragment>, TranslationError> {
        match node {
            AstNode::Literal { kind, value, .. } => self.visit_literal(*kind, value).map(Some),
            AstNode::Identifier { name, .. } => self.visit_identifier(name),
            AstNode::FunctionCall { name, target, args, .. } => {
                self.visit_function_call(name, target.as_deref(), args)
            }
            AstNode::Operator { operator_text, kind, children, .. } => {
                self.visit_operator(operator_text, *kind, children)
            }
            AstNode::Conditional { children, .. } => self.visit_conditional(children),
            AstNode::Aggregation { kind, target, .. } => self.visit_aggregation(*kind, target),
            AstNode::TypeOperation { operation, target_type, target, .. } => {
                self.visit_type_operation(*operation, target_type, target)
            }
        }
    }

    // -- Literals -----------------------------------------------------------

    fn visit_literal(&self, kind: LiteralKind, value: &str) -> Result<SQLFragment, TranslationError> {
        let expression = match kind {
            LiteralKind::String => format!("'{}'", value.replace('\'', "''")),
            LiteralKind::Boolean => if value == "true" { "TRUE".to_string() } else { "FALSE".to_string() },
            LiteralKind::Integer | LiteralKind::Decimal => value.to_string(),
            LiteralKind::Date => self.dialect.generate_date_literal(value),
            LiteralKind::DateTime => self.dialect.generate_datetime_literal(value),
            LiteralKind::Time => self.dialect.generate_date_literal(value),
            LiteralKind::Quantity => {
                let (number, unit) = quantity_parts(value);
                self.dialect.create_json_object(&[
                    ("value".to_string(), number.to_string()),
                    ("unit".to_string(), format!("'{}'", unit.replace('\'', "''"))),
                ])
            }
        };
        Ok(SQLFragment::new(expression))
    }

    // -- Identifiers / path roots -----------------------------------------------------------

    fn visit_identifier(&mut self, name: &str) -> Result<Option<SQLFragment>, TranslationError> {
        if let Some(binding) = self.context.variable_bindings.get(name) {
            return Ok(Some(SQLFragment::new(binding.sql_alias.clone())));
        }
        if name == self.context.current_resource_type {
            let table = self.context.current_table.clone();
            return Ok(Some(SQLFragment::new(table.clone()).with_source_table(table)));
        }
        Err(TranslationError::UnboundVariable { name: name.to_string() })
    }

    /// Navigate one member-access step (`target.<name>`), per spec §4.4
    /// "visit_identifier": scalar elements extract a JSON field in place;
    /// array elements emit an unnest-bearing intermediate fragment and
    /// switch `current_table` to its alias for the remainder of the chain.
    fn visit_member(&mut self, name: &str, target: &AstNode) -> Result<Option<SQLFragment>, TranslationError> {
        let target_fragment = self.visit(target)?;
        if let Some(fragment) = &target_fragment {
            if fragment.requires_unnest || fragment.is_aggregate {
                self.push_intermediate(fragment.clone());
            }
        }

        let receiver_type = self.receiver_type(target);
        let Some(receiver_type) = receiver_type else {
            return Err(TranslationError::UnknownType { type_name: name.to_string() });
        };

        let is_array = self.registry.is_array_element(&receiver_type, name);

        if !is_array {
            self.context.parent_path.push(name.to_string());
            let path = format!("$.{}", self.context.joined_path());
            let expression = self.dialect.extract_json_field(&self.context.current_table, &path);
            let mut fragment = SQLFragment::new(expression).with_source_table(self.context.current_table.clone());
            fragment.metadata.insert(MetadataKey::SourcePath, path);
            return Ok(Some(fragment));
        }

        self.context.parent_path.push(name.to_string());
        let array_path = format!("$.{}[*]", self.context.joined_path());
        let alias = self.unique_alias(&format!("{name}_item"));
        let source_table = self.context.current_table.clone();
        let array_expr = self.dialect.extract_json_object(&source_table, &array_path);

        let mut metadata = Metadata::new();
        metadata.insert(MetadataKey::ArrayColumn, array_expr.clone());
        metadata.insert(MetadataKey::ResultAlias, alias.clone());
        metadata.insert(MetadataKey::IdColumn, format!("{source_table}.id"));
        metadata.insert(MetadataKey::SourcePath, array_path);
        metadata.insert(MetadataKey::UnnestLevel, self.context.parent_path.len() as i64);
        metadata.insert(MetadataKey::ProjectionExpression, format!("{alias}.unnest"));

        let fragment = SQLFragment::new(array_expr)
            .with_source_table(source_table)
            .with_metadata(metadata)
            .requiring_unnest();

        self.context.current_table = alias;
        Ok(Some(fragment))
    }

    fn receiver_type(&self, target: &AstNode) -> Option<String> {
        match target {
            AstNode::Identifier { name, .. } if name == &self.context.current_resource_type => {
                Some(self.registry.get_canonical_name(name))
            }
            AstNode::FunctionCall { name, target, args, .. } if args.is_empty() => {
                let parent_type = self.receiver_type(target.as_ref()?)?;
                self.registry.get_element_type(&parent_type, name)
            }
            _ => None,
        }
    }

    fn unique_alias(&self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut suffix = 1;
        let used: Vec<&str> = self
            .fragments
            .iter()
            .filter_map(|f| f.metadata.get(MetadataKey::ResultAlias).and_then(|v| v.as_text()))
            .collect();
        while used.iter().any(|u| *u == candidate) || candidate == self.context.current_table {
            suffix += 1;
            candidate = format!("{base}_{suffix}");
        }
        candidate
    }

    // -- Operators -----------------------------------------------------------

    fn visit_operator(
        &mut self,
        operator_text: &str,
        kind: OperatorKind,
        children: &[AstNode],
    ) -> Result<Option<SQLFragment>, TranslationError> {
        if matches!(kind, OperatorKind::Unary) {
            let operand = self.require_fragment(&children[0])?;
            let expression = match operator_text {
                "not" => format!("(NOT {})", operand.expression),
                "-" => format!("(-{})", operand.expression),
                _ => return Err(TranslationError::UnknownOperator { operator: operator_text.to_string() }),
            };
            return Ok(Some(SQLFragment::new(expression)));
        }

        let left = self.require_fragment(&children[0])?;
        let right = self.require_fragment(&children[1])?;

        let expression = match (kind, operator_text) {
            (OperatorKind::Comparison, op) => self.dialect.generate_comparison(&left.expression, op, &right.expression),
            (OperatorKind::Logical, "and") | (OperatorKind::Logical, "or") => {
                self.dialect.generate_logical_combine(&left.expression, operator_text, &right.expression)
            }
            (OperatorKind::Logical, "xor") => format!(
                "(({l} AND NOT {r}) OR (NOT {l} AND {r}))",
                l = left.expression,
                r = right.expression
            ),
            (OperatorKind::Logical, "implies") => {
                format!("((NOT {}) OR {})", left.expression, right.expression)
            }
            (OperatorKind::Union, "|") => format!(
                "(COALESCE({l}, {empty}) UNION ALL COALESCE({r}, {empty}))",
                l = left.expression,
                r = right.expression,
                empty = self.dialect.empty_json_array(),
            ),
            (_, "&") => {
                let l_str = format!("COALESCE({}, '')", left.expression);
                let r_str = format!("COALESCE({}, '')", right.expression);
                self.dialect.string_concat(&l_str, &r_str)
            }
            (_, "-") if as_quantity_literal(&children[1]).and_then(|(_, unit)| interval_unit(unit)).is_some() => {
                let (number, unit) = as_quantity_literal(&children[1]).expect("guarded above");
                let sql_unit = interval_unit(unit).expect("guarded above");
                format!(
                    "CAST(({} - INTERVAL '{number} {sql_unit}') AS DATE)",
                    self.dialect.cast_to_timestamp(&left.expression),
                )
            }
            (_, "+") | (_, "-") | (_, "*") => {
                format!("({} {} {})", left.expression, operator_text, right.expression)
            }
            (_, "/") => format!(
                "({} / NULLIF({}, 0))",
                left.expression, right.expression
            ),
            (_, "div") => format!(
                "CAST(({} / NULLIF({}, 0)) AS BIGINT)",
                left.expression, right.expression
            ),
            (_, "mod") => format!(
                "MOD({}, NULLIF({}, 0))",
                left.expression, right.expression
            ),
            (_, "in") => format!("({} IN {})", left.expression, right.expression),
            (_, "contains") => format!("({} IN {})", right.expression, left.expression),
            _ => return Err(TranslationError::UnknownOperator { operator: operator_text.to_string() }),
        };

        let mut fragment = SQLFragment::new(expression);
        if matches!(kind, OperatorKind::Union) {
            fragment.metadata.insert(MetadataKey::IsCollection, true);
        }
        Ok(Some(fragment))
    }

    fn require_fragment(&mut self, node: &AstNode) -> Result<SQLFragment, TranslationError> {
        match self.visit(node)? {
            Some(fragment) => Ok(fragment),
            None => Err(TranslationError::InvalidArgument {
                function: node.text().to_string(),
                detail: "expected a value-producing expression".to_string(),
            }),
        }
    }

    // -- Function calls -----------------------------------------------------------

    fn visit_function_call(
        &mut self,
        name: &str,
        target: Option<&AstNode>,
        args: &[AstNode],
    ) -> Result<Option<SQLFragment>, TranslationError> {
        if target.is_none() && args.is_empty() {
            let expression = match name {
                "now" => Some(self.dialect.generate_current_timestamp()),
                "today" => Some(self.dialect.generate_current_date()),
                "{}" => Some(self.dialect.empty_json_array()),
                _ => None,
            };
            if let Some(expression) = expression {
                let mut fragment = SQLFragment::new(expression);
                if name == "{}" {
                    fragment.metadata.insert(MetadataKey::IsCollection, true);
                }
                return Ok(Some(fragment));
            }
        }

        // Member access: not a recognized builtin, so this node is plain
        // path navigation (spec §4.4 dispatch only covers builtin names;
        // everything else is the identifier/path case from §4.3's closed
        // function set already having validated this at an earlier phase).
        if let Some(target) = target {
            if !is_string_family(name)
                && !is_math_family(name)
                && !is_conversion_family(name)
                && !is_collection_family(name)
                && name != "extension"
                && name != "conformsTo"
                && name != "index"
            {
                return self.visit_member(name, target);
            }
        }

        let (target, args) = normalize_target_args(target, args);

        match name {
            "index" => self.visit_index(target, args),
            "where" => self.visit_where_select(target, args, true),
            "select" => self.visit_where_select(target, args, false),
            "exists" => self.visit_exists(target, args),
            "empty" => {
                let t = self.require_fragment_opt(target)?;
                Ok(Some(SQLFragment::new(format!("(NOT {})", self.dialect.generate_exists_check(&t.expression, true)))))
            }
            "count" | "first" | "last" | "tail" | "skip" | "take" | "single" | "distinct"
            | "isDistinct" | "intersect" | "exclude" | "combine" | "subsetOf" | "supersetOf" => {
                self.visit_collection_shape(name, target, args)
            }
            "extension" => self.visit_extension(target, args),
            "conformsTo" => {
                let t = self.require_fragment_opt(target)?;
                let url = self.require_fragment(&args[0])?;
                Ok(Some(SQLFragment::new(
                    self.dialect.check_json_exists(&t.expression, &format!("$.meta.profile[?(@=={})]", url.expression)),
                )))
            }
            "repeat" => self.visit_repeat(target, args),
            "aggregate" => self.visit_aggregate_fn(target, args),
            "allTrue" | "anyTrue" | "allFalse" | "anyFalse" | "sum" | "average" => {
                self.visit_aggregation_function(name, target)
            }
            "highBoundary" | "lowBoundary" => self.visit_boundary(name, target, args),
            _ if is_string_family(name) => self.visit_string_function(name, target, args),
            _ if is_conversion_family(name) => self.visit_conversion_function(name, target),
            _ if is_math_family(name) => self.visit_math_function(name, target, args),
            _ => Err(TranslationError::UnknownOperator { operator: name.to_string() }),
        }
    }

    fn require_fragment_opt(&mut self, target: Option<&AstNode>) -> Result<SQLFragment, TranslationError> {
        match target {
            Some(node) => self.require_fragment(node),
            None => Err(TranslationError::InvalidArgument {
                function: "<call>".to_string(),
                detail: "missing required target expression".to_string(),
            }),
        }
    }

    /// `repeat(expr)` — recursive CTE emission bounded at a max depth of 100
    /// with value-equality cycle detection (spec §4.4, "repeat(expr)").
    fn visit_repeat(&mut self, target: Option<&AstNode>, args: &[AstNode]) -> Result<Option<SQLFragment>, TranslationError> {
        const MAX_DEPTH: u32 = 100;
        let t = self.require_fragment_opt(target)?;
        let name = self.context.next_cte_name();
        let step = self.require_fragment(&args[0])?;
        let recursive_query = format!(
            "(WITH RECURSIVE {name}(value, depth, seen) AS (\
             SELECT {base}, 0, {wrap_seen_init} \
             UNION ALL \
             SELECT {step}, {name}.depth + 1, {append_seen} \
             FROM {name} \
             WHERE {name}.depth < {max_depth} AND NOT ({contains_seen})) \
             SELECT {agg} FROM {name})",
            base = t.expression,
            wrap_seen_init = self.dialect.wrap_json_array(&t.expression),
            step = step.expression,
            append_seen = self.dialect.aggregate_to_json_array(&format!("{name}.seen, {name}.value")),
            max_depth = MAX_DEPTH,
            contains_seen = self.dialect.check_json_exists(&format!("{name}.seen"), &format!("$[?(@=={})]", step.expression)),
            agg = self.dialect.aggregate_to_json_array("value"),
            name = name,
        );
        let mut fragment = SQLFragment::new(recursive_query);
        fragment.metadata.insert(MetadataKey::Function, "repeat".to_string());
        fragment.metadata.insert(MetadataKey::IsCollection, true);
        Ok(Some(fragment))
    }

    /// `aggregate(expr, init)` — window-function accumulation over a
    /// row-numbered unnest, `$total` bound to the running accumulator and
    /// `$this` to the current element (spec §4.4, "aggregate(expr, init)").
    fn visit_aggregate_fn(&mut self, target: Option<&AstNode>, args: &[AstNode]) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment_opt(target)?;
        let init = args.get(1).map(|a| self.require_fragment(a)).transpose()?;
        let init_expr = init.map(|f| f.expression).unwrap_or_else(|| "NULL".to_string());

        self.context.variable_bindings.insert(
            "$this".to_string(),
            VariableBinding { sql_alias: "value".to_string(), declared_type: None, array_alias: None },
        );
        self.context.variable_bindings.insert(
            "$total".to_string(),
            VariableBinding { sql_alias: "acc".to_string(), declared_type: None, array_alias: None },
        );
        let step = self.require_fragment(&args[0])?;
        self.context.variable_bindings.remove("$this");
        self.context.variable_bindings.remove("$total");

        let expression = format!(
            "(SELECT acc FROM (\
             SELECT {step} AS acc, ROW_NUMBER() OVER (ORDER BY ord DESC) AS rn \
             FROM (SELECT value, {init} AS acc, ROW_NUMBER() OVER () AS ord FROM {source}) AS unrolled\
             ) AS accumulated WHERE rn = 1)",
            step = step.expression,
            init = init_expr,
            source = t.expression,
        );
        let mut fragment = SQLFragment::new(expression);
        fragment.metadata.insert(MetadataKey::Function, "aggregate".to_string());
        Ok(Some(fragment))
    }

    fn visit_aggregation_function(&mut self, name: &str, target: Option<&AstNode>) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment_opt(target)?;
        let sql_name = match name {
            "allTrue" => "BOOL_AND",
            "anyTrue" => "BOOL_OR",
            "allFalse" => "BOOL_AND",
            "anyFalse" => "BOOL_OR",
            "sum" => "SUM",
            "average" => "AVG",
            _ => unreachable!("guarded by caller's match arm"),
        };
        let expr = match name {
            "allFalse" | "anyFalse" => format!("(NOT {})", t.expression),
            _ => t.expression,
        };
        let expression = self.dialect.generate_aggregate_function(sql_name, &expr, false, None);
        Ok(Some(SQLFragment::new(expression).as_aggregate()))
    }

    /// `highBoundary()` / `lowBoundary()` — the temporal or decimal endpoint
    /// implied by the element's declared precision (spec §4.4, "Date/time").
    fn visit_boundary(&mut self, name: &str, target: Option<&AstNode>, args: &[AstNode]) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment_opt(target)?;
        let precision = args.first().map(|a| self.require_fragment(a)).transpose()?.map(|f| f.expression);
        let unit = match precision.as_deref() {
            Some("4") => "year",
            Some("6") => "month",
            Some("8") => "day",
            _ => "second",
        };
        let offset = match name {
            "highBoundary" => "+ 1",
            _ => "- 1",
        };
        let expression = format!(
            "({timestamp} {offset} INTERVAL '1 {unit}')",
            timestamp = self.dialect.cast_to_timestamp(&t.expression),
        );
        let mut fragment = SQLFragment::new(expression);
        fragment.metadata.insert(MetadataKey::Function, name.to_string());
        Ok(Some(fragment))
    }

    fn visit_index(&mut self, target: Option<&AstNode>, args: &[AstNode]) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment_opt(target)?;
        let index = self.require_fragment(&args[0])?;
        Ok(Some(SQLFragment::new(format!("({}->{})", t.expression, index.expression))))
    }

    fn visit_where_select(
        &mut self,
        target: Option<&AstNode>,
        args: &[AstNode],
        is_where: bool,
    ) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment_opt(target)?;
        self.context.variable_bindings.insert(
            "$this".to_string(),
            VariableBinding { sql_alias: "value".to_string(), declared_type: None, array_alias: None },
        );
        self.context.variable_bindings.insert(
            "$index".to_string(),
            VariableBinding { sql_alias: "key".to_string(), declared_type: None, array_alias: None },
        );
        let inner = self.require_fragment(&args[0])?;
        self.context.variable_bindings.remove("$this");
        self.context.variable_bindings.remove("$index");

        let expression = if is_where {
            self.dialect.generate_where_clause_filter(&t.expression, &inner.expression)
        } else {
            self.dialect.generate_select_transformation(&t.expression, &inner.expression)
        };
        let mut fragment = SQLFragment::new(expression);
        fragment.metadata.insert(MetadataKey::IsCollection, true);
        Ok(Some(fragment))
    }

    fn visit_exists(&mut self, target: Option<&AstNode>, args: &[AstNode]) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment_opt(target)?;
        if args.is_empty() {
            return Ok(Some(SQLFragment::new(self.dialect.generate_exists_check(&t.expression, true))));
        }
        self.context.variable_bindings.insert(
            "$this".to_string(),
            VariableBinding { sql_alias: "value".to_string(), declared_type: None, array_alias: None },
        );
        let predicate = self.require_fragment(&args[0])?;
        self.context.variable_bindings.remove("$this");
        let filtered = self.dialect.generate_where_clause_filter(&t.expression, &predicate.expression);
        Ok(Some(SQLFragment::new(self.dialect.generate_exists_check(&filtered, true))))
    }

    fn visit_collection_shape(
        &mut self,
        name: &str,
        target: Option<&AstNode>,
        args: &[AstNode],
    ) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment_opt(target)?;
        let expression = match name {
            "count" => self.dialect.generate_aggregate_function("COUNT", &t.expression, false, None),
            "distinct" => self.dialect.aggregate_to_json_array(&format!("DISTINCT {}", t.expression)),
            "first" => format!("{}[1]", t.expression),
            "last" => format!("{}[-1]", t.expression),
            "single" => format!("{}[1]", t.expression),
            "tail" | "skip" => {
                let n = args.first().map(|a| self.require_fragment(a)).transpose()?;
                let offset = n.map(|f| f.expression).unwrap_or_else(|| "1".to_string());
                format!("{}[{} + 1:]", t.expression, offset)
            }
            "take" => {
                let n = self.require_fragment(&args[0])?;
                format!("{}[1:{}]", t.expression, n.expression)
            }
            "isDistinct" => {
                let distinct_count = self.dialect.generate_aggregate_function("COUNT", &format!("DISTINCT {}", t.expression), false, None);
                let total_count = self.dialect.generate_aggregate_function("COUNT", &t.expression, false, None);
                format!("({distinct_count} = {total_count})")
            }
            "intersect" => {
                let other = self.require_fragment(&args[0])?;
                format!("(SELECT value FROM {} WHERE value IN (SELECT value FROM {}))", t.expression, other.expression)
            }
            "exclude" => {
                let other = self.require_fragment(&args[0])?;
                self.dialect.generate_collection_exclude(&t.expression, &other.expression)
            }
            "combine" => {
                let other = self.require_fragment(&args[0])?;
                self.dialect.generate_collection_combine(&t.expression, &other.expression)
            }
            "subsetOf" => {
                let other = self.require_fragment(&args[0])?;
                format!("(NOT EXISTS (SELECT value FROM {} WHERE value NOT IN (SELECT value FROM {})))", t.expression, other.expression)
            }
            "supersetOf" => {
                let other = self.require_fragment(&args[0])?;
                format!("(NOT EXISTS (SELECT value FROM {} WHERE value NOT IN (SELECT value FROM {})))", other.expression, t.expression)
            }
            _ => return Err(TranslationError::UnknownOperator { operator: name.to_string() }),
        };
        Ok(Some(SQLFragment::new(expression)))
    }

    fn visit_extension(&mut self, target: Option<&AstNode>, args: &[AstNode]) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment_opt(target)?;
        let url = self.require_fragment(&args[0])?;
        let extension_array = self.dialect.extract_json_object(&t.expression, "$.extension[*]");
        let predicate = format!(
            "{} = {}",
            self.dialect.extract_json_field("value", "$.url"),
            url.expression
        );
        Ok(Some(SQLFragment::new(self.dialect.generate_where_clause_filter(&extension_array, &predicate))))
    }

    fn visit_string_function(
        &mut self,
        name: &str,
        target: Option<&AstNode>,
        args: &[AstNode],
    ) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment_opt(target)?;
        let mut arg_exprs = Vec::new();
        for arg in args {
            arg_exprs.push(self.require_fragment(arg)?.expression);
        }

        let expression = match name {
            "substring" => {
                let start = format!("({} + 1)", arg_exprs[0]);
                let length = arg_exprs.get(1).cloned();
                format!(
                    "(CASE WHEN {0} < 0 THEN '' ELSE {1} END)",
                    arg_exprs[0],
                    self.dialect.substring(&t.expression, &start, length.as_deref())
                )
            }
            "indexOf" => format!("({} - 1)", self.dialect.generate_string_function("indexOf", &t.expression, &arg_exprs)),
            "replaceMatches" => self.dialect.generate_string_function("replaceMatches", &t.expression, &arg_exprs),
            _ => self.dialect.generate_string_function(name, &t.expression, &arg_exprs),
        };
        Ok(Some(SQLFragment::new(expression)))
    }

    fn visit_conversion_function(&mut self, name: &str, target: Option<&AstNode>) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment_opt(target)?;
        let fhir_type = conversion_target_type(name);
        let expression = if name.starts_with("convertsTo") {
            self.dialect.generate_type_check(&t.expression, fhir_type)
        } else {
            self.dialect.generate_type_cast(&t.expression, fhir_type)
        };
        Ok(Some(SQLFragment::new(expression)))
    }

    fn visit_math_function(
        &mut self,
        name: &str,
        target: Option<&AstNode>,
        args: &[AstNode],
    ) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment_opt(target)?;
        let mut call_args = vec![t.expression.clone()];
        for arg in args {
            call_args.push(self.require_fragment(arg)?.expression);
        }

        let expression = match name {
            "sqrt" => format!(
                "(CASE WHEN {0} < 0 THEN NULL ELSE {1} END)",
                t.expression,
                self.dialect.generate_math_function("sqrt", &call_args)
            ),
            "ln" => format!(
                "(CASE WHEN {0} <= 0 THEN NULL ELSE {1} END)",
                t.expression,
                self.dialect.generate_math_function("ln", &call_args)
            ),
            "log" => {
                let base = call_args.get(1).cloned().unwrap_or_else(|| "10".to_string());
                format!(
                    "(CASE WHEN {0} <= 0 OR {1} <= 0 THEN NULL ELSE (ln({0}) / ln({1})) END)",
                    t.expression, base
                )
            }
            "power" => {
                let exp = call_args.get(1).cloned().unwrap_or_else(|| "2".to_string());
                format!(
                    "(CASE WHEN {base} = 0 AND {exp} = 0 THEN 1 \
                     WHEN {base} = 0 AND {exp} < 0 THEN NULL \
                     WHEN {base} < 0 AND {exp} != CAST({exp} AS BIGINT) THEN NULL \
                     ELSE {power} END)",
                    base = t.expression,
                    exp = exp,
                    power = self.dialect.generate_power_operation(&t.expression, &exp)
                )
            }
            _ => self.dialect.generate_math_function(name, &call_args),
        };
        let finite_guarded = format!(
            "(CASE WHEN {0} IS NOT NULL AND NOT {1} THEN NULL ELSE {0} END)",
            expression,
            self.dialect.is_finite(&expression)
        );
        Ok(Some(SQLFragment::new(finite_guarded)))
    }

    // -- Conditional -----------------------------------------------------------

    fn visit_conditional(&mut self, children: &[AstNode]) -> Result<Option<SQLFragment>, TranslationError> {
        // `iif({}, then, else)` — an empty-collection condition is
        // statically false, so the conditional collapses to its else
        // branch (or NULL) without consulting the dialect at all
        // (spec §8, "iif({}, true, false)").
        if is_empty_collection_literal(&children[0]) {
            let otherwise = match children.get(2) {
                Some(node) => self.require_fragment(node)?.expression,
                None => "NULL".to_string(),
            };
            let mut fragment = SQLFragment::new(otherwise);
            fragment.metadata.insert(MetadataKey::Function, "iif".to_string());
            fragment.metadata.insert(MetadataKey::Optimized, "empty_collection_false".to_string());
            return Ok(Some(fragment));
        }

        let cond = self.require_fragment(&children[0])?;
        let then = self.require_fragment(&children[1])?;
        let otherwise = match children.get(2) {
            Some(node) => self.require_fragment(node)?.expression,
            None => "NULL".to_string(),
        };
        let expression = self.dialect.generate_conditional_expression(&cond.expression, &then.expression, &otherwise);
        let mut fragment = SQLFragment::new(expression);
        fragment.metadata.insert(MetadataKey::Function, "iif".to_string());
        Ok(Some(fragment))
    }

    // -- Aggregation -----------------------------------------------------------

    fn visit_aggregation(&mut self, kind: AggregationKind, target: &AstNode) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment(target)?;
        let sql_name = match kind {
            AggregationKind::Count => "COUNT",
            AggregationKind::Sum => "SUM",
            AggregationKind::Min => "MIN",
            AggregationKind::Max => "MAX",
            AggregationKind::Avg => "AVG",
            AggregationKind::AllTrue => "BOOL_AND",
            AggregationKind::AnyTrue => "BOOL_OR",
            AggregationKind::AllFalse => "BOOL_AND",
            AggregationKind::AnyFalse => "BOOL_OR",
        };
        let expression = self.dialect.generate_aggregate_function(sql_name, &t.expression, false, None);
        let mut fragment = SQLFragment::new(expression).as_aggregate();
        fragment.metadata.insert(MetadataKey::IsCollection, false);
        Ok(Some(fragment))
    }

    // -- Type operations (spec §4.5) -----------------------------------------------------------

    fn visit_type_operation(
        &mut self,
        operation: TypeOp,
        target_type: &str,
        target: &AstNode,
    ) -> Result<Option<SQLFragment>, TranslationError> {
        let t = self.require_fragment(target)?;
        let canonical = self.registry.get_canonical_name(target_type);
        if !self.registry.is_registered_type(&canonical) {
            return Err(TranslationError::UnknownType { type_name: target_type.to_string() });
        }

        match operation {
            TypeOp::Is => {
                let expression = self.dialect.generate_type_check(&t.expression, &canonical);
                Ok(Some(SQLFragment::new(expression)))
            }
            TypeOp::As => self.visit_as(&canonical, target, &t),
            TypeOp::OfType => {
                let is_primitive = !canonical.chars().next().is_some_and(|c| c.is_uppercase());
                let expression = if is_primitive {
                    self.dialect.generate_collection_type_filter(&t.expression, &canonical)
                } else {
                    let mut fragment = SQLFragment::new(self.dialect.empty_json_array());
                    fragment.metadata.insert(MetadataKey::Optimized, "complex_oftype_reserved".to_string());
                    return Ok(Some(fragment));
                };
                Ok(Some(SQLFragment::new(expression)))
            }
        }
    }

    fn visit_as(&mut self, canonical: &str, target: &AstNode, t: &SQLFragment) -> Result<Option<SQLFragment>, TranslationError> {
        let is_primitive = !canonical.chars().next().is_some_and(|c| c.is_uppercase());
        if is_primitive {
            return Ok(Some(SQLFragment::new(self.dialect.generate_type_cast(&t.expression, canonical))));
        }

        if self.registry.get_all_type_names().iter().any(|n| n == canonical) {
            if let Some(discriminators) = self.registry.discriminator_fields(canonical) {
                let prefix = member_name_of(target).unwrap_or_default();
                let receiver_type = self.receiver_type(target).unwrap_or_default();
                let variant_property = self
                    .registry
                    .choice_type_variants(&receiver_type, &prefix)
                    .into_iter()
                    .find(|variant| variant.ends_with(canonical))
                    .unwrap_or_else(|| format!("{prefix}{canonical}"));
                let variant_path = format!(
                    "$.{}",
                    replace_last_segment(&self.context.joined_path(), &receiver_type, &variant_property)
                );
                let extraction = self.dialect.extract_json_object(&self.context.current_table, &variant_path);
                let presence_checks: Vec<String> = discriminators
                    .iter()
                    .map(|field| self.dialect.check_json_exists(&extraction, &format!("$.{field}")))
                    .collect();
                let guard = presence_checks.join(" AND ");
                let expression = self.dialect.generate_conditional_expression(&guard, &extraction, "NULL");
                let mut fragment = SQLFragment::new(expression);
                fragment.metadata.insert(MetadataKey::Mode, "complex".to_string());
                fragment.metadata.insert(MetadataKey::VariantProperty, variant_property);
                fragment.metadata.insert(MetadataKey::DiscriminatorFields, discriminators);
                return Ok(Some(fragment));
            }
        }

        self.context.parent_path.clear();
        let mut fragment = SQLFragment::new("NULL");
        fragment.metadata.insert(MetadataKey::Mode, "null".to_string());
        Ok(Some(fragment))
    }
}

/// Splits a `LiteralKind::Quantity` value (`"<number>|<unit>"`) into its
/// numeric and unit parts.
fn quantity_parts(value: &str) -> (&str, &str) {
    value.split_once('|').unwrap_or((value, ""))
}

/// Returns a quantity literal node's `(number, unit)` parts, if `node` is
/// one.
fn as_quantity_literal(node: &AstNode) -> Option<(&str, &str)> {
    match node {
        AstNode::Literal { kind: LiteralKind::Quantity, value, .. } => Some(quantity_parts(value)),
        _ => None,
    }
}

/// The INTERVAL unit word for a quantity's calendar-duration unit, or
/// `None` when the unit isn't one of the temporal arithmetic's supported
/// calendar units (spec §4.4, "Temporal subtraction").
fn interval_unit(unit: &str) -> Option<&'static str> {
    match unit {
        "year" | "years" => Some("year"),
        "month" | "months" => Some("month"),
        "week" | "weeks" => Some("week"),
        "day" | "days" => Some("day"),
        "hour" | "hours" => Some("hour"),
        "minute" | "minutes" => Some("minute"),
        "second" | "seconds" => Some("second"),
        "millisecond" | "milliseconds" => Some("millisecond"),
        _ => None,
    }
}

fn is_empty_collection_literal(node: &AstNode) -> bool {
    matches!(node, AstNode::FunctionCall { name, target: None, args, .. } if name == "{}" && args.is_empty())
}

fn member_name_of(node: &AstNode) -> Option<String> {
    match node {
        AstNode::FunctionCall { name, args, .. } if args.is_empty() => Some(name.clone()),
        _ => None,
    }
}

fn replace_last_segment(path: &str, _receiver_type: &str, replacement: &str) -> String {
    match path.rsplit_once('.') {
        Some((prefix, _)) => format!("{prefix}.{replacement}"),
        None => replacement.to_string(),
    }
}

/// Normalizes function-form `fn(target, args)` calls to the method shape
/// `target.fn(args)` the rest of the translator expects (spec §4.4,
/// "Context-vs-argument semantics").
fn normalize_target_args<'a>(
    target: Option<&'a AstNode>,
    args: &'a [AstNode],
) -> (Option<&'a AstNode>, &'a [AstNode]) {
    if target.is_none() && !args.is_empty() {
        (Some(&args[0]), &args[1..])
    } else {
        (target, args)
    }
}

const STRING_FAMILY: &[&str] = &[
    "startsWith", "endsWith", "contains", "matches", "replace", "replaceMatches", "substring",
    "length", "upper", "lower", "indexOf", "split", "join", "toChars",
];

const MATH_FAMILY: &[&str] =
    &["abs", "ceiling", "floor", "round", "truncate", "sqrt", "ln", "log", "exp", "power"];

const CONVERSION_FAMILY: &[&str] = &[
    "toBoolean", "toInteger", "toDecimal", "toString", "toDate", "toDateTime", "toTime",
    "toQuantity", "convertsToBoolean", "convertsToInteger", "convertsToDecimal",
    "convertsToString", "convertsToDate", "convertsToDateTime", "convertsToTime",
    "convertsToQuantity",
];

const COLLECTION_FAMILY: &[&str] = &[
    "where", "select", "exists", "empty", "count", "first", "last", "tail", "skip", "take",
    "single", "distinct", "isDistinct", "intersect", "exclude", "combine", "subsetOf",
    "supersetOf",
];

fn is_string_family(name: &str) -> bool {
    STRING_FAMILY.contains(&name)
}

fn is_math_family(name: &str) -> bool {
    MATH_FAMILY.contains(&name)
}

fn is_conversion_family(name: &str) -> bool {
    CONVERSION_FAMILY.contains(&name)
}

fn is_collection_family(name: &str) -> bool {
    COLLECTION_FAMILY.contains(&name)
}

fn conversion_target_type(name: &str) -> &'static str {
    let base = name.strip_prefix("convertsTo").or_else(|| name.strip_prefix("to")).unwrap_or(name);
    match base {
        "Boolean" => "boolean",
        "Integer" => "integer",
        "Decimal" => "decimal",
        "String" => "string",
        "Date" => "date",
        "DateTime" => "dateTime",
        "Time" => "time",
        "Quantity" => "Quantity",
        _ => "string",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use fhir4ds_dialect::JsonDialect;
    use fhir4ds_registry::StaticTypeRegistry;

    fn translate(expr: &str, resource_type: &str) -> Vec<SQLFragment> {
        let parsed = parse(expr).unwrap();
        let dialect = JsonDialect::new();
        let registry = StaticTypeRegistry::new();
        let mut translator = ASTToSQLTranslator::new(&dialect, &registry, resource_type);
        translator.translate(&parsed.ast).unwrap()
    }

    #[test]
    fn scalar_path_emits_single_fragment_with_json_extract() {
        let fragments = translate("Patient.birthDate", "Patient");
        assert_eq!(fragments.len(), 1);
        assert!(fragments[0].expression.contains("json_extract(resource, '$.birthDate')"));
    }

    #[test]
    fn array_navigation_emits_intermediate_and_final_fragments() {
        let fragments = translate("Patient.name.given", "Patient");
        assert_eq!(fragments.len(), 2);
        assert!(fragments[0].requires_unnest);
        assert!(fragments[0].metadata.get(MetadataKey::ArrayColumn).is_some());
    }

    #[test]
    fn string_literal_doubles_embedded_quote() {
        let fragments = translate("'x''y' = 'x''y'", "Patient");
        assert!(fragments[0].expression.contains("'x''y'"));
    }

    #[test]
    fn boolean_literals_render_canonical_casing() {
        let fragments = translate("true = false", "Patient");
        assert!(fragments[0].expression.contains("TRUE"));
        assert!(fragments[0].expression.contains("FALSE"));
    }

    #[test]
    fn division_emits_nullif_guard() {
        let fragments = translate("(1 / 2)", "Patient");
        assert!(fragments[0].expression.contains("NULLIF"));
    }

    #[test]
    fn xor_emits_demorgan_form() {
        let fragments = translate("true xor false", "Patient");
        assert!(fragments[0].expression.contains("AND NOT"));
    }

    #[test]
    fn as_quantity_on_choice_value_emits_case_with_discriminator() {
        let fragments = translate("Observation.value.as(Quantity)", "Observation");
        let last = fragments.last().unwrap();
        assert_eq!(last.metadata.get(MetadataKey::Mode).and_then(|v| v.as_text()), Some("complex"));
    }

    #[test]
    fn complex_of_type_returns_empty_array_with_optimized_marker() {
        let fragments = translate("Observation.value.ofType(CodeableConcept)", "Observation");
        let last = fragments.last().unwrap();
        assert!(last.metadata.get(MetadataKey::Optimized).is_some());
    }

    #[test]
    fn substring_converts_zero_based_start_to_one_based() {
        let fragments = translate("Patient.id.substring(0)", "Patient");
        assert!(fragments[0].expression.contains("+ 1"));
    }

    #[test]
    fn union_coalesces_both_sides_before_union_all() {
        let fragments = translate("(1 | 2)", "Patient");
        assert!(fragments[0].expression.contains("COALESCE(1"));
        assert!(fragments[0].expression.contains("UNION ALL"));
    }

    #[test]
    fn date_minus_quantity_emits_interval_cast() {
        let fragments = translate("(@2021-01-01 - 3 days)", "Patient");
        assert!(fragments[0].expression.contains("INTERVAL '3 day'"));
        assert!(fragments[0].expression.contains("CAST("));
    }

    #[test]
    fn unary_not_negates_operand() {
        let fragments = translate("not true", "Patient");
        assert!(fragments[0].expression.contains("NOT TRUE"));
    }
}
