//! Recursive-descent parser with precedence climbing (spec §4.2).
//!
//! Precedence, loosest to tightest: `implies`, `or`/`xor`, `and`, equality
//! (`= != ~ !~`), comparison (`< > <= >=`), `in`/`contains`, `|`, additive
//! (`+ - &`), multiplicative (`* / div mod`), type (`is as`), unary
//! (`+ -`), postfix (`.` member, `[]` index, `()` call).

use crate::ast::{AggregationKind, AstNode, LiteralKind, OperatorKind, TypeOp};
use crate::lexer::{Lexer, Token, TokenKind};
use fhir4ds_support::ParseError;

/// Everything the validator needs alongside the tree itself (spec §4.2,
/// "Output").
#[derive(Debug)]
pub struct ParseOutput {
    pub ast: AstNode,
    pub function_calls: Vec<(String, fhir4ds_support::SourcePosition)>,
    pub path_components: Vec<String>,
    pub text: String,
}

pub fn parse(source: &str) -> Result<ParseOutput, ParseError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        index: 0,
        function_calls: Vec::new(),
        path_components: Vec::new(),
    };
    let ast = parser.parse_implies()?;
    parser.expect_eof()?;
    Ok(ParseOutput {
        ast,
        function_calls: parser.function_calls,
        path_components: parser.path_components,
        text: source.to_string(),
    })
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    function_calls: Vec<(String, fhir4ds_support::SourcePosition)>,
    path_components: Vec<String>,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.index]
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.index].clone();
        if self.index + 1 < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if matches!(self.peek().kind, TokenKind::Eof) {
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                found: self.peek().text.clone(),
                expected: "end of expression".to_string(),
                position: self.peek().position,
            })
        }
    }

    fn binary_op_node(
        &self,
        left: AstNode,
        op_text: &str,
        kind: OperatorKind,
        right: AstNode,
    ) -> AstNode {
        let text = format!("{} {} {}", left.text(), op_text, right.text());
        AstNode::Operator {
            operator_text: op_text.to_string(),
            kind,
            children: vec![left, right],
            text,
        }
    }

    // implies
    fn parse_implies(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_or_xor()?;
        while matches!(self.peek().kind, TokenKind::Implies) {
            self.advance();
            let right = self.parse_or_xor()?;
            left = self.binary_op_node(left, "implies", OperatorKind::Logical, right);
        }
        Ok(left)
    }

    // or / xor
    fn parse_or_xor(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_and()?;
        loop {
            let op_text = match self.peek().kind {
                TokenKind::Or => "or",
                TokenKind::Xor => "xor",
                _ => break,
            };
            self.advance();
            let right = self.parse_and().map_err(|_| ParseError::MissingOperand {
                operator: op_text.to_string(),
                position: self.peek().position,
            })?;
            left = self.binary_op_node(left, op_text, OperatorKind::Logical, right);
        }
        Ok(left)
    }

    // and
    fn parse_and(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_equality()?;
        while matches!(self.peek().kind, TokenKind::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = self.binary_op_node(left, "and", OperatorKind::Logical, right);
        }
        Ok(left)
    }

    // = != ~ !~
    fn parse_equality(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_comparison()?;
        loop {
            let op_text = match self.peek().kind {
                TokenKind::Eq => "=",
                TokenKind::NotEq => "!=",
                TokenKind::Tilde => "~",
                TokenKind::NotTilde => "!~",
                _ => break,
            };
            self.advance();
            let right = self.parse_comparison()?;
            left = self.binary_op_node(left, op_text, OperatorKind::Comparison, right);
        }
        Ok(left)
    }

    // < > <= >=
    fn parse_comparison(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_membership()?;
        loop {
            let op_text = match self.peek().kind {
                TokenKind::Lt => "<",
                TokenKind::Gt => ">",
                TokenKind::LtEq => "<=",
                TokenKind::GtEq => ">=",
                _ => break,
            };
            self.advance();
            let right = self.parse_membership()?;
            left = self.binary_op_node(left, op_text, OperatorKind::Comparison, right);
        }
        Ok(left)
    }

    // in / contains
    fn parse_membership(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_union()?;
        loop {
            let op_text = match self.peek().kind {
                TokenKind::In => "in",
                TokenKind::Contains => "contains",
                _ => break,
            };
            self.advance();
            let right = self.parse_union()?;
            left = self.binary_op_node(left, op_text, OperatorKind::Binary, right);
        }
        Ok(left)
    }

    // |
    fn parse_union(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_additive()?;
        while matches!(self.peek().kind, TokenKind::Pipe) {
            self.advance();
            let right = self.parse_additive()?;
            left = self.binary_op_node(left, "|", OperatorKind::Union, right);
        }
        Ok(left)
    }

    // + - &
    fn parse_additive(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op_text = match self.peek().kind {
                TokenKind::Plus => "+",
                TokenKind::Minus => "-",
                TokenKind::Ampersand => "&",
                _ => break,
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = self.binary_op_node(left, op_text, OperatorKind::Binary, right);
        }
        Ok(left)
    }

    // * / div mod
    fn parse_multiplicative(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_type()?;
        loop {
            let op_text = match self.peek().kind {
                TokenKind::Star => "*",
                TokenKind::Slash => "/",
                TokenKind::Div => "div",
                TokenKind::Mod => "mod",
                _ => break,
            };
            self.advance();
            let right = self.parse_type()?;
            left = self.binary_op_node(left, op_text, OperatorKind::Binary, right);
        }
        Ok(left)
    }

    // is / as
    fn parse_type(&mut self) -> Result<AstNode, ParseError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Is => TypeOp::Is,
                TokenKind::As => TypeOp::As,
                _ => break,
            };
            self.advance();
            let type_name = self.parse_type_specifier()?;
            let op_text = if matches!(op, TypeOp::Is) { "is" } else { "as" };
            let text = format!("{} {} {}", left.text(), op_text, type_name);
            left = AstNode::TypeOperation {
                operation: op,
                target_type: type_name,
                target: Box::new(left),
                text,
            };
        }
        Ok(left)
    }

    fn parse_type_specifier(&mut self) -> Result<String, ParseError> {
        let mut parts = Vec::new();
        loop {
            match &self.peek().kind {
                TokenKind::Identifier(name) => {
                    parts.push(name.clone());
                    self.advance();
                }
                _ => {
                    return Err(ParseError::UnexpectedToken {
                        found: self.peek().text.clone(),
                        expected: "type name".to_string(),
                        position: self.peek().position,
                    })
                }
            }
            if matches!(self.peek().kind, TokenKind::Dot) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(parts.join("."))
    }

    // unary + -
    fn parse_unary(&mut self) -> Result<AstNode, ParseError> {
        match self.peek().kind {
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                if let AstNode::Literal {
                    kind: kind @ (LiteralKind::Integer | LiteralKind::Decimal),
                    value,
                    text,
                } = operand
                {
                    return Ok(AstNode::Literal {
                        kind,
                        value: format!("-{value}"),
                        text: format!("-{text}"),
                    });
                }
                let text = format!("-{}", operand.text());
                Ok(AstNode::Operator {
                    operator_text: "-".to_string(),
                    kind: OperatorKind::Unary,
                    children: vec![operand],
                    text,
                })
            }
            TokenKind::Plus => {
                self.advance();
                self.parse_unary()
            }
            TokenKind::Not => {
                self.advance();
                let operand = self.parse_unary()?;
                let text = format!("not {}", operand.text());
                Ok(AstNode::Operator {
                    operator_text: "not".to_string(),
                    kind: OperatorKind::Unary,
                    children: vec![operand],
                    text,
                })
            }
            _ => self.parse_postfix(),
        }
    }

    // . [] ()
    fn parse_postfix(&mut self) -> Result<AstNode, ParseError> {
        let mut node = self.parse_primary()?;
        loop {
            match self.peek().kind {
                TokenKind::Dot => {
                    self.advance();
                    node = self.parse_member(node)?;
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index_expr = self.parse_implies()?;
                    self.expect(TokenKind::RBracket, "]")?;
                    let text = format!("{}[{}]", node.text(), index_expr.text());
                    node = AstNode::FunctionCall {
                        name: "index".to_string(),
                        target: Some(Box::new(node)),
                        args: vec![index_expr],
                        text,
                    };
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_member(&mut self, target: AstNode) -> Result<AstNode, ParseError> {
        let name_token = self.advance();
        let name = match &name_token.kind {
            TokenKind::Identifier(name) => name.clone(),
            TokenKind::BacktickIdentifier(name) => name.clone(),
            TokenKind::Is => "is".to_string(),
            TokenKind::As => "as".to_string(),
            _ => {
                return Err(ParseError::UnexpectedToken {
                    found: name_token.text.clone(),
                    expected: "member name".to_string(),
                    position: name_token.position,
                })
            }
        };

        if matches!(self.peek().kind, TokenKind::LParen) {
            self.advance();
            let args = self.parse_arg_list()?;
            self.expect(TokenKind::RParen, ")")?;
            self.function_calls.push((name.clone(), name_token.position));
            let text = format!(
                "{}.{}({})",
                target.text(),
                name,
                args.iter().map(|a| a.text()).collect::<Vec<_>>().join(", ")
            );
            if args.is_empty() {
                if let Some(kind) = aggregation_kind(&name) {
                    return Ok(AstNode::Aggregation {
                        function: name,
                        kind,
                        target: Box::new(target),
                        text,
                    });
                }
            }
            return Ok(AstNode::FunctionCall {
                name,
                target: Some(Box::new(target)),
                args,
                text,
            });
        }

        self.path_components.push(name.clone());
        let text = format!("{}.{}", target.text(), name);
        Ok(AstNode::FunctionCall { name, target: Some(Box::new(target)), args: Vec::new(), text })
    }

    fn parse_arg_list(&mut self) -> Result<Vec<AstNode>, ParseError> {
        let mut args = Vec::new();
        if matches!(self.peek().kind, TokenKind::RParen) {
            return Ok(args);
        }
        args.push(self.parse_implies()?);
        while matches!(self.peek().kind, TokenKind::Comma) {
            self.advance();
            args.push(self.parse_implies()?);
        }
        Ok(args)
    }

    fn expect(&mut self, kind: TokenKind, display: &str) -> Result<Token, ParseError> {
        if std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(&kind) {
            Ok(self.advance())
        } else if matches!(kind, TokenKind::RParen | TokenKind::RBracket)
            && matches!(self.peek().kind, TokenKind::Eof)
        {
            Err(ParseError::UnbalancedParens { position: self.peek().position })
        } else {
            Err(ParseError::UnexpectedToken {
                found: self.peek().text.clone(),
                expected: display.to_string(),
                position: self.peek().position,
            })
        }
    }

    /// Consumes a trailing calendar-duration keyword or quoted UCUM unit
    /// after a numeric literal, producing a `LiteralKind::Quantity` node
    /// (spec §3, "literal families"). Falls back to a plain
    /// integer/decimal literal when no unit follows.
    fn parse_quantity_suffix(&mut self, number_text: String) -> Result<AstNode, ParseError> {
        let unit = match &self.peek().kind {
            TokenKind::String(unit) => {
                let unit = unit.clone();
                self.advance();
                Some(unit)
            }
            TokenKind::Identifier(word) if is_calendar_duration_unit(word) => {
                let unit = word.clone();
                self.advance();
                Some(unit)
            }
            _ => None,
        };

        match unit {
            Some(unit) => {
                let text = format!("{number_text} {unit}");
                Ok(AstNode::Literal {
                    kind: LiteralKind::Quantity,
                    value: format!("{number_text}|{unit}"),
                    text,
                })
            }
            None => {
                let kind = if number_text.contains('.') { LiteralKind::Decimal } else { LiteralKind::Integer };
                Ok(AstNode::Literal { kind, value: number_text.clone(), text: number_text })
            }
        }
    }

    fn parse_primary(&mut self) -> Result<AstNode, ParseError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Integer(text) => {
                self.advance();
                self.parse_quantity_suffix(text)
            }
            TokenKind::Decimal(text) => {
                self.advance();
                self.parse_quantity_suffix(text)
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(AstNode::Literal {
                    kind: LiteralKind::String,
                    value: value.clone(),
                    text: token.text.clone(),
                })
            }
            TokenKind::Boolean(b) => {
                self.advance();
                Ok(AstNode::Literal {
                    kind: LiteralKind::Boolean,
                    value: b.to_string(),
                    text: token.text.clone(),
                })
            }
            TokenKind::DateLiteral(text) => {
                self.advance();
                Ok(AstNode::Literal {
                    kind: LiteralKind::Date,
                    value: text.clone(),
                    text: token.text.clone(),
                })
            }
            TokenKind::DateTimeLiteral(text) => {
                self.advance();
                Ok(AstNode::Literal {
                    kind: LiteralKind::DateTime,
                    value: text.clone(),
                    text: token.text.clone(),
                })
            }
            TokenKind::TimeLiteral(text) => {
                self.advance();
                Ok(AstNode::Literal {
                    kind: LiteralKind::Time,
                    value: text.clone(),
                    text: token.text.clone(),
                })
            }
            TokenKind::Variable(name) => {
                self.advance();
                Ok(AstNode::Identifier { name: format!("${name}"), text: format!("${name}") })
            }
            TokenKind::Identifier(name) | TokenKind::BacktickIdentifier(name) => {
                self.advance();
                if matches!(self.peek().kind, TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_arg_list()?;
                    self.expect(TokenKind::RParen, ")")?;
                    self.function_calls.push((name.clone(), token.position));
                    let text = format!(
                        "{}({})",
                        name,
                        args.iter().map(|a| a.text()).collect::<Vec<_>>().join(", ")
                    );
                    return Ok(AstNode::FunctionCall { name, target: None, args, text });
                }
                self.path_components.push(name.clone());
                Ok(AstNode::Identifier { name: name.clone(), text: name })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_implies()?;
                self.expect(TokenKind::RParen, ")")?;
                Ok(inner)
            }
            TokenKind::LBrace => {
                self.advance();
                self.expect(TokenKind::RBrace, "}")?;
                Ok(AstNode::FunctionCall {
                    name: "{}".to_string(),
                    target: None,
                    args: Vec::new(),
                    text: "{}".to_string(),
                })
            }
            TokenKind::Eof => Err(ParseError::UnexpectedEndOfInput {
                expected: "expression".to_string(),
            }),
            _ => Err(ParseError::UnexpectedToken {
                found: token.text.clone(),
                expected: "expression".to_string(),
                position: token.position,
            }),
        }
    }
}

/// Recognizes the reserved aggregate-function names dispatched to an
/// [`AggregationKind`] (spec §4.4, "visit_aggregation"). Used by the
/// translator, not the parser, but kept near the AST it classifies.
pub fn aggregation_kind(name: &str) -> Option<AggregationKind> {
    match name {
        "count" => Some(AggregationKind::Count),
        "sum" => Some(AggregationKind::Sum),
        "min" => Some(AggregationKind::Min),
        "max" => Some(AggregationKind::Max),
        "avg" | "average" => Some(AggregationKind::Avg),
        "allTrue" => Some(AggregationKind::AllTrue),
        "anyTrue" => Some(AggregationKind::AnyTrue),
        "allFalse" => Some(AggregationKind::AllFalse),
        "anyFalse" => Some(AggregationKind::AnyFalse),
        _ => None,
    }
}

const CALENDAR_DURATION_UNITS: &[&str] = &[
    "year", "years", "month", "months", "week", "weeks", "day", "days", "hour", "hours",
    "minute", "minutes", "second", "seconds", "millisecond", "milliseconds",
];

fn is_calendar_duration_unit(word: &str) -> bool {
    CALENDAR_DURATION_UNITS.contains(&word)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_path_as_nested_member_calls() {
        let out = parse("Patient.name.given").unwrap();
        assert_eq!(out.path_components, vec!["Patient", "name", "given"]);
    }

    #[test]
    fn parses_function_call_and_records_it() {
        let out = parse("Patient.name.where(use = 'official')").unwrap();
        assert_eq!(out.function_calls[0].0, "where");
    }

    #[test]
    fn parses_is_and_as_type_operations() {
        let out = parse("Observation.value as Quantity").unwrap();
        match out.ast {
            AstNode::TypeOperation { operation, target_type, .. } => {
                assert!(matches!(operation, TypeOp::As));
                assert_eq!(target_type, "Quantity");
            }
            other => panic!("expected TypeOperation, got {other:?}"),
        }
    }

    #[test]
    fn parses_negative_integer_literal_as_single_literal() {
        let out = parse("-5").unwrap();
        assert!(matches!(
            out.ast,
            AstNode::Literal { kind: LiteralKind::Integer, .. }
        ));
    }

    #[test]
    fn precedence_orders_and_below_equality() {
        let out = parse("true = true and false = false").unwrap();
        match out.ast {
            AstNode::Operator { operator_text, .. } => assert_eq!(operator_text, "and"),
            other => panic!("expected top-level and, got {other:?}"),
        }
    }

    #[test]
    fn unbalanced_parens_is_an_error() {
        let err = parse("Patient.name.where(use = 'x'").unwrap_err();
        assert!(matches!(err, ParseError::UnbalancedParens { .. }));
    }

    #[test]
    fn xor_produces_logical_operator_node() {
        let out = parse("true xor false").unwrap();
        match out.ast {
            AstNode::Operator { operator_text, kind, .. } => {
                assert_eq!(operator_text, "xor");
                assert!(matches!(kind, OperatorKind::Logical));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parses_quantity_literal_with_calendar_unit() {
        let out = parse("4 days").unwrap();
        match out.ast {
            AstNode::Literal { kind: LiteralKind::Quantity, value, .. } => {
                assert_eq!(value, "4|days");
            }
            other => panic!("expected Quantity literal, got {other:?}"),
        }
    }

    #[test]
    fn parses_quantity_literal_with_quoted_ucum_unit() {
        let out = parse("10 'mg'").unwrap();
        match out.ast {
            AstNode::Literal { kind: LiteralKind::Quantity, value, .. } => {
                assert_eq!(value, "10|mg");
            }
            other => panic!("expected Quantity literal, got {other:?}"),
        }
    }

    #[test]
    fn bare_number_without_unit_stays_a_plain_literal() {
        let out = parse("4").unwrap();
        assert!(matches!(out.ast, AstNode::Literal { kind: LiteralKind::Integer, .. }));
    }

    #[test]
    fn parses_unary_not_as_operator_node() {
        let out = parse("not true").unwrap();
        match out.ast {
            AstNode::Operator { operator_text, kind, .. } => {
                assert_eq!(operator_text, "not");
                assert!(matches!(kind, OperatorKind::Unary));
            }
            other => panic!("expected unary not, got {other:?}"),
        }
    }
}
