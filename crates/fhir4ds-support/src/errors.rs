//! Error taxonomy for the expression compiler (spec §7).
//!
//! Each compiler phase gets its own error type so callers can match on
//! "which phase failed" without string-sniffing a message. [`CompileError`]
//! unifies them for the top-level `compile()` entry point. This follows a
//! plain hand-written `enum` + manual `Display`/`Error` pattern
//! (`AtriusFhirPath::error::FhirPathError`) rather than pulling in a derive
//! macro crate not already in the dependency tree.

use std::fmt;

/// A 1-based source position, attached to most error variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn from_index(text: &str, index: usize) -> Self {
        let (line, column) = crate::position::line_col(text, index);
        Self { line, column }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// Unterminated string/backtick literal or an unrecognized character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexError {
    UnterminatedString { position: SourcePosition },
    UnterminatedBacktick { position: SourcePosition },
    UnknownCharacter { character: char, position: SourcePosition },
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LexError::UnterminatedString { position } => {
                write!(f, "unterminated string literal at {position}")
            }
            LexError::UnterminatedBacktick { position } => {
                write!(f, "unterminated backtick-quoted identifier at {position}")
            }
            LexError::UnknownCharacter { character, position } => {
                write!(f, "unexpected character '{character}' at {position}")
            }
        }
    }
}

impl std::error::Error for LexError {}

/// Unbalanced parens, missing operand, unknown operator token, or an
/// expression that ends mid-construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Lex(LexError),
    UnbalancedParens { position: SourcePosition },
    UnexpectedToken { found: String, expected: String, position: SourcePosition },
    MissingOperand { operator: String, position: SourcePosition },
    UnexpectedEndOfInput { expected: String },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Lex(inner) => write!(f, "{inner}"),
            ParseError::UnbalancedParens { position } => {
                write!(f, "unbalanced parentheses at {position}")
            }
            ParseError::UnexpectedToken { found, expected, position } => {
                write!(f, "expected {expected} but found '{found}' at {position}")
            }
            ParseError::MissingOperand { operator, position } => {
                write!(f, "missing operand for operator '{operator}' at {position}")
            }
            ParseError::UnexpectedEndOfInput { expected } => {
                write!(f, "unexpected end of input, expected {expected}")
            }
        }
    }
}

impl std::error::Error for ParseError {}

impl From<LexError> for ParseError {
    fn from(value: LexError) -> Self {
        ParseError::Lex(value)
    }
}

/// A semantic rule from spec §4.3 was violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    ContextRootMismatch { root: String, resource_type: String },
    ChoiceAliasAccess { alias: String },
    DigitSuffixedIdentifier { identifier: String },
    InvalidPeriodProperty { property: String },
    TimeLiteralWithTimezone { literal: String, timezone: String },
    IncompleteExpression { detail: String },
    TemporalComparisonMismatch { left: String, right: String },
    UnknownFunction { name: String, position: SourcePosition, suggestion: Option<String> },
    LiteralStringArithmetic { operator: String, position: SourcePosition },
    UnknownElement {
        element: String,
        on_type: String,
        position: SourcePosition,
        suggestions: Vec<String>,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ContextRootMismatch { root, resource_type } => write!(
                f,
                "expression root '{root}' is invalid for resource type '{resource_type}'"
            ),
            ValidationError::ChoiceAliasAccess { alias } => write!(
                f,
                "direct access to choice-type alias '{alias}' is not supported; use a type function such as value.as(...) instead"
            ),
            ValidationError::DigitSuffixedIdentifier { identifier } => write!(
                f,
                "invalid element name '{identifier}': FHIR element names do not end with digits"
            ),
            ValidationError::InvalidPeriodProperty { property } => write!(
                f,
                "property '{property}' is invalid for Period; allowed properties are: start, end"
            ),
            ValidationError::TimeLiteralWithTimezone { literal, timezone } => write!(
                f,
                "time literal '{literal}' is invalid: time literals cannot have timezone suffix '{timezone}'"
            ),
            ValidationError::IncompleteExpression { detail } => {
                write!(f, "incomplete expression: {detail}")
            }
            ValidationError::TemporalComparisonMismatch { left, right } => write!(
                f,
                "cannot compare {left} with {right}: TIME is incompatible with DATE/DATETIME in comparisons"
            ),
            ValidationError::UnknownFunction { name, position, suggestion } => {
                write!(f, "unknown function '{name}' at {position}")?;
                if let Some(suggestion) = suggestion {
                    write!(f, ". Did you mean '{suggestion}'?")?;
                }
                Ok(())
            }
            ValidationError::LiteralStringArithmetic { operator, position } => write!(
                f,
                "operator '{operator}' does not support string literals at {position}; use '&' for concatenation"
            ),
            ValidationError::UnknownElement { element, on_type, position, suggestions } => {
                write!(f, "unknown element '{element}' on type '{on_type}' at {position}")?;
                if !suggestions.is_empty() {
                    write!(f, ". Did you mean: {}?", suggestions.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// An unknown FHIR type, wrong arity, or invalid argument kind found while
/// lowering the AST to SQL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    UnknownType { type_name: String },
    WrongArity { function: String, expected: String, found: usize },
    InvalidArgument { function: String, detail: String },
    UnknownOperator { operator: String },
    UnknownLiteralKind { text: String },
    UnboundVariable { name: String },
}

impl fmt::Display for TranslationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationError::UnknownType { type_name } => {
                write!(f, "unknown FHIR type '{type_name}'")
            }
            TranslationError::WrongArity { function, expected, found } => write!(
                f,
                "function '{function}' expects {expected} argument(s), found {found}"
            ),
            TranslationError::InvalidArgument { function, detail } => {
                write!(f, "invalid argument to '{function}': {detail}")
            }
            TranslationError::UnknownOperator { operator } => {
                write!(f, "unknown operator '{operator}'")
            }
            TranslationError::UnknownLiteralKind { text } => {
                write!(f, "unknown literal kind for '{text}'")
            }
            TranslationError::UnboundVariable { name } => {
                write!(f, "unbound variable '{name}'")
            }
        }
    }
}

impl std::error::Error for TranslationError {}

/// Missing metadata or source table while converting fragments into CTEs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    MissingSourceTable { cte_name: String },
    MissingMetadataKey { cte_name: String, key: String },
    EmptyExpression { cte_name: String },
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildError::MissingSourceTable { cte_name } => {
                write!(f, "CTE '{cte_name}' has no source table")
            }
            BuildError::MissingMetadataKey { cte_name, key } => write!(
                f,
                "CTE '{cte_name}' requires unnest but is missing metadata key '{key}'"
            ),
            BuildError::EmptyExpression { cte_name } => {
                write!(f, "CTE '{cte_name}' has an empty expression body")
            }
        }
    }
}

impl std::error::Error for BuildError {}

/// Missing dependency, duplicate CTE name, or a dependency cycle while
/// assembling the final `WITH` clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    EmptyCteList,
    DuplicateCteName { name: String },
    MissingDependency { cte_name: String, missing: Vec<String> },
    DependencyCycle { path: Vec<String> },
}

impl fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyError::EmptyCteList => write!(f, "cannot assemble an empty CTE list"),
            AssemblyError::DuplicateCteName { name } => {
                write!(f, "duplicate CTE name '{name}'")
            }
            AssemblyError::MissingDependency { cte_name, missing } => write!(
                f,
                "CTE '{cte_name}' depends on undefined CTE(s): {}",
                missing.join(", ")
            ),
            AssemblyError::DependencyCycle { path } => {
                write!(f, "cycle detected: {}", path.join(" -> "))
            }
        }
    }
}

impl std::error::Error for AssemblyError {}

/// Unifying error type for `compile()`. Each phase surfaces its first hard
/// error and stops (spec §7 propagation policy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    Parse(ParseError),
    Validation(ValidationError),
    Translation(TranslationError),
    Build(BuildError),
    Assembly(AssemblyError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Parse(e) => write!(f, "{e}"),
            CompileError::Validation(e) => write!(f, "{e}"),
            CompileError::Translation(e) => write!(f, "{e}"),
            CompileError::Build(e) => write!(f, "{e}"),
            CompileError::Assembly(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<ParseError> for CompileError {
    fn from(value: ParseError) -> Self {
        CompileError::Parse(value)
    }
}

impl From<ValidationError> for CompileError {
    fn from(value: ValidationError) -> Self {
        CompileError::Validation(value)
    }
}

impl From<TranslationError> for CompileError {
    fn from(value: TranslationError) -> Self {
        CompileError::Translation(value)
    }
}

impl From<BuildError> for CompileError {
    fn from(value: BuildError) -> Self {
        CompileError::Build(value)
    }
}

impl From<AssemblyError> for CompileError {
    fn from(value: AssemblyError) -> Self {
        CompileError::Assembly(value)
    }
}
