//! 1-based line/column computation and string masking shared by the lexer,
//! parser, and semantic validator so that every phase reports positions the
//! same way.

/// Compute a 1-based `(line, column)` pair for a byte index into `text`.
///
/// Mirrors `SemanticValidator._compute_position` from the original Python
/// implementation: `\r\n` counts as a single line break, and an index past
/// the end of the string clamps to the last character scanned.
pub fn line_col(text: &str, index: usize) -> (usize, usize) {
    if index == 0 {
        return (1, 1);
    }

    let bytes = text.as_bytes();
    let length = index.min(bytes.len());

    let mut line = 1usize;
    let mut column = 1usize;
    let mut cursor = 0usize;

    while cursor < length {
        let ch = bytes[cursor];
        if ch == b'\r' {
            if cursor + 1 < bytes.len() && bytes[cursor + 1] == b'\n' {
                cursor += 1;
            }
            line += 1;
            column = 1;
        } else if ch == b'\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
        cursor += 1;
    }

    (line, column)
}

/// Replace the contents of single-quoted strings, double-quoted strings,
/// backtick-quoted identifiers, and `//`/`/* */` comments with spaces
/// (preserving byte length and therefore offsets), so substring search for
/// diagnostic snippets never matches text that lives inside a literal.
///
/// When `preserve_backticks` is true, backtick-delimited identifier text is
/// left untouched (callers that need to find element names need the
/// original text back).
pub fn mask_expression(expression: &str, preserve_backticks: bool) -> String {
    let chars: Vec<char> = expression.chars().collect();
    let mut out = chars.clone();
    let length = chars.len();
    let mut index = 0usize;

    let mut in_single = false;
    let mut in_double = false;
    let mut in_backtick = false;
    let mut block_depth = 0usize;

    while index < length {
        let current = chars[index];
        let next = chars.get(index + 1).copied();

        if block_depth > 0 {
            out[index] = ' ';
            if current == '/' && next == Some('*') {
                out[index + 1] = ' ';
                block_depth += 1;
                index += 2;
                continue;
            }
            if current == '*' && next == Some('/') {
                out[index + 1] = ' ';
                block_depth -= 1;
                index += 2;
                continue;
            }
            index += 1;
            continue;
        }

        if in_single {
            out[index] = ' ';
            if current == '\'' {
                in_single = false;
            }
            index += 1;
            continue;
        }

        if in_double {
            out[index] = ' ';
            if current == '"' {
                in_double = false;
            }
            index += 1;
            continue;
        }

        if in_backtick {
            if !preserve_backticks {
                out[index] = ' ';
            }
            if current == '`' {
                in_backtick = false;
            }
            index += 1;
            continue;
        }

        if current == '\'' {
            out[index] = ' ';
            in_single = true;
            index += 1;
            continue;
        }

        if current == '"' {
            out[index] = ' ';
            in_double = true;
            index += 1;
            continue;
        }

        if current == '`' {
            if !preserve_backticks {
                out[index] = ' ';
            }
            in_backtick = true;
            index += 1;
            continue;
        }

        if current == '/' && next == Some('/') {
            out[index] = ' ';
            out[index + 1] = ' ';
            index += 2;
            while index < length && chars[index] != '\n' && chars[index] != '\r' {
                out[index] = ' ';
                index += 1;
            }
            continue;
        }

        if current == '/' && next == Some('*') {
            out[index] = ' ';
            out[index + 1] = ' ';
            block_depth = 1;
            index += 2;
            continue;
        }

        index += 1;
    }

    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_col_handles_newlines() {
        let text = "a\nbc\nd";
        assert_eq!(line_col(text, 0), (1, 1));
        assert_eq!(line_col(text, 2), (2, 1));
        assert_eq!(line_col(text, 5), (3, 1));
    }

    #[test]
    fn mask_expression_blanks_string_literals() {
        let masked = mask_expression("name = 'where('", false);
        assert!(!masked.contains("where("));
        assert_eq!(masked.len(), "name = 'where('".len());
    }

    #[test]
    fn mask_expression_preserves_backticks_when_requested() {
        let masked = mask_expression("Patient.`given`.first()", true);
        assert!(masked.contains("`given`"));
    }

    #[test]
    fn mask_expression_strips_line_comments() {
        let masked = mask_expression("a + b // unknownFn(\nc", false);
        assert!(!masked.contains("unknownFn"));
        assert!(masked.contains('c'));
    }
}
