//! Condition expression language: parser and evaluator.
//!
//! Grammar:
//! ```text
//! ConditionExpr  ::= Clause ( '&&' Clause )*
//! Clause         ::= Comparison | BareKey
//! Comparison     ::= Key ( '=' | '!=' ) Literal
//! BareKey        ::= Key
//! Key            ::= identifier ( '.' identifier )*
//! Literal        ::= QuotedString | BareWord
//! ```
//!
//! The parser and evaluator are total: no input string causes either to
//! throw. A clause that cannot be parsed into a comparison or a valid bare
//! key becomes [`Clause::Invalid`], which always evaluates to `false`.

/// A parsed condition expression consisting of one or more clauses joined by `&&`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionExpr {
    pub clauses: Vec<Clause>,
}

/// A single clause within a condition expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// `key (= | !=) literal`.
    Comparison {
        key: String,
        operator: Operator,
        value: String,
    },
    /// A bare key: true iff the resolved value is a non-empty string.
    BareKey { key: String },
    /// Malformed syntax (e.g. an empty clause from `"a && && b"`). Always
    /// evaluates to `false` — this is how the evaluator stays total.
    Invalid,
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
}

/// Parse a condition string into a [`ConditionExpr`]. Never fails: an empty
/// or whitespace-only input produces zero clauses (always true); malformed
/// clauses become [`Clause::Invalid`] (always false).
pub fn parse_condition(input: &str) -> ConditionExpr {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return ConditionExpr { clauses: Vec::new() };
    }

    let clauses = trimmed.split("&&").map(|part| parse_clause(part.trim())).collect();
    ConditionExpr { clauses }
}

fn parse_clause(input: &str) -> Clause {
    if input.is_empty() {
        return Clause::Invalid;
    }

    if let Some((key_end, operator, op_len)) = find_operator(input) {
        let key = input[..key_end].trim().to_string();
        let raw_value = input[key_end + op_len..].trim();
        if key.is_empty() || !is_valid_key(&key) || raw_value.is_empty() {
            return Clause::Invalid;
        }
        return Clause::Comparison {
            key,
            operator,
            value: strip_quotes(raw_value),
        };
    }

    let key = input.trim().to_string();
    if is_valid_key(&key) {
        Clause::BareKey { key }
    } else {
        Clause::Invalid
    }
}

fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && key
            .split('.')
            .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_alphanumeric() || c == '_'))
}

/// Scan for `!=` or `=`, skipping quoted regions. Returns `None` if no
/// operator is present (a bare-key clause).
fn find_operator(input: &str) -> Option<(usize, Operator, usize)> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                let quote = bytes[i];
                i += 1;
                while i < bytes.len() && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            }
            b'!' if i + 1 < bytes.len() && bytes[i + 1] == b'=' => {
                return Some((i, Operator::NotEq, 2));
            }
            b'=' => {
                return Some((i, Operator::Eq, 1));
            }
            _ => {
                i += 1;
            }
        }
    }
    None
}

fn strip_quotes(s: &str) -> String {
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        if (bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\'')
        {
            return s[1..s.len() - 1].to_string();
        }
    }
    s.to_string()
}

/// Evaluate a condition expression against values provided by a resolver
/// function. The `resolve` function maps a key (e.g. `"outcome"`,
/// `"context.env"`) to its string value; keys not found resolve to `""`.
///
/// Pure, total, and referentially transparent: this function never panics
/// and always terminates for any finite `expr`.
pub fn evaluate_condition(expr: &ConditionExpr, resolve: &dyn Fn(&str) -> String) -> bool {
    if expr.clauses.is_empty() {
        return true;
    }

    expr.clauses.iter().all(|clause| match clause {
        Clause::Comparison { key, operator, value } => {
            let actual = resolve(key);
            match operator {
                Operator::Eq => actual == *value,
                Operator::NotEq => actual != *value,
            }
        }
        Clause::BareKey { key } => !resolve(key).is_empty(),
        Clause::Invalid => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_resolve(outcome: &str) -> impl Fn(&str) -> String + '_ {
        move |key: &str| match key {
            "outcome" => outcome.to_string(),
            "preferred_label" => "my_label".to_string(),
            "context.tests_passed" => "true".to_string(),
            "context.env" => "prod".to_string(),
            _ => String::new(),
        }
    }

    #[test]
    fn simple_equality() {
        let expr = parse_condition("outcome=success");
        assert_eq!(expr.clauses.len(), 1);
        assert_eq!(
            expr.clauses[0],
            Clause::Comparison {
                key: "outcome".into(),
                operator: Operator::Eq,
                value: "success".into(),
            }
        );

        assert!(evaluate_condition(&expr, &simple_resolve("success")));
        assert!(!evaluate_condition(&expr, &simple_resolve("fail")));
    }

    #[test]
    fn not_equal() {
        let expr = parse_condition("outcome!=fail");
        assert!(evaluate_condition(&expr, &simple_resolve("success")));
        assert!(!evaluate_condition(&expr, &simple_resolve("fail")));
    }

    #[test]
    fn compound_condition() {
        let expr = parse_condition("outcome=success && context.tests_passed=true");
        assert_eq!(expr.clauses.len(), 2);

        assert!(evaluate_condition(&expr, &simple_resolve("success")));
        assert!(!evaluate_condition(&expr, &simple_resolve("fail")));
    }

    #[test]
    fn empty_condition_always_true() {
        let expr = parse_condition("");
        assert!(expr.clauses.is_empty());
        assert!(evaluate_condition(&expr, &simple_resolve("anything")));

        let expr2 = parse_condition("   ");
        assert!(evaluate_condition(&expr2, &simple_resolve("anything")));
    }

    #[test]
    fn bare_key_true_when_resolved_value_non_empty() {
        let expr = parse_condition("context.env");
        assert!(evaluate_condition(&expr, &simple_resolve("anything")));
    }

    #[test]
    fn bare_key_false_when_resolved_value_missing() {
        let expr = parse_condition("context.unknown_key");
        assert!(!evaluate_condition(&expr, &simple_resolve("anything")));
    }

    #[test]
    fn quoted_string_values() {
        let expr = parse_condition(r#"outcome="success""#);
        assert!(evaluate_condition(&expr, &simple_resolve("success")));

        let expr2 = parse_condition("outcome='success'");
        assert!(evaluate_condition(&expr2, &simple_resolve("success")));
    }

    #[test]
    fn malformed_clause_never_panics_and_evaluates_false() {
        // Empty clause in a compound expression.
        let expr = parse_condition("outcome=success && ");
        assert!(matches!(expr.clauses[1], Clause::Invalid));
        assert!(!evaluate_condition(&expr, &simple_resolve("success")));

        // Operator with no key before it.
        let expr2 = parse_condition("=value");
        assert!(matches!(expr2.clauses[0], Clause::Invalid));
        assert!(!evaluate_condition(&expr2, &simple_resolve("anything")));

        // Operator with no value after it.
        let expr3 = parse_condition("context.unknown=");
        assert!(matches!(expr3.clauses[0], Clause::Invalid));
        assert!(!evaluate_condition(&expr3, &simple_resolve("anything")));
    }

    #[test]
    fn integer_values_as_strings() {
        let expr = parse_condition("context.count=42");
        let resolve = |key: &str| -> String {
            if key == "context.count" {
                "42".to_string()
            } else {
                String::new()
            }
        };
        assert!(evaluate_condition(&expr, &resolve));
    }
}
