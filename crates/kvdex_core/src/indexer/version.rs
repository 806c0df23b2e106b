//! Optimistic version checks for UPDATE statements.

use crate::statement::{column_name, Expr, Literal};

/// Result of checking a version assignment.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VersionOutcome {
    /// The update may proceed; carries the new version when it can be computed.
    Accept(Option<String>),
    /// The stored version is not the one the statement expects.
    Conflict {
        /// Version the statement expects to replace.
        expected: String,
        /// Version found in the data hash.
        stored: String,
    },
}

fn same_version(a: &str, b: &str) -> bool {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x == y,
        _ => a == b,
    }
}

fn add(base: &str, step: &Literal) -> Option<String> {
    match (base.trim().parse::<i64>(), step) {
        (Ok(b), Literal::Integer(n)) => b.checked_add(*n).map(|v| v.to_string()),
        _ => {
            let sum = base.trim().parse::<f64>().ok()? + step.as_f64()?;
            Some(sum.to_string())
        }
    }
}

/// Checks `field = assigned` against the `stored` version.
///
/// - `field + n` is an increment and always accepted.
/// - `E + n` expects the stored version to be `E`.
/// - A literal `T` expects the version pinned by the WHERE clause (`guard`),
///   or `T` itself when there is none.
/// - Any other expression is accepted without a computed value.
///
/// Nothing stored means nothing to contradict.
pub(crate) fn check(
    field: &str,
    assigned: &Expr,
    guard: Option<&str>,
    stored: Option<&str>,
) -> VersionOutcome {
    let (expected, new_value) = match assigned {
        Expr::Add(left, right) => match (left.as_ref(), right.as_ref()) {
            (Expr::Column(column), Expr::Literal(step)) if column_name(column) == field => {
                return VersionOutcome::Accept(stored.and_then(|s| add(s, step)));
            }
            (Expr::Literal(base), Expr::Literal(step)) => match base.to_value() {
                Some(base) => {
                    let next = add(&base, step);
                    (Some(base), next)
                }
                None => (None, None),
            },
            _ => (None, None),
        },
        Expr::Literal(target) => {
            let target = target.to_value();
            (guard.map(str::to_string).or_else(|| target.clone()), target)
        }
        Expr::Column(_) | Expr::Other(_) => (None, None),
    };

    match (expected, stored) {
        (Some(expected), Some(stored)) if !same_version(&expected, stored) => {
            VersionOutcome::Conflict {
                expected,
                stored: stored.to_string(),
            }
        }
        _ => VersionOutcome::Accept(new_value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V: &str = "jpa_version";

    #[test]
    fn increment_is_always_accepted() {
        let expr = Expr::col(V).plus(Expr::lit(1));
        assert_eq!(check(V, &expr, None, Some("4")), VersionOutcome::Accept(Some("5".into())));
        assert_eq!(check(V, &expr, Some("9"), Some("4")), VersionOutcome::Accept(Some("5".into())));
        assert_eq!(check(V, &expr, None, None), VersionOutcome::Accept(None));
    }

    #[test]
    fn qualified_column_increment() {
        let expr = Expr::col("t.jpa_version").plus(Expr::lit(2));
        assert_eq!(check(V, &expr, None, Some("1")), VersionOutcome::Accept(Some("3".into())));
    }

    #[test]
    fn literal_base_must_match() {
        let expr = Expr::lit(4).plus(Expr::lit(1));
        assert_eq!(check(V, &expr, None, Some("4")), VersionOutcome::Accept(Some("5".into())));
        assert!(matches!(check(V, &expr, None, Some("3")), VersionOutcome::Conflict { .. }));
    }

    #[test]
    fn literal_target_uses_guard() {
        let expr = Expr::lit(6);
        assert_eq!(check(V, &expr, Some("5"), Some("5")), VersionOutcome::Accept(Some("6".into())));
        assert_eq!(
            check(V, &expr, Some("5"), Some("6")),
            VersionOutcome::Conflict {
                expected: "5".into(),
                stored: "6".into()
            }
        );
    }

    #[test]
    fn literal_target_without_guard() {
        let expr = Expr::lit(6);
        assert_eq!(check(V, &expr, None, Some("6.0")), VersionOutcome::Accept(Some("6".into())));
        assert!(matches!(check(V, &expr, None, Some("5")), VersionOutcome::Conflict { .. }));
        assert_eq!(check(V, &expr, None, None), VersionOutcome::Accept(Some("6".into())));
    }

    #[test]
    fn opaque_expressions_pass() {
        let expr = Expr::Other("NOW()".into());
        assert_eq!(check(V, &expr, None, Some("1")), VersionOutcome::Accept(None));
    }
}
