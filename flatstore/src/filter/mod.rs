// Filter engine - declarative predicates over untyped string rows.
//
// Predicate interpretation is split in two: compile() parses the caller's
// value (pattern, number, date bounds) and fails loudly on a malformed
// predicate, while matches() interprets the row's value and treats a failed
// parse as a non-match. Rows with missing or unparseable fields fall out of
// the result set instead of aborting the query.

use crate::codec::Row;
use crate::error::{FlatstoreError, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Eq,
    Ne,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Regex,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    NotIn,
    DateAfter,
    DateBefore,
    DateBetween,
}

/// One filter condition: `(field, operator, value)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterPredicate {
    pub field: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl FilterPredicate {
    pub fn new(
        field: impl Into<String>,
        operator: FilterOperator,
        value: impl Into<String>,
    ) -> Self {
        FilterPredicate {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NumericOp {
    Gt,
    Gte,
    Lt,
    Lte,
}

enum Comparison {
    Eq(String),
    Ne(String),
    Contains(String),
    NotContains(String),
    StartsWith(String),
    EndsWith(String),
    Pattern(Regex),
    Numeric(NumericOp, f64),
    Set { members: Vec<String>, negated: bool },
    After(DateTime<Utc>),
    Before(DateTime<Utc>),
    Between(DateTime<Utc>, DateTime<Utc>),
}

/// A predicate with its value already interpreted. Compiling surfaces
/// caller errors (bad regex, malformed bound) before any row is visited.
pub struct CompiledFilter {
    field: String,
    comparison: Comparison,
}

impl CompiledFilter {
    pub fn compile(predicate: &FilterPredicate) -> Result<Self> {
        let value = &predicate.value;
        let comparison = match predicate.operator {
            FilterOperator::Eq => Comparison::Eq(value.clone()),
            FilterOperator::Ne => Comparison::Ne(value.clone()),
            FilterOperator::Contains => Comparison::Contains(value.clone()),
            FilterOperator::NotContains => Comparison::NotContains(value.clone()),
            FilterOperator::StartsWith => Comparison::StartsWith(value.clone()),
            FilterOperator::EndsWith => Comparison::EndsWith(value.clone()),
            FilterOperator::Regex => {
                let pattern = Regex::new(value).map_err(|e| {
                    FlatstoreError::FilterEvaluation(format!("invalid regex '{value}': {e}"))
                })?;
                Comparison::Pattern(pattern)
            }
            FilterOperator::Gt => Comparison::Numeric(NumericOp::Gt, compile_number(value)?),
            FilterOperator::Gte => Comparison::Numeric(NumericOp::Gte, compile_number(value)?),
            FilterOperator::Lt => Comparison::Numeric(NumericOp::Lt, compile_number(value)?),
            FilterOperator::Lte => Comparison::Numeric(NumericOp::Lte, compile_number(value)?),
            FilterOperator::In | FilterOperator::NotIn => Comparison::Set {
                members: value.split(',').map(|m| m.trim().to_string()).collect(),
                negated: predicate.operator == FilterOperator::NotIn,
            },
            FilterOperator::DateAfter => Comparison::After(compile_timestamp(value)?),
            FilterOperator::DateBefore => Comparison::Before(compile_timestamp(value)?),
            FilterOperator::DateBetween => {
                let (start, end) = value.split_once(',').ok_or_else(|| {
                    FlatstoreError::FilterEvaluation(
                        "date_between expects 'start,end'".into(),
                    )
                })?;
                if end.contains(',') {
                    return Err(FlatstoreError::FilterEvaluation(
                        "date_between expects exactly two bounds".into(),
                    ));
                }
                Comparison::Between(compile_timestamp(start)?, compile_timestamp(end)?)
            }
        };

        Ok(CompiledFilter {
            field: predicate.field.clone(),
            comparison,
        })
    }

    /// Evaluate against one row. A missing field reads as the empty string;
    /// a row value that fails numeric or date interpretation is a non-match.
    pub fn matches(&self, row: &Row) -> bool {
        let value = row.get(&self.field).map(String::as_str).unwrap_or("");

        match &self.comparison {
            Comparison::Eq(expected) => value == expected,
            Comparison::Ne(expected) => value != expected,
            Comparison::Contains(needle) => value.contains(needle.as_str()),
            Comparison::NotContains(needle) => !value.contains(needle.as_str()),
            Comparison::StartsWith(prefix) => value.starts_with(prefix.as_str()),
            Comparison::EndsWith(suffix) => value.ends_with(suffix.as_str()),
            Comparison::Pattern(pattern) => pattern.is_match(value),
            Comparison::Numeric(op, bound) => match value.trim().parse::<f64>() {
                Ok(actual) => match op {
                    NumericOp::Gt => actual > *bound,
                    NumericOp::Gte => actual >= *bound,
                    NumericOp::Lt => actual < *bound,
                    NumericOp::Lte => actual <= *bound,
                },
                Err(_) => false,
            },
            Comparison::Set { members, negated } => {
                members.iter().any(|m| m == value) != *negated
            }
            Comparison::After(bound) => {
                matches!(parse_timestamp(value), Some(actual) if actual > *bound)
            }
            Comparison::Before(bound) => {
                matches!(parse_timestamp(value), Some(actual) if actual < *bound)
            }
            Comparison::Between(start, end) => matches!(
                parse_timestamp(value),
                Some(actual) if actual >= *start && actual <= *end
            ),
        }
    }
}

/// Evaluate a single predicate against a single row.
pub fn matches(row: &Row, predicate: &FilterPredicate) -> Result<bool> {
    Ok(CompiledFilter::compile(predicate)?.matches(row))
}

/// Parse an ISO-8601 timestamp. Naive timestamps and bare dates are taken
/// as UTC. Returns None instead of failing so row values stay permissive.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)))
}

fn compile_number(value: &str) -> Result<f64> {
    value.trim().parse().map_err(|_| {
        FlatstoreError::FilterEvaluation(format!("'{value}' is not a number"))
    })
}

fn compile_timestamp(value: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(value).ok_or_else(|| {
        FlatstoreError::FilterEvaluation(format!(
            "'{}' is not an ISO-8601 timestamp",
            value.trim()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, &str)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn check(pairs: &[(&str, &str)], field: &str, op: FilterOperator, value: &str) -> bool {
        matches(&row(pairs), &FilterPredicate::new(field, op, value)).unwrap()
    }

    #[test]
    fn test_text_operators() {
        let subject = &[("name", "AgentAlpha")];
        assert!(check(subject, "name", FilterOperator::Eq, "AgentAlpha"));
        assert!(!check(subject, "name", FilterOperator::Eq, "agentalpha"));
        assert!(check(subject, "name", FilterOperator::Ne, "Other"));
        assert!(check(subject, "name", FilterOperator::Contains, "entAl"));
        assert!(check(subject, "name", FilterOperator::NotContains, "beta"));
        assert!(check(subject, "name", FilterOperator::StartsWith, "Agent"));
        assert!(check(subject, "name", FilterOperator::EndsWith, "Alpha"));
    }

    #[test]
    fn test_missing_field_reads_as_empty() {
        assert!(check(&[("a", "1")], "b", FilterOperator::Eq, ""));
        assert!(!check(&[("a", "1")], "b", FilterOperator::Contains, "x"));
    }

    #[test]
    fn test_regex_matches_and_rejects_invalid() {
        let subject = &[("email", "user1@example.com")];
        assert!(check(subject, "email", FilterOperator::Regex, r".*@example\.com"));
        assert!(!check(subject, "email", FilterOperator::Regex, r".*@test\.com"));

        let result = matches(
            &row(subject),
            &FilterPredicate::new("email", FilterOperator::Regex, "[unclosed"),
        );
        assert!(matches!(result, Err(FlatstoreError::FilterEvaluation(_))));
    }

    #[test]
    fn test_numeric_operators() {
        let subject = &[("score", "85")];
        assert!(check(subject, "score", FilterOperator::Gt, "80"));
        assert!(check(subject, "score", FilterOperator::Gte, "85"));
        assert!(check(subject, "score", FilterOperator::Lt, "90.5"));
        assert!(check(subject, "score", FilterOperator::Lte, "85"));
        assert!(!check(subject, "score", FilterOperator::Gt, "85"));
    }

    #[test]
    fn test_non_numeric_row_value_is_non_match() {
        assert!(!check(&[("score", "abc")], "score", FilterOperator::Gt, "80"));
        assert!(!check(&[("other", "1")], "score", FilterOperator::Lte, "80"));
    }

    #[test]
    fn test_non_numeric_predicate_value_is_an_error() {
        let result = matches(
            &row(&[("score", "85")]),
            &FilterPredicate::new("score", FilterOperator::Gt, "eighty"),
        );
        assert!(matches!(result, Err(FlatstoreError::FilterEvaluation(_))));
    }

    #[test]
    fn test_set_membership() {
        let subject = &[("role", "admin")];
        assert!(check(subject, "role", FilterOperator::In, "admin, member"));
        assert!(!check(subject, "role", FilterOperator::In, "member,guest"));
        assert!(check(subject, "role", FilterOperator::NotIn, "member,guest"));
        assert!(!check(subject, "role", FilterOperator::NotIn, "admin"));
    }

    #[test]
    fn test_date_operators() {
        let subject = &[("created_at", "2025-11-15T00:00:00Z")];
        assert!(check(subject, "created_at", FilterOperator::DateAfter, "2025-11-10T00:00:00Z"));
        assert!(!check(subject, "created_at", FilterOperator::DateAfter, "2025-11-20T00:00:00Z"));
        assert!(check(subject, "created_at", FilterOperator::DateBefore, "2025-12-01T00:00:00Z"));
    }

    #[test]
    fn test_naive_timestamps_are_utc() {
        // Offset form and naive form of the same instant compare equal.
        let subject = &[("at", "2025-06-01T12:00:00")];
        assert!(check(subject, "at", FilterOperator::DateAfter, "2025-06-01T11:59:59Z"));
        assert!(check(subject, "at", FilterOperator::DateBefore, "2025-06-01T14:00:00+01:00"));
    }

    #[test]
    fn test_date_between_is_inclusive() {
        let bounds = "2025-11-01T00:00:00Z,2025-11-30T00:00:00Z";
        assert!(check(&[("d", "2025-11-01T00:00:00Z")], "d", FilterOperator::DateBetween, bounds));
        assert!(check(&[("d", "2025-11-30T00:00:00Z")], "d", FilterOperator::DateBetween, bounds));
        assert!(check(&[("d", "2025-11-15T08:30:00Z")], "d", FilterOperator::DateBetween, bounds));
        assert!(!check(&[("d", "2025-12-01T00:00:00Z")], "d", FilterOperator::DateBetween, bounds));
    }

    #[test]
    fn test_date_between_rejects_malformed_bounds() {
        let subject = row(&[("d", "2025-11-15T00:00:00Z")]);
        for bad in ["2025-11-01", "a,b", "2025-11-01,2025-11-30,2025-12-31"] {
            let result = matches(
                &subject,
                &FilterPredicate::new("d", FilterOperator::DateBetween, bad),
            );
            assert!(
                matches!(result, Err(FlatstoreError::FilterEvaluation(_))),
                "expected error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_unparseable_row_date_is_non_match() {
        assert!(!check(
            &[("d", "not a date")],
            "d",
            FilterOperator::DateAfter,
            "2025-01-01T00:00:00Z"
        ));
    }

    #[test]
    fn test_bare_dates_parse_as_midnight() {
        let subject = &[("d", "2025-11-15")];
        assert!(check(subject, "d", FilterOperator::DateAfter, "2025-11-14"));
        assert!(check(
            subject,
            "d",
            FilterOperator::DateBetween,
            "2025-11-15,2025-11-16"
        ));
    }
}
