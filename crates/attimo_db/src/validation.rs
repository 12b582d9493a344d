//! Check expressions and their evaluation.
//!
//! A check expression is `name` or `name(arg1,arg2,...)`. The grammar is
//! flat: arguments are split on commas and trimmed, so nested parentheses and
//! escaped commas are rejected as malformed rather than guessed at.

use crate::types::{Datatype, Value};
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;
use tracing::{error, warn};

/// Date format exchanged at the collaborator boundary (`DD-MM-YYYY`).
pub const DATE_FORMAT: &str = "%d-%m-%Y";

/// Date-time format used by the `datetime` check (`YYYY-MM-DD HH:MM:SS`).
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const PHONE_MIN_DIGITS: usize = 7;
const PHONE_MAX_DIGITS: usize = 15;

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("phone regex is valid"));

// chrono accepts short fields and signed years; the boundary format does not.
static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{2}-[0-9]{2}-[0-9]{4}$").expect("date regex is valid"));

static DATETIME_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2} [0-9]{2}:[0-9]{2}:[0-9]{2}$")
        .expect("datetime regex is valid")
});

// dot-atom local part @ dot-atom domain, optionally wrapped as `Name <addr>`
static MAIL: LazyLock<Regex> = LazyLock::new(|| {
    let atom = r"[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+";
    let label = r"[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?";
    let addr = format!(r"{atom}(?:\.{atom})*@{label}(?:\.{label})*");
    Regex::new(&format!(r"^(?:{addr}|[^<>@]*<{addr}>)$")).expect("mail regex is valid")
});

/// Errors produced while parsing a check expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("check expression is empty")]
    Empty,

    #[error("unknown check '{0}'")]
    Unknown(String),

    #[error("malformed check expression '{0}': {1}")]
    Malformed(String, &'static str),

    #[error("check '{name}' expects {expected} argument(s), got {got}")]
    ArgumentCount {
        name: &'static str,
        expected: &'static str,
        got: usize,
    },

    #[error("range bound '{0}' is not an integer")]
    BadRangeBound(String),

    #[error("range minimum {min} is greater than maximum {max}")]
    InvertedRange { min: i64, max: i64 },
}

/// A parsed check, ready for evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Nonempty,
    Range { min: i64, max: i64 },
    OneOf(Vec<String>),
    No,
    Url,
    Mail,
    Phone,
    FileExists,
    Date,
    DateTime,
}

impl Check {
    pub fn name(&self) -> &'static str {
        match self {
            Check::Nonempty => "nonempty",
            Check::Range { .. } => "range",
            Check::OneOf(_) => "in",
            Check::No => "no",
            Check::Url => "url",
            Check::Mail => "mail",
            Check::Phone => "phone",
            Check::FileExists => "file_exists",
            Check::Date => "date",
            Check::DateTime => "datetime",
        }
    }

    /// Evaluate `value` against this check.
    ///
    /// A value of the wrong type fails the check and is logged as a warning.
    pub fn evaluate(&self, value: &Value) -> bool {
        match self {
            Check::No => true,
            Check::Range { min, max } => match value.as_i64() {
                Some(i) => *min <= i && i <= *max,
                None => type_mismatch(self, value, "int"),
            },
            _ => match value.as_str() {
                Some(s) => self.evaluate_str(s),
                None => type_mismatch(self, value, "string"),
            },
        }
    }

    fn evaluate_str(&self, s: &str) -> bool {
        match self {
            Check::Nonempty => !s.is_empty(),
            Check::OneOf(options) => options.iter().any(|o| o == s),
            Check::Url => is_url(s),
            Check::Mail => MAIL.is_match(s),
            Check::Phone => {
                PHONE.is_match(s) && (PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&s.len())
            }
            Check::FileExists => Path::new(s).exists(),
            Check::Date => {
                DATE_SHAPE.is_match(s) && NaiveDate::parse_from_str(s, DATE_FORMAT).is_ok()
            }
            Check::DateTime => {
                DATETIME_SHAPE.is_match(s)
                    && NaiveDateTime::parse_from_str(s, DATETIME_FORMAT).is_ok()
            }
            Check::No => true,
            Check::Range { .. } => false,
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Range { min, max } => write!(f, "range({},{})", min, max),
            Check::OneOf(options) => write!(f, "in({})", options.join(",")),
            other => write!(f, "{}", other.name()),
        }
    }
}

fn type_mismatch(check: &Check, value: &Value, expected: &str) -> bool {
    warn!(
        check = check.name(),
        value = %value,
        actual = value.kind(),
        expected,
        "Check received a value of the wrong type"
    );
    false
}

fn is_url(s: &str) -> bool {
    match url::Url::parse(s) {
        Ok(u) => !u.scheme().is_empty() && u.host_str().is_some_and(|h| !h.is_empty()),
        Err(_) => false,
    }
}

/// Split an expression into its check name and trimmed argument list.
///
/// `"in(Low, High)"` -> `("in", ["Low", "High"])`; `"url"` -> `("url", [])`.
pub fn split_expression(expr: &str) -> Result<(&str, Vec<&str>), CheckError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(CheckError::Empty);
    }

    let Some(open) = expr.find('(') else {
        if expr.contains(')') {
            return Err(CheckError::Malformed(expr.to_string(), "unbalanced ')'"));
        }
        return Ok((expr, Vec::new()));
    };

    let name = expr[..open].trim();
    if name.is_empty() {
        return Err(CheckError::Malformed(expr.to_string(), "missing check name"));
    }
    let Some(inner) = expr[open + 1..].strip_suffix(')') else {
        return Err(CheckError::Malformed(expr.to_string(), "missing closing ')'"));
    };
    if inner.contains('(') || inner.contains(')') {
        return Err(CheckError::Malformed(
            expr.to_string(),
            "nested parentheses are not supported",
        ));
    }

    let args = if inner.trim().is_empty() {
        Vec::new()
    } else {
        inner.split(',').map(str::trim).collect()
    };
    Ok((name, args))
}

/// Parse a check expression.
pub fn parse_check(expr: &str) -> Result<Check, CheckError> {
    let (name, args) = split_expression(expr)?;

    let no_args = |check: Check| {
        if args.is_empty() {
            Ok(check)
        } else {
            Err(CheckError::ArgumentCount {
                name: check.name(),
                expected: "0",
                got: args.len(),
            })
        }
    };

    match name {
        "nonempty" => no_args(Check::Nonempty),
        "no" => no_args(Check::No),
        "url" => no_args(Check::Url),
        "mail" => no_args(Check::Mail),
        "phone" => no_args(Check::Phone),
        "file_exists" => no_args(Check::FileExists),
        "date" => no_args(Check::Date),
        "datetime" => no_args(Check::DateTime),
        "range" => {
            let [min, max] = args.as_slice() else {
                return Err(CheckError::ArgumentCount {
                    name: "range",
                    expected: "2",
                    got: args.len(),
                });
            };
            let min = parse_bound(min)?;
            let max = parse_bound(max)?;
            if min > max {
                return Err(CheckError::InvertedRange { min, max });
            }
            Ok(Check::Range { min, max })
        }
        "in" => {
            if args.is_empty() {
                return Err(CheckError::ArgumentCount {
                    name: "in",
                    expected: "at least 1",
                    got: 0,
                });
            }
            Ok(Check::OneOf(args.into_iter().map(str::to_string).collect()))
        }
        other => Err(CheckError::Unknown(other.to_string())),
    }
}

fn parse_bound(s: &str) -> Result<i64, CheckError> {
    s.parse::<i64>()
        .map_err(|_| CheckError::BadRangeBound(s.to_string()))
}

/// Evaluate `value` against an already-parsed check result.
///
/// Unparsable expressions reject every value and are logged as errors.
pub fn evaluate_parsed(
    datatype: &str,
    parsed: &Result<Check, CheckError>,
    value: &Value,
) -> bool {
    match parsed {
        Ok(check) => check.evaluate(value),
        Err(err) => {
            error!(datatype, error = %err, "Unusable check expression, rejecting value");
            false
        }
    }
}

/// Parse the datatype's check expression and evaluate `value` against it.
///
/// The registry keeps parsed checks cached; this entry point is for one-off
/// evaluation.
pub fn validate_check(datatype: &Datatype, value: &Value) -> bool {
    evaluate_parsed(&datatype.name, &parse_check(&datatype.value_check), value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompletionSort, FillBehavior, VariableType};
    use tempfile::NamedTempFile;

    fn datatype(check: &str) -> Datatype {
        Datatype {
            id: 1,
            name: "Field".to_string(),
            variable_type: VariableType::String,
            completion_value: "no".to_string(),
            completion_sort: CompletionSort::No,
            value_check: check.to_string(),
            fill_behavior: FillBehavior::Open,
        }
    }

    fn check(expr: &str, value: impl Into<Value>) -> bool {
        validate_check(&datatype(expr), &value.into())
    }

    #[test]
    fn test_split_expression() {
        assert_eq!(split_expression("url").unwrap(), ("url", vec![]));
        assert_eq!(
            split_expression(" in ( Low, Medium ,High ) ").unwrap(),
            ("in", vec!["Low", "Medium", "High"])
        );
        assert_eq!(split_expression("range(1,5)").unwrap(), ("range", vec!["1", "5"]));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_check("  "), Err(CheckError::Empty));
        assert_eq!(parse_check("bogus"), Err(CheckError::Unknown("bogus".into())));
        assert!(matches!(parse_check("in(a,b"), Err(CheckError::Malformed(..))));
        assert!(matches!(parse_check("in(a,(b))"), Err(CheckError::Malformed(..))));
        assert!(matches!(parse_check("(a)"), Err(CheckError::Malformed(..))));
        assert!(matches!(parse_check("url)"), Err(CheckError::Malformed(..))));
        assert!(matches!(parse_check("range(1)"), Err(CheckError::ArgumentCount { .. })));
        assert!(matches!(parse_check("nonempty(x)"), Err(CheckError::ArgumentCount { .. })));
        assert!(matches!(parse_check("in()"), Err(CheckError::ArgumentCount { .. })));
        assert_eq!(parse_check("range(a,5)"), Err(CheckError::BadRangeBound("a".into())));
        assert_eq!(
            parse_check("range(5,1)"),
            Err(CheckError::InvertedRange { min: 5, max: 1 })
        );
    }

    #[test]
    fn test_parse_display_roundtrip() {
        for expr in ["nonempty", "range(-3,7)", "in(Low,High)", "file_exists", "datetime"] {
            assert_eq!(parse_check(expr).unwrap().to_string(), expr);
        }
    }

    #[test]
    fn test_nonempty() {
        assert!(check("nonempty", "x"));
        assert!(!check("nonempty", ""));
        assert!(!check("nonempty", 3i64));
        assert!(!check("nonempty", Value::Null));
    }

    #[test]
    fn test_range() {
        for i in 1..=5i64 {
            assert!(check("range(1,5)", i), "{i}");
        }
        assert!(!check("range(1,5)", 0i64));
        assert!(!check("range(1,5)", 6i64));
        assert!(!check("range(1,5)", "3"));
        assert!(!check("range(1,5)", 3.0));
    }

    #[test]
    fn test_in_set() {
        for v in ["Low", "Medium", "High"] {
            assert!(check("in(Low,Medium,High)", v));
        }
        assert!(!check("in(Low,Medium,High)", "low"));
        assert!(!check("in(Low,Medium,High)", "Urgent"));
        assert!(!check("in(Low,Medium,High)", 1i64));
        assert!(check("in(Not Started, In Progress)", "In Progress"));
    }

    #[test]
    fn test_no_accepts_anything() {
        assert!(check("no", ""));
        assert!(check("no", 42i64));
        assert!(check("no", Value::Null));
    }

    #[test]
    fn test_url() {
        assert!(check("url", "https://a.com"));
        assert!(check("url", "http://example.com/path?q=1"));
        assert!(!check("url", "/a/b"));
        assert!(!check("url", "example.com"));
        assert!(!check("url", ""));
        assert!(!check("url", "mailto:someone@example.com"));
        assert!(!check("url", 42i64));
    }

    #[test]
    fn test_mail() {
        assert!(check("mail", "test@example.com"));
        assert!(check("mail", "first.last+tag@sub.example.org"));
        assert!(check("mail", "Jane Doe <jane@example.com>"));
        assert!(!check("mail", "testexample.com"));
        assert!(!check("mail", "a@b@c"));
        assert!(!check("mail", ""));
        assert!(!check("mail", 42i64));
    }

    #[test]
    fn test_phone() {
        assert!(check("phone", "1234567"));
        assert!(check("phone", "123456789012345"));
        assert!(!check("phone", "123456"));
        assert!(!check("phone", "1234567890123456"));
        assert!(!check("phone", "123abc456"));
        assert!(!check("phone", 1234567i64));
    }

    #[test]
    fn test_file_exists() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_string_lossy().to_string();
        assert!(check("file_exists", path.as_str()));
        assert!(!check("file_exists", "/path/to/nonexistent/file"));
        assert!(!check("file_exists", 42i64));
    }

    #[test]
    fn test_date() {
        assert!(check("date", "01-01-2024"));
        assert!(check("date", "29-02-2024"));
        assert!(!check("date", "2024-01-01"));
        assert!(!check("date", "31-02-2024"));
        assert!(!check("date", "01/01/2024"));
        assert!(!check("date", 20240101i64));
        assert!(!check("date", "1-1-2024"));
        assert!(!check("date", "01-01-24"));
        assert!(!check("date", "01-01-+2024"));
        assert!(!check("date", " 01-01-2024"));
    }

    #[test]
    fn test_datetime() {
        assert!(check("datetime", "2024-01-31 13:45:00"));
        assert!(!check("datetime", "31-01-2024"));
        assert!(!check("datetime", "2024-1-31 13:45:00"));
        assert!(!check("datetime", "+2024-01-31 13:45:00"));
        assert!(!check("datetime", "2024-01-31 1:45:00"));
    }

    #[test]
    fn test_unknown_and_malformed_fail_closed() {
        assert!(!check("bogus", "anything"));
        assert!(!check("in(a,b", "a"));
        assert!(!check("range(x,5)", 3i64));
    }
}
