//! Schedule validation
//!
//! A schedule is either a relative-interval phrase understood by the Data
//! Transfer Service (`every 24 hours`, `every monday 09:00`) or a classic
//! five-field cron expression (`0 6 * * 1-5`).

use regex::Regex;
use std::sync::OnceLock;

/// Cron shorthands accepted in place of five fields
const CRON_MACROS: &[&str] = &[
    "@yearly", "@annually", "@monthly", "@weekly", "@daily", "@midnight", "@hourly",
];

const MONTH_NAMES: &[&str] = &[
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

const DAY_NAMES: &[&str] = &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// One cron field: its name, bounds and optional symbolic names
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: &'static [&'static str],
    /// Value of `names[0]`
    names_base: u32,
}

const FIELDS: [FieldSpec; 5] = [
    FieldSpec { name: "minute", min: 0, max: 59, names: &[], names_base: 0 },
    FieldSpec { name: "hour", min: 0, max: 23, names: &[], names_base: 0 },
    FieldSpec { name: "day-of-month", min: 1, max: 31, names: &[], names_base: 0 },
    FieldSpec { name: "month", min: 1, max: 12, names: MONTH_NAMES, names_base: 1 },
    FieldSpec { name: "day-of-week", min: 0, max: 7, names: DAY_NAMES, names_base: 0 },
];

fn item_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<start>\*|\d+|[A-Za-z]{3})(?:-(?P<end>\d+|[A-Za-z]{3}))?(?:/(?P<step>\d+))?$")
            .expect("cron item pattern is valid")
    })
}

/// Returns true when `schedule` (already trimmed) is an `every ...` phrase
pub fn is_interval_phrase(schedule: &str) -> bool {
    schedule
        .get(..6)
        .map(|prefix| prefix.eq_ignore_ascii_case("every "))
        .unwrap_or(false)
}

/// Validate a schedule string, returning the normalized (trimmed) value.
pub fn normalize_schedule(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();

    if is_interval_phrase(trimmed) {
        return Ok(trimmed.to_string());
    }

    validate_cron(trimmed)
        .map(|()| trimmed.to_string())
        .map_err(|reason| {
            format!(
                "schedule must be valid cron or 'every ...' string, got '{}' ({})",
                trimmed, reason
            )
        })
}

/// Check that `expr` is a syntactically valid five-field cron expression
pub fn validate_cron(expr: &str) -> Result<(), String> {
    if CRON_MACROS.iter().any(|m| m.eq_ignore_ascii_case(expr)) {
        return Ok(());
    }

    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() != FIELDS.len() {
        return Err(format!("expected 5 fields, found {}", parts.len()));
    }

    for (part, spec) in parts.iter().zip(FIELDS.iter()) {
        for item in part.split(',') {
            validate_item(item, spec)?;
        }
    }

    Ok(())
}

fn validate_item(item: &str, spec: &FieldSpec) -> Result<(), String> {
    let caps = item_pattern()
        .captures(item)
        .ok_or_else(|| format!("invalid {} field '{}'", spec.name, item))?;

    if let Some(step) = caps.name("step") {
        let step: u32 = step
            .as_str()
            .parse()
            .map_err(|_| format!("invalid step in {} field '{}'", spec.name, item))?;
        if step == 0 {
            return Err(format!("step must be positive in {} field '{}'", spec.name, item));
        }
    }

    let start = caps.name("start").map(|m| m.as_str()).unwrap_or("*");
    if start == "*" {
        if caps.name("end").is_some() {
            return Err(format!("'*' cannot start a range in {} field '{}'", spec.name, item));
        }
        return Ok(());
    }

    let low = field_value(start, spec)?;
    if let Some(end) = caps.name("end") {
        let high = field_value(end.as_str(), spec)?;
        if low > high {
            return Err(format!("range {}-{} is reversed in {} field", low, high, spec.name));
        }
    }

    Ok(())
}

fn field_value(token: &str, spec: &FieldSpec) -> Result<u32, String> {
    let value = match token.parse::<u32>() {
        Ok(v) => v,
        Err(_) => spec
            .names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(token))
            .map(|idx| idx as u32 + spec.names_base)
            .ok_or_else(|| format!("unknown {} name '{}'", spec.name, token))?,
    };

    if value < spec.min || value > spec.max {
        return Err(format!(
            "{} value {} out of range {}-{}",
            spec.name, value, spec.min, spec.max
        ));
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_phrases_are_kept_trimmed() {
        assert_eq!(normalize_schedule("  every 24 hours ").unwrap(), "every 24 hours");
        assert_eq!(normalize_schedule("EVERY day 06:00").unwrap(), "EVERY day 06:00");
    }

    #[test]
    fn valid_cron_expressions() {
        for expr in [
            "0 6 * * *",
            "*/15 * * * *",
            "0 0 1 JAN *",
            "30 2 * * MON-FRI",
            "0 0,12 1-15/2 * 0",
            "@daily",
        ] {
            assert!(validate_cron(expr).is_ok(), "expected '{}' to be valid", expr);
        }
    }

    #[test]
    fn invalid_cron_expressions() {
        for expr in [
            "",
            "every",
            "0 6 * *",
            "60 * * * *",
            "* 24 * * *",
            "* * 0 * *",
            "* * * 13 *",
            "* * * * 8",
            "*/0 * * * *",
            "5-1 * * * *",
            "* * * FOO *",
            "daily",
        ] {
            assert!(validate_cron(expr).is_err(), "expected '{}' to be invalid", expr);
        }
    }

    #[test]
    fn every_without_trailing_text_is_not_a_phrase() {
        assert!(normalize_schedule("every").is_err());
    }
}
