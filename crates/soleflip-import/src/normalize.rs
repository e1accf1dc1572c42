//! Value normalization shared by the record validators.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;

static CURRENCY_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[€$£¥\s]|\b(?:eur|usd|gbp|jpy|chf)\b").expect("valid currency regex")
});

static NUMERIC_SIZE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+(?:\.\d+)?$").expect("valid size regex"));

const GERMAN_MONTHS: [(&str, &str); 8] = [
    ("Januar", "January"),
    ("Februar", "February"),
    ("März", "March"),
    ("Mai", "May"),
    ("Juni", "June"),
    ("Juli", "July"),
    ("Oktober", "October"),
    ("Dezember", "December"),
];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d/%m/%y",
    "%d. %B %Y",
    "%d %B %Y",
];

const DAY_FIRST_FORMATS: [&str; 4] = ["%d/%m/%y", "%d/%m/%Y", "%d.%m.%y", "%d.%m.%Y"];

/// Years outside this range come from a format that matched by accident
/// (`%Y` happily reads `25` as the year 25).
const PLAUSIBLE_YEARS: std::ops::RangeInclusive<i32> = 1970..=2100;

/// Parses an amount such as `€1.234,56`, `$1,234.56`, `182.00 EUR` or `99`.
///
/// Whichever of `,` and `.` comes last is the decimal separator; the other
/// one is a thousands separator. A lone `,` is read as a decimal comma.
/// Returns `None` if nothing numeric remains.
#[must_use]
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned = CURRENCY_NOISE.replace_all(raw.trim(), "");
    let last_dot = cleaned.rfind('.');
    let last_comma = cleaned.rfind(',');
    let canonical = match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        _ => cleaned.replace(',', "."),
    };
    if canonical.is_empty() {
        return None;
    }
    Decimal::from_str(&canonical).ok()
}

/// Parses the timestamp and date shapes found across exports. Naive values
/// are taken as UTC; bare dates as midnight UTC.
#[must_use]
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let value = english_months(raw.trim());
    if value.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&value) {
        return plausible(parsed.with_timezone(&Utc));
    }
    // StockX exports write offsets as `+00`.
    if let Some(parsed) = parse_with_short_offset(&value) {
        return plausible(parsed);
    }
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&value, format) {
            if let Some(dt) = plausible(parsed.and_utc()) {
                return Some(dt);
            }
        }
    }
    parse_date_with(&value, &DATE_FORMATS)
}

/// Like [`parse_datetime`] but reads `01/02/25` as 1 February.
#[must_use]
pub fn parse_day_first(raw: &str) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    parse_date_with(value, &DAY_FIRST_FORMATS).or_else(|| parse_datetime(value))
}

fn parse_date_with(value: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
    formats.iter().find_map(|format| {
        NaiveDate::parse_from_str(value, format)
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .and_then(|dt| plausible(dt.and_utc()))
    })
}

fn parse_with_short_offset(value: &str) -> Option<DateTime<Utc>> {
    let padded = match value.rsplit_once(' ') {
        Some((_, offset)) if offset.len() == 3 && offset.starts_with(['+', '-']) => {
            format!("{value}00")
        }
        _ => value.to_owned(),
    };
    DateTime::parse_from_str(&padded, "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn english_months(value: &str) -> String {
    GERMAN_MONTHS
        .iter()
        .fold(value.to_owned(), |acc, (de, en)| acc.replace(de, en))
}

fn plausible(dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
    PLAUSIBLE_YEARS
        .contains(&chrono::Datelike::year(&dt))
        .then_some(dt)
}

/// `true` for the spellings exports use for "no value".
#[must_use]
pub fn is_placeholder(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_uppercase().as_str(),
        "" | "-" | "N/A" | "NA" | "NONE" | "NULL" | "NAN" | "UNKNOWN"
    )
}

/// Manufacturer style code in its comparable form: upper case, runs of
/// whitespace joined with `-`. Placeholders yield `None`.
#[must_use]
pub fn style_code(raw: &str) -> Option<String> {
    if is_placeholder(raw) {
        return None;
    }
    Some(
        raw.split_whitespace()
            .collect::<Vec<_>>()
            .join("-")
            .to_uppercase(),
    )
}

/// Product name reduced to lower-case alphanumeric words, for comparing
/// names that differ only in punctuation, case, or spacing.
#[must_use]
pub fn comparable_name(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// StockX sizes: bare numbers become `US <n>`, blanks become `One Size`.
#[must_use]
pub fn stockx_size(raw: Option<&str>) -> String {
    let Some(raw) = raw.filter(|r| !is_placeholder(r)) else {
        return "One Size".to_owned();
    };
    let size = raw.trim().to_uppercase();
    if NUMERIC_SIZE.is_match(&size) {
        format!("US {size}")
    } else {
        size
    }
}

/// Alias sizes: two-or-more digit integers above 50 are garment sizes.
#[must_use]
pub fn alias_size(raw: Option<&str>) -> Option<String> {
    let raw = raw.filter(|r| !is_placeholder(r))?.trim();
    match raw.parse::<u32>() {
        Ok(n) if n > 50 => Some(format!("Size {n}")),
        _ => Some(raw.to_owned()),
    }
}
