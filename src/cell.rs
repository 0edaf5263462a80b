use chrono::NaiveDate;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::fmt;

/// Date format used for display, filter values and JSON output.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A single value in a data table
///
/// Values are inferred from the raw text when a file is loaded. The `Date`
/// variant only appears after a column has been explicitly parsed as dates.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Empty,
    Number(f64),
    Text(String),
    Date(NaiveDate),
}

impl Cell {
    /// Infer a cell from raw field text
    ///
    /// Surrounding whitespace is ignored. Anything that parses as a float is a
    /// number, blank fields are empty, everything else is kept as text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cell::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(num) => Cell::Number(num),
            Err(_) => Cell::Text(trimmed.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Number(num) => Some(*num),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Cell::Date(date) => Some(*date),
            _ => None,
        }
    }

    /// Total order used to sort filter options
    ///
    /// Empty cells sort first, then numbers, dates and text. Numbers use
    /// `f64::total_cmp` so NaN has a stable position.
    pub fn cmp_total(&self, other: &Cell) -> Ordering {
        match (self, other) {
            (Cell::Number(a), Cell::Number(b)) => a.total_cmp(b),
            (Cell::Date(a), Cell::Date(b)) => a.cmp(b),
            (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Cell::Empty => 0,
            Cell::Number(_) => 1,
            Cell::Date(_) => 2,
            Cell::Text(_) => 3,
        }
    }

    /// JSON form handed to the charts; non-finite numbers become `null`.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Cell::Empty => JsonValue::Null,
            Cell::Number(num) => serde_json::Number::from_f64(*num)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Cell::Text(text) => JsonValue::String(text.clone()),
            Cell::Date(date) => JsonValue::String(date.format(DATE_FORMAT).to_string()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Number(num) if num.is_finite() && num.fract() == 0.0 && num.abs() < 1e15 => {
                write!(f, "{}", *num as i64)
            }
            Cell::Number(num) => write!(f, "{}", num),
            Cell::Text(text) => f.write_str(text),
            Cell::Date(date) => write!(f, "{}", date.format(DATE_FORMAT)),
        }
    }
}
