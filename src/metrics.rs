use crate::cell::Cell;
use crate::error::{DashboardError, Result};
use crate::table::{HR_ABOVE_COLUMN, HR_BELOW_COLUMN, HR_PERCENT_COLUMN, Table};
use serde::Serialize;

/// Share of time above 85% of max heart rate, relative to time below it
///
/// Plain IEEE division: a zero denominator gives an infinite value (or NaN
/// for 0/0) instead of an error, so one bad session does not hide the rest.
pub fn hr_percentage(above_85: f64, below_85: f64) -> f64 {
    100.0 * above_85 / below_85
}

/// Add the `HRper` column computed from `HR_o85` and `HR_u85`
///
/// Rows where either operand is missing or not numeric get NaN.
pub fn derive_hr_percentage(table: &mut Table) -> Result<()> {
    let above = table
        .column_index(HR_ABOVE_COLUMN)
        .ok_or_else(|| DashboardError::MissingColumn(HR_ABOVE_COLUMN.to_string()))?;
    let below = table
        .column_index(HR_BELOW_COLUMN)
        .ok_or_else(|| DashboardError::MissingColumn(HR_BELOW_COLUMN.to_string()))?;

    let derived = table
        .rows
        .iter()
        .map(|row| match (row[above].as_number(), row[below].as_number()) {
            (Some(o85), Some(u85)) => Cell::Number(hr_percentage(o85, u85)),
            _ => Cell::Number(f64::NAN),
        })
        .collect();

    table.push_column(HR_PERCENT_COLUMN, derived);
    Ok(())
}

/// Equal-width histogram of a numeric column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// `bins + 1` bin edges, ascending.
    pub edges: Vec<f64>,
    pub counts: Vec<usize>,
}

impl Histogram {
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

/// Bin values into `bins` equal-width buckets spanning their range
///
/// Every bucket is half-open except the last one, which also holds the
/// maximum. A single distinct value is centred in a range of width one.
/// Non-finite values are skipped.
pub fn histogram(values: &[f64], bins: usize) -> Result<Histogram> {
    if bins == 0 {
        return Err(DashboardError::Histogram);
    }

    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let (mut lo, mut hi) = finite
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });

    if finite.is_empty() {
        lo = 0.0;
        hi = 1.0;
    } else if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }

    let width = (hi - lo) / bins as f64;
    let edges = (0..=bins).map(|i| lo + width * i as f64).collect();

    let mut counts = vec![0; bins];
    for v in finite {
        let idx = (((v - lo) / width) as usize).min(bins - 1);
        counts[idx] += 1;
    }

    Ok(Histogram { edges, counts })
}

/// Numeric values of a column; non-numeric cells are skipped.
pub fn numeric_values(table: &Table, column: &str) -> Result<Vec<f64>> {
    Ok(table.column(column)?.filter_map(Cell::as_number).collect())
}
