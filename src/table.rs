use crate::cell::Cell;
use crate::error::{DashboardError, Result};
use crate::metrics;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value as JsonValue};

pub const DATE_COLUMN: &str = "Date";
pub const HR_ABOVE_COLUMN: &str = "HR_o85";
pub const HR_BELOW_COLUMN: &str = "HR_u85";
pub const HR_PERCENT_COLUMN: &str = "HRper";

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// A rectangular table of cells with named columns
///
/// Rows are stored in file order. Every row has exactly one cell per header:
/// short rows are padded with [`Cell::Empty`] and long rows are truncated when
/// the table is built.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, Cell::Empty);
                row
            })
            .collect();
        Table { headers, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| DashboardError::MissingColumn(name.to_string()))
    }

    /// Iterate over the cells of one column, top to bottom.
    pub fn column(&self, name: &str) -> Result<impl Iterator<Item = &Cell> + '_> {
        let idx = self.require_column(name)?;
        Ok(self.rows.iter().map(move |row| &row[idx]))
    }

    /// Append a column, or overwrite it if a column with that name exists
    ///
    /// `cells` must hold one value per row; missing trailing values are
    /// filled with [`Cell::Empty`].
    pub fn push_column(&mut self, name: &str, cells: Vec<Cell>) {
        let mut cells = cells.into_iter();
        match self.column_index(name) {
            Some(idx) => {
                for row in &mut self.rows {
                    row[idx] = cells.next().unwrap_or(Cell::Empty);
                }
            }
            None => {
                self.headers.push(name.to_string());
                for row in &mut self.rows {
                    row.push(cells.next().unwrap_or(Cell::Empty));
                }
            }
        }
    }

    /// Convert a text column into dates in place
    ///
    /// Empty cells stay empty and cells that are already dates are kept. Any
    /// other value that does not match a supported format aborts the whole
    /// conversion and the table is left untouched.
    pub fn parse_dates(&mut self, name: &str) -> Result<()> {
        let idx = self.require_column(name)?;

        let mut parsed = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.iter().enumerate() {
            let cell = match &row[idx] {
                Cell::Empty => Cell::Empty,
                Cell::Date(date) => Cell::Date(*date),
                other => {
                    let raw = other.to_string();
                    let date = parse_date(&raw).ok_or_else(|| DashboardError::InvalidDate {
                        column: name.to_string(),
                        row: i + 1,
                        value: raw.clone(),
                    })?;
                    Cell::Date(date)
                }
            };
            parsed.push(cell);
        }

        for (row, cell) in self.rows.iter_mut().zip(parsed) {
            row[idx] = cell;
        }
        Ok(())
    }

    /// Keep the rows matching `keep`, in their original order.
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(&[Cell]) -> bool,
    {
        Table {
            headers: self.headers.clone(),
            rows: self
                .rows
                .iter()
                .filter(|row| keep(row.as_slice()))
                .cloned()
                .collect(),
        }
    }

    /// One JSON object per row, keyed by column header.
    pub fn to_records(&self) -> Vec<JsonValue> {
        self.rows
            .iter()
            .map(|row| {
                let record: Map<String, JsonValue> = self
                    .headers
                    .iter()
                    .zip(row.iter())
                    .map(|(header, cell)| (header.clone(), cell.to_json()))
                    .collect();
                JsonValue::Object(record)
            })
            .collect()
    }

    /// Rows rendered as display strings, for the raw data view.
    pub fn display_rows(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }
}

/// Parse a date using the formats seen in exported tracking files.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

/// A table ready for filtering and charting
///
/// The `Date` column has been parsed and the `HRper` column derived, in that
/// order. [`Dataset::prepare`] is the only constructor, so every filtered view
/// and every chart is built on data that went through both steps.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    table: Table,
}

impl Dataset {
    pub fn prepare(mut table: Table) -> Result<Self> {
        table.parse_dates(DATE_COLUMN)?;
        metrics::derive_hr_percentage(&mut table)?;
        Ok(Dataset { table })
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn into_table(self) -> Table {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec!["Date".into(), "Player Name".into(), "HR_o85".into(), "HR_u85".into()],
            vec![
                vec![
                    Cell::parse("2024-10-01"),
                    Cell::parse("Alex"),
                    Cell::parse("12"),
                    Cell::parse("48"),
                ],
                vec![Cell::parse("10/02/2024"), Cell::parse("Sam"), Cell::parse("5")],
            ],
        )
    }

    #[test]
    fn short_rows_are_padded() {
        let table = sample();
        assert_eq!(table.rows[1].len(), 4);
        assert_eq!(table.rows[1][3], Cell::Empty);
    }

    #[test]
    fn parse_dates_accepts_mixed_formats() {
        let mut table = sample();
        table.parse_dates("Date").unwrap();
        let dates: Vec<_> = table.column("Date").unwrap().cloned().collect();
        assert_eq!(
            dates,
            vec![
                Cell::Date(NaiveDate::from_ymd_opt(2024, 10, 1).unwrap()),
                Cell::Date(NaiveDate::from_ymd_opt(2024, 10, 2).unwrap()),
            ]
        );
    }

    #[test]
    fn parse_dates_reports_row_of_bad_value() {
        let mut table = sample();
        table.rows[1][0] = Cell::Text("yesterday".into());
        let err = table.parse_dates("Date").unwrap_err();
        match err {
            DashboardError::InvalidDate { row, value, .. } => {
                assert_eq!(row, 2);
                assert_eq!(value, "yesterday");
            }
            other => panic!("unexpected error: {other}"),
        }
        // nothing converted on failure
        assert_eq!(table.rows[0][0], Cell::Text("2024-10-01".into()));
    }

    #[test]
    fn datetime_and_rfc3339_values_keep_the_day() {
        assert_eq!(
            parse_date("2024-10-16 08:30:00"),
            NaiveDate::from_ymd_opt(2024, 10, 16)
        );
        assert_eq!(
            parse_date("2024-10-16T08:30:00Z"),
            NaiveDate::from_ymd_opt(2024, 10, 16)
        );
        assert_eq!(parse_date("16.10.2024"), NaiveDate::from_ymd_opt(2024, 10, 16));
        for raw in ["2024-10-16 08:30", "2024-10-16T08:30", "2024-10-16 08:30:00.000"] {
            assert_eq!(parse_date(raw), NaiveDate::from_ymd_opt(2024, 10, 16), "{}", raw);
        }
    }

    #[test]
    fn prepare_accepts_timestamps_without_seconds() {
        let table = Table::new(
            vec![DATE_COLUMN.into(), HR_ABOVE_COLUMN.into(), HR_BELOW_COLUMN.into()],
            vec![
                vec![Cell::parse("2024-10-01 08:30"), Cell::parse("1"), Cell::parse("4")],
                vec![Cell::parse("2024-10-02 09:15:00.250"), Cell::parse("2"), Cell::parse("4")],
            ],
        );
        let dataset = Dataset::prepare(table).unwrap();
        assert_eq!(
            dataset.table().rows[1][0],
            Cell::Date(NaiveDate::from_ymd_opt(2024, 10, 2).unwrap())
        );
    }

    #[test]
    fn push_column_replaces_existing() {
        let mut table = sample();
        table.push_column("Player Name", vec![Cell::parse("A"), Cell::parse("B")]);
        assert_eq!(table.headers.len(), 4);
        assert_eq!(table.rows[1][1], Cell::Text("B".into()));
    }

    #[test]
    fn prepare_derives_after_dates() {
        let dataset = Dataset::prepare(sample()).unwrap();
        let table = dataset.table();
        assert_eq!(table.headers.last().map(String::as_str), Some("HRper"));
        assert_eq!(table.rows[0][4], Cell::Number(25.0));
        assert!(table.rows[0][0].as_date().is_some());
        // missing denominator propagates as NaN
        assert!(table.rows[1][4].as_number().unwrap().is_nan());
    }

    #[test]
    fn prepare_requires_date_column() {
        let table = Table::new(vec!["HR_o85".into()], vec![]);
        assert!(matches!(
            Dataset::prepare(table),
            Err(DashboardError::MissingColumn(col)) if col == "Date"
        ));
    }

    #[test]
    fn records_are_keyed_by_header() {
        let records = sample().to_records();
        assert_eq!(records[0]["Player Name"], "Alex");
        assert_eq!(records[1]["HR_u85"], JsonValue::Null);
    }
}
