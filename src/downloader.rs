#![cfg(not(tarpaulin_include))]

use crate::cell::Cell;
use crate::error::{DashboardError, Result};
use crate::table::Table;

/// Convert a table to CSV
///
/// The header row comes first, then one record per row in display form.
/// NaN and infinite values are written as empty fields. Quoting of commas, quotes and newlines is left to the `csv` writer.
///
/// # Examples
/// ```
/// use team_dashboard::cell::Cell;
/// use team_dashboard::downloader::to_csv;
/// use team_dashboard::table::Table;
///
/// let table = Table::new(vec!["Player Name".into()], vec![vec![Cell::parse("Alex")]]);
/// assert_eq!(to_csv(&table).unwrap(), "Player Name\nAlex\n");
/// ```
pub fn to_csv(table: &Table) -> Result<String> {
    let export_err = |e: csv::Error| DashboardError::Export(e.to_string());

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&table.headers).map_err(export_err)?;
    for row in &table.rows {
        let record = row.iter().map(|cell| match cell {
            Cell::Number(num) if !num.is_finite() => String::new(),
            other => other.to_string(),
        });
        writer.write_record(record).map_err(export_err)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| DashboardError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| DashboardError::Export(e.to_string()))
}

/// Convert a table to XLSX
///
/// Numbers are written as numbers so they stay usable in Excel; dates and
/// text are written as strings. NaN and infinite values are left blank.
#[cfg(feature = "web")]
pub fn to_xlsx(table: &Table) -> Result<Vec<u8>> {
    use rust_xlsxwriter::{Format, Workbook, XlsxError};

    let export_err = |e: XlsxError| DashboardError::Export(e.to_string());

    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let worksheet = workbook.add_worksheet();

    for (c, header) in table.headers.iter().enumerate() {
        worksheet
            .write_string_with_format(0, c as u16, header, &bold)
            .map_err(export_err)?;
    }

    for (r, row) in table.rows.iter().enumerate() {
        let xlsx_row = (r + 1) as u32;
        for (c, cell) in row.iter().enumerate() {
            let col = c as u16;
            match cell {
                Cell::Number(num) if num.is_finite() => {
                    worksheet.write_number(xlsx_row, col, *num).map_err(export_err)?;
                }
                Cell::Number(_) | Cell::Empty => {}
                other => {
                    worksheet
                        .write_string(xlsx_row, col, &other.to_string())
                        .map_err(export_err)?;
                }
            }
        }
    }

    workbook.save_to_buffer().map_err(export_err)
}
