use crate::cell::Cell;
use crate::error::{DashboardError, Result};
use crate::table::Table;
use calamine::{Data, DataType, Reader, open_workbook_auto};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Load a table from CSV text
///
/// The first record holds the column headers. Rows may be shorter or longer
/// than the header; [`Table::new`] pads or truncates them.
///
/// # Arguments
/// * `rdr` - Any reader producing CSV bytes
/// * `origin` - File path or URL, used in error messages
pub fn from_csv_reader<R: Read>(rdr: R, origin: &str) -> Result<Table> {
    let csv_err = |source| DashboardError::Csv {
        path: origin.to_string(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(rdr);
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        rows.push(record.iter().map(Cell::parse).collect());
    }

    Ok(Table::new(headers, rows))
}

/// Load a table from a CSV file
///
/// # Examples
/// ```no_run
/// use team_dashboard::loader::from_csv;
///
/// match from_csv("compilation_sherbrooke.csv") {
///     Ok(table) => println!("Loaded {} rows", table.len()),
///     Err(e) => eprintln!("Error loading CSV: {}", e),
/// }
/// ```
pub fn from_csv(filepath: impl AsRef<Path>) -> Result<Table> {
    let path = filepath.as_ref();
    let file = File::open(path).map_err(|e| DashboardError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    from_csv_reader(file, &path.display().to_string())
}

/// Load the first worksheet of a spreadsheet file (xlsx, xls, ods)
///
/// The first row holds the column headers. Excel dates become
/// [`Cell::Date`], booleans become text.
pub fn from_excel(filepath: impl AsRef<Path>) -> Result<Table> {
    let path = filepath.as_ref();
    let excel_err = |message: String| DashboardError::Excel {
        path: path.display().to_string(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| excel_err(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| excel_err("no sheets found".to_string()))?
        .map_err(|e| excel_err(e.to_string()))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(header_row) => header_row
            .iter()
            .map(|cell| cell.to_string().trim().to_string())
            .collect(),
        None => return Err(excel_err("sheet is empty".to_string())),
    };

    let body = rows
        .map(|row| row.iter().map(excel_cell).collect())
        .collect();

    Ok(Table::new(headers, body))
}

fn excel_cell(cell: &Data) -> Cell {
    match cell {
        Data::Empty => Cell::Empty,
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::String(s) => Cell::parse(s),
        Data::Bool(b) => Cell::Text(b.to_string()),
        Data::DateTime(_) | Data::DateTimeIso(_) => match cell.as_date() {
            Some(date) => Cell::Date(date),
            None => Cell::parse(&cell.to_string()),
        },
        Data::DurationIso(s) => Cell::Text(s.clone()),
        // #DIV/0!, #N/A and friends
        _ => Cell::Empty,
    }
}

/// Detect the file type from its extension and load it
pub fn load_table(filepath: impl AsRef<Path>) -> Result<Table> {
    let path = filepath.as_ref();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("csv") => from_csv(path),
        Some("xlsx") | Some("xls") | Some("xlsm") | Some("ods") => from_excel(path),
        _ => Err(DashboardError::UnsupportedFile(path.display().to_string())),
    }
}

/// CSV export URL for a shared spreadsheet link
///
/// Google Sheets edit/view links are rewritten to their public CSV export.
/// The worksheet id comes from `worksheet`, else from a `gid=` in the link.
/// Any other URL is assumed to already serve CSV and is returned unchanged.
pub fn export_url(spreadsheet: &str, worksheet: Option<&str>) -> String {
    const MARKER: &str = "/spreadsheets/d/";

    let Some(start) = spreadsheet.find(MARKER) else {
        return spreadsheet.to_string();
    };
    let id_start = start + MARKER.len();
    let id: String = spreadsheet[id_start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if id.is_empty() {
        return spreadsheet.to_string();
    }

    let gid = worksheet.map(str::to_string).or_else(|| {
        spreadsheet.find("gid=").map(|pos| {
            spreadsheet[pos + 4..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect()
        })
    });

    let base = &spreadsheet[..id_start];
    match gid.filter(|g| !g.is_empty()) {
        Some(gid) => format!("{}{}/export?format=csv&gid={}", base, id, gid),
        None => format!("{}{}/export?format=csv", base, id),
    }
}

/// Download a remote CSV export and parse it
#[cfg(feature = "web")]
pub async fn fetch_remote(client: &reqwest::Client, url: &str) -> Result<Table> {
    let http_err = |e: reqwest::Error| DashboardError::Http {
        url: url.to_string(),
        message: e.to_string(),
    };

    let body = client
        .get(url)
        .send()
        .await
        .map_err(http_err)?
        .error_for_status()
        .map_err(http_err)?
        .text()
        .await
        .map_err(http_err)?;

    from_csv_reader(body.as_bytes(), url)
}
