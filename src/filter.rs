use crate::cell::Cell;
use crate::error::{DashboardError, Result};
use crate::table::{Dataset, Table};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Columns offered as filters on the team dashboard, in sidebar order.
pub const DEFAULT_FILTER_COLUMNS: [&str; 4] = ["Date", "Role", "Position", "Player Name"];

/// One sidebar widget: the values a user may pick and what is picked now.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterWidget {
    pub column: String,
    pub options: Vec<String>,
    pub selected: Vec<String>,
}

/// Multi-select filters whose options narrow each other
///
/// A row passes when, for every column with a non-empty selection, its value
/// (in display form) is one of the selected values. Columns with no
/// selection do not constrain anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicFilters {
    pub columns: Vec<String>,
    #[serde(default)]
    pub selections: BTreeMap<String, Vec<String>>,
}

impl DynamicFilters {
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DynamicFilters {
            columns: columns.into_iter().map(Into::into).collect(),
            selections: BTreeMap::new(),
        }
    }

    pub fn with_default_columns() -> Self {
        Self::new(DEFAULT_FILTER_COLUMNS)
    }

    /// Replace the selections, rejecting columns that are not filters.
    pub fn select(&mut self, selections: BTreeMap<String, Vec<String>>) -> Result<()> {
        if let Some(unknown) = selections.keys().find(|col| !self.columns.contains(col)) {
            return Err(DashboardError::UnknownColumn(unknown.clone()));
        }
        self.selections = selections;
        Ok(())
    }

    /// Rows matching every active selection except the one on `except`
    pub fn filter_except(&self, dataset: &Dataset, except: Option<&str>) -> Result<Table> {
        let table = dataset.table();

        let mut active: Vec<(usize, &[String])> = Vec::new();
        for (column, values) in &self.selections {
            if values.is_empty() || Some(column.as_str()) == except {
                continue;
            }
            let idx = table
                .column_index(column)
                .ok_or_else(|| DashboardError::MissingColumn(column.clone()))?;
            active.push((idx, values.as_slice()));
        }

        Ok(table.filter_rows(|row| {
            active
                .iter()
                .all(|(idx, values)| matches_any(&row[*idx], values))
        }))
    }

    pub fn filter(&self, dataset: &Dataset) -> Result<Table> {
        self.filter_except(dataset, None)
    }

    /// Distinct values still reachable for `column` under the other filters
    pub fn options(&self, dataset: &Dataset, column: &str) -> Result<Vec<String>> {
        let narrowed = self.filter_except(dataset, Some(column))?;

        let mut cells: Vec<&Cell> = narrowed.column(column)?.filter(|c| !c.is_empty()).collect();
        cells.sort_by(|a, b| a.cmp_total(b));

        let mut options: Vec<String> = cells.into_iter().map(Cell::to_string).collect();
        options.dedup();
        Ok(options)
    }

    /// Drop selected values that the other filters have made unreachable
    ///
    /// Columns are walked in sidebar order, so when two selections exclude
    /// each other the earlier column loses its values and the later one is
    /// kept.
    pub fn reconcile(&mut self, dataset: &Dataset) -> Result<()> {
        let columns = self.columns.clone();
        for column in &columns {
            if dataset.table().column_index(column).is_none() {
                continue;
            }
            let options = self.options(dataset, column)?;
            if let Some(selected) = self.selections.get_mut(column) {
                selected.retain(|value| options.contains(value));
            }
        }
        Ok(())
    }

    /// Sidebar state for every filter column present in the data
    pub fn widgets(&self, dataset: &Dataset) -> Result<Vec<FilterWidget>> {
        self.columns
            .iter()
            .filter(|column| dataset.table().column_index(column).is_some())
            .map(|column| {
                Ok(FilterWidget {
                    column: column.clone(),
                    options: self.options(dataset, column)?,
                    selected: self.selections.get(column).cloned().unwrap_or_default(),
                })
            })
            .collect()
    }
}

fn matches_any(cell: &Cell, values: &[String]) -> bool {
    let shown = cell.to_string();
    values.iter().any(|value| *value == shown)
}
