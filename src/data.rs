//! Data
//!
//! Minimal row-oriented table abstraction the estimator works on: typed cells,
//! keyed immutable rows, a table spec, an in-memory table with sequential
//! iteration and an append-only container to write new tables.
use crate::errors::ShapleyError;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};

/// Type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// 64 bit floating point values.
    Double,
    /// 64 bit integer values.
    Int,
    /// Strings.
    Str,
    /// Booleans.
    Bool,
}

impl DataType {
    /// Whether values of this type can be read as `f64`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Double | DataType::Int)
    }
}

/// A single scalar value of a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Cell {
    Double(f64),
    Int(i64),
    Str(String),
    Bool(bool),
    Missing,
}

impl Cell {
    /// Numeric value of the cell, `None` for non numeric or missing cells.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Double(v) => Some(*v),
            Cell::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Double(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Int(v)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Str(v.to_string())
    }
}

impl From<bool> for Cell {
    fn from(v: bool) -> Self {
        Cell::Bool(v)
    }
}

impl Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Double(v) => write!(f, "{}", v),
            Cell::Int(v) => write!(f, "{}", v),
            Cell::Str(v) => write!(f, "{}", v),
            Cell::Bool(v) => write!(f, "{}", v),
            Cell::Missing => write!(f, "?"),
        }
    }
}

/// Identifier of a row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowKey(String);

impl RowKey {
    pub fn new<S: Into<String>>(key: S) -> Self {
        RowKey(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RowKey {
    fn from(key: String) -> Self {
        RowKey(key)
    }
}

impl From<&str> for RowKey {
    fn from(key: &str) -> Self {
        RowKey(key.to_string())
    }
}

impl Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable keyed row of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    key: RowKey,
    cells: Vec<Cell>,
}

impl Row {
    pub fn new<K: Into<RowKey>>(key: K, cells: Vec<Cell>) -> Self {
        Row { key: key.into(), cells }
    }

    pub fn key(&self) -> &RowKey {
        &self.key
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Get the cell at `idx`, panics if out of bounds.
    pub fn cell(&self, idx: usize) -> &Cell {
        &self.cells[idx]
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Copy of this row restricted to the cells at `indices`, in that order.
    pub fn project(&self, indices: &[usize]) -> Row {
        Row {
            key: self.key.clone(),
            cells: indices.iter().map(|&i| self.cells[i].clone()).collect(),
        }
    }

    pub fn into_parts(self) -> (RowKey, Vec<Cell>) {
        (self.key, self.cells)
    }
}

/// Name and type of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
}

impl ColumnSpec {
    pub fn new<S: Into<String>>(name: S, data_type: DataType) -> Self {
        ColumnSpec {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered set of uniquely named columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSpec {
    columns: Vec<ColumnSpec>,
    index: HashMap<String, usize>,
}

impl TableSpec {
    /// Create a spec, fails if a column name occurs twice.
    pub fn new(columns: Vec<ColumnSpec>) -> Result<Self, ShapleyError> {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, c) in columns.iter().enumerate() {
            if index.insert(c.name.clone(), i).is_some() {
                return Err(ShapleyError::InvalidParameter(
                    "columns".to_string(),
                    "unique column names".to_string(),
                    format!("duplicate column '{}'", c.name),
                ));
            }
        }
        Ok(TableSpec { columns, index })
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, idx: usize) -> &ColumnSpec {
        &self.columns[idx]
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }
}

/// In-memory table, only supports sequential iteration.
#[derive(Debug, Clone)]
pub struct DataTable {
    spec: TableSpec,
    rows: Vec<Row>,
}

impl DataTable {
    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl IntoIterator for DataTable {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a DataTable {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// Append-only writer for a new table.
#[derive(Debug)]
pub struct DataContainer {
    spec: TableSpec,
    rows: Vec<Row>,
}

impl DataContainer {
    pub fn new(spec: TableSpec) -> Self {
        DataContainer { spec, rows: Vec::new() }
    }

    pub fn spec(&self) -> &TableSpec {
        &self.spec
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    /// Append a row, its cell count must match the spec.
    pub fn add_row(&mut self, row: Row) -> Result<(), ShapleyError> {
        if row.num_cells() != self.spec.num_columns() {
            return Err(ShapleyError::InvalidParameter(
                format!("row '{}'", row.key()),
                format!("{} cells", self.spec.num_columns()),
                row.num_cells().to_string(),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn close(self) -> DataTable {
        DataTable {
            spec: self.spec,
            rows: self.rows,
        }
    }
}

/// Build a table from a spec and rows, validating every row.
pub fn table_from_rows(spec: TableSpec, rows: Vec<Row>) -> Result<DataTable, ShapleyError> {
    let mut container = DataContainer::new(spec);
    for row in rows {
        container.add_row(row)?;
    }
    Ok(container.close())
}
