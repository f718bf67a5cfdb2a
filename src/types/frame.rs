//! Tabular views of a request: the raw feature frame handed to the
//! preprocessor and the numeric matrix handed to the model.

use super::request::{FeatureValue, Instance};
use std::collections::HashMap;

static NULL: FeatureValue = FeatureValue::Null;

/// Rows = instances, columns = union of observed feature names in first-seen
/// order. Cells are read through the borrowed instances, so a key missing
/// from a row reads as [`FeatureValue::Null`] without being stored.
#[derive(Debug, Clone, Default)]
pub struct FeatureFrame<'a> {
    columns: Vec<&'a str>,
    index: HashMap<&'a str, usize>,
    rows: &'a [Instance],
}

impl<'a> FeatureFrame<'a> {
    /// Build a frame over request instances
    pub fn from_instances(instances: &'a [Instance]) -> Self {
        let mut columns = Vec::new();
        let mut index = HashMap::new();
        for instance in instances {
            for (name, _) in instance.iter() {
                if !index.contains_key(name) {
                    index.insert(name, columns.len());
                    columns.push(name);
                }
            }
        }

        Self {
            columns,
            index,
            rows: instances,
        }
    }

    pub fn columns(&self) -> &[&'a str] {
        &self.columns
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Cell at `row` / `name`; null when the row lacks the key or is out of range
    pub fn value(&self, row: usize, name: &str) -> &FeatureValue {
        self.rows
            .get(row)
            .and_then(|instance| instance.get(name))
            .unwrap_or(&NULL)
    }

    /// Iterate the values of one column, top to bottom
    pub fn column<'s>(
        &'s self,
        name: &'s str,
    ) -> Option<impl Iterator<Item = &'s FeatureValue> + 's> {
        if !self.has_column(name) {
            return None;
        }
        Some(
            self.rows
                .iter()
                .map(move |instance| instance.get(name).unwrap_or(&NULL)),
        )
    }

    pub fn row(&self, index: usize) -> Option<&'a Instance> {
        self.rows.get(index)
    }
}

/// Dense row-major `f32` matrix, the preprocessor's output.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    /// Wrap row-major data. Returns `None` when `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Option<Self> {
        (data.len() == rows * cols).then_some(Self { rows, cols, data })
    }

    pub fn empty(cols: usize) -> Self {
        Self {
            rows: 0,
            cols,
            data: Vec::new(),
        }
    }

    pub fn from_rows(rows: Vec<Vec<f32>>) -> Option<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != cols) {
            return None;
        }
        let n = rows.len();
        Some(Self {
            rows: n,
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        (0..self.rows).map(move |i| self.row(i))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }
}
