//! Tabular result models shared by the fetchers, the cache, and the HTTP
//! surface.

use crate::error::{Result, ServiceError};
use crate::store::Row;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    Global,
    Risk,
    Vulnerabilities,
}

impl ViewKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ViewKind::Global => "global",
            ViewKind::Risk => "risk",
            ViewKind::Vulnerabilities => "vulnerabilities",
        }
    }
}

/// An ordered result set with a fixed column schema. A zero-row table
/// still carries its columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub columns: &'static [&'static str],
    pub rows: Vec<Row>,
}

impl Table {
    pub fn empty(columns: &'static [&'static str]) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Shape raw store rows into a table, rejecting width mismatches so a
    /// malformed response never reaches the presentation layer.
    pub fn from_rows(columns: &'static [&'static str], rows: Vec<Row>) -> Result<Self> {
        for row in &rows {
            if row.len() != columns.len() {
                return Err(ServiceError::Query(anyhow!(
                    "store returned {} columns where {} were expected",
                    row.len(),
                    columns.len()
                )));
            }
        }
        Ok(Self { columns, rows })
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn truncate(&mut self, limit: usize) {
        self.rows.truncate(limit);
    }
}

/// A named result: either a table or a single scalar count.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Aggregate {
    Count(i64),
    Table(Table),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    Count,
    Table(&'static [&'static str]),
}

pub const DEVICE_COMBINATION_COLUMNS: &[&str] = &["vendor", "device_type_family", "model", "count"];
pub const ADVISORY_COLUMNS: &[&str] = &["advisory_name", "source_name", "count"];
pub const UID_EXAMPLE_COLUMNS: &[&str] = &[
    "organization",
    "uid",
    "vendor",
    "model",
    "device_type_family",
    "serial_number",
    "sw_version",
    "hw_version",
    "product_code",
    "classification_score",
];

/// Fixed result names and shapes per view. Fetchers populate exactly
/// these keys; failure bundles reproduce them empty.
pub fn result_shapes(view: ViewKind) -> &'static [(&'static str, ResultShape)] {
    match view {
        ViewKind::Global => &[
            ("top_devices", ResultShape::Table(DEVICE_COMBINATION_COLUMNS)),
            (
                "subcategory",
                ResultShape::Table(&["device_subcategory", "count"]),
            ),
            ("category", ResultShape::Table(&["device_category", "count"])),
            ("os_dist", ResultShape::Table(&["os_name", "count"])),
            ("vendor_dist", ResultShape::Table(&["vendor", "count"])),
            ("total_devices", ResultShape::Count),
            (
                "source_coverage",
                ResultShape::Table(&["source", "device_count"]),
            ),
            ("org_dist", ResultShape::Table(&["organization", "count"])),
        ],
        ViewKind::Risk => &[
            ("risk_dist", ResultShape::Table(&["risk_score", "count"])),
            ("risk_critical", ResultShape::Table(DEVICE_COMBINATION_COLUMNS)),
            ("risk_high", ResultShape::Table(DEVICE_COMBINATION_COLUMNS)),
            ("risk_medium", ResultShape::Table(DEVICE_COMBINATION_COLUMNS)),
        ],
        ViewKind::Vulnerabilities => &[
            ("vuln_confirmed", ResultShape::Table(ADVISORY_COLUMNS)),
            ("vuln_potential", ResultShape::Table(ADVISORY_COLUMNS)),
            ("vuln_confirmed_total", ResultShape::Count),
            ("vuln_potential_total", ResultShape::Count),
        ],
    }
}

/// One view's full result bundle. `error` carries the abstract notice the
/// presentation layer displays when a fetch degraded to empty results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateBundle {
    pub view: ViewKind,
    pub results: BTreeMap<&'static str, Aggregate>,
    pub error: Option<String>,
}

impl AggregateBundle {
    /// Correctly-shaped empty bundle: every expected key present, tables
    /// carrying their columns, counts at zero.
    pub fn empty(view: ViewKind) -> Self {
        let results = result_shapes(view)
            .iter()
            .map(|(name, shape)| {
                let aggregate = match shape {
                    ResultShape::Count => Aggregate::Count(0),
                    ResultShape::Table(columns) => Aggregate::Table(Table::empty(columns)),
                };
                (*name, aggregate)
            })
            .collect();

        Self {
            view,
            results,
            error: None,
        }
    }

    pub fn failed(view: ViewKind, message: String) -> Self {
        let mut bundle = Self::empty(view);
        bundle.error = Some(message);
        bundle
    }

    pub fn insert_table(&mut self, name: &'static str, table: Table) {
        self.results.insert(name, Aggregate::Table(table));
    }

    pub fn insert_count(&mut self, name: &'static str, count: i64) {
        self.results.insert(name, Aggregate::Count(count));
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        match self.results.get(name) {
            Some(Aggregate::Table(table)) => Some(table),
            _ => None,
        }
    }

    pub fn count(&self, name: &str) -> i64 {
        match self.results.get(name) {
            Some(Aggregate::Count(count)) => *count,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_bundle_reproduces_every_result_shape() {
        for view in [ViewKind::Global, ViewKind::Risk, ViewKind::Vulnerabilities] {
            let bundle = AggregateBundle::empty(view);
            let shapes = result_shapes(view);
            assert_eq!(bundle.results.len(), shapes.len());
            for (name, shape) in shapes {
                match shape {
                    ResultShape::Count => assert_eq!(bundle.count(name), 0),
                    ResultShape::Table(columns) => {
                        let table = bundle.table(name).expect(name);
                        assert_eq!(table.columns, *columns);
                        assert!(table.is_empty());
                    }
                }
            }
        }
    }

    #[test]
    fn from_rows_rejects_width_mismatch() {
        let rows = vec![vec![Value::Text("a".into())]];
        let err = Table::from_rows(&["x", "y"], rows).unwrap_err();
        assert!(matches!(err, crate::error::ServiceError::Query(_)));
    }

    #[test]
    fn zero_row_table_keeps_columns() {
        let table = Table::from_rows(ADVISORY_COLUMNS, Vec::new()).unwrap();
        assert_eq!(table.columns, ADVISORY_COLUMNS);
        assert!(table.is_empty());
    }
}
