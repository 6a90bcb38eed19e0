//! CSV rendering for the export surface.

use crate::{
    models::{AggregateBundle, Table},
    store::Value,
};

/// Render a table as CSV: header row from the column schema, one line per
/// row, RFC-4180-style quoting.
pub fn table_to_csv(table: &Table) -> String {
    let mut out = String::new();
    push_line(&mut out, table.columns.iter().map(|c| c.to_string()));
    for row in &table.rows {
        push_line(&mut out, row.iter().map(render_value));
    }
    out
}

/// The full per-organization distribution from a Global bundle.
pub fn organizations_csv(bundle: &AggregateBundle) -> Option<String> {
    bundle.table("org_dist").map(table_to_csv)
}

fn push_line(out: &mut String, fields: impl Iterator<Item = String>) {
    let mut first = true;
    for field in fields {
        if !first {
            out.push(',');
        }
        first = false;
        out.push_str(&quote(&field));
    }
    out.push_str("\r\n");
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => s.clone(),
    }
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
