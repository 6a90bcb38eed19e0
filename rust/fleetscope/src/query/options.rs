use super::FetchEngine;
use crate::{
    error::{Result, ServiceError},
    filter::FilterField,
    store::Row,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const ORGANIZATION_FIELDS: [FilterField; 5] = [
    FilterField::Region,
    FilterField::Vertical,
    FilterField::Organization,
    FilterField::Industry,
    FilterField::AccountStatus,
];

const DEVICE_FIELDS: [FilterField; 7] = [
    FilterField::Vendor,
    FilterField::DeviceTypeFamily,
    FilterField::DeviceSubcategory,
    FilterField::DeviceCategory,
    FilterField::Model,
    FilterField::OsName,
    FilterField::MacOui,
];

/// Discovered value domains per filter field. `available` is false when
/// the lookup failed and the sets are the degraded empty fallback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterOptions {
    pub available: bool,
    pub fields: BTreeMap<FilterField, Vec<String>>,
}

impl FilterOptions {
    /// Empty-but-complete fallback: every field present, no values.
    pub fn empty() -> Self {
        Self {
            available: false,
            fields: FilterField::ALL
                .into_iter()
                .map(|field| (field, Vec::new()))
                .collect(),
        }
    }

    pub fn values(&self, field: FilterField) -> &[String] {
        self.fields.get(&field).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Fetch unique values for every filter field from the two precomputed
/// domain tables.
pub(super) async fn fetch(engine: &FetchEngine) -> Result<FilterOptions> {
    let organization_sql = format!(
        "SELECT region, vertical, organization, industry, account_status \
         FROM {}",
        engine.table_name("organization_filters")
    );
    let device_sql = format!(
        "SELECT vendor, device_type_family, device_subcategory, device_category, model, os_name, mac_oui \
         FROM {}",
        engine.table_name("device_filters")
    );

    let organization_rows = engine.rows(&organization_sql).await.map_err(unavailable)?;
    let device_rows = engine.rows(&device_sql).await.map_err(unavailable)?;

    let mut fields = BTreeMap::new();
    collect_columns(&mut fields, &ORGANIZATION_FIELDS, &organization_rows);
    collect_columns(&mut fields, &DEVICE_FIELDS, &device_rows);

    Ok(FilterOptions {
        available: true,
        fields,
    })
}

fn unavailable(err: ServiceError) -> ServiceError {
    ServiceError::FilterOptionsUnavailable(err.into())
}

fn collect_columns(
    fields: &mut BTreeMap<FilterField, Vec<String>>,
    layout: &[FilterField],
    rows: &[Row],
) {
    for (index, field) in layout.iter().enumerate() {
        let mut values = BTreeSet::new();
        for row in rows {
            if let Some(value) = row.get(index).and_then(|v| v.as_str()) {
                if !value.is_empty() {
                    values.insert(value.to_string());
                }
            }
        }
        fields.insert(*field, values.into_iter().collect());
    }
}
