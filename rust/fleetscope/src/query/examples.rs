use super::FetchEngine;
use crate::{
    error::Result,
    filter::FilterSelection,
    models::{Table, UID_EXAMPLE_COLUMNS},
};

/// Devices with the most populated classification fields: the score is
/// the number of non-null columns among the seven classification fields,
/// so fully identified records rank first.
pub(super) async fn fetch(engine: &FetchEngine, selection: &FilterSelection) -> Result<Table> {
    let predicate = selection.predicate();
    let devices = engine.table_name("devices");

    let sql = format!(
        "SELECT organization, uid, vendor, model, device_type_family, \
                serial_number, sw_version, hw_version, product_code, \
                (CASE WHEN vendor IS NOT NULL THEN 1 ELSE 0 END + \
                 CASE WHEN model IS NOT NULL THEN 1 ELSE 0 END + \
                 CASE WHEN device_type_family IS NOT NULL THEN 1 ELSE 0 END + \
                 CASE WHEN serial_number IS NOT NULL THEN 1 ELSE 0 END + \
                 CASE WHEN sw_version IS NOT NULL THEN 1 ELSE 0 END + \
                 CASE WHEN hw_version IS NOT NULL THEN 1 ELSE 0 END + \
                 CASE WHEN product_code IS NOT NULL THEN 1 ELSE 0 END) AS classification_score \
         FROM {devices} \
         WHERE {predicate} \
         ORDER BY classification_score DESC, organization, uid \
         LIMIT 50"
    );

    engine.table_query(&sql, UID_EXAMPLE_COLUMNS).await
}
