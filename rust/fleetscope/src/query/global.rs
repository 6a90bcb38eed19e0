use super::FetchEngine;
use crate::{
    error::Result,
    filter::FilterSelection,
    models::{AggregateBundle, ViewKind, DEVICE_COMBINATION_COLUMNS},
};

/// The Global bundle: eight aggregates over the device fact table, all
/// sharing one predicate. Issued strictly in order so the widest result
/// set arrives first.
pub(super) async fn fetch(
    engine: &FetchEngine,
    selection: &FilterSelection,
) -> Result<AggregateBundle> {
    let predicate = selection.predicate();
    let devices = engine.table_name("devices");
    let mut bundle = AggregateBundle::empty(ViewKind::Global);

    let top_devices = format!(
        "SELECT vendor, device_type_family, model, COUNT(*) AS count \
         FROM {devices} \
         WHERE {predicate} \
         GROUP BY vendor, device_type_family, model \
         ORDER BY count DESC \
         LIMIT 5000"
    );
    bundle.insert_table(
        "top_devices",
        engine.table_query(&top_devices, DEVICE_COMBINATION_COLUMNS).await?,
    );

    let subcategory = format!(
        "SELECT device_subcategory, COUNT(*) AS count \
         FROM {devices} \
         WHERE {predicate} AND device_subcategory IS NOT NULL \
         GROUP BY device_subcategory \
         ORDER BY count DESC"
    );
    bundle.insert_table(
        "subcategory",
        engine
            .table_query(&subcategory, &["device_subcategory", "count"])
            .await?,
    );

    let category = format!(
        "SELECT device_category, COUNT(*) AS count \
         FROM {devices} \
         WHERE {predicate} AND device_category IS NOT NULL \
         GROUP BY device_category \
         ORDER BY count DESC"
    );
    bundle.insert_table(
        "category",
        engine
            .table_query(&category, &["device_category", "count"])
            .await?,
    );

    let os_dist = format!(
        "SELECT os_name, COUNT(*) AS count \
         FROM {devices} \
         WHERE {predicate} AND os_name IS NOT NULL \
         GROUP BY os_name \
         ORDER BY count DESC"
    );
    bundle.insert_table(
        "os_dist",
        engine.table_query(&os_dist, &["os_name", "count"]).await?,
    );

    let vendor_dist = format!(
        "SELECT vendor, COUNT(*) AS count \
         FROM {devices} \
         WHERE {predicate} AND vendor IS NOT NULL \
         GROUP BY vendor \
         ORDER BY count DESC \
         LIMIT 20"
    );
    bundle.insert_table(
        "vendor_dist",
        engine.table_query(&vendor_dist, &["vendor", "count"]).await?,
    );

    // Independent COUNT(*): top_devices is grouped and capped, so the
    // total cannot be derived from it.
    let total = format!(
        "SELECT COUNT(*) AS total_count \
         FROM {devices} \
         WHERE {predicate}"
    );
    bundle.insert_count("total_devices", engine.count_query(&total).await?);

    // Coverage per discovery source: unnest the sources-seen array per
    // distinct (organization, uid) pair, then count by source.
    let source_coverage = format!(
        "SELECT source, COUNT(*) AS device_count \
         FROM ( \
             SELECT DISTINCT organization, uid, exploded_source AS source \
             FROM {devices} \
             LATERAL VIEW explode(all_seen_sources) AS exploded_source \
             WHERE {predicate} \
         ) \
         GROUP BY source \
         ORDER BY device_count DESC"
    );
    bundle.insert_table(
        "source_coverage",
        engine
            .table_query(&source_coverage, &["source", "device_count"])
            .await?,
    );

    // Uncapped: feeds the organizations CSV export.
    let org_dist = format!(
        "SELECT organization, COUNT(*) AS count \
         FROM {devices} \
         WHERE {predicate} AND organization IS NOT NULL \
         GROUP BY organization \
         ORDER BY count DESC"
    );
    bundle.insert_table(
        "org_dist",
        engine
            .table_query(&org_dist, &["organization", "count"])
            .await?,
    );

    Ok(bundle)
}
