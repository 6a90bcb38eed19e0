use super::FetchEngine;
use crate::{
    error::Result,
    filter::FilterSelection,
    models::{AggregateBundle, ViewKind, DEVICE_COMBINATION_COLUMNS},
};

const SEVERITY_RESULTS: [(&str, &str); 3] = [
    ("risk_critical", "Critical"),
    ("risk_high", "High"),
    ("risk_medium", "Medium"),
];

/// The Risk bundle: the full risk-score distribution plus one top-100
/// device-combination table per severity of interest.
pub(super) async fn fetch(
    engine: &FetchEngine,
    selection: &FilterSelection,
) -> Result<AggregateBundle> {
    let predicate = selection.predicate();
    let devices = engine.table_name("devices");
    let mut bundle = AggregateBundle::empty(ViewKind::Risk);

    let risk_dist = format!(
        "SELECT risk_score, COUNT(*) AS count \
         FROM {devices} \
         WHERE {predicate} AND risk_score IS NOT NULL \
         GROUP BY risk_score \
         ORDER BY count DESC"
    );
    bundle.insert_table(
        "risk_dist",
        engine.table_query(&risk_dist, &["risk_score", "count"]).await?,
    );

    for (name, severity) in SEVERITY_RESULTS {
        // All three combination columns must be populated for a row to be
        // worth ranking.
        let sql = format!(
            "SELECT vendor, device_type_family, model, COUNT(*) AS count \
             FROM {devices} \
             WHERE {predicate} \
                 AND risk_score = '{severity}' \
                 AND vendor IS NOT NULL \
                 AND device_type_family IS NOT NULL \
                 AND model IS NOT NULL \
             GROUP BY vendor, device_type_family, model \
             ORDER BY count DESC \
             LIMIT 100"
        );
        bundle.insert_table(name, engine.table_query(&sql, DEVICE_COMBINATION_COLUMNS).await?);
    }

    Ok(bundle)
}
