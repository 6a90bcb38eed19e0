use super::FetchEngine;
use crate::{
    error::{Result, ServiceError},
    filter::FilterSelection,
    models::{AggregateBundle, Table, ViewKind, ADVISORY_COLUMNS},
    store::Row,
};
use anyhow::anyhow;
use tracing::debug;

const DISPLAY_LIMIT: usize = 100;

/// The Vulnerability bundle. One query unnests the advisory list on the
/// denormalized table; the relevance split happens here in memory, which
/// costs one round trip instead of two.
pub(super) async fn fetch(
    engine: &FetchEngine,
    selection: &FilterSelection,
) -> Result<AggregateBundle> {
    let predicate = selection.predicate();
    let table = engine.table_name("device_vulnerabilities");

    let sql = format!(
        "SELECT effective_relevance, v.name AS advisory_name, v.source_name, COUNT(*) AS count \
         FROM {table} \
         LATERAL VIEW EXPLODE(vulnerabilities_list) exploded AS v \
         WHERE {predicate} \
         GROUP BY effective_relevance, v.name, v.source_name \
         ORDER BY effective_relevance, count DESC"
    );
    let rows = engine.rows(&sql).await?;

    let mut confirmed: Vec<Row> = Vec::new();
    let mut potential: Vec<Row> = Vec::new();
    let mut confirmed_total: i64 = 0;
    let mut potential_total: i64 = 0;

    for row in rows {
        let [relevance, advisory, source, count] = row.as_slice() else {
            return Err(ServiceError::Query(anyhow!(
                "vulnerability query returned a row of width {}",
                row.len()
            )));
        };
        let bucket_row = vec![advisory.clone(), source.clone(), count.clone()];
        let row_count = count.as_i64().unwrap_or(0);

        match relevance.as_str() {
            Some("Confirmed") => {
                confirmed_total += row_count;
                confirmed.push(bucket_row);
            }
            Some("Potentially Relevant") => {
                potential_total += row_count;
                potential.push(bucket_row);
            }
            other => {
                debug!(relevance = ?other, "dropping advisory row with unrecognized relevance");
            }
        }
    }

    // Totals cover the full buckets; only the displayed rows are capped.
    // The query already orders each relevance group by count desc.
    let mut confirmed = Table::from_rows(ADVISORY_COLUMNS, confirmed)?;
    confirmed.truncate(DISPLAY_LIMIT);
    let mut potential = Table::from_rows(ADVISORY_COLUMNS, potential)?;
    potential.truncate(DISPLAY_LIMIT);

    let mut bundle = AggregateBundle::empty(ViewKind::Vulnerabilities);
    bundle.insert_table("vuln_confirmed", confirmed);
    bundle.insert_table("vuln_potential", potential);
    bundle.insert_count("vuln_confirmed_total", confirmed_total);
    bundle.insert_count("vuln_potential_total", potential_total);
    Ok(bundle)
}
