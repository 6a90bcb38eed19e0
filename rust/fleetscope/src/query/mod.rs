//! Aggregate fetchers. Each submodule owns one view's fixed bundle of
//! aggregate queries; the engine dispatches per view and enforces the
//! never-throw boundary toward the presentation layer.

mod examples;
mod global;
mod options;
mod risk;
mod vulnerability;

pub use options::FilterOptions;

use crate::{
    error::Result,
    filter::FilterSelection,
    models::{AggregateBundle, Table, ViewKind, UID_EXAMPLE_COLUMNS},
    store::{Executor, Row, Value},
};
use std::sync::Arc;
use tracing::error;

pub struct FetchEngine {
    executor: Arc<Executor>,
    schema: String,
}

impl FetchEngine {
    pub fn new(executor: Arc<Executor>, schema: String) -> Self {
        Self { executor, schema }
    }

    /// Fetch one view's bundle. Never fails to its caller: a query error
    /// is logged and converted into an empty, correctly-shaped bundle
    /// carrying an abstract notice for the presentation layer.
    pub async fn fetch(&self, view: ViewKind, selection: &FilterSelection) -> AggregateBundle {
        let outcome = match view {
            ViewKind::Global => global::fetch(self, selection).await,
            ViewKind::Risk => risk::fetch(self, selection).await,
            ViewKind::Vulnerabilities => vulnerability::fetch(self, selection).await,
        };

        match outcome {
            Ok(bundle) => bundle,
            Err(err) => {
                error!(
                    view = view.as_str(),
                    error = %err,
                    "aggregate fetch failed, returning empty bundle"
                );
                AggregateBundle::failed(view, format!("failed to load {} data", view.as_str()))
            }
        }
    }

    /// Discover the per-field filter value domains.
    pub async fn filter_options(&self) -> Result<FilterOptions> {
        options::fetch(self).await
    }

    /// Best-classified device examples for the current selection. Degrades
    /// to an empty, correctly-columned table on failure.
    pub async fn uid_examples(&self, selection: &FilterSelection) -> Table {
        match examples::fetch(self, selection).await {
            Ok(table) => table,
            Err(err) => {
                error!(error = %err, "uid example fetch failed, returning empty table");
                Table::empty(UID_EXAMPLE_COLUMNS)
            }
        }
    }

    pub(super) fn table_name(&self, name: &str) -> String {
        format!("{}.{}", self.schema, name)
    }

    pub(super) async fn rows(&self, sql: &str) -> Result<Vec<Row>> {
        self.executor.execute(sql).await
    }

    pub(super) async fn table_query(
        &self,
        sql: &str,
        columns: &'static [&'static str],
    ) -> Result<Table> {
        let rows = self.executor.execute(sql).await?;
        Table::from_rows(columns, rows)
    }

    pub(super) async fn count_query(&self, sql: &str) -> Result<i64> {
        let rows = self.executor.execute(sql).await?;
        Ok(rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .unwrap_or(0))
    }
}
