//! Cascading dropdown sources: geographies, their provinces, their districts.

use jobdash_core::{ReportQuery, Row};
use jobdash_query::{Binder, WhereClause};
use jobdash_storage::QueryExecutor;

use crate::orchestrator::fetch_rows;
use crate::ReportError;

pub async fn geographies(executor: &dyn QueryExecutor) -> Result<Vec<Row>, ReportError> {
    fetch_rows(
        executor,
        "SELECT id, name FROM geographies ORDER BY id",
        &Binder::new(),
    )
    .await
}

/// Provinces, optionally narrowed by `geography_id`.
pub async fn provinces(executor: &dyn QueryExecutor, query: &ReportQuery) -> Result<Vec<Row>, ReportError> {
    children(executor, "provinces", "geography_id", query.id("geography_id")).await
}

/// Districts, optionally narrowed by `province_id`.
pub async fn districts(executor: &dyn QueryExecutor, query: &ReportQuery) -> Result<Vec<Row>, ReportError> {
    children(executor, "districts", "province_id", query.id("province_id")).await
}

async fn children(
    executor: &dyn QueryExecutor,
    table: &str,
    parent: &str,
    parent_id: Option<i64>,
) -> Result<Vec<Row>, ReportError> {
    let mut binder = Binder::new();
    let mut clause = WhereClause::default();
    if let Some(id) = parent_id {
        clause.and(format!("{parent} = {}", binder.append(id)));
    }
    let sql = format!("SELECT id, name_th, {parent} FROM {table} {clause} ORDER BY name_th, id");
    fetch_rows(executor, &sql, &binder).await
}
