use jobdash_core::{Page, ReportQuery, Row};
use jobdash_query::{resolve_order, Binder, PageWindow, SortSpec};
use jobdash_storage::{QueryExecutor, ROW_ORDINAL};
use serde_json::Value;

use crate::ReportError;

/// Paged pipeline over a `WITH agg AS (...)` statement: count the grouped
/// rows, then fetch one sorted window of them. `LIMIT` and `OFFSET` are bound
/// after every filter value, so the count statement and the row statement
/// share the same leading placeholders. The window carries a
/// [`ROW_ORDINAL`] column numbered by the same order, which the executor sorts
/// on after wrapping the statement.
pub async fn fetch_page(
    executor: &dyn QueryExecutor,
    agg_cte: &str,
    mut binder: Binder,
    sort: &SortSpec,
    query: &ReportQuery,
) -> Result<Page<Row>, ReportError> {
    let window = PageWindow::resolve(query.page(), query.page_size());

    let total_sql = format!("{agg_cte} SELECT COUNT(*)::int AS total FROM agg");
    let total = executor
        .fetch_rows(&total_sql, binder.values())
        .await?
        .first()
        .and_then(|row| row.get("total"))
        .and_then(Value::as_i64)
        .unwrap_or(0);

    let order = resolve_order(query.sort_key(), query.sort_dir(), sort);
    let limit = binder.append(window.page_size);
    let offset = binder.append(window.offset);
    let rows_sql = format!(
        "{agg_cte} SELECT agg.*, ROW_NUMBER() OVER (ORDER BY {order}) AS {ROW_ORDINAL} \
         FROM agg ORDER BY {order} LIMIT {limit} OFFSET {offset}"
    );
    let rows = executor.fetch_rows(&rows_sql, binder.values()).await?;

    Ok(Page {
        page: window.page,
        page_size: window.page_size,
        total,
        rows,
    })
}

pub async fn fetch_rows(
    executor: &dyn QueryExecutor,
    sql: &str,
    binder: &Binder,
) -> Result<Vec<Row>, ReportError> {
    Ok(executor.fetch_rows(sql, binder.values()).await?)
}

/// First row of a single-row statement; an empty object when it returns none.
pub async fn fetch_object(
    executor: &dyn QueryExecutor,
    sql: &str,
    binder: &Binder,
) -> Result<Row, ReportError> {
    Ok(executor
        .fetch_rows(sql, binder.values())
        .await?
        .into_iter()
        .next()
        .unwrap_or_default())
}
