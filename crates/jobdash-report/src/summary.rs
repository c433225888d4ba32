use jobdash_core::{ReportQuery, Row};
use jobdash_storage::QueryExecutor;
use serde::Serialize;
use tracing::{info_span, Instrument};

use crate::applications::demographics;
use crate::jobposts::{geo_top, gov_status, market, overview, wage_distribution, GeoTop};
use crate::ReportError;

/// Everything the dashboard's first paint needs, from one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub overview: Row,
    pub market: Vec<Row>,
    pub gov_status: Vec<Row>,
    pub wage_distribution: Vec<Row>,
    pub demographics: Vec<Row>,
    pub geo_top: GeoTop,
}

/// Runs the component reports concurrently against the same filters. The
/// first failure cancels the rest and fails the whole summary.
pub async fn dashboard_summary(
    executor: &dyn QueryExecutor,
    query: &ReportQuery,
) -> Result<DashboardSummary, ReportError> {
    let (overview, market, gov_status, wage_distribution, demographics, geo_top) = tokio::try_join!(
        overview(executor, query).instrument(info_span!("report", name = "overview")),
        market(executor, query).instrument(info_span!("report", name = "market")),
        gov_status(executor, query).instrument(info_span!("report", name = "gov_status")),
        wage_distribution(executor, query).instrument(info_span!("report", name = "wage_distribution")),
        demographics(executor, query).instrument(info_span!("report", name = "demographics")),
        geo_top(executor, query).instrument(info_span!("report", name = "geo_top")),
    )?;
    Ok(DashboardSummary {
        overview,
        market,
        gov_status,
        wage_distribution,
        demographics,
        geo_top,
    })
}
