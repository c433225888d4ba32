//! Reporting endpoints: each report composes the filter builders, the sort and
//! paging resolvers and the capability probes into one or two statements run
//! through a [`QueryExecutor`](jobdash_storage::QueryExecutor).

mod applications;
mod capability;
mod jobposts;
mod lookup;
mod orchestrator;
mod summary;

use jobdash_storage::StoreError;
use thiserror::Error;

pub use applications::{apps_per_user, demographics, gender_ratio_by_job_type, hire_rate_by_gender};
pub use capability::{probe_optional, HireLink, OPTIONAL_ELEMENTS};
pub use jobposts::{
    geo_area, geo_provinces, geo_top, global_summary, gov_lco, gov_status, jobs, market, overview,
    wage_distribution, GeoTop, GeoTopMode, GEO_AREA_SORT, GOV_LCO_SORT, JOBS_SORT,
};
pub use lookup::{districts, geographies, provinces};
pub use orchestrator::{fetch_object, fetch_page, fetch_rows};
pub use summary::{dashboard_summary, DashboardSummary};

pub const CRATE_NAME: &str = "jobdash-report";

#[derive(Debug, Error)]
pub enum ReportError {
    /// An optional table or column the report depends on is missing.
    #[error("{0}")]
    CapabilityUnavailable(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}
